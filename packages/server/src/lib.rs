//! Email2KG API server.
//!
//! Orchestrates the sync-and-extraction pipeline from the `extraction`
//! library and exposes it over a bearer-token REST API: sync triggering and
//! polling, graph listings, the restricted query endpoint, dashboard stats,
//! and account connect/disconnect.

pub mod common;
pub mod config;
pub mod kernel;
pub mod server;

pub use config::Config;
pub use server::{build_app, build_production_app, AppState};
