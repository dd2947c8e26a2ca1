//! REST route handlers.

pub mod accounts;
pub mod dashboard;
pub mod graph;
pub mod health;
pub mod sync;

pub use accounts::{connect_account_handler, disconnect_account_handler};
pub use dashboard::dashboard_stats_handler;
pub use graph::{list_entities_handler, list_relationships_handler, run_query_handler};
pub use health::health_handler;
pub use sync::{cancel_sync_handler, start_sync_handler, sync_status_handler};
