//! Mail source implementations.

#[cfg(feature = "gmail")]
pub mod gmail;

#[cfg(feature = "gmail")]
pub use gmail::GmailSource;
