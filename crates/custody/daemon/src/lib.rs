//! Custody oracle daemon library
//!
//! HTTP surface of the private authorization oracle:
//! - policy evaluation and permit issuance
//! - public key, attestation and trust material for ledger administrators
//! - server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
