//! HTTP request handlers

mod health;
mod oracle;

pub use health::*;
pub use oracle::*;
