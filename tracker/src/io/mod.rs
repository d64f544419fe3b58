//! Side-effecting operations: filesystem layout, config, persistence, export.

pub mod atomic;
pub mod config;
pub mod export;
pub mod init;
pub mod store;
