//! Battery acceptance-test tracker.
//!
//! A test runs a fixed number of cycles on one or two banks of cells. Each
//! cycle collects one open-circuit (OCV) reading followed by closed-circuit
//! (CCV) readings, and is closed by an operator. The test's status is derived
//! from its cycles and never set by hand.
//!
//! - **[`core`]**: Pure transitions, validation and invariants. No I/O.
//! - **[`io`]**: `.tracker/` layout, config, JSON persistence and CSV export.
//! - **[`service`]**: Load → transition → save orchestration used by the CLI
//!   and the HTTP API.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod record;
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
