//! Deterministic, pure logic for the test lifecycle.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! records and take the current time as an argument; the only source of
//! nondeterminism is fresh record ids.

pub mod invariants;
pub mod lifecycle;
pub mod report;
pub mod types;
pub mod validation;
