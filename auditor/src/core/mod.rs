//! Deterministic, pure logic shared by the auditor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod destination;
pub mod enumerate;
pub mod invariants;
pub mod matchers;
pub mod selection;
pub mod types;
