//! Survey logic auditor.
//!
//! Checks that a live survey's branching behavior matches a logic map
//! extracted from its written specification. The map is expanded into every
//! respondent path, selected paths are walked against the deployed survey
//! through a UI actor, and each walk is classified. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (destinations, enumeration,
//!   selection, matching priorities, classification). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, logic files, extractor
//!   processes, WebDriver, results log). Isolated behind traits for tests.
//!
//! Orchestration modules ([`walk`], [`audit`], [`stitch`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod audit;
pub mod core;
pub mod exit_codes;
pub mod graph;
pub mod io;
pub mod logging;
pub mod report;
pub mod stitch;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod walk;
