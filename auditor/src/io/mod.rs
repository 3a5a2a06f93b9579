//! I/O adapters for auditor commands.

pub mod actor;
pub mod config;
pub mod extract;
pub mod logic_store;
pub mod process;
pub mod prompt;
pub mod results_log;
pub mod webdriver;
