//! Command implementations for the CLI
//!
//! - start: Follow the log files and serve metrics
//! - test: Check configuration and source files
//! - config: Configuration display and validation

pub mod config;
pub mod start;
pub mod test;
