// ABOUTME: Library root for gitship - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod container;
pub mod diagnostics;
pub mod error;
pub mod log;
pub mod output;
pub mod pipeline;
pub mod provision;
pub mod proxy;
pub mod source;
pub mod ssh;
pub mod sync;
pub mod types;
