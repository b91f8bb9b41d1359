//! I/O helpers for runner commands.

pub mod claim;
pub mod config;
pub mod process;
pub mod resources;
pub mod unit_log;
