//! Stable exit codes for `claim-runner`.

/// Run completed (individual claims may still have failed), or plan printed.
pub const OK: i32 = 0;
/// Orchestration failed before any launch (invalid configuration, unreadable config file).
pub const INVALID: i32 = 1;
/// `run --strict` finished and at least one unit failed. Distinct from clap's usage error code 2.
pub const UNITS_FAILED: i32 = 3;
/// The run was interrupted (Ctrl-C); in-flight claims were killed.
pub const CANCELLED: i32 = 130;
