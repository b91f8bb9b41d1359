//! Batch claim runner.
//!
//! Runs an external claim operation once per credential file in a keypair
//! directory (`id1.json` .. `id{N}.json`), paying fees from one fee payer and
//! sending every claimed balance to one destination. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (unit lifecycle, enumeration, summaries).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config files, credential checks, child
//!   processes, log files). Isolated behind the [`io::claim::ClaimOperation`] seam so
//!   tests can script claims.
//!
//! Orchestration modules ([`batch`], [`launch`], [`barrier`], [`plan`]) coordinate
//! core logic with I/O to implement the CLI commands.

pub mod barrier;
pub mod batch;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod launch;
pub mod logging;
pub mod plan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
