//! Work units and their lifecycle.
//!
//! A [`WorkUnit`] is one credential file that may be handed to the claim
//! operation. Its status only moves forward:
//!
//! ```text
//! Pending ──> Skipped
//!    │
//!    ├──> Running ──> Succeeded
//!    │       └──────> Failed(reason)
//!    └──> Failed(Cancelled)          (run cancelled before launch)
//! ```
//!
//! Any other transition is rejected with an error and leaves the unit untouched.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Numeric identifier of a work unit. Identifiers start at 1; 0 is reserved for the fee payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a launched (or launch-eligible) unit did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The claim operation exited with a non-success status. `code` is `None` when
    /// the process was terminated by a signal.
    Exit { code: Option<i32> },
    /// The claim operation exceeded the per-child timeout and was killed.
    TimedOut,
    /// The run was cancelled before this unit could finish.
    Cancelled,
    /// The claim operation could not be started at all.
    Spawn { message: String },
    /// The task driving this unit panicked.
    Panicked { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exit { code: Some(code) } => write!(f, "exited with status {code}"),
            FailureReason::Exit { code: None } => write!(f, "terminated by signal"),
            FailureReason::TimedOut => write!(f, "timed out"),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::Spawn { message } => write!(f, "failed to start: {message}"),
            FailureReason::Panicked { message } => write!(f, "task panicked: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Skipped,
    Running,
    Succeeded,
    Failed { reason: FailureReason },
}

impl UnitStatus {
    /// Terminal statuses are never left again within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Skipped | UnitStatus::Succeeded | UnitStatus::Failed { .. }
        )
    }

    fn label(&self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Skipped => "skipped",
            UnitStatus::Running => "running",
            UnitStatus::Succeeded => "succeeded",
            UnitStatus::Failed { .. } => "failed",
        }
    }
}

/// One credential file and its progress through the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    pub id: UnitId,
    pub resource_path: PathBuf,
    pub status: UnitStatus,
}

impl WorkUnit {
    pub fn new(id: UnitId, resource_path: PathBuf) -> Self {
        Self {
            id,
            resource_path,
            status: UnitStatus::Pending,
        }
    }

    /// `Pending -> Skipped`: the credential file is missing or unreadable.
    pub fn skip(&mut self) -> Result<(), String> {
        self.transition(UnitStatus::Skipped)
    }

    /// `Pending -> Running`: a child task has been launched for this unit.
    pub fn start(&mut self) -> Result<(), String> {
        self.transition(UnitStatus::Running)
    }

    /// `Running -> Succeeded`.
    pub fn succeed(&mut self) -> Result<(), String> {
        self.transition(UnitStatus::Succeeded)
    }

    /// `Running -> Failed`, or `Pending -> Failed(Cancelled)` for units that never launched.
    pub fn fail(&mut self, reason: FailureReason) -> Result<(), String> {
        self.transition(UnitStatus::Failed { reason })
    }

    fn transition(&mut self, next: UnitStatus) -> Result<(), String> {
        let allowed = match (&self.status, &next) {
            (UnitStatus::Pending, UnitStatus::Skipped) => true,
            (UnitStatus::Pending, UnitStatus::Running) => true,
            (UnitStatus::Pending, UnitStatus::Failed { reason }) => {
                *reason == FailureReason::Cancelled
            }
            (UnitStatus::Running, UnitStatus::Succeeded) => true,
            (UnitStatus::Running, UnitStatus::Failed { .. }) => true,
            _ => false,
        };
        if !allowed {
            return Err(format!(
                "unit {}: illegal transition {} -> {}",
                self.id,
                self.status.label(),
                next.label()
            ));
        }
        self.status = next;
        Ok(())
    }
}
