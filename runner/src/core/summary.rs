//! Aggregate counts for a finished run.

use serde::Serialize;

use crate::core::unit::{FailureReason, UnitStatus, WorkUnit};

/// Per-status counts over every enumerated unit.
///
/// `failed` includes `cancelled`; the latter is broken out so an operator can
/// tell an interrupted run from a run with failing claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub enumerated: usize,
    pub launched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn from_units<'a>(units: impl IntoIterator<Item = &'a WorkUnit>, launched: usize) -> Self {
        let mut summary = RunSummary {
            launched,
            ..RunSummary::default()
        };
        for unit in units {
            summary.enumerated += 1;
            match &unit.status {
                UnitStatus::Succeeded => summary.succeeded += 1,
                UnitStatus::Skipped => summary.skipped += 1,
                UnitStatus::Failed { reason } => {
                    summary.failed += 1;
                    if *reason == FailureReason::Cancelled {
                        summary.cancelled += 1;
                    }
                }
                UnitStatus::Pending | UnitStatus::Running => {}
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Single-line form printed after the join barrier releases.
    pub fn line(&self) -> String {
        format!(
            "summary: launched={} succeeded={} failed={} cancelled={} skipped={}",
            self.launched, self.succeeded, self.failed, self.cancelled, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::unit::UnitId;
    use std::path::PathBuf;

    fn unit_with(id: u32, status: UnitStatus) -> WorkUnit {
        WorkUnit {
            id: UnitId(id),
            resource_path: PathBuf::from(format!("id{id}.json")),
            status,
        }
    }

    #[test]
    fn counts_each_terminal_status() {
        let units = vec![
            unit_with(1, UnitStatus::Succeeded),
            unit_with(2, UnitStatus::Skipped),
            unit_with(
                3,
                UnitStatus::Failed {
                    reason: FailureReason::Exit { code: Some(1) },
                },
            ),
            unit_with(
                4,
                UnitStatus::Failed {
                    reason: FailureReason::Cancelled,
                },
            ),
        ];

        let summary = RunSummary::from_units(&units, 3);
        assert_eq!(
            summary,
            RunSummary {
                enumerated: 4,
                launched: 3,
                succeeded: 1,
                failed: 2,
                cancelled: 1,
                skipped: 1,
            }
        );
        assert!(summary.has_failures());
        assert_eq!(
            summary.line(),
            "summary: launched=3 succeeded=1 failed=2 cancelled=1 skipped=1"
        );
    }

    #[test]
    fn empty_run_has_no_failures() {
        let summary = RunSummary::from_units(&Vec::<WorkUnit>::new(), 0);
        assert_eq!(summary, RunSummary::default());
        assert!(!summary.has_failures());
    }
}
