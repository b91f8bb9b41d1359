//! Orchestration for one batch run.
//!
//! A run is split in two phases so the caller can surface skip warnings before
//! anything is launched:
//!
//! 1. [`prepare_batch`]: enumerate units and validate every credential file.
//! 2. [`PreparedBatch::execute`]: launch eligible units, wait on the join barrier,
//!    and aggregate the result.

use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::summary::RunSummary;
use crate::core::unit::WorkUnit;
use crate::io::claim::ClaimOperation;
use crate::io::config::RunConfig;
use crate::io::resources::{SkippedUnit, validate_units};
use crate::io::unit_log::{LogPaths, RunRecord, write_run_record};
use crate::launch::{LaunchRecord, launch_units};

/// Units sorted into launch-eligible and skipped, ready to run.
#[derive(Debug)]
pub struct PreparedBatch {
    pub config: Arc<RunConfig>,
    pub eligible: Vec<WorkUnit>,
    pub skipped: Vec<WorkUnit>,
    pub notices: Vec<SkippedUnit>,
}

/// Result of a finished run.
#[derive(Debug)]
pub struct BatchReport {
    /// Every enumerated unit in a terminal status, ordered by id.
    pub units: Vec<WorkUnit>,
    pub launches: Vec<LaunchRecord>,
    pub skipped: Vec<SkippedUnit>,
    pub summary: RunSummary,
    pub cancelled: bool,
    pub released_at: Instant,
}

/// Enumerate and validate. Fails only when the log directory cannot be created.
#[instrument(skip_all, fields(unit_count = config.unit_count, keypair_dir = %config.layout.base_dir().display()))]
pub fn prepare_batch(config: Arc<RunConfig>) -> Result<PreparedBatch> {
    if let Some(dir) = &config.log_dir {
        LogPaths::new(dir).ensure_dir()?;
    }

    let validated = validate_units(config.layout.enumerate(config.unit_count));
    debug!(
        eligible = validated.eligible.len(),
        skipped = validated.skipped.len(),
        "validated credentials"
    );
    Ok(PreparedBatch {
        config,
        eligible: validated.eligible,
        skipped: validated.skipped,
        notices: validated.notices,
    })
}

impl PreparedBatch {
    /// Run every eligible unit and return once all of them are terminal.
    ///
    /// Per-unit failures are recorded in the report, never returned as errors.
    pub async fn execute<C: ClaimOperation>(
        self,
        claim: Arc<C>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let started_at = Utc::now();
        let started = Instant::now();
        info!(eligible = self.eligible.len(), skipped = self.skipped.len(), "starting batch");

        let launched = launch_units(self.eligible, self.config.clone(), claim, &cancel).await;
        let launches = launched.launches;
        let joined = launched.barrier.join().await;

        let mut units = joined.units;
        units.extend(launched.not_launched);
        units.extend(self.skipped);
        units.sort_by_key(|unit| unit.id);

        let summary = RunSummary::from_units(&units, launches.len());
        let cancelled = cancel.is_cancelled();
        info!(
            launched = summary.launched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled,
            "batch finished"
        );

        let report = BatchReport {
            units,
            launches,
            skipped: self.notices,
            summary,
            cancelled,
            released_at: joined.released_at,
        };

        if let Some(dir) = &self.config.log_dir {
            let record = RunRecord {
                started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                ended_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                duration_ms: started.elapsed().as_millis() as u64,
                destination: &self.config.destination,
                rpc_url: &self.config.rpc_url,
                unit_count: self.config.unit_count,
                cancelled,
                summary,
                units: &report.units,
                skipped: &report.skipped,
            };
            if let Err(err) = write_run_record(&LogPaths::new(dir), &record) {
                warn!(err = %format!("{err:#}"), "failed to write run record");
            }
        }

        report
    }
}

/// Convenience wrapper: prepare, then execute.
pub async fn run_batch<C: ClaimOperation>(
    config: Arc<RunConfig>,
    claim: Arc<C>,
    cancel: CancellationToken,
) -> Result<BatchReport> {
    let prepared = prepare_batch(config)?;
    Ok(prepared.execute(claim, cancel).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::unit::UnitStatus;
    use crate::test_support::{KeypairDir, ScriptedClaim};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn skipped_and_launched_units_are_reported_together() {
        let keys = KeypairDir::with_units(&[2]).expect("keys");
        let config = Arc::new(keys.config(3));
        let claim = Arc::new(ScriptedClaim::succeed_after(Duration::from_millis(100)));

        let report = run_batch(config, claim, CancellationToken::new())
            .await
            .expect("run");

        let statuses: Vec<(u32, UnitStatus)> = report
            .units
            .iter()
            .map(|u| (u.id.0, u.status.clone()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (1, UnitStatus::Skipped),
                (2, UnitStatus::Succeeded),
                (3, UnitStatus::Skipped),
            ]
        );
        assert_eq!(report.summary.launched, 1);
        assert_eq!(report.summary.skipped, 2);
        assert!(!report.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn log_dir_receives_unit_logs_and_run_record() {
        let keys = KeypairDir::with_units(&[1]).expect("keys");
        let logs = keys.path().join("logs");
        let mut config = keys.config(1);
        config.log_dir = Some(logs.clone());
        let claim = Arc::new(ScriptedClaim::succeed_after(Duration::from_millis(10)));

        run_batch(Arc::new(config), claim, CancellationToken::new())
            .await
            .expect("run");

        let unit_log = std::fs::read_to_string(logs.join("unit-1.log")).expect("unit log");
        assert!(unit_log.contains("scripted claim for unit 1"));
        let record: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(logs.join("run.json")).expect("record"))
                .expect("json");
        assert_eq!(record["summary"]["succeeded"], 1);
        assert_eq!(record["cancelled"], false);
    }
}
