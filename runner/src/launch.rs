//! Staggered, bounded launching of unit tasks.
//!
//! Launches happen one at a time in enumeration order. Before each launch the
//! launcher waits for a free slot in the worker pool and then for the configured
//! inter-launch delay; the delay throttles how fast new children start, it does
//! not limit how long a child may run. Launched children run concurrently with
//! later launches and with each other.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::barrier::JoinBarrier;
use crate::core::unit::{FailureReason, UnitId, WorkUnit};
use crate::io::claim::{ChildInvocation, ClaimOperation};
use crate::io::config::RunConfig;
use crate::io::unit_log::{LogPaths, write_unit_log};

/// When a unit's task was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRecord {
    pub id: UnitId,
    pub launched_at: Instant,
}

/// Launcher output: the barrier to wait on, launch order, and units that were
/// never launched. Those are `Failed(Cancelled)` when the run was cancelled, or
/// keep their status when they were not `Pending` to begin with.
pub struct Launched {
    pub barrier: JoinBarrier,
    pub launches: Vec<LaunchRecord>,
    pub not_launched: Vec<WorkUnit>,
}

/// Launch one task per eligible unit.
///
/// `eligible` must contain only `Pending` units, in enumeration order.
#[instrument(skip_all, fields(units = eligible.len(), max_concurrency = config.max_concurrency))]
pub async fn launch_units<C: ClaimOperation>(
    eligible: Vec<WorkUnit>,
    config: Arc<RunConfig>,
    claim: Arc<C>,
    cancel: &CancellationToken,
) -> Launched {
    let slots = Arc::new(Semaphore::new(config.max_concurrency));
    let log_paths = config.log_dir.as_deref().map(LogPaths::new).map(Arc::new);
    let mut barrier = JoinBarrier::new();
    let mut launches = Vec::with_capacity(eligible.len());
    let mut not_launched = Vec::new();
    let mut rejected = Vec::new();

    let mut queue = eligible.into_iter();
    while let Some(mut unit) = queue.next() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = slots.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            not_launched.push(unit);
            break;
        };

        let delayed = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(config.launch_delay) => true,
        };
        if !delayed {
            not_launched.push(unit);
            break;
        }

        if let Err(err) = unit.start() {
            warn!(unit = %unit.id, %err, "unit not launchable");
            rejected.push(unit);
            continue;
        }
        let launched_at = Instant::now();
        info!(unit = %unit.id, in_flight = barrier.len() + 1, "launching claim");
        launches.push(LaunchRecord {
            id: unit.id,
            launched_at,
        });

        let id = unit.id;
        let path = unit.resource_path.clone();
        let config = config.clone();
        let claim = claim.clone();
        let cancel = cancel.clone();
        let log_paths = log_paths.clone();
        barrier.spawn(id, path, async move {
            // Hold the pool slot until the child is done.
            let _permit = permit;
            run_unit(unit, &config, claim.as_ref(), &cancel, log_paths.as_deref()).await
        });
    }

    not_launched.extend(queue);
    for unit in &mut not_launched {
        if let Err(err) = unit.fail(FailureReason::Cancelled) {
            warn!(%err, "could not mark unlaunched unit cancelled");
        }
    }
    if !not_launched.is_empty() {
        warn!(count = not_launched.len(), "run cancelled before all units launched");
    }
    not_launched.extend(rejected);

    Launched {
        barrier,
        launches,
        not_launched,
    }
}

/// Drive one running unit to a terminal status.
async fn run_unit<C: ClaimOperation>(
    mut unit: WorkUnit,
    config: &RunConfig,
    claim: &C,
    cancel: &CancellationToken,
    log_paths: Option<&LogPaths>,
) -> WorkUnit {
    let invocation = ChildInvocation::for_unit(&unit, config);
    let outcome = claim.claim(&invocation, cancel).await;

    if let Some(paths) = log_paths {
        let contents = match (&outcome.transcript, &outcome.result) {
            (Some(transcript), _) => transcript.clone(),
            (None, Err(reason)) => format!("=== no output ===\n{reason}\n"),
            (None, Ok(())) => String::new(),
        };
        if let Err(err) = write_unit_log(paths, unit.id, &contents) {
            warn!(unit = %unit.id, err = %format!("{err:#}"), "failed to write unit log");
        }
    }

    let transition = match outcome.result {
        Ok(()) => {
            info!(unit = %unit.id, "claim succeeded");
            unit.succeed()
        }
        Err(reason) => {
            warn!(unit = %unit.id, %reason, "claim failed");
            unit.fail(reason)
        }
    };
    if let Err(err) = transition {
        warn!(%err, "unexpected unit status after claim");
    }
    unit
}
