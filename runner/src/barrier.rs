//! Join barrier over launched unit tasks.
//!
//! Every launched unit runs as one task in a [`JoinSet`]; each task hands its
//! `WorkUnit` back with a terminal status. [`JoinBarrier::join`] returns only once
//! every task has finished, so the caller can report completion exactly once.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::core::unit::{FailureReason, UnitId, UnitStatus, WorkUnit};

#[derive(Default)]
pub struct JoinBarrier {
    tasks: JoinSet<WorkUnit>,
    // Lets a panicked task still be attributed to its unit.
    in_flight: HashMap<Id, (UnitId, PathBuf)>,
}

/// All launched units in terminal state, ordered by id.
#[derive(Debug)]
pub struct Joined {
    pub units: Vec<WorkUnit>,
    pub released_at: Instant,
}

impl JoinBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` for `unit_id`. The task must resolve to that unit in a terminal status.
    pub fn spawn<F>(&mut self, unit_id: UnitId, resource_path: PathBuf, task: F)
    where
        F: Future<Output = WorkUnit> + Send + 'static,
    {
        let handle = self.tasks.spawn(task);
        self.in_flight.insert(handle.id(), (unit_id, resource_path));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every spawned task. No timeout: per-child timeouts and the run's
    /// cancellation token bound how long this can take.
    pub async fn join(mut self) -> Joined {
        let mut units = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next_with_id().await {
            match joined {
                Ok((id, unit)) => {
                    self.in_flight.remove(&id);
                    debug!(unit = %unit.id, remaining = self.tasks.len(), "unit task finished");
                    units.push(unit);
                }
                Err(err) => {
                    let Some((unit_id, path)) = self.in_flight.remove(&err.id()) else {
                        error!(%err, "unattributed unit task failure");
                        continue;
                    };
                    let reason = if err.is_panic() {
                        FailureReason::Panicked {
                            message: panic_message(err.into_panic()),
                        }
                    } else {
                        FailureReason::Cancelled
                    };
                    error!(unit = %unit_id, %reason, "unit task did not complete");
                    units.push(WorkUnit {
                        id: unit_id,
                        resource_path: path,
                        status: UnitStatus::Failed { reason },
                    });
                }
            }
        }
        units.sort_by_key(|unit| unit.id);
        Joined {
            units,
            released_at: Instant::now(),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
