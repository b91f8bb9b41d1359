//! Test-only helpers: keypair directories and a scripted claim operation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::enumerate::UnitLayout;
use crate::core::unit::{FailureReason, UnitId};
use crate::io::claim::{ChildInvocation, ClaimOperation, ClaimOutcome};
use crate::io::config::RunConfig;

/// Deterministic configuration rooted at `keypair_dir`, with a short launch delay.
pub fn test_config(keypair_dir: PathBuf, unit_count: u32) -> RunConfig {
    let layout = UnitLayout::new(keypair_dir);
    RunConfig {
        fee_payer_path: layout.fee_payer_default(),
        layout,
        destination: "DestinationAddress1111".to_string(),
        rpc_url: "http://127.0.0.1:8899".to_string(),
        unit_count,
        launch_delay: Duration::from_millis(10),
        max_concurrency: 8,
        child_timeout: Duration::from_secs(30),
        claim_program: "bitz".to_string(),
        claim_args: vec!["claim".to_string()],
        confirm_reply: "Y\n".to_string(),
        amount: None,
        output_limit_bytes: 10_000,
        log_dir: None,
    }
}

/// Temporary keypair directory holding `id.json` and a chosen set of `id{N}.json`.
pub struct KeypairDir {
    dir: tempfile::TempDir,
}

impl KeypairDir {
    pub fn with_units(ids: &[u32]) -> Result<Self> {
        let dir = tempfile::tempdir().context("create keypair tempdir")?;
        let keys = Self { dir };
        fs::write(keys.path().join("id.json"), "[0]").context("write fee payer")?;
        for &id in ids {
            keys.write_unit(id)?;
        }
        Ok(keys)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_unit(&self, id: u32) -> Result<PathBuf> {
        let path = self.path().join(format!("id{id}.json"));
        fs::write(&path, format!("[{id}]")).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn config(&self, unit_count: u32) -> RunConfig {
        test_config(self.path().to_path_buf(), unit_count)
    }
}

/// Scripted behaviour of one claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub duration: Duration,
    pub result: Result<(), FailureReason>,
}

/// Claim operation that sleeps and returns a scripted result instead of spawning a process.
///
/// Honors cancellation like the real operation and records what it was asked to do.
pub struct ScriptedClaim {
    default: Script,
    per_unit: HashMap<UnitId, Script>,
    invocations: Mutex<Vec<ChildInvocation>>,
    finishes: Mutex<Vec<(UnitId, Instant)>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl ScriptedClaim {
    pub fn new(default: Script) -> Self {
        Self {
            default,
            per_unit: HashMap::new(),
            invocations: Mutex::new(Vec::new()),
            finishes: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn succeed_after(duration: Duration) -> Self {
        Self::new(Script {
            duration,
            result: Ok(()),
        })
    }

    pub fn with_unit(mut self, id: u32, script: Script) -> Self {
        self.per_unit.insert(UnitId(id), script);
        self
    }

    pub fn invocations(&self) -> Vec<ChildInvocation> {
        self.invocations
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// `(unit, time the claim returned)` in completion order.
    pub fn finishes(&self) -> Vec<(UnitId, Instant)> {
        self.finishes
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl ClaimOperation for ScriptedClaim {
    async fn claim(
        &self,
        invocation: &ChildInvocation,
        cancel: &CancellationToken,
    ) -> ClaimOutcome {
        if let Ok(mut guard) = self.invocations.lock() {
            guard.push(invocation.clone());
        }
        let script = self
            .per_unit
            .get(&invocation.unit_id)
            .unwrap_or(&self.default)
            .clone();

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(FailureReason::Cancelled),
            _ = tokio::time::sleep(script.duration) => script.result,
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.finishes.lock() {
            guard.push((invocation.unit_id, Instant::now()));
        }

        // A child that never started has nothing to show.
        let transcript = match &result {
            Err(FailureReason::Spawn { .. }) => None,
            _ => Some(format!(
                "scripted claim for unit {}: {:?}\n",
                invocation.unit_id, result
            )),
        };
        ClaimOutcome { transcript, result }
    }
}
