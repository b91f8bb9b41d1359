//! Run configuration: TOML file, command-line overrides, and the resolved
//! immutable [`RunConfig`] shared by every task of a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::enumerate::UnitLayout;

pub const DEFAULT_RPC_URL: &str = "https://eclipse.helius-rpc.com/";

/// Upper bound on `claim.confirm_reply`. The answer is a prompt reply, not a payload.
pub const MAX_CONFIRM_REPLY_BYTES: usize = 64;

/// Configuration file (TOML).
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    /// Directory holding `id1.json`, `id2.json`, ... and the fee payer's `id.json`.
    pub keypair_dir: PathBuf,

    /// Fee payer keypair. Defaults to `{keypair_dir}/id.json`.
    pub fee_payer: Option<PathBuf>,

    /// Address that receives every claimed balance.
    pub destination: Option<String>,

    pub rpc_url: String,

    /// Number of unit keypairs to enumerate (`id1.json` through `id{count}.json`).
    pub unit_count: u32,

    /// Pause before each launch, in milliseconds.
    pub launch_delay_ms: u64,

    /// Maximum number of claim operations running at once.
    pub max_concurrency: usize,

    /// Per-child wall-clock budget in seconds.
    pub child_timeout_secs: u64,

    pub claim: ClaimSection,

    /// Truncate per-unit stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// When set, per-unit logs and `run.json` are written here.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClaimSection {
    /// External program implementing the claim operation.
    pub program: String,

    /// Leading arguments placed before the per-unit flags (e.g. the `claim` subcommand).
    pub args: Vec<String>,

    /// Written to the child's stdin to answer its confirmation prompt.
    pub confirm_reply: String,

    /// Optional amount forwarded as `--amount`; claims everything when unset.
    pub amount: Option<f64>,
}

impl Default for ClaimSection {
    fn default() -> Self {
        Self {
            program: "bitz".to_string(),
            args: vec!["claim".to_string()],
            confirm_reply: "Y\n".to_string(),
            amount: None,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            keypair_dir: PathBuf::from("keys"),
            fee_payer: None,
            destination: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            unit_count: 0,
            launch_delay_ms: 1_000,
            max_concurrency: 16,
            child_timeout_secs: 30,
            claim: ClaimSection::default(),
            output_limit_bytes: 100_000,
            log_dir: None,
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub keypair_dir: Option<PathBuf>,
    pub fee_payer: Option<PathBuf>,
    pub destination: Option<String>,
    pub rpc_url: Option<String>,
    pub unit_count: Option<u32>,
    pub launch_delay_ms: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub child_timeout_secs: Option<u64>,
    pub program: Option<String>,
    pub amount: Option<f64>,
    pub log_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(dir) = overrides.keypair_dir {
            self.keypair_dir = dir;
        }
        if overrides.fee_payer.is_some() {
            self.fee_payer = overrides.fee_payer;
        }
        if overrides.destination.is_some() {
            self.destination = overrides.destination;
        }
        if let Some(url) = overrides.rpc_url {
            self.rpc_url = url;
        }
        if let Some(count) = overrides.unit_count {
            self.unit_count = count;
        }
        if let Some(delay) = overrides.launch_delay_ms {
            self.launch_delay_ms = delay;
        }
        if let Some(limit) = overrides.max_concurrency {
            self.max_concurrency = limit;
        }
        if let Some(timeout) = overrides.child_timeout_secs {
            self.child_timeout_secs = timeout;
        }
        if let Some(program) = overrides.program {
            self.claim.program = program;
        }
        if overrides.amount.is_some() {
            self.claim.amount = overrides.amount;
        }
        if overrides.log_dir.is_some() {
            self.log_dir = overrides.log_dir;
        }
        self
    }

    /// Check the merged values and freeze them into a [`RunConfig`].
    pub fn resolve(self) -> Result<RunConfig> {
        let destination = self
            .destination
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| anyhow!("destination address is required (--to or `destination`)"))?;
        if self.rpc_url.trim().is_empty() {
            return Err(anyhow!("rpc_url must be non-empty"));
        }
        if self.max_concurrency == 0 {
            return Err(anyhow!("max_concurrency must be > 0"));
        }
        if self.child_timeout_secs == 0 {
            return Err(anyhow!("child_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.claim.program.trim().is_empty() {
            return Err(anyhow!("claim.program must be non-empty"));
        }
        if self.claim.confirm_reply.is_empty() {
            return Err(anyhow!("claim.confirm_reply must be non-empty"));
        }
        if self.claim.confirm_reply.len() > MAX_CONFIRM_REPLY_BYTES {
            return Err(anyhow!(
                "claim.confirm_reply is {} bytes, at most {MAX_CONFIRM_REPLY_BYTES} allowed",
                self.claim.confirm_reply.len()
            ));
        }
        if let Some(amount) = self.claim.amount
            && !(amount.is_finite() && amount > 0.0)
        {
            return Err(anyhow!("claim.amount must be a positive number, got {amount}"));
        }

        let layout = UnitLayout::new(self.keypair_dir);
        let fee_payer_path = self
            .fee_payer
            .unwrap_or_else(|| layout.fee_payer_default());

        Ok(RunConfig {
            layout,
            fee_payer_path,
            destination,
            rpc_url: self.rpc_url,
            unit_count: self.unit_count,
            launch_delay: Duration::from_millis(self.launch_delay_ms),
            max_concurrency: self.max_concurrency,
            child_timeout: Duration::from_secs(self.child_timeout_secs),
            claim_program: self.claim.program,
            claim_args: self.claim.args,
            confirm_reply: self.claim.confirm_reply,
            amount: self.claim.amount,
            output_limit_bytes: self.output_limit_bytes,
            log_dir: self.log_dir,
        })
    }
}

/// Immutable configuration for one run. Shared read-only by all tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub layout: UnitLayout,
    pub fee_payer_path: PathBuf,
    pub destination: String,
    pub rpc_url: String,
    pub unit_count: u32,
    pub launch_delay: Duration,
    pub max_concurrency: usize,
    pub child_timeout: Duration,
    pub claim_program: String,
    pub claim_args: Vec<String>,
    pub confirm_reply: String,
    pub amount: Option<f64>,
    pub output_limit_bytes: usize,
    pub log_dir: Option<PathBuf>,
}

/// Load a config file from TOML.
///
/// If `path` is `None`, returns `ConfigFile::default()`. A path that was given
/// must exist.
pub fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConfigFile =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Load the file (if any), apply overrides, validate.
pub fn load_run_config(path: Option<&Path>, overrides: Overrides) -> Result<RunConfig> {
    load_config_file(path)?
        .apply(overrides)
        .resolve()
        .context("invalid run configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_destination() -> ConfigFile {
        ConfigFile {
            destination: Some("Dest1111".to_string()),
            ..ConfigFile::default()
        }
    }

    #[test]
    fn no_path_returns_default() {
        assert_eq!(load_config_file(None).expect("load"), ConfigFile::default());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("missing.toml");
        let err = load_run_config(
            Some(&path),
            Overrides {
                destination: Some("Dest".to_string()),
                ..Overrides::default()
            },
        )
        .expect_err("missing config file");
        assert!(format!("{err:#}").contains("missing.toml"), "{err:#}");
    }

    #[test]
    fn file_values_then_overrides_take_precedence() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("claim.toml");
        fs::write(
            &path,
            r#"
keypair_dir = "/srv/keys"
destination = "FromFile"
unit_count = 5
launch_delay_ms = 250

[claim]
program = "ore"
"#,
        )
        .expect("write config");

        let cfg = load_run_config(
            Some(&path),
            Overrides {
                unit_count: Some(2),
                ..Overrides::default()
            },
        )
        .expect("resolve");

        assert_eq!(cfg.unit_count, 2);
        assert_eq!(cfg.destination, "FromFile");
        assert_eq!(cfg.launch_delay, Duration::from_millis(250));
        assert_eq!(cfg.claim_program, "ore");
        assert_eq!(cfg.claim_args, vec!["claim".to_string()]);
        assert_eq!(cfg.fee_payer_path, PathBuf::from("/srv/keys/id.json"));
        assert_eq!(cfg.rpc_url, DEFAULT_RPC_URL);
    }

    #[test]
    fn missing_destination_is_rejected() {
        let err = ConfigFile::default().resolve().expect_err("no destination");
        assert!(err.to_string().contains("destination"), "{err:#}");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cfg = ConfigFile {
            max_concurrency: 0,
            ..with_destination()
        };
        let err = cfg.resolve().expect_err("zero concurrency");
        assert!(err.to_string().contains("max_concurrency"), "{err:#}");
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let mut cfg = with_destination();
        cfg.claim.amount = Some(0.0);
        assert!(cfg.resolve().is_err());
    }

    #[test]
    fn confirm_reply_must_be_short_and_non_empty() {
        let mut cfg = with_destination();
        cfg.claim.confirm_reply = String::new();
        assert!(cfg.resolve().is_err());

        let mut cfg = with_destination();
        cfg.claim.confirm_reply = "Y".repeat(MAX_CONFIRM_REPLY_BYTES + 1);
        let err = cfg.resolve().expect_err("oversized reply");
        assert!(err.to_string().contains("confirm_reply"), "{err:#}");
    }

    #[test]
    fn explicit_fee_payer_wins_over_layout_default() {
        let cfg = with_destination()
            .apply(Overrides {
                fee_payer: Some(PathBuf::from("/secure/payer.json")),
                ..Overrides::default()
            })
            .resolve()
            .expect("resolve");
        assert_eq!(cfg.fee_payer_path, PathBuf::from("/secure/payer.json"));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("claim.toml");
        fs::write(&path, "unit_count = \"three\"\n").expect("write");
        let err = load_config_file(Some(&path)).expect_err("bad toml");
        assert!(format!("{err:#}").contains("parse"), "{err:#}");
    }
}
