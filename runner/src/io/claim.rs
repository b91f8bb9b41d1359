//! Claim operation abstraction.
//!
//! The [`ClaimOperation`] trait decouples the launcher from the actual claim
//! backend (an external CLI). Tests use scripted operations that return
//! predetermined outcomes without spawning processes.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::unit::{FailureReason, UnitId, WorkUnit};
use crate::io::config::RunConfig;
use crate::io::process::{CommandOutput, Termination, run_command};

/// One launch of the external claim operation for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildInvocation {
    pub unit_id: UnitId,
    pub program: String,
    /// Full argument list, in order, excluding the program itself.
    pub args: Vec<String>,
    /// Bytes written to the child's stdin to answer its confirmation prompt.
    pub stdin_reply: String,
}

impl ChildInvocation {
    /// `<program> <claim_args..> --keypair <unit> --fee-payer <payer> --to <dest> --rpc <url> [--amount <n>]`
    pub fn for_unit(unit: &WorkUnit, config: &RunConfig) -> Self {
        let mut args = config.claim_args.clone();
        args.extend([
            "--keypair".to_string(),
            path_arg(&unit.resource_path),
            "--fee-payer".to_string(),
            path_arg(&config.fee_payer_path),
            "--to".to_string(),
            config.destination.clone(),
            "--rpc".to_string(),
            config.rpc_url.clone(),
        ]);
        if let Some(amount) = config.amount {
            args.push("--amount".to_string());
            args.push(amount.to_string());
        }
        Self {
            unit_id: unit.id,
            program: config.claim_program.clone(),
            args,
            stdin_reply: config.confirm_reply.clone(),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Result of one claim: success or the reason it failed, plus an optional
/// transcript of the child's output for the unit log.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimOutcome {
    pub result: Result<(), FailureReason>,
    pub transcript: Option<String>,
}

/// Abstraction over claim backends.
pub trait ClaimOperation: Send + Sync + 'static {
    /// Run the claim described by `invocation` to completion.
    ///
    /// Must return promptly once `cancel` fires, reporting `FailureReason::Cancelled`.
    fn claim(
        &self,
        invocation: &ChildInvocation,
        cancel: &CancellationToken,
    ) -> impl Future<Output = ClaimOutcome> + Send;
}

/// Claim operation that spawns the configured external program.
#[derive(Debug, Clone)]
pub struct ExternalClaim {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ExternalClaim {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            timeout: config.child_timeout,
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl ClaimOperation for ExternalClaim {
    #[instrument(skip_all, fields(unit = %invocation.unit_id, program = %invocation.program))]
    async fn claim(
        &self,
        invocation: &ChildInvocation,
        cancel: &CancellationToken,
    ) -> ClaimOutcome {
        info!("starting claim");
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        let output = match run_command(
            cmd,
            Some(invocation.stdin_reply.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
            cancel,
        )
        .await
        {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "claim could not run");
                return ClaimOutcome {
                    result: Err(FailureReason::Spawn {
                        message: format!("{err:#}"),
                    }),
                    transcript: None,
                };
            }
        };

        let result = match output.termination {
            Termination::Exited(status) if status.success() => Ok(()),
            Termination::Exited(status) => Err(FailureReason::Exit {
                code: status.code(),
            }),
            Termination::TimedOut => Err(FailureReason::TimedOut),
            Termination::Cancelled => Err(FailureReason::Cancelled),
        };
        match &result {
            Ok(()) => debug!("claim completed successfully"),
            Err(reason) => warn!(%reason, "claim failed"),
        }

        ClaimOutcome {
            result,
            transcript: Some(format_transcript(invocation, &output)),
        }
    }
}

/// Render child output the way it is stored in the unit log.
pub fn format_transcript(invocation: &ChildInvocation, output: &CommandOutput) -> String {
    let mut buf = String::new();
    buf.push_str("=== command ===\n");
    buf.push_str(&invocation.program);
    for arg in &invocation.args {
        buf.push(' ');
        buf.push_str(arg);
    }
    buf.push_str("\n=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice("claim"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice("claim"));
    match output.termination {
        Termination::Exited(status) => {
            buf.push_str(&format!("\n[exit status {:?}]\n", status.code()));
        }
        Termination::TimedOut => buf.push_str("\n[claim timed out]\n"),
        Termination::Cancelled => buf.push_str("\n[claim cancelled]\n"),
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ConfigFile;
    use std::path::PathBuf;

    fn config() -> RunConfig {
        ConfigFile {
            keypair_dir: PathBuf::from("/keys"),
            destination: Some("DestAddr".to_string()),
            rpc_url: "http://rpc.local".to_string(),
            ..ConfigFile::default()
        }
        .resolve()
        .expect("config")
    }

    #[test]
    fn invocation_carries_fixed_argument_set() {
        let config = config();
        let unit = WorkUnit::new(UnitId(4), config.layout.resource_path(UnitId(4)));
        let invocation = ChildInvocation::for_unit(&unit, &config);

        assert_eq!(invocation.program, "bitz");
        assert_eq!(
            invocation.args,
            vec![
                "claim",
                "--keypair",
                "/keys/id4.json",
                "--fee-payer",
                "/keys/id.json",
                "--to",
                "DestAddr",
                "--rpc",
                "http://rpc.local",
            ]
        );
        assert_eq!(invocation.stdin_reply, "Y\n");
    }

    #[test]
    fn amount_is_forwarded_when_configured() {
        let mut config = config();
        config.amount = Some(1.5);
        let unit = WorkUnit::new(UnitId(1), config.layout.resource_path(UnitId(1)));
        let invocation = ChildInvocation::for_unit(&unit, &config);
        assert_eq!(&invocation.args[invocation.args.len() - 2..], ["--amount", "1.5"]);
    }

    #[cfg(unix)]
    mod external {
        use super::*;

        fn sh_invocation(script: &str) -> ChildInvocation {
            ChildInvocation {
                unit_id: UnitId(1),
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                stdin_reply: "Y\n".to_string(),
            }
        }

        fn claim() -> ExternalClaim {
            ExternalClaim {
                timeout: Duration::from_secs(10),
                output_limit_bytes: 10_000,
            }
        }

        #[tokio::test]
        async fn confirmed_claim_succeeds() {
            let outcome = claim()
                .claim(
                    &sh_invocation("read answer; [ \"$answer\" = Y ] && echo claimed"),
                    &CancellationToken::new(),
                )
                .await;
            assert_eq!(outcome.result, Ok(()));
            let transcript = outcome.transcript.expect("transcript");
            assert!(transcript.contains("claimed"), "{transcript}");
            assert!(transcript.contains("[exit status Some(0)]"), "{transcript}");
        }

        #[tokio::test]
        async fn failing_claim_reports_exit_code() {
            let outcome = claim()
                .claim(&sh_invocation("exit 3"), &CancellationToken::new())
                .await;
            assert_eq!(outcome.result, Err(FailureReason::Exit { code: Some(3) }));
        }

        #[tokio::test]
        async fn unknown_program_is_a_spawn_failure() {
            let mut invocation = sh_invocation("true");
            invocation.program = "no-such-claim-program".to_string();
            let outcome = claim()
                .claim(&invocation, &CancellationToken::new())
                .await;
            assert!(matches!(outcome.result, Err(FailureReason::Spawn { .. })));
            assert!(outcome.transcript.is_none());
        }
    }
}
