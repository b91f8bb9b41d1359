//! Batch claim runner.
//!
//! Runs the external claim operation once per keypair in a directory, staggering
//! launches and bounding concurrency, and reports once every claim has finished.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use claim_runner::batch::{BatchReport, prepare_batch};
use claim_runner::exit_codes;
use claim_runner::io::claim::ExternalClaim;
use claim_runner::io::config::{Overrides, RunConfig, load_run_config};
use claim_runner::logging;
use claim_runner::plan::render_plan;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "claim-runner",
    version,
    about = "Claim from every keypair in a directory, staggered and in parallel"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch one claim per credential file and wait for all of them to finish.
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Exit with a non-zero code if any claim failed.
        #[arg(long)]
        strict: bool,
    },
    /// Show which units would be launched or skipped, without running anything.
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// TOML config file. Flags override its values.
    #[arg(short = 'C', long = "config", value_name = "PATH")]
    config_file: Option<PathBuf>,
    /// Fee payer keypair [default: <keypair-dir>/id.json].
    #[arg(long, value_name = "PATH")]
    fee_payer: Option<PathBuf>,
    /// Address that receives every claimed balance.
    #[arg(long = "to", value_name = "ADDRESS")]
    to: Option<String>,
    /// RPC endpoint passed to the claim operation.
    #[arg(long, value_name = "URL")]
    rpc: Option<String>,
    /// Number of unit keypairs (`id1.json` .. `id<N>.json`).
    #[arg(long, value_name = "N")]
    count: Option<u32>,
    /// Directory holding the keypair files.
    #[arg(long, value_name = "PATH")]
    keypair_dir: Option<PathBuf>,
    /// Pause before each launch, in milliseconds.
    #[arg(long = "delay", value_name = "MS")]
    delay_ms: Option<u64>,
    /// Maximum number of claims running at once.
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,
    /// Per-claim timeout, in seconds.
    #[arg(long = "timeout", value_name = "SECS")]
    timeout_secs: Option<u64>,
    /// Claim program to invoke.
    #[arg(long, value_name = "CMD")]
    program: Option<String>,
    /// Amount to claim per unit [default: everything].
    #[arg(long)]
    amount: Option<f64>,
    /// Write per-unit logs and run.json here.
    #[arg(long, value_name = "PATH")]
    log_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(self) -> Result<RunConfig> {
        let overrides = Overrides {
            keypair_dir: self.keypair_dir,
            fee_payer: self.fee_payer,
            destination: self.to,
            rpc_url: self.rpc,
            unit_count: self.count,
            launch_delay_ms: self.delay_ms,
            max_concurrency: self.concurrency,
            child_timeout_secs: self.timeout_secs,
            program: self.program,
            amount: self.amount,
            log_dir: self.log_dir,
        };
        load_run_config(self.config_file.as_deref(), overrides)
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { config, strict } => cmd_run(config.load()?, strict).await,
        Command::Plan { config } => cmd_plan(config.load()?),
    }
}

async fn cmd_run(config: RunConfig, strict: bool) -> Result<i32> {
    let config = Arc::new(config);
    let claim = Arc::new(ExternalClaim::from_config(&config));
    let prepared = prepare_batch(config)?;
    for notice in &prepared.notices {
        eprintln!("{}", notice.warning_line());
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("interrupted: stopping in-flight claims");
                trigger.cancel();
            }
            Err(err) => warn!(%err, "cannot listen for Ctrl-C"),
        }
    });

    let report = prepared.execute(claim, cancel).await;
    println!("done");
    println!("{}", report.summary.line());
    Ok(exit_code(&report, strict))
}

fn cmd_plan(config: RunConfig) -> Result<i32> {
    let prepared = prepare_batch(Arc::new(config))?;
    for line in render_plan(&prepared) {
        println!("{line}");
    }
    Ok(exit_codes::OK)
}

fn exit_code(report: &BatchReport, strict: bool) -> i32 {
    if report.cancelled {
        exit_codes::CANCELLED
    } else if strict && report.summary.has_failures() {
        exit_codes::UNITS_FAILED
    } else {
        exit_codes::OK
    }
}
