use std::{fs::File, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use ledger_node::{
    bin_utils::{ScriptError, Service, init_tracing},
    config::{FailurePolicy, LedgerConfig, ReplayMode},
    ledger::Ledger,
    storage::{LedgerStorage, file::FileStorage, in_memory::InMemoryStorage},
};
use rand::Rng;
use tracing::{info, warn};

/// Runs a ledger operation script against one node and prints the accounts.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// CSV script with `op,account,target,amount` columns.
    script: PathBuf,

    /// Directory for the CSV ledger files. In-memory when omitted.
    #[arg(long, env = "LEDGER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Node number used in the leader label. Random in 1000..=9999 when omitted.
    #[arg(long, env = "LEDGER_NODE_ID")]
    node_id: Option<u32>,

    /// Simulated latency before each transfer checks balances.
    #[arg(long, env = "LEDGER_TRANSFER_DELAY_MS", default_value_t = 0)]
    transfer_delay_ms: u64,

    #[arg(long, value_enum, default_value_t = FailurePolicy::TransfersOnly)]
    failure_policy: FailurePolicy,

    #[arg(long, value_enum, default_value_t = ReplayMode::Literal)]
    replay_mode: ReplayMode,

    /// Refuse transfers while following with no known leader.
    #[arg(long)]
    require_leader: bool,

    /// Print the transfer log after the accounts.
    #[arg(long)]
    logs: bool,
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        let node_id = self
            .node_id
            .unwrap_or_else(|| rand::thread_rng().gen_range(1000..=9999));
        LedgerConfig {
            failure_policy: self.failure_policy,
            replay_mode: self.replay_mode,
            require_leader_for_transfer: self.require_leader,
            ..LedgerConfig::with_node_id(node_id)
        }
        .with_transfer_delay(Duration::from_millis(self.transfer_delay_ms))
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = args.ledger_config();
    info!(?config, "starting ledger node");

    match &args.data_dir {
        Some(dir) => {
            let storage = FileStorage::open(dir)
                .with_context(|| format!("Failed to open ledger in `{}`", dir.display()))?;
            run(&args, Ledger::new(storage, config))
        }
        None => run(&args, Ledger::new(InMemoryStorage::new(), config)),
    }
}

fn run<S: LedgerStorage>(args: &Args, ledger: Ledger<S>) -> Result<()> {
    let file = File::open(&args.script)
        .with_context(|| format!("Failed to open `{}`", args.script.display()))?;

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        ledger,
        print_logs: args.logs,
        error_printer: Box::new(|line, err| match err {
            ScriptError::Row(err) => warn!(line, %err, "skipping malformed row"),
            // the ledger already traced the rejection, this is the user-facing message
            ScriptError::Ledger(err) => eprintln!("Error at line {line}: {err}"),
        }),
    };
    service.run()
}
