use std::{fmt, sync::Arc, time::Duration};

use clap::ValueEnum;

/// Which balance-changing operations a failed node refuses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Only transfers are refused, deposits and withdrawals still go through.
    #[default]
    TransfersOnly,
    /// Transfers, deposits and withdrawals are all refused.
    AllBalanceChanges,
}

/// What `recover` does with the transfer log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplayMode {
    /// Re-applies every completed entry on top of the current balances.
    /// Running it twice applies every transfer twice more.
    #[default]
    Literal,
    /// Re-applies only entries newer than the stored checkpoint.
    Idempotent,
    /// Resets the node label and leaves balances alone.
    StateOnly,
}

/// Runs inside the ledger lock before a transfer reads balances.
pub trait TransferLatency: Send + Sync {
    fn pause(&self);
}

/// Blocks the calling thread for a fixed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl TransferLatency for FixedDelay {
    fn pause(&self) {
        if !self.0.is_zero() {
            std::thread::sleep(self.0);
        }
    }
}

impl<F> TransferLatency for F
where
    F: Fn() + Send + Sync,
{
    fn pause(&self) {
        self()
    }
}

#[derive(Clone)]
pub struct LedgerConfig {
    /// Label this node records when it elects itself, e.g. `Node-5000`.
    pub node_label: String,
    pub failure_policy: FailurePolicy,
    pub replay_mode: ReplayMode,
    /// Refuse transfers while following with no known leader.
    pub require_leader_for_transfer: bool,
    pub transfer_latency: Arc<dyn TransferLatency>,
}

impl LedgerConfig {
    pub fn with_node_id(node_id: u32) -> Self {
        Self {
            node_label: format!("Node-{node_id}"),
            ..Default::default()
        }
    }

    pub fn with_transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_latency = Arc::new(FixedDelay(delay));
        self
    }

    pub fn with_transfer_latency(mut self, latency: impl TransferLatency + 'static) -> Self {
        self.transfer_latency = Arc::new(latency);
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_label: "Node-0".to_string(),
            failure_policy: FailurePolicy::default(),
            replay_mode: ReplayMode::default(),
            require_leader_for_transfer: false,
            transfer_latency: Arc::new(FixedDelay(Duration::ZERO)),
        }
    }
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("node_label", &self.node_label)
            .field("failure_policy", &self.failure_policy)
            .field("replay_mode", &self.replay_mode)
            .field(
                "require_leader_for_transfer",
                &self.require_leader_for_transfer,
            )
            .finish_non_exhaustive()
    }
}
