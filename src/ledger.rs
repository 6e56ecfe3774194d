use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    account::{Account, AccountError, AccountId, Amount},
    command::{
        BalanceAction, BalanceCommand, CommandError, CreateAccountCommand, LedgerCommand,
        TransferCommand,
    },
    config::{FailurePolicy, LedgerConfig, ReplayMode},
    log::{LogEntry, LogId, PendingLogEntry},
    node::{ElectionOutcome, GateError, NodeState, NodeStatus},
    storage::{Commit, LedgerStorage, StorageError, in_memory::InMemoryStorage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    Unavailable,
    Internal,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] CommandError),
    #[error("Balance of `{account}` would overflow")]
    BalanceOverflow { account: AccountId },
    #[error("Account `{account}` not found")]
    NotFound { account: AccountId },
    #[error("Insufficient funds or account not found: `{account}`")]
    InsufficientFunds { account: AccountId },
    #[error(transparent)]
    Unavailable(#[from] GateError),
    #[error("Internal error: {0}")]
    Internal(#[from] StorageError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) | LedgerError::BalanceOverflow { .. } => {
                ErrorKind::Validation
            }
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::Unavailable(_) => ErrorKind::Unavailable,
            LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Errors caused by the request or the node label, as opposed to storage failures.
    pub fn is_business(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    fn from_account(account: &str, err: AccountError) -> Self {
        match err {
            AccountError::InsufficientFunds { .. } => LedgerError::InsufficientFunds {
                account: account.to_string(),
            },
            AccountError::BalanceOverflow { account } => LedgerError::BalanceOverflow { account },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub mode: ReplayMode,
    /// Number of log entries whose deltas were applied again.
    pub replayed: usize,
    /// Checkpoint in effect when recovery started.
    pub from_checkpoint: LogId,
    pub skipped_accounts: Vec<AccountId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    Transferred(LogEntry),
    Recovered(RecoveryReport),
    Election(ElectionOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gated {
    Transfer,
    BalanceChange,
}

/// Handle to one node's ledger.
///
/// Every balance mutation runs under a single ledger-wide lock, no matter
/// which accounts it touches. Reads skip that lock and see the last
/// committed state, so they never wait behind a slow transfer. Node label
/// changes skip it too.
pub struct Ledger<S> {
    storage: S,
    config: LedgerConfig,
    node: RwLock<NodeState>,
    writes: Mutex<()>,
}

impl Ledger<InMemoryStorage> {
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(InMemoryStorage::new(), config)
    }
}

impl<S> Ledger<S>
where
    S: LedgerStorage,
{
    pub fn new(storage: S, config: LedgerConfig) -> Self {
        let node = NodeState::new(config.node_label.clone());
        Self {
            storage,
            config,
            node: RwLock::new(node),
            writes: Mutex::new(()),
        }
    }

    /// Creates the account unless it already exists, in which case nothing changes.
    pub fn create_account(
        &self,
        account: impl Into<AccountId>,
        initial_balance: Amount,
    ) -> Result<(), LedgerError> {
        let result = CreateAccountCommand::new(account, initial_balance)
            .map_err(LedgerError::from)
            .and_then(|cmd| self.apply_create(cmd));
        result.inspect_err(|err| log_rejection("create_account", err))
    }

    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.storage.accounts()?)
    }

    pub fn deposit(
        &self,
        account: impl Into<AccountId>,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let result = BalanceCommand::new(account, BalanceAction::Deposit, amount)
            .map_err(LedgerError::from)
            .and_then(|cmd| self.apply_balance(cmd));
        result.inspect_err(|err| log_rejection("deposit", err))
    }

    pub fn withdraw(
        &self,
        account: impl Into<AccountId>,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let result = BalanceCommand::new(account, BalanceAction::Withdraw, amount)
            .map_err(LedgerError::from)
            .and_then(|cmd| self.apply_balance(cmd));
        result.inspect_err(|err| log_rejection("withdraw", err))
    }

    /// Moves `amount` from `source` to `target` and logs it as one commit.
    pub fn transfer(
        &self,
        source: impl Into<AccountId>,
        target: impl Into<AccountId>,
        amount: Amount,
    ) -> Result<LogEntry, LedgerError> {
        let result = self.ensure_accepts(Gated::Transfer).and_then(|()| {
            let cmd = TransferCommand::new(source, target, amount)?;
            self.apply_transfer(cmd)
        });
        result.inspect_err(|err| log_rejection("transfer", err))
    }

    /// Log entries, newest first.
    pub fn logs(&self) -> Result<Vec<LogEntry>, LedgerError> {
        Ok(self.storage.logs()?)
    }

    pub fn node_state(&self) -> Result<NodeState, LedgerError> {
        Ok(self.node_read()?.clone())
    }

    pub fn set_node_state(&self, status: NodeStatus) -> Result<(), LedgerError> {
        let mut node = self.node_write()?;
        let previous = node.status();
        node.set_status(status);
        info!(%previous, current = %status, "node state changed");
        Ok(())
    }

    pub fn fail(&self) -> Result<(), LedgerError> {
        self.set_node_state(NodeStatus::Failed)
    }

    pub fn elect_leader(&self) -> Result<ElectionOutcome, LedgerError> {
        let outcome = self.node_write()?.elect();
        match &outcome {
            Ok(ElectionOutcome::Elected(leader)) => info!(%leader, "node elected itself leader"),
            Ok(ElectionOutcome::LeaderPresent(leader)) => {
                info!(%leader, "leader already present, election skipped")
            }
            Err(err) => warn!(%err, "leader election refused"),
        }
        outcome.map_err(LedgerError::from)
    }

    /// Puts the node back to `follower`, then replays the transfer log as
    /// configured by [`ReplayMode`].
    pub fn recover(&self) -> Result<RecoveryReport, LedgerError> {
        self.set_node_state(NodeStatus::Follower)?;
        self.replay().inspect_err(|err| log_rejection("recover", err))
    }

    pub fn execute(&self, command: LedgerCommand) -> Result<CommandOutcome, LedgerError> {
        match command {
            LedgerCommand::CreateAccount(cmd) => {
                self.create_account(cmd.account, cmd.initial_balance)?;
                Ok(CommandOutcome::Applied)
            }
            LedgerCommand::Balance(cmd) => {
                match cmd.action {
                    BalanceAction::Deposit => self.deposit(cmd.account, cmd.amount)?,
                    BalanceAction::Withdraw => self.withdraw(cmd.account, cmd.amount)?,
                }
                Ok(CommandOutcome::Applied)
            }
            LedgerCommand::Transfer(cmd) => Ok(CommandOutcome::Transferred(self.transfer(
                cmd.source,
                cmd.target,
                cmd.amount,
            )?)),
            LedgerCommand::Fail => {
                self.fail()?;
                Ok(CommandOutcome::Applied)
            }
            LedgerCommand::Recover => Ok(CommandOutcome::Recovered(self.recover()?)),
            LedgerCommand::ElectLeader => Ok(CommandOutcome::Election(self.elect_leader()?)),
            LedgerCommand::SetNodeState(status) => {
                self.set_node_state(status)?;
                Ok(CommandOutcome::Applied)
            }
        }
    }

    fn apply_create(&self, cmd: CreateAccountCommand) -> Result<(), LedgerError> {
        let _guard = self.lock_writes()?;
        let account = Account::new(cmd.account, cmd.initial_balance);
        let id = account.id.clone();
        if self.storage.insert_account(account)? {
            info!(account = %id, balance = cmd.initial_balance, "account created");
        } else {
            info!(account = %id, "account already exists, create ignored");
        }
        Ok(())
    }

    fn apply_balance(&self, cmd: BalanceCommand) -> Result<(), LedgerError> {
        self.ensure_accepts(Gated::BalanceChange)?;
        let _guard = self.lock_writes()?;
        let event = match (cmd.action, self.storage.account(&cmd.account)?) {
            (BalanceAction::Deposit, Some(acc)) => acc.handle_credit(cmd.amount),
            (BalanceAction::Deposit, None) => {
                return Err(LedgerError::NotFound {
                    account: cmd.account,
                });
            }
            (BalanceAction::Withdraw, Some(acc)) => acc.handle_debit(cmd.amount),
            (BalanceAction::Withdraw, None) => {
                return Err(LedgerError::InsufficientFunds {
                    account: cmd.account,
                });
            }
        }
        .map_err(|err| LedgerError::from_account(&cmd.account, err))?;

        self.storage.commit(Commit::events([event]))?;
        info!(account = %cmd.account, action = ?cmd.action, amount = cmd.amount, "balance changed");
        Ok(())
    }

    fn apply_transfer(&self, cmd: TransferCommand) -> Result<LogEntry, LedgerError> {
        let _guard = self.lock_writes()?;
        self.config.transfer_latency.pause();

        let source = self
            .storage
            .account(&cmd.source)?
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: cmd.source.clone(),
            })?;
        let debit = source
            .handle_debit(cmd.amount)
            .map_err(|err| LedgerError::from_account(&cmd.source, err))?;
        let target = self
            .storage
            .account(&cmd.target)?
            .ok_or_else(|| LedgerError::NotFound {
                account: cmd.target.clone(),
            })?;
        let credit = target
            .handle_credit(cmd.amount)
            .map_err(|err| LedgerError::from_account(&cmd.target, err))?;

        let outcome = self.storage.commit(
            Commit::events([debit, credit]).with_log(PendingLogEntry::completed_transfer(
                cmd.source.clone(),
                cmd.target.clone(),
                cmd.amount,
            )),
        )?;
        let entry = outcome.appended.ok_or(StorageError::NotAppended)?;
        info!(
            source = %cmd.source,
            target = %cmd.target,
            amount = cmd.amount,
            log_id = entry.id,
            "transfer committed"
        );
        Ok(entry)
    }

    fn replay(&self) -> Result<RecoveryReport, LedgerError> {
        let mode = self.config.replay_mode;
        let _guard = self.lock_writes()?;
        let from_checkpoint = self.storage.checkpoint()?;
        let mut report = RecoveryReport {
            mode,
            replayed: 0,
            from_checkpoint,
            skipped_accounts: Vec::new(),
        };
        if mode == ReplayMode::StateOnly {
            info!("node recovered without replay");
            return Ok(report);
        }

        let mut entries = self.storage.logs()?;
        entries.reverse();
        let entries: Vec<LogEntry> = entries
            .into_iter()
            .filter(LogEntry::is_completed)
            .filter(|entry| mode == ReplayMode::Literal || entry.id > from_checkpoint)
            .collect();
        let Some(last) = entries.last().map(|entry| entry.id) else {
            info!(?mode, from_checkpoint, "node recovered, nothing to replay");
            return Ok(report);
        };

        let mut commit = Commit::events(entries.iter().flat_map(LogEntry::replay_events));
        if mode == ReplayMode::Idempotent {
            commit = commit.with_checkpoint(last);
        }
        let outcome = self.storage.commit(commit)?;
        report.replayed = entries.len();
        report.skipped_accounts = outcome.skipped;
        info!(
            ?mode,
            replayed = report.replayed,
            from_checkpoint,
            "node recovered, log replayed"
        );
        if !report.skipped_accounts.is_empty() {
            warn!(accounts = ?report.skipped_accounts, "replay skipped unknown accounts");
        }
        Ok(report)
    }

    fn ensure_accepts(&self, op: Gated) -> Result<(), LedgerError> {
        let node = self.node_read()?;
        let blocked_by_failure = match self.config.failure_policy {
            FailurePolicy::TransfersOnly => op == Gated::Transfer,
            FailurePolicy::AllBalanceChanges => true,
        };
        if node.is_failed() && blocked_by_failure {
            return Err(GateError::NodeFailed.into());
        }
        if op == Gated::Transfer
            && self.config.require_leader_for_transfer
            && node.status() == NodeStatus::Follower
            && node.current_leader().is_none()
        {
            return Err(GateError::NoLeader.into());
        }
        Ok(())
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, LedgerError> {
        Ok(self
            .writes
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?)
    }

    fn node_read(&self) -> Result<RwLockReadGuard<'_, NodeState>, LedgerError> {
        Ok(self.node.read().map_err(|_| StorageError::LockPoisoned)?)
    }

    fn node_write(&self) -> Result<RwLockWriteGuard<'_, NodeState>, LedgerError> {
        Ok(self.node.write().map_err(|_| StorageError::LockPoisoned)?)
    }
}

fn log_rejection(operation: &'static str, err: &LedgerError) {
    if err.is_business() {
        warn!(operation, %err, "operation rejected");
    } else {
        error!(operation, %err, "operation failed");
    }
}
