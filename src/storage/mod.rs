use std::path::PathBuf;

use thiserror::Error;

use crate::{
    account::{Account, AccountError, AccountId, BalanceEvent},
    log::{LogEntry, LogId, PendingLogEntry},
};

pub mod file;
pub mod in_memory;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Corrupt ledger file `{}`: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("Storage lock poisoned")]
    LockPoisoned,
    #[error("Commit carried a log entry but none was appended")]
    NotAppended,
}

/// Changes that storage applies all-or-nothing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Commit {
    pub events: Vec<BalanceEvent>,
    pub log: Option<PendingLogEntry>,
    /// Moves the applied-through checkpoint forward. Appending a log entry
    /// always moves it to that entry's id.
    pub checkpoint: Option<LogId>,
}

impl Commit {
    pub fn events(events: impl IntoIterator<Item = BalanceEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_log(mut self, log: PendingLogEntry) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: LogId) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub appended: Option<LogEntry>,
    /// Accounts named by events but absent from the store. Their events
    /// were dropped, the way an UPDATE matching no rows is.
    pub skipped: Vec<AccountId>,
}

/// Durable home of accounts and the transfer log.
///
/// Implementations synchronize internally: every method takes `&self` and
/// each call observes or produces a whole committed state. Serializing
/// read-check-write sequences across calls is the caller's job.
pub trait LedgerStorage: Send + Sync {
    /// Inserts the account unless the id is taken. Returns whether it was inserted.
    fn insert_account(&self, account: Account) -> Result<bool, StorageError>;

    fn account(&self, id: &str) -> Result<Option<Account>, StorageError>;

    /// All accounts, ordered by id.
    fn accounts(&self) -> Result<Vec<Account>, StorageError>;

    /// All log entries, newest first.
    fn logs(&self) -> Result<Vec<LogEntry>, StorageError>;

    /// Highest log id whose delta is reflected in the stored balances.
    fn checkpoint(&self) -> Result<LogId, StorageError>;

    fn commit(&self, commit: Commit) -> Result<CommitOutcome, StorageError>;
}
