use std::{
    collections::{BTreeMap, HashMap},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::Utc;

use crate::{
    account::{Account, AccountId},
    log::{LogEntry, LogId},
};

use super::{Commit, CommitOutcome, LedgerStorage, StorageError};

/// Plain tables shared by the storage implementations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerTables {
    pub accounts: BTreeMap<AccountId, Account>,
    /// Oldest first, ids strictly increasing.
    pub logs: Vec<LogEntry>,
    pub applied_through: LogId,
}

impl LedgerTables {
    pub fn insert_account(&mut self, account: Account) -> bool {
        if self.accounts.contains_key(&account.id) {
            return false;
        }
        self.accounts.insert(account.id.clone(), account);
        true
    }

    pub fn logs_newest_first(&self) -> Vec<LogEntry> {
        self.logs.iter().rev().cloned().collect()
    }

    fn next_log_id(&self) -> LogId {
        self.logs.last().map_or(1, |entry| entry.id + 1)
    }

    /// Applies the commit, or leaves the tables untouched on error.
    pub fn apply(&mut self, commit: Commit) -> Result<CommitOutcome, StorageError> {
        let mut staged: HashMap<AccountId, Account> = HashMap::new();
        let mut outcome = CommitOutcome::default();

        for event in &commit.events {
            if !staged.contains_key(&event.account) {
                match self.accounts.get(&event.account) {
                    Some(acc) => {
                        staged.insert(event.account.clone(), acc.clone());
                    }
                    None => {
                        if !outcome.skipped.contains(&event.account) {
                            outcome.skipped.push(event.account.clone());
                        }
                        continue;
                    }
                }
            }
            if let Some(acc) = staged.get_mut(&event.account) {
                acc.apply(event)?;
            }
        }

        // all checks passed, nothing below can fail
        self.accounts.extend(staged);
        if let Some(checkpoint) = commit.checkpoint {
            self.applied_through = self.applied_through.max(checkpoint);
        }
        if let Some(log) = commit.log {
            let entry = log.into_entry(self.next_log_id(), Utc::now());
            self.applied_through = self.applied_through.max(entry.id);
            self.logs.push(entry.clone());
            outcome.appended = Some(entry);
        }
        Ok(outcome)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<LedgerTables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerTables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerTables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }
}

impl LedgerStorage for InMemoryStorage {
    fn insert_account(&self, account: Account) -> Result<bool, StorageError> {
        Ok(self.write()?.insert_account(account))
    }

    fn account(&self, id: &str) -> Result<Option<Account>, StorageError> {
        Ok(self.read()?.accounts.get(id).cloned())
    }

    fn accounts(&self) -> Result<Vec<Account>, StorageError> {
        Ok(self.read()?.accounts.values().cloned().collect())
    }

    fn logs(&self) -> Result<Vec<LogEntry>, StorageError> {
        Ok(self.read()?.logs_newest_first())
    }

    fn checkpoint(&self) -> Result<LogId, StorageError> {
        Ok(self.read()?.applied_through)
    }

    fn commit(&self, commit: Commit) -> Result<CommitOutcome, StorageError> {
        self.write()?.apply(commit)
    }
}
