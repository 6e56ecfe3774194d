//! CSV file storage backend.
//!
//! A data directory holds two files:
//! - `accounts.csv`: a `# applied-through: <id>` line, then `account,balance` rows.
//! - `logs.csv`: one row per log entry, oldest first.
//!
//! Every commit rewrites the affected files through a temp file and a rename,
//! so readers of the directory never see a half-written file.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tracing::debug;

use crate::{
    account::Account,
    log::{LogEntry, LogId},
};

use super::{Commit, CommitOutcome, LedgerStorage, StorageError, in_memory::LedgerTables};

const ACCOUNTS_FILE: &str = "accounts.csv";
const LOGS_FILE: &str = "logs.csv";
const CHECKPOINT_PREFIX: &str = "# applied-through:";

/// File-backed store. Keeps the tables in memory and writes them out on
/// every change.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    tables: RwLock<LedgerTables>,
}

impl FileStorage {
    /// Opens the store in `dir`, creating the directory if needed. Missing
    /// files mean an empty ledger.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let (applied_through, accounts) = read_accounts(&dir.join(ACCOUNTS_FILE))?;
        let logs = read_logs(&dir.join(LOGS_FILE))?;
        debug!(
            dir = %dir.display(),
            accounts = accounts.len(),
            logs = logs.len(),
            applied_through,
            "opened ledger files"
        );

        let tables = LedgerTables {
            accounts: accounts
                .into_iter()
                .map(|acc| (acc.id.clone(), acc))
                .collect(),
            logs,
            applied_through,
        };
        Ok(Self {
            dir,
            tables: RwLock::new(tables),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerTables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerTables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned)
    }

    fn persist(&self, tables: &LedgerTables, logs_changed: bool) -> Result<(), StorageError> {
        // Logs go first. A crash between the two renames leaves the
        // checkpoint behind the log, never ahead of it.
        if logs_changed {
            write_logs(&self.dir.join(LOGS_FILE), &tables.logs)?;
        }
        write_accounts(
            &self.dir.join(ACCOUNTS_FILE),
            tables.applied_through,
            tables.accounts.values(),
        )?;
        debug!(dir = %self.dir.display(), "persisted ledger files");
        Ok(())
    }
}

impl LedgerStorage for FileStorage {
    fn insert_account(&self, account: Account) -> Result<bool, StorageError> {
        let mut tables = self.write()?;
        let mut next = tables.clone();
        if !next.insert_account(account) {
            return Ok(false);
        }
        self.persist(&next, false)?;
        *tables = next;
        Ok(true)
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
        let mut tables = self.write()?;
        let mut next = tables.clone();
        let outcome = next.apply(commit)?;
        self.persist(&next, outcome.appended.is_some())?;
        *tables = next;
        Ok(outcome)
    }
}

/// Writes to a sibling temp file, renames it into place, then syncs the
/// directory so the rename itself survives a power loss.
fn write_atomically(
    path: &Path,
    fill: impl FnOnce(&mut fs::File) -> Result<(), StorageError>,
) -> Result<(), StorageError> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;
    fill(&mut file)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    sync_parent(path)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(dir) = path.parent() {
        fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

// Directories cannot be opened as files here; the rename is as durable as it gets.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

fn write_accounts<'a>(
    path: &Path,
    applied_through: LogId,
    accounts: impl Iterator<Item = &'a Account>,
) -> Result<(), StorageError> {
    write_atomically(path, |file| {
        writeln!(file, "{CHECKPOINT_PREFIX} {applied_through}")?;
        let mut writer = csv::Writer::from_writer(file);
        for acc in accounts {
            writer.serialize(acc)?;
        }
        writer.flush()?;
        Ok(())
    })
}

fn write_logs(path: &Path, logs: &[LogEntry]) -> Result<(), StorageError> {
    write_atomically(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        for entry in logs {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        Ok(())
    })
}

fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> StorageError {
    StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read_accounts(path: &Path) -> Result<(LogId, Vec<Account>), StorageError> {
    let Some(content) = read_optional(path)? else {
        return Ok((0, Vec::new()));
    };
    let (first_line, rows) = content.split_once('\n').unwrap_or((content.as_str(), ""));
    let applied_through = first_line
        .strip_prefix(CHECKPOINT_PREFIX)
        .ok_or_else(|| corrupt(path, "missing applied-through line"))?
        .trim()
        .parse::<LogId>()
        .map_err(|e| corrupt(path, format!("bad applied-through value: {e}")))?;

    // no trimming: ids may carry spaces and must match the log verbatim
    let mut reader = csv::Reader::from_reader(rows.as_bytes());
    let accounts = reader
        .deserialize::<Account>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok((applied_through, accounts))
}

fn read_logs(path: &Path) -> Result<Vec<LogEntry>, StorageError> {
    let Some(content) = read_optional(path)? else {
        return Ok(Vec::new());
    };
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let logs = reader
        .deserialize::<LogEntry>()
        .collect::<Result<Vec<_>, _>>()?;
    if logs.windows(2).any(|pair| pair[0].id >= pair[1].id) {
        return Err(corrupt(path, "log ids are not strictly increasing"));
    }
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use crate::{account::BalanceEvent, log::PendingLogEntry};

    use super::*;

    fn transfer(source: &str, target: &str, amount: i64) -> Commit {
        Commit::events([
            BalanceEvent::debit(source, amount),
            BalanceEvent::credit(target, amount),
        ])
        .with_log(PendingLogEntry::completed_transfer(source, target, amount))
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.insert_account(Account::new("a", 100)).unwrap();
            storage.insert_account(Account::new("b", 0)).unwrap();
            storage.commit(transfer("a", "b", 30)).unwrap();
        }

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(
            storage.accounts().unwrap(),
            vec![Account::new("a", 70), Account::new("b", 30)]
        );
        let logs = storage.logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, 1);
        assert_eq!(logs[0].account, "a");
        assert_eq!(logs[0].target_account, "b");
        assert_eq!(storage.checkpoint().unwrap(), 1);

        // ids keep counting from the persisted log
        let outcome = storage.commit(transfer("b", "a", 10)).unwrap();
        assert_eq!(outcome.appended.unwrap().id, 2);
    }

    #[test]
    fn empty_directory_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("nested")).unwrap();
        assert!(storage.accounts().unwrap().is_empty());
        assert!(storage.logs().unwrap().is_empty());
        assert_eq!(storage.checkpoint().unwrap(), 0);
        assert!(storage.dir().ends_with("nested"));
    }

    #[test]
    fn accounts_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        storage.insert_account(Account::new("b", 5)).unwrap();
        storage.insert_account(Account::new("a", 7)).unwrap();

        let content = fs::read_to_string(dir.path().join(ACCOUNTS_FILE)).unwrap();
        assert_eq!(content, "# applied-through: 0\naccount,balance\na,7\nb,5\n");
        assert!(!dir.path().join(LOGS_FILE).exists());
    }

    #[test]
    fn lagging_checkpoint_is_loaded_as_is() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.insert_account(Account::new("a", 100)).unwrap();
            storage.insert_account(Account::new("b", 0)).unwrap();
            storage.commit(transfer("a", "b", 30)).unwrap();
        }
        // simulate a crash that lost the accounts rewrite of the last transfer
        fs::write(
            dir.path().join(ACCOUNTS_FILE),
            "# applied-through: 0\naccount,balance\na,100\nb,0\n",
        )
        .unwrap();

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.checkpoint().unwrap(), 0);
        assert_eq!(storage.logs().unwrap().len(), 1);
        assert_eq!(storage.account("a").unwrap(), Some(Account::new("a", 100)));
    }

    #[test]
    fn ids_with_surrounding_spaces_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileStorage::open(dir.path()).unwrap();
            storage.insert_account(Account::new(" a", 100)).unwrap();
            storage.insert_account(Account::new("b ", 0)).unwrap();
            storage.commit(transfer(" a", "b ", 30)).unwrap();
        }

        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.account(" a").unwrap(), Some(Account::new(" a", 70)));
        assert_eq!(storage.account("b ").unwrap(), Some(Account::new("b ", 30)));
        assert_eq!(storage.account("a").unwrap(), None);

        // ids in the log still line up with the accounts
        let outcome = storage
            .commit(Commit::events(storage.logs().unwrap()[0].replay_events()))
            .unwrap();
        assert!(outcome.skipped.is_empty());
        assert_eq!(storage.account(" a").unwrap(), Some(Account::new(" a", 40)));
    }

    #[test]
    fn rejects_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ACCOUNTS_FILE), "account,balance\na,1\n").unwrap();
        let err = FileStorage::open(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));

        fs::write(
            dir.path().join(ACCOUNTS_FILE),
            "# applied-through: 0\naccount,balance\na,not-a-number\n",
        )
        .unwrap();
        let err = FileStorage::open(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Csv(_)));
    }
}
