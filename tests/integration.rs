use std::{cell::RefCell, fs, rc::Rc};

use ledger_node::{
    account::Account,
    bin_utils::{ScriptError, Service},
    config::{LedgerConfig, ReplayMode},
    ledger::{ErrorKind, Ledger},
    log::{LogEntry, LogId},
    storage::{
        Commit, CommitOutcome, LedgerStorage, StorageError, file::FileStorage,
        in_memory::InMemoryStorage,
    },
};

const TEST_FILE: &str = include_str!("operations.csv");

type Rejections = Rc<RefCell<Vec<(u64, Option<ErrorKind>)>>>;

fn collecting_printer(rejections: &Rejections) -> Box<dyn FnMut(u64, ScriptError)> {
    let rejections = rejections.clone();
    Box::new(move |line, err| {
        let kind = match err {
            ScriptError::Row(_) => None,
            ScriptError::Ledger(err) => Some(err.kind()),
        };
        rejections.borrow_mut().push((line, kind));
    })
}

fn run_script<S: LedgerStorage>(
    script: &str,
    ledger: Ledger<S>,
    print_logs: bool,
    rejections: &Rejections,
) -> String {
    let mut output = Vec::new();
    let service = Service {
        input: script.as_bytes(),
        output: &mut output,
        ledger,
        print_logs,
        error_printer: collecting_printer(rejections),
    };
    service.run().unwrap();
    String::from_utf8(output).unwrap()
}

#[test]
fn process_operations() {
    let rejections = Rejections::default();
    let output = run_script(
        TEST_FILE,
        Ledger::in_memory(LedgerConfig::default()),
        false,
        &rejections,
    );

    // recover replays the one logged transfer on top of the live balances
    assert_eq!(output, "account,balance\nalice,40\nbob,65\ncarol,7\n");
    assert_eq!(
        *rejections.borrow(),
        vec![
            (6, Some(ErrorKind::InsufficientFunds)),
            (8, Some(ErrorKind::InsufficientFunds)),
            (10, Some(ErrorKind::Unavailable)),
            (11, Some(ErrorKind::NotFound)),
            (12, Some(ErrorKind::Validation)),
        ]
    );
}

#[test]
fn malformed_rows_are_skipped() {
    let script = "op,account,target,amount\n\
                  create,a,,10\n\
                  teleport,a,,1\n\
                  deposit,a,,lots\n\
                  state,,sleeping,\n\
                  deposit,a,,1\n";
    let rejections = Rejections::default();
    let output = run_script(
        script,
        Ledger::in_memory(LedgerConfig::default()),
        false,
        &rejections,
    );
    assert_eq!(output, "account,balance\na,11\n");
    assert_eq!(
        *rejections.borrow(),
        vec![(3, None), (4, None), (5, Some(ErrorKind::Validation))]
    );
}

#[test]
fn prints_logs_after_accounts() {
    let script = "op,account,target,amount\n\
                  create,a,,10\n\
                  create,b,,0\n\
                  transfer,a,b,4\n\
                  transfer,b,a,1\n";
    let rejections = Rejections::default();
    let output = run_script(
        script,
        Ledger::in_memory(LedgerConfig::default()),
        true,
        &rejections,
    );
    assert!(rejections.borrow().is_empty());

    let (accounts, logs) = output.split_once("\n\n").unwrap();
    assert_eq!(accounts, "account,balance\na,7\nb,3");
    let lines: Vec<&str> = logs.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "id,action,account,amount,target_account,status,timestamp"
    );
    // newest first
    assert!(lines[1].starts_with("2,transfer,b,1,a,completed,"));
    assert!(lines[2].starts_with("1,transfer,a,4,b,completed,"));
}

#[test]
fn file_ledger_persists_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let rejections = Rejections::default();

    let first = "op,account,target,amount\n\
                 create,a,,100\n\
                 create,b,,0\n\
                 transfer,a,b,30\n";
    let storage = FileStorage::open(dir.path()).unwrap();
    run_script(first, Ledger::new(storage, LedgerConfig::default()), false, &rejections);

    let second = "op,account,target,amount\n\
                  transfer,b,a,10\n";
    let storage = FileStorage::open(dir.path()).unwrap();
    let output = run_script(
        second,
        Ledger::new(storage, LedgerConfig::default()),
        false,
        &rejections,
    );

    assert!(rejections.borrow().is_empty());
    assert_eq!(output, "account,balance\na,80\nb,20\n");
    let logs = fs::read_to_string(dir.path().join("logs.csv")).unwrap();
    assert_eq!(logs.lines().count(), 3);
}

#[test]
fn idempotent_recover_repairs_lagging_balances() {
    let dir = tempfile::tempdir().unwrap();
    let rejections = Rejections::default();
    let config = LedgerConfig {
        replay_mode: ReplayMode::Idempotent,
        ..Default::default()
    };

    let setup = "op,account,target,amount\n\
                 create,a,,100\n\
                 create,b,,0\n\
                 transfer,a,b,30\n\
                 transfer,a,b,20\n";
    let storage = FileStorage::open(dir.path()).unwrap();
    run_script(setup, Ledger::new(storage, config.clone()), false, &rejections);

    // balances written after the first transfer only, as if the process died
    // between writing the log and the accounts of the second one
    fs::write(
        dir.path().join("accounts.csv"),
        "# applied-through: 1\naccount,balance\na,70\nb,30\n",
    )
    .unwrap();

    let recover = "op,account,target,amount\n\
                   recover\n\
                   recover\n";
    let storage = FileStorage::open(dir.path()).unwrap();
    let output = run_script(recover, Ledger::new(storage, config), false, &rejections);

    assert!(rejections.borrow().is_empty());
    assert_eq!(output, "account,balance\na,50\nb,50\n");
    let accounts = fs::read_to_string(dir.path().join("accounts.csv")).unwrap();
    assert!(accounts.starts_with("# applied-through: 2\n"));
}

/// Accepts new accounts but fails every balance commit.
struct BrokenDisk(InMemoryStorage);

impl LedgerStorage for BrokenDisk {
    fn insert_account(&self, account: Account) -> Result<bool, StorageError> {
        self.0.insert_account(account)
    }

    fn account(&self, id: &str) -> Result<Option<Account>, StorageError> {
        self.0.account(id)
    }

    fn accounts(&self) -> Result<Vec<Account>, StorageError> {
        self.0.accounts()
    }

    fn logs(&self) -> Result<Vec<LogEntry>, StorageError> {
        self.0.logs()
    }

    fn checkpoint(&self) -> Result<LogId, StorageError> {
        self.0.checkpoint()
    }

    fn commit(&self, _commit: Commit) -> Result<CommitOutcome, StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk unplugged")))
    }
}

#[test]
fn storage_failure_aborts_the_script() {
    let script = "op,account,target,amount\n\
                  create,a,,10\n\
                  create,b,,0\n\
                  withdraw,b,,5\n\
                  transfer,a,b,4\n\
                  create,c,,1\n";
    let rejections = Rejections::default();
    let mut output = Vec::new();
    let service = Service {
        input: script.as_bytes(),
        output: &mut output,
        ledger: Ledger::new(BrokenDisk(InMemoryStorage::new()), LedgerConfig::default()),
        print_logs: false,
        error_printer: collecting_printer(&rejections),
    };

    let err = service.run().unwrap_err();
    assert!(err.to_string().starts_with("Line 5: "), "{err}");
    // only the business rejection before the failure reached the printer
    assert_eq!(
        *rejections.borrow(),
        vec![(4, Some(ErrorKind::InsufficientFunds))]
    );
    assert!(output.is_empty());
}
