//! Drives a [`crate::ledger::Ledger`] from a CSV operation script and prints
//! the outcome as CSV.

use std::io::{Read, Write};

use crate::{
    command::LedgerCommand,
    ledger::{Ledger, LedgerError},
    storage::LedgerStorage,
};
use anyhow::Result;
use csv_parser::{CsvScriptParser, ScriptRow};
use csv_printer::{print_accounts, print_logs};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
pub mod csv_parser;
pub mod csv_printer;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Malformed row: {0}")]
    Row(#[from] csv::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct Service<'w, R, W: 'w, S> {
    pub input: R,
    pub output: &'w mut W,
    pub ledger: Ledger<S>,
    /// Append the transfer log after the accounts.
    pub print_logs: bool,
    pub error_printer: Box<dyn FnMut(u64, ScriptError)>,
}

impl<'w, R, W, S> Service<'w, R, W, S>
where
    R: Read,
    W: Write + 'w,
    S: LedgerStorage,
{
    /// Runs every script row against the ledger, then prints the accounts.
    ///
    /// Rejected rows go to the error printer and the script carries on.
    /// Storage failures stop the run.
    pub fn run(mut self) -> Result<()> {
        let parser = CsvScriptParser::new(self.input);

        for (line, row) in parser {
            let result = row
                .map_err(ScriptError::from)
                .and_then(|row| execute_row(&self.ledger, row));
            match result {
                Ok(()) => {}
                Err(ScriptError::Ledger(err)) if !err.is_business() => {
                    anyhow::bail!("Line {line}: {err}")
                }
                Err(err) => (self.error_printer)(line, err),
            }
        }

        print_accounts(&mut *self.output, self.ledger.accounts()?.iter())?;
        if self.print_logs {
            writeln!(self.output)?;
            print_logs(&mut *self.output, self.ledger.logs()?.iter())?;
        }
        Ok(())
    }
}

fn execute_row<S: LedgerStorage>(ledger: &Ledger<S>, row: ScriptRow) -> Result<(), ScriptError> {
    let command = LedgerCommand::parse_command(
        row.op,
        row.account.as_deref(),
        row.target.as_deref(),
        row.amount,
    )
    .map_err(LedgerError::from)?;
    ledger.execute(command)?;
    Ok(())
}

/// Installs a stderr fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
