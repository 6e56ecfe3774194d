use std::io::Write;

use csv::Writer;
use serde::Serialize;

use crate::{account::Account, log::LogEntry};

fn print_records<W, T>(output: &mut W, records: impl Iterator<Item = T>) -> anyhow::Result<()>
where
    W: Write,
    T: Serialize,
{
    let mut writer = Writer::from_writer(output);
    for record in records {
        if let Err(err) = writer.serialize(record) {
            anyhow::bail!("Failed to write to CSV: {err}")
        }
    }
    // Ensure all data is flushed to the output
    if let Err(err) = writer.flush() {
        anyhow::bail!("Failed to flush CSV writer: {err}")
    }
    Ok(())
}

pub fn print_accounts<'a, W>(
    output: &mut W,
    accounts: impl Iterator<Item = &'a Account>,
) -> anyhow::Result<()>
where
    W: Write,
{
    print_records(output, accounts)
}

pub fn print_logs<'a, W>(
    output: &mut W,
    logs: impl Iterator<Item = &'a LogEntry>,
) -> anyhow::Result<()>
where
    W: Write,
{
    print_records(output, logs)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::log::PendingLogEntry;

    use super::*;

    #[test]
    fn prints_headers_and_rows() {
        let mut output = Vec::new();
        let accounts = [Account::new("a", 70), Account::new("b", 30)];
        print_accounts(&mut output, accounts.iter()).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "account,balance\na,70\nb,30\n"
        );

        let mut output = Vec::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let logs = [PendingLogEntry::completed_transfer("a", "b", 30).into_entry(1, at)];
        print_logs(&mut output, logs.iter()).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "id,action,account,amount,target_account,status,timestamp\n\
             1,transfer,a,30,b,completed,2024-05-01T12:00:00Z\n"
        );
    }
}
