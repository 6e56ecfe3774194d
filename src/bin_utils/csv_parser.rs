use std::io::Read;

use crate::{account::Amount, command::OperationKind};
use csv::{DeserializeRecordsIntoIter, Trim};
use serde::Deserialize;

/// One script line. Columns an operation does not need may be left empty.
#[derive(Debug, Deserialize)]
pub struct ScriptRow {
    pub op: OperationKind,
    pub account: Option<String>,
    pub target: Option<String>,
    pub amount: Option<Amount>,
}

/// Parses an operation script in CSV format, yielding each row with the
/// line it started on.
pub struct CsvScriptParser<R> {
    iter: DeserializeRecordsIntoIter<R, ScriptRow>,
}

impl<R> CsvScriptParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvScriptParser<R>
where
    R: Read,
{
    type Item = (u64, Result<ScriptRow, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rows_with_gaps() {
        let script = "op, account, target, amount\n\
                      create, alice, , 100\n\
                      transfer, alice, bob, 5\n\
                      fail\n\
                      state, , Leader,\n\
                      explode, alice, , 1\n";
        let rows: Vec<_> = CsvScriptParser::new(script.as_bytes()).collect();
        assert_eq!(rows.len(), 5);

        let (line, row) = &rows[0];
        let row = row.as_ref().unwrap();
        assert_eq!(*line, 2);
        assert_eq!(row.op, OperationKind::Create);
        assert_eq!(row.account.as_deref(), Some("alice"));
        assert_eq!(row.target, None);
        assert_eq!(row.amount, Some(100));

        let row = rows[1].1.as_ref().unwrap();
        assert_eq!(row.target.as_deref(), Some("bob"));

        let row = rows[2].1.as_ref().unwrap();
        assert_eq!(row.op, OperationKind::Fail);
        assert_eq!(row.account, None);

        let row = rows[3].1.as_ref().unwrap();
        assert_eq!(row.target.as_deref(), Some("Leader"));

        let (line, row) = &rows[4];
        assert_eq!(*line, 6);
        assert!(row.is_err());
    }
}
