use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{AccountId, Amount, BalanceEvent};

pub type LogId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Completed,
}

/// Log record before the store has assigned it an id and a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogEntry {
    pub action: LogAction,
    pub account: AccountId,
    pub amount: Amount,
    pub target_account: AccountId,
    pub status: LogStatus,
}

impl PendingLogEntry {
    pub fn completed_transfer(
        source: impl Into<AccountId>,
        target: impl Into<AccountId>,
        amount: Amount,
    ) -> Self {
        Self {
            action: LogAction::Transfer,
            account: source.into(),
            amount,
            target_account: target.into(),
            status: LogStatus::Completed,
        }
    }

    pub fn into_entry(self, id: LogId, timestamp: DateTime<Utc>) -> LogEntry {
        LogEntry {
            id,
            action: self.action,
            account: self.account,
            amount: self.amount,
            target_account: self.target_account,
            status: self.status,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogId,
    pub action: LogAction,
    /// Source account of the transfer.
    pub account: AccountId,
    pub amount: Amount,
    pub target_account: AccountId,
    pub status: LogStatus,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn is_completed(&self) -> bool {
        self.status == LogStatus::Completed
    }

    /// Balance events that re-apply this entry: debit the source, then
    /// credit the target.
    pub fn replay_events(&self) -> [BalanceEvent; 2] {
        match self.action {
            LogAction::Transfer => [
                BalanceEvent::debit(self.account.clone(), self.amount),
                BalanceEvent::credit(self.target_account.clone(), self.amount),
            ],
        }
    }
}
