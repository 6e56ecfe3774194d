use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AccountId = String;

/// Currency minor units.
pub type Amount = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEventKind {
    Credited,
    Debited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEvent {
    pub account: AccountId,
    pub amount: Amount,
    pub kind: BalanceEventKind,
}

impl BalanceEvent {
    pub fn credit(account: impl Into<AccountId>, amount: Amount) -> Self {
        Self {
            account: account.into(),
            amount,
            kind: BalanceEventKind::Credited,
        }
    }

    pub fn debit(account: impl Into<AccountId>, amount: Amount) -> Self {
        Self {
            account: account.into(),
            amount,
            kind: BalanceEventKind::Debited,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Amount, requested: Amount },
    #[error("Balance of `{account}` would overflow")]
    BalanceOverflow { account: AccountId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "account")]
    pub id: AccountId,
    pub balance: Amount,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, balance: Amount) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }

    /// Applies an event without re-checking funds: events are the source of
    /// truth, and log replay is allowed to push a balance below zero.
    pub fn apply(&mut self, event: &BalanceEvent) -> Result<(), AccountError> {
        let balance = match event.kind {
            BalanceEventKind::Credited => self.balance.checked_add(event.amount),
            BalanceEventKind::Debited => self.balance.checked_sub(event.amount),
        };
        self.balance = balance.ok_or_else(|| AccountError::BalanceOverflow {
            account: self.id.clone(),
        })?;
        Ok(())
    }

    pub fn handle_credit(&self, amount: Amount) -> Result<BalanceEvent, AccountError> {
        if self.balance.checked_add(amount).is_none() {
            return Err(AccountError::BalanceOverflow {
                account: self.id.clone(),
            });
        }
        Ok(BalanceEvent::credit(self.id.clone(), amount))
    }

    pub fn handle_debit(&self, amount: Amount) -> Result<BalanceEvent, AccountError> {
        if self.balance >= amount {
            Ok(BalanceEvent::debit(self.id.clone(), amount))
        } else {
            Err(AccountError::InsufficientFunds {
                balance: self.balance,
                requested: amount,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_events() {
        let mut acc = Account::new("alice", 0);
        acc.apply(&BalanceEvent::credit("alice", 10)).unwrap();
        assert_eq!(acc.balance, 10);
        acc.apply(&BalanceEvent::debit("alice", 3)).unwrap();
        assert_eq!(acc.balance, 7);
        // event is the source of truth, there's no funds check here
        acc.apply(&BalanceEvent::debit("alice", 9)).unwrap();
        assert_eq!(acc.balance, -2);

        let mut acc = Account::new("rich", Amount::MAX);
        let err = acc.apply(&BalanceEvent::credit("rich", 1)).unwrap_err();
        assert!(matches!(err, AccountError::BalanceOverflow { .. }));
        assert_eq!(acc.balance, Amount::MAX);
    }

    #[test]
    fn handle_debit() {
        let mut acc = Account::new("alice", 5);

        let err = acc.handle_debit(6).unwrap_err();
        assert_eq!(
            err,
            AccountError::InsufficientFunds {
                balance: 5,
                requested: 6
            }
        );
        assert_eq!(err.to_string(), "Insufficient funds: balance 5, requested 6");

        // whole balance can be taken
        let evt = acc.handle_debit(5).unwrap();
        assert_eq!(evt.kind, BalanceEventKind::Debited);
        assert_eq!(evt.amount, 5);
        acc.apply(&evt).unwrap();
        assert_eq!(acc.balance, 0);
    }

    #[test]
    fn handle_credit() {
        let acc = Account::new("alice", 1);
        let evt = acc.handle_credit(13).unwrap();
        assert_eq!(evt, BalanceEvent::credit("alice", 13));

        let acc = Account::new("rich", Amount::MAX - 1);
        let err = acc.handle_credit(2).unwrap_err();
        assert_eq!(err.to_string(), "Balance of `rich` would overflow");
    }
}
