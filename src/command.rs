use serde::Deserialize;
use thiserror::Error;

use crate::{
    account::{AccountId, Amount},
    node::{NodeStatus, ParseNodeStatusError},
};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Deposit,
    Withdraw,
    Transfer,
    Fail,
    Recover,
    Elect,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceAction {
    Deposit,
    Withdraw,
}

impl From<BalanceAction> for OperationKind {
    fn from(action: BalanceAction) -> Self {
        match action {
            BalanceAction::Deposit => OperationKind::Deposit,
            BalanceAction::Withdraw => OperationKind::Withdraw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccountCommand {
    pub account: AccountId,
    pub initial_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCommand {
    pub account: AccountId,
    pub action: BalanceAction,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub source: AccountId,
    pub target: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Account id must not be empty for {action:?}")]
    EmptyAccountId { action: OperationKind },
    #[error("Amount must be greater than zero for {action:?}")]
    NonPositiveAmount { action: OperationKind },
    #[error("Initial balance must not be negative")]
    NegativeInitialBalance,
    #[error("Field `{field}` is required for {action:?}")]
    FieldRequired {
        action: OperationKind,
        field: &'static str,
    },
    #[error(transparent)]
    NodeState(#[from] ParseNodeStatusError),
}

impl CreateAccountCommand {
    pub fn new(
        account: impl Into<AccountId>,
        initial_balance: Amount,
    ) -> Result<Self, CommandError> {
        let account = non_empty(account.into(), OperationKind::Create)?;
        if initial_balance < 0 {
            return Err(CommandError::NegativeInitialBalance);
        }
        Ok(Self {
            account,
            initial_balance,
        })
    }
}

impl BalanceCommand {
    pub fn new(
        account: impl Into<AccountId>,
        action: BalanceAction,
        amount: Amount,
    ) -> Result<Self, CommandError> {
        let account = non_empty(account.into(), action.into())?;
        let amount = positive(amount, action.into())?;
        Ok(Self {
            account,
            action,
            amount,
        })
    }
}

impl TransferCommand {
    pub fn new(
        source: impl Into<AccountId>,
        target: impl Into<AccountId>,
        amount: Amount,
    ) -> Result<Self, CommandError> {
        Ok(Self {
            source: non_empty(source.into(), OperationKind::Transfer)?,
            target: non_empty(target.into(), OperationKind::Transfer)?,
            amount: positive(amount, OperationKind::Transfer)?,
        })
    }
}

fn non_empty(account: AccountId, action: OperationKind) -> Result<AccountId, CommandError> {
    if account.trim().is_empty() {
        Err(CommandError::EmptyAccountId { action })
    } else {
        Ok(account)
    }
}

fn positive(amount: Amount, action: OperationKind) -> Result<Amount, CommandError> {
    if amount > 0 {
        Ok(amount)
    } else {
        Err(CommandError::NonPositiveAmount { action })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCommand {
    CreateAccount(CreateAccountCommand),
    Balance(BalanceCommand),
    Transfer(TransferCommand),
    Fail,
    Recover,
    ElectLeader,
    SetNodeState(NodeStatus),
}

impl LedgerCommand {
    /// Builds a command from loosely typed input, such as one script row.
    /// Columns that an operation does not use are ignored.
    pub fn parse_command(
        kind: OperationKind,
        account: Option<&str>,
        target: Option<&str>,
        amount: Option<Amount>,
    ) -> Result<Self, CommandError> {
        match kind {
            OperationKind::Create => Ok(Self::CreateAccount(CreateAccountCommand::new(
                required(account, kind, "account")?,
                amount.unwrap_or(0),
            )?)),
            OperationKind::Deposit => Ok(Self::Balance(BalanceCommand::new(
                required(account, kind, "account")?,
                BalanceAction::Deposit,
                required(amount, kind, "amount")?,
            )?)),
            OperationKind::Withdraw => Ok(Self::Balance(BalanceCommand::new(
                required(account, kind, "account")?,
                BalanceAction::Withdraw,
                required(amount, kind, "amount")?,
            )?)),
            OperationKind::Transfer => Ok(Self::Transfer(TransferCommand::new(
                required(account, kind, "account")?,
                required(target, kind, "target")?,
                required(amount, kind, "amount")?,
            )?)),
            OperationKind::Fail => Ok(Self::Fail),
            OperationKind::Recover => Ok(Self::Recover),
            OperationKind::Elect => Ok(Self::ElectLeader),
            OperationKind::State => Ok(Self::SetNodeState(
                required(target, kind, "target")?.parse()?,
            )),
        }
    }
}

fn required<T>(
    value: Option<T>,
    action: OperationKind,
    field: &'static str,
) -> Result<T, CommandError> {
    value.ok_or(CommandError::FieldRequired { action, field })
}
