//! The account service behind the bank server.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::protocol::{Request, Response};

/// Why a request was refused. Travels back to the client inside a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("unknown account {account}")]
    UnknownAccount { account: String },

    #[error("insufficient funds on {account}: balance {balance}, debit {amount}")]
    InsufficientFunds {
        account: String,
        balance: Decimal,
        amount: Decimal,
    },
}

/// In-memory account table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bank {
    accounts: BTreeMap<String, Decimal>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dupont −100.00, Durand 0.00, Martin 100.00.
    pub fn with_demo_accounts() -> Self {
        let mut bank = Self::new();
        bank.open("Dupont", Decimal::new(-10_000, 2));
        bank.open("Durand", Decimal::new(0, 2));
        bank.open("Martin", Decimal::new(10_000, 2));
        bank
    }

    /// Opens (or resets) an account. Returns the previous balance, if any.
    pub fn open(&mut self, account: impl Into<String>, balance: Decimal) -> Option<Decimal> {
        self.accounts.insert(account.into(), balance)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.accounts.iter().map(|(name, balance)| (name.as_str(), *balance))
    }

    pub fn balance(&self, account: &str) -> Result<Decimal, BankError> {
        self.accounts
            .get(account)
            .copied()
            .ok_or_else(|| BankError::UnknownAccount {
                account: account.to_string(),
            })
    }

    /// Credits (positive `amount`) or debits (negative `amount`) an account.
    ///
    /// A debit that would leave the balance negative is refused. Credits are
    /// always accepted, even on an overdrawn account.
    pub fn transfer(&mut self, account: &str, amount: Decimal) -> Result<Decimal, BankError> {
        let balance = self
            .accounts
            .get_mut(account)
            .ok_or_else(|| BankError::UnknownAccount {
                account: account.to_string(),
            })?;

        if amount < Decimal::ZERO && *balance + amount < Decimal::ZERO {
            return Err(BankError::InsufficientFunds {
                account: account.to_string(),
                balance: *balance,
                amount,
            });
        }
        *balance += amount;
        Ok(*balance)
    }

    /// Serves one request.
    pub fn execute(&mut self, request: &Request) -> Response {
        match request {
            Request::Balance { account } => self.balance(account),
            Request::Transfer { account, amount } => self.transfer(account, *amount),
        }
    }
}
