//! Messages exchanged between bank clients and servers.

use std::fmt::{self, Display};

use meridian::{Isolate, SimResult};
use rust_decimal::Decimal;

use crate::service::BankError;

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Balance inquiry.
    Balance { account: String },
    /// Credit (positive amount) or debit (negative amount).
    Transfer { account: String, amount: Decimal },
}

impl Request {
    pub fn balance(account: impl Into<String>) -> Self {
        Self::Balance {
            account: account.into(),
        }
    }

    pub fn transfer(account: impl Into<String>, amount: Decimal) -> Self {
        Self::Transfer {
            account: account.into(),
            amount,
        }
    }

    pub fn account(&self) -> &str {
        match self {
            Self::Balance { account } | Self::Transfer { account, .. } => account,
        }
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balance { account } => write!(f, "request[balance account={account}]"),
            Self::Transfer { account, amount } => {
                write!(f, "request[transfer account={account}, amount={amount}]")
            }
        }
    }
}

/// The server's answer: the resulting balance, or why the request was
/// refused.
pub type Response = Result<Decimal, BankError>;

/// Renders a response for the node log.
pub fn describe(response: &Response) -> String {
    match response {
        Ok(balance) => format!("response[balance={balance}]"),
        Err(err) => format!("response[error={err}]"),
    }
}

/// Payload type of a bank simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankMessage {
    Request(Request),
    Response(Response),
}

/// Every field is owned and immutable, so a clone shares nothing.
impl Isolate for BankMessage {
    fn isolate(&self) -> SimResult<Self> {
        Ok(self.clone())
    }
}

impl From<Request> for BankMessage {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for BankMessage {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}
