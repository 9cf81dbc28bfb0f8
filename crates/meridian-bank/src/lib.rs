//! # meridian-bank: a banking round trip over the Meridian simulator
//!
//! An asynchronous [`BankServer`] node wraps an account table; a synchronous
//! [`BankClient`] node sends it credit/debit requests and waits for each
//! response. Refusals such as an unknown account or insufficient funds are
//! ordinary [`Response`] values: the simulator delivers them like any other
//! payload.
//!
//! [`run_demo`] wires the two together the way the `meridian demo` command
//! does.

mod client;
mod demo;
mod protocol;
mod server;
mod service;

pub use client::{BankClient, Exchange, Workload};
pub use demo::{DemoReport, run_demo};
pub use protocol::{BankMessage, Request, Response, describe};
pub use server::BankServer;
pub use service::{Bank, BankError};
