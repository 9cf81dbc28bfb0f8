//! Asynchronous bank server node.

use std::sync::{Arc, Mutex, PoisonError};

use meridian::{Envelope, Node, NodeContext, SimResult};
use tracing::warn;

use crate::protocol::{BankMessage, Request};
use crate::service::{Bank, BankError};

/// Serves requests against a [`Bank`] and replies to each sender.
///
/// Run it as an asynchronous node: its program only announces itself, and
/// every request is handled in `on_receive`.
#[derive(Debug, Clone)]
pub struct BankServer {
    ledger: Arc<Mutex<Bank>>,
}

impl BankServer {
    pub fn new(bank: Bank) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(bank)),
        }
    }

    /// Shared handle to the server's accounts, for inspection.
    pub fn ledger(&self) -> Arc<Mutex<Bank>> {
        Arc::clone(&self.ledger)
    }

    fn serve(&self, ctx: &NodeContext<BankMessage>, request: &Request) -> BankMessage {
        let response = self
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute(request);

        let account = request.account();
        match &response {
            Ok(balance) => ctx.log(&format!("account {account}: balance {balance}")),
            Err(BankError::UnknownAccount { .. }) => {
                ctx.log(&format!("account {account} does not exist"));
            }
            Err(BankError::InsufficientFunds { .. }) => {
                ctx.log(&format!("account {account}: insufficient funds"));
            }
        }
        BankMessage::Response(response)
    }
}

impl Node<BankMessage> for BankServer {
    fn program(&self, ctx: &NodeContext<BankMessage>) -> SimResult<()> {
        ctx.log("starting");
        Ok(())
    }

    fn on_receive(
        &self,
        ctx: &NodeContext<BankMessage>,
        envelope: Envelope<BankMessage>,
    ) -> SimResult<()> {
        let (sender, _, payload) = envelope.into_parts();
        match payload {
            BankMessage::Request(request) => {
                let reply = self.serve(ctx, &request);
                ctx.send(&sender, &reply)
            }
            BankMessage::Response(_) => {
                warn!(node = %ctx.name(), %sender, "ignoring response sent to a server");
                Ok(())
            }
        }
    }
}
