//! Synchronous bank client node.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use meridian::{Node, NodeContext, SimResult, SimRng};
use rust_decimal::Decimal;
use tracing::warn;

use crate::protocol::{BankMessage, Request, Response, describe};

/// What the client asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workload {
    /// `requests` transfers on one account, with whole amounts drawn
    /// uniformly from `[min_amount, max_amount)`.
    Random {
        account: String,
        requests: u32,
        min_amount: i64,
        max_amount: i64,
        seed: Option<u64>,
    },
    /// A fixed list of requests, sent in order.
    Scripted(Vec<Request>),
}

impl Workload {
    fn requests(&self) -> Vec<Request> {
        match self {
            Self::Random {
                account,
                requests,
                min_amount,
                max_amount,
                seed,
            } => {
                let mut rng = seed.map_or_else(SimRng::from_entropy, SimRng::new);
                (0..*requests)
                    .map(|_| {
                        let amount = rng.next_i64_range(*min_amount, *max_amount);
                        Request::transfer(account.clone(), Decimal::from(amount))
                    })
                    .collect()
            }
            Self::Scripted(requests) => requests.clone(),
        }
    }
}

/// One request and the response it got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub request: Request,
    pub response: Response,
}

/// Sends its workload to a server (or a group of servers), waiting for a
/// response after each request.
#[derive(Debug)]
pub struct BankClient {
    server: String,
    workload: Workload,
    pause: Duration,
    settle: Duration,
    transcript: Arc<Mutex<Vec<Exchange>>>,
}

impl BankClient {
    pub fn new(server: impl Into<String>, workload: Workload) -> Self {
        Self {
            server: server.into(),
            workload,
            pause: Duration::ZERO,
            settle: Duration::ZERO,
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Wait between two requests.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Wait after the last response before stopping.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Shared handle to the exchanges recorded so far.
    pub fn transcript(&self) -> Arc<Mutex<Vec<Exchange>>> {
        Arc::clone(&self.transcript)
    }

    fn await_response(ctx: &NodeContext<BankMessage>) -> SimResult<Response> {
        loop {
            let envelope = ctx.receive()?;
            let sender = envelope.sender().to_string();
            match envelope.into_payload() {
                BankMessage::Response(response) => return Ok(response),
                BankMessage::Request(request) => {
                    warn!(node = %ctx.name(), %sender, %request, "client ignoring request");
                }
            }
        }
    }
}

impl Node<BankMessage> for BankClient {
    fn program(&self, ctx: &NodeContext<BankMessage>) -> SimResult<()> {
        ctx.log("starting");

        for request in self.workload.requests() {
            ctx.send(&self.server, &BankMessage::Request(request.clone()))?;

            let response = Self::await_response(ctx)?;
            ctx.log(&describe(&response));
            self.transcript
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Exchange { request, response });

            ctx.sleep(self.pause)?;
        }
        ctx.log("done sending");

        ctx.sleep(self.settle)?;
        ctx.log("stopping");
        Ok(())
    }
}
