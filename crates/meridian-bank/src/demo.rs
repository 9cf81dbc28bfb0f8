//! The banking scenario: one asynchronous server, one synchronous client.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use meridian::{DeliveryMode, SchedulerStats, SimResult, Simulation};
use meridian_config::DemoConfig;
use rust_decimal::Decimal;
use tracing::info;

use crate::client::{BankClient, Exchange, Workload};
use crate::protocol::BankMessage;
use crate::server::BankServer;
use crate::service::Bank;

/// Outcome of a demo run.
#[derive(Debug, Clone)]
pub struct DemoReport {
    pub exchanges: Vec<Exchange>,
    /// Balance of the demo account once the client stopped.
    pub final_balance: Option<Decimal>,
    pub stats: SchedulerStats,
}

/// Starts the server, waits `startup`, then runs the client to completion.
///
/// The client's amounts are drawn with `seed` when given.
pub fn run_demo(
    sim: &Simulation<BankMessage>,
    demo: &DemoConfig,
    seed: Option<u64>,
) -> SimResult<DemoReport> {
    let server = BankServer::new(Bank::with_demo_accounts());
    let ledger = server.ledger();
    sim.spawn(&demo.server, DeliveryMode::Asynchronous, server)?;

    thread::sleep(demo.startup());

    let workload = Workload::Random {
        account: demo.account.clone(),
        requests: demo.requests,
        min_amount: demo.min_amount,
        max_amount: demo.max_amount,
        seed,
    };
    let client = BankClient::new(&demo.server, workload)
        .with_pause(demo.pause())
        .with_settle(demo.settle());
    let transcript = client.transcript();
    sim.spawn(&demo.client, DeliveryMode::Synchronous, client)?
        .join()?;

    let final_balance = lock(&ledger).balance(&demo.account).ok();
    let exchanges = lock(&transcript).clone();
    info!(
        exchanges = exchanges.len(),
        final_balance = ?final_balance,
        "demo finished"
    );
    Ok(DemoReport {
        exchanges,
        final_balance,
        stats: sim.stats(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
