//! Banking demo command.

use anyhow::{Context, Result};
use meridian::Simulation;
use meridian_bank::{BankMessage, describe, run_demo};
use meridian_config::MeridianConfig;
use tracing::info;

pub fn run(mut config: MeridianConfig, requests: Option<u32>, seed: Option<u64>) -> Result<()> {
    if let Some(requests) = requests {
        config.demo.requests = requests;
    }
    if let Some(seed) = seed {
        config.simulation.seed = Some(seed);
    }
    config.validate().context("Invalid configuration")?;

    let sim: Simulation<BankMessage> =
        Simulation::new(config.sim_config()).context("Failed to create simulation")?;
    info!(
        server = %config.demo.server,
        client = %config.demo.client,
        requests = config.demo.requests,
        seed = ?config.simulation.seed,
        "running bank demo"
    );
    let report =
        run_demo(&sim, &config.demo, config.simulation.seed).context("Demo run failed")?;
    sim.shutdown().context("Simulation did not shut down cleanly")?;
    info!(elapsed_ms = sim.elapsed().as_millis() as u64, "simulation stopped");

    println!();
    println!("Summary");
    println!("=======");
    for (i, exchange) in report.exchanges.iter().enumerate() {
        println!("{:>3}. {} -> {}", i + 1, exchange.request, describe(&exchange.response));
    }
    match report.final_balance {
        Some(balance) => println!("Final balance of {}: {balance}", config.demo.account),
        None => println!("Account {} does not exist", config.demo.account),
    }
    println!(
        "Messages: {} scheduled, {} delivered",
        report.stats.scheduled, report.stats.delivered
    );
    Ok(())
}
