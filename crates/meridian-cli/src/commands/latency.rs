//! Latency sampling command.

use anyhow::{Context, Result};
use meridian::{LatencyModel, Position, SimRng};
use meridian_config::MeridianConfig;

/// Prints two random positions and `samples` draws of the latency between
/// them under the configured model.
pub fn run(config: &MeridianConfig, samples: u32, seed: Option<u64>) -> Result<()> {
    let model = config
        .sim_config()
        .latency_model()
        .context("Invalid network configuration")?;

    let mut rng = seed
        .or(config.simulation.seed)
        .map_or_else(SimRng::from_entropy, SimRng::new);
    let from = Position::random(&mut rng);
    let to = Position::random(&mut rng);

    println!("seed:     {}", rng.seed());
    println!("from:     {from}");
    println!("to:       {to}");
    println!("distance: {:.4} rad", from.distance(&to));
    println!("base:     {:.0}ms", model.base_delay_ms(&from, &to));

    for i in 1..=samples {
        let delay = model.latency(&from, &to, &mut rng);
        println!("{i:>4}  {}ms", delay.as_millis());
    }
    Ok(())
}
