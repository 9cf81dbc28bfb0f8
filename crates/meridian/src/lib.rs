//! # meridian: message-passing node simulation on a sphere
//!
//! `meridian` runs a set of named nodes, each on its own thread, that talk
//! to one another only by sending messages. Every node sits at a random
//! point on a unit sphere, and a message takes longer to arrive the farther
//! apart its sender and recipient are.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Simulation                           │
//! │  ┌──────────────┐  ┌───────────────┐  ┌───────────────────┐   │
//! │  │ NodeRegistry │  │ GroupRegistry │  │ LatencyModel      │   │
//! │  │ name → node  │  │ name → group  │  │ + SimRng          │   │
//! │  └──────────────┘  └───────────────┘  └───────────────────┘   │
//! │                                                                │
//! │  send ──isolate──► Scheduler (timer heap) ──fire──► inbox      │
//! │                                                     │          │
//! │                      synchronous node: receive() ◄──┤          │
//! │                      asynchronous node: lane ──► on_receive    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Names are unique across nodes and groups.
//! - A delivered payload never shares mutable state with the sender's copy
//!   (see [`Isolate`]).
//! - Envelopes reach a node in the order their delays elapse, not the order
//!   they were sent.
//! - `on_receive` never runs concurrently for the same node, and a slow
//!   handler never delays other nodes' deliveries.
//!
//! ## Quick start
//!
//! ```
//! use meridian::{DeliveryMode, MemorySink, NodeContext, SimConfig, SimResult, Simulation};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let sim: Simulation<u32> = Simulation::builder(SimConfig::default().with_seed(1))
//!     .sink(sink.clone())
//!     .build()?;
//!
//! let counter = sim.spawn("counter", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
//!     let total: u32 = (0..3).map(|_| ctx.receive().map(|e| *e.payload())).sum::<SimResult<u32>>()?;
//!     ctx.log(&format!("total {total}"));
//!     Ok(())
//! })?;
//! sim.spawn("source", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
//!     for n in 1..=3 {
//!         ctx.send("counter", &n)?;
//!     }
//!     Ok(())
//! })?;
//!
//! counter.join()?;
//! assert_eq!(sink.lines_containing("total 6").len(), 1);
//! # Ok::<(), meridian::SimError>(())
//! ```

mod envelope;
mod error;
mod isolate;
mod latency;
mod log;
mod node;
mod position;
mod registry;
mod rng;
mod scheduler;
mod simulation;
mod sync;

use serde::{Deserialize, Serialize};

pub use envelope::{Envelope, Payload};
pub use error::{SimError, SimResult};
pub use isolate::{Isolate, Postcard};
pub use latency::{
    DEFAULT_JITTER, DEFAULT_MAX_DELAY_MS, FixedLatency, LatencyModel, ScriptedLatency,
    SphericalLatency,
};
pub use log::{LogSink, MemorySink, SinkKind, StdoutSink, TracingSink, format_line};
pub use node::{DeliveryMode, Node, NodeContext, NodeHandle, NodeState};
pub use position::Position;
pub use registry::Group;
pub use rng::SimRng;
pub use scheduler::SchedulerStats;
pub use simulation::{Simulation, SimulationBuilder};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Transit time between antipodal nodes, in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter fraction `J`: each delay is scaled by a factor in `[1 - J, 1 + J)`.
    pub jitter: f64,
    /// Seed for positions and jitter. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Where node log lines go.
    pub log_sink: SinkKind,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: DEFAULT_JITTER,
            seed: None,
            log_sink: SinkKind::default(),
        }
    }
}

impl SimConfig {
    /// Makes the run reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_log_sink(mut self, log_sink: SinkKind) -> Self {
        self.log_sink = log_sink;
        self
    }

    /// Checks that the configuration describes a valid latency model.
    pub fn validate(&self) -> SimResult<()> {
        self.latency_model().map(drop)
    }

    /// The spherical latency model these settings describe.
    pub fn latency_model(&self) -> SimResult<SphericalLatency> {
        SphericalLatency::new(self.max_delay_ms, self.jitter)
    }
}
