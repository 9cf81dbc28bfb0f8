//! The simulation context: owner of the registries, the scheduler and every
//! thread the engine starts.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::SimConfig;
use crate::envelope::Payload;
use crate::error::{SimError, SimResult};
use crate::latency::LatencyModel;
use crate::log::{Journal, LogSink};
use crate::node::{
    DeliveryMode, Node, NodeCell, NodeContext, NodeHandle, NodeState, run_delivery_lane,
    run_program,
};
use crate::position::Position;
use crate::registry::{Group, GroupRegistry, NodeRegistry};
use crate::rng::SimRng;
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::sync::{lock, read, write};

/// State reachable from every node thread.
pub(crate) struct Shared<M> {
    pub(crate) journal: Journal,
    pub(crate) rng: Mutex<SimRng>,
    pub(crate) latency: Arc<dyn LatencyModel>,
    pub(crate) nodes: RwLock<NodeRegistry<M>>,
    pub(crate) groups: RwLock<GroupRegistry>,
    pub(crate) scheduler: Scheduler<M>,
}

struct DeliveryLane {
    node: String,
    handle: JoinHandle<SimResult<()>>,
}

/// A running simulation.
///
/// Created with [`Simulation::new`] or [`Simulation::builder`], it owns the
/// node and group registries and the delivery scheduler. Nodes are started
/// with [`spawn`](Self::spawn); [`shutdown`](Self::shutdown) (or dropping
/// the simulation) cancels them and stops the engine's threads.
///
/// # Example
///
/// ```
/// use meridian::{DeliveryMode, NodeContext, SimConfig, SimResult, Simulation};
///
/// let sim: Simulation<String> = Simulation::new(SimConfig::default().with_seed(7))?;
/// let echo = sim.spawn(
///     "echo",
///     DeliveryMode::Synchronous,
///     |ctx: &NodeContext<String>| -> SimResult<()> {
///         let envelope = ctx.receive()?;
///         ctx.log(&format!("got {}", envelope.payload()));
///         Ok(())
///     },
/// )?;
/// sim.spawn("hello", DeliveryMode::Synchronous, |ctx: &NodeContext<String>| {
///     ctx.send("echo", &"hello".to_string())
/// })?;
/// echo.join()?;
/// sim.shutdown()?;
/// # Ok::<(), meridian::SimError>(())
/// ```
pub struct Simulation<M: Payload> {
    config: SimConfig,
    shared: Arc<Shared<M>>,
    lanes: Mutex<Vec<DeliveryLane>>,
    shut_down: AtomicBool,
}

impl<M: Payload> Simulation<M> {
    /// Creates a simulation with the spherical latency model and the log
    /// sink named in `config`.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: SimConfig) -> SimulationBuilder<M> {
        SimulationBuilder::new(config)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Starts a node at a random position.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if a node or group already uses `name`; the existing
    /// registration is left untouched.
    pub fn spawn(
        &self,
        name: impl Into<String>,
        mode: DeliveryMode,
        node: impl Node<M>,
    ) -> SimResult<NodeHandle<M>> {
        let position = Position::random(&mut lock(&self.shared.rng));
        self.spawn_at(name, mode, position, node)
    }

    /// Starts a node at a given position.
    ///
    /// Registration and thread start happen under the registry lock, so no
    /// other node can observe (or address) the new node before it runs.
    pub fn spawn_at(
        &self,
        name: impl Into<String>,
        mode: DeliveryMode,
        position: Position,
        node: impl Node<M>,
    ) -> SimResult<NodeHandle<M>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SimError::SchedulerStopped);
        }
        let name = name.into();

        let mut nodes = write(&self.shared.nodes);
        if read(&self.shared.groups).contains(&name) {
            return Err(SimError::DuplicateName { name });
        }
        let cell = Arc::new(NodeCell::new(name.clone(), position, mode, Arc::new(node)));
        nodes.insert(Arc::clone(&cell))?;

        match self.start_node(&cell) {
            Ok(handle) => {
                info!(node = %name, %mode, %position, "node started");
                Ok(handle)
            }
            Err(err) => {
                nodes.remove(&name);
                cell.cancel();
                Err(err)
            }
        }
    }

    fn start_node(&self, cell: &Arc<NodeCell<M>>) -> SimResult<NodeHandle<M>> {
        let ctx = NodeContext::new(Arc::clone(cell), Arc::clone(&self.shared));

        let lane = if cell.mode().is_asynchronous() {
            let lane_ctx = ctx.clone();
            Some(spawn_thread(
                format!("meridian-deliver-{}", cell.name()),
                cell.name(),
                move || run_delivery_lane(&lane_ctx),
            )?)
        } else {
            None
        };

        cell.set_state(NodeState::Running);
        let program = spawn_thread(
            format!("meridian-node-{}", cell.name()),
            cell.name(),
            move || run_program(&ctx),
        )
        .inspect_err(|_| cell.set_state(NodeState::Created))?;

        if let Some(handle) = lane {
            lock(&self.lanes).push(DeliveryLane {
                node: cell.name().to_string(),
                handle,
            });
        }
        Ok(NodeHandle::new(Arc::clone(cell), program))
    }

    /// Delivers the cancellation signal to the named node.
    pub fn cancel(&self, name: &str) -> SimResult<()> {
        read(&self.shared.nodes).get(name)?.cancel();
        Ok(())
    }

    /// Registers an empty group.
    ///
    /// # Errors
    ///
    /// `DuplicateName` if a node or group already uses `name`.
    pub fn create_group(&self, name: impl Into<String>) -> SimResult<()> {
        let name = name.into();
        let nodes = read(&self.shared.nodes);
        if nodes.contains(&name) {
            return Err(SimError::DuplicateName { name });
        }
        write(&self.shared.groups).insert(Group::new(name.clone()))?;
        debug!(group = %name, "group created");
        Ok(())
    }

    /// Appends `member` to `group`.
    ///
    /// The member need not exist yet; a broadcast checks that every member
    /// is registered at the time it is sent.
    pub fn add_member(&self, group: &str, member: impl Into<String>) -> SimResult<()> {
        let member = member.into();
        write(&self.shared.groups)
            .get_mut(group)?
            .add_member(member.clone())?;
        debug!(group, member = %member, "member added");
        Ok(())
    }

    /// Members of `group` in insertion order.
    pub fn group_members(&self, group: &str) -> SimResult<Vec<String>> {
        Ok(read(&self.shared.groups).get(group)?.members().to_vec())
    }

    pub fn group_size(&self, group: &str) -> SimResult<usize> {
        Ok(read(&self.shared.groups).get(group)?.len())
    }

    pub fn node_state(&self, name: &str) -> SimResult<NodeState> {
        Ok(read(&self.shared.nodes).get(name)?.state())
    }

    pub fn position(&self, name: &str) -> SimResult<Position> {
        Ok(read(&self.shared.nodes).get(name)?.position())
    }

    /// Registered node names, sorted.
    pub fn node_names(&self) -> Vec<String> {
        read(&self.shared.nodes).names()
    }

    /// Draws one latency sample between two registered nodes.
    pub fn latency_between(&self, from: &str, to: &str) -> SimResult<Duration> {
        let (from, to) = {
            let nodes = read(&self.shared.nodes);
            (nodes.get(from)?.position(), nodes.get(to)?.position())
        };
        let mut rng = lock(&self.shared.rng);
        Ok(self.shared.latency.latency(&from, &to, &mut rng))
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.scheduler.stats()
    }

    /// Time since the simulation was created.
    pub fn elapsed(&self) -> Duration {
        self.shared.journal.elapsed()
    }

    /// Stops the scheduler, cancels every node and joins the delivery lanes.
    ///
    /// Pending deliveries are abandoned. Node program threads are not joined;
    /// use [`NodeHandle::join`] for that. Returns the first error an
    /// asynchronous handler failed with, if any. Calling it again is a no-op.
    pub fn shutdown(&self) -> SimResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.scheduler.stop();
        for cell in read(&self.shared.nodes).cells() {
            cell.cancel();
        }

        let lanes = std::mem::take(&mut *lock(&self.lanes));
        let mut first_error = None;
        for lane in lanes {
            let result = lane.handle.join().unwrap_or_else(|_| {
                Err(SimError::NodePanicked {
                    node: lane.node.clone(),
                })
            });
            if let Err(err) = result {
                warn!(node = %lane.node, error = %err, "delivery lane failed");
                first_error.get_or_insert(err);
            }
        }

        let stats = self.stats();
        info!(
            scheduled = stats.scheduled,
            fired = stats.fired,
            delivered = stats.delivered,
            "simulation shut down"
        );
        first_error.map_or(Ok(()), Err)
    }
}

impl<M: Payload> Drop for Simulation<M> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "simulation dropped with a failed node");
        }
    }
}

fn spawn_thread<F>(
    thread_name: String,
    node: &str,
    body: F,
) -> SimResult<JoinHandle<SimResult<()>>>
where
    F: FnOnce() -> SimResult<()> + Send + 'static,
{
    thread::Builder::new()
        .name(thread_name)
        .spawn(body)
        .map_err(|source| SimError::Spawn {
            node: node.to_string(),
            source,
        })
}

/// Configures a [`Simulation`] beyond what [`SimConfig`] expresses.
pub struct SimulationBuilder<M> {
    config: SimConfig,
    sink: Option<Arc<dyn LogSink>>,
    latency: Option<Arc<dyn LatencyModel>>,
    _payload: PhantomData<fn() -> M>,
}

impl<M: Payload> SimulationBuilder<M> {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            sink: None,
            latency: None,
            _payload: PhantomData,
        }
    }

    /// Sends node log lines to `sink` instead of the configured one.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replaces the spherical latency model.
    pub fn latency_model(mut self, model: impl LatencyModel + 'static) -> Self {
        self.latency = Some(Arc::new(model));
        self
    }

    pub fn build(self) -> SimResult<Simulation<M>> {
        self.config.validate()?;

        let latency = match self.latency {
            Some(model) => model,
            None => Arc::new(self.config.latency_model()?),
        };
        let sink = self.sink.unwrap_or_else(|| self.config.log_sink.build());
        let rng = self.config.seed.map_or_else(SimRng::from_entropy, SimRng::new);
        debug!(seed = rng.seed(), ?latency, "simulation created");

        let shared = Arc::new(Shared {
            journal: Journal::new(sink),
            rng: Mutex::new(rng),
            latency,
            nodes: RwLock::new(NodeRegistry::new()),
            groups: RwLock::new(GroupRegistry::new()),
            scheduler: Scheduler::start()?,
        });

        Ok(Simulation {
            config: self.config,
            shared,
            lanes: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }
}
