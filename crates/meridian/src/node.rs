//! Nodes: named execution units with a position, a delivery mode and an
//! inbox.
//!
//! Each node runs its [`Node::program`] on a dedicated thread. What happens
//! to an incoming envelope depends on the node's [`DeliveryMode`]:
//!
//! - **Synchronous** nodes find envelopes in their inbox and take them with
//!   [`NodeContext::receive`], which blocks while the inbox is empty.
//! - **Asynchronous** nodes have [`Node::on_receive`] invoked for them by a
//!   delivery lane owned by the node. There is exactly one lane per node, so
//!   handler invocations for one node never overlap, and a slow handler only
//!   holds up envelopes addressed to the same node.
//!
//! Cancellation is cooperative: [`NodeHandle::cancel`] raises a flag that
//! every blocking call on the node ([`NodeContext::receive`],
//! [`NodeContext::sleep`]) observes, returning [`SimError::Cancelled`].

use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::envelope::{Envelope, Payload};
use crate::error::{SimError, SimResult};
use crate::position::Position;
use crate::simulation::Shared;
use crate::sync::{lock, read, wait, wait_timeout};

/// How envelopes reach a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Envelopes queue in the inbox until the program calls `receive`.
    Synchronous,
    /// Envelopes are handed to `on_receive` as soon as they arrive.
    Asynchronous,
}

impl DeliveryMode {
    pub fn is_asynchronous(self) -> bool {
        matches!(self, Self::Asynchronous)
    }
}

impl Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronous => write!(f, "synchronous"),
            Self::Asynchronous => write!(f, "asynchronous"),
        }
    }
}

/// Lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Created,
    Running,
    Terminated,
}

/// Behavior of a simulated node.
///
/// Closures of type `Fn(&NodeContext<M>) -> SimResult<()>` implement this
/// trait, which covers synchronous nodes. Asynchronous nodes need a type that
/// overrides [`on_receive`](Node::on_receive).
pub trait Node<M>: Send + Sync + 'static {
    /// The node's main program. Runs once, on the node's own thread.
    ///
    /// Returning `Err(SimError::Cancelled { .. })` (usually by `?` on a
    /// blocking call) is the normal way to stop after cancellation; the
    /// engine logs it and treats it as a clean exit.
    fn program(&self, ctx: &NodeContext<M>) -> SimResult<()>;

    /// Handles one delivered envelope on an asynchronous node.
    ///
    /// Never called concurrently for the same node.
    fn on_receive(&self, ctx: &NodeContext<M>, _envelope: Envelope<M>) -> SimResult<()> {
        Err(SimError::HandlerNotImplemented {
            node: ctx.name().to_string(),
        })
    }
}

impl<M, F> Node<M> for F
where
    F: Fn(&NodeContext<M>) -> SimResult<()> + Send + Sync + 'static,
{
    fn program(&self, ctx: &NodeContext<M>) -> SimResult<()> {
        self(ctx)
    }
}

struct Inbox<M> {
    queue: VecDeque<Envelope<M>>,
    cancelled: bool,
}

/// Engine-side state of one node, shared by its program thread, its
/// delivery lane, the registry and pending delivery tasks.
pub(crate) struct NodeCell<M> {
    name: String,
    position: Position,
    mode: DeliveryMode,
    inbox: Mutex<Inbox<M>>,
    signal: Condvar,
    state: Mutex<NodeState>,
    behavior: Arc<dyn Node<M>>,
}

impl<M> NodeCell<M> {
    pub(crate) fn new(
        name: String,
        position: Position,
        mode: DeliveryMode,
        behavior: Arc<dyn Node<M>>,
    ) -> Self {
        Self {
            name,
            position,
            mode,
            inbox: Mutex::new(Inbox {
                queue: VecDeque::new(),
                cancelled: false,
            }),
            signal: Condvar::new(),
            state: Mutex::new(NodeState::Created),
            behavior,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub(crate) fn state(&self) -> NodeState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        *lock(&self.state) = state;
    }

    /// Appends a delivered envelope and wakes every waiter.
    ///
    /// Returns false, dropping the envelope, if the node was cancelled.
    pub(crate) fn enqueue(&self, envelope: Envelope<M>) -> bool {
        let mut inbox = lock(&self.inbox);
        if inbox.cancelled {
            return false;
        }
        inbox.queue.push_back(envelope);
        self.signal.notify_all();
        true
    }

    /// Blocks until the inbox is non-empty and pops the oldest envelope.
    pub(crate) fn next_envelope(&self) -> SimResult<Envelope<M>> {
        let mut inbox = lock(&self.inbox);
        loop {
            if inbox.cancelled {
                return Err(self.cancelled());
            }
            if let Some(envelope) = inbox.queue.pop_front() {
                self.signal.notify_all();
                return Ok(envelope);
            }
            inbox = wait(&self.signal, inbox);
        }
    }

    /// Like `next_envelope`, giving up after `timeout`.
    ///
    /// A timeout too large to represent as an instant waits without limit.
    pub(crate) fn next_envelope_timeout(&self, timeout: Duration) -> SimResult<Option<Envelope<M>>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.next_envelope().map(Some);
        };
        let mut inbox = lock(&self.inbox);
        loop {
            if inbox.cancelled {
                return Err(self.cancelled());
            }
            if let Some(envelope) = inbox.queue.pop_front() {
                self.signal.notify_all();
                return Ok(Some(envelope));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            inbox = wait_timeout(&self.signal, inbox, deadline - now);
        }
    }

    /// Blocks for `duration` unless cancelled first.
    ///
    /// `Duration::MAX` (or anything past the representable future) blocks
    /// until cancellation.
    pub(crate) fn pause(&self, duration: Duration) -> SimResult<()> {
        let deadline = Instant::now().checked_add(duration);
        let mut inbox = lock(&self.inbox);
        loop {
            if inbox.cancelled {
                return Err(self.cancelled());
            }
            inbox = match deadline {
                None => wait(&self.signal, inbox),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    wait_timeout(&self.signal, inbox, deadline - now)
                }
            };
        }
    }

    pub(crate) fn pending(&self) -> usize {
        lock(&self.inbox).queue.len()
    }

    /// Raises the cancellation flag. Queued envelopes are abandoned.
    pub(crate) fn cancel(&self) {
        let mut inbox = lock(&self.inbox);
        if !inbox.cancelled {
            inbox.cancelled = true;
            debug!(node = %self.name, abandoned = inbox.queue.len(), "node cancelled");
        }
        self.signal.notify_all();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        lock(&self.inbox).cancelled
    }

    fn cancelled(&self) -> SimError {
        SimError::Cancelled {
            node: self.name.clone(),
        }
    }
}

/// A node's view of the simulation, passed to its program and handler.
pub struct NodeContext<M> {
    cell: Arc<NodeCell<M>>,
    shared: Arc<Shared<M>>,
}

impl<M> Clone for NodeContext<M> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> NodeContext<M> {
    pub(crate) fn new(cell: Arc<NodeCell<M>>, shared: Arc<Shared<M>>) -> Self {
        Self { cell, shared }
    }

    pub fn name(&self) -> &str {
        self.cell.name()
    }

    pub fn position(&self) -> Position {
        self.cell.position()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.cell.mode()
    }

    /// Number of delivered envelopes not yet taken.
    pub fn pending(&self) -> usize {
        self.cell.pending()
    }

    /// Blocks the calling thread for `duration`, returning early with
    /// `Cancelled` if the node is cancelled.
    pub fn sleep(&self, duration: Duration) -> SimResult<()> {
        self.cell.pause(duration)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cell.is_cancelled()
    }

    /// Writes a time-stamped line to the simulation log.
    pub fn log(&self, message: &str) {
        self.shared.journal.write(self.name(), message);
    }

    /// Time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        self.shared.journal.elapsed()
    }
}

impl<M: Payload> NodeContext<M> {
    /// Sends a copy of `payload` to the node or group called `target`.
    ///
    /// A group name broadcasts (see [`broadcast`](Self::broadcast)). The
    /// payload is isolated before this returns, so the caller may mutate its
    /// original freely afterwards.
    ///
    /// # Errors
    ///
    /// `UnknownRecipient` if no node or group has that name, `Isolation` if
    /// the payload cannot be copied, `SchedulerStopped` after shutdown.
    pub fn send(&self, target: &str, payload: &M) -> SimResult<()> {
        let recipient = read(&self.shared.nodes).find(target);
        match recipient {
            Some(cell) => {
                let copy = payload.isolate()?;
                self.transmit(target, &cell, copy)
            }
            None => self.broadcast(target, payload).map(drop),
        }
    }

    /// Sends an independent copy of `payload` to every member of `group`,
    /// each with its own latency. The envelopes are addressed to the group.
    ///
    /// Every member is resolved and every copy made before anything is
    /// scheduled, so an unknown member or an isolation failure sends nothing.
    /// Returns the number of envelopes scheduled.
    pub fn broadcast(&self, group: &str, payload: &M) -> SimResult<usize> {
        let members = {
            let nodes = read(&self.shared.nodes);
            let groups = read(&self.shared.groups);
            groups
                .get(group)?
                .members()
                .iter()
                .map(|member| nodes.get(member))
                .collect::<SimResult<Vec<_>>>()?
        };
        let copies = members
            .iter()
            .map(|_| payload.isolate())
            .collect::<SimResult<Vec<_>>>()?;

        debug!(node = %self.name(), group, members = members.len(), "broadcast");
        for (member, copy) in members.iter().zip(copies) {
            self.transmit(group, member, copy)?;
        }
        Ok(members.len())
    }

    fn transmit(&self, recipient: &str, target: &Arc<NodeCell<M>>, copy: M) -> SimResult<()> {
        let delay = {
            let mut rng = lock(&self.shared.rng);
            self.shared
                .latency
                .latency(&self.cell.position(), &target.position(), &mut rng)
        };
        let envelope = Envelope::new(self.name(), recipient, copy);
        self.log(&format!("send {envelope} (latency={}ms)", delay.as_millis()));
        debug!(
            node = %self.name(),
            target = %target.name(),
            recipient,
            delay_ms = delay.as_millis() as u64,
            "scheduled"
        );
        self.shared
            .scheduler
            .schedule(Arc::clone(target), envelope, delay)
    }

    /// Takes the oldest delivered envelope, blocking while the inbox is
    /// empty.
    ///
    /// # Errors
    ///
    /// `ReceiveOnAsynchronous` on an asynchronous node, `Cancelled` once the
    /// node has been cancelled.
    pub fn receive(&self) -> SimResult<Envelope<M>> {
        self.ensure_synchronous()?;
        let envelope = self.cell.next_envelope()?;
        self.log(&format!("receive {envelope} (synchronous)"));
        Ok(envelope)
    }

    /// Like [`receive`](Self::receive), returning `Ok(None)` if nothing
    /// arrives within `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> SimResult<Option<Envelope<M>>> {
        self.ensure_synchronous()?;
        let envelope = self.cell.next_envelope_timeout(timeout)?;
        if let Some(envelope) = &envelope {
            self.log(&format!("receive {envelope} (synchronous)"));
        }
        Ok(envelope)
    }

    fn ensure_synchronous(&self) -> SimResult<()> {
        if self.mode().is_asynchronous() {
            return Err(SimError::ReceiveOnAsynchronous {
                node: self.name().to_string(),
            });
        }
        Ok(())
    }
}

/// Handle to a running node, returned by `Simulation::spawn`.
pub struct NodeHandle<M> {
    cell: Arc<NodeCell<M>>,
    thread: JoinHandle<SimResult<()>>,
}

impl<M> NodeHandle<M> {
    pub(crate) fn new(cell: Arc<NodeCell<M>>, thread: JoinHandle<SimResult<()>>) -> Self {
        Self { cell, thread }
    }

    pub fn name(&self) -> &str {
        self.cell.name()
    }

    pub fn state(&self) -> NodeState {
        self.cell.state()
    }

    /// Delivers the cancellation signal to the node.
    pub fn cancel(&self) {
        self.cell.cancel();
    }

    /// True once the program thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the program to finish and returns its result.
    ///
    /// A program that ended through cancellation reports `Ok(())`.
    pub fn join(self) -> SimResult<()> {
        let name = self.cell.name().to_string();
        self.thread
            .join()
            .map_err(|_| SimError::NodePanicked { node: name })?
    }
}

/// Marks a node terminated when its program thread exits, panicking or not.
struct TerminateOnExit<'a, M>(&'a NodeCell<M>);

impl<M> Drop for TerminateOnExit<'_, M> {
    fn drop(&mut self) {
        self.0.set_state(NodeState::Terminated);
    }
}

/// Body of a node's program thread.
pub(crate) fn run_program<M: Payload>(ctx: &NodeContext<M>) -> SimResult<()> {
    let _terminate = TerminateOnExit(&ctx.cell);
    debug!(node = %ctx.name(), mode = %ctx.mode(), "program started");

    match ctx.cell.behavior.program(ctx) {
        Err(err) if err.is_cancelled() => {
            ctx.log("interrupted");
            Ok(())
        }
        Err(err) => {
            error!(node = %ctx.name(), error = %err, "program failed");
            Err(err)
        }
        Ok(()) => {
            debug!(node = %ctx.name(), "program finished");
            Ok(())
        }
    }
}

/// Body of an asynchronous node's delivery lane: hands each envelope to
/// `on_receive`, one at a time, in arrival order.
///
/// Runs until the node is cancelled. A handler error stops the lane and is
/// reported by `Simulation::shutdown`, except for the sends that fail because
/// the simulation is already shutting down.
pub(crate) fn run_delivery_lane<M: Payload>(ctx: &NodeContext<M>) -> SimResult<()> {
    loop {
        let envelope = match ctx.cell.next_envelope() {
            Ok(envelope) => envelope,
            Err(err) if err.is_cancelled() => return Ok(()),
            Err(err) => return Err(err),
        };
        ctx.log(&format!("receive {envelope} (asynchronous)"));

        let result = ctx.cell.behavior.on_receive(ctx, envelope);
        ctx.shared.scheduler.record_delivered();
        match result {
            Ok(()) => {}
            Err(err) if err.is_cancelled() || matches!(err, SimError::SchedulerStopped) => {
                return Ok(());
            }
            Err(err) => {
                error!(node = %ctx.name(), error = %err, "asynchronous handler failed");
                return Err(err);
            }
        }
    }
}
