//! Delivery scheduler: fires delivery tasks once their latency has elapsed.
//!
//! A single timer thread owns a min-heap of tasks keyed by fire time (ties
//! broken by scheduling order). When a task fires, its envelope is appended
//! to the target's inbox. For a synchronous target that is the delivery; for
//! an asynchronous target the node's own delivery lane picks it up and runs
//! the handler, so the timer thread never executes user code and one slow
//! handler cannot hold up deliveries to other nodes.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::envelope::{Envelope, Payload};
use crate::error::{SimError, SimResult};
use crate::node::NodeCell;
use crate::sync::{lock, wait, wait_timeout};

/// Name of the timer thread.
const TIMER_THREAD: &str = "meridian-timer";

/// Point-in-time view of the scheduler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks accepted by `schedule`.
    pub scheduled: u64,
    /// Tasks whose delay elapsed.
    pub fired: u64,
    /// Envelopes placed in a synchronous inbox or handled by an
    /// asynchronous node.
    pub delivered: u64,
    /// Tasks still waiting to fire.
    pub pending: u64,
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    fired: AtomicU64,
    delivered: AtomicU64,
}

struct Task<M> {
    fire_at: Instant,
    seq: u64,
    target: Arc<NodeCell<M>>,
    envelope: Envelope<M>,
}

impl<M> PartialEq for Task<M> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<M> Eq for Task<M> {}

impl<M> PartialOrd for Task<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Task<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then(self.seq.cmp(&other.seq))
    }
}

struct TimerState<M> {
    heap: BinaryHeap<Reverse<Task<M>>>,
    next_seq: u64,
    stopped: bool,
}

struct TimerQueue<M> {
    state: Mutex<TimerState<M>>,
    wake: Condvar,
    counters: Counters,
}

pub(crate) struct Scheduler<M> {
    queue: Arc<TimerQueue<M>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Payload> Scheduler<M> {
    /// Creates the scheduler and starts its timer thread.
    pub(crate) fn start() -> SimResult<Self> {
        let queue = Arc::new(TimerQueue {
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                stopped: false,
            }),
            wake: Condvar::new(),
            counters: Counters::default(),
        });

        let timer_queue = Arc::clone(&queue);
        let timer = thread::Builder::new()
            .name(TIMER_THREAD.to_string())
            .spawn(move || timer_loop(&timer_queue))
            .map_err(|source| SimError::Spawn {
                node: TIMER_THREAD.to_string(),
                source,
            })?;

        Ok(Self {
            queue,
            timer: Mutex::new(Some(timer)),
        })
    }

    /// Arranges for `envelope` to reach `target` no earlier than `delay`
    /// from now.
    pub(crate) fn schedule(
        &self,
        target: Arc<NodeCell<M>>,
        envelope: Envelope<M>,
        delay: Duration,
    ) -> SimResult<()> {
        let mut state = lock(&self.queue.state);
        if state.stopped {
            return Err(SimError::SchedulerStopped);
        }
        self.queue
            .counters
            .scheduled
            .fetch_add(1, AtomicOrdering::Relaxed);

        // A delay past the representable future never elapses.
        let Some(fire_at) = Instant::now().checked_add(delay) else {
            trace!(node = %target.name(), ?delay, "delivery will never fire");
            return Ok(());
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Reverse(Task {
            fire_at,
            seq,
            target,
            envelope,
        }));
        self.queue.wake.notify_one();
        Ok(())
    }
}

impl<M> Scheduler<M> {
    pub(crate) fn record_delivered(&self) {
        self.queue
            .counters
            .delivered
            .fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        let pending = lock(&self.queue.state).heap.len() as u64;
        let counters = &self.queue.counters;
        SchedulerStats {
            scheduled: counters.scheduled.load(AtomicOrdering::Relaxed),
            fired: counters.fired.load(AtomicOrdering::Relaxed),
            delivered: counters.delivered.load(AtomicOrdering::Relaxed),
            pending,
        }
    }

    /// Stops the timer thread and abandons every pending task.
    ///
    /// Idempotent.
    pub(crate) fn stop(&self) {
        let abandoned = {
            let mut state = lock(&self.queue.state);
            state.stopped = true;
            let abandoned = state.heap.len();
            state.heap.clear();
            abandoned
        };
        self.queue.wake.notify_all();

        if let Some(handle) = lock(&self.timer).take() {
            if handle.join().is_err() {
                warn!("timer thread panicked");
            }
            debug!(abandoned, "delivery scheduler stopped");
        }
    }
}

fn timer_loop<M>(queue: &TimerQueue<M>) {
    let mut state = lock(&queue.state);
    loop {
        if state.stopped {
            return;
        }
        let now = Instant::now();
        match state.heap.peek().map(|Reverse(task)| task.fire_at) {
            None => state = wait(&queue.wake, state),
            Some(fire_at) if fire_at <= now => {
                let Some(Reverse(task)) = state.heap.pop() else {
                    continue;
                };
                drop(state);
                fire(queue, task);
                state = lock(&queue.state);
            }
            Some(fire_at) => state = wait_timeout(&queue.wake, state, fire_at - now),
        }
    }
}

fn fire<M>(queue: &TimerQueue<M>, task: Task<M>) {
    queue.counters.fired.fetch_add(1, AtomicOrdering::Relaxed);
    let Task {
        target, envelope, ..
    } = task;

    if !target.enqueue(envelope) {
        trace!(node = %target.name(), "delivery dropped, node cancelled");
        return;
    }
    if !target.mode().is_asynchronous() {
        queue.counters.delivered.fetch_add(1, AtomicOrdering::Relaxed);
    }
}
