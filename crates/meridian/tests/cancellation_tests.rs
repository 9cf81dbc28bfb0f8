//! Tests for cooperative cancellation and simulation teardown.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use meridian::{
    DeliveryMode, FixedLatency, MemorySink, NodeContext, NodeState, SimConfig, SimError,
    SimResult, Simulation,
};

fn simulation() -> (Simulation<u32>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let sim = Simulation::builder(SimConfig::default().with_seed(13))
        .sink(sink.clone())
        .latency_model(FixedLatency::from_millis(5))
        .build()
        .unwrap();
    (sim, sink)
}

fn wait_forever(ctx: &NodeContext<u32>) -> SimResult<()> {
    ctx.receive()?;
    Ok(())
}

#[test]
fn test_cancel_while_blocked_in_receive_logs_interrupted() {
    let (sim, sink) = simulation();
    let handle = sim
        .spawn("C1", DeliveryMode::Synchronous, wait_forever)
        .unwrap();
    thread::sleep(Duration::from_millis(30));
    assert!(!handle.is_finished());

    handle.cancel();
    handle.join().unwrap();

    let interrupted = sink.lines_containing(" - C1 : interrupted");
    assert_eq!(interrupted.len(), 1);
    assert_eq!(sim.node_state("C1").unwrap(), NodeState::Terminated);
}

#[test]
fn test_cancel_interrupts_sleep() {
    let (sim, _sink) = simulation();
    let handle = sim
        .spawn("sleeper", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| {
            ctx.sleep(Duration::from_secs(60))
        })
        .unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    sim.cancel("sleeper").unwrap();
    handle.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_program_can_observe_cancellation_itself() {
    let (sim, sink) = simulation();
    let handle = sim
        .spawn("poller", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
            while !ctx.is_cancelled() {
                thread::sleep(Duration::from_millis(2));
            }
            ctx.log("stopping");
            Ok(())
        })
        .unwrap();
    handle.cancel();
    handle.join().unwrap();

    assert_eq!(sink.lines_containing("stopping").len(), 1);
    assert!(sink.lines_containing("interrupted").is_empty());
}

#[test]
fn test_cancelled_error_can_be_handled_by_the_program() {
    let (sim, sink) = simulation();
    let handle = sim
        .spawn("careful", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
            match ctx.receive() {
                Err(err) if err.is_cancelled() => {
                    ctx.log("cleaning up");
                    Ok(())
                }
                other => other.map(drop),
            }
        })
        .unwrap();
    thread::sleep(Duration::from_millis(10));
    handle.cancel();
    handle.join().unwrap();

    assert_eq!(sink.lines_containing("cleaning up").len(), 1);
}

#[test]
fn test_shutdown_cancels_every_node() {
    let (sim, sink) = simulation();
    let handles: Vec<_> = ["N1", "N2", "N3"]
        .iter()
        .map(|name| {
            sim.spawn(*name, DeliveryMode::Synchronous, wait_forever)
                .unwrap()
        })
        .collect();
    thread::sleep(Duration::from_millis(20));

    sim.shutdown().unwrap();
    sim.shutdown().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(sink.lines_containing("interrupted").len(), 3);
}

#[test]
fn test_send_after_shutdown_fails() {
    let (sim, _sink) = simulation();
    let _target = sim
        .spawn("T", DeliveryMode::Synchronous, wait_forever)
        .unwrap();
    let sender = sim
        .spawn("S", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
            while !ctx.is_cancelled() {
                thread::sleep(Duration::from_millis(2));
            }
            ctx.send("T", &1)
        })
        .unwrap();

    sim.shutdown().unwrap();
    let err = sender.join().unwrap_err();
    assert!(matches!(err, SimError::SchedulerStopped));
}

#[test]
fn test_pending_envelopes_are_abandoned_on_cancel() {
    let (sim, _sink) = simulation();
    let handle = sim
        .spawn("busy", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
            // Let deliveries pile up, then block until cancelled.
            while ctx.pending() < 3 {
                ctx.sleep(Duration::from_millis(5))?;
            }
            ctx.sleep(Duration::from_secs(60))
        })
        .unwrap();
    sim.spawn("S", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
        for n in 0..3 {
            ctx.send("busy", &n)?;
        }
        Ok(())
    })
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sim.stats().delivered < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    handle.cancel();
    handle.join().unwrap();
    assert_eq!(sim.stats().delivered, 3);

    // A cancelled node stays registered but no longer accepts deliveries.
    sim.spawn("late", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| {
        ctx.send("busy", &99)
    })
    .unwrap()
    .join()
    .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while sim.stats().fired < 4 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let stats = sim.stats();
    assert_eq!(stats.scheduled, 4);
    assert_eq!(stats.fired, 4);
    assert_eq!(stats.delivered, 3);
}

#[test]
fn test_unbounded_sleep_ends_with_cancellation() {
    let (sim, sink) = simulation();
    let handle = sim
        .spawn("s", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| {
            ctx.sleep(Duration::MAX)
        })
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(!handle.is_finished());

    handle.cancel();
    handle.join().unwrap();
    assert_eq!(sink.lines_containing(" - s : interrupted").len(), 1);
}

#[test]
fn test_unbounded_receive_timeout_still_receives_and_cancels() {
    let (sim, sink) = simulation();
    let handle = sim
        .spawn("r", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| -> SimResult<()> {
            let first = ctx.receive_timeout(Duration::MAX)?;
            ctx.log(&format!("got {}", first.map_or(0, |e| *e.payload())));
            ctx.receive_timeout(Duration::MAX)?;
            Ok(())
        })
        .unwrap();
    sim.spawn("w", DeliveryMode::Synchronous, |ctx: &NodeContext<u32>| {
        ctx.send("r", &5)
    })
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.lines_containing("got 5").is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(sink.lines_containing(" - r : got 5").len(), 1);

    handle.cancel();
    handle.join().unwrap();
    assert_eq!(sink.lines_containing(" - r : interrupted").len(), 1);
}
