//! Integration tests for the Manager's watchdog components
//!
//! The poller, departure timer and control handler run against in-memory
//! doubles, so every assertion is about exactly what reached the peer.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use airsales_core::{
    ControlCode, ProcessRole, SalesStat, SnapshotError, SnapshotSource, StatsRegister,
    TerminationArbiter, TerminationReason,
};
use airsales_ipc::ControlHandler;
use airsales_runtime::{DepartureTimer, NotifyPeer, StatsPoller, TerminateOnControlCode};
use airsales_testing::{
    FailingSnapshotSource, InMemorySnapshotChannel, RecordingControlSender,
    RecordingTerminationHandler,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THRESHOLD: i32 = 600_000;

struct Manager {
    arbiter: Arc<TerminationArbiter>,
    sender: Arc<RecordingControlSender>,
    terminations: Arc<RecordingTerminationHandler>,
}

fn manager() -> Manager {
    let arbiter = Arc::new(TerminationArbiter::new(ProcessRole::Manager));
    let sender = Arc::new(RecordingControlSender::connected());
    let terminations = Arc::new(RecordingTerminationHandler::new());

    arbiter.register(Arc::new(NotifyPeer::new(ProcessRole::Manager, sender.clone())));
    arbiter.register(terminations.clone());

    Manager {
        arbiter,
        sender,
        terminations,
    }
}

#[test]
fn threshold_sends_too_rich_exactly_once() {
    let manager = manager();
    let snapshots = Arc::new(InMemorySnapshotChannel::new());
    let mirror = Arc::new(StatsRegister::new());
    let poller = StatsPoller::new(
        snapshots.clone(),
        Arc::clone(&mirror),
        THRESHOLD,
        Arc::clone(&manager.arbiter),
    );

    snapshots.set(SalesStat::new(THRESHOLD - 1, 999));
    poller.tick();
    assert!(!manager.arbiter.is_terminated());

    snapshots.set(SalesStat::new(THRESHOLD, 1000));
    poller.tick();
    snapshots.set(SalesStat::new(THRESHOLD + 800, 1001));
    poller.tick();

    assert_eq!(manager.sender.sent(), vec![ControlCode::WeAreTooRichNow]);
    assert_eq!(manager.terminations.reasons(), vec![TerminationReason::TooRich]);
    assert_eq!(mirror.snapshot(), SalesStat::new(THRESHOLD + 800, 1001));
}

#[test]
fn failed_poll_skips_the_tick() {
    let manager = manager();
    let source = Arc::new(FailingSnapshotSource::new(1));
    source.inner().set(SalesStat::new(900, 2));
    let mirror = Arc::new(StatsRegister::new());
    let poller = StatsPoller::new(source.clone(), Arc::clone(&mirror), THRESHOLD, manager.arbiter);

    assert_eq!(poller.tick(), None);
    assert_eq!(mirror.snapshot(), SalesStat::default());

    assert_eq!(poller.tick(), Some(SalesStat::new(900, 2)));
    assert_eq!(mirror.snapshot(), SalesStat::new(900, 2));
}

#[tokio::test(start_paused = true)]
async fn poller_keeps_running_through_failures() {
    let manager = manager();
    let source = Arc::new(FailingSnapshotSource::new(3));
    source.inner().set(SalesStat::new(THRESHOLD, 1));
    let poller = StatsPoller::new(
        source,
        Arc::new(StatsRegister::new()),
        THRESHOLD,
        Arc::clone(&manager.arbiter),
    );

    let handle = poller.spawn(Duration::from_secs(1));
    tokio::time::timeout(Duration::from_secs(10), manager.arbiter.cancelled())
        .await
        .unwrap();
    handle.await.unwrap();

    assert_eq!(manager.arbiter.reason(), Some(TerminationReason::TooRich));
    assert_eq!(manager.sender.sent(), vec![ControlCode::WeAreTooRichNow]);
}

#[tokio::test(start_paused = true)]
async fn departure_timer_fires_once() {
    let manager = manager();

    DepartureTimer::new(Duration::from_secs(150), Arc::clone(&manager.arbiter))
        .spawn()
        .await
        .unwrap();

    assert_eq!(manager.arbiter.reason(), Some(TerminationReason::Departure));
    assert_eq!(manager.sender.sent(), vec![ControlCode::Departure]);
}

#[tokio::test(start_paused = true)]
async fn departure_timer_stands_down_after_other_termination() {
    let manager = manager();
    let timer = DepartureTimer::new(Duration::from_secs(150), Arc::clone(&manager.arbiter)).spawn();

    manager.arbiter.terminate(TerminationReason::SoldOut);
    timer.await.unwrap();

    assert_eq!(manager.arbiter.reason(), Some(TerminationReason::SoldOut));
    assert!(manager.sender.sent().is_empty());
}

#[test]
fn sold_out_from_seller_terminates_without_reply() {
    let manager = manager();
    let handler = TerminateOnControlCode::new(Arc::clone(&manager.arbiter));

    handler.on_code(ControlCode::AllFlightsSoldOut);
    handler.on_code(ControlCode::AllFlightsSoldOut);

    assert_eq!(manager.terminations.reasons(), vec![TerminationReason::SoldOut]);
    assert!(manager.sender.sent().is_empty());
}

#[test]
fn codes_after_termination_have_no_effect() {
    let manager = manager();
    manager.arbiter.terminate(TerminationReason::Departure);
    let handler = TerminateOnControlCode::new(Arc::clone(&manager.arbiter));

    handler.on_code(ControlCode::AllFlightsSoldOut);
    handler.on_code(ControlCode::Departure);

    assert_eq!(manager.terminations.reasons(), vec![TerminationReason::Departure]);
    assert_eq!(manager.sender.sent(), vec![ControlCode::Departure]);
}

#[test]
fn concurrent_triggers_notify_once() {
    let manager = manager();
    let barrier = Arc::new(Barrier::new(3));
    let triggers = [
        TerminationReason::Departure,
        TerminationReason::TooRich,
        TerminationReason::SoldOut,
    ];

    let handles: Vec<_> = triggers
        .into_iter()
        .map(|reason| {
            let arbiter = Arc::clone(&manager.arbiter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                arbiter.terminate(reason)
            })
        })
        .collect();
    let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();

    assert_eq!(wins, 1);
    let reasons = manager.terminations.reasons();
    assert_eq!(reasons.len(), 1);
    let expected: Vec<_> = match reasons[0] {
        TerminationReason::Departure => vec![ControlCode::Departure],
        TerminationReason::TooRich => vec![ControlCode::WeAreTooRichNow],
        TerminationReason::SoldOut => vec![],
    };
    assert_eq!(manager.sender.sent(), expected);
}

/// A snapshot read that holds its thread, as a contended cross-process lock
/// does.
#[derive(Default)]
struct SlowSource {
    reading: AtomicBool,
}

impl SnapshotSource for SlowSource {
    fn read(&self) -> Result<SalesStat, SnapshotError> {
        self.reading.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(300));
        self.reading.store(false, Ordering::SeqCst);
        Ok(SalesStat::default())
    }
}

#[tokio::test]
async fn slow_snapshot_read_does_not_stall_the_runtime() {
    let manager = manager();
    let source = Arc::new(SlowSource::default());
    let handle = StatsPoller::new(
        source.clone(),
        Arc::new(StatsRegister::new()),
        THRESHOLD,
        Arc::clone(&manager.arbiter),
    )
    .spawn(Duration::from_millis(10));

    // On this single-threaded runtime the loop only observes a read in
    // progress if the read is off the runtime thread.
    let observed = tokio::time::timeout(Duration::from_secs(2), async {
        while !source.reading.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(observed.is_ok());

    manager.arbiter.cancel();
    handle.await.unwrap();
}
