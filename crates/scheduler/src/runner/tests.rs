use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fairsched_core::{
    ClientConfig, ConfigError, SchedulingConfig, Task, ATTR_DEADLINE, ATTR_PRIORITY,
    ATTR_REQUIRED_RESOURCES, ATTR_TENANT_ID,
};
use fairsched_strategy::{ReadyQueue, Strategy, StrategyError, StrategyRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::error::{DispatchError, SchedulerError};
use crate::state::LoopState;
use crate::usage::{CompletionNotice, UsageReporter};

use super::{LoopReport, SchedulerHandle, SchedulerLoop};

const CLIENT: &str = "billing";

/// Dispatcher that forwards every request to a channel and fails on
/// selected workflow ids.
struct RecordingDispatcher {
    sent: mpsc::UnboundedSender<DispatchRequest>,
    failing: HashSet<String>,
}

impl RecordingDispatcher {
    fn new() -> (Self, mpsc::UnboundedReceiver<DispatchRequest>) {
        let (sent, rx) = mpsc::unbounded_channel();
        (
            Self {
                sent,
                failing: HashSet::new(),
            },
            rx,
        )
    }

    fn failing_on(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), DispatchError> {
        let workflow_id = request.workflow_id.clone();
        let _ = self.sent.send(request);
        if self.failing.contains(&workflow_id) {
            return Err(DispatchError::Failed {
                workflow_id,
                reason: "substrate rejected".into(),
            });
        }
        Ok(())
    }
}

/// Strategy that never prefers anything, counts hooks, and optionally
/// fails every comparison.
#[derive(Default)]
struct MockStrategy {
    faulty: bool,
    dispatches: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MockStrategy {
    fn faulty() -> Self {
        Self {
            faulty: true,
            ..Self::default()
        }
    }

    fn dispatch_count(&self) -> usize {
        self.dispatches.load(AtomicOrdering::Relaxed)
    }

    fn shutdown_count(&self) -> usize {
        self.shutdowns.load(AtomicOrdering::Relaxed)
    }
}

impl Strategy for MockStrategy {
    fn name(&self) -> &str {
        "mock"
    }

    fn can_compare(&self, _a: &Task, _b: &Task) -> bool {
        true
    }

    fn compare(&self, a: &Task, b: &Task) -> Result<Ordering, StrategyError> {
        if self.faulty {
            return Err(StrategyError::incomparable(
                "mock",
                &a.workflow_id,
                &b.workflow_id,
                "always broken",
            ));
        }
        Ok(Ordering::Equal)
    }

    fn preprocess(&self, _queue: &mut ReadyQueue, _now: DateTime<Utc>) {}

    fn on_dispatch(&self, _task: &Task, _at: DateTime<Utc>) {
        self.dispatches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn on_shutdown(&self) {
        self.shutdowns.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

fn config(strategy: &str) -> SchedulingConfig {
    SchedulingConfig::default().with_client(CLIENT, ClientConfig::new("billing-queue", strategy))
}

fn registry() -> StrategyRegistry {
    StrategyRegistry::with_defaults(&SchedulingConfig::default())
}

fn start(
    config: &SchedulingConfig,
    registry: &StrategyRegistry,
    dispatcher: RecordingDispatcher,
) -> (SchedulerHandle, JoinHandle<LoopReport>) {
    let (scheduler, handle) =
        SchedulerLoop::new(CLIENT, config, registry, Arc::new(dispatcher)).unwrap();
    (handle, tokio::spawn(scheduler.run()))
}

async fn recv_ids(rx: &mut mpsc::UnboundedReceiver<DispatchRequest>, n: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        let request = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for dispatch")
            .expect("dispatcher dropped");
        ids.push(request.workflow_id);
    }
    ids
}

async fn stop(handle: &SchedulerHandle, runner: JoinHandle<LoopReport>) -> LoopReport {
    handle.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("loop did not drain")
        .unwrap()
}

fn prioritized(id: &str, priority: i64) -> Task {
    Task::new("Invoice", id).with_attr(ATTR_PRIORITY, priority)
}

fn for_tenant(id: &str, tenant: &str) -> Task {
    Task::new("Invoice", id).with_attr(ATTR_TENANT_ID, tenant)
}

// ── Construction ────────────────────────────────────────────────────

#[test]
fn unknown_client_fails_fast() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let result = SchedulerLoop::new("nope", &config("priority"), &registry(), Arc::new(dispatcher));
    assert!(matches!(
        result,
        Err(SchedulerError::Config(ConfigError::UnknownClient(ref name))) if name == "nope"
    ));
}

#[test]
fn unknown_strategy_fails_fast() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let result = SchedulerLoop::new(
        CLIENT,
        &config("priority+bogus"),
        &registry(),
        Arc::new(dispatcher),
    );
    assert!(matches!(
        result,
        Err(SchedulerError::Config(ConfigError::UnknownStrategy { .. }))
    ));
}

#[test]
fn invalid_config_fails_fast() {
    let mut config = config("priority");
    config.backpressure.window_seconds = u64::MAX;
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let result = SchedulerLoop::new(CLIENT, &config, &registry(), Arc::new(dispatcher));
    assert!(matches!(
        result,
        Err(SchedulerError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn loop_resolves_strategy_chain() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let (scheduler, handle) = SchedulerLoop::new(
        CLIENT,
        &config("priority+deadline"),
        &registry(),
        Arc::new(dispatcher),
    )
    .unwrap();
    assert_eq!(scheduler.client(), CLIENT);
    assert_eq!(scheduler.strategy_name(), "priority+deadline");
    assert_eq!(scheduler.state(), LoopState::AwaitingTasks);
    assert_eq!(handle.client(), CLIENT);
}

// ── Selection ───────────────────────────────────────────────────────

#[tokio::test]
async fn dispatches_in_priority_order() {
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("priority"), &registry(), dispatcher);

    handle
        .submit_tasks(vec![
            prioritized("p1", 1),
            prioritized("p3", 3),
            prioritized("p2", 2),
        ])
        .unwrap();

    assert_eq!(recv_ids(&mut rx, 3).await, vec!["p3", "p2", "p1"]);
    assert_eq!(handle.queue_length().await.unwrap(), 0);

    let report = stop(&handle, runner).await;
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.remaining, 0);

    let metrics = handle.metrics();
    assert_eq!(metrics.tasks_dispatched, 3);
    assert_eq!(metrics.dispatched_by_type["Invoice"], 3);
    assert_eq!(metrics.state, LoopState::Terminated);
}

#[tokio::test]
async fn duplicate_ids_are_not_deduplicated() {
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("priority"), &registry(), dispatcher);

    handle
        .submit_tasks(vec![prioritized("dup", 1), prioritized("dup", 2)])
        .unwrap();

    assert_eq!(recv_ids(&mut rx, 2).await, vec!["dup", "dup"]);
    assert_eq!(stop(&handle, runner).await.dispatched, 2);
}

#[tokio::test]
async fn expired_deadline_is_never_dispatched() {
    let now = Utc::now();
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("deadline"), &registry(), dispatcher);

    handle
        .submit_tasks(vec![
            Task::new("Invoice", "expired").with_attr(ATTR_DEADLINE, now - chrono::Duration::hours(1)),
            Task::new("Invoice", "garbage").with_attr(ATTR_DEADLINE, "not a timestamp"),
            Task::new("Invoice", "fresh").with_attr(ATTR_DEADLINE, now + chrono::Duration::hours(1)),
        ])
        .unwrap();

    assert_eq!(recv_ids(&mut rx, 2).await, vec!["garbage", "fresh"]);
    assert_eq!(handle.queue_length().await.unwrap(), 0);

    let report = stop(&handle, runner).await;
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.remaining, 0);
}

#[tokio::test]
async fn comparator_faults_do_not_stall_selection() {
    let mut registry = registry();
    registry.register("faulty", Arc::new(MockStrategy::faulty()));
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("faulty"), &registry, dispatcher);

    handle
        .submit_tasks(vec![
            Task::new("Invoice", "a"),
            Task::new("Invoice", "b"),
            Task::new("Invoice", "c"),
        ])
        .unwrap();

    assert_eq!(recv_ids(&mut rx, 3).await, vec!["a", "b", "c"]);
    assert_eq!(stop(&handle, runner).await.dispatched, 3);
}

#[tokio::test]
async fn incomparable_pairs_keep_queue_order() {
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("priority"), &registry(), dispatcher);

    handle
        .submit_tasks(vec![Task::new("Invoice", "unranked"), prioritized("p5", 5)])
        .unwrap();

    assert_eq!(recv_ids(&mut rx, 2).await, vec!["unranked", "p5"]);
    stop(&handle, runner).await;
}

#[tokio::test]
async fn overflowing_resource_totals_do_not_stall_selection() {
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("resource"), &registry(), dispatcher);

    let small = HashMap::from([("cpu".to_string(), 1i64)]);
    let huge = HashMap::from([("cpu".to_string(), i64::MAX), ("mem".to_string(), 1i64)]);
    handle
        .submit_tasks(vec![
            Task::new("Invoice", "small").with_attr(ATTR_REQUIRED_RESOURCES, small),
            Task::new("Invoice", "huge").with_attr(ATTR_REQUIRED_RESOURCES, huge),
        ])
        .unwrap();

    assert_eq!(recv_ids(&mut rx, 2).await, vec!["small", "huge"]);
    let report = stop(&handle, runner).await;
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.remaining, 0);
    assert_eq!(handle.metrics().state, LoopState::Terminated);
}

// ── Drain ───────────────────────────────────────────────────────────

#[tokio::test]
async fn finished_dispatches_are_reaped_while_running() {
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (mut scheduler, _handle) = SchedulerLoop::new(
        CLIENT,
        &config("priority"),
        &registry(),
        Arc::new(dispatcher.failing_on(&["b"])),
    )
    .unwrap();

    scheduler
        .queue
        .extend([Task::new("Invoice", "a"), Task::new("Invoice", "b")]);
    scheduler.dispatch_at(0, Duration::ZERO);
    scheduler.dispatch_at(0, Duration::ZERO);
    recv_ids(&mut rx, 2).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while scheduler.in_flight.iter().any(|h| !h.is_finished()) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("dispatches did not finish");

    scheduler.reap_finished();
    assert!(scheduler.in_flight.is_empty());
    assert_eq!(scheduler.settled, 2);
    assert_eq!(scheduler.failed, 1);

    // reaped outcomes still show up in the final report
    let report = scheduler.drain().await;
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.awaited, 2);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn drain_awaits_failed_dispatches_and_shuts_down() {
    let mock = Arc::new(MockStrategy::default());
    let mut registry = registry();
    registry.register("mock", mock.clone());
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("mock"), &registry, dispatcher.failing_on(&["b"]));

    handle
        .submit_tasks(vec![
            Task::new("Invoice", "a"),
            Task::new("Invoice", "b"),
            Task::new("Invoice", "c"),
        ])
        .unwrap();
    recv_ids(&mut rx, 3).await;

    let report = stop(&handle, runner).await;
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.awaited, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(mock.dispatch_count(), 3);
    assert_eq!(mock.shutdown_count(), 1);
}

#[tokio::test]
async fn cancel_while_idle_terminates() {
    let mock = Arc::new(MockStrategy::default());
    let mut registry = registry();
    registry.register("mock", mock.clone());
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("mock"), &registry, dispatcher);

    assert_eq!(handle.queue_length().await.unwrap(), 0);
    let report = stop(&handle, runner).await;
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.awaited, 0);
    assert_eq!(mock.shutdown_count(), 1);
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn dropping_every_handle_stops_the_loop() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("priority"), &registry(), dispatcher);
    drop(handle);

    let report = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(report.dispatched, 0);
}

#[tokio::test]
async fn stopped_loop_rejects_signals() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("priority"), &registry(), dispatcher);
    stop(&handle, runner).await;

    assert!(matches!(
        handle.submit_tasks(vec![prioritized("late", 1)]),
        Err(SchedulerError::LoopClosed(_))
    ));
    assert!(matches!(
        handle.queue_length().await,
        Err(SchedulerError::LoopClosed(_))
    ));
}

// ── Backpressure ────────────────────────────────────────────────────

#[tokio::test]
async fn queue_length_is_stable_while_throttled() {
    let mut config = config("priority");
    config.backpressure.throughput_factor = 0.0001;
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config, &registry(), dispatcher);

    handle
        .submit_tasks(vec![
            prioritized("p3", 3),
            prioritized("p2", 2),
            prioritized("p1", 1),
        ])
        .unwrap();
    assert_eq!(recv_ids(&mut rx, 1).await, vec!["p3"]);

    let first = handle.queue_length().await.unwrap();
    let second = handle.queue_length().await.unwrap();
    assert_eq!(first, 2);
    assert_eq!(first, second);

    // cancelled mid-throttle: the selected task stays queued
    let report = stop(&handle, runner).await;
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.remaining, 2);
    assert_eq!(handle.metrics().throttle_count, 1);
}

// ── Usage accounting ────────────────────────────────────────────────

#[tokio::test]
async fn reported_usage_shifts_fair_share() {
    let (dispatcher, mut rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("fairness"), &registry(), dispatcher);

    handle.report_usage("acme", 5.0).unwrap();
    handle
        .submit_tasks(vec![for_tenant("a", "acme"), for_tenant("g", "globex")])
        .unwrap();

    assert_eq!(recv_ids(&mut rx, 2).await, vec!["g", "a"]);
    let metrics = handle.metrics();
    assert!((metrics.resource_usage_by_tenant["acme"] - 5.0).abs() < 1e-9);
    assert_eq!(metrics.dispatched_by_tenant["globex"], 1);
    assert_eq!(metrics.dispatched_by_tenant["acme"], 1);
    stop(&handle, runner).await;
}

#[tokio::test]
async fn invalid_usage_is_ignored() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("fairness"), &registry(), dispatcher);

    handle.report_usage("acme", -1.0).unwrap();
    handle.report_usage("acme", f64::NAN).unwrap();
    handle.queue_length().await.unwrap();

    assert!(handle.metrics().resource_usage_by_tenant.is_empty());
    stop(&handle, runner).await;
}

#[tokio::test]
async fn usage_without_usage_aware_strategy_is_dropped() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("priority"), &registry(), dispatcher);

    handle.report_usage("acme", 2.0).unwrap();
    handle.queue_length().await.unwrap();

    assert!(handle.metrics().resource_usage_by_tenant.is_empty());
    stop(&handle, runner).await;
}

#[tokio::test]
async fn usage_reporter_forwards_completions() {
    let (dispatcher, _rx) = RecordingDispatcher::new();
    let (handle, runner) = start(&config("priority+fairness"), &registry(), dispatcher);

    let (tx, notices) = mpsc::unbounded_channel();
    let forwarder = UsageReporter::new(handle.clone()).spawn_forwarder(notices);

    let now = Utc::now();
    tx.send(CompletionNotice {
        tenant: Some("acme".into()),
        started_at: now - chrono::Duration::milliseconds(2500),
        finished_at: now,
    })
    .unwrap();
    tx.send(CompletionNotice {
        tenant: None,
        started_at: now,
        finished_at: now,
    })
    .unwrap();
    drop(tx);
    forwarder.await.unwrap();
    handle.queue_length().await.unwrap();

    let usage = handle.metrics().resource_usage_by_tenant;
    assert_eq!(usage.len(), 1);
    assert!((usage["acme"] - 2.5).abs() < 1e-9);
    stop(&handle, runner).await;
}
