//! Per-monitor polling scheduler.
//!
//! Each live monitor owns one spawned task with its own timer, so a slow or
//! hanging probe on one monitor never delays another. Within a single
//! monitor the loop awaits the full check cycle before the next tick, so at
//! most one cycle is ever in flight. Removing or updating a monitor aborts
//! its task at the next await point, discarding any in-flight result before
//! it is persisted.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use uuid::Uuid;

use super::classifier::classify;
use super::executor::ProbeExecutor;
use super::hysteresis::MonitorState;
use super::notifier::{NotificationDispatcher, TopicPublisher};
use super::types::CheckResult;
use crate::storage::models::Monitor;
use crate::storage::repository::Storage;
use crate::validation::validate_monitor;

pub struct MonitorScheduler {
    storage: Arc<dyn Storage>,
    dispatcher: Arc<NotificationDispatcher>,
    publisher: Arc<dyn TopicPublisher>,
    live: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl MonitorScheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        dispatcher: Arc<NotificationDispatcher>,
        publisher: Arc<dyn TopicPublisher>,
    ) -> Self {
        Self { storage, dispatcher, publisher, live: Mutex::new(HashMap::new()) }
    }

    /// Load every enabled monitor from storage and start polling it. A
    /// stored definition that no longer validates is skipped, not fatal;
    /// the rest of the fleet still comes up.
    pub async fn start(&self) -> anyhow::Result<()> {
        let monitors = self.storage.get_enabled_monitors().await?;
        for monitor in monitors {
            if let Err(e) = validate_monitor(&monitor) {
                tracing::error!(
                    monitor = %monitor.uuid,
                    name = %monitor.name,
                    "skipping invalid monitor definition: {e}"
                );
                continue;
            }
            self.add_monitor(monitor).await;
        }
        Ok(())
    }

    /// Register a monitor and begin polling it. The first check fires
    /// immediately so the dashboard sees fresh data, not after one interval.
    /// Hysteresis state starts at pending. Replaces any existing entry.
    pub async fn add_monitor(&self, monitor: Monitor) {
        let uuid = monitor.uuid;
        let mut live = self.live.lock().await;

        if let Some(handle) = live.remove(&uuid) {
            handle.abort();
        }

        if !monitor.enabled {
            tracing::debug!(monitor = %uuid, "monitor disabled, not scheduling");
            return;
        }

        let storage = Arc::clone(&self.storage);
        let dispatcher = Arc::clone(&self.dispatcher);

        tracing::info!(
            monitor = %uuid,
            name = %monitor.name,
            interval = monitor.interval_seconds,
            "scheduling monitor"
        );

        let handle = tokio::spawn(run_monitor_loop(storage, dispatcher, monitor));
        live.insert(uuid, handle);
    }

    /// Replace a monitor's config in place. The timer restarts at the new
    /// interval and hysteresis state resets to pending; a disabled monitor
    /// leaves the live set, its persisted history untouched.
    pub async fn update_monitor(&self, monitor: Monitor) {
        self.add_monitor(monitor).await;
    }

    /// Cancel the monitor's timer and discard its in-memory state. Persisted
    /// history stays; deleting it is a separate storage operation.
    pub async fn remove_monitor(&self, uuid: Uuid) {
        let mut live = self.live.lock().await;
        if let Some(handle) = live.remove(&uuid) {
            handle.abort();
            tracing::info!(monitor = %uuid, "monitor removed from scheduler");
        }
    }

    /// One ad-hoc probe+classify cycle for "test before save": touches no
    /// scheduler state, persistence or notifications.
    pub async fn test_monitor(&self, monitor: &Monitor) -> CheckResult {
        probe_and_classify(monitor).await
    }

    /// Toggle the manual maintenance flag: persist it, restart the live
    /// entry with the new config and nudge subscribed clients to refresh.
    pub async fn set_maintenance(&self, uuid: Uuid, maintenance: bool) -> anyhow::Result<()> {
        self.storage.set_monitor_maintenance(uuid, maintenance).await?;

        if let Some(monitor) = self.storage.get_monitor_by_uuid(uuid).await? {
            self.add_monitor(monitor).await;
        }

        self.publisher.trigger_topic_poll("monitors").await;
        Ok(())
    }

    pub async fn live_count(&self) -> usize {
        self.live.lock().await.len()
    }

    pub async fn shutdown(&self) {
        let mut live = self.live.lock().await;
        for (uuid, handle) in live.drain() {
            handle.abort();
            tracing::debug!(monitor = %uuid, "monitor task stopped");
        }
    }
}

async fn run_monitor_loop(
    storage: Arc<dyn Storage>,
    dispatcher: Arc<NotificationDispatcher>,
    monitor: Monitor,
) {
    let executor = match ProbeExecutor::new(monitor.timeout_seconds) {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!(monitor = %monitor.uuid, "failed to build probe executor: {:#}", e);
            return;
        }
    };

    let mut state = MonitorState::new();
    let mut timer = interval(Duration::from_secs(monitor.interval_seconds.max(1)));
    // A cycle running long must not cause a burst of catch-up ticks
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let cycle = run_check_cycle(&storage, &dispatcher, &executor, &monitor, &mut state);
        if let Err(panic) = AssertUnwindSafe(cycle).catch_unwind().await {
            tracing::error!(monitor = %monitor.uuid, "check cycle panicked: {:?}", panic);
        }
    }
}

/// One full check cycle: maintenance gate, probe, classify, hysteresis,
/// persist, notify. Never propagates an error; everything that can fail is
/// logged and the next tick proceeds normally.
async fn run_check_cycle(
    storage: &Arc<dyn Storage>,
    dispatcher: &Arc<NotificationDispatcher>,
    executor: &ProbeExecutor,
    monitor: &Monitor,
    state: &mut MonitorState,
) {
    let now = chrono::Utc::now();

    if monitor.maintenance_active(now) {
        state.note_maintenance();
        if let Err(e) = storage.record_maintenance_tick(monitor.uuid, now).await {
            tracing::error!(monitor = %monitor.uuid, "failed to record maintenance tick: {:#}", e);
        }
        return;
    }

    let outcome = executor.probe(monitor).await;
    let status = classify(&outcome, &monitor.expected_status_codes, monitor.degraded_threshold_ms);
    let result = CheckResult::from_outcome(outcome, status, now);

    tracing::debug!(
        monitor = %monitor.uuid,
        status = %status,
        latency = ?result.latency_ms,
        "check completed"
    );

    // Hysteresis is folded in before persistence so the in-memory state
    // stays consistent even when the durable record lags behind.
    let transition = state.apply(status, monitor.retries);

    if let Err(e) = storage.record_check(monitor.uuid, &result).await {
        tracing::error!(monitor = %monitor.uuid, "failed to persist check result: {:#}", e);
    }

    if let Some(transition) = transition {
        tracing::info!(
            monitor = %monitor.uuid,
            name = %monitor.name,
            ?transition,
            "status transition"
        );
        dispatcher.dispatch(monitor, transition, &result).await;
    }
}

async fn probe_and_classify(monitor: &Monitor) -> CheckResult {
    let now = chrono::Utc::now();

    let executor = match ProbeExecutor::new(monitor.timeout_seconds) {
        Ok(executor) => executor,
        Err(e) => {
            return CheckResult {
                status: super::types::MonitorStatus::Down,
                latency_ms: None,
                status_code: None,
                error_message: Some(format!("failed to build probe executor: {:#}", e)),
                checked_at: now,
            };
        }
    };

    let outcome = executor.probe(monitor).await;
    let status = classify(&outcome, &monitor.expected_status_codes, monitor.degraded_threshold_ms);
    CheckResult::from_outcome(outcome, status, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorDefaults;
    use crate::monitoring::notifier::{
        AllowAllPreferences, LogPublisher, NotificationRequest, NotificationSink,
    };
    use crate::monitoring::types::{CheckKind, MonitorStatus};
    use crate::storage::models::CreateMonitor;
    use crate::storage::repository::LibsqlStorage;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSink {
        requests: Mutex<Vec<NotificationRequest>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn create_notification(&self, request: NotificationRequest) -> anyhow::Result<()> {
            self.requests.lock().await.push(request);
            Ok(())
        }
    }

    struct Harness {
        storage: Arc<LibsqlStorage>,
        sink: Arc<RecordingSink>,
        scheduler: MonitorScheduler,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LibsqlStorage::open(dir.path().join("test.db")).await.unwrap());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            storage.clone(),
            sink.clone(),
            Arc::new(AllowAllPreferences),
        ));
        let scheduler =
            MonitorScheduler::new(storage.clone(), dispatcher, Arc::new(LogPublisher));
        Harness { storage, sink, scheduler, _dir: dir }
    }

    fn tcp_monitor(target: String, interval_seconds: u64, retries: u32) -> Monitor {
        Monitor::from_request(
            CreateMonitor {
                user_id: Uuid::new_v4(),
                name: "local-service".into(),
                check_type: CheckKind::Tcp,
                target,
                interval_seconds: Some(interval_seconds),
                timeout_seconds: Some(2),
                retries: Some(retries),
                ..CreateMonitor::default()
            },
            &MonitorDefaults::default(),
        )
    }

    fn http_monitor(target: String, interval_seconds: u64, timeout_seconds: u64) -> Monitor {
        Monitor::from_request(
            CreateMonitor {
                user_id: Uuid::new_v4(),
                name: "slow-service".into(),
                check_type: CheckKind::Http,
                target,
                interval_seconds: Some(interval_seconds),
                timeout_seconds: Some(timeout_seconds),
                retries: Some(3),
                ..CreateMonitor::default()
            },
            &MonitorDefaults::default(),
        )
    }

    async fn open_port() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    async fn closed_port() -> String {
        let (listener, addr) = open_port().await;
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn first_check_fires_immediately() {
        let h = harness().await;
        let (_listener, addr) = open_port().await;

        // Long interval: only the immediate first check can account for rows
        let monitor = tcp_monitor(addr, 3600, 3);
        h.storage.create_monitor(&monitor).await.unwrap();
        h.scheduler.add_monitor(monitor.clone()).await;

        tokio::time::sleep(Duration::from_millis(500)).await;

        let history = h.storage.get_recent_checks(monitor.uuid, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, MonitorStatus::Up);
    }

    #[tokio::test]
    async fn disabled_monitor_is_not_scheduled() {
        let h = harness().await;
        let (_listener, addr) = open_port().await;

        let mut monitor = tcp_monitor(addr, 3600, 3);
        monitor.enabled = false;
        h.scheduler.add_monitor(monitor).await;

        assert_eq!(h.scheduler.live_count().await, 0);
    }

    #[tokio::test]
    async fn removal_stops_further_checks() {
        let h = harness().await;
        let (_listener, addr) = open_port().await;

        let monitor = tcp_monitor(addr, 1, 3);
        h.storage.create_monitor(&monitor).await.unwrap();
        h.scheduler.add_monitor(monitor.clone()).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        h.scheduler.remove_monitor(monitor.uuid).await;
        let after_removal = h.storage.get_recent_checks(monitor.uuid, 100).await.unwrap().len();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let later = h.storage.get_recent_checks(monitor.uuid, 100).await.unwrap().len();
        assert_eq!(after_removal, later);
        assert_eq!(h.scheduler.live_count().await, 0);
    }

    #[tokio::test]
    async fn monitors_run_on_independent_timers() {
        let h = harness().await;
        let (_l1, addr_a) = open_port().await;
        let (_l2, addr_b) = open_port().await;

        let a = tcp_monitor(addr_a, 3600, 3);
        let b = tcp_monitor(addr_b, 3600, 3);
        h.storage.create_monitor(&a).await.unwrap();
        h.storage.create_monitor(&b).await.unwrap();

        h.scheduler.add_monitor(a.clone()).await;
        h.scheduler.add_monitor(b.clone()).await;
        assert_eq!(h.scheduler.live_count().await, 2);

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(h.storage.get_recent_checks(a.uuid, 10).await.unwrap().len(), 1);
        assert_eq!(h.storage.get_recent_checks(b.uuid, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn hanging_probe_does_not_stall_other_monitors() {
        let h = harness().await;

        // Accepts connections but never answers, so the HTTP probe hangs
        // until its timeout
        let (stall_listener, stall_addr) = open_port().await;
        let hold = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((socket, _)) = stall_listener.accept().await {
                    held.push(socket);
                }
            }
        });

        let (_listener, fast_addr) = open_port().await;

        let slow = http_monitor(format!("http://{stall_addr}/"), 3600, 4);
        let fast = tcp_monitor(fast_addr, 1, 3);
        h.storage.create_monitor(&slow).await.unwrap();
        h.storage.create_monitor(&fast).await.unwrap();

        h.scheduler.add_monitor(slow.clone()).await;
        h.scheduler.add_monitor(fast.clone()).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;

        // The fast monitor kept its cadence while the slow probe was still
        // in flight against its 4s timeout
        let fast_rows = h.storage.get_recent_checks(fast.uuid, 10).await.unwrap();
        assert!(fast_rows.len() >= 2, "expected multiple fast checks, got {}", fast_rows.len());
        assert!(fast_rows.iter().all(|entry| entry.status == MonitorStatus::Up));

        let slow_rows = h.storage.get_recent_checks(slow.uuid, 10).await.unwrap();
        assert!(slow_rows.is_empty());

        h.scheduler.shutdown().await;
        hold.abort();
    }

    #[tokio::test]
    async fn maintenance_suppresses_history_and_records_tick() {
        let h = harness().await;
        let (_listener, addr) = open_port().await;

        let mut monitor = tcp_monitor(addr, 3600, 3);
        monitor.maintenance = true;
        h.storage.create_monitor(&monitor).await.unwrap();
        h.scheduler.add_monitor(monitor.clone()).await;

        tokio::time::sleep(Duration::from_millis(500)).await;

        let history = h.storage.get_recent_checks(monitor.uuid, 10).await.unwrap();
        assert!(history.is_empty());

        let aggregates = h
            .storage
            .get_hourly_aggregates(monitor.uuid, chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].checks_maintenance, 1);
        assert_eq!(aggregates[0].checks_total, 0);

        assert!(h.sink.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn down_transition_fires_exactly_once_after_retries() {
        let h = harness().await;
        let addr = closed_port().await;

        let monitor = tcp_monitor(addr, 1, 2);
        h.storage.create_monitor(&monitor).await.unwrap();
        h.scheduler.add_monitor(monitor.clone()).await;

        // Three cycles at 1s: first down absorbed, second confirms, third
        // must not re-notify
        tokio::time::sleep(Duration::from_millis(2600)).await;
        h.scheduler.remove_monitor(monitor.uuid).await;

        let history = h.storage.get_recent_checks(monitor.uuid, 10).await.unwrap();
        assert!(history.len() >= 3);
        assert!(history.iter().all(|entry| entry.status == MonitorStatus::Down));

        let requests = h.sink.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, "monitor-down");
    }

    #[tokio::test]
    async fn test_monitor_classifies_without_persisting() {
        let h = harness().await;
        let addr = closed_port().await;

        let monitor = tcp_monitor(addr, 3600, 3);
        let result = h.scheduler.test_monitor(&monitor).await;

        assert_eq!(result.status, MonitorStatus::Down);
        assert!(result.error_message.is_some());
        assert!(h.storage.get_recent_checks(monitor.uuid, 10).await.unwrap().is_empty());
        assert_eq!(h.scheduler.live_count().await, 0);
    }

    #[tokio::test]
    async fn start_skips_stored_monitors_that_no_longer_validate() {
        let h = harness().await;
        let (_listener, addr) = open_port().await;

        let good = tcp_monitor(addr.clone(), 3600, 3);
        let mut bad = tcp_monitor(addr, 3600, 3);
        bad.interval_seconds = 5;
        h.storage.create_monitor(&good).await.unwrap();
        h.storage.create_monitor(&bad).await.unwrap();

        h.scheduler.start().await.unwrap();
        assert_eq!(h.scheduler.live_count().await, 1);
    }

    #[tokio::test]
    async fn set_maintenance_restarts_entry_with_flag() {
        let h = harness().await;
        let (_listener, addr) = open_port().await;

        let monitor = tcp_monitor(addr, 3600, 3);
        h.storage.create_monitor(&monitor).await.unwrap();
        h.scheduler.add_monitor(monitor.clone()).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        h.scheduler.set_maintenance(monitor.uuid, true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // The restarted task skipped its probe and ticked maintenance
        let aggregates = h
            .storage
            .get_hourly_aggregates(monitor.uuid, chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(aggregates.len(), 1);
        assert!(aggregates[0].checks_maintenance >= 1);

        let loaded = h.storage.get_monitor_by_uuid(monitor.uuid).await.unwrap().unwrap();
        assert!(loaded.maintenance);
    }
}
