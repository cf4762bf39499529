//! Search analytics recorder.
//!
//! Events are buffered in memory and written to the durable log in batches.
//! A batch is flushed by a deferred timer, by the shutdown signal, or when
//! the recorder is dropped, whichever comes first.

use crate::config::AnalyticsConfig;
use crate::database::KvStore;
use crate::error::StorageError;
use crate::models::{SearchEvent, SearchEventInput};
use crate::utils::DeferredTask;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod export;
pub mod summary;

pub use export::{DateRange, ExportFormat, ExportOptions, REDACTED_QUERY};
pub use summary::{PerformanceMetrics, RecentSearch, SearchSummary};

pub const EVENT_LOG_KEY: &str = "search_analytics_events";

/// Where the batching buffer currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Idle,
    Pending,
    FlushScheduled,
}

/// Result of one flush attempt cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Idle,
    Persisted { events: usize, attempts: u32 },
    /// The batch was given up after storage failures
    Dropped { events: usize },
}

pub struct SearchAnalytics {
    inner: Arc<AnalyticsInner>,
}

struct AnalyticsInner {
    store: Arc<dyn KvStore>,
    config: AnalyticsConfig,
    pending: Mutex<Vec<SearchEvent>>,
    flush_timer: DeferredTask,
    shutdown: CancellationToken,
    teardown_hook: Mutex<Option<JoinHandle<()>>>,
    // Serializes read-modify-write cycles on the durable log
    persist_lock: Mutex<()>,
}

impl SearchAnalytics {
    pub fn new(store: Arc<dyn KvStore>, config: AnalyticsConfig) -> Self {
        Self::with_shutdown_signal(store, config, CancellationToken::new())
    }

    /// Use a host-owned token as the teardown signal; cancelling it forces a flush.
    pub fn with_shutdown_signal(
        store: Arc<dyn KvStore>,
        config: AnalyticsConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(AnalyticsInner {
                store,
                config,
                pending: Mutex::new(Vec::new()),
                flush_timer: DeferredTask::new(),
                shutdown,
                teardown_hook: Mutex::new(None),
                persist_lock: Mutex::new(()),
            }),
        }
    }

    pub fn shutdown_signal(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Record an event. It becomes visible to reads once the batch is flushed.
    ///
    /// Outside a tokio runtime there is no timer to defer to, so the event is
    /// flushed immediately.
    pub fn track_search(&self, input: SearchEventInput) {
        let event = input.into_event();
        debug!(event_type = event.event_type.as_str(), "tracking search event");

        match self.inner.pending.lock() {
            Ok(mut pending) => pending.push(event),
            Err(_) => {
                error!("pending event buffer poisoned, event dropped");
                return;
            }
        }

        if tokio::runtime::Handle::try_current().is_err() {
            self.inner.flush();
            return;
        }

        self.register_teardown_hook();

        let weak = Arc::downgrade(&self.inner);
        self.inner.flush_timer.schedule(self.inner.config.batch_delay(), move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.flush();
            }
        });
    }

    /// Flush the pending buffer now, regardless of timer state
    pub fn flush(&self) -> FlushOutcome {
        self.inner.flush_timer.cancel();
        self.inner.flush()
    }

    pub fn batch_state(&self) -> BatchState {
        if self.inner.flush_timer.is_armed() {
            BatchState::FlushScheduled
        } else if self.pending_count() > 0 {
            BatchState::Pending
        } else {
            BatchState::Idle
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn has_teardown_hook(&self) -> bool {
        self.inner
            .teardown_hook
            .lock()
            .map(|hook| hook.is_some())
            .unwrap_or(false)
    }

    /// Durable events inside the retention window, oldest first
    pub fn stored_events(&self) -> Vec<SearchEvent> {
        self.inner.load_events()
    }

    pub fn get_summary(&self, days: i64) -> SearchSummary {
        summary::compute_summary(&self.inner.load_events(), days, Utc::now())
    }

    /// Every distinct query searched within the last `days`, newest first
    pub fn history_view(&self, days: i64) -> Vec<RecentSearch> {
        summary::distinct_queries(&self.inner.load_events(), days, Utc::now())
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        summary::compute_performance_metrics(&self.inner.load_events())
    }

    /// Serialize stored events. Never fails; a serialization error yields an empty document.
    pub fn export_data(&self, options: &ExportOptions) -> String {
        let events = export::prepare_events(self.inner.load_events(), options);
        info!(count = events.len(), format = ?options.format, "exporting analytics");

        match options.format {
            ExportFormat::Csv => export::to_csv(&events),
            ExportFormat::Json => export::to_json(&events).unwrap_or_else(|e| {
                error!(error = %e, "failed to serialize analytics export");
                "[]".to_string()
            }),
        }
    }

    /// Wipe the durable log, the pending buffer, the armed timer and the teardown hook
    pub fn clear_data(&self) -> Result<(), StorageError> {
        self.inner.flush_timer.cancel();
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.clear();
        }
        self.inner.remove_teardown_hook();

        let _guard = self.inner.persist_lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.inner.store.remove(EVENT_LOG_KEY)?;
        info!("analytics data cleared");
        Ok(())
    }

    /// Flush what is buffered and stop background work
    pub fn dispose(&self) -> FlushOutcome {
        let outcome = self.flush();
        self.inner.remove_teardown_hook();
        outcome
    }

    fn register_teardown_hook(&self) {
        let Ok(mut hook) = self.inner.teardown_hook.lock() else {
            return;
        };
        if hook.is_some() {
            return;
        }

        let weak: Weak<AnalyticsInner> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        *hook = Some(tokio::spawn(async move {
            shutdown.cancelled().await;
            if let Some(inner) = weak.upgrade() {
                inner.flush_timer.cancel();
                let outcome = inner.flush();
                debug!(?outcome, "teardown flush");
            }
        }));
    }
}

impl AnalyticsInner {
    fn take_pending(&self) -> Vec<SearchEvent> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => Vec::new(),
        }
    }

    fn flush(&self) -> FlushOutcome {
        let batch = self.take_pending();
        self.persist(batch)
    }

    fn persist(&self, batch: Vec<SearchEvent>) -> FlushOutcome {
        if batch.is_empty() {
            return FlushOutcome::Idle;
        }
        let batch_len = batch.len();

        let Ok(_guard) = self.persist_lock.lock() else {
            error!(dropped = batch_len, "persist lock poisoned, batch dropped");
            return FlushOutcome::Dropped { events: batch_len };
        };

        let mut log = self.load_events();
        log.extend(batch);
        log.sort_by_key(|e| e.timestamp);
        if log.len() > self.config.max_events {
            let excess = log.len() - self.config.max_events;
            log.drain(..excess);
        }

        for attempt in 1..=self.config.max_flush_attempts {
            let raw = match serde_json::to_string(&log) {
                Ok(raw) => raw,
                Err(e) => {
                    error!(error = %e, dropped = batch_len, "failed to serialize event log");
                    return FlushOutcome::Dropped { events: batch_len };
                }
            };

            match self.store.set(EVENT_LOG_KEY, &raw) {
                Ok(()) => {
                    debug!(events = batch_len, attempt, "flushed analytics batch");
                    return FlushOutcome::Persisted { events: batch_len, attempts: attempt };
                }
                Err(e) if e.is_quota_exceeded() => {
                    let evict = ((log.len() as f64 * self.config.eviction_fraction).ceil() as usize)
                        .clamp(1, log.len().max(1));
                    warn!(attempt, evict, "storage quota exceeded, evicting oldest events");
                    log.drain(..evict.min(log.len()));
                }
                Err(e) => {
                    error!(error = %e, dropped = batch_len, "failed to persist analytics batch");
                    return FlushOutcome::Dropped { events: batch_len };
                }
            }
        }

        warn!(
            dropped = batch_len,
            attempts = self.config.max_flush_attempts,
            "giving up on analytics batch after repeated quota errors"
        );
        FlushOutcome::Dropped { events: batch_len }
    }

    /// Stored events inside the retention window. Unreadable logs read as empty.
    fn load_events(&self) -> Vec<SearchEvent> {
        let raw = match self.store.get(EVENT_LOG_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!(error = %e, "failed to read analytics log");
                return Vec::new();
            }
        };

        let events: Vec<SearchEvent> = match serde_json::from_str(&raw) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "analytics log is malformed, starting from empty");
                return Vec::new();
            }
        };

        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        events.into_iter().filter(|e| e.timestamp >= cutoff).collect()
    }

    fn remove_teardown_hook(&self) {
        if let Ok(mut hook) = self.teardown_hook.lock() {
            if let Some(handle) = hook.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for AnalyticsInner {
    fn drop(&mut self) {
        if let Ok(hook) = self.teardown_hook.get_mut() {
            if let Some(handle) = hook.take() {
                handle.abort();
            }
        }

        let batch = self.take_pending();
        if !batch.is_empty() {
            let outcome = self.persist(batch);
            debug!(?outcome, "flushed analytics on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::models::SearchEventType;
    use std::time::Duration as StdDuration;

    fn recorder() -> (Arc<MemoryStore>, SearchAnalytics) {
        let store = Arc::new(MemoryStore::new());
        let analytics = SearchAnalytics::new(store.clone(), AnalyticsConfig::default());
        (store, analytics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_invisible_until_batch_delay() {
        let (_, analytics) = recorder();
        assert_eq!(analytics.batch_state(), BatchState::Idle);

        analytics.track_search(SearchEventInput::search("machine learning"));
        analytics.track_search(SearchEventInput::search("deep learning"));
        assert_eq!(analytics.batch_state(), BatchState::FlushScheduled);
        assert_eq!(analytics.get_summary(30).total_searches, 0);

        tokio::time::sleep(StdDuration::from_millis(150)).await;
        assert_eq!(analytics.batch_state(), BatchState::Idle);
        let summary = analytics.get_summary(30);
        assert_eq!(summary.total_searches, 2);
        assert_eq!(summary.success_rate, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_forces_flush() {
        let (_, analytics) = recorder();
        analytics.track_search(SearchEventInput::search("climate models"));
        assert!(analytics.has_teardown_hook());

        analytics.shutdown_signal().cancel();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(analytics.pending_count(), 0);
        assert!(!analytics.inner.flush_timer.is_armed());
        assert_eq!(analytics.stored_events().len(), 1);
    }

    #[tokio::test]
    async fn test_drop_flushes_pending_events() {
        let store = Arc::new(MemoryStore::new());
        {
            let analytics = SearchAnalytics::new(store.clone(), AnalyticsConfig::default());
            analytics.track_search(SearchEventInput::search("genomics"));
        }
        let raw = store.get(EVENT_LOG_KEY).unwrap().unwrap();
        assert!(raw.contains("genomics"));
    }

    #[test]
    fn test_track_without_runtime_flushes_immediately() {
        let (_, analytics) = recorder();
        analytics.track_search(SearchEventInput::search("offline"));
        assert_eq!(analytics.stored_events().len(), 1);
        assert!(!analytics.has_teardown_hook());
    }

    #[test]
    fn test_log_trimmed_to_max_events() {
        let store = Arc::new(MemoryStore::new());
        let config = AnalyticsConfig { max_events: 5, ..Default::default() };
        let analytics = SearchAnalytics::new(store, config);

        for i in 0..8 {
            analytics.track_search(SearchEventInput::search(format!("query {}", i)));
        }
        let events = analytics.stored_events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].query, "query 3");
        assert_eq!(events[4].query, "query 7");
    }

    #[test]
    fn test_quota_error_evicts_oldest_and_retries() {
        let seed = Arc::new(MemoryStore::new());
        let seeded = SearchAnalytics::new(seed.clone(), AnalyticsConfig::default());
        for i in 0..8 {
            seeded.track_search(SearchEventInput::search(format!("seed {}", i)));
        }
        let raw = seed.get(EVENT_LOG_KEY).unwrap().unwrap();

        // Quota fits the existing log but not the log plus one more event
        let store = Arc::new(MemoryStore::with_quota(raw.len() + 10));
        store.set(EVENT_LOG_KEY, &raw).unwrap();
        let analytics = SearchAnalytics::new(store, AnalyticsConfig::default());

        analytics.inner.pending.lock().unwrap().push(SearchEventInput::search("newest").into_event());
        let outcome = analytics.inner.flush();

        assert_eq!(outcome, FlushOutcome::Persisted { events: 1, attempts: 2 });
        let events = analytics.stored_events();
        // 9 events, ceil(25%) = 3 oldest evicted
        assert_eq!(events.len(), 6);
        assert_eq!(events[0].query, "seed 3");
        assert_eq!(events.last().unwrap().query, "newest");
    }

    #[test]
    fn test_batch_dropped_after_retry_budget() {
        let store = Arc::new(MemoryStore::with_quota(1));
        let analytics = SearchAnalytics::new(store.clone(), AnalyticsConfig::default());

        analytics
            .inner
            .pending
            .lock()
            .unwrap()
            .push(SearchEventInput::search("too large to ever fit").into_event());
        let outcome = analytics.inner.flush();

        assert_eq!(outcome, FlushOutcome::Dropped { events: 1 });
        assert_eq!(analytics.pending_count(), 0);
        assert!(store.get(EVENT_LOG_KEY).unwrap().is_none());
    }

    #[test]
    fn test_malformed_log_reads_as_empty() {
        let (store, analytics) = recorder();
        store.set(EVENT_LOG_KEY, "{{garbage").unwrap();

        assert!(analytics.stored_events().is_empty());
        assert_eq!(analytics.get_summary(30), SearchSummary { window_days: 30, ..Default::default() });

        analytics.track_search(SearchEventInput::search("recovered"));
        assert_eq!(analytics.stored_events().len(), 1);
    }

    #[test]
    fn test_retention_window_applied_on_read() {
        let (_, analytics) = recorder();
        analytics.track_search(
            SearchEventInput::search("ancient").with_timestamp(Utc::now() - Duration::days(45)),
        );
        analytics.track_search(SearchEventInput::search("fresh"));

        let events = analytics.stored_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].query, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_data_resets_everything() {
        let (store, analytics) = recorder();
        analytics.track_search(SearchEventInput::search("first"));
        analytics.flush();
        analytics.track_search(SearchEventInput::search("second"));

        analytics.clear_data().unwrap();
        analytics.clear_data().unwrap();

        assert_eq!(analytics.batch_state(), BatchState::Idle);
        assert!(!analytics.has_teardown_hook());
        assert!(store.get(EVENT_LOG_KEY).unwrap().is_none());

        tokio::time::sleep(StdDuration::from_millis(200)).await;
        assert!(analytics.stored_events().is_empty());
    }

    #[test]
    fn test_export_includes_all_event_types() {
        let (_, analytics) = recorder();
        analytics.track_search(SearchEventInput::search("=1+1"));
        analytics.track_search(
            SearchEventInput::search("report").with_event_type(SearchEventType::Export),
        );

        let csv = analytics.export_data(&ExportOptions::new(ExportFormat::Csv));
        assert!(csv.contains("\"'=1+1\""));
        assert!(csv.contains(",export,"));
        assert_eq!(csv.lines().count(), 3);

        let json = analytics.export_data(&ExportOptions::new(ExportFormat::Json).without_queries());
        assert!(!json.contains("report"));
        assert!(json.contains(REDACTED_QUERY));
    }
}
