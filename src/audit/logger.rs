//! The audit pipeline: a bounded queue, a single consumer task, and batched flushes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::{AuditError, AuditResult};
use super::event::{AuditEvent, AuditEventType, AuditLevel, AuditSeverity};
use super::storage::{AuditStorage, EventQuery, MemoryAuditStorage};

/// Tunables for the audit pipeline.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Global minimum level; events below this are dropped at enqueue.
    pub min_level: AuditLevel,
    /// Per-component overrides of `min_level`.
    pub component_min_level: HashMap<String, AuditLevel>,
    /// Event types that are never logged, regardless of level.
    pub ignored_event_types: HashSet<AuditEventType>,
    /// Components that are never logged, regardless of level.
    pub ignored_components: HashSet<String>,
    /// Capacity of the bounded in-memory queue.
    pub queue_capacity: usize,
    /// Flush once this many events have accumulated in the batch.
    pub batch_size: usize,
    /// Flush at least this often even if `batch_size` has not been reached.
    pub flush_interval: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            min_level: AuditLevel::Info,
            component_min_level: HashMap::new(),
            ignored_event_types: HashSet::new(),
            ignored_components: HashSet::new(),
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Counters exposed via [`AuditLogger::get_stats`].
#[derive(Debug, Default, Clone)]
pub struct AuditStats {
    pub events_logged: u64,
    pub events_filtered: u64,
    pub events_dropped: u64,
    pub storage_errors: u64,
    pub batches_flushed: u64,
}

#[derive(Debug, Default)]
struct AtomicStats {
    events_logged: AtomicU64,
    events_filtered: AtomicU64,
    events_dropped: AtomicU64,
    storage_errors: AtomicU64,
    batches_flushed: AtomicU64,
}

impl AtomicStats {
    fn snapshot(&self) -> AuditStats {
        AuditStats {
            events_logged: self.events_logged.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
        }
    }
}

/// The append-only audit event sink (C7).
///
/// Construction does not start the background consumer; call [`AuditLogger::start`]
/// before logging, and [`AuditLogger::stop`] to drain and flush on shutdown.
#[derive(Debug)]
pub struct AuditLogger {
    config: AuditConfig,
    storage: Arc<dyn AuditStorage>,
    sender: mpsc::Sender<AuditEvent>,
    receiver: Mutex<Option<mpsc::Receiver<AuditEvent>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
    stats: Arc<AtomicStats>,
    running: std::sync::atomic::AtomicBool,
}

impl AuditLogger {
    /// Create a logger backed by `storage`; call [`Self::start`] to begin consuming.
    pub fn new(config: AuditConfig, storage: Arc<dyn AuditStorage>) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            storage,
            sender,
            receiver: Mutex::new(Some(receiver)),
            consumer: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            stats: Arc::new(AtomicStats::default()),
            running: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Convenience constructor backed by [`MemoryAuditStorage`], useful for tests and
    /// embedding contexts that do not need durable storage.
    pub fn in_memory(config: AuditConfig) -> Self {
        Self::new(config, Arc::new(MemoryAuditStorage::new()))
    }

    /// Start the background consumer task that drains the queue into batches.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let receiver = self.receiver.lock().take();
        let Some(mut receiver) = receiver else {
            return;
        };
        let storage = Arc::clone(&self.storage);
        let stats = Arc::clone(&self.stats);
        let shutdown = Arc::clone(&self.shutdown);
        let batch_size = self.config.batch_size.max(1);
        let flush_interval = self.config.flush_interval;

        let handle = tokio::spawn(async move {
            let mut batch: Vec<AuditEvent> = Vec::with_capacity(batch_size);
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => {
                        while let Ok(event) = receiver.try_recv() {
                            batch.push(event);
                        }
                        flush(&storage, &mut batch, &stats).await;
                        break;
                    }
                    maybe_event = receiver.recv() => {
                        match maybe_event {
                            Some(event) => {
                                batch.push(event);
                                if batch.len() >= batch_size {
                                    flush(&storage, &mut batch, &stats).await;
                                }
                            }
                            None => {
                                flush(&storage, &mut batch, &stats).await;
                                break;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            flush(&storage, &mut batch, &stats).await;
                        }
                    }
                }
            }
        });
        *self.consumer.lock() = Some(handle);
    }

    /// Stop the consumer, draining and force-flushing any pending events.
    pub async fn stop(&self) -> AuditResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.notify_one();
        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    fn is_filtered(&self, event: &AuditEvent) -> bool {
        if self.config.ignored_event_types.contains(&event.event_type) {
            return true;
        }
        if let Some(component) = &event.component {
            if self.config.ignored_components.contains(component) {
                return true;
            }
        }
        let min_level = event
            .component
            .as_ref()
            .and_then(|c| self.config.component_min_level.get(c))
            .copied()
            .unwrap_or(self.config.min_level);
        event.level < min_level
    }

    /// Enqueue `event`, returning its id, or `None` if filtered out.
    ///
    /// Events at severity HIGH/CRITICAL block the caller until there is queue room
    /// (never silently dropped); all others take the drop-and-count path on a full
    /// queue.
    pub async fn log_event(&self, event: AuditEvent) -> AuditResult<Option<Uuid>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AuditError::NotRunning);
        }
        if self.is_filtered(&event) {
            self.stats.events_filtered.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        let id = event.event_id;
        let durable = event.requires_durable_enqueue();
        if durable {
            self.sender
                .send(event)
                .await
                .map_err(|_| AuditError::Storage("consumer task is gone".to_string()))?;
        } else {
            match self.sender.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                    return Err(AuditError::QueueFull);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(AuditError::Storage("consumer task is gone".to_string()));
                }
            }
        }
        self.stats.events_logged.fetch_add(1, Ordering::Relaxed);
        Ok(Some(id))
    }

    /// Sugar over [`Self::log_event`] for the common (type, message, level, severity) shape.
    pub async fn log(
        &self,
        event_type: AuditEventType,
        message: impl Into<String>,
        level: AuditLevel,
        severity: AuditSeverity,
    ) -> AuditResult<Option<Uuid>> {
        self.log_event(AuditEvent::new(event_type, message, level, severity))
            .await
    }

    pub async fn log_adapter_load(
        &self,
        adapter_id: impl Into<String>,
        success: bool,
    ) -> AuditResult<Option<Uuid>> {
        let adapter_id = adapter_id.into();
        let event = AuditEvent::new(
            AuditEventType::AdapterLoad,
            format!("adapter load: {adapter_id}"),
            if success { AuditLevel::Info } else { AuditLevel::Error },
            if success { AuditSeverity::Low } else { AuditSeverity::Medium },
        )
        .with_adapter(adapter_id);
        self.log_event(event).await
    }

    pub async fn log_api_request(
        &self,
        user_id: Option<String>,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> AuditResult<Option<Uuid>> {
        let mut event = AuditEvent::new(
            AuditEventType::ApiRequest,
            message,
            AuditLevel::Info,
            AuditSeverity::Low,
        )
        .with_component(component);
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        self.log_event(event).await
    }

    pub async fn log_security_event(
        &self,
        message: impl Into<String>,
        severity: AuditSeverity,
        user_id: Option<String>,
        session_id: Option<String>,
    ) -> AuditResult<Option<Uuid>> {
        let level = match severity {
            AuditSeverity::Low => AuditLevel::Warning,
            AuditSeverity::Medium => AuditLevel::Warning,
            AuditSeverity::High => AuditLevel::Error,
            AuditSeverity::Critical => AuditLevel::Critical,
        };
        let mut event =
            AuditEvent::new(AuditEventType::SecurityViolation, message, level, severity);
        if let Some(user_id) = user_id {
            event = event.with_user(user_id);
        }
        if let Some(session_id) = session_id {
            event = event.with_session(session_id);
        }
        self.log_event(event).await
    }

    pub async fn query_events(&self, query: EventQuery) -> AuditResult<Vec<AuditEvent>> {
        self.storage.query_events(&query).await
    }

    pub async fn count_events(&self, query: EventQuery) -> AuditResult<usize> {
        self.storage.count_events(&query).await
    }

    pub async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> AuditResult<usize> {
        self.storage.cleanup_old_events(older_than).await
    }

    /// Snapshot of pipeline counters.
    pub fn get_stats(&self) -> AuditStats {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn flush(storage: &Arc<dyn AuditStorage>, batch: &mut Vec<AuditEvent>, stats: &AtomicStats) {
    if batch.is_empty() {
        return;
    }
    match storage.store_events(batch).await {
        Ok(()) => {
            stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            stats.storage_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %err, dropped = batch.len(), "audit storage flush failed");
        }
    }
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    async fn running_logger(config: AuditConfig) -> AuditLogger {
        let logger = AuditLogger::in_memory(config);
        logger.start().await;
        logger
    }

    #[tokio::test]
    async fn logging_before_start_errors() {
        let logger = AuditLogger::in_memory(AuditConfig::default());
        let result = logger
            .log(AuditEventType::AuthLogin, "x", AuditLevel::Info, AuditSeverity::Low)
            .await;
        assert!(matches!(result, Err(AuditError::NotRunning)));
    }

    #[tokio::test]
    async fn filtered_below_min_level_returns_none() {
        let mut config = AuditConfig::default();
        config.min_level = AuditLevel::Error;
        let logger = running_logger(config).await;
        let id = logger
            .log(AuditEventType::UserAction, "noise", AuditLevel::Debug, AuditSeverity::Low)
            .await
            .unwrap_or(None);
        assert!(id.is_none());
        logger.stop().await.unwrap_or(());
    }

    #[tokio::test]
    async fn batch_flush_by_count_makes_events_queryable() {
        let mut config = AuditConfig::default();
        config.batch_size = 2;
        config.flush_interval = StdDuration::from_secs(60);
        let logger = running_logger(config).await;
        for _ in 0..3 {
            logger
                .log(AuditEventType::UserAction, "x", AuditLevel::Info, AuditSeverity::Low)
                .await
                .unwrap_or(None);
        }
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let count = logger.count_events(EventQuery::default()).await.unwrap_or(0);
        assert!(count >= 2, "expected at least one full batch flushed, got {count}");
        logger.stop().await.unwrap_or(());
        let count_after_stop = logger.count_events(EventQuery::default()).await.unwrap_or(0);
        assert_eq!(count_after_stop, 3);
    }

    #[tokio::test]
    async fn stop_force_flushes_pending_events() {
        let mut config = AuditConfig::default();
        config.batch_size = 1000;
        config.flush_interval = StdDuration::from_secs(60);
        let logger = running_logger(config).await;
        logger
            .log(AuditEventType::SystemStart, "start", AuditLevel::Info, AuditSeverity::Low)
            .await
            .unwrap_or(None);
        logger.stop().await.unwrap_or(());
        let count = logger.count_events(EventQuery::default()).await.unwrap_or(0);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn high_severity_is_never_dropped_even_under_pressure() {
        let mut config = AuditConfig::default();
        config.queue_capacity = 1;
        config.batch_size = 1000;
        config.flush_interval = StdDuration::from_secs(60);
        let logger = Arc::new(running_logger(config).await);
        let l2 = Arc::clone(&logger);
        let handle = tokio::spawn(async move {
            l2.log(
                AuditEventType::SecurityViolation,
                "critical",
                AuditLevel::Critical,
                AuditSeverity::Critical,
            )
            .await
        });
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        logger.stop().await.unwrap_or(());
        let result = handle.await;
        assert!(result.is_ok());
    }
}
