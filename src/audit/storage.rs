//! Pluggable audit storage backends.
//!
//! The reference backend ([`FileAuditStorage`]) writes newline-delimited JSON to a
//! rotating file under a log directory, gzip-compressing rotated backups.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;

use super::error::{AuditError, AuditResult};
use super::event::{AuditEvent, AuditEventType, AuditLevel};

/// Filter applied when querying stored events.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub event_types: Option<Vec<AuditEventType>>,
    pub levels: Option<Vec<AuditLevel>>,
    pub user_id: Option<String>,
    pub component: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl EventQuery {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(start) = self.start {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if event.timestamp > end {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(levels) = &self.levels {
            if !levels.contains(&event.level) {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if event.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(component) = &self.component {
            if event.component.as_deref() != Some(component.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Storage-backend contract for the audit pipeline.
///
/// Implementations must be `Send + Sync`: the consumer task calls `store_event` from a
/// single task, but queries may arrive concurrently from request-handling tasks.
#[async_trait]
pub trait AuditStorage: std::fmt::Debug + Send + Sync + 'static {
    /// Persist a batch of events. Implementations should make this as close to atomic
    /// as the backend allows; the reference backend appends each line sequentially.
    async fn store_events(&self, events: &[AuditEvent]) -> AuditResult<()>;

    /// Return events matching `query`, most recent first, honoring `limit`/`offset`.
    async fn query_events(&self, query: &EventQuery) -> AuditResult<Vec<AuditEvent>>;

    /// Count events matching `query`, ignoring `limit`/`offset`.
    async fn count_events(&self, query: &EventQuery) -> AuditResult<usize>;

    /// Remove events older than `older_than`, returning the number removed.
    async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> AuditResult<usize>;
}

/// Rotation policy for the file backend.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    /// Roll over to a new file once the current one exceeds this many bytes.
    pub max_size_bytes: u64,
    /// How many rotated (compressed) backups to retain; older ones are deleted.
    pub max_backups: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 64 * 1024 * 1024,
            max_backups: 10,
        }
    }
}

/// Reference storage backend: rotating NDJSON files under `log_dir`.
///
/// Rotation triggers on a day boundary or on `max_size_bytes`, whichever comes first.
/// Rotated files are gzip-compressed and named `security-audit-<date>.<n>.log.gz`; the
/// live file is always `security-audit-current.log`.
#[derive(Debug)]
pub struct FileAuditStorage {
    log_dir: PathBuf,
    rotation: RotationPolicy,
    state: Mutex<RotationState>,
    errors: AtomicU64,
}

#[derive(Debug)]
struct RotationState {
    current_date: NaiveDate,
    current_size: u64,
    backup_index: usize,
}

impl FileAuditStorage {
    /// Open (creating if necessary) a file-backed audit store rooted at `log_dir`.
    pub fn new(log_dir: impl Into<PathBuf>, rotation: RotationPolicy) -> AuditResult<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)?;
        let current_size = std::fs::metadata(Self::current_path_for(&log_dir))
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(Self {
            log_dir,
            rotation,
            state: Mutex::new(RotationState {
                current_date: Utc::now().date_naive(),
                current_size,
                backup_index: 0,
            }),
            errors: AtomicU64::new(0),
        })
    }

    fn current_path_for(log_dir: &Path) -> PathBuf {
        log_dir.join("security-audit-current.log")
    }

    fn current_path(&self) -> PathBuf {
        Self::current_path_for(&self.log_dir)
    }

    /// Number of storage-level errors observed since construction.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn rotate_if_needed(&self) -> AuditResult<()> {
        let today = Utc::now().date_naive();
        let mut state = self.state.lock();
        let needs_rotation =
            state.current_date != today || state.current_size >= self.rotation.max_size_bytes;
        if !needs_rotation {
            return Ok(());
        }
        let current = self.current_path();
        if current.exists() {
            state.backup_index += 1;
            let backup_name = format!(
                "security-audit-{}.{}.log.gz",
                state.current_date.format("%Y-%m-%d"),
                state.backup_index
            );
            self.compress_to(&current, &self.log_dir.join(backup_name))?;
            std::fs::remove_file(&current)?;
            self.prune_backups()?;
        }
        state.current_date = today;
        state.current_size = 0;
        state.backup_index = 0;
        Ok(())
    }

    fn compress_to(&self, src: &Path, dst: &Path) -> AuditResult<()> {
        let data = std::fs::read(src)?;
        let out = std::fs::File::create(dst)?;
        let mut encoder = GzEncoder::new(out, Compression::default());
        encoder.write_all(&data)?;
        encoder.finish()?;
        Ok(())
    }

    fn prune_backups(&self) -> AuditResult<()> {
        let mut backups: Vec<PathBuf> = std::fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("security-audit-") && n.ends_with(".log.gz"))
                    .unwrap_or(false)
            })
            .collect();
        if backups.len() <= self.rotation.max_backups {
            return Ok(());
        }
        backups.sort();
        let excess = backups.len() - self.rotation.max_backups;
        for path in backups.into_iter().take(excess) {
            let _ = std::fs::remove_file(path);
        }
        Ok(())
    }

    fn read_all_lines(&self) -> AuditResult<Vec<AuditEvent>> {
        let path = self.current_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(line) {
                Ok(event) => events.push(event),
                Err(_) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                }
            };
        }
        Ok(events)
    }
}

#[async_trait]
impl AuditStorage for FileAuditStorage {
    async fn store_events(&self, events: &[AuditEvent]) -> AuditResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        tokio::task::block_in_place(|| {
            self.rotate_if_needed()?;
            let path = self.current_path();
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            let mut written = 0u64;
            for event in events {
                let line = serde_json::to_string(event)?;
                writeln!(file, "{line}")?;
                written += line.len() as u64 + 1;
            }
            self.state.lock().current_size += written;
            Ok(())
        })
    }

    async fn query_events(&self, query: &EventQuery) -> AuditResult<Vec<AuditEvent>> {
        tokio::task::block_in_place(|| {
            let mut events = self.read_all_lines()?;
            events.retain(|e| query.matches(e));
            events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            let limit = if query.limit == 0 { events.len() } else { query.limit };
            Ok(events.into_iter().skip(query.offset).take(limit).collect())
        })
    }

    async fn count_events(&self, query: &EventQuery) -> AuditResult<usize> {
        tokio::task::block_in_place(|| {
            let events = self.read_all_lines()?;
            Ok(events.iter().filter(|e| query.matches(e)).count())
        })
    }

    async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> AuditResult<usize> {
        tokio::task::block_in_place(|| {
            let events = self.read_all_lines()?;
            let (keep, remove): (Vec<_>, Vec<_>) =
                events.into_iter().partition(|e| e.timestamp >= older_than);
            let path = self.current_path();
            let mut file = std::fs::File::create(&path)?;
            for event in &keep {
                let line = serde_json::to_string(event)?;
                writeln!(file, "{line}")?;
            }
            self.state.lock().current_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            Ok(remove.len())
        })
    }
}

/// In-memory storage backend, useful for tests and for hosts that do not need a
/// durable log (the core does not require file storage, only the `AuditStorage` trait).
#[derive(Debug, Default)]
pub struct MemoryAuditStorage {
    events: Mutex<Vec<AuditEvent>>,
    stats: Mutex<HashMap<String, u64>>,
}

impl MemoryAuditStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStorage for MemoryAuditStorage {
    async fn store_events(&self, events: &[AuditEvent]) -> AuditResult<()> {
        self.events.lock().extend_from_slice(events);
        *self.stats.lock().entry("stored".to_string()).or_default() += events.len() as u64;
        Ok(())
    }

    async fn query_events(&self, query: &EventQuery) -> AuditResult<Vec<AuditEvent>> {
        let events = self.events.lock();
        let mut matched: Vec<AuditEvent> =
            events.iter().filter(|e| query.matches(e)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let limit = if query.limit == 0 { matched.len() } else { query.limit };
        Ok(matched.into_iter().skip(query.offset).take(limit).collect())
    }

    async fn count_events(&self, query: &EventQuery) -> AuditResult<usize> {
        Ok(self.events.lock().iter().filter(|e| query.matches(e)).count())
    }

    async fn cleanup_old_events(&self, older_than: DateTime<Utc>) -> AuditResult<usize> {
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|e| e.timestamp >= older_than);
        Ok(before - events.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::audit::event::AuditSeverity;

    fn sample(event_type: AuditEventType) -> AuditEvent {
        AuditEvent::new(event_type, "msg", AuditLevel::Info, AuditSeverity::Low)
    }

    #[tokio::test]
    async fn memory_storage_round_trips_events() {
        let storage = MemoryAuditStorage::new();
        storage
            .store_events(&[sample(AuditEventType::AuthLogin), sample(AuditEventType::AuthLogout)])
            .await
            .unwrap_or_default();
        let count = storage.count_events(&EventQuery::default()).await.unwrap_or(0);
        assert_eq!(count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_storage_persists_across_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage =
            FileAuditStorage::new(dir.path(), RotationPolicy::default()).expect("storage");
        storage
            .store_events(&[sample(AuditEventType::SecurityViolation)])
            .await
            .unwrap_or_default();
        let events = storage
            .query_events(&EventQuery::default())
            .await
            .unwrap_or_default();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::SecurityViolation);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cleanup_removes_old_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage =
            FileAuditStorage::new(dir.path(), RotationPolicy::default()).expect("storage");
        storage
            .store_events(&[sample(AuditEventType::UserAction)])
            .await
            .unwrap_or_default();
        let future = Utc::now() + chrono::Duration::days(1);
        let removed = storage.cleanup_old_events(future).await.unwrap_or(0);
        assert_eq!(removed, 1);
        let remaining = storage.count_events(&EventQuery::default()).await.unwrap_or(1);
        assert_eq!(remaining, 0);
    }
}
