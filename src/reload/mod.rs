//! # Resource Reload
//!
//! Watches a folder for changed resource files and hands the changes to a
//! [`ResourceReloadListener`], emitting reload events around each reload.
//!
//! ## Overview
//!
//! [`FileWatcherReloadStrategy`] polls the folder every `interval`, comparing
//! each accepted file's modification time and length against the previous
//! snapshot. Accepted files are regular files whose name matches one of the
//! comma separated globs in `pattern` (default `*.yaml,*.xml`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use conduit_support::error::SupportResult;
//! use conduit_support::event::EventNotifiers;
//! use conduit_support::reload::{FileWatcherReloadStrategy, ResourceChange, ResourceReloadListener};
//! use conduit_support::service::ServiceExt;
//! use std::sync::Arc;
//!
//! struct Routes;
//!
//! #[async_trait]
//! impl ResourceReloadListener for Routes {
//!     async fn on_reload(&self, changes: &[ResourceChange]) -> SupportResult<()> {
//!         for change in changes {
//!             println!("{change}");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> SupportResult<()> {
//! let strategy = FileWatcherReloadStrategy::new("routes", Arc::new(Routes), Arc::new(EventNotifiers::new()));
//! strategy.start().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ReloadConfig;
use crate::constants::defaults;
use crate::error::{SupportError, SupportResult};
use crate::event::{self, EventNotifiers};
use crate::logging::log_reload_operation;
use crate::service::{Service, ServiceExt, ServiceState};
use crate::utils::pattern::{matches_glob, split_globs};
use crate::utils::tick_period;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A detected change to a watched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    Added(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl ResourceChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(path) | Self::Modified(path) | Self::Deleted(path) => path,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(path) => write!(f, "added {}", path.display()),
            Self::Modified(path) => write!(f, "modified {}", path.display()),
            Self::Deleted(path) => write!(f, "deleted {}", path.display()),
        }
    }
}

/// Applies reloaded resources
#[async_trait]
pub trait ResourceReloadListener: Send + Sync {
    async fn on_reload(&self, changes: &[ResourceChange]) -> SupportResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

type Snapshot = HashMap<PathBuf, FileStamp>;

/// Polling file watcher feeding a [`ResourceReloadListener`]
pub struct FileWatcherReloadStrategy {
    folder: PathBuf,
    pattern: RwLock<String>,
    recursive: AtomicBool,
    interval: Mutex<Duration>,
    listener: Arc<dyn ResourceReloadListener>,
    notifiers: Arc<EventNotifiers>,
    snapshot: Mutex<Snapshot>,
    reload_counter: AtomicU64,
    failed_counter: AtomicU64,
    last_error: Mutex<Option<SupportError>>,
    task: Mutex<Option<JoinHandle<()>>>,
    state: ServiceState,
    this: Weak<FileWatcherReloadStrategy>,
}

impl fmt::Debug for FileWatcherReloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcherReloadStrategy")
            .field("folder", &self.folder)
            .field("pattern", &*self.pattern.read())
            .field("recursive", &self.is_recursive())
            .field("interval", &self.interval())
            .field("reload_counter", &self.reload_counter())
            .field("failed_counter", &self.failed_counter())
            .finish()
    }
}

impl FileWatcherReloadStrategy {
    /// Create a new strategy watching `folder` with the default pattern
    pub fn new(
        folder: impl Into<PathBuf>,
        listener: Arc<dyn ResourceReloadListener>,
        notifiers: Arc<EventNotifiers>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            folder: folder.into(),
            pattern: RwLock::new(defaults::RELOAD_PATTERN.to_string()),
            recursive: AtomicBool::new(false),
            interval: Mutex::new(Duration::from_millis(defaults::RELOAD_INTERVAL_MS)),
            listener,
            notifiers,
            snapshot: Mutex::new(HashMap::new()),
            reload_counter: AtomicU64::new(0),
            failed_counter: AtomicU64::new(0),
            last_error: Mutex::new(None),
            task: Mutex::new(None),
            state: ServiceState::new(),
            this: this.clone(),
        })
    }

    /// Create a strategy from the `reload` configuration section
    pub fn from_config(
        config: &ReloadConfig,
        listener: Arc<dyn ResourceReloadListener>,
        notifiers: Arc<EventNotifiers>,
    ) -> Arc<Self> {
        let strategy = Self::new(&config.folder, listener, notifiers);
        strategy.set_pattern(Some(&config.pattern));
        strategy.set_recursive(config.recursive);
        strategy.set_interval(config.interval());
        strategy
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn pattern(&self) -> String {
        self.pattern.read().clone()
    }

    /// Set the comma separated file name globs; `None` restores the default
    pub fn set_pattern(&self, pattern: Option<&str>) {
        let pattern = match pattern {
            Some(pattern) if !pattern.trim().is_empty() => pattern.to_string(),
            _ => defaults::RELOAD_PATTERN.to_string(),
        };
        *self.pattern.write() = pattern;
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive.load(Ordering::Relaxed)
    }

    pub fn set_recursive(&self, recursive: bool) {
        self.recursive.store(recursive, Ordering::Relaxed);
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Takes effect the next time the strategy is started
    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock() = interval;
    }

    /// Successful reloads
    pub fn reload_counter(&self) -> u64 {
        self.reload_counter.load(Ordering::Relaxed)
    }

    /// Failed reloads
    pub fn failed_counter(&self) -> u64 {
        self.failed_counter.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<SupportError> {
        self.last_error.lock().clone()
    }

    pub fn reset_counters(&self) {
        self.reload_counter.store(0, Ordering::Relaxed);
        self.failed_counter.store(0, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    /// The globs files are matched against
    pub fn file_filter(&self) -> Vec<String> {
        split_globs(&self.pattern.read())
    }

    /// Whether `path` is a regular file whose name matches the pattern
    pub fn accepts(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        self.file_filter().iter().any(|glob| matches_glob(name, glob))
    }

    /// Modification time and length of every accepted file
    fn scan(&self) -> SupportResult<Snapshot> {
        if !self.folder.is_dir() {
            return Err(SupportError::Reload(format!(
                "Folder to watch does not exist: {}",
                self.folder.display()
            )));
        }
        let mut snapshot = HashMap::new();
        self.scan_dir(&self.folder, &mut snapshot)?;
        Ok(snapshot)
    }

    fn scan_dir(&self, dir: &Path, snapshot: &mut Snapshot) -> SupportResult<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                if self.is_recursive() {
                    self.scan_dir(&path, snapshot)?;
                }
                continue;
            }
            if !self.accepts(&path) {
                continue;
            }
            // the file may disappear between listing and reading metadata
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            snapshot.insert(
                path,
                FileStamp {
                    modified: metadata.modified().ok(),
                    len: metadata.len(),
                },
            );
        }
        Ok(())
    }

    /// Rescan and diff against the previous snapshot, which is then replaced
    pub fn detect_changes(&self) -> SupportResult<Vec<ResourceChange>> {
        let current = self.scan()?;
        let mut previous = self.snapshot.lock();

        let mut changes: Vec<ResourceChange> = current
            .iter()
            .filter_map(|(path, stamp)| match previous.get(path) {
                None => Some(ResourceChange::Added(path.clone())),
                Some(old) if old != stamp => Some(ResourceChange::Modified(path.clone())),
                Some(_) => None,
            })
            .collect();
        changes.extend(
            previous
                .keys()
                .filter(|path| !current.contains_key(*path))
                .map(|path| ResourceChange::Deleted(path.clone())),
        );
        changes.sort_by(|a, b| a.path().cmp(b.path()));

        *previous = current;
        Ok(changes)
    }

    /// Run a filesystem operation on the blocking pool
    async fn run_blocking<T, F>(&self, operation: F) -> SupportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileWatcherReloadStrategy) -> SupportResult<T> + Send + 'static,
    {
        let Some(strategy) = self.this.upgrade() else {
            return operation(self);
        };
        tokio::task::spawn_blocking(move || operation(&strategy))
            .await
            .map_err(|error| SupportError::Reload(format!("File scan task failed: {error}")))?
    }

    /// Detect changes and, if any, reload them. Returns the number of changes.
    pub async fn poll_once(&self) -> SupportResult<usize> {
        let source = self.folder.display().to_string();

        let changes = match self.run_blocking(|strategy| strategy.detect_changes()).await {
            Ok(changes) => changes,
            Err(error) => {
                self.record_failure(&source, &error);
                return Err(error);
            }
        };
        if changes.is_empty() {
            return Ok(0);
        }

        info!(folder = %source, changes = changes.len(), "Reloading changed resources");
        event::notify_context_reloading(&self.notifiers, &source);

        match self.listener.on_reload(&changes).await {
            Ok(()) => {
                self.reload_counter.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = None;
                for change in &changes {
                    event::notify_resource_reloaded(
                        &self.notifiers,
                        &source,
                        &change.path().display().to_string(),
                    );
                }
                event::notify_context_reloaded(&self.notifiers, &source);
                log_reload_operation("reload", &source, changes.len(), "success", None);
                Ok(changes.len())
            }
            Err(error) => {
                self.record_failure(&source, &error);
                Err(error)
            }
        }
    }

    fn record_failure(&self, source: &str, error: &SupportError) {
        self.failed_counter.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.clone());
        event::notify_context_reload_failure(&self.notifiers, source, error);
        log_reload_operation("reload", source, 0, "failed", Some(&error.to_string()));
    }

    fn spawn_watcher(&self) {
        let weak = self.this.clone();
        let interval = tick_period(self.interval());
        let folder = self.folder.display().to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(strategy) = weak.upgrade() else { break };
                if !strategy.is_started() {
                    continue;
                }
                if let Err(error) = strategy.poll_once().await {
                    warn!(folder = %folder, error = %error, "Error reloading resources");
                }
            }
        });
        *self.task.lock() = Some(handle);
    }
}

#[async_trait]
impl Service for FileWatcherReloadStrategy {
    fn service_name(&self) -> &str {
        "file-watcher-reload-strategy"
    }

    fn service_state(&self) -> &ServiceState {
        &self.state
    }

    async fn do_start(&self) -> SupportResult<()> {
        let snapshot = self.run_blocking(|strategy| strategy.scan()).await?;
        debug!(
            folder = %self.folder.display(),
            files = snapshot.len(),
            pattern = %self.pattern(),
            recursive = self.is_recursive(),
            "Starting file watcher"
        );
        *self.snapshot.lock() = snapshot;
        self.spawn_watcher();
        Ok(())
    }

    async fn do_stop(&self) -> SupportResult<()> {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        debug!(folder = %self.folder.display(), "File watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BroadcastEventNotifier, SupportEvent};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Collecting {
        batches: Mutex<Vec<Vec<ResourceChange>>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ResourceReloadListener for Collecting {
        async fn on_reload(&self, changes: &[ResourceChange]) -> SupportResult<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(SupportError::Reload("bad route".into()));
            }
            self.batches.lock().push(changes.to_vec());
            Ok(())
        }
    }

    fn strategy(dir: &TempDir) -> (Arc<FileWatcherReloadStrategy>, Arc<Collecting>, Arc<EventNotifiers>) {
        let listener = Arc::new(Collecting::default());
        let notifiers = Arc::new(EventNotifiers::new());
        let strategy = FileWatcherReloadStrategy::new(dir.path(), listener.clone(), notifiers.clone());
        (strategy, listener, notifiers)
    }

    #[test]
    fn test_pattern_defaults_and_filter() {
        let dir = TempDir::new().unwrap();
        let (strategy, _, _) = strategy(&dir);
        assert_eq!(strategy.pattern(), "*.yaml,*.xml");

        strategy.set_pattern(Some("*.toml"));
        assert_eq!(strategy.file_filter(), vec!["*.toml".to_string()]);
        strategy.set_pattern(None);
        assert_eq!(strategy.pattern(), "*.yaml,*.xml");

        fs::write(dir.path().join("route.yaml"), "a").unwrap();
        fs::write(dir.path().join("notes.txt"), "a").unwrap();
        assert!(strategy.accepts(&dir.path().join("route.yaml")));
        assert!(!strategy.accepts(&dir.path().join("notes.txt")));
        assert!(!strategy.accepts(dir.path()));
    }

    #[test]
    fn test_detect_added_modified_and_deleted() {
        let dir = TempDir::new().unwrap();
        let (strategy, _, _) = strategy(&dir);
        let route = dir.path().join("route.yaml");
        let other = dir.path().join("other.xml");

        fs::write(&route, "a").unwrap();
        assert_eq!(
            strategy.detect_changes().unwrap(),
            vec![ResourceChange::Added(route.clone())]
        );
        assert!(strategy.detect_changes().unwrap().is_empty());

        fs::write(&route, "longer contents").unwrap();
        fs::write(&other, "b").unwrap();
        let changes = strategy.detect_changes().unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&ResourceChange::Modified(route.clone())));
        assert!(changes.contains(&ResourceChange::Added(other.clone())));

        fs::remove_file(&route).unwrap();
        assert_eq!(
            strategy.detect_changes().unwrap(),
            vec![ResourceChange::Deleted(route)]
        );
    }

    #[test]
    fn test_recursive_scan() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("deep.yaml"), "a").unwrap();

        let (strategy, _, _) = strategy(&dir);
        assert!(strategy.detect_changes().unwrap().is_empty());

        strategy.set_recursive(true);
        assert_eq!(strategy.detect_changes().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_once_notifies_listener_and_events() {
        let dir = TempDir::new().unwrap();
        let (strategy, listener, notifiers) = strategy(&dir);
        let broadcast = Arc::new(BroadcastEventNotifier::new(16));
        let mut events = broadcast.subscribe();
        notifiers.add(broadcast);

        fs::write(dir.path().join("route.yaml"), "a").unwrap();
        assert_eq!(strategy.poll_once().await.unwrap(), 1);
        assert_eq!(strategy.reload_counter(), 1);
        assert_eq!(listener.batches.lock().len(), 1);

        assert!(matches!(events.recv().await.unwrap().event, SupportEvent::ContextReloading { .. }));
        assert!(matches!(events.recv().await.unwrap().event, SupportEvent::ResourceReloaded { .. }));
        assert!(matches!(events.recv().await.unwrap().event, SupportEvent::ContextReloaded { .. }));

        assert_eq!(strategy.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_listener_failure_is_counted() {
        let dir = TempDir::new().unwrap();
        let (strategy, listener, _) = strategy(&dir);
        listener.fail.store(true, Ordering::Relaxed);

        fs::write(dir.path().join("route.xml"), "<routes/>").unwrap();
        assert!(strategy.poll_once().await.is_err());
        assert_eq!(strategy.failed_counter(), 1);
        assert!(matches!(strategy.last_error(), Some(SupportError::Reload(_))));

        strategy.reset_counters();
        assert_eq!(strategy.failed_counter(), 0);
        assert!(strategy.last_error().is_none());
    }

    #[tokio::test]
    async fn test_start_requires_existing_folder() {
        let dir = TempDir::new().unwrap();
        let listener = Arc::new(Collecting::default());
        let strategy = FileWatcherReloadStrategy::new(
            dir.path().join("missing"),
            listener,
            Arc::new(EventNotifiers::new()),
        );
        assert!(strategy.start().await.is_err());
    }

    #[tokio::test]
    async fn test_started_watcher_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let (strategy, listener, _) = strategy(&dir);
        strategy.set_interval(Duration::from_millis(10));
        strategy.start().await.unwrap();

        fs::write(dir.path().join("route.yaml"), "a").unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while strategy.reload_counter() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(listener.batches.lock()[0].len(), 1);

        strategy.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_watcher_still_reloads() {
        let dir = TempDir::new().unwrap();
        let (strategy, listener, _) = strategy(&dir);
        strategy.set_interval(Duration::ZERO);
        strategy.start().await.unwrap();

        fs::write(dir.path().join("route.xml"), "<routes/>").unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while strategy.reload_counter() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(strategy.is_started());
        assert!(!listener.batches.lock().is_empty());

        strategy.stop().await.unwrap();
    }
}
