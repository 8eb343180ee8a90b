//! File watcher reload strategy running on its own ticker.

use async_trait::async_trait;
use conduit_support::constants::events;
use conduit_support::event::{BroadcastEventNotifier, EventNotifiers};
use conduit_support::reload::{FileWatcherReloadStrategy, ResourceChange, ResourceReloadListener};
use conduit_support::service::ServiceExt;
use conduit_support::{SupportError, SupportResult};
use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct RouteReloader {
    reloaded: Mutex<Vec<ResourceChange>>,
}

#[async_trait]
impl ResourceReloadListener for RouteReloader {
    async fn on_reload(&self, changes: &[ResourceChange]) -> SupportResult<()> {
        self.reloaded.lock().extend_from_slice(changes);
        Ok(())
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_watcher_reloads_new_and_changed_routes() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("existing.yaml"), "route: a").unwrap();

    let listener = Arc::new(RouteReloader::default());
    let notifiers = Arc::new(EventNotifiers::new());
    let broadcast = Arc::new(BroadcastEventNotifier::new(32));
    let mut subscriber = broadcast.subscribe();
    notifiers.add(broadcast);

    let strategy = FileWatcherReloadStrategy::new(dir.path(), listener.clone(), notifiers);
    strategy.set_interval(Duration::from_millis(10));
    strategy.start().await.unwrap();

    // files present at start are the baseline, not changes
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(listener.reloaded.lock().is_empty());

    let added = dir.path().join("orders.yaml");
    fs::write(&added, "route: orders").unwrap();
    fs::write(dir.path().join("ignored.txt"), "x").unwrap();

    wait_for(|| strategy.reload_counter() == 1).await;
    assert_eq!(*listener.reloaded.lock(), vec![ResourceChange::Added(added.clone())]);

    let mut names = Vec::new();
    while !names.contains(&events::CONTEXT_RELOADED) {
        let published = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
            .await
            .unwrap()
            .unwrap();
        names.push(published.event.name());
    }
    assert!(names.contains(&events::CONTEXT_RELOADING));
    assert!(names.contains(&events::RESOURCE_RELOADED));
    assert!(names.contains(&events::CONTEXT_RELOADED));

    strategy.stop().await.unwrap();
}

#[tokio::test]
async fn test_recursive_watch_sees_nested_files() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("nested");
    fs::create_dir(&nested).unwrap();

    let listener = Arc::new(RouteReloader::default());
    let strategy = FileWatcherReloadStrategy::new(
        dir.path(),
        listener.clone(),
        Arc::new(EventNotifiers::new()),
    );
    strategy.set_recursive(true);
    strategy.set_pattern(Some("*.xml"));
    strategy.set_interval(Duration::from_millis(10));
    strategy.start().await.unwrap();

    let route = nested.join("route.xml");
    fs::write(&route, "<route/>").unwrap();

    wait_for(|| !listener.reloaded.lock().is_empty()).await;
    assert_eq!(listener.reloaded.lock()[0], ResourceChange::Added(route));

    strategy.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_folder_fails_start() {
    let dir = TempDir::new().unwrap();
    let strategy = FileWatcherReloadStrategy::new(
        dir.path().join("does-not-exist"),
        Arc::new(RouteReloader::default()),
        Arc::new(EventNotifiers::new()),
    );

    let err = strategy.start().await.unwrap_err();
    assert!(matches!(err, SupportError::Reload(_)));
    assert!(!strategy.is_started());
}
