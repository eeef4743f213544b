//! Change listener keeping a [`TemplateCache`] in sync with a document source.
//!
//! Two tasks cooperate:
//!
//! - the **delivery** task owns the subscription. It forwards snapshots in
//!   order over a bounded channel and re-subscribes with exponential backoff
//!   when the subscription fails or ends;
//! - the **processing** task is the only consumer of that channel. It decodes
//!   each snapshot into templates, stores the ones that changed and fires the
//!   ready signal after the first snapshot.
//!
//! Both tasks stop on the same [`CancellationToken`]; dropping the
//! subscription stream on the way out closes it. The cache keeps whatever it
//! last stored.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::config::ListenerConfig;
use super::error::SyncError;
use super::source::{DocumentSource, Snapshot};
use crate::domains::templates::{StoreOutcome, Template, TemplateCache};

/// Statistics about the listener.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListenerStats {
    pub connected: bool,
    pub snapshots_received: u64,
    pub definitions_stored: u64,
    pub definitions_rejected: u64,
    pub definitions_removed: u64,
    pub connection_errors: u64,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// What applying one snapshot did to the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    /// Definitions that failed to decode or compile.
    pub rejected: usize,
    /// Top-level fields that are not definitions.
    pub ignored: usize,
    pub removed: usize,
}

impl ApplyReport {
    /// Number of effective changes.
    pub fn changed(&self) -> usize {
        self.inserted + self.replaced + self.removed
    }
}

/// Apply one snapshot to `cache`.
///
/// Every object-valued field is decoded as a template definition. A field
/// that fails to decode or compile is logged and skipped; whatever the cache
/// held for that key stays in place. With `prune`, keys that are absent from
/// the snapshot are dropped.
pub fn apply_snapshot(cache: &TemplateCache, snapshot: &Snapshot, prune: bool) -> ApplyReport {
    let mut report = ApplyReport::default();
    cache.initialize(snapshot.data.len());

    for (endpoint, value) in &snapshot.data {
        let Some(fields) = value.as_object() else {
            debug!(endpoint = %endpoint, "Ignoring non-definition field");
            report.ignored += 1;
            continue;
        };

        match Template::from_map(endpoint.as_str(), fields) {
            Ok(template) => match cache.store(endpoint, template) {
                StoreOutcome::Inserted => report.inserted += 1,
                StoreOutcome::Replaced => report.replaced += 1,
                StoreOutcome::Unchanged => report.unchanged += 1,
            },
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Skipping invalid template definition");
                report.rejected += 1;
            }
        }
    }

    if prune {
        let keep: HashSet<String> = snapshot.data.keys().cloned().collect();
        report.removed = cache.retain(&keep);
    }

    report
}

/// Read-only view of a running listener.
#[derive(Debug, Clone)]
pub struct ListenerMonitor {
    ready: watch::Receiver<bool>,
    stats: Arc<RwLock<ListenerStats>>,
}

impl ListenerMonitor {
    /// Whether the first snapshot has been applied.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the first snapshot has been applied.
    pub async fn ready(&self) -> Result<(), SyncError> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::ListenerStopped)
    }

    /// Current listener statistics.
    pub fn stats(&self) -> ListenerStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to a spawned listener.
#[derive(Debug)]
pub struct ListenerHandle {
    monitor: ListenerMonitor,
    cancel: CancellationToken,
    delivery: JoinHandle<()>,
    processing: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn monitor(&self) -> ListenerMonitor {
        self.monitor.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.monitor.is_ready()
    }

    pub async fn ready(&self) -> Result<(), SyncError> {
        self.monitor.ready().await
    }

    pub fn stats(&self) -> ListenerStats {
        self.monitor.stats()
    }

    /// Stop both tasks and wait for them to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (task, handle) in [("delivery", self.delivery), ("processing", self.processing)] {
            if let Err(e) = handle.await {
                warn!(task, error = %e, "Listener task did not exit cleanly");
            }
        }
        info!("Template listener stopped");
    }
}

/// Keeps a template cache synchronised with a document source.
pub struct CacheListener {
    cache: Arc<TemplateCache>,
    source: Arc<dyn DocumentSource>,
    config: ListenerConfig,
}

impl CacheListener {
    pub fn new(
        cache: Arc<TemplateCache>,
        source: Arc<dyn DocumentSource>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            cache,
            source,
            config,
        }
    }

    /// Spawn the delivery and processing tasks.
    pub fn spawn(self, cancel: CancellationToken) -> ListenerHandle {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (ready_tx, ready_rx) = watch::channel(false);
        let stats = Arc::new(RwLock::new(ListenerStats::default()));

        info!(
            source = %self.source.describe(),
            agent = self.cache.agent_name(),
            "Starting template listener"
        );

        let delivery = tokio::spawn(deliver(
            Arc::clone(&self.source),
            snapshot_tx,
            Arc::clone(&stats),
            self.config.clone(),
            cancel.clone(),
        ));

        let processing = tokio::spawn(process(
            Arc::clone(&self.cache),
            snapshot_rx,
            ready_tx,
            Arc::clone(&stats),
            self.config.prune_removed,
            cancel.clone(),
        ));

        ListenerHandle {
            monitor: ListenerMonitor {
                ready: ready_rx,
                stats,
            },
            cancel,
            delivery,
            processing,
        }
    }

    /// Spawn the listener and wait for the first snapshot to be applied.
    ///
    /// On timeout, or if the listener stops first, it is shut down and the
    /// error returned.
    pub async fn start(self, cancel: CancellationToken) -> Result<ListenerHandle, SyncError> {
        let ready_timeout = self.config.ready_timeout();
        let handle = self.spawn(cancel);

        let ready = match ready_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.ready())
                .await
                .unwrap_or(Err(SyncError::ReadyTimeout(limit))),
            None => handle.ready().await,
        };

        match ready {
            Ok(()) => Ok(handle),
            Err(e) => {
                handle.shutdown().await;
                Err(e)
            }
        }
    }
}

impl TemplateCache {
    /// Keep this cache in sync with `source`, returning once the first
    /// snapshot has been applied.
    pub async fn listen(
        self: &Arc<Self>,
        source: Arc<dyn DocumentSource>,
        config: ListenerConfig,
        cancel: CancellationToken,
    ) -> Result<ListenerHandle, SyncError> {
        CacheListener::new(Arc::clone(self), source, config)
            .start(cancel)
            .await
    }
}

fn update_stats(stats: &RwLock<ListenerStats>, f: impl FnOnce(&mut ListenerStats)) {
    f(&mut stats.write().unwrap_or_else(PoisonError::into_inner));
}

fn record_connection_error(stats: &RwLock<ListenerStats>) {
    update_stats(stats, |s| {
        s.connected = false;
        s.connection_errors += 1;
        s.last_error_at = Some(Utc::now());
    });
}

#[instrument(skip_all, fields(source = %source.describe()))]
async fn deliver(
    source: Arc<dyn DocumentSource>,
    snapshots: mpsc::Sender<Snapshot>,
    stats: Arc<RwLock<ListenerStats>>,
    config: ListenerConfig,
    cancel: CancellationToken,
) {
    let mut backoff = config.initial_backoff();

    'subscription: loop {
        let subscribed = tokio::select! {
            biased;
            () = cancel.cancelled() => break 'subscription,
            result = source.subscribe() => result,
        };

        match subscribed {
            Ok(mut stream) => {
                info!("Subscribed to definitions document");
                update_stats(&stats, |s| s.connected = true);

                loop {
                    let next = tokio::select! {
                        biased;
                        () = cancel.cancelled() => break 'subscription,
                        next = stream.next() => next,
                    };

                    match next {
                        Some(Ok(snapshot)) => {
                            backoff = config.initial_backoff();
                            let sent = tokio::select! {
                                biased;
                                () = cancel.cancelled() => break 'subscription,
                                sent = snapshots.send(snapshot) => sent,
                            };
                            if sent.is_err() {
                                debug!("Snapshot consumer is gone");
                                break 'subscription;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Subscription failed");
                            record_connection_error(&stats);
                            break;
                        }
                        None => {
                            warn!("Subscription ended");
                            record_connection_error(&stats);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to subscribe to definitions document");
                record_connection_error(&stats);
            }
        }

        info!(
            backoff_ms = backoff.as_millis() as u64,
            "Resubscribing after backoff"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break 'subscription,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = next_backoff(backoff, config.max_backoff());
    }

    update_stats(&stats, |s| s.connected = false);
    debug!("Delivery task stopped");
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

#[instrument(skip_all, fields(agent = %cache.agent_name()))]
async fn process(
    cache: Arc<TemplateCache>,
    mut snapshots: mpsc::Receiver<Snapshot>,
    ready: watch::Sender<bool>,
    stats: Arc<RwLock<ListenerStats>>,
    prune: bool,
    cancel: CancellationToken,
) {
    loop {
        let snapshot = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Listener cancelled, keeping last known templates");
                break;
            }
            next = snapshots.recv() => match next {
                Some(snapshot) => snapshot,
                None => {
                    debug!("Snapshot channel closed");
                    break;
                }
            },
        };

        let report = apply_snapshot(&cache, &snapshot, prune);
        update_stats(&stats, |s| {
            s.snapshots_received += 1;
            s.definitions_stored += (report.inserted + report.replaced) as u64;
            s.definitions_rejected += report.rejected as u64;
            s.definitions_removed += report.removed as u64;
            s.last_snapshot_at = Some(Utc::now());
        });
        info!(
            inserted = report.inserted,
            replaced = report.replaced,
            unchanged = report.unchanged,
            rejected = report.rejected,
            removed = report.removed,
            revision = cache.revision(),
            "Applied definitions snapshot"
        );

        let first = ready.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
        if first {
            info!(templates = cache.len(), "Initial template load complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sync::MemoryDocumentSource;
    use crate::domains::sync::error::SourceError;
    use crate::domains::sync::source::{SnapshotStream, WriteResult};
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::{Map, Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn test_config() -> ListenerConfig {
        ListenerConfig {
            channel_capacity: 4,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            prune_removed: false,
            ready_timeout_ms: Some(2_000),
        }
    }

    fn definitions() -> Map<String, Value> {
        doc(json!({
            "/test_endpoint_1": {
                "handler-name": "universal-answer",
                "calculated-variables": ["UniversalAnswer"],
                "session-variables": { "user_name": "Name" },
                "prototype": "Hello {{.Name}}, the answer is {{.UniversalAnswer}}"
            },
            "/test_endpoint_2": { "prototype": "Static text" }
        }))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    /// Fails the first `failures` subscriptions, then behaves like `inner`.
    struct FlakySource {
        inner: MemoryDocumentSource,
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for FlakySource {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        async fn subscribe(&self) -> Result<SnapshotStream, SourceError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(SourceError::NotFound("flaky".to_string()));
            }
            self.inner.subscribe().await
        }

        async fn replace(&self, data: Map<String, Value>) -> Result<WriteResult, SourceError> {
            self.inner.replace(data).await
        }
    }

    /// Emits a fixed sequence once, then stays open.
    struct SequenceSource {
        snapshots: Vec<Snapshot>,
    }

    #[async_trait]
    impl DocumentSource for SequenceSource {
        fn describe(&self) -> String {
            "sequence".to_string()
        }

        async fn subscribe(&self) -> Result<SnapshotStream, SourceError> {
            let items: Vec<Result<Snapshot, SourceError>> =
                self.snapshots.iter().cloned().map(Ok).collect();
            Ok(stream::iter(items).chain(stream::pending()).boxed())
        }

        async fn replace(&self, _data: Map<String, Value>) -> Result<WriteResult, SourceError> {
            Ok(WriteResult {
                update_time: Utc::now(),
            })
        }
    }

    #[test]
    fn test_apply_snapshot_mixed_fields() {
        let cache = TemplateCache::new("agent");
        let mut data = definitions();
        data.insert("/broken".to_string(), json!({ "prototype": "{{.Name" }));
        data.insert("version".to_string(), json!(3));

        let report = apply_snapshot(&cache, &Snapshot::new(data), false);
        assert_eq!(
            report,
            ApplyReport {
                inserted: 2,
                rejected: 1,
                ignored: 1,
                ..Default::default()
            }
        );
        assert!(cache.is_initialized());
        assert!(cache.load("/broken").is_none());
        assert!(cache.load("/test_endpoint_2").is_some());
    }

    #[test]
    fn test_apply_snapshot_is_idempotent() {
        let cache = TemplateCache::new("agent");
        apply_snapshot(&cache, &Snapshot::new(definitions()), false);
        let revision = cache.revision();

        let report = apply_snapshot(&cache, &Snapshot::new(definitions()), false);
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.changed(), 0);
        assert_eq!(cache.revision(), revision);
    }

    #[test]
    fn test_bad_definition_keeps_previous_entry() {
        let cache = TemplateCache::new("agent");
        apply_snapshot(&cache, &Snapshot::new(definitions()), false);

        let mut data = definitions();
        data.insert(
            "/test_endpoint_2".to_string(),
            json!({ "prototype": "{{if .X}}never closed" }),
        );
        let report = apply_snapshot(&cache, &Snapshot::new(data), true);

        assert_eq!(report.rejected, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(cache.load("/test_endpoint_2").unwrap().prototype(), "Static text");
    }

    #[test]
    fn test_apply_snapshot_prunes_removed_keys() {
        let cache = TemplateCache::new("agent");
        apply_snapshot(&cache, &Snapshot::new(definitions()), false);

        let mut data = definitions();
        data.remove("/test_endpoint_2");

        let kept = apply_snapshot(&cache, &Snapshot::new(data.clone()), false);
        assert_eq!(kept.removed, 0);
        assert_eq!(cache.len(), 2);

        let pruned = apply_snapshot(&cache, &Snapshot::new(data), true);
        assert_eq!(pruned.removed, 1);
        assert_eq!(cache.endpoints(), vec!["/test_endpoint_1"]);
    }

    #[test]
    fn test_empty_snapshot_initializes_cache() {
        let cache = TemplateCache::new("agent");
        let report = apply_snapshot(&cache, &Snapshot::new(Map::new()), false);
        assert_eq!(report, ApplyReport::default());
        assert!(cache.is_initialized());
    }

    #[test]
    fn test_next_backoff_caps() {
        let max = Duration::from_secs(30);
        assert_eq!(next_backoff(Duration::from_secs(1), max), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(20), max), max);
    }

    #[tokio::test]
    async fn test_listen_waits_for_initial_load() {
        let cache = Arc::new(TemplateCache::new("agent"));
        let source = Arc::new(MemoryDocumentSource::with_document(definitions()));

        let handle = cache
            .listen(source, test_config(), CancellationToken::new())
            .await
            .unwrap();

        assert!(handle.is_ready());
        assert_eq!(cache.len(), 2);
        let stats = handle.stats();
        assert_eq!(stats.snapshots_received, 1);
        assert_eq!(stats.definitions_stored, 2);
        assert!(stats.connected);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_applies_later_updates() {
        let cache = Arc::new(TemplateCache::new("agent"));
        let source = Arc::new(MemoryDocumentSource::with_document(definitions()));

        let handle = cache
            .listen(source.clone(), test_config(), CancellationToken::new())
            .await
            .unwrap();

        let mut data = definitions();
        data.insert("/test_endpoint_2".to_string(), json!({ "prototype": "Updated" }));
        source.replace(data).await.unwrap();

        eventually(|| {
            cache
                .load("/test_endpoint_2")
                .is_some_and(|t| t.prototype() == "Updated")
        })
        .await;
        assert_eq!(handle.stats().snapshots_received, 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_snapshots_applied_in_order() {
        let snapshots: Vec<Snapshot> = (0..10)
            .map(|i| {
                Snapshot::new(doc(json!({
                    "/counter": { "prototype": format!("round {}", i) }
                })))
            })
            .collect();

        let cache = Arc::new(TemplateCache::new("agent"));
        let handle = cache
            .listen(
                Arc::new(SequenceSource { snapshots }),
                test_config(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        eventually(|| handle.stats().snapshots_received == 10).await;
        assert_eq!(cache.load("/counter").unwrap().prototype(), "round 9");
        assert_eq!(cache.revision(), 10);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnects_after_subscription_failures() {
        let cache = Arc::new(TemplateCache::new("agent"));
        let source = Arc::new(FlakySource {
            inner: MemoryDocumentSource::with_document(definitions()),
            failures: 3,
            attempts: AtomicUsize::new(0),
        });

        let handle = cache
            .listen(source.clone(), test_config(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(handle.stats().connection_errors, 3);
        assert_eq!(source.attempts.load(Ordering::SeqCst), 4);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_ready_timeout() {
        let cache = Arc::new(TemplateCache::new("agent"));
        let source = Arc::new(MemoryDocumentSource::new());
        let config = ListenerConfig {
            ready_timeout_ms: Some(30),
            ..test_config()
        };

        let result = cache.listen(source.clone(), config, CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::ReadyTimeout(_))));
        assert!(!cache.is_initialized());
        eventually(|| source.subscriber_count() == 0).await;
    }

    #[tokio::test]
    async fn test_cancel_before_ready_reports_stopped() {
        let cache = Arc::new(TemplateCache::new("agent"));
        let source: Arc<dyn DocumentSource> = Arc::new(MemoryDocumentSource::new());
        let cancel = CancellationToken::new();

        let handle = CacheListener::new(cache, source, test_config()).spawn(cancel.clone());
        let monitor = handle.monitor();
        cancel.cancel();

        assert!(matches!(monitor.ready().await, Err(SyncError::ListenerStopped)));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscription_and_keeps_cache() {
        let cache = Arc::new(TemplateCache::new("agent"));
        let source = Arc::new(MemoryDocumentSource::with_document(definitions()));

        let handle = cache
            .listen(source.clone(), test_config(), CancellationToken::new())
            .await
            .unwrap();
        let monitor = handle.monitor();
        assert_eq!(source.subscriber_count(), 1);

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("listener tasks should unwind on cancellation");

        assert_eq!(source.subscriber_count(), 0);
        assert!(!monitor.stats().connected);
        assert!(monitor.ready().await.is_ok());

        source.replace(Map::new()).await.unwrap();
        assert_eq!(cache.len(), 2);
    }
}
