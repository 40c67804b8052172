//! TTL-keyed dynamic announcement store
//!
//! One row per announcing node. Each refresh writes a single column whose
//! name is the absolute expiration timestamp and whose write timestamp
//! doubles as the last-writer-wins clock. Expiration is a property of the
//! data, not a workflow: the live service set is defined purely by
//! `(now, stored columns)`, and the background reaper only reclaims space.

use crate::clock::Clock;
use crate::codec;
use crate::column::{Column, ColumnFamily};
use beacon_common::{DynamicAnnouncement, Error, NodeId, Result, Service};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// Rows fetched per scan page.
pub const PAGE_SIZE: usize = 1000;

const REAPER_PERIOD: Duration = Duration::from_secs(60);

/// Counters kept by the reaper across passes.
#[derive(Debug, Default)]
pub struct ReaperStats {
    passes: AtomicU64,
    columns_reaped: AtomicU64,
    errors: AtomicU64,
}

impl ReaperStats {
    fn record_pass(&self, reaped: u64) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.columns_reaped.fetch_add(reaped, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ReaperSnapshot {
        ReaperSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            columns_reaped: self.columns_reaped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the reaper counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReaperSnapshot {
    pub passes: u64,
    pub columns_reaped: u64,
    pub errors: u64,
}

/// The dynamic announcement registry.
///
/// Safe for concurrent use; every operation may block on backing-store
/// I/O. The store owns its reaper task exclusively and cancels it on
/// shutdown or drop.
pub struct DynamicStore {
    column_family: Arc<dyn ColumnFamily>,
    clock: Arc<dyn Clock>,
    max_age_ms: u64,
    initialized: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<ReaperStats>,
}

impl DynamicStore {
    #[must_use]
    pub fn new(column_family: Arc<dyn ColumnFamily>, clock: Arc<dyn Clock>, max_age: Duration) -> Self {
        Self {
            column_family,
            clock,
            max_age_ms: max_age.as_millis() as u64,
            initialized: AtomicBool::new(false),
            reaper: Mutex::new(None),
            stats: Arc::new(ReaperStats::default()),
        }
    }

    /// Start the background reaper. Calling this twice is a programming
    /// error and fails with [`Error::AlreadyInitialized`].
    pub fn initialize(&self) -> Result<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyInitialized);
        }

        let handle = tokio::spawn(reaper_loop(
            Arc::clone(&self.column_family),
            Arc::clone(&self.clock),
            Arc::clone(&self.stats),
        ));
        *self.reaper.lock() = Some(handle);
        Ok(())
    }

    /// Cancel future reaper runs. Does not wait for an in-flight pass.
    pub fn shutdown(&self) {
        if let Some(handle) = self.reaper.lock().take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn reaper_stats(&self) -> ReaperSnapshot {
        self.stats.snapshot()
    }

    /// Record a node's announcement, replacing any previous one.
    ///
    /// Returns `false` when a still-live prior announcement was already
    /// present at the time of this write. The boolean is a best-effort
    /// freshness signal, not a compare-and-set: concurrent puts for the
    /// same node may both see `true`.
    pub async fn put(&self, node_id: NodeId, announcement: &DynamicAnnouncement) -> Result<bool> {
        let services = announcement.to_services(node_id);
        let value = codec::encode(&services)?;

        let now = self.clock.now_ms();
        let expiration = now + self.max_age_ms;
        let row_key = node_id.to_string();

        self.column_family
            .insert(
                &row_key,
                Column {
                    name: expiration,
                    value,
                    timestamp: now,
                },
            )
            .await?;

        // Any live column written before this call means the node was
        // already announced.
        let live = self
            .column_family
            .slice(&row_key, Some(now + 1), None, false, usize::MAX)
            .await?;
        Ok(!live.iter().any(|column| column.timestamp < now))
    }

    /// Remove a node's announcement.
    ///
    /// Returns whether any not-yet-fully-expired entry existed. The
    /// existence check is not serialized with the deletion; a concurrent
    /// put can make the boolean lie. The next reaper pass or put converges
    /// the state.
    pub async fn delete(&self, node_id: NodeId) -> Result<bool> {
        let now = self.clock.now_ms();
        let row_key = node_id.to_string();

        let cutoff = now.saturating_sub(self.max_age_ms);
        let recent = self
            .column_family
            .slice(&row_key, Some(cutoff + 1), None, false, 1)
            .await?;
        let existed = !recent.is_empty();

        self.column_family.delete_row(&row_key, now).await?;
        Ok(existed)
    }

    /// All currently live services across all nodes.
    pub async fn get_all(&self) -> Result<HashSet<Service>> {
        let now = self.clock.now_ms();
        let mut services = HashSet::new();
        let mut start_after: Option<String> = None;

        loop {
            let page = self
                .column_family
                .scan(start_after.as_deref(), Some(now + 1), None, true, PAGE_SIZE)
                .await?;

            for row in &page {
                // Fold concurrent columns to the newest write; equal write
                // timestamps resolve by the furthest expiration.
                let chosen = row
                    .columns
                    .iter()
                    .max_by_key(|column| (column.timestamp, column.name));
                let Some(column) = chosen else { continue };

                match codec::decode(&column.value) {
                    Ok(decoded) => services.extend(decoded),
                    Err(e) => error!(
                        row = %row.key,
                        expiration = column.name,
                        error = %e,
                        "skipping undecodable announcement column"
                    ),
                }
            }

            if page.len() < PAGE_SIZE {
                break;
            }
            start_after = page.last().map(|row| row.key.clone());
        }

        Ok(services)
    }

    /// Live services of one type.
    pub async fn get(&self, service_type: &str) -> Result<HashSet<Service>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|service| service.service_type == service_type)
            .collect())
    }

    /// Live services of one type within one pool.
    pub async fn get_in_pool(&self, service_type: &str, pool: &str) -> Result<HashSet<Service>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|service| service.service_type == service_type && service.pool == pool)
            .collect())
    }
}

impl Drop for DynamicStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Scheduled reaper: runs forever with fixed delay, swallowing per-pass
/// errors so a failing pass never kills the task.
async fn reaper_loop(
    column_family: Arc<dyn ColumnFamily>,
    clock: Arc<dyn Clock>,
    stats: Arc<ReaperStats>,
) {
    let mut ticker = tokio::time::interval(REAPER_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let now = clock.now_ms();
        match remove_expired(column_family.as_ref(), now).await {
            Ok(reaped) => {
                stats.record_pass(reaped);
                debug!(reaped, "reaper pass complete");
            }
            Err(e) => {
                stats.record_error();
                error!(error = %e, "reaper pass failed");
            }
        }
    }
}

/// One reaper pass: physically delete every column whose expiration is at
/// or before `now`. Live columns are never touched.
pub(crate) async fn remove_expired(column_family: &dyn ColumnFamily, now: u64) -> Result<u64> {
    let mut reaped = 0u64;
    let mut start_after: Option<String> = None;

    loop {
        let page = column_family
            .scan(start_after.as_deref(), None, Some(now), false, PAGE_SIZE)
            .await?;

        for row in &page {
            if row.columns.is_empty() {
                continue;
            }
            let names: Vec<u64> = row.columns.iter().map(|column| column.name).collect();
            column_family.delete_columns(&row.key, &names, now).await?;
            reaped += names.len() as u64;
        }

        if page.len() < PAGE_SIZE {
            break;
        }
        start_after = page.last().map(|row| row.key.clone());
    }

    Ok(reaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryColumnFamily;
    use beacon_common::ServiceAnnouncement;
    use std::collections::BTreeMap;

    const TTL: Duration = Duration::from_secs(30);

    fn announcement(location: &str, pool: &str, types: &[(&str, &str)]) -> DynamicAnnouncement {
        DynamicAnnouncement {
            environment: "testing".to_string(),
            location: location.to_string(),
            pool: pool.to_string(),
            service_announcements: types
                .iter()
                .map(|(service_type, key)| ServiceAnnouncement {
                    id: beacon_common::ServiceId::new(),
                    service_type: service_type.to_string(),
                    properties: BTreeMap::from([("key".to_string(), key.to_string())]),
                })
                .collect(),
        }
    }

    fn store() -> (DynamicStore, Arc<ManualClock>, Arc<MemoryColumnFamily>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let cf = Arc::new(MemoryColumnFamily::new());
        let store = DynamicStore::new(
            Arc::clone(&cf) as Arc<dyn ColumnFamily>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            TTL,
        );
        (store, clock, cf)
    }

    #[tokio::test]
    async fn test_put_returns_true_for_new_node() {
        let (store, _, _) = store();
        let fresh = store
            .put(NodeId::new(), &announcement("/a/b/c", "alpha", &[("storage", "1")]))
            .await
            .unwrap();
        assert!(fresh);
    }

    #[tokio::test]
    async fn test_put_returns_false_while_prior_announcement_live() {
        let (store, clock, _) = store();
        let node = NodeId::new();
        let ann = announcement("/a/b/c", "alpha", &[("storage", "1")]);

        assert!(store.put(node, &ann).await.unwrap());
        clock.advance(1);
        assert!(!store.put(node, &ann).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_returns_true_after_expiry() {
        let (store, clock, _) = store();
        let node = NodeId::new();
        let ann = announcement("/a/b/c", "alpha", &[("storage", "1")]);

        store.put(node, &ann).await.unwrap();
        clock.advance(TTL.as_millis() as u64 + 1);
        assert!(store.put(node, &ann).await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_expiry_without_reaper() {
        let (store, clock, _) = store();
        let node = NodeId::new();
        store
            .put(node, &announcement("/a/b/c", "alpha", &[("storage", "1")]))
            .await
            .unwrap();

        clock.advance(29_000);
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        clock.advance(2_000);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_extends_ttl() {
        let (store, clock, _) = store();
        let node = NodeId::new();
        let ann = announcement("/a/b/c", "alpha", &[("storage", "1")]);

        store.put(node, &ann).await.unwrap();
        clock.advance(20_000);
        store.put(node, &ann).await.unwrap();

        clock.advance(15_000); // t = 35s
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        clock.advance(20_000); // t = 55s
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (store, clock, _) = store();
        let node = NodeId::new();
        let ann = announcement("/a/b/c", "alpha", &[("storage", "1"), ("web", "2")]);

        store.put(node, &ann).await.unwrap();
        clock.advance(1);
        store.put(node, &ann).await.unwrap();

        let visible = store.get_all().await.unwrap();
        let expected: HashSet<Service> = ann.to_services(node).into_iter().collect();
        assert_eq!(visible, expected);
    }

    #[tokio::test]
    async fn test_reannounce_replaces_services() {
        let (store, clock, _) = store();
        let node = NodeId::new();

        store
            .put(node, &announcement("/a/b/c", "alpha", &[("storage", "1")]))
            .await
            .unwrap();
        clock.advance(1);
        let replacement = announcement("/a/b/c", "alpha", &[("web", "2")]);
        store.put(node, &replacement).await.unwrap();

        let visible = store.get_all().await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible.iter().next().unwrap().service_type, "web");
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _, _) = store();
        let node = NodeId::new();
        store
            .put(node, &announcement("/a/b/c", "alpha", &[("storage", "1")]))
            .await
            .unwrap();

        assert!(store.delete(node).await.unwrap());
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(!store.delete(node).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_unknown_node_returns_false() {
        let (store, _, _) = store();
        assert!(!store.delete(NodeId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_filters_match_get_all() {
        let (store, _, _) = store();
        store
            .put(
                NodeId::new(),
                &announcement("/a/b/c", "alpha", &[("storage", "1"), ("web", "2")]),
            )
            .await
            .unwrap();
        store
            .put(NodeId::new(), &announcement("/x/y/z", "beta", &[("storage", "3")]))
            .await
            .unwrap();

        let all = store.get_all().await.unwrap();

        let by_type = store.get("storage").await.unwrap();
        let expected: HashSet<Service> = all
            .iter()
            .filter(|s| s.service_type == "storage")
            .cloned()
            .collect();
        assert_eq!(by_type, expected);
        assert_eq!(by_type.len(), 2);

        let by_pool = store.get_in_pool("storage", "beta").await.unwrap();
        let expected: HashSet<Service> = all
            .iter()
            .filter(|s| s.service_type == "storage" && s.pool == "beta")
            .cloned()
            .collect();
        assert_eq!(by_pool, expected);
        assert_eq!(by_pool.len(), 1);

        assert!(store.get("unknown").await.unwrap().is_empty());
        assert!(store.get_in_pool("storage", "unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_column_is_skipped() {
        let (store, clock, cf) = store();
        let node = NodeId::new();
        store
            .put(node, &announcement("/a/b/c", "alpha", &[("storage", "1")]))
            .await
            .unwrap();

        let now = clock.now_ms();
        cf.insert(
            &NodeId::new().to_string(),
            Column {
                name: now + TTL.as_millis() as u64,
                value: "corrupt".to_string(),
                timestamp: now,
            },
        )
        .await
        .unwrap();

        // The bad row is dropped, the good one survives, and no error
        // escapes the query.
        let visible = store.get_all().await.unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[tokio::test]
    async fn test_reaper_pass_removes_only_expired_columns() {
        let (store, clock, cf) = store();
        let expired_node = NodeId::new();
        let live_node = NodeId::new();

        store
            .put(expired_node, &announcement("/a", "alpha", &[("storage", "1")]))
            .await
            .unwrap();
        clock.advance(20_000);
        store
            .put(live_node, &announcement("/b", "alpha", &[("storage", "2")]))
            .await
            .unwrap();

        clock.advance(20_000); // expired_node at +40s, live_node at +20s
        let reaped = remove_expired(cf.as_ref(), clock.now_ms()).await.unwrap();
        assert_eq!(reaped, 1);

        let gone = cf
            .slice(&expired_node.to_string(), None, None, false, usize::MAX)
            .await
            .unwrap();
        assert!(gone.is_empty());

        let kept = cf
            .slice(&live_node.to_string(), None, None, false, usize::MAX)
            .await
            .unwrap();
        assert_eq!(kept.len(), 1);

        let visible = store.get_all().await.unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[tokio::test]
    async fn test_reaper_pass_is_a_noop_without_expired_columns() {
        let (store, clock, cf) = store();
        store
            .put(NodeId::new(), &announcement("/a", "alpha", &[("storage", "1")]))
            .await
            .unwrap();

        let reaped = remove_expired(cf.as_ref(), clock.now_ms()).await.unwrap();
        assert_eq!(reaped, 0);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_double_initialize_fails() {
        let (store, _, _) = store();
        store.initialize().unwrap();
        assert!(matches!(store.initialize(), Err(Error::AlreadyInitialized)));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (store, _, _) = store();
        store.initialize().unwrap();
        store.shutdown();
        store.shutdown();
    }
}
