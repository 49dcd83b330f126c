//! Per-tenant data-access handle cache
//!
//! Holds at most one live handle per tenant. The first `get_handle` for a
//! tenant resolves its config through the `TenantDirectory` and opens a
//! handle through the `Connector`; every later call returns the same `Arc`
//! without touching the directory.
//!
//! Each key owns an `OnceCell`, so concurrent first lookups for the same
//! tenant construct exactly one handle. A failed or timed-out
//! initialization leaves the cell empty: nothing about the failure is
//! remembered, and a tenant provisioned later becomes reachable immediately.
//!
//! A slot removed from the cache while its handle is still opening is
//! retired. Whoever finishes the initialization closes the orphaned handle
//! and looks the tenant up again.
//!
//! Subdomain aliases get their own slot, but the slot points at the
//! canonical tenant's handle. Only canonical handles are ever closed.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use honeycertify_core::{Connector, Error, Result, TenantConfig, TenantId};

use crate::directory::TenantDirectory;

/// Default number of cached tenant handles
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default bound on directory lookup + connect
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lookups retried after losing a pending slot to eviction
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct HandleCacheConfig {
    /// Maximum number of cached keys (canonical ids and aliases)
    pub capacity: usize,
    /// Upper bound on resolving and opening a handle
    pub acquire_timeout: Duration,
}

impl Default for HandleCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl HandleCacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub connects: u64,
    pub evictions: u64,
    pub size: usize,
}

struct Entry<H> {
    canonical: TenantId,
    handle: Arc<H>,
}

impl<H> Clone for Entry<H> {
    fn clone(&self) -> Self {
        Self {
            canonical: self.canonical.clone(),
            handle: self.handle.clone(),
        }
    }
}

struct Slot<H> {
    cell: OnceCell<Entry<H>>,
    /// Set once the slot has left the cache
    retired: AtomicBool,
    /// Set by whichever side closes the slot's handle
    close_claimed: AtomicBool,
}

impl<H> Slot<H> {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            retired: AtomicBool::new(false),
            close_claimed: AtomicBool::new(false),
        }
    }

    fn get(&self) -> Option<&Entry<H>> {
        self.cell.get()
    }

    /// The entry, if `key` is the canonical owner of its handle
    fn owned_by(&self, key: &TenantId) -> Option<&Entry<H>> {
        self.cell.get().filter(|entry| entry.canonical == *key)
    }

    /// Mark the slot as removed from the cache
    ///
    /// Call with the slot map locked. Returns the entry to close when the
    /// handle is already open and owned by `key`. A handle still opening is
    /// closed later by the task that opens it.
    fn retire(&self, key: &TenantId) -> Option<Entry<H>> {
        self.retired.store(true, Ordering::Release);
        self.claim(key)
    }

    fn claim(&self, key: &TenantId) -> Option<Entry<H>> {
        self.owned_by(key)
            .filter(|_| !self.close_claimed.swap(true, Ordering::AcqRel))
            .cloned()
    }
}

type SharedSlot<H> = Arc<Slot<H>>;

/// Outcome of a finished initialization
enum Settled<H> {
    /// The slot is still cached and may be served
    Cached,
    /// The slot left the cache while opening; carries the handle to close
    Orphaned(Option<Entry<H>>),
}

pub struct HandleCache<C: Connector> {
    directory: Arc<TenantDirectory>,
    connector: Arc<C>,
    slots: Mutex<LruCache<TenantId, SharedSlot<C::Handle>>>,
    config: HandleCacheConfig,
    shut_down: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    connects: AtomicU64,
    evictions: AtomicU64,
}

impl<C: Connector> HandleCache<C> {
    pub fn new(
        directory: Arc<TenantDirectory>,
        connector: Arc<C>,
        config: HandleCacheConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            directory,
            connector,
            slots: Mutex::new(LruCache::new(capacity)),
            config,
            shut_down: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &Arc<TenantDirectory> {
        &self.directory
    }

    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }

    /// Get the handle for a tenant id or subdomain alias
    ///
    /// # Errors
    /// - `Error::TenantNotFound` if the directory has no servable tenant
    /// - `Error::Connection` if the connector fails, the cache is shut down,
    ///   or the tenant keeps getting evicted before its handle is ready
    /// - `Error::Timeout` if resolution and connect exceed `acquire_timeout`
    pub async fn get_handle(&self, id: &TenantId) -> Result<Arc<C::Handle>> {
        match tokio::time::timeout(self.config.acquire_timeout, self.acquire(id)).await {
            Ok(result) => result,
            Err(_) => {
                self.discard(id);
                warn!(
                    tenant_id = %id,
                    timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                    "Timed out acquiring tenant handle"
                );
                Err(Error::Timeout(format!(
                    "acquiring handle for tenant {} took longer than {:?}",
                    id, self.config.acquire_timeout
                )))
            }
        }
    }

    /// Remove a tenant from the cache, closing its handle
    ///
    /// Evicting a canonical id also drops every alias pointing at it.
    /// Evicting an alias leaves the canonical handle open. A handle still
    /// opening is closed as soon as it is ready. Returns whether anything
    /// was removed.
    pub async fn evict(&self, id: &TenantId) -> bool {
        let removed = {
            let mut slots = self.slots.lock();
            slots.pop(id).map(|slot| {
                if slot.owned_by(id).is_some() {
                    Self::detach_aliases(&mut slots, id);
                }
                slot.retire(id)
            })
        };

        match removed {
            Some(Some(entry)) => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.connector.close(&entry.handle).await;
                info!(tenant_id = %id, "Evicted tenant handle");
                true
            }
            Some(None) => {
                debug!(tenant_id = %id, "Evicted pending or alias slot");
                true
            }
            None => false,
        }
    }

    /// Close every handle and empty the cache
    ///
    /// Lookups fail from here on. Handles still opening are closed by the
    /// lookups that open them. Returns the number of handles closed.
    pub async fn shutdown(&self) -> usize {
        let open: Vec<Entry<C::Handle>> = {
            let mut slots = self.slots.lock();
            self.shut_down.store(true, Ordering::Release);
            std::iter::from_fn(|| slots.pop_lru())
                .filter_map(|(key, slot)| slot.retire(&key))
                .collect()
        };

        let mut closed = 0;
        for entry in open {
            self.connector.close(&entry.handle).await;
            closed += 1;
        }

        info!(closed, "Tenant handle cache shut down");
        closed
    }

    /// Number of cached keys, including aliases and pending lookups
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> HandleCacheStats {
        HandleCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    async fn acquire(&self, id: &TenantId) -> Result<Arc<C::Handle>> {
        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            self.ensure_running()?;
            let slot = self.slot_for(id);

            if let Some(entry) = slot.get() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.handle.clone());
            }
            if attempt == 0 {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }

            let opened = slot.cell.get_or_try_init(|| self.open(id)).await.cloned();
            let entry = match opened {
                Ok(entry) => entry,
                Err(e) => {
                    drop(slot);
                    self.discard(id);
                    return Err(e);
                }
            };

            match self.settle(id, &slot) {
                Settled::Cached => return Ok(entry.handle),
                Settled::Orphaned(orphan) => self.close_orphan(id, orphan).await,
            }
        }

        Err(Self::evicted_while_opening(id))
    }

    async fn open(&self, id: &TenantId) -> Result<Entry<C::Handle>> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            self.ensure_running()?;
            let config = self.directory.resolve_config(id).await?;
            if config.id == *id {
                return self.connect(&config).await;
            }

            // Alias: share the canonical slot so both keys hold the same handle
            let canonical = self.slot_for(&config.id);
            let opened = canonical
                .cell
                .get_or_try_init(|| self.connect(&config))
                .await
                .cloned();
            let entry = match opened {
                Ok(entry) => entry,
                Err(e) => {
                    drop(canonical);
                    self.discard(&config.id);
                    return Err(e);
                }
            };

            match self.settle(&config.id, &canonical) {
                Settled::Cached => {
                    debug!(alias = %id, tenant_id = %config.id, "Alias bound to tenant handle");
                    return Ok(entry);
                }
                Settled::Orphaned(orphan) => self.close_orphan(&config.id, orphan).await,
            }
        }

        Err(Self::evicted_while_opening(id))
    }

    async fn connect(&self, config: &TenantConfig) -> Result<Entry<C::Handle>> {
        let handle = self.connector.connect(config).await?;
        self.connects.fetch_add(1, Ordering::Relaxed);
        info!(
            tenant_id = %config.id,
            descriptor = %config.descriptor,
            "Opened tenant handle"
        );
        Ok(Entry {
            canonical: config.id.clone(),
            handle: Arc::new(handle),
        })
    }

    /// Check a freshly initialized slot against the cache
    ///
    /// An alias slot whose canonical handle has since left the cache is
    /// dropped and reported as orphaned, with nothing to close.
    fn settle(&self, key: &TenantId, slot: &SharedSlot<C::Handle>) -> Settled<C::Handle> {
        let mut slots = self.slots.lock();
        if slot.retired.load(Ordering::Acquire) {
            return Settled::Orphaned(slot.claim(key));
        }

        let stale_alias = slot.get().is_some_and(|entry| {
            entry.canonical != *key
                && !slots
                    .peek(&entry.canonical)
                    .and_then(|canonical| canonical.get())
                    .is_some_and(|canonical| Arc::ptr_eq(&canonical.handle, &entry.handle))
        });
        if !stale_alias {
            return Settled::Cached;
        }

        if slots.peek(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.pop(key);
        }
        slot.retire(key);
        Settled::Orphaned(None)
    }

    async fn close_orphan(&self, key: &TenantId, orphan: Option<Entry<C::Handle>>) {
        if let Some(entry) = orphan {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.connector.close(&entry.handle).await;
            info!(tenant_id = %key, "Closed tenant handle evicted while opening");
        }
        debug!(tenant_id = %key, "Slot evicted while opening, looking up again");
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Connection(
                "tenant handle cache is shut down".to_string(),
            ));
        }
        Ok(())
    }

    fn evicted_while_opening(id: &TenantId) -> Error {
        Error::Connection(format!(
            "handle for tenant {} was evicted {} times while opening",
            id, MAX_ACQUIRE_ATTEMPTS
        ))
    }

    fn slot_for(&self, id: &TenantId) -> SharedSlot<C::Handle> {
        let (slot, evicted) = {
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.get(id) {
                return slot.clone();
            }
            let slot: SharedSlot<C::Handle> = Arc::new(Slot::new());
            let evicted = slots.push(id.clone(), slot.clone()).and_then(|(key, old)| {
                if old.owned_by(&key).is_some() {
                    Self::detach_aliases(&mut slots, &key);
                }
                old.retire(&key)
            });
            (slot, evicted)
        };

        if let Some(entry) = evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(tenant_id = %entry.canonical, "Closing least recently used tenant handle");
            let connector = self.connector.clone();
            tokio::spawn(async move {
                connector.close(&entry.handle).await;
            });
        }

        slot
    }

    /// Drop an empty slot nobody is waiting on
    ///
    /// Callers release their own reference first. A slot another caller
    /// still holds stays; that caller retries the initialization itself.
    fn discard(&self, id: &TenantId) {
        let mut slots = self.slots.lock();
        if slots
            .peek(id)
            .is_some_and(|slot| slot.get().is_none() && Arc::strong_count(slot) == 1)
        {
            slots.pop(id);
        }
    }

    fn detach_aliases(slots: &mut LruCache<TenantId, SharedSlot<C::Handle>>, canonical: &TenantId) {
        let aliases: Vec<TenantId> = slots
            .iter()
            .filter(|(key, slot)| {
                *key != canonical && slot.get().is_some_and(|entry| entry.canonical == *canonical)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for alias in aliases {
            if let Some(slot) = slots.pop(&alias) {
                slot.retire(&alias);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_registry::InMemoryTenantRegistry;
    use crate::testing::{CountingRegistry, MockConnector, ready_config};
    use honeycertify_core::TenantRegistry;

    struct Fixture {
        registry: Arc<CountingRegistry>,
        connector: Arc<MockConnector>,
        cache: Arc<HandleCache<MockConnector>>,
    }

    fn fixture(connector: MockConnector, config: HandleCacheConfig) -> Fixture {
        let inner = Arc::new(InMemoryTenantRegistry::with_tenants([
            ready_config("a1b2c3", "acme"),
            ready_config("d4e5f6", "globex"),
            ready_config("0a0b0c", "initech"),
        ]));
        let registry = Arc::new(CountingRegistry::new(inner));
        let directory = Arc::new(TenantDirectory::new(registry.clone()));
        let connector = Arc::new(connector);
        let cache = Arc::new(HandleCache::new(directory, connector.clone(), config));
        Fixture {
            registry,
            connector,
            cache,
        }
    }

    fn id(s: &str) -> TenantId {
        TenantId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_same_handle_on_repeat() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());

        let first = f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        let lookups = f.registry.lookups();
        let second = f.cache.get_handle(&id("a1b2c3")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.registry.lookups(), lookups);
        assert_eq!(f.connector.connect_count(), 1);

        let stats = f.cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.connects, 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_fails_every_time() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());

        for _ in 0..2 {
            let err = f.cache.get_handle(&id("ghost")).await.unwrap_err();
            assert!(matches!(err, Error::TenantNotFound(_)));
        }
        assert!(f.cache.is_empty());
        assert_eq!(f.connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_tenant_registered_after_miss_becomes_reachable() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());
        assert!(f.cache.get_handle(&id("late01")).await.is_err());

        f.registry
            .upsert(&ready_config("late01", "latecomer"))
            .await
            .unwrap();
        let handle = f.cache.get_handle(&id("late01")).await.unwrap();
        assert_eq!(handle.tenant_id, id("late01"));
    }

    #[tokio::test]
    async fn test_concurrent_first_lookups_connect_once() {
        let f = fixture(
            MockConnector::with_delay(Duration::from_millis(50)),
            HandleCacheConfig::default(),
        );

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = f.cache.clone();
                tokio::spawn(async move { cache.get_handle(&id("a1b2c3")).await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(f.connector.connect_count(), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[tokio::test]
    async fn test_alias_shares_canonical_handle() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());

        let by_alias = f.cache.get_handle(&id("acme")).await.unwrap();
        let by_id = f.cache.get_handle(&id("a1b2c3")).await.unwrap();

        assert!(Arc::ptr_eq(&by_alias, &by_id));
        assert_eq!(f.connector.connect_count(), 1);
        assert_eq!(f.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_cached() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());
        f.connector.set_failing(true);

        let err = f.cache.get_handle(&id("a1b2c3")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.cache.is_empty());

        f.connector.set_failing(false);
        assert!(f.cache.get_handle(&id("a1b2c3")).await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let f = fixture(
            MockConnector::with_delay(Duration::from_millis(200)),
            HandleCacheConfig::default().with_acquire_timeout(Duration::from_millis(20)),
        );

        let err = f.cache.get_handle(&id("a1b2c3")).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_retryable());
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_lru_eviction_closes_handle() {
        let f = fixture(
            MockConnector::new(),
            HandleCacheConfig::default().with_capacity(2),
        );

        f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        f.cache.get_handle(&id("d4e5f6")).await.unwrap();
        // Touch a1b2c3 so d4e5f6 is least recently used
        f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        f.cache.get_handle(&id("0a0b0c")).await.unwrap();

        // Close runs on a spawned task
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.connector.closed(), vec![id("d4e5f6")]);
        assert_eq!(f.cache.len(), 2);
        assert_eq!(f.cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_evict_and_reconnect() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());

        let first = f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        f.cache.get_handle(&id("acme")).await.unwrap();

        assert!(f.cache.evict(&id("a1b2c3")).await);
        assert!(f.cache.is_empty());
        assert_eq!(f.connector.closed(), vec![id("a1b2c3")]);

        let second = f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.serial, 2);

        assert!(!f.cache.evict(&id("ghost")).await);
    }

    #[tokio::test]
    async fn test_evicting_alias_keeps_handle_open() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());
        f.cache.get_handle(&id("acme")).await.unwrap();

        assert!(f.cache.evict(&id("acme")).await);
        assert!(f.connector.closed().is_empty());
        assert_eq!(f.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all() {
        let f = fixture(MockConnector::new(), HandleCacheConfig::default());
        f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        f.cache.get_handle(&id("globex")).await.unwrap();

        // Two canonical handles; the alias shares one of them
        assert_eq!(f.cache.shutdown().await, 2);
        assert!(f.cache.is_empty());
        assert_eq!(f.connector.closed().len(), 2);
    }

    fn spawn_lookup(
        f: &Fixture,
        key: &str,
    ) -> tokio::task::JoinHandle<Result<Arc<crate::testing::MockHandle>>> {
        let cache = f.cache.clone();
        let key = id(key);
        tokio::spawn(async move { cache.get_handle(&key).await })
    }

    #[tokio::test]
    async fn test_evict_while_opening_closes_orphaned_handle() {
        let f = fixture(
            MockConnector::with_delay(Duration::from_millis(100)),
            HandleCacheConfig::default(),
        );

        let pending = spawn_lookup(&f, "a1b2c3");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.cache.evict(&id("a1b2c3")).await);

        // The lookup reopens rather than serving the evicted handle
        let first = pending.await.unwrap().unwrap();
        assert_eq!(first.serial, 2);
        assert_eq!(f.connector.closed(), vec![id("a1b2c3")]);

        let second = f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.connector.connect_count(), 2);

        assert_eq!(f.cache.shutdown().await, 1);
        assert_eq!(f.connector.closed().len(), f.connector.connect_count());
    }

    #[tokio::test]
    async fn test_deactivated_while_opening_is_not_served() {
        let f = fixture(
            MockConnector::with_delay(Duration::from_millis(100)),
            HandleCacheConfig::default(),
        );

        let pending = spawn_lookup(&f, "a1b2c3");
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.cache
            .directory()
            .set_active(&id("a1b2c3"), false)
            .await
            .unwrap();
        f.cache.evict(&id("a1b2c3")).await;

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::TenantNotFound(_)));
        assert_eq!(f.connector.connect_count(), 1);
        assert_eq!(f.connector.closed(), vec![id("a1b2c3")]);
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_lru_push_while_opening_closes_orphaned_handle() {
        let f = fixture(
            MockConnector::with_delay(Duration::from_millis(100)),
            HandleCacheConfig::default().with_capacity(1),
        );

        let pending = spawn_lookup(&f, "a1b2c3");
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Takes the only slot, then fails without connecting
        assert!(f.cache.get_handle(&id("ghost")).await.is_err());

        let handle = pending.await.unwrap().unwrap();
        assert_eq!(handle.serial, 2);
        assert_eq!(f.connector.closed(), vec![id("a1b2c3")]);
        assert_eq!(f.cache.stats().evictions, 1);

        assert_eq!(f.cache.shutdown().await, 1);
        assert_eq!(f.connector.closed().len(), f.connector.connect_count());
    }

    #[tokio::test]
    async fn test_shutdown_while_opening_closes_orphaned_handle() {
        let f = fixture(
            MockConnector::with_delay(Duration::from_millis(100)),
            HandleCacheConfig::default(),
        );

        let pending = spawn_lookup(&f, "a1b2c3");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.cache.shutdown().await, 0);

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(f.connector.connect_count(), 1);
        assert_eq!(f.connector.closed(), vec![id("a1b2c3")]);

        assert!(f.cache.get_handle(&id("d4e5f6")).await.is_err());
        assert_eq!(f.connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_alias_while_canonical_evicted_reopens() {
        let f = fixture(
            MockConnector::with_delay(Duration::from_millis(100)),
            HandleCacheConfig::default(),
        );

        let pending = spawn_lookup(&f, "acme");
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.cache.evict(&id("a1b2c3")).await;

        let by_alias = pending.await.unwrap().unwrap();
        let by_id = f.cache.get_handle(&id("a1b2c3")).await.unwrap();
        assert!(Arc::ptr_eq(&by_alias, &by_id));
        assert_eq!(by_alias.serial, 2);
        assert_eq!(f.connector.closed(), vec![id("a1b2c3")]);
    }
}
