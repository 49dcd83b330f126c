//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for tenant routing:
//! - Tenant resolutions by source (subdomain, path, session claim, query, none)
//! - Handle acquisition outcomes and latency
//! - Handle cache counters (hits, misses, connects, evictions, size)
//! - Provisioning outcomes by step

use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for HoneyCertify
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    // Resolution
    /// Requests by the source that produced their tenant
    pub tenant_resolutions_total: CounterVec,

    // Handle acquisition
    /// Handle acquisitions by outcome (`ok` or an error kind)
    pub handle_acquisitions_total: CounterVec,
    /// Time spent in `get_handle`
    pub handle_acquire_duration_seconds: Histogram,

    // Handle cache, mirrored from the cache's own counters
    pub handle_cache_hits: Gauge,
    pub handle_cache_misses: Gauge,
    pub handle_cache_connects: Gauge,
    pub handle_cache_evictions: Gauge,
    pub handle_cache_size: Gauge,

    // Provisioning
    /// Provisioning runs by final step and outcome
    pub provisioning_total: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tenant_resolutions_total = CounterVec::new(
            Opts::new(
                "honeycertify_tenant_resolutions_total",
                "Requests by tenant resolution source",
            ),
            &["source"],
        )?;

        let handle_acquisitions_total = CounterVec::new(
            Opts::new(
                "honeycertify_handle_acquisitions_total",
                "Tenant handle acquisitions by outcome",
            ),
            &["outcome"],
        )?;

        let handle_acquire_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "honeycertify_handle_acquire_duration_seconds",
                "Time to acquire a tenant handle in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;

        let handle_cache_hits = Gauge::new(
            "honeycertify_handle_cache_hits",
            "Handle cache lookups served from an open handle",
        )?;
        let handle_cache_misses = Gauge::new(
            "honeycertify_handle_cache_misses",
            "Handle cache lookups that had to resolve or wait",
        )?;
        let handle_cache_connects = Gauge::new(
            "honeycertify_handle_cache_connects",
            "Tenant handles opened",
        )?;
        let handle_cache_evictions = Gauge::new(
            "honeycertify_handle_cache_evictions",
            "Tenant handles evicted",
        )?;
        let handle_cache_size = Gauge::new(
            "honeycertify_handle_cache_size",
            "Keys currently held by the handle cache",
        )?;

        let provisioning_total = CounterVec::new(
            Opts::new(
                "honeycertify_provisioning_total",
                "Provisioning runs by step and outcome",
            ),
            &["step", "outcome"],
        )?;

        registry.register(Box::new(tenant_resolutions_total.clone()))?;
        registry.register(Box::new(handle_acquisitions_total.clone()))?;
        registry.register(Box::new(handle_acquire_duration_seconds.clone()))?;
        registry.register(Box::new(handle_cache_hits.clone()))?;
        registry.register(Box::new(handle_cache_misses.clone()))?;
        registry.register(Box::new(handle_cache_connects.clone()))?;
        registry.register(Box::new(handle_cache_evictions.clone()))?;
        registry.register(Box::new(handle_cache_size.clone()))?;
        registry.register(Box::new(provisioning_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            tenant_resolutions_total,
            handle_acquisitions_total,
            handle_acquire_duration_seconds,
            handle_cache_hits,
            handle_cache_misses,
            handle_cache_connects,
            handle_cache_evictions,
            handle_cache_size,
            provisioning_total,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record how a request's tenant was resolved (`none` if it was not)
    pub fn record_resolution(&self, source: Option<&str>) {
        self.tenant_resolutions_total
            .with_label_values(&[source.unwrap_or("none")])
            .inc();
    }

    /// Record a handle acquisition
    pub fn record_handle_acquisition(&self, outcome: &str, duration_secs: f64) {
        self.handle_acquisitions_total
            .with_label_values(&[outcome])
            .inc();
        self.handle_acquire_duration_seconds.observe(duration_secs);
    }

    /// Mirror the handle cache's counters
    pub fn update_handle_cache(
        &self,
        hits: u64,
        misses: u64,
        connects: u64,
        evictions: u64,
        size: usize,
    ) {
        self.handle_cache_hits.set(hits as f64);
        self.handle_cache_misses.set(misses as f64);
        self.handle_cache_connects.set(connects as f64);
        self.handle_cache_evictions.set(evictions as f64);
        self.handle_cache_size.set(size as f64);
    }

    /// Record a successfully completed provisioning run
    pub fn record_provisioning_success(&self) {
        self.provisioning_total
            .with_label_values(&["ready", "success"])
            .inc();
    }

    /// Record a provisioning run that failed at `step`
    pub fn record_provisioning_failure(&self, step: &str) {
        self.provisioning_total
            .with_label_values(&[step, "failure"])
            .inc();
    }
}
