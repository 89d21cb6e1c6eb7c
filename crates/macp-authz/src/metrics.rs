//! ---
//! macp_section: "03-security-access-control"
//! macp_subsection: "module"
//! macp_type: "source"
//! macp_scope: "code"
//! macp_description: "Role-based authorization core for management operations."
//! macp_version: "v0.0.0-prealpha"
//! macp_owner: "tbd"
//! ---
use prometheus::{IntCounter, Registry};
use std::sync::Arc;

/// Authorization metrics exported via Prometheus.
#[derive(Clone)]
pub struct AccessMetrics {
    registry: Arc<Registry>,
    role_resolutions_total: IntCounter,
    access_denials_total: IntCounter,
    run_as_grants_total: IntCounter,
    run_as_denials_total: IntCounter,
    snapshot_rebuilds_total: IntCounter,
    role_set_cache_hits_total: IntCounter,
    role_set_cache_misses_total: IntCounter,
}

impl AccessMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> anyhow::Result<Self> {
        let role_resolutions_total = IntCounter::new(
            "authz_role_resolutions_total",
            "Total role-set resolutions performed",
        )?;
        let access_denials_total = IntCounter::new(
            "authz_access_denials_total",
            "Authorization checks that ended in denial",
        )?;
        let run_as_grants_total = IntCounter::new(
            "authz_run_as_grants_total",
            "Run-as requests granted to superuser callers",
        )?;
        let run_as_denials_total = IntCounter::new(
            "authz_run_as_denials_total",
            "Run-as requests ignored as no-ops",
        )?;
        let snapshot_rebuilds_total = IntCounter::new(
            "authz_snapshot_rebuilds_total",
            "Permission snapshot rebuilds after configuration changes",
        )?;
        let role_set_cache_hits_total = IntCounter::new(
            "authz_role_set_cache_hits_total",
            "Role-set permission cache hits",
        )?;
        let role_set_cache_misses_total = IntCounter::new(
            "authz_role_set_cache_misses_total",
            "Role-set permission cache misses",
        )?;

        registry.register(Box::new(role_resolutions_total.clone()))?;
        registry.register(Box::new(access_denials_total.clone()))?;
        registry.register(Box::new(run_as_grants_total.clone()))?;
        registry.register(Box::new(run_as_denials_total.clone()))?;
        registry.register(Box::new(snapshot_rebuilds_total.clone()))?;
        registry.register(Box::new(role_set_cache_hits_total.clone()))?;
        registry.register(Box::new(role_set_cache_misses_total.clone()))?;

        Ok(Self {
            registry,
            role_resolutions_total,
            access_denials_total,
            run_as_grants_total,
            run_as_denials_total,
            snapshot_rebuilds_total,
            role_set_cache_hits_total,
            role_set_cache_misses_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Count one role-set resolution.
    pub fn inc_role_resolution(&self) {
        self.role_resolutions_total.inc();
    }

    /// Count one authorization denial.
    pub fn inc_access_denial(&self) {
        self.access_denials_total.inc();
    }

    /// Count one granted run-as request.
    pub fn inc_run_as_grant(&self) {
        self.run_as_grants_total.inc();
    }

    /// Count one ignored run-as request.
    pub fn inc_run_as_denial(&self) {
        self.run_as_denials_total.inc();
    }

    /// Count one permission snapshot rebuild.
    pub fn inc_snapshot_rebuild(&self) {
        self.snapshot_rebuilds_total.inc();
    }

    /// Count one role-set cache hit.
    pub fn inc_cache_hit(&self) {
        self.role_set_cache_hits_total.inc();
    }

    /// Count one role-set cache miss.
    pub fn inc_cache_miss(&self) {
        self.role_set_cache_misses_total.inc();
    }
}
