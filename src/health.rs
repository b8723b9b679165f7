//! Pipeline health reporting.
//!
//! Combines the cache, worker pool and admission state into one report.
//! A pipeline can be degraded yet still serving: with L2 down it answers
//! from L1, and with no live workers it returns unenhanced results.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cache::CacheHealth;
use crate::scheduler::PoolHealth;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Per-component breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub cache: CacheHealth,
    pub pool: PoolHealth,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    /// Requests can still be answered, possibly in a reduced mode.
    pub serving: bool,
    pub accepting_requests: bool,
    pub components: ComponentHealth,
    pub queued_requests: usize,
    pub active_requests: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Admission backlog at or above which the pipeline reports degraded.
    pub max_queue_depth: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { max_queue_depth: 1000 }
    }
}

/// Admission counters fed into the report.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionLoad {
    pub queued: usize,
    pub active: usize,
}

/// Aggregates health information from pipeline components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Liveness: the process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    pub fn report(
        &self,
        shutdown_state: ShutdownState,
        cache: CacheHealth,
        pool: PoolHealth,
        load: AdmissionLoad,
    ) -> HealthReport {
        let accepting = shutdown_state == ShutdownState::Running;
        let state = self.compute_state(shutdown_state, &cache, &pool, load);
        let serving = accepting && cache.can_serve();

        HealthReport {
            state,
            serving,
            accepting_requests: accepting,
            components: ComponentHealth { cache, pool },
            queued_requests: load.queued,
            active_requests: load.active,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(
        &self,
        shutdown_state: ShutdownState,
        cache: &CacheHealth,
        pool: &PoolHealth,
        load: AdmissionLoad,
    ) -> HealthState {
        if shutdown_state != ShutdownState::Running || !cache.can_serve() {
            return HealthState::Unhealthy;
        }
        if !cache.healthy || !pool.healthy {
            return HealthState::Degraded;
        }
        if load.queued >= self.config.max_queue_depth {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::L2Status;

    fn cache(healthy: bool, l2: L2Status) -> CacheHealth {
        CacheHealth {
            healthy,
            l1_entries: 0,
            l1_capacity: 100,
            l1_below_capacity: true,
            l2,
        }
    }

    fn pool(healthy: bool) -> PoolHealth {
        PoolHealth {
            healthy,
            accepting: healthy,
            total_workers: 2,
            alive_workers: if healthy { 2 } else { 0 },
            queued: 0,
            active: 0,
        }
    }

    #[test]
    fn all_components_healthy() {
        let report = HealthChecker::default().report(
            ShutdownState::Running,
            cache(true, L2Status::Reachable),
            pool(true),
            AdmissionLoad::default(),
        );
        assert_eq!(report.state, HealthState::Healthy);
        assert!(report.serving);
    }

    #[test]
    fn remote_outage_degrades_but_keeps_serving() {
        let report = HealthChecker::default().report(
            ShutdownState::Running,
            cache(false, L2Status::Unreachable),
            pool(true),
            AdmissionLoad::default(),
        );
        assert_eq!(report.state, HealthState::Degraded);
        assert!(report.serving);
    }

    #[test]
    fn dead_pool_degrades() {
        let report = HealthChecker::default().report(
            ShutdownState::Running,
            cache(true, L2Status::Disabled),
            pool(false),
            AdmissionLoad::default(),
        );
        assert_eq!(report.state, HealthState::Degraded);
    }

    #[test]
    fn backlog_degrades() {
        let checker = HealthChecker::new(HealthConfig { max_queue_depth: 5 });
        let report = checker.report(
            ShutdownState::Running,
            cache(true, L2Status::Reachable),
            pool(true),
            AdmissionLoad { queued: 5, active: 3 },
        );
        assert_eq!(report.state, HealthState::Degraded);
        assert_eq!(report.active_requests, 3);
    }

    #[test]
    fn draining_is_unhealthy_and_not_serving() {
        let report = HealthChecker::default().report(
            ShutdownState::Draining,
            cache(true, L2Status::Reachable),
            pool(true),
            AdmissionLoad::default(),
        );
        assert_eq!(report.state, HealthState::Unhealthy);
        assert!(!report.serving);
        assert!(!report.accepting_requests);
    }
}
