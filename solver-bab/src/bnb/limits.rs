//! Resource accounting and ceilings.

use std::time::{Duration, Instant};

use crate::model::{BabStatus, SearchStats};
use crate::settings::BabSettings;

/// Time spent by the search.
///
/// CPU time is accounted, not measured: the sum of node processing time over
/// every process plus the time the coordinator spends on tree operations.
#[derive(Debug, Clone)]
pub struct ResourceUsage {
    started: Instant,
    processing: Duration,
    manager: Duration,
}

impl Default for ResourceUsage {
    fn default() -> Self {
        Self::start()
    }
}

impl ResourceUsage {
    /// Start the clock.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            processing: Duration::ZERO,
            manager: Duration::ZERO,
        }
    }

    /// Wall-clock time since start.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Account node processing time.
    pub fn add_processing_time(&mut self, busy: Duration) {
        self.processing += busy;
    }

    /// Account coordinator time.
    pub fn add_manager_time(&mut self, busy: Duration) {
        self.manager += busy;
    }

    /// Accounted CPU time.
    pub fn cpu_time(&self) -> Duration {
        self.processing + self.manager
    }
}

/// Check the resource ceilings in order: nodes, wall clock, CPU time, memory.
pub fn resource_limit(
    settings: &BabSettings,
    stats: &SearchStats,
    usage: &ResourceUsage,
    tree_memory_bytes: usize,
) -> Option<BabStatus> {
    if stats.nodes_processed >= settings.max_nodes {
        return Some(BabStatus::NodeLimit);
    }

    if let Some(limit) = settings.time_limit_ms {
        if usage.elapsed() >= Duration::from_millis(limit) {
            return Some(BabStatus::WallTimeLimit);
        }
    }

    if let Some(limit) = settings.cpu_time_limit_ms {
        if usage.cpu_time() >= Duration::from_millis(limit) {
            return Some(BabStatus::CpuTimeLimit);
        }
    }

    if let Some(limit) = settings.max_tree_memory_bytes {
        if tree_memory_bytes >= limit {
            return Some(BabStatus::MemoryLimit);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_limit_hit() {
        let settings = BabSettings::default();
        let stats = SearchStats::default();
        assert_eq!(resource_limit(&settings, &stats, &ResourceUsage::start(), 0), None);
    }

    #[test]
    fn test_limit_order() {
        let mut settings = BabSettings::default();
        settings.max_nodes = 10;
        settings.time_limit_ms = Some(0);
        settings.max_tree_memory_bytes = Some(100);

        let mut stats = SearchStats::default();
        stats.nodes_processed = 10;
        let usage = ResourceUsage::start();

        assert_eq!(resource_limit(&settings, &stats, &usage, 500), Some(BabStatus::NodeLimit));

        stats.nodes_processed = 3;
        assert_eq!(resource_limit(&settings, &stats, &usage, 500), Some(BabStatus::WallTimeLimit));

        settings.time_limit_ms = None;
        assert_eq!(resource_limit(&settings, &stats, &usage, 500), Some(BabStatus::MemoryLimit));
        assert_eq!(resource_limit(&settings, &stats, &usage, 50), None);
    }

    #[test]
    fn test_cpu_time_is_accounted() {
        let mut settings = BabSettings::default();
        settings.cpu_time_limit_ms = Some(1_000);

        let mut usage = ResourceUsage::start();
        usage.add_processing_time(Duration::from_millis(700));
        assert_eq!(resource_limit(&settings, &SearchStats::default(), &usage, 0), None);

        usage.add_manager_time(Duration::from_millis(300));
        assert_eq!(usage.cpu_time(), Duration::from_millis(1_000));
        assert_eq!(
            resource_limit(&settings, &SearchStats::default(), &usage, 0),
            Some(BabStatus::CpuTimeLimit)
        );
    }
}
