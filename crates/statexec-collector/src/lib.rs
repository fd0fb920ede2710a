// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Point-in-time host metrics read from the `/proc` filesystem.
//!
//! The [`MetricsCollector`] trait is the only surface the sampler depends on. Every
//! read is best effort: a missing or malformed `/proc` file yields empty or zeroed
//! data and a `debug!` log, never an error. On platforms without `/proc` the
//! collector therefore reports nothing rather than failing.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod clock;
pub mod cpu;
pub mod disk;
pub mod memory;
pub mod network;

use std::path::{Path, PathBuf};
use tracing::debug;

pub use cpu::{CpuMode, CpuTimes};
pub use disk::DiskCounters;
pub use memory::MemoryStats;
pub use network::NetworkCounters;

const PROC_PATH: &str = "/proc";

/// Clock ticks per second assumed when `sysconf(CLK_TCK)` is unavailable.
const DEFAULT_CLK_TCK: u64 = 100;

/// Source of host counters, sampled once per tick.
///
/// Implementations must not fail: unsupported or unreadable sources are reported
/// as empty lists or zero values.
pub trait MetricsCollector: Send + Sync {
    fn collect_cpu(&self) -> Vec<CpuTimes>;
    fn collect_memory(&self) -> MemoryStats;
    fn collect_network(&self) -> Vec<NetworkCounters>;
    fn collect_disk(&self) -> Vec<DiskCounters>;
}

/// [`MetricsCollector`] backed by the files under a `/proc` root.
#[derive(Debug, Clone)]
pub struct ProcCollector {
    root: PathBuf,
    clk_tck: u64,
}

impl Default for ProcCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcCollector {
    pub fn new() -> Self {
        Self::with_root(PROC_PATH)
    }

    /// Reads from `root` instead of `/proc`. Used to replay captured fixtures.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let clk_tck = clock::get_clk_tck().unwrap_or_else(|e| {
            debug!("{e}, assuming {DEFAULT_CLK_TCK} ticks per second");
            DEFAULT_CLK_TCK
        });
        Self {
            root: root.as_ref().to_path_buf(),
            clk_tck,
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

impl MetricsCollector for ProcCollector {
    fn collect_cpu(&self) -> Vec<CpuTimes> {
        let path = self.path("stat");
        cpu::read_cpu_times_from_path(&path, self.clk_tck).unwrap_or_else(|e| {
            debug!("Could not read CPU times from {}: {e}", path.display());
            Vec::new()
        })
    }

    fn collect_memory(&self) -> MemoryStats {
        let path = self.path("meminfo");
        memory::read_memory_from_path(&path).unwrap_or_else(|e| {
            debug!("Could not read memory stats from {}: {e}", path.display());
            MemoryStats::default()
        })
    }

    fn collect_network(&self) -> Vec<NetworkCounters> {
        let path = self.path("net/dev");
        network::read_network_from_path(&path).unwrap_or_else(|e| {
            debug!("Could not read network counters from {}: {e}", path.display());
            Vec::new()
        })
    }

    fn collect_disk(&self) -> Vec<DiskCounters> {
        let path = self.path("diskstats");
        disk::read_disk_from_path(&path).unwrap_or_else(|e| {
            debug!("Could not read disk counters from {}: {e}", path.display());
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_root_yields_empty_data() {
        let dir = tempfile::tempdir().unwrap();
        let collector = ProcCollector::with_root(dir.path().join("does-not-exist"));

        assert!(collector.collect_cpu().is_empty());
        assert!(collector.collect_network().is_empty());
        assert!(collector.collect_disk().is_empty());
        assert_eq!(collector.collect_memory(), MemoryStats::default());
    }
}
