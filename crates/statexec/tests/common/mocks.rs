// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of statexec components for testing

use statexec_collector::{
    CpuMode, CpuTimes, DiskCounters, MemoryStats, MetricsCollector, NetworkCounters,
};

/// Collector returning the same small snapshot on every call
pub struct StaticCollector;

impl MetricsCollector for StaticCollector {
    fn collect_cpu(&self) -> Vec<CpuTimes> {
        vec![CpuTimes {
            cpu: "0".to_string(),
            seconds_per_mode: vec![(CpuMode::User, 1.0), (CpuMode::System, 0.5)],
        }]
    }

    fn collect_memory(&self) -> MemoryStats {
        MemoryStats {
            total: 4096,
            available: 2048,
            used: 1024,
            free: 2048,
            buffers: 512,
            cached: 512,
            used_percent: 25.0,
        }
    }

    fn collect_network(&self) -> Vec<NetworkCounters> {
        vec![NetworkCounters {
            interface: "lo".to_string(),
            sent_bytes: 10,
            recv_bytes: 10,
        }]
    }

    fn collect_disk(&self) -> Vec<DiskCounters> {
        Vec::new()
    }
}
