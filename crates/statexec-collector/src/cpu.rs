// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-CPU time counters from `/proc/stat`.
//!
//! Each `cpuN` line lists cumulative time spent in every mode, in clock ticks:
//!
//! ```text
//! cpu  2337 0 188 17838 0 0 0 0 0 0
//! cpu0 1188 0 94 9188 0 0 0 0 0 0
//! cpu1 1149 0 94 8649 0 0 0 0 0 0
//! ```
//!
//! The aggregate `cpu` line is skipped; only per-core lines are reported. Older
//! kernels expose fewer columns, in which case only the present modes are kept.

use std::fs;
use std::io;
use std::path::Path;

/// CPU accounting modes, in `/proc/stat` column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CpuMode {
    User,
    Nice,
    System,
    Idle,
    Iowait,
    Irq,
    Softirq,
    Steal,
    Guest,
    GuestNice,
}

impl CpuMode {
    pub const ALL: [CpuMode; 10] = [
        CpuMode::User,
        CpuMode::Nice,
        CpuMode::System,
        CpuMode::Idle,
        CpuMode::Iowait,
        CpuMode::Irq,
        CpuMode::Softirq,
        CpuMode::Steal,
        CpuMode::Guest,
        CpuMode::GuestNice,
    ];

    /// Label value used for the `mode` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            CpuMode::User => "user",
            CpuMode::Nice => "nice",
            CpuMode::System => "system",
            CpuMode::Idle => "idle",
            CpuMode::Iowait => "iowait",
            CpuMode::Irq => "irq",
            CpuMode::Softirq => "softirq",
            CpuMode::Steal => "steal",
            CpuMode::Guest => "guest",
            CpuMode::GuestNice => "guest_nice",
        }
    }
}

/// Cumulative seconds spent per mode by one logical CPU.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuTimes {
    /// CPU identifier without the `cpu` prefix, e.g. `"0"`.
    pub cpu: String,
    pub seconds_per_mode: Vec<(CpuMode, f64)>,
}

pub fn read_cpu_times_from_path(path: &Path, clk_tck: u64) -> Result<Vec<CpuTimes>, io::Error> {
    let contents = fs::read_to_string(path)?;
    parse_cpu_times(&contents, clk_tck)
}

fn parse_cpu_times(contents: &str, clk_tck: u64) -> Result<Vec<CpuTimes>, io::Error> {
    let clk_tck = clk_tck.max(1) as f64;
    let mut cpus = Vec::new();

    for line in contents.lines() {
        let mut values = line.split_whitespace();
        let Some(label) = values.next() else {
            continue;
        };
        let Some(id) = label.strip_prefix("cpu") else {
            continue;
        };
        // aggregate line
        if id.is_empty() {
            continue;
        }

        let mut seconds_per_mode = Vec::with_capacity(CpuMode::ALL.len());
        for (mode, raw) in CpuMode::ALL.iter().zip(values) {
            let ticks: f64 = raw.parse().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to parse {} time for {label}: {e}", mode.as_str()),
                )
            })?;
            seconds_per_mode.push((*mode, ticks / clk_tck));
        }

        cpus.push(CpuTimes {
            cpu: id.to_string(),
            seconds_per_mode,
        });
    }

    if cpus.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "Per-core CPU data not found",
        ));
    }
    Ok(cpus)
}
