// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Virtual memory gauges from `/proc/meminfo`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Memory usage in bytes, plus the used share of total memory in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryStats {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub buffers: u64,
    /// Page cache including reclaimable slab.
    pub cached: u64,
    pub used_percent: f64,
}

pub fn read_memory_from_path(path: &Path) -> Result<MemoryStats, io::Error> {
    let contents = fs::read_to_string(path)?;
    parse_meminfo(&contents)
}

fn parse_meminfo(contents: &str) -> Result<MemoryStats, io::Error> {
    let mut fields: HashMap<&str, u64> = HashMap::new();
    for line in contents.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let Some(raw) = parts.next() else {
            continue;
        };
        let value: u64 = raw.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to parse {key} from meminfo: {e}"),
            )
        })?;
        // values are reported in kB unless no unit is given
        let value = match parts.next() {
            Some("kB") => value.saturating_mul(1024),
            _ => value,
        };
        fields.insert(key.trim(), value);
    }

    let field = |name: &str| fields.get(name).copied().unwrap_or(0);

    let total = field("MemTotal");
    if total == 0 {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "MemTotal not found in meminfo",
        ));
    }
    let free = field("MemFree");
    let buffers = field("Buffers");
    let cached = field("Cached").saturating_add(field("SReclaimable"));
    let available = fields.get("MemAvailable").copied().unwrap_or(free.saturating_add(cached));
    let used = total.saturating_sub(free.saturating_add(buffers).saturating_add(cached));

    Ok(MemoryStats {
        total,
        available,
        used,
        free,
        buffers,
        cached,
        used_percent: used as f64 / total as f64 * 100.0,
    })
}
