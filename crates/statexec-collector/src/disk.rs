// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-device I/O counters from `/proc/diskstats`.
//!
//! Columns: major, minor, device, reads completed, reads merged, sectors read,
//! time reading, writes completed, writes merged, sectors written, ...
//! Sectors are always 512 bytes regardless of the device's physical sector size.

use std::fs;
use std::io;
use std::path::Path;

const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCounters {
    pub device: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

pub fn read_disk_from_path(path: &Path) -> Result<Vec<DiskCounters>, io::Error> {
    let contents = fs::read_to_string(path)?;
    parse_diskstats(&contents)
}

fn parse_diskstats(contents: &str) -> Result<Vec<DiskCounters>, io::Error> {
    let mut counters = Vec::new();

    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 10 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Malformed diskstats line: {line}"),
            ));
        }

        let parse = |index: usize| -> Result<u64, io::Error> {
            fields[index].parse().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to parse diskstats column {index} for {}: {e}", fields[2]),
                )
            })
        };

        counters.push(DiskCounters {
            device: fields[2].to_string(),
            read_bytes: parse(5)?.saturating_mul(SECTOR_SIZE),
            write_bytes: parse(9)?.saturating_mul(SECTOR_SIZE),
        });
    }

    Ok(counters)
}
