// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-interface traffic counters from `/proc/net/dev`.
//!
//! ```text
//! Inter-|   Receive                                                |  Transmit
//!  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets ...
//!   eth0: 9876543   10001    0    0    0     0          0         0   123456    2002 ...
//! ```
//!
//! The first column after the interface name is received bytes, the ninth is
//! transmitted bytes.

use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCounters {
    pub interface: String,
    pub sent_bytes: u64,
    pub recv_bytes: u64,
}

pub fn read_network_from_path(path: &Path) -> Result<Vec<NetworkCounters>, io::Error> {
    let contents = fs::read_to_string(path)?;
    parse_net_dev(&contents)
}

fn parse_net_dev(contents: &str) -> Result<Vec<NetworkCounters>, io::Error> {
    let mut counters = Vec::new();

    // two header lines
    for line in contents.lines().skip(2) {
        let Some((interface, stats)) = line.split_once(':') else {
            continue;
        };
        let mut values = stats.split_whitespace();

        let recv_bytes: Option<u64> = values.next().and_then(|s| s.parse().ok());
        // skip packets, errs, drop, fifo, frame, compressed, multicast
        let sent_bytes: Option<u64> = values.nth(7).and_then(|s| s.parse().ok());

        match (recv_bytes, sent_bytes) {
            (Some(recv_bytes), Some(sent_bytes)) => counters.push(NetworkCounters {
                interface: interface.trim().to_string(),
                sent_bytes,
                recv_bytes,
            }),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Malformed counters for interface {}", interface.trim()),
                ));
            }
        }
    }

    Ok(counters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path_from_root(file: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(file)
    }

    #[test]
    fn test_read_network() {
        let counters = read_network_from_path(&path_from_root("tests/proc/net/valid_dev"))
            .expect("valid net/dev");
        assert_eq!(
            counters,
            vec![
                NetworkCounters {
                    interface: "lo".to_string(),
                    sent_bytes: 1200,
                    recv_bytes: 1200,
                },
                NetworkCounters {
                    interface: "eth0".to_string(),
                    sent_bytes: 123456,
                    recv_bytes: 9876543,
                },
            ]
        );
    }

    #[test]
    fn test_truncated_network_is_an_error() {
        let result = read_network_from_path(&path_from_root("tests/proc/net/truncated_dev"));
        assert!(result.is_err());
    }
}
