// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! System clock tick rate, used to convert `/proc/stat` ticks into seconds.

use nix::unistd::{sysconf, SysconfVar};
use std::io;

/// Returns the number of clock ticks per second (USER_HZ), typically 100.
#[allow(clippy::cast_sign_loss)]
pub fn get_clk_tck() -> Result<u64, io::Error> {
    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(clk_tck)) if clk_tck > 0 => Ok(clk_tck as u64),
        _ => Err(io::Error::new(
            io::ErrorKind::NotFound,
            "Could not find system clock ticks per second",
        )),
    }
}
