// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # statexec
//!
//! Runs a command while sampling host metrics once per second into a
//! Prometheus text file, with Grafana annotations marking when the command
//! started and finished.
//!
//! ## Architecture
//!
//! - [`runner`]: child process lifecycle and interrupt forwarding
//! - [`sampler`]: periodic metric batches with virtual timestamps
//! - [`annotation`]: lifecycle annotations
//! - [`sync`]: standalone, client and server roles for synchronized starts
//! - [`config`]: `SE_*` environment variables and command line options

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod annotation;
pub mod config;
pub mod error;
pub mod http_utils;
pub mod labels;
pub mod runner;
pub mod sampler;
pub mod sink;
pub mod state;
pub mod sync;
