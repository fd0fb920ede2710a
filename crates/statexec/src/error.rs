// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

/// Errors detected while building the run configuration from the environment
/// and the command line.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing value for option {0}")]
    MissingValue(String),

    #[error("Invalid value '{value}' for {option}: expected {expected}")]
    InvalidValue {
        option: String,
        value: String,
        expected: &'static str,
    },

    #[error("Server and client modes are mutually exclusive")]
    ConflictingRoles,

    #[error("No command to run")]
    MissingCommand,

    #[error("Invalid label '{0}': expected <key>=<value>")]
    MalformedLabel(String),

    #[error("Label '{0}' is reserved and cannot be overridden")]
    ReservedLabel(String),

    #[error("Invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Errors that abort a command run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Error writing to metrics file: {0}")]
    Sink(#[source] io::Error),

    #[error("Error starting command: {0}")]
    Spawn(#[source] io::Error),

    #[error("Error installing interrupt handler: {0}")]
    SignalHandler(#[source] io::Error),

    #[error("Error forwarding interrupt to command: {0}")]
    SignalForward(#[source] nix::Error),

    #[error("Error waiting for command: {0}")]
    Wait(#[source] io::Error),

    #[error("Error serializing annotation: {0}")]
    Annotation(#[source] serde_json::Error),

    #[error("Metrics sampler stopped unexpectedly: {0}")]
    Sampler(String),
}

/// Errors raised by the synchronization roles.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Error sending start sync request: {0}")]
    StartRequest(#[source] reqwest::Error),

    #[error("Error sending stop sync request: {0}")]
    StopRequest(#[source] reqwest::Error),

    #[error("Error starting the sync server on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Sync server error: {0}")]
    Accept(#[source] io::Error),

    #[error("Command task terminated unexpectedly: {0}")]
    RunTask(String),

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Top level error reported by the binary before exiting with a non-zero status.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Error opening metrics file {path}: {source}")]
    MetricsFile {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
}
