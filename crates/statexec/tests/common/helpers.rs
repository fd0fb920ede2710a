// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use statexec::annotation::Annotation;
use statexec::config::{Role, RunConfig};
use statexec::runner::CommandRunner;
use statexec::sink::FileSink;

use super::mocks::StaticCollector;

pub const TEST_SAMPLE_PERIOD: Duration = Duration::from_millis(100);

/// Configuration running `command` and writing to `metrics_file`
pub fn test_config(command: &[&str], metrics_file: &Path, role: Role) -> RunConfig {
    RunConfig {
        metrics_file: metrics_file.to_path_buf(),
        role,
        command: command.iter().map(|s| s.to_string()).collect(),
        log_level: "error".to_string(),
        ..RunConfig::default()
    }
}

/// Runner over a fresh metrics file, sampling every [`TEST_SAMPLE_PERIOD`]
pub fn test_runner(config: RunConfig) -> CommandRunner {
    let sink = FileSink::create_fresh(&config.metrics_file).expect("Failed to open metrics file");
    CommandRunner::new(Arc::new(config), Arc::new(StaticCollector), Arc::new(sink))
        .with_sample_period(TEST_SAMPLE_PERIOD)
}

/// Annotations found in a metrics file
pub fn read_annotations(path: &Path) -> Vec<Annotation> {
    std::fs::read_to_string(path)
        .expect("Failed to read metrics file")
        .lines()
        .filter_map(Annotation::from_line)
        .collect()
}

/// `(value, timestamp)` of every `statexec_command_status` line, in file order
pub fn command_statuses(path: &Path) -> Vec<(u8, i64)> {
    std::fs::read_to_string(path)
        .expect("Failed to read metrics file")
        .lines()
        .filter(|line| line.starts_with("statexec_command_status{"))
        .map(|line| {
            let mut fields = line.rsplit(' ');
            let timestamp = fields.next().unwrap().parse().unwrap();
            let value = fields.next().unwrap().parse().unwrap();
            (value, timestamp)
        })
        .collect()
}

/// Send an empty POST and return the status code
#[allow(dead_code)]
pub async fn post(url: &str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(url)
        .send()
        .await
        .expect("Failed to send request")
        .status()
}

/// Send a GET and return the status code
#[allow(dead_code)]
pub async fn get(url: &str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .get(url)
        .send()
        .await
        .expect("Failed to send request")
        .status()
}
