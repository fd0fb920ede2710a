// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use statexec::config::{self, CliAction, RunConfig};
use statexec::error::Error;
use statexec::runner::CommandRunner;
use statexec::sink::FileSink;
use statexec::sync::SyncCoordinator;
use statexec_collector::ProcCollector;

const BINARY_NAME: &str = "statexec";

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match RunConfig::from_process() {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            println!("{}", config::usage(BINARY_NAME));
            return ExitCode::SUCCESS;
        }
        Ok(CliAction::Version) => {
            println!("{BINARY_NAME} {}", config::VERSION);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}\n\n{}", config::usage(BINARY_NAME));
            return ExitCode::FAILURE;
        }
    };

    let env_filter = format!("hyper=off,reqwest=off,{}", config.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RunConfig) -> Result<(), Error> {
    info!(
        metrics_file = %config.metrics_file.display(),
        instance = config.instance(),
        role = config.role.as_str(),
        sync_port = config.sync_port,
        sync_wait_for_stop = config.sync_wait_for_stop,
        delay_before_command_s = config.delay_before_command.as_secs(),
        delay_after_command_s = config.delay_after_command.as_secs(),
        metrics_start_time = ?config.metrics_start_time,
        extra_labels = ?config.extra_labels,
        "Starting statexec {}",
        config::VERSION
    );

    let sink = FileSink::create_fresh(&config.metrics_file).map_err(|source| {
        Error::MetricsFile {
            path: config.metrics_file.clone(),
            source,
        }
    })?;

    let runner = CommandRunner::new(
        Arc::new(config),
        Arc::new(ProcCollector::new()),
        Arc::new(sink),
    );
    let outcome = SyncCoordinator::new(runner).run().await?;

    info!(
        "Command exited with {}, {} metric batches written",
        outcome.exit_status, outcome.batches
    );
    Ok(())
}
