// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::header::CONTENT_TYPE;
use tracing::{error, info};

use crate::error::SyncError;
use crate::runner::{interrupt_channel, CommandRunner, RunOutcome};

/// HTTP client triggering a remote sync server.
#[derive(Debug, Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    base_url: String,
}

impl SyncClient {
    /// `base_url` is `http://<host>:<port>`, without a trailing slash.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn start(&self) -> Result<(), SyncError> {
        info!("Sending start sync at {}/start", self.base_url);
        self.post("/start").await.map_err(SyncError::StartRequest)?;
        info!("Start sync done");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), SyncError> {
        info!("Sending stop sync at {}/stop", self.base_url);
        self.post("/stop").await.map_err(SyncError::StopRequest)?;
        info!("Stop sync done");
        Ok(())
    }

    async fn post(&self, path: &str) -> Result<(), reqwest::Error> {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header(CONTENT_TYPE, "text/plain")
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Client role: trigger the server, run the command locally, then optionally
/// tell the server to stop.
pub async fn run(
    runner: &CommandRunner,
    client: &SyncClient,
    send_stop: bool,
) -> Result<RunOutcome, SyncError> {
    client.start().await?;

    let (_interrupt, interrupts) = interrupt_channel();
    let outcome = runner.run(interrupts).await?;

    if send_stop {
        if let Err(e) = client.stop().await {
            error!("Command already completed with {}", outcome.exit_status);
            return Err(e);
        }
    }
    Ok(outcome)
}
