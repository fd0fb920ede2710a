// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{sync_base_url, Role};
use crate::error::SyncError;
use crate::runner::{interrupt_channel, CommandRunner, RunOutcome};

pub use client::SyncClient;
pub use server::SyncServer;

/// Decides when the command runs, according to the configured role.
pub struct SyncCoordinator {
    runner: Arc<CommandRunner>,
}

impl SyncCoordinator {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, SyncError> {
        let config = self.runner.config();
        match &config.role {
            Role::Standalone => {
                let (_interrupt, interrupts) = interrupt_channel();
                Ok(self.runner.run(interrupts).await?)
            }
            Role::Client { server } => {
                let client = SyncClient::new(sync_base_url(server, config.sync_port));
                client::run(&self.runner, &client, config.sync_wait_for_stop).await
            }
            Role::Server => {
                let addr = SocketAddr::from(([0, 0, 0, 0], config.sync_port));
                let server = SyncServer::bind(addr).await?;
                server.serve(Arc::clone(&self.runner)).await
            }
        }
    }
}
