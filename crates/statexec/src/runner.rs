// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Child process lifecycle: spawn, interrupt forwarding, wait, and the metrics
//! sampler running around it.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use statexec_collector::MetricsCollector;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::annotation::{AnnotationWriter, Phase};
use crate::config::RunConfig;
use crate::error::RunError;
use crate::sampler::{MetricsSampler, SAMPLE_PERIOD};
use crate::sink::SampleSink;
use crate::state::{CommandState, RunState};

type SamplerHandle = JoinHandle<Result<u64, io::Error>>;

/// Requests that an interrupt be forwarded to the running child.
#[derive(Debug, Clone)]
pub struct InterruptHandle(mpsc::UnboundedSender<()>);

impl InterruptHandle {
    /// Returns false once the run that owns the receiving side has finished.
    pub fn interrupt(&self) -> bool {
        self.0.send(()).is_ok()
    }
}

/// Receiving side of [`interrupt_channel`], consumed by [`CommandRunner::run`].
#[derive(Debug)]
pub struct Interrupts(mpsc::UnboundedReceiver<()>);

pub fn interrupt_channel() -> (InterruptHandle, Interrupts) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InterruptHandle(tx), Interrupts(rx))
}

#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub exit_status: ExitStatus,
    /// Number of sample batches written during the run.
    pub batches: u64,
}

pub struct CommandRunner {
    config: Arc<RunConfig>,
    collector: Arc<dyn MetricsCollector>,
    sink: Arc<dyn SampleSink>,
    state: RunState,
    sample_period: Duration,
}

impl CommandRunner {
    pub fn new(
        config: Arc<RunConfig>,
        collector: Arc<dyn MetricsCollector>,
        sink: Arc<dyn SampleSink>,
    ) -> Self {
        Self {
            config,
            collector,
            sink,
            state: RunState::new(),
            sample_period: SAMPLE_PERIOD,
        }
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> CommandState {
        self.state.get()
    }

    /// Runs the configured command once, sampling metrics from the start of the
    /// delay-before-command until one batch after the delay-after-command.
    ///
    /// A non-zero exit of the child is reported in the outcome, not as an error.
    pub async fn run(&self, mut interrupts: Interrupts) -> Result<RunOutcome, RunError> {
        let real_start = Instant::now();
        let start_time_ms = self.config.metrics_start_time.unwrap_or_else(now_millis);
        let labels = self.config.labels();
        let annotations = AnnotationWriter::new(Arc::clone(&self.sink), labels.clone());

        let (quit_tx, quit_rx) = oneshot::channel();
        let sampler = MetricsSampler::new(
            Arc::clone(&self.collector),
            Arc::clone(&self.sink),
            labels,
            self.state.clone(),
            start_time_ms,
        )
        .with_period(self.sample_period);

        // without a delay before the command, the first batch waits for the spawn
        // and reports the running state
        let delay_before = self.config.delay_before_command;
        let sampling = if delay_before.is_zero() {
            Sampling::Deferred(sampler, quit_rx)
        } else {
            let mut handle = sampler.start(quit_rx).map_err(RunError::Sink)?;
            debug!("Metrics sampling started at virtual time {start_time_ms}");
            delay(delay_before, &mut handle, "before").await?;
            Sampling::Started(handle)
        };

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(sigint) => sigint,
            Err(e) => {
                sampling.abort();
                return Err(RunError::SignalHandler(e));
            }
        };

        let (program, args) = match self.config.command.split_first() {
            Some(split) => split,
            None => {
                sampling.abort();
                return Err(RunError::Spawn(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "empty command",
                )));
            }
        };
        info!("Running command: {}", self.config.command.join(" "));
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                sampling.abort();
                return Err(RunError::Spawn(e));
            }
        };
        let pid = child.id();

        self.state.advance(CommandState::Running);
        let mut sampler = match sampling.started() {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.start_kill();
                return Err(RunError::Sink(e));
            }
        };
        if let Err(e) = annotations.write(Phase::Start, virtual_now(start_time_ms, real_start)) {
            let _ = child.start_kill();
            sampler.abort();
            return Err(e);
        }

        let waited = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(()) = sigint.recv() => {
                    debug!("Forwarding interrupt to command");
                    if let Err(e) = forward_interrupt(pid) {
                        sampler.abort();
                        return Err(e);
                    }
                }
                Some(()) = interrupts.0.recv() => {
                    debug!("Forwarding requested interrupt to command");
                    if let Err(e) = forward_interrupt(pid) {
                        sampler.abort();
                        return Err(e);
                    }
                }
                result = &mut sampler => {
                    let _ = child.start_kill();
                    return Err(sampler_stopped(result));
                }
            }
        };
        let exit_status = match waited {
            Ok(status) => status,
            Err(e) => {
                sampler.abort();
                return Err(RunError::Wait(e));
            }
        };

        self.state.advance(CommandState::Done);
        info!("Command finished with {exit_status}");
        if let Err(e) = annotations.write(Phase::Done, virtual_now(start_time_ms, real_start)) {
            sampler.abort();
            return Err(e);
        }

        delay(self.config.delay_after_command, &mut sampler, "after").await?;

        // the receiver is only gone if the sampler already returned, which the join reports
        let _ = quit_tx.send(());
        let batches = match sampler.await {
            Ok(Ok(batches)) => batches,
            Ok(Err(e)) => return Err(RunError::Sink(e)),
            Err(e) => return Err(RunError::Sampler(e.to_string())),
        };

        Ok(RunOutcome {
            exit_status,
            batches,
        })
    }
}

enum Sampling {
    Deferred(MetricsSampler, oneshot::Receiver<()>),
    Started(SamplerHandle),
}

impl Sampling {
    /// Writes the first batch now if it was deferred.
    fn started(self) -> Result<SamplerHandle, io::Error> {
        match self {
            Sampling::Deferred(sampler, quit) => sampler.start(quit),
            Sampling::Started(handle) => Ok(handle),
        }
    }

    fn abort(&self) {
        if let Sampling::Started(handle) = self {
            handle.abort();
        }
    }
}

/// Sleeps for `duration` unless the sampler fails first.
async fn delay(
    duration: Duration,
    sampler: &mut SamplerHandle,
    which: &str,
) -> Result<(), RunError> {
    if duration.is_zero() {
        return Ok(());
    }
    info!("Waiting {}s {which} command", duration.as_secs());
    tokio::select! {
        _ = sleep(duration) => Ok(()),
        result = &mut *sampler => Err(sampler_stopped(result)),
    }
}

fn sampler_stopped(result: Result<Result<u64, io::Error>, JoinError>) -> RunError {
    match result {
        Ok(Err(e)) => RunError::Sink(e),
        Ok(Ok(_)) => RunError::Sampler("stopped before the command completed".to_string()),
        Err(e) => RunError::Sampler(e.to_string()),
    }
}

fn forward_interrupt(pid: Option<u32>) -> Result<(), RunError> {
    // no pid means the child was already reaped
    let Some(pid) = pid else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|_| RunError::SignalForward(nix::Error::EINVAL))?;
    kill(Pid::from_raw(pid), Signal::SIGINT).map_err(RunError::SignalForward)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Virtual wall-clock time: the metrics start time plus the real time elapsed
/// since the run began.
fn virtual_now(start_time_ms: i64, real_start: Instant) -> i64 {
    let elapsed = i64::try_from(real_start.elapsed().as_millis()).unwrap_or(i64::MAX);
    start_time_ms.saturating_add(elapsed)
}
