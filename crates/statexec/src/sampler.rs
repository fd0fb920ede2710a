// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use statexec_collector::MetricsCollector;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, interval_at};
use tracing::{debug, error};

use crate::labels::LabelSet;
use crate::sink::SampleSink;
use crate::state::RunState;

pub const METRIC_PREFIX: &str = "statexec_";
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Periodic sampling loop writing one batch of metric lines per tick.
///
/// The first batch is written by [`MetricsSampler::start`] with an elapsed count of
/// zero, then one batch per period. Every line of a batch carries the virtual timestamp
/// `start_time_ms + elapsed * 1000`.
pub struct MetricsSampler {
    collector: Arc<dyn MetricsCollector>,
    sink: Arc<dyn SampleSink>,
    labels: LabelSet,
    state: RunState,
    start_time_ms: i64,
    period: Duration,
}

impl MetricsSampler {
    pub fn new(
        collector: Arc<dyn MetricsCollector>,
        sink: Arc<dyn SampleSink>,
        labels: LabelSet,
        state: RunState,
        start_time_ms: i64,
    ) -> Self {
        Self {
            collector,
            sink,
            labels,
            state,
            start_time_ms,
            period: SAMPLE_PERIOD,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Writes the first batch, then spawns the tick loop on the current runtime.
    ///
    /// Sending on, or dropping, the quit sender makes the loop write exactly one
    /// more batch on the next tick and return the total number of batches written.
    pub fn start(
        self,
        quit: oneshot::Receiver<()>,
    ) -> Result<JoinHandle<Result<u64, io::Error>>, io::Error> {
        self.sample(0)?;
        Ok(tokio::spawn(self.run(quit)))
    }

    async fn run(self, mut quit: oneshot::Receiver<()>) -> Result<u64, io::Error> {
        let mut ticker = interval_at(time::Instant::now() + self.period, self.period);

        let mut elapsed: u64 = 0;
        let mut stopping = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    elapsed += 1;
                    self.sample(elapsed)?;
                    if stopping {
                        debug!("Metrics sampler stopped after {} batches", elapsed + 1);
                        return Ok(elapsed + 1);
                    }
                }
                _ = &mut quit, if !stopping => {
                    stopping = true;
                }
            }
        }
    }

    fn sample(&self, elapsed: u64) -> Result<(), io::Error> {
        let batch = self.render_batch(elapsed, Instant::now());
        self.sink.append(batch.as_bytes()).map_err(|e| {
            error!("Error writing metrics batch: {e}");
            e
        })
    }

    fn timestamp(&self, elapsed: u64) -> i64 {
        let elapsed_ms = i64::try_from(elapsed.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.start_time_ms.saturating_add(elapsed_ms)
    }

    /// Renders every metric family for one tick.
    pub fn render_batch(&self, elapsed: u64, generation_start: Instant) -> String {
        let ts = self.timestamp(elapsed);
        let defaults = self.labels.render(&[]);
        let mut batch = String::new();

        push_line(&mut batch, "command_status", &defaults, self.state.get() as u8, ts);

        for cpu in self.collector.collect_cpu() {
            for (mode, seconds) in &cpu.seconds_per_mode {
                let labels = self
                    .labels
                    .render(&[("cpu", cpu.cpu.as_str()), ("mode", mode.as_str())]);
                push_line(
                    &mut batch,
                    "cpu_seconds_total",
                    &labels,
                    format_args!("{seconds:.6}"),
                    ts,
                );
            }
        }

        let memory = self.collector.collect_memory();
        push_line(&mut batch, "memory_total_bytes", &defaults, memory.total, ts);
        push_line(&mut batch, "memory_available_bytes", &defaults, memory.available, ts);
        push_line(&mut batch, "memory_used_bytes", &defaults, memory.used, ts);
        push_line(&mut batch, "memory_free_bytes", &defaults, memory.free, ts);
        push_line(&mut batch, "memory_buffers_bytes", &defaults, memory.buffers, ts);
        push_line(&mut batch, "memory_cached_bytes", &defaults, memory.cached, ts);
        push_line(
            &mut batch,
            "memory_used_percent",
            &defaults,
            format_args!("{:.6}", memory.used_percent),
            ts,
        );

        for net in self.collector.collect_network() {
            let labels = self.labels.render(&[("interface", net.interface.as_str())]);
            push_line(&mut batch, "network_sent_bytes_total", &labels, net.sent_bytes, ts);
            push_line(&mut batch, "network_received_bytes_total", &labels, net.recv_bytes, ts);
        }

        for disk in self.collector.collect_disk() {
            let labels = self.labels.render(&[("disk", disk.device.as_str())]);
            push_line(&mut batch, "disk_read_bytes_total", &labels, disk.read_bytes, ts);
            push_line(&mut batch, "disk_write_bytes_total", &labels, disk.write_bytes, ts);
        }

        push_line(&mut batch, "seconds_since_start", &defaults, elapsed, ts);
        push_line(
            &mut batch,
            "metric_generation_duration_ms",
            &defaults,
            generation_start.elapsed().as_millis(),
            ts,
        );
        batch
    }
}

fn push_line(batch: &mut String, name: &str, labels: &str, value: impl std::fmt::Display, ts: i64) {
    // writing into a String cannot fail
    let _ = writeln!(batch, "{METRIC_PREFIX}{name}{{{labels}}} {value} {ts}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CommandState;
    use statexec_collector::{CpuMode, CpuTimes, DiskCounters, MemoryStats, NetworkCounters};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct FixedCollector;

    impl MetricsCollector for FixedCollector {
        fn collect_cpu(&self) -> Vec<CpuTimes> {
            vec![CpuTimes {
                cpu: "0".to_string(),
                seconds_per_mode: vec![(CpuMode::User, 12.5), (CpuMode::Idle, 300.25)],
            }]
        }

        fn collect_memory(&self) -> MemoryStats {
            MemoryStats {
                total: 1000,
                available: 600,
                used: 300,
                free: 500,
                buffers: 100,
                cached: 100,
                used_percent: 30.0,
            }
        }

        fn collect_network(&self) -> Vec<NetworkCounters> {
            vec![NetworkCounters {
                interface: "eth0".to_string(),
                sent_bytes: 42,
                recv_bytes: 84,
            }]
        }

        fn collect_disk(&self) -> Vec<DiskCounters> {
            vec![DiskCounters {
                device: "sda".to_string(),
                read_bytes: 512,
                write_bytes: 1024,
            }]
        }
    }

    #[derive(Default)]
    struct BatchSink(Mutex<Vec<String>>);

    impl SampleSink for BatchSink {
        fn append(&self, bytes: &[u8]) -> io::Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(String::from_utf8(bytes.to_vec()).unwrap());
            Ok(())
        }
    }

    struct FullDisk;

    impl SampleSink for FullDisk {
        fn append(&self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }
    }

    fn sampler(sink: Arc<dyn SampleSink>, state: RunState, start: i64) -> MetricsSampler {
        let labels = LabelSet::new(
            "echo",
            "statexec",
            "standalone",
            BTreeMap::from([("env".to_string(), "dev".to_string())]),
        );
        MetricsSampler::new(Arc::new(FixedCollector), sink, labels, state, start)
    }

    fn timestamps(batch: &str) -> Vec<i64> {
        batch
            .lines()
            .map(|line| line.rsplit(' ').next().unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_render_batch_lines() {
        let state = RunState::new();
        state.advance(CommandState::Running);
        let sampler = sampler(Arc::new(BatchSink::default()), state, 1_000);

        let batch = sampler.render_batch(2, Instant::now());
        let lines: Vec<&str> = batch.lines().collect();

        let defaults = r#"instance="echo",job="statexec",role="standalone",env="dev""#;
        assert_eq!(lines[0], format!("statexec_command_status{{{defaults}}} 1 3000"));
        assert_eq!(
            lines[1],
            r#"statexec_cpu_seconds_total{instance="echo",job="statexec",role="standalone",cpu="0",mode="user",env="dev"} 12.500000 3000"#
        );
        let used_percent = format!("statexec_memory_used_percent{{{defaults}}} 30.000000 3000");
        assert!(lines.contains(&used_percent.as_str()));
        assert!(lines.contains(
            &r#"statexec_network_received_bytes_total{instance="echo",job="statexec",role="standalone",interface="eth0",env="dev"} 84 3000"#
        ));
        assert!(lines.contains(
            &r#"statexec_disk_write_bytes_total{instance="echo",job="statexec",role="standalone",disk="sda",env="dev"} 1024 3000"#
        ));
        let since_start = format!("statexec_seconds_since_start{{{defaults}}} 2 3000");
        assert!(lines.contains(&since_start.as_str()));
        assert!(lines[lines.len() - 1].starts_with("statexec_metric_generation_duration_ms{"));
        // status, 2 cpu modes, 7 memory, 2 network, 2 disk, 2 self monitoring
        assert_eq!(lines.len(), 16);
        assert!(timestamps(&batch).iter().all(|ts| *ts == 3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_batch_after_quit() {
        let sink = Arc::new(BatchSink::default());
        let (quit_tx, quit_rx) = oneshot::channel();
        let handle = sampler(sink.clone(), RunState::new(), 1_700_000_000_000)
            .start(quit_rx)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(sink.0.lock().unwrap().len(), 3);

        quit_tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), 4);

        let batches = sink.0.lock().unwrap();
        assert_eq!(batches.len(), 4);
        for (i, batch) in batches.iter().enumerate() {
            let expected = 1_700_000_000_000 + i as i64 * 1000;
            assert!(timestamps(batch).iter().all(|ts| *ts == expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_quit_sender_stops_sampler() {
        let sink = Arc::new(BatchSink::default());
        let (quit_tx, quit_rx) = oneshot::channel::<()>();
        let handle = sampler(sink.clone(), RunState::new(), 0).start(quit_rx).unwrap();

        drop(quit_tx);
        assert_eq!(handle.await.unwrap().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_follows_run_state() {
        let sink = Arc::new(BatchSink::default());
        let state = RunState::new();
        let (quit_tx, quit_rx) = oneshot::channel();
        let handle = sampler(sink.clone(), state.clone(), 0).start(quit_rx).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        state.advance(CommandState::Running);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        state.advance(CommandState::Done);
        quit_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        let statuses: Vec<String> = sink
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|batch| batch.lines().next().unwrap().split(' ').nth(1).unwrap().to_string())
            .collect();
        assert_eq!(statuses, ["0", "1", "2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_error_is_fatal() {
        let (_quit_tx, quit_rx) = oneshot::channel();
        assert!(sampler(Arc::new(FullDisk), RunState::new(), 0)
            .start(quit_rx)
            .is_err());
    }
}
