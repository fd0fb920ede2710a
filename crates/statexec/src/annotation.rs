// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Grafana annotations marking the command lifecycle in the metrics file.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RunError;
use crate::labels::LabelSet;
use crate::sink::SampleSink;

pub const ANNOTATION_PREFIX: &str = "#grafana-annotation ";
pub const ANNOTATION_TAG: &str = "statexec";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub time: i64,
    pub time_end: i64,
    pub text: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Done,
}

impl Phase {
    pub fn tag(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Done => "done",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Phase::Start => "Command started",
            Phase::Done => "Command done",
        }
    }
}

impl Annotation {
    /// Point annotation at `time` for the given lifecycle phase.
    pub fn new(phase: Phase, time: i64, labels: &LabelSet) -> Self {
        Self {
            time,
            time_end: time,
            text: phase.text().to_string(),
            tags: vec![
                ANNOTATION_TAG.to_string(),
                phase.tag().to_string(),
                format!("instance={}", labels.instance()),
                format!("job={}", labels.job()),
                format!("role={}", labels.role()),
            ],
        }
    }

    /// Single `#grafana-annotation {json}` line, newline terminated.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{ANNOTATION_PREFIX}{}\n", serde_json::to_string(self)?))
    }

    /// Parses a line produced by [`Annotation::to_line`].
    pub fn from_line(line: &str) -> Option<Self> {
        let json = line.strip_prefix(ANNOTATION_PREFIX)?;
        serde_json::from_str(json.trim_end()).ok()
    }
}

pub struct AnnotationWriter {
    sink: Arc<dyn SampleSink>,
    labels: LabelSet,
}

impl AnnotationWriter {
    pub fn new(sink: Arc<dyn SampleSink>, labels: LabelSet) -> Self {
        Self { sink, labels }
    }

    pub fn write(&self, phase: Phase, time: i64) -> Result<Annotation, RunError> {
        let annotation = Annotation::new(phase, time, &self.labels);
        let line = annotation.to_line().map_err(RunError::Annotation)?;
        self.sink
            .append(line.as_bytes())
            .map_err(RunError::Sink)?;
        debug!("Wrote '{}' annotation at {time}", annotation.text);
        Ok(annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<u8>>);

    impl SampleSink for MemorySink {
        fn append(&self, bytes: &[u8]) -> io::Result<()> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
    }

    struct BrokenSink;

    impl SampleSink for BrokenSink {
        fn append(&self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn labels() -> LabelSet {
        LabelSet::new("echo", "statexec", "standalone", BTreeMap::new())
    }

    #[test]
    fn test_annotation_line_format() {
        let line = Annotation::new(Phase::Start, 1_700_000_000_000, &labels())
            .to_line()
            .unwrap();
        assert_eq!(
            line,
            "#grafana-annotation {\"time\":1700000000000,\"timeEnd\":1700000000000,\
             \"text\":\"Command started\",\"tags\":[\"statexec\",\"start\",\
             \"instance=echo\",\"job=statexec\",\"role=standalone\"]}\n"
        );
    }

    #[test]
    fn test_writer_appends_parseable_lines() {
        let sink = Arc::new(MemorySink::default());
        let writer = AnnotationWriter::new(sink.clone(), labels());

        writer.write(Phase::Start, 10).unwrap();
        writer.write(Phase::Done, 25).unwrap();

        let written = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let annotations: Vec<Annotation> =
            written.lines().filter_map(Annotation::from_line).collect();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].text, "Command started");
        assert_eq!(annotations[1].text, "Command done");
        assert_eq!(annotations[1].tags[1], "done");
        for annotation in &annotations {
            assert_eq!(annotation.time, annotation.time_end);
        }
    }

    #[test]
    fn test_writer_reports_sink_errors() {
        let writer = AnnotationWriter::new(Arc::new(BrokenSink), labels());
        assert!(matches!(
            writer.write(Phase::Done, 0),
            Err(RunError::Sink(_))
        ));
    }

    #[test]
    fn test_from_line_ignores_samples() {
        assert_eq!(Annotation::from_line("statexec_command_status{} 1 0"), None);
    }
}
