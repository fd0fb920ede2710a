// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Label sets attached to every sample line.
//!
//! Rendering always emits the reserved labels first (`instance`, `job`, `role`),
//! then the metric-specific labels in the order given by the caller, then the
//! extra labels sorted by key. The same inputs always render the same string.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ConfigError;

/// Labels present on every line.
pub const RESERVED_LABELS: [&str; 3] = ["instance", "job", "role"];

/// Labels set by individual metric families.
pub const METRIC_LABELS: [&str; 4] = ["cpu", "mode", "interface", "disk"];

/// Normalizes a user supplied label key: every character outside `[a-zA-Z0-9]`
/// becomes `_` and the result is lowercased.
pub fn sanitize_label_key(key: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let invalid =
        INVALID.get_or_init(|| Regex::new("[^a-zA-Z0-9]").expect("failed creating regex"));
    invalid.replace_all(key, "_").to_lowercase()
}

/// Sanitizes `key` and rejects it when it would shadow a reserved or
/// metric-specific label.
pub fn validate_extra_label_key(key: &str) -> Result<String, ConfigError> {
    let safe_key = sanitize_label_key(key);
    if RESERVED_LABELS.contains(&safe_key.as_str()) || METRIC_LABELS.contains(&safe_key.as_str())
    {
        return Err(ConfigError::ReservedLabel(key.to_string()));
    }
    Ok(safe_key)
}

/// Escapes a label value for the text exposition format.
fn escape_label_value(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '"', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

fn push_label(rendered: &mut String, key: &str, value: &str) {
    if !rendered.is_empty() {
        rendered.push(',');
    }
    rendered.push_str(key);
    rendered.push_str("=\"");
    rendered.push_str(&escape_label_value(value));
    rendered.push('"');
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    instance: String,
    job: String,
    role: String,
    extra: BTreeMap<String, String>,
    reserved: String,
}

impl LabelSet {
    /// `extra` keys are expected to have gone through [`validate_extra_label_key`].
    pub fn new(
        instance: impl Into<String>,
        job: impl Into<String>,
        role: impl Into<String>,
        extra: BTreeMap<String, String>,
    ) -> Self {
        let instance = instance.into();
        let job = job.into();
        let role = role.into();

        let mut reserved = String::new();
        push_label(&mut reserved, "instance", &instance);
        push_label(&mut reserved, "job", &job);
        push_label(&mut reserved, "role", &role);

        Self {
            instance,
            job,
            role,
            extra,
            reserved,
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Renders the comma separated `key="value"` list, without braces.
    pub fn render(&self, metric_labels: &[(&str, &str)]) -> String {
        let mut rendered = self.reserved.clone();
        for (key, value) in metric_labels {
            push_label(&mut rendered, key, value);
        }
        for (key, value) in &self.extra {
            push_label(&mut rendered, key, value);
        }
        rendered
    }
}
