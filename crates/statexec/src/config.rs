// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run configuration, read from `SE_*` environment variables and then from the
//! command line. Command line options override the environment.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::labels::{validate_extra_label_key, LabelSet};

pub const ENV_VAR_PREFIX: &str = "SE_";
pub const JOB_NAME: &str = "statexec";
pub const DEFAULT_METRICS_FILE: &str = "statexec_metrics.prom";
pub const DEFAULT_SYNC_PORT: u16 = 8080;
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// How command start and stop are triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Run immediately.
    Standalone,
    /// Trigger the server at `server` before running, and optionally after.
    Client { server: String },
    /// Wait for a client to trigger the command over HTTP.
    Server,
}

impl Role {
    /// Value of the `role` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standalone => "standalone",
            Role::Client { .. } => "client",
            Role::Server => "server",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub metrics_file: PathBuf,
    /// Overrides the `instance` label, which defaults to the command name.
    pub instance: Option<String>,
    /// Virtual start epoch in milliseconds; wall-clock time at run start when unset.
    pub metrics_start_time: Option<i64>,
    pub delay_before_command: Duration,
    pub delay_after_command: Duration,
    pub role: Role,
    pub sync_port: u16,
    /// When false, clients skip the stop call and servers exit once the command completes.
    pub sync_wait_for_stop: bool,
    pub extra_labels: BTreeMap<String, String>,
    pub log_level: String,
    pub command: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            metrics_file: PathBuf::from(DEFAULT_METRICS_FILE),
            instance: None,
            metrics_start_time: None,
            delay_before_command: Duration::ZERO,
            delay_after_command: Duration::ZERO,
            role: Role::Standalone,
            sync_port: DEFAULT_SYNC_PORT,
            sync_wait_for_stop: true,
            extra_labels: BTreeMap::new(),
            log_level: "info".to_string(),
            command: Vec::new(),
        }
    }
}

/// Outcome of command line parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum CliAction {
    Run(RunConfig),
    Help,
    Version,
}

impl RunConfig {
    /// Reads the process environment and arguments.
    pub fn from_process() -> Result<CliAction, ConfigError> {
        let vars = env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        });
        Self::from_env_and_args(vars, env::args().skip(1))
    }

    /// Builds a configuration from environment pairs and the arguments following
    /// the binary name.
    pub fn from_env_and_args<E, A>(vars: E, args: A) -> Result<CliAction, ConfigError>
    where
        E: IntoIterator<Item = (String, String)>,
        A: IntoIterator<Item = String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key.starts_with(ENV_VAR_PREFIX))
            .collect();

        let mut config = RunConfig::default();
        config.apply_env(&vars)?;

        let args: Vec<String> = args.into_iter().collect();
        if let Some(action) = config.apply_args(&args)? {
            return Ok(action);
        }

        config.validate()?;
        Ok(CliAction::Run(config))
    }

    fn apply_env(&mut self, vars: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        let get = |name: &str| {
            vars.get(&format!("{ENV_VAR_PREFIX}{name}"))
                .filter(|value| !value.is_empty())
                .map(|value| (format!("{ENV_VAR_PREFIX}{name}"), value.as_str()))
        };

        if let Some((_, value)) = get("FILE") {
            self.metrics_file = PathBuf::from(value);
        }
        if let Some((_, value)) = get("INSTANCE") {
            self.instance = Some(value.to_string());
        }
        if let Some((name, value)) = get("METRICS_START_TIME") {
            self.metrics_start_time = Some(parse_millis(&name, value)?);
        }
        if let Some((_, value)) = get("CONNECT") {
            self.set_role(Role::Client {
                server: value.to_string(),
            })?;
        }
        if get("SERVER").is_some() {
            self.set_role(Role::Server)?;
        }
        if let Some((name, value)) = get("SYNC_PORT") {
            self.sync_port = parse_port(&name, value)?;
        }
        if get("SYNC_START_ONLY").is_some() {
            self.sync_wait_for_stop = false;
        }
        if let Some((name, value)) = get("DELAY") {
            let delay = parse_seconds(&name, value)?;
            self.delay_before_command = delay;
            self.delay_after_command = delay;
        }
        if let Some((name, value)) = get("DELAY_BEFORE_COMMAND") {
            self.delay_before_command = parse_seconds(&name, value)?;
        }
        if let Some((name, value)) = get("DELAY_AFTER_COMMAND") {
            self.delay_after_command = parse_seconds(&name, value)?;
        }
        if let Some((_, value)) = get("LOG_LEVEL") {
            self.log_level = value.to_lowercase();
        }

        let label_prefix = format!("{ENV_VAR_PREFIX}LABEL_");
        for (key, value) in vars {
            if let Some(label) = key.strip_prefix(&label_prefix) {
                self.add_label(label, value)?;
            }
        }
        Ok(())
    }

    /// Returns `Some` when the arguments ask for help or the version instead of a run.
    fn apply_args(&mut self, args: &[String]) -> Result<Option<CliAction>, ConfigError> {
        let mut i = 0;
        while i < args.len() {
            let option = args[i].as_str();
            match option {
                "-f" | "--file" => {
                    self.metrics_file = PathBuf::from(option_value(args, &mut i)?);
                }
                "-i" | "--instance" => {
                    self.instance = Some(option_value(args, &mut i)?.to_string());
                }
                "-mst" | "--metrics-start-time" => {
                    let value = option_value(args, &mut i)?;
                    self.metrics_start_time = Some(parse_millis(option, value)?);
                }
                "-c" | "--connect" => {
                    let server = option_value(args, &mut i)?.to_string();
                    self.set_role(Role::Client { server })?;
                }
                "-s" | "--server" => self.set_role(Role::Server)?,
                "-sp" | "--sync-port" => {
                    self.sync_port = parse_port(option, option_value(args, &mut i)?)?;
                }
                "-sso" | "--sync-start-only" => self.sync_wait_for_stop = false,
                "-d" | "--delay" => {
                    let delay = parse_seconds(option, option_value(args, &mut i)?)?;
                    self.delay_before_command = delay;
                    self.delay_after_command = delay;
                }
                "-dbc" | "--delay-before-command" => {
                    self.delay_before_command = parse_seconds(option, option_value(args, &mut i)?)?;
                }
                "-dac" | "--delay-after-command" => {
                    self.delay_after_command = parse_seconds(option, option_value(args, &mut i)?)?;
                }
                "-l" | "--label" => {
                    let label = option_value(args, &mut i)?;
                    let (key, label_value) = label
                        .split_once('=')
                        .ok_or_else(|| ConfigError::MalformedLabel(label.to_string()))?;
                    self.add_label(key, label_value)?;
                }
                "--log-level" => self.log_level = option_value(args, &mut i)?.to_lowercase(),
                "-v" | "--version" => return Ok(Some(CliAction::Version)),
                "-h" | "-help" | "--help" => return Ok(Some(CliAction::Help)),
                "--" => {
                    self.command = args[i + 1..].to_vec();
                    break;
                }
                _ => {
                    self.command = args[i..].to_vec();
                    break;
                }
            }
            i += 1;
        }
        Ok(None)
    }

    fn set_role(&mut self, role: Role) -> Result<(), ConfigError> {
        let conflicting = matches!(
            (&self.role, &role),
            (Role::Server, Role::Client { .. }) | (Role::Client { .. }, Role::Server)
        );
        if conflicting {
            return Err(ConfigError::ConflictingRoles);
        }
        self.role = role;
        Ok(())
    }

    fn add_label(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = validate_extra_label_key(key)?;
        self.extra_labels.insert(key, value.to_string());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_empty() || self.command[0].is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }
        Ok(())
    }

    /// The `instance` label: the override, or the command name.
    pub fn instance(&self) -> &str {
        self.instance
            .as_deref()
            .or_else(|| self.command.first().map(String::as_str))
            .unwrap_or_default()
    }

    pub fn labels(&self) -> LabelSet {
        LabelSet::new(
            self.instance(),
            JOB_NAME,
            self.role.as_str(),
            self.extra_labels.clone(),
        )
    }
}

/// Base URL of the sync server a client connects to.
pub fn sync_base_url(server: &str, port: u16) -> String {
    format!("http://{server}:{port}")
}

/// Consumes the value following the option at `args[*i]`.
fn option_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, ConfigError> {
    let option = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(option.clone()))
}

fn parse_millis(option: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        expected: "a timestamp in milliseconds since epoch",
    })
}

fn parse_seconds(option: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidValue {
            option: option.to_string(),
            value: value.to_string(),
            expected: "a non-negative integer number of seconds",
        })
}

fn parse_port(option: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        expected: "a TCP port",
    })
}

pub fn usage(binself: &str) -> String {
    let p = ENV_VAR_PREFIX;
    format!(
        "Usage: {binself} [OPTIONS] <command> [command args]
Version: {VERSION}

Common options:
  --file, -f <file>                       {p}FILE                 Metrics file (default: {DEFAULT_METRICS_FILE})
  --instance, -i <instance>               {p}INSTANCE             Instance name (default: <command>)
  --metrics-start-time, -mst <timestamp>  {p}METRICS_START_TIME   Metrics start time in milliseconds (default: now)
  --delay, -d <seconds>                   {p}DELAY                Delay in seconds before and after the command (default: 0)
  --delay-before-command, -dbc <seconds>  {p}DELAY_BEFORE_COMMAND Delay in seconds before the command (default: 0)
  --delay-after-command, -dac <seconds>   {p}DELAY_AFTER_COMMAND  Delay in seconds after the command (default: 0)
  --label, -l <key>=<value>               {p}LABEL_<key>          Extra label to add to all metrics
  --log-level <level>                     {p}LOG_LEVEL            trace, debug, info, warn or error (default: info)
Synchronization options:
  --connect, -c <host>                    {p}CONNECT              Connect to server mode
  --server, -s                            {p}SERVER               Start server mode
  --sync-port, -sp <port>                 {p}SYNC_PORT            Sync port (default: {DEFAULT_SYNC_PORT})
  --sync-start-only, -sso                 {p}SYNC_START_ONLY      Sync start only (default: false)
Other options:
  --version, -v        Print version and exit
  --help, -help, -h    Print help and exit
  --                   Stop parsing arguments

Standalone examples:
  {binself} ping 8.8.8.8 -c 4
  {p}FILE=data.prom {p}LABEL_type=sample {binself} -d 3 -l env=dev -- ./mycommand.sh arg1 arg2

Sync mode examples:
  # Wait for a client sync to start the command
  {binself} -s -- date
  # Connect to server on <localhost> to start and stop the command
  {binself} -c localhost -- echo start date now
"
    )
}
