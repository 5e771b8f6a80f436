pub mod ecosystem;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

pub use ecosystem::{EcosystemApp, EcosystemConfig};
pub use loader::ConfigLoader;

use crate::ProcName;
use crate::policy::{BackoffCurve, RestartPolicy};

pub const DEFAULT_MAX_RESTARTS: u32 = 10;
pub const DEFAULT_MIN_UPTIME_MS: u64 = 1000;
pub const DEFAULT_KILL_TIMEOUT_MS: u64 = 3000;

/// Immutable description of one supervised unit.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: ProcName,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub autostart: bool,
    pub max_restarts: u32,
    pub min_uptime: Duration,
    pub kill_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> crate::Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(crate::Error::Config("command must not be empty".into()));
        }
        Ok(Self {
            name: ProcName::new(name)?,
            command,
            args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            autostart: true,
            max_restarts: DEFAULT_MAX_RESTARTS,
            min_uptime: Duration::from_millis(DEFAULT_MIN_UPTIME_MS),
            kill_timeout: Duration::from_millis(DEFAULT_KILL_TIMEOUT_MS),
            backoff: BackoffConfig::default(),
        })
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::new(self.max_restarts, self.min_uptime).with_curve(self.backoff.curve())
    }
}

/// Back-off curve parameters, exposed in config so the curve is tunable
/// rather than baked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 30000,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    pub fn curve(&self) -> BackoffCurve {
        BackoffCurve::new()
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(self.multiplier)
            .with_jitter(self.jitter)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub apps: Vec<ProcessSpec>,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Config {
    /// Unit names must be unique; a supervisor cannot run two units under
    /// the same name.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.apps {
            if !seen.insert(spec.name.clone()) {
                return Err(crate::Error::DuplicateProc(spec.name.to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/runctl.sock"),
            log_level: "info".to_string(),
        }
    }
}

impl Serialize for ProcessSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Out<'a> {
            name: &'a str,
            command: &'a str,
            args: &'a [String],
            #[serde(skip_serializing_if = "Option::is_none")]
            cwd: Option<&'a PathBuf>,
            env: &'a HashMap<String, String>,
            autostart: bool,
            max_restarts: u32,
            min_uptime_ms: u64,
            kill_timeout_ms: u64,
            backoff: &'a BackoffConfig,
        }
        Out {
            name: self.name.as_str(),
            command: &self.command,
            args: &self.args,
            cwd: self.cwd.as_ref(),
            env: &self.env,
            autostart: self.autostart,
            max_restarts: self.max_restarts,
            min_uptime_ms: self.min_uptime.as_millis() as u64,
            kill_timeout_ms: self.kill_timeout.as_millis() as u64,
            backoff: &self.backoff,
        }
        .serialize(serializer)
    }
}

// Raw deserialization struct for ProcessSpec
#[derive(Debug, Deserialize)]
struct ProcessSpecRaw {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    pub cwd: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
    pub autostart: Option<bool>,
    pub max_restarts: Option<u32>,
    pub min_uptime_ms: Option<u64>,
    pub kill_timeout_ms: Option<u64>,
    pub backoff: Option<BackoffConfig>,
}

impl<'de> Deserialize<'de> for ProcessSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = ProcessSpecRaw::deserialize(deserializer)?;
        ProcessSpec::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<ProcessSpecRaw> for ProcessSpec {
    type Error = crate::Error;

    fn try_from(raw: ProcessSpecRaw) -> crate::Result<Self> {
        if raw.command.trim().is_empty() {
            return Err(crate::Error::Config(format!(
                "unit '{}': command must not be empty",
                raw.name
            )));
        }

        // If args weren't provided, split them out of the command string.
        let (command, args) = if let Some(args) = raw.args {
            (raw.command, args)
        } else {
            match shell_words::split(&raw.command) {
                Ok(parts) if !parts.is_empty() => {
                    let command = parts[0].clone();
                    let args = parts.into_iter().skip(1).collect();
                    (command, args)
                }
                _ => (raw.command, Vec::new()),
            }
        };

        Ok(ProcessSpec {
            name: ProcName::new(raw.name)?,
            command,
            args,
            cwd: raw.cwd,
            env: raw.env.unwrap_or_default(),
            autostart: raw.autostart.unwrap_or(true),
            max_restarts: raw.max_restarts.unwrap_or(DEFAULT_MAX_RESTARTS),
            min_uptime: Duration::from_millis(
                raw.min_uptime_ms.unwrap_or(DEFAULT_MIN_UPTIME_MS),
            ),
            kill_timeout: Duration::from_millis(
                raw.kill_timeout_ms.unwrap_or(DEFAULT_KILL_TIMEOUT_MS),
            ),
            backoff: raw.backoff.unwrap_or_default(),
        })
    }
}
