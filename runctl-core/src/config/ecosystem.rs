use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{
    BackoffConfig, DEFAULT_KILL_TIMEOUT_MS, DEFAULT_MAX_RESTARTS, DEFAULT_MIN_UPTIME_MS,
    ProcessSpec,
};
use crate::ProcName;

/// PM2 ecosystem.config compatible format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcosystemConfig {
    pub apps: Vec<EcosystemApp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcosystemApp {
    pub name: String,
    pub script: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_production: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_development: Option<HashMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub autorestart: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_delay: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_uptime: Option<MsOrHuman>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_timeout: Option<u64>,
}

/// PM2 accepts both `min_uptime: 60000` and `min_uptime: "60s"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MsOrHuman {
    Ms(u64),
    Human(String),
}

impl MsOrHuman {
    pub fn to_millis(&self) -> crate::Result<u64> {
        match self {
            Self::Ms(ms) => Ok(*ms),
            Self::Human(s) => parse_duration_string(s),
        }
    }
}

fn parse_duration_string(s: &str) -> crate::Result<u64> {
    let s = s.trim().to_lowercase();
    let parse = |v: &str, scale: u64| {
        v.parse::<u64>()
            .map(|n| n * scale)
            .map_err(|_| crate::Error::Config(format!("invalid duration: {s}")))
    };
    if let Some(v) = s.strip_suffix("ms") {
        parse(v, 1)
    } else if let Some(v) = s.strip_suffix('h') {
        parse(v, 3_600_000)
    } else if let Some(v) = s.strip_suffix('m') {
        parse(v, 60_000)
    } else if let Some(v) = s.strip_suffix('s') {
        parse(v, 1000)
    } else {
        parse(&s, 1)
    }
}

impl EcosystemApp {
    /// Convert to our internal ProcessSpec format
    pub fn to_spec(&self) -> crate::Result<ProcessSpec> {
        let mut env = HashMap::new();
        if let Some(base_env) = &self.env {
            env.extend(base_env.clone());
        }

        // Apply environment-specific overrides, PM2 style.
        let node_env = std::env::var("NODE_ENV").unwrap_or_else(|_| "production".to_string());
        if node_env == "production" {
            if let Some(prod_env) = &self.env_production {
                env.extend(prod_env.clone());
            }
        } else if node_env == "development"
            && let Some(dev_env) = &self.env_development
        {
            env.extend(dev_env.clone());
        }

        // `autorestart: false` means the first exit exhausts the budget.
        let max_restarts = if self.autorestart.unwrap_or(true) {
            self.max_restarts.unwrap_or(DEFAULT_MAX_RESTARTS)
        } else {
            0
        };

        let min_uptime_ms = self
            .min_uptime
            .as_ref()
            .map(|m| m.to_millis())
            .transpose()?
            .unwrap_or(DEFAULT_MIN_UPTIME_MS);

        if self.script.trim().is_empty() {
            return Err(crate::Error::Config(format!(
                "unit '{}': script must not be empty",
                self.name
            )));
        }

        let (command, mut args) = match shell_words::split(&self.script) {
            Ok(parts) if !parts.is_empty() => {
                let command = parts[0].clone();
                let args = parts.into_iter().skip(1).collect();
                (command, args)
            }
            _ => (self.script.clone(), Vec::new()),
        };

        // Whitespace split only, no shell evaluation.
        if let Some(extra) = &self.args {
            args.extend(extra.split_whitespace().map(|s| s.to_string()));
        }

        Ok(ProcessSpec {
            name: ProcName::new(&self.name)?,
            command,
            args,
            cwd: self.cwd.as_ref().map(PathBuf::from),
            env,
            autostart: true,
            max_restarts,
            min_uptime: Duration::from_millis(min_uptime_ms),
            kill_timeout: Duration::from_millis(
                self.kill_timeout.unwrap_or(DEFAULT_KILL_TIMEOUT_MS),
            ),
            backoff: BackoffConfig {
                base_delay_ms: self.restart_delay.unwrap_or(100).max(1),
                ..BackoffConfig::default()
            },
        })
    }
}

impl EcosystemConfig {
    pub async fn load_from_js(_path: &Path) -> crate::Result<Self> {
        // Never execute JavaScript config files.
        Err(crate::Error::Config(
            "JavaScript config files are not supported for security reasons. \
             Please convert your ecosystem.config.js to JSON format. \
             Example: module.exports = { apps: [...] } should become { \"apps\": [...] }"
                .to_string(),
        ))
    }

    pub async fn load_from_json(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse JSON config: {}", e)))
    }
}
