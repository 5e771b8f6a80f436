use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ProcessSpec;

/// Sanitized unit identifier, unique within a supervisor.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ProcName(String);

impl ProcName {
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        let sanitized = Self::sanitize(&name);
        if sanitized.is_empty() {
            return Err(crate::Error::InvalidProcName(name));
        }
        Ok(Self(sanitized))
    }

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect::<String>()
            .trim_matches('-')
            .to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Backoff { attempt: u32, until: Instant },
    GivenUp,
}

impl ProcState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_down(&self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed | Self::GivenUp)
    }

    pub fn kind(&self) -> StateKind {
        match self {
            Self::Stopped => StateKind::Stopped,
            Self::Starting => StateKind::Starting,
            Self::Running => StateKind::Running,
            Self::Stopping => StateKind::Stopping,
            Self::Crashed => StateKind::Crashed,
            Self::Backoff { .. } => StateKind::Backoff,
            Self::GivenUp => StateKind::GivenUp,
        }
    }
}

/// Serializable mirror of [`ProcState`] for status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateKind {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
    Backoff,
    GivenUp,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Crashed => "crashed",
            Self::Backoff => "backoff",
            Self::GivenUp => "given-up",
        };
        write!(f, "{s}")
    }
}

/// Runtime record for one unit. Mutated only by the supervisor control loop;
/// everyone else reads snapshots.
#[derive(Debug)]
pub struct ProcHandle {
    pub name: ProcName,
    pub spec: Arc<ProcessSpec>,
    state: RwLock<ProcState>,
    pid: RwLock<Option<u32>>,
    started_at: RwLock<Option<Instant>>,
    restart_count: RwLock<u32>,
    last_exit_code: RwLock<Option<i32>>,
}

impl ProcHandle {
    pub fn new(name: ProcName, spec: Arc<ProcessSpec>) -> Self {
        Self {
            name,
            spec,
            state: RwLock::new(ProcState::Stopped),
            pid: RwLock::new(None),
            started_at: RwLock::new(None),
            restart_count: RwLock::new(0),
            last_exit_code: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ProcState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ProcState) {
        *self.state.write() = state;
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.read()
    }

    pub fn set_pid(&self, pid: Option<u32>) {
        *self.pid.write() = pid;
        *self.started_at.write() = pid.map(|_| Instant::now());
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.read().map(|t| t.elapsed())
    }

    pub fn restart_count(&self) -> u32 {
        *self.restart_count.read()
    }

    pub fn increment_restart_count(&self) -> u32 {
        let mut count = self.restart_count.write();
        *count += 1;
        *count
    }

    pub fn reset_restart_count(&self) {
        *self.restart_count.write() = 0;
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        *self.last_exit_code.read()
    }

    pub fn set_last_exit_code(&self, code: Option<i32>) {
        *self.last_exit_code.write() = code;
    }

    pub fn status(&self) -> ProcStatus {
        let state = self.state();
        ProcStatus {
            name: self.name.clone(),
            state: state.kind(),
            pid: self.pid(),
            restart_count: self.restart_count(),
            last_exit_code: self.last_exit_code(),
            uptime_ms: if state.is_running() {
                self.uptime().map(|d| d.as_millis() as u64)
            } else {
                None
            },
            next_restart_ms: match state {
                ProcState::Backoff { until, .. } => {
                    Some(until.saturating_duration_since(Instant::now()).as_millis() as u64)
                }
                _ => None,
            },
        }
    }
}

/// Point-in-time view of one unit, safe to ship over IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcStatus {
    pub name: ProcName,
    pub state: StateKind,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
    pub uptime_ms: Option<u64>,
    /// Time until the next scheduled restart, present only in backoff.
    pub next_restart_ms: Option<u64>,
}
