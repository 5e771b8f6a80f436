use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProcName;

/// One entry in the supervisor's observable event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: ProcName,
    #[serde(flatten)]
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn now(name: ProcName, kind: EventKind) -> Self {
        Self {
            name,
            kind,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventKind {
    Spawned {
        pid: u32,
    },
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
        uptime_ms: u64,
    },
    SpawnFailed {
        reason: String,
    },
    RestartScheduled {
        attempt: u32,
        delay_ms: u64,
    },
    GivenUp,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawned { pid } => write!(f, "spawned (pid {pid})"),
            Self::Exited {
                code,
                signal,
                uptime_ms,
            } => match (code, signal) {
                (Some(c), _) => write!(f, "exited with code {c} after {uptime_ms}ms"),
                (None, Some(s)) => write!(f, "killed by signal {s} after {uptime_ms}ms"),
                (None, None) => write!(f, "exited after {uptime_ms}ms"),
            },
            Self::SpawnFailed { reason } => write!(f, "spawn failed: {reason}"),
            Self::RestartScheduled { attempt, delay_ms } => {
                write!(f, "restart {attempt} scheduled in {delay_ms}ms")
            }
            Self::GivenUp => write!(f, "gave up: restart budget exhausted"),
        }
    }
}
