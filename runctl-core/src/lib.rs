pub mod config;
pub mod error;
pub mod event;
pub mod policy;
pub mod proc;
pub mod process;
pub mod supervisor;

pub use config::{BackoffConfig, Config, ConfigLoader, DaemonConfig, ProcessSpec};
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use policy::{BackoffCurve, RestartDecision, RestartPolicy};
pub use proc::{ProcHandle, ProcName, ProcState, ProcStatus, StateKind};
pub use process::{ChildProc, ExitStatus, ProcessBuilder, Signal};
pub use supervisor::{ShutdownReport, Supervisor, SupervisorHandle, Target};
