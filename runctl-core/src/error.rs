use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Process spawn failed: {0}")]
    Spawn(String),

    #[error("Process {0} not found")]
    ProcessNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid process name: {0}")]
    InvalidProcName(String),

    #[error("Process {0} already defined")]
    DuplicateProc(String),

    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[cfg(unix)]
    #[error("Unix error: {0}")]
    Unix(#[from] nix::errno::Errno),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
