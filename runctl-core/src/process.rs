use std::process::Stdio;
use tokio::process::{Child, Command};

/// Exit status of a supervised process.
#[derive(Debug, Clone, Copy)]
pub struct ExitStatus {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitStatus {
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }

    /// Placeholder status when the wait itself failed.
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
impl Signal {
    fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as NixSignal;
        match self {
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        }
    }
}

/// Running OS process belonging to one unit. Cloneable so the monitor task
/// can wait on it while the control loop keeps a handle for signalling.
#[derive(Debug, Clone)]
pub struct ChildProc {
    pub pid: u32,
    pub name: crate::ProcName,
    inner: std::sync::Arc<tokio::sync::Mutex<Child>>,
}

impl ChildProc {
    pub fn new(pid: u32, name: crate::ProcName, child: Child) -> Self {
        Self {
            pid,
            name,
            inner: std::sync::Arc::new(tokio::sync::Mutex::new(child)),
        }
    }

    pub async fn wait(&self) -> crate::Result<ExitStatus> {
        let mut child = self.inner.lock().await;
        let status = child.wait().await?;
        Ok(ExitStatus::from_std(status))
    }

    pub async fn kill(&self) -> crate::Result<()> {
        let mut child = self.inner.lock().await;
        // start_kill rather than kill: the monitor task owns the wait.
        match child.start_kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn signal(&self, signal: Signal) -> crate::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal;
            use nix::unistd::Pid;
            signal::kill(Pid::from_raw(self.pid as i32), signal.to_nix())?;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            // No cooperative termination without unix signals.
            let _ = signal;
            self.kill().await
        }
    }
}

/// Builder for launching one unit's OS process.
pub struct ProcessBuilder {
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<std::path::PathBuf>,
}

impl ProcessBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (k, v) in vars {
            self.env
                .push((k.as_ref().to_string(), v.as_ref().to_string()));
        }
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<std::path::Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub async fn spawn(self) -> crate::Result<Child> {
        // Handle command strings like "poetry run python -m src.bot" when no
        // explicit args were given.
        let (actual_command, mut parsed_args) =
            if self.command.contains(' ') && self.args.is_empty() {
                match shell_words::split(&self.command) {
                    Ok(parts) if !parts.is_empty() => {
                        if let Some(first) = parts.first() {
                            let cmd = first.clone();
                            let args = parts.into_iter().skip(1).collect();
                            (cmd, args)
                        } else {
                            (self.command.clone(), Vec::new())
                        }
                    }
                    _ => (self.command.clone(), Vec::new()),
                }
            } else {
                (self.command.clone(), Vec::new())
            };

        parsed_args.extend(self.args);

        tracing::debug!(
            "Spawning process: command='{}', args={:?}",
            actual_command,
            parsed_args
        );

        let mut cmd = Command::new(&actual_command);
        cmd.args(&parsed_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        for (key, value) in self.env {
            cmd.env(key, value);
        }

        cmd.spawn()
            .map_err(|e| crate::Error::Spawn(format!("{}: {}", actual_command, e)))
    }
}
