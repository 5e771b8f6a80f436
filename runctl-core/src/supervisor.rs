use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::event::{Event, EventKind};
use crate::policy::RestartDecision;
use crate::proc::{ProcHandle, ProcState, ProcStatus};
use crate::process::{ChildProc, ExitStatus, ProcessBuilder, Signal};
use crate::{Error, ProcName, Result};

/// Addressing for start/stop commands: one unit or every unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    One(ProcName),
}

impl Target {
    pub fn parse(s: &str) -> Result<Self> {
        if s == "all" {
            Ok(Self::All)
        } else {
            Ok(Self::One(ProcName::new(s)?))
        }
    }
}

/// Result of a whole-supervisor shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Units that had exhausted their restart budget.
    pub gave_up: Vec<ProcName>,
}

impl ShutdownReport {
    pub fn clean(&self) -> bool {
        self.gave_up.is_empty()
    }
}

enum Command {
    Start {
        name: ProcName,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        name: ProcName,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<ShutdownReport>,
    },
}

/// Asynchronous notifications flowing back into the control loop. Each one
/// carries the generation it belongs to; notices from a superseded run of a
/// unit are discarded.
enum Notice {
    Exited {
        name: ProcName,
        generation: u64,
        status: ExitStatus,
    },
    SpawnFailed {
        name: ProcName,
        generation: u64,
    },
    RestartDue {
        name: ProcName,
        generation: u64,
    },
    StopDeadline {
        name: ProcName,
        generation: u64,
    },
}

struct Slot {
    handle: Arc<ProcHandle>,
    generation: u64,
    child: Option<ChildProc>,
    stop_waiters: Vec<oneshot::Sender<Result<()>>>,
}

/// Cloneable front door to a running supervisor. Status reads go straight to
/// the shared snapshot table; everything that mutates goes through the
/// control loop.
#[derive(Clone)]
pub struct SupervisorHandle {
    cmd_tx: mpsc::Sender<Command>,
    procs: Arc<DashMap<ProcName, Arc<ProcHandle>>>,
    events: broadcast::Sender<Event>,
}

fn loop_gone() -> Error {
    Error::Supervisor("control loop is not running".into())
}

impl SupervisorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn status(&self) -> Vec<ProcStatus> {
        let mut all: Vec<_> = self.procs.iter().map(|entry| entry.value().status()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn names(&self) -> Vec<ProcName> {
        let mut names: Vec<_> = self.procs.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn start(&self, target: Target) -> Result<()> {
        match target {
            Target::One(name) => self.start_one(name).await,
            Target::All => {
                let mut failed = Vec::new();
                for name in self.names() {
                    if let Err(e) = self.start_one(name.clone()).await {
                        warn!("failed to start {}: {}", name, e);
                        failed.push(format!("{name}: {e}"));
                    }
                }
                if failed.is_empty() {
                    Ok(())
                } else {
                    Err(Error::Supervisor(format!(
                        "failed to start: {}",
                        failed.join("; ")
                    )))
                }
            }
        }
    }

    async fn start_one(&self, name: ProcName) -> Result<()> {
        if !self.procs.contains_key(&name) {
            return Err(Error::ProcessNotFound(name.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Start { name, reply: tx })
            .await
            .map_err(|_| loop_gone())?;
        rx.await.map_err(|_| loop_gone())?
    }

    /// Stop a unit (or all units), waiting until termination is confirmed.
    /// The wait is bounded: graceful signal first, force-kill at the timeout
    /// (the spec's kill_timeout unless overridden).
    pub async fn stop(&self, target: Target, timeout: Option<Duration>) -> Result<()> {
        match target {
            Target::One(name) => self.stop_one(name, timeout).await,
            Target::All => {
                // Each unit gets its own timeout budget, running in parallel.
                let mut tasks = Vec::new();
                for name in self.names() {
                    let this = self.clone();
                    tasks.push(tokio::spawn(
                        async move { this.stop_one(name, timeout).await },
                    ));
                }
                for task in tasks {
                    task.await.map_err(|e| Error::Supervisor(e.to_string()))??;
                }
                Ok(())
            }
        }
    }

    async fn stop_one(&self, name: ProcName, timeout: Option<Duration>) -> Result<()> {
        if !self.procs.contains_key(&name) {
            return Err(Error::ProcessNotFound(name.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stop {
                name,
                timeout,
                reply: tx,
            })
            .await
            .map_err(|_| loop_gone())?;
        rx.await.map_err(|_| loop_gone())?
    }

    pub async fn restart(&self, target: Target, timeout: Option<Duration>) -> Result<()> {
        self.stop(target.clone(), timeout).await?;
        self.start(target).await
    }

    /// Terminate every unit concurrently and wind down the control loop.
    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { reply: tx })
            .await
            .map_err(|_| loop_gone())?;
        rx.await.map_err(|_| loop_gone())
    }
}

/// The restart-policy engine. One control loop owns all lifecycle decisions;
/// OS processes run in parallel, decisions are serialized here.
pub struct Supervisor {
    slots: HashMap<ProcName, Slot>,
    cmd_rx: mpsc::Receiver<Command>,
    notice_rx: mpsc::Receiver<Notice>,
    notice_tx: mpsc::Sender<Notice>,
    events: broadcast::Sender<Event>,
    shutdown_reply: Option<oneshot::Sender<ShutdownReport>>,
    done: bool,
}

impl Supervisor {
    pub fn new(config: &Config) -> Result<(Self, SupervisorHandle)> {
        config.validate()?;

        let procs = Arc::new(DashMap::new());
        let mut slots = HashMap::new();
        for spec in &config.apps {
            let spec = Arc::new(spec.clone());
            let handle = Arc::new(ProcHandle::new(spec.name.clone(), spec));
            procs.insert(handle.name.clone(), handle.clone());
            slots.insert(
                handle.name.clone(),
                Slot {
                    handle,
                    generation: 0,
                    child: None,
                    stop_waiters: Vec::new(),
                },
            );
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (notice_tx, notice_rx) = mpsc::channel(256);
        let (events, _) = broadcast::channel(256);

        let handle = SupervisorHandle {
            cmd_tx,
            procs,
            events: events.clone(),
        };

        Ok((
            Self {
                slots,
                cmd_rx,
                notice_rx,
                notice_tx,
                events,
                shutdown_reply: None,
                done: false,
            },
            handle,
        ))
    }

    pub async fn run(mut self) {
        while !self.done {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Every handle dropped; children are reaped via kill_on_drop.
                    None => break,
                },
                Some(notice) = self.notice_rx.recv() => self.handle_notice(notice).await,
            }
        }
        debug!("supervisor control loop stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { name, reply } => {
                let result = self.start_unit(&name).await;
                let _ = reply.send(result);
            }
            Command::Stop {
                name,
                timeout,
                reply,
            } => self.stop_unit(&name, timeout, reply).await,
            Command::Shutdown { reply } => self.begin_shutdown(reply).await,
        }
    }

    async fn handle_notice(&mut self, notice: Notice) {
        match notice {
            Notice::Exited {
                name,
                generation,
                status,
            } => self.handle_exit(&name, generation, status).await,
            Notice::SpawnFailed { name, generation } => {
                if !self.generation_current(&name, generation) {
                    return;
                }
                if self.shutdown_reply.is_some() {
                    self.mark_stopped(&name);
                    return;
                }
                self.apply_policy(&name, generation, Duration::ZERO).await;
            }
            Notice::RestartDue { name, generation } => {
                let due = self.slots.get(&name).is_some_and(|slot| {
                    slot.generation == generation
                        && matches!(slot.handle.state(), ProcState::Backoff { .. })
                });
                if due {
                    if let Err(e) = self.spawn_unit(&name).await {
                        debug!("scheduled restart of {} failed: {}", name, e);
                    }
                }
            }
            Notice::StopDeadline { name, generation } => {
                let child = match self.slots.get(&name) {
                    Some(slot)
                        if slot.generation == generation
                            && slot.handle.state() == ProcState::Stopping =>
                    {
                        slot.child.clone()
                    }
                    _ => return,
                };
                warn!("{} did not exit within grace period, killing", name);
                if let Some(child) = child {
                    if let Err(e) = child.kill().await {
                        error!("failed to kill {}: {}", name, e);
                    }
                }
            }
        }
    }

    fn generation_current(&self, name: &ProcName, generation: u64) -> bool {
        self.slots
            .get(name)
            .is_some_and(|slot| slot.generation == generation)
    }

    async fn start_unit(&mut self, name: &ProcName) -> Result<()> {
        let handle = match self.slots.get(name) {
            Some(slot) => slot.handle.clone(),
            None => return Err(Error::ProcessNotFound(name.to_string())),
        };
        match handle.state() {
            ProcState::Running
            | ProcState::Starting
            | ProcState::Stopping
            | ProcState::Backoff { .. } => {
                warn!("{} is already active, ignoring start", name);
                Ok(())
            }
            ProcState::Stopped | ProcState::Crashed | ProcState::GivenUp => {
                // An explicit start grants a fresh restart budget.
                handle.reset_restart_count();
                self.spawn_unit(name).await
            }
        }
    }

    async fn spawn_unit(&mut self, name: &ProcName) -> Result<()> {
        let (handle, generation) = {
            let slot = self
                .slots
                .get_mut(name)
                .ok_or_else(|| Error::ProcessNotFound(name.to_string()))?;
            slot.generation += 1;
            slot.child = None;
            (slot.handle.clone(), slot.generation)
        };
        let spec = handle.spec.clone();

        handle.set_state(ProcState::Starting);
        let mut builder = ProcessBuilder::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env);
        if let Some(cwd) = &spec.cwd {
            builder = builder.current_dir(cwd);
        }

        match builder.spawn().await {
            Ok(child) => {
                let pid = child.id().unwrap_or(0);
                let child = ChildProc::new(pid, name.clone(), child);
                handle.set_pid(Some(pid));
                handle.set_state(ProcState::Running);
                if let Some(slot) = self.slots.get_mut(name) {
                    slot.child = Some(child.clone());
                }
                info!("started {} (pid {})", name, pid);
                self.emit(name, EventKind::Spawned { pid });

                let notice_tx = self.notice_tx.clone();
                let monitor_name = name.clone();
                tokio::spawn(async move {
                    let status = match child.wait().await {
                        Ok(status) => status,
                        Err(e) => {
                            error!("failed to wait for {}: {}", monitor_name, e);
                            ExitStatus::unknown()
                        }
                    };
                    let _ = notice_tx
                        .send(Notice::Exited {
                            name: monitor_name,
                            generation,
                            status,
                        })
                        .await;
                });
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("failed to spawn {}: {}", name, reason);
                handle.set_pid(None);
                handle.set_state(ProcState::Crashed);
                self.emit(
                    name,
                    EventKind::SpawnFailed {
                        reason: reason.clone(),
                    },
                );
                // A spawn failure follows the restart policy like a crash
                // with zero uptime. Queued as a notice so the decision runs
                // on a clean stack.
                let _ = self
                    .notice_tx
                    .send(Notice::SpawnFailed {
                        name: name.clone(),
                        generation,
                    })
                    .await;
                Err(Error::Spawn(reason))
            }
        }
    }

    async fn handle_exit(&mut self, name: &ProcName, generation: u64, status: ExitStatus) {
        let (handle, uptime) = {
            let Some(slot) = self.slots.get_mut(name) else {
                return;
            };
            if slot.generation != generation {
                debug!("stale exit notice for {}", name);
                return;
            }
            slot.child = None;
            let handle = slot.handle.clone();
            let uptime = handle.uptime().unwrap_or_default();
            (handle, uptime)
        };

        handle.set_last_exit_code(status.code());
        handle.set_pid(None);
        let was_stopping = handle.state() == ProcState::Stopping;

        info!(
            "{} exited (code {:?}, signal {:?}) after {:?}",
            name,
            status.code(),
            status.signal(),
            uptime
        );
        self.emit(
            name,
            EventKind::Exited {
                code: status.code(),
                signal: status.signal(),
                uptime_ms: uptime.as_millis() as u64,
            },
        );

        if was_stopping || self.shutdown_reply.is_some() {
            // Termination was requested; no restart decision to make.
            self.mark_stopped(name);
            return;
        }

        handle.set_state(ProcState::Crashed);
        self.apply_policy(name, generation, uptime).await;
    }

    async fn apply_policy(&mut self, name: &ProcName, generation: u64, uptime: Duration) {
        let handle = match self.slots.get(name) {
            Some(slot) if slot.generation == generation => slot.handle.clone(),
            _ => return,
        };
        let policy = handle.spec.restart_policy();

        match policy.decide(handle.restart_count(), uptime) {
            RestartDecision::RestartNow => {
                // The previous run was stable: the crash-loop counter resets.
                handle.reset_restart_count();
                if let Err(e) = self.spawn_unit(name).await {
                    debug!("respawn of {} failed: {}", name, e);
                }
            }
            RestartDecision::RestartAfterDelay(delay) => {
                let attempt = handle.increment_restart_count();
                handle.set_state(ProcState::Backoff {
                    attempt,
                    until: Instant::now() + delay,
                });
                info!("restart {} of {} scheduled in {:?}", attempt, name, delay);
                self.emit(
                    name,
                    EventKind::RestartScheduled {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    },
                );
                let notice_tx = self.notice_tx.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = notice_tx.send(Notice::RestartDue { name, generation }).await;
                });
            }
            RestartDecision::GiveUp => {
                handle.set_state(ProcState::GivenUp);
                warn!("{}: restart budget exhausted, giving up", name);
                self.emit(name, EventKind::GivenUp);
                self.maybe_finish_shutdown();
            }
        }
    }

    async fn stop_unit(
        &mut self,
        name: &ProcName,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let Some(slot) = self.slots.get_mut(name) else {
            let _ = reply.send(Err(Error::ProcessNotFound(name.to_string())));
            return;
        };
        let handle = slot.handle.clone();

        match handle.state() {
            // Stopping an already-down unit is a no-op, not an error. A
            // crashed unit may still have a spawn-failure notice in flight;
            // bumping the generation discards it so no restart gets
            // scheduled after the stop.
            ProcState::Stopped | ProcState::Crashed | ProcState::GivenUp => {
                slot.generation += 1;
                let _ = reply.send(Ok(()));
            }
            ProcState::Backoff { .. } => {
                slot.generation += 1;
                handle.set_state(ProcState::Stopped);
                info!("cancelled pending restart of {}", name);
                let _ = reply.send(Ok(()));
                self.maybe_finish_shutdown();
            }
            ProcState::Stopping => {
                slot.stop_waiters.push(reply);
            }
            ProcState::Starting | ProcState::Running => {
                let Some(child) = slot.child.clone() else {
                    // The spawn never produced a child; nothing to signal.
                    slot.generation += 1;
                    handle.set_state(ProcState::Stopped);
                    let _ = reply.send(Ok(()));
                    self.maybe_finish_shutdown();
                    return;
                };
                handle.set_state(ProcState::Stopping);
                slot.stop_waiters.push(reply);
                let generation = slot.generation;
                let grace = timeout.unwrap_or(handle.spec.kill_timeout);
                info!("stopping {} (pid {}, grace {:?})", name, child.pid, grace);
                if let Err(e) = child.signal(Signal::Terminate).await {
                    warn!("failed to signal {}: {}", name, e);
                }
                let notice_tx = self.notice_tx.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let _ = notice_tx
                        .send(Notice::StopDeadline { name, generation })
                        .await;
                });
            }
        }
    }

    async fn begin_shutdown(&mut self, reply: oneshot::Sender<ShutdownReport>) {
        if self.shutdown_reply.is_some() {
            drop(reply);
            return;
        }
        info!("supervisor shutting down");
        self.shutdown_reply = Some(reply);

        let names: Vec<ProcName> = self.slots.keys().cloned().collect();
        for name in names {
            // Fire-and-forget stops; completion is tracked through states.
            let (tx, _rx) = oneshot::channel();
            self.stop_unit(&name, None, tx).await;
        }
        self.maybe_finish_shutdown();
    }

    fn mark_stopped(&mut self, name: &ProcName) {
        let waiters = {
            let Some(slot) = self.slots.get_mut(name) else {
                return;
            };
            slot.handle.set_state(ProcState::Stopped);
            std::mem::take(&mut slot.stop_waiters)
        };
        info!("{} stopped", name);
        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }
        self.maybe_finish_shutdown();
    }

    fn maybe_finish_shutdown(&mut self) {
        if self.shutdown_reply.is_none() {
            return;
        }
        let all_down = self.slots.values().all(|slot| slot.handle.state().is_down());
        if !all_down {
            return;
        }
        let gave_up = self
            .slots
            .values()
            .filter(|slot| slot.handle.state() == ProcState::GivenUp)
            .map(|slot| slot.handle.name.clone())
            .collect();
        if let Some(reply) = self.shutdown_reply.take() {
            let _ = reply.send(ShutdownReport { gave_up });
        }
        self.done = true;
    }

    fn emit(&self, name: &ProcName, kind: EventKind) {
        // No subscribers is fine; the feed is best-effort.
        let _ = self.events.send(Event::now(name.clone(), kind));
    }
}
