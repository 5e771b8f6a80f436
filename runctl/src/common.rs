use colored::Colorize;
use once_cell::sync::Lazy;
use runctl_core::{ProcStatus, StateKind};
use runctl_ipc::IpcClient;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled, settings::Style};

static DEFAULT_SOCKET: Lazy<PathBuf> = Lazy::new(|| PathBuf::from("/tmp/runctl.sock"));

pub fn socket_path(override_path: Option<&Path>) -> PathBuf {
    override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| DEFAULT_SOCKET.clone())
}

pub async fn connect_to_daemon(socket: Option<&Path>) -> runctl_core::Result<IpcClient> {
    IpcClient::connect(socket_path(socket)).await
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "pid")]
    pid: String,
    #[tabled(rename = "restarts")]
    restarts: u32,
    #[tabled(rename = "exit code")]
    exit_code: String,
    #[tabled(rename = "uptime")]
    uptime: String,
}

fn paint_state(state: StateKind) -> String {
    let label = state.to_string();
    match state {
        StateKind::Running => label.green().to_string(),
        StateKind::Starting | StateKind::Stopping | StateKind::Backoff => {
            label.yellow().to_string()
        }
        StateKind::Crashed | StateKind::GivenUp => label.red().to_string(),
        StateKind::Stopped => label.dimmed().to_string(),
    }
}

fn format_uptime(ms: Option<u64>) -> String {
    match ms {
        None => "-".to_string(),
        Some(ms) if ms < 1000 => format!("{ms}ms"),
        Some(ms) if ms < 60_000 => format!("{}s", ms / 1000),
        Some(ms) if ms < 3_600_000 => format!("{}m{}s", ms / 60_000, (ms % 60_000) / 1000),
        Some(ms) => format!("{}h{}m", ms / 3_600_000, (ms % 3_600_000) / 60_000),
    }
}

pub fn render_status_table(procs: &[ProcStatus]) -> String {
    let rows: Vec<StatusRow> = procs
        .iter()
        .map(|p| StatusRow {
            name: p.name.to_string(),
            state: paint_state(p.state),
            pid: p.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".into()),
            restarts: p.restart_count,
            exit_code: p
                .last_exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".into()),
            uptime: format_uptime(p.uptime_ms),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}
