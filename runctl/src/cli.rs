use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runctl")]
#[command(about = "Process supervisor with crash-loop protection", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the supervisor in the foreground
    Run(RunArgs),

    /// Start a unit (or "all")
    Start(StartArgs),

    /// Stop a unit (or "all") with graceful termination
    Stop(StopArgs),

    /// Restart a unit (or "all")
    Restart(RestartArgs),

    /// Show the state of every unit
    Status(StatusArgs),

    /// Stream the supervisor's event feed
    Events(EventsArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Config file to load (auto-discovered when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Control socket path
    #[arg(short, long, env = "RUNCTL_SOCKET")]
    pub socket: Option<PathBuf>,
}

#[derive(Parser)]
pub struct StartArgs {
    /// Unit name or "all"
    pub name: String,

    /// Control socket path
    #[arg(short, long, env = "RUNCTL_SOCKET")]
    pub socket: Option<PathBuf>,
}

#[derive(Parser)]
pub struct StopArgs {
    /// Unit name or "all"
    pub name: String,

    /// Grace period before force-kill (milliseconds, unit default when omitted)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Control socket path
    #[arg(short, long, env = "RUNCTL_SOCKET")]
    pub socket: Option<PathBuf>,
}

#[derive(Parser)]
pub struct RestartArgs {
    /// Unit name or "all"
    pub name: String,

    /// Grace period before force-kill (milliseconds, unit default when omitted)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Control socket path
    #[arg(short, long, env = "RUNCTL_SOCKET")]
    pub socket: Option<PathBuf>,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Unit name (shows all units when omitted)
    pub name: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Control socket path
    #[arg(short, long, env = "RUNCTL_SOCKET")]
    pub socket: Option<PathBuf>,
}

#[derive(Parser)]
pub struct EventsArgs {
    /// Output as JSON lines
    #[arg(short, long)]
    pub json: bool,

    /// Control socket path
    #[arg(short, long, env = "RUNCTL_SOCKET")]
    pub socket: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::parse_from(["runctl", "run"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, None);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_run_with_config() {
        let cli = Cli::parse_from(["runctl", "run", "--config", "pm2.config.json"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("pm2.config.json")));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_start() {
        let cli = Cli::parse_from(["runctl", "start", "issue-reporting-api"]);
        match cli.command {
            Command::Start(args) => {
                assert_eq!(args.name, "issue-reporting-api");
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_cli_stop_defaults() {
        let cli = Cli::parse_from(["runctl", "stop", "all"]);
        match cli.command {
            Command::Stop(args) => {
                assert_eq!(args.name, "all");
                assert_eq!(args.timeout, None);
            }
            _ => panic!("Expected Stop command"),
        }
    }

    #[test]
    fn test_cli_stop_with_timeout() {
        let cli = Cli::parse_from(["runctl", "stop", "myapp", "--timeout", "3000"]);
        match cli.command {
            Command::Stop(args) => {
                assert_eq!(args.name, "myapp");
                assert_eq!(args.timeout, Some(3000));
            }
            _ => panic!("Expected Stop command"),
        }
    }

    #[test]
    fn test_cli_status_no_args() {
        let cli = Cli::parse_from(["runctl", "status"]);
        match cli.command {
            Command::Status(args) => {
                assert_eq!(args.name, None);
                assert!(!args.json);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_status_json() {
        let cli = Cli::parse_from(["runctl", "status", "--json", "myapp"]);
        match cli.command {
            Command::Status(args) => {
                assert_eq!(args.name, Some("myapp".to_string()));
                assert!(args.json);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_events() {
        let cli = Cli::parse_from(["runctl", "events", "--json"]);
        match cli.command {
            Command::Events(args) => assert!(args.json),
            _ => panic!("Expected Events command"),
        }
    }
}
