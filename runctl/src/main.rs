mod cli;
mod commands;
mod common;
mod daemon;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Run(args) => daemon::run(args).await,
        cli::Command::Start(args) => commands::start::execute(args).await,
        cli::Command::Stop(args) => commands::stop::execute(args).await,
        cli::Command::Restart(args) => commands::restart::execute(args).await,
        cli::Command::Status(args) => commands::status::execute(args).await,
        cli::Command::Events(args) => commands::events::execute(args).await,
    }
}
