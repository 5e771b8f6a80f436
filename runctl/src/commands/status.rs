use crate::cli::StatusArgs;
use crate::common::{connect_to_daemon, render_status_table};
use anyhow::Context;
use runctl_ipc::{Request, Response};

pub async fn execute(args: StatusArgs) -> anyhow::Result<()> {
    let mut client = match connect_to_daemon(args.socket.as_deref()).await {
        Ok(client) => client,
        Err(_) => {
            println!("No daemon running");
            return Ok(());
        }
    };

    let response = client
        .request(&Request::Status)
        .await
        .context("Failed to receive status from daemon")?;

    match response {
        Response::Status { mut procs } => {
            if let Some(name) = &args.name {
                procs.retain(|p| p.name.as_str() == name);
                if procs.is_empty() {
                    return Err(anyhow::anyhow!("no unit named {name}"));
                }
            }

            if args.json {
                println!("{}", serde_json::to_string_pretty(&procs)?);
            } else if procs.is_empty() {
                println!("No units configured");
            } else {
                println!("{}", render_status_table(&procs));
            }
            Ok(())
        }
        Response::Error { message } => Err(anyhow::anyhow!(message)),
        _ => Err(anyhow::anyhow!("unexpected response from daemon")),
    }
}
