use crate::cli::RestartArgs;
use crate::common::connect_to_daemon;
use anyhow::Context;
use runctl_ipc::{Request, Response};

pub async fn execute(args: RestartArgs) -> anyhow::Result<()> {
    let mut client = connect_to_daemon(args.socket.as_deref())
        .await
        .context("Failed to connect to daemon (is `runctl run` running?)")?;

    let response = client
        .request(&Request::Restart {
            name: args.name.clone(),
            timeout_ms: args.timeout,
        })
        .await
        .context("Failed to talk to daemon")?;

    match response {
        Response::Ok { message } => {
            println!("✔ {message}");
            Ok(())
        }
        Response::Error { message } => Err(anyhow::anyhow!(message)),
        _ => Err(anyhow::anyhow!("unexpected response from daemon")),
    }
}
