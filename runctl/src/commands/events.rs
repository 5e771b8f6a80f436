use crate::cli::EventsArgs;
use crate::common::connect_to_daemon;
use anyhow::Context;
use chrono::Local;
use runctl_ipc::{Request, Response};

pub async fn execute(args: EventsArgs) -> anyhow::Result<()> {
    let mut client = connect_to_daemon(args.socket.as_deref())
        .await
        .context("Failed to connect to daemon (is `runctl run` running?)")?;

    client
        .send(&Request::Subscribe)
        .await
        .context("Failed to subscribe to events")?;

    // First frame acknowledges the subscription.
    match client.recv().await? {
        Response::Ok { .. } => {}
        Response::Error { message } => return Err(anyhow::anyhow!(message)),
        _ => return Err(anyhow::anyhow!("unexpected response from daemon")),
    }

    loop {
        let response = match client.recv().await {
            Ok(response) => response,
            // Daemon shut down, the stream just ends.
            Err(_) => return Ok(()),
        };

        match response {
            Response::Event { event } => {
                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    let at = event.at.with_timezone(&Local).format("%H:%M:%S");
                    println!("{at} {} {}", event.name, event.kind);
                }
            }
            Response::Error { message } => return Err(anyhow::anyhow!(message)),
            _ => {}
        }
    }
}
