use runctl_core::{ConfigLoader, Supervisor, SupervisorHandle, Target};
use runctl_ipc::{IpcServer, Request, Response, recv_frame, send_frame};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::cli::RunArgs;

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let loader = ConfigLoader::new();
    let config = match &args.config {
        Some(path) => loader.load_file(path).await?,
        None => loader.load().await?,
    };

    if config.apps.is_empty() {
        warn!("no units configured");
    }

    let socket = args
        .socket
        .clone()
        .unwrap_or_else(|| config.daemon.socket_path.clone());

    let (supervisor, handle) = Supervisor::new(&config)?;
    let loop_task = tokio::spawn(supervisor.run());

    for spec in &config.apps {
        if spec.autostart
            && let Err(e) = handle.start(Target::One(spec.name.clone())).await
        {
            // Reported, not fatal: the unit keeps following its restart
            // policy and the others are unaffected.
            error!("failed to start {}: {}", spec.name, e);
        }
    }

    let server = IpcServer::bind(&socket)?;
    info!("runctl listening on {}", socket.display());

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    setup_signal_handlers(shutdown_tx.clone());

    loop {
        tokio::select! {
            conn = server.accept() => match conn {
                Ok(stream) => {
                    let handle = handle.clone();
                    let shutdown_tx = shutdown_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, handle, shutdown_tx).await {
                            warn!("client connection error: {}", e);
                        }
                    });
                }
                Err(e) => error!("accept failed: {}", e),
            },
            _ = shutdown_rx.recv() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let report = handle.shutdown().await?;
    let _ = loop_task.await;
    let _ = std::fs::remove_file(&socket);

    if report.clean() {
        info!("shutdown complete");
        Ok(())
    } else {
        let names = report
            .gave_up
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!("shut down with units in given-up state: {names}")
    }
}

async fn serve_connection(
    mut stream: UnixStream,
    handle: SupervisorHandle,
    shutdown_tx: mpsc::Sender<()>,
) -> runctl_core::Result<()> {
    loop {
        let request: Request = match recv_frame(&mut stream).await {
            Ok(request) => request,
            Err(runctl_core::Error::Io(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match request {
            Request::Start { name } => {
                let response = match Target::parse(&name) {
                    Ok(target) => match handle.start(target).await {
                        Ok(()) => Response::Ok {
                            message: format!("started {name}"),
                        },
                        Err(e) => Response::Error {
                            message: e.to_string(),
                        },
                    },
                    Err(e) => Response::Error {
                        message: e.to_string(),
                    },
                };
                send_frame(&mut stream, &response).await?;
            }
            Request::Stop { name, timeout_ms } => {
                let timeout = timeout_ms.map(Duration::from_millis);
                let response = match Target::parse(&name) {
                    Ok(target) => match handle.stop(target, timeout).await {
                        Ok(()) => Response::Ok {
                            message: format!("stopped {name}"),
                        },
                        Err(e) => Response::Error {
                            message: e.to_string(),
                        },
                    },
                    Err(e) => Response::Error {
                        message: e.to_string(),
                    },
                };
                send_frame(&mut stream, &response).await?;
            }
            Request::Restart { name, timeout_ms } => {
                let timeout = timeout_ms.map(Duration::from_millis);
                let response = match Target::parse(&name) {
                    Ok(target) => match handle.restart(target, timeout).await {
                        Ok(()) => Response::Ok {
                            message: format!("restarted {name}"),
                        },
                        Err(e) => Response::Error {
                            message: e.to_string(),
                        },
                    },
                    Err(e) => Response::Error {
                        message: e.to_string(),
                    },
                };
                send_frame(&mut stream, &response).await?;
            }
            Request::Status => {
                send_frame(
                    &mut stream,
                    &Response::Status {
                        procs: handle.status(),
                    },
                )
                .await?;
            }
            Request::Subscribe => {
                let mut events = handle.subscribe();
                send_frame(
                    &mut stream,
                    &Response::Ok {
                        message: "subscribed".into(),
                    },
                )
                .await?;
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if send_frame(&mut stream, &Response::Event { event })
                                .await
                                .is_err()
                            {
                                // Client went away.
                                return Ok(());
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("event subscriber lagging, {} events dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }
            }
            Request::Shutdown => {
                send_frame(
                    &mut stream,
                    &Response::Ok {
                        message: "shutting down".into(),
                    },
                )
                .await?;
                let _ = shutdown_tx.send(()).await;
                return Ok(());
            }
        }
    }
}

fn setup_signal_handlers(shutdown_tx: mpsc::Sender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        tokio::spawn(async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    error!("failed to install SIGINT handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM");
                }
                _ = sigint.recv() => {
                    info!("received SIGINT");
                }
            }

            let _ = shutdown_tx.send(()).await;
        });
    }
    #[cfg(not(unix))]
    {
        let _ = shutdown_tx;
    }
}
