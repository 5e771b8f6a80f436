#![cfg(unix)]

use runctl_ipc::{IpcClient, IpcServer, Request, Response, recv_frame, send_frame};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_request_response_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("runctl.sock");

    let server = IpcServer::bind(&socket).unwrap();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await.unwrap();
        let request: Request = recv_frame(&mut conn).await.unwrap();
        match request {
            Request::Stop { name, timeout_ms } => {
                assert_eq!(name, "issue-reporting-api");
                assert_eq!(timeout_ms, Some(3000));
            }
            other => panic!("unexpected request {other:?}"),
        }
        send_frame(
            &mut conn,
            &Response::Ok {
                message: "stopped".into(),
            },
        )
        .await
        .unwrap();
    });

    let mut client = IpcClient::connect(&socket).await.unwrap();
    let response = client
        .request(&Request::Stop {
            name: "issue-reporting-api".into(),
            timeout_ms: Some(3000),
        })
        .await
        .unwrap();
    match response {
        Response::Ok { message } => assert_eq!(message, "stopped"),
        other => panic!("unexpected response {other:?}"),
    }

    server_task.await.unwrap();
}

#[tokio::test]
async fn test_status_frame_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("runctl.sock");

    let server = IpcServer::bind(&socket).unwrap();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await.unwrap();
        let _request: Request = recv_frame(&mut conn).await.unwrap();
        send_frame(&mut conn, &Response::Status { procs: Vec::new() })
            .await
            .unwrap();
    });

    let mut client = IpcClient::connect(&socket).await.unwrap();
    let response = client.request(&Request::Status).await.unwrap();
    assert!(matches!(response, Response::Status { procs } if procs.is_empty()));

    server_task.await.unwrap();
}

#[tokio::test]
async fn test_oversized_frame_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("runctl.sock");

    let server = IpcServer::bind(&socket).unwrap();
    let server_task = tokio::spawn(async move {
        let mut conn = server.accept().await.unwrap();
        let result: runctl_core::Result<Request> = recv_frame(&mut conn).await;
        assert!(result.is_err());
    });

    let mut raw = tokio::net::UnixStream::connect(&socket).await.unwrap();
    // Claim a frame far beyond the limit without sending a body.
    raw.write_u32(u32::MAX).await.unwrap();
    raw.flush().await.unwrap();

    server_task.await.unwrap();
}

#[tokio::test]
async fn test_bind_replaces_stale_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("runctl.sock");

    let first = IpcServer::bind(&socket).unwrap();
    drop(first);
    // The socket file is still on disk; a new bind must take it over.
    assert!(socket.exists());
    IpcServer::bind(&socket).unwrap();
}
