use crate::{Request, Response, recv_frame, send_frame};
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};

pub struct IpcServer {
    listener: UnixListener,
}

impl IpcServer {
    pub fn bind(path: impl AsRef<Path>) -> runctl_core::Result<Self> {
        let path = path.as_ref();
        // A previous daemon may have left its socket behind.
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> runctl_core::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }
}

pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    pub async fn connect(path: impl AsRef<Path>) -> runctl_core::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, msg: &Request) -> runctl_core::Result<()> {
        send_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> runctl_core::Result<Response> {
        recv_frame(&mut self.stream).await
    }

    pub async fn request(&mut self, msg: &Request) -> runctl_core::Result<Response> {
        self.send(msg).await?;
        self.recv().await
    }
}
