#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{IpcClient, IpcServer};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use runctl_core::{Event, ProcStatus};

/// Upper bound on a single control frame. Requests and status snapshots are
/// small; anything larger is a corrupt or hostile peer.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Start { name: String },
    Stop { name: String, timeout_ms: Option<u64> },
    Restart { name: String, timeout_ms: Option<u64> },
    Status,
    Subscribe,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok { message: String },
    Error { message: String },
    Status { procs: Vec<ProcStatus> },
    Event { event: Event },
}

/// Write one u32-length-prefixed JSON frame.
pub async fn send_frame<W, T>(writer: &mut W, msg: &T) -> runctl_core::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serde_json::to_vec(msg)?;
    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one u32-length-prefixed JSON frame.
pub async fn recv_frame<R, T>(reader: &mut R) -> runctl_core::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(runctl_core::Error::Supervisor(format!(
            "IPC frame of {len} bytes exceeds limit"
        )));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}
