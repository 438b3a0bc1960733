use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt as _};

/// One newline-delimited JSON frame on stdout, flushed immediately.
pub async fn write_frame<W, T>(out: &mut W, v: &T) -> eyre::Result<()>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize + Sync,
{
    let mut line = serde_json::to_vec(v)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}
