//! UDS server: newline-delimited JSON.
//!
//! The first line decides what a connection is. A panel request (tagged
//! by `"name"`) opens a long-lived panel port: relay messages stream back
//! as JSON lines and further panel requests may follow; EOF releases the
//! subscription. Anything else is a one-shot submission answered with a
//! single `Ack` line.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};

use hxdbg_core::types::{PanelRequest, Submission};

use crate::channel::SocketChannel;
use crate::relay_loop::RelayHandle;

/// What the first line of a connection asked for.
#[derive(Debug)]
pub(crate) enum Opening {
    Panel(PanelRequest),
    Submit(Submission),
}

pub(crate) fn parse_opening(line: &str) -> Result<Opening, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("name").is_some() {
        Ok(Opening::Panel(serde_json::from_value(value)?))
    } else {
        Ok(Opening::Submit(serde_json::from_value(value)?))
    }
}

/// Prepare the socket directory and bind the listener.
pub async fn bind(socket_path: &str) -> anyhow::Result<UnixListener> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another relay is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");
    Ok(listener)
}

pub async fn serve(listener: UnixListener, relay: RelayHandle) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let relay = relay.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, relay).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, relay: RelayHandle) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let Some(first) = lines.next_line().await? else {
        return Ok(());
    };

    match parse_opening(first.trim())? {
        Opening::Submit(submission) => {
            let ack = relay.submit(submission).await?;
            write_line(&mut writer, &ack).await?;
            Ok(())
        }
        Opening::Panel(request) => serve_panel(lines, writer, request, relay).await,
    }
}

async fn serve_panel(
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    mut writer: OwnedWriteHalf,
    request: PanelRequest,
    relay: RelayHandle,
) -> anyhow::Result<()> {
    let channel_id = relay.next_channel_id();
    let (channel, mut outbox) = SocketChannel::new(channel_id);
    relay.panel_request(channel.clone(), request).await?;

    loop {
        tokio::select! {
            message = outbox.recv() => {
                let Some(message) = message else { break };
                if let Err(e) = write_line(&mut writer, &message).await {
                    tracing::debug!("panel port {channel_id} write failed: {e}");
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<PanelRequest>(line.trim()) {
                    Ok(request) => relay.panel_request(channel.clone(), request).await?,
                    Err(e) => tracing::warn!("ignoring malformed panel request on {channel_id}: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("panel port {channel_id} read failed: {e}");
                    break;
                }
            },
        }
    }

    // Posts racing with the removal fail from here on.
    drop(outbox);
    relay.unsubscribe(channel_id).await
}

pub(crate) async fn write_line<T: Serialize>(
    writer: &mut OwnedWriteHalf,
    value: &T,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}
