//! UDS client helpers for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use hxdbg_core::error::TransportError;
use hxdbg_core::types::{Ack, EventRecord, PanelMessage, PanelRequest, SourceId, Submission};

/// Submit one record and wait for the relay's acknowledgement.
pub(crate) async fn send_record(
    socket_path: &str,
    submission: &Submission,
) -> Result<Ack, TransportError> {
    let stream = UnixStream::connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    let mut req = serde_json::to_string(submission)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(TransportError::SendFailed(
            "relay closed the connection without acknowledging".to_owned(),
        ));
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// Long-lived panel connection to the relay.
pub(crate) struct PanelPort {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl PanelPort {
    /// Connect and subscribe to `tab_id`.
    pub(crate) async fn open(socket_path: &str, tab_id: SourceId) -> Result<Self, TransportError> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();
        let mut port = Self {
            lines: BufReader::new(reader).lines(),
            writer,
        };
        port.send(&PanelRequest::Init { tab_id }).await?;
        Ok(port)
    }

    pub(crate) async fn send(&mut self, request: &PanelRequest) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Next message from the relay; `None` once the relay hung up.
    /// Cancel-safe, so it can sit in a `select!` loop.
    pub(crate) async fn next_message(&mut self) -> Result<Option<PanelMessage>, TransportError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(line.trim())?));
        }
    }
}

/// `hxdbg probe`: ask the relay whether it is alive.
pub async fn cmd_probe(socket_path: &str) -> anyhow::Result<()> {
    let probe = Submission {
        tab_id: None,
        message: EventRecord::new(
            hxdbg_core::types::KIND_LIVENESS_PROBE,
            "hxdbg-probe",
            serde_json::Value::Null,
            chrono::Utc::now(),
        ),
    };
    let ack = send_record(socket_path, &probe)
        .await
        .map_err(|e| anyhow::anyhow!("cannot reach relay at {socket_path}: {e}"))?;
    println!("{}", serde_json::to_string(&ack)?);
    Ok(())
}
