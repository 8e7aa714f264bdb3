//! Stdio bridge transport.
//!
//! The messaging connection itself (pairing, device store, wire protocol) runs
//! in a companion process. It talks to this bot over newline-delimited JSON:
//! events and send acknowledgements come in on stdin, send requests go out on
//! stdout. See [`wire`] for the frame shapes.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stb_core::{domain::ContactId, engine::Engine, Result};

pub mod messenger;
pub mod wire;

pub use messenger::BridgeMessenger;
use wire::BridgeInbound;

/// Read inbound frames until EOF or cancellation, dispatching each one.
pub async fn serve<R>(
    reader: R,
    engine: &Engine,
    messenger: &BridgeMessenger,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    let result = loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("bridge input closed");
                break Ok(());
            }
            Err(e) => break Err(e.into()),
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<BridgeInbound>(&line) {
            Ok(frame) => dispatch(frame, engine, messenger).await,
            Err(e) => warn!(
                error = %e,
                line = %line.chars().take(200).collect::<String>(),
                "skipping malformed bridge frame"
            ),
        }
    };

    messenger.fail_pending("bridge stopped");
    result
}

async fn dispatch(frame: BridgeInbound, engine: &Engine, messenger: &BridgeMessenger) {
    match frame {
        BridgeInbound::Ready { own_id } => messenger.set_own_id(ContactId(own_id)).await,
        BridgeInbound::Ack { id, ok, error } => {
            let result = if ok {
                Ok(())
            } else {
                Err(error.unwrap_or_else(|| "rejected by transport".to_string()))
            };
            messenger.complete(id, result);
        }
        other => {
            if let Some(event) = other.into_event() {
                engine.handle(event).await;
            }
        }
    }
}

/// Write encoded frames, one per line, until every producer is gone.
pub async fn pump_outbound<W>(mut frames: mpsc::UnboundedReceiver<String>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = frames.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
