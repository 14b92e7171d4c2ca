// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Triton-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Triton and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Newline-delimited JSON framing: one [`RequestEnvelope`] per input line, one
//! [`ResponseEnvelope`] per output line, in request order.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::dispatch::{Dispatcher, Stage};
use crate::protocol::{ErrorKind, RequestEnvelope, ResponseEnvelope};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serves requests from `reader` until EOF. Returns the number of lines answered.
///
/// Malformed envelopes are answered with a `transport` error and never reach the dispatcher.
pub async fn serve_lines<R, W>(
    dispatcher: &Dispatcher,
    reader: R,
    mut writer: W,
) -> Result<usize, TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut answered = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RequestEnvelope>(line) {
            Ok(request) => dispatcher.dispatch(request).await,
            Err(err) => {
                let id = salvage_id(line);
                tracing::warn!(request_id = ?id, error = %err, "malformed request envelope");
                ResponseEnvelope::failure(
                    id,
                    ErrorKind::Transport,
                    format!("malformed request envelope: {err}"),
                )
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        answered += 1;
        tracing::debug!(request_id = ?response.id, stage = %Stage::Sent, "response written");
    }
    Ok(answered)
}

/// Best-effort recovery of the request id from a line that failed to parse as an envelope.
fn salvage_id(line: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(line).ok()?.get("id")?.as_u64()
}

pub async fn serve_stdio(dispatcher: Arc<Dispatcher>) -> Result<(), TransportError> {
    let answered =
        serve_lines(&dispatcher, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    tracing::info!(answered, "stdin closed");
    Ok(())
}

/// Accepts connections forever, serving each on its own task.
///
/// Connections run concurrently; the dispatcher's critical section still serializes the
/// requests themselves.
pub async fn serve_tcp(
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
) -> Result<(), TransportError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "client connected");
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            match serve_lines(&dispatcher, BufReader::new(reader), writer).await {
                Ok(answered) => tracing::info!(%peer, answered, "client disconnected"),
                Err(err) => tracing::warn!(%peer, error = %err, "client connection failed"),
            }
        });
    }
}
