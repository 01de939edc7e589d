//! Local relay server for development.
//!
//! Accepts WebSocket connections at `/ws`, decodes frame envelopes and hands
//! them to a `Cortex` processor whose text replies travel back on the same
//! connection. Frames are processed in arrival order and never stored.

use std::sync::Arc;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message as WsMessage};

use crate::protocol::Envelope;

/// Turns a received frame into reply text.
///
/// Production deployments implement this against a real image-understanding
/// backend; the built-in one just acknowledges each frame.
pub trait Cortex: Send + Sync {
    /// `None` means no reply for this frame.
    fn process(&self, envelope: &Envelope) -> Option<String>;
}

/// Replies with the content type and decoded byte count of each frame.
pub struct EchoCortex;

impl Cortex for EchoCortex {
    fn process(&self, envelope: &Envelope) -> Option<String> {
        let bytes = BASE64.decode(&envelope.data_uri.content).ok()?;
        Some(format!(
            "received {} ({} bytes)",
            envelope.data_uri.content_type,
            bytes.len()
        ))
    }
}

pub struct RelayServer {
    addr: String,
    cortex: Arc<dyn Cortex>,
}

impl RelayServer {
    pub fn new(addr: String, cortex: Arc<dyn Cortex>) -> Self {
        Self { addr, cortex }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        println!("📡 socketcam relay listening on: {}", self.addr);
        println!("🔎 frames in, acknowledgements out, nothing stored");

        loop {
            let (stream, peer) = listener.accept().await?;
            let cortex = self.cortex.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, cortex).await {
                    tracing::debug!(%peer, "connection ended: {e}");
                }
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, cortex: Arc<dyn Cortex>) -> Result<()> {
    // Only the /ws path upgrades; anything else is turned away.
    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == "/ws" {
            Ok(response)
        } else {
            let mut resp = ErrorResponse::new(Some("no such endpoint".to_string()));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Err(resp)
        }
    };
    let ws = accept_hdr_async(stream, callback).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => {
                    if let Some(reply) = cortex.process(&envelope) {
                        ws_tx.send(WsMessage::Text(reply)).await?;
                    }
                }
                Err(e) => tracing::warn!("dropping malformed envelope: {e}"),
            },
            Ok(WsMessage::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    Ok(())
}

pub async fn start_relay(addr: String) -> Result<()> {
    let server = RelayServer::new(addr, Arc::new(EchoCortex));
    server.run().await
}
