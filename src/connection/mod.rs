//! Connection lifecycle and send gating.
//!
//! One manager owns at most one live connection slot. Transport tasks hold
//! only the connection id and re-resolve the slot on every event, so a task
//! belonging to a superseded connection can never touch a newer one. There is
//! no automatic reconnect: once Closed or Errored the slot is cleared and
//! sends drop until an external actor calls `connect` again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use crate::protocol;
use crate::sink::OutputSink;

/// Lifecycle of one connection instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Events reported by the transport task.
#[derive(Debug)]
pub enum ConnectionEvent {
    Opened,
    Closed,
    Errored(String),
}

impl ConnectionState {
    /// Legal transitions only. Closed and Errored are terminal; everything
    /// else returns `None` and the event is ignored.
    pub fn next(self, event: &ConnectionEvent) -> Option<ConnectionState> {
        match (self, event) {
            (ConnectionState::Connecting, ConnectionEvent::Opened) => Some(ConnectionState::Open),
            (ConnectionState::Connecting, ConnectionEvent::Errored(_)) => {
                Some(ConnectionState::Errored)
            }
            (ConnectionState::Open, ConnectionEvent::Closed) => Some(ConnectionState::Closed),
            (ConnectionState::Open, ConnectionEvent::Errored(_)) => Some(ConnectionState::Errored),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("unsupported page scheme: {0}")]
    UnsupportedScheme(String),
    #[error("page URL has no host")]
    MissingHost,
    #[error("invalid page URL: {0}")]
    Invalid(#[from] url::ParseError),
}

/// Derive the websocket endpoint from the hosting page URL.
///
/// A secure page maps to `wss`, an insecure one to `ws`; host and port are
/// preserved and the path is fixed to `/ws`.
pub fn endpoint_url(page: &str) -> Result<Url, EndpointError> {
    let page = Url::parse(page)?;
    let scheme = match page.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    let host = page.host_str().ok_or(EndpointError::MissingHost)?;
    let mut target = format!("{scheme}://{host}");
    if let Some(port) = page.port() {
        target.push_str(&format!(":{port}"));
    }
    target.push_str("/ws");
    Ok(Url::parse(&target)?)
}

struct ConnectionSlot {
    id: u64,
    state: ConnectionState,
    outbound: mpsc::UnboundedSender<String>,
}

struct ManagerInner {
    slot: Mutex<Option<ConnectionSlot>>,
    next_id: AtomicU64,
    sink: Arc<dyn OutputSink>,
}

/// Owns the persistent connection's lifecycle and gates `send` on its state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                slot: Mutex::new(None),
                next_id: AtomicU64::new(0),
                sink,
            }),
        }
    }

    /// Install a Connecting slot and start the handshake. Non-blocking; the
    /// result is observed through state transitions on the sink. Any previous
    /// connection is superseded.
    pub fn connect(&self, endpoint: Url) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        {
            let mut slot = self.inner.slot.lock().expect("slot lock");
            *slot = Some(ConnectionSlot {
                id,
                state: ConnectionState::Connecting,
                outbound: outbound_tx,
            });
        }
        tracing::info!(%endpoint, id, "connecting");
        let manager = self.clone();
        tokio::spawn(run_transport(manager, id, endpoint, outbound_rx));
        id
    }

    /// Queue a message for transmission, permitted only in the Open state.
    ///
    /// Anywhere else this is a silent drop with a debug log. The protocol is
    /// fire-and-forget; callers never wait for delivery.
    pub fn send(&self, message: String) -> bool {
        let slot = self.inner.slot.lock().expect("slot lock");
        match slot.as_ref() {
            Some(conn) if conn.state == ConnectionState::Open => {
                if conn.outbound.send(message).is_ok() {
                    true
                } else {
                    tracing::debug!(id = conn.id, "send dropped: transport task gone");
                    false
                }
            }
            Some(conn) => {
                tracing::debug!(id = conn.id, state = ?conn.state, "send dropped: connection not open");
                false
            }
            None => {
                tracing::debug!("send dropped: no live connection");
                false
            }
        }
    }

    /// Current state of the live connection, if any.
    pub fn state(&self) -> Option<ConnectionState> {
        self.inner.slot.lock().expect("slot lock").as_ref().map(|c| c.state)
    }

    /// Apply a transport event for connection `id`, resolving the live slot
    /// at call time. Events from superseded connections and illegal
    /// transitions are ignored.
    fn handle_event(&self, id: u64, event: ConnectionEvent) {
        let mut slot = self.inner.slot.lock().expect("slot lock");
        let Some(conn) = slot.as_mut() else {
            return;
        };
        if conn.id != id {
            tracing::debug!(stale = id, live = conn.id, "ignoring event from superseded connection");
            return;
        }
        let Some(next) = conn.state.next(&event) else {
            tracing::debug!(id, state = ?conn.state, ?event, "ignoring illegal transition");
            return;
        };
        conn.state = next;
        match next {
            ConnectionState::Open => {
                drop(slot);
                self.inner.sink.status("Connected");
            }
            ConnectionState::Closed => {
                *slot = None;
                drop(slot);
                self.inner.sink.status("CLOSE");
            }
            ConnectionState::Errored => {
                let reason = match event {
                    ConnectionEvent::Errored(reason) => reason,
                    _ => unreachable!("only Errored events reach Errored"),
                };
                *slot = None;
                drop(slot);
                self.inner.sink.error(&format!("ERROR: {reason}"));
            }
            ConnectionState::Connecting => unreachable!("no transition enters Connecting"),
        }
    }

    /// Forward inbound text to the sink while connection `id` is the live,
    /// open one.
    fn handle_inbound(&self, id: u64, text: &str) {
        let deliver = {
            let slot = self.inner.slot.lock().expect("slot lock");
            matches!(slot.as_ref(), Some(conn) if conn.id == id && conn.state == ConnectionState::Open)
        };
        if deliver {
            self.inner.sink.deliver(text);
        }
    }

    /// Install an already-open connection and hand back the outbound channel,
    /// standing in for a completed handshake.
    #[cfg(test)]
    pub(crate) fn install_for_test(
        &self,
        state: ConnectionState,
    ) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let mut slot = self.inner.slot.lock().expect("slot lock");
        *slot = Some(ConnectionSlot {
            id,
            state,
            outbound: outbound_tx,
        });
        (id, outbound_rx)
    }
}

async fn run_transport(
    manager: ConnectionManager,
    id: u64,
    endpoint: Url,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let ws = match connect_async(endpoint.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            manager.handle_event(id, ConnectionEvent::Errored(e.to_string()));
            return;
        }
    };
    manager.handle_event(id, ConnectionEvent::Opened);

    let (mut ws_tx, mut ws_rx) = ws.split();
    loop {
        tokio::select! {
            out = outbound_rx.recv() => match out {
                Some(text) => {
                    if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                        manager.handle_event(id, ConnectionEvent::Errored(e.to_string()));
                        break;
                    }
                }
                // Slot cleared or superseded; this task is done.
                None => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => manager.handle_inbound(id, &text),
                Some(Ok(WsMessage::Binary(data))) => match protocol::decode_text(&data) {
                    Ok(text) => manager.handle_inbound(id, text),
                    Err(e) => tracing::warn!(id, "dropping inbound message: {e}"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    manager.handle_event(id, ConnectionEvent::Closed);
                    break;
                }
                // Ping/pong are answered by the transport itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    manager.handle_event(id, ConnectionEvent::Errored(e.to_string()));
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;

    fn manager_with_sink() -> (ConnectionManager, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (ConnectionManager::new(sink.clone()), sink)
    }

    #[test]
    fn test_endpoint_url_insecure_page() {
        let ws = endpoint_url("http://example.com/some/page").unwrap();
        assert_eq!(ws.as_str(), "ws://example.com/ws");
    }

    #[test]
    fn test_endpoint_url_secure_page() {
        let ws = endpoint_url("https://example.com/").unwrap();
        assert_eq!(ws.as_str(), "wss://example.com/ws");
    }

    #[test]
    fn test_endpoint_url_preserves_port() {
        let ws = endpoint_url("http://localhost:8080").unwrap();
        assert_eq!(ws.as_str(), "ws://localhost:8080/ws");
    }

    #[test]
    fn test_endpoint_url_rejects_other_schemes() {
        assert!(matches!(
            endpoint_url("ftp://example.com"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(endpoint_url("not a url").is_err());
    }

    #[test]
    fn test_state_machine_legal_transitions() {
        use ConnectionEvent as E;
        use ConnectionState as S;

        assert_eq!(S::Connecting.next(&E::Opened), Some(S::Open));
        assert_eq!(
            S::Connecting.next(&E::Errored("refused".into())),
            Some(S::Errored)
        );
        assert_eq!(S::Open.next(&E::Closed), Some(S::Closed));
        assert_eq!(S::Open.next(&E::Errored("reset".into())), Some(S::Errored));
    }

    #[test]
    fn test_state_machine_terminal_states() {
        use ConnectionEvent as E;
        use ConnectionState as S;

        for state in [S::Closed, S::Errored] {
            assert_eq!(state.next(&E::Opened), None);
            assert_eq!(state.next(&E::Closed), None);
            assert_eq!(state.next(&E::Errored("x".into())), None);
        }
        // A failed handshake errors, it does not close.
        assert_eq!(S::Connecting.next(&E::Closed), None);
    }

    #[tokio::test]
    async fn test_send_permitted_only_when_open() {
        let (manager, _sink) = manager_with_sink();

        // No live connection at all
        assert!(!manager.send("m0".into()));

        for state in [
            ConnectionState::Connecting,
            ConnectionState::Closed,
            ConnectionState::Errored,
        ] {
            let (_id, mut rx) = manager.install_for_test(state);
            assert!(!manager.send("m1".into()));
            assert!(rx.try_recv().is_err());
        }

        let (_id, mut rx) = manager.install_for_test(ConnectionState::Open);
        assert!(manager.send("m2".into()));
        assert_eq!(rx.try_recv().unwrap(), "m2");
        assert!(rx.try_recv().is_err(), "exactly one transmission");
    }

    #[tokio::test]
    async fn test_close_clears_slot_and_notifies_sink() {
        let (manager, sink) = manager_with_sink();
        let (id, _rx) = manager.install_for_test(ConnectionState::Open);

        manager.handle_event(id, ConnectionEvent::Closed);

        assert_eq!(manager.state(), None);
        assert!(!manager.send("late".into()));
        assert_eq!(sink.statuses.lock().unwrap().as_slice(), &["CLOSE"]);
    }

    #[tokio::test]
    async fn test_error_clears_slot_and_reports_reason() {
        let (manager, sink) = manager_with_sink();
        let (id, _rx) = manager.install_for_test(ConnectionState::Open);

        manager.handle_event(id, ConnectionEvent::Errored("connection reset".into()));

        assert_eq!(manager.state(), None);
        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection reset"));
    }

    #[tokio::test]
    async fn test_open_notifies_sink() {
        let (manager, sink) = manager_with_sink();
        let (id, _rx) = manager.install_for_test(ConnectionState::Connecting);

        manager.handle_event(id, ConnectionEvent::Opened);

        assert_eq!(manager.state(), Some(ConnectionState::Open));
        assert_eq!(sink.statuses.lock().unwrap().as_slice(), &["Connected"]);
    }

    #[tokio::test]
    async fn test_stale_connection_events_are_ignored() {
        let (manager, sink) = manager_with_sink();
        let (stale_id, _stale_rx) = manager.install_for_test(ConnectionState::Open);
        let (live_id, _live_rx) = manager.install_for_test(ConnectionState::Open);

        manager.handle_event(stale_id, ConnectionEvent::Closed);

        assert_eq!(manager.state(), Some(ConnectionState::Open));
        assert!(sink.statuses.lock().unwrap().is_empty());

        manager.handle_event(live_id, ConnectionEvent::Closed);
        assert_eq!(manager.state(), None);
    }

    #[tokio::test]
    async fn test_inbound_text_forwarded_verbatim_while_open() {
        let (manager, sink) = manager_with_sink();
        let (id, _rx) = manager.install_for_test(ConnectionState::Open);

        manager.handle_inbound(id, "hello");

        assert_eq!(sink.delivered.lock().unwrap().as_slice(), &["hello"]);
    }

    #[tokio::test]
    async fn test_inbound_dropped_when_not_open() {
        let (manager, sink) = manager_with_sink();
        let (id, _rx) = manager.install_for_test(ConnectionState::Connecting);

        manager.handle_inbound(id, "early");
        manager.handle_inbound(id + 1, "wrong id");

        assert!(sink.delivered.lock().unwrap().is_empty());
    }
}
