//! Transport seam between the connection manager and the wire.
//!
//! A [`Connector`] opens a [`PeerLink`]: an outbound queue of JSON text
//! frames and an inbound stream of [`LinkEvent`]s. The inbound channel
//! closing means the link closed.

use crate::error::{ParleyError, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A text frame from the peer.
    Message(String),
    /// Transport failure; the link closes right after.
    Error(String),
}

/// An open bidirectional channel to the peer.
#[derive(Debug)]
pub struct PeerLink {
    pub outbound: UnboundedSender<String>,
    pub inbound: UnboundedReceiver<LinkEvent>,
}

/// Opens links to the peer.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<PeerLink>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<PeerLink> {
        let (stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| ParleyError::Connection {
                    message: format!("Failed to connect to {}: {}", url, e),
                })?;

        let (mut sink, mut frames) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        // Writer: ends when the manager drops its sender.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(error = %e, "websocket write failed");
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "websocket close handshake failed");
            }
        });

        // Reader: ends on close, error, or when nobody listens any more.
        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => LinkEvent::Message(text),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "peer closed websocket");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => LinkEvent::Error(e.to_string()),
                };
                let failed = matches!(event, LinkEvent::Error(_));
                if inbound_tx.send(event).is_err() || failed {
                    break;
                }
            }
        });

        Ok(PeerLink { outbound, inbound })
    }
}

/// The test-side end of a [`MockConnector`] link.
#[derive(Debug)]
pub struct MockPeer {
    /// Frames the client sent.
    pub received: UnboundedReceiver<String>,
    inbound: Option<UnboundedSender<LinkEvent>>,
}

impl MockPeer {
    /// Deliver a raw text frame to the client.
    pub fn send_text(&self, text: &str) -> bool {
        self.deliver(LinkEvent::Message(text.to_string()))
    }

    /// Report a transport error to the client. The link stays up until closed.
    pub fn send_error(&self, reason: &str) -> bool {
        self.deliver(LinkEvent::Error(reason.to_string()))
    }

    /// Close the link from the peer side.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Next frame the client sent, if one is queued.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.received.try_recv().ok()
    }

    fn deliver(&self, event: LinkEvent) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }
}

#[derive(Debug, Default)]
struct MockConnectorState {
    attempts: usize,
    failures_remaining: usize,
    peers: Vec<MockPeer>,
}

/// Connector for tests: every successful open hands a [`MockPeer`] to the test.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` opens fail.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_remaining = count;
    }

    /// Number of open attempts so far.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Take the peer end of the most recent successful open.
    pub fn take_peer(&self) -> Option<MockPeer> {
        self.lock().peers.pop()
    }

    fn lock(&self) -> MutexGuard<'_, MockConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &str) -> Result<PeerLink> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(ParleyError::Connection {
                message: format!("mock connection to {} refused", url),
            });
        }

        let (outbound, received) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        state.peers.clear();
        state.peers.push(MockPeer {
            received,
            inbound: Some(inbound_tx),
        });

        Ok(PeerLink { outbound, inbound })
    }
}
