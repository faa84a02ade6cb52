//! Owner of the persistent channel to the interview peer.
//!
//! The manager is driven from the session loop: `connect`, `send` and
//! `disconnect` are plain synchronous calls, and the pump task it spawns
//! reports back through [`ConnectionSignal`]s. Every signal carries the
//! attempt number it belongs to; signals from an attempt that has since been
//! superseded are dropped, so a late close from a link torn down by
//! `disconnect` never looks like an unexpected close.

use crate::connection::protocol::ClientMessage;
use crate::connection::transport::{Connector, LinkEvent};
use crate::error::{ParleyError, Result};
use crate::event::{EventSender, SessionEvent};
use crate::timer::ScheduledTask;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection lifecycle state. Read-only outside the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// Raw signal from a pump task or the reconnect timer.
#[derive(Debug)]
pub enum ConnectionSignal {
    Opened {
        attempt: u64,
        outbound: UnboundedSender<String>,
    },
    Message {
        attempt: u64,
        payload: String,
    },
    Failed {
        attempt: u64,
        reason: String,
    },
    Closed {
        attempt: u64,
    },
    ReconnectDue {
        attempt: u64,
    },
}

/// What the session sees from the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Closed,
    Errored(String),
    MessageReceived(String),
}

pub struct ConnectionManager {
    url: String,
    reconnect_delay: Duration,
    connector: Arc<dyn Connector>,
    events: EventSender,
    state: ConnectionState,
    last_error: Option<String>,
    attempt: u64,
    outbound: Option<UnboundedSender<String>>,
    pump: Option<JoinHandle<()>>,
    reconnect: Option<ScheduledTask>,
    auto_reconnect: bool,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        reconnect_delay: Duration,
        connector: Arc<dyn Connector>,
        events: EventSender,
    ) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            connector,
            events,
            state: ConnectionState::Disconnected,
            last_error: None,
            attempt: 0,
            outbound: None,
            pump: None,
            reconnect: None,
            auto_reconnect: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Most recent failure reason; cleared by a successful connect.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True while a reconnect attempt is scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Open the channel and arm automatic reconnection.
    ///
    /// Any previous link is released first, so at most one channel is
    /// ever held.
    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = ?self.state, "connect ignored, channel already open");
            return;
        }

        self.cancel_reconnect();
        self.release_link();
        self.auto_reconnect = true;
        self.attempt += 1;
        self.state = ConnectionState::Connecting;

        let attempt = self.attempt;
        let url = self.url.clone();
        let connector = Arc::clone(&self.connector);
        let events = self.events.clone();
        info!(attempt, url = %url, "connecting to interview server");

        self.pump = Some(tokio::spawn(async move {
            pump_link(attempt, url, connector, events).await;
        }));
    }

    /// Send a message to the peer. Fails unless connected.
    pub fn send(&mut self, message: &ClientMessage) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(ParleyError::NotConnected);
        }
        let outbound = self.outbound.as_ref().ok_or(ParleyError::NotConnected)?;
        let json = message.to_json().map_err(|e| ParleyError::Protocol {
            message: format!("Failed to serialize message: {}", e),
        })?;
        outbound.send(json).map_err(|_| ParleyError::Connection {
            message: "link writer is gone".to_string(),
        })
    }

    /// Close the channel, cancel any pending reconnect and disarm reconnection.
    pub fn disconnect(&mut self) {
        self.auto_reconnect = false;
        self.cancel_reconnect();
        self.release_link();
        // Late signals from the released link now belong to a stale attempt.
        self.attempt += 1;
        if self.state != ConnectionState::Disconnected {
            info!("disconnected from interview server");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Apply a signal and translate it for the session.
    pub fn handle(&mut self, signal: ConnectionSignal) -> Option<ConnectionEvent> {
        match signal {
            ConnectionSignal::Opened { attempt, outbound } => {
                if !self.is_current(attempt) {
                    return None;
                }
                info!(attempt, "connected to interview server");
                self.state = ConnectionState::Connected;
                self.last_error = None;
                self.outbound = Some(outbound);
                Some(ConnectionEvent::Connected)
            }
            ConnectionSignal::Message { attempt, payload } => {
                if !self.is_current(attempt) || self.state != ConnectionState::Connected {
                    return None;
                }
                Some(ConnectionEvent::MessageReceived(payload))
            }
            ConnectionSignal::Failed { attempt, reason } => {
                if !self.is_current(attempt) {
                    return None;
                }
                warn!(attempt, %reason, "connection error");
                self.state = ConnectionState::Errored;
                self.outbound = None;
                self.last_error = Some(reason.clone());
                Some(ConnectionEvent::Errored(reason))
            }
            ConnectionSignal::Closed { attempt } => {
                if !self.is_current(attempt) {
                    return None;
                }
                self.outbound = None;
                self.pump = None;
                self.state = ConnectionState::Disconnected;
                if self.auto_reconnect {
                    info!(
                        attempt,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        "connection closed, scheduling reconnect"
                    );
                    self.schedule_reconnect(attempt);
                } else {
                    info!(attempt, "connection closed");
                }
                Some(ConnectionEvent::Closed)
            }
            ConnectionSignal::ReconnectDue { attempt } => {
                if !self.is_current(attempt) || !self.auto_reconnect {
                    return None;
                }
                self.reconnect = None;
                self.connect();
                None
            }
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        if attempt != self.attempt {
            debug!(attempt, current = self.attempt, "dropping stale connection signal");
            return false;
        }
        true
    }

    fn schedule_reconnect(&mut self, attempt: u64) {
        // Replacing the handle aborts any earlier timer: one attempt per close.
        self.reconnect = Some(ScheduledTask::after(
            self.reconnect_delay,
            self.events.clone(),
            SessionEvent::Connection(ConnectionSignal::ReconnectDue { attempt }),
        ));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect.take() {
            task.cancel();
        }
    }

    fn release_link(&mut self) {
        self.outbound = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.release_link();
    }
}

/// Open one link and forward everything it reports until it closes.
async fn pump_link(attempt: u64, url: String, connector: Arc<dyn Connector>, events: EventSender) {
    let forward = |signal: ConnectionSignal| events.send(SessionEvent::Connection(signal)).is_ok();

    let mut link = match connector.open(&url).await {
        Ok(link) => link,
        Err(e) => {
            if forward(ConnectionSignal::Failed {
                attempt,
                reason: e.to_string(),
            }) {
                forward(ConnectionSignal::Closed { attempt });
            }
            return;
        }
    };

    if !forward(ConnectionSignal::Opened {
        attempt,
        outbound: link.outbound,
    }) {
        return;
    }

    while let Some(event) = link.inbound.recv().await {
        let signal = match event {
            LinkEvent::Message(payload) => ConnectionSignal::Message { attempt, payload },
            LinkEvent::Error(reason) => ConnectionSignal::Failed { attempt, reason },
        };
        if !forward(signal) {
            return;
        }
    }

    forward(ConnectionSignal::Closed { attempt });
}
