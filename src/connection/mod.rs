//! Persistent channel to the interview peer.

pub mod manager;
pub mod protocol;
pub mod transport;

pub use manager::{ConnectionEvent, ConnectionManager, ConnectionSignal, ConnectionState};
pub use protocol::{ClientMessage, PeerMessage};
pub use transport::{Connector, LinkEvent, MockConnector, MockPeer, PeerLink, WsConnector};
