//! Peer transport abstraction
//!
//! A transport wraps one real-time peer connection for one session-start
//! attempt. It never decides anything about the session: it applies the
//! negotiation steps it is asked to perform and pushes what it observes
//! (connectivity, inbound media, ICE candidates) onto the controller's event
//! channel, tagged with its [`TransportId`].

pub mod connectivity;
pub mod media;
#[cfg(feature = "webrtc-transport")]
mod peer;

pub use connectivity::{Connectivity, ConnectivitySnapshot, IceConnectivity, PeerConnectivity};
pub use media::{Admission, RenderSlot, RenderSource, TrackInfo, TrackKind};
#[cfg(feature = "webrtc-transport")]
pub use peer::{TransportManager, WebRtcTransportFactory};

use crate::signaling::{IceServer, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Identifier of one transport instance within a controller
pub type TransportId = u64;

/// Sender half of the controller's transport event channel
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Something a transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    /// ICE or peer connection state changed
    Connectivity(ConnectivitySnapshot),
    /// Render source established or extended
    RenderSource(RenderSource),
    /// Local ICE candidate gathered
    IceCandidate(String),
    /// Local ICE gathering finished
    IceGatheringComplete,
}

/// Event tagged with the transport that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub transport_id: TransportId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(transport_id: TransportId, kind: TransportEventKind) -> Self {
        Self { transport_id, kind }
    }
}

/// One peer connection used for one session-start attempt
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn id(&self) -> TransportId;

    /// Apply the remote offer and return the applied local answer
    ///
    /// Runs set-remote, create-answer, set-local in that order; any failing
    /// step aborts with [`crate::Error::NegotiationError`]. Only one
    /// negotiation per transport.
    async fn negotiate(&self, offer: &SessionDescription) -> Result<SessionDescription>;

    /// Latest connectivity report
    fn connectivity(&self) -> ConnectivitySnapshot;

    /// Current render source, if any track arrived
    fn render_source(&self) -> Option<RenderSource>;

    /// Detach handlers, stop tracks, close the connection, clear the render source
    ///
    /// Idempotent.
    async fn close(&self);
}

/// Creates transports for a controller
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        id: TransportId,
        ice_servers: &[IceServer],
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>>;
}
