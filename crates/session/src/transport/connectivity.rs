//! Connectivity derived from ICE and peer connection state
//!
//! The transport is usable only when ICE reports connected/completed and the
//! peer connection reports connected. Either side reporting failed,
//! disconnected or closed is a loss, whatever the other side says.

use serde::{Deserialize, Serialize};

/// ICE agent state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectivity {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Peer connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectivity {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Derived usability of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Still negotiating or checking
    Pending,
    /// Media can flow
    Up,
    /// Failed, disconnected or closed
    Lost,
}

impl IceConnectivity {
    fn is_up(self) -> bool {
        matches!(self, IceConnectivity::Connected | IceConnectivity::Completed)
    }

    fn is_lost(self) -> bool {
        matches!(
            self,
            IceConnectivity::Disconnected | IceConnectivity::Failed | IceConnectivity::Closed
        )
    }
}

impl PeerConnectivity {
    fn is_lost(self) -> bool {
        matches!(
            self,
            PeerConnectivity::Disconnected | PeerConnectivity::Failed | PeerConnectivity::Closed
        )
    }
}

/// Latest ICE and peer states of one transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectivitySnapshot {
    pub ice: IceConnectivity,
    pub peer: PeerConnectivity,
}

impl ConnectivitySnapshot {
    pub fn new(ice: IceConnectivity, peer: PeerConnectivity) -> Self {
        Self { ice, peer }
    }

    /// Both sides connected
    pub fn up() -> Self {
        Self::new(IceConnectivity::Connected, PeerConnectivity::Connected)
    }

    pub fn derive(&self) -> Connectivity {
        if self.ice.is_lost() || self.peer.is_lost() {
            Connectivity::Lost
        } else if self.ice.is_up() && self.peer == PeerConnectivity::Connected {
            Connectivity::Up
        } else {
            Connectivity::Pending
        }
    }

    pub fn is_up(&self) -> bool {
        self.derive() == Connectivity::Up
    }

    /// Short description for status lines and errors
    pub fn describe(&self) -> String {
        format!("ice={:?}, peer={:?}", self.ice, self.peer).to_lowercase()
    }
}

#[cfg(feature = "webrtc-transport")]
mod webrtc_states {
    use super::{IceConnectivity, PeerConnectivity};
    use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
    use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

    impl From<RTCIceConnectionState> for IceConnectivity {
        fn from(state: RTCIceConnectionState) -> Self {
            match state {
                RTCIceConnectionState::Checking => IceConnectivity::Checking,
                RTCIceConnectionState::Connected => IceConnectivity::Connected,
                RTCIceConnectionState::Completed => IceConnectivity::Completed,
                RTCIceConnectionState::Disconnected => IceConnectivity::Disconnected,
                RTCIceConnectionState::Failed => IceConnectivity::Failed,
                RTCIceConnectionState::Closed => IceConnectivity::Closed,
                _ => IceConnectivity::New,
            }
        }
    }

    impl From<RTCPeerConnectionState> for PeerConnectivity {
        fn from(state: RTCPeerConnectionState) -> Self {
            match state {
                RTCPeerConnectionState::Connecting => PeerConnectivity::Connecting,
                RTCPeerConnectionState::Connected => PeerConnectivity::Connected,
                RTCPeerConnectionState::Disconnected => PeerConnectivity::Disconnected,
                RTCPeerConnectionState::Failed => PeerConnectivity::Failed,
                RTCPeerConnectionState::Closed => PeerConnectivity::Closed,
                _ => PeerConnectivity::New,
            }
        }
    }
}
