//! webrtc-rs backed transport

use super::media::{Admission, RenderSlot, TrackInfo, TrackKind};
use super::{
    ConnectivitySnapshot, IceConnectivity, PeerConnectivity, PeerTransport, RenderSource,
    TransportEvent, TransportEventKind, TransportEventSender, TransportFactory, TransportId,
};
use crate::config::SessionConfig;
use crate::signaling::{IceServer, SdpKind, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Packets between two progress logs of an inbound track
const READER_LOG_INTERVAL: u64 = 500;

/// State shared between the transport and its webrtc callbacks
struct Shared {
    id: TransportId,
    events: TransportEventSender,
    /// Set once close() starts; callbacks stop reporting from then on
    detached: AtomicBool,
    connectivity: Mutex<ConnectivitySnapshot>,
    render: Mutex<RenderSlot>,
    receivers: Mutex<Vec<Arc<RTCRtpReceiver>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn emit(&self, kind: TransportEventKind) {
        if self.detached.load(Ordering::SeqCst) {
            return;
        }
        if self.events.send(TransportEvent::new(self.id, kind)).is_err() {
            debug!(transport_id = self.id, "event receiver gone, dropping transport event");
        }
    }

    fn record_ice(&self, ice: IceConnectivity) {
        let snapshot = {
            let mut connectivity = self.connectivity.lock();
            if connectivity.ice == ice {
                return;
            }
            connectivity.ice = ice;
            *connectivity
        };
        debug!(transport_id = self.id, ice = ?ice, "ICE connection state changed");
        self.emit(TransportEventKind::Connectivity(snapshot));
    }

    fn record_peer(&self, peer: PeerConnectivity) {
        let snapshot = {
            let mut connectivity = self.connectivity.lock();
            if connectivity.peer == peer {
                return;
            }
            connectivity.peer = peer;
            *connectivity
        };
        debug!(transport_id = self.id, peer = ?peer, "peer connection state changed");
        self.emit(TransportEventKind::Connectivity(snapshot));
    }

    fn on_track(&self, track: Arc<TrackRemote>, receiver: Arc<RTCRtpReceiver>) {
        if self.detached.load(Ordering::SeqCst) {
            return;
        }

        let kind = match track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            other => {
                debug!(transport_id = self.id, kind = ?other, "ignoring track of unsupported kind");
                return;
            }
        };

        let info = TrackInfo {
            id: track.id(),
            kind,
            codec: track.codec().capability.mime_type,
        };
        let stream_id = track.stream_id();

        info!(
            transport_id = self.id,
            track_id = %info.id,
            stream_id = %stream_id,
            codec = %info.codec,
            "inbound track"
        );

        let admission = self.render.lock().admit(&stream_id, info.clone());
        match admission {
            Admission::Established(source) | Admission::Joined(source) => {
                self.emit(TransportEventKind::RenderSource(source));
            }
            Admission::Ignored => {
                debug!(
                    transport_id = self.id,
                    track_id = %info.id,
                    stream_id = %stream_id,
                    "track not part of the render source"
                );
            }
        }

        self.receivers.lock().push(receiver);
        self.readers.lock().push(spawn_reader(self.id, track, info));
    }
}

/// Drain RTP from an inbound track until it ends
fn spawn_reader(
    transport_id: TransportId,
    track: Arc<TrackRemote>,
    info: TrackInfo,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut packets: u64 = 0;
        let mut bytes: u64 = 0;

        loop {
            match track.read_rtp().await {
                Ok((packet, _)) => {
                    packets += 1;
                    bytes += packet.payload.len() as u64;
                    if packets % READER_LOG_INTERVAL == 0 {
                        debug!(transport_id, track_id = %info.id, packets, bytes, "inbound media");
                    }
                }
                Err(e) => {
                    debug!(
                        transport_id,
                        track_id = %info.id,
                        "RTP read ended: {} (connection may be closed)",
                        e
                    );
                    break;
                }
            }
        }

        debug!(transport_id, track_id = %info.id, packets, bytes, "inbound track finished");
    })
}

/// Transport over a webrtc-rs peer connection
///
/// Answers the provider's offer; the provider sends avatar audio/video and
/// this side only receives.
pub struct TransportManager {
    shared: Arc<Shared>,
    peer_connection: Arc<RTCPeerConnection>,
    negotiated: AtomicBool,
    closed: AtomicBool,
    ice_gathering_wait: Option<Duration>,
}

impl TransportManager {
    /// Create a peer connection configured with `ice_servers`
    #[instrument(skip_all, fields(transport_id = id))]
    pub async fn new(
        id: TransportId,
        ice_servers: &[IceServer],
        ice_gathering_wait: Option<Duration>,
        events: TransportEventSender,
    ) -> Result<Self> {
        // Create MediaEngine with default codecs
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let shared = Arc::new(Shared {
            id,
            events,
            detached: AtomicBool::new(false),
            connectivity: Mutex::new(ConnectivitySnapshot::default()),
            render: Mutex::new(RenderSlot::new()),
            receivers: Mutex::new(Vec::new()),
            readers: Mutex::new(Vec::new()),
        });

        let transport = Self {
            shared,
            peer_connection,
            negotiated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            ice_gathering_wait,
        };
        transport.attach_handlers();

        info!(
            transport_id = id,
            ice_servers = ice_servers.len(),
            "peer connection created"
        );

        Ok(transport)
    }

    fn attach_handlers(&self) {
        let shared = Arc::clone(&self.shared);
        self.peer_connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let shared = Arc::clone(&shared);
                Box::pin(async move {
                    shared.record_ice(state.into());
                })
            }));

        let shared = Arc::clone(&self.shared);
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let shared = Arc::clone(&shared);
                Box::pin(async move {
                    shared.record_peer(state.into());
                })
            }));

        let shared = Arc::clone(&self.shared);
        self.peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let shared = Arc::clone(&shared);
                Box::pin(async move {
                    shared.on_track(track, receiver);
                })
            },
        ));

        let shared = Arc::clone(&self.shared);
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let shared = Arc::clone(&shared);
                Box::pin(async move {
                    match candidate {
                        Some(candidate) => match candidate.to_json() {
                            Ok(init) => {
                                shared.emit(TransportEventKind::IceCandidate(init.candidate))
                            }
                            Err(e) => warn!(
                                transport_id = shared.id,
                                "Failed to serialize ICE candidate: {}", e
                            ),
                        },
                        None => shared.emit(TransportEventKind::IceGatheringComplete),
                    }
                })
            }));
    }

    /// Replace every callback with a no-op
    fn detach_handlers(&self) {
        self.peer_connection
            .on_ice_connection_state_change(Box::new(|_: RTCIceConnectionState| {
                Box::pin(async {})
            }));
        self.peer_connection
            .on_peer_connection_state_change(Box::new(|_: RTCPeerConnectionState| {
                Box::pin(async {})
            }));
        self.peer_connection.on_track(Box::new(
            |_: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                Box::pin(async {})
            },
        ));
        self.peer_connection
            .on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
    }
}

#[async_trait]
impl PeerTransport for TransportManager {
    fn id(&self) -> TransportId {
        self.shared.id
    }

    async fn negotiate(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::NegotiationError("transport is closed".to_string()));
        }
        if self.negotiated.swap(true, Ordering::SeqCst) {
            return Err(Error::NegotiationError(
                "transport already negotiated".to_string(),
            ));
        }
        if offer.kind != SdpKind::Offer {
            return Err(Error::NegotiationError(format!(
                "expected an offer, got {:?}",
                offer.kind
            )));
        }

        let remote = RTCSessionDescription::offer(offer.sdp.clone())
            .map_err(|e| Error::NegotiationError(format!("Failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(remote)
            .await
            .map_err(|e| {
                Error::NegotiationError(format!("Failed to set remote description: {}", e))
            })?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to create answer: {}", e)))?;

        // Must be obtained before set_local_description starts gathering
        let mut gathering_complete = self.peer_connection.gathering_complete_promise().await;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| {
                Error::NegotiationError(format!("Failed to set local description: {}", e))
            })?;

        if let Some(wait) = self.ice_gathering_wait {
            if tokio::time::timeout(wait, gathering_complete.recv())
                .await
                .is_err()
            {
                warn!(
                    transport_id = self.shared.id,
                    timeout_ms = wait.as_millis() as u64,
                    "ICE gathering incomplete, sending answer with candidates gathered so far"
                );
            }
        }

        let local = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::NegotiationError("No local description after setting answer".to_string())
            })?;

        debug!(transport_id = self.shared.id, "created SDP answer");

        Ok(SessionDescription::answer(local.sdp))
    }

    fn connectivity(&self) -> ConnectivitySnapshot {
        *self.shared.connectivity.lock()
    }

    fn render_source(&self) -> Option<RenderSource> {
        self.shared.render.lock().current().cloned()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(transport_id = self.shared.id, "closing peer connection");

        self.shared.detached.store(true, Ordering::SeqCst);
        self.detach_handlers();

        let readers: Vec<_> = self.shared.readers.lock().drain(..).collect();
        for reader in readers {
            reader.abort();
        }

        let receivers: Vec<_> = self.shared.receivers.lock().drain(..).collect();
        for receiver in receivers {
            if let Err(e) = receiver.stop().await {
                debug!(transport_id = self.shared.id, "Failed to stop receiver: {}", e);
            }
        }

        if let Err(e) = self.peer_connection.close().await {
            warn!(transport_id = self.shared.id, "Failed to close peer connection: {}", e);
        }

        self.shared.render.lock().clear();
        *self.shared.connectivity.lock() =
            ConnectivitySnapshot::new(IceConnectivity::Closed, PeerConnectivity::Closed);
    }
}

/// Creates [`TransportManager`]s
#[derive(Debug, Clone, Default)]
pub struct WebRtcTransportFactory {
    ice_gathering_wait: Option<Duration>,
}

impl WebRtcTransportFactory {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            ice_gathering_wait: config.ice_gathering_wait(),
        }
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        id: TransportId,
        ice_servers: &[IceServer],
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport =
            TransportManager::new(id, ice_servers, self.ice_gathering_wait, events).await?;
        Ok(Arc::new(transport))
    }
}
