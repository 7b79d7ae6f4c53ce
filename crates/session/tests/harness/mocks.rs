//! Scripted collaborators

use async_trait::async_trait;
use avatarlink_session::signaling::InitiateResponse;
use avatarlink_session::transport::{
    Admission, IceConnectivity, PeerConnectivity, RenderSlot, TrackInfo, TransportEventSender,
};
use avatarlink_session::{
    AgentClient, AgentReply, ConnectivitySnapshot, Error, IceServer, PeerTransport, RenderSource,
    Result, SessionDescription, Signaling, StreamCredentials, StreamOffer, TransportEvent,
    TransportEventKind, TransportFactory, TransportId, TurnInput,
};
use avatarlink_session::signaling::ProviderAck;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Initiate response carrying all four session fields and a greeting
pub fn complete_initiate_response() -> InitiateResponse {
    InitiateResponse {
        stream_id: Some("strm_test".to_string()),
        session_token: Some("sess_test".to_string()),
        offer: Some(SessionDescription::offer("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n")),
        ice_servers: Some(vec![IceServer::new("stun:stun.example.com:3478")]),
        greeting: Some("Halo! Ada yang bisa saya bantu?".to_string()),
        error: None,
    }
}

/// A recorded signaling call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initiate,
    SubmitAnswer(StreamCredentials, SessionDescription),
    RequestTalk(StreamCredentials, String),
    Destroy(StreamCredentials),
}

// ============================================================================
// Signaling
// ============================================================================

pub struct MockSignaling {
    initiate_response: Mutex<std::result::Result<InitiateResponse, Error>>,
    /// When set, initiate waits for a notification before answering
    initiate_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, submit_answer waits for a notification before answering
    submit_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, destroy_session waits for a notification before answering
    destroy_gate: Mutex<Option<Arc<Notify>>>,
    pub fail_submit: AtomicBool,
    pub fail_talk: AtomicBool,
    pub fail_destroy: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl MockSignaling {
    pub fn new() -> Self {
        Self::with_response(complete_initiate_response())
    }

    pub fn with_response(response: InitiateResponse) -> Self {
        Self {
            initiate_response: Mutex::new(Ok(response)),
            initiate_gate: Mutex::new(None),
            submit_gate: Mutex::new(None),
            destroy_gate: Mutex::new(None),
            fail_submit: AtomicBool::new(false),
            fail_talk: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Initiate fails the way a non-OK relay response does
    pub fn failing_initiate(status: u16, message: &str) -> Self {
        let signaling = Self::new();
        *signaling.initiate_response.lock() = Err(Error::signaling_status(status, message));
        signaling
    }

    /// Hold initiate until the returned handle is notified
    pub fn gate_initiate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.initiate_gate.lock() = Some(gate.clone());
        gate
    }

    /// Hold submit_answer until the returned handle is notified
    pub fn gate_submit(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock() = Some(gate.clone());
        gate
    }

    /// Hold destroy_session until the returned handle is notified
    pub fn gate_destroy(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.destroy_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn initiates(&self) -> usize {
        self.count(|c| matches!(c, Call::Initiate))
    }

    pub fn destroys(&self) -> usize {
        self.count(|c| matches!(c, Call::Destroy(_)))
    }

    pub fn talks(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::RequestTalk(_, text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn clone_initiate_response(&self) -> Result<InitiateResponse> {
        match &*self.initiate_response.lock() {
            Ok(response) => Ok(response.clone()),
            Err(Error::SignalingError { status, message }) => Err(Error::SignalingError {
                status: *status,
                message: message.clone(),
            }),
            Err(other) => Err(Error::signaling(other.to_string())),
        }
    }
}

#[async_trait]
impl Signaling for MockSignaling {
    async fn initiate(&self) -> Result<StreamOffer> {
        self.calls.lock().push(Call::Initiate);
        let gate = self.initiate_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.clone_initiate_response()?.into_offer()
    }

    async fn submit_answer(
        &self,
        credentials: &StreamCredentials,
        answer: &SessionDescription,
    ) -> Result<ProviderAck> {
        self.calls
            .lock()
            .push(Call::SubmitAnswer(credentials.clone(), answer.clone()));
        let gate = self.submit_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(Error::signaling_status(500, "answer rejected"));
        }
        Ok(ProviderAck {
            status: Some("success".to_string()),
            provider_response: None,
        })
    }

    async fn request_talk(
        &self,
        credentials: &StreamCredentials,
        text: &str,
    ) -> Result<ProviderAck> {
        self.calls
            .lock()
            .push(Call::RequestTalk(credentials.clone(), text.to_string()));
        if self.fail_talk.load(Ordering::SeqCst) {
            return Err(Error::signaling_status(502, "talk rejected"));
        }
        Ok(ProviderAck::default())
    }

    async fn destroy_session(&self, credentials: &StreamCredentials) -> Result<()> {
        self.calls.lock().push(Call::Destroy(credentials.clone()));
        let gate = self.destroy_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(Error::signaling_status(404, "stream not found"));
        }
        Ok(())
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct MockTransport {
    id: TransportId,
    events: TransportEventSender,
    fail_negotiation: bool,
    connectivity: Mutex<ConnectivitySnapshot>,
    render: Mutex<RenderSlot>,
    closed: AtomicBool,
    negotiations: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn negotiations(&self) -> usize {
        self.negotiations.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Push a connectivity report as the peer connection would
    pub fn report(&self, ice: IceConnectivity, peer: PeerConnectivity) {
        if self.is_closed() {
            return;
        }
        let snapshot = ConnectivitySnapshot::new(ice, peer);
        *self.connectivity.lock() = snapshot;
        let _ = self.events.send(TransportEvent::new(
            self.id,
            TransportEventKind::Connectivity(snapshot),
        ));
    }

    pub fn report_up(&self) {
        self.report(IceConnectivity::Connected, PeerConnectivity::Connected);
    }

    /// Deliver an inbound track; empty `stream_id` means a bare track
    pub fn deliver_track(&self, stream_id: &str, track: TrackInfo) {
        if self.is_closed() {
            return;
        }
        let admission = self.render.lock().admit(stream_id, track);
        if let Admission::Established(source) | Admission::Joined(source) = admission {
            let _ = self.events.send(TransportEvent::new(
                self.id,
                TransportEventKind::RenderSource(source),
            ));
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    async fn negotiate(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        if self.negotiations.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(Error::NegotiationError(
                "transport already negotiated".to_string(),
            ));
        }
        if self.fail_negotiation {
            return Err(Error::NegotiationError(
                "Failed to set remote description: malformed offer".to_string(),
            ));
        }
        Ok(SessionDescription::answer(format!(
            "{}a=mock-answer:{}\r\n",
            offer.sdp, self.id
        )))
    }

    fn connectivity(&self) -> ConnectivitySnapshot {
        *self.connectivity.lock()
    }

    fn render_source(&self) -> Option<RenderSource> {
        self.render.lock().current().cloned()
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.render.lock().clear();
        *self.connectivity.lock() =
            ConnectivitySnapshot::new(IceConnectivity::Closed, PeerConnectivity::Closed);
    }
}

pub struct MockTransportFactory {
    pub fail_negotiation: AtomicBool,
    created: Mutex<Vec<Arc<MockTransport>>>,
    ice_servers: Mutex<Vec<Vec<IceServer>>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self {
            fail_negotiation: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            ice_servers: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created.lock().clone()
    }

    pub fn latest(&self) -> Option<Arc<MockTransport>> {
        self.created.lock().last().cloned()
    }

    /// ICE servers passed to each create call
    pub fn ice_servers(&self) -> Vec<Vec<IceServer>> {
        self.ice_servers.lock().clone()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        id: TransportId,
        ice_servers: &[IceServer],
        events: TransportEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = Arc::new(MockTransport {
            id,
            events,
            fail_negotiation: self.fail_negotiation.load(Ordering::SeqCst),
            connectivity: Mutex::new(ConnectivitySnapshot::default()),
            render: Mutex::new(RenderSlot::new()),
            closed: AtomicBool::new(false),
            negotiations: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        });
        self.created.lock().push(transport.clone());
        self.ice_servers.lock().push(ice_servers.to_vec());
        Ok(transport)
    }
}

// ============================================================================
// Agent
// ============================================================================

pub struct MockAgent {
    replies: Mutex<VecDeque<Result<AgentReply>>>,
    inputs: Mutex<Vec<TurnInput>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            inputs: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn reply(&self, text: &str, user_text: Option<&str>) {
        self.replies.lock().push_back(Ok(AgentReply {
            agent_response_text: text.to_string(),
            user_text: user_text.map(str::to_string),
        }));
    }

    pub fn fail(&self, status: u16, message: &str) {
        self.replies
            .lock()
            .push_back(Err(Error::signaling_status(status, message)));
    }

    /// Hold each response until the returned handle is notified
    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().len()
    }

    pub fn inputs(&self) -> Vec<TurnInput> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl AgentClient for MockAgent {
    async fn respond(&self, input: &TurnInput) -> Result<AgentReply> {
        self.inputs.lock().push(input.clone());
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::signaling("no scripted reply")))
    }
}
