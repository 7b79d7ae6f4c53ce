//! Session controller
//!
//! Owns the single authoritative [`Session`] and the single active transport.
//! Every path that ends a session, whether explicit destroy, connectivity
//! loss, or a failed start, converges on [`SessionController::reset`].
//!
//! Operations suspend on network calls without holding any lock. Each start
//! and each reset bumps a generation counter; a result that comes back after
//! its generation ended is discarded.

use super::state::{Session, SessionState, Signal, Transition};
use crate::chat::{ChatEntry, ChatLog};
use crate::config::SessionConfig;
use crate::events::{SessionEvent, StatusLevel};
use crate::signaling::{IceServer, Signaling, StreamCredentials, StreamOffer};
use crate::transport::{
    Connectivity, ConnectivitySnapshot, PeerTransport, RenderSource, TransportEvent,
    TransportEventKind, TransportFactory, TransportId,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Status line shown once the avatar is ready
pub const CONNECTED_STATUS: &str = "Connected to avatar. Ready to chat.";

struct Shared {
    session: Session,
    generation: u64,
    transport: Option<Arc<dyn PeerTransport>>,
    /// Last generation that ended through connectivity loss, with its detail
    lost: Option<(u64, String)>,
}

impl Shared {
    fn active_transport_id(&self) -> Option<TransportId> {
        self.transport.as_ref().map(|t| t.id())
    }
}

struct Inner {
    signaling: Arc<dyn Signaling>,
    transports: Arc<dyn TransportFactory>,
    shared: Mutex<Shared>,
    chat: Mutex<ChatLog>,
    events: broadcast::Sender<SessionEvent>,
    transport_events: mpsc::UnboundedSender<TransportEvent>,
    next_transport_id: AtomicU64,
    /// Serializes transport teardown and creation
    transport_gate: tokio::sync::Mutex<()>,
    /// Held for the whole of a destroy
    destroy_gate: tokio::sync::Mutex<()>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

/// Snapshot handed to a turn: which session it belongs to
pub(crate) struct TurnContext {
    pub generation: u64,
    pub credentials: StreamCredentials,
}

/// Coordinates signaling, transport and chat for one avatar session at a time
///
/// Cheap to clone; clones share the same session. Must be created inside a
/// tokio runtime (a background task consumes transport events).
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(signaling: Arc<dyn Signaling>, transports: Arc<dyn TransportFactory>) -> Self {
        Self::with_config(&SessionConfig::default(), signaling, transports)
    }

    pub fn with_config(
        config: &SessionConfig,
        signaling: Arc<dyn Signaling>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (transport_events, transport_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            signaling,
            transports,
            shared: Mutex::new(Shared {
                session: Session::default(),
                generation: 0,
                transport: None,
                lost: None,
            }),
            chat: Mutex::new(ChatLog::new()),
            events,
            transport_events,
            next_transport_id: AtomicU64::new(0),
            transport_gate: tokio::sync::Mutex::new(()),
            destroy_gate: tokio::sync::Mutex::new(()),
            pump: Mutex::new(None),
        });

        let pump = tokio::spawn(pump_transport_events(Arc::downgrade(&inner), transport_rx));
        *inner.pump.lock() = Some(pump);

        Self { inner }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.shared.lock().session.state
    }

    /// Copy of the current session record
    pub fn session(&self) -> Session {
        self.inner.shared.lock().session.clone()
    }

    pub fn credentials(&self) -> Option<StreamCredentials> {
        self.inner.shared.lock().session.credentials.clone()
    }

    /// Chat history, oldest first
    pub fn chat(&self) -> Vec<ChatEntry> {
        self.inner.chat.lock().entries().to_vec()
    }

    /// Render source of the active transport
    pub fn render_source(&self) -> Option<RenderSource> {
        let transport = self.inner.shared.lock().transport.clone();
        transport.and_then(|t| t.render_source())
    }

    /// Live connectivity of the active transport
    pub fn transport_connectivity(&self) -> Option<ConnectivitySnapshot> {
        let transport = self.inner.shared.lock().transport.clone();
        transport.map(|t| t.connectivity())
    }

    /// Open a new session
    ///
    /// No-op while a session is active. On a fatal error the session is reset
    /// (transport closed) before the error is returned. If the session ended
    /// while the start was in flight, returns [`Error::ConnectivityLost`] when
    /// the transport dropped and [`Error::Superseded`] otherwise.
    pub async fn start(&self) -> Result<()> {
        let generation = {
            let mut shared = self.inner.shared.lock();
            if shared.session.is_active() {
                debug!(state = %shared.session.state, "start ignored, session already active");
                return Ok(());
            }
            shared.generation += 1;
            shared.session = Session {
                state: SessionState::Connecting,
                ..Default::default()
            };
            shared.generation
        };

        self.inner.chat.lock().clear();
        info!(generation, "starting session");
        self.emit(SessionEvent::StateChanged {
            from: SessionState::Idle,
            to: SessionState::Connecting,
        });
        self.status(StatusLevel::Info, "Connecting…");

        match self.establish(generation).await {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(err, Error::Superseded) || self.ensure_current(generation).is_err() =>
            {
                let reason = self.ended_because(generation);
                info!(generation, "session start interrupted: {}", reason);
                Err(reason)
            }
            Err(err) => {
                self.fail(generation, &err).await;
                Err(err)
            }
        }
    }

    async fn establish(&self, generation: u64) -> Result<()> {
        let initiated = self.inner.signaling.initiate().await;
        if !self.is_current(generation) {
            if let Ok(offer) = &initiated {
                self.discard_orphan(&offer.credentials).await;
            }
            return Err(Error::Superseded);
        }

        let StreamOffer {
            credentials,
            offer,
            ice_servers,
            greeting,
        } = initiated?;

        self.transition(generation, SessionState::AwaitingTransport, |session| {
            session.credentials = Some(credentials.clone());
        })?;
        info!(
            stream_id = %credentials.stream_id,
            ice_servers = ice_servers.len(),
            "stream initiated"
        );

        if let Some(greeting) = greeting {
            self.append_chat(generation, ChatEntry::agent(greeting));
        }

        let transport = self.replace_transport(generation, &ice_servers).await?;
        let answer = transport.negotiate(&offer).await?;
        self.ensure_current(generation)?;

        self.inner
            .signaling
            .submit_answer(&credentials, &answer)
            .await?;
        self.ensure_current(generation)?;
        debug!(stream_id = %credentials.stream_id, "answer accepted by provider");

        let reduced = self.reduce(Signal::AnswerAccepted, |shared| {
            shared.generation == generation
                && shared.session.state == SessionState::AwaitingTransport
        });
        match reduced {
            Some((transition, generation, _)) => {
                if transition == Transition::Unchanged {
                    self.status(StatusLevel::Info, "Waiting for media connection…");
                }
                self.follow(transition, generation, "answer accepted").await;
                Ok(())
            }
            None => Err(Error::Superseded),
        }
    }

    /// Close any previous transport and install a fresh one
    async fn replace_transport(
        &self,
        generation: u64,
        ice_servers: &[IceServer],
    ) -> Result<Arc<dyn PeerTransport>> {
        let _gate = self.inner.transport_gate.lock().await;

        let previous = self.inner.shared.lock().transport.take();
        if let Some(previous) = previous {
            debug!(transport_id = previous.id(), "closing previous transport");
            previous.close().await;
        }

        let id = self.inner.next_transport_id.fetch_add(1, Ordering::SeqCst) + 1;
        let transport = self
            .inner
            .transports
            .create(id, ice_servers, self.inner.transport_events.clone())
            .await?;

        let installed = {
            let mut shared = self.inner.shared.lock();
            if shared.generation == generation {
                shared.transport = Some(Arc::clone(&transport));
                true
            } else {
                false
            }
        };

        if !installed {
            transport.close().await;
            return Err(Error::Superseded);
        }

        debug!(transport_id = id, "transport installed");
        Ok(transport)
    }

    /// Feed one transport event through the session reducer
    ///
    /// Events from a transport other than the active one are ignored.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        let transport_id = event.transport_id;
        if self.inner.shared.lock().active_transport_id() != Some(transport_id) {
            debug!(transport_id, "ignoring event from inactive transport");
            return;
        }

        match event.kind {
            TransportEventKind::Connectivity(snapshot) => {
                self.emit(SessionEvent::Transport(snapshot));
                let connectivity = snapshot.derive();

                let reduced = self.reduce(Signal::Connectivity(connectivity), |shared| {
                    shared.active_transport_id() == Some(transport_id)
                });
                let Some((transition, generation, answer_submitted)) = reduced else {
                    return;
                };

                if transition == Transition::Unchanged
                    && connectivity == Connectivity::Up
                    && !answer_submitted
                {
                    debug!(
                        transport_id,
                        "transport connected, waiting for the provider to accept the answer"
                    );
                }

                self.follow(transition, generation, &snapshot.describe())
                    .await;
            }
            TransportEventKind::RenderSource(source) => {
                info!(
                    transport_id,
                    stream_id = %source.stream_id,
                    tracks = source.tracks.len(),
                    synthetic = source.synthetic,
                    "render source updated"
                );
                self.emit(SessionEvent::RenderSource(Some(source)));
            }
            TransportEventKind::IceCandidate(candidate) => {
                debug!(transport_id, candidate = %candidate, "local ICE candidate");
            }
            TransportEventKind::IceGatheringComplete => {
                debug!(transport_id, "local ICE gathering complete");
            }
        }
    }

    /// Close the session
    ///
    /// Best-effort remote destroy (skipped when no stream exists), then
    /// unconditional local reset. Never fails; safe to call repeatedly.
    /// Concurrent calls wait for the running teardown and find nothing left
    /// to close.
    pub async fn destroy(&self) {
        let _teardown = self.inner.destroy_gate.lock().await;
        let (credentials, from) = {
            let mut shared = self.inner.shared.lock();
            let credentials = shared.session.credentials.clone();
            let from = shared.session.state;
            if credentials.is_some() && from != SessionState::Closing {
                shared.session.state = SessionState::Closing;
            }
            (credentials, from)
        };

        match credentials {
            Some(credentials) => {
                if from != SessionState::Closing {
                    self.emit(SessionEvent::StateChanged {
                        from,
                        to: SessionState::Closing,
                    });
                }
                info!(stream_id = %credentials.stream_id, "destroying remote stream");

                if let Err(e) = self.inner.signaling.destroy_session(&credentials).await {
                    warn!(
                        stream_id = %credentials.stream_id,
                        "Remote destroy failed, continuing with local teardown: {}", e
                    );
                    self.status(
                        StatusLevel::Warning,
                        format!("Failed to close remote stream: {}", e),
                    );
                }
            }
            None => debug!(state = %from, "no remote stream, local teardown only"),
        }

        self.reset().await;
        if from != SessionState::Idle {
            self.status(StatusLevel::Info, "Disconnected");
        }
    }

    /// Return to Idle: close the transport, clear all session fields
    ///
    /// Idempotent. Chat history is kept.
    pub async fn reset(&self) {
        let (from, transport) = {
            let mut shared = self.inner.shared.lock();
            shared.generation += 1;
            let from = shared.session.state;
            shared.session = Session::default();
            (from, shared.transport.take())
        };

        let had_transport = transport.is_some();
        if let Some(transport) = transport {
            let _gate = self.inner.transport_gate.lock().await;
            transport.close().await;
        }

        if from != SessionState::Idle {
            info!(from = %from, "session reset");
            self.emit(SessionEvent::StateChanged {
                from,
                to: SessionState::Idle,
            });
        }
        if had_transport {
            self.emit(SessionEvent::RenderSource(None));
        }
    }

    /// Mark the session Failed and reset it, unless it already moved on
    async fn fail(&self, generation: u64, err: &Error) {
        let from = {
            let mut shared = self.inner.shared.lock();
            if shared.generation != generation {
                return;
            }
            let from = shared.session.state;
            shared.session.state = SessionState::Failed;
            if let Error::ConnectivityLost(detail) = err {
                shared.lost = Some((generation, detail.clone()));
            }
            from
        };

        error!(generation, state = %from, "session failed: {}", err);
        if from != SessionState::Failed {
            self.emit(SessionEvent::StateChanged {
                from,
                to: SessionState::Failed,
            });
        }
        self.status(StatusLevel::Error, err.to_string());
        self.reset().await;
    }

    /// Best-effort destroy of a stream whose session was reset before it arrived
    async fn discard_orphan(&self, credentials: &StreamCredentials) {
        warn!(
            stream_id = %credentials.stream_id,
            "stream initiated after session reset, destroying it"
        );
        if let Err(e) = self.inner.signaling.destroy_session(credentials).await {
            warn!(
                stream_id = %credentials.stream_id,
                "Failed to destroy orphaned stream: {}", e
            );
        }
    }

    /// Apply a signal under the lock if `accept` agrees
    ///
    /// Returns the transition, the generation it applied to and whether the
    /// answer has been accepted.
    fn reduce(
        &self,
        signal: Signal,
        accept: impl FnOnce(&Shared) -> bool,
    ) -> Option<(Transition, u64, bool)> {
        let mut shared = self.inner.shared.lock();
        if !accept(&shared) {
            return None;
        }
        let transition = shared.session.apply(signal);
        Some((
            transition,
            shared.generation,
            shared.session.answer_submitted,
        ))
    }

    async fn follow(&self, transition: Transition, generation: u64, detail: &str) {
        match transition {
            Transition::Unchanged => {}
            Transition::BecameConnected => {
                info!(generation, detail, "session connected");
                self.emit(SessionEvent::StateChanged {
                    from: SessionState::AwaitingTransport,
                    to: SessionState::Connected,
                });
                self.status(StatusLevel::Info, CONNECTED_STATUS);
            }
            Transition::Lost => {
                let err = Error::ConnectivityLost(detail.to_string());
                warn!(generation, "{}", err);
                self.fail(generation, &err).await;
            }
        }
    }

    fn transition(
        &self,
        generation: u64,
        to: SessionState,
        update: impl FnOnce(&mut Session),
    ) -> Result<()> {
        let from = {
            let mut shared = self.inner.shared.lock();
            if shared.generation != generation {
                return Err(Error::Superseded);
            }
            let from = shared.session.state;
            update(&mut shared.session);
            shared.session.state = to;
            from
        };
        self.emit(SessionEvent::StateChanged { from, to });
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.shared.lock().generation == generation
    }

    /// Ok while `generation` is live and not being destroyed
    fn ensure_current(&self, generation: u64) -> Result<()> {
        let shared = self.inner.shared.lock();
        if shared.generation == generation && shared.session.state != SessionState::Closing {
            Ok(())
        } else {
            Err(Error::Superseded)
        }
    }

    /// Why `generation` ended before its start completed
    fn ended_because(&self, generation: u64) -> Error {
        match &self.inner.shared.lock().lost {
            Some((lost, detail)) if *lost == generation => {
                Error::ConnectivityLost(detail.clone())
            }
            _ => Error::Superseded,
        }
    }

    fn append_chat(&self, generation: u64, entry: ChatEntry) -> bool {
        {
            let shared = self.inner.shared.lock();
            if shared.generation != generation {
                return false;
            }
            self.inner.chat.lock().append(entry.clone());
        }
        self.emit(SessionEvent::Chat(entry));
        true
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn status(&self, level: StatusLevel, message: impl Into<String>) {
        self.emit(SessionEvent::status(level, message));
    }

    pub(crate) fn signaling(&self) -> &Arc<dyn Signaling> {
        &self.inner.signaling
    }

    /// Current generation and credentials, if the session is Connected
    pub(crate) fn turn_context(&self) -> Result<TurnContext> {
        let shared = self.inner.shared.lock();
        let state = shared.session.state;
        if state != SessionState::Connected {
            return Err(Error::NotConnected(state));
        }
        let credentials = shared
            .session
            .credentials
            .clone()
            .ok_or(Error::NotConnected(state))?;
        Ok(TurnContext {
            generation: shared.generation,
            credentials,
        })
    }

    /// Append a turn's chat entries and queue its reply for speech
    ///
    /// Returns false (and changes nothing) if the session was reset since
    /// `generation`.
    pub(crate) fn record_turn(
        &self,
        generation: u64,
        transcript: Option<&str>,
        reply: &str,
    ) -> bool {
        let mut entries = Vec::with_capacity(2);
        if let Some(transcript) = transcript.map(str::trim).filter(|t| !t.is_empty()) {
            entries.push(ChatEntry::user(transcript));
        }
        entries.push(ChatEntry::agent(reply));

        {
            let mut shared = self.inner.shared.lock();
            if shared.generation != generation {
                return false;
            }
            shared.session.pending_speech_text = Some(reply.to_string());
            let mut chat = self.inner.chat.lock();
            for entry in &entries {
                chat.append(entry.clone());
            }
        }

        for entry in entries {
            self.emit(SessionEvent::Chat(entry));
        }
        true
    }

    /// Whether the active transport can carry avatar speech right now
    pub(crate) fn speech_ready(&self) -> bool {
        let transport = self.inner.shared.lock().transport.clone();
        transport.map(|t| t.connectivity().is_up()).unwrap_or(false)
    }

    pub(crate) fn clear_pending_speech(&self, generation: u64) {
        let mut shared = self.inner.shared.lock();
        if shared.generation == generation {
            shared.session.pending_speech_text = None;
        }
    }
}

async fn pump_transport_events(
    inner: Weak<Inner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        SessionController { inner }
            .handle_transport_event(event)
            .await;
    }
}
