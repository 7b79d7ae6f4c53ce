//! Session Test Harness
//!
//! Scripted collaborators for driving a `SessionController` without a relay or
//! a real peer connection:
//! - `MockSignaling`: records calls, returns canned initiate responses
//! - `MockTransportFactory` / `MockTransport`: transports whose connectivity
//!   and inbound tracks are pushed by the test
//! - `MockAgent`: queued agent replies
//!
//! Basic usage pattern:
//!
//! 1. Build a `SessionHarness` (optionally tweak the mocks)
//! 2. `harness.controller.start().await`
//! 3. Push connectivity with `harness.transport().report(...)`
//! 4. Wait for states with `harness.wait_for_state(...)`

#![allow(dead_code)]

pub mod mocks;

use avatarlink_session::{SessionController, SessionState, TurnProcessor};
use std::sync::Arc;
use std::time::Duration;

pub use mocks::{
    complete_initiate_response, Call, MockAgent, MockSignaling, MockTransport,
    MockTransportFactory,
};

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Default wait for asynchronous state changes
pub const WAIT: Duration = Duration::from_secs(2);

/// Initialize test logging (call once per test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,avatarlink_session=debug")
        .with_test_writer()
        .try_init();
}

/// Controller wired to scripted collaborators
pub struct SessionHarness {
    pub signaling: Arc<MockSignaling>,
    pub transports: Arc<MockTransportFactory>,
    pub agent: Arc<MockAgent>,
    pub controller: SessionController,
    pub turns: TurnProcessor,
}

impl SessionHarness {
    pub fn new() -> Self {
        Self::with_signaling(MockSignaling::new())
    }

    pub fn with_signaling(signaling: MockSignaling) -> Self {
        let signaling = Arc::new(signaling);
        let transports = Arc::new(MockTransportFactory::new());
        let agent = Arc::new(MockAgent::new());

        let controller = SessionController::new(signaling.clone(), transports.clone());
        let turns = TurnProcessor::new(controller.clone(), agent.clone());

        Self {
            signaling,
            transports,
            agent,
            controller,
            turns,
        }
    }

    /// Most recently created transport
    pub fn transport(&self) -> Arc<MockTransport> {
        self.transports
            .latest()
            .expect("no transport has been created")
    }

    /// Poll until the controller reaches `state`
    pub async fn wait_for_state(&self, state: SessionState) -> HarnessResult<()> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if self.controller.state() == state {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HarnessError::Timeout(format!(
                    "expected state {}, still {}",
                    state,
                    self.controller.state()
                )));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until `check` holds
    pub async fn wait_until(
        &self,
        what: &str,
        mut check: impl FnMut() -> bool,
    ) -> HarnessResult<()> {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !check() {
            if tokio::time::Instant::now() >= deadline {
                return Err(HarnessError::Timeout(what.to_string()));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    /// Start a session and bring its transport up
    pub async fn connect(&self) -> HarnessResult<()> {
        self.controller
            .start()
            .await
            .map_err(|e| HarnessError::ValidationError(format!("start failed: {e}")))?;
        self.transport().report_up();
        self.wait_for_state(SessionState::Connected).await
    }
}
