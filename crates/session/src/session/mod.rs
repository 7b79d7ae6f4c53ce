//! Session lifecycle

mod controller;
pub mod state;

pub use controller::{SessionController, CONNECTED_STATUS};
pub use state::{Session, SessionState, Signal, Transition};
