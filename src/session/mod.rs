//! Recording and playing sessions over a shared transport

pub mod controller;
pub mod handlers;
pub mod service;
pub mod state;

pub use controller::SessionController;
pub use handlers::{ControlNotice, MonitorFlags};
pub use service::{SessionCommand, SessionHandle, SessionService};
pub use state::{
    ControllerState, ErrorStatus, EventHub, PlaybackTarget, SessionEvent, SessionMode, SessionPhase,
    SessionState, SharedSessionState,
};
