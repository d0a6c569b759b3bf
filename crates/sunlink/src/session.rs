//! Connection and playback session state
//!
//! [`SessionStateMachine`] tracks two things under one lock: how we are
//! connected to the DAW ([`ConnectionState`]) and what the session is doing
//! ([`SessionMode`]). Every effective change produces a
//! [`SessionStateChange`] for the registered observers.
//!
//! Rules:
//! - setting the current connection state again is a no-op, except
//!   `set_error`, which always notifies
//! - `set_error` and `set_disconnected` force the mode back to `Idle`
//! - setting the current mode again is a no-op
//!
//! Observers run without the state lock held, in registration order. An
//! observer may call back into the state machine; the resulting change is
//! delivered after the current notification round has reached every
//! observer. A change made while another thread is notifying is delivered by
//! that thread, after the changes queued before it.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::dispatch::EventQueue;
use crate::sync::lock;
use crate::transport::TransportState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TransportState> for ConnectionState {
    fn from(state: TransportState) -> Self {
        match state {
            TransportState::Disconnected => Self::Disconnected,
            TransportState::Connecting => Self::Connecting,
            TransportState::Connected => Self::Connected,
            TransportState::Reconnecting => Self::Reconnecting,
            TransportState::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    Playing,
    Recording,
    Overdubbing,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Recording => "recording",
            Self::Overdubbing => "overdubbing",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub mode: SessionMode,
}

/// What changed, delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateChange {
    pub old_connection: ConnectionState,
    pub new_connection: ConnectionState,
    pub old_mode: SessionMode,
    pub new_mode: SessionMode,
    pub message: String,
}

pub type SessionObserver = Box<dyn Fn(&SessionStateChange) + Send + Sync + 'static>;

#[derive(Default)]
pub struct SessionStateMachine {
    state: Mutex<SessionState>,
    observers: Mutex<Vec<Arc<dyn Fn(&SessionStateChange) + Send + Sync>>>,
    events: EventQueue<SessionStateChange>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot().connection
    }

    pub fn mode(&self) -> SessionMode {
        self.snapshot().mode
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn add_observer(&self, observer: SessionObserver) {
        lock(&self.observers).push(Arc::from(observer));
    }

    /// Remove every observer. There is no selective removal.
    pub fn clear_observers(&self) {
        lock(&self.observers).clear();
    }

    pub fn set_connected(&self) {
        self.set_connection(ConnectionState::Connected, "Connected".to_string(), false);
    }

    pub fn set_connecting(&self) {
        self.set_connection(ConnectionState::Connecting, "Connecting".to_string(), false);
    }

    pub fn set_reconnecting(&self, reason: &str) {
        self.set_connection(ConnectionState::Reconnecting, reason.to_string(), false);
    }

    /// Always notifies, even if already in `Error`. Forces `Idle`.
    pub fn set_error(&self, reason: &str) {
        self.set_connection(ConnectionState::Error, reason.to_string(), true);
    }

    /// Forces `Idle`.
    pub fn set_disconnected(&self, reason: &str) {
        self.set_connection(ConnectionState::Disconnected, reason.to_string(), false);
    }

    /// Follow a transport state callback.
    pub fn apply_transport_state(&self, state: TransportState, reason: &str) {
        match state {
            TransportState::Disconnected => self.set_disconnected(reason),
            TransportState::Connecting => self.set_connecting(),
            TransportState::Connected => self.set_connected(),
            TransportState::Reconnecting => self.set_reconnecting(reason),
            TransportState::Error => self.set_error(reason),
        }
    }

    pub fn set_mode(&self, mode: SessionMode) {
        {
            let mut state = lock(&self.state);
            if state.mode == mode {
                return;
            }
            let change = SessionStateChange {
                old_connection: state.connection,
                new_connection: state.connection,
                old_mode: state.mode,
                new_mode: mode,
                message: format!("Mode changed to {}", mode),
            };
            state.mode = mode;
            self.events.push(change);
        }
        self.notify();
    }

    pub fn start_playing(&self) {
        self.set_mode(SessionMode::Playing);
    }

    pub fn stop_playing(&self) {
        self.set_mode(SessionMode::Idle);
    }

    pub fn start_recording(&self) {
        self.set_mode(SessionMode::Recording);
    }

    /// Recording stops but the transport keeps running.
    pub fn stop_recording(&self) {
        self.set_mode(SessionMode::Playing);
    }

    pub fn start_overdubbing(&self) {
        self.set_mode(SessionMode::Overdubbing);
    }

    fn set_connection(&self, target: ConnectionState, message: String, always_notify: bool) {
        {
            let mut state = lock(&self.state);
            if state.connection == target && !always_notify {
                return;
            }
            let new_mode = match target {
                ConnectionState::Disconnected | ConnectionState::Error => SessionMode::Idle,
                _ => state.mode,
            };
            let change = SessionStateChange {
                old_connection: state.connection,
                new_connection: target,
                old_mode: state.mode,
                new_mode,
                message,
            };
            debug!(
                "Session {} -> {} ({})",
                change.old_connection, change.new_connection, change.message
            );
            state.connection = target;
            state.mode = new_mode;
            self.events.push(change);
        }
        self.notify();
    }

    fn notify(&self) {
        self.events.dispatch(|change| {
            let observers = lock(&self.observers).clone();
            for observer in &observers {
                observer(&change);
            }
        });
    }
}
