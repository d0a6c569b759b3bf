//! Connection supervisor shared by the stream and datagram transports
//!
//! A [`Link`] owns the state, the callbacks, the write half of the socket and
//! the worker threads. What differs per protocol (opening a socket, writing a
//! message, polling for the next one) is supplied by a [`Channel`].
//!
//! Threads: one receive thread per live connection. When it loses the
//! connection it spawns one reconnect thread and exits; the reconnect thread
//! spawns the next receive thread once a new connection is up and exits in
//! turn. Each spawner first joins the previous thread of the kind it is
//! replacing, so at most one of each is ever alive, and `disconnect()` joins
//! whatever is left.
//!
//! Workers never wait on the event queue. Once `stop` is set the only
//! transition still applied is the final `Disconnected`.

use std::cell::Cell;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{TransportConfig, TransportState, POLL_INTERVAL};
use crate::backoff::Backoff;
use crate::dispatch::EventQueue;
use crate::error::TransportError;
use crate::sync::lock;

/// Outcome of one bounded wait on the read half.
pub(crate) enum Poll<'a> {
    Message(&'a [u8]),
    Idle,
    Lost(String),
}

/// Protocol-specific socket handling.
pub(crate) trait Channel: 'static {
    type Writer: Send + 'static;
    type Reader: Send + 'static;

    /// Used in thread names and log lines.
    const NAME: &'static str;

    fn max_payload() -> usize;

    fn port(config: &TransportConfig) -> u16;

    fn open(
        config: &TransportConfig,
        addr: SocketAddr,
    ) -> Result<(Self::Writer, Self::Reader), TransportError>;

    fn write(writer: &mut Self::Writer, bytes: &[u8]) -> io::Result<()>;

    /// Close the socket so a blocked reader wakes up.
    fn close(writer: &Self::Writer);

    /// Wait at most [`POLL_INTERVAL`] for the next message.
    fn poll(reader: &mut Self::Reader) -> Poll<'_>;

    /// Whether a failed write means the connection is gone.
    fn is_fatal_send_error(_err: &io::Error) -> bool {
        true
    }
}

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

fn mark_worker() {
    ON_WORKER.with(|w| w.set(true));
}

fn on_worker() -> bool {
    ON_WORKER.with(Cell::get)
}

type MessageFn = dyn Fn(&[u8]) + Send + Sync;
type StateFn = dyn Fn(TransportState, &str) + Send + Sync;

struct StateEvent {
    state: TransportState,
    reason: String,
}

#[derive(Default)]
struct Workers {
    receive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

pub(crate) struct Link<C: Channel> {
    config: TransportConfig,
    state: Mutex<TransportState>,
    events: EventQueue<StateEvent>,
    on_message: Mutex<Option<Arc<MessageFn>>>,
    on_state: Mutex<Option<Arc<StateFn>>>,
    writer: Mutex<Option<C::Writer>>,
    workers: Mutex<Workers>,
    /// Set by `disconnect()`; polled by every worker loop.
    stop: AtomicBool,
    /// Set by a failed send so the receive loop takes the reconnect path.
    reset: AtomicBool,
}

impl<C: Channel> Link<C> {
    pub(crate) fn new(config: TransportConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(TransportState::Disconnected),
            events: EventQueue::new(),
            on_message: Mutex::new(None),
            on_state: Mutex::new(None),
            writer: Mutex::new(None),
            workers: Mutex::new(Workers::default()),
            stop: AtomicBool::new(false),
            reset: AtomicBool::new(false),
        })
    }

    pub(crate) fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> TransportState {
        *lock(&self.state)
    }

    pub(crate) fn set_message_callback(&self, callback: super::MessageCallback) {
        *lock(&self.on_message) = Some(Arc::from(callback));
    }

    pub(crate) fn set_state_callback(&self, callback: super::StateCallback) {
        *lock(&self.on_state) = Some(Arc::from(callback));
    }

    pub(crate) fn connect(self: &Arc<Self>) -> Result<(), TransportError> {
        self.begin_connect()?;
        info!("Connecting {} transport to {}", C::NAME, self.target());

        let (writer, reader, addr) = match self.open() {
            Ok(opened) => opened,
            Err(e) => {
                warn!("{} connect to {} failed: {}", C::NAME, self.target(), e);
                self.transition(TransportState::Error, e.to_string());
                return Err(e);
            }
        };

        if let Err(e) = self.establish(writer, reader, format!("Connected to {}", addr)) {
            self.close_writer();
            self.transition(TransportState::Error, e.to_string());
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn disconnect(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.close_writer();

        let me = thread::current().id();
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut workers = lock(&self.workers);
                [workers.receive.take(), workers.reconnect.take()]
                    .into_iter()
                    .flatten()
                    .collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.thread().id() == me {
                    debug!("{} disconnect() called from its own worker thread", C::NAME);
                    continue;
                }
                join_worker(handle);
            }
        }

        if self.state() != TransportState::Disconnected {
            info!("{} transport to {} disconnected", C::NAME, self.target());
        }
        self.transition(TransportState::Disconnected, "Disconnected");
        // a user thread may still be delivering a state callback; workers
        // skip this so a callback joining them cannot wait on them in turn
        if !on_worker() {
            self.events.wait_idle();
        }
    }

    pub(crate) fn send(&self, bytes: &[u8]) -> bool {
        if bytes.len() > C::max_payload() {
            warn!(
                "{} send rejected: {} bytes exceeds the {}-byte limit",
                C::NAME,
                bytes.len(),
                C::max_payload()
            );
            return false;
        }

        let mut slot = lock(&self.writer);
        let Some(writer) = slot.as_mut() else {
            return false;
        };
        match C::write(writer, bytes) {
            Ok(()) => true,
            Err(e) if !C::is_fatal_send_error(&e) => {
                debug!("{} send to {} dropped: {}", C::NAME, self.target(), e);
                false
            }
            Err(e) => {
                if let Some(writer) = slot.take() {
                    C::close(&writer);
                }
                drop(slot);
                warn!("{} send to {} failed: {}", C::NAME, self.target(), e);
                self.reset.store(true, Ordering::Release);
                self.transition(TransportState::Error, format!("Send failed: {}", e));
                false
            }
        }
    }

    /// Move to `Connecting` unless a connection is already up or in progress.
    fn begin_connect(&self) -> Result<(), TransportError> {
        {
            let mut workers = lock(&self.workers);
            if workers.receive.as_ref().is_some_and(|h| !h.is_finished())
                || workers.reconnect.as_ref().is_some_and(|h| !h.is_finished())
            {
                return Err(TransportError::AlreadyConnected);
            }
            // leftovers from a link that gave up
            for handle in [workers.receive.take(), workers.reconnect.take()]
                .into_iter()
                .flatten()
            {
                join_worker(handle);
            }
        }

        let reason = format!("Connecting to {}", self.target());
        {
            let mut state = lock(&self.state);
            if matches!(
                *state,
                TransportState::Connecting | TransportState::Connected | TransportState::Reconnecting
            ) {
                return Err(TransportError::AlreadyConnected);
            }
            self.stop.store(false, Ordering::SeqCst);
            self.reset.store(false, Ordering::SeqCst);
            self.apply(&mut state, TransportState::Connecting, reason);
        }
        self.flush_events();
        Ok(())
    }

    fn target(&self) -> String {
        format!("{}:{}", self.config.host(), C::port(&self.config))
    }

    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        let host = self.config.host();
        let port = C::port(&self.config);
        let resolve_err = |reason: String| TransportError::Resolve {
            host: host.to_string(),
            port,
            reason,
        };
        (host, port)
            .to_socket_addrs()
            .map_err(|e| resolve_err(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_err("no addresses".to_string()))
    }

    fn open(&self) -> Result<(C::Writer, C::Reader, SocketAddr), TransportError> {
        let addr = self.resolve()?;
        let (writer, reader) = C::open(&self.config, addr)?;
        Ok((writer, reader, addr))
    }

    /// Install a fresh connection: writer first, then `Connected`, then the
    /// receive thread, so no message is delivered before the state change.
    fn establish(
        self: &Arc<Self>,
        writer: C::Writer,
        reader: C::Reader,
        reason: String,
    ) -> Result<(), TransportError> {
        {
            let mut slot = lock(&self.writer);
            if self.stop.load(Ordering::SeqCst) {
                C::close(&writer);
                return Ok(());
            }
            *slot = Some(writer);
        }
        self.reset.store(false, Ordering::Release);
        self.transition(TransportState::Connected, reason);
        self.spawn_receiver(reader)
    }

    fn spawn_receiver(self: &Arc<Self>, reader: C::Reader) -> Result<(), TransportError> {
        let previous = lock(&self.workers).receive.take();
        if let Some(handle) = previous {
            join_worker(handle);
        }

        let mut workers = lock(&self.workers);
        if self.stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        let link = Arc::clone(self);
        let name = format!("sunlink-{}-rx", C::NAME);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || link.receive_loop(reader))
            .map_err(|source| TransportError::Spawn { name, source })?;
        workers.receive = Some(handle);
        Ok(())
    }

    fn receive_loop(self: Arc<Self>, mut reader: C::Reader) {
        mark_worker();
        debug!("{} receive loop started for {}", C::NAME, self.target());
        let reason = loop {
            if self.stop.load(Ordering::Acquire) {
                return;
            }
            if self.reset.swap(false, Ordering::AcqRel) {
                break "Send failed".to_string();
            }
            match C::poll(&mut reader) {
                Poll::Message(bytes) => self.deliver(bytes),
                Poll::Idle => {}
                Poll::Lost(reason) => break reason,
            }
        };
        drop(reader);
        self.connection_lost(reason);
    }

    fn connection_lost(self: &Arc<Self>, reason: String) {
        self.close_writer();
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        warn!("{} connection to {} lost: {}", C::NAME, self.target(), reason);
        self.transition(TransportState::Error, reason);

        let previous = lock(&self.workers).reconnect.take();
        if let Some(handle) = previous {
            join_worker(handle);
        }

        let mut workers = lock(&self.workers);
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        let link = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("sunlink-{}-reconnect", C::NAME))
            .spawn(move || link.reconnect_loop());
        match spawned {
            Ok(handle) => workers.reconnect = Some(handle),
            Err(e) => {
                drop(workers);
                error!("Failed to spawn {} reconnect thread: {}", C::NAME, e);
                self.transition(
                    TransportState::Error,
                    format!("Reconnect unavailable: {}", e),
                );
            }
        }
    }

    fn reconnect_loop(self: Arc<Self>) {
        mark_worker();
        let mut backoff = Backoff::new(self.config.retry_delay(), self.config.max_retry_delay());
        self.transition(
            TransportState::Reconnecting,
            format!("Reconnecting to {}", self.target()),
        );

        loop {
            let delay = backoff.next_delay();
            info!(
                "Reconnecting {} transport to {} in {:?}",
                C::NAME,
                self.target(),
                delay
            );
            if !self.sleep_unless_stopped(delay) {
                return;
            }

            match self.open() {
                Ok((writer, reader, addr)) => {
                    info!("{} transport reconnected to {}", C::NAME, addr);
                    if let Err(e) = self.establish(writer, reader, format!("Reconnected to {}", addr)) {
                        error!("{}", e);
                        self.close_writer();
                        self.transition(TransportState::Error, e.to_string());
                    }
                    return;
                }
                Err(e) => warn!("{} reconnect attempt failed: {}", C::NAME, e),
            }
        }
    }

    /// Sleep in slices of at most [`POLL_INTERVAL`]. False if stopped early.
    fn sleep_unless_stopped(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.stop.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }

    fn close_writer(&self) {
        if let Some(writer) = lock(&self.writer).take() {
            C::close(&writer);
        }
    }

    fn deliver(&self, bytes: &[u8]) {
        let callback = lock(&self.on_message).clone();
        if let Some(callback) = callback {
            callback(bytes);
        }
    }

    fn transition(&self, new: TransportState, reason: impl Into<String>) {
        let changed = {
            let mut state = lock(&self.state);
            self.apply(&mut state, new, reason.into())
        };
        if changed {
            self.flush_events();
        }
    }

    /// Change state and queue the notification. Caller holds the state lock.
    /// False if nothing changed.
    fn apply(&self, state: &mut TransportState, new: TransportState, reason: String) -> bool {
        if *state == new {
            return false;
        }
        if new != TransportState::Disconnected && self.stop.load(Ordering::SeqCst) {
            debug!("{} transport ignoring {} after disconnect: {}", C::NAME, new, reason);
            return false;
        }
        debug!("{} transport {} -> {}: {}", C::NAME, *state, new, reason);
        *state = new;
        self.events.push(StateEvent { state: new, reason });
        true
    }

    fn flush_events(&self) {
        self.events.dispatch(|event| {
            let callback = lock(&self.on_state).clone();
            if let Some(callback) = callback {
                callback(event.state, &event.reason);
            }
        });
    }
}

fn join_worker(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("worker").to_string();
    if handle.join().is_err() {
        error!("{} thread panicked", name);
    }
}
