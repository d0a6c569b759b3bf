//! Request/response client for the DAW bridge.
//!
//! Every request carries a fresh `callback_id`. The reply with the same id is
//! handed back to the waiting caller through a channel; a reply whose id no
//! caller is waiting for belongs to an observation and goes to its handler.
//!
//! The client installs itself as the transport's message callback, so one
//! transport carries one client.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sunlink::Transport;
use sunproto::bridge::{
    deserialize_response, serialize_request, BridgeError, BridgePath, BridgeRequest,
    BridgeResponse, BridgeValue,
};
use thiserror::Error;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Called with every notification for an observed property.
pub type ObserveHandler = Arc<dyn Fn(&BridgeResponse) + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not connected to the bridge")]
    NotConnected,

    #[error("Failed to send request {0}")]
    SendFailed(String),

    #[error("Request {id} timed out after {after:?}")]
    Timeout { id: String, after: Duration },

    #[error("Failed to serialize request: {0}")]
    Serialize(#[from] BridgeError),

    #[error("Bridge reported failure: {0}")]
    Remote(String),

    #[error("Request {0} is already waiting for a reply")]
    DuplicateCallbackId(String),
}

struct Observation {
    path: BridgePath,
    property: String,
    handler: ObserveHandler,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<String, Sender<BridgeResponse>>>,
    observations: Mutex<HashMap<String, Observation>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn handle_message(&self, bytes: &[u8]) {
        let Ok(text) = std::str::from_utf8(bytes) else {
            warn!("Dropping non-UTF-8 bridge reply ({} bytes)", bytes.len());
            return;
        };
        let Some(response) = deserialize_response(text) else {
            warn!("Dropping malformed bridge reply ({} bytes)", bytes.len());
            return;
        };
        let Some(id) = response.callback_id.clone() else {
            debug!("Dropping bridge reply without callback_id");
            return;
        };

        if let Some(waiter) = lock(&self.pending).remove(&id) {
            trace!("Reply for {}", id);
            // the caller may have just timed out
            let _ = waiter.send(response);
            return;
        }

        let handler = lock(&self.observations)
            .get(&id)
            .map(|o| Arc::clone(&o.handler));
        match handler {
            Some(handler) => handler(&response),
            None => debug!("Discarding orphan reply for {}", id),
        }
    }
}

pub struct BridgeClient {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    timeout: Duration,
}

impl BridgeClient {
    /// Take over `transport`'s message callback. The transport may be
    /// connected before or after this call.
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        let shared = Arc::new(Shared::default());
        let inbound = Arc::clone(&shared);
        transport.set_message_callback(Box::new(move |bytes| inbound.handle_message(bytes)));
        Self {
            transport,
            shared,
            timeout,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Requests still waiting for a reply.
    pub fn pending(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    /// Send `request` and wait for the correlated reply.
    ///
    /// A `callback_id` already set on the request is kept; otherwise one is
    /// assigned. An id that another request is still waiting on is refused.
    /// A reply with `success: false` is still returned as `Ok`.
    pub fn request(&self, request: BridgeRequest) -> Result<BridgeResponse, ClientError> {
        if !self.transport.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = request.callback_id.clone().unwrap_or_else(new_callback_id);
        let request = request.with_callback_id(id.clone());
        let body = serialize_request(&request)?;

        let (tx, rx) = mpsc::channel();
        match lock(&self.shared.pending).entry(id.clone()) {
            Entry::Occupied(_) => return Err(ClientError::DuplicateCallbackId(id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        debug!("{} {}.{} ({})", request.kind.as_str(), request.path, request.name, id);
        if !self.transport.send(body.as_bytes()) {
            lock(&self.shared.pending).remove(&id);
            return Err(ClientError::SendFailed(id));
        }

        match rx.recv_timeout(self.timeout) {
            Ok(response) => Ok(response),
            Err(_) => {
                lock(&self.shared.pending).remove(&id);
                debug!("Request {} timed out", id);
                Err(ClientError::Timeout {
                    id,
                    after: self.timeout,
                })
            }
        }
    }

    pub fn get(
        &self,
        path: BridgePath,
        property: impl Into<String>,
    ) -> Result<Option<BridgeValue>, ClientError> {
        let response = self.request(BridgeRequest::get_property(path, property))?;
        Ok(succeeded(response)?.value)
    }

    pub fn set(
        &self,
        path: BridgePath,
        property: impl Into<String>,
        value: impl Into<BridgeValue>,
    ) -> Result<(), ClientError> {
        let response = self.request(BridgeRequest::set_property(path, property, value))?;
        succeeded(response).map(|_| ())
    }

    pub fn call(
        &self,
        path: BridgePath,
        method: impl Into<String>,
        args: Vec<BridgeValue>,
    ) -> Result<Option<BridgeValue>, ClientError> {
        let response = self.request(BridgeRequest::call_method(path, method, args))?;
        Ok(succeeded(response)?.value)
    }

    /// Subscribe to changes of `property`. The acknowledgement is awaited like
    /// any request; every later reply carrying the returned id goes to
    /// `handler` on the transport's receive thread.
    pub fn observe(
        &self,
        path: BridgePath,
        property: impl Into<String>,
        handler: ObserveHandler,
    ) -> Result<String, ClientError> {
        let property = property.into();
        let id = new_callback_id();
        lock(&self.shared.observations).insert(
            id.clone(),
            Observation {
                path: path.clone(),
                property: property.clone(),
                handler,
            },
        );

        let request = BridgeRequest::observe(path, property).with_callback_id(id.clone());
        match self.request(request).and_then(succeeded) {
            Ok(_) => Ok(id),
            Err(e) => {
                lock(&self.shared.observations).remove(&id);
                Err(e)
            }
        }
    }

    /// Drop every handler for `property` and tell the bridge to stop.
    pub fn unobserve(&self, path: BridgePath, property: impl Into<String>) -> Result<(), ClientError> {
        let property = property.into();
        lock(&self.shared.observations)
            .retain(|_, o| !(o.path == path && o.property == property));
        let response = self.request(BridgeRequest::unobserve(path, property))?;
        succeeded(response).map(|_| ())
    }

    pub fn observation_count(&self) -> usize {
        lock(&self.shared.observations).len()
    }
}

fn succeeded(response: BridgeResponse) -> Result<BridgeResponse, ClientError> {
    if response.success {
        Ok(response)
    } else {
        Err(ClientError::Remote(
            response
                .error
                .unwrap_or_else(|| "request failed".to_string()),
        ))
    }
}

fn new_callback_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Instant;
    use sunlink::{MessageCallback, StateCallback, TransportError, TransportState};
    use sunproto::bridge::{deserialize_request, paths, serialize_response, RequestKind};

    type Responder = Box<dyn Fn(&BridgeRequest) -> Vec<BridgeResponse> + Send + Sync>;

    /// Answers every request synchronously from inside `send`.
    struct FakeBridge {
        connected: AtomicBool,
        callback: Mutex<Option<Arc<MessageCallback>>>,
        responder: Responder,
        sent: Mutex<Vec<BridgeRequest>>,
    }

    impl FakeBridge {
        fn new(responder: Responder) -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                callback: Mutex::new(None),
                responder,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn deliver(&self, bytes: &[u8]) {
            let callback = self.callback.lock().unwrap().clone();
            if let Some(cb) = callback {
                cb(bytes);
            }
        }
    }

    impl Transport for FakeBridge {
        fn connect(&self) -> Result<(), TransportError> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn send(&self, bytes: &[u8]) -> bool {
            let request = deserialize_request(std::str::from_utf8(bytes).unwrap()).unwrap();
            self.sent.lock().unwrap().push(request.clone());
            for reply in (self.responder)(&request) {
                self.deliver(serialize_response(&reply).unwrap().as_bytes());
            }
            true
        }

        fn set_message_callback(&self, callback: MessageCallback) {
            *self.callback.lock().unwrap() = Some(Arc::new(callback));
        }

        fn set_state_callback(&self, _callback: StateCallback) {}

        fn state(&self) -> TransportState {
            if self.connected.load(Ordering::SeqCst) {
                TransportState::Connected
            } else {
                TransportState::Disconnected
            }
        }
    }

    fn echo_ok() -> Responder {
        Box::new(|req| {
            let id = req.callback_id.clone().unwrap();
            let reply = match req.kind {
                RequestKind::Get => BridgeResponse::with_value(120.0),
                _ => BridgeResponse::ok(),
            };
            vec![reply.with_callback_id(id)]
        })
    }

    fn client(bridge: &Arc<FakeBridge>) -> BridgeClient {
        let transport: Arc<dyn Transport> = bridge.clone();
        BridgeClient::new(transport, Duration::from_millis(200))
    }

    #[test]
    fn get_returns_correlated_value() {
        let bridge = FakeBridge::new(echo_ok());
        let client = client(&bridge);
        let value = client.get(paths::song(), "tempo").unwrap();
        assert_eq!(value, Some(BridgeValue::Double(120.0)));
        assert_eq!(client.pending(), 0);

        let sent = bridge.sent.lock().unwrap();
        assert_eq!(sent[0].kind, RequestKind::Get);
        assert!(sent[0].callback_id.is_some());
    }

    #[test]
    fn caller_supplied_id_is_kept() {
        let bridge = FakeBridge::new(echo_ok());
        let client = client(&bridge);
        let request = BridgeRequest::get_property(paths::song(), "tempo").with_callback_id("mine");
        let response = client.request(request).unwrap();
        assert_eq!(response.callback_id.as_deref(), Some("mine"));
    }

    #[test]
    fn failure_reply_is_remote_error() {
        let bridge = FakeBridge::new(Box::new(|req| {
            vec![BridgeResponse::failure("no such track")
                .with_callback_id(req.callback_id.clone().unwrap())]
        }));
        let client = client(&bridge);
        match client.set(paths::track(99), "mute", true) {
            Err(ClientError::Remote(msg)) => assert_eq!(msg, "no such track"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn malformed_and_foreign_replies_time_out() {
        let bridge = FakeBridge::new(Box::new(|_| {
            vec![BridgeResponse::with_value(1i64).with_callback_id("someone-else")]
        }));
        let client = client(&bridge);
        bridge.deliver(b"{not json");
        bridge.deliver(&[0xff, 0xfe]);
        match client.get(paths::song(), "tempo") {
            Err(ClientError::Timeout { after, .. }) => {
                assert_eq!(after, Duration::from_millis(200))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(client.pending(), 0, "timed out request is forgotten");
    }

    #[test]
    fn reused_pending_id_is_refused() {
        let bridge = FakeBridge::new(Box::new(|_| Vec::new()));
        let client = client(&bridge);
        let request = || BridgeRequest::get_property(paths::song(), "tempo").with_callback_id("dup");

        thread::scope(|s| {
            let first = s.spawn(|| client.request(request()));
            let deadline = Instant::now() + Duration::from_secs(1);
            while client.pending() == 0 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(client.pending(), 1);

            match client.request(request()) {
                Err(ClientError::DuplicateCallbackId(id)) => assert_eq!(id, "dup"),
                other => panic!("unexpected result: {:?}", other),
            }
            assert_eq!(bridge.sent.lock().unwrap().len(), 1, "duplicate was not sent");
            assert!(matches!(first.join().unwrap(), Err(ClientError::Timeout { .. })));
        });
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn not_connected_is_rejected_before_sending() {
        let bridge = FakeBridge::new(echo_ok());
        bridge.disconnect();
        let client = client(&bridge);
        assert!(matches!(
            client.get(paths::song(), "tempo"),
            Err(ClientError::NotConnected)
        ));
        assert!(bridge.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn observe_routes_later_notifications() {
        let bridge = FakeBridge::new(echo_ok());
        let client = client(&bridge);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = client
            .observe(
                paths::song(),
                "tempo",
                Arc::new(move |r: &BridgeResponse| sink.lock().unwrap().push(r.value.clone())),
            )
            .unwrap();
        assert_eq!(client.observation_count(), 1);

        for bpm in [121.0, 122.5] {
            let note = BridgeResponse::with_value(bpm).with_callback_id(id.clone());
            bridge.deliver(serialize_response(&note).unwrap().as_bytes());
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(BridgeValue::Double(121.0)), Some(BridgeValue::Double(122.5))]
        );

        client.unobserve(paths::song(), "tempo").unwrap();
        assert_eq!(client.observation_count(), 0);
        let note = BridgeResponse::with_value(130.0).with_callback_id(id);
        bridge.deliver(serialize_response(&note).unwrap().as_bytes());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn rejected_observe_leaves_no_handler() {
        let bridge = FakeBridge::new(Box::new(|req| {
            vec![BridgeResponse::failure("not observable")
                .with_callback_id(req.callback_id.clone().unwrap())]
        }));
        let client = client(&bridge);
        let result = client.observe(paths::song(), "name", Arc::new(|_: &BridgeResponse| {}));
        assert!(matches!(result, Err(ClientError::Remote(_))));
        assert_eq!(client.observation_count(), 0);
    }
}
