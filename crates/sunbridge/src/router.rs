//! Dispatch of incoming OSC messages by address prefix.

use std::sync::Arc;

use sunlink::MessageCallback;
use sunproto::osc::OscMessage;
use tracing::{debug, warn};

pub type OscHandler = Arc<dyn Fn(&OscMessage) + Send + Sync + 'static>;

/// Routes each decoded message to the handler with the longest prefix of its
/// address. Ties go to the route registered first.
#[derive(Default)]
pub struct AddressRouter {
    routes: Vec<(String, OscHandler)>,
}

impl AddressRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every address starting with `prefix`.
    pub fn route(mut self, prefix: impl Into<String>, handler: OscHandler) -> Self {
        self.add_route(prefix, handler);
        self
    }

    pub fn add_route(&mut self, prefix: impl Into<String>, handler: OscHandler) {
        self.routes.push((prefix.into(), handler));
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Deliver an already decoded message. `false` if no route matched.
    pub fn dispatch(&self, message: &OscMessage) -> bool {
        let mut best: Option<&(String, OscHandler)> = None;
        for route in &self.routes {
            if message.address.starts_with(route.0.as_str())
                && best.map_or(true, |b| route.0.len() > b.0.len())
            {
                best = Some(route);
            }
        }

        match best {
            Some((_, handler)) => {
                handler(message);
                true
            }
            None => {
                debug!("No route for {}", message.address);
                false
            }
        }
    }

    /// Decode a raw packet and deliver it. Undecodable packets are logged and
    /// dropped.
    pub fn dispatch_packet(&self, packet: &[u8]) -> bool {
        match OscMessage::decode(packet) {
            Ok(message) => self.dispatch(&message),
            Err(e) => {
                warn!("Dropping undecodable OSC packet ({} bytes): {}", packet.len(), e);
                false
            }
        }
    }

    /// Wrap the router as a transport message callback.
    pub fn into_message_callback(self) -> MessageCallback {
        let router = Arc::new(self);
        Box::new(move |bytes| {
            router.dispatch_packet(bytes);
        })
    }
}
