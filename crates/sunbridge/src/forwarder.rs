//! Moves packets queued by the audio thread onto the network.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sunlink::Transport;
use sunrt::OutboxReceiver;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub forwarded: u64,
    /// Packets the transport refused (not connected, or the write failed).
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    forwarded: AtomicU64,
    failed: AtomicU64,
}

/// A control thread that drains an [`OutboxReceiver`] into a transport,
/// sleeping `poll` between empty reads.
///
/// Packets that cannot be sent are counted and discarded; the outbox is not
/// a retry queue.
pub struct Forwarder {
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl Forwarder {
    pub fn spawn<const P: usize, const N: usize>(
        mut receiver: OutboxReceiver<P, N>,
        transport: Arc<dyn Transport>,
        poll: Duration,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let thread_stop = Arc::clone(&stop);
        let thread_counters = Arc::clone(&counters);
        let handle = thread::Builder::new()
            .name("sunbridge-forwarder".to_string())
            .spawn(move || {
                loop {
                    let stopping = thread_stop.load(Ordering::Acquire);
                    while let Some(packet) = receiver.try_recv() {
                        if transport.send(packet.as_bytes()) {
                            thread_counters.forwarded.fetch_add(1, Ordering::Relaxed);
                        } else {
                            let failed = thread_counters.failed.fetch_add(1, Ordering::Relaxed);
                            if failed == 0 {
                                warn!("Outbox packet dropped: transport is {}", transport.state());
                            }
                        }
                    }
                    if stopping {
                        break;
                    }
                    if receiver.is_closed() && receiver.pending() == 0 {
                        info!("Outbox closed, forwarder exiting");
                        break;
                    }
                    thread::sleep(poll);
                }
                debug!("Forwarder thread exiting");
            })?;

        Ok(Self {
            stop,
            counters,
            handle: Some(handle),
        })
    }

    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Forward whatever is already queued, then stop and join the thread.
    pub fn stop(&mut self) -> ForwarderStats {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Forwarder thread panicked");
            }
        }
        self.stats()
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.stop();
    }
}
