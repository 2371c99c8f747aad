//! Outbound client channel: the queue of bundles waiting for delivery and the
//! per-tick byte budget accounting.

use std::collections::VecDeque;
use std::io;

use tracing::warn;

use super::bundle::Bundle;


/// Hard ceiling on the bytes a channel should carry for one tick, this is the
/// usual 1500 bytes ethernet MTU minus 40 bytes of TCP/IP headers.
pub const PACKET_MAX_SIZE_TCP: usize = 1460;


/// The transport side of a channel, standing for the connection that actually
/// delivers bundles to the remote client.
pub trait ChannelSink {

    /// Deliver a single bundle to the remote side.
    fn deliver(&mut self, bundle: &Bundle) -> io::Result<()>;

}

/// A client channel owning the outbound bundle queue.
pub struct Channel {
    /// Bundles queued for delivery, front is the oldest.
    bundles: VecDeque<Bundle>,
    /// The transport delivering bundles.
    sink: Box<dyn ChannelSink>,
}

impl Channel {

    pub fn new(sink: Box<dyn ChannelSink>) -> Self {
        Self {
            bundles: VecDeque::new(),
            sink,
        }
    }

    /// Total size in bytes of all bundles currently queued.
    pub fn bundles_length(&self) -> usize {
        self.bundles.iter().map(|b| b.len()).sum()
    }

    /// Number of bundles currently queued.
    #[inline]
    pub fn bundles_count(&self) -> usize {
        self.bundles.len()
    }

    /// Queue a bundle for delivery on the next [`send`](Self::send).
    pub fn push_bundle(&mut self, bundle: Bundle) {
        self.bundles.push_back(bundle);
    }

    /// Drain the outbound queue into the sink, in order. A delivery failure
    /// is reported here and the failed bundle stays at the front of the queue
    /// for a later retry.
    pub fn send(&mut self) {
        while let Some(bundle) = self.bundles.front() {
            if let Err(error) = self.sink.deliver(bundle) {
                warn!(%error, "channel send failed, keeping remaining bundles");
                break;
            }
            self.bundles.pop_front();
        }
    }

}
