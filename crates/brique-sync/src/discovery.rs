//! Peer sightings from a discovery collaborator.
//!
//! Discovery (mDNS, broadcast, a QR code on the workshop wall) runs outside
//! the core. It reports what it sees as an unordered, unbounded stream of
//! [`PeerSighting`]s, which [`PeerRegistry::absorb`](crate::PeerRegistry::absorb)
//! drains without blocking sync.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use brique_core::PeerId;

/// One observation of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSighting {
    /// Stable and unique per instance.
    pub peer_id: PeerId,
    pub display_name: String,
    /// Directly usable by the transport.
    pub address: String,
}

impl PeerSighting {
    pub fn new(peer_id: impl Into<String>, display_name: &str, address: &str) -> Self {
        Self {
            peer_id: PeerId::new(peer_id),
            display_name: display_name.to_owned(),
            address: address.to_owned(),
        }
    }
}

/// Sending half handed to the discovery collaborator.
pub type SightingSender = mpsc::Sender<PeerSighting>;

/// Receiving half, consumed as a [`Stream`].
///
/// Ends once every sender is dropped.
#[derive(Debug)]
pub struct SightingStream {
    rx: mpsc::Receiver<PeerSighting>,
}

impl Stream for SightingStream {
    type Item = PeerSighting;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A bounded channel of sightings.
pub fn sighting_channel(capacity: usize) -> (SightingSender, SightingStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, SightingStream { rx })
}
