//! Peer and sync-audit value types.
//!
//! These are plain data; the registry and orchestrator in `brique-sync`
//! own their lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, unique identifier announced by a peer instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Liveness of a peer, derived at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerStatus {
    Online,
    Offline,
    Syncing,
}

impl PeerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerStatus::Online => "online",
            PeerStatus::Offline => "offline",
            PeerStatus::Syncing => "syncing",
        }
    }
}

/// A known peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    /// Address usable by the transport collaborator as-is.
    pub address: String,
    /// Unix milliseconds of the last sighting or contact.
    pub last_seen: i64,
    /// Unix milliseconds of the last completed sync; the next pull cursor.
    pub last_sync: Option<i64>,
    pub trusted: bool,
}

impl Peer {
    pub fn new(id: PeerId, name: &str, address: &str, seen_at: i64) -> Self {
        Self {
            id,
            name: name.to_owned(),
            address: address.to_owned(),
            last_seen: seen_at,
            last_sync: None,
            trusted: false,
        }
    }

    /// Online if seen within `window_ms` of `now`.
    pub fn liveness_at(&self, now: i64, window_ms: i64) -> PeerStatus {
        if now.saturating_sub(self.last_seen) <= window_ms {
            PeerStatus::Online
        } else {
            PeerStatus::Offline
        }
    }

    /// Cursor for the next pull; zero if never synced.
    pub fn sync_cursor(&self) -> i64 {
        self.last_sync.unwrap_or(0)
    }
}

/// One audit entry per sync attempt. Never updated after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub peer_id: PeerId,
    /// Unix milliseconds when the attempt finished.
    pub timestamp: i64,
    pub items_received: u64,
    pub items_sent: u64,
    pub conflicts: u64,
    pub rejected: u64,
    pub duration_ms: u64,
    /// Set when the attempt failed as a whole.
    pub error: Option<String>,
}

impl SyncLogEntry {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
