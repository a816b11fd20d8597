//! Transport abstraction for the sync orchestrator.
//!
//! A [`PeerTransport`] asks a peer at some address for its info or its
//! changes, one page at a time. A [`ChangeSource`] is the serving side:
//! whatever answers those questions locally. Implementations may use HTTP, a mesh radio, or
//! anything else; retries and backoff belong to them.

use async_trait::async_trait;

use crate::error::{SyncError, TransportError};
use crate::messages::{ChangeCursor, ChangePage, PeerInfo};

/// Client side: queries a peer by address.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Ask the peer at `address` who it is.
    async fn info(&self, address: &str) -> Result<PeerInfo, TransportError>;

    /// Fetch one page of the peer's records with `updated_at > since`,
    /// oldest first, starting after `after`. The peer may return fewer
    /// than `limit` records per page but never more than its own cap.
    async fn changes_page(
        &self,
        address: &str,
        since: i64,
        after: Option<ChangeCursor>,
        limit: usize,
    ) -> Result<ChangePage, TransportError>;
}

/// Serving side: answers peer queries from local state.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn local_info(&self) -> Result<PeerInfo, SyncError>;

    async fn changes_page(
        &self,
        since: i64,
        after: Option<ChangeCursor>,
        limit: usize,
    ) -> Result<ChangePage, SyncError>;
}

/// An in-process network for tests and demos.
///
/// Every request and response goes through the CBOR wire encoding, so a
/// record that survives the memory transport survives a real one.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    use crate::messages::{decode, encode, SyncRequest, SyncResponse};

    /// Routes requests by address to registered [`ChangeSource`]s.
    #[derive(Default)]
    pub struct MemoryNetwork {
        sources: RwLock<HashMap<String, Arc<dyn ChangeSource>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make `source` reachable at `address`, replacing any previous one.
        pub async fn register(&self, address: &str, source: Arc<dyn ChangeSource>) {
            self.sources.write().await.insert(address.to_owned(), source);
        }

        /// Take `address` offline. Returns false if nothing was there.
        pub async fn unregister(&self, address: &str) -> bool {
            self.sources.write().await.remove(address).is_some()
        }

        /// A transport sending requests into this network.
        pub fn transport(self: &Arc<Self>) -> MemoryTransport {
            MemoryTransport {
                network: Arc::clone(self),
            }
        }

        async fn serve(&self, address: &str, request: &[u8]) -> Result<Vec<u8>, TransportError> {
            let source = self
                .sources
                .read()
                .await
                .get(address)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(address.to_owned()))?;

            let response = match decode::<SyncRequest>(request)? {
                SyncRequest::Info => match source.local_info().await {
                    Ok(info) => SyncResponse::Info(info),
                    Err(e) => SyncResponse::Error(e.to_string()),
                },
                SyncRequest::ChangesSince { since, after, limit } => {
                    match source.changes_page(since, after, limit as usize).await {
                        Ok(page) => SyncResponse::Changes(page),
                        Err(e) => SyncResponse::Error(e.to_string()),
                    }
                }
            };
            encode(&response)
        }
    }

    /// Client handle onto a [`MemoryNetwork`].
    #[derive(Clone)]
    pub struct MemoryTransport {
        network: Arc<MemoryNetwork>,
    }

    impl MemoryTransport {
        async fn request(&self, address: &str, request: SyncRequest) -> Result<SyncResponse, TransportError> {
            let reply = self.network.serve(address, &encode(&request)?).await?;
            let response: SyncResponse = decode(&reply)?;
            response
                .validate_limits()
                .map_err(|e| TransportError::Malformed(e.to_owned()))?;
            match response {
                SyncResponse::Error(message) => Err(TransportError::Remote(message)),
                other => Ok(other),
            }
        }
    }

    #[async_trait]
    impl PeerTransport for MemoryTransport {
        async fn info(&self, address: &str) -> Result<PeerInfo, TransportError> {
            match self.request(address, SyncRequest::Info).await? {
                SyncResponse::Info(info) => Ok(info),
                _ => Err(TransportError::Malformed("expected info".into())),
            }
        }

        async fn changes_page(
            &self,
            address: &str,
            since: i64,
            after: Option<ChangeCursor>,
            limit: usize,
        ) -> Result<ChangePage, TransportError> {
            let request = SyncRequest::ChangesSince {
                since,
                after,
                limit: u32::try_from(limit).unwrap_or(u32::MAX),
            };
            match self.request(address, request).await? {
                SyncResponse::Changes(page) => Ok(page),
                _ => Err(TransportError::Malformed("expected changes".into())),
            }
        }
    }
}
