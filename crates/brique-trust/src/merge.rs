//! Ingestion policy: verification followed by deterministic conflict
//! resolution.
//!
//! Every incoming record must be signed by a known author. Accepted tutorial
//! versions are always added to the version index; the primary slot of a
//! product or tutorial only moves forward when the incoming record strictly
//! outranks the stored one under the precedence
//!
//! ```text
//! (updated_at, trusted author, generation, version hash)
//! ```
//!
//! compared lexicographically. Distinct timestamps decide exactly as plain
//! last-write-wins; identical records never outrank themselves, so replaying
//! a record is a counted conflict and leaves state untouched.

use std::collections::HashSet;
use std::sync::Arc;

use brique_core::{
    Blake3Hash, IdentityId, Product, Record, RecordId, SignedRecord, Tutorial,
};
use brique_store::Store;

use crate::error::{Result, TrustError};
use crate::locks::KeyLocks;
use crate::trust::TrustStore;

/// What ingesting a verified record did to the primary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No local copy existed; the record is now stored.
    Stored,
    /// The record outranked the stored copy and replaced it.
    Replaced,
    /// The stored copy was kept. Not an error.
    Conflict,
}

impl IngestOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, IngestOutcome::Conflict)
    }

    /// True if the primary slot changed.
    pub fn is_applied(&self) -> bool {
        !self.is_conflict()
    }
}

/// Merge precedence key.
type Precedence = (i64, bool, u64, Blake3Hash);

/// Pick the version a reader should see.
///
/// Trusted authors beat untrusted ones, then higher generation wins, then
/// the greater hash. Returns `None` for an empty set.
pub fn select_best_tutorial_version(
    versions: impl IntoIterator<Item = Tutorial>,
    trusted: &HashSet<IdentityId>,
) -> Option<Tutorial> {
    versions
        .into_iter()
        .max_by_key(|t| (trusted.contains(&t.author()), t.generation, t.hash))
}

/// Verifies and merges records into a [`Store`].
pub struct MergeEngine<S: Store> {
    store: Arc<S>,
    trust: Arc<TrustStore>,
    locks: KeyLocks,
}

impl<S: Store> MergeEngine<S> {
    pub fn new(store: Arc<S>, trust: Arc<TrustStore>) -> Self {
        Self {
            store,
            trust,
            locks: KeyLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn trust(&self) -> &Arc<TrustStore> {
        &self.trust
    }

    /// Ingest any record.
    pub async fn ingest(&self, record: Record) -> Result<IngestOutcome> {
        match record {
            Record::Product(p) => self.ingest_product(p).await,
            Record::Tutorial(t) => self.ingest_tutorial(t).await,
        }
    }

    /// Verify a product and apply it to the primary slot if it outranks the
    /// stored copy.
    pub async fn ingest_product(&self, incoming: Product) -> Result<IngestOutcome> {
        self.verify(&incoming).await?;
        if !incoming.has_derived_id() {
            tracing::warn!(record = %incoming.id, "rejected product with foreign id");
            return Err(TrustError::IdMismatch(incoming.id));
        }

        let _guard = self.locks.lock(incoming.id).await;
        let stored = self.store.get_product(&incoming.id).await?;
        let outcome = self.decide(&incoming, stored.as_ref()).await?;
        if outcome.is_applied() {
            self.store.put_product(&incoming).await?;
        }

        tracing::debug!(
            record = %incoming.id,
            updated_at = incoming.crdt_meta.updated_at,
            ?outcome,
            "ingested product"
        );
        Ok(outcome)
    }

    /// Verify a tutorial version, index it, and apply it to the primary slot
    /// if it outranks the stored version.
    pub async fn ingest_tutorial(&self, incoming: Tutorial) -> Result<IngestOutcome> {
        self.verify(&incoming).await?;
        incoming
            .verify_hash()
            .map_err(|e| TrustError::HashMismatch(e.to_string()))?;

        let _guard = self.locks.lock(incoming.id).await;
        self.store.insert_tutorial_version(&incoming).await?;
        let stored = self.store.get_tutorial(&incoming.id).await?;
        let outcome = self.decide(&incoming, stored.as_ref()).await?;
        if outcome.is_applied() {
            self.store.put_tutorial(&incoming).await?;
        }

        tracing::debug!(
            record = %incoming.id,
            generation = incoming.generation,
            updated_at = incoming.crdt_meta.updated_at,
            ?outcome,
            "ingested tutorial"
        );
        Ok(outcome)
    }

    /// All indexed versions of a tutorial, ordered by generation then hash.
    pub async fn tutorial_versions(&self, id: &RecordId) -> Result<Vec<Tutorial>> {
        Ok(self.store.list_tutorial_versions(id).await?)
    }

    /// Best indexed version of a tutorial under an explicit trusted set.
    pub async fn select_best_tutorial_version(
        &self,
        id: &RecordId,
        trusted: &HashSet<IdentityId>,
    ) -> Result<Option<Tutorial>> {
        let versions = self.store.list_tutorial_versions(id).await?;
        Ok(select_best_tutorial_version(versions, trusted))
    }

    /// Best indexed version of a tutorial under the trust store's current
    /// trusted set.
    pub async fn best_tutorial(&self, id: &RecordId) -> Result<Option<Tutorial>> {
        let trusted = self.trust.trusted_identities().await;
        self.select_best_tutorial_version(id, &trusted).await
    }

    async fn verify<R: SignedRecord>(&self, record: &R) -> Result<()> {
        let author = record.author();
        let key = match self.trust.public_key(&author).await {
            Some(key) => key,
            None => {
                tracing::warn!(record = %record.id(), author = %author, "rejected record from unknown author");
                return Err(TrustError::UnknownAuthor(author));
            }
        };

        if record.check_signature(&key).is_err() {
            tracing::warn!(record = %record.id(), author = %author, "rejected record with invalid signature");
            return Err(TrustError::InvalidSignature);
        }
        Ok(())
    }

    async fn precedence<R: SignedRecord>(&self, record: &R) -> Result<Precedence> {
        Ok((
            record.updated_at(),
            self.trust.is_trusted(&record.author()).await,
            record.generation(),
            record.version_hash()?,
        ))
    }

    async fn decide<R: SignedRecord>(&self, incoming: &R, stored: Option<&R>) -> Result<IngestOutcome> {
        let Some(stored) = stored else {
            return Ok(IngestOutcome::Stored);
        };
        if self.precedence(incoming).await? > self.precedence(stored).await? {
            Ok(IngestOutcome::Replaced)
        } else {
            Ok(IngestOutcome::Conflict)
        }
    }
}
