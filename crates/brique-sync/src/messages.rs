//! Request and response types exchanged with a peer.
//!
//! The core never opens sockets. A transport collaborator carries these
//! values however it likes; [`encode`] and [`decode`] give it a CBOR form.
//!
//! Change feeds are paged. Records are ordered by `(updated_at, kind, id)`
//! and a [`ChangeCursor`] names the last record of the previous page, so
//! records sharing a timestamp are never split or skipped across pages.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use brique_core::{PeerId, Record, RecordId, RecordKind};

use crate::error::TransportError;

/// Current message format version.
pub const PROTOCOL_VERSION: u8 = 2;

/// Message size limits.
pub mod limits {
    /// Max records a peer returns in one page of changes.
    pub const MAX_RECORDS_PER_RESPONSE: usize = 10_000;
    /// Max length of an instance name.
    pub const MAX_INSTANCE_NAME_LEN: usize = 256;
}

/// What a peer says about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub instance_id: PeerId,
    pub instance_name: String,
    /// Most recent completed sync of the peer with anyone.
    pub last_sync: Option<i64>,
    /// Number of primary records the peer holds.
    pub item_count: u64,
}

/// Position in a change feed: the last record already received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCursor {
    pub updated_at: i64,
    pub kind: RecordKind,
    pub id: RecordId,
}

impl ChangeCursor {
    pub fn of(record: &Record) -> Self {
        Self {
            updated_at: record.updated_at(),
            kind: record.kind(),
            id: record.id(),
        }
    }

    fn key(&self) -> (i64, u8, RecordId) {
        (self.updated_at, self.kind.to_u8(), self.id)
    }

    /// True if `record` comes after this position in feed order.
    pub fn precedes(&self, record: &Record) -> bool {
        *self < Self::of(record)
    }
}

impl Ord for ChangeCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for ChangeCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One page of a change feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangePage {
    /// In feed order.
    pub records: Vec<Record>,
    /// More records follow this page.
    pub more: bool,
}

impl ChangePage {
    /// Cut the page following `after` out of `records`, which must already be
    /// in feed order. `limit` is clamped to `1..=MAX_RECORDS_PER_RESPONSE`.
    pub fn from_sorted(records: Vec<Record>, after: Option<&ChangeCursor>, limit: usize) -> Self {
        let limit = limit.clamp(1, limits::MAX_RECORDS_PER_RESPONSE);
        let mut rest = records
            .into_iter()
            .filter(|r| after.map_or(true, |cursor| cursor.precedes(r)));
        let records: Vec<Record> = rest.by_ref().take(limit).collect();
        let more = rest.next().is_some();
        Self { records, more }
    }

    /// Where the next page starts, if this one holds anything.
    pub fn next_cursor(&self) -> Option<ChangeCursor> {
        self.records.last().map(ChangeCursor::of)
    }
}

/// A request to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRequest {
    Info,
    /// Records with `updated_at > since`, after `after`, at most `limit`.
    ChangesSince {
        since: i64,
        after: Option<ChangeCursor>,
        limit: u32,
    },
}

/// A peer's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResponse {
    Info(PeerInfo),
    Changes(ChangePage),
    Error(String),
}

impl SyncResponse {
    /// Check if this response respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            SyncResponse::Info(info) => {
                if info.instance_name.len() > limits::MAX_INSTANCE_NAME_LEN {
                    return Err("instance name too long");
                }
            }
            SyncResponse::Changes(page) => {
                if page.records.len() > limits::MAX_RECORDS_PER_RESPONSE {
                    return Err("too many records");
                }
            }
            SyncResponse::Error(_) => {}
        }
        Ok(())
    }
}

/// Versioned wrapper for anything sent over the wire.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u8,
    body: T,
}

/// Encode a message as CBOR.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, TransportError> {
    let mut buf = Vec::new();
    ciborium::into_writer(
        &Envelope {
            version: PROTOCOL_VERSION,
            body: message,
        },
        &mut buf,
    )
    .map_err(|e| TransportError::Malformed(e.to_string()))?;
    Ok(buf)
}

/// Decode a CBOR message, rejecting other format versions.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, TransportError> {
    let envelope: Envelope<T> =
        ciborium::from_reader(bytes).map_err(|e| TransportError::Malformed(e.to_string()))?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(TransportError::Malformed(format!(
            "unsupported message version {}",
            envelope.version
        )));
    }
    Ok(envelope.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brique_core::{Identity, IdentityKind, Product, SignedRecord};
    use proptest::prelude::*;

    #[test]
    fn test_changes_survive_encoding_with_valid_signature() {
        let device = Identity::from_seed(IdentityKind::Device, &[3; 32]);
        let mut p = Product::new("drill", "Bosch", "PSB 1800").with_spec("voltage", "18V");
        p.sign_at(&device, 42).unwrap();

        let page = ChangePage {
            records: vec![p.clone().into()],
            more: false,
        };
        let bytes = encode(&SyncResponse::Changes(page)).unwrap();
        let decoded: SyncResponse = decode(&bytes).unwrap();

        let SyncResponse::Changes(page) = decoded else {
            panic!("expected Changes");
        };
        let Record::Product(received) = &page.records[0] else {
            panic!("expected a product");
        };
        assert_eq!(received, &p);
        assert!(received.verify_signature(&device.public_key()));
    }

    #[test]
    fn test_version_mismatch_is_malformed() {
        let mut buf = Vec::new();
        ciborium::into_writer(
            &Envelope {
                version: PROTOCOL_VERSION + 1,
                body: SyncRequest::Info,
            },
            &mut buf,
        )
        .unwrap();

        let err = decode::<SyncRequest>(&buf).unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode::<SyncResponse>(&[0xff, 0x00, 0x13]),
            Err(TransportError::Malformed(_))
        ));
    }

    #[test]
    fn test_limits() {
        let info = PeerInfo {
            instance_id: PeerId::new("x"),
            instance_name: "n".repeat(limits::MAX_INSTANCE_NAME_LEN + 1),
            last_sync: None,
            item_count: 0,
        };
        assert!(SyncResponse::Info(info).validate_limits().is_err());
        assert!(SyncResponse::Changes(ChangePage::default()).validate_limits().is_ok());
    }

    fn kettles(count: usize, at: i64) -> Vec<Record> {
        let device = Identity::from_seed(IdentityKind::Device, &[4; 32]);
        let mut records: Vec<Record> = (0..count)
            .map(|i| {
                let mut p = Product::new("kettle", "Smeg", &format!("KLF0{}", i));
                p.sign_at(&device, at).unwrap();
                p.into()
            })
            .collect();
        records.sort_by_key(ChangeCursor::of);
        records
    }

    #[test]
    fn test_pages_split_within_one_timestamp() {
        let all = kettles(7, 500);

        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = ChangePage::from_sorted(all.clone(), after.as_ref(), 3);
            assert!(page.records.len() <= 3);
            seen.extend(page.records.iter().cloned());
            after = page.next_cursor();
            if !page.more {
                break;
            }
        }
        assert_eq!(seen, all);

        let tail = ChangePage::from_sorted(all.clone(), after.as_ref(), 3);
        assert!(tail.records.is_empty());
        assert!(!tail.more);
    }

    #[test]
    fn test_page_limit_is_clamped() {
        let all = kettles(2, 10);
        let page = ChangePage::from_sorted(all.clone(), None, 0);
        assert_eq!(page.records.len(), 1);
        assert!(page.more);

        let page = ChangePage::from_sorted(all, None, usize::MAX);
        assert_eq!(page.records.len(), 2);
        assert!(!page.more);
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode::<SyncResponse>(&bytes);
            let _ = decode::<SyncRequest>(&bytes);
        }

        #[test]
        fn changes_request_survives_encoding(since in any::<i64>(), limit in any::<u32>()) {
            let request = SyncRequest::ChangesSince { since, after: None, limit };
            let bytes = encode(&request).unwrap();
            let decoded: SyncRequest = decode(&bytes).unwrap();
            prop_assert_eq!(decoded, request);
        }
    }
}
