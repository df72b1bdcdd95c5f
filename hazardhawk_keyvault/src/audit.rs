//! Audit trail - immutable record of every vault mutation and read
//!
//! Events never contain secret values, only the key id and the outcome.
//! Retention is bounded; [`AuditTrail::drain_export`] produces a signed,
//! hash-chained [`AuditExport`] and purges the exported events.
//!
//! On disk the trail is append-only: events land in fixed-size segments
//! (`#audit.<index>`) and a small head record (`#audit`) tracks the retained
//! sequence range. An append rewrites one segment and the head, whatever the
//! trail length.

use std::collections::VecDeque;
use std::ops::Range;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::SecretKey;
use crate::error::{KeyVaultError, Result};

/// Bookkeeping slot holding the sealed audit head
pub const AUDIT_SLOT: &str = "#audit";

/// Events per on-disk segment
pub const SEGMENT_LEN: u64 = 128;

const EXPORT_VERSION: &str = "hazardhawk-audit-v1";
const HEAD_VERSION: u8 = 2;

/// Slot name of segment `index`
pub fn segment_slot(index: u64) -> String {
    format!("{}.{:016x}", AUDIT_SLOT, index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Store,
    Retrieve,
    Remove,
    ClearAll,
    UpdateMetadata,
    Export,
    RecordWrite,
    RecordRemove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Secret key id; `None` for vault-wide actions
    pub key: Option<String>,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(action: AuditAction, key: Option<&str>, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            key: key.map(str::to_string),
            success,
        }
    }
}

/// Persisted head: retained range `[first_seq, next_seq)` plus export chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditHead {
    pub version: u8,
    pub first_seq: u64,
    pub next_seq: u64,
    /// Events dropped by retention since the last export
    pub dropped: u64,
    /// Hash of the last export, chaining exports together
    pub last_export_hash: Option<String>,
}

impl AuditHead {
    /// Segment indexes that may hold retained events
    pub fn segments(&self) -> Range<u64> {
        if self.next_seq == self.first_seq {
            return 0..0;
        }
        self.first_seq / SEGMENT_LEN..(self.next_seq - 1) / SEGMENT_LEN + 1
    }
}

/// One sealed run of consecutive events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSegment {
    /// Sequence number of `events[0]`
    pub first_seq: u64,
    pub events: Vec<AuditEvent>,
}

/// Segment slots touched by trail mutations
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditWrite {
    /// Segments to rewrite from the current trail
    pub rewrite: Vec<u64>,
    /// Segments that no longer hold retained events
    pub retire: Vec<u64>,
}

impl AuditWrite {
    /// Merges `next` into `self`; the later mutation wins per segment
    pub fn then(mut self, next: AuditWrite) -> AuditWrite {
        self.rewrite.retain(|i| !next.retire.contains(i));
        self.retire.retain(|i| !next.rewrite.contains(i));
        for index in next.rewrite {
            if !self.rewrite.contains(&index) {
                self.rewrite.push(index);
            }
        }
        for index in next.retire {
            if !self.retire.contains(&index) {
                self.retire.push(index);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rewrite.is_empty() && self.retire.is_empty()
    }
}

/// In-memory trail state
#[derive(Debug, Clone)]
pub struct AuditTrail {
    head: AuditHead,
    events: VecDeque<AuditEvent>,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self {
            head: AuditHead {
                version: HEAD_VERSION,
                ..Default::default()
            },
            events: VecDeque::new(),
        }
    }
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a trail from its head and the segments it names
    pub fn restore(head: AuditHead, segments: Vec<AuditSegment>) -> Result<Self> {
        if head.version != HEAD_VERSION || head.first_seq > head.next_seq {
            return Err(KeyVaultError::Integrity("audit head is inconsistent".into()));
        }

        let mut events = VecDeque::with_capacity((head.next_seq - head.first_seq) as usize);
        for segment in segments {
            for (offset, event) in segment.events.into_iter().enumerate() {
                let seq = segment.first_seq + offset as u64;
                if seq >= head.first_seq && seq < head.next_seq {
                    if seq != head.first_seq + events.len() as u64 {
                        return Err(KeyVaultError::Integrity(format!(
                            "audit event {} out of sequence",
                            seq
                        )));
                    }
                    events.push_back(event);
                }
            }
        }

        if events.len() as u64 != head.next_seq - head.first_seq {
            return Err(KeyVaultError::Integrity(format!(
                "audit trail holds {} of {} events",
                events.len(),
                head.next_seq - head.first_seq
            )));
        }
        Ok(Self { head, events })
    }

    pub fn head(&self) -> &AuditHead {
        &self.head
    }

    /// Appends an event, dropping the oldest beyond `max_events`
    pub fn record(&mut self, event: AuditEvent, max_events: usize) -> AuditWrite {
        let first_segment = self.head.first_seq / SEGMENT_LEN;

        self.events.push_back(event);
        self.head.next_seq += 1;
        while self.events.len() > max_events.max(1) {
            self.events.pop_front();
            self.head.first_seq += 1;
            self.head.dropped += 1;
        }

        AuditWrite {
            rewrite: vec![(self.head.next_seq - 1) / SEGMENT_LEN],
            retire: (first_segment..self.head.first_seq / SEGMENT_LEN).collect(),
        }
    }

    /// Retained events of segment `index`
    pub fn segment(&self, index: u64) -> AuditSegment {
        let first_seq = (index * SEGMENT_LEN).max(self.head.first_seq);
        let skip = (first_seq - self.head.first_seq) as usize;
        let end = ((index + 1) * SEGMENT_LEN).min(self.head.next_seq);
        AuditSegment {
            first_seq,
            events: self
                .events
                .iter()
                .skip(skip)
                .take(end.saturating_sub(first_seq) as usize)
                .cloned()
                .collect(),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.head.dropped
    }

    /// Moves all retained events into a signed export
    pub fn drain_export(&mut self, sign_key: &SecretKey) -> Result<(AuditExport, AuditWrite)> {
        let retire: Vec<u64> = self.head.segments().collect();

        let mut export = AuditExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            events: self.events.drain(..).collect(),
            dropped_before_export: std::mem::take(&mut self.head.dropped),
            prev_hash: self.head.last_export_hash.clone(),
            signature: String::new(),
        };
        self.head.first_seq = self.head.next_seq;

        export.sign(sign_key)?;
        self.head.last_export_hash = Some(export.compute_hash());
        Ok((
            export,
            AuditWrite {
                rewrite: Vec::new(),
                retire,
            },
        ))
    }
}

/// Signed batch of audit events handed to an external archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub events: Vec<AuditEvent>,
    pub dropped_before_export: u64,
    pub prev_hash: Option<String>,
    /// Hex HMAC-SHA256 over [`AuditExport::compute_hash`]
    pub signature: String,
}

impl AuditExport {
    /// Hash over everything except the signature
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.as_bytes());
        hasher.update(self.exported_at.to_rfc3339().as_bytes());
        hasher.update(self.dropped_before_export.to_le_bytes());

        for event in &self.events {
            hasher.update(event.timestamp.to_rfc3339().as_bytes());
            hasher.update([event.action as u8, event.success as u8]);
            if let Some(ref key) = event.key {
                hasher.update((key.len() as u64).to_le_bytes());
                hasher.update(key.as_bytes());
            }
        }

        if let Some(ref prev) = self.prev_hash {
            hasher.update(prev.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    fn mac(&self, sign_key: &SecretKey) -> Result<Hmac<Sha256>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(sign_key.expose_secret())
            .map_err(|e| KeyVaultError::Crypto(format!("HMAC init failed: {}", e)))?;
        mac.update(self.compute_hash().as_bytes());
        Ok(mac)
    }

    pub(crate) fn sign(&mut self, sign_key: &SecretKey) -> Result<()> {
        self.signature = hex::encode(self.mac(sign_key)?.finalize().into_bytes());
        Ok(())
    }

    pub(crate) fn verify(&self, sign_key: &SecretKey) -> bool {
        let Ok(expected) = hex::decode(&self.signature) else {
            return false;
        };
        match self.mac(sign_key) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretBox;

    fn sign_key(byte: u8) -> SecretKey {
        SecretBox::new(Box::new([byte; 32]))
    }

    fn store(key: &str) -> AuditEvent {
        AuditEvent::new(AuditAction::Store, Some(key), true)
    }

    #[test]
    fn test_retention_bound() {
        let mut trail = AuditTrail::new();
        for _ in 0..5 {
            trail.record(store("k"), 3);
        }
        assert_eq!(trail.len(), 3);
        assert_eq!(trail.dropped(), 2);
        assert_eq!(trail.head().first_seq, 2);
        assert_eq!(trail.head().next_seq, 5);
    }

    #[test]
    fn test_append_writes_one_bounded_segment() {
        let mut trail = AuditTrail::new();
        for i in 0..1_000u64 {
            let write = trail.record(store("k"), 10_000);
            assert_eq!(write.rewrite, vec![i / SEGMENT_LEN]);
            assert!(write.retire.is_empty());
            let segment = trail.segment(i / SEGMENT_LEN);
            assert_eq!(segment.events.len() as u64, i % SEGMENT_LEN + 1);
        }
    }

    #[test]
    fn test_retention_retires_whole_segments() {
        let mut trail = AuditTrail::new();
        let mut retired = Vec::new();
        for _ in 0..(3 * SEGMENT_LEN) {
            retired.extend(trail.record(store("k"), SEGMENT_LEN as usize).retire);
        }
        assert_eq!(retired, vec![0, 1]);
        assert_eq!(trail.head().segments(), 2..3);
    }

    #[test]
    fn test_restore_from_segments() {
        let mut trail = AuditTrail::new();
        let mut segments = std::collections::BTreeMap::new();
        for i in 0..300 {
            let write = trail.record(store(&format!("k{}", i)), 200);
            for index in write.retire {
                segments.remove(&index);
            }
            for index in write.rewrite {
                segments.insert(index, trail.segment(index));
            }
        }

        let restored =
            AuditTrail::restore(trail.head().clone(), segments.into_values().collect()).unwrap();
        assert_eq!(restored.len(), 200);
        assert_eq!(restored.events()[0].key.as_deref(), Some("k100"));
        assert_eq!(restored.events(), trail.events());
    }

    #[test]
    fn test_restore_detects_missing_segment() {
        let mut trail = AuditTrail::new();
        let mut segments = Vec::new();
        for _ in 0..(SEGMENT_LEN + 1) {
            trail.record(store("k"), 10_000);
        }
        segments.push(trail.segment(1));
        assert!(matches!(
            AuditTrail::restore(trail.head().clone(), segments),
            Err(KeyVaultError::Integrity(_))
        ));
    }

    #[test]
    fn test_export_sign_verify_and_purge() {
        let mut trail = AuditTrail::new();
        trail.record(store("api_key"), 100);
        trail.record(AuditEvent::new(AuditAction::Retrieve, Some("api_key"), true), 100);

        let (export, write) = trail.drain_export(&sign_key(1)).unwrap();
        assert_eq!(export.events.len(), 2);
        assert_eq!(write.retire, vec![0]);
        assert!(trail.is_empty());
        assert!(export.verify(&sign_key(1)));
        assert!(!export.verify(&sign_key(2)));

        let mut tampered = export.clone();
        tampered.events[0].success = false;
        assert!(!tampered.verify(&sign_key(1)));
    }

    #[test]
    fn test_exports_are_chained() {
        let mut trail = AuditTrail::new();
        trail.record(store("a"), 100);
        let (first, _) = trail.drain_export(&sign_key(1)).unwrap();

        trail.record(AuditEvent::new(AuditAction::Remove, Some("a"), true), 100);
        let (second, _) = trail.drain_export(&sign_key(1)).unwrap();

        assert_eq!(first.prev_hash, None);
        assert_eq!(second.prev_hash, Some(first.compute_hash()));
    }

    #[test]
    fn test_rewritten_segment_is_not_retired() {
        let mut trail = AuditTrail::new();
        trail.record(store("a"), 100);
        let (_, purge) = trail.drain_export(&sign_key(1)).unwrap();
        let write = purge.then(trail.record(AuditEvent::new(AuditAction::Export, None, true), 100));

        assert!(write.retire.is_empty());
        assert_eq!(write.rewrite, vec![0]);
        let segment = trail.segment(0);
        assert_eq!(segment.first_seq, 1);
        assert_eq!(segment.events.len(), 1);
    }
}
