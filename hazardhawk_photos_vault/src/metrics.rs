//! Process-wide encryption metrics
//!
//! Counters are atomics so every engine operation can update them without
//! locking; a [`EncryptionMetrics`] snapshot is read on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::payload::PayloadKind;

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncryptionMetrics {
    pub photos_encrypted: u64,
    pub photos_decrypted: u64,
    pub thumbnails_encrypted: u64,
    pub thumbnails_decrypted: u64,
    pub encryption_failures: u64,
    pub decryption_failures: u64,
    pub integrity_failures: u64,
    /// Mean latency of successful operations
    pub average_latency_ms: f64,
    pub bytes_encrypted: u64,
    pub bytes_decrypted: u64,
    pub hardware_backed: bool,
    pub active_key_count: usize,
    pub last_rotation: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    photos_encrypted: AtomicU64,
    photos_decrypted: AtomicU64,
    thumbnails_encrypted: AtomicU64,
    thumbnails_decrypted: AtomicU64,
    encryption_failures: AtomicU64,
    decryption_failures: AtomicU64,
    integrity_failures: AtomicU64,
    latency_total_ns: AtomicU64,
    latency_samples: AtomicU64,
    bytes_encrypted: AtomicU64,
    bytes_decrypted: AtomicU64,
    last_rotation: RwLock<Option<DateTime<Utc>>>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_latency(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.latency_total_ns.fetch_add(nanos, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encrypt(&self, kind: PayloadKind, bytes: usize, elapsed: Duration) {
        match kind {
            PayloadKind::Photo => &self.photos_encrypted,
            PayloadKind::Thumbnail => &self.thumbnails_encrypted,
        }
        .fetch_add(1, Ordering::Relaxed);
        self.bytes_encrypted.fetch_add(bytes as u64, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_decrypt(&self, kind: PayloadKind, bytes: usize, elapsed: Duration) {
        match kind {
            PayloadKind::Photo => &self.photos_decrypted,
            PayloadKind::Thumbnail => &self.thumbnails_decrypted,
        }
        .fetch_add(1, Ordering::Relaxed);
        self.bytes_decrypted.fetch_add(bytes as u64, Ordering::Relaxed);
        self.record_latency(elapsed);
    }

    pub fn record_encryption_failure(&self) {
        self.encryption_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decryption_failure(&self) {
        self.decryption_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self, at: DateTime<Utc>) {
        *self.last_rotation.write() = Some(at);
    }

    pub fn snapshot(&self, hardware_backed: bool, active_key_count: usize) -> EncryptionMetrics {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let average_latency_ms = if samples == 0 {
            0.0
        } else {
            self.latency_total_ns.load(Ordering::Relaxed) as f64 / samples as f64 / 1_000_000.0
        };

        EncryptionMetrics {
            photos_encrypted: self.photos_encrypted.load(Ordering::Relaxed),
            photos_decrypted: self.photos_decrypted.load(Ordering::Relaxed),
            thumbnails_encrypted: self.thumbnails_encrypted.load(Ordering::Relaxed),
            thumbnails_decrypted: self.thumbnails_decrypted.load(Ordering::Relaxed),
            encryption_failures: self.encryption_failures.load(Ordering::Relaxed),
            decryption_failures: self.decryption_failures.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            average_latency_ms,
            bytes_encrypted: self.bytes_encrypted.load(Ordering::Relaxed),
            bytes_decrypted: self.bytes_decrypted.load(Ordering::Relaxed),
            hardware_backed,
            active_key_count,
            last_rotation: *self.last_rotation.read(),
        }
    }
}
