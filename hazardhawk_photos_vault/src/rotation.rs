//! HazardHawk Photos Vault - Key Rotation
//!
//! Rotation policy (90 days by default), per-purpose rotation status and an
//! in-memory ledger of payloads still sealed under superseded keys.
//! Rotation never re-encrypts eagerly; callers migrate with `reencrypt`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyHandle, KeyPurpose};

/// Rotation policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationPolicy {
    /// Days between rotations
    pub rotation_interval_days: u32,
    /// Rotate the active key on first use once it is due
    pub auto_rotate: bool,
    /// Warning days before rotation
    pub warning_days: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            rotation_interval_days: 90,
            auto_rotate: false,
            warning_days: 7,
        }
    }
}

impl RotationPolicy {
    pub fn next_rotation(&self, key_created_at: DateTime<Utc>) -> DateTime<Utc> {
        key_created_at + Duration::days(self.rotation_interval_days as i64)
    }

    /// Check if a key created at `key_created_at` is due
    pub fn is_due(&self, key_created_at: DateTime<Utc>) -> bool {
        Utc::now() >= self.next_rotation(key_created_at)
    }
}

/// Rotation status for display
#[derive(Debug, Clone, Serialize)]
pub struct RotationStatus {
    pub purpose: KeyPurpose,
    pub active_key_id: String,
    pub key_created_at: DateTime<Utc>,
    pub next_rotation: DateTime<Utc>,
    pub days_remaining: i64,
    pub needs_rotation: bool,
    pub warning: bool,
}

impl RotationStatus {
    pub fn evaluate(policy: &RotationPolicy, active: &KeyHandle) -> Self {
        let now = Utc::now();
        let next_rotation = policy.next_rotation(active.created_at);
        let warning_time = next_rotation - Duration::days(policy.warning_days as i64);

        Self {
            purpose: active.purpose,
            active_key_id: active.key_id.clone(),
            key_created_at: active.created_at,
            next_rotation,
            days_remaining: (next_rotation - now).num_days(),
            needs_rotation: now >= next_rotation,
            warning: now >= warning_time,
        }
    }
}

/// Result of `rotate_encryption_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRotation {
    pub new_key_id: String,
    pub old_key_id: String,
    pub rotated_at: DateTime<Utc>,
    /// Payloads this process sealed under the old key and has not migrated
    pub pending_reencrypt_count: u64,
}

/// Counts payloads per key id sealed during this process
#[derive(Debug, Default)]
pub struct RotationLedger {
    sealed: Mutex<HashMap<String, u64>>,
}

impl RotationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_encrypted(&self, key_id: &str) {
        *self.sealed.lock().entry(key_id.to_string()).or_insert(0) += 1;
    }

    /// A payload moved off `key_id`
    pub fn note_migrated(&self, key_id: &str) {
        if let Some(count) = self.sealed.lock().get_mut(key_id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn pending_for(&self, key_id: &str) -> u64 {
        self.sealed.lock().get(key_id).copied().unwrap_or(0)
    }

    pub fn forget(&self, key_id: &str) {
        self.sealed.lock().remove(key_id);
    }
}
