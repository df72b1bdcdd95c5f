//! # HazardHawk Photos Vault
//!
//! Content encryption engine for evidentiary site photos and thumbnails.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │               CONTENT ENCRYPTION ENGINE                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  BATCHES    │  │  AES-256-GCM│  │  METRICS        │  │
//! │  │  + progress │  │  + SHA-256  │  │  (atomics)      │  │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────────┘  │
//! │         │                │                               │
//! │  ┌──────┴────────────────┴────────────────────────────┐ │
//! │  │           CONTENT KEY STORE + ROTATION              │ │
//! │  └──────────────────────────┬──────────────────────────┘ │
//! └─────────────────────────────┼────────────────────────────┘
//!                               │
//!                   HAZARDHAWK CREDENTIAL VAULT
//! ```
//!
//! ## Security Model
//!
//! - Photos and thumbnails encrypted with AES-256-GCM, separate keys
//! - Fresh random nonce per encryption
//! - Plaintext SHA-256 checked on every decryption
//! - Content keys persisted in the credential vault by id
//! - Key bytes wiped after every use

pub mod batch;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod key_store;
pub mod metrics;
pub mod payload;
pub mod rotation;

pub use batch::{BatchItem, ProgressFn};
pub use config::EngineConfig;
pub use crypto::{IntegrityDescriptor, KeyHandle, KeyPurpose, KEY_LEN, MIN_KEY_LEN, NONCE_LEN, TAG_LEN};
pub use engine::ContentEncryptionEngine;
pub use error::{EngineError, EngineResult};
pub use metrics::EncryptionMetrics;
pub use payload::{CompressionHint, EncryptedPayload, PayloadKind};
pub use rotation::{KeyRotation, RotationPolicy, RotationStatus};

/// HazardHawk Photos Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encrypted file extension used by the CLI
pub const ENCRYPTED_EXTENSION: &str = "hhenc";
