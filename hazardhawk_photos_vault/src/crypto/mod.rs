//! Cryptographic primitives for content encryption

pub mod aead;
pub mod integrity;
pub mod keys;

pub use aead::{decrypt_detached, encrypt_detached, DetachedCiphertext};
pub use integrity::{IntegrityDescriptor, HASH_ALGORITHM};
pub use keys::{generate_nonce, ContentKey, KeyHandle, KeyPurpose, KEY_LEN, MIN_KEY_LEN, NONCE_LEN, TAG_LEN};
