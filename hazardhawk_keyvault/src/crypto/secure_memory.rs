//! Best-effort destruction of sensitive byte buffers.
//!
//! Buffers are overwritten with several passes of random bytes followed by a
//! final zero-fill. The zero pass goes through `zeroize`, so the compiler
//! cannot elide it.
//!
//! Limitation: this only scrubs the buffer it is handed. Copies made earlier by
//! the allocator (reallocation), the OS (swap, hibernation) or the hardware
//! (caches) are out of reach.

use rand::RngCore;
use zeroize::Zeroize;

/// Random passes performed before the final zero-fill
pub const DEFAULT_WIPE_PASSES: usize = 3;

/// Wipes a buffer with the default number of random passes
pub fn wipe(buffer: &mut [u8]) {
    wipe_with_passes(buffer, DEFAULT_WIPE_PASSES);
}

/// Wipes a buffer with `passes` random passes and a final zero-fill
pub fn wipe_with_passes(buffer: &mut [u8], passes: usize) {
    if buffer.is_empty() {
        return;
    }

    let mut rng = rand::thread_rng();
    for _ in 0..passes {
        rng.fill_bytes(buffer);
        std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
    }
    buffer.zeroize();
}

/// Wipes a string's contents and clears it
pub fn wipe_string(s: &mut String) {
    // `String::zeroize` scrubs the whole capacity before clearing.
    s.zeroize();
}

/// Heap buffer that is wiped on drop
pub struct SecureBuffer {
    data: Vec<u8>,
    passes: usize,
}

impl SecureBuffer {
    /// Takes ownership of `data` without copying it
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            passes: DEFAULT_WIPE_PASSES,
        }
    }

    /// Random passes used when the buffer is dropped
    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        wipe_with_passes(&mut self.data, self.passes);
    }
}

impl std::ops::Deref for SecureBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl std::fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureBuffer([REDACTED; {}])", self.data.len())
    }
}
