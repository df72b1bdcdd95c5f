//! Platform security capability detection
//!
//! Reports whether hardware-backed key protection is available on this
//! device. Detection never fails: anything unexpected degrades to a
//! conservative [`SecurityLevel::Standard`] descriptor.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Derived protection level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Hardware-backed keys inside a secure element
    High,
    /// Hardware-backed keys without a dedicated secure element
    Medium,
    /// Software protection only
    Standard,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Standard => "standard",
        }
    }
}

/// Snapshot of what the platform can do for key protection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityCapabilityDescriptor {
    pub hardware_backed: bool,
    /// OS name and version, e.g. "macOS 14.4"
    pub platform_version: String,
    pub strong_element: bool,
    pub level: SecurityLevel,
    pub detected_at: DateTime<Utc>,
}

impl SecurityCapabilityDescriptor {
    pub fn new(hardware_backed: bool, strong_element: bool, platform_version: String) -> Self {
        Self {
            hardware_backed,
            platform_version,
            strong_element,
            level: Self::derive_level(hardware_backed, strong_element),
            detected_at: Utc::now(),
        }
    }

    /// Conservative descriptor used whenever detection is inconclusive
    pub fn standard() -> Self {
        Self::new(false, false, "unknown".into())
    }

    fn derive_level(hardware_backed: bool, strong_element: bool) -> SecurityLevel {
        match (hardware_backed, strong_element) {
            (true, true) => SecurityLevel::High,
            (true, false) => SecurityLevel::Medium,
            _ => SecurityLevel::Standard,
        }
    }
}

/// Capability query consumed by the vault and engine at construction
pub trait CapabilityProvider: Send + Sync {
    fn detect(&self) -> SecurityCapabilityDescriptor;
}

/// Inspects the running OS
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCapabilityProvider;

impl SystemCapabilityProvider {
    pub fn new() -> Self {
        Self
    }

    fn platform_version() -> String {
        let name = sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
        match sysinfo::System::os_version() {
            Some(version) => format!("{} {}", name, version),
            None => name,
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn inspect() -> (bool, bool) {
        // Keychain is always present; the Secure Enclave ships with Apple silicon.
        (true, cfg!(target_arch = "aarch64"))
    }

    #[cfg(target_os = "linux")]
    fn inspect() -> (bool, bool) {
        let tpm = ["/dev/tpmrm0", "/dev/tpm0"]
            .iter()
            .any(|p| std::path::Path::new(p).exists());
        (tpm, false)
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "linux")))]
    fn inspect() -> (bool, bool) {
        (false, false)
    }
}

impl CapabilityProvider for SystemCapabilityProvider {
    fn detect(&self) -> SecurityCapabilityDescriptor {
        let inspected = std::panic::catch_unwind(|| {
            let (hardware_backed, strong_element) = Self::inspect();
            SecurityCapabilityDescriptor::new(
                hardware_backed,
                strong_element,
                Self::platform_version(),
            )
        });

        match inspected {
            Ok(descriptor) => {
                debug!(
                    level = descriptor.level.as_str(),
                    platform = %descriptor.platform_version,
                    "security capability detected"
                );
                descriptor
            }
            Err(_) => SecurityCapabilityDescriptor::standard(),
        }
    }
}

/// OS-reported events that invalidate a cached descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityStateChange {
    DeviceLocked,
    DeviceUnlocked,
    BiometricEnrollmentChanged,
    PasscodeChanged,
    OsUpdated,
}

/// Caches the last descriptor until the OS reports a security-state change
pub struct CachedCapabilityProvider<P: CapabilityProvider> {
    inner: P,
    cached: RwLock<Option<SecurityCapabilityDescriptor>>,
    invalidations: AtomicU64,
}

impl<P: CapabilityProvider> CachedCapabilityProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Drops the cached descriptor; the next `detect` inspects again
    pub fn notify_security_state_changed(&self, change: SecurityStateChange) {
        debug!(?change, "security state changed, dropping cached capability");
        *self.cached.write() = None;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

impl<P: CapabilityProvider> CapabilityProvider for CachedCapabilityProvider<P> {
    fn detect(&self) -> SecurityCapabilityDescriptor {
        if let Some(descriptor) = self.cached.read().as_ref() {
            return descriptor.clone();
        }

        let descriptor = self.inner.detect();
        *self.cached.write() = Some(descriptor.clone());
        descriptor
    }
}

/// Fixed descriptor, for tests and for hosts that configure capability explicitly
#[derive(Debug, Clone)]
pub struct StaticCapabilityProvider(pub SecurityCapabilityDescriptor);

impl CapabilityProvider for StaticCapabilityProvider {
    fn detect(&self) -> SecurityCapabilityDescriptor {
        self.0.clone()
    }
}
