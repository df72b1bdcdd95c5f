//! Engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::payload::PayloadKind;
use crate::rotation::RotationPolicy;

/// Default maximum photo size (50 MiB)
pub const DEFAULT_MAX_PHOTO_SIZE: u64 = 50 * 1024 * 1024;

/// Default maximum thumbnail size (1 MiB)
pub const DEFAULT_MAX_THUMBNAIL_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_photo_size: u64,
    pub max_thumbnail_size: u64,
    /// Items a batch keeps in flight at once
    pub batch_concurrency: usize,
    pub rotation: RotationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_photo_size: DEFAULT_MAX_PHOTO_SIZE,
            max_thumbnail_size: DEFAULT_MAX_THUMBNAIL_SIZE,
            batch_concurrency: 4,
            rotation: RotationPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_photo_size == 0 || self.max_thumbnail_size == 0 {
            return Err(EngineError::Validation("size limits must be non-zero".into()));
        }
        if self.batch_concurrency == 0 {
            return Err(EngineError::Validation(
                "batch_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn max_size(&self, kind: PayloadKind) -> u64 {
        match kind {
            PayloadKind::Photo => self.max_photo_size,
            PayloadKind::Thumbnail => self.max_thumbnail_size,
        }
    }
}
