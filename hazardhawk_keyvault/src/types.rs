//! Secret metadata model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Regulatory handling class of a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    Standard,
    Enhanced,
    Critical,
    RegulatedCompliant,
}

impl Default for ComplianceLevel {
    fn default() -> Self {
        Self::Standard
    }
}

impl ComplianceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Enhanced => "enhanced",
            Self::Critical => "critical",
            Self::RegulatedCompliant => "regulated_compliant",
        }
    }
}

impl std::str::FromStr for ComplianceLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "enhanced" => Ok(Self::Enhanced),
            "critical" => Ok(Self::Critical),
            "regulated_compliant" | "regulated" => Ok(Self::RegulatedCompliant),
            other => Err(format!("unknown compliance level: {}", other)),
        }
    }
}

/// Metadata kept in a shadow slot next to every secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub compliance_level: ComplianceLevel,
    #[serde(default)]
    pub access_count: u64,
    /// Free-form labels, e.g. `purpose=photo`
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl SecretMetadata {
    pub fn new(compliance_level: ComplianceLevel) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            compliance_level,
            access_count: 0,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub(crate) fn touch_access(&mut self) {
        self.last_accessed_at = Some(Utc::now());
        self.access_count = self.access_count.saturating_add(1);
    }
}

impl Default for SecretMetadata {
    fn default() -> Self {
        Self::new(ComplianceLevel::default())
    }
}
