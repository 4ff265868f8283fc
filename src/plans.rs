//! Plan tiers and the limits each tier grants

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CreditsError;

const MB: u64 = 1024 * 1024;

/// Named service level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// 5 removals per month
    #[default]
    Free,
    /// 50 removals per month
    Pro,
    /// High-volume plan
    Business,
}

impl PlanTier {
    /// All tiers, cheapest first
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Pro, PlanTier::Business];

    /// Limits granted by this tier
    #[must_use]
    pub fn limits(self) -> PlanLimits {
        match self {
            Self::Free => PlanLimits {
                max_credits: 5,
                max_file_size_mb: 5,
                max_resolution: (1280, 720),
                batch_limit: Some(1),
            },
            Self::Pro => PlanLimits {
                max_credits: 50,
                max_file_size_mb: 25,
                max_resolution: (3840, 2160),
                batch_limit: Some(5),
            },
            // Advertised as unlimited; the ledger still needs a finite ceiling
            Self::Business => PlanLimits {
                max_credits: 1000,
                max_file_size_mb: 50,
                max_resolution: (7680, 4320),
                batch_limit: None,
            },
        }
    }

    /// Credit ceiling for one period
    #[must_use]
    pub fn max_credits(self) -> u32 {
        self.limits().max_credits
    }

    /// Capitalized name for display ("Free", "Pro", "Business")
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Pro => "Pro",
            Self::Business => "Business",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Business => write!(f, "business"),
        }
    }
}

impl FromStr for PlanTier {
    type Err = CreditsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "business" => Ok(Self::Business),
            other => Err(CreditsError::invalid_config(format!(
                "Unknown plan '{}'. Valid plans: free, pro, business",
                other
            ))),
        }
    }
}

/// Feature limits attached to a plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Credits available per period
    pub max_credits: u32,
    /// Upload size limit in megabytes (1 MB = 1024 * 1024 bytes)
    pub max_file_size_mb: u64,
    /// Largest accepted image (width, height)
    pub max_resolution: (u32, u32),
    /// Images per batch (`None` = unlimited)
    pub batch_limit: Option<usize>,
}

impl PlanLimits {
    /// Upload size limit in bytes
    #[must_use]
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * MB
    }

    /// Whether an image of the given size fits the resolution cap.
    ///
    /// Orientation does not matter: a portrait 720x1280 image fits a 1280x720 cap.
    #[must_use]
    pub fn fits_resolution(&self, width: u32, height: u32) -> bool {
        let (max_w, max_h) = self.max_resolution;
        let (long, short) = if width >= height { (width, height) } else { (height, width) };
        long <= max_w.max(max_h) && short <= max_w.min(max_h)
    }
}
