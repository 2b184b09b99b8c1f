use serde::{Deserialize, Serialize};

use crate::registry::compatibility::BloodMatchMode;

/// Minimum whole-blood re-donation interval commonly applied by blood services.
pub const DEFAULT_REDONATION_INTERVAL_DAYS: u32 = 56;

/// Matching dials: blood comparison mode and the re-donation readiness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub redonation_interval_days: u32,
    pub blood_match_mode: BloodMatchMode,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            redonation_interval_days: DEFAULT_REDONATION_INTERVAL_DAYS,
            blood_match_mode: BloodMatchMode::Compatible,
        }
    }
}
