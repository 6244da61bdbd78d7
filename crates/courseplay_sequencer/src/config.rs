// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session policy settings.

use crate::keyframe::Easing;
use serde::{Deserialize, Serialize};

/// Default length of an item with no audio and no timed actions, in seconds
pub const DEFAULT_FALLBACK_ITEM_DURATION: f64 = 3.0;

/// Default tolerated gap between clock and parallel audio, in seconds
pub const DEFAULT_DRIFT_TOLERANCE: f64 = 0.25;

/// Tunable playback policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length of items with neither audio nor timed actions
    pub fallback_item_duration: f64,
    /// Audio/clock gap that triggers a re-seek of parallel narration
    pub drift_tolerance: f64,
    /// Playback rate applied on load
    pub default_rate: f64,
    /// Easing for actions that do not name one
    pub default_easing: Easing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fallback_item_duration: DEFAULT_FALLBACK_ITEM_DURATION,
            drift_tolerance: DEFAULT_DRIFT_TOLERANCE,
            default_rate: 1.0,
            default_easing: Easing::EaseInOut,
        }
    }
}
