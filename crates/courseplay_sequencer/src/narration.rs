// SPDX-License-Identifier: MIT OR Apache-2.0
//! Narration synchronization.
//!
//! Aligns an item's audio position with its subtitles and action windows,
//! and decides when the item is complete. Audio itself belongs to a
//! collaborator behind [`AudioHost`]; the engine only polls it.

use crate::outline::{ActionKind, AudioRef, SceneAction, SegmentItem, Subtitle};
use crate::resolver::effective_window;
use thiserror::Error;

/// One open narration stream
pub trait AudioChannel {
    /// Playback position in seconds, `None` while unavailable
    fn current_time(&self) -> Option<f64>;
    /// Length reported by the backend, if known
    fn duration(&self) -> Option<f64>;
    /// Whether playback ran to the end
    fn is_ended(&self) -> bool;
    /// Start or resume
    fn play(&mut self);
    /// Pause
    fn pause(&mut self);
    /// Jump to a position in seconds
    fn seek(&mut self, time: f64);
    /// Request a playback rate; returns the rate actually applied
    fn set_rate(&mut self, rate: f64) -> f64;
}

/// Opens narration streams
pub trait AudioHost {
    /// Open a channel for an item's audio, paused at 0
    fn open(&mut self, audio: &AudioRef) -> Result<Box<dyn AudioChannel>, AudioError>;
}

/// Audio collaborator failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// Source could not be fetched or found
    #[error("Audio source unavailable: {0}")]
    Unavailable(String),

    /// Backend failed to decode or play
    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Which clock drives an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationClock {
    /// The audio channel's position
    Audio,
    /// The session clock
    WallClock,
}

/// Subtitle and completion logic for segment items
#[derive(Debug, Clone)]
pub struct NarrationSync {
    fallback_item_duration: f64,
}

impl NarrationSync {
    /// Create a synchronizer with the given fallback length for silent items
    pub fn new(fallback_item_duration: f64) -> Self {
        Self {
            fallback_item_duration: fallback_item_duration.max(0.0),
        }
    }

    /// Length of an item in seconds.
    ///
    /// Narrated items last as long as their audio. Silent items last until
    /// the latest end of any timed action (an `animation.play` counts as
    /// timed by its animation's length), or the fallback length when no
    /// action declares timing.
    pub fn item_duration(
        &self,
        item: &SegmentItem,
        animation_duration: impl Fn(&str) -> Option<f64>,
    ) -> f64 {
        if let Some(audio) = &item.audio {
            return audio.duration;
        }
        item.actions
            .iter()
            .filter(|action| declares_timing(action))
            .map(|action| effective_window(action, &animation_duration).end)
            .reduce(f64::max)
            .unwrap_or(self.fallback_item_duration)
    }

    /// Which clock should drive an item, given whether its audio channel is usable
    pub fn clock_for(item: &SegmentItem, channel_available: bool) -> NarrationClock {
        if item.audio.is_some() && channel_available {
            NarrationClock::Audio
        } else {
            NarrationClock::WallClock
        }
    }

    /// Subtitle in effect at `time`: the last one whose offset is at or before it
    pub fn active_subtitle(item: &SegmentItem, time: f64) -> Option<(usize, &Subtitle)> {
        let count = item.subtitles.partition_point(|s| s.offset <= time);
        count.checked_sub(1).map(|index| (index, &item.subtitles[index]))
    }

    /// Indices of actions whose window contains `time`
    pub fn active_actions(
        item: &SegmentItem,
        time: f64,
        animation_duration: impl Fn(&str) -> Option<f64>,
    ) -> Vec<usize> {
        item.actions
            .iter()
            .enumerate()
            .filter(|(_, action)| effective_window(action, &animation_duration).contains(time))
            .map(|(index, _)| index)
            .collect()
    }

    /// Whether an item of `duration` is complete at local `time`
    pub fn is_complete(duration: f64, time: f64, audio_ended: bool) -> bool {
        audio_ended || time >= duration
    }
}

impl Default for NarrationSync {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FALLBACK_ITEM_DURATION)
    }
}

fn declares_timing(action: &SceneAction) -> bool {
    action.declares_timing() || matches!(action.kind, ActionKind::AnimationPlay { .. })
}
