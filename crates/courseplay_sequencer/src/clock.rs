// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback clock.

use crate::error::PlaybackWarning;

/// Slowest accepted playback rate
pub const MIN_RATE: f64 = 0.1;

/// Fastest accepted playback rate
pub const MAX_RATE: f64 = 4.0;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Loaded, never played
    #[default]
    Idle,
    /// Advancing
    Playing,
    /// Holding position
    Paused,
    /// Jumping to a new position
    Seeking,
    /// Reached the end
    Ended,
}

impl PlaybackState {
    /// Lowercase name for logs and UIs
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Seeking => "seeking",
            Self::Ended => "ended",
        }
    }
}

/// Session clock driven by frame deltas or an external master
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    time: f64,
    duration: f64,
    state: PlaybackState,
    rate: f64,
    /// Warnings raised since the last take
    pending_warnings: Vec<PlaybackWarning>,
}

impl PlaybackClock {
    /// Create an idle clock at 0
    pub fn new(duration: f64) -> Self {
        Self {
            time: 0.0,
            duration: duration.max(0.0),
            state: PlaybackState::Idle,
            rate: 1.0,
            pending_warnings: Vec::new(),
        }
    }

    /// Current time in seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Total length in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Current rate multiplier
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whether the clock advances on tick
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Play from the current position; an ended clock restarts from 0
    pub fn play(&mut self) {
        if self.state == PlaybackState::Ended {
            self.time = 0.0;
        }
        self.state = PlaybackState::Playing;
        if self.time >= self.duration {
            self.finish();
        }
    }

    /// Pause playback
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Jump to `time`, clamped to `[0, duration]`.
    ///
    /// The clock returns to the state it had before the seek, except that an
    /// ended clock moved before its end becomes paused.
    pub fn seek(&mut self, time: f64) {
        let prior = self.state;
        self.state = PlaybackState::Seeking;

        let target = if time.is_nan() {
            self.warn(format!("seek to NaN ignored, staying at {:.3}", self.time));
            self.time
        } else if time < 0.0 || time > self.duration {
            let clamped = time.clamp(0.0, self.duration);
            self.warn(format!("seek to {time:.3} clamped to {clamped:.3}"));
            clamped
        } else {
            time
        };
        self.time = target;

        self.state = match prior {
            PlaybackState::Ended if target < self.duration => PlaybackState::Paused,
            PlaybackState::Seeking => PlaybackState::Paused,
            other => other,
        };
        tracing::debug!(time = target, state = self.state.name(), "Clock seek");
    }

    /// Set the rate multiplier, clamped to `[MIN_RATE, MAX_RATE]`
    pub fn set_rate(&mut self, rate: f64) -> f64 {
        let applied = if rate.is_nan() || rate <= 0.0 {
            MIN_RATE
        } else {
            rate.clamp(MIN_RATE, MAX_RATE)
        };
        if applied != rate {
            self.warn(format!("rate {rate} clamped to {applied}"));
        }
        self.rate = applied;
        applied
    }

    /// Advance by a wall-clock delta scaled by the rate.
    ///
    /// Only a playing clock moves; negative or non-finite deltas are ignored.
    pub fn tick(&mut self, delta: f64) -> f64 {
        if self.state != PlaybackState::Playing {
            return self.time;
        }
        if !delta.is_finite() || delta < 0.0 {
            tracing::debug!(delta, "Ignoring invalid tick delta");
            return self.time;
        }
        self.time += delta * self.rate;
        if self.time >= self.duration {
            self.finish();
        }
        self.time
    }

    /// Move a playing clock forward to `time` set by an external master.
    ///
    /// Earlier times are ignored so the clock never runs backwards.
    pub fn advance_to(&mut self, time: f64) -> f64 {
        if self.state != PlaybackState::Playing || !time.is_finite() {
            return self.time;
        }
        self.time = self.time.max(time);
        if self.time >= self.duration {
            self.finish();
        }
        self.time
    }

    /// Take warnings raised since the last call
    pub fn take_warnings(&mut self) -> Vec<PlaybackWarning> {
        std::mem::take(&mut self.pending_warnings)
    }

    fn finish(&mut self) {
        self.time = self.duration;
        self.state = PlaybackState::Ended;
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(%message, "Scheduler misuse");
        self.pending_warnings.push(PlaybackWarning::SchedulerMisuse(message));
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_only_while_playing() {
        let mut clock = PlaybackClock::new(10.0);
        assert_eq!(clock.tick(1.0), 0.0);
        clock.play();
        assert_eq!(clock.tick(1.5), 1.5);
        clock.pause();
        assert_eq!(clock.tick(5.0), 1.5);
        assert_eq!(clock.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_ignores_bad_deltas() {
        let mut clock = PlaybackClock::new(10.0);
        clock.play();
        clock.tick(1.0);
        clock.tick(-0.5);
        clock.tick(f64::NAN);
        clock.tick(f64::INFINITY);
        assert_eq!(clock.time(), 1.0);
        assert!(clock.take_warnings().is_empty());
    }

    #[test]
    fn test_reaching_the_end_stops_and_play_restarts() {
        let mut clock = PlaybackClock::new(2.0);
        clock.play();
        clock.tick(3.0);
        assert_eq!(clock.state(), PlaybackState::Ended);
        assert_eq!(clock.time(), 2.0);

        clock.play();
        assert_eq!(clock.state(), PlaybackState::Playing);
        assert_eq!(clock.time(), 0.0);
    }

    #[test]
    fn test_seek_clamps_and_restores_state() {
        let mut clock = PlaybackClock::new(10.0);
        clock.play();
        clock.seek(12.0);
        assert_eq!(clock.time(), 10.0);
        assert_eq!(clock.state(), PlaybackState::Playing);
        assert!(matches!(
            clock.take_warnings()[..],
            [PlaybackWarning::SchedulerMisuse(_)]
        ));

        clock.tick(0.0);
        assert_eq!(clock.state(), PlaybackState::Ended);
        clock.seek(4.0);
        assert_eq!(clock.state(), PlaybackState::Paused);
        assert_eq!(clock.time(), 4.0);

        clock.seek(-1.0);
        assert_eq!(clock.time(), 0.0);
        assert_eq!(clock.take_warnings().len(), 1);
    }

    #[test]
    fn test_rate_scales_and_clamps() {
        let mut clock = PlaybackClock::new(100.0);
        assert_eq!(clock.set_rate(2.0), 2.0);
        clock.play();
        assert_eq!(clock.tick(1.0), 2.0);

        assert_eq!(clock.set_rate(0.0), MIN_RATE);
        assert_eq!(clock.set_rate(f64::INFINITY), MAX_RATE);
        assert_eq!(clock.take_warnings().len(), 2);
    }

    #[test]
    fn test_external_master_never_rewinds() {
        let mut clock = PlaybackClock::new(5.0);
        clock.play();
        assert_eq!(clock.advance_to(2.0), 2.0);
        assert_eq!(clock.advance_to(1.0), 2.0);
        assert_eq!(clock.advance_to(6.0), 5.0);
        assert_eq!(clock.state(), PlaybackState::Ended);
    }
}
