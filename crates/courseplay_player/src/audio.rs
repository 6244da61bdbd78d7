// SPDX-License-Identifier: MIT OR Apache-2.0
//! Simulated narration backend.
//!
//! Channels do not decode anything: they run a position forward by the
//! frame time the player hands to [`SimulatedAudioHost::advance`], clamped
//! to the length declared in the outline.

use courseplay_sequencer::{AudioChannel, AudioError, AudioHost, AudioRef};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Slowest rate the simulated backend plays at
pub const SIMULATED_MIN_RATE: f64 = 0.5;
/// Fastest rate the simulated backend plays at
pub const SIMULATED_MAX_RATE: f64 = 2.0;

#[derive(Debug)]
struct Playhead {
    url: String,
    position: f64,
    duration: f64,
    rate: f64,
    playing: bool,
}

impl Playhead {
    fn advance(&mut self, delta: f64) {
        if !self.playing {
            return;
        }
        self.position = (self.position + delta * self.rate).min(self.duration);
        if self.position >= self.duration {
            self.playing = false;
            tracing::trace!(url = %self.url, "simulated narration finished");
        }
    }
}

/// Audio host whose channels advance in step with the player loop
///
/// Clones share the same set of open channels, so the player can keep one
/// handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAudioHost {
    channels: Rc<RefCell<Vec<Weak<RefCell<Playhead>>>>>,
}

impl SimulatedAudioHost {
    /// Create a host with no open channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Move every playing channel forward by `delta` seconds of wall time
    pub fn advance(&self, delta: f64) {
        let mut channels = self.channels.borrow_mut();
        channels.retain(|weak| match weak.upgrade() {
            Some(playhead) => {
                playhead.borrow_mut().advance(delta);
                true
            }
            None => false,
        });
    }

    /// Number of channels the session still holds
    pub fn open_channels(&self) -> usize {
        self.channels
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl AudioHost for SimulatedAudioHost {
    fn open(&mut self, audio: &AudioRef) -> Result<Box<dyn AudioChannel>, AudioError> {
        if audio.url.is_empty() {
            return Err(AudioError::Unavailable("empty audio url".to_string()));
        }
        if !audio.duration.is_finite() || audio.duration <= 0.0 {
            return Err(AudioError::Backend(format!(
                "{} declares no playable length",
                audio.url
            )));
        }

        let playhead = Rc::new(RefCell::new(Playhead {
            url: audio.url.clone(),
            position: 0.0,
            duration: audio.duration,
            rate: 1.0,
            playing: false,
        }));
        self.channels.borrow_mut().push(Rc::downgrade(&playhead));
        tracing::debug!(url = %audio.url, duration = audio.duration, "simulated narration opened");

        Ok(Box::new(SimulatedChannel { playhead }))
    }
}

struct SimulatedChannel {
    playhead: Rc<RefCell<Playhead>>,
}

impl AudioChannel for SimulatedChannel {
    fn current_time(&self) -> Option<f64> {
        Some(self.playhead.borrow().position)
    }

    fn duration(&self) -> Option<f64> {
        Some(self.playhead.borrow().duration)
    }

    fn is_ended(&self) -> bool {
        let playhead = self.playhead.borrow();
        playhead.position >= playhead.duration
    }

    fn play(&mut self) {
        let mut playhead = self.playhead.borrow_mut();
        if playhead.position < playhead.duration {
            playhead.playing = true;
        }
    }

    fn pause(&mut self) {
        self.playhead.borrow_mut().playing = false;
    }

    fn seek(&mut self, time: f64) {
        let mut playhead = self.playhead.borrow_mut();
        playhead.position = time.clamp(0.0, playhead.duration);
    }

    fn set_rate(&mut self, rate: f64) -> f64 {
        let applied = rate.clamp(SIMULATED_MIN_RATE, SIMULATED_MAX_RATE);
        self.playhead.borrow_mut().rate = applied;
        applied
    }
}
