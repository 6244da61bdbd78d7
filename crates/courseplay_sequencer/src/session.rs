// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline session: the public face of the engine.
//!
//! A session owns one loaded outline and drives it from frame ticks. Every
//! tick computes the complete scene state for the current session time by
//! folding all started actions over the document's base state, then diffs
//! it against what was published last. Scene state therefore depends only
//! on session time, and backward navigation lands exactly where a cold
//! seek would.

use crate::clock::{PlaybackClock, PlaybackState};
use crate::config::SessionConfig;
use crate::error::{PlaybackWarning, Result, SessionError, ValidationError};
use crate::keyframe::Step;
use crate::narration::{AudioChannel, AudioHost, NarrationClock, NarrationSync};
use crate::outline::{validate_document, ActionKind, CoursewareDocument, SegmentItem, SegmentMode, Subtitle};
use crate::resolver::{ActionKey, ActionResolver, ItemKey};
use crate::scene::{SceneMutationBatch, SceneState};
use crate::schedule::{Schedule, ScheduledItem, ScheduledSegment};
use crate::store::TrackStore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Largest difference between requested and applied audio rate still treated as equal
const RATE_TOLERANCE: f64 = 1e-6;

/// Unique identifier for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Something observers of a session may care about
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Playback state changed
    StateChanged {
        /// Previous state
        from: PlaybackState,
        /// New state
        to: PlaybackState,
    },
    /// A different segment became current
    SegmentChanged {
        /// Segment index
        index: usize,
        /// Segment id
        id: String,
    },
    /// An item began running
    ItemStarted {
        /// Outline position
        item: ItemKey,
        /// Item id
        id: String,
    },
    /// A subtitle line became active
    Subtitle {
        /// Outline position of the narrating item
        item: ItemKey,
        /// Subtitle index within the item
        index: usize,
        /// Text
        text: String,
    },
    /// An animation step was reached
    Step {
        /// The step
        step: Step,
        /// Animation owning the step
        animation: String,
    },
    /// The end of the outline was reached
    Ended,
    /// Something non-fatal went wrong
    Warning(PlaybackWarning),
}

/// Callback for state transitions
pub type StateListener = Box<dyn FnMut(PlaybackState, PlaybackState)>;

/// Callback for session events
pub type EventListener = Box<dyn FnMut(&SessionEvent)>;

struct LoadedOutline {
    document: CoursewareDocument,
    schedule: Schedule,
    base: SceneState,
}

impl LoadedOutline {
    fn item(&self, key: ItemKey) -> &SegmentItem {
        &self.document.outline[key.segment].items[key.item]
    }
}

struct NarrationChannel {
    channel: Option<Box<dyn AudioChannel>>,
    /// Set once the item gave up on audio timing
    wall_clock: bool,
}

/// What drives the clock during one tick of a sequence item
enum Lead {
    Audio { position: f64, ended: bool },
    Lost,
    WallClock,
}

/// Playback session over one courseware outline
pub struct TimelineSession {
    id: SessionId,
    config: SessionConfig,
    narration: NarrationSync,
    clock: PlaybackClock,
    resolver: ActionResolver,
    loaded: Option<Rc<LoadedOutline>>,
    published: SceneState,
    last_eval: Option<f64>,
    current_segment: Option<usize>,
    announced: HashSet<ItemKey>,
    subtitles: HashMap<ItemKey, usize>,
    fired_steps: HashSet<usize>,
    audio_host: Option<Box<dyn AudioHost>>,
    channels: HashMap<ItemKey, NarrationChannel>,
    events: Vec<SessionEvent>,
    state_listeners: Vec<StateListener>,
    event_listeners: Vec<EventListener>,
}

impl TimelineSession {
    /// Create an empty session
    pub fn new(config: SessionConfig) -> Self {
        let narration = NarrationSync::new(config.fallback_item_duration);
        Self {
            id: SessionId::new(),
            config,
            narration,
            clock: PlaybackClock::default(),
            resolver: ActionResolver::default(),
            loaded: None,
            published: SceneState::default(),
            last_eval: None,
            current_segment: None,
            announced: HashSet::new(),
            subtitles: HashMap::new(),
            fired_steps: HashSet::new(),
            audio_host: None,
            channels: HashMap::new(),
            events: Vec::new(),
            state_listeners: Vec::new(),
            event_listeners: Vec::new(),
        }
    }

    /// Attach an audio collaborator for narration
    pub fn with_audio_host(mut self, host: impl AudioHost + 'static) -> Self {
        self.audio_host = Some(Box::new(host));
        self
    }

    /// Replace or remove the audio collaborator
    pub fn set_audio_host(&mut self, host: Option<Box<dyn AudioHost>>) {
        self.channels.clear();
        self.audio_host = host;
    }

    /// Session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Validate and load a document, replacing any previous outline.
    ///
    /// On error the session is left untouched.
    pub fn load_outline(&mut self, document: CoursewareDocument) -> Result<()> {
        validate_document(&document)?;

        let mut animations = IndexMap::new();
        for animation in &document.animations {
            let store = TrackStore::load(animation.timeline.clone()).map_err(|source| {
                ValidationError::Animation {
                    animation: animation.id.clone(),
                    source: Box::new(source),
                }
            })?;
            animations.insert(animation.id.clone(), Arc::new(store));
        }
        let anchors = document
            .nodes
            .iter()
            .map(|node| (node.node_key.clone(), node.clone()))
            .collect();
        let base = base_state(&document, &animations);
        let mut resolver = ActionResolver::new(animations, anchors, self.config.default_easing)
            .with_base(base.clone());

        let schedule = Schedule::build(&document.outline, &self.narration, |id| {
            resolver.animation(id).map(|store| (store.duration(), store.steps()))
        });
        plan_focus_moves(&mut resolver, &document, &schedule, &base);
        let warnings = detect_conflicts(&resolver, &document);

        let previous = self.clock.state();
        self.resolver = resolver;
        self.clock = PlaybackClock::new(schedule.duration());
        self.clock.set_rate(self.config.default_rate);
        self.published = SceneState::default();
        self.last_eval = Some(0.0);
        self.current_segment = None;
        self.announced.clear();
        self.subtitles.clear();
        self.fired_steps.clear();
        self.channels.clear();

        tracing::info!(
            session = %self.id,
            title = %document.title,
            segments = schedule.segments().len(),
            items = schedule.items().len(),
            duration = schedule.duration(),
            "Outline loaded"
        );
        self.loaded = Some(Rc::new(LoadedOutline {
            document,
            schedule,
            base,
        }));

        for warning in warnings {
            self.emit(SessionEvent::Warning(warning));
        }
        self.flush_clock(previous);
        Ok(())
    }

    /// Start or resume playback; an ended session restarts from 0
    pub fn play(&mut self) -> Result<()> {
        let loaded = self.loaded.clone().ok_or(SessionError::NotLoaded)?;
        let before = self.clock.state();
        if before == PlaybackState::Ended {
            self.seek_internal(&loaded, 0.0);
        }
        self.clock.play();
        self.set_channels_playing(true);
        self.flush_clock(before);
        Ok(())
    }

    /// Pause playback
    pub fn pause(&mut self) {
        let before = self.clock.state();
        self.clock.pause();
        self.set_channels_playing(false);
        self.flush_clock(before);
    }

    /// Jump to session time `time`, clamped to the outline.
    ///
    /// The next tick publishes the state at the new position. Cues that
    /// start before it count as fired; a cue starting exactly at it fires.
    pub fn seek(&mut self, time: f64) -> Result<()> {
        let loaded = self.loaded.clone().ok_or(SessionError::NotLoaded)?;
        let before = self.clock.state();
        self.seek_internal(&loaded, time);
        self.flush_clock(before);
        Ok(())
    }

    /// Seek to where a step is first reached by an `animation.play`
    pub fn seek_to_step(&mut self, step_id: &str) -> Result<()> {
        let loaded = self.loaded.clone().ok_or(SessionError::NotLoaded)?;
        let Some(scheduled) = loaded.schedule.step(step_id) else {
            let exists = self
                .resolver
                .animations()
                .any(|(_, store)| store.step(step_id).is_some());
            return Err(if exists {
                SessionError::StepNotScheduled(step_id.to_string())
            } else {
                SessionError::UnknownStep(step_id.to_string())
            });
        };
        self.seek(scheduled.time)
    }

    /// Seek to the start of a segment
    pub fn seek_to_segment(&mut self, index: usize) -> Result<()> {
        let loaded = self.loaded.clone().ok_or(SessionError::NotLoaded)?;
        let Some(segment) = loaded.schedule.segment(index) else {
            return Err(SessionError::SegmentOutOfRange {
                index,
                count: loaded.schedule.segments().len(),
            });
        };
        self.seek(segment.start)
    }

    /// Seek to the next segment, or to the end from the last one
    pub fn next(&mut self) -> Result<()> {
        let loaded = self.loaded.clone().ok_or(SessionError::NotLoaded)?;
        let next = loaded
            .schedule
            .segment_at(self.clock.time())
            .map_or(0, |index| index + 1);
        match loaded.schedule.segment(next) {
            Some(segment) => self.seek(segment.start),
            None => self.seek(loaded.schedule.duration()),
        }
    }

    /// Seek to the start of the previous segment, or of the first one
    pub fn previous(&mut self) -> Result<()> {
        let loaded = self.loaded.clone().ok_or(SessionError::NotLoaded)?;
        let current = loaded.schedule.segment_at(self.clock.time()).unwrap_or(0);
        match loaded.schedule.segment(current.saturating_sub(1)) {
            Some(segment) => self.seek(segment.start),
            None => self.seek(0.0),
        }
    }

    /// Set the playback rate; audio that cannot follow raises a warning
    pub fn set_rate(&mut self, rate: f64) {
        let applied = self.clock.set_rate(rate);
        let mut warnings = self.clock.take_warnings();
        for narration in self.channels.values_mut() {
            let Some(channel) = narration.channel.as_mut() else {
                continue;
            };
            let got = channel.set_rate(applied);
            if (got - applied).abs() > RATE_TOLERANCE {
                tracing::warn!(requested = applied, applied = got, "Audio rate degraded");
                warnings.push(PlaybackWarning::RateDegraded {
                    requested: applied,
                    applied: got,
                });
            }
        }
        for warning in warnings {
            self.emit(SessionEvent::Warning(warning));
        }
    }

    /// Advance by a wall-clock delta and return the scene changes to apply
    pub fn tick(&mut self, delta: f64) -> SceneMutationBatch {
        let Some(loaded) = self.loaded.clone() else {
            return SceneMutationBatch::new(0.0);
        };
        let before = self.clock.state();

        if self.clock.is_playing() {
            self.open_channels(&loaded, self.clock.time());
            self.advance(&loaded, delta);
        }
        let now = self.clock.time();
        self.sync_audio(&loaded, now);

        let next = self.evaluate(&loaded, now);
        let mut batch = SceneMutationBatch::diff(now, &self.published, &next);
        let from = self.last_eval.filter(|t| *t <= now).unwrap_or(now);
        for scheduled in loaded.schedule.started_items(now) {
            let actions = &loaded.item(scheduled.key).actions;
            self.resolver.fire_crossings(
                scheduled.key,
                actions,
                scheduled.local(from),
                scheduled.local(now),
                &mut batch,
            );
        }
        self.emit_progress(&loaded, from, now);

        self.published = next;
        self.last_eval = Some(now);
        self.flush_clock(before);

        if !batch.is_empty() {
            tracing::trace!(time = now, mutations = batch.len(), "Scene batch");
        }
        batch
    }

    /// Register a state transition callback
    pub fn on_state_change(&mut self, listener: impl FnMut(PlaybackState, PlaybackState) + 'static) {
        self.state_listeners.push(Box::new(listener));
    }

    /// Register an event callback
    pub fn on_event(&mut self, listener: impl FnMut(&SessionEvent) + 'static) {
        self.event_listeners.push(Box::new(listener));
    }

    /// Take queued events
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Playback state
    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    /// Session time in seconds
    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    /// Outline length in seconds
    pub fn duration(&self) -> f64 {
        self.clock.duration()
    }

    /// Playback rate
    pub fn rate(&self) -> f64 {
        self.clock.rate()
    }

    /// Index of the segment at the current time
    pub fn current_segment(&self) -> Option<usize> {
        self.loaded.as_ref()?.schedule.segment_at(self.clock.time())
    }

    /// Subtitle shown at the current time
    pub fn active_subtitle(&self) -> Option<&Subtitle> {
        let loaded = self.loaded.as_ref()?;
        let now = self.clock.time();
        loaded.schedule.active_items(now).find_map(|scheduled| {
            NarrationSync::active_subtitle(loaded.item(scheduled.key), scheduled.local(now))
                .map(|(_, subtitle)| subtitle)
        })
    }

    /// Actions whose window contains the current time, per running item
    pub fn active_actions(&self) -> Vec<(ItemKey, usize)> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Vec::new();
        };
        let now = self.clock.time();
        let duration_of = |id: &str| self.resolver.animation_duration(id);
        loaded
            .schedule
            .active_items(now)
            .flat_map(|scheduled| {
                NarrationSync::active_actions(loaded.item(scheduled.key), scheduled.local(now), duration_of)
                    .into_iter()
                    .map(move |index| (scheduled.key, index))
            })
            .collect()
    }

    /// Scene state as last published by [`Self::tick`]
    pub fn scene_state(&self) -> &SceneState {
        &self.published
    }

    /// Scene state at an arbitrary session time, without publishing it
    pub fn state_at(&mut self, time: f64) -> Option<SceneState> {
        let loaded = self.loaded.clone()?;
        Some(self.evaluate(&loaded, time.clamp(0.0, loaded.schedule.duration())))
    }

    /// The loaded document
    pub fn document(&self) -> Option<&CoursewareDocument> {
        self.loaded.as_ref().map(|loaded| &loaded.document)
    }

    /// Segment layout of the loaded outline
    pub fn segments(&self) -> &[ScheduledSegment] {
        self.loaded
            .as_ref()
            .map_or(&[][..], |loaded| loaded.schedule.segments())
    }

    fn evaluate(&mut self, loaded: &LoadedOutline, time: f64) -> SceneState {
        let mut state = loaded.base.clone();
        for scheduled in loaded.schedule.started_items(time) {
            let actions = &loaded.item(scheduled.key).actions;
            self.resolver
                .resolve_into(scheduled.key, actions, scheduled.local(time), &mut state, None);
        }
        state
    }

    fn seek_internal(&mut self, loaded: &LoadedOutline, time: f64) {
        self.clock.seek(time);
        let now = self.clock.time();

        self.resolver.reset_cursors();
        for scheduled in loaded.schedule.items() {
            let actions = &loaded.item(scheduled.key).actions;
            self.resolver
                .rebuild_fired(scheduled.key, actions, scheduled.local(now));
        }
        self.fired_steps = loaded
            .schedule
            .steps()
            .iter()
            .enumerate()
            .filter(|(_, step)| step.time < now)
            .map(|(index, _)| index)
            .collect();
        self.announced.clear();
        self.subtitles.clear();

        let active: Vec<ScheduledItem> = loaded.schedule.active_items(now).copied().collect();
        self.channels.retain(|key, narration| {
            let Some(scheduled) = active.iter().find(|s| s.key == *key) else {
                return false;
            };
            if let Some(channel) = narration.channel.as_mut() {
                channel.seek(scheduled.local(now));
            }
            true
        });

        self.last_eval = Some(now);
        tracing::debug!(session = %self.id, time = now, "Seek");
    }

    /// Move a playing clock: audio leads in sequence segments, wall clock otherwise
    fn advance(&mut self, loaded: &LoadedOutline, delta: f64) {
        let now = self.clock.time();
        let sequence = loaded
            .schedule
            .segment_at(now)
            .and_then(|index| loaded.schedule.segment(index))
            .is_some_and(|segment| segment.mode == SegmentMode::Sequence);

        let master = if sequence {
            loaded.schedule.active_items(now).next().copied()
        } else {
            None
        };
        let Some(scheduled) = master else {
            self.clock.tick(delta);
            return;
        };

        let item = loaded.item(scheduled.key);
        let narration = self.channels.get_mut(&scheduled.key);
        let available = narration
            .as_ref()
            .is_some_and(|n| !n.wall_clock && n.channel.is_some());
        let lead = match (NarrationSync::clock_for(item, available), narration) {
            (NarrationClock::Audio, Some(narration)) => {
                let reading = narration
                    .channel
                    .as_ref()
                    .map(|channel| (channel.current_time(), channel.is_ended()));
                match reading {
                    Some((Some(position), ended)) => Lead::Audio { position, ended },
                    Some((None, _)) => {
                        narration.wall_clock = true;
                        Lead::Lost
                    }
                    None => Lead::WallClock,
                }
            }
            _ => Lead::WallClock,
        };

        match lead {
            Lead::Audio { position, ended } => {
                let target = if NarrationSync::is_complete(scheduled.duration, position, ended) {
                    scheduled.end()
                } else {
                    scheduled.start + position
                };
                self.clock.advance_to(target);
            }
            Lead::Lost => {
                let warning = PlaybackWarning::SyncDrift {
                    item: loaded.item(scheduled.key).id.clone(),
                    detail: "audio position unavailable".to_string(),
                };
                tracing::warn!(%warning, "Falling back to wall-clock timing");
                self.emit(SessionEvent::Warning(warning));
                self.clock.tick(delta);
            }
            Lead::WallClock => {
                self.clock.tick(delta);
            }
        }
    }

    /// Open channels for running narrated items and close finished ones
    fn open_channels(&mut self, loaded: &LoadedOutline, now: f64) {
        let active: Vec<ScheduledItem> = loaded
            .schedule
            .active_items(now)
            .filter(|scheduled| loaded.item(scheduled.key).audio.is_some())
            .copied()
            .collect();
        self.channels.retain(|key, narration| {
            let keep = active.iter().any(|s| s.key == *key);
            if !keep {
                if let Some(channel) = narration.channel.as_mut() {
                    channel.pause();
                }
            }
            keep
        });
        let Some(host) = self.audio_host.as_mut() else {
            return;
        };

        let playing = self.clock.is_playing();
        let rate = self.clock.rate();
        let mut warnings = Vec::new();
        for scheduled in &active {
            let item = loaded.item(scheduled.key);
            let Some(audio) = &item.audio else {
                continue;
            };
            let Entry::Vacant(slot) = self.channels.entry(scheduled.key) else {
                continue;
            };
            let narration = match host.open(audio) {
                Ok(mut channel) => {
                    channel.seek(scheduled.local(now));
                    let applied = channel.set_rate(rate);
                    if (applied - rate).abs() > RATE_TOLERANCE {
                        tracing::warn!(requested = rate, applied, "Audio rate degraded");
                        warnings.push(PlaybackWarning::RateDegraded {
                            requested: rate,
                            applied,
                        });
                    }
                    if playing {
                        channel.play();
                    }
                    tracing::debug!(item = %item.id, url = %audio.url, "Narration opened");
                    NarrationChannel {
                        channel: Some(channel),
                        wall_clock: false,
                    }
                }
                Err(error) => {
                    let warning = PlaybackWarning::SyncDrift {
                        item: item.id.clone(),
                        detail: error.to_string(),
                    };
                    tracing::warn!(%warning, "Falling back to wall-clock timing");
                    warnings.push(warning);
                    NarrationChannel {
                        channel: None,
                        wall_clock: true,
                    }
                }
            };
            slot.insert(narration);
        }

        for warning in warnings {
            self.emit(SessionEvent::Warning(warning));
        }
    }

    /// Open channels at `now`, then re-seek parallel narration that drifted
    fn sync_audio(&mut self, loaded: &LoadedOutline, now: f64) {
        self.open_channels(loaded, now);
        if !self.clock.is_playing() {
            return;
        }

        let tolerance = self.config.drift_tolerance;
        let parallel: Vec<ScheduledItem> = loaded
            .schedule
            .active_items(now)
            .filter(|scheduled| {
                loaded
                    .schedule
                    .segment(scheduled.key.segment)
                    .is_some_and(|segment| segment.mode == SegmentMode::Parallel)
            })
            .copied()
            .collect();
        let mut warnings = Vec::new();
        for scheduled in &parallel {
            let Some(narration) = self.channels.get_mut(&scheduled.key) else {
                continue;
            };
            let Some(channel) = narration.channel.as_mut() else {
                continue;
            };
            let local = scheduled.local(now);
            match channel.current_time() {
                Some(position) if (position - local).abs() > tolerance && !channel.is_ended() => {
                    tracing::debug!(position, local, "Re-seeking drifted narration");
                    channel.seek(local);
                }
                Some(_) => {}
                None if !narration.wall_clock => {
                    narration.wall_clock = true;
                    warnings.push(PlaybackWarning::SyncDrift {
                        item: loaded.item(scheduled.key).id.clone(),
                        detail: "audio position unavailable".to_string(),
                    });
                }
                None => {}
            }
        }

        for warning in warnings {
            self.emit(SessionEvent::Warning(warning));
        }
    }

    fn set_channels_playing(&mut self, playing: bool) {
        for channel in self.channels.values_mut().filter_map(|n| n.channel.as_mut()) {
            if playing {
                channel.play();
            } else {
                channel.pause();
            }
        }
    }

    /// Segment, item, subtitle and step events for the pass `[from, now]`
    fn emit_progress(&mut self, loaded: &LoadedOutline, from: f64, now: f64) {
        let segment = loaded.schedule.segment_at(now);
        if segment != self.current_segment {
            self.current_segment = segment;
            if let Some(scheduled) = segment.and_then(|index| loaded.schedule.segment(index)) {
                tracing::info!(session = %self.id, segment = %scheduled.id, "Segment changed");
                self.emit(SessionEvent::SegmentChanged {
                    index: scheduled.index,
                    id: scheduled.id.clone(),
                });
            }
        }

        // Items crossed this tick are announced even when they take no time.
        for scheduled in loaded.schedule.started_items(now) {
            if scheduled.start < from && !scheduled.contains(now) {
                continue;
            }
            if self.announced.insert(scheduled.key) {
                self.emit(SessionEvent::ItemStarted {
                    item: scheduled.key,
                    id: loaded.item(scheduled.key).id.clone(),
                });
            }
        }

        for scheduled in loaded.schedule.active_items(now) {
            let item = loaded.item(scheduled.key);
            if let Some((index, subtitle)) = NarrationSync::active_subtitle(item, scheduled.local(now)) {
                if self.subtitles.insert(scheduled.key, index) != Some(index) {
                    self.emit(SessionEvent::Subtitle {
                        item: scheduled.key,
                        index,
                        text: subtitle.text.clone(),
                    });
                }
            }
        }

        for (index, scheduled) in loaded.schedule.steps().iter().enumerate() {
            if scheduled.time < from || scheduled.time > now {
                continue;
            }
            if self.fired_steps.insert(index) {
                tracing::debug!(step = %scheduled.step.id, time = scheduled.time, "Step reached");
                self.emit(SessionEvent::Step {
                    step: scheduled.step.clone(),
                    animation: scheduled.animation.clone(),
                });
            }
        }
    }

    /// Emit clock warnings and the net state change since `before`
    fn flush_clock(&mut self, before: PlaybackState) {
        for warning in self.clock.take_warnings() {
            self.emit(SessionEvent::Warning(warning));
        }
        let after = self.clock.state();
        if after != before {
            tracing::info!(
                session = %self.id,
                from = before.name(),
                to = after.name(),
                time = self.clock.time(),
                "Playback state changed"
            );
            self.emit(SessionEvent::StateChanged {
                from: before,
                to: after,
            });
            if after == PlaybackState::Ended {
                self.emit(SessionEvent::Ended);
            }
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        if let SessionEvent::StateChanged { from, to } = event {
            for listener in &mut self.state_listeners {
                listener(from, to);
            }
        }
        for listener in &mut self.event_listeners {
            listener(&event);
        }
        self.events.push(event);
    }
}

impl Default for TimelineSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// State before any action: document camera, anchor visibility, animated
/// nodes at their track default, other referenced nodes visible and every
/// annotation hidden
fn base_state(
    document: &CoursewareDocument,
    animations: &IndexMap<String, Arc<TrackStore>>,
) -> SceneState {
    let mut base = SceneState {
        camera: document.camera,
        ..Default::default()
    };
    for node in &document.nodes {
        base.visibility.insert(node.node_key.clone(), node.visible);
    }
    for store in animations.values() {
        for (node, visible) in store.visibility_defaults() {
            base.visibility.entry(node.clone()).or_insert(visible);
        }
    }
    let actions = document
        .outline
        .iter()
        .flat_map(|segment| &segment.items)
        .flat_map(|item| &item.actions);
    for action in actions {
        if let ActionKind::VisibilitySet { items } = &action.kind {
            for entry in items {
                base.visibility.entry(entry.node_key.clone()).or_insert(true);
            }
        }
    }
    for annotation in &document.annotations {
        base.annotations.insert(annotation.id.clone(), false);
    }
    base
}

/// Precompute every `camera.focus` move from the state at its window start
fn plan_focus_moves(
    resolver: &mut ActionResolver,
    document: &CoursewareDocument,
    schedule: &Schedule,
    base: &SceneState,
) {
    let items = schedule.items();
    let actions_of = |key: ItemKey| &document.outline[key.segment].items[key.item].actions;

    for (position, scheduled) in items.iter().enumerate() {
        let actions = actions_of(scheduled.key);
        for (index, action) in actions.iter().enumerate() {
            if !matches!(action.kind, ActionKind::CameraFocus { .. }) {
                continue;
            }
            let window_start = action.resolved_window().start;
            let at = scheduled.start + window_start;
            let mut state = base.clone();
            for earlier in &items[..position] {
                resolver.resolve_into(
                    earlier.key,
                    actions_of(earlier.key),
                    earlier.local(at),
                    &mut state,
                    None,
                );
            }
            resolver.resolve_into(scheduled.key, actions, window_start, &mut state, Some(index));
            if let Some(plan) = resolver.plan_focus(action, state.camera) {
                resolver.insert_plan(
                    ActionKey {
                        item: scheduled.key,
                        action: index,
                    },
                    plan,
                );
            }
        }
    }
    resolver.reset_cursors();
}

/// Overlap warnings per sequence item and per parallel segment
fn detect_conflicts(resolver: &ActionResolver, document: &CoursewareDocument) -> Vec<PlaybackWarning> {
    let mut warnings = Vec::new();
    for segment in &document.outline {
        match segment.mode {
            SegmentMode::Sequence => {
                for item in &segment.items {
                    let entries: Vec<_> = item.actions.iter().collect();
                    warnings.extend(resolver.detect_conflicts(&item.id, &entries));
                }
            }
            SegmentMode::Parallel => {
                let entries: Vec<_> = segment
                    .items
                    .iter()
                    .flat_map(|item| &item.actions)
                    .collect();
                warnings.extend(resolver.detect_conflicts(&segment.id, &entries));
            }
        }
    }
    warnings
}
