// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error and warning types.
//!
//! Validation errors fail a load as a whole. Warnings are recoverable: the
//! session logs them, reports them as events and keeps playing.

use thiserror::Error;

/// Malformed track or outline data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Timeline duration is negative or not finite
    #[error("Invalid timeline duration: {0}")]
    InvalidDuration(f64),

    /// Keyframe time outside the timeline
    #[error("{track}: time {time} outside [0, {duration}]")]
    TimeOutOfRange {
        /// Track label
        track: String,
        /// Offending time
        time: f64,
        /// Timeline duration
        duration: f64,
    },

    /// Keyframe times decrease
    #[error("{track}: time {time} at index {index} precedes {previous}")]
    NonMonotonic {
        /// Track label
        track: String,
        /// Key index
        index: usize,
        /// Time of the previous key
        previous: f64,
        /// Time of this key
        time: f64,
    },

    /// Two keyframes share a timestamp
    #[error("{track}: duplicate time {time}")]
    DuplicateTime {
        /// Track label
        track: String,
        /// Shared time
        time: f64,
    },

    /// Keyframe carries NaN or infinite values
    #[error("{track}: non-finite value at index {index}")]
    NonFinite {
        /// Track label
        track: String,
        /// Key index
        index: usize,
    },

    /// More than one track of a kind bound to a node
    #[error("Node {node} has more than one {kind} track")]
    DuplicateTrack {
        /// Node key
        node: String,
        /// Track kind
        kind: &'static str,
    },

    /// Identifier used twice
    #[error("Duplicate {kind} id: {id}")]
    DuplicateId {
        /// What the id names
        kind: &'static str,
        /// The id
        id: String,
    },

    /// Audio with a negative or non-finite duration
    #[error("Item {item}: invalid audio duration {duration}")]
    InvalidAudioDuration {
        /// Item id
        item: String,
        /// Declared duration
        duration: f64,
    },

    /// Subtitle offsets decrease
    #[error("Item {item}: subtitle {index} offset {offset} precedes {previous}")]
    SubtitleOrder {
        /// Item id
        item: String,
        /// Subtitle index
        index: usize,
        /// Offset of the previous subtitle
        previous: f64,
        /// Offset of this subtitle
        offset: f64,
    },

    /// Subtitle offset outside the narration audio
    #[error("Item {item}: subtitle {index} offset {offset} outside audio of {duration}s")]
    SubtitleOutOfRange {
        /// Item id
        item: String,
        /// Subtitle index
        index: usize,
        /// Offending offset
        offset: f64,
        /// Audio duration
        duration: f64,
    },

    /// Action time is negative or not finite
    #[error("Item {item}, action {index}: invalid time {value}")]
    InvalidActionTime {
        /// Item id
        item: String,
        /// Action index
        index: usize,
        /// Offending value
        value: f64,
    },

    /// Action window ends before it starts
    #[error("Item {item}, action {index}: window [{start}, {end}] is inverted")]
    InvertedWindow {
        /// Item id
        item: String,
        /// Action index
        index: usize,
        /// Window start
        start: f64,
        /// Window end
        end: f64,
    },

    /// `animation.play` names an animation the document does not contain
    #[error("Item {item}: unknown animation {animation}")]
    UnknownAnimation {
        /// Item id
        item: String,
        /// Referenced animation id
        animation: String,
    },

    /// `annotation.show`/`annotation.hide` names an unknown annotation
    #[error("Item {item}: unknown annotation {annotation}")]
    UnknownAnnotation {
        /// Item id
        item: String,
        /// Referenced annotation id
        annotation: String,
    },

    /// Error inside one animation's timeline
    #[error("Animation {animation}: {source}")]
    Animation {
        /// Animation id
        animation: String,
        /// Underlying error
        #[source]
        source: Box<ValidationError>,
    },
}

/// Non-fatal condition observed during playback
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackWarning {
    /// Narration audio position unavailable; wall-clock timing took over
    #[error("Audio sync lost on item {item}: {detail}")]
    SyncDrift {
        /// Item id
        item: String,
        /// What went wrong
        detail: String,
    },

    /// Two actions drive the same target over overlapping windows
    #[error("Actions {first} and {second} in {scope} both drive {target}; action {second} wins")]
    ActionResolutionConflict {
        /// Item or segment the actions belong to
        scope: String,
        /// Contested target (node, camera or annotation)
        target: String,
        /// Earlier-declared action index
        first: usize,
        /// Later-declared action index
        second: usize,
    },

    /// Caller passed an out-of-range argument; it was clamped
    #[error("Scheduler misuse: {0}")]
    SchedulerMisuse(String),

    /// Audio backend could not honor the playback rate
    #[error("Audio rate degraded: requested {requested}, applied {applied}")]
    RateDegraded {
        /// Requested rate
        requested: f64,
        /// Rate the backend applied
        applied: f64,
    },
}

impl PlaybackWarning {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SyncDrift { .. } => "sync-drift",
            Self::ActionResolutionConflict { .. } => "action-conflict",
            Self::SchedulerMisuse(_) => "scheduler-misuse",
            Self::RateDegraded { .. } => "rate-degraded",
        }
    }
}

/// Error returned by session navigation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// No outline has been loaded
    #[error("No outline loaded")]
    NotLoaded,

    /// No step with this id exists
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// Step exists but its animation is never played by the outline
    #[error("Step {0} belongs to an animation the outline never plays")]
    StepNotScheduled(String),

    /// Segment index past the end of the outline
    #[error("Segment index {index} out of range ({count} segments)")]
    SegmentOutOfRange {
        /// Requested index
        index: usize,
        /// Number of segments
        count: usize,
    },

    /// The document failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
