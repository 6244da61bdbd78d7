// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline engine for interactive 3D courseware.
//!
//! This crate plays a narrated outline against a 3D scene:
//! - Keyframed camera, visibility and transform tracks
//! - Declarative scene actions timed relative to their item
//! - Narration audio and subtitle synchronization
//! - Seekable, resumable playback with a single session clock
//!
//! ## Architecture
//!
//! The engine is built on:
//! - Immutable, shareable [`TrackStore`]s for animation data
//! - An [`ActionResolver`] that folds actions into a [`SceneState`]
//! - A [`Schedule`] that places segments and items on the session clock
//! - A [`TimelineSession`] that diffs state per tick into a
//!   [`SceneMutationBatch`] for a [`SceneAdapter`]
//!
//! Rendering and audio decoding stay outside: they are reached through the
//! [`SceneAdapter`] and [`AudioHost`] traits.

pub mod clock;
pub mod config;
pub mod error;
pub mod keyframe;
pub mod narration;
pub mod outline;
pub mod resolver;
pub mod scene;
pub mod schedule;
pub mod session;
pub mod store;
pub mod track;

pub use clock::{PlaybackClock, PlaybackState, MAX_RATE, MIN_RATE};
pub use config::SessionConfig;
pub use error::{PlaybackWarning, Result, SessionError, ValidationError};
pub use keyframe::{CameraKey, Easing, Interpolation, KeySpan, Step, TransformKey, VisibilityKey};
pub use narration::{AudioChannel, AudioError, AudioHost, NarrationClock, NarrationSync};
pub use outline::{
    validate_document, ActionKind, ActionWindow, Animation, AudioRef, CoursewareDocument, ItemType,
    SceneAction, Segment, SegmentItem, SegmentMode, Subtitle, VisibilityItem,
};
pub use resolver::{ActionKey, ActionResolver, FiredSet, FocusPlan, ItemKey};
pub use scene::{
    Annotation, CameraPose, NodeAnchor, NodeKey, PointerCue, SceneAdapter, SceneMutation,
    SceneMutationBatch, SceneState, Trs,
};
pub use schedule::{Schedule, ScheduledItem, ScheduledSegment, ScheduledStep};
pub use session::{SessionEvent, SessionId, TimelineSession};
pub use store::{TrackCursor, TrackStore};
pub use track::{Timeline, TransformTrack, VisibilityTrack};
