// SPDX-License-Identifier: MIT OR Apache-2.0
//! Track definitions and their interpolators.
//!
//! Evaluation is pure: every function here takes a sorted key slice and a
//! time and returns a value. Keys must already have passed
//! [`TrackStore::load`](crate::store::TrackStore::load) validation.

use crate::keyframe::{CameraKey, Interpolation, KeySpan, Step, TransformKey, VisibilityKey};
use crate::scene::{CameraPose, NodeKey, Trs};
use serde::{Deserialize, Serialize};

/// One animation's tracks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    /// Length in seconds
    pub duration: f64,
    /// Camera keyframes
    #[serde(default)]
    pub camera_keys: Vec<CameraKey>,
    /// Per-node visibility toggles
    #[serde(default)]
    pub vis_tracks: Vec<VisibilityTrack>,
    /// Per-node transform keyframes
    #[serde(default)]
    pub trs_tracks: Vec<TransformTrack>,
    /// Narrative checkpoints
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Timeline {
    /// Create an empty timeline
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    /// Add a camera keyframe
    pub fn with_camera_key(mut self, key: CameraKey) -> Self {
        self.camera_keys.push(key);
        self
    }

    /// Add a visibility track
    pub fn with_visibility(mut self, track: VisibilityTrack) -> Self {
        self.vis_tracks.push(track);
        self
    }

    /// Add a transform track
    pub fn with_transform(mut self, track: TransformTrack) -> Self {
        self.trs_tracks.push(track);
        self
    }

    /// Add a step
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// Visibility toggles for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityTrack {
    /// Target node
    pub node_key: NodeKey,
    /// Visibility before the first toggle
    #[serde(default = "default_visible")]
    pub default_visible: bool,
    /// Toggles, ascending by time
    #[serde(default)]
    pub keys: Vec<VisibilityKey>,
}

fn default_visible() -> bool {
    true
}

impl VisibilityTrack {
    /// Create an empty track for a node that starts visible
    pub fn new(node_key: impl Into<NodeKey>) -> Self {
        Self {
            node_key: node_key.into(),
            default_visible: true,
            keys: Vec::new(),
        }
    }

    /// Append a toggle
    pub fn toggle(mut self, time: f64, visible: bool) -> Self {
        self.keys.push(VisibilityKey { time, visible });
        self
    }

    /// Visibility at `time`: the latest toggle at or before it, else the default
    pub fn evaluate(&self, time: f64) -> bool {
        latest_toggle(&self.keys, time).unwrap_or(self.default_visible)
    }
}

/// Transform keyframes for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformTrack {
    /// Target node
    pub node_key: NodeKey,
    /// Keyframes, ascending by time
    #[serde(default)]
    pub keys: Vec<TransformKey>,
}

impl TransformTrack {
    /// Create an empty track
    pub fn new(node_key: impl Into<NodeKey>) -> Self {
        Self {
            node_key: node_key.into(),
            keys: Vec::new(),
        }
    }

    /// Append a keyframe
    pub fn key(mut self, key: TransformKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Transform at `time`, clamped to the keyed range
    pub fn evaluate(&self, time: f64) -> Option<Trs> {
        evaluate_transform(&self.keys, KeySpan::locate(&self.keys, time)?)
    }
}

/// Step-function lookup: the latest toggle at or before `time`
pub fn latest_toggle(keys: &[VisibilityKey], time: f64) -> Option<bool> {
    let count = keys.partition_point(|k| k.time <= time);
    count.checked_sub(1).map(|i| keys[i].visible)
}

/// Same as [`latest_toggle`], walking forward from a cursor hint
pub fn latest_toggle_from(keys: &[VisibilityKey], time: f64, hint: &mut usize) -> Option<bool> {
    match KeySpan::locate_from(keys, time, hint)? {
        KeySpan::At(i) | KeySpan::Between(i, _, _) if keys[i].time <= time => Some(keys[i].visible),
        _ => None,
    }
}

/// Camera pose for a located span.
///
/// Position and target interpolate linearly. Fov interpolates when both
/// bracketing keys define it, otherwise it is held from whichever key does.
pub fn evaluate_camera(keys: &[CameraKey], span: KeySpan) -> Option<CameraPose> {
    match span {
        KeySpan::At(i) => keys.get(i).map(|k| CameraPose {
            position: k.position,
            target: k.target,
            fov: k.fov,
        }),
        KeySpan::Between(a, b, t) => {
            let (ka, kb) = (keys.get(a)?, keys.get(b)?);
            let fov = match (ka.fov, kb.fov) {
                (Some(fa), Some(fb)) => Some(Interpolation::lerp(fa, fb, t)),
                (fa, fb) => fa.or(fb),
            };
            Some(CameraPose {
                position: Interpolation::lerp_vec3(ka.position, kb.position, t),
                target: Interpolation::lerp_vec3(ka.target, kb.target, t),
                fov,
            })
        }
    }
}

/// Transform for a located span: linear position/scale, slerp rotation
pub fn evaluate_transform(keys: &[TransformKey], span: KeySpan) -> Option<Trs> {
    match span {
        KeySpan::At(i) => keys.get(i).map(|k| Trs {
            position: k.position,
            rotation: k.rotation,
            scale: k.scale,
        }),
        KeySpan::Between(a, b, t) => {
            let (ka, kb) = (keys.get(a)?, keys.get(b)?);
            Some(Trs {
                position: Interpolation::lerp_vec3(ka.position, kb.position, t),
                rotation: Interpolation::slerp(ka.rotation, kb.rotation, t),
                scale: Interpolation::lerp_vec3(ka.scale, kb.scale, t),
            })
        }
    }
}
