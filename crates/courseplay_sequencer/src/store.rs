// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validated, read-only track storage.
//!
//! A [`TrackStore`] is built once from a [`Timeline`] and never mutated, so
//! it can sit behind an `Arc` and be evaluated by any number of schedulers.
//! Each scheduler keeps its own [`TrackCursor`] for the forward-walking
//! lookups used during normal playback.

use crate::error::ValidationError;
use crate::keyframe::{KeySpan, Step, Timed};
use crate::scene::{CameraPose, NodeKey, Trs};
use crate::track::{self, Timeline};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Validated timeline with node lookup tables
#[derive(Debug, Clone)]
pub struct TrackStore {
    timeline: Timeline,
    vis_index: IndexMap<NodeKey, usize>,
    trs_index: IndexMap<NodeKey, usize>,
}

/// Per-scheduler lookup hints into one [`TrackStore`]
#[derive(Debug, Clone)]
pub struct TrackCursor {
    camera: usize,
    visibility: Vec<usize>,
    transforms: Vec<usize>,
}

const UNKNOWN: usize = usize::MAX;

impl TrackCursor {
    /// Forget all hints; the next lookups binary search
    pub fn reset(&mut self) {
        self.camera = UNKNOWN;
        self.visibility.fill(UNKNOWN);
        self.transforms.fill(UNKNOWN);
    }
}

impl TrackStore {
    /// Validate a timeline and index its tracks.
    ///
    /// Rejects keys outside `[0, duration]`, decreasing or duplicate key
    /// times, non-finite values, and two tracks of one kind on one node.
    pub fn load(mut timeline: Timeline) -> Result<Self, ValidationError> {
        let duration = timeline.duration;
        if !duration.is_finite() || duration < 0.0 {
            return Err(ValidationError::InvalidDuration(duration));
        }

        check_times("camera", &timeline.camera_keys, duration)?;
        for (index, key) in timeline.camera_keys.iter().enumerate() {
            let fov_ok = key.fov.map_or(true, f32::is_finite);
            if !all_finite(&key.position) || !all_finite(&key.target) || !fov_ok {
                return Err(ValidationError::NonFinite {
                    track: "camera".into(),
                    index,
                });
            }
        }

        let mut vis_index = IndexMap::new();
        for (slot, track) in timeline.vis_tracks.iter().enumerate() {
            let label = format!("visibility[{}]", track.node_key);
            check_times(&label, &track.keys, duration)?;
            if vis_index.insert(track.node_key.clone(), slot).is_some() {
                return Err(ValidationError::DuplicateTrack {
                    node: track.node_key.clone(),
                    kind: "visibility",
                });
            }
        }

        let mut trs_index = IndexMap::new();
        for (slot, track) in timeline.trs_tracks.iter().enumerate() {
            let label = format!("transform[{}]", track.node_key);
            check_times(&label, &track.keys, duration)?;
            for (index, key) in track.keys.iter().enumerate() {
                if !all_finite(&key.position) || !all_finite(&key.rotation) || !all_finite(&key.scale) {
                    return Err(ValidationError::NonFinite { track: label, index });
                }
            }
            if trs_index.insert(track.node_key.clone(), slot).is_some() {
                return Err(ValidationError::DuplicateTrack {
                    node: track.node_key.clone(),
                    kind: "transform",
                });
            }
        }

        let mut step_ids = HashSet::new();
        for step in &timeline.steps {
            let time = step.time;
            if !time.is_finite() || time < 0.0 || time > duration {
                return Err(ValidationError::TimeOutOfRange {
                    track: format!("step[{}]", step.id),
                    time,
                    duration,
                });
            }
            if !step_ids.insert(step.id.as_str()) {
                return Err(ValidationError::DuplicateId {
                    kind: "step",
                    id: step.id.clone(),
                });
            }
        }
        // Steps are chapter marks, not keys: order them rather than reject.
        timeline.steps.sort_by(|a, b| a.time.total_cmp(&b.time));

        tracing::debug!(
            duration,
            camera_keys = timeline.camera_keys.len(),
            vis_tracks = vis_index.len(),
            trs_tracks = trs_index.len(),
            "Track store loaded"
        );

        Ok(Self {
            timeline,
            vis_index,
            trs_index,
        })
    }

    /// Timeline length in seconds
    pub fn duration(&self) -> f64 {
        self.timeline.duration
    }

    /// The validated timeline
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Whether the timeline moves the camera
    pub fn has_camera(&self) -> bool {
        !self.timeline.camera_keys.is_empty()
    }

    /// Steps, ascending by time
    pub fn steps(&self) -> &[Step] {
        &self.timeline.steps
    }

    /// Find a step by id
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.timeline.steps.iter().find(|s| s.id == id)
    }

    /// Nodes with a visibility track
    pub fn visibility_nodes(&self) -> impl Iterator<Item = &NodeKey> {
        self.vis_index.keys()
    }

    /// Each visibility track's node with its authored visibility before the first toggle
    pub fn visibility_defaults(&self) -> impl Iterator<Item = (&NodeKey, bool)> {
        self.timeline
            .vis_tracks
            .iter()
            .map(|track| (&track.node_key, track.default_visible))
    }

    /// Nodes with a transform track
    pub fn transform_nodes(&self) -> impl Iterator<Item = &NodeKey> {
        self.trs_index.keys()
    }

    /// Fresh cursor sized for this store
    pub fn cursor(&self) -> TrackCursor {
        TrackCursor {
            camera: UNKNOWN,
            visibility: vec![UNKNOWN; self.timeline.vis_tracks.len()],
            transforms: vec![UNKNOWN; self.timeline.trs_tracks.len()],
        }
    }

    /// Camera pose at `time`, or `None` without camera keys
    pub fn evaluate_camera(&self, time: f64) -> Option<CameraPose> {
        let keys = &self.timeline.camera_keys;
        track::evaluate_camera(keys, KeySpan::locate(keys, time)?)
    }

    /// Visibility of a node at `time`, or `None` if the node has no track
    pub fn evaluate_visibility(&self, node_key: &str, time: f64) -> Option<bool> {
        let slot = *self.vis_index.get(node_key)?;
        Some(self.timeline.vis_tracks[slot].evaluate(time))
    }

    /// Transform of a node at `time`, or `None` if the node has no keys
    pub fn evaluate_transform(&self, node_key: &str, time: f64) -> Option<Trs> {
        let slot = *self.trs_index.get(node_key)?;
        self.timeline.trs_tracks[slot].evaluate(time)
    }

    /// [`Self::evaluate_camera`] through a cursor
    pub fn evaluate_camera_with(&self, cursor: &mut TrackCursor, time: f64) -> Option<CameraPose> {
        let keys = &self.timeline.camera_keys;
        track::evaluate_camera(keys, KeySpan::locate_from(keys, time, &mut cursor.camera)?)
    }

    /// Latest toggle at or before `time` for the track in `slot`, through a cursor
    pub fn toggle_with(&self, cursor: &mut TrackCursor, slot: usize, time: f64) -> Option<bool> {
        let keys = &self.timeline.vis_tracks.get(slot)?.keys;
        match cursor.visibility.get_mut(slot) {
            Some(hint) => track::latest_toggle_from(keys, time, hint),
            None => track::latest_toggle(keys, time),
        }
    }

    /// Transform for the track in `slot`, through a cursor
    pub fn transform_with(&self, cursor: &mut TrackCursor, slot: usize, time: f64) -> Option<Trs> {
        let keys = &self.timeline.trs_tracks.get(slot)?.keys;
        let span = match cursor.transforms.get_mut(slot) {
            Some(hint) => KeySpan::locate_from(keys, time, hint)?,
            None => KeySpan::locate(keys, time)?,
        };
        track::evaluate_transform(keys, span)
    }

    /// Visibility tracks in slot order
    pub fn visibility_tracks(&self) -> impl Iterator<Item = (usize, &NodeKey)> {
        self.timeline.vis_tracks.iter().map(|t| &t.node_key).enumerate()
    }

    /// Transform tracks in slot order
    pub fn transform_tracks(&self) -> impl Iterator<Item = (usize, &NodeKey)> {
        self.timeline.trs_tracks.iter().map(|t| &t.node_key).enumerate()
    }
}

fn all_finite<const N: usize>(values: &[f32; N]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn check_times<K: Timed>(track: &str, keys: &[K], duration: f64) -> Result<(), ValidationError> {
    let mut previous: Option<f64> = None;
    for (index, key) in keys.iter().enumerate() {
        let time = key.time();
        if !time.is_finite() || time < 0.0 || time > duration {
            return Err(ValidationError::TimeOutOfRange {
                track: track.to_string(),
                time,
                duration,
            });
        }
        if let Some(prev) = previous {
            if time == prev {
                return Err(ValidationError::DuplicateTime {
                    track: track.to_string(),
                    time,
                });
            }
            if time < prev {
                return Err(ValidationError::NonMonotonic {
                    track: track.to_string(),
                    index,
                    previous: prev,
                    time,
                });
            }
        }
        previous = Some(time);
    }
    Ok(())
}
