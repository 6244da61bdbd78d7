// SPDX-License-Identifier: MIT OR Apache-2.0
//! Courseware document model: animations, annotations and the narrated outline.
//!
//! The authoring layer hands documents over as JSON with camelCase keys.
//! Scene actions are a tagged sum type keyed by `type`:
//!
//! ```json
//! { "type": "visibility.set", "startTime": 1.0, "endTime": 3.0,
//!   "items": [{ "nodeKey": "cover", "visible": false }] }
//! ```

use crate::error::ValidationError;
use crate::keyframe::Easing;
use crate::scene::{Annotation, CameraPose, NodeAnchor, NodeKey};
use crate::track::Timeline;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A complete courseware document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursewareDocument {
    /// Course title
    #[serde(default)]
    pub title: String,
    /// Initial camera pose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraPose>,
    /// Named animations that `animation.play` can start
    #[serde(default)]
    pub animations: Vec<Animation>,
    /// Scene annotations
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Node bounds and default visibility from the scene graph
    #[serde(default)]
    pub nodes: Vec<NodeAnchor>,
    /// Narrated outline
    #[serde(default)]
    pub outline: Vec<Segment>,
}

impl CoursewareDocument {
    /// Parse a document from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Find an animation by id
    pub fn animation(&self, id: &str) -> Option<&Animation> {
        self.animations.iter().find(|a| a.id == id)
    }
}

/// A named timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animation {
    /// Animation id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Tracks
    pub timeline: Timeline,
}

/// How a segment schedules its items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMode {
    /// One item after another
    #[default]
    Sequence,
    /// All items at once
    Parallel,
}

/// A narrative unit of the outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Segment id
    pub id: String,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Scheduling mode
    #[serde(default)]
    pub mode: SegmentMode,
    /// Items
    #[serde(default)]
    pub items: Vec<SegmentItem>,
}

/// Kind of segment item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    /// Narration only
    #[serde(rename = "talk")]
    Talk,
    /// Narration over an image
    #[serde(rename = "image.explain")]
    ImageExplain,
    /// Scene actions, optionally narrated
    #[serde(rename = "scene.action")]
    SceneAction,
}

/// Narration audio reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRef {
    /// Source URL
    pub url: String,
    /// Length in seconds
    pub duration: f64,
    /// Content hash
    #[serde(default)]
    pub hash: String,
}

/// A subtitle line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Text
    pub text: String,
    /// Offset into the item's audio, in seconds
    pub offset: f64,
}

/// One item of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentItem {
    /// Item id
    pub id: String,
    /// Item kind
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Narration script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub say: Option<String>,
    /// Speech synthesis settings, opaque to the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<serde_json::Value>,
    /// Narration audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioRef>,
    /// Subtitles, ascending by offset
    #[serde(default)]
    pub subtitles: Vec<Subtitle>,
    /// Image shown by `image.explain` items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Scene actions
    #[serde(default)]
    pub actions: Vec<SceneAction>,
}

/// A node visibility assignment inside `visibility.set`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityItem {
    /// Node key
    pub node_key: NodeKey,
    /// Visibility to apply
    pub visible: bool,
}

/// What a scene action does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionKind {
    /// Move the camera onto a node or an explicit pose
    #[serde(rename = "camera.focus", rename_all = "camelCase")]
    CameraFocus {
        /// Node to frame
        #[serde(default)]
        target: Option<NodeKey>,
        /// Explicit pose, overrides `target`
        #[serde(default)]
        pose: Option<CameraPose>,
        /// Eye distance from the framed node
        #[serde(default)]
        distance: Option<f32>,
    },
    /// Set several nodes' visibility at once
    #[serde(rename = "visibility.set")]
    VisibilitySet {
        /// Assignments
        items: Vec<VisibilityItem>,
    },
    /// Highlight nodes
    #[serde(rename = "highlight.show", rename_all = "camelCase")]
    HighlightShow {
        /// Nodes
        node_keys: Vec<NodeKey>,
    },
    /// Remove highlights
    #[serde(rename = "highlight.hide", rename_all = "camelCase")]
    HighlightHide {
        /// Nodes
        node_keys: Vec<NodeKey>,
    },
    /// Show annotations
    #[serde(rename = "annotation.show")]
    AnnotationShow {
        /// Annotation ids
        ids: Vec<String>,
    },
    /// Hide annotations
    #[serde(rename = "annotation.hide")]
    AnnotationHide {
        /// Annotation ids
        ids: Vec<String>,
    },
    /// Start a named animation
    #[serde(rename = "animation.play", rename_all = "camelCase")]
    AnimationPlay {
        /// Animation id
        animation_id: String,
    },
    /// Point at a node or position
    #[serde(rename = "pointer.point", rename_all = "camelCase")]
    PointerPoint {
        /// Node pointed at
        #[serde(default)]
        node_key: Option<NodeKey>,
        /// Explicit world position
        #[serde(default)]
        position: Option<[f32; 3]>,
    },
}

impl ActionKind {
    /// Wire name of the action kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::CameraFocus { .. } => "camera.focus",
            Self::VisibilitySet { .. } => "visibility.set",
            Self::HighlightShow { .. } => "highlight.show",
            Self::HighlightHide { .. } => "highlight.hide",
            Self::AnnotationShow { .. } => "annotation.show",
            Self::AnnotationHide { .. } => "annotation.hide",
            Self::AnimationPlay { .. } => "animation.play",
            Self::PointerPoint { .. } => "pointer.point",
        }
    }

    /// Whether the action fires once on crossing its start
    pub fn is_edge_triggered(&self) -> bool {
        matches!(
            self,
            Self::HighlightShow { .. }
                | Self::HighlightHide { .. }
                | Self::AnnotationShow { .. }
                | Self::AnnotationHide { .. }
                | Self::PointerPoint { .. }
        )
    }
}

/// A declarative scene instruction, timed relative to its item's start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneAction {
    /// Optional author-assigned id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Window start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    /// Window end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Window length, used when `end_time` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Easing over the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub easing: Option<Easing>,
    /// What the action does
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl SceneAction {
    /// Untimed action starting at the item's start
    pub fn new(kind: ActionKind) -> Self {
        Self {
            id: None,
            start_time: None,
            end_time: None,
            duration: None,
            easing: None,
            kind,
        }
    }

    /// Set window start and end
    pub fn window(mut self, start: f64, end: f64) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Set an instantaneous start
    pub fn at(mut self, start: f64) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Set easing
    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }

    /// Whether any timing field is present
    pub fn declares_timing(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.duration.is_some()
    }

    /// Resolved window relative to the item's start.
    ///
    /// `start` defaults to 0; `end` is `end_time`, else `start + duration`,
    /// else `start`.
    pub fn resolved_window(&self) -> ActionWindow {
        let start = self.start_time.unwrap_or(0.0);
        let end = self
            .end_time
            .or_else(|| self.duration.map(|d| start + d))
            .unwrap_or(start);
        ActionWindow { start, end }
    }
}

/// Resolved `[start, end]` window of an action, item-relative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionWindow {
    /// Start in seconds
    pub start: f64,
    /// End in seconds
    pub end: f64,
}

impl ActionWindow {
    /// Whether the window has no length
    pub fn is_instant(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `time` lies inside the window (inclusive)
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }

    /// Linear progress through the window in `[0, 1]`; instant windows jump to 1
    pub fn progress(&self, time: f64) -> f64 {
        if time < self.start {
            0.0
        } else if self.is_instant() || time >= self.end {
            1.0
        } else {
            (time - self.start) / (self.end - self.start)
        }
    }

    /// Whether two windows share any instant
    pub fn overlaps(&self, other: &ActionWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Check the outline and cross-references of a document.
///
/// Track-level validation happens separately when animations are loaded.
pub fn validate_document(document: &CoursewareDocument) -> Result<(), ValidationError> {
    let mut animation_ids = HashSet::new();
    for animation in &document.animations {
        if !animation_ids.insert(animation.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                kind: "animation",
                id: animation.id.clone(),
            });
        }
    }

    let mut step_ids = HashSet::new();
    for step in document.animations.iter().flat_map(|a| &a.timeline.steps) {
        if !step_ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                kind: "step",
                id: step.id.clone(),
            });
        }
    }

    let mut annotation_ids = HashSet::new();
    for annotation in &document.annotations {
        if !annotation_ids.insert(annotation.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                kind: "annotation",
                id: annotation.id.clone(),
            });
        }
    }

    let mut segment_ids = HashSet::new();
    let mut item_ids = HashSet::new();
    for segment in &document.outline {
        if !segment_ids.insert(segment.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                kind: "segment",
                id: segment.id.clone(),
            });
        }
        for item in &segment.items {
            if !item_ids.insert(item.id.as_str()) {
                return Err(ValidationError::DuplicateId {
                    kind: "item",
                    id: item.id.clone(),
                });
            }
            validate_item(item, &animation_ids, &annotation_ids)?;
        }
    }

    Ok(())
}

fn validate_item(
    item: &SegmentItem,
    animation_ids: &HashSet<&str>,
    annotation_ids: &HashSet<&str>,
) -> Result<(), ValidationError> {
    let audio_duration = match &item.audio {
        Some(audio) if !audio.duration.is_finite() || audio.duration < 0.0 => {
            return Err(ValidationError::InvalidAudioDuration {
                item: item.id.clone(),
                duration: audio.duration,
            });
        }
        Some(audio) => Some(audio.duration),
        None => None,
    };

    let mut previous = None;
    for (index, subtitle) in item.subtitles.iter().enumerate() {
        let offset = subtitle.offset;
        let beyond_audio = audio_duration.is_some_and(|d| offset > d);
        if !offset.is_finite() || offset < 0.0 || beyond_audio {
            return Err(ValidationError::SubtitleOutOfRange {
                item: item.id.clone(),
                index,
                offset,
                duration: audio_duration.unwrap_or(f64::INFINITY),
            });
        }
        if let Some(prev) = previous {
            if offset < prev {
                return Err(ValidationError::SubtitleOrder {
                    item: item.id.clone(),
                    index,
                    previous: prev,
                    offset,
                });
            }
        }
        previous = Some(offset);
    }

    for (index, action) in item.actions.iter().enumerate() {
        for value in [action.start_time, action.end_time, action.duration].into_iter().flatten() {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidActionTime {
                    item: item.id.clone(),
                    index,
                    value,
                });
            }
        }
        let window = action.resolved_window();
        if window.end < window.start {
            return Err(ValidationError::InvertedWindow {
                item: item.id.clone(),
                index,
                start: window.start,
                end: window.end,
            });
        }
        match &action.kind {
            ActionKind::AnimationPlay { animation_id } => {
                if !animation_ids.contains(animation_id.as_str()) {
                    return Err(ValidationError::UnknownAnimation {
                        item: item.id.clone(),
                        animation: animation_id.clone(),
                    });
                }
            }
            ActionKind::AnnotationShow { ids } | ActionKind::AnnotationHide { ids } => {
                if let Some(unknown) = ids.iter().find(|id| !annotation_ids.contains(id.as_str())) {
                    return Err(ValidationError::UnknownAnnotation {
                        item: item.id.clone(),
                        annotation: unknown.clone(),
                    });
                }
            }
            ActionKind::CameraFocus { .. }
            | ActionKind::VisibilitySet { .. }
            | ActionKind::HighlightShow { .. }
            | ActionKind::HighlightHide { .. }
            | ActionKind::PointerPoint { .. } => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(outline: serde_json::Value) -> CoursewareDocument {
        serde_json::from_value(json!({
            "title": "Engine basics",
            "animations": [{ "id": "explode", "timeline": { "duration": 4.0 } }],
            "annotations": [{
                "id": "valve-note", "title": "Valve", "nodeKey": "valve", "position": [0, 1, 0]
            }],
            "outline": outline,
        }))
        .unwrap()
    }

    #[test]
    fn test_parses_tagged_actions() {
        let doc = document(json!([{
            "id": "intro",
            "title": "Intro",
            "mode": "parallel",
            "items": [{
                "id": "i1",
                "type": "scene.action",
                "actions": [
                    { "type": "camera.focus", "target": "engine", "startTime": 0, "endTime": 2, "easing": "linear" },
                    { "type": "visibility.set", "startTime": 1, "items": [{ "nodeKey": "cover", "visible": false }] },
                    { "type": "highlight.show", "nodeKeys": ["valve"], "startTime": 2 },
                    { "type": "annotation.show", "ids": ["valve-note"], "startTime": 2 },
                    { "type": "animation.play", "animationId": "explode", "startTime": 3 },
                    { "type": "pointer.point", "nodeKey": "valve", "startTime": 3.5, "duration": 1 }
                ]
            }]
        }]));

        assert!(validate_document(&doc).is_ok());
        let segment = &doc.outline[0];
        assert_eq!(segment.mode, SegmentMode::Parallel);
        let actions = &segment.items[0].actions;
        assert_eq!(actions.len(), 6);
        assert_eq!(actions[0].easing, Some(Easing::Linear));
        assert!(matches!(
            &actions[1].kind,
            ActionKind::VisibilitySet { items } if items[0].node_key == "cover" && !items[0].visible
        ));
        assert_eq!(actions[5].resolved_window(), ActionWindow { start: 3.5, end: 4.5 });
        assert!(actions[2].resolved_window().is_instant());
        assert_eq!(actions[4].kind.name(), "animation.play");
    }

    #[test]
    fn test_window_progress() {
        let window = ActionWindow { start: 1.0, end: 3.0 };
        assert_eq!(window.progress(0.0), 0.0);
        assert_eq!(window.progress(2.0), 0.5);
        assert_eq!(window.progress(5.0), 1.0);
        let instant = ActionWindow { start: 1.0, end: 1.0 };
        assert_eq!(instant.progress(1.0), 1.0);
        assert!(instant.contains(1.0));
        assert!(!instant.contains(1.5));
        assert!(window.overlaps(&ActionWindow { start: 3.0, end: 4.0 }));
        assert!(!window.overlaps(&ActionWindow { start: 3.5, end: 4.0 }));
    }

    #[test]
    fn test_rejects_subtitles_past_audio_end() {
        let doc = document(json!([{
            "id": "s", "items": [{
                "id": "talk", "type": "talk",
                "audio": { "url": "a.mp3", "duration": 2.0 },
                "subtitles": [{ "text": "hi", "offset": 0.0 }, { "text": "late", "offset": 2.5 }]
            }]
        }]));
        assert!(matches!(
            validate_document(&doc),
            Err(ValidationError::SubtitleOutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_decreasing_subtitles() {
        let doc = document(json!([{
            "id": "s", "items": [{
                "id": "talk", "type": "talk",
                "subtitles": [{ "text": "b", "offset": 1.0 }, { "text": "a", "offset": 0.5 }]
            }]
        }]));
        assert!(matches!(
            validate_document(&doc),
            Err(ValidationError::SubtitleOrder { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_windows_and_dangling_references() {
        let inverted = document(json!([{
            "id": "s", "items": [{
                "id": "act", "type": "scene.action",
                "actions": [{ "type": "pointer.point", "startTime": 3, "endTime": 1 }]
            }]
        }]));
        assert!(matches!(
            validate_document(&inverted),
            Err(ValidationError::InvertedWindow { .. })
        ));

        let dangling = document(json!([{
            "id": "s", "items": [{
                "id": "act", "type": "scene.action",
                "actions": [{ "type": "animation.play", "animationId": "missing" }]
            }]
        }]));
        assert!(matches!(
            validate_document(&dangling),
            Err(ValidationError::UnknownAnimation { .. })
        ));

        let unknown_note = document(json!([{
            "id": "s", "items": [{
                "id": "act", "type": "scene.action",
                "actions": [{ "type": "annotation.hide", "ids": ["nope"] }]
            }]
        }]));
        assert!(matches!(
            validate_document(&unknown_note),
            Err(ValidationError::UnknownAnnotation { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_item_ids() {
        let doc = document(json!([
            { "id": "a", "items": [{ "id": "x", "type": "talk" }] },
            { "id": "b", "items": [{ "id": "x", "type": "talk" }] }
        ]));
        assert!(matches!(
            validate_document(&doc),
            Err(ValidationError::DuplicateId { kind: "item", .. })
        ));
    }
}
