// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene-side values, mutation batches and the render adapter seam.
//!
//! The engine never touches a renderer. Each tick it computes a complete
//! [`SceneState`], diffs it against what was last published and hands the
//! result over as one [`SceneMutationBatch`].

use crate::keyframe::Interpolation;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Key identifying a node in the 3D scene graph
pub type NodeKey = String;

/// Camera placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraPose {
    /// Eye position
    pub position: [f32; 3],
    /// Look-at point
    pub target: [f32; 3],
    /// Vertical field of view in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fov: Option<f32>,
}

impl CameraPose {
    /// Create a pose without a field of view
    pub fn new(position: [f32; 3], target: [f32; 3]) -> Self {
        Self {
            position,
            target,
            fov: None,
        }
    }

    /// Blend towards `other`; fov blends only when both sides define it
    pub fn lerp(&self, other: &CameraPose, t: f32) -> CameraPose {
        let fov = match (self.fov, other.fov) {
            (Some(a), Some(b)) => Some(Interpolation::lerp(a, b, t)),
            (a, b) => a.or(b),
        };
        CameraPose {
            position: Interpolation::lerp_vec3(self.position, other.position, t),
            target: Interpolation::lerp_vec3(self.target, other.target, t),
            fov,
        }
    }

    /// Direction from target to eye, if the two are distinct
    pub fn back_direction(&self) -> Option<[f32; 3]> {
        Interpolation::normalize_vec3([
            self.position[0] - self.target[0],
            self.position[1] - self.target[1],
            self.position[2] - self.target[2],
        ])
    }
}

/// Node translation, rotation and scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trs {
    /// Translation
    pub position: [f32; 3],
    /// Rotation quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    /// Scale
    pub scale: [f32; 3],
}

/// Render-side bounding info for a node, supplied with the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAnchor {
    /// Node key
    pub node_key: NodeKey,
    /// Bounding-sphere center in world space
    pub center: [f32; 3],
    /// Bounding-sphere radius
    #[serde(default = "default_radius")]
    pub radius: f32,
    /// Authored default visibility
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_radius() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A static 3D-anchored marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Annotation id
    pub id: String,
    /// Title
    pub title: String,
    /// Body text
    #[serde(default)]
    pub description: String,
    /// Node the marker is attached to
    pub node_key: NodeKey,
    /// Marker position
    pub position: [f32; 3],
}

/// One-shot spatial cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerCue {
    /// Node pointed at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_key: Option<NodeKey>,
    /// Explicit world position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f32; 3]>,
}

/// Complete persistent scene state at one instant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneState {
    /// Camera pose, if anything has placed the camera yet
    pub camera: Option<CameraPose>,
    /// Node visibility
    pub visibility: IndexMap<NodeKey, bool>,
    /// Animated node transforms; absent nodes keep their authored pose
    pub transforms: IndexMap<NodeKey, Trs>,
    /// Annotation visibility
    pub annotations: IndexMap<String, bool>,
    /// Highlighted nodes
    pub highlighted: IndexSet<NodeKey>,
}

impl SceneState {
    /// Visibility of a node, if known
    pub fn is_visible(&self, node_key: &str) -> Option<bool> {
        self.visibility.get(node_key).copied()
    }

    /// Visibility of an annotation, if known
    pub fn is_annotation_visible(&self, id: &str) -> Option<bool> {
        self.annotations.get(id).copied()
    }

    /// Whether a node is highlighted
    pub fn is_highlighted(&self, node_key: &str) -> bool {
        self.highlighted.contains(node_key)
    }
}

/// A single render-side change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SceneMutation {
    /// Move the camera
    Camera {
        /// New pose
        pose: CameraPose,
    },
    /// Show or hide a node
    NodeVisible {
        /// Node key
        node_key: NodeKey,
        /// New visibility
        visible: bool,
    },
    /// Place a node
    NodeTransform {
        /// Node key
        node_key: NodeKey,
        /// New transform
        trs: Trs,
    },
    /// Return a node to its authored pose
    ClearTransform {
        /// Node key
        node_key: NodeKey,
    },
    /// Show or hide an annotation
    AnnotationVisible {
        /// Annotation id
        id: String,
        /// New visibility
        visible: bool,
    },
    /// Turn highlighting on or off for nodes
    Highlight {
        /// Affected nodes
        node_keys: Vec<NodeKey>,
        /// Whether the highlight is switched on
        active: bool,
    },
    /// Fire a pointer cue
    Pointer {
        /// The cue
        cue: PointerCue,
    },
}

/// Render adapter the session emits into
pub trait SceneAdapter {
    /// Place the camera
    fn set_camera_pose(&mut self, pose: &CameraPose);
    /// Show or hide a node
    fn set_node_visible(&mut self, node_key: &str, visible: bool);
    /// Place a node
    fn set_node_transform(&mut self, node_key: &str, trs: &Trs);
    /// Return a node to its authored pose
    fn clear_node_transform(&mut self, node_key: &str);
    /// Show or hide an annotation
    fn set_annotation_visible(&mut self, id: &str, visible: bool);
    /// Switch highlighting for a group of nodes
    fn trigger_highlight(&mut self, node_keys: &[NodeKey], active: bool);
    /// Fire a pointer cue
    fn trigger_pointer(&mut self, cue: &PointerCue);
}

/// All changes produced by one evaluation pass
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SceneMutationBatch {
    /// Session time the batch was evaluated at
    pub time: f64,
    /// Ordered mutations
    pub mutations: Vec<SceneMutation>,
}

impl SceneMutationBatch {
    /// Create an empty batch
    pub fn new(time: f64) -> Self {
        Self {
            time,
            mutations: Vec::new(),
        }
    }

    /// Changes needed to take a renderer from `before` to `after`.
    ///
    /// Order: camera, node visibility, transforms, annotations, highlights.
    pub fn diff(time: f64, before: &SceneState, after: &SceneState) -> Self {
        let mut batch = Self::new(time);

        if let Some(pose) = after.camera {
            if before.camera != Some(pose) {
                batch.push(SceneMutation::Camera { pose });
            }
        }

        for (node_key, &visible) in &after.visibility {
            if before.visibility.get(node_key) != Some(&visible) {
                batch.push(SceneMutation::NodeVisible {
                    node_key: node_key.clone(),
                    visible,
                });
            }
        }

        for (node_key, trs) in &after.transforms {
            if before.transforms.get(node_key) != Some(trs) {
                batch.push(SceneMutation::NodeTransform {
                    node_key: node_key.clone(),
                    trs: *trs,
                });
            }
        }
        for node_key in before.transforms.keys() {
            if !after.transforms.contains_key(node_key) {
                batch.push(SceneMutation::ClearTransform {
                    node_key: node_key.clone(),
                });
            }
        }

        for (id, &visible) in &after.annotations {
            if before.annotations.get(id) != Some(&visible) {
                batch.push(SceneMutation::AnnotationVisible {
                    id: id.clone(),
                    visible,
                });
            }
        }

        let shown: Vec<NodeKey> = after
            .highlighted
            .difference(&before.highlighted)
            .cloned()
            .collect();
        if !shown.is_empty() {
            batch.push(SceneMutation::Highlight {
                node_keys: shown,
                active: true,
            });
        }
        let hidden: Vec<NodeKey> = before
            .highlighted
            .difference(&after.highlighted)
            .cloned()
            .collect();
        if !hidden.is_empty() {
            batch.push(SceneMutation::Highlight {
                node_keys: hidden,
                active: false,
            });
        }

        batch
    }

    /// Append a mutation
    pub fn push(&mut self, mutation: SceneMutation) {
        self.mutations.push(mutation);
    }

    /// Whether the batch carries no changes
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Number of mutations
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Iterate over mutations in order
    pub fn iter(&self) -> impl Iterator<Item = &SceneMutation> {
        self.mutations.iter()
    }

    /// Apply every mutation, in order, to a render adapter
    pub fn apply_to(&self, adapter: &mut dyn SceneAdapter) {
        for mutation in &self.mutations {
            match mutation {
                SceneMutation::Camera { pose } => adapter.set_camera_pose(pose),
                SceneMutation::NodeVisible { node_key, visible } => {
                    adapter.set_node_visible(node_key, *visible);
                }
                SceneMutation::NodeTransform { node_key, trs } => {
                    adapter.set_node_transform(node_key, trs);
                }
                SceneMutation::ClearTransform { node_key } => adapter.clear_node_transform(node_key),
                SceneMutation::AnnotationVisible { id, visible } => {
                    adapter.set_annotation_visible(id, *visible);
                }
                SceneMutation::Highlight { node_keys, active } => {
                    adapter.trigger_highlight(node_keys, *active);
                }
                SceneMutation::Pointer { cue } => adapter.trigger_pointer(cue),
            }
        }
    }
}
