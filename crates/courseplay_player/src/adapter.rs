// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene adapter that records and logs what a renderer would be asked to do.

use courseplay_sequencer::{CameraPose, NodeKey, PointerCue, SceneAdapter, Trs};
use std::collections::BTreeMap;

/// Render-side view of the scene, kept up to date by mutation batches
#[derive(Debug, Default)]
pub struct LoggingSceneAdapter {
    /// Last camera pose received
    pub camera: Option<CameraPose>,
    /// Node visibility as last set
    pub visible: BTreeMap<NodeKey, bool>,
    /// Nodes currently displaced from their authored pose
    pub transforms: BTreeMap<NodeKey, Trs>,
    /// Annotation visibility as last set
    pub annotations: BTreeMap<String, bool>,
    /// Highlighted nodes
    pub highlighted: BTreeMap<NodeKey, bool>,
    /// Pointer cues fired so far
    pub pointers: Vec<PointerCue>,
    /// Total calls received
    pub calls: usize,
}

impl LoggingSceneAdapter {
    /// Create an empty adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes currently shown
    pub fn visible_nodes(&self) -> impl Iterator<Item = &str> {
        self.visible
            .iter()
            .filter(|(_, visible)| **visible)
            .map(|(key, _)| key.as_str())
    }
}

impl SceneAdapter for LoggingSceneAdapter {
    fn set_camera_pose(&mut self, pose: &CameraPose) {
        tracing::trace!(position = ?pose.position, target = ?pose.target, "camera");
        self.camera = Some(*pose);
        self.calls += 1;
    }

    fn set_node_visible(&mut self, node_key: &str, visible: bool) {
        tracing::debug!(node = node_key, visible, "node visibility");
        self.visible.insert(node_key.to_string(), visible);
        self.calls += 1;
    }

    fn set_node_transform(&mut self, node_key: &str, trs: &Trs) {
        tracing::trace!(node = node_key, position = ?trs.position, "node transform");
        self.transforms.insert(node_key.to_string(), *trs);
        self.calls += 1;
    }

    fn clear_node_transform(&mut self, node_key: &str) {
        tracing::debug!(node = node_key, "node transform cleared");
        self.transforms.remove(node_key);
        self.calls += 1;
    }

    fn set_annotation_visible(&mut self, id: &str, visible: bool) {
        tracing::debug!(annotation = id, visible, "annotation visibility");
        self.annotations.insert(id.to_string(), visible);
        self.calls += 1;
    }

    fn trigger_highlight(&mut self, node_keys: &[NodeKey], active: bool) {
        tracing::debug!(nodes = ?node_keys, active, "highlight");
        for key in node_keys {
            self.highlighted.insert(key.clone(), active);
        }
        self.calls += 1;
    }

    fn trigger_pointer(&mut self, cue: &PointerCue) {
        tracing::info!(node = ?cue.node_key, position = ?cue.position, "pointer");
        self.pointers.push(cue.clone());
        self.calls += 1;
    }
}
