// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene action resolution.
//!
//! Actions are folded in declaration order over a base [`SceneState`]: every
//! action whose window has started contributes its value, so when two
//! actions drive the same target the later-declared one wins. Window
//! overlaps on a shared target are still reported at load so authors can
//! fix them.
//!
//! Highlights, annotations and pointer cues are edge-triggered. Their
//! crossings are tracked in a [`FiredSet`] so a cue fires once per forward
//! pass; a seek rebuilds the set from the new position.

use crate::error::PlaybackWarning;
use crate::keyframe::Easing;
use crate::outline::{ActionKind, ActionWindow, SceneAction};
use crate::scene::{
    CameraPose, NodeAnchor, NodeKey, PointerCue, SceneMutation, SceneMutationBatch, SceneState,
};
use crate::store::{TrackCursor, TrackStore};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Smallest default eye distance for `camera.focus` on a node
pub const MIN_FOCUS_DISTANCE: f32 = 1.0;

/// Default eye distance as a multiple of the node's bounding radius
pub const FOCUS_RADIUS_FACTOR: f32 = 2.5;

/// Position of an item in the outline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    /// Segment index
    pub segment: usize,
    /// Item index within the segment
    pub item: usize,
}

impl ItemKey {
    /// Key for action lists resolved outside any outline
    pub const DETACHED: ItemKey = ItemKey {
        segment: usize::MAX,
        item: usize::MAX,
    };

    /// Create a key
    pub fn new(segment: usize, item: usize) -> Self {
        Self { segment, item }
    }
}

/// Position of an action in the outline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey {
    /// Owning item
    pub item: ItemKey,
    /// Action index within the item
    pub action: usize,
}

/// Precomputed camera move of one `camera.focus` action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusPlan {
    /// Pose in effect when the window opens; `None` snaps to the target
    pub origin: Option<CameraPose>,
    /// Pose at the end of the window
    pub target: CameraPose,
}

impl FocusPlan {
    /// Pose at eased progress `t` through the window
    pub fn pose_at(&self, t: f32) -> CameraPose {
        match &self.origin {
            Some(origin) => origin.lerp(&self.target, t),
            None => self.target,
        }
    }
}

/// Fired flags of edge-triggered actions
#[derive(Debug, Clone, Default)]
pub struct FiredSet {
    fired: HashMap<ActionKey, bool>,
}

impl FiredSet {
    /// Mark an action fired; returns `true` if it had not fired yet
    pub fn mark(&mut self, key: ActionKey) -> bool {
        !std::mem::replace(self.fired.entry(key).or_insert(false), true)
    }

    /// Set an action's flag directly
    pub fn set(&mut self, key: ActionKey, fired: bool) {
        self.fired.insert(key, fired);
    }

    /// Forget every flag
    pub fn clear(&mut self) {
        self.fired.clear();
    }
}

/// Effective item-relative window of an action.
///
/// An untimed-end `animation.play` runs for its animation's length; every
/// other action uses its declared window.
pub fn effective_window(
    action: &SceneAction,
    animation_duration: impl Fn(&str) -> Option<f64>,
) -> ActionWindow {
    let window = action.resolved_window();
    match &action.kind {
        ActionKind::AnimationPlay { animation_id } if window.is_instant() => ActionWindow {
            start: window.start,
            end: window.start + animation_duration(animation_id).unwrap_or(0.0),
        },
        _ => window,
    }
}

/// Animation-local time limit for an `animation.play` window
pub fn play_span(window: &ActionWindow, animation_duration: f64) -> f64 {
    if window.is_instant() {
        animation_duration
    } else {
        (window.end - window.start).min(animation_duration)
    }
}

/// Folds scene actions into scene state
#[derive(Debug, Default)]
pub struct ActionResolver {
    animations: IndexMap<String, Arc<TrackStore>>,
    anchors: IndexMap<NodeKey, NodeAnchor>,
    default_easing: Easing,
    plans: HashMap<ActionKey, FocusPlan>,
    cursors: HashMap<ActionKey, TrackCursor>,
    fired: FiredSet,
    base: SceneState,
    published: SceneState,
    last_clock: Option<f64>,
}

impl ActionResolver {
    /// Create a resolver over loaded animations and node anchors
    pub fn new(
        animations: IndexMap<String, Arc<TrackStore>>,
        anchors: IndexMap<NodeKey, NodeAnchor>,
        default_easing: Easing,
    ) -> Self {
        Self {
            animations,
            anchors,
            default_easing,
            ..Default::default()
        }
    }

    /// Use `base` as the state standalone [`Self::apply`] folds over
    pub fn with_base(mut self, base: SceneState) -> Self {
        self.published = base.clone();
        self.base = base;
        self
    }

    /// Loaded animation by id
    pub fn animation(&self, id: &str) -> Option<&Arc<TrackStore>> {
        self.animations.get(id)
    }

    /// All loaded animations, in document order
    pub fn animations(&self) -> impl Iterator<Item = (&String, &Arc<TrackStore>)> {
        self.animations.iter()
    }

    /// Length of an animation, if loaded
    pub fn animation_duration(&self, id: &str) -> Option<f64> {
        self.animations.get(id).map(|store| store.duration())
    }

    /// Node anchor by key
    pub fn anchor(&self, node_key: &str) -> Option<&NodeAnchor> {
        self.anchors.get(node_key)
    }

    /// Focus plan of an action, if one was computed
    pub fn plan(&self, key: ActionKey) -> Option<&FocusPlan> {
        self.plans.get(&key)
    }

    /// Drop all track cursors; the next lookups binary search
    pub fn reset_cursors(&mut self) {
        for cursor in self.cursors.values_mut() {
            cursor.reset();
        }
    }

    /// Fold an item's started actions into `state` at item-local time `local`.
    ///
    /// With `stop`, folding ends before that action index.
    pub fn resolve_into(
        &mut self,
        item: ItemKey,
        actions: &[SceneAction],
        local: f64,
        state: &mut SceneState,
        stop: Option<usize>,
    ) {
        for (index, action) in actions.iter().enumerate() {
            if stop == Some(index) {
                break;
            }
            let window = action.resolved_window();
            if local < window.start {
                continue;
            }
            let key = ActionKey { item, action: index };
            match &action.kind {
                ActionKind::CameraFocus { .. } => {
                    if let Some(plan) = self.plans.get(&key) {
                        let easing = action.easing.unwrap_or(self.default_easing);
                        let eased = easing.apply(window.progress(local)) as f32;
                        state.camera = Some(plan.pose_at(eased));
                    }
                }
                ActionKind::VisibilitySet { items } => {
                    for entry in items {
                        state.visibility.insert(entry.node_key.clone(), entry.visible);
                    }
                }
                ActionKind::HighlightShow { node_keys } => {
                    for node in node_keys {
                        state.highlighted.insert(node.clone());
                    }
                }
                ActionKind::HighlightHide { node_keys } => {
                    for node in node_keys {
                        state.highlighted.shift_remove(node);
                    }
                }
                ActionKind::AnnotationShow { ids } => {
                    for id in ids {
                        state.annotations.insert(id.clone(), true);
                    }
                }
                ActionKind::AnnotationHide { ids } => {
                    for id in ids {
                        state.annotations.insert(id.clone(), false);
                    }
                }
                ActionKind::AnimationPlay { animation_id } => {
                    let Some(store) = self.animations.get(animation_id) else {
                        continue;
                    };
                    let span = play_span(&window, store.duration());
                    let at = (local - window.start).clamp(0.0, span);
                    let cursor = self.cursors.entry(key).or_insert_with(|| store.cursor());
                    apply_animation(store, cursor, at, state);
                }
                ActionKind::PointerPoint { .. } => {}
            }
        }
    }

    /// Compute the focus move of a `camera.focus` action starting from `origin`.
    ///
    /// Returns `None` for other action kinds and for node targets without an
    /// anchor.
    pub fn plan_focus(&self, action: &SceneAction, origin: Option<CameraPose>) -> Option<FocusPlan> {
        let ActionKind::CameraFocus {
            target,
            pose,
            distance,
        } = &action.kind
        else {
            return None;
        };
        let inherited_fov = origin.and_then(|o| o.fov);

        if let Some(pose) = pose {
            let mut target = *pose;
            target.fov = target.fov.or(inherited_fov);
            return Some(FocusPlan { origin, target });
        }

        let node = target.as_deref()?;
        let Some(anchor) = self.anchors.get(node) else {
            tracing::warn!(node, "camera.focus target has no scene anchor; action skipped");
            return None;
        };
        let direction = origin
            .and_then(|o| o.back_direction())
            .unwrap_or([0.0, 0.0, 1.0]);
        let distance = distance
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or_else(|| (anchor.radius * FOCUS_RADIUS_FACTOR).max(MIN_FOCUS_DISTANCE));
        let center = anchor.center;
        Some(FocusPlan {
            origin,
            target: CameraPose {
                position: [
                    center[0] + direction[0] * distance,
                    center[1] + direction[1] * distance,
                    center[2] + direction[2] * distance,
                ],
                target: center,
                fov: inherited_fov,
            },
        })
    }

    /// Plan every `camera.focus` of an item that has no plan yet.
    ///
    /// Each origin is the camera obtained by folding `seed` with the
    /// earlier-declared actions at the focus window's start.
    pub fn plan_item(&mut self, item: ItemKey, actions: &[SceneAction], seed: &SceneState) {
        for (index, action) in actions.iter().enumerate() {
            let key = ActionKey { item, action: index };
            if !matches!(action.kind, ActionKind::CameraFocus { .. }) || self.plans.contains_key(&key) {
                continue;
            }
            let mut state = seed.clone();
            self.resolve_into(item, actions, action.resolved_window().start, &mut state, Some(index));
            if let Some(plan) = self.plan_focus(action, state.camera) {
                self.plans.insert(key, plan);
            }
        }
    }

    /// Store a precomputed focus plan
    pub fn insert_plan(&mut self, key: ActionKey, plan: FocusPlan) {
        self.plans.insert(key, plan);
    }

    /// Fire edge-triggered actions whose start lies in `[from, to]`.
    ///
    /// Pointer cues are pushed to `out`; highlight and annotation changes
    /// reach the scene through the state diff. Returns the fired indices.
    pub fn fire_crossings(
        &mut self,
        item: ItemKey,
        actions: &[SceneAction],
        from: f64,
        to: f64,
        out: &mut SceneMutationBatch,
    ) -> Vec<usize> {
        let mut fired = Vec::new();
        for (index, action) in actions.iter().enumerate() {
            if !action.kind.is_edge_triggered() {
                continue;
            }
            let start = action.resolved_window().start;
            if start < from || start > to {
                continue;
            }
            if !self.fired.mark(ActionKey { item, action: index }) {
                continue;
            }
            if let ActionKind::PointerPoint { node_key, position } = &action.kind {
                out.push(SceneMutation::Pointer {
                    cue: PointerCue {
                        node_key: node_key.clone(),
                        position: *position,
                    },
                });
            }
            tracing::trace!(action = action.kind.name(), index, "Action fired");
            fired.push(index);
        }
        fired
    }

    /// Rebuild fired flags of an item for a jump to item-local `local`:
    /// actions starting strictly before it count as fired.
    pub fn rebuild_fired(&mut self, item: ItemKey, actions: &[SceneAction], local: f64) {
        for (index, action) in actions.iter().enumerate() {
            if action.kind.is_edge_triggered() {
                let fired = action.resolved_window().start < local;
                self.fired.set(ActionKey { item, action: index }, fired);
            }
        }
    }

    /// Resolve a standalone action list at `clock_time`.
    ///
    /// Folds the actions over the base state, diffs against what the
    /// previous call published and fires crossed cues. Moving backwards
    /// rebuilds the fired flags first.
    pub fn apply(
        &mut self,
        actions: &[SceneAction],
        item_start: f64,
        clock_time: f64,
    ) -> SceneMutationBatch {
        let item = ItemKey::DETACHED;
        let local = clock_time - item_start;
        let base = self.base.clone();
        self.plan_item(item, actions, &base);

        let mut next = base;
        self.resolve_into(item, actions, local, &mut next, None);
        let mut batch = SceneMutationBatch::diff(clock_time, &self.published, &next);

        let from = match self.last_clock {
            Some(previous) if previous <= clock_time => previous - item_start,
            _ => {
                self.rebuild_fired(item, actions, local);
                self.reset_cursors();
                local
            }
        };
        self.fire_crossings(item, actions, from, local, &mut batch);

        self.published = next;
        self.last_clock = Some(clock_time);
        batch
    }

    /// Report overlapping windows that drive a shared target.
    ///
    /// `entries` are in declaration order; reported indices are positions in
    /// it. One warning is produced per conflicting pair.
    pub fn detect_conflicts(&self, scope: &str, entries: &[&SceneAction]) -> Vec<PlaybackWarning> {
        let resolved: Vec<(ActionWindow, Vec<String>)> = entries
            .iter()
            .map(|action| {
                let window = effective_window(action, |id| self.animation_duration(id));
                (window, self.targets(action))
            })
            .collect();

        let mut warnings = Vec::new();
        for (second, (window_b, targets_b)) in resolved.iter().enumerate() {
            for (first, (window_a, targets_a)) in resolved.iter().enumerate().take(second) {
                if !window_a.overlaps(window_b) {
                    continue;
                }
                let Some(target) = targets_b.iter().find(|t| targets_a.contains(t)) else {
                    continue;
                };
                tracing::warn!(scope, target = %target, first, second, "Overlapping actions drive one target");
                warnings.push(PlaybackWarning::ActionResolutionConflict {
                    scope: scope.to_string(),
                    target: target.clone(),
                    first,
                    second,
                });
            }
        }
        warnings
    }

    fn targets(&self, action: &SceneAction) -> Vec<String> {
        match &action.kind {
            ActionKind::CameraFocus { .. } => vec!["camera".to_string()],
            ActionKind::VisibilitySet { items } => {
                items.iter().map(|i| format!("node:{}", i.node_key)).collect()
            }
            ActionKind::HighlightShow { node_keys } | ActionKind::HighlightHide { node_keys } => {
                node_keys.iter().map(|n| format!("highlight:{n}")).collect()
            }
            ActionKind::AnnotationShow { ids } | ActionKind::AnnotationHide { ids } => {
                ids.iter().map(|id| format!("annotation:{id}")).collect()
            }
            ActionKind::AnimationPlay { animation_id } => {
                let Some(store) = self.animations.get(animation_id) else {
                    return Vec::new();
                };
                let mut targets = Vec::new();
                if store.has_camera() {
                    targets.push("camera".to_string());
                }
                targets.extend(store.visibility_nodes().map(|n| format!("node:{n}")));
                targets.extend(store.transform_nodes().map(|n| format!("transform:{n}")));
                targets
            }
            ActionKind::PointerPoint { .. } => Vec::new(),
        }
    }
}

/// Write one animation's values at animation-local `at` into `state`.
///
/// Visibility is applied only for tracks whose first toggle has been reached.
fn apply_animation(store: &TrackStore, cursor: &mut TrackCursor, at: f64, state: &mut SceneState) {
    if let Some(pose) = store.evaluate_camera_with(cursor, at) {
        state.camera = Some(pose);
    }
    for (slot, node) in store.visibility_tracks() {
        if let Some(visible) = store.toggle_with(cursor, slot, at) {
            state.visibility.insert(node.clone(), visible);
        }
    }
    for (slot, node) in store.transform_tracks() {
        if let Some(trs) = store.transform_with(cursor, slot, at) {
            state.transforms.insert(node.clone(), trs);
        }
    }
}
