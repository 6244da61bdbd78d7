// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe records and interpolation math.

use serde::{Deserialize, Serialize};

/// Anything positioned on a time axis
pub trait Timed {
    /// Time in seconds
    fn time(&self) -> f64;
}

/// A camera keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraKey {
    /// Time in seconds
    pub time: f64,
    /// Eye position
    pub position: [f32; 3],
    /// Look-at point
    pub target: [f32; 3],
    /// Vertical field of view in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fov: Option<f32>,
}

impl CameraKey {
    /// Create a camera keyframe without a field of view
    pub fn new(time: f64, position: [f32; 3], target: [f32; 3]) -> Self {
        Self {
            time,
            position,
            target,
            fov: None,
        }
    }

    /// Set field of view
    pub fn with_fov(mut self, fov: f32) -> Self {
        self.fov = Some(fov);
        self
    }
}

/// A visibility toggle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibilityKey {
    /// Time in seconds
    pub time: f64,
    /// Visibility from this time on
    pub visible: bool,
}

/// A transform keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformKey {
    /// Time in seconds
    pub time: f64,
    /// Translation
    pub position: [f32; 3],
    /// Rotation quaternion (x, y, z, w)
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    /// Scale
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl TransformKey {
    /// Create a transform keyframe with identity rotation and unit scale
    pub fn new(time: f64, position: [f32; 3]) -> Self {
        Self {
            time,
            position,
            rotation: identity_rotation(),
            scale: unit_scale(),
        }
    }

    /// Set rotation
    pub fn with_rotation(mut self, rotation: [f32; 4]) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set scale
    pub fn with_scale(mut self, scale: [f32; 3]) -> Self {
        self.scale = scale;
        self
    }
}

/// A narrative checkpoint on an animation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier, unique within a document
    pub id: String,
    /// Time in seconds, local to the owning animation
    pub time: f64,
    /// Display name
    pub name: String,
    /// Longer description
    #[serde(default)]
    pub description: String,
}

impl Step {
    /// Create a step
    pub fn new(id: impl Into<String>, time: f64, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            time,
            name: name.into(),
            description: String::new(),
        }
    }
}

impl Timed for CameraKey {
    fn time(&self) -> f64 {
        self.time
    }
}

impl Timed for VisibilityKey {
    fn time(&self) -> f64 {
        self.time
    }
}

impl Timed for TransformKey {
    fn time(&self) -> f64 {
        self.time
    }
}

impl Timed for Step {
    fn time(&self) -> f64 {
        self.time
    }
}

/// Easing curve applied to an action window's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    /// Constant speed
    Linear,
    /// Cubic ease in
    #[serde(alias = "easeIn")]
    EaseIn,
    /// Cubic ease out
    #[serde(alias = "easeOut")]
    EaseOut,
    /// Cubic ease in and out
    #[default]
    #[serde(alias = "easeInOut")]
    EaseInOut,
}

impl Easing {
    /// Map linear progress in `[0, 1]` onto the curve
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t * t,
            Self::EaseOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv * inv
            }
            Self::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let u = -2.0 * t + 2.0;
                    1.0 - u * u * u / 2.0
                }
            }
        }
    }
}

/// Where a time falls within a sorted key list
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeySpan {
    /// Exactly on a key, or clamped to the first/last key
    At(usize),
    /// Strictly between two adjacent keys, with the normalized fraction
    Between(usize, usize, f32),
}

impl KeySpan {
    /// Locate `time` in `keys` (sorted, strictly increasing) by binary search
    pub fn locate<K: Timed>(keys: &[K], time: f64) -> Option<Self> {
        if keys.is_empty() {
            return None;
        }
        let count = keys.partition_point(|k| k.time() <= time);
        Some(Self::from_count(keys, count, time))
    }

    /// Locate `time` starting from a cursor hint.
    ///
    /// `hint` holds the index of the last key at or before the previous
    /// lookup; `usize::MAX` means unknown. Walks forward when time did not
    /// move backwards, binary searches otherwise.
    pub fn locate_from<K: Timed>(keys: &[K], time: f64, hint: &mut usize) -> Option<Self> {
        if keys.is_empty() {
            return None;
        }
        let start = *hint;
        let count = if start < keys.len() && keys[start].time() <= time {
            let mut i = start;
            while i + 1 < keys.len() && keys[i + 1].time() <= time {
                i += 1;
            }
            i + 1
        } else {
            keys.partition_point(|k| k.time() <= time)
        };
        *hint = count.saturating_sub(1);
        Some(Self::from_count(keys, count, time))
    }

    /// `count` is the number of keys at or before `time`
    fn from_count<K: Timed>(keys: &[K], count: usize, time: f64) -> Self {
        if count == 0 {
            return Self::At(0);
        }
        let a = count - 1;
        if count == keys.len() {
            return Self::At(a);
        }
        let ta = keys[a].time();
        if time <= ta {
            return Self::At(a);
        }
        let tb = keys[a + 1].time();
        let frac = ((time - ta) / (tb - ta)).clamp(0.0, 1.0);
        Self::Between(a, a + 1, frac as f32)
    }
}

/// Interpolation utilities
pub struct Interpolation;

impl Interpolation {
    /// Linear interpolation between two floats
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Interpolate Vec3
    pub fn lerp_vec3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
        [
            Self::lerp(a[0], b[0], t),
            Self::lerp(a[1], b[1], t),
            Self::lerp(a[2], b[2], t),
        ]
    }

    /// Interpolate Vec4
    pub fn lerp_vec4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
        [
            Self::lerp(a[0], b[0], t),
            Self::lerp(a[1], b[1], t),
            Self::lerp(a[2], b[2], t),
            Self::lerp(a[3], b[3], t),
        ]
    }

    /// Normalize a quaternion, falling back to identity for zero length
    pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
        let len = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
        if len <= f32::EPSILON {
            return [0.0, 0.0, 0.0, 1.0];
        }
        [q[0] / len, q[1] / len, q[2] / len, q[3] / len]
    }

    /// Spherical linear interpolation for quaternions, along the shortest arc
    pub fn slerp(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
        let a = Self::normalize_quat(a);
        let mut b = Self::normalize_quat(b);
        let mut dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3];

        // Opposite hemispheres: flip to take the short way round
        if dot < 0.0 {
            b = [-b[0], -b[1], -b[2], -b[3]];
            dot = -dot;
        }

        // Nearly parallel: sin(theta) is too small to divide by
        if dot > 0.9995 {
            return Self::normalize_quat(Self::lerp_vec4(a, b, t));
        }

        let theta_0 = dot.min(1.0).acos();
        let sin_theta_0 = theta_0.sin();
        let s0 = ((1.0 - t) * theta_0).sin() / sin_theta_0;
        let s1 = (t * theta_0).sin() / sin_theta_0;

        [
            a[0] * s0 + b[0] * s1,
            a[1] * s0 + b[1] * s1,
            a[2] * s0 + b[2] * s1,
            a[3] * s0 + b[3] * s1,
        ]
    }

    /// Normalize a direction, returning `None` for zero length
    pub fn normalize_vec3(v: [f32; 3]) -> Option<[f32; 3]> {
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        if len <= f32::EPSILON || !len.is_finite() {
            return None;
        }
        Some([v[0] / len, v[1] / len, v[2] / len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(times: &[f64]) -> Vec<VisibilityKey> {
        times
            .iter()
            .map(|&time| VisibilityKey {
                time,
                visible: true,
            })
            .collect()
    }

    #[test]
    fn test_locate_clamps_and_brackets() {
        let keys = keys(&[1.0, 2.0, 4.0]);
        assert_eq!(KeySpan::locate(&keys, 0.0), Some(KeySpan::At(0)));
        assert_eq!(KeySpan::locate(&keys, 2.0), Some(KeySpan::At(1)));
        assert_eq!(KeySpan::locate(&keys, 9.0), Some(KeySpan::At(2)));
        match KeySpan::locate(&keys, 3.0) {
            Some(KeySpan::Between(1, 2, frac)) => assert!((frac - 0.5).abs() < 1e-6),
            other => panic!("unexpected span {other:?}"),
        }
        assert_eq!(KeySpan::locate::<VisibilityKey>(&[], 1.0), None);
    }

    #[test]
    fn test_cursor_matches_binary_search() {
        let keys = keys(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut hint = usize::MAX;
        let mut t = 0.0;
        while t <= 6.0 {
            assert_eq!(
                KeySpan::locate_from(&keys, t, &mut hint),
                KeySpan::locate(&keys, t)
            );
            t += 0.25;
        }
        // Backwards jump falls back to the binary search
        assert_eq!(
            KeySpan::locate_from(&keys, 1.5, &mut hint),
            KeySpan::locate(&keys, 1.5)
        );
        assert_eq!(hint, 1);
    }

    #[test]
    fn test_easing_endpoints_are_fixed() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            assert!(easing.apply(0.0).abs() < 1e-12);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-12);
            assert!((easing.apply(2.0) - 1.0).abs() < 1e-12);
        }
        assert!((Easing::EaseInOut.apply(0.5) - 0.5).abs() < 1e-12);
        assert!(Easing::EaseIn.apply(0.25) < 0.25);
        assert!(Easing::EaseOut.apply(0.25) > 0.25);
    }

    #[test]
    fn test_easing_parses_kebab_and_camel_case() {
        let parsed: Easing = serde_json::from_str("\"ease-in-out\"").unwrap();
        assert_eq!(parsed, Easing::EaseInOut);
        let parsed: Easing = serde_json::from_str("\"easeOut\"").unwrap();
        assert_eq!(parsed, Easing::EaseOut);
    }

    #[test]
    fn test_visibility_key_parses() {
        let key: VisibilityKey = serde_json::from_str(r#"{"time": 1.5, "visible": false}"#).unwrap();
        assert_eq!(
            key,
            VisibilityKey {
                time: 1.5,
                visible: false,
            }
        );
        assert_ne!(key, VisibilityKey { time: 1.5, visible: true });
    }

    #[test]
    fn test_slerp_takes_shortest_arc() {
        let a = [0.0, 0.0, 0.0, 1.0];
        // 90 degrees about Y, expressed in the opposite hemisphere
        let half = std::f32::consts::FRAC_PI_4;
        let b = [0.0, -half.sin(), 0.0, -half.cos()];
        let mid = Interpolation::slerp(a, b, 0.5);
        let eighth = std::f32::consts::FRAC_PI_8;
        assert!((mid[1] - eighth.sin()).abs() < 1e-5);
        assert!((mid[3] - eighth.cos()).abs() < 1e-5);
    }

    #[test]
    fn test_slerp_endpoints() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [1.0, 0.0, 0.0, 0.0];
        let start = Interpolation::slerp(a, b, 0.0);
        let end = Interpolation::slerp(a, b, 1.0);
        for i in 0..4 {
            assert!((start[i] - a[i]).abs() < 1e-6);
            assert!((end[i] - b[i]).abs() < 1e-6);
        }
    }
}
