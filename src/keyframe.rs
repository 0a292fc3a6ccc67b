//! Time-sorted keyframe tracks for camera and hotspot animation.

use serde::{Deserialize, Serialize};

use crate::scene::HotspotPose;

/// A value at a point in time, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub time: f32,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Keyframe<T> {
    pub fn new(time: f32, data: T) -> Self {
        Self { time, data }
    }
}

/// The keyframes surrounding a query time.
#[derive(Debug, PartialEq)]
pub struct Bracket<'a, T> {
    /// Last keyframe at or before the query time.
    pub previous: Option<&'a Keyframe<T>>,
    /// First keyframe after the query time.
    pub next: Option<&'a Keyframe<T>>,
}

/// Values that can be blended between two keyframes.
pub trait Interpolate: Copy {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }
}

impl Interpolate for glam::Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

/// Keyframes kept sorted by time.
#[derive(Clone, Debug, Default)]
pub struct Track<T> {
    keys: Vec<Keyframe<T>>,
}

impl<T> Track<T> {
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Build a track from keyframes in any order.
    pub fn from_keys(keys: impl IntoIterator<Item = Keyframe<T>>) -> Self {
        let mut track = Self::new();
        for key in keys {
            track.insert(key);
        }
        track
    }

    /// Insert a keyframe, keeping the list sorted. Equal times keep insertion order.
    pub fn insert(&mut self, key: Keyframe<T>) {
        let index = self.keys.partition_point(|k| k.time <= key.time);
        self.keys.insert(index, key);
    }

    pub fn keys(&self) -> &[Keyframe<T>] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Time of the last keyframe, or zero for an empty track.
    pub fn duration(&self) -> f32 {
        self.keys.last().map_or(0.0, |k| k.time)
    }

    /// Find the keyframes on either side of `time`.
    pub fn bracket(&self, time: f32) -> Bracket<'_, T> {
        let index = self.keys.partition_point(|k| k.time <= time);
        Bracket {
            previous: index.checked_sub(1).map(|i| &self.keys[i]),
            next: self.keys.get(index),
        }
    }
}

impl<T: Interpolate> Track<T> {
    /// Sample the track, holding the first and last values outside its range.
    pub fn sample(&self, time: f32) -> Option<T> {
        let bracket = self.bracket(time);
        match (bracket.previous, bracket.next) {
            (Some(a), Some(b)) => {
                let span = b.time - a.time;
                let t = if span > 0.0 {
                    (time - a.time) / span
                } else {
                    1.0
                };
                Some(T::interpolate(a.data, b.data, t))
            }
            (Some(a), None) => Some(a.data),
            (None, Some(b)) => Some(b.data),
            (None, None) => None,
        }
    }
}

/// Camera orientation at a keyframe, in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraKeyframe {
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
}

/// Blend two angles in degrees along the shorter arc.
pub fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    let delta = (b - a + 180.0).rem_euclid(360.0) - 180.0;
    a + delta * t
}

impl Interpolate for CameraKeyframe {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        Self {
            yaw: lerp_angle(a.yaw, b.yaw, t),
            pitch: f32::interpolate(a.pitch, b.pitch, t),
            fov: f32::interpolate(a.fov, b.fov, t),
        }
    }
}

impl Interpolate for HotspotPose {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        Self {
            yaw: lerp_angle(a.yaw, b.yaw, t),
            pitch: f32::interpolate(a.pitch, b.pitch, t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn track() -> Track<f32> {
        Track::from_keys([
            Keyframe::new(2.0, 20.0),
            Keyframe::new(0.0, 0.0),
            Keyframe::new(1.0, 10.0),
        ])
    }

    #[test]
    fn insert_keeps_sorted() {
        let times: Vec<f32> = track().keys().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn bracket_between_keys() {
        let track = track();
        let bracket = track.bracket(1.5);
        assert_eq!(bracket.previous.map(|k| k.time), Some(1.0));
        assert_eq!(bracket.next.map(|k| k.time), Some(2.0));
    }

    #[test]
    fn bracket_before_first_key() {
        let track = track();
        let bracket = track.bracket(-1.0);
        assert!(bracket.previous.is_none());
        assert_eq!(bracket.next, Some(&track.keys()[0]));
    }

    #[test]
    fn bracket_after_last_key() {
        let track = track();
        let bracket = track.bracket(5.0);
        assert_eq!(bracket.previous.map(|k| k.time), Some(2.0));
        assert!(bracket.next.is_none());
    }

    #[test]
    fn bracket_on_exact_key_uses_it_as_previous() {
        let track = track();
        let bracket = track.bracket(1.0);
        assert_eq!(bracket.previous.map(|k| k.time), Some(1.0));
        assert_eq!(bracket.next.map(|k| k.time), Some(2.0));
    }

    #[test]
    fn sample_interpolates_and_holds_ends() {
        let track = track();
        assert_abs_diff_eq!(track.sample(0.5).unwrap(), 5.0);
        assert_abs_diff_eq!(track.sample(-3.0).unwrap(), 0.0);
        assert_abs_diff_eq!(track.sample(9.0).unwrap(), 20.0);
        assert!(Track::<f32>::new().sample(0.0).is_none());
    }

    #[test]
    fn yaw_takes_shortest_arc() {
        assert_abs_diff_eq!(lerp_angle(350.0, 10.0, 0.5), 360.0);
        assert_abs_diff_eq!(lerp_angle(10.0, 350.0, 0.5), 0.0);
    }
}
