//! Transition types, easing functions and tweens for scene switching.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::scene::SceneId;

/// Curve a tween follows from 0 to 1.
///
/// Config names follow the usual tween libraries: `quadIn`, `sineInOut` and so on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Easing {
    #[default]
    Linear,
    /// `quadIn`: t².
    EaseIn,
    /// `quadOut`.
    EaseOut,
    /// `quadInOut`: quadratic halves meeting at 0.5.
    EaseInOut,
    SineInOut,
    CubicInOut,
}

impl Easing {
    /// Eased value of `t`, clamped to [0, 1] first.
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::SineInOut => -((std::f32::consts::PI * t).cos() - 1.0) / 2.0,
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::EaseIn => "quadIn",
            Easing::EaseOut => "quadOut",
            Easing::EaseInOut => "quadInOut",
            Easing::SineInOut => "sineInOut",
            Easing::CubicInOut => "cubicInOut",
        }
    }
}

impl From<String> for Easing {
    fn from(name: String) -> Self {
        match name.as_str() {
            "linear" | "none" => Easing::Linear,
            "quadIn" | "easeIn" => Easing::EaseIn,
            "quadOut" | "easeOut" => Easing::EaseOut,
            "quadInOut" | "easeInOut" => Easing::EaseInOut,
            "sineInOut" => Easing::SineInOut,
            "cubicInOut" => Easing::CubicInOut,
            other => {
                warn!(easing = other, "unknown easing, using linear");
                Easing::Linear
            }
        }
    }
}

impl From<Easing> for String {
    fn from(easing: Easing) -> Self {
        easing.name().to_string()
    }
}

/// How two scene images are combined while switching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransitionKind {
    /// Instant switch, no visual transition.
    None,
    /// Horizontal wipe.
    Slide,
    /// Mix-map threshold blend, incoming over outgoing.
    Blend,
    /// Mix-map threshold blend, outgoing over incoming.
    #[default]
    Fade,
}

impl TransitionKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransitionKind::None => "none",
            TransitionKind::Slide => "slide",
            TransitionKind::Blend => "blend",
            TransitionKind::Fade => "fade",
        }
    }
}

impl From<String> for TransitionKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "none" => TransitionKind::None,
            "slide" => TransitionKind::Slide,
            "blend" => TransitionKind::Blend,
            "fade" => TransitionKind::Fade,
            other => {
                warn!(transition = other, "unknown transition type, using none");
                TransitionKind::None
            }
        }
    }
}

impl From<TransitionKind> for String {
    fn from(kind: TransitionKind) -> Self {
        kind.name().to_string()
    }
}

/// One half of a transition config.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionSpec {
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    pub easing: Easing,
    /// Milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: f32,
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self {
            kind: TransitionKind::Fade,
            easing: Easing::EaseInOut,
            duration_ms: 1000.0,
        }
    }
}

impl TransitionSpec {
    pub fn none() -> Self {
        Self {
            kind: TransitionKind::None,
            easing: Easing::Linear,
            duration_ms: 0.0,
        }
    }

    pub fn new(kind: TransitionKind, duration_ms: f32) -> Self {
        Self {
            kind,
            duration_ms,
            ..Default::default()
        }
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn duration_secs(&self) -> f32 {
        (self.duration_ms / 1000.0).max(0.0)
    }

    /// Tween from 0 to 1 following this spec. Kind `none` is instant.
    pub fn tween(&self) -> Tween {
        if self.kind == TransitionKind::None {
            Tween::instant(0.0, 1.0)
        } else {
            Tween::new(0.0, 1.0, self.duration_secs(), self.easing)
        }
    }
}

/// Screen and background halves of a scene change.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub screen: TransitionSpec,
    pub background: TransitionSpec,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            screen: TransitionSpec::default(),
            background: TransitionSpec::none(),
        }
    }
}

impl TransitionConfig {
    pub fn instant() -> Self {
        Self {
            screen: TransitionSpec::none(),
            background: TransitionSpec::none(),
        }
    }
}

/// Eased interpolation between two values over a fixed duration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tween {
    pub from: f32,
    pub to: f32,
    /// Seconds.
    pub duration: f32,
    elapsed: f32,
    pub easing: Easing,
}

impl Tween {
    pub fn new(from: f32, to: f32, duration: f32, easing: Easing) -> Self {
        Self {
            from,
            to,
            duration: duration.max(0.0),
            elapsed: 0.0,
            easing,
        }
    }

    /// Tween that is already finished.
    pub fn instant(from: f32, to: f32) -> Self {
        Self::new(from, to, 0.0, Easing::Linear)
    }

    /// Advance by `dt` seconds and return the current value.
    pub fn advance(&mut self, dt: f32) -> f32 {
        self.elapsed = (self.elapsed + dt.max(0.0)).min(self.duration);
        self.value()
    }

    /// Linear progress in [0, 1]. Exactly 1.0 once the duration has elapsed.
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 || self.elapsed >= self.duration {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }

    pub fn value(&self) -> f32 {
        let t = self.easing.apply(self.progress());
        self.from + (self.to - self.from) * t
    }

    pub fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }
}

/// Lifecycle of a scene change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionState {
    /// Waiting for the incoming scene's media.
    Pending,
    Running,
    Complete,
}

/// An active switch from `outgoing` to `incoming`.
#[derive(Clone, Debug)]
pub struct Transition {
    pub outgoing: Option<SceneId>,
    pub incoming: SceneId,
    pub config: TransitionConfig,
    tween: Tween,
    state: TransitionState,
}

impl Transition {
    pub fn new(outgoing: Option<SceneId>, incoming: SceneId, config: TransitionConfig) -> Self {
        // Nothing to blend from on the first scene.
        let config = if outgoing.is_none() {
            TransitionConfig {
                screen: TransitionSpec::none(),
                ..config
            }
        } else {
            config
        };
        Self {
            outgoing,
            incoming,
            tween: config.screen.tween(),
            config,
            state: TransitionState::Pending,
        }
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn kind(&self) -> TransitionKind {
        self.config.screen.kind
    }

    /// Start blending. A `none` transition completes immediately.
    pub fn start(&mut self) {
        if self.state != TransitionState::Pending {
            return;
        }
        self.state = if self.tween.is_finished() {
            TransitionState::Complete
        } else {
            TransitionState::Running
        };
    }

    /// Advance a running transition and return the mix ratio.
    pub fn advance(&mut self, dt: f32) -> f32 {
        if self.state == TransitionState::Running {
            self.tween.advance(dt);
            if self.tween.is_finished() {
                self.state = TransitionState::Complete;
            }
        }
        self.ratio()
    }

    /// Eased mix ratio in [0, 1]; 0 shows the outgoing scene.
    pub fn ratio(&self) -> f32 {
        match self.state {
            TransitionState::Pending => 0.0,
            TransitionState::Running => self.tween.value().clamp(0.0, 1.0),
            TransitionState::Complete => 1.0,
        }
    }

    /// Linear progress of the screen tween.
    pub fn progress(&self) -> f32 {
        match self.state {
            TransitionState::Pending => 0.0,
            _ => self.tween.progress(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == TransitionState::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn easings_hit_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::EaseInOut,
            Easing::SineInOut,
            Easing::CubicInOut,
        ] {
            assert_abs_diff_eq!(easing.apply(0.0), 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(easing.apply(1.0), 1.0, epsilon = 1e-6);
        }
        for easing in [Easing::EaseInOut, Easing::SineInOut, Easing::CubicInOut] {
            assert_abs_diff_eq!(easing.apply(0.5), 0.5, epsilon = 1e-6);
        }
        assert_eq!(Easing::EaseIn.apply(0.5), 0.25);
        assert_eq!(Easing::EaseOut.apply(0.5), 0.75);
    }

    #[test]
    fn progress_is_monotonic_and_exact_at_duration() {
        let mut tween = Tween::new(0.0, 1.0, 1.0, Easing::EaseInOut);
        let mut last = 0.0;
        for _ in 0..59 {
            tween.advance(1.0 / 60.0);
            let p = tween.progress();
            assert!(p >= last);
            last = p;
        }
        assert!(tween.progress() < 1.0);
        tween.advance(1.0 / 60.0);
        tween.advance(1.0 / 60.0);
        assert_eq!(tween.progress(), 1.0);
        assert_eq!(tween.value(), 1.0);
    }

    #[test]
    fn none_transition_completes_on_start() {
        let config = TransitionConfig::instant();
        let mut transition = Transition::new(Some("a".into()), "b".into(), config);
        assert_eq!(transition.ratio(), 0.0);
        transition.start();
        assert!(transition.is_complete());
        assert_eq!(transition.ratio(), 1.0);
    }

    #[test]
    fn first_scene_skips_screen_blend() {
        let mut transition = Transition::new(None, "a".into(), TransitionConfig::default());
        transition.start();
        assert!(transition.is_complete());
    }

    #[test]
    fn running_transition_reaches_one() {
        let config = TransitionConfig {
            screen: TransitionSpec::new(TransitionKind::Blend, 500.0),
            background: TransitionSpec::none(),
        };
        let mut transition = Transition::new(Some("a".into()), "b".into(), config);
        transition.start();
        assert_eq!(transition.state(), TransitionState::Running);
        let mid = transition.advance(0.25);
        assert!(mid > 0.0 && mid < 1.0);
        assert_eq!(transition.advance(0.3), 1.0);
        assert!(transition.is_complete());
    }

    #[test]
    fn parses_config_with_unknown_names() {
        let config: TransitionConfig = serde_json::from_str(
            r#"{"screen":{"type":"wobble","easing":"quadInOut","duration":300},
                "background":{"type":"fade","easing":"bounce"}}"#,
        )
        .unwrap();
        assert_eq!(config.screen.kind, TransitionKind::None);
        assert_eq!(config.screen.easing, Easing::EaseInOut);
        assert_eq!(config.screen.duration_ms, 300.0);
        assert_eq!(config.background.kind, TransitionKind::Fade);
        assert_eq!(config.background.easing, Easing::Linear);
    }
}
