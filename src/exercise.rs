use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{FilterKind, SmoothingConfig};
use crate::error::{ConfigError, Result};
use crate::geometry::{CoordinateSpace, MeasureSpec, Projection};
use crate::pose::LandmarkIndex;
use crate::rules::{default_headlines, FormRule, Headline};
use crate::tracker::TrackingMode;

/// Declarative description of one exercise. Immutable once validated; sessions share it via `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseConfig {
    pub exercise_type: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub coordinates: CoordinateSpace,
    /// ランドマークの z を角度・距離に含める
    #[serde(default)]
    pub depth: bool,
    pub measures: Vec<MeasureSpec>,
    pub tracking: TrackingMode,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    /// 連続カウントの最小間隔（秒）
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: f64,
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    /// Stage reported when the tracked landmarks are not visible.
    #[serde(default = "default_no_detection_stage")]
    pub no_detection_stage: String,
    #[serde(default)]
    pub rules: Vec<FormRule>,
    #[serde(default = "default_headlines")]
    pub headlines: Vec<Headline>,
    #[serde(default)]
    pub info: ExerciseInfo,
}

/// Presentation metadata shown to the user before a set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub form_checks: Vec<String>,
    #[serde(default)]
    pub default_reps: Option<u32>,
    #[serde(default)]
    pub default_sets: Option<u32>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

fn default_debounce_secs() -> f64 { 1.0 }
fn default_min_visibility() -> f32 { 0.5 }
fn default_no_detection_stage() -> String { "rest".to_string() }

impl ExerciseConfig {
    /// Minimal config with defaults for everything optional.
    pub fn new(exercise_type: &str, measures: Vec<MeasureSpec>, tracking: TrackingMode) -> Self {
        Self {
            exercise_type: exercise_type.to_string(),
            display_name: String::new(),
            coordinates: CoordinateSpace::default(),
            depth: false,
            measures,
            tracking,
            smoothing: SmoothingConfig::default(),
            debounce_secs: default_debounce_secs(),
            min_visibility: default_min_visibility(),
            no_detection_stage: default_no_detection_stage(),
            rules: Vec::new(),
            headlines: default_headlines(),
            info: ExerciseInfo::default(),
        }
    }

    pub fn projection(&self) -> Projection {
        Projection::new(self.coordinates, self.depth)
    }

    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.exercise_type
        } else {
            &self.display_name
        }
    }

    fn measure(&self, name: &str) -> Option<&MeasureSpec> {
        self.measures.iter().find(|m| m.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        let ex = self.exercise_type.as_str();

        // mean は前に定義された measure だけを参照できる
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (i, spec) in self.measures.iter().enumerate() {
            for dep in spec.dependencies() {
                if !seen.contains_key(dep.as_str()) {
                    return Err(ConfigError::unknown_measure(ex, dep));
                }
            }
            if seen.insert(spec.name.as_str(), i).is_some() {
                return Err(ConfigError::DuplicateMeasure {
                    exercise: ex.to_string(),
                    measure: spec.name.clone(),
                });
            }
        }

        for signal in self.tracking.signals() {
            if !seen.contains_key(signal) {
                return Err(ConfigError::unknown_measure(ex, signal));
            }
        }
        self.tracking.validate(ex)?;

        for rule in &self.rules {
            for measure in rule.measures() {
                if !seen.contains_key(measure) {
                    return Err(ConfigError::unknown_measure(ex, measure));
                }
            }
            rule.validate(ex)?;
        }

        self.validate_smoothing()?;

        if !(self.debounce_secs.is_finite() && self.debounce_secs >= 0.0) {
            return Err(ConfigError::timing(ex, "debounce_secs must be finite and not negative"));
        }
        if !(0.0..=1.0).contains(&self.min_visibility) {
            return Err(ConfigError::thresholds(ex, "min_visibility must be within [0, 1]"));
        }
        if let CoordinateSpace::Pixel { width, height } = self.coordinates {
            if width == 0 || height == 0 {
                return Err(ConfigError::thresholds(ex, "pixel space needs a non-zero frame size"));
            }
        }
        Ok(())
    }

    fn validate_smoothing(&self) -> Result<()> {
        let ex = self.exercise_type.as_str();
        let s = &self.smoothing;
        match s.filter {
            FilterKind::MovingAverage if s.window == 0 => {
                Err(ConfigError::smoothing(ex, "window must be at least 1"))
            }
            FilterKind::OneEuro
                if !(s.min_cutoff > 0.0 && s.d_cutoff > 0.0 && s.beta >= 0.0) =>
            {
                Err(ConfigError::smoothing(ex, "one_euro needs positive cutoffs and beta >= 0"))
            }
            _ => Ok(()),
        }
    }

    /// Landmarks the tracking signals depend on, following `mean` measures through.
    pub fn required_landmarks(&self) -> Vec<LandmarkIndex> {
        let mut out = BTreeSet::new();
        let mut pending: Vec<&str> = self.tracking.signals();
        let mut visited = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !visited.insert(name) {
                continue;
            }
            let Some(spec) = self.measure(name) else {
                continue;
            };
            out.extend(spec.landmarks().into_iter().map(|l| l as usize));
            pending.extend(spec.dependencies().iter().map(|d| d.as_str()));
        }
        out.into_iter().filter_map(LandmarkIndex::from_index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MeasureKind, PointRef};
    use crate::rules::PostureRule;
    use crate::tracker::{ActiveWhen, BandConfig, BandCues, CycleConfig, PhaseSpec};
    use LandmarkIndex::*;

    fn squat() -> ExerciseConfig {
        ExerciseConfig::new(
            "squat",
            vec![
                MeasureSpec::angle("left_knee", LeftHip, LeftKnee, LeftAnkle),
                MeasureSpec::angle("right_knee", RightHip, RightKnee, RightAnkle),
                MeasureSpec::mean("knee", &["left_knee", "right_knee"]),
                MeasureSpec::with_kind(
                    "lean",
                    MeasureKind::HorizontalSpan {
                        a: PointRef::Midpoint([LeftShoulder, RightShoulder]),
                        b: PointRef::Midpoint([LeftHip, RightHip]),
                    },
                ),
            ],
            TrackingMode::Bands(BandConfig {
                signal: "knee".to_string(),
                rest_stage: "up".to_string(),
                active_stage: "down".to_string(),
                active_when: ActiveWhen::Below,
                enter: 90.0,
                exit: 160.0,
                cues: BandCues::default(),
            }),
        )
    }

    #[test]
    fn test_valid_config() {
        assert!(squat().validate().is_ok());
        assert_eq!(squat().display_name(), "squat");
    }

    #[test]
    fn test_required_landmarks_follow_mean() {
        let required = squat().required_landmarks();
        assert_eq!(
            required,
            vec![LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle]
        );
        // lean はトラッキング信号ではないので含まれない
        assert!(!required.contains(&LeftShoulder));
    }

    #[test]
    fn test_cycle_requires_nothing() {
        let config = ExerciseConfig::new(
            "breathing",
            Vec::new(),
            TrackingMode::Cycle(CycleConfig {
                phases: vec![PhaseSpec::new("inhale", 4.0)],
            }),
        );
        assert!(config.validate().is_ok());
        assert!(config.required_landmarks().is_empty());
    }

    #[test]
    fn test_unknown_signal() {
        let mut config = squat();
        if let TrackingMode::Bands(b) = &mut config.tracking {
            b.signal = "elbow".to_string();
        }
        assert!(matches!(config.validate(), Err(ConfigError::UnknownMeasure { measure, .. }) if measure == "elbow"));
    }

    #[test]
    fn test_mean_must_follow_inputs() {
        let mut config = squat();
        config.measures.swap(0, 2);
        assert!(matches!(config.validate(), Err(ConfigError::UnknownMeasure { .. })));
    }

    #[test]
    fn test_duplicate_measure() {
        let mut config = squat();
        config.measures.push(MeasureSpec::angle("knee", LeftHip, LeftKnee, LeftAnkle));
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateMeasure { .. })));
    }

    #[test]
    fn test_rule_measure_checked() {
        let mut config = squat();
        config.rules.push(FormRule::Posture(PostureRule {
            id: "back".to_string(),
            measure: "spine".to_string(),
            min: None,
            max: Some(0.1),
            below_penalty: 0.0,
            below_message: None,
            above_penalty: 10.0,
            above_message: None,
            ok_message: None,
            when_stage: None,
            smoothed: false,
        }));
        assert!(matches!(config.validate(), Err(ConfigError::UnknownMeasure { .. })));
    }

    #[test]
    fn test_bad_timing_and_smoothing() {
        let mut config = squat();
        config.debounce_secs = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTiming { .. })));

        let mut config = squat();
        config.smoothing.window = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSmoothing { .. })));

        let mut config = squat();
        config.smoothing.filter = FilterKind::OneEuro;
        config.smoothing.min_cutoff = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSmoothing { .. })));

        let mut config = squat();
        config.min_visibility = 1.5;
        assert!(config.validate().is_err());
    }
}
