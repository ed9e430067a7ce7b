//! Exercise catalog: built-in definitions plus TOML-loaded ones.
//!
//! ```toml
//! [[exercises]]
//! exercise_type = "wall_push_up"
//! measures = [ ... ]
//! tracking = { mode = "bands", signal = "elbow", active_when = "below", enter = 100.0, exit = 150.0 }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::SmoothingConfig;
use crate::error::{ConfigError, Result};
use crate::exercise::{ExerciseConfig, ExerciseInfo};
use crate::geometry::{CoordinateSpace, MeasureKind, MeasureSpec, PointRef};
use crate::pose::LandmarkIndex::{self, *};
use crate::rules::{AlignmentRule, FormRule, PostureRule, RangeOfMotionRule, SymmetryRule};
use crate::tracker::{
    ActiveWhen, BandConfig, BandCues, BilateralConfig, CountRule, CycleConfig, HoldConfig,
    LimbConfig, PhaseSpec, TrackingMode,
};

/// Validated exercise configurations by `exercise_type`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    exercises: BTreeMap<String, Arc<ExerciseConfig>>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    exercises: Vec<ExerciseConfig>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The exercises shipped with the crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for config in builtin_exercises() {
            if let Err(e) = catalog.insert(config) {
                log::error!("builtin exercise rejected: {}", e);
                debug_assert!(false, "builtin exercise rejected: {}", e);
            }
        }
        catalog
    }

    /// Built-ins overlaid with the exercises in a TOML file. File entries replace built-ins of the
    /// same name; the same name twice within the file is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let mut catalog = Self::builtin();
        catalog.extend_from_toml(&content)?;
        Ok(catalog)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut catalog = Self::empty();
        catalog.extend_from_toml(content)?;
        Ok(catalog)
    }

    fn extend_from_toml(&mut self, content: &str) -> Result<()> {
        let file: CatalogFile = toml::from_str(content)?;
        let mut seen = Vec::new();
        for config in file.exercises {
            if seen.contains(&config.exercise_type) {
                return Err(ConfigError::DuplicateExercise(config.exercise_type));
            }
            seen.push(config.exercise_type.clone());
            self.insert(config)?;
        }
        log::info!("loaded {} exercise(s) from catalog file", seen.len());
        Ok(())
    }

    /// Validates and adds `config`, replacing any exercise with the same name.
    pub fn insert(&mut self, config: ExerciseConfig) -> Result<()> {
        config.validate()?;
        self.exercises
            .insert(config.exercise_type.clone(), Arc::new(config));
        Ok(())
    }

    pub fn get(&self, exercise_type: &str) -> Result<Arc<ExerciseConfig>> {
        self.exercises
            .get(exercise_type)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownExercise(exercise_type.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exercises.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

fn mid(a: LandmarkIndex, b: LandmarkIndex) -> PointRef {
    PointRef::Midpoint([a, b])
}

fn span(name: &str, a: impl Into<PointRef>, b: impl Into<PointRef>) -> MeasureSpec {
    MeasureSpec::with_kind(name, MeasureKind::HorizontalSpan { a: a.into(), b: b.into() })
}

fn gap(name: &str, a: impl Into<PointRef>, b: impl Into<PointRef>) -> MeasureSpec {
    MeasureSpec::with_kind(name, MeasureKind::VerticalGap { a: a.into(), b: b.into() })
}

fn s(text: &str) -> Option<String> {
    Some(text.to_string())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|i| i.to_string()).collect()
}

fn band(signal: &str, rest: &str, active: &str, active_when: ActiveWhen, enter: f32, exit: f32) -> BandConfig {
    BandConfig {
        signal: signal.to_string(),
        rest_stage: rest.to_string(),
        active_stage: active.to_string(),
        active_when,
        enter,
        exit,
        cues: BandCues::default(),
    }
}

/// Upper-bound posture check with a single penalty.
fn at_most(id: &str, measure: &str, max: f32, penalty: f32, message: &str) -> PostureRule {
    PostureRule {
        id: id.to_string(),
        measure: measure.to_string(),
        min: None,
        max: Some(max),
        below_penalty: 0.0,
        below_message: None,
        above_penalty: penalty,
        above_message: s(message),
        ok_message: None,
        when_stage: None,
        smoothed: false,
    }
}

fn builtin_exercises() -> Vec<ExerciseConfig> {
    vec![
        squat(),
        push_up(),
        hammer_curl(),
        assisted_leg_lift(),
        calf_stretch(),
        breathing_exercise(),
        seated_marching(),
        single_leg_stand(),
    ]
}

fn squat() -> ExerciseConfig {
    let mut tracking = band("knee", "up", "down", ActiveWhen::Below, 90.0, 160.0);
    tracking.cues = BandCues {
        ready: s("Ready position - start your squat"),
        leaving_rest: s("Descending - control the movement"),
        leaving_active: s("Ascending - drive through heels"),
    };
    let mut config = ExerciseConfig::new(
        "squat",
        vec![
            MeasureSpec::angle("left_knee", LeftHip, LeftKnee, LeftAnkle),
            MeasureSpec::angle("right_knee", RightHip, RightKnee, RightAnkle),
            MeasureSpec::mean("knee", &["left_knee", "right_knee"]),
            // 画像座標は下向きが正: 腰が膝より下なら負
            MeasureSpec::with_kind(
                "hip_drop",
                MeasureKind::VerticalOffset {
                    a: mid(LeftHip, RightHip),
                    b: mid(LeftKnee, RightKnee),
                },
            ),
            span("knee_width", LeftKnee, RightKnee),
            span("ankle_width", LeftAnkle, RightAnkle),
            span("lean", mid(LeftShoulder, RightShoulder), mid(LeftHip, RightHip)),
            span("shin_lean", mid(LeftAnkle, RightAnkle), mid(LeftKnee, RightKnee)),
        ],
        TrackingMode::Bands(tracking),
    );
    config.display_name = "Squat".to_string();
    config.rules = vec![
        FormRule::RangeOfMotion(RangeOfMotionRule {
            id: "depth".to_string(),
            measure: "hip_drop".to_string(),
            direction: ActiveWhen::Below,
            excellent: -0.05,
            excellent_bonus: 5.0,
            excellent_message: s("Excellent depth! 🎯"),
            good: -0.02,
            good_message: s("Good depth! 👍"),
            shallow: Some(0.05),
            shallow_penalty: 20.0,
            shallow_message: s("Go deeper - hips should go below knees"),
            when_stage: s("down"),
            smoothed: false,
        }),
        FormRule::Alignment(AlignmentRule {
            id: "knee_tracking".to_string(),
            subject: "knee_width".to_string(),
            reference: "ankle_width".to_string(),
            min_ratio: 0.8,
            max_ratio: 1.3,
            below_penalty: 15.0,
            below_message: s("Keep knees aligned with toes"),
            above_penalty: 5.0,
            above_message: s("Knees slightly too wide"),
            ok_message: s("Good knee alignment! 👌"),
            smoothed: false,
        }),
        FormRule::Posture(PostureRule {
            ok_message: s("Good posture! 💪"),
            ..at_most("back", "lean", 0.1, 10.0, "Keep chest up and back straight")
        }),
        FormRule::Symmetry(SymmetryRule {
            id: "balance".to_string(),
            left: "left_knee".to_string(),
            right: "right_knee".to_string(),
            max_difference: 20.0,
            penalty: 8.0,
            message: "Keep body balanced and symmetric".to_string(),
            ok_message: s("Good leg symmetry! 👌"),
            smoothed: false,
        }),
        FormRule::Posture(PostureRule {
            when_stage: s("down"),
            ..at_most("shins", "shin_lean", 0.05, 5.0, "Try to keep shins more vertical")
        }),
    ];
    config.info = ExerciseInfo {
        description: "A fundamental lower body exercise that targets quadriceps, hamstrings, and glutes".to_string(),
        instructions: strings(&[
            "Stand with feet shoulder-width apart",
            "Lower your body by bending knees and hips",
            "Keep your chest up and back straight",
            "Lower until thighs are parallel to ground",
            "Push through heels to return to starting position",
        ]),
        form_checks: strings(&[
            "Keep knees aligned with toes",
            "Don't let knees cave inward",
            "Maintain neutral spine",
            "Control the descent",
        ]),
        default_reps: Some(15),
        default_sets: Some(3),
        difficulty: s("beginner"),
    };
    config
}

fn push_up() -> ExerciseConfig {
    let mut config = ExerciseConfig::new(
        "push_up",
        vec![
            MeasureSpec::angle("left_elbow", LeftShoulder, LeftElbow, LeftWrist),
            MeasureSpec::angle("right_elbow", RightShoulder, RightElbow, RightWrist),
            MeasureSpec::mean("elbow", &["left_elbow", "right_elbow"]),
            MeasureSpec::angle(
                "body_line",
                mid(LeftShoulder, RightShoulder),
                mid(LeftHip, RightHip),
                mid(LeftAnkle, RightAnkle),
            ),
            gap("elbow_level", LeftElbow, RightElbow),
        ],
        TrackingMode::Bands(band("elbow", "up", "down", ActiveWhen::Below, 90.0, 160.0)),
    );
    config.display_name = "Push Up".to_string();
    config.min_visibility = 0.6;
    config.rules = vec![
        FormRule::Posture(at_most("even_elbows", "elbow_level", 0.1, 10.0, "Keep elbows even")),
        FormRule::RangeOfMotion(RangeOfMotionRule {
            id: "depth".to_string(),
            measure: "elbow".to_string(),
            direction: ActiveWhen::Below,
            excellent: 80.0,
            excellent_bonus: 0.0,
            excellent_message: s("Good range of motion!"),
            good: 90.0,
            good_message: None,
            shallow: None,
            shallow_penalty: 15.0,
            shallow_message: s("Go lower"),
            when_stage: s("down"),
            smoothed: true,
        }),
        FormRule::Posture(PostureRule {
            id: "hips".to_string(),
            measure: "body_line".to_string(),
            min: Some(160.0),
            max: None,
            below_penalty: 10.0,
            below_message: s("Don't let hips sag"),
            above_penalty: 0.0,
            above_message: None,
            ok_message: None,
            when_stage: None,
            smoothed: false,
        }),
    ];
    config.info = ExerciseInfo {
        description: "Upper body exercise targeting chest, shoulders, and triceps".to_string(),
        instructions: strings(&[
            "Start in plank position with hands shoulder-width apart",
            "Lower body until chest nearly touches ground",
            "Keep body in straight line from head to heels",
            "Push back up to starting position",
        ]),
        form_checks: strings(&[
            "Keep core engaged",
            "Don't let hips sag",
            "Full range of motion",
            "Control both up and down phases",
        ]),
        default_reps: Some(10),
        default_sets: Some(3),
        difficulty: s("beginner"),
    };
    config
}

fn hammer_curl() -> ExerciseConfig {
    let mut config = ExerciseConfig::new(
        "hammer_curl",
        vec![
            MeasureSpec::angle("left_elbow", LeftShoulder, LeftElbow, LeftWrist),
            MeasureSpec::angle("right_elbow", RightShoulder, RightElbow, RightWrist),
            MeasureSpec::mean("curl", &["left_elbow", "right_elbow"]),
            MeasureSpec::angle("left_upper_arm", LeftHip, LeftShoulder, LeftElbow),
            MeasureSpec::angle("right_upper_arm", RightHip, RightShoulder, RightElbow),
            MeasureSpec::mean("upper_arm", &["left_upper_arm", "right_upper_arm"]),
        ],
        TrackingMode::Bands(band("curl", "down", "up", ActiveWhen::Below, 50.0, 140.0)),
    );
    config.display_name = "Hammer Curl".to_string();
    config.debounce_secs = 0.8;
    config.rules = vec![
        FormRule::Posture(at_most("elbows_in", "upper_arm", 35.0, 10.0, "Keep elbows close to your sides")),
        FormRule::RangeOfMotion(RangeOfMotionRule {
            id: "full_curl".to_string(),
            measure: "curl".to_string(),
            direction: ActiveWhen::Below,
            excellent: 40.0,
            excellent_bonus: 0.0,
            excellent_message: s("Full curl!"),
            good: 50.0,
            good_message: None,
            shallow: None,
            shallow_penalty: 0.0,
            shallow_message: None,
            when_stage: s("up"),
            smoothed: true,
        }),
        FormRule::Symmetry(SymmetryRule {
            id: "even_arms".to_string(),
            left: "left_elbow".to_string(),
            right: "right_elbow".to_string(),
            max_difference: 25.0,
            penalty: 5.0,
            message: "Curl both arms evenly".to_string(),
            ok_message: None,
            smoothed: false,
        }),
    ];
    config.info = ExerciseInfo {
        description: "Bicep exercise using neutral grip to target biceps and forearms".to_string(),
        instructions: strings(&[
            "Hold dumbbells with neutral grip (palms facing each other)",
            "Keep elbows close to your sides",
            "Curl weights up by flexing biceps",
            "Lower with control to starting position",
        ]),
        form_checks: strings(&[
            "Don't swing the weights",
            "Keep elbows stationary",
            "Control the negative",
            "Full range of motion",
        ]),
        default_reps: Some(12),
        default_sets: Some(3),
        difficulty: s("beginner"),
    };
    config
}

fn assisted_leg_lift() -> ExerciseConfig {
    let mut config = ExerciseConfig::new(
        "assisted_leg_lift",
        vec![
            MeasureSpec::angle("knee", RightHip, RightKnee, RightAnkle),
            gap("hip_level", LeftHip, RightHip),
        ],
        TrackingMode::Bands(band("knee", "lowered", "raised", ActiveWhen::Below, 120.0, 160.0)),
    );
    config.display_name = "Assisted Leg Lifts".to_string();
    config.coordinates = CoordinateSpace::Pixel { width: 640, height: 480 };
    config.rules = vec![FormRule::Posture(at_most(
        "level_hips",
        "hip_level",
        30.0,
        5.0,
        "Keep hips level on the mat",
    ))];
    config.info = ExerciseInfo {
        description: "Leg lifts performed with a caregiver or strap for support".to_string(),
        instructions: strings(&[
            "Lie on your back with the strap around your right foot",
            "Raise the leg with assistance, bending at the knee",
            "Lower slowly until the leg is nearly straight",
        ]),
        default_reps: Some(10),
        difficulty: s("beginner"),
        ..ExerciseInfo::default()
    };
    config
}

fn calf_stretch() -> ExerciseConfig {
    let mut config = ExerciseConfig::new(
        "calf_stretch",
        vec![MeasureSpec::angle("leg", RightHip, RightKnee, RightAnkle)],
        TrackingMode::Hold(HoldConfig {
            signal: "leg".to_string(),
            min: 150.0,
            max: 180.0,
            margin: 5.0,
            min_hold_secs: 20.0,
            idle_stage: "initial".to_string(),
            holding_stage: "holding".to_string(),
            complete_stage: "complete".to_string(),
            hold_cue: s("Hold the stretch"),
            outside_cue: s("Straighten your back leg"),
        }),
    );
    config.display_name = "Calf Stretches".to_string();
    config.coordinates = CoordinateSpace::Pixel { width: 640, height: 480 };
    config.info = ExerciseInfo {
        description: "Wall calf stretch held for 20-30 seconds".to_string(),
        instructions: strings(&[
            "Place both hands on a wall",
            "Step your right leg back and keep it straight",
            "Press the heel into the floor and hold",
        ]),
        default_reps: Some(3),
        difficulty: s("beginner"),
        ..ExerciseInfo::default()
    };
    config
}

fn breathing_exercise() -> ExerciseConfig {
    let mut config = ExerciseConfig::new(
        "breathing_exercise",
        vec![gap("shoulder_level", LeftShoulder, RightShoulder)],
        TrackingMode::Cycle(CycleConfig {
            phases: vec![
                PhaseSpec::new("inhale", 4.0).with_cue("Breathe in slowly through your nose"),
                PhaseSpec::new("hold", 4.0).with_cue("Hold your breath"),
                PhaseSpec::new("exhale", 4.0).with_cue("Exhale slowly through your mouth"),
            ],
        }),
    );
    config.display_name = "Breathing Exercise".to_string();
    config.debounce_secs = 0.0;
    config.rules = vec![FormRule::Posture(at_most(
        "relaxed_shoulders",
        "shoulder_level",
        0.05,
        5.0,
        "Keep shoulders relaxed and level",
    ))];
    config.info = ExerciseInfo {
        description: "Mindful breathing techniques for relaxation and stress relief".to_string(),
        instructions: strings(&[
            "Sit or lie in comfortable position",
            "Place one hand on chest, one on belly",
            "Breathe in slowly through nose",
            "Exhale slowly through mouth",
        ]),
        form_checks: strings(&[
            "Focus on belly breathing",
            "Keep shoulders relaxed",
            "Count breaths if helpful",
            "Practice regularly",
        ]),
        default_reps: Some(10),
        default_sets: Some(1),
        difficulty: s("beginner"),
    };
    config
}

fn seated_marching() -> ExerciseConfig {
    let limb = |name: &str, signal: &str, stage: &str| LimbConfig {
        name: name.to_string(),
        signal: signal.to_string(),
        active_stage: stage.to_string(),
        active_when: ActiveWhen::Below,
        enter: 90.0,
        exit: 150.0,
    };
    let mut config = ExerciseConfig::new(
        "seated_marching",
        vec![
            MeasureSpec::angle("left_knee", LeftHip, LeftKnee, LeftAnkle),
            MeasureSpec::angle("right_knee", RightHip, RightKnee, RightAnkle),
            span("trunk_lean", mid(LeftShoulder, RightShoulder), mid(LeftHip, RightHip)),
        ],
        TrackingMode::Bilateral(BilateralConfig {
            limbs: vec![
                limb("left", "left_knee", "left_knee_raised"),
                limb("right", "right_knee", "right_knee_raised"),
            ],
            neutral_stage: "neutral".to_string(),
            count: CountRule::Alternating,
        }),
    );
    config.display_name = "Seated Marching".to_string();
    config.rules = vec![FormRule::Posture(at_most("sit_tall", "trunk_lean", 0.1, 5.0, "Sit tall"))];
    config.info = ExerciseInfo {
        description: "Seated marching by alternating knee lifts".to_string(),
        instructions: strings(&[
            "Sit upright near the front of the chair",
            "Lift one knee, then lower it",
            "Alternate legs at a steady pace",
        ]),
        default_reps: Some(20),
        difficulty: s("beginner"),
        ..ExerciseInfo::default()
    };
    config
}

fn single_leg_stand() -> ExerciseConfig {
    let mut config = ExerciseConfig::new(
        "single_leg_stand",
        vec![
            gap("foot_lift", LeftAnkle, RightAnkle),
            gap("hip_level", LeftHip, RightHip),
        ],
        TrackingMode::Hold(HoldConfig {
            signal: "foot_lift".to_string(),
            min: 0.05,
            max: 1.0,
            margin: 0.01,
            min_hold_secs: 10.0,
            idle_stage: "initial".to_string(),
            holding_stage: "standing".to_string(),
            complete_stage: "completed".to_string(),
            hold_cue: s("Keep balancing"),
            outside_cue: s("Lift one foot off the floor"),
        }),
    );
    config.display_name = "Single Leg Stand".to_string();
    config.smoothing = SmoothingConfig::moving_average(3);
    config.rules = vec![FormRule::Posture(at_most(
        "level_hips",
        "hip_level",
        0.05,
        5.0,
        "Keep your hips level",
    ))];
    config.info = ExerciseInfo {
        description: "Balance on one leg next to a wall or chair for support".to_string(),
        instructions: strings(&[
            "Stand beside a support surface",
            "Lift one foot off the floor",
            "Hold for 10 to 30 seconds",
        ]),
        default_reps: Some(3),
        difficulty: s("beginner"),
        ..ExerciseInfo::default()
    };
    config
}
