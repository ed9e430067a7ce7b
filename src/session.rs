use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::exercise::ExerciseConfig;
use crate::geometry::Measurements;
use crate::pose::{Landmark, LandmarkIndex, PoseFrame};
use crate::rules::{self, RuleContext};
use crate::tracker::StageMachine;

pub const NO_DETECTION_WARNING: &str = "Ensure your full body is visible";
pub const OUT_OF_ORDER_WARNING: &str = "Frame out of order – ignored";

/// Per-frame output (camelCase on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub keypoints: Vec<Landmark>,
    pub confidence: f32,
    pub form_score: f32,
    pub current_rep: u32,
    pub stage: String,
    pub warnings: Vec<String>,
    /// このフレームでレップが加算されたか
    #[serde(skip)]
    pub rep_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub exercise_type: String,
    pub stage: String,
    pub previous_stage: Option<String>,
    pub rep_count: u32,
    pub frames_seen: u64,
    pub frames_detected: u64,
    pub stage_entered_at: Option<f64>,
    pub last_rep_at: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_reps: u32,
    pub exercise_type: String,
    pub duration_seconds: f64,
    pub average_form_score: f32,
    pub performance_grade: String,
    pub improvement_areas: Vec<String>,
    pub next_session_recommendations: Vec<String>,
    /// 0.5 kcal/秒の概算
    pub calories_burned: f64,
}

/// Letter grade for an average form score.
pub fn performance_grade(average: f32) -> &'static str {
    if average >= 90.0 {
        "A"
    } else if average >= 80.0 {
        "B"
    } else if average >= 70.0 {
        "C"
    } else {
        "D"
    }
}

fn improvement_areas(average: f32) -> Vec<String> {
    if average < 85.0 {
        vec![
            "Focus on form consistency".to_string(),
            "Maintain steady pace".to_string(),
        ]
    } else {
        vec!["Great form! Keep it up!".to_string()]
    }
}

/// One tracked session: stage machine, counters and score statistics for a single exercise.
///
/// Frames must arrive in timestamp order. A frame older than the last accepted one is answered
/// with a warning and otherwise ignored.
#[derive(Debug, Clone)]
pub struct Session {
    config: Arc<ExerciseConfig>,
    required: Vec<LandmarkIndex>,
    machine: StageMachine,
    rep_count: u32,
    frames_seen: u64,
    frames_detected: u64,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
    score_sum: f64,
}

impl Session {
    pub fn new(config: Arc<ExerciseConfig>) -> Result<Self> {
        config.validate()?;
        let machine = StageMachine::new(&config.tracking, &config.smoothing, config.debounce_secs);
        let required = config.required_landmarks();
        log::info!(
            "session started: {} (required landmarks: {})",
            config.exercise_type,
            required.len()
        );
        Ok(Self {
            config,
            required,
            machine,
            rep_count: 0,
            frames_seen: 0,
            frames_detected: 0,
            first_timestamp: None,
            last_timestamp: None,
            score_sum: 0.0,
        })
    }

    pub fn config(&self) -> &Arc<ExerciseConfig> {
        &self.config
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    pub fn ingest_frame(&mut self, frame: &PoseFrame) -> FrameResult {
        let t = frame.timestamp;
        let in_order = t.is_finite() && self.last_timestamp.map_or(true, |last| t >= last);
        if !in_order {
            log::warn!(
                "{}: frame at {:.3}s is older than {:.3}s, ignored",
                self.config.exercise_type,
                t,
                self.last_timestamp.unwrap_or(f64::NAN)
            );
            return self.rejected(frame, OUT_OF_ORDER_WARNING);
        }

        self.frames_seen += 1;
        self.first_timestamp.get_or_insert(t);
        self.last_timestamp = Some(t);

        if !self.detected(frame) {
            return FrameResult {
                keypoints: frame.named_landmarks(),
                confidence: 0.0,
                form_score: 0.0,
                current_rep: self.rep_count,
                stage: self.config.no_detection_stage.clone(),
                warnings: vec![NO_DETECTION_WARNING.to_string()],
                rep_completed: false,
            };
        }
        self.frames_detected += 1;

        let config = &self.config;
        let raw = Measurements::compute(&config.measures, frame, config.min_visibility, config.projection());
        let (step, smoothed) = self.machine.update(&raw, t);
        if step.rep {
            self.rep_count += 1;
        }

        let evaluation = rules::evaluate(
            &config.rules,
            &config.headlines,
            &RuleContext {
                raw: &raw,
                smoothed: &smoothed,
                stage: &step.stage,
            },
        );
        self.score_sum += evaluation.score as f64;

        let mut warnings = evaluation.warnings;
        warnings.extend(step.cue);
        if step.rep {
            warnings.push(format!("Rep {} completed!", self.rep_count));
        }

        FrameResult {
            keypoints: frame.named_landmarks(),
            confidence: self.confidence(frame),
            form_score: evaluation.score,
            current_rep: self.rep_count,
            stage: step.stage,
            warnings,
            rep_completed: step.rep,
        }
    }

    fn rejected(&self, frame: &PoseFrame, warning: &str) -> FrameResult {
        FrameResult {
            keypoints: frame.named_landmarks(),
            confidence: 0.0,
            form_score: 0.0,
            current_rep: self.rep_count,
            stage: self.machine.stage().to_string(),
            warnings: vec![warning.to_string()],
            rep_completed: false,
        }
    }

    /// 追跡信号に必要なランドマークがすべて見えているか
    fn detected(&self, frame: &PoseFrame) -> bool {
        !frame.is_empty()
            && self
                .required
                .iter()
                .all(|&index| frame.visible(index, self.config.min_visibility).is_some())
    }

    fn confidence(&self, frame: &PoseFrame) -> f32 {
        if self.required.is_empty() {
            if frame.landmarks.is_empty() {
                return 0.0;
            }
            let sum: f32 = frame
                .landmarks
                .iter()
                .map(|lm| lm.visibility.clamp(0.0, 1.0))
                .sum();
            return sum / frame.landmarks.len() as f32;
        }
        frame.average_visibility(&self.required)
    }

    pub fn reset(&mut self) {
        log::info!("session reset: {}", self.config.exercise_type);
        self.machine.reset();
        self.rep_count = 0;
        self.frames_seen = 0;
        self.frames_detected = 0;
        self.first_timestamp = None;
        self.last_timestamp = None;
        self.score_sum = 0.0;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            exercise_type: self.config.exercise_type.clone(),
            stage: self.machine.stage().to_string(),
            previous_stage: self.machine.previous_stage().map(str::to_string),
            rep_count: self.rep_count,
            frames_seen: self.frames_seen,
            frames_detected: self.frames_detected,
            stage_entered_at: self.machine.stage_entered_at(),
            last_rep_at: self.machine.last_rep_at(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let duration = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        };
        let average = if self.frames_detected == 0 {
            0.0
        } else {
            let avg = self.score_sum / self.frames_detected as f64;
            ((avg * 100.0).round() / 100.0) as f32
        };
        SessionSummary {
            total_reps: self.rep_count,
            exercise_type: self.config.exercise_type.clone(),
            duration_seconds: duration,
            average_form_score: average,
            performance_grade: performance_grade(average).to_string(),
            improvement_areas: improvement_areas(average),
            next_session_recommendations: vec![
                format!("Try increasing reps to {}", self.rep_count + 2),
                "Focus on controlled movements".to_string(),
            ],
            calories_burned: (duration * 0.5 * 10.0).round() / 10.0,
        }
    }
}
