//! Configuration errors.
//!
//! Per-frame processing never fails; everything here is raised while a catalog or an exercise
//! configuration is being loaded or validated.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown exercise type: {0}")]
    UnknownExercise(String),

    #[error("exercise {exercise}: unknown measure `{measure}`")]
    UnknownMeasure { exercise: String, measure: String },

    #[error("exercise {exercise}: measure `{measure}` defined twice")]
    DuplicateMeasure { exercise: String, measure: String },

    #[error("exercise {exercise}: invalid thresholds: {reason}")]
    InvalidThresholds { exercise: String, reason: String },

    #[error("exercise {exercise}: invalid timing: {reason}")]
    InvalidTiming { exercise: String, reason: String },

    #[error("exercise {exercise}: invalid smoothing: {reason}")]
    InvalidSmoothing { exercise: String, reason: String },

    #[error("exercise {0}: cycle needs at least one phase")]
    EmptyPhases(String),

    #[error("exercise {0}: bilateral tracking needs at least two limbs")]
    EmptyLimbs(String),

    #[error("exercise {0}: defined twice in catalog")]
    DuplicateExercise(String),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn thresholds(exercise: &str, reason: impl Into<String>) -> Self {
        Self::InvalidThresholds {
            exercise: exercise.to_string(),
            reason: reason.into(),
        }
    }

    pub fn timing(exercise: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTiming {
            exercise: exercise.to_string(),
            reason: reason.into(),
        }
    }

    pub fn smoothing(exercise: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSmoothing {
            exercise: exercise.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unknown_measure(exercise: &str, measure: &str) -> Self {
        Self::UnknownMeasure {
            exercise: exercise.to_string(),
            measure: measure.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
