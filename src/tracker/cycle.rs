use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::tracker::debounce::Debounce;
use crate::tracker::Step;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: String,
    pub duration_secs: f64,
    /// Shown for the whole phase, e.g. "Breathe in slowly".
    #[serde(default)]
    pub cue: Option<String>,
}

impl PhaseSpec {
    pub fn new(name: &str, duration_secs: f64) -> Self {
        Self {
            name: name.to_string(),
            duration_secs,
            cue: None,
        }
    }

    pub fn with_cue(mut self, cue: &str) -> Self {
        self.cue = Some(cue.to_string());
        self
    }
}

/// Time-driven phase cycle (breathing and similar paced exercises).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleConfig {
    pub phases: Vec<PhaseSpec>,
}

impl CycleConfig {
    pub fn validate(&self, exercise: &str) -> Result<()> {
        if self.phases.is_empty() {
            return Err(ConfigError::EmptyPhases(exercise.to_string()));
        }
        for phase in &self.phases {
            if !(phase.duration_secs.is_finite() && phase.duration_secs > 0.0) {
                return Err(ConfigError::timing(
                    exercise,
                    format!("phase '{}' needs a positive duration", phase.name),
                ));
            }
        }
        Ok(())
    }
}

/// フェーズ遷移はフレームのタイムスタンプのみで駆動される
#[derive(Debug, Clone)]
pub struct CycleMachine {
    config: CycleConfig,
    phase: usize,
    phase_started: Option<f64>,
}

impl CycleMachine {
    pub fn new(config: &CycleConfig) -> Self {
        Self {
            config: config.clone(),
            phase: 0,
            phase_started: None,
        }
    }

    pub fn stage(&self) -> &str {
        self.config
            .phases
            .get(self.phase)
            .map(|p| p.name.as_str())
            .unwrap_or_default()
    }

    pub fn phase_index(&self) -> usize {
        self.phase
    }

    pub fn update(&mut self, timestamp: f64, debounce: &mut Debounce) -> Step {
        let Some(started) = self.phase_started else {
            self.phase_started = Some(timestamp);
            return self.step(false);
        };

        let Some(current) = self.config.phases.get(self.phase) else {
            return Step::hold(self.stage());
        };

        let mut rep = false;
        if timestamp - started >= current.duration_secs {
            self.phase = (self.phase + 1) % self.config.phases.len();
            self.phase_started = Some(timestamp);
            if self.phase == 0 {
                rep = debounce.try_fire(timestamp);
            }
        }
        self.step(rep)
    }

    fn step(&self, rep: bool) -> Step {
        let cue = self.config.phases.get(self.phase).and_then(|p| p.cue.clone());
        Step {
            stage: self.stage().to_string(),
            rep,
            cue,
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0;
        self.phase_started = None;
    }
}
