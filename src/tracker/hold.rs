use serde::{Deserialize, Serialize};

use crate::config::SmoothingConfig;
use crate::error::{ConfigError, Result};
use crate::geometry::Measurements;
use crate::tracker::debounce::Debounce;
use crate::tracker::smooth::SignalFilter;
use crate::tracker::Step;

/// Duration-gated stage: the signal must stay inside `[min, max]` for `min_hold_secs`.
///
/// Once holding, the band is widened by `margin` on both sides so jitter at the edge does not
/// reset the timer. Leaving the band resets to `idle_stage`; there is no partial credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldConfig {
    pub signal: String,
    pub min: f32,
    pub max: f32,
    #[serde(default)]
    pub margin: f32,
    pub min_hold_secs: f64,
    #[serde(default = "default_idle_stage")]
    pub idle_stage: String,
    #[serde(default = "default_holding_stage")]
    pub holding_stage: String,
    #[serde(default = "default_complete_stage")]
    pub complete_stage: String,
    /// Shown while holding, followed by the remaining time.
    #[serde(default)]
    pub hold_cue: Option<String>,
    /// Shown while outside the band.
    #[serde(default)]
    pub outside_cue: Option<String>,
}

fn default_idle_stage() -> String { "initial".to_string() }
fn default_holding_stage() -> String { "hold".to_string() }
fn default_complete_stage() -> String { "complete".to_string() }

impl HoldConfig {
    pub fn validate(&self, exercise: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.margin.is_finite()) {
            return Err(ConfigError::thresholds(exercise, "hold band must be finite"));
        }
        if self.min > self.max {
            return Err(ConfigError::thresholds(
                exercise,
                format!("hold band min {} above max {}", self.min, self.max),
            ));
        }
        if self.margin < 0.0 {
            return Err(ConfigError::thresholds(exercise, "hold margin must not be negative"));
        }
        if !(self.min_hold_secs.is_finite() && self.min_hold_secs > 0.0) {
            return Err(ConfigError::timing(exercise, "min_hold_secs must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HoldState {
    Idle,
    Holding { since: f64 },
    Complete,
}

#[derive(Debug, Clone)]
pub struct HoldMachine {
    config: HoldConfig,
    filter: SignalFilter,
    state: HoldState,
}

impl HoldMachine {
    pub fn new(config: &HoldConfig, smoothing: &SmoothingConfig) -> Self {
        Self {
            config: config.clone(),
            filter: SignalFilter::from_config(smoothing),
            state: HoldState::Idle,
        }
    }

    pub fn stage(&self) -> &str {
        match self.state {
            HoldState::Idle => &self.config.idle_stage,
            HoldState::Holding { .. } => &self.config.holding_stage,
            HoldState::Complete => &self.config.complete_stage,
        }
    }

    /// Seconds held so far in the current hold.
    pub fn held_for(&self, now: f64) -> Option<f64> {
        match self.state {
            HoldState::Holding { since } => Some((now - since).max(0.0)),
            _ => None,
        }
    }

    fn in_band(&self, value: f32) -> bool {
        let margin = match self.state {
            HoldState::Idle => 0.0,
            _ => self.config.margin,
        };
        value >= self.config.min - margin && value <= self.config.max + margin
    }

    pub fn update(
        &mut self,
        measurements: &Measurements,
        timestamp: f64,
        debounce: &mut Debounce,
        smoothed: &mut Measurements,
    ) -> Step {
        let Some(raw) = measurements.get(&self.config.signal) else {
            return Step::hold(self.stage());
        };
        let value = self.filter.apply(raw, timestamp);
        smoothed.insert(self.config.signal.clone(), value);

        if !self.in_band(value) {
            self.state = HoldState::Idle;
            return Step {
                stage: self.stage().to_string(),
                rep: false,
                cue: self.config.outside_cue.clone(),
            };
        }

        let mut rep = false;
        match self.state {
            HoldState::Idle => {
                self.state = HoldState::Holding { since: timestamp };
            }
            HoldState::Holding { since } => {
                if timestamp - since >= self.config.min_hold_secs {
                    rep = debounce.try_fire(timestamp);
                    self.state = HoldState::Complete;
                }
            }
            HoldState::Complete => {}
        }

        let cue = match (self.state, &self.config.hold_cue) {
            (HoldState::Holding { since }, Some(text)) => {
                let remaining = (self.config.min_hold_secs - (timestamp - since)).max(0.0);
                Some(format!("{} ({:.1}s left)", text, remaining))
            }
            _ => None,
        };

        Step {
            stage: self.stage().to_string(),
            rep,
            cue,
        }
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.state = HoldState::Idle;
    }
}
