use serde::{Deserialize, Serialize};

use crate::config::SmoothingConfig;
use crate::error::{ConfigError, Result};
use crate::geometry::Measurements;
use crate::tracker::debounce::Debounce;
use crate::tracker::smooth::SignalFilter;
use crate::tracker::Step;

/// Which side of the band counts as the "active" (working) position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveWhen {
    /// e.g. knee angle during a squat: the active stage is a small angle.
    Below,
    /// e.g. shoulder angle during an arm raise.
    Above,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Active,
    Gap,
    Rest,
}

/// Latch transition produced by one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchEvent {
    None,
    Entered,
    Returned,
}

/// Two-threshold latch.
///
/// Becomes active only past `enter`, becomes inactive only past `exit`; any value between the two
/// leaves the latch where it was.
#[derive(Debug, Clone)]
pub struct Latch {
    active_when: ActiveWhen,
    enter: f32,
    exit: f32,
    active: bool,
}

impl Latch {
    pub fn new(active_when: ActiveWhen, enter: f32, exit: f32) -> Self {
        Self {
            active_when,
            enter,
            exit,
            active: false,
        }
    }

    fn zone(&self, value: f32) -> Zone {
        match self.active_when {
            ActiveWhen::Below if value < self.enter => Zone::Active,
            ActiveWhen::Below if value > self.exit => Zone::Rest,
            ActiveWhen::Above if value > self.enter => Zone::Active,
            ActiveWhen::Above if value < self.exit => Zone::Rest,
            _ => Zone::Gap,
        }
    }

    pub fn update(&mut self, value: f32) -> LatchEvent {
        match (self.active, self.zone(value)) {
            (false, Zone::Active) => {
                self.active = true;
                LatchEvent::Entered
            }
            (true, Zone::Rest) => {
                self.active = false;
                LatchEvent::Returned
            }
            _ => LatchEvent::None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True while the value sits between the two thresholds.
    pub fn in_gap(&self, value: f32) -> bool {
        self.zone(value) == Zone::Gap
    }

    pub fn reset(&mut self) {
        self.active = false;
    }
}

/// Checks a hysteresis pair for a signal named `what`.
pub(crate) fn validate_band(
    exercise: &str,
    what: &str,
    active_when: ActiveWhen,
    enter: f32,
    exit: f32,
) -> Result<()> {
    if !(enter.is_finite() && exit.is_finite()) {
        return Err(ConfigError::thresholds(exercise, format!("{}: non-finite threshold", what)));
    }
    let ordered = match active_when {
        ActiveWhen::Below => enter < exit,
        ActiveWhen::Above => enter > exit,
    };
    if !ordered {
        return Err(ConfigError::thresholds(
            exercise,
            format!(
                "{}: enter {} and exit {} leave no hysteresis gap for active_when={:?}",
                what, enter, exit, active_when
            ),
        ));
    }
    Ok(())
}

/// Optional movement cues shown alongside the stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandCues {
    /// Shown while resting past the exit threshold.
    #[serde(default)]
    pub ready: Option<String>,
    /// Shown in the gap after leaving the rest stage.
    #[serde(default)]
    pub leaving_rest: Option<String>,
    /// Shown in the gap after leaving the active stage.
    #[serde(default)]
    pub leaving_active: Option<String>,
}

/// Rest ↔ active tracking of a single smoothed signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    pub signal: String,
    #[serde(default = "default_rest_stage")]
    pub rest_stage: String,
    #[serde(default = "default_active_stage")]
    pub active_stage: String,
    pub active_when: ActiveWhen,
    /// Threshold that must be crossed to enter the active stage.
    pub enter: f32,
    /// Threshold that must be crossed to return to the rest stage (and count a rep).
    pub exit: f32,
    #[serde(default)]
    pub cues: BandCues,
}

fn default_rest_stage() -> String { "up".to_string() }
fn default_active_stage() -> String { "down".to_string() }

impl BandConfig {
    pub fn validate(&self, exercise: &str) -> Result<()> {
        validate_band(exercise, &self.signal, self.active_when, self.enter, self.exit)
    }
}

#[derive(Debug, Clone)]
pub struct BandMachine {
    config: BandConfig,
    filter: SignalFilter,
    latch: Latch,
}

impl BandMachine {
    pub fn new(config: &BandConfig, smoothing: &SmoothingConfig) -> Self {
        Self {
            config: config.clone(),
            filter: SignalFilter::from_config(smoothing),
            latch: Latch::new(config.active_when, config.enter, config.exit),
        }
    }

    pub fn stage(&self) -> &str {
        if self.latch.is_active() {
            &self.config.active_stage
        } else {
            &self.config.rest_stage
        }
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

        let event = self.latch.update(value);
        let rep = event == LatchEvent::Returned && debounce.try_fire(timestamp);

        let cues = &self.config.cues;
        let cue = if self.latch.in_gap(value) {
            if self.latch.is_active() {
                cues.leaving_active.clone()
            } else {
                cues.leaving_rest.clone()
            }
        } else if !self.latch.is_active() && event == LatchEvent::None {
            cues.ready.clone()
        } else {
            None
        };

        Step {
            stage: self.stage().to_string(),
            rep,
            cue,
        }
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.latch.reset();
    }
}
