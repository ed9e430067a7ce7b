use serde::{Deserialize, Serialize};

use crate::config::SmoothingConfig;
use crate::error::Result;
use crate::geometry::Measurements;
use crate::tracker::band::{BandConfig, BandMachine};
use crate::tracker::bilateral::{BilateralConfig, BilateralMachine};
use crate::tracker::cycle::{CycleConfig, CycleMachine};
use crate::tracker::debounce::Debounce;
use crate::tracker::hold::{HoldConfig, HoldMachine};
use crate::tracker::Step;

/// Stage machine configuration, one variant per transition mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrackingMode {
    Bands(BandConfig),
    Hold(HoldConfig),
    Cycle(CycleConfig),
    Bilateral(BilateralConfig),
}

impl TrackingMode {
    /// Measures the machine reads. Empty for cycles.
    pub fn signals(&self) -> Vec<&str> {
        match self {
            TrackingMode::Bands(b) => vec![b.signal.as_str()],
            TrackingMode::Hold(h) => vec![h.signal.as_str()],
            TrackingMode::Cycle(_) => Vec::new(),
            TrackingMode::Bilateral(b) => b.limbs.iter().map(|l| l.signal.as_str()).collect(),
        }
    }

    pub fn initial_stage(&self) -> &str {
        match self {
            TrackingMode::Bands(b) => &b.rest_stage,
            TrackingMode::Hold(h) => &h.idle_stage,
            TrackingMode::Cycle(c) => c.phases.first().map(|p| p.name.as_str()).unwrap_or_default(),
            TrackingMode::Bilateral(b) => &b.neutral_stage,
        }
    }

    pub fn validate(&self, exercise: &str) -> Result<()> {
        match self {
            TrackingMode::Bands(b) => b.validate(exercise),
            TrackingMode::Hold(h) => h.validate(exercise),
            TrackingMode::Cycle(c) => c.validate(exercise),
            TrackingMode::Bilateral(b) => b.validate(exercise),
        }
    }
}

#[derive(Debug, Clone)]
enum ModeState {
    Bands(BandMachine),
    Hold(HoldMachine),
    Cycle(CycleMachine),
    Bilateral(BilateralMachine),
}

impl ModeState {
    fn new(mode: &TrackingMode, smoothing: &SmoothingConfig) -> Self {
        match mode {
            TrackingMode::Bands(b) => ModeState::Bands(BandMachine::new(b, smoothing)),
            TrackingMode::Hold(h) => ModeState::Hold(HoldMachine::new(h, smoothing)),
            TrackingMode::Cycle(c) => ModeState::Cycle(CycleMachine::new(c)),
            TrackingMode::Bilateral(b) => ModeState::Bilateral(BilateralMachine::new(b, smoothing)),
        }
    }
}

/// Stage tracking for one session: mode state, shared debounce, stage bookkeeping.
#[derive(Debug, Clone)]
pub struct StageMachine {
    mode: TrackingMode,
    smoothing: SmoothingConfig,
    state: ModeState,
    debounce: Debounce,
    stage: String,
    previous_stage: Option<String>,
    stage_entered_at: Option<f64>,
}

impl StageMachine {
    pub fn new(mode: &TrackingMode, smoothing: &SmoothingConfig, debounce_secs: f64) -> Self {
        Self {
            mode: mode.clone(),
            smoothing: smoothing.clone(),
            state: ModeState::new(mode, smoothing),
            debounce: Debounce::new(debounce_secs),
            stage: mode.initial_stage().to_string(),
            previous_stage: None,
            stage_entered_at: None,
        }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn previous_stage(&self) -> Option<&str> {
        self.previous_stage.as_deref()
    }

    pub fn stage_entered_at(&self) -> Option<f64> {
        self.stage_entered_at
    }

    pub fn last_rep_at(&self) -> Option<f64> {
        self.debounce.last()
    }

    /// Advances the machine by one frame; returns the step and the smoothed signal values.
    pub fn update(&mut self, measurements: &Measurements, timestamp: f64) -> (Step, Measurements) {
        let mut smoothed = Measurements::new();
        let debounce = &mut self.debounce;
        let step = match &mut self.state {
            ModeState::Bands(m) => m.update(measurements, timestamp, debounce, &mut smoothed),
            ModeState::Hold(m) => m.update(measurements, timestamp, debounce, &mut smoothed),
            ModeState::Cycle(m) => m.update(timestamp, debounce),
            ModeState::Bilateral(m) => m.update(measurements, timestamp, debounce, &mut smoothed),
        };

        if self.stage_entered_at.is_none() {
            self.stage_entered_at = Some(timestamp);
        }
        if step.stage != self.stage {
            log::debug!("stage {} -> {} at {:.3}s", self.stage, step.stage, timestamp);
            let previous = std::mem::replace(&mut self.stage, step.stage.clone());
            self.previous_stage = Some(previous);
            self.stage_entered_at = Some(timestamp);
        }
        if step.rep {
            log::debug!("rep counted at {:.3}s (stage {})", timestamp, step.stage);
        }

        (step, smoothed)
    }

    pub fn reset(&mut self) {
        self.state = ModeState::new(&self.mode, &self.smoothing);
        self.debounce.reset();
        self.stage = self.mode.initial_stage().to_string();
        self.previous_stage = None;
        self.stage_entered_at = None;
    }
}
