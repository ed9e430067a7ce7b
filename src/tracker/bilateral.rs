use serde::{Deserialize, Serialize};

use crate::config::SmoothingConfig;
use crate::error::{ConfigError, Result};
use crate::geometry::Measurements;
use crate::tracker::band::{validate_band, ActiveWhen, Latch, LatchEvent};
use crate::tracker::debounce::Debounce;
use crate::tracker::smooth::SignalFilter;
use crate::tracker::Step;

/// Cue emitted when more than one limb is active at once.
pub const ONE_SIDE_CUE: &str = "Move one side at a time";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimbConfig {
    pub name: String,
    pub signal: String,
    pub active_stage: String,
    pub active_when: ActiveWhen,
    pub enter: f32,
    pub exit: f32,
}

/// How limb returns turn into reps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountRule {
    /// Every credited return counts.
    EachLimb,
    /// One rep once every limb has a credited return since the last rep.
    #[default]
    Alternating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BilateralConfig {
    pub limbs: Vec<LimbConfig>,
    #[serde(default = "default_neutral_stage")]
    pub neutral_stage: String,
    #[serde(default)]
    pub count: CountRule,
}

fn default_neutral_stage() -> String { "neutral".to_string() }

impl BilateralConfig {
    pub fn validate(&self, exercise: &str) -> Result<()> {
        if self.limbs.len() < 2 {
            return Err(ConfigError::EmptyLimbs(exercise.to_string()));
        }
        for limb in &self.limbs {
            validate_band(exercise, &limb.name, limb.active_when, limb.enter, limb.exit)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LimbState {
    filter: SignalFilter,
    latch: Latch,
    /// Alternating: returned since the last counted rep.
    credited: bool,
}

/// 左右の肢を独立したラッチで追跡する
#[derive(Debug, Clone)]
pub struct BilateralMachine {
    config: BilateralConfig,
    limbs: Vec<LimbState>,
    /// Index of the limb whose active stage is reported.
    leading: Option<usize>,
}

impl BilateralMachine {
    pub fn new(config: &BilateralConfig, smoothing: &SmoothingConfig) -> Self {
        let limbs = config
            .limbs
            .iter()
            .map(|limb| LimbState {
                filter: SignalFilter::from_config(smoothing),
                latch: Latch::new(limb.active_when, limb.enter, limb.exit),
                credited: false,
            })
            .collect();
        Self {
            config: config.clone(),
            limbs,
            leading: None,
        }
    }

    pub fn stage(&self) -> &str {
        match self.leading.and_then(|i| self.config.limbs.get(i)) {
            Some(limb) => &limb.active_stage,
            None => &self.config.neutral_stage,
        }
    }

    pub fn active_limbs(&self) -> usize {
        self.limbs.iter().filter(|l| l.latch.is_active()).count()
    }

    pub fn update(
        &mut self,
        measurements: &Measurements,
        timestamp: f64,
        debounce: &mut Debounce,
        smoothed: &mut Measurements,
    ) -> Step {
        let mut returned = Vec::new();
        for (i, (limb, state)) in self.config.limbs.iter().zip(self.limbs.iter_mut()).enumerate() {
            let Some(raw) = measurements.get(&limb.signal) else {
                continue;
            };
            let value = state.filter.apply(raw, timestamp);
            smoothed.insert(limb.signal.clone(), value);
            if state.latch.update(value) == LatchEvent::Returned {
                returned.push(i);
            }
        }

        let active = self.active_limbs();
        // 他の肢が動いている間の戻りは数えない
        let mut qualified = false;
        if active == 0 {
            for &i in &returned {
                if let Some(state) = self.limbs.get_mut(i) {
                    state.credited = true;
                }
                qualified = true;
            }
        }

        let mut rep = false;
        if qualified {
            let ready = match self.config.count {
                CountRule::EachLimb => true,
                CountRule::Alternating => self.limbs.iter().all(|l| l.credited),
            };
            if ready && debounce.try_fire(timestamp) {
                rep = true;
                for state in &mut self.limbs {
                    state.credited = false;
                }
            }
        }

        if !self.leading.map_or(false, |l| self.limbs_active_at(l)) {
            self.leading = self.limbs.iter().position(|l| l.latch.is_active());
        }

        let cue = if active >= 2 {
            Some(ONE_SIDE_CUE.to_string())
        } else {
            None
        };

        Step {
            stage: self.stage().to_string(),
            rep,
            cue,
        }
    }

    fn limbs_active_at(&self, index: usize) -> bool {
        self.limbs.get(index).map_or(false, |l| l.latch.is_active())
    }

    pub fn reset(&mut self) {
        for state in &mut self.limbs {
            state.filter.reset();
            state.latch.reset();
            state.credited = false;
        }
        self.leading = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marching(count: CountRule) -> BilateralConfig {
        let limb = |name: &str, signal: &str, stage: &str| LimbConfig {
            name: name.to_string(),
            signal: signal.to_string(),
            active_stage: stage.to_string(),
            active_when: ActiveWhen::Below,
            enter: 100.0,
            exit: 150.0,
        };
        BilateralConfig {
            limbs: vec![
                limb("left", "left_hip", "left_up"),
                limb("right", "right_hip", "right_up"),
            ],
            neutral_stage: "neutral".to_string(),
            count,
        }
    }

    fn feed(machine: &mut BilateralMachine, debounce: &mut Debounce, left: f32, right: f32, t: f64) -> Step {
        let mut m = Measurements::new();
        m.insert("left_hip", left);
        m.insert("right_hip", right);
        machine.update(&m, t, debounce, &mut Measurements::new())
    }

    #[test]
    fn test_alternating_needs_both_sides() {
        let mut machine = BilateralMachine::new(&marching(CountRule::Alternating), &SmoothingConfig::moving_average(1));
        let mut debounce = Debounce::new(0.5);

        assert_eq!(feed(&mut machine, &mut debounce, 170.0, 170.0, 0.0).stage, "neutral");
        assert_eq!(feed(&mut machine, &mut debounce, 90.0, 170.0, 1.0).stage, "left_up");
        let left_down = feed(&mut machine, &mut debounce, 170.0, 170.0, 2.0);
        assert_eq!(left_down.stage, "neutral");
        assert!(!left_down.rep);

        assert_eq!(feed(&mut machine, &mut debounce, 170.0, 90.0, 3.0).stage, "right_up");
        assert!(feed(&mut machine, &mut debounce, 170.0, 170.0, 4.0).rep);
    }

    #[test]
    fn test_same_side_twice_does_not_count() {
        let mut machine = BilateralMachine::new(&marching(CountRule::Alternating), &SmoothingConfig::moving_average(1));
        let mut debounce = Debounce::new(0.0);
        let mut reps = 0;
        for k in 0..4 {
            let t = k as f64 * 2.0;
            feed(&mut machine, &mut debounce, 90.0, 170.0, t);
            if feed(&mut machine, &mut debounce, 170.0, 170.0, t + 1.0).rep {
                reps += 1;
            }
        }
        assert_eq!(reps, 0);
    }

    #[test]
    fn test_each_limb() {
        let mut machine = BilateralMachine::new(&marching(CountRule::EachLimb), &SmoothingConfig::moving_average(1));
        let mut debounce = Debounce::new(0.5);
        feed(&mut machine, &mut debounce, 90.0, 170.0, 0.0);
        assert!(feed(&mut machine, &mut debounce, 170.0, 170.0, 1.0).rep);
        feed(&mut machine, &mut debounce, 90.0, 170.0, 2.0);
        assert!(feed(&mut machine, &mut debounce, 170.0, 170.0, 3.0).rep);
    }

    #[test]
    fn test_return_while_other_active_not_credited() {
        let mut machine = BilateralMachine::new(&marching(CountRule::EachLimb), &SmoothingConfig::moving_average(1));
        let mut debounce = Debounce::new(0.0);
        feed(&mut machine, &mut debounce, 90.0, 170.0, 0.0);
        let both = feed(&mut machine, &mut debounce, 90.0, 90.0, 1.0);
        assert_eq!(both.cue.as_deref(), Some(ONE_SIDE_CUE));
        assert_eq!(both.stage, "left_up");

        let left_back = feed(&mut machine, &mut debounce, 170.0, 90.0, 2.0);
        assert!(!left_back.rep);
        assert_eq!(left_back.stage, "right_up");
        assert!(left_back.cue.is_none());

        assert!(feed(&mut machine, &mut debounce, 170.0, 170.0, 3.0).rep);
    }

    #[test]
    fn test_simultaneous_return_counts_once() {
        let mut machine = BilateralMachine::new(&marching(CountRule::EachLimb), &SmoothingConfig::moving_average(1));
        let mut debounce = Debounce::new(0.0);
        feed(&mut machine, &mut debounce, 90.0, 90.0, 0.0);
        let step = feed(&mut machine, &mut debounce, 170.0, 170.0, 1.0);
        assert!(step.rep);
        assert_eq!(machine.active_limbs(), 0);
    }

    #[test]
    fn test_shared_debounce() {
        let mut machine = BilateralMachine::new(&marching(CountRule::EachLimb), &SmoothingConfig::moving_average(1));
        let mut debounce = Debounce::new(1.0);
        feed(&mut machine, &mut debounce, 90.0, 170.0, 0.0);
        assert!(feed(&mut machine, &mut debounce, 170.0, 170.0, 0.2).rep);
        feed(&mut machine, &mut debounce, 170.0, 90.0, 0.4);
        assert!(!feed(&mut machine, &mut debounce, 170.0, 170.0, 0.6).rep);
    }

    #[test]
    fn test_validate() {
        let mut config = marching(CountRule::Alternating);
        assert!(config.validate("marching").is_ok());
        config.limbs[0].enter = 160.0;
        assert!(matches!(config.validate("marching"), Err(ConfigError::InvalidThresholds { .. })));
        config.limbs.truncate(1);
        assert!(matches!(config.validate("marching"), Err(ConfigError::EmptyLimbs(_))));
    }
}
