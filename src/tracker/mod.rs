pub mod band;
pub mod bilateral;
pub mod cycle;
pub mod debounce;
pub mod hold;
pub mod machine;
pub mod one_euro;
pub mod smooth;

pub use band::{ActiveWhen, BandConfig, BandCues, BandMachine};
pub use bilateral::{BilateralConfig, BilateralMachine, CountRule, LimbConfig};
pub use cycle::{CycleConfig, CycleMachine, PhaseSpec};
pub use debounce::Debounce;
pub use hold::{HoldConfig, HoldMachine};
pub use machine::{StageMachine, TrackingMode};
pub use one_euro::OneEuroFilter;
pub use smooth::{SignalFilter, Smoother};

/// Outcome of feeding one frame to a stage machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub stage: String,
    /// A repetition was counted on this frame (already debounced).
    pub rep: bool,
    /// Movement cue for the current position, if any.
    pub cue: Option<String>,
}

impl Step {
    /// No transition: keep reporting `stage`.
    pub fn hold(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            rep: false,
            cue: None,
        }
    }
}
