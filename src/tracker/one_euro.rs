/// Frame interval assumed when two samples share a timestamp.
const FALLBACK_DT: f32 = 1.0 / 30.0;

/// Low-pass filter component
#[derive(Debug, Clone)]
struct LowPassFilter {
    prev: Option<f32>,
}

impl LowPassFilter {
    fn new() -> Self {
        Self { prev: None }
    }

    fn filter(&mut self, value: f32, alpha: f32) -> f32 {
        let result = match self.prev {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        self.prev = Some(result);
        result
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f32, cutoff: f32) -> f32 {
    let r = 2.0 * std::f32::consts::PI * cutoff * te;
    r / (r + 1.0)
}

/// One Euro filter over a scalar signal, clocked by frame timestamps.
///
/// Low speed → heavy smoothing (min_cutoff); fast motion raises the cutoff by `beta * |dx/dt|`.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff: f32,
    beta: f32,
    d_cutoff: f32,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    prev_value: Option<f32>,
    last_time: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f32, beta: f32, d_cutoff: f32) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_filter: LowPassFilter::new(),
            dx_filter: LowPassFilter::new(),
            prev_value: None,
            last_time: None,
        }
    }

    pub fn apply(&mut self, value: f32, timestamp: f64) -> f32 {
        if !value.is_finite() {
            return self.x_filter.prev.unwrap_or(0.0);
        }

        let (prev, last) = match (self.prev_value, self.last_time) {
            (Some(p), Some(t)) => (p, t),
            _ => {
                self.prev_value = Some(value);
                self.last_time = Some(timestamp);
                self.dx_filter.filter(0.0, 1.0);
                return self.x_filter.filter(value, 1.0);
            }
        };

        let dt = (timestamp - last) as f32;
        let dt = if dt > 0.0 { dt } else { FALLBACK_DT };
        self.last_time = Some(timestamp);
        self.prev_value = Some(value);

        let dx = (value - prev) / dt;
        let edx = self
            .dx_filter
            .filter(dx, smoothing_factor(dt, self.d_cutoff));
        let cutoff = self.min_cutoff + self.beta * edx.abs();
        self.x_filter.filter(value, smoothing_factor(dt, cutoff))
    }

    pub fn reset(&mut self) {
        self.x_filter.reset();
        self.dx_filter.reset();
        self.prev_value = None;
        self.last_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothing_factor_bounds() {
        for &cutoff in &[0.1, 1.0, 10.0, 100.0] {
            for &te in &[0.001, 0.01, 0.033, 0.1] {
                let alpha = smoothing_factor(te, cutoff);
                assert!(alpha > 0.0 && alpha < 1.0, "alpha={} for te={}, cutoff={}", alpha, te, cutoff);
            }
        }
    }

    #[test]
    fn test_first_sample_passthrough() {
        let mut f = OneEuroFilter::new(1.0, 0.0, 1.0);
        assert_eq!(f.apply(120.0, 0.0), 120.0);
    }

    #[test]
    fn test_smooths_step() {
        let mut f = OneEuroFilter::new(1.0, 0.0, 1.0);
        f.apply(0.0, 0.0);
        let result = f.apply(10.0, 0.033);
        assert!(result > 0.0 && result < 10.0, "Expected smoothing, got {}", result);
    }

    #[test]
    fn test_high_beta_more_responsive() {
        let mut low = OneEuroFilter::new(1.0, 0.0, 1.0);
        let mut high = OneEuroFilter::new(1.0, 1.0, 1.0);
        low.apply(0.0, 0.0);
        high.apply(0.0, 0.0);
        let r_low = low.apply(90.0, 0.033);
        let r_high = high.apply(90.0, 0.033);
        assert!(r_high > r_low, "high beta {} should lead low beta {}", r_high, r_low);
    }

    #[test]
    fn test_repeated_timestamp_does_not_blow_up() {
        let mut f = OneEuroFilter::new(1.0, 0.5, 1.0);
        f.apply(10.0, 1.0);
        let out = f.apply(20.0, 1.0);
        assert!(out.is_finite());
        assert!(out >= 10.0 && out <= 20.0);
    }

    #[test]
    fn test_constant_signal_stays_constant() {
        let mut f = OneEuroFilter::new(1.0, 0.1, 1.0);
        for i in 0..30 {
            let out = f.apply(150.0, i as f64 / 30.0);
            assert!((out - 150.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_reset() {
        let mut f = OneEuroFilter::new(1.0, 0.0, 1.0);
        f.apply(1.0, 0.0);
        f.apply(2.0, 0.1);
        f.reset();
        assert_eq!(f.apply(50.0, 0.2), 50.0);
    }
}
