use std::collections::VecDeque;

use crate::config::{FilterKind, SmoothingConfig};
use crate::tracker::one_euro::OneEuroFilter;

/// 固定長ウィンドウの移動平均フィルタ
///
/// 最初のサンプルはそのまま返し、以降はバッファ内の算術平均を返す。
/// バッファ長は常に window 以下。
#[derive(Debug, Clone)]
pub struct Smoother {
    window: usize,
    buffer: VecDeque<f32>,
}

impl Smoother {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            buffer: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, value: f32) -> f32 {
        // 非有限値はバッファに入れない
        if !value.is_finite() {
            return self.current().unwrap_or(0.0);
        }
        if self.buffer.len() == self.window {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
        if self.buffer.len() == 1 {
            return value;
        }
        self.buffer.iter().sum::<f32>() / self.buffer.len() as f32
    }

    /// 現在の平滑値（サンプルが無ければ None）
    pub fn current(&self) -> Option<f32> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.iter().sum::<f32>() / self.buffer.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// 1信号ぶんのフィルタ。設定で移動平均か One Euro を選ぶ
#[derive(Debug, Clone)]
pub enum SignalFilter {
    MovingAverage(Smoother),
    OneEuro(OneEuroFilter),
}

impl SignalFilter {
    pub fn from_config(config: &SmoothingConfig) -> Self {
        match config.filter {
            FilterKind::MovingAverage => Self::MovingAverage(Smoother::new(config.window)),
            FilterKind::OneEuro => Self::OneEuro(OneEuroFilter::new(
                config.min_cutoff,
                config.beta,
                config.d_cutoff,
            )),
        }
    }

    /// `timestamp` はフレームのキャプチャ時刻（秒）
    pub fn apply(&mut self, value: f32, timestamp: f64) -> f32 {
        match self {
            Self::MovingAverage(s) => s.push(value),
            Self::OneEuro(f) => f.apply(value, timestamp),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::MovingAverage(s) => s.reset(),
            Self::OneEuro(f) => f.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_first_sample_passthrough() {
        let mut s = Smoother::new(5);
        assert_eq!(s.push(42.0), 42.0);
    }

    #[test]
    fn test_moving_average() {
        let mut s = Smoother::new(3);
        s.push(0.0);
        assert!(approx_eq_f32(s.push(3.0), 1.5, 1e-6));
        assert!(approx_eq_f32(s.push(6.0), 3.0, 1e-6));
        // 0.0 が押し出される
        assert!(approx_eq_f32(s.push(9.0), 6.0, 1e-6));
    }

    #[test]
    fn test_buffer_never_exceeds_window() {
        let mut s = Smoother::new(5);
        for i in 0..50 {
            s.push(i as f32);
            assert!(s.len() <= s.window());
        }
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn test_constant_input_converges() {
        let mut s = Smoother::new(5);
        for v in [170.0, 150.0, 120.0, 100.0] {
            s.push(v);
        }
        let mut last = 0.0;
        for _ in 0..5 {
            last = s.push(80.0);
        }
        assert!(approx_eq_f32(last, 80.0, 1e-4));
    }

    #[test]
    fn test_output_within_window_bounds() {
        let mut s = Smoother::new(4);
        let input = [10.0, 90.0, 35.0, 170.0, 5.0, 60.0, 120.0, 44.0];
        for (i, &v) in input.iter().enumerate() {
            let out = s.push(v);
            let start = (i + 1).saturating_sub(4);
            let window = &input[start..=i];
            let max = window.iter().cloned().fold(f32::MIN, f32::max);
            let min = window.iter().cloned().fold(f32::MAX, f32::min);
            assert!(out <= max + 1e-4 && out >= min - 1e-4, "{} not in [{}, {}]", out, min, max);
        }
    }

    #[test]
    fn test_non_finite_ignored() {
        let mut s = Smoother::new(3);
        s.push(10.0);
        s.push(20.0);
        let out = s.push(f32::NAN);
        assert!(approx_eq_f32(out, 15.0, 1e-6));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_zero_window_treated_as_one() {
        let mut s = Smoother::new(0);
        s.push(1.0);
        assert_eq!(s.push(7.0), 7.0);
    }

    #[test]
    fn test_reset() {
        let mut s = Smoother::new(5);
        s.push(100.0);
        s.push(200.0);
        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.push(3.0), 3.0);
    }

    #[test]
    fn test_signal_filter_from_config() {
        let mut config = SmoothingConfig::default();
        let mut f = SignalFilter::from_config(&config);
        assert!(matches!(f, SignalFilter::MovingAverage(_)));
        assert_eq!(f.apply(5.0, 0.0), 5.0);

        config.filter = FilterKind::OneEuro;
        let mut f = SignalFilter::from_config(&config);
        assert!(matches!(f, SignalFilter::OneEuro(_)));
        assert_eq!(f.apply(5.0, 0.0), 5.0);
        f.reset();
        assert_eq!(f.apply(9.0, 1.0), 9.0);
    }
}
