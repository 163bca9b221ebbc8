//! Exponential moving average stream.

/// `value = alpha * sample + (1 - alpha) * previous`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ema {
    alpha: f32,
    value: f32,
}

impl Ema {
    pub fn new(alpha: f32, initial: f32) -> Self {
        debug_assert!((0.0..=1.0).contains(&alpha), "ema alpha out of range: {alpha}");
        Self {
            alpha,
            value: initial,
        }
    }

    pub fn input(&mut self, sample: f32) {
        // constant samples are an exact fixed point
        self.value += self.alpha * (sample - self.value);
    }

    pub fn output(&self) -> f32 {
        self.value
    }

    /// Jump straight to `value` without blending.
    pub fn set(&mut self, value: f32) {
        self.value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blends_with_alpha() {
        let mut ema = Ema::new(0.5, 0.0);
        ema.input(1.0);
        assert_eq!(ema.output(), 0.5);
        ema.input(1.0);
        assert_eq!(ema.output(), 0.75);
    }

    #[test]
    fn constant_input_is_a_fixed_point() {
        let mut ema = Ema::new(0.05, 0.25);
        for _ in 0..100 {
            ema.input(0.25);
        }
        assert_eq!(ema.output(), 0.25);
    }

    #[test]
    fn set_skips_blending() {
        let mut ema = Ema::new(0.3, 0.1);
        ema.set(0.9);
        assert_eq!(ema.output(), 0.9);
        ema.input(0.9);
        assert_eq!(ema.output(), 0.9);
    }
}
