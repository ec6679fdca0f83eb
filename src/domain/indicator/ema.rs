//! Exponential Moving Average, streaming form.
//!
//! k = 2/(n+1), seed with the SMA of the first n values, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: no value until n inputs have been seen.

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    k: f64,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Ema {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            value: None,
        }
    }

    pub fn smoothing(&self) -> f64 {
        self.k
    }

    /// Feed one value and return the EMA once it is seeded.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }
        self.seen += 1;
        self.value = match self.value {
            Some(prev) => Some(close * self.k + prev * (1.0 - self.k)),
            None => {
                self.seed_sum += close;
                (self.seen == self.period).then(|| self.seed_sum / self.period as f64)
            }
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn feed(ema: &mut Ema, values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|&v| ema.update(v)).collect()
    }

    #[test]
    fn ema_warmup() {
        let mut ema = Ema::new(3);
        let out = feed(&mut ema, &[10.0, 20.0, 30.0, 40.0, 50.0]);
        assert!(out[0].is_none());
        assert!(out[1].is_none());
        assert!(out[2].is_some());
        assert!(out[3].is_some());
        assert!(out[4].is_some());
    }

    #[test]
    fn ema_period_1_tracks_input() {
        let mut ema = Ema::new(1);
        let out = feed(&mut ema, &[10.0, 20.0, 30.0]);
        assert_relative_eq!(out[0].unwrap(), 10.0);
        assert_relative_eq!(out[1].unwrap(), 20.0);
        assert_relative_eq!(out[2].unwrap(), 30.0);
    }

    #[test]
    fn ema_seed_is_sma() {
        let mut ema = Ema::new(3);
        let out = feed(&mut ema, &[10.0, 20.0, 30.0]);
        assert_relative_eq!(out[2].unwrap(), 20.0);
    }

    #[test]
    fn ema_recursive_calculation() {
        let mut ema = Ema::new(3);
        let out = feed(&mut ema, &[10.0, 20.0, 30.0, 40.0, 50.0]);

        let k = 2.0 / 4.0;
        let sma = 20.0;
        let ema_3 = 40.0 * k + sma * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);

        assert_relative_eq!(out[3].unwrap(), ema_3, epsilon = 1e-12);
        assert_relative_eq!(out[4].unwrap(), ema_4, epsilon = 1e-12);
    }

    #[test]
    fn ema_equal_prices() {
        let mut ema = Ema::new(3);
        for v in feed(&mut ema, &[100.0; 5]).into_iter().skip(2) {
            assert_relative_eq!(v.unwrap(), 100.0);
        }
    }

    #[test]
    fn ema_period_0_never_ready() {
        let mut ema = Ema::new(0);
        assert!(ema.update(10.0).is_none());
        assert!(!ema.is_ready());
    }

    #[test]
    fn ema_smoothing_factor() {
        let ema = Ema::new(10);
        assert_relative_eq!(ema.smoothing(), 2.0 / 11.0);
    }
}
