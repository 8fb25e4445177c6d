//! Sign-change detection and localisation for root functions.

use gs_core::{SMALL_TIME, sign};

/// Tracks root-function values between accepted steps.
///
/// A function that is exactly zero when armed stays inactive until it moves
/// away from zero, so a root that was just handled does not fire again at
/// the same instant.
#[derive(Debug, Clone)]
pub struct RootDetector {
    previous: Vec<f64>,
    active: Vec<bool>,
    info: Vec<i8>,
    time_tolerance: f64,
}

impl Default for RootDetector {
    fn default() -> Self {
        Self {
            previous: Vec::new(),
            active: Vec::new(),
            info: Vec::new(),
            time_tolerance: 10.0 * SMALL_TIME,
        }
    }
}

impl RootDetector {
    pub fn new(count: usize) -> Self {
        let mut d = Self::default();
        d.set_root_finding(count);
        d
    }

    /// Declare `count` functions and reset every buffer.
    pub fn set_root_finding(&mut self, count: usize) {
        self.previous = vec![0.0; count];
        self.active = vec![false; count];
        self.info = vec![0; count];
    }

    pub fn count(&self) -> usize {
        self.previous.len()
    }

    pub fn set_time_tolerance(&mut self, tol: f64) {
        self.time_tolerance = tol.max(SMALL_TIME);
    }

    pub fn time_tolerance(&self) -> f64 {
        self.time_tolerance
    }

    /// Record values at a (re)initialization point.
    pub fn arm(&mut self, values: &[f64]) {
        self.previous.copy_from_slice(values);
        for (a, v) in self.active.iter_mut().zip(values) {
            *a = sign(*v) != 0;
        }
        self.info.fill(0);
    }

    /// Record values at an accepted step without a crossing.
    pub fn commit(&mut self, values: &[f64]) {
        self.previous.copy_from_slice(values);
        for (a, v) in self.active.iter_mut().zip(values) {
            if *v != 0.0 {
                *a = true;
            }
        }
    }

    /// Direction of a crossing for function `i` moving to `value`.
    fn direction(&self, i: usize, value: f64) -> i8 {
        if !self.active[i] {
            return 0;
        }
        match sign(self.previous[i]) {
            1 if value <= 0.0 => -1,
            -1 if value >= 0.0 => 1,
            _ => 0,
        }
    }

    /// True if any active function changed sign relative to the last
    /// committed values.
    pub fn crossed(&self, values: &[f64]) -> bool {
        (0..self.count()).any(|i| self.direction(i, values[i]) != 0)
    }

    /// Fill `root_info` for a located crossing at `values`.
    pub fn record(&mut self, values: &[f64]) {
        for i in 0..self.info.len() {
            self.info[i] = self.direction(i, values[i]);
        }
    }

    /// Per function: +1 rising, -1 falling, 0 none.
    pub fn root_info(&self) -> &[i8] {
        &self.info
    }

    /// Indices with a recorded crossing.
    pub fn fired(&self) -> Vec<usize> {
        self.info
            .iter()
            .enumerate()
            .filter_map(|(i, d)| (*d != 0).then_some(i))
            .collect()
    }

    pub fn clear_info(&mut self) {
        self.info.fill(0);
    }

    /// Bisect `[t0, t1]` for the earliest crossing.
    ///
    /// `eval(t, out)` fills the root values at `t`; `g1` holds them at `t1`
    /// and must show a crossing. Returns the right end of the final bracket
    /// and the values there, which always show the crossing.
    pub fn locate<E, F>(
        &self,
        t0: f64,
        t1: f64,
        g1: &[f64],
        mut eval: F,
    ) -> Result<(f64, Vec<f64>), E>
    where
        F: FnMut(f64, &mut [f64]) -> Result<(), E>,
    {
        let mut lo = t0;
        let mut hi = t1;
        let mut g_hi = g1.to_vec();
        let mut g_mid = vec![0.0; g1.len()];
        while hi - lo > self.time_tolerance {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            eval(mid, &mut g_mid)?;
            if self.crossed(&g_mid) {
                hi = mid;
                g_hi.copy_from_slice(&g_mid);
            } else {
                lo = mid;
            }
        }
        Ok((hi, g_hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_change_is_detected_with_direction() {
        let mut d = RootDetector::new(2);
        d.arm(&[1.0, -1.0]);
        assert!(!d.crossed(&[0.5, -0.5]));
        assert!(d.crossed(&[-0.5, -0.5]));
        d.record(&[-0.5, 0.2]);
        assert_eq!(d.root_info(), &[-1, 1]);
        assert_eq!(d.fired(), vec![0, 1]);
    }

    #[test]
    fn exact_zero_after_nonzero_counts() {
        let mut d = RootDetector::new(1);
        d.arm(&[2.0]);
        assert!(d.crossed(&[0.0]));
    }

    #[test]
    fn zero_at_arm_is_inactive_until_it_moves() {
        let mut d = RootDetector::new(1);
        d.arm(&[0.0]);
        assert!(!d.crossed(&[-1.0]));
        d.commit(&[-1.0]);
        assert!(d.crossed(&[1.0]));
    }

    #[test]
    fn bisection_brackets_linear_root() {
        let mut d = RootDetector::new(1);
        d.set_time_tolerance(1e-9);
        d.arm(&[-0.3]);
        let f = |t: f64, out: &mut [f64]| -> Result<(), ()> {
            out[0] = t - 0.3;
            Ok(())
        };
        let (t, g) = d.locate(0.0, 1.0, &[0.7], f).unwrap();
        assert!((t - 0.3).abs() < 1e-8);
        assert!(t >= 0.3);
        assert!(g[0] >= 0.0);
    }

    #[test]
    fn bisection_finds_earliest_of_two() {
        let mut d = RootDetector::new(2);
        d.arm(&[1.0, 1.0]);
        let f = |t: f64, out: &mut [f64]| -> Result<(), ()> {
            out[0] = 0.8 - t;
            out[1] = 0.4 - t;
            Ok(())
        };
        let (t, g) = d.locate(0.0, 1.0, &[-0.2, -0.6], f).unwrap();
        assert!((t - 0.4).abs() < 1e-6);
        d.record(&g);
        assert_eq!(d.fired(), vec![1]);
    }
}
