//! Adaptive embedded Runge-Kutta integration.
//!
//! Dormand-Prince 5(4): seven stages per step, a 5th-order solution and an
//! embedded 4th-order estimate whose difference drives step-size control.
//!
//! ```text
//! err   = h * Σ eᵢ kᵢ
//! ‖err‖ = sqrt(mean((errⱼ / (atol + rtol·max|yⱼ|))²))
//! h'    = h · clamp(0.9 · ‖err‖^(-1/5), 0.2, 10)
//! ```
//!
//! Output times are hit exactly by truncating the step that would cross
//! them, so no interpolation is involved.

use tracing::debug;

use super::jidoka::JidokaGuard;
use super::OdeSystem;
use crate::config::IntegratorConfig;
use crate::error::{SimError, SimResult};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

// Butcher tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (also the 7th stage row, FSAL).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Error weights: 5th-order minus embedded 4th-order.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339_200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

/// Dormand-Prince 5(4) adaptive integrator.
#[derive(Debug, Clone)]
pub struct DormandPrince {
    config: IntegratorConfig,
}

impl DormandPrince {
    /// Create an integrator with the given tolerances and step limits.
    #[must_use]
    pub const fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    /// Order of the propagated solution.
    #[must_use]
    pub const fn order(&self) -> u32 {
        5
    }

    /// Get the integrator configuration.
    #[must_use]
    pub const fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Integrate `system` from `y0` at `times[0]` and return the state at
    /// every entry of `times` (the first element is `y0` itself).
    ///
    /// The guard inspects the initial state and every accepted step.
    ///
    /// # Errors
    ///
    /// - `IntegrationFailure` if `times` decreases, the step size falls
    ///   below `min_step`, or the step budget is exhausted
    /// - any Jidoka violation raised by `guard`
    pub fn integrate<S, const N: usize>(
        &self,
        system: &S,
        y0: [f64; N],
        times: &[f64],
        guard: &mut JidokaGuard,
    ) -> SimResult<Vec<[f64; N]>>
    where
        S: OdeSystem<N>,
    {
        let names = system.component_names();
        let Some((&t0, rest)) = times.split_first() else {
            return Ok(Vec::new());
        };
        guard.check(t0, &y0, &names, system.invariant(&y0))?;

        let mut trajectory = Vec::with_capacity(times.len());
        trajectory.push(y0);

        let mut t = t0;
        let mut y = y0;
        let mut h = self.config.initial_step;
        let mut attempts = 0_usize;
        let mut rejections = 0_usize;

        for &target in rest {
            if target < t || !target.is_finite() {
                return Err(SimError::integration(
                    t,
                    format!("output time {target} precedes current time"),
                ));
            }

            while t < target {
                attempts += 1;
                if attempts > self.config.max_steps {
                    return Err(SimError::integration(
                        t,
                        format!("step budget of {} exhausted", self.config.max_steps),
                    ));
                }

                let remaining = target - t;
                let crosses = h >= remaining;
                let step = if crosses { remaining } else { h };

                let (candidate, err) = self.try_step(system, t, &y, step);

                if err <= 1.0 {
                    t = if crosses { target } else { t + step };
                    y = candidate;
                    guard.check(t, &y, &names, system.invariant(&y))?;

                    let factor = if err == 0.0 {
                        MAX_FACTOR
                    } else {
                        (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                    };
                    let proposed = step * factor;
                    // A step truncated to land on an output time says little about h.
                    h = if crosses { h.max(proposed) } else { proposed };
                    h = h.min(self.config.max_step);
                } else {
                    rejections += 1;
                    let factor = if err.is_finite() {
                        (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
                    } else {
                        MIN_FACTOR
                    };
                    h = step * factor;
                    if h < self.config.min_step {
                        return Err(SimError::integration(
                            t,
                            format!(
                                "step size {h:.3e} fell below minimum {:.3e}",
                                self.config.min_step
                            ),
                        ));
                    }
                }
            }

            trajectory.push(y);
        }

        debug!(
            points = trajectory.len(),
            attempts, rejections, "dormand-prince integration complete"
        );
        Ok(trajectory)
    }

    /// One trial step. Returns the 5th-order candidate and its scaled error norm.
    #[allow(clippy::many_single_char_names)]
    fn try_step<S, const N: usize>(
        &self,
        system: &S,
        t: f64,
        y: &[f64; N],
        h: f64,
    ) -> ([f64; N], f64)
    where
        S: OdeSystem<N>,
    {
        let k1 = system.derivatives(t, y);
        let k2 = system.derivatives(t + C2 * h, &combine(y, h, &[(A21, &k1)]));
        let k3 = system.derivatives(t + C3 * h, &combine(y, h, &[(A31, &k1), (A32, &k2)]));
        let k4 = system.derivatives(
            t + C4 * h,
            &combine(y, h, &[(A41, &k1), (A42, &k2), (A43, &k3)]),
        );
        let k5 = system.derivatives(
            t + C5 * h,
            &combine(y, h, &[(A51, &k1), (A52, &k2), (A53, &k3), (A54, &k4)]),
        );
        let k6 = system.derivatives(
            t + h,
            &combine(
                y,
                h,
                &[(A61, &k1), (A62, &k2), (A63, &k3), (A64, &k4), (A65, &k5)],
            ),
        );
        let y5 = combine(
            y,
            h,
            &[(B1, &k1), (B3, &k3), (B4, &k4), (B5, &k5), (B6, &k6)],
        );
        let k7 = system.derivatives(t + h, &y5);

        let zero = [0.0; N];
        let err = combine(
            &zero,
            h,
            &[(E1, &k1), (E3, &k3), (E4, &k4), (E5, &k5), (E6, &k6), (E7, &k7)],
        );

        let mut sum = 0.0;
        for j in 0..N {
            let scale = self.config.atol + self.config.rtol * y[j].abs().max(y5[j].abs());
            let ratio = err[j] / scale;
            sum += ratio * ratio;
        }
        let norm = if N == 0 { 0.0 } else { (sum / N as f64).sqrt() };

        (y5, norm)
    }
}

/// `y + h · Σ aᵢ kᵢ`
fn combine<const N: usize>(y: &[f64; N], h: f64, terms: &[(f64, &[f64; N])]) -> [f64; N] {
    let mut out = *y;
    for (j, slot) in out.iter_mut().enumerate() {
        let increment: f64 = terms.iter().map(|(a, k)| a * k[j]).sum();
        *slot += h * increment;
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::jidoka::JidokaConfig;

    /// dy/dt = -λy
    struct Decay {
        lambda: f64,
    }

    impl OdeSystem<1> for Decay {
        fn derivatives(&self, _t: f64, y: &[f64; 1]) -> [f64; 1] {
            [-self.lambda * y[0]]
        }

        fn component_names(&self) -> [&'static str; 1] {
            ["y"]
        }
    }

    /// Harmonic oscillator, conserves x² + v².
    struct Oscillator;

    impl OdeSystem<2> for Oscillator {
        fn derivatives(&self, _t: f64, y: &[f64; 2]) -> [f64; 2] {
            [y[1], -y[0]]
        }

        fn component_names(&self) -> [&'static str; 2] {
            ["x", "v"]
        }
    }

    /// Blows up in finite time: dy/dt = y².
    struct Blowup;

    impl OdeSystem<1> for Blowup {
        fn derivatives(&self, _t: f64, y: &[f64; 1]) -> [f64; 1] {
            [y[0] * y[0]]
        }

        fn component_names(&self) -> [&'static str; 1] {
            ["y"]
        }
    }

    fn guard() -> JidokaGuard {
        JidokaGuard::new(JidokaConfig::default())
    }

    #[test]
    fn test_exponential_decay_accuracy() {
        let integrator = DormandPrince::new(IntegratorConfig::default());
        let times: Vec<f64> = (0..=10).map(f64::from).collect();
        let result = integrator
            .integrate(&Decay { lambda: 0.3 }, [1.0], &times, &mut guard())
            .unwrap();

        assert_eq!(result.len(), times.len());
        for (t, y) in times.iter().zip(&result) {
            let exact = (-0.3 * t).exp();
            let rel = (y[0] - exact).abs() / exact;
            assert!(rel < 1e-8, "t={t}: {} vs {exact}", y[0]);
        }
    }

    #[test]
    fn test_oscillator_phase() {
        let integrator = DormandPrince::new(IntegratorConfig::default());
        let period = 2.0 * std::f64::consts::PI;
        let result = integrator
            .integrate(&Oscillator, [1.0, 0.0], &[0.0, period], &mut guard())
            .unwrap();

        let end = result[1];
        assert!((end[0] - 1.0).abs() < 1e-8, "x = {}", end[0]);
        assert!(end[1].abs() < 1e-8, "v = {}", end[1]);
    }

    #[test]
    fn test_first_point_is_initial_condition() {
        let integrator = DormandPrince::new(IntegratorConfig::default());
        let result = integrator
            .integrate(&Decay { lambda: 1.0 }, [2.5], &[0.0, 0.5], &mut guard())
            .unwrap();
        assert!((result[0][0] - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_time_grid() {
        let integrator = DormandPrince::new(IntegratorConfig::default());
        let result = integrator
            .integrate(&Decay { lambda: 1.0 }, [1.0], &[], &mut guard())
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_decreasing_times_rejected() {
        let integrator = DormandPrince::new(IntegratorConfig::default());
        let result =
            integrator.integrate(&Decay { lambda: 1.0 }, [1.0], &[0.0, 2.0, 1.0], &mut guard());
        assert!(matches!(result, Err(SimError::IntegrationFailure { .. })));
    }

    #[test]
    fn test_blowup_is_surfaced() {
        let integrator = DormandPrince::new(IntegratorConfig::default());
        // Exact solution 1/(1-t) is singular at t = 1.
        let result = integrator.integrate(&Blowup, [1.0], &[0.0, 2.0], &mut guard());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NumericalInstability);
    }

    #[test]
    fn test_step_budget_exhausted() {
        let config = IntegratorConfig {
            max_steps: 3,
            max_step: 0.01,
            initial_step: 0.01,
            ..IntegratorConfig::default()
        };
        let integrator = DormandPrince::new(config);
        let result =
            integrator.integrate(&Decay { lambda: 1.0 }, [1.0], &[0.0, 10.0], &mut guard());
        assert!(matches!(result, Err(SimError::IntegrationFailure { .. })));
    }

    #[test]
    fn test_order() {
        assert_eq!(DormandPrince::new(IntegratorConfig::default()).order(), 5);
    }
}
