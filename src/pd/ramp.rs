// SPDX-License-Identifier: AGPL-3.0-only

//! Smooth displacement-rate schedule for quasi-static loading.
//!
//! The applied displacement follows three phases:
//!
//! ```text
//!   rate
//!   Rmax ┤        ┌───────────────┐
//!        │      ╱                   ╲
//!        │    ╱                       ╲
//!      0 ┼──╱───────────────────────────╲───────── step
//!        0    T/2                ease_off  ease_off + T/2
//! ```
//!
//! The two curved flanks are the first and second half of the quintic
//! `x(t) = a t⁵ + b t⁴ + c t³` with `x(0) = 0`, `x(T) = D` and zero
//! acceleration at both ends, so velocity is continuous across every
//! phase boundary and no elastic wave is kicked off by the load.

use crate::error::{PeridynError, Result};
use nalgebra::{Matrix3, Vector3};

/// Derivative of the quintic at `t`.
#[must_use]
pub fn quintic_rate(coefficients: [f64; 3], t: f64) -> f64 {
    let [a, b, c] = coefficients;
    5.0 * a * t.powi(4) + 4.0 * b * t.powi(3) + 3.0 * c * t.powi(2)
}

/// Midpoint gradient and coefficients `(a, b, c)` of the quintic that
/// reaches `displacement` at `build_time` with zero end acceleration.
///
/// Rows: `x(T) = D`, `x''(T) = 0`, `x'(T) = 0`. `None` when the system is
/// singular (always at `T = 0`).
#[must_use]
pub fn midpoint_gradient(build_time: usize, displacement: f64) -> Option<(f64, [f64; 3])> {
    let t = build_time as f64;
    #[rustfmt::skip]
    let a = Matrix3::new(
        t.powi(5),        t.powi(4),        t.powi(3),
        20.0 * t.powi(3), 12.0 * t.powi(2), 6.0 * t,
        5.0 * t.powi(4),  4.0 * t.powi(3),  3.0 * t.powi(2),
    );
    let x = a.lu().solve(&Vector3::new(displacement, 0.0, 0.0))?;
    if !x.iter().all(|v| v.is_finite()) {
        return None;
    }
    let coefficients = [x[0], x[1], x[2]];
    Some((quintic_rate(coefficients, t / 2.0), coefficients))
}

/// Smallest build time whose quintic peak rate stays within
/// `max_displacement_rate`, with its coefficients.
///
/// Linear scan from 0; singular candidates are skipped.
/// Fails with [`PeridynError::BuildTimeExceeded`] once the candidate
/// passes `steps`.
pub fn calc_build_time(
    build_displacement: f64,
    max_displacement_rate: f64,
    steps: usize,
) -> Result<(usize, [f64; 3])> {
    let mut build_time = 0usize;
    loop {
        if build_time > steps {
            return Err(PeridynError::BuildTimeExceeded { build_time, steps });
        }
        if let Some((gradient, coefficients)) = midpoint_gradient(build_time, build_displacement) {
            if gradient <= max_displacement_rate {
                return Ok((build_time, coefficients));
            }
        }
        build_time += 1;
    }
}

/// Mutable part of the ramp, computed once per run.
#[derive(Clone, Debug, PartialEq)]
pub struct RampState {
    /// Steps spent on the two quintic flanks together.
    pub build_time: usize,
    /// Quintic coefficients `(a, b, c)`.
    pub coefficients: [f64; 3],
    /// Step at which deceleration began; `None` while still accelerating
    /// or on the plateau.
    pub ease_off: Option<usize>,
}

/// Three-phase displacement-rate controller.
#[derive(Clone, Debug)]
pub struct RampController {
    build_displacement: f64,
    max_displacement_rate: f64,
    max_displacement: f64,
    state: RampState,
}

impl RampController {
    /// Size the ramp for a run of `steps` steps.
    pub fn new(
        build_displacement: f64,
        max_displacement_rate: f64,
        max_displacement: f64,
        steps: usize,
    ) -> Result<Self> {
        let (build_time, coefficients) =
            calc_build_time(build_displacement, max_displacement_rate, steps)?;
        log::info!(
            "ramp: build_time={build_time} steps for D={build_displacement:e}, \
             Rmax={max_displacement_rate:e}, target={max_displacement:e}"
        );
        Ok(Self {
            build_displacement,
            max_displacement_rate,
            max_displacement,
            state: RampState {
                build_time,
                coefficients,
                ease_off: None,
            },
        })
    }

    /// Current ramp state.
    #[must_use]
    pub const fn state(&self) -> &RampState {
        &self.state
    }

    /// Rate cap of the plateau.
    #[must_use]
    pub const fn max_displacement_rate(&self) -> f64 {
        self.max_displacement_rate
    }

    /// Displacement at which the ramp settles.
    #[must_use]
    pub const fn max_displacement(&self) -> f64 {
        self.max_displacement
    }

    /// Displacement-rate scale for `step`, in `[0, max_displacement_rate]`.
    ///
    /// Steps must be queried in increasing order: the call that finds the
    /// plateau has covered the target records `ease_off`, and every later
    /// call follows the decelerating flank.
    pub fn rate(&mut self, step: usize) -> f64 {
        let half = self.state.build_time as f64 / 2.0;
        let step_f = step as f64;
        let rate = if step_f < half {
            quintic_rate(self.state.coefficients, step_f)
        } else if let Some(ease_off) = self.state.ease_off {
            let t = step_f - ease_off as f64 + half;
            if t > self.state.build_time as f64 {
                0.0
            } else {
                quintic_rate(self.state.coefficients, t)
            }
        } else {
            let linear_displacement = (step_f - half) * self.max_displacement_rate;
            let displacement = linear_displacement + self.build_displacement / 2.0;
            if displacement + self.build_displacement / 2.0 >= self.max_displacement {
                log::debug!("ramp: easing off at step {step}");
                self.state.ease_off = Some(step);
            }
            self.max_displacement_rate
        };
        rate.clamp(0.0, self.max_displacement_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerances::{EXACT_F64, RAMP_STEP_JUMP_FRACTION, RAMP_TOTAL_DISPLACEMENT_REL};

    #[test]
    fn zero_build_time_is_singular() {
        assert!(midpoint_gradient(0, 0.5).is_none());
    }

    #[test]
    fn quintic_satisfies_constraints() {
        let d = 0.5;
        let t = 40usize;
        let (_, c) = midpoint_gradient(t, d).expect("non-singular");
        let tf = t as f64;
        let x = c[0] * tf.powi(5) + c[1] * tf.powi(4) + c[2] * tf.powi(3);
        let acc = 20.0 * c[0] * tf.powi(3) + 12.0 * c[1] * tf.powi(2) + 6.0 * c[2] * tf;
        assert!((x - d).abs() < EXACT_F64, "x(T) = {x}");
        assert!(acc.abs() < EXACT_F64, "x''(T) = {acc}");
        assert!(quintic_rate(c, tf).abs() < EXACT_F64, "x'(T) = 0");
    }

    #[test]
    fn midpoint_gradient_matches_smoothstep() {
        // x(t) = D (10 s³ − 15 s⁴ + 6 s⁵), s = t/T → x'(T/2) = 15 D / (8 T)
        for t in [10usize, 100, 1000] {
            let (g, _) = midpoint_gradient(t, 0.5).expect("non-singular");
            let expected = 15.0 * 0.5 / (8.0 * t as f64);
            assert!(
                ((g - expected) / expected).abs() < 1e-9,
                "T={t}: {g} vs {expected}"
            );
        }
    }

    #[test]
    fn build_time_is_minimal() {
        let (t, _) = calc_build_time(0.5, 1e-4, 100_000).expect("fits");
        let (g, _) = midpoint_gradient(t, 0.5).expect("non-singular");
        assert!(g <= 1e-4, "gradient {g} above cap");
        let (g_prev, _) = midpoint_gradient(t - 1, 0.5).expect("non-singular");
        assert!(g_prev > 1e-4, "T-1 = {} would already fit", t - 1);
        assert!((9375..=9376).contains(&t), "analytic minimum is 9375, got {t}");
    }

    #[test]
    fn build_time_beyond_budget_fails() {
        let err = calc_build_time(0.5, 1e-4, 1000).expect_err("9375 > 1000");
        match err {
            PeridynError::BuildTimeExceeded { build_time, steps } => {
                assert_eq!(steps, 1000);
                assert_eq!(build_time, 1001);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(RampController::new(0.5, 1e-4, 1.0, 1000).is_err());
    }

    fn small_ramp() -> RampController {
        RampController::new(0.05, 1e-3, 0.2, 1000).expect("fits in budget")
    }

    #[test]
    fn rate_bounded_and_continuous() {
        let mut ramp = small_ramp();
        let cap = ramp.max_displacement_rate();
        let rates: Vec<f64> = (0..400).map(|s| ramp.rate(s)).collect();
        for (s, r) in rates.iter().enumerate() {
            assert!((0.0..=cap).contains(r), "step {s}: rate {r} out of [0, {cap}]");
        }
        for (s, w) in rates.windows(2).enumerate() {
            let jump = (w[1] - w[0]).abs();
            assert!(
                jump <= RAMP_STEP_JUMP_FRACTION * cap,
                "step {s}→{}: jump {jump:e}",
                s + 1
            );
        }
        assert_eq!(rates[0], 0.0, "ramp starts at rest");
        assert_eq!(*rates.last().expect("non-empty"), 0.0, "ramp settles");
    }

    #[test]
    fn ease_off_recorded_once() {
        let mut ramp = small_ramp();
        let mut first = None;
        for s in 0..400 {
            ramp.rate(s);
            if let Some(e) = ramp.state().ease_off {
                match first {
                    None => first = Some(e),
                    Some(f) => assert_eq!(f, e, "ease_off must not move"),
                }
            }
        }
        let e = first.expect("ramp reaches its target");
        assert!(e > ramp.state().build_time / 2);
    }

    #[test]
    fn integrated_rate_reaches_target() {
        let mut ramp = small_ramp();
        let total: f64 = (0..1000).map(|s| ramp.rate(s)).sum();
        let target = ramp.max_displacement();
        assert!(
            ((total - target) / target).abs() < RAMP_TOTAL_DISPLACEMENT_REL,
            "integrated {total} vs target {target}"
        );
    }
}
