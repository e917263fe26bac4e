// SPDX-License-Identifier: AGPL-3.0-only

//! Validation harness for the peridynamics validation binary.
//!
//! A validation run is a list of named checks, each with an observed
//! value, a reference, and the tolerance from [`crate::tolerances`]. The
//! binary exits 0 when every check passes and 1 otherwise, printing a
//! machine-greppable summary.

use std::fmt::Write as _;
use std::process;

/// A single validation check with result tracking.
#[derive(Debug, Clone)]
pub struct Check {
    /// Human-readable label
    pub label: String,
    /// Whether this check passed
    pub passed: bool,
    /// Observed value
    pub observed: f64,
    /// Reference value or bound
    pub expected: f64,
    /// Tolerance used
    pub tolerance: f64,
    /// How the tolerance was applied
    pub mode: ToleranceMode,
}

/// How a tolerance threshold is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceMode {
    /// |observed - expected| <= tolerance
    Absolute,
    /// |observed - expected| / |expected| <= tolerance
    Relative,
    /// observed <= bound
    AtMost,
    /// max_i |a_i - b_i| <= tolerance over two arrays
    MaxAbsDiff,
    /// boolean condition
    Condition,
}

impl std::fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "abs"),
            Self::Relative => write!(f, "rel"),
            Self::AtMost => write!(f, "<="),
            Self::MaxAbsDiff => write!(f, "max|Δ|"),
            Self::Condition => write!(f, "bool"),
        }
    }
}

/// Accumulates validation checks and produces a summary with exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    /// Name of the validation binary
    pub name: String,
    /// All checks performed
    pub checks: Vec<Check>,
}

impl ValidationHarness {
    /// Create a new harness for a named validation binary.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
        }
    }

    fn push(
        &mut self,
        label: &str,
        passed: bool,
        observed: f64,
        expected: f64,
        tolerance: f64,
        mode: ToleranceMode,
    ) {
        log::debug!("check {label}: observed={observed:e} expected={expected:e} passed={passed}");
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance,
            mode,
        });
    }

    /// |observed - expected| <= tolerance
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = (observed - expected).abs() <= tolerance;
        self.push(label, passed, observed, expected, tolerance, ToleranceMode::Absolute);
    }

    /// Relative check; falls back to absolute when `expected` is zero.
    pub fn check_rel(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = if expected.abs() > f64::EPSILON {
            ((observed - expected) / expected).abs() <= tolerance
        } else {
            observed.abs() <= tolerance
        };
        self.push(label, passed, observed, expected, tolerance, ToleranceMode::Relative);
    }

    /// observed <= bound
    pub fn check_at_most(&mut self, label: &str, observed: f64, bound: f64) {
        let passed = observed <= bound;
        self.push(label, passed, observed, bound, bound, ToleranceMode::AtMost);
    }

    /// Element-wise parity between two arrays of equal length.
    ///
    /// Length mismatch or any non-finite difference fails the check.
    pub fn check_arrays(&mut self, label: &str, observed: &[f64], expected: &[f64], tolerance: f64) {
        let max_diff = max_abs_diff(observed, expected);
        let passed = observed.len() == expected.len() && max_diff <= tolerance;
        self.push(label, passed, max_diff, 0.0, tolerance, ToleranceMode::MaxAbsDiff);
    }

    /// Boolean pass/fail check.
    pub fn check_bool(&mut self, label: &str, passed: bool) {
        self.push(
            label,
            passed,
            f64::from(u8::from(passed)),
            1.0,
            0.0,
            ToleranceMode::Condition,
        );
    }

    /// Number of checks that passed.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Total number of checks.
    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Whether all checks passed (vacuously true with no checks).
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Render the summary block printed by [`Self::finish`].
    #[must_use]
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "═══ {} validation: {}/{} checks passed ═══",
            self.name,
            self.passed_count(),
            self.total_count()
        );
        for check in &self.checks {
            let icon = if check.passed { "✓" } else { "✗" };
            let _ = writeln!(
                s,
                "  {icon} {}: observed={:.6e}, expected={:.6e}, tol={:.2e} ({})",
                check.label, check.observed, check.expected, check.tolerance, check.mode
            );
        }
        s
    }

    /// Print summary and exit 0 if all checks pass, 1 otherwise.
    pub fn finish(&self) -> ! {
        println!();
        print!("{}", self.format_summary());
        if self.all_passed() {
            println!("ALL CHECKS PASSED");
            process::exit(0);
        }
        let failed: Vec<&str> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.label.as_str())
            .collect();
        println!("FAILED CHECKS: {}", failed.join(", "));
        process::exit(1);
    }
}

/// Largest element-wise absolute difference; `INFINITY` on length
/// mismatch or NaN.
#[must_use]
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter().zip(b).fold(0.0_f64, |acc, (x, y)| {
        let d = (x - y).abs();
        if d.is_nan() {
            f64::INFINITY
        } else {
            acc.max(d)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_tracks_pass_fail() {
        let mut h = ValidationHarness::new("test");
        h.check_abs("exact", 1.0, 1.0, 1e-10);
        h.check_abs("close", 1.0001, 1.0, 1e-3);
        h.check_abs("far", 2.0, 1.0, 1e-3);
        assert_eq!(h.passed_count(), 2);
        assert_eq!(h.total_count(), 3);
        assert!(!h.all_passed());
    }

    #[test]
    fn relative_check_handles_zero() {
        let mut h = ValidationHarness::new("test");
        h.check_rel("near_zero", 1e-15, 0.0, 1e-10);
        h.check_rel("far_from_zero", 1.0, 0.0, 1e-10);
        assert!(h.checks[0].passed);
        assert!(!h.checks[1].passed);
    }

    #[test]
    fn at_most_is_inclusive() {
        let mut h = ValidationHarness::new("test");
        h.check_at_most("equal", 1e-4, 1e-4);
        h.check_at_most("above", 1.1e-4, 1e-4);
        assert!(h.checks[0].passed, "a rate equal to its cap is allowed");
        assert!(!h.checks[1].passed);
    }

    #[test]
    fn array_parity() {
        let mut h = ValidationHarness::new("test");
        h.check_arrays("same", &[1.0, 2.0], &[1.0, 2.0 + 1e-12], 1e-9);
        h.check_arrays("off", &[1.0, 2.0], &[1.0, 2.1], 1e-9);
        h.check_arrays("length", &[1.0], &[1.0, 2.0], 1e-9);
        h.check_arrays("nan", &[f64::NAN], &[0.0], 1e-9);
        let passed: Vec<bool> = h.checks.iter().map(|c| c.passed).collect();
        assert_eq!(passed, vec![true, false, false, false]);
    }

    #[test]
    fn format_summary_counts() {
        let mut h = ValidationHarness::new("pd_validation");
        h.check_bool("ok", true);
        h.check_bool("bad", false);
        let s = h.format_summary();
        assert!(s.contains("pd_validation"));
        assert!(s.contains("1/2"));
        assert!(s.contains('✗'));
    }

    #[test]
    fn harness_zero_checks() {
        let h = ValidationHarness::new("empty");
        assert_eq!(h.total_count(), 0);
        assert!(h.all_passed());
    }

    #[test]
    fn tolerance_mode_display() {
        assert_eq!(ToleranceMode::Absolute.to_string(), "abs");
        assert_eq!(ToleranceMode::AtMost.to_string(), "<=");
        assert_eq!(ToleranceMode::Condition.to_string(), "bool");
    }
}
