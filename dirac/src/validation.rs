// SPDX-License-Identifier: AGPL-3.0-only

//! Pass/fail harness for the validation binary.
//!
//! Each check records what was observed, what was required and how the
//! tolerance was applied. The binary exits 0 when every check passes and 1
//! otherwise, after printing a machine-readable summary on stdout.

use std::fmt::{self, Write as _};
use std::process;

use crate::error::DiracResult;

/// A single validation check with result tracking.
#[derive(Debug, Clone)]
pub struct Check {
    /// Section the check was recorded under.
    pub section: String,
    pub label: String,
    pub passed: bool,
    pub observed: f64,
    pub expected: f64,
    pub tolerance: f64,
    pub mode: ToleranceMode,
}

/// How a tolerance threshold is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceMode {
    /// |observed - expected| < tolerance
    Absolute,
    /// |observed - expected| / |expected| < tolerance
    Relative,
    /// observed < threshold
    UpperBound,
    /// Boolean outcome, or an error of the expected kind.
    Outcome,
}

impl fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "abs"),
            Self::Relative => write!(f, "rel"),
            Self::UpperBound => write!(f, "<"),
            Self::Outcome => write!(f, "ok"),
        }
    }
}

/// Accumulates validation checks and produces a summary with exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    pub name: String,
    pub checks: Vec<Check>,
    section: String,
}

impl ValidationHarness {
    #[must_use = "validation harness must be used to run checks"]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Start a new group of checks (one operator variant, one property).
    pub fn section(&mut self, title: &str) {
        self.section = title.to_string();
        println!("── {title}");
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
        self.checks.push(Check {
            section: self.section.clone(),
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance,
            mode,
        });
    }

    /// |observed - expected| < tolerance
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = (observed - expected).abs() < tolerance;
        self.push(label, passed, observed, expected, tolerance, ToleranceMode::Absolute);
    }

    /// |observed - expected| / |expected| < tolerance, absolute near zero.
    pub fn check_rel(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = if expected.abs() > f64::EPSILON {
            ((observed - expected) / expected).abs() < tolerance
        } else {
            observed.abs() < tolerance
        };
        self.push(label, passed, observed, expected, tolerance, ToleranceMode::Relative);
    }

    /// observed < threshold
    pub fn check_upper(&mut self, label: &str, observed: f64, threshold: f64) {
        self.push(
            label,
            observed < threshold,
            observed,
            threshold,
            threshold,
            ToleranceMode::UpperBound,
        );
    }

    pub fn check_bool(&mut self, label: &str, passed: bool) {
        self.push(label, passed, f64::from(u8::from(passed)), 1.0, 0.0, ToleranceMode::Outcome);
    }

    /// Passes when `result` failed and `expected` accepts the error.
    pub fn check_err<T>(
        &mut self,
        label: &str,
        result: &DiracResult<T>,
        expected: impl FnOnce(&crate::error::DiracError) -> bool,
    ) {
        let passed = result.as_ref().err().is_some_and(expected);
        self.check_bool(label, passed);
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Summary table, one line per check.
    #[must_use]
    pub fn summary(&self) -> String {
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
                "  {icon} [{}] {}: observed={:.6e}, expected={:.6e}, tol={:.2e} ({})",
                check.section,
                check.label,
                check.observed,
                check.expected,
                check.tolerance,
                check.mode
            );
        }
        s
    }

    /// Print summary and exit 0 if all checks pass, 1 otherwise.
    pub fn finish(&self) -> ! {
        println!();
        print!("{}", self.summary());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiracError;

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
        h.check_rel("obs_large", 1.0, 0.0, 1e-10);
        assert!(h.checks[0].passed);
        assert!(!h.checks[1].passed);
    }

    #[test]
    fn upper_bound_is_strict() {
        let mut h = ValidationHarness::new("test");
        h.check_upper("below", 0.5, 1.0);
        h.check_upper("at", 1.0, 1.0);
        assert!(h.checks[0].passed);
        assert!(!h.checks[1].passed);
    }

    #[test]
    fn check_err_matches_kind() {
        let mut h = ValidationHarness::new("test");
        let unsupported: DiracResult<()> = Err(DiracError::unsupported("x"));
        h.check_err("kind", &unsupported, |e| matches!(e, DiracError::Unsupported(_)));
        h.check_err("wrong kind", &unsupported, |e| matches!(e, DiracError::Param(_)));
        h.check_err("no error", &Ok(()), |_| true);
        assert_eq!(h.passed_count(), 1);
    }

    #[test]
    fn summary_names_sections_and_counts() {
        let mut h = ValidationHarness::new("dirac");
        h.section("wilson");
        h.check_bool("a", true);
        h.section("clover");
        h.check_abs("b", 2.0, 1.0, 0.1);
        let s = h.summary();
        assert!(s.contains("1/2"));
        assert!(s.contains("[wilson] a"));
        assert!(s.contains("[clover] b"));
        assert!(s.contains('✗'));
    }

    #[test]
    fn tolerance_mode_display() {
        assert_eq!(ToleranceMode::Absolute.to_string(), "abs");
        assert_eq!(ToleranceMode::Relative.to_string(), "rel");
        assert_eq!(ToleranceMode::UpperBound.to_string(), "<");
        assert_eq!(ToleranceMode::Outcome.to_string(), "ok");
    }
}
