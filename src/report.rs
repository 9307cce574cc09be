use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::error::{GridError, IndicatorError};

/// Outcome of comparing a quantity before and after a transformation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConservationCheck {
    pub stage: String,
    pub expected: f64,
    pub actual: f64,
    pub tolerance: f64,
}

impl ConservationCheck {
    /// Integer totals must match exactly.
    pub fn exact(stage: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self { stage: stage.into(), expected: expected as f64, actual: actual as f64, tolerance: 0.0 }
    }

    pub fn approx(stage: impl Into<String>, expected: f64, actual: f64, tolerance: f64) -> Self {
        Self { stage: stage.into(), expected, actual, tolerance }
    }

    #[inline] pub fn difference(&self) -> f64 { (self.actual - self.expected).abs() }

    #[inline]
    pub fn passed(&self) -> bool {
        if self.tolerance == 0.0 { self.expected == self.actual }
        else { self.difference() <= self.tolerance }
    }

    /// Escalate a failed check into an error.
    pub fn into_result(self) -> Result<(), GridError> {
        if self.passed() { Ok(()) } else { Err(GridError::Conservation(self)) }
    }

    /// Log the check if it failed, returning it unchanged.
    pub(crate) fn logged(self) -> Self {
        if !self.passed() { warn!("{self}") }
        self
    }
}

impl fmt::Display for ConservationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "conserved" } else { "NOT conserved" };
        write!(f, "[{}] {verdict}: expected total {} vs final total {} (tolerance {})",
            self.stage, self.expected, self.actual, self.tolerance)
    }
}

/// Why an indicator produced no output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingVariable,
    DuplicateValue { region: String },
    ResourceExhaustion { estimated_bytes: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    pub indicator: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// End-of-run summary of a batch over many indicators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub skipped: Vec<Skipped>,
    pub conservation: Vec<ConservationCheck>,
}

impl BatchReport {
    pub(crate) fn skip(&mut self, error: IndicatorError) {
        warn!("skipping indicator: {error}");
        let skipped = match error {
            IndicatorError::MissingVariable { indicator, .. } =>
                Skipped { indicator, reason: SkipReason::MissingVariable },
            IndicatorError::DuplicateValue { indicator, region } =>
                Skipped { indicator, reason: SkipReason::DuplicateValue { region } },
            IndicatorError::ResourceExhaustion { indicator, estimated_bytes } =>
                Skipped { indicator, reason: SkipReason::ResourceExhaustion { estimated_bytes } },
        };
        self.skipped.push(skipped);
    }

    /// Conservation checks that fell outside their tolerance.
    pub fn failed_checks(&self) -> impl Iterator<Item = &ConservationCheck> + '_ {
        self.conservation.iter().filter(|c| !c.passed())
    }

    /// True when every requested indicator succeeded and every check passed.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed_checks().next().is_none()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.skipped.extend(other.skipped);
        self.conservation.extend(other.conservation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_checks_require_equality() {
        assert!(ConservationCheck::exact("align", 15, 15).passed());
        assert!(!ConservationCheck::exact("align", 15, 14).passed());
    }

    #[test]
    fn approx_checks_respect_tolerance() {
        assert!(ConservationCheck::approx("coarsen", 100.0, 100.0005, 1e-3).passed());
        assert!(!ConservationCheck::approx("coarsen", 100.0, 100.01, 1e-3).passed());
    }

    #[test]
    fn failed_check_escalates_to_error() {
        let err = ConservationCheck::exact("tile", 17, 16).into_result().unwrap_err();
        assert!(matches!(err, GridError::Conservation(_)));
        assert!(err.to_string().contains("NOT conserved"));
    }

    #[test]
    fn report_tracks_skips_and_failures() {
        let mut report = BatchReport::default();
        report.succeeded.push("EP_POV".into());
        report.skip(IndicatorError::MissingVariable { indicator: "EP_UNEMP".into(), year: 2018 });
        report.conservation.push(ConservationCheck::approx("EP_POV", 1.0, 1.0, 1e-3));
        assert!(!report.is_clean());
        assert_eq!(report.skipped[0].indicator, "EP_UNEMP");
        assert_eq!(report.failed_checks().count(), 0);

        report.conservation.push(ConservationCheck::approx("EP_POV", 1.0, 2.0, 1e-3));
        assert_eq!(report.failed_checks().count(), 1);
    }
}
