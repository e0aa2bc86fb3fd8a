//! Code quality measurements: lint, type-check, coverage, and an optional
//! externally evaluated quality score filled in after the fact.

use crate::stats::{mean, mean_or_zero, percent, round_to};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CODE_QUALITY_MAX: f64 = 10.0;
pub const CODE_QUALITY_PASS: f64 = 7.0;

/// A check either produced a report or failed with a message that is kept
/// inline in the measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Check<T> {
    Measured(T),
    Failed { error: String },
}

impl<T> Check<T> {
    pub fn failed(error: impl Into<String>) -> Self {
        Check::Failed {
            error: error.into(),
        }
    }

    pub fn measured(&self) -> Option<&T> {
        match self {
            Check::Measured(report) => Some(report),
            Check::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintReport {
    pub files_checked: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub score: f64,
    pub passed: bool,
}

impl LintReport {
    pub fn from_counts(files_checked: usize, total_errors: usize, total_warnings: usize) -> Self {
        Self {
            files_checked,
            total_errors,
            total_warnings,
            score: round_to(lint_score(total_errors, total_warnings), 1),
            passed: total_errors == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCheckReport {
    pub error_count: usize,
    pub output: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentCoverage {
    pub coverage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statements: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentCoverage {
    pub fn percent(coverage: f64) -> Self {
        Self {
            coverage,
            ..Self::default()
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub frontend: ComponentCoverage,
    pub backend: ComponentCoverage,
    pub average: f64,
    pub passed: bool,
}

impl CoverageReport {
    pub fn new(frontend: ComponentCoverage, backend: ComponentCoverage, target: f64) -> Self {
        let average = blended_coverage(&frontend, &backend);
        Self {
            frontend,
            backend,
            average,
            passed: average >= target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeQuality {
    pub score: f64,
    pub max_score: f64,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMeasurement {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub lint: Option<Check<LintReport>>,
    pub typescript: Option<Check<TypeCheckReport>>,
    pub coverage: Option<Check<CoverageReport>>,
    pub code_quality: Option<CodeQuality>,
}

impl QualityMeasurement {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            lint: None,
            typescript: None,
            coverage: None,
            code_quality: None,
        }
    }

    pub fn lint_score(&self) -> Option<f64> {
        self.lint.as_ref()?.measured().map(|l| l.score)
    }

    pub fn coverage_average(&self) -> Option<f64> {
        self.coverage.as_ref()?.measured().map(|c| c.average)
    }

    pub fn type_check_passed(&self) -> bool {
        self.typescript
            .as_ref()
            .and_then(|t| t.measured())
            .map(|t| t.passed)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub tasks_measured: usize,
    pub avg_lint_score: f64,
    pub avg_coverage: f64,
    pub type_check_pass_rate: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityExport {
    pub measurements: Vec<QualityMeasurement>,
    pub summary: QualitySummary,
}

/// 10 for a clean run, minus 2 per error and 0.5 per warning, floored at 0.
pub fn lint_score(errors: usize, warnings: usize) -> f64 {
    (10.0 - errors as f64 * 2.0 - warnings as f64 * 0.5).max(0.0)
}

/// Mean of the components that reported a positive percentage.
pub fn blended_coverage(frontend: &ComponentCoverage, backend: &ComponentCoverage) -> f64 {
    let reported: Vec<f64> = [frontend.coverage, backend.coverage]
        .into_iter()
        .filter(|c| *c > 0.0)
        .collect();
    mean_or_zero(&reported)
}

/// Mean of lint (0-10), coverage (0-100) and type-check pass fraction, each
/// rescaled to 0-10.
pub fn overall_quality_score(
    avg_lint: f64,
    avg_coverage: f64,
    type_check_passes: usize,
    total: usize,
) -> f64 {
    let coverage_score = avg_coverage / 10.0;
    let type_check_score = percent(type_check_passes, total) / 10.0;
    (avg_lint + coverage_score + type_check_score) / 3.0
}

#[derive(Debug, Default)]
pub struct QualityStore {
    measurements: Vec<QualityMeasurement>,
}

impl QualityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, measurement: QualityMeasurement) -> QualityMeasurement {
        self.measurements.push(measurement.clone());
        measurement
    }

    pub fn measurement(&self, task_id: &str) -> Option<&QualityMeasurement> {
        self.measurements.iter().find(|m| m.task_id == task_id)
    }

    pub fn measurements(&self) -> &[QualityMeasurement] {
        &self.measurements
    }

    /// Back-fills the first measurement for `task_id`. Returns false when the
    /// task was never measured.
    pub fn set_code_quality_score(&mut self, task_id: &str, score: f64, details: Option<Value>) -> bool {
        match self.measurements.iter_mut().find(|m| m.task_id == task_id) {
            Some(measurement) => {
                measurement.code_quality = Some(CodeQuality {
                    score,
                    max_score: CODE_QUALITY_MAX,
                    passed: score >= CODE_QUALITY_PASS,
                    details,
                });
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> QualitySummary {
        let lint_scores: Vec<f64> = self.measurements.iter().filter_map(|m| m.lint_score()).collect();
        let coverages: Vec<f64> = self
            .measurements
            .iter()
            .filter_map(|m| m.coverage_average())
            .collect();
        let type_check_passes = self
            .measurements
            .iter()
            .filter(|m| m.type_check_passed())
            .count();

        let avg_lint = mean(&lint_scores).unwrap_or(0.0);
        let avg_coverage = mean(&coverages).unwrap_or(0.0);
        QualitySummary {
            tasks_measured: self.measurements.len(),
            avg_lint_score: avg_lint,
            avg_coverage,
            type_check_pass_rate: percent(type_check_passes, self.measurements.len()),
            quality_score: overall_quality_score(
                avg_lint,
                avg_coverage,
                type_check_passes,
                self.measurements.len(),
            ),
        }
    }

    pub fn export(&self) -> QualityExport {
        QualityExport {
            measurements: self.measurements.clone(),
            summary: self.summary(),
        }
    }

    pub fn reset(&mut self) {
        self.measurements.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured(task_id: &str, lint: LintReport, coverage: f64, ts_passed: bool) -> QualityMeasurement {
        let mut m = QualityMeasurement::new(task_id);
        m.lint = Some(Check::Measured(lint));
        m.typescript = Some(Check::Measured(TypeCheckReport {
            error_count: if ts_passed { 0 } else { 3 },
            output: String::new(),
            passed: ts_passed,
        }));
        m.coverage = Some(Check::Measured(CoverageReport::new(
            ComponentCoverage::percent(coverage),
            ComponentCoverage::percent(0.0),
            80.0,
        )));
        m
    }

    #[test]
    fn lint_score_penalises_and_floors_at_zero() {
        assert_eq!(lint_score(0, 0), 10.0);
        assert_eq!(lint_score(1, 3), 6.5);
        assert_eq!(lint_score(10, 0), 0.0);
        let report = LintReport::from_counts(4, 0, 1);
        assert_eq!(report.score, 9.5);
        assert!(report.passed);
    }

    #[test]
    fn blended_coverage_ignores_sources_without_data() {
        let front = ComponentCoverage::percent(70.0);
        let back = ComponentCoverage::percent(90.0);
        assert_eq!(blended_coverage(&front, &back), 80.0);
        assert_eq!(blended_coverage(&front, &ComponentCoverage::unavailable("missing")), 70.0);
        assert_eq!(
            blended_coverage(&ComponentCoverage::default(), &ComponentCoverage::default()),
            0.0
        );
    }

    #[test]
    fn summary_combines_lint_coverage_and_type_check() {
        let mut store = QualityStore::new();
        store.record(measured("a", LintReport::from_counts(1, 0, 0), 80.0, true));
        store.record(measured("b", LintReport::from_counts(1, 1, 0), 60.0, false));

        let summary = store.summary();
        assert_eq!(summary.tasks_measured, 2);
        assert_eq!(summary.avg_lint_score, 9.0);
        assert_eq!(summary.avg_coverage, 70.0);
        assert_eq!(summary.type_check_pass_rate, 50.0);
        // (9 + 7 + 5) / 3
        assert!((summary.quality_score - 7.0).abs() < 1e-9);
    }

    #[test]
    fn failed_checks_are_excluded_from_averages() {
        let mut store = QualityStore::new();
        let mut m = QualityMeasurement::new("a");
        m.lint = Some(Check::failed("eslint not found"));
        m.typescript = Some(Check::failed("tsconfig.json not found"));
        store.record(m);

        let summary = store.summary();
        assert_eq!(summary.avg_lint_score, 0.0);
        assert_eq!(summary.type_check_pass_rate, 0.0);
        assert_eq!(summary.quality_score, 0.0);
        assert_eq!(QualityStore::new().summary().quality_score, 0.0);
    }

    #[test]
    fn code_quality_is_back_filled_by_task_id() {
        let mut store = QualityStore::new();
        store.record(QualityMeasurement::new("a"));
        assert!(store.set_code_quality_score("a", 8.0, None));
        assert!(!store.set_code_quality_score("missing", 8.0, None));
        let cq = store.measurement("a").and_then(|m| m.code_quality.clone()).expect("cq");
        assert!(cq.passed);
        assert_eq!(cq.max_score, 10.0);
    }

    #[test]
    fn failed_check_serializes_as_error_object() {
        let check: Check<LintReport> = Check::failed("boom");
        let value = serde_json::to_value(&check).expect("serialize");
        assert_eq!(value, serde_json::json!({"error": "boom"}));
    }
}
