use crate::config::{BenchConfig, QualityConfig};
use crate::error::Result;
use crate::process::{run_with_deadline, CapturedOutput};
use bench_metrics::stats::{mean, round_to};
use bench_metrics::{
    Check, ComponentCoverage, CoverageReport, LintReport, QualityMeasurement, TypeCheckReport,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

const TYPECHECK_OUTPUT_LIMIT: usize = 1000;

static COVERAGE_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"All files[|\s]+(\d+\.?\d*)").expect("coverage text regex"));
static GO_COVERAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"coverage:\s*(\d+\.?\d*)%").expect("go coverage regex"));

/// Measures code quality of the workspace after a trial.
pub trait QualityProbe {
    fn measure(&self, task_id: &str) -> QualityMeasurement;
}

/// Shells out to the project's lint, type-check and coverage tools. A tool
/// that is missing or fails degrades its own section and nothing else.
#[derive(Debug, Clone)]
pub struct ToolchainProbe {
    project_path: PathBuf,
    config: QualityConfig,
}

impl ToolchainProbe {
    pub fn new(project_path: impl Into<PathBuf>, config: QualityConfig) -> Self {
        Self {
            project_path: project_path.into(),
            config,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(config.project_path.clone(), config.quality.clone())
    }

    fn frontend(&self) -> PathBuf {
        self.project_path.join(&self.config.frontend_dir)
    }

    fn backend(&self) -> PathBuf {
        self.project_path.join(&self.config.backend_dir)
    }

    fn run_tool(&self, argv: &[String], cwd: &Path) -> Result<CapturedOutput> {
        let (program, args) = match argv.split_first() {
            Some(split) => split,
            None => {
                return Err(anyhow::anyhow!("empty tool command").into());
            }
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(cwd);
        debug!(tool = %argv.join(" "), cwd = %cwd.display(), "running quality tool");
        run_with_deadline(
            cmd,
            program,
            Duration::from_secs(self.config.tool_timeout_secs),
            false,
        )
    }

    pub fn lint(&self) -> Check<LintReport> {
        let dir = self.frontend();
        if !dir.exists() {
            return Check::failed("Frontend path not found");
        }
        let output = match self.run_tool(&self.config.lint_command, &dir) {
            Ok(output) => output,
            Err(e) => return Check::failed(e.to_string()),
        };
        match parse_eslint_json(&output.stdout) {
            Ok(report) => Check::Measured(report),
            Err(e) => Check::failed(e),
        }
    }

    pub fn type_check(&self) -> Check<TypeCheckReport> {
        let dir = self.frontend();
        if !dir.join("tsconfig.json").exists() {
            return Check::failed("tsconfig.json not found");
        }
        match self.run_tool(&self.config.typecheck_command, &dir) {
            Ok(output) => Check::Measured(type_check_report(&output.combined())),
            Err(e) => Check::failed(e.to_string()),
        }
    }

    fn frontend_coverage(&self) -> ComponentCoverage {
        let dir = self.frontend();
        if !dir.exists() {
            return ComponentCoverage::unavailable("Frontend path not found");
        }
        let output = match self.run_tool(&self.config.frontend_coverage_command, &dir) {
            Ok(output) => output,
            Err(e) => return ComponentCoverage::unavailable(e.to_string()),
        };
        let summary_path = dir.join(&self.config.coverage_summary);
        if summary_path.exists() {
            let parsed = fs::read_to_string(&summary_path)
                .map_err(|e| e.to_string())
                .and_then(|raw| parse_coverage_summary(&raw));
            return parsed.unwrap_or_else(|e| ComponentCoverage::unavailable(e));
        }
        if let Some(pct) = parse_coverage_text(&output.stdout) {
            return ComponentCoverage::percent(pct);
        }
        ComponentCoverage {
            note: Some("No coverage data found".to_string()),
            ..ComponentCoverage::default()
        }
    }

    fn backend_coverage(&self) -> ComponentCoverage {
        let dir = self.backend();
        if !dir.exists() {
            return ComponentCoverage::unavailable("Backend path not found");
        }
        match self.run_tool(&self.config.backend_coverage_command, &dir) {
            Ok(output) => parse_go_coverage(&output.stdout),
            Err(e) => ComponentCoverage::unavailable(e.to_string()),
        }
    }

    pub fn coverage(&self) -> Check<CoverageReport> {
        Check::Measured(CoverageReport::new(
            self.frontend_coverage(),
            self.backend_coverage(),
            self.config.coverage_target,
        ))
    }
}

impl QualityProbe for ToolchainProbe {
    fn measure(&self, task_id: &str) -> QualityMeasurement {
        let mut measurement = QualityMeasurement::new(task_id);
        let lint = self.lint();
        if let Check::Failed { error } = &lint {
            warn!(task_id, error = %error, "lint unavailable");
        }
        let typescript = self.type_check();
        if let Check::Failed { error } = &typescript {
            warn!(task_id, error = %error, "type check unavailable");
        }
        measurement.lint = Some(lint);
        measurement.typescript = Some(typescript);
        measurement.coverage = Some(self.coverage());
        measurement
    }
}

/// Sums per-file `errorCount`/`warningCount` from ESLint's JSON formatter.
pub fn parse_eslint_json(stdout: &str) -> std::result::Result<LintReport, String> {
    let trimmed = stdout.trim();
    let value: Value = if trimmed.is_empty() {
        Value::Array(Vec::new())
    } else {
        serde_json::from_str(trimmed).map_err(|e| format!("unreadable lint output: {}", e))?
    };
    let files = value
        .as_array()
        .ok_or_else(|| "lint output is not a JSON array".to_string())?;
    let count = |file: &Value, key: &str| {
        file.get(key).and_then(Value::as_u64).unwrap_or(0) as usize
    };
    let errors = files.iter().map(|f| count(f, "errorCount")).sum();
    let warnings = files.iter().map(|f| count(f, "warningCount")).sum();
    Ok(LintReport::from_counts(files.len(), errors, warnings))
}

pub fn count_type_errors(output: &str) -> usize {
    output.matches("error TS").count()
}

fn type_check_report(output: &str) -> TypeCheckReport {
    let error_count = count_type_errors(output);
    TypeCheckReport {
        error_count,
        output: output.chars().take(TYPECHECK_OUTPUT_LIMIT).collect(),
        passed: error_count == 0,
    }
}

/// Reads `total.{lines,statements,branches,functions}.pct` from an
/// istanbul `coverage-summary.json`. Lines coverage is the headline number.
pub fn parse_coverage_summary(raw: &str) -> std::result::Result<ComponentCoverage, String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let pct = |metric: &str| {
        value
            .pointer(&format!("/total/{}/pct", metric))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let lines = pct("lines");
    Ok(ComponentCoverage {
        coverage: lines,
        lines: Some(lines),
        statements: Some(pct("statements")),
        branches: Some(pct("branches")),
        functions: Some(pct("functions")),
        ..ComponentCoverage::default()
    })
}

/// Fallback for runners that only print the text table.
pub fn parse_coverage_text(stdout: &str) -> Option<f64> {
    COVERAGE_TEXT_RE
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Mean of every `coverage: N%` line of `go test -cover` output.
pub fn parse_go_coverage(stdout: &str) -> ComponentCoverage {
    let values: Vec<f64> = stdout
        .lines()
        .filter_map(|line| GO_COVERAGE_RE.captures(line))
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect();
    ComponentCoverage {
        coverage: mean(&values).map(|m| round_to(m, 1)).unwrap_or(0.0),
        packages: Some(values.len()),
        ..ComponentCoverage::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eslint_counts_are_summed() {
        let out = r#"[
            {"filePath": "a.ts", "errorCount": 1, "warningCount": 2},
            {"filePath": "b.vue", "errorCount": 0, "warningCount": 1}
        ]"#;
        let report = parse_eslint_json(out).expect("parse");
        assert_eq!(report.files_checked, 2);
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.total_warnings, 3);
        assert_eq!(report.score, 6.5);
        assert!(!report.passed);

        let empty = parse_eslint_json("").expect("empty");
        assert_eq!(empty.score, 10.0);
        assert!(empty.passed);
        assert!(parse_eslint_json("Oops, eslint crashed").is_err());
    }

    #[test]
    fn type_errors_are_counted_and_output_truncated() {
        let mut output = String::from(
            "src/a.ts(1,1): error TS2304: x\nsrc/b.ts(2,2): error TS2322: y\n",
        );
        output.push_str(&"x".repeat(2000));
        let report = type_check_report(&output);
        assert_eq!(report.error_count, 2);
        assert!(!report.passed);
        assert_eq!(report.output.chars().count(), TYPECHECK_OUTPUT_LIMIT);
    }

    #[test]
    fn coverage_summary_and_text_fallback() {
        let raw = r#"{"total": {
            "lines": {"pct": 82.5}, "statements": {"pct": 80},
            "branches": {"pct": 70.1}, "functions": {"pct": 90}
        }}"#;
        let cov = parse_coverage_summary(raw).expect("parse");
        assert_eq!(cov.coverage, 82.5);
        assert_eq!(cov.branches, Some(70.1));

        let text = "File      | % Stmts\nAll files |   64.3 |   50 |\n";
        assert_eq!(parse_coverage_text(text), Some(64.3));
        assert_eq!(parse_coverage_text("no table"), None);
    }

    #[test]
    fn go_coverage_is_averaged_per_package() {
        let out = "ok  a 0.1s coverage: 80.0% of statements\n\
                   ok  b 0.1s coverage: 65.5% of statements\n\
                   ?   c [no test files]\n";
        let cov = parse_go_coverage(out);
        assert_eq!(cov.packages, Some(2));
        assert_eq!(cov.coverage, 72.8);
        assert_eq!(parse_go_coverage("").coverage, 0.0);
    }

    #[test]
    fn missing_project_dirs_degrade_each_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let probe = ToolchainProbe::new(dir.path(), QualityConfig::default());
        let m = probe.measure("t1");
        assert_eq!(
            m.lint,
            Some(Check::failed("Frontend path not found"))
        );
        assert_eq!(
            m.typescript,
            Some(Check::failed("tsconfig.json not found"))
        );
        let coverage = m
            .coverage
            .as_ref()
            .and_then(Check::measured)
            .expect("coverage report");
        assert_eq!(coverage.average, 0.0);
        assert!(!coverage.passed);
        assert_eq!(
            coverage.backend.error.as_deref(),
            Some("Backend path not found")
        );
    }

    #[test]
    fn configured_tools_are_run_in_the_frontend_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("frontend")).expect("mkdir");
        fs::write(dir.path().join("frontend/tsconfig.json"), "{}").expect("write");
        let sh = |script: &str| vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        let config = QualityConfig {
            lint_command: sh(r#"echo '[{"errorCount":0,"warningCount":2}]'"#),
            typecheck_command: sh("echo 'a.ts: error TS1005' 1>&2; exit 2"),
            frontend_coverage_command: sh("echo 'All files | 91.2 |'"),
            ..QualityConfig::default()
        };
        let probe = ToolchainProbe::new(dir.path(), config);
        let m = probe.measure("t1");
        assert_eq!(m.lint_score(), Some(9.0));
        assert!(!m.type_check_passed());
        assert_eq!(m.coverage_average(), Some(91.2));
    }
}
