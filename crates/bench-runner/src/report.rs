use crate::error::Result;
use crate::results::{Run, RunStatus};
use crate::{write_bytes_atomic, write_json_pretty};
use bench_metrics::stats::{mean_or_zero, percent};
use bench_metrics::{
    AgencySummary, ErrorSummary, MetricStores, QualitySummary, TimingSummary, TokenSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whole-campaign rollup of the run log and every metric store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchSummary {
    pub generated_at: DateTime<Utc>,
    pub total_runs: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub timing: Option<TimingSummary>,
    pub errors: ErrorSummary,
    pub tokens: TokenSummary,
    pub quality: QualitySummary,
    pub agency: AgencySummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

pub fn synthesize(runs: &[Run], stores: &MetricStores) -> BenchSummary {
    let completed = runs
        .iter()
        .filter(|r| r.status == RunStatus::Completed)
        .count();
    let durations: Vec<f64> = runs
        .iter()
        .filter_map(|r| r.duration_ms)
        .map(|d| d as f64)
        .collect();
    BenchSummary {
        generated_at: Utc::now(),
        total_runs: runs.len(),
        success_rate: percent(completed, runs.len()),
        avg_duration_ms: mean_or_zero(&durations),
        timing: stores.timing.summary(),
        errors: stores.errors.summary(),
        tokens: stores.tokens.summary(),
        quality: stores.quality.summary(),
        agency: stores.agency.summary(),
    }
}

fn table(out: &mut Vec<String>, title: &str, rows: &[(&str, String)]) {
    out.push(format!("## {}", title));
    out.push(String::new());
    out.push("| Metric | Value |".to_string());
    out.push("|--------|-------|".to_string());
    for (metric, value) in rows {
        out.push(format!("| {} | {} |", metric, value));
    }
    out.push(String::new());
}

fn dollars(amount: f64) -> String {
    format!("${:.4}", amount)
}

pub fn render_markdown(summary: &BenchSummary) -> String {
    let mut out = vec![
        "# Agent Benchmark Report".to_string(),
        String::new(),
        format!("Generated: {}", summary.generated_at.to_rfc3339()),
        String::new(),
    ];

    table(
        &mut out,
        "Overview",
        &[
            ("Total Runs", summary.total_runs.to_string()),
            ("Success Rate", format!("{:.1}%", summary.success_rate)),
            (
                "Avg Duration",
                format!("{:.1}s", summary.avg_duration_ms / 1000.0),
            ),
        ],
    );

    let (completion, throughput) = match &summary.timing {
        Some(t) => (
            format!("{:.2} min", t.avg_completion_time_min),
            format!("{:.2} tasks/hour", t.throughput_per_hour),
        ),
        None => ("N/A".to_string(), "N/A".to_string()),
    };
    table(
        &mut out,
        "Performance",
        &[
            ("Avg Completion Time", completion),
            ("Throughput", throughput),
        ],
    );

    let q = &summary.quality;
    table(
        &mut out,
        "Quality",
        &[
            ("Tasks Measured", q.tasks_measured.to_string()),
            ("Avg Lint Score", format!("{:.1}/10", q.avg_lint_score)),
            ("Avg Coverage", format!("{:.1}%", q.avg_coverage)),
            ("TypeScript Pass Rate", format!("{:.1}%", q.type_check_pass_rate)),
            ("Quality Score", format!("{:.1}/10", q.quality_score)),
        ],
    );

    let a = &summary.agency;
    let mut agency_rows = vec![
        ("Task Success Rate", format!("{:.1}%", a.task_success.success_rate)),
        ("Autonomous Rate", format!("{:.1}%", a.task_success.autonomous_rate)),
        (
            "First Try KPI Pass",
            format!("{:.1}%", a.kpi_stats.first_try_success_rate),
        ),
        ("Avg Iterations", format!("{:.1}", a.kpi_stats.avg_iterations)),
    ];
    if let Some(pm) = &a.pm_accuracy {
        agency_rows.push(("PM Intent Accuracy", format!("{:.1}%", pm.intent_accuracy)));
    }
    if let Some(fd) = &a.file_discovery {
        agency_rows.push(("File Discovery F1", format!("{:.1}", fd.avg_f1_score)));
    }
    table(&mut out, "Agency Metrics", &agency_rows);

    let t = &summary.tokens;
    table(
        &mut out,
        "Cost",
        &[
            ("Total Tokens", t.total_tokens.to_string()),
            ("Total Cost", dollars(t.total_cost)),
            ("Avg Cost/Task", dollars(t.avg_cost_per_task)),
        ],
    );

    let e = &summary.errors;
    table(
        &mut out,
        "Errors",
        &[
            ("Total Errors", e.rate.total_errors.to_string()),
            ("Total Retries", e.rate.total_retries.to_string()),
            ("Error Rate", format!("{:.2} errors/task", e.rate.error_rate)),
            ("Unrecoverable", e.unrecoverable_errors.to_string()),
        ],
    );

    out.push("---".to_string());
    out.push("*Generated by bench*".to_string());
    out.join("\n")
}

/// Writes `benchmark-<timestamp>.md` and `.json` side by side.
pub fn write_report(dir: &Path, summary: &BenchSummary) -> Result<ReportPaths> {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
    let paths = ReportPaths {
        markdown: dir.join(format!("benchmark-{}.md", stamp)),
        json: dir.join(format!("benchmark-{}.json", stamp)),
    };
    write_bytes_atomic(&paths.markdown, render_markdown(summary).as_bytes())?;
    write_json_pretty(&paths.json, summary)?;
    Ok(paths)
}
