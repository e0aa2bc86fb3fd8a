use crate::error::Result;
use crate::report::BenchSummary;
use crate::task::Task;
use crate::write_json_pretty;
use bench_metrics::{QualityMeasurement, TaskResult, TimingMeasurement};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run snapshot of what the stores recorded for the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub timing: Vec<TimingMeasurement>,
    pub quality: QualityMeasurement,
    pub agency: TaskResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Run {
    pub fn start(task_id: &str, task: Option<Task>) -> Self {
        Self {
            task_id: task_id.to_string(),
            task,
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::Running,
            duration_ms: None,
            metrics: None,
            error: None,
        }
    }

    /// Moves a running run to `completed` or `failed`. A run that already
    /// reached a terminal state is left untouched.
    pub fn finish(&mut self, success: bool, duration_ms: Option<u64>, metrics: RunMetrics) {
        if self.status.is_terminal() {
            return;
        }
        self.end_time = Some(Utc::now());
        self.status = if success {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.duration_ms = duration_ms;
        self.metrics = Some(metrics);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.end_time = Some(Utc::now());
        self.status = RunStatus::Error;
        self.error = Some(message.into());
    }
}

/// On-disk shape of the results file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub summary: Option<BenchSummary>,
}

impl ResultsFile {
    /// Loads `path`, or an empty log when it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_pretty(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_metrics::{AgencyOutcome, AgencyStore, KpiSet};

    fn metrics(task_id: &str) -> RunMetrics {
        let mut agency = AgencyStore::new();
        let result = agency.record_task_result(
            task_id,
            AgencyOutcome {
                success: true,
                autonomous: true,
                kpis_passed: KpiSet::all_passed(),
                iterations: 1,
                pm_output: None,
                discovery_output: None,
            },
        );
        RunMetrics {
            timing: Vec::new(),
            quality: QualityMeasurement::new(task_id),
            agency: result,
        }
    }

    #[test]
    fn run_reaches_terminal_state_once() {
        let mut run = Run::start("t1", None);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.end_time.is_none());

        run.finish(false, Some(1200), metrics("t1"));
        assert_eq!(run.status, RunStatus::Failed);
        let ended = run.end_time;
        assert!(ended.is_some());

        run.fail("late error");
        run.finish(true, Some(1), metrics("t1"));
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.end_time, ended);
        assert_eq!(run.duration_ms, Some(1200));
        assert!(run.error.is_none());
    }

    #[test]
    fn results_file_survives_a_save_load_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/results.json");
        assert_eq!(ResultsFile::load(&path).expect("load"), ResultsFile::default());

        let mut run = Run::start("t1", Some(Task::new("t1", "desc")));
        run.fail("agent timeout exceeded");
        let results = ResultsFile {
            runs: vec![run],
            summary: None,
        };
        results.save(&path).expect("save");
        let loaded = ResultsFile::load(&path).expect("reload");
        assert_eq!(loaded.runs.len(), 1);
        assert_eq!(loaded.runs[0].status, RunStatus::Error);
        assert_eq!(loaded.runs[0].error.as_deref(), Some("agent timeout exceeded"));

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        assert_eq!(raw["runs"][0]["status"], "error");
    }
}
