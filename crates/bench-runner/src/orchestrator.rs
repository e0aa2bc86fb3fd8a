use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::invoker::AgentInvoker;
use crate::probe::{QualityProbe, ToolchainProbe};
use crate::report::{synthesize, write_report, BenchSummary, ReportPaths};
use crate::results::{ResultsFile, Run, RunMetrics};
use crate::snapshot::WorkspaceSnapshotter;
use crate::task::{load_task, task_files, Task};
use bench_metrics::{ErrorKind, ErrorReport, MetricStores, PHASE_AGENCY, PHASE_TOTAL};
use std::path::Path;
use tracing::{error, info, warn};

pub const PHASE_INVOCATION: &str = "agency-invocation";
pub const PHASE_TASK_LOAD: &str = "task-load";
pub const PHASE_PREPARE: &str = "workspace-prepare";
pub const PHASE_RESET: &str = "workspace-reset";

/// Drives trials against one workspace and owns every metric store for the
/// campaign. Trials run one at a time; the workspace is not shareable.
pub struct TrialOrchestrator {
    config: BenchConfig,
    stores: MetricStores,
    invoker: AgentInvoker,
    snapshotter: WorkspaceSnapshotter,
    probe: Box<dyn QualityProbe>,
    results: ResultsFile,
}

impl TrialOrchestrator {
    pub fn new(config: BenchConfig) -> Result<Self> {
        let probe = Box::new(ToolchainProbe::from_config(&config));
        Self::with_probe(config, probe)
    }

    pub fn with_probe(config: BenchConfig, probe: Box<dyn QualityProbe>) -> Result<Self> {
        let results = ResultsFile::load(&config.results_path)?;
        Ok(Self {
            stores: MetricStores::new(config.price_table()),
            invoker: AgentInvoker::from_config(&config),
            snapshotter: WorkspaceSnapshotter::new(
                config.project_path.clone(),
                config.snapshot.clone(),
            ),
            probe,
            results,
            config,
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn stores(&self) -> &MetricStores {
        &self.stores
    }

    pub fn stores_mut(&mut self) -> &mut MetricStores {
        &mut self.stores
    }

    pub fn snapshotter(&self) -> &WorkspaceSnapshotter {
        &self.snapshotter
    }

    pub fn runs(&self) -> &[Run] {
        &self.results.runs
    }

    pub fn results(&self) -> &ResultsFile {
        &self.results
    }

    fn persist(&self) -> Result<()> {
        self.results.save(&self.config.results_path)
    }

    fn push_run(&mut self, run: Run) -> Run {
        self.results.runs.push(run.clone());
        if let Err(e) = self.persist() {
            error!(
                path = %self.config.results_path.display(),
                error = %e,
                "failed to persist results"
            );
        }
        run
    }

    fn record_execution_error(&mut self, task_id: &str, phase: &str, err: &BenchError) {
        let report = ErrorReport::new(err.to_string())
            .kind(ErrorKind::Execution)
            .phase(phase)
            .unrecoverable();
        self.stores.errors.record_error(task_id, report);
    }

    /// Logs a run that never reached the agent.
    fn abort_run(&mut self, task_id: &str, task: Option<Task>, phase: &str, err: BenchError) -> Run {
        error!(task_id, phase, error = %err, "trial aborted");
        self.record_execution_error(task_id, phase, &err);
        let mut run = Run::start(task_id, task);
        run.fail(err.to_string());
        self.push_run(run)
    }

    fn execute(&mut self, task: &Task) -> Result<(bool, Option<u64>, RunMetrics)> {
        let id = task.id.as_str();
        let outcome = self.invoker.invoke(task)?;
        let total = self.stores.timing.stop_timer(id, PHASE_TOTAL);
        self.stores.timing.stop_timer(id, PHASE_AGENCY);

        let agency = self
            .stores
            .agency
            .record_task_result(id, outcome.agency_outcome());
        for report in &outcome.errors {
            self.stores.errors.record_error(id, report.clone());
        }
        let quality = self.stores.quality.record(self.probe.measure(id));
        if let Some(usage) = &outcome.token_usage {
            self.stores.tokens.record_usage(id, usage.clone());
        }
        info!(
            task_id = id,
            lint_score = ?quality.lint_score(),
            type_check_passed = quality.type_check_passed(),
            coverage = ?quality.coverage_average(),
            "quality measured"
        );

        let metrics = RunMetrics {
            timing: self.stores.timing.task_measurements(id),
            quality,
            agency,
        };
        Ok((outcome.success, total.map(|m| m.duration_ms), metrics))
    }

    /// Runs one trial in the workspace as it currently is. Failures end up
    /// in the run and the error store; they are never returned.
    pub fn run_task(&mut self, task: Task) -> Run {
        let task_id = task.id.clone();
        info!(
            task_id = %task_id,
            name = task.display_name(),
            description = %task.description,
            "starting trial"
        );
        let mut run = Run::start(&task_id, Some(task.clone()));
        self.stores.timing.start_timer(&task_id, PHASE_TOTAL);
        self.stores.timing.start_timer(&task_id, PHASE_AGENCY);

        match self.execute(&task) {
            Ok((success, duration_ms, metrics)) => {
                run.finish(success, duration_ms, metrics);
                info!(
                    task_id = %task_id,
                    status = %run.status,
                    duration_ms = ?run.duration_ms,
                    "trial finished"
                );
            }
            Err(err) => {
                error!(task_id = %task_id, error = %err, timeout = err.is_timeout(), "trial failed");
                self.record_execution_error(&task_id, PHASE_INVOCATION, &err);
                self.stores.timing.cancel_timer(&task_id, PHASE_TOTAL);
                self.stores.timing.cancel_timer(&task_id, PHASE_AGENCY);
                run.fail(err.to_string());
            }
        }
        self.push_run(run)
    }

    pub fn run_task_file(&mut self, path: &Path) -> Run {
        match load_task(path) {
            Ok(task) => self.run_task(task),
            Err(err) => {
                let id = task_id_from_path(path);
                self.abort_run(&id, None, PHASE_TASK_LOAD, err)
            }
        }
    }

    /// prepare → trial → reset. With `restore` false the workspace is used
    /// as is.
    fn trial_in_workspace(&mut self, path: &Path, restore: bool) -> Run {
        let task = match load_task(path) {
            Ok(task) => task,
            Err(err) => {
                let id = task_id_from_path(path);
                return self.abort_run(&id, None, PHASE_TASK_LOAD, err);
            }
        };
        if restore {
            if let Err(err) = self.snapshotter.prepare() {
                let id = task.id.clone();
                return self.abort_run(&id, Some(task), PHASE_PREPARE, err);
            }
        }
        let run = self.run_task(task);
        if restore {
            if let Err(err) = self.snapshotter.reset() {
                warn!(task_id = %run.task_id, error = %err, "workspace reset failed");
                self.record_execution_error(&run.task_id, PHASE_RESET, &err);
            }
        }
        run
    }

    /// Single trial. The workspace is restored around it only when a
    /// baseline exists.
    pub fn run_single(&mut self, path: &Path) -> Run {
        let restore = self.snapshotter.verify_baseline();
        if !restore {
            warn!("no baseline found; running against the current workspace");
        }
        self.trial_in_workspace(path, restore)
    }

    /// Every `*.json` task in `dir`, in file-name order, each from a freshly
    /// restored workspace. Creates the baseline first if it is missing.
    pub fn run_batch(&mut self, dir: &Path) -> Result<Vec<Run>> {
        let files = task_files(dir)?;
        info!(count = files.len(), dir = %dir.display(), "running batch");
        if !self.snapshotter.verify_baseline() {
            warn!("no baseline found, setting up");
            self.snapshotter.setup_baseline()?;
        }
        let mut runs = Vec::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            info!(
                index = i + 1,
                total = files.len(),
                file = %file.display(),
                "batch task"
            );
            runs.push(self.trial_in_workspace(file, true));
        }
        self.generate_summary()?;
        Ok(runs)
    }

    pub fn generate_summary(&mut self) -> Result<BenchSummary> {
        let summary = synthesize(&self.results.runs, &self.stores);
        self.results.summary = Some(summary.clone());
        self.persist()?;
        Ok(summary)
    }

    /// The stored summary, or a fresh one when none was generated yet.
    pub fn status(&mut self) -> Result<BenchSummary> {
        match &self.results.summary {
            Some(summary) => Ok(summary.clone()),
            None => self.generate_summary(),
        }
    }

    pub fn report(&mut self) -> Result<(BenchSummary, ReportPaths)> {
        let summary = self.status()?;
        let paths = write_report(&self.config.reports_dir, &summary)?;
        info!(markdown = %paths.markdown.display(), json = %paths.json.display(), "report written");
        Ok((summary, paths))
    }
}

fn task_id_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
