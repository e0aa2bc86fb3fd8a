use crate::config::{AgentConfig, BenchConfig};
use crate::error::Result;
use crate::process::run_with_deadline;
use crate::task::Task;
use crate::write_json_pretty;
use bench_metrics::{AgencyOutcome, ErrorKind, ErrorReport, KpiSet, TokenUsage};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::info;

static ITERATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)iteration|retry|fix loop").expect("iteration regex"));
static TOKENS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)tokens:\s*(\d+)\s*input,\s*(\d+)\s*output").expect("tokens regex")
});
static ERROR_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)error[:\s]+[^\n]+").expect("error regex"));

/// Structured view of one agent run, mined from its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub success: bool,
    pub autonomous: bool,
    pub kpis_passed: KpiSet,
    pub iterations: u32,
    pub errors: Vec<ErrorReport>,
    pub token_usage: Option<TokenUsage>,
    pub pm_output: Option<Value>,
    pub discovery_output: Option<Value>,
    pub exit_code: Option<i32>,
}

impl AgentOutcome {
    pub fn agency_outcome(&self) -> AgencyOutcome {
        AgencyOutcome {
            success: self.success,
            autonomous: self.autonomous,
            kpis_passed: self.kpis_passed,
            iterations: self.iterations,
            pm_output: self.pm_output.clone(),
            discovery_output: self.discovery_output.clone(),
        }
    }
}

/// Best-effort pattern mining over agent output. A KPI is only judged when
/// its tool visibly ran; otherwise it stays false.
pub fn parse_agent_output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> AgentOutcome {
    let mut kpis = KpiSet::default();
    if stdout.contains("TypeScript") || stdout.contains("type-check") {
        kpis.typescript = !stdout.contains("TS error") && !stderr.contains("TS error");
    }
    if stdout.contains("ESLint") || stdout.contains("lint") {
        kpis.lint = !stdout.contains('✖') && !stdout.contains("error");
    }
    if stdout.contains("build") || stdout.contains("vite build") {
        kpis.build = stdout.contains("built in") || !stdout.contains("failed");
    }
    if stdout.contains("test") || stdout.contains("vitest") {
        kpis.tests = stdout.contains("passed") && !stdout.contains("failed");
    }

    let iterations = match ITERATION_RE.find_iter(stdout).count() {
        0 => 1,
        n => u32::try_from(n).unwrap_or(u32::MAX),
    };

    let token_usage = TOKENS_RE.captures(stdout).and_then(|caps| {
        let input = caps.get(1)?.as_str().parse().ok()?;
        let output = caps.get(2)?.as_str().parse().ok()?;
        Some(TokenUsage::new("unknown", input, output))
    });

    let errors = ERROR_LINE_RE
        .find_iter(stdout)
        .map(|m| {
            ErrorReport::new(m.as_str())
                .kind(ErrorKind::Runtime)
                .phase("execution")
        })
        .collect();

    AgentOutcome {
        success: exit_code == Some(0),
        autonomous: true,
        kpis_passed: kpis,
        iterations,
        errors,
        token_usage,
        pm_output: None,
        discovery_output: None,
        exit_code,
    }
}

/// Launches the agent for one task and turns its output into an outcome.
#[derive(Debug, Clone)]
pub struct AgentInvoker {
    agency_path: PathBuf,
    agent: AgentConfig,
    timeout: Duration,
}

impl AgentInvoker {
    pub fn new(agency_path: impl Into<PathBuf>, agent: AgentConfig, timeout: Duration) -> Self {
        Self {
            agency_path: agency_path.into(),
            agent,
            timeout,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(
            config.agency_path.clone(),
            config.agent.clone(),
            config.agent_timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn descriptor_path(&self, task_id: &str) -> PathBuf {
        self.agency_path
            .join(&self.agent.task_dir)
            .join(format!("benchmark-{}.json", task_id))
    }

    fn write_descriptor(&self, task: &Task) -> Result<PathBuf> {
        let path = self.descriptor_path(&task.id);
        let descriptor = json!({
            "id": task.id,
            "description": task.description,
            "status": "pending",
            "priority": "high",
            "created_at": Utc::now().to_rfc3339(),
        });
        write_json_pretty(&path, &descriptor)?;
        Ok(path)
    }

    fn command(&self, task_id: &str, cwd: &Path) -> Command {
        let (program, args) = match self.agent.command.split_first() {
            Some((program, args)) => (program.as_str(), args),
            None => ("", &[][..]),
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.arg("--task").arg(task_id);
        cmd.current_dir(cwd);
        cmd.env(&self.agent.mode_env, "true");
        cmd
    }

    pub fn invoke(&self, task: &Task) -> Result<AgentOutcome> {
        let descriptor = self.write_descriptor(task)?;
        info!(task_id = %task.id, descriptor = %descriptor.display(), "invoking agent");
        let cmd = self.command(&task.id, &self.agency_path);
        let output = run_with_deadline(cmd, &task.id, self.timeout, self.agent.echo_output)?;
        let outcome = parse_agent_output(&output.stdout, &output.stderr, output.code());
        info!(
            task_id = %task.id,
            exit_code = ?outcome.exit_code,
            iterations = outcome.iterations,
            "agent finished"
        );
        Ok(outcome)
    }
}
