use crate::error::{BenchError, Result};
use bench_metrics::{ModelPrice, PriceTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "BENCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "bench.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub project_path: PathBuf,
    pub agency_path: PathBuf,
    pub agent: AgentConfig,
    pub kpi_thresholds: KpiThresholds,
    pub quality: QualityConfig,
    pub snapshot: SnapshotConfig,
    pub pricing: BTreeMap<String, ModelPrice>,
    pub results_path: PathBuf,
    pub reports_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Program and leading arguments; `--task <id>` is appended.
    pub command: Vec<String>,
    pub task_dir: PathBuf,
    pub mode_env: String,
    pub echo_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiThresholds {
    pub max_completion_time_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub frontend_dir: PathBuf,
    pub backend_dir: PathBuf,
    pub lint_command: Vec<String>,
    pub typecheck_command: Vec<String>,
    pub frontend_coverage_command: Vec<String>,
    pub backend_coverage_command: Vec<String>,
    pub coverage_summary: PathBuf,
    pub tool_timeout_secs: u64,
    pub coverage_target: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub baseline_tag: String,
    pub baseline_branch: String,
    /// Untracked paths the clean step leaves in place.
    pub preserve: Vec<String>,
    pub reinstall_command: Vec<String>,
    pub reinstall_dir: PathBuf,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            project_path: PathBuf::from("."),
            agency_path: PathBuf::from("."),
            agent: AgentConfig::default(),
            kpi_thresholds: KpiThresholds::default(),
            quality: QualityConfig::default(),
            snapshot: SnapshotConfig::default(),
            pricing: BTreeMap::new(),
            results_path: PathBuf::from("results.json"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: argv(&["node", "orchestrator.cjs"]),
            task_dir: PathBuf::from("tasks"),
            mode_env: "BENCHMARK_MODE".to_string(),
            echo_output: true,
        }
    }
}

impl Default for KpiThresholds {
    fn default() -> Self {
        Self {
            max_completion_time_minutes: 30.0,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            frontend_dir: PathBuf::from("frontend"),
            backend_dir: PathBuf::from("backend"),
            lint_command: argv(&[
                "npx",
                "eslint",
                ".",
                "--ext",
                ".vue,.js,.jsx,.cjs,.mjs,.ts,.tsx",
                "--format",
                "json",
            ]),
            typecheck_command: argv(&["npx", "tsc", "--noEmit"]),
            frontend_coverage_command: argv(&[
                "npm",
                "run",
                "test:unit",
                "--",
                "--coverage",
                "--reporter=json-summary",
            ]),
            backend_coverage_command: argv(&["go", "test", "./...", "-cover", "-json"]),
            coverage_summary: PathBuf::from("coverage/coverage-summary.json"),
            tool_timeout_secs: 60,
            coverage_target: 80.0,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            baseline_tag: "benchmark-baseline".to_string(),
            baseline_branch: "benchmark-base".to_string(),
            preserve: argv(&["node_modules"]),
            reinstall_command: argv(&["npm", "ci"]),
            reinstall_dir: PathBuf::from("frontend"),
        }
    }
}

impl BenchConfig {
    /// `$BENCH_CONFIG`, else `./bench.json`. A missing file means defaults.
    pub fn discover() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if !path.exists() {
            let base = std::env::current_dir()?;
            return Ok(Self::default().resolved_against(&base));
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config_err = |message: String| BenchError::Config {
            path: path.to_path_buf(),
            message,
        };
        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );
        let value: Value = if is_yaml {
            let yaml_value: serde_yaml::Value =
                serde_yaml::from_str(&raw).map_err(|e| config_err(e.to_string()))?;
            serde_json::to_value(yaml_value).map_err(|e| config_err(e.to_string()))?
        } else {
            serde_json::from_str(&raw).map_err(|e| config_err(e.to_string()))?
        };
        let config: BenchConfig =
            serde_json::from_value(value).map_err(|e| config_err(e.to_string()))?;
        config.validate().map_err(config_err)?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config.resolved_against(&base))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.agent.command.is_empty() {
            return Err("agent.command must not be empty".to_string());
        }
        if !(self.kpi_thresholds.max_completion_time_minutes > 0.0) {
            return Err("kpi_thresholds.max_completion_time_minutes must be positive".to_string());
        }
        Ok(())
    }

    /// Makes the top-level paths absolute relative to `base`. Paths nested in
    /// `quality`, `snapshot` and `agent` stay relative to their project.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        for path in [
            &mut self.project_path,
            &mut self.agency_path,
            &mut self.results_path,
            &mut self.reports_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.kpi_thresholds.max_completion_time_minutes * 60.0)
    }

    pub fn price_table(&self) -> PriceTable {
        let mut table = PriceTable::default();
        table.merge(&self.pricing);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_layout() {
        let config = BenchConfig::default();
        assert_eq!(config.agent_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.snapshot.baseline_tag, "benchmark-baseline");
        assert_eq!(config.agent.command, vec!["node", "orchestrator.cjs"]);
        assert!(config
            .price_table()
            .get("openrouter/openai/gpt-4o-mini")
            .is_some());
    }

    #[test]
    fn load_json_resolves_paths_against_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bench.json");
        fs::write(
            &path,
            r#"{
                "project_path": "project",
                "agent": { "command": ["sh", "agent.sh"] },
                "kpi_thresholds": { "max_completion_time_minutes": 0.5 },
                "pricing": { "local": { "input": 0.001, "output": 0.002 } }
            }"#,
        )
        .expect("write");
        let config = BenchConfig::load(&path).expect("load");
        assert_eq!(config.project_path, dir.path().join("project"));
        assert_eq!(config.results_path, dir.path().join("results.json"));
        assert_eq!(config.agent.command, vec!["sh", "agent.sh"]);
        assert_eq!(config.agent.task_dir, PathBuf::from("tasks"));
        assert_eq!(config.agent_timeout(), Duration::from_secs(30));
        assert!((config.price_table().cost("local", 1000, 500) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn load_yaml_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bench.yaml");
        fs::write(
            &path,
            "agency_path: /opt/agency\nsnapshot:\n  baseline_tag: base-v2\n",
        )
        .expect("write");
        let config = BenchConfig::load(&path).expect("load");
        assert_eq!(config.agency_path, PathBuf::from("/opt/agency"));
        assert_eq!(config.snapshot.baseline_tag, "base-v2");
        assert_eq!(config.snapshot.baseline_branch, "benchmark-base");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bench.json");
        fs::write(&path, r#"{ "agent": { "command": [] } }"#).expect("write");
        let err = BenchConfig::load(&path).expect_err("empty command");
        assert!(err.to_string().contains("agent.command"), "{}", err);

        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(
            BenchConfig::load(&path),
            Err(BenchError::Config { .. })
        ));
    }
}
