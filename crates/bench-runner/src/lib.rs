//! Trial orchestration for benchmarking a coding agent against a git
//! workspace: snapshot, invoke, measure, reset, report.

pub mod config;
pub mod error;
pub mod invoker;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod report;
pub mod results;
pub mod snapshot;
pub mod task;

pub use config::BenchConfig;
pub use error::{BenchError, Result};
pub use invoker::{parse_agent_output, AgentInvoker, AgentOutcome};
pub use orchestrator::TrialOrchestrator;
pub use probe::{QualityProbe, ToolchainProbe};
pub use report::{BenchSummary, ReportPaths};
pub use results::{ResultsFile, Run, RunMetrics, RunStatus};
pub use snapshot::{WorkspaceSnapshotter, WorkspaceState};
pub use task::Task;

pub use bench_metrics;

use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

pub(crate) fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &bytes)
}
