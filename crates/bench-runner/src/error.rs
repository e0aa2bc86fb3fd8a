use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("agent timeout exceeded for task {task_id} after {}s", .limit.as_secs())]
    Timeout { task_id: String, limit: Duration },

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("baseline {0} not found; run setup first")]
    MissingBaseline(String),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("invalid config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("cannot load task {}: {message}", .path.display())]
    TaskLoad { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BenchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BenchError::Timeout { .. })
    }
}
