use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    /// Launch, I/O or deadline failure while running a trial.
    Execution,
    /// Reported by the agent in its own output.
    Runtime,
    Unknown,
    /// Any caller-declared type, stored under its own name.
    Other(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Execution => "execution",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Unknown => "unknown",
            ErrorKind::Other(name) => name,
        }
    }
}

impl From<String> for ErrorKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "execution" => ErrorKind::Execution,
            "runtime" => ErrorKind::Runtime,
            "unknown" => ErrorKind::Unknown,
            _ => ErrorKind::Other(name),
        }
    }
}

impl From<&str> for ErrorKind {
    fn from(name: &str) -> Self {
        ErrorKind::from(name.to_string())
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller knows about an error before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub phase: String,
    pub recoverable: bool,
    pub stack: Option<String>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: impl Into<ErrorKind>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    pub fn unrecoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }

    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl Default for ErrorReport {
    fn default() -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: String::new(),
            phase: "unknown".to_string(),
            recoverable: true,
            stack: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub phase: String,
    pub recoverable: bool,
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningEntry {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub phase: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryEntry {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub attempt_number: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRate {
    pub total_errors: usize,
    pub total_warnings: usize,
    pub total_retries: usize,
    pub error_rate: f64,
    pub retry_rate: f64,
    pub tasks_affected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    #[serde(flatten)]
    pub rate: ErrorRate,
    pub errors_by_type: BTreeMap<String, usize>,
    pub errors_by_phase: BTreeMap<String, usize>,
    pub recoverable_errors: usize,
    pub unrecoverable_errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorExport {
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<WarningEntry>,
    pub retries: Vec<RetryEntry>,
    pub summary: ErrorSummary,
}

#[derive(Debug, Default)]
pub struct ErrorStore {
    errors: Vec<ErrorEntry>,
    warnings: Vec<WarningEntry>,
    retries: Vec<RetryEntry>,
}

impl ErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&mut self, task_id: &str, report: ErrorReport) -> ErrorEntry {
        let entry = ErrorEntry {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            kind: report.kind,
            message: report.message,
            phase: report.phase,
            recoverable: report.recoverable,
            stack: report.stack,
        };
        self.errors.push(entry.clone());
        entry
    }

    pub fn record_warning(
        &mut self,
        task_id: &str,
        kind: &str,
        message: &str,
        phase: &str,
    ) -> WarningEntry {
        let entry = WarningEntry {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            kind: kind.to_string(),
            message: message.to_string(),
            phase: phase.to_string(),
        };
        self.warnings.push(entry.clone());
        entry
    }

    pub fn record_retry(&mut self, task_id: &str, reason: &str) -> RetryEntry {
        let entry = RetryEntry {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            reason: reason.to_string(),
            attempt_number: self.retry_count(task_id) + 1,
        };
        self.retries.push(entry.clone());
        entry
    }

    pub fn error_count(&self, task_id: &str) -> usize {
        self.errors.iter().filter(|e| e.task_id == task_id).count()
    }

    pub fn retry_count(&self, task_id: &str) -> usize {
        self.retries.iter().filter(|r| r.task_id == task_id).count()
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn error_rate(&self) -> ErrorRate {
        let touched: BTreeSet<&str> = self
            .errors
            .iter()
            .map(|e| e.task_id.as_str())
            .chain(self.retries.iter().map(|r| r.task_id.as_str()))
            .collect();
        // Rates are per affected task; an untouched store divides by one.
        let denominator = touched.len().max(1) as f64;
        ErrorRate {
            total_errors: self.errors.len(),
            total_warnings: self.warnings.len(),
            total_retries: self.retries.len(),
            error_rate: self.errors.len() as f64 / denominator,
            retry_rate: self.retries.len() as f64 / denominator,
            tasks_affected: touched.len(),
        }
    }

    pub fn errors_by_type(&self) -> BTreeMap<String, usize> {
        let mut by_type = BTreeMap::new();
        for error in &self.errors {
            *by_type.entry(error.kind.to_string()).or_default() += 1;
        }
        by_type
    }

    pub fn errors_by_phase(&self) -> BTreeMap<String, usize> {
        let mut by_phase = BTreeMap::new();
        for error in &self.errors {
            *by_phase.entry(error.phase.clone()).or_default() += 1;
        }
        by_phase
    }

    pub fn summary(&self) -> ErrorSummary {
        let recoverable = self.errors.iter().filter(|e| e.recoverable).count();
        ErrorSummary {
            rate: self.error_rate(),
            errors_by_type: self.errors_by_type(),
            errors_by_phase: self.errors_by_phase(),
            recoverable_errors: recoverable,
            unrecoverable_errors: self.errors.len() - recoverable,
        }
    }

    pub fn export(&self) -> ErrorExport {
        ErrorExport {
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
            retries: self.retries.clone(),
            summary: self.summary(),
        }
    }

    pub fn reset(&mut self) {
        self.errors.clear();
        self.warnings.clear();
        self.retries.clear();
    }
}
