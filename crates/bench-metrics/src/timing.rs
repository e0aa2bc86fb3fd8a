use crate::stats::ratio;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::warn;

pub const PHASE_TOTAL: &str = "total";
pub const PHASE_AGENCY: &str = "agency";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingMeasurement {
    pub task_id: String,
    pub phase: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub total_tasks: usize,
    pub avg_completion_time_ms: f64,
    pub min_completion_time_ms: u64,
    pub max_completion_time_ms: u64,
    pub avg_completion_time_min: f64,
    pub throughput_per_hour: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingExport {
    pub measurements: Vec<TimingMeasurement>,
    pub summary: Option<TimingSummary>,
}

#[derive(Debug, Clone, Copy)]
struct LiveTimer {
    started: Instant,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TimingStore {
    timers: HashMap<(String, String), LiveTimer>,
    measurements: Vec<TimingMeasurement>,
}

impl TimingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting a timer that is already live restarts it.
    pub fn start_timer(&mut self, task_id: &str, phase: &str) {
        self.timers.insert(
            (task_id.to_string(), phase.to_string()),
            LiveTimer {
                started: Instant::now(),
                started_at: Utc::now(),
            },
        );
    }

    pub fn stop_timer(&mut self, task_id: &str, phase: &str) -> Option<TimingMeasurement> {
        let key = (task_id.to_string(), phase.to_string());
        let Some(timer) = self.timers.remove(&key) else {
            warn!(task_id, phase, "timer not found");
            return None;
        };
        let duration_ms = timer.started.elapsed().as_millis() as u64;
        let end_time = timer.started_at + ChronoDuration::milliseconds(duration_ms as i64);
        Some(self.record_measurement(TimingMeasurement {
            task_id: task_id.to_string(),
            phase: phase.to_string(),
            start_time: timer.started_at,
            end_time,
            duration_ms,
        }))
    }

    /// Drops a live timer without recording a measurement.
    pub fn cancel_timer(&mut self, task_id: &str, phase: &str) -> bool {
        self.timers
            .remove(&(task_id.to_string(), phase.to_string()))
            .is_some()
    }

    pub fn record_measurement(&mut self, measurement: TimingMeasurement) -> TimingMeasurement {
        self.measurements.push(measurement.clone());
        measurement
    }

    pub fn is_running(&self, task_id: &str, phase: &str) -> bool {
        self.timers
            .contains_key(&(task_id.to_string(), phase.to_string()))
    }

    pub fn completion_time(&self, task_id: &str) -> Option<u64> {
        self.measurements
            .iter()
            .find(|m| m.task_id == task_id && m.phase == PHASE_TOTAL)
            .map(|m| m.duration_ms)
    }

    pub fn task_measurements(&self, task_id: &str) -> Vec<TimingMeasurement> {
        self.measurements
            .iter()
            .filter(|m| m.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn measurements(&self) -> &[TimingMeasurement] {
        &self.measurements
    }

    pub fn summary(&self) -> Option<TimingSummary> {
        let totals: Vec<u64> = self
            .measurements
            .iter()
            .filter(|m| m.phase == PHASE_TOTAL)
            .map(|m| m.duration_ms)
            .collect();
        if totals.is_empty() {
            return None;
        }
        let sum_ms: u64 = totals.iter().sum();
        let avg = sum_ms as f64 / totals.len() as f64;
        let hours = sum_ms as f64 / 3_600_000.0;
        Some(TimingSummary {
            total_tasks: totals.len(),
            avg_completion_time_ms: avg,
            min_completion_time_ms: totals.iter().copied().min().unwrap_or(0),
            max_completion_time_ms: totals.iter().copied().max().unwrap_or(0),
            avg_completion_time_min: avg / 60_000.0,
            throughput_per_hour: ratio(totals.len() as f64, hours),
        })
    }

    pub fn export(&self) -> TimingExport {
        TimingExport {
            measurements: self.measurements.clone(),
            summary: self.summary(),
        }
    }

    pub fn reset(&mut self) {
        self.timers.clear();
        self.measurements.clear();
    }
}
