//! Agent-specific outcome metrics: task success, KPI pass rates, and accuracy
//! of the agent's planning and file discovery against ground truth.

use crate::stats::{f1_score, mean_or_zero, percent, precision, recall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kpi {
    TypeScript,
    Lint,
    Build,
    Tests,
}

impl Kpi {
    pub const ALL: [Kpi; 4] = [Kpi::TypeScript, Kpi::Lint, Kpi::Build, Kpi::Tests];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiSet {
    pub typescript: bool,
    pub lint: bool,
    pub build: bool,
    pub tests: bool,
}

impl KpiSet {
    pub fn all_passed() -> Self {
        Self {
            typescript: true,
            lint: true,
            build: true,
            tests: true,
        }
    }

    pub fn get(&self, kpi: Kpi) -> bool {
        match kpi {
            Kpi::TypeScript => self.typescript,
            Kpi::Lint => self.lint,
            Kpi::Build => self.build,
            Kpi::Tests => self.tests,
        }
    }

    pub fn passed_count(&self) -> usize {
        Kpi::ALL.iter().filter(|k| self.get(**k)).count()
    }
}

pub fn calculate_kpi_pass_rate(kpis: &KpiSet) -> f64 {
    percent(kpis.passed_count(), Kpi::ALL.len())
}

/// Outcome of one agent run as fed into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencyOutcome {
    pub success: bool,
    /// False when a human had to step in.
    pub autonomous: bool,
    pub kpis_passed: KpiSet,
    pub iterations: u32,
    pub pm_output: Option<Value>,
    pub discovery_output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub autonomous: bool,
    pub kpis_passed: KpiSet,
    pub iterations: u32,
    pub pm_output: Option<Value>,
    pub discovery_output: Option<Value>,
    pub kpi_pass_rate: f64,
    pub first_try_success: bool,
}

/// What the agent's planner predicted, or the ground truth it is scored on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PmPrediction {
    pub intent: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmAccuracyEntry {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub pm_intent: String,
    pub correct_intent: String,
    pub intent_correct: bool,
    pub pm_keywords: Vec<String>,
    pub correct_keywords: Vec<String>,
    pub keyword_precision: f64,
    pub keyword_recall: f64,
    pub files_suggested: Vec<String>,
    pub correct_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiscoveryEntry {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub discovered_files: Vec<String>,
    pub expected_files: Vec<String>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSuccessStats {
    pub total: usize,
    pub successful: usize,
    pub autonomous: usize,
    pub success_rate: f64,
    pub autonomous_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiCounts {
    pub typescript: usize,
    pub lint: usize,
    pub build: usize,
    pub tests: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiRates {
    pub typescript: f64,
    pub lint: f64,
    pub build: f64,
    pub tests: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiStats {
    pub first_try_success_rate: f64,
    pub avg_iterations: f64,
    pub kpi_pass_counts: KpiCounts,
    pub kpi_pass_rates: KpiRates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmAccuracyStats {
    pub tasks: usize,
    pub intent_accuracy: f64,
    pub avg_keyword_precision: f64,
    pub avg_keyword_recall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiscoveryStats {
    pub tasks: usize,
    pub avg_precision: f64,
    pub avg_recall: f64,
    pub avg_f1_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencySummary {
    pub task_success: TaskSuccessStats,
    pub kpi_stats: KpiStats,
    pub pm_accuracy: Option<PmAccuracyStats>,
    pub file_discovery: Option<FileDiscoveryStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgencyExport {
    pub task_results: Vec<TaskResult>,
    pub pm_accuracy: Vec<PmAccuracyEntry>,
    pub file_discovery: Vec<FileDiscoveryEntry>,
    pub summary: AgencySummary,
}

#[derive(Debug, Default)]
pub struct AgencyStore {
    task_results: Vec<TaskResult>,
    pm_accuracy: Vec<PmAccuracyEntry>,
    file_discovery: Vec<FileDiscoveryEntry>,
}

impl AgencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_task_result(&mut self, task_id: &str, outcome: AgencyOutcome) -> TaskResult {
        let kpi_pass_rate = calculate_kpi_pass_rate(&outcome.kpis_passed);
        let result = TaskResult {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            success: outcome.success,
            autonomous: outcome.autonomous,
            kpis_passed: outcome.kpis_passed,
            iterations: outcome.iterations,
            pm_output: outcome.pm_output,
            discovery_output: outcome.discovery_output,
            kpi_pass_rate,
            first_try_success: kpi_pass_rate == 100.0 && outcome.iterations <= 1,
        };
        self.task_results.push(result.clone());
        result
    }

    pub fn record_pm_accuracy(
        &mut self,
        task_id: &str,
        predicted: &PmPrediction,
        ground_truth: &PmPrediction,
    ) -> PmAccuracyEntry {
        let entry = PmAccuracyEntry {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            pm_intent: predicted.intent.clone(),
            correct_intent: ground_truth.intent.clone(),
            intent_correct: predicted.intent == ground_truth.intent,
            pm_keywords: predicted.keywords.clone(),
            correct_keywords: ground_truth.keywords.clone(),
            keyword_precision: precision(&predicted.keywords, &ground_truth.keywords),
            keyword_recall: recall(&predicted.keywords, &ground_truth.keywords),
            files_suggested: predicted.files.clone(),
            correct_files: ground_truth.files.clone(),
        };
        self.pm_accuracy.push(entry.clone());
        entry
    }

    pub fn record_file_discovery(
        &mut self,
        task_id: &str,
        discovered: &[String],
        expected: &[String],
    ) -> FileDiscoveryEntry {
        let true_positives = discovered.iter().filter(|f| expected.contains(f)).count();
        let false_positives = discovered.len() - true_positives;
        let false_negatives = expected.iter().filter(|f| !discovered.contains(f)).count();
        let precision = percent(true_positives, true_positives + false_positives);
        let recall = percent(true_positives, true_positives + false_negatives);
        let entry = FileDiscoveryEntry {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            discovered_files: discovered.to_vec(),
            expected_files: expected.to_vec(),
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1_score: f1_score(precision, recall),
        };
        self.file_discovery.push(entry.clone());
        entry
    }

    pub fn task_results(&self) -> &[TaskResult] {
        &self.task_results
    }

    pub fn latest_result(&self, task_id: &str) -> Option<&TaskResult> {
        self.task_results.iter().rev().find(|r| r.task_id == task_id)
    }

    pub fn task_success_rate(&self) -> TaskSuccessStats {
        let total = self.task_results.len();
        let successful = self.task_results.iter().filter(|r| r.success).count();
        let autonomous = self
            .task_results
            .iter()
            .filter(|r| r.success && r.autonomous)
            .count();
        TaskSuccessStats {
            total,
            successful,
            autonomous,
            success_rate: percent(successful, total),
            autonomous_rate: percent(autonomous, total),
        }
    }

    pub fn kpi_stats(&self) -> KpiStats {
        let total = self.task_results.len();
        let first_try = self.task_results.iter().filter(|r| r.first_try_success).count();
        let iterations: Vec<f64> = self.task_results.iter().map(|r| r.iterations as f64).collect();
        let count = |kpi: Kpi| self.task_results.iter().filter(|r| r.kpis_passed.get(kpi)).count();
        let counts = KpiCounts {
            typescript: count(Kpi::TypeScript),
            lint: count(Kpi::Lint),
            build: count(Kpi::Build),
            tests: count(Kpi::Tests),
        };
        KpiStats {
            first_try_success_rate: percent(first_try, total),
            avg_iterations: mean_or_zero(&iterations),
            kpi_pass_rates: KpiRates {
                typescript: percent(counts.typescript, total),
                lint: percent(counts.lint, total),
                build: percent(counts.build, total),
                tests: percent(counts.tests, total),
            },
            kpi_pass_counts: counts,
        }
    }

    pub fn pm_accuracy_stats(&self) -> Option<PmAccuracyStats> {
        if self.pm_accuracy.is_empty() {
            return None;
        }
        let correct = self.pm_accuracy.iter().filter(|m| m.intent_correct).count();
        let precisions: Vec<f64> = self.pm_accuracy.iter().map(|m| m.keyword_precision).collect();
        let recalls: Vec<f64> = self.pm_accuracy.iter().map(|m| m.keyword_recall).collect();
        Some(PmAccuracyStats {
            tasks: self.pm_accuracy.len(),
            intent_accuracy: percent(correct, self.pm_accuracy.len()),
            avg_keyword_precision: mean_or_zero(&precisions),
            avg_keyword_recall: mean_or_zero(&recalls),
        })
    }

    pub fn file_discovery_stats(&self) -> Option<FileDiscoveryStats> {
        if self.file_discovery.is_empty() {
            return None;
        }
        let collect = |f: fn(&FileDiscoveryEntry) -> f64| -> Vec<f64> {
            self.file_discovery.iter().map(f).collect()
        };
        Some(FileDiscoveryStats {
            tasks: self.file_discovery.len(),
            avg_precision: mean_or_zero(&collect(|e| e.precision)),
            avg_recall: mean_or_zero(&collect(|e| e.recall)),
            avg_f1_score: mean_or_zero(&collect(|e| e.f1_score)),
        })
    }

    pub fn summary(&self) -> AgencySummary {
        AgencySummary {
            task_success: self.task_success_rate(),
            kpi_stats: self.kpi_stats(),
            pm_accuracy: self.pm_accuracy_stats(),
            file_discovery: self.file_discovery_stats(),
        }
    }

    pub fn export(&self) -> AgencyExport {
        AgencyExport {
            task_results: self.task_results.clone(),
            pm_accuracy: self.pm_accuracy.clone(),
            file_discovery: self.file_discovery.clone(),
            summary: self.summary(),
        }
    }

    pub fn reset(&mut self) {
        self.task_results.clear();
        self.pm_accuracy.clear();
        self.file_discovery.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool, kpis: KpiSet, iterations: u32) -> AgencyOutcome {
        AgencyOutcome {
            success,
            autonomous: true,
            kpis_passed: kpis,
            iterations,
            pm_output: None,
            discovery_output: None,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn kpi_pass_rate_counts_passing_kpis() {
        let kpis = KpiSet {
            typescript: true,
            lint: true,
            build: false,
            tests: false,
        };
        assert_eq!(calculate_kpi_pass_rate(&kpis), 50.0);
        assert_eq!(calculate_kpi_pass_rate(&kpis), 50.0);
        assert_eq!(calculate_kpi_pass_rate(&KpiSet::all_passed()), 100.0);
        assert_eq!(calculate_kpi_pass_rate(&KpiSet::default()), 0.0);
    }

    #[test]
    fn first_try_success_requires_all_kpis_and_single_iteration() {
        let mut store = AgencyStore::new();
        let first = store.record_task_result("a", outcome(true, KpiSet::all_passed(), 1));
        let retried = store.record_task_result("b", outcome(true, KpiSet::all_passed(), 2));
        let partial = store.record_task_result(
            "c",
            outcome(
                true,
                KpiSet {
                    tests: false,
                    ..KpiSet::all_passed()
                },
                1,
            ),
        );
        assert!(first.first_try_success);
        assert!(!retried.first_try_success);
        assert!(!partial.first_try_success);
    }

    #[test]
    fn success_and_autonomy_rates() {
        let mut store = AgencyStore::new();
        store.record_task_result("a", outcome(true, KpiSet::all_passed(), 1));
        let mut assisted = outcome(true, KpiSet::default(), 3);
        assisted.autonomous = false;
        store.record_task_result("b", assisted);
        store.record_task_result("c", outcome(false, KpiSet::default(), 2));
        store.record_task_result("d", outcome(false, KpiSet::default(), 2));

        let stats = store.task_success_rate();
        assert_eq!(stats.success_rate, 50.0);
        assert_eq!(stats.autonomous_rate, 25.0);

        let kpis = store.kpi_stats();
        assert_eq!(kpis.avg_iterations, 2.0);
        assert_eq!(kpis.first_try_success_rate, 25.0);
        assert_eq!(kpis.kpi_pass_counts.lint, 1);
        assert_eq!(kpis.kpi_pass_rates.build, 25.0);
        assert_eq!(store.latest_result("b").map(|r| r.iterations), Some(3));
    }

    #[test]
    fn pm_accuracy_scores_intent_and_keywords() {
        let mut store = AgencyStore::new();
        assert!(store.pm_accuracy_stats().is_none());
        let predicted = PmPrediction {
            intent: "feature".to_string(),
            keywords: strings(&["a", "b"]),
            files: vec![],
        };
        let truth = PmPrediction {
            intent: "feature".to_string(),
            keywords: strings(&["b", "c"]),
            files: vec![],
        };
        let entry = store.record_pm_accuracy("t", &predicted, &truth);
        assert!(entry.intent_correct);
        assert_eq!(entry.keyword_precision, 50.0);
        assert_eq!(entry.keyword_recall, 50.0);

        let empty = PmPrediction {
            intent: "bugfix".to_string(),
            ..PmPrediction::default()
        };
        let entry = store.record_pm_accuracy("u", &empty, &empty);
        assert_eq!(entry.keyword_precision, 0.0);
        assert_eq!(entry.keyword_recall, 0.0);

        let stats = store.pm_accuracy_stats().expect("stats");
        assert_eq!(stats.tasks, 2);
        assert_eq!(stats.intent_accuracy, 100.0);
        assert_eq!(stats.avg_keyword_precision, 25.0);
    }

    #[test]
    fn file_discovery_precision_recall_f1() {
        let mut store = AgencyStore::new();
        let discovered = strings(&["a.ts", "b.ts", "c.ts", "d.ts", "e.ts"]);
        let expected = strings(&["a.ts", "b.ts", "c.ts", "d.ts", "x.ts", "y.ts", "z.ts", "w.ts", "v.ts", "u.ts"]);
        let entry = store.record_file_discovery("t", &discovered, &expected);
        assert_eq!(entry.true_positives, 4);
        assert_eq!(entry.false_positives, 1);
        assert_eq!(entry.false_negatives, 6);
        assert_eq!(entry.precision, 80.0);
        assert_eq!(entry.recall, 40.0);
        assert!((entry.f1_score - 53.333).abs() < 0.01);

        let none = store.record_file_discovery("u", &[], &[]);
        assert_eq!(none.f1_score, 0.0);
        assert!(!none.f1_score.is_nan());
        let stats = store.file_discovery_stats().expect("stats");
        assert_eq!(stats.tasks, 2);
        assert_eq!(stats.avg_precision, 40.0);
    }

    #[test]
    fn summary_omits_ground_truth_sections_when_unused() {
        let mut store = AgencyStore::new();
        store.record_task_result("a", outcome(true, KpiSet::all_passed(), 1));
        let summary = store.summary();
        assert!(summary.pm_accuracy.is_none());
        assert!(summary.file_discovery.is_none());
        store.reset();
        assert_eq!(store.export().summary.task_success.total, 0);
    }
}
