use crate::stats::ratio;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-token price for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable(BTreeMap<String, ModelPrice>);

impl PriceTable {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, model: &str) -> Option<&ModelPrice> {
        self.0.get(model)
    }

    pub fn set(&mut self, model: &str, input: f64, output: f64) {
        self.0.insert(model.to_string(), ModelPrice { input, output });
    }

    pub fn merge(&mut self, overrides: &BTreeMap<String, ModelPrice>) {
        for (model, price) in overrides {
            self.0.insert(model.clone(), *price);
        }
    }

    /// Unknown models price at zero.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        match self.get(model) {
            Some(price) => input_tokens as f64 * price.input + output_tokens as f64 * price.output,
            None => 0.0,
        }
    }
}

impl Default for PriceTable {
    // Approximate OpenRouter list prices.
    fn default() -> Self {
        let mut table = Self::empty();
        table.set("openrouter/google/gemini-2.5-flash-lite", 0.000000075, 0.0000003);
        table.set("openrouter/openai/gpt-4o-mini", 0.00000015, 0.0000006);
        table.set("openrouter/anthropic/claude-3.5-sonnet", 0.000003, 0.000015);
        table.set("openrouter/z-ai/glm-5", 0.0000001, 0.0000004);
        table
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default = "default_phase")]
    pub phase: String,
}

fn default_phase() -> String {
    "unknown".to_string()
}

impl TokenUsage {
    pub fn new(model: &str, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cached_tokens: 0,
            phase: default_phase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub phase: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTokens {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub count: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub tasks_with_usage: usize,
    pub avg_tokens_per_task: f64,
    pub avg_cost_per_task: f64,
    pub by_model: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenExport {
    pub usage: Vec<TokenEntry>,
    pub summary: TokenSummary,
}

#[derive(Debug, Default)]
pub struct TokenStore {
    usage: Vec<TokenEntry>,
    pricing: PriceTable,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pricing(pricing: PriceTable) -> Self {
        Self {
            usage: Vec::new(),
            pricing,
        }
    }

    pub fn record_usage(&mut self, task_id: &str, usage: TokenUsage) -> TokenEntry {
        let cost = self.calculate_cost(&usage.model, usage.input_tokens, usage.output_tokens);
        let entry = TokenEntry {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            total_tokens: usage.input_tokens.saturating_add(usage.output_tokens),
            model: usage.model,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cached_tokens: usage.cached_tokens,
            phase: usage.phase,
            cost,
        };
        self.usage.push(entry.clone());
        entry
    }

    pub fn calculate_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.pricing.cost(model, input_tokens, output_tokens)
    }

    /// Only affects entries recorded afterwards.
    pub fn set_pricing(&mut self, model: &str, input: f64, output: f64) {
        self.pricing.set(model, input, output);
    }

    pub fn pricing(&self) -> &PriceTable {
        &self.pricing
    }

    pub fn task_tokens(&self, task_id: &str) -> TaskTokens {
        let mut totals = TaskTokens::default();
        for entry in self.usage.iter().filter(|u| u.task_id == task_id) {
            totals.input_tokens = totals.input_tokens.saturating_add(entry.input_tokens);
            totals.output_tokens = totals.output_tokens.saturating_add(entry.output_tokens);
            totals.total_tokens = totals.total_tokens.saturating_add(entry.total_tokens);
            totals.cost += entry.cost;
        }
        totals
    }

    pub fn cost_per_loc(&self, lines_generated: u64) -> f64 {
        let total: f64 = self.usage.iter().map(|u| u.cost).sum();
        ratio(total, lines_generated as f64)
    }

    pub fn summary(&self) -> TokenSummary {
        // Counts are parsed from agent output and may be arbitrarily large.
        let total_input = self
            .usage
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.input_tokens));
        let total_output = self
            .usage
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.output_tokens));
        let total_tokens = total_input.saturating_add(total_output);
        let total_cost: f64 = self.usage.iter().map(|u| u.cost).sum();
        let tasks: BTreeSet<&str> = self.usage.iter().map(|u| u.task_id.as_str()).collect();

        let mut by_model: BTreeMap<String, ModelUsage> = BTreeMap::new();
        for entry in &self.usage {
            let model = by_model.entry(entry.model.clone()).or_default();
            model.count += 1;
            model.input_tokens = model.input_tokens.saturating_add(entry.input_tokens);
            model.output_tokens = model.output_tokens.saturating_add(entry.output_tokens);
            model.cost += entry.cost;
        }

        TokenSummary {
            total_input_tokens: total_input,
            total_output_tokens: total_output,
            total_tokens,
            total_cost,
            tasks_with_usage: tasks.len(),
            avg_tokens_per_task: ratio(total_tokens as f64, tasks.len() as f64),
            avg_cost_per_task: ratio(total_cost, tasks.len() as f64),
            by_model,
        }
    }

    pub fn export(&self) -> TokenExport {
        TokenExport {
            usage: self.usage.clone(),
            summary: self.summary(),
        }
    }

    pub fn reset(&mut self) {
        self.usage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONNET: &str = "openrouter/anthropic/claude-3.5-sonnet";

    #[test]
    fn known_model_cost_is_tokens_times_rate() {
        let mut store = TokenStore::new();
        let entry = store.record_usage("t1", TokenUsage::new(SONNET, 1000, 500));
        let expected = 1000.0 * 0.000003 + 500.0 * 0.000015;
        assert!((entry.cost - expected).abs() < 1e-12);
        assert_eq!(entry.total_tokens, 1500);
    }

    #[test]
    fn unknown_model_costs_exactly_zero() {
        let mut store = TokenStore::new();
        let entry = store.record_usage("t1", TokenUsage::new("unknown", 1000, 500));
        assert_eq!(entry.cost, 0.0);
    }

    #[test]
    fn custom_pricing_applies_to_later_entries() {
        let mut store = TokenStore::with_pricing(PriceTable::empty());
        let before = store.record_usage("t1", TokenUsage::new("local", 10, 10));
        store.set_pricing("local", 0.5, 1.0);
        let after = store.record_usage("t1", TokenUsage::new("local", 10, 10));
        assert_eq!(before.cost, 0.0);
        assert_eq!(after.cost, 15.0);
        assert_eq!(store.task_tokens("t1").cost, 15.0);
        assert_eq!(store.cost_per_loc(30), 0.5);
        assert_eq!(store.cost_per_loc(0), 0.0);
    }

    #[test]
    fn summary_groups_by_model_and_averages_per_task() {
        let mut store = TokenStore::with_pricing(PriceTable::empty());
        store.set_pricing("m1", 1.0, 1.0);
        store.record_usage("a", TokenUsage::new("m1", 100, 50));
        store.record_usage("a", TokenUsage::new("m2", 10, 10));
        store.record_usage("b", TokenUsage::new("m1", 50, 50));

        let summary = store.summary();
        assert_eq!(summary.total_tokens, 270);
        assert_eq!(summary.tasks_with_usage, 2);
        assert_eq!(summary.avg_tokens_per_task, 135.0);
        assert_eq!(summary.total_cost, 250.0);
        assert_eq!(summary.avg_cost_per_task, 125.0);
        assert_eq!(summary.by_model["m1"].count, 2);
        assert_eq!(summary.by_model["m2"].cost, 0.0);
    }

    #[test]
    fn huge_counts_saturate_instead_of_overflowing() {
        let mut store = TokenStore::with_pricing(PriceTable::empty());
        let entry = store.record_usage("a", TokenUsage::new("m1", u64::MAX, 1));
        assert_eq!(entry.total_tokens, u64::MAX);
        store.record_usage("a", TokenUsage::new("m1", 5, u64::MAX));

        let totals = store.task_tokens("a");
        assert_eq!(totals.input_tokens, u64::MAX);
        assert_eq!(totals.output_tokens, u64::MAX);
        assert_eq!(totals.total_tokens, u64::MAX);

        let summary = store.summary();
        assert_eq!(summary.total_input_tokens, u64::MAX);
        assert_eq!(summary.total_tokens, u64::MAX);
        assert_eq!(summary.by_model["m1"].input_tokens, u64::MAX);
        assert_eq!(summary.by_model["m1"].output_tokens, u64::MAX);
    }

    #[test]
    fn empty_summary_is_all_zero() {
        let summary = TokenStore::new().summary();
        assert_eq!(summary.avg_cost_per_task, 0.0);
        assert_eq!(summary.avg_tokens_per_task, 0.0);
        assert!(summary.by_model.is_empty());
    }
}
