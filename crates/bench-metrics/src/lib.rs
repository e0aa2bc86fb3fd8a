//! Append-only measurement stores for agent benchmark trials.
//!
//! Every store keeps its raw log and recomputes its summary from that log on
//! each call, so summaries never go stale and do not depend on insertion
//! order.

pub mod agency;
pub mod errors;
pub mod quality;
pub mod stats;
pub mod tokens;
pub mod timing;

pub use agency::{
    calculate_kpi_pass_rate, AgencyOutcome, AgencyStore, AgencySummary, Kpi, KpiSet,
    PmPrediction, TaskResult,
};
pub use errors::{ErrorEntry, ErrorKind, ErrorReport, ErrorStore, ErrorSummary};
pub use quality::{
    Check, ComponentCoverage, CoverageReport, LintReport, QualityMeasurement, QualityStore,
    QualitySummary, TypeCheckReport,
};
pub use timing::{TimingMeasurement, TimingStore, TimingSummary, PHASE_AGENCY, PHASE_TOTAL};
pub use tokens::{ModelPrice, PriceTable, TokenEntry, TokenStore, TokenSummary, TokenUsage};

use serde::Serialize;

/// The five stores one benchmark context records into.
#[derive(Debug, Default)]
pub struct MetricStores {
    pub timing: TimingStore,
    pub errors: ErrorStore,
    pub tokens: TokenStore,
    pub quality: QualityStore,
    pub agency: AgencyStore,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    pub timing: timing::TimingExport,
    pub errors: errors::ErrorExport,
    pub tokens: tokens::TokenExport,
    pub quality: quality::QualityExport,
    pub agency: agency::AgencyExport,
}

impl MetricStores {
    pub fn new(pricing: PriceTable) -> Self {
        Self {
            tokens: TokenStore::with_pricing(pricing),
            ..Self::default()
        }
    }

    pub fn export(&self) -> MetricsExport {
        MetricsExport {
            timing: self.timing.export(),
            errors: self.errors.export(),
            tokens: self.tokens.export(),
            quality: self.quality.export(),
            agency: self.agency.export(),
        }
    }

    pub fn reset(&mut self) {
        self.timing.reset();
        self.errors.reset();
        self.tokens.reset();
        self.quality.reset();
        self.agency.reset();
    }
}
