//! Per-session failure ledger
//!
//! Append-only. Records are never mutated or removed, and the counters only
//! grow, so [`FailureLedger::summary`] can be taken at any point.

use sitecheck_common::{FailureKind, FailureRecord, LedgerSummary, Severity, Warning};
use tracing::debug;

use crate::config::ThresholdConfig;

/// Result of one attempted element interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    pub element: String,
}

impl InteractionOutcome {
    pub fn success(element: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: true,
            element: element.into(),
        }
    }

    pub fn broken(element: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: false,
            element: element.into(),
        }
    }

    pub fn skipped(element: impl Into<String>) -> Self {
        Self {
            attempted: false,
            succeeded: false,
            element: element.into(),
        }
    }
}

#[derive(Debug)]
pub struct FailureLedger {
    root_url: String,
    thresholds: ThresholdConfig,
    records: Vec<FailureRecord>,
    warnings: Vec<Warning>,
    tested_elements: usize,
    broken_elements: usize,
    pages_visited: usize,
}

impl FailureLedger {
    pub fn new(root_url: impl Into<String>, thresholds: ThresholdConfig) -> Self {
        Self {
            root_url: root_url.into(),
            thresholds,
            records: Vec::new(),
            warnings: Vec::new(),
            tested_elements: 0,
            broken_elements: 0,
            pages_visited: 0,
        }
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Append a failure; `page` defaults to the root page
    pub fn add(
        &mut self,
        kind: FailureKind,
        message: impl Into<String>,
        severity: Severity,
        page: Option<&str>,
    ) {
        let page_url = page.unwrap_or(&self.root_url);
        let record = FailureRecord::new(kind, severity, message, page_url);
        debug!(kind = %record.kind, severity = %record.severity, page = %record.page_url, "{}", record.message);
        self.records.push(record);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let warning = Warning::new(message);
        debug!("warning: {}", warning.message);
        self.warnings.push(warning);
    }

    /// Count an interaction; broken only when it was attempted and failed
    pub fn record_outcome(&mut self, outcome: &InteractionOutcome) {
        if !outcome.attempted {
            return;
        }
        self.tested_elements += 1;
        if !outcome.succeeded {
            self.broken_elements += 1;
        }
    }

    pub fn record_page_visit(&mut self) {
        self.pages_visited += 1;
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.records.iter().filter(|r| r.severity == severity).count()
    }

    pub fn has_kind(&self, kind: FailureKind) -> bool {
        self.records.iter().any(|r| r.kind == kind)
    }

    pub fn broken_element_ratio(&self) -> f64 {
        if self.tested_elements == 0 {
            0.0
        } else {
            self.broken_elements as f64 / self.tested_elements as f64
        }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn summary(&self) -> LedgerSummary {
        let critical_failures = self.count_severity(Severity::Critical);
        let high_failures = self.count_severity(Severity::High);
        let should_fail = critical_failures > 0
            || self.broken_elements >= self.thresholds.broken_element_threshold
            || high_failures >= self.thresholds.critical_error_threshold;

        LedgerSummary {
            total_failures: self.records.len(),
            critical_failures,
            high_failures,
            warnings: self.warnings.len(),
            tested_elements: self.tested_elements,
            broken_elements: self.broken_elements,
            broken_element_ratio: self.broken_element_ratio(),
            pages_visited: self.pages_visited,
            should_fail,
        }
    }

    /// Consume the ledger into its records and warnings
    pub fn into_parts(self) -> (Vec<FailureRecord>, Vec<Warning>) {
        (self.records, self.warnings)
    }
}
