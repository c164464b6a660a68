//! Core types for SiteCheck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an observed failure, ordered from least to most serious
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Closed taxonomy of anomalies the engine can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    HiddenElement,
    DisabledElement,
    InteractionFailed,
    FormInputFailed,
    SubmitButtonDisabled,
    NoSubmitButton,
    FormMostlyBroken,
    PageLoadFailed,
    HttpError,
    ServerError,
    ClientError,
    RequestFailed,
    NavigationError,
    ExcessiveJsErrors,
    ScrollingError,
    ElementDiscoveryFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::HiddenElement => "HIDDEN_ELEMENT",
            FailureKind::DisabledElement => "DISABLED_ELEMENT",
            FailureKind::InteractionFailed => "INTERACTION_FAILED",
            FailureKind::FormInputFailed => "FORM_INPUT_FAILED",
            FailureKind::SubmitButtonDisabled => "SUBMIT_BUTTON_DISABLED",
            FailureKind::NoSubmitButton => "NO_SUBMIT_BUTTON",
            FailureKind::FormMostlyBroken => "FORM_MOSTLY_BROKEN",
            FailureKind::PageLoadFailed => "PAGE_LOAD_FAILED",
            FailureKind::HttpError => "HTTP_ERROR",
            FailureKind::ServerError => "SERVER_ERROR",
            FailureKind::ClientError => "CLIENT_ERROR",
            FailureKind::RequestFailed => "REQUEST_FAILED",
            FailureKind::NavigationError => "NAVIGATION_ERROR",
            FailureKind::ExcessiveJsErrors => "EXCESSIVE_JS_ERRORS",
            FailureKind::ScrollingError => "SCROLLING_ERROR",
            FailureKind::ElementDiscoveryFailed => "ELEMENT_DISCOVERY_FAILED",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable observation of something that did not work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub severity: Severity,
    pub message: String,
    pub page_url: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(
        kind: FailureKind,
        severity: Severity,
        message: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            page_url: page_url.into(),
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.severity, self.kind, self.message, self.page_url
        )
    }
}

/// Non-failing observation, e.g. degraded evaluation or mobile overflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate snapshot of a failure ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_failures: usize,
    pub critical_failures: usize,
    pub high_failures: usize,
    pub warnings: usize,
    pub tested_elements: usize,
    pub broken_elements: usize,
    pub broken_element_ratio: f64,
    pub pages_visited: usize,
    pub should_fail: bool,
}

/// Final verdict of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn from_should_fail(should_fail: bool) -> Self {
        if should_fail {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// Which evaluator produced the final verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Heuristic,
    Judge,
    Merged,
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionSource::Heuristic => write!(f, "heuristic"),
            DecisionSource::Judge => write!(f, "judge"),
            DecisionSource::Merged => write!(f, "merged"),
        }
    }
}

/// PASS/FAIL with a human-readable reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: Option<String>,
    pub source: DecisionSource,
}

impl Decision {
    pub fn fail(reason: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            verdict: Verdict::Fail,
            reason: Some(reason.into()),
            source,
        }
    }
}

/// One record per tested URL, handed to a result sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: String,
    pub url: String,
    pub verdict: Verdict,
    pub reason: Option<String>,
    pub source: DecisionSource,
    pub failures: Vec<FailureRecord>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    pub metrics: LedgerSummary,
    /// Raw PNG bytes; written next to the report rather than inline
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    pub screenshot_sha256: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl SessionReport {
    pub fn new(url: impl Into<String>, decision: Decision) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            verdict: decision.verdict,
            reason: decision.reason,
            source: decision.source,
            failures: Vec::new(),
            warnings: Vec::new(),
            metrics: LedgerSummary::default(),
            screenshot: None,
            screenshot_sha256: None,
            attempts: 0,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }
}

/// Aggregate over a batch of sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub reports: Vec<SessionReport>,
}

impl BatchSummary {
    pub fn from_reports(reports: Vec<SessionReport>, duration_ms: u64) -> Self {
        let passed = reports.iter().filter(|r| r.passed()).count();
        Self {
            total: reports.len(),
            passed,
            failed: reports.len() - passed,
            duration_ms,
            reports,
        }
    }
}
