//! Translation of raw page events into ledger entries
//!
//! The page only reports what happened. Deciding what is noise and what is
//! signal happens here.

use sitecheck_common::{FailureKind, Severity};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, trace};

use crate::config::NoiseConfig;
use crate::ledger::FailureLedger;
use crate::page::{PageEvent, PageEventStream};

/// Failure texts produced when the engine itself navigates away mid-request
const ABORTED_REQUEST_MARKERS: &[&str] = &["ERR_ABORTED", "NS_BINDING_ABORTED", "cancelled"];

#[derive(Debug, Clone)]
pub struct NoiseFilter {
    ignored_url_patterns: Vec<String>,
    benign_errors: Vec<String>,
}

impl NoiseFilter {
    pub fn new(config: &NoiseConfig) -> Self {
        Self {
            ignored_url_patterns: config
                .ignored_url_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            benign_errors: config.benign_errors.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn is_noise_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.ignored_url_patterns.iter().any(|p| url.contains(p.as_str()))
    }

    pub fn is_benign_error(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.benign_errors.iter().any(|e| message.contains(e.as_str()))
    }

    fn is_aborted(failure: &str) -> bool {
        ABORTED_REQUEST_MARKERS.iter().any(|m| failure.contains(m))
    }
}

pub struct EventMonitor {
    events: PageEventStream,
    filter: NoiseFilter,
    max_js_errors: usize,
    js_errors: Vec<String>,
    closed: bool,
}

impl EventMonitor {
    pub fn new(events: PageEventStream, noise: &NoiseConfig, max_js_errors: usize) -> Self {
        Self {
            events,
            filter: NoiseFilter::new(noise),
            max_js_errors,
            js_errors: Vec::new(),
            closed: false,
        }
    }

    /// Translate every pending event, attributing failures to `page_url`
    pub fn drain(&mut self, ledger: &mut FailureLedger, page_url: &str) {
        if self.closed {
            return;
        }
        loop {
            match self.events.try_recv() {
                Ok(event) => self.translate(event, ledger, page_url),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("page event stream closed");
                    self.closed = true;
                    break;
                }
            }
        }
    }

    fn translate(&mut self, event: PageEvent, ledger: &mut FailureLedger, page_url: &str) {
        match event {
            PageEvent::Console { level, text } => {
                if level == "error" && !self.filter.is_benign_error(&text) {
                    self.js_errors.push(text);
                }
            }
            PageEvent::PageError { message } => {
                if !self.filter.is_benign_error(&message) {
                    self.js_errors.push(message);
                }
            }
            PageEvent::RequestFailed { url, failure } => {
                if self.filter.is_noise_url(&url) || NoiseFilter::is_aborted(&failure) {
                    trace!(%url, %failure, "ignoring request failure");
                    return;
                }
                ledger.add(
                    FailureKind::RequestFailed,
                    format!("Request to {} failed: {}", url, failure),
                    Severity::Low,
                    Some(page_url),
                );
            }
            PageEvent::Response {
                url,
                status,
                is_navigation,
            } => {
                // Main-document statuses are judged by the navigation itself
                if is_navigation || status < 400 || self.filter.is_noise_url(&url) {
                    return;
                }
                if status >= 500 {
                    ledger.add(
                        FailureKind::ServerError,
                        format!("HTTP {} from {}", status, url),
                        Severity::High,
                        Some(page_url),
                    );
                } else {
                    ledger.add(
                        FailureKind::ClientError,
                        format!("HTTP {} from {}", status, url),
                        Severity::Low,
                        Some(page_url),
                    );
                }
            }
        }
    }

    /// Drain, then flag the page if it produced too many script errors.
    /// That flag is critical: a page drowning in script errors fails the
    /// session on its own.
    ///
    /// Returns the number of script errors attributed to the page; the
    /// per-page counter is reset afterwards.
    pub fn check_js_errors(&mut self, ledger: &mut FailureLedger, page_url: &str) -> usize {
        self.drain(ledger, page_url);
        let errors = std::mem::take(&mut self.js_errors);
        if errors.len() > self.max_js_errors {
            let sample: Vec<&str> = errors.iter().take(3).map(String::as_str).collect();
            ledger.add(
                FailureKind::ExcessiveJsErrors,
                format!(
                    "{} JavaScript errors (limit {}): {}",
                    errors.len(),
                    self.max_js_errors,
                    sample.join(" | ")
                ),
                Severity::Critical,
                Some(page_url),
            );
        }
        errors.len()
    }
}
