//! Session orchestration
//!
//! One session per tested URL. Each attempt gets a fresh page, its own
//! ledger and its own crawler; nothing is shared between attempts or
//! between concurrently running sessions.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sitecheck_common::{
    BatchSummary, Decision, FailureKind, FailureRecord, LedgerSummary, SessionReport, Severity,
    Warning,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::config::EngineConfig;
use crate::crawl::{CrawlContext, Crawler};
use crate::decision::DecisionEngine;
use crate::error::{EngineError, EngineResult};
use crate::events::EventMonitor;
use crate::interaction::InteractionPolicy;
use crate::judge::Judge;
use crate::ledger::FailureLedger;
use crate::page::{bounded, NavigateOptions, Page, PageLauncher, WaitUntil};
use crate::scripts;
use crate::sink::ResultSink;

/// Everything a completed attempt produced
struct AttemptOutcome {
    decision: Decision,
    summary: LedgerSummary,
    failures: Vec<FailureRecord>,
    warnings: Vec<Warning>,
    screenshot: Option<Vec<u8>>,
}

pub struct SessionOrchestrator {
    config: EngineConfig,
    launcher: Arc<dyn PageLauncher>,
    judge: Option<Arc<dyn Judge>>,
    sink: Option<Arc<dyn ResultSink>>,
    policy: InteractionPolicy,
}

impl SessionOrchestrator {
    pub fn new(config: EngineConfig, launcher: Arc<dyn PageLauncher>) -> Self {
        let policy = InteractionPolicy::new(&config);
        Self {
            config,
            launcher,
            judge: None,
            sink: None,
            policy,
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Test one URL. Always produces a report; execution errors become FAIL.
    pub async fn run(&self, url: &str) -> SessionReport {
        let start = Instant::now();
        info!("Testing {}", url);

        let mut report = match Url::parse(url) {
            Ok(_) => self.run_with_retries(url).await,
            Err(source) => {
                let error = EngineError::InvalidUrl {
                    url: url.to_string(),
                    source,
                };
                let mut engine = DecisionEngine::new(&self.config, None);
                SessionReport::new(url, engine.exhausted(&error.to_string()))
            }
        };
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            url,
            verdict = %report.verdict,
            source = %report.source,
            failures = report.failures.len(),
            attempts = report.attempts,
            "Session finished in {} ms",
            report.duration_ms
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write_report(&report).await {
                warn!("Failed to write report for {}: {}", url, e);
            }
        }
        report
    }

    /// Test many URLs, at most `concurrency` at a time; reports keep input order
    pub async fn run_batch(&self, urls: &[String], concurrency: usize) -> BatchSummary {
        let start = Instant::now();
        let reports: Vec<SessionReport> = stream::iter(urls)
            .map(|url| self.run(url))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let summary = BatchSummary::from_reports(reports, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {}/{} passed",
            summary.passed, summary.total
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write_summary(&summary).await {
                warn!("Failed to write batch summary: {}", e);
            }
        }
        summary
    }

    async fn run_with_retries(&self, url: &str) -> SessionReport {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let backoff = BackoffPolicy::from_retry(&self.config.retry);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.attempt(url).await {
                Ok(outcome) => return Self::report(url, outcome, attempt),
                Err(e) => {
                    warn!(url, attempt, max_attempts, "Attempt failed: {}", e);
                    last_error = Some(e);
                    if attempt < max_attempts {
                        let delay = backoff.delay(attempt);
                        debug!("Retrying in {:?}", delay);
                        backoff.wait(attempt).await;
                    }
                }
            }
        }

        let cause = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        let mut engine = DecisionEngine::new(&self.config, None);
        let mut report = SessionReport::new(url, engine.exhausted(&cause));
        report.attempts = max_attempts;
        report
    }

    fn report(url: &str, outcome: AttemptOutcome, attempts: u32) -> SessionReport {
        let mut report = SessionReport::new(url, outcome.decision);
        report.failures = outcome.failures;
        report.warnings = outcome.warnings;
        report.metrics = outcome.summary;
        report.screenshot_sha256 = outcome
            .screenshot
            .as_ref()
            .map(|png| hex::encode(Sha256::digest(png)));
        report.screenshot = outcome.screenshot;
        report.attempts = attempts;
        report
    }

    /// One attempt on a fresh page; the page is closed whatever happens
    async fn attempt(&self, url: &str) -> EngineResult<AttemptOutcome> {
        let page = self.launcher.open().await?;
        let result = self.exercise(page.as_ref(), url).await;
        if let Err(e) = page.close().await {
            debug!("Error closing page: {}", e);
        }
        result
    }

    async fn exercise(&self, page: &dyn Page, url: &str) -> EngineResult<AttemptOutcome> {
        let config = &self.config;
        let mut ledger = FailureLedger::new(url, config.thresholds.clone());
        let mut monitor = EventMonitor::new(
            page.subscribe(),
            &config.noise,
            config.thresholds.max_js_errors_per_page,
        );
        let mut decisions = DecisionEngine::new(config, self.judge.clone());

        let options = NavigateOptions {
            wait_until: WaitUntil::DomContentLoaded,
            timeout_ms: config.timeouts.navigation_ms,
        };
        let response = bounded(
            "root navigation",
            config.timeouts.navigation(),
            page.navigate(url, options),
        )
        .await?;
        ledger.record_page_visit();
        debug!(url, status = response.status, landed = %response.url, "root page loaded");

        if response.status >= 400 {
            ledger.add(
                FailureKind::HttpError,
                format!("Root page returned HTTP {}", response.status),
                Severity::Critical,
                None,
            );
            monitor.drain(&mut ledger, url);
            let decision = decisions.root_failed(&ledger, response.status);
            let summary = ledger.summary();
            let (failures, warnings) = ledger.into_parts();
            return Ok(AttemptOutcome {
                decision,
                summary,
                failures,
                warnings,
                screenshot: None,
            });
        }

        let html = self.capture_html(page).await;
        let screenshot = match bounded(
            "screenshot",
            config.timeouts.navigation(),
            page.screenshot(true),
        )
        .await
        {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Screenshot failed: {}", e);
                ledger.warn(format!("Screenshot capture failed: {}", e));
                None
            }
        };

        let stats = self.policy.exercise_page(page, url, &mut ledger).await;
        debug!(
            forms = stats.forms,
            attempted = stats.attempted,
            broken = stats.broken,
            "root page exercised"
        );
        self.check_scrolling(page, url, &mut ledger).await;
        self.check_mobile_overflow(page, url, &mut ledger).await;
        monitor.check_js_errors(&mut ledger, url);

        if config.crawl.enabled {
            let mut crawler = Crawler::new(url, config)?;
            let mut ctx = CrawlContext {
                page,
                policy: &self.policy,
                ledger: &mut ledger,
                monitor: &mut monitor,
            };
            // Relative links resolve against where the root actually landed
            let location = if response.url.is_empty() {
                url.to_string()
            } else {
                response.url.clone()
            };
            crawler.crawl(&mut ctx, location, 0).await;
            info!(url, pages = crawler.pages(), "crawl complete");
        }
        monitor.drain(&mut ledger, url);

        let decision = decisions.evaluate(&mut ledger, response.status, &html).await;
        let summary = ledger.summary();
        let (failures, warnings) = ledger.into_parts();
        Ok(AttemptOutcome {
            decision,
            summary,
            failures,
            warnings,
            screenshot,
        })
    }

    async fn capture_html(&self, page: &dyn Page) -> String {
        match bounded(
            "html capture",
            self.config.timeouts.evaluate(),
            page.evaluate(scripts::PAGE_HTML, Value::Null),
        )
        .await
        {
            Ok(Value::String(html)) => html,
            Ok(_) => String::new(),
            Err(e) => {
                debug!("HTML capture failed: {}", e);
                String::new()
            }
        }
    }

    async fn check_scrolling(&self, page: &dyn Page, url: &str, ledger: &mut FailureLedger) {
        let result = bounded(
            "scroll check",
            self.config.timeouts.evaluate(),
            page.evaluate(scripts::SCROLL_PAGE, Value::Null),
        )
        .await;
        if let Err(e) = result {
            ledger.add(
                FailureKind::ScrollingError,
                format!("Page could not be scrolled: {}", e),
                Severity::Medium,
                Some(url),
            );
        }
    }

    /// Horizontal overflow on a phone-sized viewport is only a warning
    async fn check_mobile_overflow(&self, page: &dyn Page, url: &str, ledger: &mut FailureLedger) {
        let browser = &self.config.browser;
        let timeout = self.config.timeouts.action();

        if let Err(e) = bounded(
            "mobile viewport",
            timeout,
            page.set_viewport(browser.mobile_viewport_width, browser.mobile_viewport_height),
        )
        .await
        {
            debug!("Could not switch to mobile viewport: {}", e);
            return;
        }

        let overflow = bounded(
            "overflow check",
            self.config.timeouts.evaluate(),
            page.evaluate(scripts::HORIZONTAL_OVERFLOW, Value::Null),
        )
        .await;
        match overflow {
            Ok(Value::Bool(true)) => ledger.warn(format!(
                "Horizontal overflow at {}px viewport on {}",
                browser.mobile_viewport_width, url
            )),
            Ok(_) => {}
            Err(e) => debug!("Overflow check failed: {}", e),
        }

        if let Err(e) = bounded(
            "restore viewport",
            timeout,
            page.set_viewport(browser.viewport_width, browser.viewport_height),
        )
        .await
        {
            debug!("Could not restore viewport: {}", e);
        }
    }
}
