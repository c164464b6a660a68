//! Same-origin crawl traversal
//!
//! Depth- and page-bounded exploration of the tested site. The [`Crawler`]
//! owns the session's visited set: it only ever grows, and a URL is marked
//! before it is navigated so failures and self-links cannot cause re-entry.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use sitecheck_common::{FailureKind, Severity};
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::config::{CrawlConfig, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::events::EventMonitor;
use crate::interaction::InteractionPolicy;
use crate::ledger::FailureLedger;
use crate::page::{bounded, NavigateOptions, NavigationResponse, Page, WaitUntil};
use crate::scripts;

/// Targets that are downloads rather than pages
const SKIPPED_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "gz", "tgz", "tar", "rar", "7z", "exe", "dmg", "msi", "apk", "iso", "doc", "docx",
    "xls", "xlsx", "ppt", "pptx", "csv", "odt", "jpg", "jpeg", "png", "gif", "svg", "webp", "ico",
    "bmp", "mp3", "mp4", "wav", "avi", "mov", "webm", "woff", "woff2", "ttf", "xml", "json",
];

/// Canonical form used for dedup: http(s) only, no fragment, no trailing
/// slash on non-root paths. Host case and default ports are normalized by
/// the parser.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    normalize_parsed(url)
}

fn normalize_parsed(mut url: Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Some(url.to_string())
}

/// Whether two URLs refer to the same document, ignoring fragments
pub fn same_document(a: &str, b: &str) -> bool {
    match (normalize_url(a), normalize_url(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn has_skipped_extension(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) => SKIPPED_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// One anchor reported by [`scripts::EXTRACT_LINKS`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkCandidate {
    pub href: String,
    #[serde(default)]
    pub in_nav: bool,
}

/// Filter, prioritize, dedup, and bound the links found on one page.
///
/// Links inside navigation containers come first; order is otherwise
/// preserved. Returned URLs are normalized.
pub fn select_links(
    candidates: &[LinkCandidate],
    base: &Url,
    current_url: &str,
    visited: &HashSet<String>,
    limit: usize,
) -> Vec<String> {
    let current = Url::parse(current_url).unwrap_or_else(|_| base.clone());
    let current_normalized = normalize_parsed(current.clone());

    let mut nav = Vec::new();
    let mut rest = Vec::new();

    for candidate in candidates {
        let href = candidate.href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(resolved) = current.join(href) else {
            continue;
        };
        if resolved.host_str() != base.host_str() || has_skipped_extension(&resolved) {
            continue;
        }
        // Rejects mailto:, tel:, javascript: and friends
        let Some(normalized) = normalize_parsed(resolved) else {
            continue;
        };
        if visited.contains(&normalized) || Some(&normalized) == current_normalized.as_ref() {
            continue;
        }
        if candidate.in_nav {
            nav.push(normalized);
        } else {
            rest.push(normalized);
        }
    }

    let mut seen = HashSet::new();
    nav.into_iter()
        .chain(rest)
        .filter(|url| seen.insert(url.clone()))
        .take(limit)
        .collect()
}

/// Mutable session state the crawl threads through every page
pub struct CrawlContext<'a> {
    pub page: &'a dyn Page,
    pub policy: &'a InteractionPolicy,
    pub ledger: &'a mut FailureLedger,
    pub monitor: &'a mut EventMonitor,
}

pub struct Crawler {
    base: Url,
    config: CrawlConfig,
    visited: HashSet<String>,
    pages: usize,
    navigation_timeout: Duration,
    evaluate_timeout: Duration,
    retry: BackoffPolicy,
}

impl Crawler {
    /// The root page counts as visited and as one of the session's pages
    pub fn new(root_url: &str, config: &EngineConfig) -> EngineResult<Self> {
        let base = Url::parse(root_url).map_err(|source| EngineError::InvalidUrl {
            url: root_url.to_string(),
            source,
        })?;
        let mut visited = HashSet::new();
        if let Some(root) = normalize_parsed(base.clone()) {
            visited.insert(root);
        }
        Ok(Self {
            base,
            config: config.crawl.clone(),
            visited,
            pages: 1,
            navigation_timeout: config.timeouts.navigation(),
            evaluate_timeout: config.timeouts.evaluate(),
            retry: BackoffPolicy::from_retry(&config.retry),
        })
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    /// Pages navigated so far, root included
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn budget_left(&self) -> bool {
        self.pages < self.config.max_pages
    }

    /// Explore links from `current_url`, which must be loaded in the page
    pub fn crawl<'s>(
        &'s mut self,
        ctx: &'s mut CrawlContext<'_>,
        current_url: String,
        current_depth: usize,
    ) -> BoxFuture<'s, ()> {
        async move {
            if current_depth >= self.config.max_depth || !self.budget_left() {
                return;
            }

            let found = self.extract_links(ctx, &current_url).await;
            let links = select_links(
                &found,
                &self.base,
                &current_url,
                &self.visited,
                self.config.max_links_per_page,
            );
            debug!(page = %current_url, depth = current_depth, found = found.len(), selected = links.len(), "crawl candidates");

            for link in links {
                if !self.budget_left() {
                    debug!(max_pages = self.config.max_pages, "page budget exhausted");
                    break;
                }
                if !self.visited.insert(link.clone()) {
                    continue;
                }
                self.pages += 1;

                // Script errors belong to this page even when it is not exercised
                let response = match self.navigate(ctx.page, &link).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(url = %link, "navigation failed: {}", e);
                        ctx.ledger.add(
                            FailureKind::NavigationError,
                            format!("Could not navigate to {}: {}", link, e),
                            Severity::High,
                            Some(link.as_str()),
                        );
                        ctx.monitor.check_js_errors(ctx.ledger, &link);
                        continue;
                    }
                };

                if response.status >= 400 {
                    ctx.ledger.add(
                        FailureKind::PageLoadFailed,
                        format!("{} returned HTTP {}", link, response.status),
                        Severity::Critical,
                        Some(link.as_str()),
                    );
                    ctx.monitor.check_js_errors(ctx.ledger, &link);
                    continue;
                }

                let Some(landed) = self.landed_page(&response, &link) else {
                    ctx.monitor.check_js_errors(ctx.ledger, &link);
                    continue;
                };

                info!(url = %landed, depth = current_depth + 1, status = response.status, "crawled page");
                ctx.ledger.record_page_visit();
                ctx.policy.exercise_page(ctx.page, &landed, ctx.ledger).await;
                ctx.monitor.check_js_errors(ctx.ledger, &landed);

                self.crawl(ctx, landed, current_depth + 1).await;
            }
        }
        .boxed()
    }

    /// Where a navigation to `link` actually landed, or `None` when a
    /// redirect left the origin or reached a page already tested
    fn landed_page(&mut self, response: &NavigationResponse, link: &str) -> Option<String> {
        if response.url.is_empty() || same_document(&response.url, link) {
            return Some(link.to_string());
        }
        let Ok(landed) = Url::parse(&response.url) else {
            return Some(link.to_string());
        };
        if landed.host_str() != self.base.host_str() {
            debug!(from = link, to = %response.url, "redirected off-origin, not exercising");
            return None;
        }
        if let Some(normalized) = normalize_parsed(landed) {
            if !self.visited.insert(normalized) {
                debug!(from = link, to = %response.url, "redirected to an already visited page");
                return None;
            }
        }
        Some(response.url.clone())
    }

    async fn extract_links(&self, ctx: &mut CrawlContext<'_>, current_url: &str) -> Vec<LinkCandidate> {
        let result = bounded(
            "link extraction",
            self.evaluate_timeout,
            ctx.page.evaluate(scripts::EXTRACT_LINKS, serde_json::Value::Null),
        )
        .await
        .and_then(|value| serde_json::from_value::<Vec<LinkCandidate>>(value).map_err(EngineError::from));

        match result {
            Ok(links) => links,
            Err(e) => {
                ctx.ledger.add(
                    FailureKind::ElementDiscoveryFailed,
                    format!("Could not extract links: {}", e),
                    Severity::High,
                    Some(current_url),
                );
                Vec::new()
            }
        }
    }

    async fn navigate(&self, page: &dyn Page, url: &str) -> EngineResult<NavigationResponse> {
        let options = NavigateOptions {
            wait_until: WaitUntil::DomContentLoaded,
            timeout_ms: self.navigation_timeout.as_millis() as u64,
        };
        let mut attempt = 1;
        loop {
            match bounded("navigation", self.navigation_timeout, page.navigate(url, options)).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.config.navigation_attempts => {
                    debug!(url, attempt, "navigation failed, retrying: {}", e);
                    self.retry.wait(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
