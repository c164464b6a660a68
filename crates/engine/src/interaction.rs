//! Element discovery and interaction policy
//!
//! For one loaded page: exercise every form holistically, then walk the
//! fixed element categories in order, driving each element with synthetic
//! input. Every problem becomes a ledger entry; nothing here aborts the scan.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use sitecheck_common::{FailureKind, Severity};
use tracing::{debug, trace};

use crate::backoff::BackoffPolicy;
use crate::config::EngineConfig;
use crate::crawl::same_document;
use crate::error::EngineResult;
use crate::fill::{FillValues, InputKind};
use crate::ledger::{FailureLedger, InteractionOutcome};
use crate::page::{bounded, ElementAction, ElementHandle, NavigateOptions, Page, WaitUntil};
use crate::scripts;

pub const FORM_SELECTOR: &str = "form";

pub const FORM_FIELD_SELECTOR: &str = "input:not([type=\"hidden\"]):not([type=\"submit\"]):not([type=\"button\"]):not([type=\"reset\"]):not([type=\"image\"]), textarea, select";

pub const SUBMIT_SELECTOR: &str =
    "button[type=\"submit\"], input[type=\"submit\"], input[type=\"image\"], button:not([type])";

/// Containers treated as overlays opened by a click
pub const OVERLAY_SELECTORS: &[&str] = &[
    "[role=\"dialog\"]",
    "[aria-modal=\"true\"]",
    "dialog[open]",
    ".modal.show",
    ".modal.open",
    ".popup",
    ".lightbox",
];

/// Close controls tried in order after an overlay appears
pub const CLOSE_SELECTORS: &[&str] = &[
    "[aria-label=\"Close\"]",
    "[aria-label=\"close\"]",
    "[data-dismiss=\"modal\"]",
    "[data-bs-dismiss=\"modal\"]",
    ".modal-close",
    ".btn-close",
    ".close",
    "button.close-button",
];

/// Interactive element categories, exercised in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementCategory {
    TextInput,
    Textarea,
    Select,
    Checkbox,
    Radio,
    Clickable,
}

impl ElementCategory {
    pub const ALL: [ElementCategory; 6] = [
        ElementCategory::TextInput,
        ElementCategory::Textarea,
        ElementCategory::Select,
        ElementCategory::Checkbox,
        ElementCategory::Radio,
        ElementCategory::Clickable,
    ];

    pub fn selector(&self) -> &'static str {
        match self {
            ElementCategory::TextInput => concat!(
                "input[type=\"text\"], input[type=\"email\"], input[type=\"password\"], ",
                "input[type=\"number\"], input[type=\"tel\"], input[type=\"url\"], ",
                "input[type=\"search\"], input[type=\"date\"], input[type=\"time\"], ",
                "input[type=\"color\"], input:not([type])"
            ),
            ElementCategory::Textarea => "textarea",
            ElementCategory::Select => "select",
            ElementCategory::Checkbox => "input[type=\"checkbox\"]",
            ElementCategory::Radio => "input[type=\"radio\"]",
            ElementCategory::Clickable => concat!(
                "button, input[type=\"submit\"], input[type=\"button\"], ",
                "[role=\"button\"], a[href], [onclick]"
            ),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ElementCategory::TextInput => "text input",
            ElementCategory::Textarea => "textarea",
            ElementCategory::Select => "select",
            ElementCategory::Checkbox => "checkbox",
            ElementCategory::Radio => "radio",
            ElementCategory::Clickable => "clickable",
        }
    }
}

/// Result of [`scripts::PROBE_ELEMENT`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElementProbe {
    pub visible: bool,
    pub actionable: bool,
    pub tag: String,
    pub input_type: String,
    pub name: String,
    pub id: String,
    pub text: String,
    pub href: String,
    pub in_form: bool,
}

impl ElementProbe {
    /// Short human-readable element description for failure messages
    pub fn descriptor(&self) -> String {
        let mut out = self.tag.clone();
        if !self.input_type.is_empty() {
            out.push_str(&format!("[type={}]", self.input_type));
        }
        if !self.id.is_empty() {
            out.push_str(&format!("#{}", self.id));
        } else if !self.name.is_empty() {
            out.push_str(&format!("[name={}]", self.name));
        }
        if !self.text.is_empty() {
            out.push_str(&format!(" \"{}\"", self.text));
        }
        out
    }

    /// Anchor that would leave the page if clicked
    pub fn is_navigable_link(&self) -> bool {
        let href = self.href.trim().to_lowercase();
        self.tag == "a" && !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:")
    }
}

/// Counters for one page, used for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageInteractionStats {
    pub forms: usize,
    pub attempted: usize,
    pub broken: usize,
}

impl PageInteractionStats {
    fn absorb(&mut self, outcome: &InteractionOutcome) {
        if outcome.attempted {
            self.attempted += 1;
            if !outcome.succeeded {
                self.broken += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct InteractionPolicy {
    category_limit: Option<usize>,
    max_form_fields: usize,
    action_timeout: Duration,
    evaluate_timeout: Duration,
    navigation_timeout: Duration,
    settle: BackoffPolicy,
}

impl InteractionPolicy {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            category_limit: config.interaction.category_limit(),
            max_form_fields: config.interaction.max_form_fields,
            action_timeout: config.timeouts.action(),
            evaluate_timeout: config.timeouts.evaluate(),
            navigation_timeout: config.timeouts.navigation(),
            settle: BackoffPolicy::constant(Duration::from_millis(config.interaction.settle_delay_ms)),
        }
    }

    fn limit(&self) -> usize {
        self.category_limit.unwrap_or(usize::MAX)
    }

    /// Exercise every interactive surface of the currently loaded page
    pub async fn exercise_page(
        &self,
        page: &dyn Page,
        page_url: &str,
        ledger: &mut FailureLedger,
    ) -> PageInteractionStats {
        let mut stats = PageInteractionStats::default();
        let mut values = FillValues::new();

        // Clicks are compared against where the page actually landed
        let location = match bounded("current url", self.evaluate_timeout, page.evaluate(scripts::CURRENT_URL, serde_json::Value::Null)).await {
            Ok(serde_json::Value::String(url)) => url,
            _ => page_url.to_string(),
        };

        self.exercise_forms(page, page_url, ledger, &mut values, &mut stats).await;

        for category in ElementCategory::ALL {
            let keep_going = self
                .exercise_category(page, category, page_url, &location, ledger, &mut values, &mut stats)
                .await;
            if !keep_going {
                break;
            }
        }

        debug!(
            page = page_url,
            forms = stats.forms,
            attempted = stats.attempted,
            broken = stats.broken,
            "page interaction complete"
        );
        stats
    }

    async fn discover(
        &self,
        page: &dyn Page,
        selector: &str,
        scope: Option<ElementHandle>,
        page_url: &str,
        ledger: &mut FailureLedger,
    ) -> Vec<ElementHandle> {
        let query = async {
            match scope {
                Some(parent) => page.query_within(parent, selector).await,
                None => page.query_all(selector).await,
            }
        };
        match bounded("element discovery", self.evaluate_timeout, query).await {
            Ok(handles) => handles,
            Err(e) => {
                ledger.add(
                    FailureKind::ElementDiscoveryFailed,
                    format!("Could not query '{}': {}", selector, e),
                    Severity::High,
                    Some(page_url),
                );
                Vec::new()
            }
        }
    }

    async fn probe(&self, page: &dyn Page, element: ElementHandle) -> EngineResult<ElementProbe> {
        let value = bounded(
            "element probe",
            self.evaluate_timeout,
            page.element_evaluate(element, scripts::PROBE_ELEMENT),
        )
        .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn act(&self, page: &dyn Page, element: ElementHandle, action: &ElementAction) -> EngineResult<()> {
        bounded(action.name(), self.action_timeout, page.act(element, action)).await
    }

    /// Pick the input action for a non-clickable element, `None` when there
    /// is nothing sensible to do with it
    async fn field_action(
        &self,
        page: &dyn Page,
        element: ElementHandle,
        probe: &ElementProbe,
        values: &mut FillValues,
    ) -> Option<ElementAction> {
        match probe.tag.as_str() {
            "textarea" => Some(ElementAction::Fill(values.next(InputKind::Textarea).to_string())),
            "select" => {
                let option = bounded(
                    "select options",
                    self.evaluate_timeout,
                    page.element_evaluate(element, scripts::FIRST_OPTION_VALUE),
                )
                .await;
                match option {
                    Ok(serde_json::Value::String(value)) => Some(ElementAction::SelectOption(value)),
                    // Probe failures surface through the actionability check instead
                    Ok(_) | Err(_) => {
                        trace!(element = %probe.descriptor(), "select has no selectable option");
                        None
                    }
                }
            }
            "input" => match probe.input_type.as_str() {
                "checkbox" | "radio" => Some(ElementAction::Check),
                other => InputKind::from_input_type(other)
                    .map(|kind| ElementAction::Fill(values.next(kind).to_string())),
            },
            _ => None,
        }
    }

    /// Visibility, actionability, scroll, settle, re-check, act.
    ///
    /// Records exactly one outcome in the ledger and at most one failure.
    #[allow(clippy::too_many_arguments)]
    async fn exercise_element(
        &self,
        page: &dyn Page,
        element: ElementHandle,
        probe: &ElementProbe,
        action: &ElementAction,
        failure_kind: FailureKind,
        page_url: &str,
        ledger: &mut FailureLedger,
    ) -> InteractionOutcome {
        let descriptor = probe.descriptor();
        let outcome = self
            .run_checks_and_act(page, element, probe, action, failure_kind, page_url, ledger, &descriptor)
            .await;
        ledger.record_outcome(&outcome);
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_checks_and_act(
        &self,
        page: &dyn Page,
        element: ElementHandle,
        probe: &ElementProbe,
        action: &ElementAction,
        failure_kind: FailureKind,
        page_url: &str,
        ledger: &mut FailureLedger,
        descriptor: &str,
    ) -> InteractionOutcome {
        if !probe.visible {
            ledger.add(
                FailureKind::HiddenElement,
                format!("{} is not visible", descriptor),
                Severity::Medium,
                Some(page_url),
            );
            return InteractionOutcome::broken(descriptor);
        }
        if !probe.actionable {
            ledger.add(
                FailureKind::DisabledElement,
                format!("{} is disabled or not interactable", descriptor),
                Severity::Medium,
                Some(page_url),
            );
            return InteractionOutcome::broken(descriptor);
        }

        if let Err(e) = self.act(page, element, &ElementAction::ScrollIntoView).await {
            ledger.add(
                failure_kind,
                format!("Could not scroll {} into view: {}", descriptor, e),
                Severity::High,
                Some(page_url),
            );
            return InteractionOutcome::broken(descriptor);
        }

        self.settle.wait(1).await;

        match self.probe(page, element).await {
            Ok(after) if after.visible => {}
            Ok(_) => {
                ledger.add(
                    FailureKind::HiddenElement,
                    format!("{} is still invisible after scrolling into view (covered or off-layout)", descriptor),
                    Severity::Critical,
                    Some(page_url),
                );
                return InteractionOutcome::broken(descriptor);
            }
            Err(e) => {
                ledger.add(
                    failure_kind,
                    format!("{} could not be re-checked after scrolling: {}", descriptor, e),
                    Severity::High,
                    Some(page_url),
                );
                return InteractionOutcome::broken(descriptor);
            }
        }

        match self.act(page, element, action).await {
            Ok(()) => {
                trace!(element = descriptor, action = action.name(), "interaction succeeded");
                InteractionOutcome::success(descriptor)
            }
            Err(e) => {
                ledger.add(
                    failure_kind,
                    format!("{} on {} failed: {}", action.name(), descriptor, e),
                    Severity::High,
                    Some(page_url),
                );
                InteractionOutcome::broken(descriptor)
            }
        }
    }

    async fn exercise_forms(
        &self,
        page: &dyn Page,
        page_url: &str,
        ledger: &mut FailureLedger,
        values: &mut FillValues,
        stats: &mut PageInteractionStats,
    ) {
        let forms = self.discover(page, FORM_SELECTOR, None, page_url, ledger).await;

        for (index, form) in forms.into_iter().take(self.limit()).enumerate() {
            stats.forms += 1;
            let form_name = match self.probe(page, form).await {
                Ok(probe) if !probe.id.is_empty() || !probe.name.is_empty() => probe.descriptor(),
                _ => format!("form #{}", index + 1),
            };

            let fields = self.discover(page, FORM_FIELD_SELECTOR, Some(form), page_url, ledger).await;
            let mut attempted = 0usize;
            let mut failed = 0usize;
            let mut radio_groups = HashSet::new();

            for field in fields.into_iter().take(self.max_form_fields) {
                let outcome = match self.probe(page, field).await {
                    Ok(probe) => {
                        if probe.input_type == "radio" && !probe.name.is_empty() && !radio_groups.insert(probe.name.clone()) {
                            continue;
                        }
                        let Some(action) = self.field_action(page, field, &probe, values).await else {
                            continue;
                        };
                        self.exercise_element(page, field, &probe, &action, FailureKind::FormInputFailed, page_url, ledger)
                            .await
                    }
                    Err(e) => {
                        ledger.add(
                            FailureKind::FormInputFailed,
                            format!("Field in {} could not be inspected: {}", form_name, e),
                            Severity::High,
                            Some(page_url),
                        );
                        let outcome = InteractionOutcome::broken(format!("field in {}", form_name));
                        ledger.record_outcome(&outcome);
                        outcome
                    }
                };
                stats.absorb(&outcome);
                attempted += 1;
                if !outcome.succeeded {
                    failed += 1;
                }
            }

            if attempted > 0 && failed * 2 > attempted {
                ledger.add(
                    FailureKind::FormMostlyBroken,
                    format!("{}: {}/{} inputs failed", form_name, failed, attempted),
                    Severity::Critical,
                    Some(page_url),
                );
            }

            self.check_submit_control(page, form, &form_name, page_url, ledger).await;
        }
    }

    async fn check_submit_control(
        &self,
        page: &dyn Page,
        form: ElementHandle,
        form_name: &str,
        page_url: &str,
        ledger: &mut FailureLedger,
    ) {
        let submits = self.discover(page, SUBMIT_SELECTOR, Some(form), page_url, ledger).await;
        let Some(submit) = submits.first().copied() else {
            ledger.add(
                FailureKind::NoSubmitButton,
                format!("{} has no submit control", form_name),
                Severity::Medium,
                Some(page_url),
            );
            return;
        };

        let usable = match self.probe(page, submit).await {
            Ok(probe) => probe.visible && probe.actionable,
            Err(_) => false,
        };
        if !usable {
            ledger.add(
                FailureKind::SubmitButtonDisabled,
                format!("Submit control of {} is hidden or disabled", form_name),
                Severity::Critical,
                Some(page_url),
            );
        }
    }

    /// Returns false when the page was disturbed and the scan must stop
    #[allow(clippy::too_many_arguments)]
    async fn exercise_category(
        &self,
        page: &dyn Page,
        category: ElementCategory,
        page_url: &str,
        location: &str,
        ledger: &mut FailureLedger,
        values: &mut FillValues,
        stats: &mut PageInteractionStats,
    ) -> bool {
        let handles = self.discover(page, category.selector(), None, page_url, ledger).await;
        let mut exercised = 0usize;
        let mut radio_groups = HashSet::new();

        for element in handles {
            if exercised >= self.limit() {
                break;
            }

            let probe = match self.probe(page, element).await {
                Ok(probe) => probe,
                Err(e) => {
                    ledger.add(
                        FailureKind::InteractionFailed,
                        format!("{} could not be inspected: {}", category.label(), e),
                        Severity::High,
                        Some(page_url),
                    );
                    let outcome = InteractionOutcome::broken(category.label());
                    ledger.record_outcome(&outcome);
                    stats.absorb(&outcome);
                    exercised += 1;
                    continue;
                }
            };

            // Forms were already exercised as a whole
            if probe.in_form {
                continue;
            }

            if category == ElementCategory::Radio {
                let group = if probe.name.is_empty() {
                    format!("#handle-{}", element.0)
                } else {
                    probe.name.clone()
                };
                if !radio_groups.insert(group) {
                    continue;
                }
            }

            let action = if category == ElementCategory::Clickable {
                if probe.is_navigable_link() {
                    ElementAction::Hover
                } else {
                    ElementAction::Click
                }
            } else {
                match self.field_action(page, element, &probe, values).await {
                    Some(action) => action,
                    None => continue,
                }
            };

            let outcome = self
                .exercise_element(page, element, &probe, &action, FailureKind::InteractionFailed, page_url, ledger)
                .await;
            stats.absorb(&outcome);
            exercised += 1;

            if outcome.succeeded && action == ElementAction::Click && !self.after_click(page, location).await {
                return false;
            }
        }

        true
    }

    /// Restore the page after a click. Returns false if the click left the
    /// page, in which case the page is reloaded and remaining handles are stale.
    async fn after_click(&self, page: &dyn Page, location: &str) -> bool {
        let current = bounded(
            "current url",
            self.evaluate_timeout,
            page.evaluate(scripts::CURRENT_URL, serde_json::Value::Null),
        )
        .await;

        let stayed = matches!(&current, Ok(serde_json::Value::String(url)) if same_document(url, location));
        if !stayed {
            debug!(from = location, to = ?current.ok(), "click navigated away, restoring page");
            let options = NavigateOptions {
                wait_until: WaitUntil::DomContentLoaded,
                timeout_ms: self.navigation_timeout.as_millis() as u64,
            };
            if let Err(e) = bounded("restore page", self.navigation_timeout, page.navigate(location, options)).await {
                debug!("could not restore {}: {}", location, e);
            }
            return false;
        }

        self.close_overlay(page).await;
        true
    }

    /// Best-effort: close a visible overlay with the first usable close control
    async fn close_overlay(&self, page: &dyn Page) {
        let open = bounded(
            "overlay check",
            self.evaluate_timeout,
            page.evaluate(scripts::OVERLAY_VISIBLE, serde_json::json!(OVERLAY_SELECTORS)),
        )
        .await;
        if !matches!(open, Ok(serde_json::Value::Bool(true))) {
            return;
        }

        for selector in CLOSE_SELECTORS {
            let Ok(handles) = bounded("close control", self.evaluate_timeout, page.query_all(selector)).await else {
                continue;
            };
            let Some(control) = handles.first().copied() else {
                continue;
            };
            match self.probe(page, control).await {
                Ok(probe) if probe.visible && probe.actionable => {
                    if self.act(page, control, &ElementAction::Click).await.is_ok() {
                        debug!(selector, "closed overlay");
                        return;
                    }
                }
                _ => continue,
            }
        }
        debug!("overlay left open, no usable close control");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(tag: &str, href: &str) -> ElementProbe {
        ElementProbe {
            visible: true,
            actionable: true,
            tag: tag.to_string(),
            href: href.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_navigable_links() {
        assert!(probe("a", "/about").is_navigable_link());
        assert!(probe("a", "https://site.test/x").is_navigable_link());
        assert!(!probe("a", "#top").is_navigable_link());
        assert!(!probe("a", "javascript:void(0)").is_navigable_link());
        assert!(!probe("button", "/about").is_navigable_link());
    }

    #[test]
    fn test_descriptor() {
        let p = ElementProbe {
            tag: "input".into(),
            input_type: "email".into(),
            name: "contact".into(),
            ..Default::default()
        };
        assert_eq!(p.descriptor(), "input[type=email][name=contact]");

        let b = ElementProbe {
            tag: "button".into(),
            id: "go".into(),
            text: "Go".into(),
            ..Default::default()
        };
        assert_eq!(b.descriptor(), "button#go \"Go\"");
    }

    #[test]
    fn test_probe_deserializes_with_missing_fields() {
        let p: ElementProbe = serde_json::from_value(serde_json::json!({
            "visible": true,
            "tag": "button"
        }))
        .unwrap();
        assert!(p.visible);
        assert!(!p.actionable);
        assert!(!p.in_form);
    }

    #[test]
    fn test_category_order() {
        assert_eq!(ElementCategory::ALL.first(), Some(&ElementCategory::TextInput));
        assert_eq!(ElementCategory::ALL.last(), Some(&ElementCategory::Clickable));
    }

    #[test]
    fn test_comprehensive_mode_unbounded() {
        let mut config = EngineConfig::default();
        assert_eq!(InteractionPolicy::new(&config).limit(), 3);
        config.interaction.comprehensive = true;
        assert_eq!(InteractionPolicy::new(&config).limit(), usize::MAX);
    }
}
