//! Scripted in-memory website for driving the engine without a browser
//!
//! A [`FakeSite`] maps URLs to [`FakePageSpec`]s. [`FakeLauncher`] opens
//! [`FakePage`]s over it, and every navigation, action and close is written
//! to a shared [`Journal`] the tests inspect afterwards.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sitecheck_engine::config::EngineConfig;
use sitecheck_engine::interaction::{
    ElementCategory, CLOSE_SELECTORS, FORM_FIELD_SELECTOR, FORM_SELECTOR, SUBMIT_SELECTOR,
};
use sitecheck_engine::judge::{Judge, JudgeError};
use sitecheck_engine::page::{
    ElementAction, ElementHandle, NavigateOptions, NavigationResponse, Page, PageEvent,
    PageEventStream, PageLauncher,
};
use sitecheck_engine::{scripts, EngineError, EngineResult};
use tokio::sync::mpsc;

pub const ROOT: &str = "https://site.test/";

/// Engine config with no sleeping anywhere
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.interaction.settle_delay_ms = 0;
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.timeouts.judge_ms = 200;
    config
}

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub tag: String,
    pub input_type: String,
    pub name: String,
    pub id: String,
    pub text: String,
    pub href: String,
    pub hidden: bool,
    pub disabled: bool,
    /// Element actions other than scrolling fail
    pub broken: bool,
    pub in_nav: bool,
    /// Id of the enclosing form
    pub form: Option<String>,
    pub option: Option<String>,
    /// Clicking loads this URL
    pub navigates_to: Option<String>,
    /// Visibility answered by successive probes; afterwards `!hidden`
    pub visibility_script: Vec<bool>,
    /// Actions other than scrolling take this long
    pub action_delay: Option<Duration>,
    /// Clicking opens an overlay
    pub opens_overlay: bool,
    /// Close selector this element answers to; clicking it closes the overlay
    pub close_selector: Option<String>,
}

impl FakeElement {
    fn tagged(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn button(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::tagged("button")
        }
    }

    pub fn submit() -> Self {
        Self {
            input_type: "submit".to_string(),
            ..Self::tagged("input")
        }
    }

    pub fn input(input_type: &str, name: &str) -> Self {
        Self {
            input_type: input_type.to_string(),
            name: name.to_string(),
            ..Self::tagged("input")
        }
    }

    pub fn textarea(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::tagged("textarea")
        }
    }

    pub fn select(name: &str, option: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            option: option.map(str::to_string),
            ..Self::tagged("select")
        }
    }

    pub fn link(href: &str) -> Self {
        Self {
            href: href.to_string(),
            text: href.to_string(),
            ..Self::tagged("a")
        }
    }

    pub fn nav_link(href: &str) -> Self {
        Self {
            in_nav: true,
            ..Self::link(href)
        }
    }

    /// Overlay close control found through `selector`
    pub fn close_control(selector: &str, id: &str) -> Self {
        Self {
            id: id.to_string(),
            close_selector: Some(selector.to_string()),
            ..Self::tagged("span")
        }
    }

    pub fn form(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::tagged("form")
        }
    }

    pub fn in_form(mut self, form: &str) -> Self {
        self.form = Some(form.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }

    pub fn visible_on_probes(mut self, answers: &[bool]) -> Self {
        self.visibility_script = answers.to_vec();
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.action_delay = Some(delay);
        self
    }

    pub fn opens_overlay(mut self) -> Self {
        self.opens_overlay = true;
        self
    }

    pub fn descriptor(&self) -> String {
        if !self.text.is_empty() {
            format!("{}:{}", self.tag, self.text)
        } else if !self.name.is_empty() {
            format!("{}:{}", self.tag, self.name)
        } else {
            format!("{}:{}", self.tag, self.id)
        }
    }

    fn is_field(&self) -> bool {
        match self.tag.as_str() {
            "textarea" | "select" => true,
            "input" => !matches!(
                self.input_type.as_str(),
                "hidden" | "submit" | "button" | "reset" | "image"
            ),
            _ => false,
        }
    }

    fn is_submit(&self) -> bool {
        (self.tag == "button" && self.input_type.is_empty())
            || (self.tag == "input" && matches!(self.input_type.as_str(), "submit" | "image"))
    }

    fn matches_category(&self, category: ElementCategory) -> bool {
        let tag = self.tag.as_str();
        let ty = self.input_type.as_str();
        match category {
            ElementCategory::TextInput => {
                tag == "input"
                    && matches!(
                        ty,
                        "" | "text" | "email" | "password" | "number" | "tel" | "url" | "search"
                            | "date" | "time" | "color"
                    )
            }
            ElementCategory::Textarea => tag == "textarea",
            ElementCategory::Select => tag == "select",
            ElementCategory::Checkbox => tag == "input" && ty == "checkbox",
            ElementCategory::Radio => tag == "input" && ty == "radio",
            ElementCategory::Clickable => {
                tag == "button"
                    || (tag == "input" && matches!(ty, "submit" | "button"))
                    || (tag == "a" && !self.href.is_empty())
            }
        }
    }

    fn probe(&self, call: usize) -> Value {
        let visible = self
            .visibility_script
            .get(call)
            .copied()
            .unwrap_or(!self.hidden);
        json!({
            "visible": visible,
            "actionable": !self.disabled,
            "tag": self.tag,
            "input_type": self.input_type,
            "name": self.name,
            "id": self.id,
            "text": self.text,
            "href": self.href,
            "in_form": self.form.is_some(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FakePageSpec {
    pub status: u16,
    pub elements: Vec<FakeElement>,
    /// Emitted on every load of the page
    pub events: Vec<PageEvent>,
    pub navigation_error: bool,
    pub scroll_broken: bool,
    pub overflow_on_mobile: bool,
    pub discovery_broken: bool,
    /// Navigating here lands on this URL instead
    pub redirects_to: Option<String>,
    pub html: String,
}

impl FakePageSpec {
    pub fn ok() -> Self {
        Self::status(200)
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            elements: Vec::new(),
            events: Vec::new(),
            navigation_error: false,
            scroll_broken: false,
            overflow_on_mobile: false,
            discovery_broken: false,
            redirects_to: None,
            html: "<html><body>fake</body></html>".to_string(),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            navigation_error: true,
            ..Self::ok()
        }
    }

    pub fn redirect(target: &str) -> Self {
        Self {
            redirects_to: Some(target.to_string()),
            ..Self::ok()
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_event(mut self, event: PageEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_page_errors(mut self, count: usize) -> Self {
        for i in 0..count {
            self.events.push(PageEvent::PageError {
                message: format!("TypeError: e{} is undefined", i),
            });
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePageSpec>,
    /// Navigations still to fail per URL
    flaky: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, spec: FakePageSpec) -> Self {
        self.pages.insert(url.to_string(), spec);
        self
    }

    /// The first `failures` navigations to `url` fail
    pub fn flaky(self, url: &str, failures: usize) -> Self {
        self.flaky.lock().insert(url.to_string(), failures);
        self
    }

    fn take_flaky_failure(&self, url: &str) -> bool {
        match self.flaky.lock().get_mut(url) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn lookup(&self, url: &str) -> FakePageSpec {
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FakePageSpec::status(404))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub page: String,
    pub element: String,
    pub action: &'static str,
}

#[derive(Debug, Default)]
pub struct Journal {
    pub opens: usize,
    pub closes: usize,
    pub navigations: Vec<String>,
    pub actions: Vec<ActionEntry>,
    pub viewports: Vec<(u32, u32)>,
    pub overlays_closed: usize,
}

impl Journal {
    /// Actions other than scroll-into-view
    pub fn interactions(&self) -> Vec<&ActionEntry> {
        self.actions
            .iter()
            .filter(|a| a.action != "scroll_into_view")
            .collect()
    }
}

pub struct FakeLauncher {
    site: Arc<FakeSite>,
    pub journal: Arc<Mutex<Journal>>,
    open_failures: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            journal: Arc::new(Mutex::new(Journal::default())),
            open_failures: AtomicUsize::new(0),
        }
    }

    /// The next `n` opens fail
    pub fn failing_opens(self, n: usize) -> Self {
        self.open_failures.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl PageLauncher for FakeLauncher {
    async fn open(&self) -> EngineResult<Box<dyn Page>> {
        self.journal.lock().opens += 1;
        let failing = self
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::Bridge("browser failed to launch".to_string()));
        }
        Ok(Box::new(FakePage::new(self.site.clone(), self.journal.clone())))
    }
}

struct PageState {
    url: String,
    spec: Option<FakePageSpec>,
    generation: u64,
    width: u32,
    subscribers: Vec<mpsc::UnboundedSender<PageEvent>>,
    probe_calls: HashMap<u64, usize>,
    overlay_open: bool,
}

pub struct FakePage {
    site: Arc<FakeSite>,
    journal: Arc<Mutex<Journal>>,
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new(site: Arc<FakeSite>, journal: Arc<Mutex<Journal>>) -> Self {
        Self {
            site,
            journal,
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                spec: None,
                generation: 0,
                width: 1280,
                subscribers: Vec::new(),
                probe_calls: HashMap::new(),
                overlay_open: false,
            }),
        }
    }

    /// Load `url` into the page and emit its events
    fn load(&self, url: &str) -> FakePageSpec {
        let spec = self.site.lookup(url);
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.generation += 1;
        state.spec = Some(spec.clone());
        state.overlay_open = false;
        for event in &spec.events {
            state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
        spec
    }

    fn handle(generation: u64, index: usize) -> ElementHandle {
        ElementHandle((generation << 32) | index as u64)
    }

    fn element(&self, handle: ElementHandle) -> EngineResult<(String, FakeElement)> {
        let state = self.state.lock();
        let generation = handle.0 >> 32;
        let index = (handle.0 & 0xffff_ffff) as usize;
        if generation != state.generation {
            return Err(EngineError::op("element", "stale element handle"));
        }
        state
            .spec
            .as_ref()
            .and_then(|spec| spec.elements.get(index))
            .map(|el| (state.url.clone(), el.clone()))
            .ok_or_else(|| EngineError::op("element", "unknown element handle"))
    }

    fn select<F>(&self, filter: F) -> EngineResult<Vec<ElementHandle>>
    where
        F: Fn(&FakeElement) -> bool,
    {
        let state = self.state.lock();
        let Some(spec) = &state.spec else {
            return Ok(Vec::new());
        };
        if spec.discovery_broken {
            return Err(EngineError::op("query_all", "document is detached"));
        }
        Ok(spec
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| filter(el))
            .map(|(i, _)| Self::handle(state.generation, i))
            .collect())
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str, _options: NavigateOptions) -> EngineResult<NavigationResponse> {
        self.journal.lock().navigations.push(url.to_string());
        let requested = self.site.lookup(url);
        if requested.navigation_error || self.site.take_flaky_failure(url) {
            return Err(EngineError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        let landed = requested.redirects_to.unwrap_or_else(|| url.to_string());
        let spec = self.load(&landed);
        Ok(NavigationResponse {
            status: spec.status,
            url: landed,
        })
    }

    async fn evaluate(&self, script: &str, _arg: Value) -> EngineResult<Value> {
        let state = self.state.lock();
        let spec = state.spec.clone().unwrap_or_else(FakePageSpec::ok);
        if script == scripts::CURRENT_URL {
            Ok(Value::String(state.url.clone()))
        } else if script == scripts::PAGE_HTML {
            Ok(Value::String(spec.html))
        } else if script == scripts::EXTRACT_LINKS {
            let links: Vec<Value> = spec
                .elements
                .iter()
                .filter(|el| el.tag == "a" && !el.href.is_empty())
                .map(|el| json!({ "href": el.href, "in_nav": el.in_nav }))
                .collect();
            Ok(Value::Array(links))
        } else if script == scripts::SCROLL_PAGE {
            if spec.scroll_broken {
                Err(EngineError::op("evaluate", "window.scrollTo is not a function"))
            } else {
                Ok(json!(2000))
            }
        } else if script == scripts::HORIZONTAL_OVERFLOW {
            Ok(Value::Bool(spec.overflow_on_mobile && state.width < 500))
        } else if script == scripts::OVERLAY_VISIBLE {
            Ok(Value::Bool(state.overlay_open))
        } else {
            Ok(Value::Null)
        }
    }

    async fn query_all(&self, selector: &str) -> EngineResult<Vec<ElementHandle>> {
        if selector == FORM_SELECTOR {
            return self.select(|el| el.tag == "form");
        }
        if CLOSE_SELECTORS.contains(&selector) {
            return self.select(|el| el.close_selector.as_deref() == Some(selector));
        }
        match ElementCategory::ALL.iter().find(|c| c.selector() == selector) {
            Some(category) => self.select(|el| el.matches_category(*category)),
            None => Ok(Vec::new()),
        }
    }

    async fn query_within(&self, parent: ElementHandle, selector: &str) -> EngineResult<Vec<ElementHandle>> {
        let (_, form) = self.element(parent)?;
        let owner = Some(form.id.clone());
        if selector == FORM_FIELD_SELECTOR {
            self.select(|el| el.form == owner && el.is_field())
        } else if selector == SUBMIT_SELECTOR {
            self.select(|el| el.form == owner && el.is_submit())
        } else {
            Ok(Vec::new())
        }
    }

    async fn act(&self, element: ElementHandle, action: &ElementAction) -> EngineResult<()> {
        let (url, el) = self.element(element)?;
        self.journal.lock().actions.push(ActionEntry {
            page: url,
            element: el.descriptor(),
            action: action.name(),
        });

        if *action == ElementAction::ScrollIntoView {
            return Ok(());
        }
        if let Some(delay) = el.action_delay {
            tokio::time::sleep(delay).await;
        }
        if el.broken {
            return Err(EngineError::op(action.name(), "element is not receiving events"));
        }
        if *action == ElementAction::Click {
            if el.opens_overlay {
                self.state.lock().overlay_open = true;
            }
            if el.close_selector.is_some() {
                self.state.lock().overlay_open = false;
                self.journal.lock().overlays_closed += 1;
            }
            if let Some(target) = &el.navigates_to {
                self.load(target);
            }
        }
        Ok(())
    }

    async fn element_evaluate(&self, element: ElementHandle, script: &str) -> EngineResult<Value> {
        let (_, el) = self.element(element)?;
        if script == scripts::PROBE_ELEMENT {
            let call = {
                let mut state = self.state.lock();
                let calls = state.probe_calls.entry(element.0).or_insert(0);
                *calls += 1;
                *calls - 1
            };
            Ok(el.probe(call))
        } else if script == scripts::FIRST_OPTION_VALUE {
            Ok(el.option.map(Value::String).unwrap_or(Value::Null))
        } else {
            Ok(Value::Null)
        }
    }

    async fn screenshot(&self, _full_page: bool) -> EngineResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a])
    }

    async fn set_viewport(&self, width: u32, height: u32) -> EngineResult<()> {
        self.state.lock().width = width;
        self.journal.lock().viewports.push((width, height));
        Ok(())
    }

    fn subscribe(&self) -> PageEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(tx);
        rx
    }

    async fn close(&self) -> EngineResult<()> {
        self.journal.lock().closes += 1;
        self.state.lock().subscribers.clear();
        Ok(())
    }
}

/// Judge that answers with fixed text, optionally after a delay
pub struct ScriptedJudge {
    response: Result<String, String>,
    delay: Duration,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedJudge {
    pub fn answering(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            response: Err(format!("{}", status)),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn ask(&self, prompt: &str) -> Result<String, JudgeError> {
        self.prompts.lock().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(JudgeError::Api {
                status: status.parse().unwrap_or(500),
                body: "upstream unavailable".to_string(),
            }),
        }
    }
}
