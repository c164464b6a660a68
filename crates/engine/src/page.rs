//! Page automation capability consumed by the engine
//!
//! The engine never talks to a browser directly. Everything it needs from a
//! page goes through [`Page`], and fresh pages come from a [`PageLauncher`].
//! [`crate::playwright`] provides the default implementation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{EngineError, EngineResult};

/// Opaque reference to a DOM element held by the page implementation.
///
/// Handles are invalidated by navigation; using a stale handle is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub u64);

/// Lifecycle point navigation waits for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout_ms: u64,
}

/// Main-document response of a navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationResponse {
    /// HTTP status, 0 when no response was received (e.g. same-document navigation)
    pub status: u16,

    /// URL after redirects
    pub url: String,
}

/// Action performed against a single element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementAction {
    ScrollIntoView,
    Hover,
    Click,
    Fill(String),
    Check,
    SelectOption(String),
}

impl ElementAction {
    pub fn name(&self) -> &'static str {
        match self {
            ElementAction::ScrollIntoView => "scroll_into_view",
            ElementAction::Hover => "hover",
            ElementAction::Click => "click",
            ElementAction::Fill(_) => "fill",
            ElementAction::Check => "check",
            ElementAction::SelectOption(_) => "select_option",
        }
    }
}

/// Raw lifecycle event emitted by a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Console { level: String, text: String },
    PageError { message: String },
    RequestFailed { url: String, failure: String },
    Response { url: String, status: u16, is_navigation: bool },
}

pub type PageEventStream = mpsc::UnboundedReceiver<PageEvent>;

/// One live browser page
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str, options: NavigateOptions) -> EngineResult<NavigationResponse>;

    /// Evaluate a function expression in the page, passing `arg` as its argument
    async fn evaluate(&self, script: &str, arg: serde_json::Value) -> EngineResult<serde_json::Value>;

    async fn query_all(&self, selector: &str) -> EngineResult<Vec<ElementHandle>>;

    async fn query_within(&self, parent: ElementHandle, selector: &str) -> EngineResult<Vec<ElementHandle>>;

    async fn act(&self, element: ElementHandle, action: &ElementAction) -> EngineResult<()>;

    /// Evaluate a function expression that receives the element as its argument
    async fn element_evaluate(&self, element: ElementHandle, script: &str) -> EngineResult<serde_json::Value>;

    async fn screenshot(&self, full_page: bool) -> EngineResult<Vec<u8>>;

    async fn set_viewport(&self, width: u32, height: u32) -> EngineResult<()>;

    /// Subscribe to lifecycle events from this point on
    fn subscribe(&self) -> PageEventStream;

    async fn close(&self) -> EngineResult<()>;
}

/// Opens fresh, isolated pages
#[async_trait]
pub trait PageLauncher: Send + Sync {
    async fn open(&self) -> EngineResult<Box<dyn Page>>;
}

/// Run a page operation under a hard deadline.
///
/// The deadline only stops the engine from waiting; a side effect already
/// sent to the browser may still land.
pub async fn bounded<T, F>(what: &str, limit: Duration, operation: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::timeout(what, limit.as_millis() as u64)),
    }
}
