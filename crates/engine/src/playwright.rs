//! Playwright browser automation
//!
//! Each page is a `node` process running the embedded bridge script, which
//! drives exactly one Playwright page. Requests and replies are
//! line-delimited JSON over stdio; page lifecycle events arrive unsolicited
//! on the same stream and are fanned out to subscribers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BrowserConfig;
use crate::error::{EngineError, EngineResult};
use crate::page::{
    bounded, ElementAction, ElementHandle, NavigateOptions, NavigationResponse, Page, PageEvent,
    PageEventStream, PageLauncher,
};

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

const BRIDGE_OPTS_ENV: &str = "SITECHECK_BRIDGE_OPTS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(EngineError::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub node_binary: String,
    /// Working directory of the bridge; `require('playwright')` resolves from here
    pub node_project_dir: Option<PathBuf>,
    /// Playwright-side timeout for element actions
    pub action_timeout_ms: u64,
    pub startup_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: "node".to_string(),
            node_project_dir: None,
            action_timeout_ms: 3000,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

impl PlaywrightConfig {
    pub fn from_browser_config(config: &BrowserConfig, action_timeout_ms: u64) -> EngineResult<Self> {
        Ok(Self {
            browser: config.browser.parse()?,
            headless: config.headless,
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
            node_binary: config.node_binary.clone(),
            node_project_dir: config.node_project_dir.clone(),
            action_timeout_ms,
            ..Default::default()
        })
    }
}

/// Check that node can resolve the playwright package
pub fn check_playwright_installed(config: &PlaywrightConfig) -> EngineResult<()> {
    let mut cmd = Command::new(&config.node_binary);
    cmd.args(["-e", "require.resolve('playwright')"])
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = &config.node_project_dir {
        cmd.current_dir(dir);
    }

    match cmd.status() {
        Ok(status) if status.success() => Ok(()),
        _ => Err(EngineError::PlaywrightNotFound),
    }
}

/// Opens one bridge process per page
pub struct PlaywrightLauncher {
    config: PlaywrightConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PageLauncher for PlaywrightLauncher {
    async fn open(&self) -> EngineResult<Box<dyn Page>> {
        let page = PlaywrightPage::spawn(&self.config).await?;
        Ok(Box::new(page))
    }
}

type Reply = Result<Value, String>;

#[derive(Default)]
struct BridgeShared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PageEvent>>>,
}

impl BridgeShared {
    /// Reserve a reply slot for request `id`. The slot is released when the
    /// returned guard drops, so abandoned requests do not linger.
    fn register(&self, id: u64) -> (PendingSlot<'_>, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (PendingSlot { shared: self, id }, rx)
    }

    fn publish(&self, event: PageEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

struct PendingSlot<'a> {
    shared: &'a BridgeShared,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Event(BridgeEvent),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    Ready,
    Console { level: String, text: String },
    PageError { message: String },
    RequestFailed { url: String, failure: String },
    Response { url: String, status: u16, navigation: bool },
    Fatal { message: String },
}

/// A live Playwright page behind a bridge process
pub struct PlaywrightPage {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    next_id: AtomicU64,
    shared: Arc<BridgeShared>,
    reader: JoinHandle<()>,
    action_timeout_ms: u64,
}

impl PlaywrightPage {
    async fn spawn(config: &PlaywrightConfig) -> EngineResult<Self> {
        let opts = json!({
            "browser": config.browser.as_str(),
            "headless": config.headless,
            "width": config.viewport_width,
            "height": config.viewport_height,
        });

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.args(["-e", BRIDGE_SCRIPT])
            .env(BRIDGE_OPTS_ENV, opts.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.node_project_dir {
            cmd.current_dir(dir);
        }

        debug!("Spawning Playwright bridge ({})", config.browser.as_str());
        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Bridge("bridge stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "sitecheck::bridge", "{}", line);
                }
            });
        }

        let shared = Arc::new(BridgeShared::default());
        let (ready_tx, ready_rx) = oneshot::channel();
        let reader = tokio::spawn(read_bridge(stdout, shared.clone(), ready_tx));

        let ready = tokio::time::timeout(config.startup_timeout, ready_rx).await;
        match ready {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(message))) => {
                reader.abort();
                return Err(EngineError::Bridge(message));
            }
            Ok(Err(_)) => {
                reader.abort();
                return Err(EngineError::Bridge("bridge exited during startup".to_string()));
            }
            Err(_) => {
                reader.abort();
                return Err(EngineError::timeout(
                    "browser bridge startup",
                    config.startup_timeout.as_millis() as u64,
                ));
            }
        }
        info!("Playwright bridge ready ({})", config.browser.as_str());

        Ok(Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            next_id: AtomicU64::new(1),
            shared,
            reader,
            action_timeout_ms: config.action_timeout_ms,
        })
    }

    async fn request(&self, op: &str, args: Value) -> EngineResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Dropped on every exit, including a caller timing the request out
        let (_slot, rx) = self.shared.register(id);

        let line = json!({ "id": id, "op": op, "args": args }).to_string() + "\n";
        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            return Err(e.into());
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(EngineError::op(op, message)),
            Err(_) => Err(EngineError::BridgeClosed(id)),
        }
    }

    fn action_request(&self, element: ElementHandle, action: &ElementAction) -> Value {
        let mut args = json!({
            "element": element.0,
            "timeout_ms": self.action_timeout_ms,
        });
        match action {
            ElementAction::Fill(value) | ElementAction::SelectOption(value) => {
                args["value"] = Value::String(value.clone());
            }
            ElementAction::ScrollIntoView
            | ElementAction::Hover
            | ElementAction::Click
            | ElementAction::Check => {}
        }
        args
    }
}

async fn read_bridge(
    stdout: ChildStdout,
    shared: Arc<BridgeShared>,
    ready_tx: oneshot::Sender<Result<(), String>>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut lines = BufReader::new(stdout).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let inbound: Inbound = match serde_json::from_str(&line) {
            Ok(inbound) => inbound,
            Err(_) => {
                debug!(target: "sitecheck::bridge", "unparsed output: {}", line);
                continue;
            }
        };

        match inbound {
            Inbound::Reply { id, ok, result, error } => {
                let reply = if ok {
                    Ok(result)
                } else {
                    Err(error.unwrap_or_else(|| "unknown bridge error".to_string()))
                };
                if let Some(tx) = shared.pending.lock().remove(&id) {
                    let _ = tx.send(reply);
                }
            }
            Inbound::Event(BridgeEvent::Ready) => {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Inbound::Event(BridgeEvent::Fatal { message }) => {
                error!("Playwright bridge failed: {}", message);
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(message));
                }
            }
            Inbound::Event(BridgeEvent::Console { level, text }) => {
                shared.publish(PageEvent::Console { level, text });
            }
            Inbound::Event(BridgeEvent::PageError { message }) => {
                shared.publish(PageEvent::PageError { message });
            }
            Inbound::Event(BridgeEvent::RequestFailed { url, failure }) => {
                shared.publish(PageEvent::RequestFailed { url, failure });
            }
            Inbound::Event(BridgeEvent::Response {
                url,
                status,
                navigation,
            }) => {
                shared.publish(PageEvent::Response {
                    url,
                    status,
                    is_navigation: navigation,
                });
            }
        }
    }

    // Dropping the senders wakes every waiter with BridgeClosed
    shared.pending.lock().clear();
    shared.subscribers.lock().clear();
    debug!("Playwright bridge output closed");
}

fn handles_from(value: Value) -> EngineResult<Vec<ElementHandle>> {
    let ids: Vec<u64> = serde_json::from_value(value)?;
    Ok(ids.into_iter().map(ElementHandle).collect())
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn navigate(&self, url: &str, options: NavigateOptions) -> EngineResult<NavigationResponse> {
        let args = json!({
            "url": url,
            "wait_until": options.wait_until.as_str(),
            "timeout_ms": options.timeout_ms,
        });
        match self.request("navigate", args).await {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(EngineError::PageOperation { reason, .. }) => Err(EngineError::Navigation {
                url: url.to_string(),
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    async fn evaluate(&self, script: &str, arg: Value) -> EngineResult<Value> {
        self.request("evaluate", json!({ "script": script, "arg": arg }))
            .await
    }

    async fn query_all(&self, selector: &str) -> EngineResult<Vec<ElementHandle>> {
        let value = self
            .request("query_all", json!({ "selector": selector }))
            .await?;
        handles_from(value)
    }

    async fn query_within(&self, parent: ElementHandle, selector: &str) -> EngineResult<Vec<ElementHandle>> {
        let value = self
            .request(
                "query_within",
                json!({ "element": parent.0, "selector": selector }),
            )
            .await?;
        handles_from(value)
    }

    async fn act(&self, element: ElementHandle, action: &ElementAction) -> EngineResult<()> {
        let args = self.action_request(element, action);
        self.request(action.name(), args).await.map(|_| ())
    }

    async fn element_evaluate(&self, element: ElementHandle, script: &str) -> EngineResult<Value> {
        self.request(
            "element_evaluate",
            json!({ "element": element.0, "script": script }),
        )
        .await
    }

    async fn screenshot(&self, full_page: bool) -> EngineResult<Vec<u8>> {
        let value = self
            .request("screenshot", json!({ "full_page": full_page }))
            .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| EngineError::op("screenshot", "bridge returned no image data"))?;
        Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
    }

    async fn set_viewport(&self, width: u32, height: u32) -> EngineResult<()> {
        self.request("set_viewport", json!({ "width": width, "height": height }))
            .await
            .map(|_| ())
    }

    fn subscribe(&self) -> PageEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    async fn close(&self) -> EngineResult<()> {
        if let Err(e) = bounded("close page", Duration::from_secs(5), self.request("close", json!({}))).await {
            debug!("Bridge close request failed: {}", e);
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(Ok(status)) => debug!("Bridge exited with {}", status),
            _ => {
                warn!("Bridge did not exit, killing it");
                child.kill().await?;
            }
        }
        self.reader.abort();
        Ok(())
    }
}
