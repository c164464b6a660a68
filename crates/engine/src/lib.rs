//! SiteCheck functionality-testing engine
//!
//! This crate decides whether a deployed website is functionally alive:
//! - Drives a browser page through an injected [`Page`] capability
//! - Exercises forms, inputs, and clickables with synthetic input
//! - Crawls same-origin links with bounded depth and page count
//! - Classifies anomalies into a severity-tagged ledger
//! - Turns the ledger (plus an optional judge) into PASS/FAIL
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SessionOrchestrator                                         │
//! │    ├── PageLauncher::open() -> Page   (fresh per attempt)    │
//! │    ├── EventMonitor       page events -> ledger              │
//! │    ├── InteractionPolicy  forms, inputs, clickables          │
//! │    ├── Crawler            same-origin links, depth/page caps │
//! │    ├── DecisionEngine     heuristic + optional Judge         │
//! │    └── ResultSink         <id>.json, <id>.png, results.json  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaywrightLauncher                                          │
//! │    └── node bridge.js  <-- line-delimited JSON over stdio    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backoff;
pub mod config;
pub mod crawl;
pub mod decision;
pub mod error;
pub mod events;
pub mod fill;
pub mod interaction;
pub mod judge;
pub mod ledger;
pub mod page;
pub mod playwright;
pub mod scripts;
pub mod session;
pub mod sink;

pub use config::EngineConfig;
pub use decision::DecisionEngine;
pub use error::{EngineError, EngineResult};
pub use judge::{HttpJudge, Judge, JudgeError};
pub use ledger::{FailureLedger, InteractionOutcome};
pub use page::{ElementAction, ElementHandle, Page, PageEvent, PageLauncher};
pub use playwright::{PlaywrightConfig, PlaywrightLauncher};
pub use session::SessionOrchestrator;
pub use sink::{JsonFileSink, ResultSink};
