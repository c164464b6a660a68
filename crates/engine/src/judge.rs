//! External judgment service
//!
//! The judge is advisory. It sees the same evidence as the heuristic and
//! answers in a strict textual protocol:
//!
//! ```text
//! RESULT: PASS|FAIL
//! REASON: <free text>        (optional)
//! ```
//!
//! Anything else is treated as no answer.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sitecheck_common::{FailureRecord, LedgerSummary, Verdict};
use thiserror::Error;
use tracing::debug;

use crate::config::JudgeConfig;

#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Judge API key not set (expected in ${0})")]
    MissingApiKey(String),

    #[error("Judge request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Judge API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Judge response missing field: {0}")]
    MissingField(&'static str),
}

#[async_trait]
pub trait Judge: Send + Sync {
    /// Send the prompt and return the raw response text
    async fn ask(&self, prompt: &str) -> Result<String, JudgeError>;
}

/// A parsed judge answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub verdict: Verdict,
    pub reason: Option<String>,
}

/// Outcome of consulting the judge, including every way it can be absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgeOutcome {
    Disabled,
    Unavailable(String),
    Verdict(JudgeVerdict),
}

static RESULT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*RESULT:\s*(PASS|FAIL)\s*$").expect("valid RESULT regex"));

static REASON_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*REASON:[ \t]*(.*\S)[ \t]*$").expect("valid REASON regex"));

/// Parse a response by the RESULT/REASON protocol; `None` if it does not conform
pub fn parse_judge_response(text: &str) -> Option<JudgeVerdict> {
    let mut results = RESULT_LINE.captures_iter(text);
    let first = results.next()?;
    // Contradictory or repeated RESULT lines are not a conforming answer
    if results.next().is_some() {
        return None;
    }
    let verdict = match &first[1] {
        "PASS" => Verdict::Pass,
        _ => Verdict::Fail,
    };
    let reason = REASON_LINE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|r| !r.is_empty());
    Some(JudgeVerdict { verdict, reason })
}

/// Truncate on a char boundary
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the judge prompt from the session evidence
pub fn build_prompt(
    url: &str,
    summary: &LedgerSummary,
    failures: &[FailureRecord],
    html: &str,
    html_sample_chars: usize,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are verifying whether a deployed website is functionally working: it loads, \
         its interactive elements respond, and navigation works. Ignore visual design and \
         content quality.\n\n",
    );
    prompt.push_str(&format!("URL: {}\n\n", url));
    prompt.push_str("Automated test metrics:\n");
    prompt.push_str(&format!("- Pages visited: {}\n", summary.pages_visited));
    prompt.push_str(&format!("- Elements tested: {}\n", summary.tested_elements));
    prompt.push_str(&format!(
        "- Broken elements: {} ({:.1}%)\n",
        summary.broken_elements,
        summary.broken_element_ratio * 100.0
    ));
    prompt.push_str(&format!("- Total failures: {}\n", summary.total_failures));
    prompt.push_str(&format!("- Critical failures: {}\n", summary.critical_failures));
    prompt.push_str(&format!("- High-severity failures: {}\n\n", summary.high_failures));

    if failures.is_empty() {
        prompt.push_str("Failures: none\n\n");
    } else {
        prompt.push_str("Failures:\n");
        for failure in failures {
            prompt.push_str(&format!("- {}\n", failure));
        }
        prompt.push('\n');
    }

    let sample = truncate_chars(html, html_sample_chars);
    prompt.push_str(&format!(
        "HTML sample ({} of {} characters):\n{}\n\n",
        sample.chars().count(),
        html.chars().count(),
        sample
    ));
    prompt.push_str(
        "Answer in exactly this format:\nRESULT: PASS or RESULT: FAIL\nREASON: <one sentence>\n",
    );
    prompt
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Judge backed by an OpenAI-compatible chat completions endpoint
pub struct HttpJudge {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: String,
}

impl HttpJudge {
    /// Build from config; the API key is read from the configured env var
    pub fn from_config(config: &JudgeConfig, timeout: Duration) -> Result<Self, JudgeError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| JudgeError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(&config.api_url, &config.model, api_key, timeout)
    }

    pub fn new(
        api_url: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, JudgeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Judge for HttpJudge {
    async fn ask(&self, prompt: &str) -> Result<String, JudgeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a strict QA engineer judging whether websites work.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
            max_tokens: 200,
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(JudgeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(JudgeError::MissingField("choices[0].message.content"))?;
        debug!("judge response: {}", content);
        Ok(content)
    }
}
