//! Decision engine
//!
//! Turns a finished ledger (and optionally the judge's opinion) into the
//! session's single PASS/FAIL decision. `Pending -> Evaluated` is the only
//! transition; once evaluated the decision never changes.

use std::sync::Arc;
use std::time::Duration;

use sitecheck_common::{Decision, DecisionSource, LedgerSummary, Verdict};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::judge::{build_prompt, parse_judge_response, Judge, JudgeOutcome};
use crate::ledger::FailureLedger;

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionState {
    Pending,
    Evaluated(Decision),
}

/// Heuristic verdict from the ledger summary and the root page status
pub fn heuristic_verdict(summary: &LedgerSummary, root_status: u16) -> Verdict {
    Verdict::from_should_fail(summary.should_fail || root_status >= 400)
}

/// Human-readable reason built from the ledger
pub fn synthesize_reason(summary: &LedgerSummary, root_status: u16) -> Option<String> {
    let mut parts = Vec::new();
    if root_status >= 400 {
        parts.push(format!("HTTP {} on root page", root_status));
    }
    if summary.critical_failures > 0 {
        parts.push(format!("{} critical failure(s)", summary.critical_failures));
    }
    if summary.broken_elements > 0 {
        parts.push(format!(
            "{}/{} interactive elements broken ({:.0}%)",
            summary.broken_elements,
            summary.tested_elements,
            summary.broken_element_ratio * 100.0
        ));
    }
    if summary.high_failures > 0 {
        parts.push(format!("{} high-severity errors", summary.high_failures));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn pass_reason(summary: &LedgerSummary) -> String {
    format!(
        "All {} tested elements functional across {} page(s)",
        summary.tested_elements, summary.pages_visited
    )
}

/// Combine the heuristic verdict with the judge outcome.
///
/// FAIL from either side wins. The judge's reason is used only when its
/// verdict is the final one.
pub fn merge(summary: &LedgerSummary, root_status: u16, judge: &JudgeOutcome) -> Decision {
    let heuristic = heuristic_verdict(summary, root_status);
    let synthesized = || match heuristic {
        Verdict::Pass => Some(pass_reason(summary)),
        Verdict::Fail => synthesize_reason(summary, root_status),
    };

    let answer = match judge {
        JudgeOutcome::Verdict(answer) => answer,
        JudgeOutcome::Disabled | JudgeOutcome::Unavailable(_) => {
            return Decision {
                verdict: heuristic,
                reason: synthesized(),
                source: DecisionSource::Heuristic,
            };
        }
    };

    match (heuristic, answer.verdict) {
        (Verdict::Fail, Verdict::Pass) => Decision {
            verdict: Verdict::Fail,
            reason: synthesized(),
            source: DecisionSource::Merged,
        },
        (_, judged) => {
            let reason = answer.reason.clone().or_else(|| match judged {
                Verdict::Fail => synthesize_reason(summary, root_status)
                    .or_else(|| Some("Judge reported the site as not functional".to_string())),
                Verdict::Pass => Some(pass_reason(summary)),
            });
            Decision {
                verdict: judged,
                reason,
                source: DecisionSource::Judge,
            }
        }
    }
}

pub struct DecisionEngine {
    judge: Option<Arc<dyn Judge>>,
    judge_timeout: Duration,
    html_sample_chars: usize,
    state: DecisionState,
}

impl DecisionEngine {
    pub fn new(config: &EngineConfig, judge: Option<Arc<dyn Judge>>) -> Self {
        Self {
            judge,
            judge_timeout: config.timeouts.judge(),
            html_sample_chars: config.judge.html_sample_chars,
            state: DecisionState::Pending,
        }
    }

    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    fn settle(&mut self, decision: Decision) -> Decision {
        match &self.state {
            DecisionState::Evaluated(existing) => existing.clone(),
            DecisionState::Pending => {
                info!(
                    verdict = %decision.verdict,
                    source = %decision.source,
                    "Decision: {}",
                    decision.reason.as_deref().unwrap_or("-")
                );
                self.state = DecisionState::Evaluated(decision.clone());
                decision
            }
        }
    }

    /// Root page returned an error status; decide without crawl or judge
    pub fn root_failed(&mut self, ledger: &FailureLedger, status: u16) -> Decision {
        let summary = ledger.summary();
        let decision = Decision {
            verdict: Verdict::Fail,
            reason: synthesize_reason(&summary, status),
            source: DecisionSource::Heuristic,
        };
        self.settle(decision)
    }

    /// All attempts failed before a decision could be evaluated
    pub fn exhausted(&mut self, cause: &str) -> Decision {
        self.settle(Decision::fail(
            format!("Test execution failed: {}", cause),
            DecisionSource::Heuristic,
        ))
    }

    /// Evaluate the finished ledger, consulting the judge when configured
    pub async fn evaluate(
        &mut self,
        ledger: &mut FailureLedger,
        root_status: u16,
        html: &str,
    ) -> Decision {
        if let DecisionState::Evaluated(existing) = &self.state {
            return existing.clone();
        }

        let summary = ledger.summary();
        let outcome = if root_status >= 400 {
            JudgeOutcome::Disabled
        } else {
            self.consult_judge(ledger, &summary, html).await
        };

        if let JudgeOutcome::Unavailable(cause) = &outcome {
            ledger.warn(format!("Judge unavailable, using heuristic only: {}", cause));
        }

        self.settle(merge(&summary, root_status, &outcome))
    }

    async fn consult_judge(
        &self,
        ledger: &FailureLedger,
        summary: &LedgerSummary,
        html: &str,
    ) -> JudgeOutcome {
        let Some(judge) = &self.judge else {
            return JudgeOutcome::Disabled;
        };

        let prompt = build_prompt(
            ledger.root_url(),
            summary,
            ledger.records(),
            html,
            self.html_sample_chars,
        );
        debug!("Consulting judge ({} prompt chars)", prompt.len());

        match tokio::time::timeout(self.judge_timeout, judge.ask(&prompt)).await {
            Err(_) => {
                warn!("Judge timed out after {:?}", self.judge_timeout);
                JudgeOutcome::Unavailable(format!(
                    "timed out after {} ms",
                    self.judge_timeout.as_millis()
                ))
            }
            Ok(Err(e)) => {
                warn!("Judge request failed: {}", e);
                JudgeOutcome::Unavailable(e.to_string())
            }
            Ok(Ok(text)) => match parse_judge_response(&text) {
                Some(answer) => JudgeOutcome::Verdict(answer),
                None => {
                    warn!("Judge response did not follow the RESULT/REASON format");
                    JudgeOutcome::Unavailable("unparseable response".to_string())
                }
            },
        }
    }
}
