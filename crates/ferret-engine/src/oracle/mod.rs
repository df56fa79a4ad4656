//! Next-step proposal. The control loop depends only on the [`Oracle`]
//! trait; everything about how a proposal is produced, including prompt
//! construction and network transport, stays behind it.

pub mod groq;

use std::collections::VecDeque;

use async_trait::async_trait;
use ferret_common::model::{Action, Step};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::OracleNode;

pub use groq::GroqOracle;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("api key environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("oracle http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("oracle rate limited")]
    RateLimited { retry_after: Option<u64> },
    #[error("malformed oracle reply: {0}")]
    Malformed(String),
}

/// One already-attempted step, shown back to the oracle as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub action: Action,
    pub target: String,
    pub ok: bool,
    pub message: String,
}

/// Everything the oracle sees for one proposal.
#[derive(Debug, Clone, Serialize)]
pub struct OracleContext {
    pub goal: String,
    pub url: String,
    pub nodes: Vec<OracleNode>,
    pub history: Vec<StepRecord>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn propose(&mut self, ctx: &OracleContext) -> Result<Step, OracleError>;
}

/// Replays a fixed step sequence, then keeps answering `done`. The loop
/// tests and offline runs use this in place of a live model.
pub struct ScriptedOracle {
    steps: VecDeque<Step>,
}

impl ScriptedOracle {
    pub fn new(steps: Vec<Step>) -> Self {
        ScriptedOracle {
            steps: steps.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn propose(&mut self, _ctx: &OracleContext) -> Result<Step, OracleError> {
        Ok(self.steps.pop_front().unwrap_or_else(|| {
            let mut done = Step::new("scripted-done", Action::Done, "");
            done.value = Some("script exhausted".to_string());
            done
        }))
    }
}

/// Decode a model reply into one step. Tolerates markdown code fences,
/// a bare array, and a `{"steps": [...]}` wrapper, always taking the
/// first step. Anything else is malformed.
pub fn parse_step_reply(raw: &str) -> Result<Step, OracleError> {
    let cleaned = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(cleaned)
        .map_err(|e| OracleError::Malformed(format!("invalid JSON: {e}")))?;
    let step_value = match value {
        serde_json::Value::Array(mut items) => {
            if items.is_empty() {
                return Err(OracleError::Malformed("empty step array".into()));
            }
            items.remove(0)
        }
        serde_json::Value::Object(mut map) => match map.remove("steps") {
            Some(serde_json::Value::Array(mut items)) if !items.is_empty() => items.remove(0),
            Some(_) => {
                return Err(OracleError::Malformed(
                    "steps field is not a non-empty array".into(),
                ));
            }
            None => serde_json::Value::Object(map),
        },
        other => {
            return Err(OracleError::Malformed(format!(
                "expected a step object, got {other}"
            )));
        }
    };
    serde_json::from_value(step_value).map_err(|e| OracleError::Malformed(format!("bad step: {e}")))
}

/// Models wrap JSON in markdown fences often enough that stripping them
/// here beats hoping prompt rules hold. Takes the content between the
/// first fence pair, ignoring any prose around it.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferret_common::model::Validator;

    // ==== reply parsing ====

    #[test]
    fn parses_plain_object() {
        let step = parse_step_reply(r#"{"step_id": "s1", "action": "click", "target": "login"}"#)
            .unwrap();
        assert_eq!(step.step_id, "s1");
        assert_eq!(step.action, Action::Click);
        assert_eq!(step.target, "login");
    }

    #[test]
    fn parses_fenced_reply_with_prose() {
        let raw = "Here is the next step:\n```json\n{\"step_id\": \"s2\", \"action\": \"type\", \"target\": \"search box\", \"value\": \"rust\"}\n```\nGood luck!";
        let step = parse_step_reply(raw).unwrap();
        assert_eq!(step.step_id, "s2");
        assert_eq!(step.value.as_deref(), Some("rust"));
    }

    #[test]
    fn parses_bare_fence_without_language_tag() {
        let raw = "```\n{\"step_id\": \"s1\", \"action\": \"wait\"}\n```";
        let step = parse_step_reply(raw).unwrap();
        assert_eq!(step.action, Action::Wait);
    }

    #[test]
    fn takes_first_of_steps_wrapper() {
        let raw = r#"{"steps": [
            {"step_id": "s1", "action": "navigate", "target": "https://example.com"},
            {"step_id": "s2", "action": "click", "target": "login"}
        ]}"#;
        let step = parse_step_reply(raw).unwrap();
        assert_eq!(step.step_id, "s1");
        assert_eq!(step.action, Action::Navigate);
    }

    #[test]
    fn takes_first_of_bare_array() {
        let raw = r#"[{"step_id": "s1", "action": "scroll", "value": "down"}]"#;
        let step = parse_step_reply(raw).unwrap();
        assert_eq!(step.action, Action::Scroll);
        assert_eq!(step.value.as_deref(), Some("down"));
    }

    #[test]
    fn decodes_expect_validator() {
        let raw = r#"{"step_id": "s4", "action": "wait", "expect": {"type": "text_contains", "value": "Added to Cart"}}"#;
        let step = parse_step_reply(raw).unwrap();
        assert_eq!(
            step.expect,
            Some(Validator::TextContains {
                value: "Added to Cart".into()
            })
        );
    }

    #[test]
    fn rejects_missing_required_fields() {
        let err = parse_step_reply(r#"{"action": "click", "target": "x"}"#).unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
        let err = parse_step_reply(r#"{"step_id": "s1", "target": "x"}"#).unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[test]
    fn rejects_junk() {
        assert!(matches!(
            parse_step_reply("the page looks fine to me"),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            parse_step_reply("[]"),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            parse_step_reply(r#"{"steps": "none"}"#),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            parse_step_reply("42"),
            Err(OracleError::Malformed(_))
        ));
    }

    // ==== scripted oracle ====

    fn ctx() -> OracleContext {
        OracleContext {
            goal: "test".into(),
            url: "https://example.com".into(),
            nodes: Vec::new(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn scripted_oracle_replays_then_finishes() {
        let mut oracle = ScriptedOracle::new(vec![
            Step::new("s1", Action::Click, "login"),
            Step::new("s2", Action::Wait, ""),
        ]);
        assert_eq!(oracle.remaining(), 2);
        assert_eq!(oracle.propose(&ctx()).await.unwrap().step_id, "s1");
        assert_eq!(oracle.propose(&ctx()).await.unwrap().step_id, "s2");
        let done = oracle.propose(&ctx()).await.unwrap();
        assert_eq!(done.action, Action::Done);
        assert_eq!(done.value.as_deref(), Some("script exhausted"));
        // Exhaustion holds on every later call too.
        assert_eq!(oracle.propose(&ctx()).await.unwrap().action, Action::Done);
    }
}
