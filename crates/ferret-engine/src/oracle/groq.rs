//! Groq-hosted chat-completions oracle. Speaks the OpenAI-compatible
//! endpoint, so pointing `base_url` at any compatible service works.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Oracle, OracleContext, OracleError, parse_step_reply};
use ferret_common::model::Step;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";

const ELEMENT_TEXT_LIMIT: usize = 50;
const ARIA_LIMIT: usize = 30;
const MESSAGE_LIMIT: usize = 120;

const SYSTEM_PROMPT: &str = r#"You are an expert web automation planner driving a browser one step at a time.

Available actions:
- navigate: go to a URL (target is the URL)
- click: click an element
- type: type text into an input field (value is the text)
- scroll: scroll the page (value is "up" or "down")
- extract: read text from an element
- wait: pause briefly for the page to settle
- done: the goal is complete (value is a short reason)

Validators (optional "expect" field):
- {"type": "present", "selector": "css"}: an element exists
- {"type": "value_equals", "value": "text"}: the acted-on input holds the text
- {"type": "url_contains", "value": "fragment"}: the page URL contains the fragment
- {"type": "text_contains", "value": "text"}: the page text contains the text

IMPORTANT RULES:
1. Propose exactly ONE next step as a single JSON object, no explanations.
2. Describe the "target" semantically (e.g. "search input field", "login form submit button"), never as a CSS selector.
3. Add a "visual_hint" when position or element type helps (e.g. "search box at top", "blue button at top-right").
4. When an element listing shows a node id, you may pin the step to it with "resolved_node".
5. Use short step ids (s1, s2, s3...) and do not reuse an id from the recent history.
6. Answer with action "done" only when the recent history shows the goal is satisfied.

Example reply:
{"step_id": "s3", "action": "type", "target": "search input field", "value": "mechanical keyboard", "visual_hint": "search box at top"}
"#;

pub struct GroqOracle {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqOracle {
    pub fn new(api_key: impl Into<String>) -> Self {
        GroqOracle {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Read the key from the named environment variable. The key is never
    /// stored in configuration files.
    pub fn from_env(env_var: &str) -> Result<Self, OracleError> {
        match std::env::var(env_var) {
            Ok(key) if !key.trim().is_empty() => Ok(GroqOracle::new(key)),
            _ => Err(OracleError::MissingApiKey(env_var.to_string())),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl Oracle for GroqOracle {
    async fn propose(&mut self, ctx: &OracleContext) -> Result<Step, OracleError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(ctx),
                },
            ],
            temperature: 0.3,
            max_tokens: 2000,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(OracleError::RateLimited { retry_after });
        }
        let response = response.error_for_status()?;

        let data: ChatResponse = response.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Malformed("empty completion".into()))?;
        debug!("oracle reply: {content}");
        parse_step_reply(&content)
    }
}

fn build_user_prompt(ctx: &OracleContext) -> String {
    let mut prompt = format!("Goal: {}\nURL: {}\n", ctx.goal, ctx.url);

    if ctx.nodes.is_empty() {
        prompt.push_str("\nNo interactive elements captured on this page.\n");
    } else {
        prompt.push_str("\nElements on page:\n");
        for node in &ctx.nodes {
            prompt.push_str(&format!(
                "- {} \"{}\"",
                node.tag,
                clip(&node.text, ELEMENT_TEXT_LIMIT)
            ));
            if let Some(aria) = &node.aria_label {
                prompt.push_str(&format!(" (aria: {})", clip(aria, ARIA_LIMIT)));
            }
            if !node.visible {
                prompt.push_str(" [offscreen]");
            }
            prompt.push_str(&format!(" [node {}]", node.node_id));
            prompt.push('\n');
        }
    }

    if !ctx.history.is_empty() {
        prompt.push_str("\nRecent steps:\n");
        for rec in &ctx.history {
            prompt.push_str(&format!(
                "- {} {} '{}' -> {}: {}\n",
                rec.step_id,
                rec.action,
                clip(&rec.target, ELEMENT_TEXT_LIMIT),
                if rec.ok { "ok" } else { "failed" },
                clip(&rec.message, MESSAGE_LIMIT),
            ));
        }
    }

    prompt.push_str("\nPropose the next step:");
    prompt
}

fn clip(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}
