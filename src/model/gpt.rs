//! OpenAI-compatible chat-completion adapter that speaks JSON messages.

use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ModelAdapter;
use crate::config::HyvConfig;
use crate::error::HyvError;
use crate::http::{json_headers, response_error, shared_client};
use crate::types::Message;
use crate::util::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SYSTEM_INSTRUCTION: &str = concat!(
    "You are an AI. Your tasks: think, reason, reflect, answer. ",
    "You NEVER explain or add notes. ALL content will be inserted in JSON. ",
    "You EXCLUSIVELY communicate **valid JSON**. ",
    "**You answer EXCLUSIVELY!!! as valid JSON in this Format**: ",
    r#"{"thought":"string","reason":"string","reflection":"string","answer":"string"}"#
);

/// Generation options for [`GptModelAdapter`].
#[derive(Debug, Clone, Builder)]
pub struct GptOptions {
    #[builder(into, default = "gpt-3.5-turbo".to_string())]
    pub model: String,
    #[builder(default = 0.5)]
    pub temperature: f64,
    #[builder(default = 512)]
    pub max_tokens: u32,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    /// Number of exchanges kept as context. The request always ends with the
    /// current task, so `1` means no earlier turns are replayed.
    #[builder(default = 1)]
    pub history_size: usize,
    #[builder(into, default = DEFAULT_SYSTEM_INSTRUCTION.to_string())]
    pub system_instruction: String,
}

impl Default for GptOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One chat turn as sent to the completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: &'static str,
    pub content: String,
}

impl ChatTurn {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Sends each task as a JSON user turn and parses the reply as a JSON object.
///
/// Replies wrapped in a fenced code block are unwrapped first. The adapter
/// keeps a bounded conversation history, so one instance should serve one
/// agent.
pub struct GptModelAdapter {
    options: GptOptions,
    api_key: String,
    base_url: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
    history: Mutex<Vec<ChatTurn>>,
}

impl GptModelAdapter {
    pub fn new(options: GptOptions, api_key: impl Into<String>) -> Self {
        Self {
            options,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Build with the OpenAI key and base URL from `config`.
    pub fn from_config(config: &HyvConfig, options: GptOptions) -> Result<Self, HyvError> {
        let api_key = config
            .get_api_key("openai")
            .ok_or_else(|| HyvError::Authentication("Missing OPENAI_API_KEY".into()))?;
        let adapter = Self::new(options, api_key);
        Ok(match config.get_base_url("openai") {
            Some(url) => adapter.with_base_url(url),
            None => adapter,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn options(&self) -> &GptOptions {
        &self.options
    }

    pub fn system_instruction(&self) -> &str {
        &self.options.system_instruction
    }

    pub fn set_system_instruction(&mut self, instruction: impl Into<String>) {
        self.options.system_instruction = instruction.into();
    }

    /// Snapshot of the turns that will precede the next task.
    pub fn history(&self) -> Vec<ChatTurn> {
        self.turns().map(|h| h.clone()).unwrap_or_default()
    }

    fn turns(&self) -> Result<MutexGuard<'_, Vec<ChatTurn>>, HyvError> {
        self.history
            .lock()
            .map_err(|_| HyvError::InvalidState("chat history lock poisoned".to_string()))
    }

    fn remember(&self, turn: ChatTurn) -> Result<(), HyvError> {
        let limit = self.options.history_size.max(1) * 2;
        let mut history = self.turns()?;
        history.push(turn);
        while history.len() >= limit {
            history.remove(0);
        }
        Ok(())
    }

    fn request_body(&self, history: &[ChatTurn]) -> serde_json::Value {
        let mut messages = vec![ChatTurn::system(self.options.system_instruction.clone())];
        messages.extend(history.iter().cloned());

        let mut body = serde_json::json!({
            "model": self.options.model,
            "messages": messages,
            "max_tokens": self.options.max_tokens,
            "temperature": self.options.temperature,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(top_p) = self.options.top_p {
                obj.insert("top_p".into(), top_p.into());
            }
            if let Some(fp) = self.options.frequency_penalty {
                obj.insert("frequency_penalty".into(), fp.into());
            }
            if let Some(pp) = self.options.presence_penalty {
                obj.insert("presence_penalty".into(), pp.into());
            }
        }
        body
    }

    async fn complete(&self, body: &serde_json::Value) -> Result<String, HyvError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.options.model, "chat completion");

        let resp = shared_client()
            .post(&url)
            .headers(json_headers(Some(&self.api_key)))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }

        let data: ChatResponse = serde_json::from_slice(&resp.bytes().await?)?;
        data.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| HyvError::Provider {
                provider: "openai".to_string(),
                message: "No content in chat completion response".to_string(),
            })
    }
}

#[async_trait]
impl ModelAdapter for GptModelAdapter {
    async fn assign(&self, task: Message) -> Result<Message, HyvError> {
        self.remember(ChatTurn::user(task.to_string()))?;
        let body = self.request_body(&self.history());

        let content = self.retry_policy.execute(|| self.complete(&body)).await?;
        let json_text = extract_code(&content);
        let value: serde_json::Value = serde_json::from_str(json_text)?;
        let reply = Message::try_from(value).map_err(|err| HyvError::Provider {
            provider: "openai".to_string(),
            message: err.to_string(),
        })?;

        self.remember(ChatTurn::assistant(json_text.trim()))?;
        Ok(reply)
    }
}

impl std::fmt::Debug for GptModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GptModelAdapter")
            .field("options", &self.options)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(`{3,})\w*\n").expect("fence pattern is valid"))
}

/// Return the body of the first fenced code block, or `text` unchanged.
pub fn extract_code(text: &str) -> &str {
    let Some(open) = fence_pattern().captures(text) else {
        return text;
    };
    let (Some(whole), Some(fence)) = (open.get(0), open.get(1)) else {
        return text;
    };
    let body = &text[whole.end()..];
    match body.find(fence.as_str()) {
        Some(close) => &body[..close],
        None => text,
    }
}
