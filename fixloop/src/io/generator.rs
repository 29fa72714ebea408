//! Generation client: sends a repair prompt and extracts replacement source.
//!
//! The [`Generator`] trait hides the completion backend. [`OpenAiGenerator`]
//! talks to any OpenAI-compatible `/chat/completions` endpoint over blocking
//! HTTP. Extraction is delegated to a [`ResponseParser`] so backends with
//! different reply formats can swap strategies.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::core::extract::ResponseParser;
use crate::io::config::GeneratorConfig;
use crate::io::prompt::RepairPrompt;

/// Produces one free-text reply per prompt.
///
/// Transport and service failures are returned as errors; there is no
/// internal retry. `timeout` caps this request on top of any limit the
/// backend is configured with.
pub trait Generator {
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String>;
}

/// Raw reply plus the code extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub reply: String,
    /// Extracted replacement source; empty when the reply had no usable block.
    pub code: String,
}

/// Send `prompt` and extract a single code block from the reply.
///
/// The extracted text is returned as-is, even when empty or invalid.
pub fn generate_code<G: Generator, P: ResponseParser + ?Sized>(
    generator: &G,
    parser: &P,
    prompt: &RepairPrompt,
    timeout: Duration,
) -> Result<Generation> {
    let reply = generator
        .complete(prompt.as_str(), timeout)
        .context("generation request failed")?;
    let code = parser.extract(&reply);
    debug!(
        reply_bytes = reply.len(),
        code_bytes = code.len(),
        "extracted code from reply"
    );
    Ok(Generation { reply, code })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    model: String,
    endpoint: String,
    api_key_env: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key_env: config.api_key_env.clone(),
            api_key: None,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Use `key` instead of reading the configured environment variable.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The key is read per request so a run whose tests already pass never
    /// needs one.
    fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        let key = env::var(&self.api_key_env)
            .with_context(|| format!("read API key from ${}", self.api_key_env))?;
        if key.trim().is_empty() {
            bail!("API key in ${} is empty", self.api_key_env);
        }
        Ok(key)
    }
}

impl Generator for OpenAiGenerator {
    #[instrument(skip_all, fields(model = %self.model, prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let api_key = self.api_key()?;
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.min(timeout))
            .build()
            .context("build http client")?;

        info!(endpoint = %self.endpoint, "requesting completion");
        let resp = client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .with_context(|| format!("send request to {}", self.endpoint))?;

        let status = resp.status();
        let text = resp.text().context("read completion response")?;
        if !status.is_success() {
            return Err(anyhow!("generation service returned {status}: {text}"));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).context("decode completion response")?;
        Ok(reply_content(parsed))
    }
}

/// First choice's message content, or empty when absent.
fn reply_content(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .unwrap_or_default()
}
