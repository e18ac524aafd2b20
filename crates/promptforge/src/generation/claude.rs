//! Claude adapter for the Generation Port — the only module that talks to
//! the Anthropic Messages API.
//!
//! The adapter makes exactly one HTTP call per `generate()`. Retry,
//! backoff, and the per-call timeout are the controller's responsibility,
//! so every upstream failure is classified here and surfaced immediately.
//!
//! Model: claude-sonnet-4-5 (hardcoded — do not make configurable to prevent drift)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::generation::prompts::{
    build_generation_prompt, build_revision_prompt, GENERATION_SYSTEM, REVISION_SYSTEM,
};
use crate::generation::{GenerateError, GenerationPort, RevisionHint};
use crate::models::Request;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}

/// Generation Port adapter over the Anthropic Messages API.
#[derive(Clone)]
pub struct ClaudeGenerator {
    client: Client,
    api_key: String,
}

impl ClaudeGenerator {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                // Transport backstop only; the controller imposes the
                // real per-call budget.
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .context("failed to build HTTP client")?,
            api_key,
        })
    }

    /// Reads `ANTHROPIC_API_KEY` from the environment (and `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("required environment variable 'ANTHROPIC_API_KEY' is not set")?;
        Self::new(api_key)
    }

    async fn call(&self, prompt: &str, system: &str) -> Result<String, GenerateError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GenerateError::Transport {
                message: e.to_string(),
                // Connect/timeout faults are worth retrying; request
                // construction faults are not.
                retryable: e.is_connect() || e.is_timeout(),
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status.as_u16(), &body));
        }

        let parsed: AnthropicResponse =
            response.json().await.map_err(|e| GenerateError::Transport {
                message: format!("malformed response body: {e}"),
                retryable: false,
            })?;

        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "generation call succeeded"
        );

        parsed
            .content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.clone())
            .ok_or_else(|| GenerateError::Transport {
                message: "upstream returned no text content".to_string(),
                retryable: true,
            })
    }
}

/// Maps an upstream error response onto the port's error taxonomy:
/// 429 and 5xx are retryable transport faults, a policy refusal is
/// terminal, anything else is a non-retryable transport fault.
fn classify_api_error(status: u16, body: &str) -> GenerateError {
    let parsed = serde_json::from_str::<AnthropicError>(body).ok();
    let (error_type, message) = match &parsed {
        Some(e) => (e.error.error_type.as_str(), e.error.message.clone()),
        None => ("", body.to_string()),
    };

    if is_policy_refusal(error_type, &message) {
        return GenerateError::ContentPolicy(message);
    }

    GenerateError::Transport {
        message: format!("API error (status {status}): {message}"),
        retryable: status == 429 || status >= 500,
    }
}

fn is_policy_refusal(error_type: &str, message: &str) -> bool {
    let message = message.to_lowercase();
    error_type == "content_policy_error"
        || message.contains("content policy")
        || message.contains("usage policy")
}

#[async_trait]
impl GenerationPort for ClaudeGenerator {
    async fn generate(
        &self,
        request: &Request,
        revision: Option<&RevisionHint>,
    ) -> Result<String, GenerateError> {
        let text = match revision {
            None => {
                let prompt = build_generation_prompt(request);
                self.call(&prompt, GENERATION_SYSTEM).await?
            }
            Some(hint) => {
                let prompt = build_revision_prompt(hint);
                self.call(&prompt, REVISION_SYSTEM).await?
            }
        };
        Ok(text.trim().to_string())
    }
}
