//! Chat-completion client (OpenRouter / OpenAI / NVIDIA compatible).
//!
//! One operation: send a prompt, get a completion. Stateless, no streaming,
//! no tool use, a single user message per request. Transport failures are
//! retried with exponential backoff (rate limits back off harder); after
//! exhaustion the error surfaces and callers treat the round as empty.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("completion had no content")]
    EmptyResponse,
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Tuning knobs for LLM requests.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub endpoint: String,
    pub retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Prompt character budget; larger prompts trigger source compression.
    pub char_budget: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "moonshotai/kimi-k2.5".to_string(),
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            retries: 3,
            base_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            temperature: 0.2,
            max_tokens: 4096,
            char_budget: 13_000,
        }
    }
}

/// The single seam the refinement stages depend on; tests script it.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Production client over an OpenAI-compatible chat-completions endpoint.
pub struct HttpLlmClient {
    api_key: String,
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(api_key: String, config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            api_key,
            config,
            client,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn call_once(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(LlmError::Api(err.message));
        }
        parsed
            .choices
            .and_then(|mut c| (!c.is_empty()).then(|| c.remove(0).message.content))
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl ChatCompletion for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut last = String::new();
        for attempt in 1..=self.config.retries {
            match self.call_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    last = err.to_string();
                    if attempt < self.config.retries {
                        let rate_limited =
                            last.contains("429") || last.contains("rate_limit") || last.contains("quota");
                        let delay = if rate_limited {
                            self.config.base_delay * 8
                        } else {
                            self.config.base_delay * 2u32.pow(attempt - 1)
                        };
                        warn!(
                            attempt,
                            retries = self.config.retries,
                            error = %last,
                            delay_s = delay.as_secs(),
                            "LLM call failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        warn!(error = %last, "LLM call permanently failed");
        Err(LlmError::Exhausted {
            attempts: self.config.retries,
            last,
        })
    }
}

/// Deterministic in-memory clients for tests and offline runs.
pub mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of responses in order; when the script runs
    /// out, the last response repeats. Tracks total call count.
    pub struct ScriptedClient {
        script: Mutex<Vec<String>>,
        cursor: AtomicUsize,
    }

    impl ScriptedClient {
        pub fn new(script: impl IntoIterator<Item = impl Into<String>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().map(Into::into).collect()),
                cursor: AtomicUsize::new(0),
            }
        }

        /// Same response for every call.
        pub fn constant(response: impl Into<String>) -> Self {
            Self::new([response.into()])
        }

        pub fn calls(&self) -> usize {
            self.cursor.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedClient {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().expect("script lock");
            if script.is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            Ok(script[idx.min(script.len() - 1)].clone())
        }
    }

    /// Always fails, as an exhausted transport would.
    pub struct DownClient;

    #[async_trait]
    impl ChatCompletion for DownClient {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::Exhausted {
                attempts: 3,
                last: "connection refused".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    #[tokio::test]
    async fn scripted_client_replays_in_order_then_repeats() {
        let client = ScriptedClient::new(["a", "b"]);
        assert_eq!(client.complete("x").await.unwrap(), "a");
        assert_eq!(client.complete("x").await.unwrap(), "b");
        assert_eq!(client.complete("x").await.unwrap(), "b");
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn down_client_always_errors() {
        assert!(DownClient.complete("x").await.is_err());
    }

    #[test]
    fn default_config_matches_documented_policy() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.retries, 3);
        assert_eq!(cfg.base_delay, Duration::from_secs(5));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.char_budget, 13_000);
    }
}
