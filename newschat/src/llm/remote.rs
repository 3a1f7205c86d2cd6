use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatProvider, ChatTurn, CompletionError};

/// Remote chat-completion provider using an OpenAI-compatible HTTP API
pub struct RemoteChatProvider {
    base_url: String,
    api_key: String,
    model: String,
    default_timeout: Duration,
    default_max_tokens: Option<usize>,
    default_temperature: Option<f32>,
    client: reqwest::Client,
}

impl RemoteChatProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: None,
            default_temperature: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_defaults(
        mut self,
        timeout_secs: u64,
        max_tokens: Option<usize>,
        temperature: Option<f32>,
    ) -> Self {
        self.default_timeout = Duration::from_secs(timeout_secs);
        self.default_max_tokens = max_tokens;
        self.default_temperature = temperature;
        self
    }

    async fn send_request(
        &self,
        turns: &[ChatTurn],
        stream: bool,
    ) -> Result<reqwest::Response, CompletionError> {
        let req_body = ChatRequest {
            model: self.model.clone(),
            messages: turns
                .iter()
                .map(|t| WireMessage {
                    role: t.role.as_str().to_string(),
                    content: Some(t.content.clone()),
                })
                .collect(),
            stream,
            max_tokens: self.default_max_tokens,
            temperature: self.default_temperature,
        };

        let response = tokio::time::timeout(
            self.default_timeout,
            self.client
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&req_body)
                .send(),
        )
        .await
        .map_err(|_| CompletionError::Service("completion request timed out".to_string()))?
        .map_err(|e| CompletionError::Service(format!("completion HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Authentication(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Service(format!("API error {}: {}", status, body)));
        }

        Ok(response)
    }

    /// Reads an SSE stream of chat-completion chunks, concatenating every
    /// `delta.content` fragment into one result.
    async fn collect_stream(&self, mut response: reqwest::Response) -> Result<String, CompletionError> {
        let mut result = String::new();
        let mut buffer = String::new();

        loop {
            let chunk = tokio::time::timeout(self.default_timeout, response.chunk())
                .await
                .map_err(|_| CompletionError::Service("completion stream timed out".to_string()))?
                .map_err(|e| CompletionError::Service(format!("failed to read stream: {}", e)))?;

            let Some(chunk) = chunk else { break };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Process complete lines; keep the trailing partial line buffered.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data:") else { continue };
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(result);
                }
                let parsed: StreamChunk = serde_json::from_str(data).map_err(|e| {
                    CompletionError::Service(format!("failed to parse stream chunk: {}", e))
                })?;
                for choice in &parsed.choices {
                    if let Some(content) = choice.delta.content.as_deref() {
                        result.push_str(content);
                    }
                }
            }
        }

        Ok(result)
    }
}

#[async_trait::async_trait]
impl ChatProvider for RemoteChatProvider {
    async fn complete(&self, turns: &[ChatTurn], stream: bool) -> Result<String, CompletionError> {
        let response = self.send_request(turns, stream).await?;

        if stream {
            return self.collect_stream(response).await;
        }

        let resp_body: ChatResponse = tokio::time::timeout(self.default_timeout, response.json())
            .await
            .map_err(|_| CompletionError::Service("completion response timed out".to_string()))?
            .map_err(|e| CompletionError::Service(format!("failed to parse completion response: {}", e)))?;

        if resp_body.choices.is_empty() {
            return Err(CompletionError::Service("completion response has no choices".to_string()));
        }

        let mut result = String::new();
        for choice in &resp_body.choices {
            if let Some(content) = choice.message.content.as_deref() {
                result.push_str(content);
            }
        }
        Ok(result)
    }
}

// OpenAI-compatible request/response structures
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}
