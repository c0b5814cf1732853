//! RAG relay client: forwards composed chat prompts to the externally hosted RAG server.
//!
//! Newer relay servers expose `POST /query` with `{"query": …}`; older ones only have
//! `POST /chat` with `{"question": …}`. A 404 on `/query` gets exactly one retry on `/chat`.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Reply used when the relay answers with a non-200 status.
pub const UNREACHABLE_REPLY: &str = "😔 I’m having trouble reaching my thought center right now, but I’m still here for you. Want to try a simple breathing exercise together?";

/// Reply used when the relay cannot be reached or its body cannot be decoded.
pub const CONNECTION_ERROR_REPLY: &str = "🚨 Connection error. You're not alone—I’m still right here. Let’s take it slow. Want a grounding tip?";

/// Reply used when the relay answered 200 without an `answer` or `response` field.
pub const NO_VALID_RESPONSE: &str = "🤖 No valid response generated.";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("RAG relay client setup: {0}")]
    Client(reqwest::Error),
    #[error("RAG relay returned {0}: {1}")]
    Status(u16, String),
    #[error("RAG relay request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RAG relay response parse: {0}")]
    Decode(String),
}

impl RelayError {
    /// Fixed user-facing reply for this failure.
    pub fn fallback_reply(&self) -> &'static str {
        match self {
            RelayError::Status(..) => UNREACHABLE_REPLY,
            RelayError::Client(_) | RelayError::Transport(_) | RelayError::Decode(_) => {
                CONNECTION_ERROR_REPLY
            }
        }
    }
}

/// Seam between the chat flow and the RAG server.
#[async_trait]
pub trait RagRelay: Send + Sync {
    /// Send one composed prompt and return the trimmed reply text.
    async fn ask(&self, prompt: &str) -> Result<String, RelayError>;
}

#[derive(Debug, Deserialize)]
struct RelayAnswer {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

impl RelayAnswer {
    fn into_reply(self) -> String {
        self.answer
            .filter(|a| !a.is_empty())
            .or(self.response.filter(|r| !r.is_empty()))
            .unwrap_or_else(|| NO_VALID_RESPONSE.to_string())
            .trim()
            .to_string()
    }
}

pub struct HttpRagRelay {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRagRelay {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RelayError::Client)?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RagRelay for HttpRagRelay {
    async fn ask(&self, prompt: &str) -> Result<String, RelayError> {
        let primary = format!("{}/query", self.base_url);
        tracing::info!(target_url = %primary, "sending chat prompt to RAG relay");

        let mut res = self
            .client
            .post(&primary)
            .json(&serde_json::json!({ "query": prompt }))
            .send()
            .await?;

        if res.status() == StatusCode::NOT_FOUND {
            let legacy = format!("{}/chat", self.base_url);
            tracing::warn!(target_url = %legacy, "/query not found on RAG relay, trying /chat");
            res = self
                .client
                .post(&legacy)
                .json(&serde_json::json!({ "question": prompt }))
                .send()
                .await?;
        }

        let status = res.status();
        let text = res.text().await?;
        if status != StatusCode::OK {
            tracing::error!(status = status.as_u16(), body = %text, "RAG relay error");
            return Err(RelayError::Status(status.as_u16(), text));
        }

        let parsed: RelayAnswer =
            serde_json::from_str(&text).map_err(|e| RelayError::Decode(e.to_string()))?;
        Ok(parsed.into_reply())
    }
}
