//! Foundation-model text generation (IBM watsonx.ai) for journal analysis.
//!
//! API key: `LUMI_WATSONX_API_KEY` or `WATSONX_API_KEY`. The key is exchanged for an IAM
//! bearer token, cached until shortly before it expires.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::LumiConfig;

const TEXT_GENERATION_PATH: &str = "/ml/v1/text/generation?version=2023-05-29";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
/// Refresh the IAM token this many seconds before its stated expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("watsonx client setup: {0}")]
    Client(reqwest::Error),
    #[error("no watsonx API key configured")]
    MissingApiKey,
    #[error("watsonx request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("watsonx {0}: {1}")]
    Status(u16, String),
    #[error("watsonx response parse: {0}")]
    Decode(String),
    #[error("watsonx returned no generated text")]
    Empty,
}

/// Seam between journal analysis and the hosted model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct GenerationParameters {
    decoding_method: &'static str,
    max_new_tokens: u32,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model_id: &'a str,
    project_id: &'a str,
    input: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    results: Vec<GenerationResult>,
}

#[derive(Debug, Deserialize)]
struct GenerationResult {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    /// Unix seconds.
    expiration: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

pub struct WatsonxGenerator {
    base_url: String,
    iam_url: String,
    api_key: Option<String>,
    project_id: String,
    model_id: String,
    max_new_tokens: u32,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl WatsonxGenerator {
    pub fn from_config(config: &LumiConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rag_timeout_secs))
            .build()
            .map_err(GenerationError::Client)?;
        if config.watsonx_api_key().is_none() {
            tracing::warn!("no watsonx API key configured; journal analysis will return error records");
        }
        Ok(Self {
            base_url: config.watsonx_url.trim().trim_end_matches('/').to_string(),
            iam_url: config.iam_url.clone(),
            api_key: config.watsonx_api_key(),
            project_id: config.watsonx_project_id.clone(),
            model_id: config.watsonx_model_id.clone(),
            max_new_tokens: config.watsonx_max_new_tokens,
            client,
            token: Mutex::new(None),
        })
    }

    async fn bearer_token(&self) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;
        let now = chrono::Utc::now().timestamp();

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(token.access_token.clone());
            }
        }

        let res = self
            .client
            .post(&self.iam_url)
            .form(&[("grant_type", IAM_GRANT_TYPE), ("apikey", api_key)])
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16(), text));
        }
        let parsed: IamTokenResponse =
            serde_json::from_str(&text).map_err(|e| GenerationError::Decode(e.to_string()))?;
        tracing::debug!(expires_at = parsed.expiration, "refreshed IAM token");

        let token = CachedToken {
            access_token: parsed.access_token,
            expires_at: parsed.expiration,
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

#[async_trait]
impl TextGenerator for WatsonxGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let token = self.bearer_token().await?;
        let body = GenerationRequest {
            model_id: &self.model_id,
            project_id: &self.project_id,
            input: prompt,
            parameters: GenerationParameters {
                decoding_method: "greedy",
                max_new_tokens: self.max_new_tokens,
            },
        };

        let res = self
            .client
            .post(format!("{}{}", self.base_url, TEXT_GENERATION_PATH))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16(), text));
        }

        let parsed: GenerationResponse =
            serde_json::from_str(&text).map_err(|e| GenerationError::Decode(e.to_string()))?;
        parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.generated_text)
            .ok_or(GenerationError::Empty)
    }
}
