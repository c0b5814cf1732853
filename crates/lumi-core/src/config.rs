//! Gateway configuration.
//!
//! | Key (env `LUMI_*`) | Default | Description |
//! |--------------------|---------|-------------|
//! | host | 127.0.0.1 | Bind address for the gateway. |
//! | port | 8001 | HTTP port (the journal dashboard expects 8001). |
//! | storage_path | ./data/lumi | Sled directory for journal, habit, and emotion trees. |
//! | demo_user_id | demo_user | User id applied when a request omits one. |
//! | rag_base_url | http://127.0.0.1:7860 | Base URL of the RAG relay (tunnel URL). |
//! | rag_timeout_secs | 90 | Timeout for each RAG relay call. |
//! | watsonx_url | https://eu-de.ml.cloud.ibm.com | watsonx.ai region endpoint. |
//! | watsonx_api_key | unset | IBM Cloud API key (falls back to `WATSONX_API_KEY`). |
//! | watsonx_project_id | unset | watsonx.ai project id. |
//! | watsonx_model_id | mistralai/mistral-medium-2505 | Foundation model used for journal analysis. |
//! | watsonx_max_new_tokens | 500 | Generation budget for one analysis. |
//! | iam_url | https://iam.cloud.ibm.com/identity/token | IAM token endpoint. |
//! | history_limit | 5 | Prior journal entries merged into the analysis prompt. |
//! | memory_exchanges | 10 | Chat exchanges kept per session memory. |
//! | memory_sessions | 1000 | Chat sessions kept before the idlest is evicted. |

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LumiConfig {
    pub host: String,
    pub port: u16,
    pub storage_path: String,
    pub demo_user_id: String,
    pub rag_base_url: String,
    pub rag_timeout_secs: u64,
    pub watsonx_url: String,
    #[serde(default)]
    pub watsonx_api_key: Option<String>,
    #[serde(default)]
    pub watsonx_project_id: String,
    pub watsonx_model_id: String,
    pub watsonx_max_new_tokens: u32,
    pub iam_url: String,
    pub history_limit: usize,
    pub memory_exchanges: usize,
    pub memory_sessions: usize,
}

impl Default for LumiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
            storage_path: "./data/lumi".to_string(),
            demo_user_id: crate::DEMO_USER_ID.to_string(),
            rag_base_url: "http://127.0.0.1:7860".to_string(),
            rag_timeout_secs: 90,
            watsonx_url: "https://eu-de.ml.cloud.ibm.com".to_string(),
            watsonx_api_key: None,
            watsonx_project_id: String::new(),
            watsonx_model_id: "mistralai/mistral-medium-2505".to_string(),
            watsonx_max_new_tokens: 500,
            iam_url: "https://iam.cloud.ibm.com/identity/token".to_string(),
            history_limit: 5,
            memory_exchanges: 10,
            memory_sessions: crate::memory::DEFAULT_MAX_SESSIONS,
        }
    }
}

impl LumiConfig {
    /// Load config from file and environment. Precedence: `LUMI_*` env > `LUMI_CONFIG` file
    /// (default `config/lumi`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("LUMI_CONFIG").unwrap_or_else(|_| "config/lumi".to_string());
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("storage_path", defaults.storage_path)?
            .set_default("demo_user_id", defaults.demo_user_id)?
            .set_default("rag_base_url", defaults.rag_base_url)?
            .set_default("rag_timeout_secs", defaults.rag_timeout_secs as i64)?
            .set_default("watsonx_url", defaults.watsonx_url)?
            .set_default("watsonx_project_id", defaults.watsonx_project_id)?
            .set_default("watsonx_model_id", defaults.watsonx_model_id)?
            .set_default("watsonx_max_new_tokens", i64::from(defaults.watsonx_max_new_tokens))?
            .set_default("iam_url", defaults.iam_url)?
            .set_default("history_limit", defaults.history_limit as i64)?
            .set_default("memory_exchanges", defaults.memory_exchanges as i64)?
            .set_default("memory_sessions", defaults.memory_sessions as i64)?;

        // with_name resolves the extension (config/lumi -> config/lumi.toml).
        let toml_path = Path::new(&config_path).with_extension("toml");
        let builder = if Path::new(&config_path).exists() || toml_path.exists() {
            builder.add_source(config::File::with_name(&config_path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("LUMI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }

    /// RAG relay base URL without a trailing slash.
    pub fn rag_base(&self) -> &str {
        self.rag_base_url.trim().trim_end_matches('/')
    }

    /// watsonx API key: `watsonx_api_key` > `WATSONX_API_KEY`. Blank values count as unset.
    pub fn watsonx_api_key(&self) -> Option<String> {
        let non_blank = |k: String| Some(k.trim().to_string()).filter(|k| !k.is_empty());
        self.watsonx_api_key
            .clone()
            .and_then(non_blank)
            .or_else(|| std::env::var("WATSONX_API_KEY").ok().and_then(non_blank))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
