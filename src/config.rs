//! Environment-based configuration
//!
//! All settings have defaults except credentials, which are validated up
//! front so a misconfigured process fails before making network calls.

use crate::TravelError;
use serde::{Deserialize, Serialize};

/// Top-level configuration for one assistant process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub amadeus: AmadeusConfig,
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// defaults for everything except credentials.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("TRIPFLOW_LLM_MODEL") {
            config.llm.model = model;
        }
        if let Ok(url) = std::env::var("TRIPFLOW_LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(url) = std::env::var("TRIPFLOW_AMADEUS_BASE_URL") {
            config.amadeus.base_url = url;
        }
        config
    }

    /// Fail fast on missing credentials before any network call is attempted
    pub fn validate(&self) -> Result<(), TravelError> {
        self.llm.api_key()?;
        self.amadeus.credentials()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            amadeus: AmadeusConfig::default(),
        }
    }
}

/// Settings for the text-understanding service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    pub api_key_env: String,

    /// API base URL
    pub base_url: String,

    /// Sampling temperature; extraction wants determinism
    pub temperature: f32,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            temperature: 0.0,
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Result<String, TravelError> {
        std::env::var(&self.api_key_env).map_err(|_| {
            TravelError::MissingCredentials(format!(
                "LLM API key not found. Set the {} environment variable.",
                self.api_key_env
            ))
        })
    }
}

/// Settings for the travel inventory/booking vendor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmadeusConfig {
    /// API base URL (defaults to the vendor test environment)
    pub base_url: String,

    /// Environment variable containing the client id
    pub client_id_env: String,

    /// Environment variable containing the client secret
    pub client_secret_env: String,
}

impl Default for AmadeusConfig {
    fn default() -> Self {
        Self {
            base_url: "https://test.api.amadeus.com".to_string(),
            client_id_env: "AMADEUS_CLIENT_ID".to_string(),
            client_secret_env: "AMADEUS_CLIENT_SECRET".to_string(),
        }
    }
}

impl AmadeusConfig {
    pub fn credentials(&self) -> Result<(String, String), TravelError> {
        let id = std::env::var(&self.client_id_env);
        let secret = std::env::var(&self.client_secret_env);
        match (id, secret) {
            (Ok(id), Ok(secret)) => Ok((id, secret)),
            _ => Err(TravelError::MissingCredentials(format!(
                "Amadeus API credentials not found. Set {} and {}.",
                self.client_id_env, self.client_secret_env
            ))),
        }
    }
}
