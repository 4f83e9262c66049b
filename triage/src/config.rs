use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_INDEX_NAME: &str = "it-ticket-solutions-index";
pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
/// A technical turn posts four messages: user, classifier, retriever and
/// knowledge agent.
pub const MIN_ROUNDS: usize = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub openai: OpenAiConfig,
    pub search: Option<SearchConfig>,
    pub embedding_dimensions: usize,
    pub knowledge_base_file: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub max_rounds: usize,
    pub cors_origin: String,
    pub chat_rate_limit_per_minute: u32,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from an arbitrary key lookup. Values are
    /// trimmed and stripped of surrounding quotes; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(|v| clean_value(&v));
        let required = |key: &str| -> Result<String> {
            match get(key) {
                Some(v) => Ok(v),
                None => bail!("{key} is not set; set it to the exact value (no quotes)"),
            }
        };

        let search = match get("AZURE_SEARCH_ENDPOINT") {
            Some(endpoint) => Some(SearchConfig {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                api_key: required("AZURE_SEARCH_KEY")?,
                index_name: get("AZURE_SEARCH_INDEX_NAME")
                    .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            }),
            None => None,
        };

        Ok(Config {
            port: parse_or(get("PORT"), "PORT", 5050)?,
            openai: OpenAiConfig {
                endpoint: required("AZURE_OPENAI_ENDPOINT")?
                    .trim_end_matches('/')
                    .to_string(),
                api_key: required("AZURE_OPENAI_API_KEY")?,
                api_version: get("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
                chat_deployment: required("AZURE_DEPLOYMENT_NAME")?,
                embedding_deployment: required("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")?,
            },
            search,
            embedding_dimensions: parse_or(get("EMBEDDING_DIMENSIONS"), "EMBEDDING_DIMENSIONS", 1536)?,
            knowledge_base_file: get("KNOWLEDGE_BASE_FILE")
                .unwrap_or_else(|| "data/knowledge_base.json".to_string()),
            request_timeout_secs: parse_or(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", 30)?,
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", 2)?,
            max_rounds: parse_or(get("MAX_ROUNDS"), "MAX_ROUNDS", 6)?,
            cors_origin: get("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string()),
            chat_rate_limit_per_minute: parse_or(
                get("CHAT_RATE_LIMIT_PER_MINUTE"),
                "CHAT_RATE_LIMIT_PER_MINUTE",
                60,
            )?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn validate(&self) -> Result<()> {
        for (key, url) in [
            ("AZURE_OPENAI_ENDPOINT", Some(&self.openai.endpoint)),
            ("AZURE_SEARCH_ENDPOINT", self.search.as_ref().map(|s| &s.endpoint)),
        ] {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("{key} must be an http(s) URL, got '{url}'");
                }
            }
        }
        for (key, deployment) in [
            ("AZURE_DEPLOYMENT_NAME", &self.openai.chat_deployment),
            ("AZURE_OPENAI_EMBEDDING_DEPLOYMENT", &self.openai.embedding_deployment),
        ] {
            if deployment.contains(char::is_whitespace) || deployment.contains('/') {
                bail!("{key} '{deployment}' is not a valid deployment name");
            }
        }
        if self.cors_origin != "*"
            && !(self.cors_origin.starts_with("http://") || self.cors_origin.starts_with("https://"))
        {
            bail!("CORS_ORIGIN must be '*' or an http(s) origin, got '{}'", self.cors_origin);
        }
        if self.embedding_dimensions == 0 {
            bail!("EMBEDDING_DIMENSIONS must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        if self.max_rounds < MIN_ROUNDS {
            bail!(
                "MAX_ROUNDS must be at least {} (user, classifier, retriever and knowledge agent), got {}",
                MIN_ROUNDS,
                self.max_rounds
            );
        }
        if self.chat_rate_limit_per_minute == 0 {
            bail!("CHAT_RATE_LIMIT_PER_MINUTE must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn clean_value(raw: &str) -> Option<String> {
    let mut v = raw.trim();
    for quote in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(quote) && v.ends_with(quote) {
            v = v[1..v.len() - 1].trim();
        }
    }
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value '{v}'")),
        None => Ok(default),
    }
}
