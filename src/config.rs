/// Configuration management for Parlor
use crate::error::{ParlorError, ParlorResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub vector: VectorConfig,
    pub documents: DocumentConfig,
    pub style: StyleConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 5000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_directory = PathBuf::from("./data");
        Self {
            database: data_directory.join("parlor.sqlite"),
            data_directory,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub token_ttl_secs: i64,
    /// OAuth client id accepted as the audience of federated id tokens
    pub google_client_id: Option<String>,
    pub google_tokeninfo_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 86400,
            google_client_id: None,
            google_tokeninfo_url: "https://oauth2.googleapis.com/tokeninfo".to_string(),
        }
    }
}

/// Language model server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Connect timeout for the model server in seconds
    pub connect_timeout_secs: u64,
    /// Longest allowed gap between two streamed fragments in seconds
    pub idle_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "my-chat".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            temperature: 0.7,
            max_tokens: 512,
            connect_timeout_secs: 10,
            idle_timeout_secs: 120,
        }
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// System instruction prepended to every conversation
    pub system_prompt: String,
    /// Most recent prior turns included in the context
    pub history_limit: usize,
    /// Whether document snippets are retrieved for each turn
    pub enabled: bool,
    pub snippet_top_k: usize,
    /// Snippets above this combined word count are summarized first
    pub summarize_word_threshold: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are Parlor, a helpful assistant.".to_string(),
            history_limit: 5,
            enabled: true,
            snippet_top_k: 5,
            summarize_word_threshold: 750,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VectorConfig {
    Pinecone {
        api_key: String,
        /// Data-plane host of the index, e.g. https://my-index-abc.svc.pinecone.io
        index_host: String,
    },
    #[default]
    Memory,
}

/// Document upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    pub max_pdf_bytes: usize,
    pub preview_chars: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_pdf_bytes: 5 * 1024 * 1024,
            preview_chars: 100,
        }
    }
}

/// Style transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Inference service endpoint; style transfer is unavailable when unset
    pub service_url: Option<String>,
    pub timeout_secs: u64,
    pub max_image_bytes: usize,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            timeout_secs: 60,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub anonymous_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 20,
            anonymous_rps: 5,
            burst_size: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "parlor=debug,tower_http=debug".to_string(),
            json: false,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &str, default: T) -> ParlorResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ParlorError::InvalidInput(format!("Invalid value for {}", name))),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ParlorResult<Self> {
        dotenv::dotenv().ok();

        let defaults = ServerConfig::default();

        let service = ServiceConfig {
            hostname: env::var("PARLOR_HOSTNAME").unwrap_or(defaults.service.hostname),
            port: parse_var("PARLOR_PORT", defaults.service.port)?,
            version: defaults.service.version,
        };

        let data_directory: PathBuf = env::var("PARLOR_DATA_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.data_directory);
        let database = env::var("PARLOR_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("parlor.sqlite"));

        let jwt_secret = env::var("PARLOR_JWT_SECRET")
            .map_err(|_| ParlorError::InvalidInput("JWT secret required".to_string()))?;

        let authentication = AuthConfig {
            jwt_secret,
            token_ttl_secs: parse_var("PARLOR_TOKEN_TTL_SECS", defaults.authentication.token_ttl_secs)?,
            google_client_id: env::var("PARLOR_GOOGLE_CLIENT_ID").ok(),
            google_tokeninfo_url: env::var("PARLOR_GOOGLE_TOKENINFO_URL")
                .unwrap_or(defaults.authentication.google_tokeninfo_url),
        };

        let llm = LlmConfig {
            base_url: env::var("PARLOR_OLLAMA_URL").unwrap_or(defaults.llm.base_url),
            chat_model: env::var("PARLOR_CHAT_MODEL").unwrap_or(defaults.llm.chat_model),
            embedding_model: env::var("PARLOR_EMBEDDING_MODEL")
                .unwrap_or(defaults.llm.embedding_model),
            temperature: parse_var("PARLOR_TEMPERATURE", defaults.llm.temperature)?,
            max_tokens: parse_var("PARLOR_MAX_TOKENS", defaults.llm.max_tokens)?,
            connect_timeout_secs: parse_var(
                "PARLOR_LLM_CONNECT_TIMEOUT_SECS",
                defaults.llm.connect_timeout_secs,
            )?,
            idle_timeout_secs: parse_var(
                "PARLOR_LLM_IDLE_TIMEOUT_SECS",
                defaults.llm.idle_timeout_secs,
            )?,
        };

        let retrieval = RetrievalConfig {
            system_prompt: env::var("PARLOR_SYSTEM_PROMPT")
                .unwrap_or(defaults.retrieval.system_prompt),
            history_limit: parse_var("PARLOR_HISTORY_LIMIT", defaults.retrieval.history_limit)?,
            enabled: parse_var("PARLOR_RETRIEVAL_ENABLED", defaults.retrieval.enabled)?,
            snippet_top_k: parse_var("PARLOR_SNIPPET_TOP_K", defaults.retrieval.snippet_top_k)?,
            summarize_word_threshold: parse_var(
                "PARLOR_SUMMARIZE_WORD_THRESHOLD",
                defaults.retrieval.summarize_word_threshold,
            )?,
        };

        let vector = match env::var("PARLOR_PINECONE_API_KEY") {
            Ok(api_key) => VectorConfig::Pinecone {
                api_key,
                index_host: env::var("PARLOR_PINECONE_INDEX_HOST").map_err(|_| {
                    ParlorError::InvalidInput("Pinecone index host required".to_string())
                })?,
            },
            Err(_) => VectorConfig::Memory,
        };

        let documents = DocumentConfig {
            max_pdf_bytes: parse_var("PARLOR_MAX_PDF_BYTES", defaults.documents.max_pdf_bytes)?,
            preview_chars: defaults.documents.preview_chars,
        };

        let style = StyleConfig {
            service_url: env::var("PARLOR_STYLE_SERVICE_URL").ok(),
            timeout_secs: parse_var("PARLOR_STYLE_TIMEOUT_SECS", defaults.style.timeout_secs)?,
            max_image_bytes: parse_var(
                "PARLOR_STYLE_MAX_IMAGE_BYTES",
                defaults.style.max_image_bytes,
            )?,
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_var("PARLOR_RATE_LIMITS_ENABLED", defaults.rate_limit.enabled)?,
            authenticated_rps: parse_var(
                "PARLOR_RATE_LIMIT_AUTHENTICATED_RPS",
                defaults.rate_limit.authenticated_rps,
            )?,
            anonymous_rps: parse_var(
                "PARLOR_RATE_LIMIT_ANONYMOUS_RPS",
                defaults.rate_limit.anonymous_rps,
            )?,
            burst_size: parse_var("PARLOR_RATE_LIMIT_BURST", defaults.rate_limit.burst_size)?,
        };

        let logging = LoggingConfig {
            level: env::var("PARLOR_LOG").unwrap_or(defaults.logging.level),
            json: parse_var("PARLOR_LOG_JSON", defaults.logging.json)?,
        };

        Ok(ServerConfig {
            service,
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication,
            llm,
            retrieval,
            vector,
            documents,
            style,
            rate_limit,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ParlorResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ParlorError::InvalidInput("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ParlorError::InvalidInput(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.retrieval.history_limit == 0 {
            return Err(ParlorError::InvalidInput(
                "History limit must be at least 1".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ParlorError::InvalidInput(format!(
                "Temperature {} must be between 0.0 and 2.0",
                self.llm.temperature
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.authentication.jwt_secret = "a-very-long-secret-used-only-in-tests".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.service.port, 5000);
        assert_eq!(config.retrieval.history_limit, 5);
        assert_eq!(config.retrieval.summarize_word_threshold, 750);
        assert_eq!(config.documents.max_pdf_bytes, 5 * 1024 * 1024);
        assert!(matches!(config.vector, VectorConfig::Memory));
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = valid_config();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let mut config = valid_config();
        config.retrieval.history_limit = 0;
        assert!(config.validate().is_err());
    }
}
