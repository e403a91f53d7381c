/// Application context and dependency injection
use crate::{
    account::{AccountManager, GoogleTokenVerifier, IdentityVerifier},
    chat::{ChatService, TurnStore},
    config::{ServerConfig, VectorConfig},
    db,
    documents::DocumentService,
    error::{ParlorError, ParlorResult},
    llm::{ChatBackend, Embedder, GenerationOptions, OllamaClient},
    rate_limit::RateLimiter,
    style::{HttpStyleTransfer, StyleService, StyleTransfer},
    vector::{MemoryIndex, PineconeIndex, VectorIndex},
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

/// External services the application talks to
#[derive(Clone)]
pub struct Collaborators {
    pub chat_backend: Arc<dyn ChatBackend>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub style_transfer: Option<Arc<dyn StyleTransfer>>,
    pub identity_verifier: Arc<dyn IdentityVerifier>,
}

impl Collaborators {
    /// Build the configured HTTP clients
    pub fn from_config(config: &ServerConfig) -> ParlorResult<Self> {
        let ollama = Arc::new(OllamaClient::new(&config.llm)?);

        let vector_index: Arc<dyn VectorIndex> = match &config.vector {
            VectorConfig::Pinecone {
                api_key,
                index_host,
            } => {
                tracing::info!(index_host = %index_host, "using hosted vector index");
                Arc::new(PineconeIndex::new(index_host, api_key))
            }
            VectorConfig::Memory => {
                tracing::info!("using in-memory vector index; documents are lost on restart");
                Arc::new(MemoryIndex::new())
            }
        };

        let style_transfer: Option<Arc<dyn StyleTransfer>> = match &config.style.service_url {
            Some(url) => Some(Arc::new(HttpStyleTransfer::new(
                url,
                Duration::from_secs(config.style.timeout_secs),
            )?)),
            None => {
                tracing::info!("style transfer disabled - no inference service configured");
                None
            }
        };

        let identity_verifier = Arc::new(GoogleTokenVerifier::new(
            config.authentication.google_tokeninfo_url.clone(),
            config.authentication.google_client_id.clone(),
        ));

        Ok(Self {
            chat_backend: ollama.clone(),
            embedder: ollama,
            vector_index,
            style_transfer,
            identity_verifier,
        })
    }
}

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub turn_store: Arc<TurnStore>,
    pub chat_service: Arc<ChatService>,
    pub document_service: Arc<DocumentService>,
    pub style_service: Arc<StyleService>,
    pub identity_verifier: Arc<dyn IdentityVerifier>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ParlorResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::with_collaborators(config, db, collaborators))
    }

    /// Wire services around an already migrated database and collaborators
    pub fn with_collaborators(
        config: ServerConfig,
        db: SqlitePool,
        collaborators: Collaborators,
    ) -> Self {
        let config = Arc::new(config);

        let account_manager = Arc::new(AccountManager::new(db.clone(), config.clone()));
        let turn_store = Arc::new(TurnStore::new(db.clone()));

        let document_service = Arc::new(DocumentService::new(
            collaborators.embedder,
            collaborators.vector_index,
            config.documents.clone(),
        ));

        let chat_service = Arc::new(ChatService::new(
            account_manager.clone(),
            turn_store.clone(),
            document_service.clone(),
            collaborators.chat_backend,
            config.retrieval.clone(),
            GenerationOptions::from(&config.llm),
        ));

        let style_service = Arc::new(StyleService::new(
            collaborators.style_transfer,
            config.style.clone(),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Self {
            config,
            db,
            account_manager,
            turn_store,
            chat_service,
            document_service,
            style_service,
            identity_verifier: collaborators.identity_verifier,
            rate_limiter,
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> ParlorResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ParlorError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    /// Close the database pool
    pub async fn shutdown(&self) {
        self.db.close().await;
        tracing::info!("database pool closed");
    }
}
