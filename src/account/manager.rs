/// Account manager implementation using runtime queries
use crate::{
    account::{FederatedIdentity, ValidatedToken},
    config::ServerConfig,
    db::models::Account,
    error::{ParlorError, ParlorResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

const ACCOUNT_COLUMNS: &str = "id, username, password_hash, email, external_subject, display_name, avatar_url, created_at";

/// A concurrent registration can win between the existence check and the insert
fn duplicate_username(e: sqlx::Error) -> ParlorError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ParlorError::Conflict("Username already exists".to_string())
        }
        other => other.into(),
    }
}

/// Access token claims
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    uid: i64,
    iat: i64,
    exp: i64,
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Register a password account
    pub async fn register(&self, username: &str, password: &str) -> ParlorResult<Account> {
        let username = username.trim();
        self.validate_username(username)?;

        if password.is_empty() {
            return Err(ParlorError::InvalidInput("Password cannot be empty".to_string()));
        }

        if self.username_exists(username).await? {
            return Err(ParlorError::Conflict("Username already exists".to_string()));
        }

        let password_hash = hash_password(password)?;
        let now = Utc::now();

        let id = sqlx::query(
            "INSERT INTO account (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(duplicate_username)?
        .last_insert_rowid();

        tracing::info!(account_id = id, username, "account registered");

        Ok(Account {
            id,
            username: username.to_string(),
            password_hash: Some(password_hash),
            email: None,
            external_subject: None,
            display_name: None,
            avatar_url: None,
            created_at: now,
        })
    }

    /// Authenticate with username and password, returning an access token
    pub async fn login(&self, username: &str, password: &str) -> ParlorResult<(Account, String)> {
        let invalid = || ParlorError::Authentication("Invalid credentials".to_string());

        let account = match self.find_by_username(username.trim()).await? {
            Some(account) => account,
            None => return Err(invalid()),
        };

        // Federated-only accounts have no password login path
        let hash = account.password_hash.as_deref().ok_or_else(invalid)?;
        if !verify_password(password, hash)? {
            tracing::debug!(username = %account.username, "password mismatch");
            return Err(invalid());
        }

        let token = self.issue_access_token(&account)?;
        Ok((account, token))
    }

    /// Find or create the account bound to a verified federated identity
    pub async fn login_federated(
        &self,
        identity: &FederatedIdentity,
    ) -> ParlorResult<(Account, String)> {
        let existing = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE external_subject = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(&identity.subject)
        .fetch_optional(&self.db)
        .await?;

        let account = match existing {
            Some(account) => {
                // Profile fields follow the provider
                sqlx::query(
                    "UPDATE account SET display_name = ?1, avatar_url = ?2 WHERE id = ?3",
                )
                .bind(&identity.name)
                .bind(&identity.picture)
                .bind(account.id)
                .execute(&self.db)
                .await?;

                Account {
                    display_name: identity.name.clone(),
                    avatar_url: identity.picture.clone(),
                    ..account
                }
            }
            None => self.create_federated_account(identity).await?,
        };

        let token = self.issue_access_token(&account)?;
        Ok((account, token))
    }

    async fn create_federated_account(&self, identity: &FederatedIdentity) -> ParlorResult<Account> {
        let username = self.unique_username(&identity.preferred_username()).await?;
        let now = Utc::now();

        let id = sqlx::query(
            "INSERT INTO account (username, email, external_subject, display_name, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&username)
        .bind(&identity.email)
        .bind(&identity.subject)
        .bind(&identity.name)
        .bind(&identity.picture)
        .bind(now)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        tracing::info!(account_id = id, username = %username, "federated account created");

        Ok(Account {
            id,
            username,
            password_hash: None,
            email: identity.email.clone(),
            external_subject: Some(identity.subject.clone()),
            display_name: identity.name.clone(),
            avatar_url: identity.picture.clone(),
            created_at: now,
        })
    }

    /// Pick a free username, appending a counter on collision
    async fn unique_username(&self, base: &str) -> ParlorResult<String> {
        let mut candidate = base.to_string();
        let mut suffix = 1;
        while self.username_exists(&candidate).await? {
            suffix += 1;
            candidate = format!("{}-{}", base, suffix);
        }
        Ok(candidate)
    }

    /// Get account by username
    pub async fn get_account_by_username(&self, username: &str) -> ParlorResult<Account> {
        self.find_by_username(username)
            .await?
            .ok_or_else(|| ParlorError::NotFound(format!("Unknown user {}", username)))
    }

    async fn find_by_username(&self, username: &str) -> ParlorResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE username = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    /// Check if username exists
    async fn username_exists(&self, username: &str) -> ParlorResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE username = ?1")
            .bind(username)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Generate access JWT token
    pub fn issue_access_token(&self, account: &Account) -> ParlorResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account.username.clone(),
            uid: account.id,
            iat: now,
            exp: now + self.config.authentication.token_ttl_secs,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| ParlorError::Jwt(format!("Failed to generate token: {}", e)))
    }

    /// Verify an access token's signature and expiry
    pub fn validate_access_token(&self, token: &str) -> ParlorResult<ValidatedToken> {
        use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};

        let decoding_key =
            DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        // Allow some clock skew
        validation.leeway = 60;

        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::warn!("JWT verification failed: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => {
                    ParlorError::Authentication("Token has expired".to_string())
                }
                ErrorKind::InvalidSignature => {
                    ParlorError::Authentication("Invalid token signature".to_string())
                }
                _ => ParlorError::Authentication(format!("Invalid token: {}", e)),
            }
        })?;

        Ok(ValidatedToken {
            account_id: data.claims.uid,
            username: data.claims.sub,
        })
    }

    /// Validate username format
    fn validate_username(&self, username: &str) -> ParlorResult<()> {
        if username.is_empty() {
            return Err(ParlorError::InvalidInput("Username cannot be empty".to_string()));
        }

        if username.len() < 3 {
            return Err(ParlorError::InvalidInput(
                "Username must be at least 3 characters".to_string(),
            ));
        }

        if username.len() > 80 {
            return Err(ParlorError::InvalidInput("Username too long".to_string()));
        }

        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ParlorError::InvalidInput(
                "Username contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }
}

/// Hash a password with Argon2id and a random salt
fn hash_password(password: &str) -> ParlorResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ParlorError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> ParlorResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ParlorError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
