/// Account management system
///
/// Handles registration, password and federated login, and access tokens.

mod federated;
mod manager;

pub use federated::{FederatedIdentity, GoogleTokenVerifier, IdentityVerifier};
pub use manager::AccountManager;

use crate::db::models::Account;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 80, message = "Username must be 3 to 80 characters"))]
    pub username: String,
    #[validate(length(min = 1, max = 128, message = "Password cannot be empty"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username cannot be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password cannot be empty"))]
    pub password: String,
}

/// Federated login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FederatedLoginRequest {
    #[validate(length(min = 1, message = "id_token cannot be empty"))]
    pub id_token: String,
}

/// Generic success/failure reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

/// Successful login reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub access_token: String,
    pub username: String,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountProfile {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountProfile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            display_name: account.display_name,
            avatar_url: account.avatar_url,
            email: account.email,
            created_at: account.created_at,
        }
    }
}

/// Identity carried by a validated access token
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub account_id: i64,
    pub username: String,
}
