/// Registration, login and profile endpoints
use crate::{
    account::{
        AccountProfile, FederatedLoginRequest, LoginRequest, LoginResponse, RegisterRequest,
        StatusResponse,
    },
    api::validated,
    auth::AuthContext,
    context::AppContext,
    error::ParlorResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/auth/google", post(login_google))
        .route("/me", get(me))
}

/// POST /register
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> ParlorResult<(StatusCode, Json<StatusResponse>)> {
    let req = validated(req)?;
    ctx.account_manager.register(&req.username, &req.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(StatusResponse {
            success: true,
            message: "User registered!".to_string(),
        }),
    ))
}

/// POST /login
async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> ParlorResult<Json<LoginResponse>> {
    let req = validated(req)?;
    let (account, access_token) = ctx.account_manager.login(&req.username, &req.password).await?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful!".to_string(),
        access_token,
        username: account.username,
    }))
}

/// POST /auth/google
async fn login_google(
    State(ctx): State<AppContext>,
    Json(req): Json<FederatedLoginRequest>,
) -> ParlorResult<Json<LoginResponse>> {
    let req = validated(req)?;
    let identity = ctx.identity_verifier.verify(&req.id_token).await?;
    let (account, access_token) = ctx.account_manager.login_federated(&identity).await?;

    tracing::info!(account_id = account.id, username = %account.username, "federated login");

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful!".to_string(),
        access_token,
        username: account.username,
    }))
}

/// GET /me
async fn me(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> ParlorResult<Json<AccountProfile>> {
    let account = ctx.account_manager.get_account_by_username(&auth.username).await?;
    Ok(Json(account.into()))
}
