/// GraphQL-style endpoint
///
/// Requests name one operation and pass its arguments as variables:
/// `{"operationName": "login", "variables": {"username": "a", "password": "b"}}`.
/// The result is returned under `data.<operationName>`; failures come back as
/// `{"errors": [{"message": ...}]}` with status 400.
///
/// `history` needs a bearer token and only returns the caller's own turns.
use crate::{
    account::AccountProfile,
    auth::AuthContext,
    context::AppContext,
    db::models::Turn,
    error::{ParlorError, ParlorResult},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

const MAX_HISTORY_LIMIT: usize = 200;

pub fn routes() -> Router<AppContext> {
    Router::new().route("/graphql", get(playground).post(execute))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
pub struct UsernameArgs {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialArgs {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatArgs {
    pub username: String,
    pub message: String,
    #[serde(default, rename = "chatId")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryArgs {
    pub username: String,
    pub limit: Option<usize>,
}

/// Every supported operation
#[derive(Debug)]
pub enum Operation {
    GetUser(UsernameArgs),
    Register(CredentialArgs),
    Login(CredentialArgs),
    Chat(ChatArgs),
    History(HistoryArgs),
}

impl Operation {
    /// Resolve an operation name and its variables
    pub fn parse(name: &str, variables: Value) -> ParlorResult<Self> {
        match name {
            "getUser" => Ok(Operation::GetUser(args(variables)?)),
            "register" => Ok(Operation::Register(args(variables)?)),
            "login" => Ok(Operation::Login(args(variables)?)),
            "chat" => Ok(Operation::Chat(args(variables)?)),
            "history" => Ok(Operation::History(args(variables)?)),
            other => Err(ParlorError::InvalidInput(format!(
                "Unknown operation '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::GetUser(_) => "getUser",
            Operation::Register(_) => "register",
            Operation::Login(_) => "login",
            Operation::Chat(_) => "chat",
            Operation::History(_) => "history",
        }
    }
}

fn args<T: DeserializeOwned>(variables: Value) -> ParlorResult<T> {
    let variables = if variables.is_null() { json!({}) } else { variables };
    serde_json::from_value(variables)
        .map_err(|e| ParlorError::InvalidInput(format!("Invalid variables: {}", e)))
}

#[derive(Debug, Serialize)]
struct MutationStatus {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct LoginPayload {
    success: bool,
    message: String,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    id: i64,
    role: &'static str,
    content: String,
    #[serde(rename = "chatId")]
    chat_id: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: String,
}

impl From<Turn> for HistoryEntry {
    fn from(turn: Turn) -> Self {
        Self {
            id: turn.id,
            role: turn.role.as_str(),
            content: turn.content,
            chat_id: turn.chat_id,
            created_at: turn.created_at.to_rfc3339(),
        }
    }
}

/// Run one operation against the application services
pub async fn dispatch(
    ctx: &AppContext,
    caller: Option<&AuthContext>,
    operation: Operation,
) -> ParlorResult<Value> {
    let value = match operation {
        Operation::GetUser(UsernameArgs { username }) => {
            match ctx.account_manager.get_account_by_username(&username).await {
                Ok(account) => json!(AccountProfile::from(account)),
                Err(ParlorError::NotFound(_)) => Value::Null,
                Err(e) => return Err(e),
            }
        }
        Operation::Register(CredentialArgs { username, password }) => {
            let status = match ctx.account_manager.register(&username, &password).await {
                Ok(_) => MutationStatus {
                    success: true,
                    message: "Registered!".to_string(),
                },
                Err(e @ (ParlorError::Conflict(_) | ParlorError::InvalidInput(_))) => {
                    MutationStatus {
                        success: false,
                        message: e.public_message(),
                    }
                }
                Err(e) => return Err(e),
            };
            json!(status)
        }
        Operation::Login(CredentialArgs { username, password }) => {
            let payload = match ctx.account_manager.login(&username, &password).await {
                Ok((_, token)) => LoginPayload {
                    success: true,
                    message: "Login successful".to_string(),
                    access_token: Some(token),
                },
                Err(ParlorError::Authentication(_)) => LoginPayload {
                    success: false,
                    message: "Invalid credentials".to_string(),
                    access_token: None,
                },
                Err(e) => return Err(e),
            };
            json!(payload)
        }
        Operation::Chat(ChatArgs {
            username,
            message,
            chat_id,
        }) => {
            let reply = ctx
                .chat_service
                .clone()
                .complete_turn(username, message, chat_id)
                .await?;
            json!({ "reply": reply })
        }
        Operation::History(HistoryArgs { username, limit }) => {
            let caller = caller.ok_or_else(|| {
                ParlorError::Authentication("Missing authorization header".to_string())
            })?;
            if caller.username != username {
                return Err(ParlorError::Authentication(
                    "History is only available for your own account".to_string(),
                ));
            }
            let limit = limit.unwrap_or(ctx.config.retrieval.history_limit).clamp(1, MAX_HISTORY_LIMIT);
            let turns = ctx.turn_store.recent(caller.account_id, limit).await?;
            json!(turns.into_iter().map(HistoryEntry::from).collect::<Vec<_>>())
        }
    };

    Ok(value)
}

fn error_response(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "errors": [{ "message": message }] })),
    )
        .into_response()
}

/// POST /graphql
async fn execute(
    State(ctx): State<AppContext>,
    caller: Option<AuthContext>,
    Json(req): Json<GraphqlRequest>,
) -> Response {
    let Some(name) = req.operation_name.as_deref().filter(|n| !n.is_empty()) else {
        return error_response("operationName is required".to_string());
    };

    let operation = match Operation::parse(name, req.variables) {
        Ok(operation) => operation,
        Err(e) => return error_response(e.public_message()),
    };

    let name = operation.name();
    tracing::debug!(operation = name, "graphql operation");

    match dispatch(&ctx, caller.as_ref(), operation).await {
        Ok(value) => Json(json!({ "data": { name: value } })).into_response(),
        Err(e) => {
            if matches!(e, ParlorError::Storage(_) | ParlorError::Internal(_)) {
                tracing::error!(operation = name, error = %e, "graphql operation failed");
            }
            error_response(e.public_message())
        }
    }
}

/// GET /graphql
async fn playground() -> Html<&'static str> {
    Html(PLAYGROUND_HTML)
}

const PLAYGROUND_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8"/>
    <title>Parlor GraphiQL</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/graphiql@1.4.2/graphiql.min.css"/>
  </head>
  <body style="margin: 0;">
    <div id="graphiql" style="height: 100vh;"></div>
    <script crossorigin src="https://cdn.jsdelivr.net/npm/react@16/umd/react.production.min.js"></script>
    <script crossorigin src="https://cdn.jsdelivr.net/npm/react-dom@16/umd/react-dom.production.min.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/graphiql@1.4.2/graphiql.min.js"></script>
    <script>
      const fetcher = params =>
        fetch('/graphql', {
          method: 'post',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify(params),
        }).then(response => response.json());

      ReactDOM.render(
        React.createElement(GraphiQL, { fetcher }),
        document.getElementById('graphiql'),
      );
    </script>
  </body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_operations() {
        let op = Operation::parse(
            "login",
            json!({"username": "alice", "password": "secret"}),
        )
        .unwrap();
        assert!(matches!(op, Operation::Login(CredentialArgs { ref username, .. }) if username == "alice"));
        assert_eq!(op.name(), "login");

        let op = Operation::parse("history", json!({"username": "alice"})).unwrap();
        assert!(matches!(op, Operation::History(HistoryArgs { limit: None, .. })));
    }

    #[test]
    fn test_parse_rejects_unknown_or_incomplete() {
        assert!(matches!(
            Operation::parse("deleteEverything", json!({})),
            Err(ParlorError::InvalidInput(_))
        ));
        assert!(matches!(
            Operation::parse("chat", json!({"username": "alice"})),
            Err(ParlorError::InvalidInput(_))
        ));
        assert!(matches!(
            Operation::parse("getUser", Value::Null),
            Err(ParlorError::InvalidInput(_))
        ));
    }
}
