/// Health check endpoints for liveness and readiness probes
///
/// - Liveness: the process answers requests
/// - Readiness: the database is reachable
/// - Detailed: per-component status, including optional collaborators

use crate::{config::VectorConfig, context::AppContext, error::ParlorResult};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    pub version: String,
    pub checks: Vec<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health status of individual component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    /// Status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health/detailed", get(health_detailed))
}

pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Returns 503 while the database is unreachable
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = check_database(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();
    let checks = vec![
        check_database_detailed(&ctx).await,
        vector_index_health(&ctx),
        style_service_health(&ctx),
    ];

    let overall_status = determine_overall_status(&checks);
    let health = HealthStatus {
        status: overall_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
        message: if overall_status == "healthy" {
            None
        } else {
            Some("One or more components are not fully available".to_string())
        },
    };

    let status_code = match overall_status {
        "unhealthy" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    tracing::info!(
        status = overall_status,
        duration_ms = start.elapsed().as_millis() as u64,
        "health_check_completed"
    );

    (status_code, Json(health))
}

async fn check_database(ctx: &AppContext) -> ParlorResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

async fn check_database_detailed(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = check_database(ctx).await;
    let elapsed = Some(start.elapsed().as_millis() as u64);

    match result {
        Ok(()) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            response_time_ms: elapsed,
            error: None,
            details: Some(serde_json::json!({
                "type": "sqlite",
                "pool_size": ctx.db.size(),
            })),
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: elapsed,
            error: Some(e.to_string()),
            details: None,
        },
    }
}

fn vector_index_health(ctx: &AppContext) -> ComponentHealth {
    let kind = match ctx.config.vector {
        VectorConfig::Pinecone { .. } => "pinecone",
        VectorConfig::Memory => "memory",
    };

    ComponentHealth {
        name: "vector_index".to_string(),
        status: "healthy".to_string(),
        response_time_ms: None,
        error: None,
        details: Some(serde_json::json!({ "type": kind })),
    }
}

fn style_service_health(ctx: &AppContext) -> ComponentHealth {
    let available = ctx.style_service.is_available();

    ComponentHealth {
        name: "style_transfer".to_string(),
        status: if available { "healthy" } else { "degraded" }.to_string(),
        response_time_ms: None,
        error: (!available).then(|| "No inference service configured".to_string()),
        details: None,
    }
}

/// Worst status across all checks
fn determine_overall_status(checks: &[ComponentHealth]) -> &'static str {
    if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy"
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded"
    } else {
        "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str, status: &str) -> ComponentHealth {
        ComponentHealth {
            name: name.to_string(),
            status: status.to_string(),
            response_time_ms: Some(5),
            error: None,
            details: None,
        }
    }

    #[test]
    fn test_determine_overall_status() {
        let healthy = vec![component("db", "healthy"), component("index", "healthy")];
        assert_eq!(determine_overall_status(&healthy), "healthy");

        let degraded = vec![component("db", "healthy"), component("style", "degraded")];
        assert_eq!(determine_overall_status(&degraded), "degraded");

        let unhealthy = vec![component("db", "unhealthy"), component("style", "degraded")];
        assert_eq!(determine_overall_status(&unhealthy), "unhealthy");
    }

    #[test]
    fn test_health_status_serialization() {
        let health = HealthStatus {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            checks: vec![component("database", "healthy")],
            message: None,
        };

        let json = serde_json::to_string(&health).unwrap();
        assert!(json.contains("database"));
        assert!(!json.contains("message"));
    }
}
