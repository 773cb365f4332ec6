//! Health endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub signal_keys: usize,
    pub version: String,
}

/// Router serving `/` and `/health`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn root() -> &'static str {
    "FraudWatch"
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match &state.db_pool {
        Some(pool) => match db::check_health(pool).await {
            Ok(()) => "connected".to_string(),
            Err(e) => format!("error: {}", e),
        },
        None => "in-memory".to_string(),
    };

    let status = if db_status.starts_with("error") {
        "unhealthy"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: db_status,
        signal_keys: state.signal_store.len().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DisputeSettings, Environment, RiskSettings};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn memory_config() -> Config {
        Config {
            database_url: None,
            environment: Environment::Development,
            port: 3001,
            db_max_connections: 5,
            log_level: "info".to_string(),
            risk: RiskSettings::default(),
            dispute: DisputeSettings::default(),
            signal_store_purge_interval_seconds: 60,
        }
    }

    #[tokio::test]
    async fn test_health_in_memory_mode() {
        let app = router(AppState::new(&memory_config(), None));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["database"], "in-memory");
        assert_eq!(json["signal_keys"], 0);
    }
}
