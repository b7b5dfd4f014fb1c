//! HTTP façade over a [`crate::Database`].
//!
//! Not part of the storage engine's correctness surface (see
//! `SPEC_FULL.md` §4.10/§6.4) — it exists so the crate has the same
//! external shape as the system it was modeled on.

use crate::database::Database;
use crate::error::StorageError;
use crate::metrics::metrics;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
}

#[derive(Debug, Serialize)]
struct GetResponse {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PutBody {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(db: Arc<Database>) -> Router {
    Router::new()
        .route("/db/", get(get_key).post(put_key))
        .route("/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(AppState { db })
}

pub async fn serve(db: Arc<Database>, bind: &str) -> std::io::Result<()> {
    let app = router(db);
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %bind, "logcask façade listening");
    axum::serve(listener, app).await
}

async fn get_key(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(key) = params.get("key") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::to_value(ErrorBody { error: "missing key".into() }).unwrap()),
        );
    };

    debug!(key = %key, "handling GET /db/");
    match state.db.get(key.as_bytes()) {
        Ok(value) => (
            StatusCode::OK,
            Json(
                serde_json::to_value(GetResponse {
                    key: key.clone(),
                    value: String::from_utf8_lossy(&value).into_owned(),
                })
                .unwrap(),
            ),
        ),
        Err(StorageError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::to_value(ErrorBody { error: "key not found".into() }).unwrap()),
        ),
        Err(e) => {
            warn!(error = %e, key = %key, "get failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::to_value(ErrorBody { error: e.to_string() }).unwrap()),
            )
        }
    }
}

async fn put_key(
    State(state): State<AppState>,
    body: Option<Json<PutBody>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::to_value(ErrorBody { error: "invalid JSON body".into() }).unwrap()),
        );
    };

    if body.key.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::to_value(ErrorBody { error: "key must not be empty".into() }).unwrap()),
        );
    }

    debug!(key = %body.key, "handling POST /db/");
    match state.db.put(body.key.as_bytes(), body.value.as_bytes()) {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({"key": body.key}))),
        Err(e) => {
            warn!(error = %e, key = %body.key, "put failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::to_value(ErrorBody { error: e.to_string() }).unwrap()),
            )
        }
    }
}

async fn get_metrics() -> Json<crate::metrics::MetricsSnapshot> {
    Json(metrics().snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn test_db() -> Arc<Database> {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf()).without_merge_worker();
        let db = Database::open(config).unwrap();
        std::mem::forget(dir);
        Arc::new(db)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let app = router(test_db());

        let put_req = Request::builder()
            .method("POST")
            .uri("/db/?key=foo")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"key":"foo","value":"bar"}"#))
            .unwrap();
        let put_res = app.clone().oneshot(put_req).await.unwrap();
        assert_eq!(put_res.status(), StatusCode::CREATED);

        let get_req = Request::builder()
            .uri("/db/?key=foo")
            .body(Body::empty())
            .unwrap();
        let get_res = app.oneshot(get_req).await.unwrap();
        assert_eq!(get_res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_key_is_404() {
        let app = router(test_db());
        let req = Request::builder()
            .uri("/db/?key=missing")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_query_param_is_400() {
        let app = router(test_db());
        let req = Request::builder().uri("/db/").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
