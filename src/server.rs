//! HTTP surface over the gateway.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::error::{AirQualityError, ErrorCategory, FieldError};
use crate::gateway::Gateway;

const SAMPLES_PER_CATEGORY: usize = 5;

pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/stats", get(stats))
        .route("/sample", get(sample))
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

async fn home(State(gateway): State<Gateway>) -> Json<Value> {
    let ctx = gateway.context();
    Json(json!({
        "status": "ok",
        "message": "Beijing Air Quality Prediction API",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": ctx.is_ready(),
        "dataset_loaded": ctx.dataset().is_some(),
        "endpoints": {
            "predict": "POST /predict",
            "stats": "GET /stats",
            "sample": "GET /sample",
            "health": "GET /health"
        }
    }))
}

async fn health(State(gateway): State<Gateway>) -> impl IntoResponse {
    Json(gateway.context().health())
}

async fn predict(
    State(gateway): State<Gateway>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    // Availability is reported before any look at the body.
    if !gateway.context().is_ready() {
        return error_response(&gateway, AirQualityError::Unavailable);
    }
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            let err = AirQualityError::Validation(vec![FieldError {
                field: "body".to_string(),
                label: "Request".to_string(),
                message: rejection.body_text(),
                min: None,
                max: None,
                value: None,
            }]);
            return error_response(&gateway, err);
        }
    };

    match gateway.predict(&body) {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response(&gateway, err),
    }
}

fn error_response(gateway: &Gateway, err: AirQualityError) -> Response {
    match err.category() {
        ErrorCategory::Validation => {
            let errors = match err {
                AirQualityError::Validation(errors) => errors,
                _ => Vec::new(),
            };
            (StatusCode::BAD_REQUEST, Json(gateway.rejection(errors))).into_response()
        }
        ErrorCategory::Unavailable => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": "Model is not loaded. Run the training pipeline first."
            })),
        )
            .into_response(),
        _ => {
            error!("prediction failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": format!("Unexpected error: {err}") })),
            )
                .into_response()
        }
    }
}

async fn stats(State(gateway): State<Gateway>) -> Response {
    match gateway.context().dataset() {
        Some(table) => Json(table.stats()).into_response(),
        None => dataset_missing(),
    }
}

async fn sample(State(gateway): State<Gateway>) -> Response {
    match gateway.context().dataset() {
        Some(table) => {
            let rows = table.sample(SAMPLES_PER_CATEGORY, &mut rand::thread_rng());
            Json(json!({ "total": rows.len(), "samples": rows })).into_response()
        }
        None => dataset_missing(),
    }
}

fn dataset_missing() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Dataset not found" })),
    )
        .into_response()
}
