mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::extract::{Json, Path as AxumPath, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use tripkit_core::{
    AccommodationType, ChecklistStatus, TransportMethod, TripChecklist, TripPurpose, TripRequest,
};
use tripkit_engine::ChecklistEngine;
use tripkit_observability::AppMetrics;
use tripkit_rules::RuleSet;
use tripkit_storage::{ChecklistRepository, Store};
use tripkit_weather::{ForecastProvider, OpenWeatherClient};

use crate::rate_limit::IpRateLimiter;

const DEFAULT_BODY_LIMIT_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ChecklistEngine>,
    pub store: Arc<Store>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub weather_enabled: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: tripkit_observability::MetricsSnapshot,
    weather_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateChecklistRequest {
    user_id: Option<String>,
    destination: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    purpose: TripPurpose,
    transport_method: Option<TransportMethod>,
    accommodation: Option<AccommodationType>,
}

#[derive(Debug, Serialize)]
struct ChecklistResponse {
    checklist: TripChecklist,
    status: ChecklistStatus,
    completion_percentage: f64,
    stored_at: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckItemRequest {
    item: String,
}

#[derive(Debug, Serialize)]
struct RecommendationsResponse {
    method: String,
    recommendations: Vec<String>,
}

/// State assembled from `TRIPKIT_*` env vars: rule set (builtin unless
/// `TRIPKIT_RULES_PATH` points at a TOML file), sqlite or in-memory store,
/// and the weather rule only when an API key is present.
pub async fn build_app() -> Result<Router> {
    let metrics = AppMetrics::shared();

    let rule_set = match env::var("TRIPKIT_RULES_PATH") {
        Ok(path) => RuleSet::from_path(&path)?,
        Err(_) => RuleSet::builtin()?,
    };

    let forecast: Option<Arc<dyn ForecastProvider>> =
        OpenWeatherClient::from_env().map(|client| Arc::new(client) as Arc<dyn ForecastProvider>);
    let weather_enabled = forecast.is_some();
    if !weather_enabled {
        tracing::warn!("TRIPKIT_WEATHER_API_KEY not set, weather rule disabled");
    }

    let store = if let Ok(database_url) = env::var("TRIPKIT_DATABASE_URL") {
        Store::sqlite(&database_url).await?
    } else {
        Store::memory()
    };

    let engine = ChecklistEngine::with_default_rules(rule_set, metrics.clone(), forecast);

    let api_key = env::var("TRIPKIT_API_KEY").unwrap_or_else(|_| "dev-tripkit-key".to_string());
    let rate_limit_window = Duration::from_secs(
        env::var("TRIPKIT_API_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60),
    );
    let rate_limit_max = env::var("TRIPKIT_API_RATE_LIMIT_MAX")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(80);

    let state = ApiState {
        engine: Arc::new(engine),
        store: Arc::new(store),
        metrics,
        api_key,
        limiter: IpRateLimiter::new(rate_limit_window, rate_limit_max),
        weather_enabled,
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/checklists", post(generate_checklist))
        .route("/v1/checklists/:id", get(get_checklist))
        .route("/v1/checklists/:id/check", post(check_item))
        .route(
            "/v1/transport/:method/recommendations",
            get(transport_recommendations),
        )
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(DEFAULT_BODY_LIMIT_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        weather_enabled: state.weather_enabled,
    };
    (StatusCode::OK, Json(payload))
}

async fn generate_checklist(
    State(state): State<ApiState>,
    Json(input): Json<GenerateChecklistRequest>,
) -> Response {
    let request = match TripRequest::new(
        input.destination,
        input.start_date,
        input.end_date,
        input.purpose,
        input.transport_method,
        input.accommodation,
    ) {
        Ok(request) => request,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_request",
                    "message": error.to_string()
                })),
            )
                .into_response();
        }
    };

    let user_id = input
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous");

    let checklist = match state.engine.generate(request, user_id).await {
        Ok(checklist) => checklist,
        Err(error) => {
            tracing::error!(%error, "checklist generation failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "generation_failed",
                    "message": error.to_string()
                })),
            )
                .into_response();
        }
    };

    let stored_at = match state.store.save(&checklist).await {
        Ok(reference) => reference,
        Err(error) => {
            tracing::error!(%error, "failed to persist checklist");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "storage_failed"
                })),
            )
                .into_response();
        }
    };

    let status = checklist.status();
    let completion_percentage = checklist.completion_percentage();
    (
        StatusCode::OK,
        Json(ChecklistResponse {
            checklist,
            status,
            completion_percentage,
            stored_at,
        }),
    )
        .into_response()
}

async fn get_checklist(State(state): State<ApiState>, AxumPath(id): AxumPath<String>) -> Response {
    match state.store.fetch(&id).await {
        Ok(Some(checklist)) => (StatusCode::OK, Json(checklist)).into_response(),
        Ok(None) => checklist_not_found(&id),
        Err(error) => {
            tracing::error!(%error, "checklist fetch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "storage_failed" })),
            )
                .into_response()
        }
    }
}

async fn check_item(
    State(state): State<ApiState>,
    AxumPath(id): AxumPath<String>,
    Json(input): Json<CheckItemRequest>,
) -> Response {
    match state.store.toggle_item(&id, input.item.trim()).await {
        Ok(Some(checklist)) => {
            let status = checklist.status();
            let completion_percentage = checklist.completion_percentage();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "checklist": checklist,
                    "status": status,
                    "completion_percentage": completion_percentage
                })),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "not_found",
                "message": format!("no checklist {} with item {:?}", id, input.item)
            })),
        )
            .into_response(),
        Err(error) => {
            tracing::error!(%error, "item toggle failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "storage_failed" })),
            )
                .into_response()
        }
    }
}

async fn transport_recommendations(
    State(state): State<ApiState>,
    AxumPath(method): AxumPath<String>,
) -> Response {
    let Some(method) = TransportMethod::parse(&method) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "unknown_transport_method",
                "message": format!("unknown transport method {:?}", method)
            })),
        )
            .into_response();
    };

    let recommendations = state.engine.recommendations(Some(method));
    (
        StatusCode::OK,
        Json(RecommendationsResponse {
            method: method.as_str().to_string(),
            recommendations,
        }),
    )
        .into_response()
}

fn checklist_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "message": format!("no checklist with id {}", id)
        })),
    )
        .into_response()
}

fn is_public_endpoint(path: &str) -> bool {
    path == "/health"
}

fn build_cors_layer() -> CorsLayer {
    let origins = env::var("TRIPKIT_ALLOWED_ORIGINS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5500")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if request.method() == Method::OPTIONS || is_public_endpoint(path.as_str()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "missing or invalid x-api-key"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS
        || is_public_endpoint(request.uri().path())
    {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "too many requests from this IP. wait and retry."
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}
