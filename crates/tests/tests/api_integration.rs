use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;
use tower::ServiceExt;
use tripkit_api::build_app;

const API_KEY: &str = "dev-tripkit-key";

fn trip_payload(destination: &str, purpose: &str, nights: i64) -> serde_json::Value {
    let start = Utc::now().date_naive() + Duration::days(21);
    let end = start + Duration::days(nights);
    json!({
        "user_id": "integration",
        "destination": destination,
        "start_date": start.format("%Y-%m-%d").to_string(),
        "end_date": end.format("%Y-%m-%d").to_string(),
        "purpose": purpose,
        "transport_method": "train"
    })
}

fn generate_request(payload: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/checklists")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn generate_requires_api_key() {
    let app = build_app().await.expect("app should build");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/checklists")
        .header("content-type", "application/json")
        .body(Body::from(trip_payload("Sapporo", "business", 2).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_returns_sorted_checklist_with_unique_names() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(generate_request(&trip_payload("Sapporo", "business", 2)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert!(parsed["stored_at"]
        .as_str()
        .unwrap()
        .starts_with("memory://checklists/"));
    assert_eq!(parsed["status"], "planning");

    let items = parsed["checklist"]["items"].as_array().unwrap();
    assert!(!items.is_empty());

    let names: Vec<&str> = items
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    let mut unique = names.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), names.len(), "duplicate item names survived merge");

    let priorities: Vec<i64> = items
        .iter()
        .map(|item| item["priority"].as_i64().unwrap())
        .collect();
    assert!(priorities.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn end_before_start_is_rejected() {
    let app = build_app().await.expect("app should build");

    let start = Utc::now().date_naive() + Duration::days(21);
    let payload = json!({
        "destination": "Kyoto",
        "start_date": start.format("%Y-%m-%d").to_string(),
        "end_date": (start - Duration::days(1)).format("%Y-%m-%d").to_string(),
        "purpose": "leisure"
    });

    let response = app.oneshot(generate_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fetch_and_toggle_round_trip() {
    let app = build_app().await.expect("app should build");

    let response = app
        .clone()
        .oneshot(generate_request(&trip_payload("Okinawa", "leisure", 3)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let id = parsed["checklist"]["id"].as_str().unwrap().to_string();
    let first_item = parsed["checklist"]["items"][0]["name"]
        .as_str()
        .unwrap()
        .to_string();

    let fetch = Request::builder()
        .uri(format!("/v1/checklists/{id}"))
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let fetch_response = app.clone().oneshot(fetch).await.unwrap();
    assert_eq!(fetch_response.status(), StatusCode::OK);

    let toggle = Request::builder()
        .method("POST")
        .uri(format!("/v1/checklists/{id}/check"))
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(json!({ "item": first_item }).to_string()))
        .unwrap();
    let toggle_response = app.clone().oneshot(toggle).await.unwrap();
    assert_eq!(toggle_response.status(), StatusCode::OK);

    let body = to_bytes(toggle_response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let toggled = parsed["checklist"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["name"] == first_item.as_str())
        .unwrap();
    assert!(toggled["checked"].as_bool().unwrap());
    assert_eq!(parsed["status"], "in_progress");
}

#[tokio::test]
async fn missing_checklist_is_404() {
    let app = build_app().await.expect("app should build");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/checklists/does-not-exist")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transport_recommendations_endpoint() {
    let app = build_app().await.expect("app should build");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/transport/train/recommendations")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["method"], "train");
    assert!(!parsed["recommendations"].as_array().unwrap().is_empty());

    let bad = app
        .oneshot(
            Request::builder()
                .uri("/v1/transport/teleporter/recommendations")
                .header("x-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}
