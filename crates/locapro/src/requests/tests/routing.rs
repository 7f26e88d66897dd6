use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::accounts::account_router;
use crate::http::PathParam;
use crate::infra::{InMemoryAccountRepository, InMemoryRequestRepository};
use crate::requests::{request_router, router, AcceptForm};

fn app(fixture: &Fixture) -> Router {
    account_router(Arc::clone(fixture.accounts())).merge(request_router(Arc::clone(&fixture.service)))
}

fn json_post(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, bearer(token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("json")))
        .expect("request")
}

fn get_with(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, bearer(token))
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn create_route_requires_a_session() {
    let fixture = Fixture::build(Utc::now());

    let response = app(&fixture)
        .oneshot(
            Request::post("/api/requests")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error_code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn create_route_returns_created_request() {
    let fixture = Fixture::build(Utc::now());
    let token = fixture.session_for("alice");
    let provider_id = fixture.provider.provider.as_ref().map(|p| p.id.0);

    let response = app(&fixture)
        .oneshot(json_post(
            "/api/requests",
            &token,
            json!({
                "provider_choice": provider_id,
                "description": "Bathroom tap drips all night",
                "offered_price": 95.0,
                "urgent": true,
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["request_id"], 1);
    assert_eq!(body["request"]["status"], "pending");
    assert_eq!(body["request"]["provider_name"], "Pipe Masters");
}

#[tokio::test]
async fn provider_accept_route_reports_conflicts() {
    let fixture = Fixture::build(Utc::now());
    let issued = fixture
        .service
        .create_request(&fixture.customer, fixture.request_form(), fixture.now)
        .expect("request created");
    let token = fixture.session_for("pipepro");
    let uri = format!("/api/requests/{}/accept", issued.request.id);

    let first = app(&fixture)
        .oneshot(json_post(&uri, &token, json!({ "notes": "On my way" })))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    let body = json_body(first).await;
    assert_eq!(body["message"], "Request has been accepted successfully.");
    assert_eq!(body["new_status"], "accepted");

    let second = app(&fixture)
        .oneshot(
            Request::post(uri.as_str())
                .header(header::AUTHORIZATION, bearer(&token))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = json_body(second).await;
    assert_eq!(body["message"], "This request has already been accepted.");
    assert_eq!(body["error_code"], "CONFLICT");
}

#[tokio::test]
async fn customers_cannot_use_the_provider_accept_route() {
    let fixture = Fixture::build(Utc::now());
    let issued = fixture
        .service
        .create_request(&fixture.customer, fixture.request_form(), fixture.now)
        .expect("request created");
    let token = fixture.session_for("alice");

    let response = app(&fixture)
        .oneshot(json_post(
            &format!("/api/requests/{}/accept", issued.request.id),
            &token,
            json!({}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn decision_page_round_trip() {
    let fixture = Fixture::build(Utc::now());
    let issued = fixture
        .service
        .create_request(&fixture.customer, fixture.request_form(), fixture.now)
        .expect("request created");
    let uri = format!(
        "/requests/decision/{}/decline/{}/",
        issued.request.id, issued.decision_token
    );

    let page = app(&fixture)
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(page.headers()[header::CACHE_CONTROL], "no-store");
    let html = text_body(page).await;
    assert!(html.contains("Decline Service Request"));
    assert!(html.contains("name=\"decline_reason\""));

    let submit = app(&fixture)
        .oneshot(
            Request::post(uri.as_str())
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("decline_reason=distance&decline_message=Too+far+out"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(submit.status(), StatusCode::OK);
    let html = text_body(submit).await;
    assert!(html.contains("Request declined. Thank you for letting us know."));

    let replay = app(&fixture)
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(replay.headers()[header::CACHE_CONTROL], "no-store");
    let html = text_body(replay).await;
    assert!(html.contains("This decision link has expired or has already been used"));
}

#[tokio::test]
async fn empty_export_returns_no_content() {
    let fixture = Fixture::build(Utc::now());
    let token = fixture.session_for("alice");

    let response = app(&fixture)
        .oneshot(get_with("/api/requests/export/csv", &token))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn csv_export_is_an_attachment() {
    let fixture = Fixture::build(Utc::now());
    fixture
        .service
        .create_request(&fixture.customer, fixture.request_form(), fixture.now)
        .expect("request created");
    let token = fixture.session_for("alice");

    let response = app(&fixture)
        .oneshot(get_with("/api/requests/export/csv?status=pending", &token))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .expect("ascii header")
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"service_requests_"));
    assert!(disposition.ends_with(".csv\""));
    let csv = text_body(response).await;
    assert!(csv.starts_with("Request ID,Service Type,User Name"));
}

#[tokio::test]
async fn tracking_handler_reports_structured_errors() {
    let fixture = Fixture::build(Utc::now());
    let issued = fixture
        .service
        .create_request(&fixture.customer, fixture.request_form(), fixture.now)
        .expect("request created");
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, bearer(&fixture.session_for("alice")));

    let pending = router::tracking_handler::<InMemoryAccountRepository, InMemoryRequestRepository>(
        State(Arc::clone(&fixture.service)),
        PathParam(issued.request.id.0),
        headers.clone(),
    )
    .await;
    assert_eq!(pending.status(), StatusCode::BAD_REQUEST);
    let body = json_body(pending).await;
    assert_eq!(body["error_code"], "REQUEST_NOT_ACCEPTED");

    fixture
        .service
        .accept(&fixture.provider, issued.request.id, AcceptForm::default(), fixture.now)
        .expect("accepted");
    let located = router::tracking_handler::<InMemoryAccountRepository, InMemoryRequestRepository>(
        State(Arc::clone(&fixture.service)),
        PathParam(issued.request.id.0),
        headers,
    )
    .await;
    assert_eq!(located.status(), StatusCode::OK);
    let body = json_body(located).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["provider_name"], "Pipe Masters");
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let fixture = Fixture::build(Utc::now());
    let token = fixture.session_for("alice");

    let response = app(&fixture)
        .oneshot(get_with("/api/requests/77", &token))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Service request not found.");
}

#[tokio::test]
async fn non_numeric_ids_get_the_json_envelope() {
    let fixture = Fixture::build(Utc::now());
    let token = fixture.session_for("pipepro");

    let response = app(&fixture)
        .oneshot(json_post("/api/requests/abc/accept", &token, json!({})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "BAD_REQUEST");
    assert_eq!(body["message"], "Invalid identifier in URL.");
}

#[tokio::test]
async fn decision_link_with_a_non_numeric_id_renders_the_error_page() {
    let fixture = Fixture::build(Utc::now());

    let response = app(&fixture)
        .oneshot(
            Request::get("/requests/decision/abc/accept/deadbeef/")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let html = text_body(response).await;
    assert!(html.contains("Invalid or expired token"));
}
