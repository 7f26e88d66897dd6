use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::domain::RequestId;
use super::export::{
    export_filename, render_report, write_csv, ExportFilters, EMPTY_EXPORT_MESSAGE,
};
use super::forms::{AcceptForm, DecisionForm, DeclineForm, RequestEdit, RequestForm};
use super::pages;
use super::repository::RequestRepository;
use super::service::{RequestService, RequestServiceError, TokenError};
use crate::accounts::{AccountContext, AccountError, AccountRepository};
use crate::http::{error_response, session_token, success_response, ErrorCode, PathParam};

/// Request workflow endpoints, including the tokenised decision pages.
pub fn request_router<A, Q>(service: Arc<RequestService<A, Q>>) -> Router
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    Router::new()
        .route("/api/price-ranges", get(price_ranges_handler::<A, Q>))
        .route(
            "/api/requests",
            get(list_handler::<A, Q>).post(create_handler::<A, Q>),
        )
        .route("/api/requests/export/csv", get(export_csv_handler::<A, Q>))
        .route(
            "/api/requests/export/report",
            get(export_report_handler::<A, Q>),
        )
        .route("/api/requests/:request_id", get(detail_handler::<A, Q>))
        .route(
            "/api/requests/:request_id/accept",
            post(accept_handler::<A, Q>),
        )
        .route(
            "/api/requests/:request_id/decline",
            post(decline_handler::<A, Q>),
        )
        .route("/api/requests/:request_id/edit", post(edit_handler::<A, Q>))
        .route(
            "/api/requests/:request_id/tracking",
            get(tracking_handler::<A, Q>),
        )
        .route(
            "/requests/decision/:request_id/:action/:token/",
            get(decision_page_handler::<A, Q>).post(decision_submit_handler::<A, Q>),
        )
        .with_state(service)
}

fn current_account<A, Q>(
    service: &Arc<RequestService<A, Q>>,
    headers: &HeaderMap,
) -> Result<AccountContext, RequestServiceError>
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let token = session_token(headers);
    Ok(service.accounts().authenticate(token.as_deref(), Utc::now())?)
}

fn current_provider<A, Q>(
    service: &Arc<RequestService<A, Q>>,
    headers: &HeaderMap,
) -> Result<AccountContext, RequestServiceError>
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let account = current_account(service, headers)?;
    if account.is_provider() {
        Ok(account)
    } else {
        Err(AccountError::ProviderRequired.into())
    }
}

/// An empty body reads as the form's defaults.
fn json_body<T>(body: &Bytes) -> Result<T, Response>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::BadRequest,
            format!("Invalid JSON body: {err}"),
        )
    })
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

pub(crate) async fn price_ranges_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    match service.price_ranges() {
        Ok(ranges) => (StatusCode::OK, Json(json!({ "price_ranges": ranges }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let account = match current_account(&service, &headers) {
        Ok(account) => account,
        Err(err) => return err.into_response(),
    };
    let form: RequestForm = match json_body(&body) {
        Ok(form) => form,
        Err(response) => return response,
    };
    match service.create_request(&account, form, Utc::now()) {
        Ok(issued) => success_response(
            StatusCode::CREATED,
            "Service request submitted successfully.",
            json!({
                "request_id": issued.request.id,
                "request": issued.request,
            }),
        ),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    headers: HeaderMap,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|account| service.list_for(&account));
    match result {
        Ok(requests) => {
            let payload = json!({
                "status": "success",
                "count": requests.len(),
                "requests": requests,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn detail_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    PathParam(request_id): PathParam<u64>,
    headers: HeaderMap,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|account| service.detail(&account, RequestId(request_id)));
    match result {
        Ok(view) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "request": view })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn accept_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    PathParam(request_id): PathParam<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let provider = match current_provider(&service, &headers) {
        Ok(provider) => provider,
        Err(err) => return err.into_response(),
    };
    let form: AcceptForm = match json_body(&body) {
        Ok(form) => form,
        Err(response) => return response,
    };
    match service.accept(&provider, RequestId(request_id), form, Utc::now()) {
        Ok(request) => success_response(
            StatusCode::OK,
            "Request has been accepted successfully.",
            json!({
                "request_id": request.id,
                "new_status": request.status,
            }),
        ),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn decline_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    PathParam(request_id): PathParam<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let provider = match current_provider(&service, &headers) {
        Ok(provider) => provider,
        Err(err) => return err.into_response(),
    };
    let form: DeclineForm = match json_body(&body) {
        Ok(form) => form,
        Err(response) => return response,
    };
    match service.decline(&provider, RequestId(request_id), form, Utc::now()) {
        Ok(request) => success_response(
            StatusCode::OK,
            "Request has been declined successfully.",
            json!({
                "request_id": request.id,
                "new_status": request.status,
                "decline_reason": request.decline_reason,
            }),
        ),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn edit_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    PathParam(request_id): PathParam<u64>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let account = match current_account(&service, &headers) {
        Ok(account) => account,
        Err(err) => return err.into_response(),
    };
    let edit: RequestEdit = match json_body(&body) {
        Ok(edit) => edit,
        Err(response) => return response,
    };
    match service.edit(&account, RequestId(request_id), edit, Utc::now()) {
        Ok(request) => success_response(
            StatusCode::OK,
            "Request updated successfully.",
            json!({ "request_id": request.id, "request": request }),
        ),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn tracking_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    PathParam(request_id): PathParam<u64>,
    headers: HeaderMap,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|account| service.track_provider(&account, RequestId(request_id)));
    match result {
        Ok(location) => (StatusCode::OK, Json(location)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn attachment(body: impl IntoResponse, content_type: &'static str, filename: &str) -> Response {
    let disposition = format!("attachment; filename=\"{filename}\"");
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

fn empty_export() -> Response {
    (StatusCode::NO_CONTENT, EMPTY_EXPORT_MESSAGE).into_response()
}

pub(crate) async fn export_csv_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    Query(filters): Query<ExportFilters>,
    headers: HeaderMap,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let rows = match current_account(&service, &headers)
        .and_then(|account| service.export_rows(&account, &filters))
    {
        Ok(rows) => rows,
        Err(err) => return err.into_response(),
    };
    if rows.is_empty() {
        return empty_export();
    }
    let now = Utc::now();
    match write_csv(&rows) {
        Ok(bytes) => {
            tracing::info!(rows = rows.len(), "csv export generated");
            attachment(bytes, "text/csv; charset=utf-8", &export_filename(now, "csv"))
        }
        Err(err) => RequestServiceError::from(err).into_response(),
    }
}

pub(crate) async fn export_report_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    Query(filters): Query<ExportFilters>,
    headers: HeaderMap,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let rows = match current_account(&service, &headers)
        .and_then(|account| service.export_rows(&account, &filters))
    {
        Ok(rows) => rows,
        Err(err) => return err.into_response(),
    };
    if rows.is_empty() {
        return empty_export();
    }
    let now = Utc::now();
    tracing::info!(rows = rows.len(), "printable report generated");
    attachment(
        render_report(&rows, now),
        "text/html; charset=utf-8",
        &export_filename(now, "html"),
    )
}

fn decision_error_page(err: RequestServiceError) -> Response {
    let status = err.status();
    let message = match &err {
        RequestServiceError::Transition(transition) => {
            format!("This request has already been {}.", transition.from)
        }
        RequestServiceError::Export(_)
        | RequestServiceError::TokenLifetime(_)
        | RequestServiceError::Account(_)
        | RequestServiceError::Repository(_) => {
            tracing::error!(error = %err, "decision link failed");
            "An error occurred while processing your request.".to_string()
        }
        other => other.to_string(),
    };
    no_store((status, Html(pages::error_page(&message))).into_response())
}

/// Link ids that are not numbers cannot name a request the token was issued for.
fn decision_request_id(raw: &str) -> Result<RequestId, RequestServiceError> {
    raw.trim()
        .parse::<u64>()
        .map(RequestId)
        .map_err(|_| TokenError::Unknown.into())
}

pub(crate) async fn decision_page_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    Path((request_id, action, token)): Path<(String, String, String)>,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let request_id = match decision_request_id(&request_id) {
        Ok(id) => id,
        Err(err) => return decision_error_page(err),
    };
    match service.preview_decision(request_id, &action, &token, Utc::now()) {
        Ok(preview) => {
            let form_action = format!("/requests/decision/{request_id}/{action}/{token}/");
            let page = pages::confirmation_page(&preview, &form_action);
            no_store((StatusCode::OK, Html(page)).into_response())
        }
        Err(err) => decision_error_page(err),
    }
}

pub(crate) async fn decision_submit_handler<A, Q>(
    State(service): State<Arc<RequestService<A, Q>>>,
    Path((request_id, action, token)): Path<(String, String, String)>,
    Form(form): Form<DecisionForm>,
) -> Response
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    let request_id = match decision_request_id(&request_id) {
        Ok(id) => id,
        Err(err) => return decision_error_page(err),
    };
    match service.decide_with_token(request_id, &action, &token, form, Utc::now()) {
        Ok(request) => {
            no_store((StatusCode::OK, Html(pages::success_page(request.status))).into_response())
        }
        Err(err) => decision_error_page(err),
    }
}
