//! JSON envelopes shared by the account and request routers.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::validation::ValidationErrors;

pub const SESSION_COOKIE: &str = "sessionid";

/// Stable machine-readable codes carried in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ServerError,
    RequestNotAccepted,
    NoProvider,
    ProviderProfileNotFound,
    LocationNotAvailable,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::RequestNotAccepted => "REQUEST_NOT_ACCEPTED",
            ErrorCode::NoProvider => "NO_PROVIDER",
            ErrorCode::ProviderProfileNotFound => "PROVIDER_PROFILE_NOT_FOUND",
            ErrorCode::LocationNotAvailable => "LOCATION_NOT_AVAILABLE",
        }
    }
}

pub fn error_response(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    let payload = json!({
        "status": "error",
        "message": message.into(),
        "error_code": code.as_str(),
    });
    (status, Json(payload)).into_response()
}

pub fn validation_response(errors: &ValidationErrors) -> Response {
    let payload = json!({
        "status": "error",
        "message": "Validation failed.",
        "errors": errors,
        "error_code": ErrorCode::BadRequest.as_str(),
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

/// `{"status": "success", "message": ..}` merged with `extra` object fields.
pub fn success_response(status: StatusCode, message: &str, extra: Value) -> Response {
    let mut body = Map::new();
    body.insert("status".to_string(), Value::from("success"));
    body.insert("message".to_string(), Value::from(message));
    if let Value::Object(fields) = extra {
        body.extend(fields);
    }
    (status, Json(Value::Object(body))).into_response()
}

/// `Path` extractor whose rejections use the JSON error envelope.
#[derive(Debug, Clone, Copy)]
pub struct PathParam<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(%rejection, path = %parts.uri.path(), "path parameters rejected");
                let status = rejection.status();
                let code = if status.is_server_error() {
                    ErrorCode::ServerError
                } else {
                    ErrorCode::BadRequest
                };
                Err(error_response(status, code, "Invalid identifier in URL."))
            }
        }
    }
}

/// Session secret from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_token_prefers_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(header::COOKIE, HeaderValue::from_static("sessionid=zzz"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn path_param_rejections_are_json() {
        use axum::body::{to_bytes, Body};
        use axum::http::Request;
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;

        async fn show(PathParam(id): PathParam<u64>) -> String {
            id.to_string()
        }
        let app = Router::new().route("/items/:id", get(show));

        let ok = app
            .clone()
            .oneshot(Request::get("/items/7").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);

        let bad = app
            .oneshot(Request::get("/items/seven").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(bad.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_code"], "BAD_REQUEST");
    }

    #[test]
    fn session_token_reads_cookie_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sessionid=s3cr3t; lang=fr"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("s3cr3t"));
        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
