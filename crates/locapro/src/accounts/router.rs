use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{AccountContext, ProviderId};
use super::filter::{parse_page_request, AppliedFilters, ProfessionalSummary};
use super::repository::AccountRepository;
use super::service::{
    AccountError, AccountService, LoginOutcome, ProviderProfileUpdate, ProviderRegistration,
    UserProfileUpdate, UserRegistration,
};
use crate::config::SessionConfig;
use crate::http::{
    error_response, session_token, success_response, ErrorCode, PathParam, SESSION_COOKIE,
};

/// Registration, session, profile and provider search endpoints.
pub fn account_router<R>(service: Arc<AccountService<R>>) -> Router
where
    R: AccountRepository + 'static,
{
    Router::new()
        .route("/api/auth/register/user", post(register_user_handler::<R>))
        .route(
            "/api/auth/register/provider",
            post(register_provider_handler::<R>),
        )
        .route("/api/auth/login", post(login_handler::<R>))
        .route("/api/auth/logout", post(logout_handler::<R>))
        .route(
            "/api/user/profile",
            get(user_profile_handler::<R>).put(update_user_profile_handler::<R>),
        )
        .route(
            "/api/provider/profile",
            get(provider_profile_handler::<R>).put(update_provider_profile_handler::<R>),
        )
        .route("/api/professionals", get(professionals_handler::<R>))
        .route(
            "/api/professionals/:provider_id/pricing",
            get(pricing_handler::<R>),
        )
        .route("/api/demo-providers", get(demo_providers_handler::<R>))
        .route(
            "/api/admin/providers/:provider_id/verification",
            put(verification_handler::<R>),
        )
        .with_state(service)
}

fn current_account<R>(
    service: &Arc<AccountService<R>>,
    headers: &HeaderMap,
) -> Result<AccountContext, AccountError>
where
    R: AccountRepository + 'static,
{
    let token = session_token(headers);
    service.authenticate(token.as_deref(), Utc::now())
}

fn session_cookie(value: &str, max_age: u64, config: &SessionConfig) -> Option<HeaderValue> {
    let secure = if config.secure_cookie { "; Secure" } else { "" };
    let cookie = format!(
        "{SESSION_COOKIE}={value}; HttpOnly; Path=/; Max-Age={max_age}; SameSite=Lax{secure}"
    );
    HeaderValue::from_str(&cookie).ok()
}

/// Runs password hashing and verification on the blocking pool.
async fn run_blocking<R, T, F>(service: &Arc<AccountService<R>>, work: F) -> Result<T, Response>
where
    R: AccountRepository + 'static,
    T: Send + 'static,
    F: FnOnce(&AccountService<R>) -> Result<T, AccountError> + Send + 'static,
{
    let service = Arc::clone(service);
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into_response()),
        Err(err) => {
            tracing::error!(error = %err, "password task failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::ServerError,
                "An error occurred while processing your request.",
            ))
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    #[serde(alias = "email", alias = "identifier")]
    pub username: String,
    pub password: String,
}

pub(crate) async fn register_user_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    Json(form): Json<UserRegistration>,
) -> Response
where
    R: AccountRepository + 'static,
{
    match run_blocking(&service, move |accounts| accounts.register_user(form, Utc::now())).await {
        Ok(user) => success_response(
            StatusCode::CREATED,
            "Account created successfully.",
            json!({ "user": user }),
        ),
        Err(response) => response,
    }
}

pub(crate) async fn register_provider_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    Json(form): Json<ProviderRegistration>,
) -> Response
where
    R: AccountRepository + 'static,
{
    match run_blocking(&service, move |accounts| accounts.register_provider(form, Utc::now())).await
    {
        Ok(listing) => success_response(
            StatusCode::CREATED,
            "Provider account created successfully.",
            json!({ "user": listing.user, "provider": listing.profile }),
        ),
        Err(response) => response,
    }
}

pub(crate) async fn login_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    Json(form): Json<LoginForm>,
) -> Response
where
    R: AccountRepository + 'static,
{
    let now = Utc::now();
    let LoginOutcome {
        token,
        expires_at,
        context,
    } = match run_blocking(&service, move |accounts| {
        accounts.login(&form.username, &form.password, now)
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };

    let max_age = (expires_at - now).num_seconds().max(0) as u64;
    let mut response = success_response(
        StatusCode::OK,
        "Logged in successfully.",
        json!({
            "token": token,
            "expires_at": expires_at,
            "user": context.user,
            "is_provider": context.is_provider(),
        }),
    );
    if let Some(cookie) = session_cookie(&token, max_age, service.session_config()) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

pub(crate) async fn logout_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: AccountRepository + 'static,
{
    if let Some(token) = session_token(&headers) {
        if let Err(err) = service.logout(&token) {
            return err.into_response();
        }
    }
    let mut response = success_response(StatusCode::OK, "Logged out successfully.", json!({}));
    if let Some(cookie) = session_cookie("", 0, service.session_config()) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

pub(crate) async fn user_profile_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: AccountRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|account| service.user_profile(&account));
    match result {
        Ok(profile) => (StatusCode::OK, Json(json!({ "status": "success", "profile": profile })))
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_user_profile_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    headers: HeaderMap,
    Json(update): Json<UserProfileUpdate>,
) -> Response
where
    R: AccountRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|account| service.update_user_profile(&account, update, Utc::now()));
    match result {
        Ok(profile) => success_response(
            StatusCode::OK,
            "Profile updated successfully.",
            json!({ "profile": profile }),
        ),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn provider_profile_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    headers: HeaderMap,
) -> Response
where
    R: AccountRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|account| service.provider_profile(&account));
    match result {
        Ok(profile) => (StatusCode::OK, Json(json!({ "status": "success", "profile": profile })))
            .into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_provider_profile_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    headers: HeaderMap,
    Json(update): Json<ProviderProfileUpdate>,
) -> Response
where
    R: AccountRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|account| service.update_provider_profile(&account, update, Utc::now()));
    match result {
        Ok(profile) => success_response(
            StatusCode::OK,
            "Provider profile updated successfully.",
            json!({ "profile": profile }),
        ),
        Err(err) => err.into_response(),
    }
}

/// Raw search parameters; each filter ignores values it cannot parse.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfessionalsQuery {
    #[serde(alias = "serviceType", alias = "service")]
    pub service_type: Option<String>,
    pub location: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub min_rating: Option<String>,
    pub min_experience: Option<String>,
    pub price_range: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub verified_only: Option<String>,
    pub min_reviews: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ProfessionalsQuery {
    fn verified_only(&self) -> bool {
        self.verified_only
            .as_deref()
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false)
    }
}

pub(crate) async fn professionals_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    Query(query): Query<ProfessionalsQuery>,
) -> Response
where
    R: AccountRepository + 'static,
{
    let filter = match service.professionals() {
        Ok(filter) => filter,
        Err(err) => return err.into_response(),
    };

    let (filter, region_message) = filter
        .apply_service_filter(query.service_type.as_deref())
        .apply_location_filter(
            query.location.as_deref(),
            query.city.as_deref(),
            query.state.as_deref(),
            query.region.as_deref(),
        );
    let filter = filter
        .apply_rating_filter(query.min_rating.as_deref())
        .apply_experience_filter(query.min_experience.as_deref())
        .apply_price_filter(
            query.price_range.as_deref(),
            query.min_price.as_deref(),
            query.max_price.as_deref(),
        )
        .apply_verified_filter(query.verified_only())
        .apply_review_count_filter(query.min_reviews.as_deref())
        .sort_by(query.sort.as_deref().unwrap_or("rating"));

    let (page, limit) = parse_page_request(query.page.as_deref(), query.limit.as_deref());
    let page = filter
        .paginate(page, limit)
        .map(|listing| ProfessionalSummary::from(&listing));

    let payload = ProfessionalsResponse {
        status: "success",
        professionals: page.items,
        pagination: PaginationView {
            page: page.page,
            limit: page.limit,
            total: page.total,
            pages: page.pages,
            has_next: page.has_next,
            has_prev: page.has_prev,
            offset: page.offset,
        },
        total_count: filter.count(),
        filters_applied: filter.filters_applied(),
        region_message,
        available_regions: filter.region_alternatives(),
    };
    (StatusCode::OK, Json(payload)).into_response()
}

/// Search results; field order follows the order filters were applied.
#[derive(Serialize)]
struct ProfessionalsResponse<'a> {
    status: &'static str,
    professionals: Vec<ProfessionalSummary>,
    pagination: PaginationView,
    total_count: usize,
    filters_applied: &'a AppliedFilters,
    region_message: Option<String>,
    available_regions: Vec<String>,
}

#[derive(Serialize)]
struct PaginationView {
    page: usize,
    limit: usize,
    total: usize,
    pages: usize,
    has_next: bool,
    has_prev: bool,
    offset: usize,
}

pub(crate) async fn pricing_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    PathParam(provider_id): PathParam<u64>,
    headers: HeaderMap,
) -> Response
where
    R: AccountRepository + 'static,
{
    let result = current_account(&service, &headers)
        .and_then(|_| service.provider_pricing(ProviderId(provider_id)));
    match result {
        Ok(pricing) => (StatusCode::OK, Json(json!({ "status": "success", "pricing": pricing })))
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DemoProvidersQuery {
    #[serde(rename = "serviceType", alias = "service_type")]
    pub service_type: Option<String>,
}

pub(crate) async fn demo_providers_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    Query(query): Query<DemoProvidersQuery>,
) -> Response
where
    R: AccountRepository + 'static,
{
    let service_type = query.service_type.unwrap_or_default();
    match service.demo_providers(service_type.trim()) {
        Ok(listings) => {
            let providers: Vec<ProfessionalSummary> =
                listings.iter().map(ProfessionalSummary::from).collect();
            let payload = json!({
                "status": "success",
                "count": providers.len(),
                "providers": providers,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VerificationUpdate {
    pub verified: bool,
}

pub(crate) async fn verification_handler<R>(
    State(service): State<Arc<AccountService<R>>>,
    PathParam(provider_id): PathParam<u64>,
    headers: HeaderMap,
    Json(update): Json<VerificationUpdate>,
) -> Response
where
    R: AccountRepository + 'static,
{
    let result = current_account(&service, &headers).and_then(|account| {
        service.verify_provider(&account, ProviderId(provider_id), update.verified, Utc::now())
    });
    match result {
        Ok(profile) => success_response(
            StatusCode::OK,
            "Provider verification updated.",
            json!({ "provider_id": profile.id, "is_verified": profile.is_verified }),
        ),
        Err(err) => err.into_response(),
    }
}
