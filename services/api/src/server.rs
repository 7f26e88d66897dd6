use crate::cli::ServeArgs;
use crate::demo::seed_marketplace;
use crate::infra::AppState;
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::{DateTime, Utc};
use locapro::config::AppConfig;
use locapro::error::AppError;
use locapro::marketplace::InMemoryMarketplace;
use locapro::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if args.seed_demo {
        config.workflow.seed_demo_data = true;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let marketplace = prepare_marketplace(&config, Utc::now())?;
    let app = with_marketplace_routes(&marketplace)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        email_backend = config.email.backend.label(),
        site_url = %config.email.site_url,
        "locapro marketplace ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the marketplace, then applies the configured staff account and demo data.
pub(crate) fn prepare_marketplace(
    config: &AppConfig,
    now: DateTime<Utc>,
) -> Result<InMemoryMarketplace, AppError> {
    let marketplace = InMemoryMarketplace::in_memory(&config.email, config.session, config.workflow)?;
    if let Some(admin) = &config.admin {
        let account = marketplace.accounts.bootstrap_staff(admin, now)?;
        info!(user_id = %account.id, username = %account.username, "staff account ready");
    }
    if config.workflow.seed_demo_data {
        seed_marketplace(&marketplace, now)?;
    }
    Ok(marketplace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use locapro::config::{
        AdminConfig, AppEnvironment, EmailConfig, ServerConfig, SessionConfig, TelemetryConfig,
        WorkflowConfig,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn config(admin: Option<AdminConfig>) -> AppConfig {
        AppConfig {
            environment: AppEnvironment::Test,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_spans: false,
            },
            email: EmailConfig::local("http://localhost:8000"),
            session: SessionConfig::default(),
            workflow: WorkflowConfig {
                seed_demo_data: true,
                ..WorkflowConfig::default()
            },
            admin,
        }
    }

    async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn configured_admin_can_verify_providers() {
        let admin = AdminConfig {
            username: "siteadmin".to_string(),
            email: Some("admin@locapro.test".to_string()),
            password: "Str0ng-admin-pass".to_string(),
        };
        let marketplace = prepare_marketplace(&config(Some(admin)), Utc::now()).expect("marketplace");
        let app = with_marketplace_routes(&marketplace);

        let (status, login) = send(
            &app,
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "username": "siteadmin", "password": "Str0ng-admin-pass" }).to_string(),
                ))
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = login["token"].as_str().expect("session token").to_string();

        let (status, listing) = send(
            &app,
            Request::get("/api/demo-providers?serviceType=plumbing")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let provider_id = listing["providers"][0]["id"].as_u64().expect("provider id");

        let (status, body) = send(
            &app,
            Request::put(format!("/api/admin/providers/{provider_id}/verification"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(json!({ "verified": false }).to_string()))
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_verified"], false);
    }

    #[test]
    fn without_admin_config_no_staff_account_exists() {
        let marketplace = prepare_marketplace(&config(None), Utc::now()).expect("marketplace");
        let err = marketplace
            .accounts
            .login("siteadmin", "Str0ng-admin-pass", Utc::now())
            .unwrap_err();
        assert!(matches!(err, locapro::accounts::AccountError::InvalidCredentials));
    }
}
