use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::body::to_bytes;
use axum::http::HeaderValue;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::accounts::{
    AccountContext, AccountService, ProviderProfileUpdate, ProviderRegistration,
    UserProfileUpdate, UserRegistration,
};
use crate::config::{EmailConfig, SessionConfig, WorkflowConfig};
use crate::email::{EmailDispatcher, Mailer, MemoryMailer, RetryPolicy};
use crate::infra::{InMemoryAccountRepository, InMemoryRequestRepository};
use crate::requests::{PriceRange, RequestForm, RequestService};

pub(super) type TestService = RequestService<InMemoryAccountRepository, InMemoryRequestRepository>;

pub(super) const SITE_URL: &str = "http://testserver";
pub(super) const PASSWORD: &str = "s3cure-pass";

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
}

pub(super) struct Fixture {
    pub(super) service: Arc<TestService>,
    pub(super) mailbox: Arc<MemoryMailer>,
    pub(super) customer: AccountContext,
    pub(super) provider: AccountContext,
    pub(super) rival: AccountContext,
    pub(super) budget: PriceRange,
    pub(super) now: DateTime<Utc>,
}

impl Fixture {
    /// A customer in 62701, "Pipe Masters" in 62711 sharing its location, and a
    /// rival electrician without coordinates.
    pub(super) fn build(now: DateTime<Utc>) -> Self {
        Self::with_workflow(now, WorkflowConfig::default())
    }

    pub(super) fn with_workflow(now: DateTime<Utc>, workflow: WorkflowConfig) -> Self {
        let mailbox = Arc::new(MemoryMailer::new());
        let transport: Arc<dyn Mailer> = mailbox.clone();
        let dispatcher = EmailDispatcher::new(
            transport,
            RetryPolicy::new(1, StdDuration::ZERO),
            &EmailConfig::local(SITE_URL),
        );

        let accounts = Arc::new(AccountService::new(
            Arc::new(InMemoryAccountRepository::default()),
            SessionConfig::default(),
        ));
        let service = Arc::new(RequestService::new(
            Arc::clone(&accounts),
            Arc::new(InMemoryRequestRepository::default()),
            dispatcher,
            workflow,
        ));

        accounts
            .register_user(registration("alice", "alice@example.com", "Alice", "Ngo"), now)
            .expect("customer registers");
        let customer = login(&accounts, "alice", now);
        accounts
            .update_user_profile(
                &customer,
                UserProfileUpdate {
                    phone: Some("555-0199".to_string()),
                    address: Some("12 Elm Street".to_string()),
                    city: Some("Springfield".to_string()),
                    state: Some("IL".to_string()),
                    zip_code: Some("62701".to_string()),
                    ..UserProfileUpdate::default()
                },
                now,
            )
            .expect("customer profile");

        accounts
            .register_provider(
                provider_form("pipepro", "pipes@example.com", "Pipe Masters", "plumbing"),
                now,
            )
            .expect("provider registers");
        let provider = login(&accounts, "pipepro", now);
        accounts
            .update_provider_profile(
                &provider,
                ProviderProfileUpdate {
                    phone: Some("555-0100".to_string()),
                    min_price: Some(80.0),
                    max_price: Some(240.0),
                    latitude: Some(39.7817),
                    longitude: Some(-89.6501),
                    ..ProviderProfileUpdate::default()
                },
                now,
            )
            .expect("provider profile");
        let provider = login(&accounts, "pipepro", now);

        accounts
            .register_provider(
                provider_form("sparky", "sparky@example.com", "Sparky Electric", "electrical"),
                now,
            )
            .expect("rival registers");
        let rival = login(&accounts, "sparky", now);

        let budget = service
            .add_price_range("$100 - $200", 100, Some(200))
            .expect("price range");

        Self {
            service,
            mailbox,
            customer,
            provider,
            rival,
            budget,
            now,
        }
    }

    pub(super) fn accounts(&self) -> &Arc<AccountService<InMemoryAccountRepository>> {
        self.service.accounts()
    }

    /// Pending request from the customer to "Pipe Masters".
    pub(super) fn request_form(&self) -> RequestForm {
        RequestForm {
            provider_id: self.provider.provider.as_ref().map(|profile| profile.id),
            description: "Kitchen sink is leaking under the cabinet".to_string(),
            date_time: Some("2025-05-03T10:30".to_string()),
            price_range: Some(self.budget.id),
            offered_price: Some(120.0),
            ..RequestForm::default()
        }
    }

    pub(super) fn session_for(&self, username: &str) -> String {
        self.accounts()
            .login(username, PASSWORD, self.now)
            .expect("login")
            .token
    }
}

pub(super) fn registration(username: &str, email: &str, first: &str, last: &str) -> UserRegistration {
    UserRegistration {
        username: username.to_string(),
        email: Some(email.to_string()),
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        password1: PASSWORD.to_string(),
        password2: PASSWORD.to_string(),
    }
}

fn provider_form(username: &str, email: &str, company: &str, service: &str) -> ProviderRegistration {
    ProviderRegistration {
        account: registration(username, email, "Sam", "Rivera"),
        company_name: Some(company.to_string()),
        service_type: Some(service.to_string()),
        phone: None,
        business_address: Some("400 Main Street".to_string()),
        city: Some("Springfield".to_string()),
        state: Some("IL".to_string()),
        zip_code: Some("62711".to_string()),
        bio: None,
        years_experience: Some(6),
    }
}

fn login(
    accounts: &AccountService<InMemoryAccountRepository>,
    username: &str,
    now: DateTime<Utc>,
) -> AccountContext {
    accounts
        .login(username, PASSWORD, now)
        .expect("login succeeds")
        .context
}

pub(super) fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("header value")
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
