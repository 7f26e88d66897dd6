use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AccountContext, ProviderId, ProviderListing, ProviderProfile, ServiceRate, ServiceType,
    Session, UserAccount, UserId, UserProfile,
};
use super::filter::ProfessionalFilter;
use super::password::{hash_password, verify_password, PasswordError, MIN_PASSWORD_LENGTH};
use super::repository::AccountRepository;
use crate::config::{AdminConfig, SessionConfig};
use crate::error::RepositoryError;
use crate::http::{error_response, validation_response, ErrorCode};
use crate::tokens::{generate_secure_token, token_digest};
use crate::validation::{clean_text, looks_like_email, ValidationErrors};

pub const DEMO_USERNAME_PREFIX: &str = "demo_pro_";
const MAX_USERNAME_LENGTH: usize = 150;
const MAX_SESSION_AGE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Customer sign-up form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserRegistration {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(alias = "password")]
    pub password1: String,
    #[serde(alias = "confirm_password")]
    pub password2: String,
}

/// Provider sign-up form: the account fields plus the business profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderRegistration {
    #[serde(flatten)]
    pub account: UserRegistration,
    pub company_name: Option<String>,
    pub service_type: Option<String>,
    pub phone: Option<String>,
    pub business_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub bio: Option<String>,
    pub years_experience: Option<i64>,
}

/// Partial update of the caller's account and contact profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

/// Partial update of the caller's provider profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderProfileUpdate {
    pub company_name: Option<String>,
    pub service_type: Option<String>,
    pub phone: Option<String>,
    pub business_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub service_description: Option<String>,
    pub bio: Option<String>,
    pub years_experience: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub service_rate: Option<ServiceRate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Catalogue entry for a seeded demo provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoProviderSeed {
    pub owner: String,
    pub service_type: ServiceType,
    pub region: String,
    pub years_experience: u32,
    pub rating: f32,
    pub total_reviews: u32,
    pub phone: String,
}

impl DemoProviderSeed {
    pub fn username(&self) -> String {
        format!("{DEMO_USERNAME_PREFIX}{}_{}", self.service_type.code(), self.region)
            .replace(' ', "_")
            .to_lowercase()
    }

    pub fn company_name(&self) -> String {
        format!("{} Services", self.owner)
    }
}

/// Account plus contact details as returned by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfileView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub is_provider: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderPricing {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub min_price: f64,
    pub max_price: Option<f64>,
    pub average_price: f64,
    pub service_rate: ServiceRate,
    pub currency: &'static str,
}

/// Freshly issued session. The raw token is only available here.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub context: AccountContext,
}

/// Registration, sessions and profile management.
pub struct AccountService<R> {
    repository: Arc<R>,
    session: SessionConfig,
    user_sequence: AtomicU64,
    provider_sequence: AtomicU64,
}

impl<R> AccountService<R>
where
    R: AccountRepository + 'static,
{
    pub fn new(repository: Arc<R>, session: SessionConfig) -> Self {
        Self {
            repository,
            session,
            user_sequence: AtomicU64::new(1),
            provider_sequence: AtomicU64::new(1),
        }
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    pub fn register_user(
        &self,
        form: UserRegistration,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, AccountError> {
        let mut errors = ValidationErrors::new();
        let draft = self.validate_registration(&form, &mut errors)?;
        errors.into_result()?;

        let user = self.create_account(draft, now)?;
        self.repository
            .save_user_profile(UserProfile::empty(user.id, now))?;
        tracing::info!(user_id = %user.id, username = %user.username, "customer registered");
        Ok(user)
    }

    pub fn register_provider(
        &self,
        form: ProviderRegistration,
        now: DateTime<Utc>,
    ) -> Result<ProviderListing, AccountError> {
        let mut errors = ValidationErrors::new();
        let draft = self.validate_registration(&form.account, &mut errors)?;

        let service_type = match clean_text(form.service_type.as_deref()) {
            None => ServiceType::Other,
            Some(code) => ServiceType::from_code(&code).unwrap_or_else(|| {
                errors.add("service_type", format!("Select a valid choice. {code} is not one of the available choices."));
                ServiceType::Other
            }),
        };
        let years_experience = match form.years_experience {
            Some(years) if years < 0 => {
                errors.add("years_experience", "Years of experience can't be negative");
                0
            }
            Some(years) => u32::try_from(years).unwrap_or(u32::MAX),
            None => 0,
        };
        errors.into_result()?;

        let user = self.create_account(draft, now)?;
        let mut profile = ProviderProfile::new(self.next_provider_id(), user.id, now);
        profile.company_name = clean_text(form.company_name.as_deref()).unwrap_or_default();
        profile.service_type = service_type;
        profile.phone = clean_text(form.phone.as_deref()).unwrap_or_default();
        profile.business_address = clean_text(form.business_address.as_deref()).unwrap_or_default();
        profile.city = clean_text(form.city.as_deref()).unwrap_or_default();
        profile.state = clean_text(form.state.as_deref()).unwrap_or_default();
        profile.zip_code = clean_text(form.zip_code.as_deref()).unwrap_or_default();
        profile.bio = clean_text(form.bio.as_deref()).unwrap_or_default();
        profile.years_experience = years_experience;

        let profile = self.repository.insert_provider(profile)?;
        tracing::info!(
            user_id = %user.id,
            provider_id = %profile.id,
            service_type = profile.service_type.code(),
            "provider registered"
        );
        Ok(ProviderListing { profile, user })
    }

    /// Grant staff rights to an existing account.
    pub fn grant_staff(&self, user_id: UserId) -> Result<UserAccount, AccountError> {
        let mut user = self.user(user_id)?;
        user.is_staff = true;
        self.repository.update_user(user.clone())?;
        tracing::info!(user_id = %user.id, "staff access granted");
        Ok(user)
    }

    /// Ensure the configured administrator exists and holds staff rights.
    ///
    /// An existing account keeps its password and only gains staff access.
    pub fn bootstrap_staff(
        &self,
        admin: &AdminConfig,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, AccountError> {
        let user = match self.repository.user_by_username(&admin.username)? {
            Some(user) => user,
            None => self.register_user(
                UserRegistration {
                    username: admin.username.clone(),
                    email: admin.email.clone(),
                    first_name: None,
                    last_name: None,
                    password1: admin.password.clone(),
                    password2: admin.password.clone(),
                },
                now,
            )?,
        };
        if user.is_staff {
            return Ok(user);
        }
        self.grant_staff(user.id)
    }

    pub fn login(
        &self,
        identifier: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginOutcome, AccountError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidCredentials);
        }

        let user = match self.repository.user_by_username(identifier)? {
            Some(user) => Some(user),
            None if identifier.contains('@') => self.repository.user_by_email(identifier)?,
            None => None,
        };

        let user = match user {
            Some(user) if user.is_active && verify_password(password, &user.password_hash) => user,
            _ => {
                tracing::warn!(identifier, "login rejected");
                return Err(AccountError::InvalidCredentials);
            }
        };

        let token = generate_secure_token();
        let age = self.session.cookie_age_secs.min(MAX_SESSION_AGE_SECS);
        let expires_at = now + Duration::seconds(age as i64);
        self.repository.insert_session(Session {
            token_digest: token_digest(&token),
            user_id: user.id,
            created_at: now,
            expires_at,
        })?;

        let context = self.context_for(user)?;
        tracing::info!(user_id = %context.user_id(), "session opened");
        Ok(LoginOutcome {
            token,
            expires_at,
            context,
        })
    }

    pub fn logout(&self, token: &str) -> Result<(), AccountError> {
        self.repository.remove_session(&token_digest(token))?;
        Ok(())
    }

    pub fn authenticate(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AccountContext, AccountError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AccountError::Unauthenticated)?;
        let digest = token_digest(token);
        let session = self
            .repository
            .session(&digest)?
            .ok_or(AccountError::Unauthenticated)?;

        if session.is_expired(now) {
            self.repository.remove_session(&digest)?;
            tracing::debug!(user_id = %session.user_id, "expired session discarded");
            return Err(AccountError::Unauthenticated);
        }

        match self.repository.user(session.user_id)? {
            Some(user) if user.is_active => self.context_for(user),
            _ => Err(AccountError::Unauthenticated),
        }
    }

    pub fn user(&self, user_id: UserId) -> Result<UserAccount, AccountError> {
        self.repository
            .user(user_id)?
            .ok_or(AccountError::NotFound("user"))
    }

    pub fn user_profile(&self, account: &AccountContext) -> Result<UserProfileView, AccountError> {
        let profile = self
            .repository
            .user_profile(account.user_id())?
            .unwrap_or_else(|| UserProfile::empty(account.user_id(), account.user.date_joined));
        Ok(profile_view(account, &profile))
    }

    pub fn update_user_profile(
        &self,
        account: &AccountContext,
        update: UserProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<UserProfileView, AccountError> {
        let mut user = self.user(account.user_id())?;
        let mut profile = self
            .repository
            .user_profile(user.id)?
            .unwrap_or_else(|| UserProfile::empty(user.id, now));

        if let Some(email) = update.email.as_deref().map(str::trim) {
            let mut errors = ValidationErrors::new();
            if !email.is_empty() && !looks_like_email(email) {
                errors.add("email", "Enter a valid email address.");
            } else if !email.is_empty()
                && !email.eq_ignore_ascii_case(&user.email)
                && self.repository.user_by_email(email)?.is_some()
            {
                errors.add("email", "A user with that email already exists.");
            }
            errors.into_result()?;
            user.email = email.to_string();
        }
        assign(&mut user.first_name, update.first_name);
        assign(&mut user.last_name, update.last_name);
        assign(&mut profile.phone, update.phone);
        assign(&mut profile.address, update.address);
        assign(&mut profile.city, update.city);
        assign(&mut profile.state, update.state);
        assign(&mut profile.zip_code, update.zip_code);
        profile.updated_at = now;

        self.repository.update_user(user.clone())?;
        self.repository.save_user_profile(profile.clone())?;

        let account = AccountContext {
            user,
            provider: account.provider.clone(),
        };
        Ok(profile_view(&account, &profile))
    }

    pub fn provider_profile(
        &self,
        account: &AccountContext,
    ) -> Result<ProviderProfile, AccountError> {
        self.repository
            .provider_for_user(account.user_id())?
            .ok_or(AccountError::ProviderRequired)
    }

    pub fn update_provider_profile(
        &self,
        account: &AccountContext,
        update: ProviderProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<ProviderProfile, AccountError> {
        let mut profile = self.provider_profile(account)?;
        let mut errors = ValidationErrors::new();

        if let Some(code) = clean_text(update.service_type.as_deref()) {
            match ServiceType::from_code(&code) {
                Some(service) => profile.service_type = service,
                None => errors.add(
                    "service_type",
                    format!("Select a valid choice. {code} is not one of the available choices."),
                ),
            }
        }
        if let Some(years) = update.years_experience {
            if years < 0 {
                errors.add("years_experience", "Years of experience can't be negative");
            } else {
                profile.years_experience = u32::try_from(years).unwrap_or(u32::MAX);
            }
        }
        if let Some(min) = update.min_price {
            if min < 0.0 {
                errors.add("min_price", "Ensure this value is greater than or equal to 0.");
            } else {
                profile.min_price = min;
            }
        }
        if let Some(max) = update.max_price {
            if max < 0.0 {
                errors.add("max_price", "Ensure this value is greater than or equal to 0.");
            } else {
                profile.max_price = Some(max);
            }
        }
        if let Some(max) = profile.max_price {
            if max < profile.min_price && !errors.contains("min_price") {
                errors.add("max_price", "Maximum price must be greater than or equal to minimum price.");
            }
        }
        if let Some(latitude) = update.latitude {
            if (-90.0..=90.0).contains(&latitude) {
                profile.latitude = Some(latitude);
            } else {
                errors.add("latitude", "Latitude must be between -90 and 90.");
            }
        }
        if let Some(longitude) = update.longitude {
            if (-180.0..=180.0).contains(&longitude) {
                profile.longitude = Some(longitude);
            } else {
                errors.add("longitude", "Longitude must be between -180 and 180.");
            }
        }
        errors.into_result()?;

        assign(&mut profile.company_name, update.company_name);
        assign(&mut profile.phone, update.phone);
        assign(&mut profile.business_address, update.business_address);
        assign(&mut profile.city, update.city);
        assign(&mut profile.state, update.state);
        assign(&mut profile.zip_code, update.zip_code);
        assign(&mut profile.service_description, update.service_description);
        assign(&mut profile.bio, update.bio);
        if let Some(rate) = update.service_rate {
            profile.service_rate = rate;
        }
        profile.updated_at = now;

        self.repository.update_provider(profile.clone())?;
        tracing::info!(provider_id = %profile.id, "provider profile updated");
        Ok(profile)
    }

    pub fn provider_listing(&self, provider_id: ProviderId) -> Result<ProviderListing, AccountError> {
        let profile = self
            .repository
            .provider(provider_id)?
            .ok_or(AccountError::NotFound("provider"))?;
        let user = self.user(profile.user_id)?;
        Ok(ProviderListing { profile, user })
    }

    /// Provider profile owned by `user_id`, if that account is a provider.
    pub fn provider_for_user(&self, user_id: UserId) -> Result<Option<ProviderProfile>, AccountError> {
        Ok(self.repository.provider_for_user(user_id)?)
    }

    pub fn user_profile_for(&self, user_id: UserId) -> Result<Option<UserProfile>, AccountError> {
        Ok(self.repository.user_profile(user_id)?)
    }

    /// Filter over every active provider, ready for chaining.
    pub fn professionals(&self) -> Result<ProfessionalFilter, AccountError> {
        Ok(ProfessionalFilter::new(self.repository.provider_listings()?))
    }

    pub fn provider_pricing(&self, provider_id: ProviderId) -> Result<ProviderPricing, AccountError> {
        let listing = self.provider_listing(provider_id)?;
        let profile = &listing.profile;
        let average_price = match profile.max_price {
            Some(max) => (profile.min_price + max) / 2.0,
            None => profile.min_price,
        };
        let provider_name = if profile.company_name.trim().is_empty() {
            listing.user.full_name()
        } else {
            profile.company_name.clone()
        };

        Ok(ProviderPricing {
            provider_id: profile.id,
            provider_name,
            min_price: profile.min_price,
            max_price: profile.max_price,
            average_price,
            service_rate: profile.service_rate,
            currency: "USD",
        })
    }

    pub fn verify_provider(
        &self,
        account: &AccountContext,
        provider_id: ProviderId,
        verified: bool,
        now: DateTime<Utc>,
    ) -> Result<ProviderProfile, AccountError> {
        if !account.user.is_staff {
            tracing::warn!(user_id = %account.user_id(), %provider_id, "verification change refused");
            return Err(AccountError::StaffRequired);
        }
        let mut profile = self
            .repository
            .provider(provider_id)?
            .ok_or(AccountError::NotFound("provider"))?;
        profile.is_verified = verified;
        profile.updated_at = now;
        self.repository.update_provider(profile.clone())?;
        tracing::info!(%provider_id, verified, staff_id = %account.user_id(), "provider verification updated");
        Ok(profile)
    }

    /// Seeded demo providers offering `service_type`.
    pub fn demo_providers(&self, service_type: &str) -> Result<Vec<ProviderListing>, AccountError> {
        let Some(service) = ServiceType::from_code(service_type) else {
            return Ok(Vec::new());
        };
        let listings = self.repository.provider_listings()?;
        Ok(listings
            .into_iter()
            .filter(|listing| {
                listing.user.username.starts_with(DEMO_USERNAME_PREFIX)
                    && listing.profile.service_type == service
            })
            .collect())
    }

    /// Create or refresh one demo listing. Seeded accounts get an unusable random password.
    pub fn seed_demo_provider(
        &self,
        seed: &DemoProviderSeed,
        now: DateTime<Utc>,
    ) -> Result<ProviderListing, AccountError> {
        let username = seed.username();
        let user = match self.repository.user_by_username(&username)? {
            Some(user) => user,
            None => {
                let (first_name, last_name) = seed
                    .owner
                    .split_once(' ')
                    .unwrap_or((seed.owner.as_str(), ""));
                self.create_account(
                    AccountDraft {
                        username,
                        email: String::new(),
                        first_name: first_name.to_string(),
                        last_name: last_name.to_string(),
                        password: generate_secure_token(),
                    },
                    now,
                )?
            }
        };

        let existing = self.repository.provider_for_user(user.id)?;
        let mut profile = existing
            .clone()
            .unwrap_or_else(|| ProviderProfile::new(self.next_provider_id(), user.id, now));
        profile.company_name = seed.company_name();
        profile.service_type = seed.service_type;
        profile.phone = seed.phone.clone();
        profile.business_address = format!("{} Region", seed.region);
        profile.city = seed.region.clone();
        profile.state = seed.region.clone();
        profile.service_description = format!(
            "Expert in {} with {} years experience.",
            seed.service_type.code(),
            seed.years_experience
        );
        profile.bio = format!(
            "{} has been providing {} services in {} for {} years.",
            seed.owner,
            seed.service_type.code(),
            seed.region,
            seed.years_experience
        );
        profile.years_experience = seed.years_experience;
        profile.rating = seed.rating.clamp(0.0, 5.0);
        profile.total_reviews = seed.total_reviews;
        profile.is_verified = true;
        profile.updated_at = now;

        let profile = if existing.is_some() {
            self.repository.update_provider(profile.clone())?;
            profile
        } else {
            self.repository.insert_provider(profile)?
        };
        tracing::debug!(provider_id = %profile.id, username = %user.username, "demo provider seeded");
        Ok(ProviderListing { profile, user })
    }

    /// Resolve a free-text provider name to a contact address.
    ///
    /// Tried in order: exact company name, company name substring, then the owner's
    /// first or last name.
    pub fn find_provider_email_by_name(&self, name: &str) -> Result<Option<String>, AccountError> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let listings = self.repository.provider_listings()?;
        let strategies: [fn(&ProviderListing, &str) -> bool; 3] =
            [company_is, company_contains, owner_name_contains];

        let found = strategies.iter().find_map(|matches| {
            listings
                .iter()
                .find(|listing| matches(listing, &needle) && !listing.user.email.trim().is_empty())
        });
        Ok(found.map(|listing| listing.user.email.clone()))
    }

    fn validate_registration(
        &self,
        form: &UserRegistration,
        errors: &mut ValidationErrors,
    ) -> Result<AccountDraft, AccountError> {
        let username = form.username.trim().to_string();
        if username.is_empty() {
            errors.add("username", "This field is required.");
        } else if username.chars().count() > MAX_USERNAME_LENGTH {
            errors.add("username", "Ensure this value has at most 150 characters.");
        } else if !username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
        {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if self.repository.user_by_username(&username)?.is_some() {
            errors.add("username", "A user with that username already exists.");
        }

        let email = clean_text(form.email.as_deref()).unwrap_or_default();
        if !email.is_empty() {
            if !looks_like_email(&email) {
                errors.add("email", "Enter a valid email address.");
            } else if self.repository.user_by_email(&email)?.is_some() {
                errors.add("email", "A user with that email already exists.");
            }
        }

        if form.password1.is_empty() {
            errors.add("password1", "This field is required.");
        } else if form.password1 != form.password2 {
            errors.add("password2", "Passwords do not match");
        } else if form.password1.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add(
                "password1",
                "This password is too short. It must contain at least 8 characters.",
            );
        }

        Ok(AccountDraft {
            username,
            email,
            first_name: clean_text(form.first_name.as_deref()).unwrap_or_default(),
            last_name: clean_text(form.last_name.as_deref()).unwrap_or_default(),
            password: form.password1.clone(),
        })
    }

    fn create_account(&self, draft: AccountDraft, now: DateTime<Utc>) -> Result<UserAccount, AccountError> {
        let password_hash = hash_password(&draft.password)?;
        let user = UserAccount {
            id: self.next_user_id(),
            username: draft.username,
            email: draft.email,
            first_name: draft.first_name,
            last_name: draft.last_name,
            password_hash,
            is_active: true,
            is_staff: false,
            date_joined: now,
        };

        match self.repository.insert_user(user) {
            Ok(user) => Ok(user),
            Err(RepositoryError::Conflict) => Err(AccountError::Validation(ValidationErrors::single(
                "username",
                "A user with that username already exists.",
            ))),
            Err(other) => Err(other.into()),
        }
    }

    fn context_for(&self, user: UserAccount) -> Result<AccountContext, AccountError> {
        let provider = self.repository.provider_for_user(user.id)?;
        Ok(AccountContext { user, provider })
    }

    fn next_user_id(&self) -> UserId {
        UserId(self.user_sequence.fetch_add(1, Ordering::Relaxed))
    }

    fn next_provider_id(&self) -> ProviderId {
        ProviderId(self.provider_sequence.fetch_add(1, Ordering::Relaxed))
    }
}

fn company_is(listing: &ProviderListing, needle: &str) -> bool {
    listing.profile.company_name.to_lowercase() == needle
}

fn company_contains(listing: &ProviderListing, needle: &str) -> bool {
    listing.profile.company_name.to_lowercase().contains(needle)
}

fn owner_name_contains(listing: &ProviderListing, needle: &str) -> bool {
    listing.user.first_name.to_lowercase().contains(needle)
        || listing.user.last_name.to_lowercase().contains(needle)
}

struct AccountDraft {
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    password: String,
}

fn assign(field: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *field = value.trim().to_string();
    }
}

fn profile_view(account: &AccountContext, profile: &UserProfile) -> UserProfileView {
    let user = &account.user;
    UserProfileView {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        phone: profile.phone.clone(),
        address: profile.address.clone(),
        city: profile.city.clone(),
        state: profile.state.clone(),
        zip_code: profile.zip_code.clone(),
        is_provider: account.is_provider(),
        date_joined: user.date_joined,
    }
}

/// Error raised by the account service.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("invalid username/email or password")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthenticated,
    #[error("provider profile required")]
    ProviderRequired,
    #[error("staff access required")]
    StaffRequired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ValidationErrors> for AccountError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        match self {
            AccountError::Validation(errors) => validation_response(&errors),
            AccountError::InvalidCredentials => error_response(
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthorized,
                "Invalid username/email or password.",
            ),
            AccountError::Unauthenticated => error_response(
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthorized,
                "Authentication required.",
            ),
            AccountError::ProviderRequired => error_response(
                StatusCode::FORBIDDEN,
                ErrorCode::Forbidden,
                "Provider profile not found.",
            ),
            AccountError::StaffRequired => error_response(
                StatusCode::FORBIDDEN,
                ErrorCode::Forbidden,
                "Staff access required.",
            ),
            AccountError::NotFound(what) => error_response(
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
                format!("{} not found.", capitalize(what)),
            ),
            AccountError::Repository(RepositoryError::NotFound) => {
                error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Not found.")
            }
            other => {
                tracing::error!(error = %other, "account operation failed");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::ServerError,
                    "An unexpected error occurred.",
                )
            }
        }
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::InMemoryAccountRepository;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn service() -> AccountService<InMemoryAccountRepository> {
        AccountService::new(
            Arc::new(InMemoryAccountRepository::default()),
            SessionConfig::default(),
        )
    }

    fn registration(username: &str, email: &str) -> UserRegistration {
        UserRegistration {
            username: username.to_string(),
            email: Some(email.to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            password1: "s3cure-pass".to_string(),
            password2: "s3cure-pass".to_string(),
        }
    }

    fn provider_form(username: &str, company: &str) -> ProviderRegistration {
        ProviderRegistration {
            account: registration(username, &format!("{username}@example.com")),
            company_name: Some(company.to_string()),
            service_type: Some("plumbing".to_string()),
            city: Some("Springfield".to_string()),
            state: Some("IL".to_string()),
            zip_code: Some("62701".to_string()),
            years_experience: Some(6),
            ..ProviderRegistration::default()
        }
    }

    #[test]
    fn registration_rejects_duplicates_and_password_mismatch() {
        let service = service();
        service
            .register_user(registration("ada", "ada@example.com"), now())
            .expect("first registration");

        let mut form = registration("ADA", "ADA@example.com");
        form.password2 = "different-pass".to_string();
        let err = service.register_user(form, now()).unwrap_err();
        let AccountError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.contains("username"));
        assert!(errors.contains("email"));
        assert_eq!(errors.messages("password2"), ["Passwords do not match"]);
    }

    #[test]
    fn short_passwords_are_rejected() {
        let mut form = registration("grace", "grace@example.com");
        form.password1 = "short".to_string();
        form.password2 = "short".to_string();
        let err = service().register_user(form, now()).unwrap_err();
        assert!(matches!(err, AccountError::Validation(ref e) if e.contains("password1")));
    }

    #[test]
    fn provider_registration_validates_experience_and_service() {
        let service = service();
        let mut form = provider_form("pipes", "Pipe Co");
        form.years_experience = Some(-1);
        form.service_type = Some("astrology".to_string());
        let err = service.register_provider(form, now()).unwrap_err();
        let AccountError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains("years_experience"));
        assert!(errors.contains("service_type"));

        let listing = service
            .register_provider(provider_form("pipes", "Pipe Co"), now())
            .expect("valid provider");
        assert_eq!(listing.profile.service_type, ServiceType::Plumbing);
        assert_eq!(listing.profile.min_price, ProviderProfile::DEFAULT_MIN_PRICE);
        assert_eq!(listing.profile.rating, ProviderProfile::DEFAULT_RATING);
    }

    #[test]
    fn login_accepts_username_or_email_and_sessions_expire() {
        let service = service();
        service
            .register_user(registration("ada", "ada@example.com"), now())
            .expect("register");

        let by_email = service
            .login("ADA@example.com", "s3cure-pass", now())
            .expect("login by email");
        assert_eq!(by_email.context.user.username, "ada");
        assert!(!by_email.context.is_provider());

        let outcome = service.login("ada", "s3cure-pass", now()).expect("login");
        let context = service
            .authenticate(Some(&outcome.token), now())
            .expect("live session");
        assert_eq!(context.user.username, "ada");

        let later = outcome.expires_at + Duration::seconds(1);
        assert!(matches!(
            service.authenticate(Some(&outcome.token), later),
            Err(AccountError::Unauthenticated)
        ));
        assert!(matches!(
            service.authenticate(Some(&outcome.token), now()),
            Err(AccountError::Unauthenticated)
        ));
    }

    #[test]
    fn bad_password_and_inactive_accounts_share_an_error() {
        let service = service();
        let user = service
            .register_user(registration("ada", "ada@example.com"), now())
            .expect("register");
        assert!(matches!(
            service.login("ada", "wrong-password", now()),
            Err(AccountError::InvalidCredentials)
        ));

        let mut inactive = service.user(user.id).expect("user");
        inactive.is_active = false;
        service.repository.update_user(inactive).expect("update");
        assert!(matches!(
            service.login("ada", "s3cure-pass", now()),
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn logout_is_idempotent() {
        let service = service();
        service
            .register_user(registration("ada", "ada@example.com"), now())
            .expect("register");
        let outcome = service.login("ada", "s3cure-pass", now()).expect("login");
        service.logout(&outcome.token).expect("logout");
        service.logout(&outcome.token).expect("second logout");
        assert!(service.authenticate(Some(&outcome.token), now()).is_err());
    }

    #[test]
    fn provider_profile_update_enforces_price_and_coordinate_bounds() {
        let service = service();
        service
            .register_provider(provider_form("pipes", "Pipe Co"), now())
            .expect("provider");
        let context = service
            .login("pipes", "s3cure-pass", now())
            .expect("login")
            .context;

        let err = service
            .update_provider_profile(
                &context,
                ProviderProfileUpdate {
                    min_price: Some(100.0),
                    max_price: Some(80.0),
                    latitude: Some(91.0),
                    ..ProviderProfileUpdate::default()
                },
                now(),
            )
            .unwrap_err();
        let AccountError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains("max_price"));
        assert!(errors.contains("latitude"));

        let updated = service
            .update_provider_profile(
                &context,
                ProviderProfileUpdate {
                    min_price: Some(80.0),
                    max_price: Some(120.0),
                    latitude: Some(39.78),
                    longitude: Some(-89.65),
                    ..ProviderProfileUpdate::default()
                },
                now(),
            )
            .expect("valid update");
        assert_eq!(updated.coordinates(), Some((39.78, -89.65)));

        let pricing = service.provider_pricing(updated.id).expect("pricing");
        assert_eq!(pricing.average_price, 100.0);
        assert_eq!(pricing.currency, "USD");
        assert_eq!(pricing.provider_name, "Pipe Co");
    }

    #[test]
    fn customers_have_no_provider_profile() {
        let service = service();
        service
            .register_user(registration("ada", "ada@example.com"), now())
            .expect("register");
        let context = service.login("ada", "s3cure-pass", now()).expect("login").context;
        assert!(matches!(
            service.provider_profile(&context),
            Err(AccountError::ProviderRequired)
        ));

        let view = service
            .update_user_profile(
                &context,
                UserProfileUpdate {
                    city: Some("  Springfield ".to_string()),
                    zip_code: Some("62704".to_string()),
                    ..UserProfileUpdate::default()
                },
                now(),
            )
            .expect("profile update");
        assert_eq!(view.city, "Springfield");
        assert_eq!(view.zip_code, "62704");
    }

    #[test]
    fn verification_requires_staff() {
        let service = service();
        let listing = service
            .register_provider(provider_form("pipes", "Pipe Co"), now())
            .expect("provider");
        let customer = service
            .register_user(registration("root", "root@example.com"), now())
            .expect("register");
        let context = service.login("root", "s3cure-pass", now()).expect("login").context;

        assert!(matches!(
            service.verify_provider(&context, listing.profile.id, true, now()),
            Err(AccountError::StaffRequired)
        ));

        service.grant_staff(customer.id).expect("staff");
        let context = service.login("root", "s3cure-pass", now()).expect("login").context;
        let profile = service
            .verify_provider(&context, listing.profile.id, true, now())
            .expect("verified");
        assert!(profile.is_verified);
    }

    #[test]
    fn provider_email_lookup_strategies() {
        let service = service();
        service
            .register_provider(provider_form("pipes", "Pipe Masters"), now())
            .expect("provider");
        let mut other = provider_form("sparks", "Bright Sparks");
        other.account.first_name = Some("Nikola".to_string());
        service.register_provider(other, now()).expect("provider");

        assert_eq!(
            service.find_provider_email_by_name("pipe masters").unwrap().as_deref(),
            Some("pipes@example.com")
        );
        assert_eq!(
            service.find_provider_email_by_name("sparks").unwrap().as_deref(),
            Some("sparks@example.com")
        );
        assert_eq!(
            service.find_provider_email_by_name("nikola").unwrap().as_deref(),
            Some("sparks@example.com")
        );
        assert_eq!(service.find_provider_email_by_name("   ").unwrap(), None);
        assert_eq!(service.find_provider_email_by_name("nobody").unwrap(), None);
    }

    #[test]
    fn demo_providers_match_prefix_and_service() {
        let service = service();
        service
            .register_provider(provider_form("demo_pro_pipes", "Demo Pipes"), now())
            .expect("demo");
        service
            .register_provider(provider_form("real_pipes", "Real Pipes"), now())
            .expect("real");

        let demos = service.demo_providers("plumbing").expect("demo list");
        assert_eq!(demos.len(), 1);
        assert_eq!(demos[0].user.username, "demo_pro_pipes");
        assert!(service.demo_providers("cleaning").expect("empty").is_empty());
        assert!(service.demo_providers("bogus").expect("empty").is_empty());
    }

    #[test]
    fn seeding_is_idempotent_and_lists_as_demo() {
        let service = service();
        let seed = DemoProviderSeed {
            owner: "Eric Mbi".to_string(),
            service_type: ServiceType::Roofing,
            region: "Far North".to_string(),
            years_experience: 12,
            rating: 4.3,
            total_reviews: 41,
            phone: "+237670000001".to_string(),
        };
        assert_eq!(seed.username(), "demo_pro_roofing_far_north");

        let first = service.seed_demo_provider(&seed, now()).expect("seeded");
        let again = service.seed_demo_provider(&seed, now()).expect("reseeded");
        assert_eq!(first.profile.id, again.profile.id);
        assert_eq!(again.profile.company_name, "Eric Mbi Services");
        assert!(again.profile.is_verified);
        assert_eq!(again.user.last_name, "Mbi");

        let demos = service.demo_providers("roofing").expect("demo list");
        assert_eq!(demos.len(), 1);
        assert!(matches!(
            service.login("demo_pro_roofing_far_north", "password", now()),
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[test]
    fn bootstrap_staff_creates_or_promotes_the_admin() {
        let service = service();
        let admin = AdminConfig {
            username: "perez".to_string(),
            email: Some("perez@localpro.dev".to_string()),
            password: "LocalPro2025!".to_string(),
        };

        let created = service.bootstrap_staff(&admin, now()).expect("admin created");
        assert!(created.is_staff);
        let again = service.bootstrap_staff(&admin, now()).expect("admin kept");
        assert_eq!(again.id, created.id);

        let outcome = service
            .login("perez@localpro.dev", "LocalPro2025!", now())
            .expect("admin logs in");
        assert!(outcome.context.user.is_staff);

        service
            .register_user(registration("oliver", "oliver@example.com"), now())
            .expect("registered");
        let promoted = service
            .bootstrap_staff(
                &AdminConfig {
                    username: "oliver".to_string(),
                    email: None,
                    password: "ignored-password".to_string(),
                },
                now(),
            )
            .expect("promoted");
        assert!(promoted.is_staff);
        assert!(service.login("oliver", "s3cure-pass", now()).is_ok());
    }
}
