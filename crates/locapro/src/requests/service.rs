use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::domain::{
    format_decline_reason, DecisionAction, DecisionToken, DeclineReason, EmailRecipient,
    InvalidTransition, PriceRange, PriceRangeId, RequestId, RequestPhoto, RequestStatus,
    ServiceRequest, TokenLifetimeOverflow,
};
use super::export::{ExportError, ExportFilters, ExportRow};
use super::forms::{
    parse_datetime, AcceptForm, DecisionForm, DeclineForm, RequestEdit, RequestForm, MAX_NOTE_LENGTH,
    MAX_PHOTOS,
};
use super::geo::{address_string, pseudo_coordinates, request_distance_miles, Addressable};
use super::repository::{PendingUpdate, RequestRepository};
use super::tracking::{locate_provider, ProviderLocation, TrackingError};
use crate::accounts::{
    AccountContext, AccountError, AccountRepository, AccountService, ProviderListing,
    ProviderProfile, UserAccount, UserId, UserProfile,
};
use crate::config::WorkflowConfig;
use crate::email::templates::{
    self, AcceptanceNotice, CustomerConfirmation, DeclineNotice, ProviderNotification,
};
use crate::email::{EmailDispatcher, EmailMessage};
use crate::error::RepositoryError;
use crate::http::{error_response, validation_response, ErrorCode};
use crate::tokens::{generate_secure_token, token_digest};
use crate::validation::{clean_text, ValidationErrors};

/// Latitude/longitude pair in responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<(f64, f64)> for Coordinates {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A request enriched with names, addresses and distance for API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub status_label: &'static str,
    pub customer_name: String,
    pub price_range_label: Option<String>,
    pub decline_reason_display: Option<&'static str>,
    pub distance_miles: Option<f64>,
    pub customer_address: String,
    pub provider_address: String,
    pub customer_location: Option<Coordinates>,
    pub provider_location: Option<Coordinates>,
}

/// A freshly created request together with the secret for its decision links.
#[derive(Debug, Clone)]
pub struct IssuedRequest {
    pub request: ServiceRequest,
    pub decision_token: String,
}

/// What the provider sees before confirming an emailed decision.
#[derive(Debug, Clone)]
pub struct DecisionPreview {
    pub view: RequestView,
    pub action: DecisionAction,
    pub expires_at: DateTime<Utc>,
}

/// Context resolved once per request for notifications and views.
struct Parties {
    customer: UserAccount,
    customer_profile: Option<UserProfile>,
    provider: Option<ProviderListing>,
}

/// Request lifecycle: creation, decisions, edits, listings, exports and tracking.
pub struct RequestService<A, Q> {
    accounts: Arc<AccountService<A>>,
    repository: Arc<Q>,
    mailer: EmailDispatcher,
    workflow: WorkflowConfig,
    request_sequence: AtomicU64,
    price_range_sequence: AtomicU64,
}

impl<A, Q> RequestService<A, Q>
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    pub fn new(
        accounts: Arc<AccountService<A>>,
        repository: Arc<Q>,
        mailer: EmailDispatcher,
        workflow: WorkflowConfig,
    ) -> Self {
        Self {
            accounts,
            repository,
            mailer,
            workflow,
            request_sequence: AtomicU64::new(1),
            price_range_sequence: AtomicU64::new(1),
        }
    }

    pub fn accounts(&self) -> &Arc<AccountService<A>> {
        &self.accounts
    }

    pub fn price_ranges(&self) -> Result<Vec<PriceRange>, RequestServiceError> {
        Ok(self.repository.price_ranges()?)
    }

    pub fn add_price_range(
        &self,
        label: &str,
        min_price: u32,
        max_price: Option<u32>,
    ) -> Result<PriceRange, RequestServiceError> {
        let range = PriceRange {
            id: PriceRangeId(self.price_range_sequence.fetch_add(1, Ordering::Relaxed)),
            label: label.trim().to_string(),
            min_price,
            max_price,
        };
        Ok(self.repository.insert_price_range(range)?)
    }

    pub fn create_request(
        &self,
        customer: &AccountContext,
        form: RequestForm,
        now: DateTime<Utc>,
    ) -> Result<IssuedRequest, RequestServiceError> {
        let _span =
            tracing::info_span!("create_request", customer_id = %customer.user_id()).entered();
        if customer.is_provider() {
            tracing::warn!(user_id = %customer.user_id(), "provider attempted to create a request");
            return Err(RequestServiceError::Forbidden(
                "Service providers cannot create service requests.",
            ));
        }

        let mut errors = ValidationErrors::new();

        let provider = match form.provider_id {
            Some(provider_id) => match self.accounts.provider_listing(provider_id) {
                Ok(listing) => Some(listing),
                Err(AccountError::NotFound(_)) => {
                    errors.add(
                        "provider_choice",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    None
                }
                Err(other) => return Err(other.into()),
            },
            None => None,
        };
        let typed_name = clean_text(form.provider_name.as_deref());
        if form.provider_id.is_none() && typed_name.is_none() {
            errors.add("__all__", "Please select a provider or enter a provider name.");
        }

        let description = form.description.trim().to_string();
        if description.is_empty() {
            errors.add("description", "This field is required.");
        }

        let date_time = self.validate_date_time(form.date_time.as_deref(), &mut errors);
        self.validate_price_range(form.price_range, &mut errors)?;
        validate_offered_price(
            form.offered_price,
            provider.as_ref().map(|listing| &listing.profile),
            &mut errors,
        );
        if form.photos.len() > MAX_PHOTOS {
            errors.add("photos", format!("You can upload at most {MAX_PHOTOS} photos."));
        }
        if form
            .photos
            .iter()
            .any(|photo| photo.file_name.trim().is_empty())
        {
            errors.add("photos", "Each photo needs a file name.");
        }
        errors.into_result()?;

        let provider_name = match &provider {
            Some(listing) => listing.display_name(),
            None => typed_name.unwrap_or_default(),
        };
        let photos = form
            .photos
            .into_iter()
            .map(|photo| {
                let file_name = photo.file_name.trim().to_string();
                RequestPhoto {
                    storage_key: format!("request_photos/{}-{}", Uuid::new_v4().simple(), file_name),
                    file_name,
                    content_type: clean_text(photo.content_type.as_deref()),
                    created_at: now,
                }
            })
            .collect();

        let request = ServiceRequest {
            id: RequestId(self.request_sequence.fetch_add(1, Ordering::Relaxed)),
            user_id: customer.user_id(),
            provider_id: provider.as_ref().map(|listing| listing.user.id),
            description,
            provider_name,
            date_time,
            price_range: form.price_range,
            offered_price: form.offered_price,
            urgent: form.urgent,
            status: RequestStatus::Pending,
            decline_reason: None,
            decline_message: None,
            acceptance_notes: None,
            created_at: now,
            accepted_at: None,
            declined_at: None,
            photos,
            email_sent_to_provider: false,
            email_sent_to_provider_at: None,
            email_sent_to_user: false,
            email_sent_to_user_at: None,
            email_response_at: None,
        };
        let secret = generate_secure_token();
        let token = DecisionToken::issue(
            request.id,
            token_digest(&secret),
            now,
            self.workflow.decision_token_ttl(),
        )?;
        let expires_at = token.expires_at;

        let mut request = self.repository.insert_request(request, token)?;
        tracing::info!(
            request_id = %request.id,
            user_id = %request.user_id,
            provider = %request.provider_name,
            offered_price = request.offered_price,
            %expires_at,
            "service request created"
        );

        let parties = self.parties(&request)?;
        let mut delivered = Vec::with_capacity(2);
        if self.notify_provider(&request, &parties, &secret, expires_at)? {
            delivered.push(EmailRecipient::Provider);
        }
        if self.notify_submission(&request, &parties) {
            delivered.push(EmailRecipient::Customer);
        }
        for recipient in delivered {
            request.mark_emailed(recipient, now);
            self.repository.mark_emailed(request.id, recipient, now)?;
        }

        Ok(IssuedRequest {
            request,
            decision_token: secret,
        })
    }

    pub fn preview_decision(
        &self,
        request_id: RequestId,
        action: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<DecisionPreview, RequestServiceError> {
        let (request, token, action) = self.check_decision(request_id, action, token, now)?;
        let parties = self.parties(&request)?;
        Ok(DecisionPreview {
            view: self.view(request, &parties)?,
            action,
            expires_at: token.expires_at,
        })
    }

    pub fn decide_with_token(
        &self,
        request_id: RequestId,
        action: &str,
        token: &str,
        form: DecisionForm,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, RequestServiceError> {
        let _span = tracing::info_span!("decide_with_token", %request_id, action).entered();
        let (mut request, stored, action) = self.check_decision(request_id, action, token, now)?;

        match action {
            DecisionAction::Accept => request.accept(None, None, now)?,
            DecisionAction::Decline => {
                let reason = form
                    .reason()
                    .and_then(DeclineReason::from_code)
                    .unwrap_or(DeclineReason::Other);
                request.decline(reason, clean_text(form.message()), now)?;
            }
        }
        request.email_response_at = Some(now);
        self.store_decision(&request, Some(&stored.token_digest), now)?;
        tracing::info!(
            request_id = %request.id,
            status = %request.status,
            "decision applied from emailed link"
        );

        self.notify_outcome(&request)?;
        Ok(request)
    }

    pub fn accept(
        &self,
        provider: &AccountContext,
        request_id: RequestId,
        form: AcceptForm,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, RequestServiceError> {
        let _span = tracing::info_span!("accept_request", %request_id).entered();
        let mut request = self.load(request_id)?;
        if request.provider_id != Some(provider.user_id()) {
            tracing::warn!(%request_id, user_id = %provider.user_id(), "unauthorized accept attempt");
            return Err(RequestServiceError::Forbidden(
                "You do not have permission to accept this request.",
            ));
        }
        match request.status {
            RequestStatus::Accepted => {
                return Err(conflict("This request has already been accepted."))
            }
            RequestStatus::Declined => return Err(conflict("Cannot accept a declined request.")),
            RequestStatus::Pending => {}
        }

        let notes = clean_text(form.notes.as_deref());
        if exceeds_note_length(notes.as_deref()) {
            return Err(ValidationErrors::single("notes", too_long_message()).into());
        }

        request.accept(Some(provider.user_id()), notes, now)?;
        self.store_decision(&request, None, now)?;
        tracing::info!(%request_id, provider_id = %provider.user_id(), "request accepted");

        self.notify_outcome(&request)?;
        Ok(request)
    }

    pub fn decline(
        &self,
        provider: &AccountContext,
        request_id: RequestId,
        form: DeclineForm,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, RequestServiceError> {
        let _span = tracing::info_span!("decline_request", %request_id).entered();
        let mut request = self.load(request_id)?;
        if request.provider_id != Some(provider.user_id()) {
            tracing::warn!(%request_id, user_id = %provider.user_id(), "unauthorized decline attempt");
            return Err(RequestServiceError::Forbidden(
                "You do not have permission to decline this request.",
            ));
        }
        match request.status {
            RequestStatus::Declined => {
                return Err(conflict("This request has already been declined."))
            }
            RequestStatus::Accepted => return Err(conflict("Cannot decline an accepted request.")),
            RequestStatus::Pending => {}
        }

        let mut errors = ValidationErrors::new();
        let reason = match clean_text(form.reason.as_deref()) {
            None => {
                errors.add("reason", "This field is required.");
                None
            }
            Some(code) => {
                let parsed = DeclineReason::from_code(&code);
                if parsed.is_none() {
                    errors.add(
                        "reason",
                        format!("Select a valid choice. {code} is not one of the available choices."),
                    );
                }
                parsed
            }
        };
        let message = clean_text(form.message.as_deref());
        if exceeds_note_length(message.as_deref()) {
            errors.add("message", too_long_message());
        }
        errors.into_result()?;
        let reason = reason.unwrap_or(DeclineReason::Other);

        request.decline(reason, message, now)?;
        self.store_decision(&request, None, now)?;
        tracing::info!(%request_id, provider_id = %provider.user_id(), reason = reason.code(), "request declined");

        self.notify_outcome(&request)?;
        Ok(request)
    }

    pub fn edit(
        &self,
        customer: &AccountContext,
        request_id: RequestId,
        edit: RequestEdit,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, RequestServiceError> {
        let mut request = self.load(request_id)?;
        if request.user_id != customer.user_id() {
            tracing::warn!(%request_id, user_id = %customer.user_id(), "unauthorized edit attempt");
            return Err(RequestServiceError::Forbidden(
                "You do not have permission to edit this request.",
            ));
        }
        if !request.is_pending() {
            tracing::warn!(%request_id, status = %request.status, "edit attempt on decided request");
            return Err(conflict(format!("Cannot edit a {} request.", request.status)));
        }

        let mut errors = ValidationErrors::new();
        let description = edit.description.as_deref().map(str::trim);
        if description == Some("") {
            errors.add("description", "This field cannot be blank.");
        }
        let date_time = self.validate_date_time(edit.date_time.as_deref(), &mut errors);
        self.validate_price_range(edit.price_range, &mut errors)?;
        let provider_profile = match request.provider_id {
            Some(user_id) => self.accounts.provider_for_user(user_id)?,
            None => None,
        };
        validate_offered_price(edit.offered_price, provider_profile.as_ref(), &mut errors);
        errors.into_result()?;

        if let Some(description) = description {
            request.description = description.to_string();
        }
        if date_time.is_some() {
            request.date_time = date_time;
        }
        if edit.price_range.is_some() {
            request.price_range = edit.price_range;
        }
        if edit.offered_price.is_some() {
            request.offered_price = edit.offered_price;
        }
        if let Some(urgent) = edit.urgent {
            request.urgent = urgent;
        }
        if let PendingUpdate::AlreadyDecided(status) =
            self.repository.update_pending(request.clone(), None, now)?
        {
            tracing::warn!(%request_id, %status, "request decided while being edited");
            return Err(conflict(format!("Cannot edit a {status} request.")));
        }
        tracing::info!(%request_id, user_id = %customer.user_id(), edited_at = %now, "request edited");
        Ok(request)
    }

    /// Providers see requests directed to them; everyone else sees their own.
    pub fn list_for(&self, account: &AccountContext) -> Result<Vec<RequestView>, RequestServiceError> {
        let user_id = account.user_id();
        let requests = self.repository.requests()?;
        requests
            .into_iter()
            .filter(|request| {
                if account.is_provider() {
                    request.provider_id == Some(user_id)
                } else {
                    request.user_id == user_id
                }
            })
            .map(|request| {
                let parties = self.parties(&request)?;
                self.view(request, &parties)
            })
            .collect()
    }

    pub fn detail(
        &self,
        account: &AccountContext,
        request_id: RequestId,
    ) -> Result<RequestView, RequestServiceError> {
        let request = self.load(request_id)?;
        let user_id = account.user_id();
        if request.user_id != user_id && request.provider_id != Some(user_id) {
            return Err(RequestServiceError::Forbidden(
                "You do not have permission to view this request.",
            ));
        }
        let parties = self.parties(&request)?;
        self.view(request, &parties)
    }

    pub fn track_provider(
        &self,
        account: &AccountContext,
        request_id: RequestId,
    ) -> Result<ProviderLocation, RequestServiceError> {
        let request = self.load(request_id)?;
        let parties = if request.user_id == account.user_id() {
            Some(self.parties(&request)?)
        } else {
            None
        };
        let location = locate_provider(
            account.user_id(),
            &request,
            parties.as_ref().and_then(|p| p.provider.as_ref()),
            parties.as_ref().and_then(|p| p.customer_profile.as_ref()),
        );
        if let Err(err) = &location {
            tracing::debug!(%request_id, code = err.code().as_str(), "tracking unavailable");
        }
        Ok(location?)
    }

    /// Rows for an export: staff see everything, providers their inbox, customers their own.
    pub fn export_rows(
        &self,
        account: &AccountContext,
        filters: &ExportFilters,
    ) -> Result<Vec<ExportRow>, RequestServiceError> {
        let user_id = account.user_id();
        let scoped: Vec<ServiceRequest> = self
            .repository
            .requests()?
            .into_iter()
            .filter(|request| {
                if account.user.is_staff {
                    true
                } else if account.is_provider() {
                    request.provider_id == Some(user_id)
                } else {
                    request.user_id == user_id
                }
            })
            .collect();

        filters
            .apply(scoped)
            .into_iter()
            .map(|request| self.export_row(request))
            .collect()
    }

    fn export_row(&self, request: ServiceRequest) -> Result<ExportRow, RequestServiceError> {
        let parties = self.parties(&request)?;
        let price_range = self.price_range_label(request.price_range)?.unwrap_or_default();
        let provider_name = parties
            .provider
            .as_ref()
            .map(|listing| listing.user.full_name())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "N/A".to_string());
        Ok(ExportRow {
            request_id: request.id.0,
            service_type: request.provider_name.clone(),
            user_name: parties.customer.display_name(),
            provider_name,
            status: request.status,
            created_at: request.created_at,
            distance_miles: request_distance_miles(
                parties.customer_profile.as_ref(),
                parties.provider.as_ref().map(|listing| &listing.profile),
            ),
            price_range,
            urgent: request.urgent,
            description: request.description,
        })
    }

    fn load(&self, request_id: RequestId) -> Result<ServiceRequest, RequestServiceError> {
        self.repository
            .request(request_id)?
            .ok_or(RequestServiceError::NotFound)
    }

    fn check_decision(
        &self,
        request_id: RequestId,
        action: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(ServiceRequest, DecisionToken, DecisionAction), RequestServiceError> {
        let request = self.load(request_id)?;
        let stored = self
            .repository
            .token_for(request_id)?
            .filter(|stored| stored.matches(token))
            .ok_or_else(|| {
                tracing::warn!(%request_id, "decision attempted with unknown token");
                TokenError::Unknown
            })?;
        if !stored.is_valid(now) {
            return Err(TokenError::Spent.into());
        }
        let action = DecisionAction::parse(action).ok_or(TokenError::InvalidAction)?;
        if !request.is_pending() {
            return Err(InvalidTransition {
                from: request.status,
                to: action.target(),
            }
            .into());
        }
        Ok((request, stored, action))
    }

    /// Persist a decided request unless another decision got there first.
    fn store_decision(
        &self,
        request: &ServiceRequest,
        claim: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RequestServiceError> {
        match self.repository.update_pending(request.clone(), claim, now)? {
            PendingUpdate::Applied => Ok(()),
            PendingUpdate::TokenSpent => {
                tracing::warn!(request_id = %request.id, "decision token spent by a concurrent decision");
                Err(TokenError::Spent.into())
            }
            PendingUpdate::AlreadyDecided(from) => {
                tracing::warn!(request_id = %request.id, %from, "request decided concurrently");
                Err(InvalidTransition {
                    from,
                    to: request.status,
                }
                .into())
            }
        }
    }

    fn validate_date_time(
        &self,
        raw: Option<&str>,
        errors: &mut ValidationErrors,
    ) -> Option<DateTime<Utc>> {
        let raw = clean_text(raw)?;
        let parsed = parse_datetime(&raw);
        if parsed.is_none() {
            errors.add("date_time", "Enter a valid date/time.");
        }
        parsed
    }

    fn validate_price_range(
        &self,
        id: Option<PriceRangeId>,
        errors: &mut ValidationErrors,
    ) -> Result<(), RequestServiceError> {
        if let Some(id) = id {
            if self.repository.price_range(id)?.is_none() {
                errors.add(
                    "price_range",
                    "Select a valid choice. That choice is not one of the available choices.",
                );
            }
        }
        Ok(())
    }

    fn price_range_label(&self, id: Option<PriceRangeId>) -> Result<Option<String>, RequestServiceError> {
        match id {
            Some(id) => Ok(self.repository.price_range(id)?.map(|range| range.label)),
            None => Ok(None),
        }
    }

    fn parties(&self, request: &ServiceRequest) -> Result<Parties, RequestServiceError> {
        let customer = self.accounts.user(request.user_id)?;
        let customer_profile = self.accounts.user_profile_for(request.user_id)?;
        let provider = match request.provider_id {
            Some(user_id) => self.provider_listing_for(user_id)?,
            None => None,
        };
        Ok(Parties {
            customer,
            customer_profile,
            provider,
        })
    }

    fn provider_listing_for(&self, user_id: UserId) -> Result<Option<ProviderListing>, RequestServiceError> {
        let Some(profile) = self.accounts.provider_for_user(user_id)? else {
            return Ok(None);
        };
        let user = self.accounts.user(user_id)?;
        Ok(Some(ProviderListing { profile, user }))
    }

    fn view(&self, request: ServiceRequest, parties: &Parties) -> Result<RequestView, RequestServiceError> {
        let provider_profile = parties.provider.as_ref().map(|listing| &listing.profile);
        let customer_profile = parties.customer_profile.as_ref();
        Ok(RequestView {
            status_label: request.status.label(),
            customer_name: parties.customer.display_name(),
            price_range_label: self.price_range_label(request.price_range)?,
            decline_reason_display: request.decline_reason.map(DeclineReason::label),
            distance_miles: request_distance_miles(customer_profile, provider_profile),
            customer_address: address_string(customer_profile.map(|p| p as &dyn Addressable)),
            provider_address: address_string(provider_profile.map(|p| p as &dyn Addressable)),
            customer_location: customer_profile
                .and_then(|profile| pseudo_coordinates(&profile.zip_code))
                .map(Coordinates::from),
            provider_location: provider_profile
                .and_then(|profile| pseudo_coordinates(&profile.zip_code))
                .map(Coordinates::from),
            request,
        })
    }

    /// Returns whether the notification was handed to the transport.
    fn notify_provider(
        &self,
        request: &ServiceRequest,
        parties: &Parties,
        secret: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RequestServiceError> {
        let attached_email = parties
            .provider
            .as_ref()
            .map(|listing| listing.user.email.trim().to_string())
            .filter(|email| !email.is_empty());
        let recipient = match attached_email {
            Some(email) => email,
            None => match self.accounts.find_provider_email_by_name(&request.provider_name)? {
                Some(email) => email,
                None => {
                    tracing::warn!(
                        request_id = %request.id,
                        provider = %request.provider_name,
                        "no provider address found, using default sender"
                    );
                    self.mailer.default_from().to_string()
                }
            },
        };

        let provider_profile = parties.provider.as_ref().map(|listing| &listing.profile);
        let customer_profile = parties.customer_profile.as_ref();
        let context = ProviderNotification {
            request_id: request.id.0,
            provider_name: request.provider_name.clone(),
            company_name: provider_profile.map(|profile| profile.company_name.clone()),
            service_type: provider_profile.map(|profile| profile.service_type.label()),
            customer_name: parties.customer.display_name(),
            customer_email: parties.customer.email.clone(),
            description: request.description.clone(),
            date_time: request.date_time,
            price_range: self.price_range_label(request.price_range)?,
            offered_price: request.offered_price,
            urgent: request.urgent,
            distance_miles: request_distance_miles(customer_profile, provider_profile),
            customer_address: customer_profile.map(|profile| address_string(Some(profile as &dyn Addressable))),
            provider_address: provider_profile.map(|profile| address_string(Some(profile as &dyn Addressable))),
            accept_link: self.decision_link(request.id, DecisionAction::Accept, secret),
            decline_link: self.decision_link(request.id, DecisionAction::Decline, secret),
            expires_at,
        };

        let message = EmailMessage::new(
            recipient,
            self.mailer.default_from(),
            templates::provider_notification(&context),
        );
        Ok(self.mailer.dispatch(message, "provider_notification").accepted())
    }

    fn notify_submission(&self, request: &ServiceRequest, parties: &Parties) -> bool {
        let Some(recipient) = customer_email(&parties.customer) else {
            return false;
        };
        let context = CustomerConfirmation {
            request_id: request.id.0,
            customer_name: parties.customer.display_name(),
            provider_name: request.provider_name.clone(),
            description: request.description.clone(),
            date_time: request.date_time,
            price_range: self.price_range_label(request.price_range).ok().flatten(),
            offered_price: request.offered_price,
            urgent: request.urgent,
            requests_link: format!("{}/api/requests", self.mailer.site_url()),
        };
        let message = EmailMessage::new(
            recipient,
            self.mailer.default_from(),
            templates::customer_confirmation(&context),
        );
        self.mailer.dispatch(message, "customer_confirmation").accepted()
    }

    /// Tell the customer how the provider decided.
    fn notify_outcome(&self, request: &ServiceRequest) -> Result<(), RequestServiceError> {
        let parties = self.parties(request)?;
        let Some(recipient) = customer_email(&parties.customer) else {
            tracing::debug!(request_id = %request.id, "customer has no email, skipping outcome notice");
            return Ok(());
        };
        let site_url = self.mailer.site_url();

        let (rendered, kind) = match request.status {
            RequestStatus::Accepted => {
                let profile = parties.provider.as_ref().map(|listing| &listing.profile);
                let notice = AcceptanceNotice {
                    request_id: request.id.0,
                    customer_name: parties.customer.display_name(),
                    provider_name: request.provider_name.clone(),
                    description: request.description.clone(),
                    date_time: request.date_time,
                    accepted_at: request.accepted_at.unwrap_or(request.created_at),
                    provider_phone: profile.map(|profile| profile.phone.clone()),
                    provider_email: parties.provider.as_ref().map(|listing| listing.user.email.clone()),
                    acceptance_notes: request.acceptance_notes.clone(),
                    request_link: format!("{site_url}/api/requests/{}", request.id),
                };
                (templates::request_accepted(&notice), "request_accepted")
            }
            RequestStatus::Declined => {
                let reason = request.decline_reason.unwrap_or(DeclineReason::Other);
                let notice = DeclineNotice {
                    request_id: request.id.0,
                    customer_name: parties.customer.display_name(),
                    provider_name: request.provider_name.clone(),
                    description: request.description.clone(),
                    reason_display: reason.label(),
                    reason_text: format_decline_reason(reason),
                    decline_message: request.decline_message.clone(),
                    declined_at: request.declined_at.unwrap_or(request.created_at),
                    browse_link: format!("{site_url}/api/professionals"),
                };
                (templates::request_declined(&notice), "request_declined")
            }
            RequestStatus::Pending => return Ok(()),
        };

        let message = EmailMessage::new(recipient, self.mailer.default_from(), rendered);
        self.mailer.dispatch(message, kind);
        Ok(())
    }

    fn decision_link(&self, request_id: RequestId, action: DecisionAction, secret: &str) -> String {
        format!(
            "{}/requests/decision/{}/{}/{}/",
            self.mailer.site_url(),
            request_id,
            action.as_str(),
            secret
        )
    }
}

fn customer_email(customer: &UserAccount) -> Option<String> {
    let email = customer.email.trim();
    (!email.is_empty()).then(|| email.to_string())
}

fn validate_offered_price(
    offered: Option<f64>,
    provider: Option<&ProviderProfile>,
    errors: &mut ValidationErrors,
) {
    let Some(offered) = offered else {
        return;
    };
    if !offered.is_finite() || offered < 0.0 {
        errors.add("offered_price", "Ensure this value is greater than or equal to 0.");
        return;
    }
    if let Some(profile) = provider {
        if offered < profile.min_price {
            errors.add(
                "offered_price",
                format!(
                    "Offered price must be at least ${:.2} for this provider.",
                    profile.min_price
                ),
            );
        }
    }
}

fn exceeds_note_length(value: Option<&str>) -> bool {
    value.is_some_and(|text| text.chars().count() > MAX_NOTE_LENGTH)
}

fn too_long_message() -> String {
    format!("Ensure this value has at most {MAX_NOTE_LENGTH} characters.")
}

fn conflict(message: impl Into<String>) -> RequestServiceError {
    RequestServiceError::Conflict(message.into())
}

/// Why an emailed decision link was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Unknown,
    #[error("This decision link has expired or has already been used")]
    Spent,
    #[error("Invalid action")]
    InvalidAction,
}

/// Error raised by the request service.
#[derive(Debug, thiserror::Error)]
pub enum RequestServiceError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("Service request not found.")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    TokenLifetime(#[from] TokenLifetimeOverflow),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ValidationErrors> for RequestServiceError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

impl RequestServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestServiceError::Validation(_) | RequestServiceError::Token(_) => {
                StatusCode::BAD_REQUEST
            }
            RequestServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            RequestServiceError::NotFound => StatusCode::NOT_FOUND,
            RequestServiceError::Conflict(_) | RequestServiceError::Transition(_) => {
                StatusCode::CONFLICT
            }
            RequestServiceError::Tracking(TrackingError::NotOwner) => StatusCode::FORBIDDEN,
            RequestServiceError::Tracking(_) => StatusCode::BAD_REQUEST,
            RequestServiceError::Account(AccountError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            RequestServiceError::Account(AccountError::NotFound(_)) => StatusCode::NOT_FOUND,
            RequestServiceError::Export(_)
            | RequestServiceError::TokenLifetime(_)
            | RequestServiceError::Account(_)
            | RequestServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RequestServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            RequestServiceError::Validation(errors) => validation_response(&errors),
            RequestServiceError::Account(err) => err.into_response(),
            RequestServiceError::Tracking(err) => error_response(status, err.code(), err.to_string()),
            RequestServiceError::Forbidden(message) => {
                error_response(status, ErrorCode::Forbidden, message)
            }
            RequestServiceError::NotFound => {
                error_response(status, ErrorCode::NotFound, "Service request not found.")
            }
            RequestServiceError::Conflict(message) => {
                error_response(status, ErrorCode::Conflict, message)
            }
            RequestServiceError::Transition(err) => error_response(
                status,
                ErrorCode::Conflict,
                format!("This request has already been {}.", err.from),
            ),
            RequestServiceError::Token(err) => {
                error_response(status, ErrorCode::BadRequest, err.to_string())
            }
            other => {
                tracing::error!(error = %other, "request operation failed");
                error_response(
                    status,
                    ErrorCode::ServerError,
                    "An error occurred while processing your request.",
                )
            }
        }
    }
}
