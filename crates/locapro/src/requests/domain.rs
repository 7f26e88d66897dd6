use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::UserId;
use crate::tokens::matches_digest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceRangeId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PriceRangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Budget band a customer can attach to a request; `max_price` of `None` is open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub id: PriceRangeId,
    pub label: String,
    pub min_price: u32,
    pub max_price: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::Accepted,
        RequestStatus::Declined,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Declined => "Declined",
        }
    }

    pub fn from_code(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == value.trim().to_ascii_lowercase())
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    Price,
    Distance,
    Time,
    Other,
}

impl DeclineReason {
    pub const ALL: [DeclineReason; 4] = [
        DeclineReason::Price,
        DeclineReason::Distance,
        DeclineReason::Time,
        DeclineReason::Other,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            DeclineReason::Price => "price",
            DeclineReason::Distance => "distance",
            DeclineReason::Time => "time",
            DeclineReason::Other => "other",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            DeclineReason::Price => "Price",
            DeclineReason::Distance => "Distance",
            DeclineReason::Time => "Time",
            DeclineReason::Other => "Other",
        }
    }

    pub fn from_code(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.code() == value.trim())
    }
}

/// Customer-facing wording for a decline reason.
pub const fn format_decline_reason(reason: DeclineReason) -> &'static str {
    match reason {
        DeclineReason::Price => "Price too low",
        DeclineReason::Distance => "Too far away",
        DeclineReason::Time => "Schedule conflict",
        DeclineReason::Other => "Other reason",
    }
}

/// Which way a provider is deciding on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Accept,
    Decline,
}

impl DecisionAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accept" => Some(Self::Accept),
            "decline" => Some(Self::Decline),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DecisionAction::Accept => "accept",
            DecisionAction::Decline => "decline",
        }
    }

    pub const fn target(self) -> RequestStatus {
        match self {
            DecisionAction::Accept => RequestStatus::Accepted,
            DecisionAction::Decline => RequestStatus::Declined,
        }
    }
}

/// Metadata for an uploaded photo; the bytes live in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPhoto {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

/// Status change the request does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move request from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RequestStatus,
    pub to: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub provider_id: Option<UserId>,
    pub description: String,
    pub provider_name: String,
    pub date_time: Option<DateTime<Utc>>,
    pub price_range: Option<PriceRangeId>,
    pub offered_price: Option<f64>,
    pub urgent: bool,
    pub status: RequestStatus,
    pub decline_reason: Option<DeclineReason>,
    pub decline_message: Option<String>,
    pub acceptance_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub photos: Vec<RequestPhoto>,
    pub email_sent_to_provider: bool,
    pub email_sent_to_provider_at: Option<DateTime<Utc>>,
    pub email_sent_to_user: bool,
    pub email_sent_to_user_at: Option<DateTime<Utc>>,
    pub email_response_at: Option<DateTime<Utc>>,
}

impl ServiceRequest {
    fn transition(&self, to: RequestStatus) -> Result<(), InvalidTransition> {
        match (self.status, to) {
            (RequestStatus::Pending, RequestStatus::Accepted)
            | (RequestStatus::Pending, RequestStatus::Declined) => Ok(()),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }

    /// `pending -> accepted`; a provider given here becomes the assigned provider.
    pub fn accept(
        &mut self,
        provider: Option<UserId>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(RequestStatus::Accepted)?;
        self.status = RequestStatus::Accepted;
        if provider.is_some() {
            self.provider_id = provider;
        }
        self.acceptance_notes = notes;
        self.accepted_at = Some(now);
        Ok(())
    }

    /// `pending -> declined`.
    pub fn decline(
        &mut self,
        reason: DeclineReason,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.transition(RequestStatus::Declined)?;
        self.status = RequestStatus::Declined;
        self.decline_reason = Some(reason);
        self.decline_message = message;
        self.declined_at = Some(now);
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn mark_emailed(&mut self, recipient: EmailRecipient, at: DateTime<Utc>) {
        match recipient {
            EmailRecipient::Provider => {
                self.email_sent_to_provider = true;
                self.email_sent_to_provider_at = Some(at);
            }
            EmailRecipient::Customer => {
                self.email_sent_to_user = true;
                self.email_sent_to_user_at = Some(at);
            }
        }
    }
}

/// Which party a request notification was delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailRecipient {
    Provider,
    Customer,
}

/// A token lifetime that would run past the representable calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("decision token lifetime of {ttl_days} days cannot be represented")]
pub struct TokenLifetimeOverflow {
    pub ttl_days: i64,
}

/// Single-use authorization for an emailed accept/decline link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionToken {
    pub request_id: RequestId,
    pub token_digest: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl DecisionToken {
    pub fn issue(
        request_id: RequestId,
        token_digest: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, TokenLifetimeOverflow> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(TokenLifetimeOverflow {
                ttl_days: ttl.num_days(),
            })?;
        Ok(Self {
            request_id,
            token_digest,
            created_at: now,
            expires_at,
            used: false,
            used_at: None,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired(now)
    }

    pub fn matches(&self, token: &str) -> bool {
        matches_digest(token, &self.token_digest)
    }

    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        self.used = true;
        self.used_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{generate_secure_token, token_digest};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
    }

    fn pending() -> ServiceRequest {
        ServiceRequest {
            id: RequestId(1),
            user_id: UserId(1),
            provider_id: None,
            description: "Fix the sink".to_string(),
            provider_name: "Pipe Masters".to_string(),
            date_time: None,
            price_range: None,
            offered_price: None,
            urgent: false,
            status: RequestStatus::Pending,
            decline_reason: None,
            decline_message: None,
            acceptance_notes: None,
            created_at: now(),
            accepted_at: None,
            declined_at: None,
            photos: Vec::new(),
            email_sent_to_provider: false,
            email_sent_to_provider_at: None,
            email_sent_to_user: false,
            email_sent_to_user_at: None,
            email_response_at: None,
        }
    }

    #[test]
    fn accepted_and_declined_are_terminal() {
        let mut request = pending();
        request.accept(Some(UserId(9)), None, now()).expect("accept");
        assert_eq!(request.provider_id, Some(UserId(9)));
        assert_eq!(request.accepted_at, Some(now()));

        let err = request
            .decline(DeclineReason::Price, None, now())
            .unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: RequestStatus::Accepted,
                to: RequestStatus::Declined
            }
        );
        assert!(request.accept(None, None, now()).is_err());

        let mut declined = pending();
        declined
            .decline(DeclineReason::Time, Some("Booked".to_string()), now())
            .expect("decline");
        assert_eq!(declined.decline_reason, Some(DeclineReason::Time));
        assert!(declined.accept(None, None, now()).is_err());
    }

    #[test]
    fn decline_reason_wording() {
        assert_eq!(format_decline_reason(DeclineReason::Price), "Price too low");
        assert_eq!(format_decline_reason(DeclineReason::Distance), "Too far away");
        assert_eq!(format_decline_reason(DeclineReason::Time), "Schedule conflict");
        assert_eq!(format_decline_reason(DeclineReason::Other), "Other reason");
        assert_eq!(DeclineReason::from_code("weather"), None);
    }

    #[test]
    fn token_validity_window_and_single_use() {
        let secret = generate_secure_token();
        let mut token =
            DecisionToken::issue(RequestId(1), token_digest(&secret), now(), Duration::days(7))
                .expect("token issued");
        assert!(token.matches(&secret));
        assert!(!token.matches("guess"));
        assert!(token.is_valid(now() + Duration::days(7)));
        assert!(token.is_expired(now() + Duration::days(7) + Duration::seconds(1)));

        token.mark_used(now());
        assert!(!token.is_valid(now()));
        assert_eq!(token.used_at, Some(now()));
    }

    #[test]
    fn token_expiry_past_the_calendar_is_an_error() {
        let err = DecisionToken::issue(
            RequestId(1),
            token_digest("secret"),
            DateTime::<Utc>::MAX_UTC - Duration::days(1),
            Duration::days(30),
        )
        .unwrap_err();
        assert_eq!(err.ttl_days, 30);
    }

    #[test]
    fn emailed_flags_track_each_recipient() {
        let mut request = pending();
        request.mark_emailed(EmailRecipient::Customer, now());
        assert!(request.email_sent_to_user);
        assert_eq!(request.email_sent_to_user_at, Some(now()));
        assert!(!request.email_sent_to_provider);
    }

    #[test]
    fn status_codes_parse_case_insensitively() {
        assert_eq!(RequestStatus::from_code(" Accepted "), Some(RequestStatus::Accepted));
        assert_eq!(RequestStatus::from_code("open"), None);
        assert_eq!(DecisionAction::parse("decline").map(DecisionAction::target), Some(RequestStatus::Declined));
        assert_eq!(DecisionAction::parse("maybe"), None);
    }
}
