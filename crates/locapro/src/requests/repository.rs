use chrono::{DateTime, Utc};

use super::domain::{
    DecisionToken, EmailRecipient, PriceRange, PriceRangeId, RequestId, RequestStatus,
    ServiceRequest,
};
use crate::error::RepositoryError;

/// Outcome of a write guarded on the stored request still being pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingUpdate {
    Applied,
    /// The stored request had already left `Pending`.
    AlreadyDecided(RequestStatus),
    /// The claimed decision token was spent or replaced.
    TokenSpent,
}

/// Storage abstraction for requests, their decision tokens and price bands.
pub trait RequestRepository: Send + Sync {
    fn insert_price_range(&self, range: PriceRange) -> Result<PriceRange, RepositoryError>;
    /// Ordered by minimum price.
    fn price_ranges(&self) -> Result<Vec<PriceRange>, RepositoryError>;
    fn price_range(&self, id: PriceRangeId) -> Result<Option<PriceRange>, RepositoryError>;

    /// Stores a new request together with its decision token.
    fn insert_request(
        &self,
        request: ServiceRequest,
        token: DecisionToken,
    ) -> Result<ServiceRequest, RepositoryError>;

    /// Replaces a request only while the stored copy is pending.
    ///
    /// `claim` is the digest of a decision token that must still be unused.
    /// When the new copy leaves `Pending` the request's token is marked used in
    /// the same step, so one token can never authorize two decisions.
    fn update_pending(
        &self,
        request: ServiceRequest,
        claim: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PendingUpdate, RepositoryError>;

    /// Records a delivered notification without touching the rest of the request.
    fn mark_emailed(
        &self,
        id: RequestId,
        recipient: EmailRecipient,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    fn request(&self, id: RequestId) -> Result<Option<ServiceRequest>, RepositoryError>;
    /// Every request, newest first.
    fn requests(&self) -> Result<Vec<ServiceRequest>, RepositoryError>;

    fn token_for(&self, request_id: RequestId) -> Result<Option<DecisionToken>, RepositoryError>;
}
