//! Service requests: creation, provider decisions, exports and tracking.

pub mod domain;
pub mod export;
pub mod forms;
pub mod geo;
pub(crate) mod pages;
pub mod repository;
pub mod router;
pub mod service;
pub mod tracking;

#[cfg(test)]
mod tests;

pub use domain::{
    format_decline_reason, DecisionAction, DecisionToken, DeclineReason, EmailRecipient,
    InvalidTransition, PriceRange, PriceRangeId, RequestId, RequestPhoto, RequestStatus,
    ServiceRequest, TokenLifetimeOverflow,
};
pub use export::{ExportError, ExportFilters, ExportRow};
pub use forms::{AcceptForm, DecisionForm, DeclineForm, PhotoUpload, RequestEdit, RequestForm};
pub use repository::{PendingUpdate, RequestRepository};
pub use router::request_router;
pub use service::{
    Coordinates, DecisionPreview, IssuedRequest, RequestService, RequestServiceError,
    RequestView, TokenError,
};
pub use tracking::{ProviderLocation, TrackingError};
