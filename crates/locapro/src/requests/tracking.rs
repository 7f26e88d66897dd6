use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{RequestStatus, ServiceRequest};
use super::geo::{eta_minutes, haversine_km, pseudo_coordinates};
use crate::accounts::{ProviderListing, UserId, UserProfile};
use crate::http::ErrorCode;

/// Live position of the provider assigned to an accepted request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderLocation {
    pub success: bool,
    pub provider_id: UserId,
    pub provider_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub eta_minutes: Option<i64>,
    pub last_updated: DateTime<Utc>,
    pub provider_phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrackingError {
    #[error("You do not have permission to track this provider.")]
    NotOwner,
    #[error("This request has not been accepted yet. Provider location is only available for accepted requests.")]
    NotAccepted,
    #[error("No provider assigned to this request.")]
    NoProvider,
    #[error("Provider profile not found.")]
    ProviderProfileNotFound,
    #[error("Provider location is not available at this time. The provider may not have enabled location sharing.")]
    LocationNotAvailable,
}

impl TrackingError {
    pub const fn code(self) -> ErrorCode {
        match self {
            TrackingError::NotOwner => ErrorCode::Unauthorized,
            TrackingError::NotAccepted => ErrorCode::RequestNotAccepted,
            TrackingError::NoProvider => ErrorCode::NoProvider,
            TrackingError::ProviderProfileNotFound => ErrorCode::ProviderProfileNotFound,
            TrackingError::LocationNotAvailable => ErrorCode::LocationNotAvailable,
        }
    }
}

/// Checks run in order: ownership, status, assignment, profile, coordinates.
pub fn locate_provider(
    viewer: UserId,
    request: &ServiceRequest,
    provider: Option<&ProviderListing>,
    customer: Option<&UserProfile>,
) -> Result<ProviderLocation, TrackingError> {
    if request.user_id != viewer {
        return Err(TrackingError::NotOwner);
    }
    if request.status != RequestStatus::Accepted {
        return Err(TrackingError::NotAccepted);
    }
    let provider_id = request.provider_id.ok_or(TrackingError::NoProvider)?;
    let listing = provider.ok_or(TrackingError::ProviderProfileNotFound)?;
    let (latitude, longitude) = listing
        .profile
        .coordinates()
        .ok_or(TrackingError::LocationNotAvailable)?;

    let eta = customer
        .filter(|profile| !profile.zip_code.trim().is_empty())
        .filter(|_| !listing.profile.zip_code.trim().is_empty())
        .and_then(|profile| pseudo_coordinates(&profile.zip_code))
        .map(|destination| eta_minutes(haversine_km((latitude, longitude), destination)));

    let phone = listing.profile.phone.trim();
    Ok(ProviderLocation {
        success: true,
        provider_id,
        provider_name: listing.display_name(),
        latitude,
        longitude,
        eta_minutes: eta,
        last_updated: listing.profile.updated_at,
        provider_phone: (!phone.is_empty()).then(|| phone.to_string()),
    })
}
