//! Zip-code based approximations used for distances, addresses and tracking.

use crate::accounts::{ProviderProfile, UserProfile};

const BASE_LATITUDE: f64 = 40.7128;
const BASE_LONGITUDE: f64 = -74.0060;
const MILES_PER_ZIP_STEP: f64 = 0.5;
const MAX_ZIP_DISTANCE_MILES: f64 = 500.0;
const EARTH_RADIUS_KM: f64 = 6371.0;
const EARTH_RADIUS_MILES: f64 = 3959.0;
const CITY_SPEED_KMH: f64 = 30.0;
const ETA_BUFFER_MINUTES: i64 = 5;

/// Deterministic stand-in coordinates for a numeric zip code.
pub fn pseudo_coordinates(zip_code: &str) -> Option<(f64, f64)> {
    let zip = zip_code.trim().parse::<u64>().ok()?;
    let latitude = BASE_LATITUDE + (zip % 1000) as f64 * 0.001;
    let longitude = BASE_LONGITUDE + (zip % 2000) as f64 * 0.001;
    Some((latitude, longitude))
}

fn zip_number(zip_code: &str) -> Option<i64> {
    let zip = zip_code.trim();
    if zip.is_empty() {
        Some(0)
    } else {
        zip.parse::<i64>().ok()
    }
}

/// Rough miles between two zip codes; empty counts as zero, non-numeric gives none.
pub fn zip_distance_miles(customer_zip: &str, provider_zip: &str) -> Option<f64> {
    let customer = zip_number(customer_zip)?;
    let provider = zip_number(provider_zip)?;
    let miles = (customer - provider).unsigned_abs() as f64 * MILES_PER_ZIP_STEP;
    Some(miles.min(MAX_ZIP_DISTANCE_MILES))
}

/// Distance between a customer and a provider; needs both profiles.
pub fn request_distance_miles(
    customer: Option<&UserProfile>,
    provider: Option<&ProviderProfile>,
) -> Option<f64> {
    let (customer, provider) = (customer?, provider?);
    zip_distance_miles(&customer.zip_code, &provider.zip_code)
}

fn haversine(radius: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    radius * c
}

pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    haversine(EARTH_RADIUS_KM, from, to)
}

/// Great-circle miles rounded to one decimal.
pub fn haversine_miles(from: (f64, f64), to: (f64, f64)) -> f64 {
    (haversine(EARTH_RADIUS_MILES, from, to) * 10.0).round() / 10.0
}

/// Minutes at city speed plus a fixed buffer, never below the buffer.
pub fn eta_minutes(distance_km: f64) -> i64 {
    let travel = (distance_km / CITY_SPEED_KMH * 60.0).floor() as i64;
    (travel + ETA_BUFFER_MINUTES).max(ETA_BUFFER_MINUTES)
}

/// Anything carrying a postal address.
pub trait Addressable {
    fn street(&self) -> &str;
    fn city(&self) -> &str;
    fn state(&self) -> &str;
    fn zip_code(&self) -> &str;
}

impl Addressable for UserProfile {
    fn street(&self) -> &str {
        &self.address
    }
    fn city(&self) -> &str {
        &self.city
    }
    fn state(&self) -> &str {
        &self.state
    }
    fn zip_code(&self) -> &str {
        &self.zip_code
    }
}

impl Addressable for ProviderProfile {
    fn street(&self) -> &str {
        &self.business_address
    }
    fn city(&self) -> &str {
        &self.city
    }
    fn state(&self) -> &str {
        &self.state
    }
    fn zip_code(&self) -> &str {
        &self.zip_code
    }
}

pub const ADDRESS_UNAVAILABLE: &str = "Address not available";

pub fn address_string(profile: Option<&dyn Addressable>) -> String {
    let Some(profile) = profile else {
        return ADDRESS_UNAVAILABLE.to_string();
    };
    let parts: Vec<&str> = [
        profile.street(),
        profile.city(),
        profile.state(),
        profile.zip_code(),
    ]
    .into_iter()
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect();

    if parts.is_empty() {
        ADDRESS_UNAVAILABLE.to_string()
    } else {
        parts.join(", ")
    }
}
