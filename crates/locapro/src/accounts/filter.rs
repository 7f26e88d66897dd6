//! Provider search: chained narrowing, ordering and offset pagination over the
//! active provider listing.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::domain::{ProviderId, ProviderListing, ServiceType};

/// Named price bands keyed on a provider's minimum price.
pub const PRICE_RANGES: [(&str, f64, f64); 4] = [
    ("budget", 0.0, 50.0),
    ("moderate", 50.0, 150.0),
    ("premium", 150.0, 300.0),
    ("luxury", 300.0, 9999.0),
];

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Rating,
    Reviews,
    Price,
    Experience,
    Newest,
    Name,
}

impl SortField {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "rating" => Some(Self::Rating),
            "reviews" => Some(Self::Reviews),
            "price" => Some(Self::Price),
            "experience" => Some(Self::Experience),
            "newest" => Some(Self::Newest),
            "name" => Some(Self::Name),
            _ => None,
        }
    }

    fn compare(self, a: &ProviderListing, b: &ProviderListing) -> Ordering {
        let (a, b) = (&a.profile, &b.profile);
        let rating_desc = b.rating.total_cmp(&a.rating);
        match self {
            SortField::Rating => rating_desc.then(b.created_at.cmp(&a.created_at)),
            SortField::Reviews => b.total_reviews.cmp(&a.total_reviews).then(rating_desc),
            SortField::Price => a.min_price.total_cmp(&b.min_price).then(rating_desc),
            SortField::Experience => b.years_experience.cmp(&a.years_experience).then(rating_desc),
            SortField::Newest => b.created_at.cmp(&a.created_at),
            SortField::Name => a
                .company_name
                .to_lowercase()
                .cmp(&b.company_name.to_lowercase()),
        }
    }
}

/// Filters in the order they were applied; re-applying one replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedFilters(Vec<(String, Value)>);

impl AppliedFilters {
    fn record(&mut self, name: &str, value: Value) {
        match self.0.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for AppliedFilters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Query builder narrowing provider listings one criterion at a time.
#[derive(Debug, Clone)]
pub struct ProfessionalFilter {
    base: Vec<ProviderListing>,
    items: Vec<ProviderListing>,
    filters: AppliedFilters,
}

impl ProfessionalFilter {
    /// Start from providers whose account is active, newest first.
    pub fn new(listings: Vec<ProviderListing>) -> Self {
        let mut base: Vec<ProviderListing> = listings
            .into_iter()
            .filter(|listing| listing.user.is_active)
            .collect();
        base.sort_by(|a, b| SortField::Newest.compare(a, b));
        let items = base.clone();
        Self {
            base,
            items,
            filters: AppliedFilters::default(),
        }
    }

    fn record(&mut self, name: &str, value: impl Into<Value>) {
        self.filters.record(name, value.into());
    }

    fn retain(&mut self, keep: impl FnMut(&ProviderListing) -> bool) {
        self.items.retain(keep);
    }

    pub fn apply_service_filter(mut self, service_type: Option<&str>) -> Self {
        let Some(raw) = present(service_type) else {
            return self;
        };
        if raw == "all" {
            return self;
        }
        if let Some(service) = ServiceType::from_code(raw) {
            self.retain(|listing| listing.profile.service_type == service);
            self.record("service_type", service.code());
        }
        self
    }

    /// Narrow by city, state, region and free-text location.
    ///
    /// A region with no matches is skipped (not applied) when the listing was non-empty
    /// beforehand, and a notice for the caller is returned instead.
    pub fn apply_location_filter(
        mut self,
        location: Option<&str>,
        city: Option<&str>,
        state: Option<&str>,
        region: Option<&str>,
    ) -> (Self, Option<String>) {
        let mut region_message = None;
        let original_count = self.items.len();

        if let Some(city) = present(city) {
            let wanted = city.to_lowercase();
            self.retain(|listing| listing.profile.city.to_lowercase() == wanted);
            self.record("city", city);
        }

        if let Some(state) = present(state) {
            let wanted = state.to_lowercase();
            self.retain(|listing| listing.profile.state.to_lowercase() == wanted);
            self.record("state", state);
        }

        if let Some(region) = present(region) {
            let region_lower = region.to_lowercase();
            let matches = self
                .items
                .iter()
                .filter(|listing| listing.profile.state.to_lowercase() == region_lower)
                .count();

            if matches == 0 && original_count > 0 {
                region_message = Some(format!(
                    "No professionals found in {}. Showing professionals from other regions.",
                    title_case(region)
                ));
                self.record("region_not_found", region_lower);
            } else {
                self.retain(|listing| listing.profile.state.to_lowercase() == region_lower);
                self.record("region", region_lower);
            }
        }

        if let Some(location) = present(location) {
            let needle = location.to_lowercase();
            self.retain(|listing| {
                let profile = &listing.profile;
                [
                    &profile.city,
                    &profile.state,
                    &profile.business_address,
                    &profile.company_name,
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            });
            self.record("location", location);
        }

        (self, region_message)
    }

    pub fn apply_rating_filter(mut self, min_rating: Option<&str>) -> Self {
        let parsed = present(min_rating).and_then(|raw| raw.parse::<f32>().ok());
        if let Some(min) = parsed.filter(|value| (0.0..=5.0).contains(value)) {
            self.retain(|listing| listing.profile.rating >= min);
            self.record("min_rating", f64::from(min));
        }
        self
    }

    pub fn apply_experience_filter(mut self, min_experience: Option<&str>) -> Self {
        let parsed = present(min_experience).and_then(|raw| raw.parse::<i64>().ok());
        if let Some(min) = parsed.filter(|value| *value >= 0) {
            self.retain(|listing| i64::from(listing.profile.years_experience) >= min);
            self.record("min_experience", min);
        }
        self
    }

    /// Preset band first, explicit bounds override it.
    pub fn apply_price_filter(
        mut self,
        price_range: Option<&str>,
        min_price: Option<&str>,
        max_price: Option<&str>,
    ) -> Self {
        let mut lower = None;
        let mut upper = None;

        if let Some(preset) = present(price_range) {
            if let Some((name, min, max)) = PRICE_RANGES.iter().find(|(name, ..)| *name == preset)
            {
                lower = Some(*min);
                upper = Some(*max);
                self.record("price_range", *name);
            }
        }

        if let Some(min) = present(min_price).and_then(|raw| raw.parse::<f64>().ok()) {
            lower = Some(min);
        }
        if let Some(max) = present(max_price).and_then(|raw| raw.parse::<f64>().ok()) {
            upper = Some(max);
        }

        if let Some(min) = lower {
            self.retain(|listing| listing.profile.min_price >= min);
            self.record("min_price", min);
        }
        if let Some(max) = upper {
            self.retain(|listing| listing.profile.min_price <= max);
            self.record("max_price", max);
        }
        self
    }

    pub fn apply_verified_filter(mut self, verified_only: bool) -> Self {
        if verified_only {
            self.retain(|listing| listing.profile.is_verified);
            self.record("verified_only", true);
        }
        self
    }

    pub fn apply_review_count_filter(mut self, min_reviews: Option<&str>) -> Self {
        let parsed = present(min_reviews).and_then(|raw| raw.parse::<i64>().ok());
        if let Some(min) = parsed.filter(|value| *value >= 0) {
            self.retain(|listing| i64::from(listing.profile.total_reviews) >= min);
            self.record("min_reviews", min);
        }
        self
    }

    /// Unknown fields fall back to rating order; the requested name is still recorded.
    pub fn sort_by(mut self, sort_field: &str) -> Self {
        let field = SortField::parse(sort_field).unwrap_or(SortField::Rating);
        self.items.sort_by(|a, b| field.compare(a, b));
        self.record("sort", sort_field);
        self
    }

    pub fn paginate(&self, page: usize, limit: usize) -> Page<ProviderListing> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let total = self.items.len();
        let pages = total.div_ceil(limit);
        let offset = (page - 1).saturating_mul(limit);
        let items = self
            .items
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Page {
            items,
            page,
            limit,
            total,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
            offset,
        }
    }

    pub fn results(&self) -> &[ProviderListing] {
        &self.items
    }

    pub fn filters_applied(&self) -> &AppliedFilters {
        &self.filters
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Sorted distinct states across every active provider.
    pub fn region_alternatives(&self) -> Vec<String> {
        self.base
            .iter()
            .map(|listing| listing.profile.state.trim())
            .filter(|state| !state.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Parse raw page/limit query values; any unparseable value resets both to defaults.
pub fn parse_page_request(page: Option<&str>, limit: Option<&str>) -> (usize, usize) {
    let page = page.map(|raw| raw.trim().parse::<i64>());
    let limit = limit.map(|raw| raw.trim().parse::<i64>());
    match (page, limit) {
        (Some(Err(_)), _) | (_, Some(Err(_))) => (1, DEFAULT_PAGE_SIZE),
        (page, limit) => {
            let page = page.and_then(Result::ok).unwrap_or(1).max(1);
            let limit = limit
                .and_then(Result::ok)
                .unwrap_or(DEFAULT_PAGE_SIZE as i64)
                .clamp(1, MAX_PAGE_SIZE as i64);
            (page as usize, limit as usize)
        }
    }
}

/// Offset page of results plus navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub offset: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
            pages: self.pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
            offset: self.offset,
        }
    }
}

/// Public card for a provider in search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessionalSummary {
    pub id: ProviderId,
    pub name: String,
    pub company: String,
    pub service: &'static str,
    #[serde(rename = "serviceType")]
    pub service_type: &'static str,
    pub rating: f32,
    pub reviews: u32,
    pub verified: bool,
    pub experience: u32,
    pub price_range: &'static str,
    pub min_price: f64,
    pub location: String,
    pub city: String,
    pub state: String,
    pub region: String,
    pub bio: String,
    pub phone: String,
    pub verified_badge: bool,
}

impl From<&ProviderListing> for ProfessionalSummary {
    fn from(listing: &ProviderListing) -> Self {
        let profile = &listing.profile;
        let location = if !profile.city.is_empty() && !profile.state.is_empty() {
            format!("{}, {}", profile.city, profile.state)
        } else {
            "Location not available".to_string()
        };

        Self {
            id: profile.id,
            name: listing.display_name(),
            company: profile.company_name.clone(),
            service: profile.service_type.label(),
            service_type: profile.service_type.code(),
            rating: profile.rating,
            reviews: profile.total_reviews,
            verified: profile.is_verified,
            experience: profile.years_experience,
            price_range: price_tier(profile.min_price),
            min_price: profile.min_price,
            location,
            city: profile.city.clone(),
            state: profile.state.clone(),
            region: profile.state.clone(),
            bio: profile.bio.clone(),
            phone: profile.phone.clone(),
            verified_badge: profile.is_verified,
        }
    }
}

/// Band name for a minimum price.
pub fn price_tier(min_price: f64) -> &'static str {
    if min_price < 50.0 {
        "budget"
    } else if min_price < 150.0 {
        "moderate"
    } else if min_price < 300.0 {
        "premium"
    } else {
        "luxury"
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Uppercase each letter that follows a non-letter, lowercase the rest.
/// Separators are kept as typed, so `far_north` reads `Far_North`.
fn title_case(value: &str) -> String {
    let mut titled = String::with_capacity(value.len());
    let mut after_letter = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if after_letter {
                titled.extend(c.to_lowercase());
            } else {
                titled.extend(c.to_uppercase());
            }
            after_letter = true;
        } else {
            titled.push(c);
            after_letter = false;
        }
    }
    titled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::domain::{ProviderProfile, UserAccount, UserId};
    use chrono::{Duration, TimeZone, Utc};

    fn listing(
        id: u64,
        company: &str,
        service: ServiceType,
        state: &str,
        rating: f32,
        min_price: f64,
    ) -> ProviderListing {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap() + Duration::days(id as i64);
        let user = UserAccount {
            id: UserId(id),
            username: format!("pro{id}"),
            email: format!("pro{id}@example.com"),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: String::new(),
            is_active: true,
            is_staff: false,
            date_joined: created,
        };
        let mut profile = ProviderProfile::new(ProviderId(id), UserId(id), created);
        profile.company_name = company.to_string();
        profile.service_type = service;
        profile.city = "Douala".to_string();
        profile.state = state.to_string();
        profile.rating = rating;
        profile.min_price = min_price;
        profile.total_reviews = id as u32 * 3;
        profile.years_experience = id as u32;
        ProviderListing { profile, user }
    }

    fn catalogue() -> Vec<ProviderListing> {
        vec![
            listing(1, "Aqua Fix", ServiceType::Plumbing, "Littoral", 4.5, 40.0),
            listing(2, "Bright Sparks", ServiceType::Electrical, "Centre", 4.8, 120.0),
            listing(3, "Clean Sweep", ServiceType::Cleaning, "Littoral", 3.9, 200.0),
            listing(4, "Pipe Masters", ServiceType::Plumbing, "West", 4.8, 350.0),
        ]
    }

    fn ids(filter: &ProfessionalFilter) -> Vec<u64> {
        filter.results().iter().map(|l| l.profile.id.0).collect()
    }

    #[test]
    fn base_listing_excludes_inactive_accounts_and_is_newest_first() {
        let mut providers = catalogue();
        providers[1].user.is_active = false;
        let filter = ProfessionalFilter::new(providers);
        assert_eq!(ids(&filter), vec![4, 3, 1]);
    }

    #[test]
    fn service_filter_ignores_all_and_unknown_values() {
        let filter = ProfessionalFilter::new(catalogue()).apply_service_filter(Some("all"));
        assert_eq!(filter.count(), 4);
        let filter = filter.apply_service_filter(Some("astrology"));
        assert_eq!(filter.count(), 4);
        assert!(filter.filters_applied().is_empty());

        let filter = filter.apply_service_filter(Some("plumbing"));
        assert_eq!(ids(&filter), vec![4, 1]);
        assert_eq!(
            filter.filters_applied().get("service_type"),
            Some(&Value::from("plumbing"))
        );
    }

    #[test]
    fn missing_region_keeps_results_and_reports_message() {
        let (filter, message) = ProfessionalFilter::new(catalogue()).apply_location_filter(
            None,
            None,
            None,
            Some("far_north"),
        );
        assert_eq!(filter.count(), 4);
        assert_eq!(
            message.as_deref(),
            Some("No professionals found in Far_North. Showing professionals from other regions.")
        );
        assert_eq!(
            filter.filters_applied().get("region_not_found"),
            Some(&Value::from("far_north"))
        );
    }

    #[test]
    fn title_case_capitalizes_after_any_non_letter() {
        assert_eq!(title_case("far_north"), "Far_North");
        assert_eq!(title_case("SOUTH west"), "South West");
        assert_eq!(title_case("o'neil 3rd"), "O'Neil 3Rd");
    }

    #[test]
    fn applied_filters_keep_application_order() {
        let (filter, _) = ProfessionalFilter::new(catalogue())
            .apply_service_filter(Some("plumbing"))
            .apply_location_filter(None, Some("Douala"), None, None);
        let filter = filter
            .apply_rating_filter(Some("1"))
            .sort_by("price")
            .sort_by("rating");
        let names: Vec<&str> = filter.filters_applied().names().collect();
        assert_eq!(names, ["service_type", "city", "min_rating", "sort"]);
        assert_eq!(filter.filters_applied().get("sort"), Some(&Value::from("rating")));

        let json = serde_json::to_string(filter.filters_applied()).expect("json");
        assert!(json.starts_with("{\"service_type\":\"plumbing\",\"city\":"));
    }

    #[test]
    fn region_matches_state_case_insensitively() {
        let (filter, message) = ProfessionalFilter::new(catalogue()).apply_location_filter(
            None,
            None,
            None,
            Some(" LITTORAL "),
        );
        assert!(message.is_none());
        assert_eq!(ids(&filter), vec![3, 1]);
        assert_eq!(filter.filters_applied().get("region"), Some(&Value::from("littoral")));
    }

    #[test]
    fn location_searches_company_and_address_fields() {
        let (filter, _) = ProfessionalFilter::new(catalogue()).apply_location_filter(
            Some("sweep"),
            None,
            None,
            None,
        );
        assert_eq!(ids(&filter), vec![3]);
    }

    #[test]
    fn rating_filter_ignores_out_of_range_and_garbage() {
        let filter = ProfessionalFilter::new(catalogue())
            .apply_rating_filter(Some("7"))
            .apply_rating_filter(Some("high"));
        assert_eq!(filter.count(), 4);

        let filter = filter.apply_rating_filter(Some("4.5"));
        assert_eq!(ids(&filter), vec![4, 2, 1]);
    }

    #[test]
    fn explicit_price_bounds_override_preset() {
        let filter = ProfessionalFilter::new(catalogue()).apply_price_filter(
            Some("moderate"),
            None,
            Some("250"),
        );
        assert_eq!(ids(&filter), vec![3, 2]);
        let applied = filter.filters_applied();
        assert_eq!(applied.get("price_range"), Some(&Value::from("moderate")));
        assert_eq!(applied.get("min_price"), Some(&Value::from(50.0)));
        assert_eq!(applied.get("max_price"), Some(&Value::from(250.0)));
    }

    #[test]
    fn sort_orders_break_ties_on_rating() {
        let filter = ProfessionalFilter::new(catalogue()).sort_by("price");
        assert_eq!(ids(&filter), vec![1, 2, 3, 4]);

        let filter = filter.sort_by("rating");
        assert_eq!(ids(&filter), vec![4, 2, 1, 3]);

        let filter = filter.sort_by("bogus");
        assert_eq!(ids(&filter), vec![4, 2, 1, 3]);
        assert_eq!(filter.filters_applied().get("sort"), Some(&Value::from("bogus")));
    }

    #[test]
    fn paginate_reports_navigation() {
        let filter = ProfessionalFilter::new(catalogue());
        let page = filter.paginate(2, 3);
        assert_eq!(page.total, 4);
        assert_eq!(page.pages, 2);
        assert_eq!(page.offset, 3);
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_next);
        assert!(page.has_prev);

        let clamped = filter.paginate(0, 1000);
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.limit, MAX_PAGE_SIZE);
        assert!(!clamped.has_prev);
    }

    #[test]
    fn page_request_parsing_resets_on_garbage() {
        assert_eq!(parse_page_request(None, None), (1, 20));
        assert_eq!(parse_page_request(Some("3"), Some("500")), (3, 100));
        assert_eq!(parse_page_request(Some("-2"), Some("0")), (1, 1));
        assert_eq!(parse_page_request(Some("two"), Some("50")), (1, 20));
    }

    #[test]
    fn summary_uses_company_name_and_tier() {
        let summary = ProfessionalSummary::from(&catalogue()[1]);
        assert_eq!(summary.name, "Bright Sparks");
        assert_eq!(summary.service, "Electrical");
        assert_eq!(summary.price_range, "moderate");
        assert_eq!(summary.location, "Douala, Centre");
    }

    #[test]
    fn region_alternatives_are_sorted_and_distinct() {
        let filter = ProfessionalFilter::new(catalogue());
        assert_eq!(
            filter.region_alternatives(),
            vec!["Centre".to_string(), "Littoral".to_string(), "West".to_string()]
        );
    }
}
