use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for login accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Identifier wrapper for provider profiles (distinct from the owning account).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login identity shared by customers, providers and staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl UserAccount {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Full name when one is on file, otherwise the username.
    pub fn display_name(&self) -> String {
        let full = self.full_name();
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }
}

/// Contact details for customers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            phone: String::new(),
            address: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Plumbing,
    Electrical,
    Carpentry,
    Cleaning,
    Tutoring,
    Hvac,
    Roofing,
    Landscaping,
    Painting,
    Other,
}

impl ServiceType {
    pub const ALL: [ServiceType; 10] = [
        ServiceType::Plumbing,
        ServiceType::Electrical,
        ServiceType::Carpentry,
        ServiceType::Cleaning,
        ServiceType::Tutoring,
        ServiceType::Hvac,
        ServiceType::Roofing,
        ServiceType::Landscaping,
        ServiceType::Painting,
        ServiceType::Other,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            ServiceType::Plumbing => "plumbing",
            ServiceType::Electrical => "electrical",
            ServiceType::Carpentry => "carpentry",
            ServiceType::Cleaning => "cleaning",
            ServiceType::Tutoring => "tutoring",
            ServiceType::Hvac => "hvac",
            ServiceType::Roofing => "roofing",
            ServiceType::Landscaping => "landscaping",
            ServiceType::Painting => "painting",
            ServiceType::Other => "other",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ServiceType::Plumbing => "Plumbing",
            ServiceType::Electrical => "Electrical",
            ServiceType::Carpentry => "Carpentry",
            ServiceType::Cleaning => "Cleaning",
            ServiceType::Tutoring => "Tutoring",
            ServiceType::Hvac => "HVAC",
            ServiceType::Roofing => "Roofing",
            ServiceType::Landscaping => "Landscaping",
            ServiceType::Painting => "Painting",
            ServiceType::Other => "Other",
        }
    }

    /// Exact code match; callers decide what an unknown value means.
    pub fn from_code(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|service| service.code() == value.trim())
    }
}

/// How a provider quotes work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRate {
    #[default]
    Hourly,
    Fixed,
    Custom,
}

/// Business-facing profile attached to a provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: ProviderId,
    pub user_id: UserId,
    pub company_name: String,
    pub service_type: ServiceType,
    pub phone: String,
    pub business_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub service_description: String,
    pub bio: String,
    pub services_rendered: u32,
    pub years_experience: u32,
    pub rating: f32,
    pub total_reviews: u32,
    pub is_verified: bool,
    pub min_price: f64,
    pub max_price: Option<f64>,
    pub service_rate: ServiceRate,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderProfile {
    pub const DEFAULT_MIN_PRICE: f64 = 50.0;
    pub const DEFAULT_RATING: f32 = 5.0;

    pub fn new(id: ProviderId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            company_name: String::new(),
            service_type: ServiceType::Other,
            phone: String::new(),
            business_address: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            service_description: String::new(),
            bio: String::new(),
            services_rendered: 0,
            years_experience: 0,
            rating: Self::DEFAULT_RATING,
            total_reviews: 0,
            is_verified: false,
            min_price: Self::DEFAULT_MIN_PRICE,
            max_price: None,
            service_rate: ServiceRate::default(),
            latitude: None,
            longitude: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// A provider profile joined with its owning account.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderListing {
    pub profile: ProviderProfile,
    pub user: UserAccount,
}

impl ProviderListing {
    /// Company name, else full name, else username.
    pub fn display_name(&self) -> String {
        if self.profile.company_name.trim().is_empty() {
            self.user.display_name()
        } else {
            self.profile.company_name.clone()
        }
    }
}

/// Server-side login session; only the digest of the bearer secret is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token_digest: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Authenticated caller resolved from a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountContext {
    pub user: UserAccount,
    pub provider: Option<ProviderProfile>,
}

impl AccountContext {
    pub fn is_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }
}
