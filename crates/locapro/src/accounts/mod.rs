//! Accounts, provider profiles, sessions and provider search.

pub mod domain;
pub mod filter;
mod password;
pub mod repository;
pub mod router;
pub mod service;

pub use domain::{
    AccountContext, ProviderId, ProviderListing, ProviderProfile, ServiceRate, ServiceType,
    Session, UserAccount, UserId, UserProfile,
};
pub use filter::{
    parse_page_request, price_tier, AppliedFilters, Page, ProfessionalFilter, ProfessionalSummary,
};
pub use password::PasswordError;
pub use repository::AccountRepository;
pub use router::account_router;
pub use service::{
    AccountError, AccountService, DemoProviderSeed, LoginOutcome, ProviderPricing,
    ProviderProfileUpdate, ProviderRegistration, UserProfileUpdate, UserProfileView,
    UserRegistration, DEMO_USERNAME_PREFIX,
};
