use super::domain::{
    ProviderId, ProviderListing, ProviderProfile, Session, UserAccount, UserId, UserProfile,
};
use crate::error::RepositoryError;

/// Storage abstraction for accounts, profiles and sessions.
///
/// Username and email lookups are case-insensitive; `insert_user` rejects a duplicate
/// username with `Conflict`.
pub trait AccountRepository: Send + Sync {
    fn insert_user(&self, user: UserAccount) -> Result<UserAccount, RepositoryError>;
    fn update_user(&self, user: UserAccount) -> Result<(), RepositoryError>;
    fn user(&self, id: UserId) -> Result<Option<UserAccount>, RepositoryError>;
    fn user_by_username(&self, username: &str) -> Result<Option<UserAccount>, RepositoryError>;
    fn user_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError>;

    fn save_user_profile(&self, profile: UserProfile) -> Result<(), RepositoryError>;
    fn user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, RepositoryError>;

    fn insert_provider(&self, profile: ProviderProfile) -> Result<ProviderProfile, RepositoryError>;
    fn update_provider(&self, profile: ProviderProfile) -> Result<(), RepositoryError>;
    fn provider(&self, id: ProviderId) -> Result<Option<ProviderProfile>, RepositoryError>;
    fn provider_for_user(&self, user_id: UserId)
        -> Result<Option<ProviderProfile>, RepositoryError>;
    /// Every provider joined with its account, newest profile first.
    fn provider_listings(&self) -> Result<Vec<ProviderListing>, RepositoryError>;

    fn insert_session(&self, session: Session) -> Result<(), RepositoryError>;
    fn session(&self, token_digest: &str) -> Result<Option<Session>, RepositoryError>;
    fn remove_session(&self, token_digest: &str) -> Result<(), RepositoryError>;
}
