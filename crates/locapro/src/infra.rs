//! Thread-safe in-memory repositories backing the server and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::accounts::{
    AccountRepository, ProviderId, ProviderListing, ProviderProfile, Session, UserAccount, UserId,
    UserProfile,
};
use crate::error::RepositoryError;
use crate::requests::{
    DecisionToken, EmailRecipient, PendingUpdate, PriceRange, PriceRangeId, RequestId,
    RequestRepository, RequestStatus, ServiceRequest,
};

#[derive(Default)]
struct AccountTables {
    users: HashMap<UserId, UserAccount>,
    profiles: HashMap<UserId, UserProfile>,
    providers: HashMap<ProviderId, ProviderProfile>,
    sessions: HashMap<String, Session>,
}

#[derive(Default, Clone)]
pub struct InMemoryAccountRepository {
    tables: Arc<Mutex<AccountTables>>,
}

impl InMemoryAccountRepository {
    fn with_tables<T>(&self, f: impl FnOnce(&mut AccountTables) -> T) -> T {
        let mut guard = self.tables.lock().expect("repository mutex poisoned");
        f(&mut guard)
    }
}

impl AccountRepository for InMemoryAccountRepository {
    fn insert_user(&self, user: UserAccount) -> Result<UserAccount, RepositoryError> {
        self.with_tables(|tables| {
            let taken = tables.users.contains_key(&user.id)
                || tables
                    .users
                    .values()
                    .any(|existing| existing.username.eq_ignore_ascii_case(&user.username));
            if taken {
                return Err(RepositoryError::Conflict);
            }
            tables.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    fn update_user(&self, user: UserAccount) -> Result<(), RepositoryError> {
        self.with_tables(|tables| match tables.users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        })
    }

    fn user(&self, id: UserId) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self.with_tables(|tables| tables.users.get(&id).cloned()))
    }

    fn user_by_username(&self, username: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let username = username.trim();
        Ok(self.with_tables(|tables| {
            tables
                .users
                .values()
                .find(|user| user.username.eq_ignore_ascii_case(username))
                .cloned()
        }))
    }

    fn user_by_email(&self, email: &str) -> Result<Option<UserAccount>, RepositoryError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }
        Ok(self.with_tables(|tables| {
            tables
                .users
                .values()
                .find(|user| user.email.eq_ignore_ascii_case(email))
                .cloned()
        }))
    }

    fn save_user_profile(&self, profile: UserProfile) -> Result<(), RepositoryError> {
        self.with_tables(|tables| {
            tables.profiles.insert(profile.user_id, profile);
        });
        Ok(())
    }

    fn user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, RepositoryError> {
        Ok(self.with_tables(|tables| tables.profiles.get(&user_id).cloned()))
    }

    fn insert_provider(&self, profile: ProviderProfile) -> Result<ProviderProfile, RepositoryError> {
        self.with_tables(|tables| {
            let taken = tables.providers.contains_key(&profile.id)
                || tables
                    .providers
                    .values()
                    .any(|existing| existing.user_id == profile.user_id);
            if taken {
                return Err(RepositoryError::Conflict);
            }
            tables.providers.insert(profile.id, profile.clone());
            Ok(profile)
        })
    }

    fn update_provider(&self, profile: ProviderProfile) -> Result<(), RepositoryError> {
        self.with_tables(|tables| match tables.providers.get_mut(&profile.id) {
            Some(slot) => {
                *slot = profile;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        })
    }

    fn provider(&self, id: ProviderId) -> Result<Option<ProviderProfile>, RepositoryError> {
        Ok(self.with_tables(|tables| tables.providers.get(&id).cloned()))
    }

    fn provider_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<ProviderProfile>, RepositoryError> {
        Ok(self.with_tables(|tables| {
            tables
                .providers
                .values()
                .find(|profile| profile.user_id == user_id)
                .cloned()
        }))
    }

    fn provider_listings(&self) -> Result<Vec<ProviderListing>, RepositoryError> {
        let mut listings = self.with_tables(|tables| {
            tables
                .providers
                .values()
                .filter_map(|profile| {
                    tables.users.get(&profile.user_id).map(|user| ProviderListing {
                        profile: profile.clone(),
                        user: user.clone(),
                    })
                })
                .collect::<Vec<_>>()
        });
        listings.sort_by(|a, b| {
            b.profile
                .created_at
                .cmp(&a.profile.created_at)
                .then(b.profile.id.cmp(&a.profile.id))
        });
        Ok(listings)
    }

    fn insert_session(&self, session: Session) -> Result<(), RepositoryError> {
        self.with_tables(|tables| {
            tables.sessions.insert(session.token_digest.clone(), session);
        });
        Ok(())
    }

    fn session(&self, token_digest: &str) -> Result<Option<Session>, RepositoryError> {
        Ok(self.with_tables(|tables| tables.sessions.get(token_digest).cloned()))
    }

    fn remove_session(&self, token_digest: &str) -> Result<(), RepositoryError> {
        self.with_tables(|tables| {
            tables.sessions.remove(token_digest);
        });
        Ok(())
    }
}

#[derive(Default)]
struct RequestTables {
    price_ranges: HashMap<PriceRangeId, PriceRange>,
    requests: HashMap<RequestId, ServiceRequest>,
    tokens: HashMap<RequestId, DecisionToken>,
}

#[derive(Default, Clone)]
pub struct InMemoryRequestRepository {
    tables: Arc<Mutex<RequestTables>>,
}

impl InMemoryRequestRepository {
    fn with_tables<T>(&self, f: impl FnOnce(&mut RequestTables) -> T) -> T {
        let mut guard = self.tables.lock().expect("repository mutex poisoned");
        f(&mut guard)
    }
}

impl RequestRepository for InMemoryRequestRepository {
    fn insert_price_range(&self, range: PriceRange) -> Result<PriceRange, RepositoryError> {
        self.with_tables(|tables| {
            if tables.price_ranges.contains_key(&range.id) {
                return Err(RepositoryError::Conflict);
            }
            tables.price_ranges.insert(range.id, range.clone());
            Ok(range)
        })
    }

    fn price_ranges(&self) -> Result<Vec<PriceRange>, RepositoryError> {
        let mut ranges =
            self.with_tables(|tables| tables.price_ranges.values().cloned().collect::<Vec<_>>());
        ranges.sort_by_key(|range| (range.min_price, range.id));
        Ok(ranges)
    }

    fn price_range(&self, id: PriceRangeId) -> Result<Option<PriceRange>, RepositoryError> {
        Ok(self.with_tables(|tables| tables.price_ranges.get(&id).cloned()))
    }

    fn insert_request(
        &self,
        request: ServiceRequest,
        token: DecisionToken,
    ) -> Result<ServiceRequest, RepositoryError> {
        self.with_tables(|tables| {
            if tables.requests.contains_key(&request.id) || token.request_id != request.id {
                return Err(RepositoryError::Conflict);
            }
            tables.tokens.insert(request.id, token);
            tables.requests.insert(request.id, request.clone());
            Ok(request)
        })
    }

    fn update_pending(
        &self,
        request: ServiceRequest,
        claim: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PendingUpdate, RepositoryError> {
        self.with_tables(|tables| {
            let stored = tables
                .requests
                .get(&request.id)
                .map(|stored| stored.status)
                .ok_or(RepositoryError::NotFound)?;
            if stored != RequestStatus::Pending {
                return Ok(PendingUpdate::AlreadyDecided(stored));
            }

            let token = tables.tokens.get_mut(&request.id);
            if let Some(digest) = claim {
                let claimable = token
                    .as_ref()
                    .is_some_and(|token| !token.used && token.token_digest == digest);
                if !claimable {
                    return Ok(PendingUpdate::TokenSpent);
                }
            }
            if !request.is_pending() {
                if let Some(token) = token.filter(|token| !token.used) {
                    token.mark_used(now);
                }
            }
            tables.requests.insert(request.id, request);
            Ok(PendingUpdate::Applied)
        })
    }

    fn mark_emailed(
        &self,
        id: RequestId,
        recipient: EmailRecipient,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.with_tables(|tables| match tables.requests.get_mut(&id) {
            Some(request) => {
                request.mark_emailed(recipient, at);
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        })
    }

    fn request(&self, id: RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        Ok(self.with_tables(|tables| tables.requests.get(&id).cloned()))
    }

    fn requests(&self) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let mut requests =
            self.with_tables(|tables| tables.requests.values().cloned().collect::<Vec<_>>());
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    fn token_for(&self, request_id: RequestId) -> Result<Option<DecisionToken>, RepositoryError> {
        Ok(self.with_tables(|tables| tables.tokens.get(&request_id).cloned()))
    }
}
