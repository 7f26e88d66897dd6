//! Wires repositories, services and routers into one application.

use std::sync::Arc;

use axum::Router;

use crate::accounts::{account_router, AccountRepository, AccountService};
use crate::config::{EmailConfig, SessionConfig, WorkflowConfig};
use crate::email::{EmailDispatcher, EmailError};
use crate::infra::{InMemoryAccountRepository, InMemoryRequestRepository};
use crate::requests::{request_router, RequestRepository, RequestService};

pub struct Marketplace<A, Q> {
    pub accounts: Arc<AccountService<A>>,
    pub requests: Arc<RequestService<A, Q>>,
}

impl<A, Q> Clone for Marketplace<A, Q> {
    fn clone(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
            requests: Arc::clone(&self.requests),
        }
    }
}

pub type InMemoryMarketplace = Marketplace<InMemoryAccountRepository, InMemoryRequestRepository>;

impl<A, Q> Marketplace<A, Q>
where
    A: AccountRepository + 'static,
    Q: RequestRepository + 'static,
{
    pub fn new(
        accounts: A,
        requests: Q,
        session: SessionConfig,
        workflow: WorkflowConfig,
        mailer: EmailDispatcher,
    ) -> Self {
        let account_service = Arc::new(AccountService::new(Arc::new(accounts), session));
        let request_service = Arc::new(RequestService::new(
            Arc::clone(&account_service),
            Arc::new(requests),
            mailer,
            workflow,
        ));
        Self {
            accounts: account_service,
            requests: request_service,
        }
    }

    /// Account and request endpoints merged into one router.
    pub fn router(&self) -> Router {
        account_router(Arc::clone(&self.accounts)).merge(request_router(Arc::clone(&self.requests)))
    }
}

impl InMemoryMarketplace {
    pub fn in_memory(
        email: &EmailConfig,
        session: SessionConfig,
        workflow: WorkflowConfig,
    ) -> Result<Self, EmailError> {
        let mailer = EmailDispatcher::from_config(email)?;
        Ok(Self::new(
            InMemoryAccountRepository::default(),
            InMemoryRequestRepository::default(),
            session,
            workflow,
            mailer,
        ))
    }
}
