use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;

use super::{mailer_from_config, EmailError, EmailMessage, Mailer};
use crate::config::EmailConfig;

/// Bounded retry schedule for a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// What `dispatch` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to a blocking worker; the outcome is only logged.
    Scheduled,
    Sent { attempts: u32 },
    Failed,
}

impl Delivery {
    /// True unless the message was already given up on.
    pub fn accepted(self) -> bool {
        !matches!(self, Delivery::Failed)
    }
}

/// Sends mail through a `Mailer` with retries, off the request path when possible.
#[derive(Clone)]
pub struct EmailDispatcher {
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    background: bool,
    default_from: String,
    site_url: String,
}

impl EmailDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, policy: RetryPolicy, config: &EmailConfig) -> Self {
        Self {
            mailer,
            policy,
            background: config.deliver_async,
            default_from: config.default_from.clone(),
            site_url: config.site_url.clone(),
        }
    }

    pub fn from_config(config: &EmailConfig) -> Result<Self, EmailError> {
        let mailer = mailer_from_config(config)?;
        let policy = RetryPolicy::new(config.max_attempts, config.retry_delay);
        Ok(Self::new(mailer, policy, config))
    }

    pub fn default_from(&self) -> &str {
        &self.default_from
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Fire-and-forget delivery. Failures are logged, never returned.
    pub fn dispatch(&self, message: EmailMessage, kind: &'static str) -> Delivery {
        if self.background {
            if let Ok(handle) = Handle::try_current() {
                let mailer = Arc::clone(&self.mailer);
                let policy = self.policy;
                tracing::info!(kind, to = %message.to, "email scheduled");
                drop(handle.spawn_blocking(move || {
                    let _ = deliver_with_retry(mailer.as_ref(), policy, &message, kind);
                }));
                return Delivery::Scheduled;
            }
        }

        match deliver_with_retry(self.mailer.as_ref(), self.policy, &message, kind) {
            Ok(attempts) => Delivery::Sent { attempts },
            Err(_) => Delivery::Failed,
        }
    }

    /// Deliver inline and report the final error, for operator tooling.
    pub fn send_now(&self, message: &EmailMessage, kind: &'static str) -> Result<u32, EmailError> {
        deliver_with_retry(self.mailer.as_ref(), self.policy, message, kind)
    }
}

fn deliver_with_retry(
    mailer: &dyn Mailer,
    policy: RetryPolicy,
    message: &EmailMessage,
    kind: &'static str,
) -> Result<u32, EmailError> {
    let mut attempt = 1;
    loop {
        match mailer.send(message) {
            Ok(()) => {
                tracing::info!(kind, to = %message.to, attempt, transport = mailer.name(), "email sent");
                return Ok(attempt);
            }
            Err(err @ EmailError::InvalidAddress(_)) => {
                tracing::error!(kind, to = %message.to, error = %err, "email rejected");
                return Err(err);
            }
            Err(err) if attempt >= policy.max_attempts => {
                tracing::error!(kind, to = %message.to, attempts = attempt, error = %err, "email delivery failed");
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(kind, to = %message.to, attempt, error = %err, "email attempt failed, retrying");
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
        }
    }
}
