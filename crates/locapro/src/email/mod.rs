//! Transactional email: message model, transports, retrying dispatcher and templates.

mod dispatcher;
pub mod templates;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::{EmailBackend, EmailConfig};
use crate::validation::looks_like_email;

pub use dispatcher::{Delivery, EmailDispatcher, RetryPolicy};
pub use templates::RenderedEmail;

/// Outbound message with a plain-text body and optional HTML alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, from: impl Into<String>, rendered: RenderedEmail) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            subject: rendered.subject,
            text_body: rendered.text,
            html_body: Some(rendered.html),
        }
    }
}

/// Transport seam; implementations block until the message is handed off.
pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
    #[error("unable to build message: {0}")]
    Build(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

fn check_addresses(message: &EmailMessage) -> Result<(), EmailError> {
    for address in [&message.to, &message.from] {
        if !looks_like_email(address.trim()) {
            return Err(EmailError::InvalidAddress(address.clone()));
        }
    }
    Ok(())
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct ConsoleMailer;

impl Mailer for ConsoleMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        check_addresses(message)?;
        tracing::info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            body = %message.text_body,
            "console email"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// Keeps every accepted message; can be told to fail the next few sends.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failures_remaining: AtomicU32,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailbox mutex poisoned").clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|message| message.to.eq_ignore_ascii_case(address))
            .collect()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        check_addresses(message)?;
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EmailError::Transport("simulated outage".to_string()));
        }
        self.sent
            .lock()
            .expect("mailbox mutex poisoned")
            .push(message.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// SMTP relay transport, STARTTLS unless TLS is disabled.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn from_config(config: &EmailConfig) -> Result<Self, EmailError> {
        let builder = if config.use_tls {
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|err| EmailError::Transport(err.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let from: Mailbox = message
            .from
            .parse()
            .map_err(|_| EmailError::InvalidAddress(message.from.clone()))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| EmailError::InvalidAddress(message.to.clone()))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone());
        let email = match &message.html_body {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.text_body.clone()),
        }
        .map_err(|err| EmailError::Build(err.to_string()))?;

        self.transport
            .send(&email)
            .map(|_| ())
            .map_err(|err| EmailError::Transport(err.to_string()))
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Transport selected by `EMAIL_BACKEND`.
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>, EmailError> {
    let mailer: Arc<dyn Mailer> = match config.backend {
        EmailBackend::Console => Arc::new(ConsoleMailer),
        EmailBackend::Memory => Arc::new(MemoryMailer::new()),
        EmailBackend::Smtp => Arc::new(SmtpMailer::from_config(config)?),
    };
    Ok(mailer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            from: "noreply@locapro.local".to_string(),
            subject: "Hello".to_string(),
            text_body: "Body".to_string(),
            html_body: None,
        }
    }

    #[test]
    fn memory_mailer_records_and_simulates_failures() {
        let mailer = MemoryMailer::new();
        mailer.fail_next(1);
        assert!(matches!(
            mailer.send(&message("ada@example.com")),
            Err(EmailError::Transport(_))
        ));
        mailer.send(&message("ada@example.com")).expect("second send");
        assert_eq!(mailer.sent_to("ADA@example.com").len(), 1);
    }

    #[test]
    fn rejects_malformed_recipients() {
        let err = ConsoleMailer.send(&message("not-an-address")).unwrap_err();
        assert!(matches!(err, EmailError::InvalidAddress(ref addr) if addr == "not-an-address"));
    }

    #[test]
    fn backend_selection_follows_config() {
        let config = EmailConfig::local("http://localhost:8000");
        let mailer = mailer_from_config(&config).expect("memory mailer");
        assert_eq!(mailer.name(), "memory");

        let mut console = config.clone();
        console.backend = EmailBackend::Console;
        assert_eq!(mailer_from_config(&console).expect("console").name(), "console");
    }
}
