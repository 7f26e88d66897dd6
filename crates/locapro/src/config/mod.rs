use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Longest lifetime an emailed decision link may be configured with.
pub const MAX_DECISION_TOKEN_TTL_DAYS: i64 = 365;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the marketplace.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub email: EmailConfig,
    pub session: SessionConfig,
    pub workflow: WorkflowConfig,
    pub admin: Option<AdminConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let site_url = env::var("SITE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        let email = EmailConfig::from_env(site_url)?;

        let cookie_age = parse_number::<u64>("SESSION_COOKIE_AGE", 1_209_600)?;
        let secure_default = environment == AppEnvironment::Production;
        let secure_cookie = parse_flag("SESSION_COOKIE_SECURE", secure_default)?;

        let token_ttl_days = parse_number::<i64>("DECISION_TOKEN_TTL_DAYS", 7)?;
        if !(1..=MAX_DECISION_TOKEN_TTL_DAYS).contains(&token_ttl_days) {
            return Err(ConfigError::OutOfRange {
                variable: "DECISION_TOKEN_TTL_DAYS",
                min: 1,
                max: MAX_DECISION_TOKEN_TTL_DAYS,
            });
        }
        let seed_demo_data = parse_flag("SEED_DEMO_DATA", false)?;
        let admin = AdminConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_spans: parse_flag("APP_LOG_SPANS", false)?,
            },
            email,
            session: SessionConfig {
                cookie_age_secs: cookie_age,
                secure_cookie,
            },
            workflow: WorkflowConfig {
                decision_token_ttl_days: token_ttl_days,
                seed_demo_data,
            },
            admin,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Log request workflow spans as they close, with their duration.
    pub log_spans: bool,
}

/// Which transport delivers outbound mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailBackend {
    Console,
    Smtp,
    Memory,
}

impl EmailBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "smtp" => Ok(Self::Smtp),
            "memory" | "locmem" => Ok(Self::Memory),
            _ => Err(ConfigError::InvalidEmailBackend(value.to_string())),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EmailBackend::Console => "console",
            EmailBackend::Smtp => "smtp",
            EmailBackend::Memory => "memory",
        }
    }
}

/// SMTP and delivery settings for transactional email.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub backend: EmailBackend,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub default_from: String,
    pub site_url: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub deliver_async: bool,
}

impl EmailConfig {
    fn from_env(site_url: String) -> Result<Self, ConfigError> {
        let backend =
            EmailBackend::parse(&env::var("EMAIL_BACKEND").unwrap_or_else(|_| "console".into()))?;
        let host = env::var("EMAIL_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("EMAIL_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                variable: "EMAIL_PORT",
            })?;

        let username = non_empty_var("EMAIL_HOST_USER");
        let password = non_empty_var("EMAIL_HOST_PASSWORD");
        if username.is_some() != password.is_some() {
            return Err(ConfigError::IncompleteSmtpCredentials);
        }

        let max_attempts = parse_number::<u32>("EMAIL_MAX_RETRIES", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "EMAIL_MAX_RETRIES",
            });
        }

        Ok(Self {
            backend,
            host,
            port,
            username,
            password,
            use_tls: parse_flag("EMAIL_USE_TLS", true)?,
            default_from: env::var("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@locapro.local".to_string()),
            site_url,
            max_attempts,
            retry_delay: Duration::from_secs(parse_number::<u64>("EMAIL_RETRY_DELAY_SECS", 2)?),
            deliver_async: parse_flag("EMAIL_ASYNC", true)?,
        })
    }

    /// Inline, in-memory configuration used by tests and local tooling.
    pub fn local(site_url: impl Into<String>) -> Self {
        Self {
            backend: EmailBackend::Memory,
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            use_tls: false,
            default_from: "noreply@locapro.local".to_string(),
            site_url: site_url.into(),
            max_attempts: 1,
            retry_delay: Duration::ZERO,
            deliver_async: false,
        }
    }
}

/// Staff account ensured at startup so verification and staff exports are reachable.
#[derive(Clone)]
pub struct AdminConfig {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
}

impl AdminConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        match (non_empty_var("ADMIN_USERNAME"), non_empty_var("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Ok(Some(Self {
                username,
                email: non_empty_var("ADMIN_EMAIL"),
                password,
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::IncompleteAdminCredentials),
        }
    }
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session cookie policy.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub cookie_age_secs: u64,
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_age_secs: 1_209_600,
            secure_cookie: false,
        }
    }
}

/// Knobs for the request/decision workflow.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowConfig {
    pub decision_token_ttl_days: i64,
    pub seed_demo_data: bool,
}

impl WorkflowConfig {
    /// Decision link lifetime, clamped to `1..=MAX_DECISION_TOKEN_TTL_DAYS` days.
    pub fn decision_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(
            self.decision_token_ttl_days
                .clamp(1, MAX_DECISION_TOKEN_TTL_DAYS),
        )
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            decision_token_ttl_days: 7,
            seed_demo_data: false,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(variable) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        None => Ok(default),
    }
}

fn parse_flag(variable: &'static str, default: bool) -> Result<bool, ConfigError> {
    match non_empty_var(variable) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { variable }),
        },
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    InvalidFlag { variable: &'static str },
    OutOfRange {
        variable: &'static str,
        min: i64,
        max: i64,
    },
    InvalidEmailBackend(String),
    IncompleteSmtpCredentials,
    IncompleteAdminCredentials,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a positive number")
            }
            ConfigError::OutOfRange { variable, min, max } => {
                write!(f, "{variable} must be between {min} and {max}")
            }
            ConfigError::InvalidFlag { variable } => {
                write!(f, "{variable} must be true/false, yes/no, 1/0 or on/off")
            }
            ConfigError::InvalidEmailBackend(value) => write!(
                f,
                "EMAIL_BACKEND '{value}' is not one of console, smtp or memory"
            ),
            ConfigError::IncompleteSmtpCredentials => write!(
                f,
                "EMAIL_HOST_USER and EMAIL_HOST_PASSWORD must be set together"
            ),
            ConfigError::IncompleteAdminCredentials => {
                write!(f, "ADMIN_USERNAME and ADMIN_PASSWORD must be set together")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_SPANS",
            "SITE_URL",
            "EMAIL_BACKEND",
            "EMAIL_HOST",
            "EMAIL_PORT",
            "EMAIL_HOST_USER",
            "EMAIL_HOST_PASSWORD",
            "EMAIL_USE_TLS",
            "EMAIL_MAX_RETRIES",
            "EMAIL_RETRY_DELAY_SECS",
            "EMAIL_ASYNC",
            "DEFAULT_FROM_EMAIL",
            "SESSION_COOKIE_AGE",
            "SESSION_COOKIE_SECURE",
            "DECISION_TOKEN_TTL_DAYS",
            "SEED_DEMO_DATA",
            "ADMIN_USERNAME",
            "ADMIN_EMAIL",
            "ADMIN_PASSWORD",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(!config.telemetry.log_spans);
        assert_eq!(config.email.backend, EmailBackend::Console);
        assert_eq!(config.email.max_attempts, 3);
        assert_eq!(config.email.retry_delay, Duration::from_secs(2));
        assert_eq!(config.email.site_url, "http://localhost:8000");
        assert_eq!(config.session.cookie_age_secs, 1_209_600);
        assert!(!config.session.secure_cookie);
        assert_eq!(config.workflow.decision_token_ttl_days, 7);
        assert!(config.admin.is_none());
    }

    #[test]
    fn decision_token_ttl_is_bounded() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DECISION_TOKEN_TTL_DAYS", "100000000");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::OutOfRange {
                variable: "DECISION_TOKEN_TTL_DAYS",
                max: MAX_DECISION_TOKEN_TTL_DAYS,
                ..
            })
        ));

        env::set_var("DECISION_TOKEN_TTL_DAYS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::OutOfRange { .. })
        ));

        env::set_var("DECISION_TOKEN_TTL_DAYS", "30");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.workflow.decision_token_ttl(), chrono::Duration::days(30));

        let oversized = WorkflowConfig {
            decision_token_ttl_days: 100_000_000,
            ..WorkflowConfig::default()
        };
        assert_eq!(
            oversized.decision_token_ttl(),
            chrono::Duration::days(MAX_DECISION_TOKEN_TTL_DAYS)
        );
    }

    #[test]
    fn admin_bootstrap_needs_username_and_password() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ADMIN_USERNAME", "perez");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::IncompleteAdminCredentials)
        ));

        env::set_var("ADMIN_PASSWORD", "LocalPro2025!");
        env::set_var("ADMIN_EMAIL", "perez@localpro.dev");
        let admin = AppConfig::load()
            .expect("config loads")
            .admin
            .expect("admin configured");
        assert_eq!(admin.username, "perez");
        assert_eq!(admin.email.as_deref(), Some("perez@localpro.dev"));
        assert!(!format!("{admin:?}").contains("LocalPro2025!"));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 8000));
    }

    #[test]
    fn production_defaults_to_secure_cookies_and_strips_site_slash() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("SITE_URL", "https://locapro.example/");
        let config = AppConfig::load().expect("config loads");
        assert!(config.session.secure_cookie);
        assert_eq!(config.email.site_url, "https://locapro.example");
    }

    #[test]
    fn rejects_half_configured_smtp_credentials() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("EMAIL_BACKEND", "smtp");
        env::set_var("EMAIL_HOST_USER", "mailer");
        let err = AppConfig::load().expect_err("credentials incomplete");
        assert!(matches!(err, ConfigError::IncompleteSmtpCredentials));
    }

    #[test]
    fn rejects_unknown_backend_and_bad_flags() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("EMAIL_BACKEND", "carrier-pigeon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidEmailBackend(_))
        ));

        reset_env();
        env::set_var("EMAIL_USE_TLS", "maybe");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidFlag {
                variable: "EMAIL_USE_TLS"
            })
        ));
    }
}
