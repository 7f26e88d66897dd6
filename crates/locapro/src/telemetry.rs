use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Transport crates that are chatty at debug level; kept at `warn` unless named explicitly.
const QUIET_TARGETS: [&str; 3] = ["lettre", "hyper", "axum_prometheus"];

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(
                    f,
                    "invalid log level/filter '{}': unable to build EnvFilter",
                    value
                )
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Configured filter plus `warn` for the quiet targets the filter does not mention.
pub fn build_filter(spec: &str) -> Result<EnvFilter, TelemetryError> {
    let invalid = |source| TelemetryError::EnvFilter {
        value: spec.to_string(),
        source,
    };
    let mut filter = EnvFilter::try_new(spec).map_err(invalid)?;
    for target in QUIET_TARGETS {
        if spec.contains(target) {
            continue;
        }
        let directive: Directive = format!("{target}=warn").parse().map_err(invalid)?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// With `log_spans` set, the request workflow spans (`create_request`,
/// `decide_with_token`, ...) log their duration when they close.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let spec = std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.log_level.clone());
    let env_filter = build_filter(&spec)?;
    let span_events = if config.log_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_span_events(span_events)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_filters() {
        let err = build_filter("locapro=loudest").unwrap_err();
        match err {
            TelemetryError::EnvFilter { value, .. } => assert_eq!(value, "locapro=loudest"),
            other => panic!("expected filter error, got {other:?}"),
        }
    }

    #[test]
    fn quiet_targets_default_to_warn() {
        let rendered = build_filter("debug").expect("filter").to_string();
        assert!(rendered.contains("lettre=warn"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    fn explicit_target_levels_are_kept() {
        let rendered = build_filter("info,lettre=trace").expect("filter").to_string();
        assert!(rendered.contains("lettre=trace"));
        assert!(!rendered.contains("lettre=warn"));
        assert!(rendered.contains("hyper=warn"));
    }
}
