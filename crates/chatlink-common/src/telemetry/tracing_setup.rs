//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set. Otherwise the filter is built from the configured
//! level, optionally with a separate level for the chatlink crates.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::Environment;

const CLIENT_CRATES: [&str; 5] = [
    "chatlink_core",
    "chatlink_common",
    "chatlink_task",
    "chatlink_http",
    "chatlink_gateway",
];

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for everything without a more specific directive
    pub level: Level,
    /// Level for the chatlink crates; defaults to `level`
    pub client_level: Option<Level>,
    /// One JSON object per line instead of human-readable output
    pub json: bool,
    /// Log span open and close
    pub span_events: bool,
    /// Source file and line on every record
    pub source_location: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            client_level: None,
            json: false,
            span_events: false,
            source_location: true,
        }
    }
}

impl TracingConfig {
    /// Preset for a deployment environment
    ///
    /// Development traces the client crates at debug; production logs JSON
    /// without source locations.
    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development => Self {
                client_level: Some(Level::DEBUG),
                span_events: true,
                ..Self::default()
            },
            Environment::Staging => Self::default(),
            Environment::Production => Self {
                json: true,
                source_location: false,
                ..Self::default()
            },
        }
    }

    /// Set the level of every target from a name such as `"warn"`
    ///
    /// Unrecognised names leave the config unchanged.
    #[must_use]
    pub fn with_level_name(mut self, name: Option<&str>) -> Self {
        if let Some(level) = name.and_then(|n| n.parse::<Level>().ok()) {
            self.level = level;
            self.client_level = None;
        }
        self
    }

    /// Filter directives used when `RUST_LOG` is unset
    #[must_use]
    pub fn directives(&self) -> String {
        let mut directives = self.level.to_string().to_lowercase();
        if let Some(client) = self.client_level.filter(|l| *l != self.level) {
            let client = client.to_string().to_lowercase();
            for target in CLIENT_CRATES {
                directives.push_str(&format!(",{target}={client}"));
            }
        }
        directives
    }
}

/// Install the default subscriber
///
/// Returns `TracingError::AlreadyInitialized` if a global subscriber exists.
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(spans);
    let output = if config.json {
        base.json().boxed()
    } else {
        base.boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_presets() {
        let staging = TracingConfig::for_environment(Environment::Staging);
        assert_eq!(staging.directives(), "info");
        assert!(!staging.json);

        let development = TracingConfig::for_environment(Environment::Development);
        assert!(development.span_events);
        assert!(development.directives().starts_with("info,chatlink_core=debug"));
        assert!(development.directives().contains("chatlink_gateway=debug"));

        let production = TracingConfig::for_environment(Environment::Production);
        assert!(production.json);
        assert!(!production.source_location);
    }

    #[test]
    fn test_level_name_overrides_every_target() {
        let config = TracingConfig::for_environment(Environment::Development)
            .with_level_name(Some("WARN"));
        assert_eq!(config.directives(), "warn");

        let config = TracingConfig::default().with_level_name(Some("loud"));
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn test_second_init_reports_error() {
        let _ = try_init_tracing();
        assert!(matches!(
            try_init_tracing(),
            Err(TracingError::AlreadyInitialized)
        ));
    }
}
