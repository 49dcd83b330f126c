//! Structured logging setup

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Let sqlx log every query (otherwise sqlx is capped at WARN)
    #[serde(default)]
    pub log_sql_queries: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            log_sql_queries: false,
        }
    }
}

impl LoggingSettings {
    /// Parse `level`, falling back to INFO
    pub fn level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Filter built from the base level plus the sqlx directive
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::new(format!("{}", self.level()));

        // By default, set sqlx to WARN to suppress query logs
        if !self.log_sql_queries {
            match "sqlx=warn".parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => tracing::warn!("Failed to set sqlx log filter: {}", e),
            }
        }

        filter
    }
}

/// Install the global subscriber
pub fn init_logging(
    settings: &LoggingSettings,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let builder = FmtSubscriber::builder().with_env_filter(settings.env_filter());
    if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        let mut settings = LoggingSettings::default();
        assert_eq!(settings.level(), Level::INFO);

        settings.level = "DEBUG".to_string();
        assert_eq!(settings.level(), Level::DEBUG);

        settings.level = "verbose".to_string();
        assert_eq!(settings.level(), Level::INFO);
    }

    #[test]
    fn test_sqlx_directive() {
        let quiet = LoggingSettings::default().env_filter().to_string();
        assert!(quiet.contains("sqlx=warn"));

        let loud = LoggingSettings {
            log_sql_queries: true,
            ..Default::default()
        };
        assert!(!loud.env_filter().to_string().contains("sqlx"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let settings: LoggingSettings = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert!(settings.json);
        assert_eq!(settings.level, "info");
        assert!(!settings.log_sql_queries);
    }
}
