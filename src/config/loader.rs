//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::DispatchConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<DispatchConfig, ConfigError> {
    let config: DispatchConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<DispatchConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.connection.pipelining, 1);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = parse_config(
            r#"
            [connection]
            origin = "https://api.example.com"
            pipelining = 4

            [simulation]
            failing_servernames = ["bad.example.com"]
            "#,
        )
        .unwrap();

        assert!(config.connection.origin().unwrap().is_https());
        assert_eq!(config.connection.pipelining, 4);
        assert_eq!(config.simulation.failing_servernames, vec!["bad.example.com"]);
        assert_eq!(config.simulation.response_latency_ms, 10);
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config("[connection]\npipelining = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: connection.pipelining must be between 1 and 1024, got 0"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/pipeline-dispatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
