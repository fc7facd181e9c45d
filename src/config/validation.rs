//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before a config is accepted

use crate::config::schema::DispatchConfig;

/// Upper bound on `connection.pipelining`.
pub const MAX_PIPELINING: usize = 1024;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("connection.origin {origin:?} is not a valid URL: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("connection.origin scheme {0:?} is not http or https")]
    UnsupportedScheme(String),

    #[error("connection.origin has no host")]
    MissingHost,

    #[error("connection.pipelining must be between 1 and {}, got {}", MAX_PIPELINING, .0)]
    Pipelining(usize),

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    LogLevel(String),

    #[error("simulation.high_water_bytes must be greater than 0")]
    HighWater,
}

pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.connection.origin() {
        Ok(origin) => {
            let protocol = origin.protocol();
            if protocol != "http:" && protocol != "https:" {
                errors.push(ValidationError::UnsupportedScheme(protocol));
            } else if origin.host().is_none() {
                errors.push(ValidationError::MissingHost);
            }
        }
        Err(e) => errors.push(ValidationError::InvalidOrigin {
            origin: config.connection.origin.clone(),
            reason: e.to_string(),
        }),
    }

    let pipelining = config.connection.pipelining;
    if pipelining == 0 || pipelining > MAX_PIPELINING {
        errors.push(ValidationError::Pipelining(pipelining));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if config.simulation.high_water_bytes == 0 {
        errors.push(ValidationError::HighWater);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
