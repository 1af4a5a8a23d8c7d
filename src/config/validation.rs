//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, protocol limits)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MuxConfig → Result<(), Vec<ValidationError>>

use crate::config::schema::MuxConfig;

/// Largest flow-control window the protocol allows.
const MAX_WINDOW_SIZE: u32 = 0x7fff_ffff;
const MIN_FRAME_SIZE: u32 = 16_384;
const MAX_FRAME_SIZE: u32 = 0x00ff_ffff;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed config, collecting every problem found.
pub fn validate_config(config: &MuxConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.connect_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "pool.connect_timeout_ms",
            "must be greater than zero",
        ));
    }
    if config.pool.max_waiters == Some(0) {
        errors.push(ValidationError::new(
            "pool.max_waiters",
            "must be greater than zero when set",
        ));
    }
    if config.stream.default_idle_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            "stream.default_idle_timeout_ms",
            "must be greater than zero when set",
        ));
    }

    let settings = &config.settings;
    if settings.initial_window_size > MAX_WINDOW_SIZE {
        errors.push(ValidationError::new(
            "settings.initial_window_size",
            format!("must not exceed {}", MAX_WINDOW_SIZE),
        ));
    }
    if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&settings.max_frame_size) {
        errors.push(ValidationError::new(
            "settings.max_frame_size",
            format!("must be between {} and {}", MIN_FRAME_SIZE, MAX_FRAME_SIZE),
        ));
    }
    if settings.max_concurrent_streams == Some(0) {
        errors.push(ValidationError::new(
            "settings.max_concurrent_streams",
            "must be greater than zero when set",
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
