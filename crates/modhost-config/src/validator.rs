//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert the first error into a `ConfigError`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_modules(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_modules(config: &Config, result: &mut ValidationResult) {
        if config.modules.directory.trim().is_empty() {
            result.add_error(ValidationError::new(
                "modules.directory",
                "Module directory cannot be empty",
            ));
        }

        let file = &config.modules.descriptor_file;
        if file.trim().is_empty() {
            result.add_error(ValidationError::new(
                "modules.descriptor_file",
                "Descriptor file name cannot be empty",
            ));
        } else if file.contains('/') || file.contains('\\') {
            result.add_error(ValidationError::new(
                "modules.descriptor_file",
                "Descriptor file must be a plain file name",
            ));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let rate = config.scheduler.tick_rate_ms;
        if rate == 0 {
            result.add_error(ValidationError::new(
                "scheduler.tick_rate_ms",
                "tick_rate_ms must be greater than 0",
            ));
        } else if rate < 5 {
            result.add_warning(ValidationWarning::new(
                "scheduler.tick_rate_ms",
                "tick_rate_ms below 5 leaves sync tasks almost no time per tick",
            ));
        } else if rate > 10_000 {
            result.add_warning(ValidationWarning::new(
                "scheduler.tick_rate_ms",
                "tick_rate_ms above 10s makes delays very coarse",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            result.add_error(ValidationError::new(
                "logging.level",
                format!("Unknown log level '{}'", config.logging.level),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
