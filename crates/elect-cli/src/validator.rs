//! Configuration validation for the elector CLI.
//!
//! Checks run before any elector starts, so a misconfigured instance fails
//! fast instead of silently never winning an election.

use crate::config::AppConfig;
use colored::Colorize;
use std::collections::HashSet;
use std::str::FromStr;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent startup.
    pub errors: Vec<String>,
    /// Warnings that should be addressed but don't prevent startup.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Creates a new empty validation result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns true if there are any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Configuration Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Configuration Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates application configuration before startup.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the application configuration.
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_database(config, &mut result);
        Self::validate_purposes(config, &mut result);
        Self::validate_election(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_database(config: &AppConfig, result: &mut ValidationResult) {
        let url = &config.database.url;

        if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
            result.add_error(format!(
                "Invalid database URL '{}'. Advisory locks require postgres://",
                config.redact_secrets().database.url
            ));
        }

        // Sessions are detached from the pool once opened, but every one is
        // first checked out through it.
        if config.database.max_connections == 0 {
            result.add_error("database.max_connections must be greater than zero");
        }

        if config.database.acquire_timeout_secs == 0 {
            result.add_error("database.acquire_timeout_secs must be greater than zero");
        }
    }

    fn validate_purposes(config: &AppConfig, result: &mut ValidationResult) {
        if config.purposes.is_empty() {
            result.add_warning(
                "No purposes configured. This instance will never become leader of anything.",
            );
        }

        let mut seen = HashSet::new();
        for purpose in &config.purposes {
            if !seen.insert(purpose) {
                result.add_error(format!(
                    "Purpose '{}' is listed more than once",
                    purpose.name()
                ));
            }
        }
    }

    fn validate_election(config: &AppConfig, result: &mut ValidationResult) {
        if let Err(e) = config.election.validate() {
            result.add_error(e.to_string());
        }

        if config.election.poll_interval.as_secs() > 60 {
            result.add_warning(format!(
                "election.poll_interval is {:?}. Failover takes about one poll interval.",
                config.election.poll_interval
            ));
        }
    }

    fn validate_logging(config: &AppConfig, result: &mut ValidationResult) {
        if tracing::Level::from_str(&config.logging.level).is_err() {
            result.add_warning(format!(
                "Unknown log level '{}'. Falling back to info.",
                config.logging.level
            ));
        }
    }
}
