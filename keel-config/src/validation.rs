//! Validation for configuration domains

use crate::error::{ConfigError, ConfigResult};

/// A configuration domain that can check its own values
pub trait Validatable {
    fn validate(&self) -> ConfigResult<()>;

    /// Name used to prefix validation errors, e.g. `backend.rest`
    fn domain_name(&self) -> &'static str;

    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        domain_error(self.domain_name(), message)
    }
}

fn domain_error(domain: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::DomainError {
        domain: domain.to_string(),
        message: message.into(),
    }
}

/// Fail with `message` unless `condition` holds
pub fn require<V: Validatable + ?Sized>(domain: &V, condition: bool, message: &str) -> ConfigResult<()> {
    if condition {
        Ok(())
    } else {
        Err(domain.validation_error(message))
    }
}

pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(domain_error(domain, format!("{} cannot be empty", field_name)));
    }
    Ok(())
}

pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value > T::default() {
        Ok(())
    } else {
        Err(domain_error(
            domain,
            format!("{} must be greater than 0, got {}", field_name, value),
        ))
    }
}

/// An http(s) URL
pub fn validate_url(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(value, field_name, domain)?;
    let url = url::Url::parse(value)
        .map_err(|e| domain_error(domain, format!("{} is not a valid URL: {}", field_name, e)))?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(())
    } else {
        Err(domain_error(
            domain,
            format!("{} must use http or https, got '{}'", field_name, url.scheme()),
        ))
    }
}

/// A semantic version, optionally prefixed with `v`
pub fn validate_semver(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    let trimmed = value.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    semver::Version::parse(bare)
        .map(|_| ())
        .map_err(|e| domain_error(domain, format!("{} '{}' is not a semantic version: {}", field_name, value, e)))
}
