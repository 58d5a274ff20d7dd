use crate::config::types::{Config, CrawlerConfig, ManifestEntry, OutputConfig, UserAgentConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_manifests(&config.manifests)?;
    Ok(())
}

/// Validates crawler timing configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.request_timeout < 1 || config.request_timeout > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be between 1 and 300 seconds, got {}",
            config.request_timeout
        )));
    }

    if config.rate_limit_window == 0 {
        return Err(ConfigError::Validation(
            "rate_limit_window must be > 0 seconds".to_string(),
        ));
    }

    if config.default_expiration == 0 {
        return Err(ConfigError::Validation(
            "default_expiration must be > 0 seconds".to_string(),
        ));
    }

    if config.default_polling_interval == 0 {
        return Err(ConfigError::Validation(
            "default_polling_interval must be > 0 seconds".to_string(),
        ));
    }

    if config.max_concurrent_manifests < 1 || config.max_concurrent_manifests > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_manifests must be between 1 and 64, got {}",
            config.max_concurrent_manifests
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the configured manifests: well-formed and not listed twice
fn validate_manifests(manifests: &[ManifestEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in manifests {
        validate_manifest_url(&entry.url)?;
        if !seen.insert(entry.url.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Manifest '{}' is listed more than once",
                entry.url
            )));
        }
    }
    Ok(())
}

/// Validates a manifest URL: absolute, http or https, with a host
pub(crate) fn validate_manifest_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid manifest URL '{}': {}", raw, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "Manifest URL '{}' must use http or https",
            raw
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Manifest URL '{}' has no host",
            raw
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
