use crate::config::types::Config;
use crate::config::validation::{validate, validate_manifest_url};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored on every crawl run so a run can be traced back to the configuration
/// that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Reads a manifest list file: one manifest URL per line
///
/// Blank lines and lines starting with `#` are skipped. Every remaining line
/// must be an absolute http(s) URL.
pub fn load_manifest_urls(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut urls = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        validate_manifest_url(line)?;
        urls.push(line.to_string());
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[crawler]
rate-limit-window = 60
request-timeout = 5

[fetch]
suppress-if-modified-since = true

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"

[[manifest]]
url = "https://publisher.example.com/$bulk-publish"

[[manifest]]
url = "https://other.example.org/manifest.json"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.rate_limit_window, 60);
        assert_eq!(config.crawler.request_timeout, 5);
        // Unspecified values fall back to defaults
        assert_eq!(config.crawler.default_expiration, 120);
        assert_eq!(config.crawler.default_polling_interval, 180);
        assert_eq!(config.crawler.max_concurrent_manifests, 4);

        assert!(config.fetch.suppress_if_modified_since);
        assert!(!config.fetch.skip_cache);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
        assert_eq!(config.manifests.len(), 2);
    }

    #[test]
    fn test_sections_are_optional() {
        let file = create_temp_config(
            r#"
[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.crawler.rate_limit_window, 90);
        assert_eq!(config.crawler.request_timeout, 10);
        assert_eq!(config.fetch, crate::config::FetchOptions::default());
        assert!(config.manifests.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/crawler.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_invalid_manifest_url() {
        let file = create_temp_config(&VALID_CONFIG.replace(
            "https://other.example.org/manifest.json",
            "not a url",
        ));
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_load_config_with_hash() {
        let file = create_temp_config(VALID_CONFIG);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.manifests.len(), 2);
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
    }

    #[test]
    fn test_load_manifest_urls_skips_blank_and_comment_lines() {
        let file = create_temp_config(
            "https://a.example.com/manifest\n\n# retired publisher\n  https://b.example.com/$bulk-publish  \n",
        );
        let urls = load_manifest_urls(file.path()).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://a.example.com/manifest".to_string(),
                "https://b.example.com/$bulk-publish".to_string(),
            ]
        );
    }

    #[test]
    fn test_load_manifest_urls_rejects_malformed_line() {
        let file = create_temp_config("https://a.example.com/manifest\nftp://b.example.com/x\n");
        assert!(load_manifest_urls(file.path()).is_err());
    }
}
