//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Upstream must be an absolute `http` URL with a host
//! - Transform tunables within range; operation and format names known
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;
use crate::transform::registry::TransformRegistry;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("UPSTREAM_URL must be set")]
    MissingUpstream,
    #[error("invalid upstream URL '{url}': {reason}")]
    InvalidUpstream { url: String, reason: String },
    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),
    #[error("transform.max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("transform.max_body_bytes must be at least 1")]
    ZeroBodyLimit,
    #[error("transform.blur_sigma must be positive, got {0}")]
    InvalidBlurSigma(f32),
    #[error("transform.deep_fry_quality must be within 1..=100, got {0}")]
    InvalidQuality(u8),
    #[error("invalid marker header name '{0}'")]
    InvalidMarkerHeader(String),
    #[error("invalid transform registry: {0}")]
    Registry(String),
}

/// Parse and check the upstream origin URL.
pub fn parse_upstream(raw: &str) -> Result<Url, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingUpstream);
    }

    let invalid = |reason: String| ValidationError::InvalidUpstream {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// `host:port` where host may be a name; resolution happens at bind time.
fn is_listen_address(addr: &str) -> bool {
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(char::is_whitespace) && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = parse_upstream(&config.upstream.url) {
        errors.push(e);
    }

    if !is_listen_address(&config.listener.socket_address()) {
        errors.push(ValidationError::InvalidListenAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let transform = &config.transform;
    if transform.max_concurrent == 0 {
        errors.push(ValidationError::ZeroConcurrency);
    }
    if transform.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if transform.blur_sigma.is_nan() || transform.blur_sigma <= 0.0 {
        errors.push(ValidationError::InvalidBlurSigma(transform.blur_sigma));
    }
    if !(1..=100).contains(&transform.deep_fry_quality) {
        errors.push(ValidationError::InvalidQuality(transform.deep_fry_quality));
    }
    if !transform.marker_header.is_empty()
        && HeaderName::from_bytes(transform.marker_header.as_bytes()).is_err()
    {
        errors.push(ValidationError::InvalidMarkerHeader(
            transform.marker_header.clone(),
        ));
    }
    if let Err(e) = TransformRegistry::from_config(transform) {
        errors.push(ValidationError::Registry(e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.upstream.url = "http://127.0.0.1:3000".into();
        config
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn test_missing_upstream() {
        let config = ProxyConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingUpstream]);
    }

    #[test]
    fn test_upstream_rules() {
        assert!(parse_upstream("http://origin.local/assets").is_ok());
        assert!(matches!(
            parse_upstream("not a url"),
            Err(ValidationError::InvalidUpstream { .. })
        ));
        assert!(matches!(
            parse_upstream("https://origin.local"),
            Err(ValidationError::InvalidUpstream { .. })
        ));
        assert_eq!(parse_upstream("   "), Err(ValidationError::MissingUpstream));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = valid();
        config.listener.bind_address = "nowhere".into();
        config.transform.max_concurrent = 0;
        config.transform.blur_sigma = 0.0;
        config.transform.deep_fry_quality = 0;
        config.transform.marker_header = "bad header".into();
        config.transform.operations = vec!["melt".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::ZeroConcurrency));
        assert!(errors.contains(&ValidationError::InvalidListenAddress("nowhere".into())));
    }

    #[test]
    fn test_listen_address_accepts_host_names() {
        for addr in ["localhost:8080", ":8080", "127.0.0.1:9000", "[::1]:8080", "proxy.internal:80"] {
            let mut config = valid();
            config.listener.bind_address = addr.into();
            assert_eq!(validate_config(&config), Ok(()), "{addr}");
        }

        for addr in ["localhost", "localhost:http", ":", "host:99999"] {
            let mut config = valid();
            config.listener.bind_address = addr.into();
            assert_eq!(
                validate_config(&config),
                Err(vec![ValidationError::InvalidListenAddress(addr.into())]),
                "{addr}"
            );
        }
    }

    #[test]
    fn test_empty_marker_disables_header() {
        let mut config = valid();
        config.transform.marker_header = String::new();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
