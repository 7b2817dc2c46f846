//! Configuration validation.

use super::Config;
use crate::drivers::common::SslMode;
use crate::error::{DalError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let provider = &config.provider;

    provider.provider_type()?;

    if provider.host.is_empty() {
        return Err(DalError::Config("provider.host is required".into()));
    }
    if provider.database.is_empty() {
        return Err(DalError::Config("provider.database is required".into()));
    }
    if provider.user.is_empty() {
        return Err(DalError::Config("provider.user is required".into()));
    }

    SslMode::parse(&provider.ssl_mode)?;

    match provider.encrypt.to_lowercase().as_str() {
        "true" | "yes" | "1" | "false" | "no" | "0" | "disable" => {}
        other => {
            return Err(DalError::Config(format!(
                "Invalid provider.encrypt '{}'. Valid values: true, false",
                other
            )))
        }
    }

    if let Some(0) = provider.port {
        return Err(DalError::Config("provider.port must be at least 1".into()));
    }
    if provider.connect_timeout_secs == 0 {
        return Err(DalError::Config(
            "provider.connect_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn valid_config() -> Config {
        Config {
            provider: ProviderConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: None,
                database: "company".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                ssl_mode: "disable".to_string(),
                encrypt: "true".to_string(),
                trust_server_cert: false,
                identity_suffix: None,
                connect_timeout_secs: 30,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.provider.host = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("provider.host"));
    }

    #[test]
    fn test_missing_user() {
        let mut config = valid_config();
        config.provider.user = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_type() {
        let mut config = valid_config();
        config.provider.r#type = "oracle".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_unknown_ssl_mode() {
        let mut config = valid_config();
        config.provider.ssl_mode = "sometimes".to_string();
        assert!(matches!(validate(&config), Err(DalError::Config(_))));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = valid_config();
        config.provider.connect_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_port() {
        let mut config = valid_config();
        config.provider.port = Some(0);
        assert!(validate(&config).is_err());
    }
}
