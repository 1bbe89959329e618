//! Configuration validation.
//!
//! Serde handles syntax; this pass checks values. Every problem is reported,
//! not just the first.

use alloy::primitives::Address;

use crate::config::schema::EscrowConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EscrowConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &'static str, message: String| {
        errors.push(ValidationError { field, message });
    };

    if let Err(e) = config.chain.rpc_url.parse::<url::Url>() {
        fail("chain.rpc_url", format!("invalid URL '{}': {}", config.chain.rpc_url, e));
    }
    for url in &config.chain.failover_urls {
        if let Err(e) = url.parse::<url::Url>() {
            fail("chain.failover_urls", format!("invalid URL '{}': {}", url, e));
        }
    }
    if config.chain.contract_address.parse::<Address>().is_err() {
        fail(
            "chain.contract_address",
            format!("'{}' is not an address", config.chain.contract_address),
        );
    }
    if config.chain.rpc_timeout_secs == 0 {
        fail("chain.rpc_timeout_secs", "must be greater than zero".to_string());
    }
    if config.chain.gas_limit == 0 {
        fail("chain.gas_limit", "must be greater than zero".to_string());
    }

    if config.orchestrator.receipt_timeout_secs == 0 {
        fail("orchestrator.receipt_timeout_secs", "must be greater than zero".to_string());
    }
    if config.orchestrator.receipt_poll_ms == 0 {
        fail("orchestrator.receipt_poll_ms", "must be greater than zero".to_string());
    }
    if config.orchestrator.receipt_poll_max_ms < config.orchestrator.receipt_poll_ms {
        fail(
            "orchestrator.receipt_poll_max_ms",
            format!(
                "must be at least receipt_poll_ms ({})",
                config.orchestrator.receipt_poll_ms
            ),
        );
    }

    if config.scanner.max_attempts == 0 {
        fail("scanner.max_attempts", "at least one attempt is required".to_string());
    }
    if config.scanner.dashboard_failure_threshold == 0 {
        fail("scanner.dashboard_failure_threshold", "must be greater than zero".to_string());
    }
    if config.scanner.movement_failure_threshold == 0 {
        fail("scanner.movement_failure_threshold", "must be greater than zero".to_string());
    }
    if let Some(platform) = &config.scanner.platform_address {
        if platform.parse::<Address>().is_err() {
            fail("scanner.platform_address", format!("'{}' is not an address", platform));
        }
    }

    if let Some(base_url) = &config.disputes.base_url {
        if let Err(e) = base_url.parse::<url::Url>() {
            fail("disputes.base_url", format!("invalid URL '{}': {}", base_url, e));
        }
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

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EscrowConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = EscrowConfig::default();
        config.chain.rpc_url = "not a url".to_string();
        config.chain.contract_address = "0x123".to_string();
        config.scanner.max_attempts = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "chain.rpc_url"));
        assert!(errors.iter().any(|e| e.field == "chain.contract_address"));
        assert!(errors.iter().any(|e| e.field == "scanner.max_attempts"));
    }

    #[test]
    fn test_bad_platform_address() {
        let mut config = EscrowConfig::default();
        config.scanner.platform_address = Some("platform".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "scanner.platform_address");
    }

    #[test]
    fn test_poll_ceiling_below_first_delay() {
        let mut config = EscrowConfig::default();
        config.orchestrator.receipt_poll_max_ms = 500;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "orchestrator.receipt_poll_max_ms");
    }
}
