//! Embedded configuration: the exchange table, token thresholds, whitelist
//! and service endpoints.
//!
//! The default configuration ships inside the binary (and therefore inside
//! the enclave measurement); an operator may replace it wholesale with
//! `--config-path`, which changes the measurement and is visible to
//! verifiers.

use std::collections::HashMap;
use std::path::Path;

use num_rational::BigRational;
use serde::Deserialize;

use crate::error::HostError;
use crate::rational::parse_decimal;

const DEFAULT_CONFIG: &str = include_str!("../config/notary.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeConfig {
    pub base_url: String,
    /// Path template with a mandatory `{symbol}` placeholder.
    pub endpoint_template: String,
    /// Token name → exchange-native symbol.
    #[serde(default)]
    pub symbols: HashMap<String, String>,
    /// Pin of the venue's root CA, checked by the TLS layer inside the
    /// enclave manifest. Informational here.
    #[serde(default)]
    pub root_ca_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub exchanges: Vec<String>,
    pub tolerance_percent: String,
    pub mad_multiplier: String,
    pub max_spread_percent: String,
    pub min_volume_per_exchange: String,
    pub max_exchange_weight_percent: String,
}

/// Token thresholds parsed to rationals. Built once per aggregation.
#[derive(Debug, Clone)]
pub struct TokenThresholds {
    pub tolerance_percent: BigRational,
    pub mad_multiplier: BigRational,
    pub max_spread_percent: BigRational,
    pub min_volume_per_exchange: BigRational,
    pub max_exchange_weight_percent: BigRational,
}

impl TokenConfig {
    pub fn thresholds(&self) -> Result<TokenThresholds, HostError> {
        let parse = |name: &str, value: &str| {
            parse_decimal(value).ok_or_else(|| HostError::ValidationFailed {
                field: name.to_string(),
                reason: format!("{value:?} is not a decimal number"),
            })
        };
        Ok(TokenThresholds {
            tolerance_percent: parse("tolerancePercent", &self.tolerance_percent)?,
            mad_multiplier: parse("madMultiplier", &self.mad_multiplier)?,
            max_spread_percent: parse("maxSpreadPercent", &self.max_spread_percent)?,
            min_volume_per_exchange: parse("minVolumePerExchange", &self.min_volume_per_exchange)?,
            max_exchange_weight_percent: parse(
                "maxExchangeWeightPercent",
                &self.max_exchange_weight_percent,
            )?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotaryConfig {
    pub min_exchanges_required: usize,
    pub max_allowed_time_diff_ms: u64,
    /// Roughtime-class authenticated time gateway.
    pub attestation_time_service: String,
    /// Header names sealed unmasked into user data.
    pub accepted_headers: Vec<String>,
    /// Hostnames the extractor may fetch from, plus the reserved URLs.
    pub whitelist: Vec<String>,
    pub exchanges: HashMap<String, ExchangeConfig>,
    pub tokens: HashMap<String, TokenConfig>,
}

impl NotaryConfig {
    /// The configuration compiled into the binary.
    pub fn embedded() -> Self {
        serde_json::from_str(DEFAULT_CONFIG).expect("embedded configuration is valid")
    }

    /// Load the embedded configuration, or the file at `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self, HostError> {
        let config: Self = match path {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|e| HostError::Anyhow(anyhow::anyhow!("opening {path:?}: {e}")))?;
                serde_json::from_reader(std::io::BufReader::new(file))
                    .map_err(|e| HostError::Anyhow(anyhow::anyhow!("parsing {path:?}: {e}")))?
            }
            None => Self::embedded(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the aggregator or extractor cannot run with.
    pub fn validate(&self) -> Result<(), HostError> {
        let fail = |field: &str, reason: String| {
            Err(HostError::ValidationFailed { field: field.to_string(), reason })
        };

        if self.min_exchanges_required == 0 {
            return fail("minExchangesRequired", "must be at least 1".into());
        }
        if self.whitelist.is_empty() {
            return fail("whitelist", "must not be empty".into());
        }
        if self.accepted_headers.is_empty() {
            return fail("acceptedHeaders", "must not be empty".into());
        }
        if !self.attestation_time_service.starts_with("https://") {
            return fail("attestationTimeService", "must be an https URL".into());
        }

        for (name, exchange) in &self.exchanges {
            if !exchange.endpoint_template.contains("{symbol}") {
                return fail(
                    "exchanges",
                    format!("endpoint template of {name} lacks a {{symbol}} placeholder"),
                );
            }
            if !exchange.base_url.starts_with("https://") {
                return fail("exchanges", format!("base URL of {name} must be https"));
            }
        }

        for (token, token_config) in &self.tokens {
            if token_config.exchanges.is_empty() {
                return fail("tokens", format!("{token} has no exchanges"));
            }
            for exchange_name in &token_config.exchanges {
                let exchange = match self.exchanges.get(exchange_name) {
                    Some(e) => e,
                    None => {
                        return fail(
                            "tokens",
                            format!("{token} references unknown exchange {exchange_name}"),
                        )
                    }
                };
                if !exchange.symbols.contains_key(token) {
                    return fail(
                        "tokens",
                        format!("exchange {exchange_name} has no symbol for {token}"),
                    );
                }
            }
            token_config.thresholds()?;
        }
        Ok(())
    }

    /// Whether the extractor may fetch from `host`.
    pub fn is_whitelisted(&self, host: &str) -> bool {
        self.whitelist.iter().any(|entry| entry.eq_ignore_ascii_case(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_validates() {
        let config = NotaryConfig::embedded();
        config.validate().unwrap();
        assert!(config.tokens.contains_key("BTC"));
        assert!(config.tokens.contains_key("ETH"));
        assert!(config.tokens.contains_key("ALEO"));
        assert!(config.is_whitelisted("price_feed: btc"));
        assert!(config.is_whitelisted("API.BINANCE.COM"));
        assert!(!config.is_whitelisted("evil.example"));
    }

    #[test]
    fn thresholds_parse_to_rationals() {
        let config = NotaryConfig::embedded();
        let thresholds = config.tokens["BTC"].thresholds().unwrap();
        assert_eq!(thresholds.tolerance_percent, parse_decimal("2").unwrap());
        assert_eq!(thresholds.max_exchange_weight_percent, parse_decimal("40").unwrap());
    }

    #[test]
    fn validation_rejects_templates_without_placeholder() {
        let mut config = NotaryConfig::embedded();
        config.exchanges.get_mut("binance").unwrap().endpoint_template =
            "/api/v3/ticker/24hr".to_string();
        assert!(matches!(
            config.validate(),
            Err(HostError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn validation_rejects_dangling_exchange_references() {
        let mut config = NotaryConfig::embedded();
        config.tokens.get_mut("BTC").unwrap().exchanges.push("hyperion".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_quorum() {
        let mut config = NotaryConfig::embedded();
        config.min_exchanges_required = 0;
        assert!(config.validate().is_err());
    }
}
