//! Multi-source price aggregation: concurrent fan-out to the configured
//! venues, per-venue validation, robust filtering and the final VWAP.

pub mod exchanges;
pub mod filters;

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Instant;

use num_rational::BigRational;
use num_traits::Zero;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::{NotaryConfig, TokenThresholds};
use crate::error::HostError;
use crate::metrics;
use crate::rational::{format_rational, format_truncated, parse_decimal};
use self::exchanges::{ExchangeError, RawTicker};

/// Tokens the price feed serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceToken {
    Btc,
    Eth,
    Aleo,
}

impl FromStr for PriceToken {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "btc" => Ok(PriceToken::Btc),
            "eth" => Ok(PriceToken::Eth),
            "aleo" => Ok(PriceToken::Aleo),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PriceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PriceToken::Btc => "BTC",
            PriceToken::Eth => "ETH",
            PriceToken::Aleo => "ALEO",
        })
    }
}

/// One validated venue sample, exact rationals at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangePrice {
    pub exchange: String,
    pub token: String,
    pub symbol: String,
    pub price: BigRational,
    pub volume: BigRational,
}

/// Serializable view of a sample.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceSample {
    pub exchange: String,
    pub symbol: String,
    pub price: String,
    pub volume: String,
}

impl From<&ExchangePrice> for PriceSample {
    fn from(price: &ExchangePrice) -> Self {
        Self {
            exchange: price.exchange.clone(),
            symbol: price.symbol.clone(),
            price: format_rational(&price.price),
            volume: format_rational(&price.volume),
        }
    }
}

/// The aggregation result sealed into the attestation body.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceFeedResult {
    pub token: String,
    pub vwap: String,
    pub total_volume: String,
    pub exchange_count: usize,
    pub timestamp: u64,
    /// Every sample that came back, pre-filtering.
    pub raw: Vec<PriceSample>,
    /// The samples (with capped volumes) the VWAP was computed from.
    pub used: Vec<PriceSample>,
}

/// Aggregate `token` across its configured venues at `timestamp`.
pub async fn aggregate_price(
    config: &NotaryConfig,
    client: &reqwest::Client,
    token: PriceToken,
    timestamp: u64,
    precision: u8,
) -> Result<PriceFeedResult, HostError> {
    let token_name = token.to_string();
    metrics::inc_price_feed_request(&token_name);

    let token_config = config
        .tokens
        .get(&token_name)
        .ok_or_else(|| HostError::TokenNotSupported(token_name.clone()))?;
    if token_config.exchanges.is_empty() {
        return Err(HostError::NoTradingPairsConfigured(token_name));
    }
    let thresholds = token_config.thresholds()?;

    let mut fetches = JoinSet::new();
    for exchange_name in &token_config.exchanges {
        let exchange = config
            .exchanges
            .get(exchange_name)
            .ok_or_else(|| HostError::ExchangeNotConfigured(exchange_name.clone()))?
            .clone();
        let symbol = exchange
            .symbols
            .get(&token_name)
            .ok_or_else(|| HostError::SymbolNotConfigured {
                exchange: exchange_name.clone(),
                token: token_name.clone(),
            })?
            .clone();

        let client = client.clone();
        let exchange_name = exchange_name.clone();
        let token_name = token_name.clone();
        let max_time_diff_ms = config.max_allowed_time_diff_ms;
        fetches.spawn(async move {
            let started = Instant::now();
            let result = fetch_exchange_price(
                &client,
                &exchange_name,
                &exchange,
                &symbol,
                &token_name,
                timestamp,
                max_time_diff_ms,
            )
            .await;
            metrics::observe_exchange_fetch(&exchange_name, started.elapsed());
            (exchange_name, result)
        });
    }

    let mut samples = Vec::new();
    while let Some(joined) = fetches.join_next().await {
        match joined {
            Ok((exchange, Ok(price))) => {
                debug!(exchange, price = %price.price, volume = %price.volume, "sample accepted");
                samples.push(price);
            }
            Ok((exchange, Err(error))) => {
                warn!(exchange, code = error.code(), error = %error, "exchange sample dropped");
                metrics::inc_exchange_error(&exchange, error.code());
            }
            Err(join_error) => return Err(join_error.into()),
        }
    }

    aggregate_samples(
        samples,
        &thresholds,
        config.min_exchanges_required,
        token,
        timestamp,
        precision,
    )
}

/// The pure aggregation pipeline over already-fetched samples, in spec
/// order: dedup, volume gate, MAD filter, weight cap, dispersion guard,
/// VWAP, quorum.
fn aggregate_samples(
    samples: Vec<ExchangePrice>,
    thresholds: &TokenThresholds,
    min_exchanges_required: usize,
    token: PriceToken,
    timestamp: u64,
    precision: u8,
) -> Result<PriceFeedResult, HostError> {
    if samples.is_empty() {
        return Err(HostError::NoPricesFound);
    }

    let mut seen = HashSet::new();
    let deduped: Vec<ExchangePrice> = samples
        .iter()
        .filter(|s| seen.insert((s.exchange.clone(), s.symbol.clone())))
        .cloned()
        .collect();

    let gated: Vec<ExchangePrice> = deduped
        .iter()
        .filter(|s| s.volume >= thresholds.min_volume_per_exchange)
        .cloned()
        .collect();
    if gated.is_empty() {
        return Err(HostError::AllPricesBelowMinVolume);
    }

    let filtered = filters::filter_outliers(
        &gated,
        &thresholds.tolerance_percent,
        &thresholds.mad_multiplier,
    );
    if filtered.is_empty() {
        return Err(HostError::AllPricesOutlierFiltered);
    }

    let total_volume: BigRational = filtered
        .iter()
        .fold(BigRational::zero(), |acc, s| acc + &s.volume);
    if total_volume.is_zero() {
        return Err(HostError::ZeroVolume);
    }

    let capped = filters::cap_exchange_weight(
        &filtered,
        &thresholds.max_exchange_weight_percent,
        &total_volume,
    );

    if filters::spread_exceeded(&capped, &thresholds.max_spread_percent) {
        return Err(HostError::CrossVenueDispersionTooHigh);
    }

    let (vwap, capped_volume) =
        filters::vwap(&capped).ok_or(HostError::ZeroCappedVolume)?;

    let exchange_count = capped
        .iter()
        .map(|s| s.exchange.as_str())
        .collect::<HashSet<_>>()
        .len();
    if exchange_count < min_exchanges_required {
        return Err(HostError::InsufficientExchangeData {
            got: exchange_count,
            required: min_exchanges_required,
        });
    }

    Ok(PriceFeedResult {
        token: token.to_string(),
        vwap: format_truncated(&vwap, precision as usize),
        total_volume: format_rational(&capped_volume),
        exchange_count,
        timestamp,
        raw: deduped.iter().map(PriceSample::from).collect(),
        used: capped.iter().map(PriceSample::from).collect(),
    })
}

/// Fetch and validate one venue's sample.
async fn fetch_exchange_price(
    client: &reqwest::Client,
    exchange_name: &str,
    exchange: &crate::config::ExchangeConfig,
    symbol: &str,
    token: &str,
    timestamp: u64,
    max_time_diff_ms: u64,
) -> Result<ExchangePrice, ExchangeError> {
    let body = exchanges::fetch_ticker(client, exchange_name, exchange, symbol).await?;
    let ticker = exchanges::parse_ticker(exchange_name, &body, symbol)?;
    validate_ticker(&ticker, exchange_name, symbol, token, timestamp, max_time_diff_ms)
}

/// Enforce freshness and positive price/volume on a parsed ticker.
fn validate_ticker(
    ticker: &RawTicker,
    exchange_name: &str,
    symbol: &str,
    token: &str,
    timestamp: u64,
    max_time_diff_ms: u64,
) -> Result<ExchangePrice, ExchangeError> {
    if let Some(source_ms) = ticker.timestamp_ms {
        let request_ms = (timestamp as i64) * 1000;
        let diff_ms = source_ms.abs_diff(request_ms);
        if diff_ms > max_time_diff_ms {
            return Err(ExchangeError::TimestampTooOld { diff_ms, max_ms: max_time_diff_ms });
        }
    }

    let price = parse_decimal(&ticker.price)
        .filter(|p| p > &BigRational::zero())
        .ok_or_else(|| ExchangeError::ParsingPrice(ticker.price.clone()))?;
    let volume = parse_decimal(&ticker.volume)
        .filter(|v| v > &BigRational::zero())
        .ok_or_else(|| ExchangeError::ParsingVolume(ticker.volume.clone()))?;

    Ok(ExchangePrice {
        exchange: exchange_name.to_string(),
        token: token.to_string(),
        symbol: symbol.to_string(),
        price,
        volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> TokenThresholds {
        TokenThresholds {
            tolerance_percent: parse_decimal("2").unwrap(),
            mad_multiplier: parse_decimal("3").unwrap(),
            max_spread_percent: parse_decimal("5").unwrap(),
            min_volume_per_exchange: parse_decimal("10").unwrap(),
            max_exchange_weight_percent: parse_decimal("40").unwrap(),
        }
    }

    fn sample(exchange: &str, price: &str, volume: &str) -> ExchangePrice {
        ExchangePrice {
            exchange: exchange.to_string(),
            token: "BTC".to_string(),
            symbol: format!("{}-BTCUSD", exchange),
            price: parse_decimal(price).unwrap(),
            volume: parse_decimal(volume).unwrap(),
        }
    }

    fn btc_batch() -> Vec<ExchangePrice> {
        vec![
            sample("binance", "50000", "1000.5"),
            sample("bybit", "50100", "800.25"),
            sample("coinbase", "50200", "1200.75"),
            sample("kraken", "50300", "900.3"),
        ]
    }

    #[test]
    fn happy_path_vwap_and_count() {
        let result =
            aggregate_samples(btc_batch(), &thresholds(), 2, PriceToken::Btc, 1_700_000_000, 6)
                .unwrap();
        assert_eq!(result.token, "BTC");
        assert_eq!(result.vwap, "50151.280178");
        assert_eq!(result.exchange_count, 4);
        assert_eq!(result.raw.len(), 4);
        assert_eq!(result.used.len(), 4);
        assert_eq!(result.timestamp, 1_700_000_000);
    }

    #[test]
    fn duplicate_venue_samples_are_dropped() {
        let mut batch = btc_batch();
        batch.push(batch[0].clone());
        let result =
            aggregate_samples(batch, &thresholds(), 2, PriceToken::Btc, 0, 2).unwrap();
        assert_eq!(result.raw.len(), 4);
    }

    #[test]
    fn empty_batch_is_no_prices_found() {
        assert!(matches!(
            aggregate_samples(vec![], &thresholds(), 2, PriceToken::Btc, 0, 2),
            Err(HostError::NoPricesFound)
        ));
    }

    #[test]
    fn thin_volume_batches_are_rejected() {
        let batch = vec![sample("binance", "50000", "1"), sample("bybit", "50100", "2")];
        assert!(matches!(
            aggregate_samples(batch, &thresholds(), 2, PriceToken::Btc, 0, 2),
            Err(HostError::AllPricesBelowMinVolume)
        ));
    }

    #[test]
    fn wide_spread_batches_are_rejected() {
        // Within the 2% tolerance envelope but above the 3% spread limit.
        let mut limits = thresholds();
        limits.max_spread_percent = parse_decimal("3").unwrap();
        limits.tolerance_percent = parse_decimal("10").unwrap();
        let batch = vec![
            sample("binance", "100", "100"),
            sample("bybit", "104", "100"),
        ];
        assert!(matches!(
            aggregate_samples(batch, &limits, 2, PriceToken::Btc, 0, 2),
            Err(HostError::CrossVenueDispersionTooHigh)
        ));
    }

    #[test]
    fn quorum_is_enforced() {
        let batch = vec![sample("binance", "50000", "1000")];
        assert!(matches!(
            aggregate_samples(batch, &thresholds(), 2, PriceToken::Btc, 0, 2),
            Err(HostError::InsufficientExchangeData { got: 1, required: 2 })
        ));
    }

    #[test]
    fn freshness_window_is_enforced() {
        let ticker = RawTicker {
            price: "50000".to_string(),
            volume: "100".to_string(),
            timestamp_ms: Some(1_700_000_000_000 - 400_000),
        };
        assert!(matches!(
            validate_ticker(&ticker, "binance", "BTCUSDT", "BTC", 1_700_000_000, 300_000),
            Err(ExchangeError::TimestampTooOld { diff_ms: 400_000, max_ms: 300_000 })
        ));

        let fresh = RawTicker { timestamp_ms: Some(1_700_000_000_000 - 200_000), ..ticker };
        assert!(validate_ticker(&fresh, "binance", "BTCUSDT", "BTC", 1_700_000_000, 300_000).is_ok());
    }

    #[test]
    fn venues_without_timestamps_skip_the_freshness_check() {
        let ticker = RawTicker {
            price: "50000".to_string(),
            volume: "100".to_string(),
            timestamp_ms: None,
        };
        assert!(validate_ticker(&ticker, "kraken", "XBTUSD", "BTC", 1_700_000_000, 300_000).is_ok());
    }

    #[test]
    fn non_positive_prices_and_volumes_are_rejected() {
        let zero_price = RawTicker {
            price: "0".to_string(),
            volume: "100".to_string(),
            timestamp_ms: None,
        };
        assert!(matches!(
            validate_ticker(&zero_price, "binance", "S", "BTC", 0, 1),
            Err(ExchangeError::ParsingPrice(_))
        ));

        let negative_volume = RawTicker {
            price: "1".to_string(),
            volume: "-5".to_string(),
            timestamp_ms: None,
        };
        assert!(matches!(
            validate_ticker(&negative_volume, "binance", "S", "BTC", 0, 1),
            Err(ExchangeError::ParsingVolume(_))
        ));
    }
}
