//! Per-exchange ticker fetching and response parsing.
//!
//! Every venue speaks its own dialect; each parser reduces a response to
//! `(symbol?, price, volume, timestamp?)` and nothing else. Failures here
//! are tolerated by the aggregator, logged and counted.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::config::ExchangeConfig;

/// Attempts per venue, retries included.
const MAX_FETCH_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("creating exchange request: {0}")]
    CreatingRequest(String),

    #[error("fetching from exchange: {0}")]
    Fetching(String),

    #[error("exchange returned status {0}")]
    Api(u16),

    #[error("reading exchange response: {0}")]
    ReadingResponse(String),

    #[error("decoding exchange response: {0}")]
    Decoding(String),

    #[error("missing {0} in exchange response")]
    MissingData(String),

    #[error("price {0:?} is not a positive decimal")]
    ParsingPrice(String),

    #[error("volume {0:?} is not a positive decimal")]
    ParsingVolume(String),

    #[error("parsing timestamp: {0}")]
    ParsingTimestamp(String),

    #[error("symbol mismatch: expected {expected}, got {got}")]
    SymbolMismatch { expected: String, got: String },

    #[error("source timestamp is {diff_ms}ms away from the request time (max {max_ms}ms)")]
    TimestampTooOld { diff_ms: u64, max_ms: u64 },
}

impl ExchangeError {
    /// Stable code used for logging and the failure counter.
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::CreatingRequest(_) => "CreatingExchangeRequest",
            ExchangeError::Fetching(_) => "FetchingFromExchange",
            ExchangeError::Api(_) => "ExchangeApiError",
            ExchangeError::ReadingResponse(_) => "ReadingExchangeResponse",
            ExchangeError::Decoding(_) => "DecodingExchangeResponse",
            ExchangeError::MissingData(_) => "MissingDataInResponse",
            ExchangeError::ParsingPrice(_) => "ParsingPrice",
            ExchangeError::ParsingVolume(_) => "ParsingVolume",
            ExchangeError::ParsingTimestamp(_) => "ParsingTimestamp",
            ExchangeError::SymbolMismatch { .. } => "SymbolMismatch",
            ExchangeError::TimestampTooOld { .. } => "TimestampTooOld",
        }
    }
}

/// A ticker reduced to the fields the aggregator validates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTicker {
    pub price: String,
    pub volume: String,
    /// Milliseconds since epoch, when the venue reports one.
    pub timestamp_ms: Option<i64>,
}

/// Fetch one venue's ticker JSON, retrying transport failures.
pub async fn fetch_ticker(
    client: &reqwest::Client,
    exchange: &str,
    config: &ExchangeConfig,
    symbol: &str,
) -> Result<Value, ExchangeError> {
    let endpoint = config.endpoint_template.replace("{symbol}", symbol);
    let url = Url::parse(&format!("{}{}", config.base_url, endpoint))
        .map_err(|e| ExchangeError::CreatingRequest(e.to_string()))?;

    let backoff = ExponentialBackoff {
        initial_interval: Duration::from_secs(2),
        max_interval: Duration::from_secs(3),
        multiplier: 1.5,
        randomization_factor: 0.3,
        max_elapsed_time: Some(Duration::from_secs(20)),
        ..Default::default()
    };
    let attempts = AtomicU32::new(0);

    let response = backoff::future::retry(backoff, || async {
        let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
        match client.get(url.clone()).send().await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(exchange, attempt, error = %e, "exchange fetch failed");
                if attempt >= MAX_FETCH_ATTEMPTS {
                    Err(backoff::Error::permanent(e))
                } else {
                    Err(backoff::Error::transient(e))
                }
            }
        }
    })
    .await
    .map_err(|e| ExchangeError::Fetching(e.to_string()))?;

    if !response.status().is_success() {
        return Err(ExchangeError::Api(response.status().as_u16()));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| ExchangeError::ReadingResponse(e.to_string()))
}

/// Reduce a venue response to a [`RawTicker`], verifying any echoed symbol
/// case-insensitively.
pub fn parse_ticker(exchange: &str, body: &Value, symbol: &str) -> Result<RawTicker, ExchangeError> {
    match exchange {
        "binance" | "mexc" => parse_binance_like(body, symbol),
        "bybit" => parse_bybit(body, symbol),
        "coinbase" => parse_coinbase(body),
        "kraken" => parse_kraken(body),
        "gate" => parse_gate(body, symbol),
        "xt" => parse_xt(body, symbol),
        other => Err(ExchangeError::Decoding(format!("no parser for exchange {other}"))),
    }
}

fn check_symbol(expected: &str, got: &str) -> Result<(), ExchangeError> {
    if expected.eq_ignore_ascii_case(got) {
        Ok(())
    } else {
        Err(ExchangeError::SymbolMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        })
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, ExchangeError> {
    match value.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ExchangeError::MissingData(field.to_string())),
    }
}

fn int_field(value: &Value, field: &str) -> Result<i64, ExchangeError> {
    value
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| ExchangeError::MissingData(field.to_string()))
}

/// `GET /api/v3/ticker/24hr`: `symbol`, `lastPrice`, `volume`, `closeTime`.
fn parse_binance_like(body: &Value, symbol: &str) -> Result<RawTicker, ExchangeError> {
    check_symbol(symbol, &string_field(body, "symbol")?)?;
    Ok(RawTicker {
        price: string_field(body, "lastPrice")?,
        volume: string_field(body, "volume")?,
        timestamp_ms: Some(int_field(body, "closeTime")?),
    })
}

/// `GET /v5/market/tickers`: envelope with `retCode`, `result.list[0]` and a
/// top-level `time` in milliseconds.
fn parse_bybit(body: &Value, symbol: &str) -> Result<RawTicker, ExchangeError> {
    let ret_code = int_field(body, "retCode")?;
    if ret_code != 0 {
        return Err(ExchangeError::Decoding(format!("retCode {ret_code}")));
    }
    let ticker = body
        .get("result")
        .and_then(|r| r.get("list"))
        .and_then(|l| l.get(0))
        .ok_or_else(|| ExchangeError::MissingData("result.list[0]".to_string()))?;
    check_symbol(symbol, &string_field(ticker, "symbol")?)?;
    Ok(RawTicker {
        price: string_field(ticker, "lastPrice")?,
        volume: string_field(ticker, "volume24h")?,
        timestamp_ms: Some(int_field(body, "time")?),
    })
}

/// `GET /products/{id}/ticker`: `price`, `volume`, RFC3339 `time`. The
/// product id is not echoed, so there is no symbol check.
fn parse_coinbase(body: &Value) -> Result<RawTicker, ExchangeError> {
    let time = string_field(body, "time")?;
    let timestamp_ms = chrono::DateTime::parse_from_rfc3339(&time)
        .map_err(|e| ExchangeError::ParsingTimestamp(e.to_string()))?
        .timestamp_millis();
    Ok(RawTicker {
        price: string_field(body, "price")?,
        volume: string_field(body, "volume")?,
        timestamp_ms: Some(timestamp_ms),
    })
}

/// `GET /0/public/Ticker`: `result` keyed by Kraken's own pair name with
/// `c[0]` as last price and `v[1]` as 24h volume. No response timestamp.
fn parse_kraken(body: &Value) -> Result<RawTicker, ExchangeError> {
    if let Some(errors) = body.get("error").and_then(Value::as_array) {
        if !errors.is_empty() {
            return Err(ExchangeError::Decoding(format!("kraken error: {errors:?}")));
        }
    }
    let result = body
        .get("result")
        .and_then(Value::as_object)
        .filter(|pairs| !pairs.is_empty())
        .ok_or_else(|| ExchangeError::MissingData("result".to_string()))?;
    let ticker = result.values().next().unwrap();
    let price = ticker
        .get("c")
        .and_then(|c| c.get(0))
        .and_then(Value::as_str)
        .ok_or_else(|| ExchangeError::MissingData("result.c[0]".to_string()))?;
    let volume = ticker
        .get("v")
        .and_then(|v| v.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| ExchangeError::MissingData("result.v[1]".to_string()))?;
    Ok(RawTicker {
        price: price.to_string(),
        volume: volume.to_string(),
        timestamp_ms: None,
    })
}

/// `GET /api/v4/spot/tickers`: an array with `currency_pair`, `last`,
/// `base_volume`. No response timestamp.
fn parse_gate(body: &Value, symbol: &str) -> Result<RawTicker, ExchangeError> {
    let ticker = body
        .get(0)
        .ok_or_else(|| ExchangeError::MissingData("[0]".to_string()))?;
    check_symbol(symbol, &string_field(ticker, "currency_pair")?)?;
    Ok(RawTicker {
        price: string_field(ticker, "last")?,
        volume: string_field(ticker, "base_volume")?,
        timestamp_ms: None,
    })
}

/// `GET /v4/public/ticker/24h`: envelope with `rc`, `result[0]` carrying
/// `s` (symbol), `c` (close), `q` (quantity) and `t` (milliseconds).
fn parse_xt(body: &Value, symbol: &str) -> Result<RawTicker, ExchangeError> {
    let rc = int_field(body, "rc")?;
    if rc != 0 {
        return Err(ExchangeError::Decoding(format!("rc {rc}")));
    }
    let ticker = body
        .get("result")
        .and_then(|r| r.get(0))
        .ok_or_else(|| ExchangeError::MissingData("result[0]".to_string()))?;
    check_symbol(symbol, &string_field(ticker, "s")?)?;
    Ok(RawTicker {
        price: string_field(ticker, "c")?,
        volume: string_field(ticker, "q")?,
        timestamp_ms: Some(int_field(ticker, "t")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binance_ticker_parses() {
        let body = json!({
            "symbol": "BTCUSDT",
            "lastPrice": "50000.00",
            "volume": "1000.5",
            "closeTime": 1700000000123i64
        });
        let ticker = parse_ticker("binance", &body, "BTCUSDT").unwrap();
        assert_eq!(ticker.price, "50000.00");
        assert_eq!(ticker.volume, "1000.5");
        assert_eq!(ticker.timestamp_ms, Some(1700000000123));
    }

    #[test]
    fn binance_symbol_check_is_case_insensitive() {
        let body = json!({
            "symbol": "btcusdt",
            "lastPrice": "1",
            "volume": "1",
            "closeTime": 1i64
        });
        assert!(parse_ticker("binance", &body, "BTCUSDT").is_ok());
        assert!(matches!(
            parse_ticker("binance", &body, "ETHUSDT"),
            Err(ExchangeError::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn bybit_ticker_parses() {
        let body = json!({
            "retCode": 0,
            "result": {
                "category": "spot",
                "list": [{ "symbol": "BTCUSDT", "lastPrice": "50100", "volume24h": "800.25" }]
            },
            "time": 1700000000456i64
        });
        let ticker = parse_ticker("bybit", &body, "BTCUSDT").unwrap();
        assert_eq!(ticker.price, "50100");
        assert_eq!(ticker.timestamp_ms, Some(1700000000456));
    }

    #[test]
    fn bybit_error_envelope_is_rejected() {
        let body = json!({ "retCode": 10001, "result": {}, "time": 1i64 });
        assert!(matches!(
            parse_ticker("bybit", &body, "BTCUSDT"),
            Err(ExchangeError::Decoding(_))
        ));
    }

    #[test]
    fn coinbase_ticker_parses_rfc3339_time() {
        let body = json!({
            "price": "50200.00",
            "volume": "1200.75",
            "time": "2023-11-14T22:13:20.123Z"
        });
        let ticker = parse_ticker("coinbase", &body, "BTC-USD").unwrap();
        assert_eq!(ticker.price, "50200.00");
        assert_eq!(ticker.timestamp_ms, Some(1700000000123));
    }

    #[test]
    fn kraken_ticker_parses_nested_arrays() {
        let body = json!({
            "error": [],
            "result": {
                "XXBTZUSD": { "c": ["50300.0", "0.1"], "v": ["120.5", "900.3"] }
            }
        });
        let ticker = parse_ticker("kraken", &body, "XBTUSD").unwrap();
        assert_eq!(ticker.price, "50300.0");
        assert_eq!(ticker.volume, "900.3");
        assert_eq!(ticker.timestamp_ms, None);
    }

    #[test]
    fn kraken_errors_are_rejected() {
        let body = json!({ "error": ["EQuery:Unknown asset pair"] });
        assert!(matches!(
            parse_ticker("kraken", &body, "XBTUSD"),
            Err(ExchangeError::Decoding(_))
        ));
    }

    #[test]
    fn gate_ticker_parses() {
        let body = json!([{
            "currency_pair": "ALEO_USDT",
            "last": "0.245",
            "base_volume": "1500000"
        }]);
        let ticker = parse_ticker("gate", &body, "ALEO_USDT").unwrap();
        assert_eq!(ticker.price, "0.245");
        assert_eq!(ticker.volume, "1500000");
    }

    #[test]
    fn xt_ticker_parses() {
        let body = json!({
            "rc": 0,
            "result": [{ "s": "aleo_usdt", "c": "0.244", "q": "900000", "t": 1700000000789i64 }]
        });
        let ticker = parse_ticker("xt", &body, "aleo_usdt").unwrap();
        assert_eq!(ticker.price, "0.244");
        assert_eq!(ticker.timestamp_ms, Some(1700000000789));
    }

    #[test]
    fn missing_fields_are_missing_data() {
        let body = json!({ "symbol": "BTCUSDT", "volume": "1", "closeTime": 1i64 });
        assert!(matches!(
            parse_ticker("binance", &body, "BTCUSDT"),
            Err(ExchangeError::MissingData(f)) if f == "lastPrice"
        ));
    }

    #[test]
    fn unknown_exchanges_are_rejected() {
        assert!(matches!(
            parse_ticker("hyperion", &json!({}), "X"),
            Err(ExchangeError::Decoding(_))
        ));
    }
}
