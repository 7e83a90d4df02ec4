use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Histogram, HistogramVec,
};

lazy_static! {
    // HTTP metrics
    pub static ref HTTP_REQUEST_COUNT: Counter = register_counter!(
        "notary_http_request_count",
        "the number of HTTP requests"
    )
    .unwrap();

    // Notarization metrics
    pub static ref NOTARIZATION_COUNT: CounterVec = register_counter_vec!(
        "notary_notarization_count",
        "the number of notarization requests by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref QUOTE_GENERATION_DURATION_MILLIS: Histogram = register_histogram!(
        "notary_quote_generation_duration_millis",
        "the duration of SGX quote generation"
    )
    .unwrap();

    // Price feed metrics
    pub static ref PRICE_FEED_REQUEST_COUNT: CounterVec = register_counter_vec!(
        "notary_price_feed_request_count",
        "the number of price feed aggregations per token",
        &["token"]
    )
    .unwrap();
    pub static ref EXCHANGE_ERROR_COUNT: CounterVec = register_counter_vec!(
        "notary_exchange_error_count",
        "the number of tolerated per-exchange failures",
        &["exchange", "code"]
    )
    .unwrap();
    pub static ref EXCHANGE_FETCH_DURATION_MILLIS: HistogramVec = register_histogram_vec!(
        "notary_exchange_fetch_duration_millis",
        "the duration of per-exchange ticker fetches",
        &["exchange"]
    )
    .unwrap();

    // Random endpoint metrics
    pub static ref RANDOM_REQUEST_COUNT: Counter = register_counter!(
        "notary_random_request_count",
        "the number of random number attestations"
    )
    .unwrap();
}

pub fn inc_http_request_count() {
    HTTP_REQUEST_COUNT.inc();
}

pub fn inc_notarization(outcome: &str) {
    NOTARIZATION_COUNT.with_label_values(&[outcome]).inc();
}

pub fn observe_quote_generation(duration: Duration) {
    QUOTE_GENERATION_DURATION_MILLIS.observe(duration.as_millis() as f64);
}

pub fn inc_price_feed_request(token: &str) {
    PRICE_FEED_REQUEST_COUNT.with_label_values(&[token]).inc();
}

pub fn inc_exchange_error(exchange: &str, code: &str) {
    EXCHANGE_ERROR_COUNT.with_label_values(&[exchange, code]).inc();
}

pub fn observe_exchange_fetch(exchange: &str, duration: Duration) {
    EXCHANGE_FETCH_DURATION_MILLIS
        .with_label_values(&[exchange])
        .observe(duration.as_millis() as f64);
}

pub fn inc_random_request() {
    RANDOM_REQUEST_COUNT.inc();
}
