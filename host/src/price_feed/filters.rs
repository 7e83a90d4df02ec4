//! Robust statistics for the cross-exchange aggregation: median, MAD
//! outlier filtering, per-venue weight capping and the VWAP itself.
//!
//! Everything operates on exact rationals; the only truncation happens when
//! the final VWAP is rendered.

use std::collections::HashMap;

use num_rational::BigRational;
use num_traits::Zero;

use super::ExchangePrice;

/// Median of a non-empty set of rationals.
pub fn median(values: &[BigRational]) -> BigRational {
    let mut sorted = values.to_vec();
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid].clone()
    } else {
        (&sorted[mid - 1] + &sorted[mid]) / BigRational::from_integer(2.into())
    }
}

/// Median absolute deviation around `center`.
pub fn median_absolute_deviation(values: &[BigRational], center: &BigRational) -> BigRational {
    let deviations: Vec<BigRational> = values
        .iter()
        .map(|v| {
            let d = v - center;
            if d < BigRational::zero() {
                -d
            } else {
                d
            }
        })
        .collect();
    median(&deviations)
}

/// Keep samples inside the tighter of the MAD envelope and the tolerance
/// envelope: `lower = max(m·(1−tol), m−k·d)`, `upper = min(m·(1+tol), m+k·d)`.
///
/// With a collapsed MAD (all prices equal) the MAD envelope degenerates to
/// the median itself and only equal prices survive, which is the correct
/// no-op. The combination never widens the tolerance envelope.
pub fn filter_outliers(
    samples: &[ExchangePrice],
    tolerance_percent: &BigRational,
    mad_multiplier: &BigRational,
) -> Vec<ExchangePrice> {
    if samples.is_empty() {
        return Vec::new();
    }
    let prices: Vec<BigRational> = samples.iter().map(|s| s.price.clone()).collect();
    let m = median(&prices);
    let d = median_absolute_deviation(&prices, &m);

    let hundred = BigRational::from_integer(100.into());
    let tol = tolerance_percent / &hundred;
    let one = BigRational::from_integer(1.into());
    let mad_span = mad_multiplier * &d;

    let lower = (&m * (&one - &tol)).max(&m - &mad_span);
    let upper = (&m * (&one + &tol)).min(&m + &mad_span);

    samples
        .iter()
        .filter(|s| s.price >= lower && s.price <= upper)
        .cloned()
        .collect()
}

/// Scale down any venue whose summed volume exceeds
/// `max_weight_percent/100 · total_volume`, proportionally across its
/// samples.
pub fn cap_exchange_weight(
    samples: &[ExchangePrice],
    max_weight_percent: &BigRational,
    total_volume: &BigRational,
) -> Vec<ExchangePrice> {
    let hundred = BigRational::from_integer(100.into());
    let cap = max_weight_percent / &hundred * total_volume;

    let mut venue_volume: HashMap<&str, BigRational> = HashMap::new();
    for sample in samples {
        *venue_volume
            .entry(sample.exchange.as_str())
            .or_insert_with(BigRational::zero) += &sample.volume;
    }

    samples
        .iter()
        .map(|sample| {
            let venue = &venue_volume[sample.exchange.as_str()];
            if venue > &cap && !venue.is_zero() {
                let mut capped = sample.clone();
                capped.volume = &sample.volume * &cap / venue;
                capped
            } else {
                sample.clone()
            }
        })
        .collect()
}

/// Whether `max_price / min_price` exceeds `1 + max_spread_percent/100`.
pub fn spread_exceeded(samples: &[ExchangePrice], max_spread_percent: &BigRational) -> bool {
    let Some(min) = samples.iter().map(|s| &s.price).min() else {
        return false;
    };
    let max = samples.iter().map(|s| &s.price).max().unwrap();
    if min.is_zero() {
        return true;
    }
    let hundred = BigRational::from_integer(100.into());
    let limit = BigRational::from_integer(1.into()) + max_spread_percent / &hundred;
    max / min > limit
}

/// `Σ(price·volume) / Σ(volume)` with the total, or `None` when the total
/// volume is zero.
pub fn vwap(samples: &[ExchangePrice]) -> Option<(BigRational, BigRational)> {
    let mut total = BigRational::zero();
    let mut weighted = BigRational::zero();
    for sample in samples {
        total += &sample.volume;
        weighted += &sample.price * &sample.volume;
    }
    if total.is_zero() {
        return None;
    }
    Some((&weighted / &total, total))
}
