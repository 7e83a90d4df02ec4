//! Normalization of the selected value under the caller's encoding options.

use std::str::FromStr;

use notary_lib::proof_data::{EncodingOptions, EncodingValue};
use num_bigint::BigInt;

use crate::error::HostError;
use crate::rational::{format_truncated, parse_decimal};

/// Largest accepted `precision`.
pub const MAX_PRECISION: u8 = 12;

/// Normalize `raw` under `options`.
///
/// `int` accepts a decimal integer of any magnitude and canonicalizes it;
/// `float` parses a rational and truncates (never rounds) to exactly
/// `precision` fractional digits; `string` passes through unchanged.
pub fn apply_encoding(raw: &str, options: &EncodingOptions) -> Result<String, HostError> {
    if options.precision > MAX_PRECISION {
        return Err(HostError::InvalidEncodingOption(format!(
            "precision {} is over the maximum of {MAX_PRECISION}",
            options.precision
        )));
    }
    match options.value {
        EncodingValue::String => Ok(raw.to_string()),
        EncodingValue::Int => BigInt::from_str(raw.trim())
            .map(|value| value.to_string())
            .map_err(|_| HostError::InvalidRationalNumber(raw.to_string())),
        EncodingValue::Float => {
            let value = parse_decimal(raw)
                .ok_or_else(|| HostError::InvalidRationalNumber(raw.to_string()))?;
            Ok(format_truncated(&value, options.precision as usize))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn options(value: EncodingValue, precision: u8) -> EncodingOptions {
        EncodingOptions { value, precision }
    }

    #[rstest]
    #[case("50000.00", 6, "50000.000000")]
    #[case("1.9999", 2, "1.99")]
    #[case("-0.5", 3, "-0.500")]
    #[case("42", 0, "42")]
    fn float_truncates_to_exact_precision(
        #[case] raw: &str,
        #[case] precision: u8,
        #[case] expected: &str,
    ) {
        assert_eq!(
            apply_encoding(raw, &options(EncodingValue::Float, precision)).unwrap(),
            expected
        );
    }

    #[test]
    fn int_canonicalizes_arbitrary_magnitudes() {
        let big = "123456789012345678901234567890123456789";
        assert_eq!(apply_encoding(big, &options(EncodingValue::Int, 0)).unwrap(), big);
        assert_eq!(apply_encoding("0007", &options(EncodingValue::Int, 0)).unwrap(), "7");
        assert_eq!(apply_encoding("-0", &options(EncodingValue::Int, 0)).unwrap(), "0");
    }

    #[test]
    fn int_rejects_non_integers() {
        assert!(matches!(
            apply_encoding("1.5", &options(EncodingValue::Int, 0)),
            Err(HostError::InvalidRationalNumber(_))
        ));
        assert!(matches!(
            apply_encoding("BTC", &options(EncodingValue::Int, 0)),
            Err(HostError::InvalidRationalNumber(_))
        ));
    }

    #[test]
    fn float_rejects_non_numbers() {
        assert!(matches!(
            apply_encoding("fifty", &options(EncodingValue::Float, 2)),
            Err(HostError::InvalidRationalNumber(_))
        ));
    }

    #[test]
    fn string_passes_through() {
        assert_eq!(
            apply_encoding("BTC", &options(EncodingValue::String, 0)).unwrap(),
            "BTC"
        );
    }

    #[test]
    fn excessive_precision_is_rejected() {
        assert!(matches!(
            apply_encoding("1", &options(EncodingValue::Float, 13)),
            Err(HostError::InvalidEncodingOption(_))
        ));
    }
}
