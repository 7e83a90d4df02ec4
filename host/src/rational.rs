//! Arbitrary-precision decimal parsing and truncation.
//!
//! Prices, volumes and encoded floats never pass through a binary float:
//! parse to a `BigRational`, do the arithmetic exactly, truncate at the very
//! end.

use num_bigint::{BigInt, Sign};
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

pub fn pow10(exp: usize) -> BigInt {
    BigInt::from(10u32).pow(exp as u32)
}

/// Parse a decimal string (optional sign, optional fraction, optional
/// exponent) into an exact rational. Returns `None` for anything else.
pub fn parse_decimal(input: &str) -> Option<BigRational> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let (mantissa, exponent) = match input.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().ok()?),
        None => (input, 0),
    };

    let (negative, digits) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let unscaled: BigInt = format!("{int_part}{frac_part}").parse().ok()?;
    let unscaled = if negative { -unscaled } else { unscaled };
    let mut value = BigRational::new(unscaled, pow10(frac_part.len()));

    if exponent > 0 {
        value *= BigRational::from_integer(pow10(exponent as usize));
    } else if exponent < 0 {
        value /= BigRational::from_integer(pow10(exponent.unsigned_abs() as usize));
    }
    Some(value)
}

/// Render `value` truncated (toward zero, never rounded) to exactly
/// `precision` fractional digits, trailing zeroes included.
pub fn format_truncated(value: &BigRational, precision: usize) -> String {
    let scale = pow10(precision);
    // BigInt division truncates toward zero, which is the behaviour the
    // attestation format requires.
    let scaled: BigInt = (value.numer() * &scale) / value.denom();
    let sign = if scaled.sign() == Sign::Minus { "-" } else { "" };
    let magnitude = scaled.abs();
    let int_part = &magnitude / &scale;
    if precision == 0 {
        return format!("{sign}{int_part}");
    }
    let frac_part = &magnitude % &scale;
    format!("{sign}{int_part}.{:0>precision$}", frac_part.to_string())
}

/// Render `value` as a plain decimal: exact when the reduced denominator is
/// a product of 2s and 5s, otherwise truncated to 12 digits.
pub fn format_rational(value: &BigRational) -> String {
    match exact_decimal_digits(value) {
        Some(digits) => {
            let text = format_truncated(value, digits);
            trim_trailing_zeroes(text)
        }
        None => format_truncated(value, 12),
    }
}

fn exact_decimal_digits(value: &BigRational) -> Option<usize> {
    let mut denom = value.denom().abs();
    let mut twos = 0usize;
    let mut fives = 0usize;
    let two = BigInt::from(2u32);
    let five = BigInt::from(5u32);
    while (&denom % &two).is_zero() {
        denom /= &two;
        twos += 1;
    }
    while (&denom % &five).is_zero() {
        denom /= &five;
        fives += 1;
    }
    denom.is_one().then_some(twos.max(fives))
}

fn trim_trailing_zeroes(text: String) -> String {
    if !text.contains('.') {
        return text;
    }
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigRational {
        parse_decimal(s).unwrap()
    }

    #[test]
    fn parses_plain_decimals() {
        assert_eq!(dec("50000.00"), BigRational::from_integer(50000.into()));
        assert_eq!(dec("-3.5"), BigRational::new((-7).into(), 2.into()));
        assert_eq!(dec("+0.25"), BigRational::new(1.into(), 4.into()));
        assert_eq!(dec(".5"), BigRational::new(1.into(), 2.into()));
        assert_eq!(dec("7"), BigRational::from_integer(7.into()));
    }

    #[test]
    fn parses_scientific_notation() {
        assert_eq!(dec("1e3"), BigRational::from_integer(1000.into()));
        assert_eq!(dec("1.5e-2"), BigRational::new(3.into(), 200.into()));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", ".", "abc", "1.2.3", "1,5", "0x10", "1e", "--2"] {
            assert!(parse_decimal(bad).is_none(), "{bad:?} parsed");
        }
    }

    #[test]
    fn truncation_never_rounds() {
        assert_eq!(format_truncated(&dec("1.9999"), 2), "1.99");
        assert_eq!(format_truncated(&dec("-1.9999"), 2), "-1.99");
        assert_eq!(format_truncated(&dec("50000"), 6), "50000.000000");
        assert_eq!(format_truncated(&dec("0.000001"), 3), "0.000");
        assert_eq!(format_truncated(&dec("42.5"), 0), "42");
    }

    #[test]
    fn truncation_keeps_exactly_the_requested_digits() {
        assert_eq!(format_truncated(&dec("1.5"), 6), "1.500000");
        let third = BigRational::new(1.into(), 3.into());
        assert_eq!(format_truncated(&third, 5), "0.33333");
    }

    #[test]
    fn plain_rendering_is_exact_when_possible() {
        assert_eq!(format_rational(&dec("1.25")), "1.25");
        assert_eq!(format_rational(&dec("1000")), "1000");
        assert_eq!(format_rational(&dec("0.1")), "0.1");
        let third = BigRational::new(1.into(), 3.into());
        assert_eq!(format_rational(&third), "0.333333333333");
    }
}
