//! Exact, suffix-aware resource quantities.
//!
//! A [`Quantity`] stores its value as a signed count of nano-units in an
//! `i128`, so `1Gi`, `1500m` and `2e3` are all represented exactly and every
//! add/subtract/compare is integer arithmetic. The original suffix family
//! (decimal SI, binary SI or decimal exponent) is remembered for printing.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Largest magnitude a quantity may hold: `i64::MAX` whole units. Sums of
/// billions of such values still fit in an `i128`, so ledger arithmetic
/// cannot overflow.
const MAX_NANOS: i128 = i64::MAX as i128 * NANOS_PER_UNIT;

/// Decimal SI suffixes keyed by their power of ten.
const DECIMAL_SUFFIXES: &[(i32, &str)] = &[
    (18, "E"),
    (15, "P"),
    (12, "T"),
    (9, "G"),
    (6, "M"),
    (3, "k"),
    (0, ""),
    (-3, "m"),
    (-6, "u"),
    (-9, "n"),
];

/// Binary SI suffixes, index = power of 1024.
const BINARY_SUFFIXES: &[&str] = &["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity must not be empty")]
    Empty,
    #[error("invalid quantity number '{0}'")]
    InvalidNumber(String),
    #[error("invalid quantity suffix '{0}'")]
    InvalidSuffix(String),
    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

/// Suffix family used when rendering a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantityFormat {
    #[default]
    DecimalSI,
    BinarySI,
    DecimalExponent,
}

/// Arbitrary resource amount (`500m`, `1Gi`, `10`, `1e3`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    nanos: i128,
    format: QuantityFormat,
}

impl Quantity {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whole units (`Quantity::from_units(2)` == `"2"`).
    pub fn from_units(units: i64) -> Self {
        Self {
            nanos: units as i128 * NANOS_PER_UNIT,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Thousandths of a unit (`Quantity::from_millis(250)` == `"250m"`).
    pub fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis as i128 * 1_000_000,
            format: QuantityFormat::DecimalSI,
        }
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    /// -1, 0 or 1 depending on the sign of the value.
    pub fn signum(&self) -> i32 {
        self.nanos.signum() as i32
    }

    /// The value with negatives replaced by zero. Presentation only; the
    /// unclamped value is what accounting uses.
    pub fn clamp_zero(&self) -> Self {
        if self.nanos < 0 {
            Self {
                nanos: 0,
                format: self.format,
            }
        } else {
            *self
        }
    }

    /// Lossy conversion for metrics exposition.
    pub fn as_approximate_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_UNIT as f64
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Self {
            nanos: self.nanos.checked_add(other.nanos)?,
            format: self.result_format(other),
        })
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        Some(Self {
            nanos: self.nanos.checked_sub(other.nanos)?,
            format: self.result_format(other),
        })
    }

    // A zero accumulator adopts the format of whatever is added to it, so a
    // zero-seeded sum of `Gi` values still prints in `Gi`.
    fn result_format(&self, other: &Self) -> QuantityFormat {
        if self.nanos == 0 {
            other.format
        } else {
            self.format
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

// Every quantity is bounded by `MAX_NANOS`, so plain integer arithmetic is
// exact for any realistic number of terms.
impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self::Output {
        Quantity {
            nanos: self.nanos + rhs.nanos,
            format: self.result_format(&rhs),
        }
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Self) -> Self::Output {
        Quantity {
            nanos: self.nanos - rhs.nanos,
            format: self.result_format(&rhs),
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_end);

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let digits = format!("{}{}", int_part, frac_part);
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::OutOfRange(input.to_string()))?;
        let scale = frac_part.len() as i32;

        let (format, base, exponent) = parse_suffix(suffix)?;
        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        // value = mantissa * base * 10^exponent / 10^scale, expressed in nanos.
        let scaled = mantissa.checked_mul(base).ok_or_else(out_of_range)?;
        let power = exponent + 9 - scale;
        let magnitude = if power >= 0 {
            let factor = 10i128.checked_pow(power as u32).ok_or_else(out_of_range)?;
            scaled.checked_mul(factor).ok_or_else(out_of_range)?
        } else {
            // Precision below one nano-unit rounds toward positive infinity:
            // up for positive values, toward zero for negative ones.
            let divisor = 10i128
                .checked_pow((-power) as u32)
                .ok_or_else(out_of_range)?;
            let whole = scaled / divisor;
            if scaled % divisor != 0 && !negative { whole + 1 } else { whole }
        };
        if magnitude > MAX_NANOS {
            return Err(out_of_range());
        }

        Ok(Quantity {
            nanos: if negative { -magnitude } else { magnitude },
            format,
        })
    }
}

/// Returns `(format, integer base, power of ten)` for a suffix.
fn parse_suffix(suffix: &str) -> Result<(QuantityFormat, i128, i32), QuantityError> {
    if let Some(power) = BINARY_SUFFIXES
        .iter()
        .position(|s| !s.is_empty() && *s == suffix)
    {
        return Ok((QuantityFormat::BinarySI, 1i128 << (10 * power), 0));
    }
    if let Some((exp, _)) = DECIMAL_SUFFIXES.iter().find(|(_, s)| *s == suffix) {
        return Ok((QuantityFormat::DecimalSI, 1, *exp));
    }
    if suffix.len() > 1 && (suffix.starts_with('e') || suffix.starts_with('E')) {
        let exp: i32 = suffix[1..]
            .parse()
            .map_err(|_| QuantityError::InvalidSuffix(suffix.to_string()))?;
        return Ok((QuantityFormat::DecimalExponent, 1, exp));
    }
    Err(QuantityError::InvalidSuffix(suffix.to_string()))
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0");
        }
        let sign = if self.nanos < 0 { "-" } else { "" };
        let magnitude = self.nanos.unsigned_abs();
        let nanos_per_unit = NANOS_PER_UNIT as u128;

        if self.format == QuantityFormat::BinarySI && magnitude % nanos_per_unit == 0 {
            let mut units = magnitude / nanos_per_unit;
            let mut power = 0;
            while power < BINARY_SUFFIXES.len() - 1 && units % 1024 == 0 {
                units /= 1024;
                power += 1;
            }
            return write!(f, "{}{}{}", sign, units, BINARY_SUFFIXES[power]);
        }

        // Largest power of ten (step 3) that divides the value exactly;
        // always terminates at the nano suffix.
        for (exp, suffix) in DECIMAL_SUFFIXES {
            let divisor = 10u128.pow((exp + 9) as u32);
            if magnitude % divisor == 0 {
                let units = magnitude / divisor;
                return match self.format {
                    QuantityFormat::DecimalExponent if *exp != 0 => {
                        write!(f, "{}{}e{}", sign, units, exp)
                    }
                    QuantityFormat::DecimalExponent => write!(f, "{}{}", sign, units),
                    _ => write!(f, "{}{}{}", sign, units, suffix),
                };
            }
        }
        write!(f, "{}{}n", sign, magnitude)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quantity string such as \"500m\" or \"1Gi\", or an integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity::from_units(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
                let v = i64::try_from(v).map_err(E::custom)?;
                Ok(Quantity::from_units(v))
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_decimal_and_binary_suffixes() {
        assert_eq!(q("1k"), Quantity::from_units(1000));
        assert_eq!(q("1Ki"), Quantity::from_units(1024));
        assert_eq!(q("1Gi"), q("1024Mi"));
        assert_eq!(q("500m"), Quantity::from_millis(500));
        assert_eq!(q("0.5"), q("500m"));
        assert_eq!(q("1.5Gi"), q("1536Mi"));
        assert_eq!(q("2e3"), q("2k"));
        assert_eq!(q("-1"), Quantity::from_units(-1));
        assert!(q("1G") < q("1Gi"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<Quantity>(), Err(QuantityError::Empty));
        assert!("abc".parse::<Quantity>().is_err());
        assert!("1.2.3".parse::<Quantity>().is_err());
        assert!("1Xi".parse::<Quantity>().is_err());
        assert!("1eX".parse::<Quantity>().is_err());
        assert!("1e60".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_sub_nano_precision_rounds_toward_positive() {
        assert_eq!(q("1.5n"), q("2n"));
        assert_eq!(q("-1.5n"), q("-1n"));
        assert_eq!(q("-0.5n"), Quantity::zero());
    }

    #[test]
    fn test_values_beyond_i64_units_are_rejected() {
        assert_eq!(q("9223372036854775807"), Quantity::from_units(i64::MAX));
        assert_eq!(q("-9223372036854775807"), Quantity::from_units(-i64::MAX));
        assert!(matches!(
            "9223372036854775808".parse::<Quantity>(),
            Err(QuantityError::OutOfRange(_))
        ));
        assert!("16E".parse::<Quantity>().is_err());
        assert!("8Ei".parse::<Quantity>().is_err());

        // The largest values still sum exactly.
        let big = Quantity::from_units(i64::MAX);
        let total = big + big + big;
        assert_eq!(total - big - big, big);
    }

    #[test]
    fn test_display_canonical_forms() {
        assert_eq!(q("1000").to_string(), "1k");
        assert_eq!(q("1500m").to_string(), "1500m");
        assert_eq!(q("1024Mi").to_string(), "1Gi");
        assert_eq!(q("1.5Gi").to_string(), "1536Mi");
        assert_eq!(q("3e3").to_string(), "3e3");
        assert_eq!(q("0Gi").to_string(), "0");
        assert_eq!(q("0.5Ki").to_string(), "512");
    }

    #[test]
    fn test_arithmetic_keeps_exact_values() {
        let hard = q("1Gi");
        let claimed = q("512Mi");
        let available = hard - claimed;
        assert_eq!(available, q("512Mi"));
        assert_eq!(available.to_string(), "512Mi");

        let mut total = Quantity::zero();
        total += q("256Mi");
        total += q("256Mi");
        assert_eq!(total.to_string(), "512Mi");

        let cpu = q("100m") + q("0.2");
        assert_eq!(cpu, q("300m"));
    }

    #[test]
    fn test_negative_values_are_preserved() {
        let available = q("1") - q("1500m");
        assert!(available.is_negative());
        assert_eq!(available.signum(), -1);
        assert_eq!(available.to_string(), "-500m");
        assert!(available.clamp_zero().is_zero());
    }

    #[test]
    fn test_serde_string_and_integer_forms() {
        let parsed: std::collections::BTreeMap<String, Quantity> =
            serde_json::from_str(r#"{"cpu": "250m", "pods": 10}"#).unwrap();
        assert_eq!(parsed["cpu"], Quantity::from_millis(250));
        assert_eq!(parsed["pods"], Quantity::from_units(10));

        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, r#"{"cpu":"250m","pods":"10"}"#);
    }
}
