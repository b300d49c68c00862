//! Kubernetes quantity parsing and formatting for storage sizes
//!
//! The sizing engine works in plain bytes; quantity strings ("10Gi", "500Mi")
//! only appear at the API boundary (policy spec, PVC resources, status).

use thiserror::Error;

/// Errors from quantity parsing
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,

    #[error("invalid quantity: {0}")]
    Invalid(String),

    #[error("quantity overflows u64: {0}")]
    Overflow(String),
}

const KIB: u128 = 1 << 10;
const MIB: u128 = 1 << 20;
const GIB: u128 = 1 << 30;
const TIB: u128 = 1 << 40;
const PIB: u128 = 1 << 50;
const EIB: u128 = 1 << 60;

/// Parse a Kubernetes storage quantity into bytes.
///
/// Supports binary suffixes (Ki, Mi, Gi, Ti, Pi, Ei), decimal suffixes
/// (k, M, G, T, P, E), a plain byte count, and a single fractional digit
/// group ("1.5Gi"). Sign and exponent notation are rejected; storage
/// requests are never negative.
pub fn parse_quantity(input: &str) -> Result<u64, QuantityError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }

    let split = s.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    if number.is_empty() {
        return Err(QuantityError::Invalid(input.to_string()));
    }

    let multiplier: u128 = match suffix {
        "" => 1,
        "Ki" => KIB,
        "Mi" => MIB,
        "Gi" => GIB,
        "Ti" => TIB,
        "Pi" => PIB,
        "Ei" => EIB,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        _ => return Err(QuantityError::Invalid(input.to_string())),
    };

    let bytes = match number.split_once('.') {
        None => {
            let whole: u128 = number
                .parse()
                .map_err(|_| QuantityError::Invalid(input.to_string()))?;
            whole
                .checked_mul(multiplier)
                .ok_or_else(|| QuantityError::Overflow(input.to_string()))?
        }
        Some((whole, frac)) => {
            if frac.is_empty() || frac.len() > 9 {
                return Err(QuantityError::Invalid(input.to_string()));
            }
            let whole: u128 = if whole.is_empty() {
                0
            } else {
                whole
                    .parse()
                    .map_err(|_| QuantityError::Invalid(input.to_string()))?
            };
            let frac_value: u128 = frac
                .parse()
                .map_err(|_| QuantityError::Invalid(input.to_string()))?;
            let scale = 10u128.pow(frac.len() as u32);
            let scaled = whole
                .checked_mul(scale)
                .and_then(|w| w.checked_add(frac_value))
                .and_then(|n| n.checked_mul(multiplier))
                .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
            scaled / scale
        }
    };

    u64::try_from(bytes).map_err(|_| QuantityError::Overflow(input.to_string()))
}

/// Format bytes as the most compact exact binary quantity.
///
/// Falls back to a plain byte count when no binary suffix divides evenly;
/// callers that want tidy PVC sizes round up first (`round_up`).
pub fn format_quantity(bytes: u64) -> String {
    let b = bytes as u128;
    if b == 0 {
        return "0".to_string();
    }
    for (unit, suffix) in [(EIB, "Ei"), (PIB, "Pi"), (TIB, "Ti"), (GIB, "Gi"), (MIB, "Mi"), (KIB, "Ki")] {
        if b % unit == 0 {
            return format!("{}{}", b / unit, suffix);
        }
    }
    bytes.to_string()
}

/// Round `bytes` up to the next multiple of `granularity`.
///
/// Grow targets are rounded to 1Mi so PVC sizes stay presentable and resize
/// requests are never issued for sub-megabyte deltas.
pub fn round_up(bytes: u64, granularity: u64) -> u64 {
    if granularity == 0 {
        return bytes;
    }
    bytes.div_ceil(granularity).saturating_mul(granularity)
}

/// 1Mi granularity for PVC sizes
pub const PVC_GRANULARITY: u64 = 1 << 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_suffixes() {
        assert_eq!(parse_quantity("1Ki").unwrap(), 1024);
        assert_eq!(parse_quantity("10Gi").unwrap(), 10 * 1024 * 1024 * 1024);
        assert_eq!(parse_quantity("2Ti").unwrap(), 2 << 40);
    }

    #[test]
    fn test_parse_decimal_suffixes() {
        assert_eq!(parse_quantity("1k").unwrap(), 1_000);
        assert_eq!(parse_quantity("5G").unwrap(), 5_000_000_000);
    }

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!(parse_quantity("4096").unwrap(), 4096);
        assert_eq!(parse_quantity("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_fractional() {
        assert_eq!(parse_quantity("1.5Gi").unwrap(), 3 * (1u64 << 29));
        assert_eq!(parse_quantity("0.5Ki").unwrap(), 512);
        assert_eq!(parse_quantity(".5Ki").unwrap(), 512);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("Gi").is_err());
        assert!(parse_quantity("10Zi").is_err());
        assert!(parse_quantity("-5Gi").is_err());
        assert!(parse_quantity("1.Gi").is_err());
        assert!(parse_quantity("1e3").is_err());
    }

    #[test]
    fn test_parse_overflow() {
        assert!(matches!(
            parse_quantity("99999999Ei"),
            Err(QuantityError::Overflow(_))
        ));
    }

    #[test]
    fn test_format_round_trip() {
        for s in ["1Ki", "512Mi", "10Gi", "3Ti"] {
            assert_eq!(format_quantity(parse_quantity(s).unwrap()), s);
        }
    }

    #[test]
    fn test_format_inexact_falls_back_to_bytes() {
        assert_eq!(format_quantity(1025), "1025");
        assert_eq!(format_quantity(0), "0");
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(1, PVC_GRANULARITY), PVC_GRANULARITY);
        assert_eq!(round_up(PVC_GRANULARITY, PVC_GRANULARITY), PVC_GRANULARITY);
        assert_eq!(
            round_up(PVC_GRANULARITY + 1, PVC_GRANULARITY),
            2 * PVC_GRANULARITY
        );
        assert_eq!(round_up(123, 0), 123);
    }
}
