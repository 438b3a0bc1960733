use alloy::primitives::U256;
use eyre::Context as _;

/// Largest decimals value whose scale `10^decimals` still fits in a `U256`.
const MAX_DECIMALS: u8 = 77;

fn scale_for(decimals: u8) -> eyre::Result<U256> {
    if decimals > MAX_DECIMALS {
        eyre::bail!("decimals too large ({decimals})");
    }
    U256::from(10_u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| eyre::eyre!("decimals too large ({decimals})"))
}

fn parse_digits(part: &str, what: &str) -> eyre::Result<U256> {
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        eyre::bail!("invalid {what} digits in amount");
    }
    U256::from_str_radix(part, 10).with_context(|| format!("parse {what}"))
}

/// Convert a decimal UI string (e.g. `"1.5"`) into base units for a token with
/// `decimals` fractional digits.
///
/// Signs, exponents, separators and more fractional digits than the token
/// supports are rejected; nothing is silently truncated.
pub fn parse_amount_ui_to_base(s: &str, decimals: u8) -> eyre::Result<U256> {
    let s = s.trim();
    if s.is_empty() {
        eyre::bail!("empty amount");
    }
    if s.starts_with('-') {
        eyre::bail!("amount must be non-negative");
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        eyre::bail!("amount has no digits");
    }
    if frac.len() > usize::from(decimals) {
        eyre::bail!("too many decimal places for token (decimals={decimals})");
    }

    let whole_v = if whole.is_empty() {
        U256::ZERO
    } else {
        parse_digits(whole, "whole")?
    };

    let mut frac_s = frac.to_owned();
    while frac_s.len() < usize::from(decimals) {
        frac_s.push('0');
    }
    let frac_v = if frac_s.is_empty() {
        U256::ZERO
    } else {
        parse_digits(&frac_s, "fractional")?
    };

    let scale = scale_for(decimals)?;
    whole_v
        .checked_mul(scale)
        .and_then(|x| x.checked_add(frac_v))
        .ok_or_else(|| eyre::eyre!("amount overflow"))
}

/// Like [`parse_amount_ui_to_base`], additionally rejecting zero.
pub fn parse_positive_amount(s: &str, decimals: u8) -> eyre::Result<U256> {
    let v = parse_amount_ui_to_base(s, decimals)?;
    if v.is_zero() {
        eyre::bail!("amount must be greater than zero");
    }
    Ok(v)
}

/// Format a base-unit integer amount into a UI decimal string without using floats.
///
/// Examples:
/// - base=1500000, decimals=6 => "1.5"
/// - base=1, decimals=8 => "0.00000001"
pub fn format_amount_base_to_ui(base: U256, decimals: u8) -> eyre::Result<String> {
    if decimals == 0 {
        return Ok(base.to_string());
    }
    let scale = scale_for(decimals)?;
    let whole = base / scale;
    let frac = base % scale;
    if frac.is_zero() {
        return Ok(whole.to_string());
    }
    let width = usize::from(decimals);
    let mut frac_s = format!("{:0>width$}", frac.to_string());
    while frac_s.ends_with('0') {
        frac_s.pop();
    }
    Ok(format!("{whole}.{frac_s}"))
}

/// Lossless display of a base amount for error payloads; falls back to the raw
/// base-unit count if the decimals are out of range.
pub fn display_amount(base: U256, decimals: u8) -> String {
    format_amount_base_to_ui(base, decimals).unwrap_or_else(|_| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ui_amount_basic() -> eyre::Result<()> {
        assert_eq!(parse_amount_ui_to_base("1", 6)?, U256::from(1_000_000_u64));
        assert_eq!(parse_amount_ui_to_base("1.5", 6)?, U256::from(1_500_000_u64));
        assert_eq!(parse_amount_ui_to_base("0.000001", 6)?, U256::from(1_u64));
        assert_eq!(parse_amount_ui_to_base(".5", 8)?, U256::from(50_000_000_u64));
        assert_eq!(parse_amount_ui_to_base("0", 18)?, U256::ZERO);
        assert_eq!(
            parse_amount_ui_to_base("2", 18)?,
            U256::from(2_000_000_000_000_000_000_u128)
        );
        Ok(())
    }

    #[test]
    fn parse_ui_rejects_malformed_input() {
        for bad in ["", "  ", "-1", "1e6", "1,000", "+1", "0x10", ".", "1.2.3", "abc"] {
            let r = parse_amount_ui_to_base(bad, 6);
            assert!(r.is_err(), "expected error for {bad:?}, got {r:?}");
        }
    }

    #[test]
    fn parse_ui_rejects_too_many_decimals() {
        let r = parse_amount_ui_to_base("1.0000001", 6);
        assert!(r.is_err(), "expected error, got ok");
        if let Err(err) = r {
            assert!(err.to_string().contains("too many decimal places"));
        }
    }

    #[test]
    fn positive_amount_rejects_zero() {
        assert!(parse_positive_amount("0.000", 6).is_err());
        assert!(parse_positive_amount("0.001", 6).is_ok());
    }

    #[test]
    fn format_base_to_ui() -> eyre::Result<()> {
        assert_eq!(format_amount_base_to_ui(U256::from(1_500_000_u64), 6)?, "1.5");
        assert_eq!(format_amount_base_to_ui(U256::from(1_u64), 8)?, "0.00000001");
        assert_eq!(format_amount_base_to_ui(U256::from(10_000_000_u64), 6)?, "10");
        assert_eq!(format_amount_base_to_ui(U256::from(7_u64), 0)?, "7");
        Ok(())
    }

    #[test]
    fn ui_amounts_survive_a_round_trip_at_each_decimals() -> eyre::Result<()> {
        let cases: [(&str, u8); 6] = [
            ("1.5", 6),
            ("123.456789", 6),
            ("0.00000001", 8),
            ("42", 18),
            ("0.1234567891", 10),
            ("1000000.000000000000000001", 18),
        ];
        for (ui, d) in cases {
            let base = parse_amount_ui_to_base(ui, d)?;
            assert_eq!(format_amount_base_to_ui(base, d)?, ui, "decimals={d}");
        }
        Ok(())
    }

    #[test]
    fn max_u256_formats_without_panicking() {
        let s = display_amount(U256::MAX, 18);
        assert!(s.starts_with("115792089237316195423570985008687907853269984665640564039457"));
    }
}
