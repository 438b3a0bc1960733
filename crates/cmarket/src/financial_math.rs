//! Centralised float-arithmetic helpers for market and account metrics.
//!
//! All `cast_precision_loss` / `float_arithmetic` lint expects live here so that
//! the aggregators can stay lint-clean. On-chain values stay as `U256` until
//! the last step; only the final display metric becomes an `f64`.

#![expect(
    clippy::cast_precision_loss,
    clippy::float_arithmetic,
    reason = "dedicated float-math module; casts and arithmetic are intentional"
)]

use alloy::primitives::U256;

/// Fixed-point scale used by exchange rates, rates per block and collateral factors.
pub const MANTISSA_SCALE: f64 = 1e18;

/// Health factor reported when an account has no borrows.
pub const NO_BORROW_HEALTH_FACTOR: f64 = 999.0;

/// Lossy conversion of an on-chain integer to `f64`.
///
/// Goes through the decimal string so that values wider than 128 bits keep
/// their magnitude instead of saturating.
pub fn u256_to_f64(v: U256) -> f64 {
    if let Ok(small) = u128::try_from(v) {
        return small as f64;
    }
    v.to_string().parse::<f64>().unwrap_or(f64::MAX)
}

/// `mantissa / 1e18`.
pub fn mantissa_to_f64(mantissa: U256) -> f64 {
    u256_to_f64(mantissa) / MANTISSA_SCALE
}

/// Base units to whole-token units.
pub fn base_to_ui_f64(base: U256, decimals: u8) -> f64 {
    u256_to_f64(base) / 10_f64.powi(i32::from(decimals))
}

/// Base units to USD.
pub fn token_base_to_usd(base: U256, decimals: u8, price: f64) -> f64 {
    base_to_ui_f64(base, decimals) * price
}

/// Annualized percentage for a per-block rate mantissa, rounded to 2 decimals.
///
/// `rate * blocks_per_year` is formed as an exact integer first; the single
/// float division afterwards is equivalent to `rate * bpy * 10000 / 1e18 / 100`.
pub fn rate_per_block_to_apy(rate_per_block: U256, blocks_per_year: u64) -> f64 {
    let annual = rate_per_block.saturating_mul(U256::from(blocks_per_year));
    round_decimals(u256_to_f64(annual) / MANTISSA_SCALE * 100.0_f64, 2)
}

/// Borrowed share of supplied underlying, as a percentage.
///
/// The denominator is `total_supply * exchange_rate / 1e18` (cTokens to
/// underlying); a zero denominator yields `0` regardless of borrows.
pub fn utilization_pct(total_borrows: U256, total_supply: U256, exchange_rate_mantissa: U256) -> f64 {
    let supplied = u256_to_f64(total_supply) * mantissa_to_f64(exchange_rate_mantissa);
    if supplied <= 0.0_f64 {
        return 0.0_f64;
    }
    round_decimals(u256_to_f64(total_borrows) / supplied * 100.0_f64, 2)
}

/// `collateral / borrow`, or [`NO_BORROW_HEALTH_FACTOR`] when nothing is borrowed.
pub fn health_factor(total_collateral_usd: f64, total_borrow_usd: f64) -> f64 {
    if total_borrow_usd <= 0.0_f64 {
        return NO_BORROW_HEALTH_FACTOR;
    }
    total_collateral_usd / total_borrow_usd
}

/// Accumulate a value into a running total (in-place addition).
pub fn accum(total: &mut f64, value: f64) {
    *total += value;
}

/// Multiply two `f64` values (for use in contexts that must avoid inline float arithmetic).
pub fn mul_f64(a: f64, b: f64) -> f64 {
    a * b
}

/// Absolute difference in percentage points between two fractional factors.
pub fn factor_divergence_pct(a: f64, b: f64) -> f64 {
    (a - b).abs() * 100.0_f64
}

/// Round a float to `decimals` decimal places.
pub fn round_decimals(x: f64, decimals: i32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    if decimals <= 0_i32 {
        return x.round();
    }
    let scale = 10_f64.powi(decimals);
    (x * scale).round() / scale
}
