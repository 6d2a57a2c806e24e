//! Bet menus, currency scaling and amount formatting.

use rust_decimal::Decimal;

/// Game vendors a transaction can be attributed to.
pub const VENDOR_CODES: [&str; 7] = [
    "PRAGMATIC",
    "EVOLUTION",
    "NETENT",
    "MICROGAMING",
    "PLAYTECH",
    "EGT",
    "PLAYSON",
];

/// Base bet denominations, before currency scaling.
pub const BASE_BET_AMOUNTS: [i64; 6] = [10, 50, 100, 200, 500, 1000];

/// Win multipliers as `(mantissa, scale)`; picked uniformly, so losses
/// (0x, 0.5x, 0.8x) outnumber wins.
pub(crate) const WIN_MULTIPLIERS: [(i64, u32); 10] = [
    (0, 0),
    (0, 0),
    (5, 1),
    (8, 1),
    (10, 1),
    (15, 1),
    (20, 1),
    (30, 1),
    (50, 1),
    (100, 1),
];

/// Fractional digits of every monetary field.
pub const AMOUNT_SCALE: u32 = 6;

pub(crate) fn win_multiplier(index: usize) -> Decimal {
    let (mantissa, scale) = WIN_MULTIPLIERS[index];
    Decimal::new(mantissa, scale)
}

/// Apply the per-currency scaling rule to a base bet.
///
/// Crypto gets smaller amounts, low-value fiat gets larger ones.
pub fn scale_bet_amount(currency_code: &str, base: Decimal) -> Decimal {
    match currency_code {
        "BTC" => base / Decimal::from(10_000),
        "ETH" => base / Decimal::from(1_000),
        "JPY" => base * Decimal::from(100),
        "CNY" => base * Decimal::from(7),
        _ => base,
    }
}

/// Render with exactly [`AMOUNT_SCALE`] fractional digits.
pub fn format_amount(amount: Decimal) -> String {
    let mut value = amount.round_dp(AMOUNT_SCALE);
    value.rescale(AMOUNT_SCALE);
    value.to_string()
}
