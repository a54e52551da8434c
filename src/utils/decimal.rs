//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Quantities at or below this are treated as a flat position.
pub const QTY_EPSILON: Decimal = dec!(0.0001);

/// Round a decimal to a specific number of decimal places (banker's rounding).
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Round a price or cash amount to cents.
pub fn round_cents(value: Decimal) -> Decimal {
    round_to_precision(value, 2)
}

/// Round to a whole share count (banker's rounding).
pub fn round_shares(value: Decimal) -> Decimal {
    value.round()
}

/// Whole shares affordable with `budget` at `price`, rounded down.
pub fn shares_affordable(budget: Decimal, price: Decimal) -> Decimal {
    safe_div(budget, price).floor()
}

/// Whether a held quantity counts as zero.
pub fn is_flat(quantity: Decimal) -> bool {
    quantity <= QTY_EPSILON
}

/// Convert a percentage (20 = 20%) to a rate (0.20).
pub fn percent_to_rate(percent: Decimal) -> Decimal {
    percent / dec!(100)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cents_is_bankers() {
        assert_eq!(round_cents(dec!(83.333)), dec!(83.33));
        assert_eq!(round_cents(dec!(0.125)), dec!(0.12));
        assert_eq!(round_cents(dec!(0.135)), dec!(0.14));
    }

    #[test]
    fn test_round_shares() {
        assert_eq!(round_shares(dec!(2.5)), dec!(2));
        assert_eq!(round_shares(dec!(3.5)), dec!(4));
        assert_eq!(round_shares(dec!(4.2)), dec!(4));
    }

    #[test]
    fn test_shares_affordable() {
        assert_eq!(shares_affordable(dec!(500), dec!(120)), dec!(4));
        assert_eq!(shares_affordable(dec!(500), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_is_flat() {
        assert!(is_flat(Decimal::ZERO));
        assert!(is_flat(dec!(0.0001)));
        assert!(is_flat(dec!(-1)));
        assert!(!is_flat(dec!(0.001)));
    }
}
