//! Fixed-point money arithmetic.
//!
//! Every operation rounds to two decimal places with half-up rounding so a
//! chain of calculators accumulates exactly the same cents as a single pass
//! over decimal strings would.

use rust_decimal::{Decimal, RoundingStrategy};

pub const MONEY_SCALE: u32 = 2;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn money_add(left: Decimal, right: Decimal) -> Decimal {
    round_money(round_money(left) + round_money(right))
}

pub fn money_sub(left: Decimal, right: Decimal) -> Decimal {
    round_money(round_money(left) - round_money(right))
}

pub fn money_mul(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(round_money(unit_price) * Decimal::from(quantity))
}

pub fn clamp_non_negative(value: Decimal) -> Decimal {
    if value.is_sign_negative() {
        Decimal::ZERO
    } else {
        round_money(value)
    }
}

/// Sum of money values, rounding after every addition.
pub fn money_sum<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().fold(Decimal::ZERO, money_add)
}
