use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{LedgerError, Result};

pub const MONEY_SCALE: u32 = 2;

/// Accept a positive amount with at most two fraction digits and return it at scale 2.
pub fn parse_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount, "amount must be positive"));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::invalid_amount(
            amount,
            "amount may have at most two fraction digits",
        ));
    }
    Ok(to_money(amount))
}

/// Round half away from zero to cents and pin the scale so it serializes as `12.30`.
pub fn to_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn pins_two_fraction_digits() {
        assert_eq!(parse_amount(dec!(50)).map(|d| d.to_string()).ok(), Some("50.00".to_string()));
        assert_eq!(parse_amount(dec!(12.300)).map(|d| d.to_string()).ok(), Some("12.30".to_string()));
    }

    #[test]
    fn rejects_sub_cent_and_non_positive() {
        assert!(parse_amount(dec!(1.005)).is_err());
        assert!(parse_amount(Decimal::ZERO).is_err());
        assert!(parse_amount(dec!(-3.00)).is_err());
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(to_money(dec!(0.125)), dec!(0.13));
        assert_eq!(to_money(dec!(0.124)), dec!(0.12));
    }
}
