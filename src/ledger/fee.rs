//! Fee policy: which configured fees apply to a purchase or recharge, and how much they come to.
//!
//! Fees are charged on top of the face value through the payment processor.
//! They never reduce a card's balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::to_money;
use crate::db::{AddOn, CardDesign, FeeConfiguration, FeeType};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeItem {
    pub fee_type: FeeType,
    pub fee_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub total: Decimal,
    pub items: Vec<FeeItem>,
}

impl FeeBreakdown {
    pub fn none() -> Self {
        Self {
            total: to_money(Decimal::ZERO),
            items: Vec::new(),
        }
    }
}

/// Compute the fees owed for `amount` on a card of `design` with the given add-ons.
///
/// The design selects its tier (`premium` or `standard`); every add-on selects
/// its own fee type. Inactive rows are skipped and a tier with no rows costs nothing.
/// A fee too large to represent is reported as `InvalidAmount`.
pub fn compute_fee(
    design: CardDesign,
    add_ons: &[AddOn],
    amount: Decimal,
    configs: &[FeeConfiguration],
) -> Result<FeeBreakdown> {
    let mut fee_types = vec![design.fee_type()];
    for add_on in add_ons {
        let fee_type = add_on.fee_type();
        if !fee_types.contains(&fee_type) {
            fee_types.push(fee_type);
        }
    }

    let items: Vec<FeeItem> = fee_types
        .iter()
        .flat_map(|fee_type| {
            configs
                .iter()
                .filter(move |config| config.is_active && config.fee_type == *fee_type)
        })
        .map(|config| {
            Ok(FeeItem {
                fee_type: config.fee_type,
                fee_name: config.fee_name.clone(),
                amount: fee_for(config, amount)?,
            })
        })
        .collect::<Result<_>>()?;

    let total = items
        .iter()
        .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.amount))
        .ok_or_else(|| LedgerError::invalid_amount(amount, "fee total is out of range"))?;
    Ok(FeeBreakdown {
        total: to_money(total),
        items,
    })
}

fn fee_for(config: &FeeConfiguration, amount: Decimal) -> Result<Decimal> {
    let mut fee = if config.is_percentage {
        amount
            .checked_mul(config.fee_amount)
            .ok_or_else(|| LedgerError::invalid_amount(amount, "fee is out of range"))?
            / Decimal::ONE_HUNDRED
    } else {
        config.fee_amount
    };
    if let Some(min) = config.min_amount {
        fee = fee.max(min);
    }
    if let Some(max) = config.max_amount {
        fee = fee.min(max);
    }
    Ok(to_money(fee))
}
