use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeeType {
    Standard,
    Premium,
    Animation,
}

impl fmt::Display for FeeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Animation => "animation",
        };
        f.write_str(name)
    }
}

/// Administrator-managed fee row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FeeConfiguration {
    pub id: Uuid,
    pub fee_type: FeeType,
    pub fee_name: String,
    pub fee_amount: Decimal,
    pub is_percentage: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
}

impl FeeConfiguration {
    pub fn fixed(fee_type: FeeType, fee_name: &str, fee_amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            fee_type,
            fee_name: fee_name.to_string(),
            fee_amount,
            is_percentage: false,
            min_amount: None,
            max_amount: None,
            is_active: true,
        }
    }

    pub fn percentage(fee_type: FeeType, fee_name: &str, percent: Decimal) -> Self {
        Self {
            is_percentage: true,
            ..Self::fixed(fee_type, fee_name, percent)
        }
    }
}
