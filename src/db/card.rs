use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::LedgerError;

use super::fee::FeeType;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GiftCard {
    pub id: Uuid,
    pub code: String,
    pub initial_amount: Decimal,
    pub balance: Decimal,
    pub design: CardDesign,
    pub is_active: bool,
    #[sqlx(flatten)]
    pub metadata: CardMetadata,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl GiftCard {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Active and not past its expiry; the only state that accepts balance operations.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    pub fn status(&self, now: DateTime<Utc>) -> CardStatus {
        if !self.is_usable(now) {
            CardStatus::Inactive
        } else if self.balance.is_zero() {
            CardStatus::Depleted
        } else {
            CardStatus::Active
        }
    }
}

/// Issuance-time data, never changed after the card is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CardMetadata {
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    pub custom_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Depleted,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CardDesign {
    Classic,
    Love,
    Birthday,
    Holiday,
    Premium,
}

impl CardDesign {
    pub const ALL: [CardDesign; 5] = [
        Self::Classic,
        Self::Love,
        Self::Birthday,
        Self::Holiday,
        Self::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Love => "love",
            Self::Birthday => "birthday",
            Self::Holiday => "holiday",
            Self::Premium => "premium",
        }
    }

    /// The fee tier this design is charged under.
    pub fn fee_type(&self) -> FeeType {
        match self {
            Self::Premium => FeeType::Premium,
            _ => FeeType::Standard,
        }
    }
}

impl fmt::Display for CardDesign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardDesign {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|design| design.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| LedgerError::UnknownDesign(s.to_string()))
    }
}

/// Optional extras purchased with a card; each is billed under its own fee type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOn {
    Animation,
}

impl AddOn {
    pub fn fee_type(&self) -> FeeType {
        match self {
            Self::Animation => FeeType::Animation,
        }
    }
}

impl FromStr for AddOn {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "animation" => Ok(Self::Animation),
            _ => Err(LedgerError::UnknownDesign(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::*;

    fn card(balance: Decimal) -> GiftCard {
        GiftCard {
            id: Uuid::new_v4(),
            code: "GC-AAAA-BBBB-CCCC-DDDD".to_string(),
            initial_amount: dec!(50.00),
            balance,
            design: CardDesign::Classic,
            is_active: true,
            metadata: CardMetadata::default(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn design_parses_case_insensitively() {
        assert_eq!("Premium".parse::<CardDesign>().ok(), Some(CardDesign::Premium));
        assert!(matches!(
            "neon".parse::<CardDesign>(),
            Err(LedgerError::UnknownDesign(_))
        ));
    }

    #[test]
    fn only_premium_uses_premium_fees() {
        assert_eq!(CardDesign::Premium.fee_type(), FeeType::Premium);
        assert_eq!(CardDesign::Love.fee_type(), FeeType::Standard);
    }

    #[test]
    fn status_follows_balance_and_activity() {
        let now = Utc::now();
        assert_eq!(card(dec!(10)).status(now), CardStatus::Active);
        assert_eq!(card(Decimal::ZERO).status(now), CardStatus::Depleted);

        let mut expired = card(dec!(10));
        expired.expires_at = Some(now - Duration::days(1));
        assert_eq!(expired.status(now), CardStatus::Inactive);

        let mut disabled = card(dec!(10));
        disabled.is_active = false;
        assert_eq!(disabled.status(now), CardStatus::Inactive);
    }
}
