//! Database models
//!
//! Enum columns are stored as their lowercase symbol (`as_str`), identifiers as
//! hyphenated UUID text, timestamps as RFC 3339 text.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One of the two complementary sides within a shape family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Half {
    A,
    B,
}

impl Half {
    pub fn as_str(&self) -> &'static str {
        match self {
            Half::A => "A",
            Half::B => "B",
        }
    }
}

/// Ordered quality tier: common < uncommon < rare < epic < legendary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }

    /// Fixed score weight contributed by one fused piece of this rarity
    pub fn score(&self) -> i64 {
        match self {
            Rarity::Common => 10,
            Rarity::Uncommon => 25,
            Rarity::Rare => 50,
            Rarity::Epic => 100,
            Rarity::Legendary => 250,
        }
    }
}

/// How an entry entered the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    #[default]
    Drop,
    Reward,
    Grant,
    Admin,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Drop => "drop",
            Provenance::Reward => "reward",
            Provenance::Grant => "grant",
            Provenance::Admin => "admin",
        }
    }
}

/// Reward lifecycle: pending -> claimed -> consumed, never backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardStatus {
    Pending,
    Claimed,
    Consumed,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardStatus::Pending => "pending",
            RewardStatus::Claimed => "claimed",
            RewardStatus::Consumed => "consumed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Points,
    Coins,
    Cosmetic,
    Lootbox,
    EventTrigger,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Points => "points",
            RewardType::Coins => "coins",
            RewardType::Cosmetic => "cosmetic",
            RewardType::Lootbox => "lootbox",
            RewardType::EventTrigger => "event_trigger",
        }
    }
}

macro_rules! symbol_enum_parse {
    ($ty:ty, $label:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| Error::InvalidInput(format!("unknown {}: {}", $label, s)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

symbol_enum_parse!(Half, "half", [Half::A, Half::B]);
symbol_enum_parse!(
    Rarity,
    "rarity",
    [Rarity::Common, Rarity::Uncommon, Rarity::Rare, Rarity::Epic, Rarity::Legendary]
);
symbol_enum_parse!(
    Provenance,
    "provenance",
    [Provenance::Drop, Provenance::Reward, Provenance::Grant, Provenance::Admin]
);
symbol_enum_parse!(
    RewardStatus,
    "reward status",
    [RewardStatus::Pending, RewardStatus::Claimed, RewardStatus::Consumed]
);
symbol_enum_parse!(
    RewardType,
    "reward type",
    [
        RewardType::Points,
        RewardType::Coins,
        RewardType::Cosmetic,
        RewardType::Lootbox,
        RewardType::EventTrigger,
    ]
);

/// Reward payload, keyed by reward type
///
/// Each variant carries only the fields its type needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reward_type", rename_all = "snake_case")]
pub enum RewardValue {
    Points { amount: i64 },
    Coins { amount: i64, description: String },
    Cosmetic { item: String },
    Lootbox { tier: String },
    EventTrigger { event: String },
}

impl RewardValue {
    pub fn reward_type(&self) -> RewardType {
        match self {
            RewardValue::Points { .. } => RewardType::Points,
            RewardValue::Coins { .. } => RewardType::Coins,
            RewardValue::Cosmetic { .. } => RewardType::Cosmetic,
            RewardValue::Lootbox { .. } => RewardType::Lootbox,
            RewardValue::EventTrigger { .. } => RewardType::EventTrigger,
        }
    }

    /// Numeric amount for currency-like rewards
    pub fn amount(&self) -> Option<i64> {
        match self {
            RewardValue::Points { amount } | RewardValue::Coins { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

/// Catalog piece definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: Uuid,
    pub shape_family: String,
    pub half: Half,
    pub rarity: Rarity,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Piece {
    /// Same shape family, opposite halves
    pub fn is_complementary(&self, other: &Piece) -> bool {
        self.shape_family == other.shape_family && self.half != other.half
    }

    pub fn snapshot(&self) -> PieceSnapshot {
        PieceSnapshot {
            name: self.name.clone(),
            shape_family: self.shape_family.clone(),
            half: self.half,
            rarity: self.rarity,
        }
    }
}

/// Display attributes of a catalog piece, copied at read time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceSnapshot {
    pub name: String,
    pub shape_family: String,
    pub half: Half,
    pub rarity: Rarity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-owner capacity ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub capacity: i64,
    pub current_usage: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWithInventory {
    #[serde(flatten)]
    pub user: User,
    pub inventory: Inventory,
}

/// An owned instance of a catalog piece occupying one inventory slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub piece_id: Uuid,
    pub provenance: Provenance,
    pub is_locked: bool,
    pub serial_number: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntryWithPiece {
    #[serde(flatten)]
    pub entry: InventoryEntry,
    pub piece: PieceSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryWithEntries {
    #[serde(flatten)]
    pub inventory: Inventory,
    pub entries: Vec<InventoryEntryWithPiece>,
}

/// Permanent audit row written for every fusion attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub input_entry_1_id: Uuid,
    pub input_entry_2_id: Uuid,
    pub input_piece_1_id: Uuid,
    pub input_piece_2_id: Uuid,
    pub shape_family: String,
    pub is_success: bool,
    pub score_value: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionWithPieces {
    #[serde(flatten)]
    pub fusion: FusionRecord,
    pub input_piece_1: PieceSnapshot,
    pub input_piece_2: PieceSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub fusion_id: Uuid,
    pub user_id: Uuid,
    pub reward_value: RewardValue,
    pub status: RewardStatus,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reward {
    pub fn reward_type(&self) -> RewardType {
        self.reward_value.reward_type()
    }
}

/// Reward joined with the fusion that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardWithFusion {
    #[serde(flatten)]
    pub reward: Reward,
    pub shape_family: String,
    pub score_value: i64,
    pub fusion_created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_ordering() {
        assert!(Rarity::Common < Rarity::Uncommon);
        assert!(Rarity::Epic < Rarity::Legendary);
        assert_eq!(Rarity::ALL.iter().max(), Some(&Rarity::Legendary));
    }

    #[test]
    fn test_rarity_score_table() {
        let scores: Vec<i64> = Rarity::ALL.iter().map(Rarity::score).collect();
        assert_eq!(scores, vec![10, 25, 50, 100, 250]);
    }

    #[test]
    fn test_symbol_parsing() {
        assert_eq!("B".parse::<Half>().unwrap(), Half::B);
        assert_eq!("epic".parse::<Rarity>().unwrap(), Rarity::Epic);
        assert_eq!("event_trigger".parse::<RewardType>().unwrap(), RewardType::EventTrigger);
        assert!(matches!("mythic".parse::<Rarity>(), Err(Error::InvalidInput(_))));
        assert!("a".parse::<Half>().is_err());
    }

    #[test]
    fn test_reward_value_is_tagged_by_type() {
        let value = RewardValue::Coins {
            amount: 1000,
            description: "Legendary fusion bonus".to_string(),
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["reward_type"], "coins");
        assert_eq!(json["amount"], 1000);
        assert_eq!(value.reward_type(), RewardType::Coins);
        assert_eq!(value.amount(), Some(1000));

        let parsed: RewardValue =
            serde_json::from_str(r#"{"reward_type":"cosmetic","item":"golden-frame"}"#).unwrap();
        assert_eq!(parsed.reward_type(), RewardType::Cosmetic);
        assert_eq!(parsed.amount(), None);
    }

    #[test]
    fn test_complementary_pieces() {
        let base = Piece {
            id: Uuid::new_v4(),
            shape_family: "star".to_string(),
            half: Half::A,
            rarity: Rarity::Common,
            name: "Star A".to_string(),
            description: None,
            tags: vec![],
            is_active: true,
            created_at: Utc::now(),
        };
        let other_half = Piece {
            id: Uuid::new_v4(),
            half: Half::B,
            ..base.clone()
        };
        let other_family = Piece {
            id: Uuid::new_v4(),
            shape_family: "heart".to_string(),
            half: Half::B,
            ..base.clone()
        };

        assert!(base.is_complementary(&other_half));
        assert!(!base.is_complementary(&base));
        assert!(!base.is_complementary(&other_family));
    }
}
