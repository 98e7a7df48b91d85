//! Pure fusion rules: compatibility, score and reward tier

use kinstone_common::db::{Piece, Rarity, RewardValue};

/// Result of evaluating two pieces against each other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub is_success: bool,
    pub score_value: i64,
    pub reward: Option<RewardValue>,
}

/// Compatible pairs score the sum of both rarity weights and may earn a
/// reward; incompatible pairs score zero and never do.
pub fn evaluate(first: &Piece, second: &Piece) -> Evaluation {
    if !first.is_complementary(second) {
        return Evaluation {
            is_success: false,
            score_value: 0,
            reward: None,
        };
    }

    Evaluation {
        is_success: true,
        score_value: first.rarity.score() + second.rarity.score(),
        reward: reward_for(first.rarity, second.rarity),
    }
}

/// Reward earned by a successful fusion, decided by the higher rarity
///
/// Legendary outranks epic, so a legendary + epic pair earns the legendary bonus.
pub fn reward_for(first: Rarity, second: Rarity) -> Option<RewardValue> {
    match first.max(second) {
        Rarity::Legendary => Some(RewardValue::Coins {
            amount: 1000,
            description: "Legendary fusion bonus".to_string(),
        }),
        Rarity::Epic => Some(RewardValue::Coins {
            amount: 500,
            description: "Epic fusion bonus".to_string(),
        }),
        Rarity::Common | Rarity::Uncommon | Rarity::Rare => None,
    }
}
