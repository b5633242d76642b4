use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{amount::Amount, decode, error::MotherlodeError};

/// Lifetime statistics of a miner, from `get_miner_state`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerStats {
    /// Native coin deployed across all rounds.
    pub total_deployed: Amount,

    /// MORE earned across all rounds.
    pub reward_earned: Amount,

    /// Rounds in which the miner held a winning block.
    pub rounds_won: u64,

    /// Number of block deployments made.
    pub blocks_deployed_count: u64,
}

impl MinerStats {
    pub fn from_view(values: &[Value]) -> Result<Self, MotherlodeError> {
        decode::expect_len(values, 4, "get_miner_state")?;
        Ok(Self {
            total_deployed: decode::amount_at(values, 0, "total_deployed")?,
            reward_earned: decode::amount_at(values, 1, "reward_earned")?,
            rounds_won: decode::u64_at(values, 2, "rounds_won")?,
            blocks_deployed_count: decode::u64_at(values, 3, "blocks_deployed_count")?,
        })
    }
}
