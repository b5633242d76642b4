use std::{fmt, str::FromStr};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{amount::Amount, decode, error::MotherlodeError};

/// How the keeper picks blocks on the user's behalf.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[derive(Serialize, Deserialize)]
pub enum Strategy {
    Random = 0,
    AllBlocks = 1,
    Custom = 2,
}

impl FromStr for Strategy {
    type Err = MotherlodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Strategy::Random),
            "all" | "all_blocks" => Ok(Strategy::AllBlocks),
            "custom" => Ok(Strategy::Custom),
            other => Err(MotherlodeError::InvalidStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Random => "random",
            Strategy::AllBlocks => "all",
            Strategy::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A user's automation record, from `get_automation_config` merged with
/// `estimate_rounds_remaining`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub active: bool,
    pub staked_balance: Amount,
    pub amount_per_block: Amount,
    pub strategy: Strategy,
    pub last_deployed_round: u64,
    pub total_deployments: u64,
    pub estimated_rounds_remaining: u64,
}

impl AutomationConfig {
    /// Decodes `[is_active, staked_balance, amount_per_block, strategy,
    /// last_deployed_round, total_deployments]`. An empty result means the
    /// user has no record.
    pub fn from_view(values: &[Value]) -> Result<Option<Self>, MotherlodeError> {
        if values.is_empty() {
            return Ok(None);
        }
        decode::expect_len(values, 6, "get_automation_config")?;
        let raw_strategy = decode::u64_at(values, 3, "strategy")?;
        let strategy = u8::try_from(raw_strategy)
            .ok()
            .and_then(|s| Strategy::try_from(s).ok())
            .ok_or_else(|| MotherlodeError::InvalidStrategy(raw_strategy.to_string()))?;
        Ok(Some(Self {
            active: decode::bool_at(values, 0, "is_active")?,
            staked_balance: decode::amount_at(values, 1, "staked_balance")?,
            amount_per_block: decode::amount_at(values, 2, "amount_per_block")?,
            strategy,
            last_deployed_round: decode::u64_at(values, 4, "last_deployed_round")?,
            total_deployments: decode::u64_at(values, 5, "total_deployments")?,
            estimated_rounds_remaining: 0,
        }))
    }

    pub fn with_estimate(mut self, rounds: u64) -> Self {
        self.estimated_rounds_remaining = rounds;
        self
    }
}
