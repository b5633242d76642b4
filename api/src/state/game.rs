use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{amount::Amount, decode, error::MotherlodeError};

/// Global game state, from `get_game_state`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub round: u64,
    pub total_deployed: Amount,
    pub motherlode: Amount,
    pub is_active: bool,
}

impl GameState {
    pub fn from_view(values: &[Value]) -> Result<Self, MotherlodeError> {
        decode::expect_len(values, 4, "get_game_state")?;
        Ok(Self {
            round: decode::u64_at(values, 0, "round")?,
            total_deployed: decode::amount_at(values, 1, "total_deployed")?,
            motherlode: decode::amount_at(values, 2, "motherlode")?,
            is_active: decode::bool_at(values, 3, "is_active")?,
        })
    }
}

/// Accumulated protocol fees, from `get_protocol_fees`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolFees {
    pub native: Amount,
    pub more: Amount,
}

impl ProtocolFees {
    pub fn from_view(values: &[Value]) -> Result<Self, MotherlodeError> {
        decode::expect_len(values, 2, "get_protocol_fees")?;
        Ok(Self {
            native: decode::amount_at(values, 0, "protocol_fees_native")?,
            more: decode::amount_at(values, 1, "protocol_fees_more")?,
        })
    }
}

/// Decodes single-value views such as `get_motherlode_pool`.
///
/// An empty result is zero.
pub fn single_amount(values: &[Value], field: &'static str) -> Result<Amount, MotherlodeError> {
    if values.is_empty() {
        return Ok(Amount::ZERO);
    }
    decode::amount_at(values, 0, field)
}

pub fn single_u64(values: &[Value], field: &'static str) -> Result<u64, MotherlodeError> {
    if values.is_empty() {
        return Ok(0);
    }
    decode::u64_at(values, 0, field)
}
