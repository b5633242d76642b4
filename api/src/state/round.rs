use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{amount::Amount, decode, error::MotherlodeError};

/// Authoritative round timing, as returned by `get_round_status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// The round number. Starts at 1 and only increases.
    pub round: u64,

    /// Unix timestamp (seconds) at which the round opened.
    pub round_start: u64,

    /// Unix timestamp (seconds) at which the round closes.
    pub round_end: u64,

    /// Seconds left in the round as computed by the contract at read time.
    pub reported_remaining: u64,

    /// Whether the contract considers the round over.
    pub ended: bool,
}

impl RoundSnapshot {
    /// Used when no authoritative read has succeeded yet: round 1, already ended.
    pub const FALLBACK: RoundSnapshot = RoundSnapshot {
        round: 1,
        round_start: 0,
        round_end: 0,
        reported_remaining: 0,
        ended: true,
    };

    /// Decodes `[round, round_start, round_end, remaining_seconds, is_ended]`.
    ///
    /// A running round with zero seconds left is reported as ended.
    pub fn from_view(values: &[Value]) -> Result<Self, MotherlodeError> {
        decode::expect_len(values, 5, "get_round_status")?;
        let round = decode::u64_at(values, 0, "round")?;
        let round_start = decode::u64_at(values, 1, "round_start")?;
        let round_end = decode::u64_at(values, 2, "round_end")?;
        let reported_remaining = decode::u64_at(values, 3, "remaining_seconds")?;
        let ended = decode::bool_at(values, 4, "is_ended")?;

        if round == 0 {
            return Err(MotherlodeError::InvariantViolated {
                what: "get_round_status",
                reason: "round 0 reported".to_string(),
            });
        }
        if round_end < round_start {
            return Err(MotherlodeError::InvariantViolated {
                what: "get_round_status",
                reason: format!("round_end {round_end} precedes round_start {round_start}"),
            });
        }

        Ok(Self {
            round,
            round_start,
            round_end,
            reported_remaining,
            ended: ended || reported_remaining == 0,
        })
    }

    /// The contract's clock at read time, in unix seconds.
    pub fn authoritative_time(&self) -> f64 {
        self.round_end as f64 - self.reported_remaining as f64
    }

    pub fn duration(&self) -> u64 {
        self.round_end - self.round_start
    }
}

/// Settlement of a finished round, from `get_round_result(_by_number)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub total_deployed: Amount,
    pub vaulted: Amount,
    pub winnings: Amount,
    pub motherlode_contribution: Amount,
    pub was_motherlode_round: bool,
    pub motherlode_payout: Amount,
}

impl RoundResult {
    pub fn from_view(values: &[Value]) -> Result<Self, MotherlodeError> {
        decode::expect_len(values, 6, "get_round_result")?;
        Ok(Self {
            total_deployed: decode::amount_at(values, 0, "total_deployed")?,
            vaulted: decode::amount_at(values, 1, "vaulted")?,
            winnings: decode::amount_at(values, 2, "winnings")?,
            motherlode_contribution: decode::amount_at(values, 3, "motherlode_contribution")?,
            was_motherlode_round: decode::bool_at(values, 4, "was_motherlode_round")?,
            motherlode_payout: decode::amount_at(values, 5, "motherlode_payout")?,
        })
    }
}
