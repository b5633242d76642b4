use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    consts::{BASE_UNITS_PER_TOKEN, DECIMALS},
    error::MotherlodeError,
};

/// A token amount held as integer base units (scale 10^8).
///
/// This is the only place decimal display amounts and base units are
/// converted. Parsing is exact: `"2.5"` is `250_000_000` base units, and
/// anything with more than eight fractional digits is rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(base_units: u64) -> Self {
        Self(base_units)
    }

    pub const fn base_units(&self) -> u64 {
        self.0
    }

    /// Whole tokens, e.g. `Amount::from_tokens(10)` is 10 * 10^8 base units.
    pub fn from_tokens(tokens: u64) -> Option<Self> {
        tokens.checked_mul(BASE_UNITS_PER_TOKEN).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }
}

impl FromStr for Amount {
    type Err = MotherlodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || MotherlodeError::InvalidAmount(s.to_string());

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if fraction.len() > DECIMALS as usize {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: u64 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = DECIMALS as usize);
            padded.parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(BASE_UNITS_PER_TOKEN)
            .and_then(|w| w.checked_add(fraction))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / BASE_UNITS_PER_TOKEN;
        let fraction = self.0 % BASE_UNITS_PER_TOKEN;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{fraction:0>width$}", width = DECIMALS as usize);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

// Base units travel as decimal strings, matching how the node encodes u64.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        crate::decode::as_u64(&value, "amount")
            .map(Amount)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_display_amounts() {
        assert_eq!("2.5".parse::<Amount>().unwrap().base_units(), 250_000_000);
        assert_eq!("1".parse::<Amount>().unwrap().base_units(), 100_000_000);
        assert_eq!(".5".parse::<Amount>().unwrap().base_units(), 50_000_000);
        assert_eq!("0.00000001".parse::<Amount>().unwrap().base_units(), 1);
        assert_eq!(Amount::from_base_units(250_000_000).to_string(), "2.5");
        assert_eq!(Amount::from_base_units(1).to_string(), "0.00000001");
        assert_eq!(Amount::ZERO.to_string(), "0");
    }

    #[test]
    fn test_rejects_bad_amounts() {
        for bad in ["", ".", "-1", "1.2.3", "abc", "0.000000001", "1e8", "184467440737.1"] {
            assert!(bad.parse::<Amount>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let amount = Amount::from_base_units(42);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"42\"");
        assert_eq!(serde_json::from_str::<Amount>("\"42\"").unwrap(), amount);
        assert_eq!(serde_json::from_str::<Amount>("42").unwrap(), amount);
    }

    proptest! {
        #[test]
        fn test_base_unit_round_trip(
            whole in 0u64..10_000_000_000,
            fraction in 0u64..BASE_UNITS_PER_TOKEN,
        ) {
            let text = if fraction == 0 {
                whole.to_string()
            } else {
                let digits = format!("{fraction:08}");
                format!("{whole}.{}", digits.trim_end_matches('0'))
            };
            let amount: Amount = text.parse().unwrap();
            prop_assert_eq!(amount.base_units(), whole * BASE_UNITS_PER_TOKEN + fraction);
            prop_assert_eq!(amount.to_string(), text);
        }
    }
}
