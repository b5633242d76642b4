use std::{fmt, str::FromStr};

use crate::{consts::GRID_SIZE, error::MotherlodeError};

/// A block as numbered on screen, 1 through 25.
///
/// The contract indexes blocks 0..=24. [`BlockNumber::contract_index`] is
/// only called by the payload builders in [`crate::sdk`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockNumber(pub(crate) u8);

impl BlockNumber {
    pub fn new(number: u64) -> Result<Self, MotherlodeError> {
        if number == 0 || number > GRID_SIZE as u64 {
            return Err(MotherlodeError::InvalidBlock(number));
        }
        Ok(Self(number as u8))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    pub(crate) fn contract_index(&self) -> u8 {
        self.0 - 1
    }
}

impl FromStr for BlockNumber {
    type Err = MotherlodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u64 = s
            .trim()
            .parse()
            .map_err(|_| MotherlodeError::InvalidBlock(0))?;
        Self::new(n)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parses a comma separated block list such as `"1,5,9"`.
pub fn parse_block_list(s: &str) -> Result<Vec<BlockNumber>, MotherlodeError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(BlockNumber::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_bounds() {
        assert!(BlockNumber::new(0).is_err());
        assert!(BlockNumber::new(26).is_err());
        assert_eq!(BlockNumber::new(1).unwrap().contract_index(), 0);
        assert_eq!(BlockNumber::new(25).unwrap().contract_index(), 24);
        assert_eq!("5".parse::<BlockNumber>().unwrap().to_string(), "#5");
    }

    #[test]
    fn test_parse_block_list() {
        let blocks = parse_block_list("1, 5,9,").unwrap();
        assert_eq!(blocks.iter().map(|b| b.get()).collect::<Vec<_>>(), vec![1, 5, 9]);
        assert!(parse_block_list("1,30").is_err());
        assert!(parse_block_list("").unwrap().is_empty());
    }
}
