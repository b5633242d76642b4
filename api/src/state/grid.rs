use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    amount::Amount,
    block::BlockNumber,
    consts::GRID_SIZE,
    decode,
    error::MotherlodeError,
};

/// One block of the board, from `get_block`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    /// Contract index, 0..=24.
    pub index: u8,

    /// Native coin deployed on this block in the current round.
    pub total_deployed: Amount,

    /// Number of miners on this block.
    pub participant_count: u64,

    /// Set once the round settles and this block won.
    pub is_winning: bool,
}

impl GridCell {
    pub fn zeroed(index: u8) -> Self {
        Self {
            index,
            total_deployed: Amount::ZERO,
            participant_count: 0,
            is_winning: false,
        }
    }

    /// Decodes `[deployed_amount, miner_count, is_winning]`.
    pub fn from_view(index: u8, values: &[Value]) -> Result<Self, MotherlodeError> {
        decode::expect_len(values, 3, "get_block")?;
        Ok(Self {
            index,
            total_deployed: decode::amount_at(values, 0, "deployed_amount")?,
            participant_count: decode::u64_at(values, 1, "miner_count")?,
            is_winning: decode::bool_at(values, 2, "is_winning")?,
        })
    }

    pub fn is_zeroed(&self) -> bool {
        self.total_deployed.is_zero() && self.participant_count == 0 && !self.is_winning
    }

    pub fn block_number(&self) -> BlockNumber {
        BlockNumber(self.index.min(GRID_SIZE as u8 - 1) + 1)
    }
}

/// The full 5x5 board. Always holds exactly 25 cells, cell `i` at index `i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridCells")]
pub struct Grid {
    cells: Vec<GridCell>,
}

#[derive(Deserialize)]
struct GridCells {
    cells: Vec<GridCell>,
}

impl TryFrom<GridCells> for Grid {
    type Error = MotherlodeError;

    fn try_from(raw: GridCells) -> Result<Self, Self::Error> {
        if raw.cells.len() != GRID_SIZE {
            return Err(MotherlodeError::InvariantViolated {
                what: "grid",
                reason: format!("expected {GRID_SIZE} cells, got {}", raw.cells.len()),
            });
        }
        if let Some((i, cell)) = raw
            .cells
            .iter()
            .enumerate()
            .find(|(i, cell)| cell.index as usize != *i)
        {
            return Err(MotherlodeError::InvariantViolated {
                what: "grid",
                reason: format!("cell {i} has index {}", cell.index),
            });
        }
        Ok(Self { cells: raw.cells })
    }
}

impl Grid {
    pub fn zeroed() -> Self {
        Self {
            cells: (0..GRID_SIZE as u8).map(GridCell::zeroed).collect(),
        }
    }

    /// Builds a board from one entry per index. Missing cells are zeroed and
    /// out-of-range indices ignored.
    pub fn from_cells(cells: impl IntoIterator<Item = GridCell>) -> Self {
        let mut grid = Self::zeroed();
        for cell in cells {
            if let Some(slot) = grid.cells.get_mut(cell.index as usize) {
                *slot = cell;
            }
        }
        grid
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cell(&self, block: BlockNumber) -> &GridCell {
        &self.cells[block.get() as usize - 1]
    }

    pub fn total_deployed(&self) -> Amount {
        Amount::from_base_units(self.cells.iter().map(|c| c.total_deployed.base_units()).sum())
    }

    pub fn winning_blocks(&self) -> Vec<BlockNumber> {
        self.cells
            .iter()
            .filter(|c| c.is_winning)
            .map(GridCell::block_number)
            .collect()
    }

    pub fn is_zeroed(&self) -> bool {
        self.cells.iter().all(GridCell::is_zeroed)
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_cell() {
        let cell = GridCell::from_view(4, &[json!("250000000"), json!("3"), json!(true)]).unwrap();
        assert_eq!(cell.block_number().get(), 5);
        assert_eq!(cell.total_deployed.to_string(), "2.5");
        assert_eq!(cell.participant_count, 3);
        assert!(cell.is_winning);
    }

    #[test]
    fn test_grid_from_partial_cells() {
        let mut cell = GridCell::zeroed(2);
        cell.participant_count = 1;
        cell.total_deployed = Amount::from_base_units(100);
        let grid = Grid::from_cells([cell, GridCell::zeroed(99)]);
        assert_eq!(grid.cells().len(), GRID_SIZE);
        assert_eq!(grid.total_deployed().base_units(), 100);
        assert_eq!(grid.cell(BlockNumber::new(3).unwrap()).participant_count, 1);
        assert!(!grid.is_zeroed());
        assert!(grid.winning_blocks().is_empty());
        assert!(Grid::zeroed().is_zeroed());
    }

    #[test]
    fn test_deserialize_keeps_full_board() {
        let mut grid = Grid::zeroed();
        grid.cells[7].participant_count = 2;
        let text = serde_json::to_string(&grid).unwrap();
        let back: Grid = serde_json::from_str(&text).unwrap();
        assert_eq!(back.cell(BlockNumber::new(8).unwrap()).participant_count, 2);

        assert!(serde_json::from_str::<Grid>(r#"{"cells":[]}"#).is_err());

        let mut cells = Grid::zeroed().cells;
        cells.swap(0, 1);
        let shuffled = json!({ "cells": cells });
        assert!(serde_json::from_value::<Grid>(shuffled).is_err());
    }
}
