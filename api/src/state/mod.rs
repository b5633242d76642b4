mod automation;
mod game;
mod grid;
mod miner;
mod round;

pub use automation::*;
pub use game::*;
pub use grid::*;
pub use miner::*;
pub use round::*;
