/// Number of decimals used by both the native coin and the MORE token.
pub const DECIMALS: u32 = 8;

/// Scale factor between a display amount and its on-chain base units (10^8).
pub const BASE_UNITS_PER_TOKEN: u64 = 100_000_000;

/// Minimum amount per block accepted by `deploy` (1 token).
pub const MIN_DEPLOYMENT: u64 = 100_000_000;

/// Minimum stake accepted by `enable_automation` (10 tokens).
pub const MIN_AUTOMATION_STAKE: u64 = 1_000_000_000;

/// Grid side length.
pub const GRID_SIDE: usize = 5;

/// Number of blocks on the board (5x5).
pub const GRID_SIZE: usize = GRID_SIDE * GRID_SIDE;

/// Resource type holding the native coin balance of an account.
pub const NATIVE_COIN_STORE: &str = "0x1::coin::CoinStore<0x1::aptos_coin::AptosCoin>";

/// Contract deployed on Movement Bardock testnet.
pub const TESTNET_CONTRACT: &str =
    "0x41f50ee5eafbf2d4ac7ebf2df582c8aeb5e5a6070bee6cd55b0c09dac189e8d6";

// Module names (v3).
pub const MORE_TOKEN_MODULE: &str = "more_token_v3";
pub const GAME_STATE_MODULE: &str = "game_state_v3";
pub const MOTHERLODE_MODULE: &str = "motherlode_v3";
pub const AUTOMATION_MODULE: &str = "automation_v3";
