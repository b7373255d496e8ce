pub mod block;
pub mod clock;
pub mod difficulty;
pub mod error;
pub mod model;
pub mod pow;

pub use block::{Block, BlockHash};
pub use clock::{Clock, SystemClock};
pub use error::{ChainError, MineError, ValidationError};
pub use model::{Blockchain, instance};
pub use pow::{BlockTemplate, CancelGuard, CancelToken};

/// Genesis timestamp: 2017-06-20T10:09:00Z in milliseconds.
pub const GENESIS_TIMESTAMP_MS: i64 = 1_497_953_340_000;

pub const GENESIS_DATA: &str = "NiceCoin Genesis Block";

/// Difficulty of the genesis block (leading zero bits).
pub const GENESIS_DIFFICULTY: u32 = 5;

/// Target milliseconds per block for retargeting
pub const BLOCK_GENERATION_INTERVAL_MS: i64 = 10_000;

/// Blocks between difficulty re-evaluations
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// How far a block timestamp may drift behind its parent or ahead of our clock.
pub const TIMESTAMP_TOLERANCE_MS: i64 = 60_000;
