use thiserror::Error;

/// Reasons a candidate block is refused by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    #[error("index mismatch: expected {expected}, found {found}")]
    IndexMismatch { expected: u64, found: u64 },

    #[error("invalid timestamp {timestamp} (previous {previous}, now {now})")]
    InvalidTimestamp {
        timestamp: i64,
        previous: i64,
        now: i64,
    },

    #[error("previous hash does not match the current tip")]
    HashMismatch,

    #[error("wrong difficulty: expected {expected}, found {found}")]
    WrongDifficulty { expected: u32, found: u32 },

    #[error("insufficient work: hash has {leading_zeros} leading zero bits, difficulty is {difficulty}")]
    InsufficientWork { difficulty: u32, leading_zeros: u32 },
}

/// Outcome of a failed mining attempt. The chain is untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    /// The search converged but the candidate failed validation
    /// (the tip moved underneath the search, or a bug).
    #[error("mined block rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("proof-of-work search abandoned")]
    SearchAbandoned,
}

/// Errors while rebuilding a chain from a list of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain has no blocks")]
    Empty,

    #[error("first block is not the genesis block")]
    InvalidGenesis,

    #[error("block #{index} is invalid: {source}")]
    Block {
        index: u64,
        #[source]
        source: ValidationError,
    },
}
