use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

use crate::blockchain::{Block, BlockHash, Blockchain};

/// Shared application state: the chain plus mining policy.
pub struct AppState {
    pub blockchain: &'static Mutex<Blockchain>,
    pub mining_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(blockchain: &'static Mutex<Blockchain>, mining_timeout: Option<Duration>) -> Self {
        Self {
            blockchain,
            mining_timeout,
        }
    }
}

/// A block as served over the API, with its derived hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockView {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: Option<BlockHash>,
    pub data: Value,
    pub difficulty: u32,
    pub nonce: u64,
    pub hash: BlockHash,
}

impl From<&Block> for BlockView {
    fn from(b: &Block) -> Self {
        Self {
            index: b.index(),
            timestamp: b.timestamp(),
            previous_hash: b.previous_hash().copied(),
            data: b.data().clone(),
            difficulty: b.difficulty(),
            nonce: b.nonce(),
            hash: b.hash(),
        }
    }
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize, Deserialize)]
pub struct ChainResponse {
    pub length: usize,
    pub difficulty: u32,
    pub chain: Vec<BlockView>,
}

#[derive(Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
}

#[derive(Serialize, Deserialize)]
pub struct DifficultyResponse {
    pub difficulty: u32,
}

#[derive(Serialize, Deserialize)]
pub struct RejectedResponse {
    pub accepted: bool,
    pub reason: String,
}

impl RejectedResponse {
    pub fn new(reason: impl ToString) -> Self {
        Self {
            accepted: false,
            reason: reason.to_string(),
        }
    }
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize)]
pub struct MineRequest {
    pub data: Value,
}

#[derive(Deserialize)]
pub struct CoinbaseRequest {
    pub miner_address: String,
}

#[derive(Serialize, Deserialize)]
pub struct MineResponse {
    pub mined_index: u64,
    pub hash: BlockHash,
    pub nonce: u64,
    pub difficulty: u32,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub height: usize,
    pub difficulty: u32,
    pub target_block_interval_ms: i64,
    pub adjust_interval: u64,
    pub blocks_until_retarget: u64,
    pub last_interval_ms: Option<i64>,
    pub avg_interval_ms: Option<f64>,
}
