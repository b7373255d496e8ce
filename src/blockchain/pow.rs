use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde_json::Value;

use super::block::{Block, BlockHash};
use super::error::MineError;

/// Everything a nonce search needs, captured from the chain tip.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: i64,
    pub previous_hash: BlockHash,
    pub data: Value,
    pub difficulty: u32,
}

impl BlockTemplate {
    fn with_nonce(&self, nonce: u64) -> Block {
        Block::new(
            self.index,
            self.timestamp,
            Some(self.previous_hash),
            self.data.clone(),
            self.difficulty,
            nonce,
        )
    }
}

/// Cooperative cancellation flag for a running search. Clones share the flag;
/// once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Cancel this token when the returned guard is dropped, unless it was
    /// disarmed first.
    pub fn drop_guard(&self) -> CancelGuard {
        CancelGuard(Some(self.clone()))
    }
}

/// Cancels its token on drop. Holding one ties a search to the lifetime of
/// whoever waits for it.
#[derive(Debug)]
pub struct CancelGuard(Option<CancelToken>);

impl CancelGuard {
    /// Let the token outlive the guard untouched.
    pub fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(token) = self.0.take() {
            token.cancel();
        }
    }
}

/// True iff the first `difficulty` bits of `hash` are all zero.
pub fn hash_matches_difficulty(hash: &BlockHash, difficulty: u32) -> bool {
    hash.leading_zero_bits() >= difficulty
}

/// Try nonces 0, 1, 2, ... until the block hash meets the template's
/// difficulty. Unbounded; only `cancel` stops it early.
pub fn search(template: &BlockTemplate, cancel: &CancelToken) -> Result<Block, MineError> {
    let mut nonce: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            debug!(
                "POW - search for block #{} abandoned after {} attempts",
                template.index, nonce
            );
            return Err(MineError::SearchAbandoned);
        }
        let block = template.with_nonce(nonce);
        let hash = block.hash();
        if hash_matches_difficulty(&hash, template.difficulty) {
            debug!(
                "POW - block #{} solved at nonce {} (diff={}): {}",
                template.index,
                nonce,
                template.difficulty,
                hash.to_bit_string()
            );
            return Ok(block);
        }
        nonce += 1;
    }
}
