use log::debug;

use super::block::Block;
use super::{BLOCK_GENERATION_INTERVAL_MS, DIFFICULTY_ADJUSTMENT_INTERVAL};

/// Time a full adjustment window should take at the target rate.
pub const TIME_EXPECTED_MS: i64 = BLOCK_GENERATION_INTERVAL_MS * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;

/// True when the block at `index` closes an adjustment window.
pub fn is_retarget_height(index: u64) -> bool {
    index != 0 && index % DIFFICULTY_ADJUSTMENT_INTERVAL == 0
}

/// Step retarget: one bit harder when the window took under half the
/// expected time, one bit easier (never below zero) when it took over twice
/// as long, unchanged otherwise.
pub fn adjust(reference: &Block, latest: &Block) -> u32 {
    let elapsed = latest.timestamp() - reference.timestamp();
    let current = reference.difficulty();

    let next = if elapsed < TIME_EXPECTED_MS / 2 {
        current.saturating_add(1)
    } else if elapsed > TIME_EXPECTED_MS * 2 {
        current.saturating_sub(1)
    } else {
        current
    };

    debug!(
        "RETARGET - blocks #{}..#{} took {} ms (expected {}): difficulty {} -> {}",
        reference.index(),
        latest.index(),
        elapsed,
        TIME_EXPECTED_MS,
        current,
        next
    );
    next
}
