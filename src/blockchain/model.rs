use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use log::{debug, info, warn};
use serde_json::Value;

use super::block::Block;
use super::clock::{Clock, SystemClock};
use super::difficulty::{adjust, is_retarget_height};
use super::error::{ChainError, MineError, ValidationError};
use super::pow::{self, BlockTemplate, CancelToken};
use super::{DIFFICULTY_ADJUSTMENT_INTERVAL, GENESIS_DIFFICULTY, TIMESTAMP_TOLERANCE_MS};

static INSTANCE: OnceLock<Mutex<Blockchain>> = OnceLock::new();

/// The process-wide chain, seeded with genesis on first use. Concurrent first
/// calls block until the single initialization finishes.
pub fn instance() -> &'static Mutex<Blockchain> {
    INSTANCE.get_or_init(|| {
        let bc = Blockchain::new();
        info!("CHAIN - genesis hash {}", bc.genesis().hash());
        Mutex::new(bc)
    })
}

/// In-memory, append-only proof-of-work chain.
pub struct Blockchain {
    chain: Vec<Block>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blockchain")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Initialize a new blockchain with the genesis block, on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            chain: vec![Block::genesis()],
            clock,
        }
    }

    /// Rebuild a chain from `blocks`, validating genesis and every link.
    pub fn from_blocks(blocks: Vec<Block>, clock: Arc<dyn Clock>) -> Result<Self, ChainError> {
        check_blocks(&blocks, clock.now_millis())?;
        Ok(Self {
            chain: blocks,
            clock,
        })
    }

    pub fn genesis(&self) -> &Block {
        &self.chain[0]
    }

    /// Return the last block in the chain.
    pub fn latest_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Difficulty the next block must meet.
    pub fn difficulty(&self) -> u32 {
        next_difficulty(&self.chain)
    }

    /// Capture everything a search for the next block needs.
    pub fn template(&self, data: Value) -> BlockTemplate {
        let prev = self.latest_block();
        BlockTemplate {
            index: prev.index() + 1,
            timestamp: self.clock.now_millis(),
            previous_hash: prev.hash(),
            data,
            difficulty: self.difficulty(),
        }
    }

    /// Validate `candidate` against the current tip, require it to carry the
    /// chain's next difficulty and a hash meeting it, then append it.
    pub fn submit(&mut self, candidate: Block) -> Result<&Block, ValidationError> {
        let checked = self
            .validate_new_block(&candidate, self.latest_block())
            .and_then(|()| check_work(&candidate, self.difficulty()));
        if let Err(e) = checked {
            warn!("CHAIN - rejected block #{}: {}", candidate.index(), e);
            return Err(e);
        }
        debug!(
            "CHAIN - appended block #{} hash={}",
            candidate.index(),
            candidate.hash()
        );
        self.chain.push(candidate);
        Ok(self.latest_block())
    }

    /// Mine `data` into the next block, running the search to completion.
    pub fn mine(&mut self, data: Value) -> Result<&Block, MineError> {
        self.mine_with_cancel(data, &CancelToken::new())
    }

    /// Mine `data` into the next block; `cancel` abandons the search without
    /// touching the chain.
    pub fn mine_with_cancel(
        &mut self,
        data: Value,
        cancel: &CancelToken,
    ) -> Result<&Block, MineError> {
        let t0 = Instant::now();
        let template = self.template(data);
        let candidate = pow::search(&template, cancel)?;
        let block = self.submit(candidate)?;
        info!(
            "MINER - sealed block #{} (hash={}, nonce={}, diff={}) in {} ms",
            block.index(),
            block.hash(),
            block.nonce(),
            block.difficulty(),
            t0.elapsed().as_millis()
        );
        Ok(block)
    }

    /// Decide whether `candidate` may follow `prev`. Reads the clock, so the
    /// outcome near the future-drift boundary depends on when it is called.
    pub fn validate_new_block(&self, candidate: &Block, prev: &Block) -> Result<(), ValidationError> {
        check_new_block(candidate, prev, self.clock.now_millis())
    }

    /// At most one minute behind the parent and one minute ahead of our clock.
    pub fn is_valid_timestamp(&self, candidate: &Block, prev: &Block) -> bool {
        timestamp_in_window(candidate, prev, self.clock.now_millis())
    }

    /// Validate the entire chain: genesis, every link, and the work behind
    /// every block after genesis.
    pub fn is_valid_chain(&self) -> bool {
        check_blocks(&self.chain, self.clock.now_millis()).is_ok()
    }
}

fn next_difficulty(chain: &[Block]) -> u32 {
    let Some(latest) = chain.last() else {
        return GENESIS_DIFFICULTY;
    };
    if is_retarget_height(latest.index()) {
        let reference = &chain[(latest.index() - DIFFICULTY_ADJUSTMENT_INTERVAL) as usize];
        adjust(reference, latest)
    } else {
        latest.difficulty()
    }
}

fn timestamp_in_window(candidate: &Block, prev: &Block, now: i64) -> bool {
    prev.timestamp().saturating_sub(TIMESTAMP_TOLERANCE_MS) < candidate.timestamp()
        && candidate.timestamp().saturating_sub(TIMESTAMP_TOLERANCE_MS) < now
}

/// The candidate must declare `expected` and its hash must meet it.
fn check_work(candidate: &Block, expected: u32) -> Result<(), ValidationError> {
    if candidate.difficulty() != expected {
        return Err(ValidationError::WrongDifficulty {
            expected,
            found: candidate.difficulty(),
        });
    }
    let hash = candidate.hash();
    if !pow::hash_matches_difficulty(&hash, expected) {
        return Err(ValidationError::InsufficientWork {
            difficulty: expected,
            leading_zeros: hash.leading_zero_bits(),
        });
    }
    Ok(())
}

fn check_new_block(candidate: &Block, prev: &Block, now: i64) -> Result<(), ValidationError> {
    candidate.check_structure()?;

    let expected = prev.index() + 1;
    if candidate.index() != expected {
        return Err(ValidationError::IndexMismatch {
            expected,
            found: candidate.index(),
        });
    }

    if !timestamp_in_window(candidate, prev, now) {
        return Err(ValidationError::InvalidTimestamp {
            timestamp: candidate.timestamp(),
            previous: prev.timestamp(),
            now,
        });
    }

    if candidate.previous_hash() != Some(&prev.hash()) {
        return Err(ValidationError::HashMismatch);
    }

    Ok(())
}

fn check_blocks(blocks: &[Block], now: i64) -> Result<(), ChainError> {
    let genesis = blocks.first().ok_or(ChainError::Empty)?;
    if *genesis != Block::genesis() {
        return Err(ChainError::InvalidGenesis);
    }
    for i in 1..blocks.len() {
        let (candidate, prev) = (&blocks[i], &blocks[i - 1]);
        check_new_block(candidate, prev, now)
            .and_then(|()| check_work(candidate, next_difficulty(&blocks[..i])))
            .map_err(|source| ChainError::Block {
                index: candidate.index(),
                source,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::clock::ManualClock;
    use crate::blockchain::difficulty::TIME_EXPECTED_MS;
    use serde_json::json;

    const T0: i64 = 1_700_000_000_000;

    fn chain_at(now: i64) -> (Blockchain, ManualClock) {
        let clock = ManualClock::new(now);
        (Blockchain::with_clock(Arc::new(clock.clone())), clock)
    }

    fn link(prev: &Block, timestamp: i64, difficulty: u32) -> Block {
        Block::new(
            prev.index() + 1,
            timestamp,
            Some(prev.hash()),
            json!(format!("block {}", prev.index() + 1)),
            difficulty,
            0,
        )
    }

    /// Mine `count` blocks, advancing the clock by `step` ms before each.
    fn grow(bc: &mut Blockchain, clock: &ManualClock, count: usize, step: i64) {
        for _ in 0..count {
            clock.advance(step);
            bc.mine(json!("grow")).unwrap();
        }
    }

    /// A mined chain with tip #30 whose reference block (#20) carries
    /// difficulty 4; blocks #21..=#30 span `elapsed` ms.
    fn retarget_window(elapsed: i64) -> (Blockchain, ManualClock) {
        let (mut bc, clock) = chain_at(T0);
        // #10 closes a window measured from genesis: slow, 5 -> 4.
        grow(&mut bc, &clock, 10, 1_000);
        // #20 closes a slow window against #10 (difficulty 5): 5 -> 4.
        grow(&mut bc, &clock, 10, TIME_EXPECTED_MS * 3 / 10);
        assert_eq!(bc.blocks()[20].difficulty(), 4);
        grow(&mut bc, &clock, 10, elapsed / 10);
        assert_eq!(bc.latest_block().index(), 30);
        (bc, clock)
    }

    /// First nonce whose hash does not meet the template's difficulty.
    fn unworked(t: &BlockTemplate) -> Block {
        (0u64..)
            .map(|nonce| {
                Block::new(t.index, t.timestamp, Some(t.previous_hash), t.data.clone(), t.difficulty, nonce)
            })
            .find(|b| !pow::hash_matches_difficulty(&b.hash(), t.difficulty))
            .unwrap()
    }

    fn assert_linked(bc: &Blockchain) {
        for pair in bc.blocks().windows(2) {
            assert_eq!(pair[1].index(), pair[0].index() + 1);
            assert_eq!(pair[1].previous_hash(), Some(&pair[0].hash()));
        }
    }

    #[test]
    fn new_chain_holds_only_genesis() {
        let bc = Blockchain::new();
        assert_eq!(bc.len(), 1);
        assert_eq!(bc.latest_block(), &Block::genesis());
        assert_eq!(bc.genesis().index(), 0);
        assert_eq!(bc.difficulty(), 5);
        assert!(bc.is_valid_chain());
    }

    #[test]
    fn mining_extends_chain_without_gaps() {
        let (mut bc, clock) = chain_at(T0);
        for i in 1..=3u64 {
            clock.advance(1_000);
            let block = bc.mine(json!({ "n": i })).unwrap();
            assert_eq!(block.index(), i);
            assert_eq!(block.timestamp(), T0 + 1_000 * i as i64);
            assert!(pow::hash_matches_difficulty(&block.hash(), block.difficulty()));
        }
        assert_eq!(bc.len(), 4);
        assert_eq!(bc.genesis(), &Block::genesis());
        assert_linked(&bc);
        assert!(bc.is_valid_chain());
    }

    #[test]
    fn cancelled_mining_leaves_chain_untouched() {
        let (mut bc, _clock) = chain_at(T0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = bc.mine_with_cancel(json!("x"), &cancel).unwrap_err();
        assert_eq!(err, MineError::SearchAbandoned);
        assert_eq!(bc.len(), 1);
    }

    #[test]
    fn stale_template_is_rejected_on_submit() {
        let (mut bc, _clock) = chain_at(T0);
        let stale = bc.template(json!("late"));
        bc.mine(json!("first")).unwrap();

        let candidate = pow::search(&stale, &CancelToken::new()).unwrap();
        let err = bc.submit(candidate).unwrap_err();
        assert_eq!(
            err,
            ValidationError::IndexMismatch {
                expected: 2,
                found: 1
            }
        );
        assert_eq!(bc.len(), 2);
        assert_eq!(MineError::from(err.clone()), MineError::Rejected(err));
    }

    #[test]
    fn validate_rejects_index_gap_and_regression() {
        let (bc, _clock) = chain_at(T0);
        let genesis = Block::genesis();
        let gap = Block::new(2, T0, Some(genesis.hash()), json!("x"), 0, 0);
        assert_eq!(
            bc.validate_new_block(&gap, &genesis),
            Err(ValidationError::IndexMismatch {
                expected: 1,
                found: 2
            })
        );

        let one = link(&genesis, T0, 0);
        let regression = Block::new(1, T0, Some(one.hash()), json!("x"), 0, 0);
        assert!(matches!(
            bc.validate_new_block(&regression, &one),
            Err(ValidationError::IndexMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_wrong_parent_hash() {
        let (bc, _clock) = chain_at(T0);
        let genesis = Block::genesis();
        let other = link(&genesis, T0, 0);
        let forged = Block::new(1, T0, Some(other.hash()), json!("x"), 0, 0);
        assert_eq!(
            bc.validate_new_block(&forged, &genesis),
            Err(ValidationError::HashMismatch)
        );
    }

    #[test]
    fn validate_rejects_malformed_block() {
        let (bc, _clock) = chain_at(T0);
        let genesis = Block::genesis();
        let empty = Block::new(1, T0, Some(genesis.hash()), Value::Null, 0, 0);
        assert!(matches!(
            bc.validate_new_block(&empty, &genesis),
            Err(ValidationError::MalformedBlock(_))
        ));
    }

    #[test]
    fn timestamp_window_behind_parent() {
        let (bc, _clock) = chain_at(T0);
        let prev = link(&Block::genesis(), T0, 0);

        let too_old = link(&prev, T0 - 70_000, 0);
        assert!(!bc.is_valid_timestamp(&too_old, &prev));
        assert!(matches!(
            bc.validate_new_block(&too_old, &prev),
            Err(ValidationError::InvalidTimestamp { .. })
        ));

        let slightly_old = link(&prev, T0 - 50_000, 0);
        assert!(bc.is_valid_timestamp(&slightly_old, &prev));
        assert_eq!(bc.validate_new_block(&slightly_old, &prev), Ok(()));
    }

    #[test]
    fn timestamp_window_ahead_of_clock() {
        let (bc, clock) = chain_at(T0);
        let prev = link(&Block::genesis(), T0, 0);
        let future = link(&prev, T0 + 90_000, 0);
        assert!(!bc.is_valid_timestamp(&future, &prev));

        clock.set(T0 + 45_000);
        assert!(bc.is_valid_timestamp(&future, &prev));
    }

    #[test]
    fn difficulty_rises_when_window_is_too_fast() {
        let (bc, _clock) = retarget_window(TIME_EXPECTED_MS / 4);
        assert_eq!(bc.difficulty(), 5);
    }

    #[test]
    fn difficulty_drops_when_window_is_too_slow() {
        let (bc, _clock) = retarget_window(TIME_EXPECTED_MS * 3);
        assert_eq!(bc.difficulty(), 3);
    }

    #[test]
    fn difficulty_holds_when_window_is_on_target() {
        let (bc, _clock) = retarget_window(TIME_EXPECTED_MS);
        assert_eq!(bc.difficulty(), 4);
    }

    #[test]
    fn difficulty_between_retargets_follows_tip() {
        let (mut bc, clock) = retarget_window(TIME_EXPECTED_MS / 4);
        clock.advance(1_000);
        let block = bc.mine(json!("after")).unwrap();
        assert_eq!(block.difficulty(), 5);
        assert_eq!(bc.difficulty(), 5);
        assert!(bc.is_valid_chain());
    }

    #[test]
    fn submit_rejects_wrong_difficulty() {
        let (mut bc, _clock) = chain_at(T0);
        let genesis = Block::genesis();
        let huge = Block::new(1, T0, Some(genesis.hash()), json!("no work"), 4_000_000_000, 0);
        assert_eq!(
            bc.submit(huge).unwrap_err(),
            ValidationError::WrongDifficulty {
                expected: 5,
                found: 4_000_000_000
            }
        );

        let mut easy = bc.template(json!("easy"));
        easy.difficulty = 0;
        let candidate = pow::search(&easy, &CancelToken::new()).unwrap();
        assert_eq!(
            bc.submit(candidate).unwrap_err(),
            ValidationError::WrongDifficulty {
                expected: 5,
                found: 0
            }
        );
        assert_eq!(bc.len(), 1);
        assert_eq!(bc.difficulty(), 5);
    }

    #[test]
    fn submit_rejects_insufficient_work() {
        let (mut bc, _clock) = chain_at(T0);
        let candidate = unworked(&bc.template(json!("lazy")));
        assert!(matches!(
            bc.submit(candidate).unwrap_err(),
            ValidationError::InsufficientWork { difficulty: 5, leading_zeros } if leading_zeros < 5
        ));
        assert_eq!(bc.len(), 1);
    }

    #[test]
    fn timestamp_window_saturates_at_extremes() {
        let (bc, _clock) = chain_at(T0);
        let genesis = Block::genesis();
        let ancient = Block::new(1, i64::MIN, Some(genesis.hash()), json!("x"), 5, 0);
        assert!(!bc.is_valid_timestamp(&ancient, &genesis));

        let floor = Block::new(1, i64::MIN + 1, Some(genesis.hash()), json!("x"), 5, 0);
        let next = link(&floor, i64::MIN + 2, 5);
        assert!(bc.is_valid_timestamp(&next, &floor));
        assert!(matches!(
            bc.validate_new_block(&ancient, &genesis),
            Err(ValidationError::MalformedBlock(_))
        ));
    }

    #[test]
    fn len_and_is_empty() {
        let bc = Blockchain::new();
        assert_eq!(bc.len(), 1);
        assert!(!bc.is_empty());
    }

    #[test]
    fn first_retarget_uses_genesis_as_reference() {
        // Genesis is years older than anything mined now, so the first
        // window always looks slow.
        let (mut bc, clock) = chain_at(T0);
        for _ in 0..10 {
            clock.advance(1_000);
            bc.mine(json!("tick")).unwrap();
        }
        assert_eq!(bc.latest_block().index(), 10);
        assert_eq!(bc.latest_block().difficulty(), 5);
        assert_eq!(bc.difficulty(), 4);

        clock.advance(1_000);
        let block = bc.mine(json!("after retarget")).unwrap();
        assert_eq!(block.difficulty(), 4);
        assert!(bc.is_valid_chain());
    }

    #[test]
    fn from_blocks_rejects_bad_chains() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(T0));
        assert_eq!(
            Blockchain::from_blocks(vec![], clock.clone()).unwrap_err(),
            ChainError::Empty
        );

        let fake_genesis = Block::new(0, T0, None, json!("not genesis"), 5, 0);
        assert_eq!(
            Blockchain::from_blocks(vec![fake_genesis], clock.clone()).unwrap_err(),
            ChainError::InvalidGenesis
        );

        let (mut mined, mined_clock) = chain_at(T0);
        grow(&mut mined, &mined_clock, 6, 1_000);
        let clock: Arc<dyn Clock> = Arc::new(mined_clock);
        let blocks = mined.blocks().to_vec();

        let rebuilt = Blockchain::from_blocks(blocks.clone(), clock.clone()).unwrap();
        assert_eq!(rebuilt.len(), 7);
        assert!(rebuilt.is_valid_chain());

        // An honestly re-mined block 5 still breaks the link to block 6.
        let mut tampered = blocks.clone();
        let t = BlockTemplate {
            index: 5,
            timestamp: blocks[5].timestamp(),
            previous_hash: blocks[4].hash(),
            data: json!("tampered"),
            difficulty: blocks[5].difficulty(),
        };
        tampered[5] = pow::search(&t, &CancelToken::new()).unwrap();
        assert_eq!(
            Blockchain::from_blocks(tampered, clock.clone()).unwrap_err(),
            ChainError::Block {
                index: 6,
                source: ValidationError::HashMismatch
            }
        );

        let prefix = Blockchain::from_blocks(blocks[..6].to_vec(), clock.clone()).unwrap();
        let mut lazy = blocks[..6].to_vec();
        lazy.push(unworked(&prefix.template(json!("lazy"))));
        assert!(matches!(
            Blockchain::from_blocks(lazy, clock.clone()).unwrap_err(),
            ChainError::Block {
                index: 6,
                source: ValidationError::InsufficientWork { difficulty: 5, .. }
            }
        ));

        let mut easy = prefix.template(json!("easy"));
        easy.difficulty = 0;
        let mut cheap = blocks[..6].to_vec();
        cheap.push(pow::search(&easy, &CancelToken::new()).unwrap());
        assert_eq!(
            Blockchain::from_blocks(cheap, clock).unwrap_err(),
            ChainError::Block {
                index: 6,
                source: ValidationError::WrongDifficulty {
                    expected: 5,
                    found: 0
                }
            }
        );
    }

    #[test]
    fn instance_is_created_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| instance() as *const Mutex<Blockchain> as usize))
            .collect();
        let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] == w[1]));

        let bc = instance().lock().unwrap();
        assert_eq!(bc.genesis(), &Block::genesis());
    }
}
