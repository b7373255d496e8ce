use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::error::ValidationError;
use super::{GENESIS_DATA, GENESIS_DIFFICULTY, GENESIS_TIMESTAMP_MS};

/// SHA-256 digest of a block, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Number of zero bits before the first one bit, reading the digest big-endian.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0;
        for byte in self.0 {
            bits += byte.leading_zeros();
            if byte != 0 {
                break;
            }
        }
        bits
    }

    /// The digest as a string of '0'/'1', one character per bit.
    pub fn to_bit_string(&self) -> String {
        self.0.iter().map(|b| format!("{b:08b}")).collect()
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

impl std::str::FromStr for BlockHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single chain entry. Immutable once built; the hash is derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: i64, // milliseconds since epoch
    previous_hash: Option<BlockHash>,
    #[serde(default)]
    data: Value,
    difficulty: u32,
    nonce: u64,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: i64,
        previous_hash: Option<BlockHash>,
        data: Value,
        difficulty: u32,
        nonce: u64,
    ) -> Self {
        Self {
            index,
            timestamp,
            previous_hash,
            data,
            difficulty,
            nonce,
        }
    }

    /// The fixed first block of every chain.
    pub fn genesis() -> Self {
        Self::new(
            0,
            GENESIS_TIMESTAMP_MS,
            None,
            Value::String(GENESIS_DATA.to_string()),
            GENESIS_DIFFICULTY,
            0,
        )
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn previous_hash(&self) -> Option<&BlockHash> {
        self.previous_hash.as_ref()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Compute the SHA-256 hash of this block over every field.
    /// The payload enters the preimage as compact JSON.
    pub fn hash(&self) -> BlockHash {
        let previous = self
            .previous_hash
            .map(|h| h.to_string())
            .unwrap_or_default();
        let preimage = format!(
            "{}:{}:{}:{}:{}:{}",
            self.index, self.timestamp, previous, self.data, self.difficulty, self.nonce
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        BlockHash(hasher.finalize().into())
    }

    /// Structural well-formedness, independent of any other block.
    pub fn check_structure(&self) -> Result<(), ValidationError> {
        if self.timestamp < 0 {
            return Err(ValidationError::MalformedBlock(format!(
                "negative timestamp {}",
                self.timestamp
            )));
        }
        match (self.index, self.previous_hash) {
            (0, Some(_)) => {
                return Err(ValidationError::MalformedBlock(
                    "genesis block must not reference a previous hash".into(),
                ));
            }
            (i, None) if i > 0 => {
                return Err(ValidationError::MalformedBlock(format!(
                    "block #{i} has no previous hash"
                )));
            }
            _ => {}
        }
        if self.data.is_null() {
            return Err(ValidationError::MalformedBlock("missing data".into()));
        }
        Ok(())
    }
}
