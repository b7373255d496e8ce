use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reward paid to the miner of each block.
pub const COINBASE_AMOUNT: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub tx_out_id: String,
    /// For a coinbase input this carries the height of the block it pays for,
    /// which keeps coinbase ids unique across blocks.
    pub tx_out_index: u64,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// A stable identifier computed from content.
    pub id: String,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl Transaction {
    /// Build a transaction and compute its id deterministically from its content.
    pub fn new(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Self {
        let id = transaction_id(&tx_ins, &tx_outs);
        Self {
            id,
            tx_ins,
            tx_outs,
        }
    }

    /// The block reward transaction for `block_index`, paying `address`.
    pub fn coinbase(address: &str, block_index: u64) -> Self {
        Self::new(
            vec![TxIn {
                tx_out_id: String::new(),
                tx_out_index: block_index,
                signature: String::new(),
            }],
            vec![TxOut {
                address: address.to_string(),
                amount: COINBASE_AMOUNT,
            }],
        )
    }

    pub fn total_output_amount(&self) -> u128 {
        self.tx_outs.iter().map(|o| o.amount as u128).sum()
    }
}

fn transaction_id(tx_ins: &[TxIn], tx_outs: &[TxOut]) -> String {
    let mut hasher = Sha256::new();
    for input in tx_ins {
        hasher.update(input.tx_out_id.as_bytes());
        hasher.update(input.tx_out_index.to_string().as_bytes());
    }
    for output in tx_outs {
        hasher.update(output.address.as_bytes());
        hasher.update(output.amount.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_pays_fixed_reward() {
        let tx = Transaction::coinbase("04abc", 7);
        assert_eq!(tx.tx_ins.len(), 1);
        assert_eq!(tx.tx_ins[0].tx_out_index, 7);
        assert!(tx.tx_ins[0].signature.is_empty());
        assert_eq!(tx.tx_outs, vec![TxOut { address: "04abc".into(), amount: COINBASE_AMOUNT }]);
        assert_eq!(tx.total_output_amount(), 50);
    }

    #[test]
    fn coinbase_id_is_deterministic_and_height_bound() {
        let a = Transaction::coinbase("04abc", 1);
        assert_eq!(a.id, Transaction::coinbase("04abc", 1).id);
        assert_ne!(a.id, Transaction::coinbase("04abc", 2).id);
        assert_ne!(a.id, Transaction::coinbase("04abd", 1).id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn coinbase_serializes_as_block_payload() {
        let tx = Transaction::coinbase("04abc", 3);
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["tx_outs"][0]["amount"], 50);
        let back: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(back, tx);
    }
}
