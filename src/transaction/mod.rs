pub mod coinbase;

pub use coinbase::{COINBASE_AMOUNT, Transaction, TxIn, TxOut};
