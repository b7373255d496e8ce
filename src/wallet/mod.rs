use secp256k1::PublicKey;
use thiserror::Error;

/// Hex length of an uncompressed secp256k1 public key (65 bytes).
pub const ADDRESS_HEX_LEN: usize = 130;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must be {ADDRESS_HEX_LEN} hex characters, got {0}")]
    InvalidLength(usize),
    #[error("address must contain only hex characters")]
    NotHex,
    #[error("address must start with 04")]
    NotUncompressed,
    #[error("address is not a point on secp256k1")]
    InvalidKey,
}

/// An address is the hex of an uncompressed public key. Returns it lowercased.
pub fn validate_address(address: &str) -> Result<String, AddressError> {
    if address.len() != ADDRESS_HEX_LEN {
        return Err(AddressError::InvalidLength(address.len()));
    }
    let bytes = hex::decode(address).map_err(|_| AddressError::NotHex)?;
    if bytes[0] != 0x04 {
        return Err(AddressError::NotUncompressed);
    }
    let pk = PublicKey::from_slice(&bytes).map_err(|_| AddressError::InvalidKey)?;
    Ok(hex::encode(pk.serialize_uncompressed()))
}
