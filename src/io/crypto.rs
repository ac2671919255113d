use crate::error::Result;
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn verify_sha256(bytes: &[u8], expected_hex: &str) -> Result<bool> {
    let expected = hex::decode(expected_hex.trim())?;
    Ok(Sha256::digest(bytes).as_slice() == expected.as_slice())
}
