//! Block hashing and signature helpers
//!
//! Block ids are Blake2b-256 over a fixed big-endian encoding of the
//! header fields; the generator signs the id bytes with ed25519.

use crate::hash::{BlockId, PublicKey, Signature};
use crate::types::{BlockHeader, PayloadHash, Transaction};
use blake2::{digest::consts::U32, Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

/// Why a header failed crypto-validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockVerificationError {
    #[error("declared id {declared} does not match computed id {computed}")]
    IdMismatch { declared: BlockId, computed: BlockId },

    #[error("generator key {0} is not a valid ed25519 point")]
    BadPublicKey(PublicKey),

    #[error("signature does not verify against generator {0}")]
    BadSignature(PublicKey),
}

/// Compute the content hash of a header, ignoring its declared id and signature
pub fn compute_block_id(header: &BlockHeader) -> BlockId {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(header.height.to_be_bytes());
    match &header.previous_block_id {
        Some(previous) => hasher.update(previous.as_ref()),
        None => hasher.update([0u8; 32]),
    }
    hasher.update(header.generator_public_key.as_ref());
    hasher.update(header.timestamp.to_be_bytes());
    hasher.update(header.payload_hash.as_ref());
    hasher.update(header.number_of_transactions.to_be_bytes());
    BlockId::new(digest_bytes(hasher))
}

/// Commitment over the transaction ids, in block order
pub fn compute_payload_hash(transactions: &[Transaction]) -> PayloadHash {
    let mut hasher = Blake2b::<U32>::new();
    for tx in transactions {
        hasher.update(tx.id.as_ref());
    }
    PayloadHash::new(digest_bytes(hasher))
}

fn digest_bytes(hasher: Blake2b<U32>) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Fill in generator key, id and signature for a header forged by `key`
pub fn sign_header(mut header: BlockHeader, key: &SigningKey) -> BlockHeader {
    header.generator_public_key = PublicKey::new(key.verifying_key().to_bytes());
    header.id = compute_block_id(&header);
    header.block_signature = Signature::new(key.sign(header.id.as_ref()).to_bytes());
    header
}

/// Check that the header's id is its content hash and that the declared
/// generator signed it
pub fn verify_header(header: &BlockHeader) -> Result<(), BlockVerificationError> {
    let computed = compute_block_id(header);
    if computed != header.id {
        return Err(BlockVerificationError::IdMismatch {
            declared: header.id,
            computed,
        });
    }

    let key = VerifyingKey::from_bytes(&header.generator_public_key)
        .map_err(|_| BlockVerificationError::BadPublicKey(header.generator_public_key))?;
    let signature = ed25519_dalek::Signature::from_bytes(&header.block_signature.to_bytes());
    key.verify(header.id.as_ref(), &signature)
        .map_err(|_| BlockVerificationError::BadSignature(header.generator_public_key))
}
