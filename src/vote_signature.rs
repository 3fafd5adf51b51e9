// Off-line vote signatures: digest construction and signer recovery.
//
// A vote signed off-line is bound to a domain separator covering the
// governance name, the chain identifier, and the governance address, so a
// signature can never be replayed against another chain or another
// governance instance. Replay of the same vote is blocked by the
// one-vote-per-voter invariant in the lifecycle manager.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::Address;

/// Name bound into the vote domain separator.
pub const DOMAIN_NAME: &str = "Pharos Governance";

const DOMAIN_TYPE: &str = "GovernanceDomain(name,chainId,verifyingContract)";
const VOTE_TYPE: &str = "VoteEmitted(id,support)";

#[derive(Debug, Error)]
pub enum VoteSignatureError {
    #[error("malformed public key")]
    MalformedPublicKey,

    #[error("signature does not match the vote digest")]
    InvalidSignature,

    #[error("serialization error: {0}")]
    SerializationError(String),
}

fn hash_content<T: Serialize>(content: &T) -> Result<[u8; 32], VoteSignatureError> {
    let serialized = serde_json::to_vec(content)
        .map_err(|e| VoteSignatureError::SerializationError(e.to_string()))?;

    let digest = Sha256::digest(&serialized);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(out)
}

/// Domain separator binding the governance name, chain id, and governance
/// address.
pub fn domain_separator(
    chain_id: u64,
    governance: Address,
) -> Result<[u8; 32], VoteSignatureError> {
    hash_content(&(DOMAIN_TYPE, DOMAIN_NAME, chain_id, governance))
}

/// Structured digest a voter signs off-line: (proposal id, support) under
/// the domain separator.
pub fn vote_digest(
    chain_id: u64,
    governance: Address,
    proposal_id: u64,
    support: bool,
) -> Result<[u8; 32], VoteSignatureError> {
    let domain = domain_separator(chain_id, governance)?;
    hash_content(&(VOTE_TYPE, hex::encode(domain), proposal_id, support))
}

/// Verify an off-line vote signature and return the signer's address.
pub fn verify_vote_signature(
    chain_id: u64,
    governance: Address,
    proposal_id: u64,
    support: bool,
    public_key: &[u8; 32],
    signature: &[u8; 64],
) -> Result<Address, VoteSignatureError> {
    let key = VerifyingKey::from_bytes(public_key)
        .map_err(|_| VoteSignatureError::MalformedPublicKey)?;
    let signature = Signature::from_bytes(signature);

    let digest = vote_digest(chain_id, governance, proposal_id, support)?;
    key.verify(&digest, &signature)
        .map_err(|_| VoteSignatureError::InvalidSignature)?;

    Ok(Address::from_public_key(public_key))
}
