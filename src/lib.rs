// Token-weighted on-chain governance engine.
//
// Stakeholders propose, vote on, queue, and execute arbitrary privileged
// actions, subject to time-delayed execution. Three components form the
// state machine: the proposal lifecycle manager (governance_core), the
// timelocked executor, and the proposal validator. Voting power comes from
// a pluggable historical-snapshot strategy (power_oracle).

pub mod governance_core;
pub mod power_oracle;
pub mod proposal_validator;
pub mod timelock_executor;
pub mod types;
pub mod vote_signature;

pub use governance_core::{
    Governance, GovernanceConfig, GovernanceError, Proposal, ProposalState, Vote,
};

pub use power_oracle::{SnapshotPowerOracle, VotingPowerOracle};

pub use proposal_validator::ProposalValidator;

pub use timelock_executor::{
    ActionHash, CallDispatcher, ExecutorContract, ExecutorError, TimelockedExecutor,
};

pub use types::{ActionCall, Address, ChainContext, PRECISION};

pub use vote_signature::{verify_vote_signature, vote_digest, VoteSignatureError, DOMAIN_NAME};

/// Initialize env_logger once for binaries and tests that want log output.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(cfg!(test)).try_init();
}
