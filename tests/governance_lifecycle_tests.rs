// GOVERNANCE LIFECYCLE INTEGRATION TESTS
// End-to-end testing of the proposal state machine against the timelocked
// executor and the snapshot voting-power strategy.
//
// Test Coverage:
// 1. Full lifecycle: create -> vote -> queue -> execute
// 2. Off-line signature voting and replay rejection
// 3. Timelock and grace-period boundaries, proposal expiry
// 4. Duplicate-action guard across proposals
// 5. Queue rollback after a partial queue (prefix entries released)
// 6. Downstream execution failure and retry within the grace window
// 7. Cancellation of a queued proposal

use std::sync::Arc;

use anyhow::Result;
use ed25519_dalek::{Signer, SigningKey};

use pharos_governance::{
    vote_digest, ActionCall, Address, CallDispatcher, ChainContext, Governance, GovernanceError,
    ProposalState, ProposalValidator, SnapshotPowerOracle, TimelockedExecutor,
};

const CHAIN_ID: u64 = 7;
const VOTING_DELAY: u64 = 10;
const VOTING_DURATION: u64 = 100;
const DELAY: u64 = 3_600;
const GRACE_PERIOD: u64 = 86_400;

const GOVERNANCE: Address = Address([1u8; 20]);
const OWNER: Address = Address([2u8; 20]);
const GUARDIAN: Address = Address([3u8; 20]);
const EXECUTOR: Address = Address([4u8; 20]);
const CREATOR: Address = Address([5u8; 20]);
const WHALE: Address = Address([6u8; 20]);
const MINNOW: Address = Address([7u8; 20]);
const STRATEGY: Address = Address([8u8; 20]);

struct RecordingDispatcher {
    calls: Vec<ActionCall>,
    fail_on_signature: Option<String>,
}

impl RecordingDispatcher {
    fn new() -> Self {
        RecordingDispatcher {
            calls: Vec::new(),
            fail_on_signature: None,
        }
    }

    fn failing_on(signature: &str) -> Self {
        RecordingDispatcher {
            calls: Vec::new(),
            fail_on_signature: Some(signature.to_string()),
        }
    }
}

impl CallDispatcher for RecordingDispatcher {
    fn dispatch(&mut self, call: &ActionCall) -> Result<Vec<u8>, String> {
        if self.fail_on_signature.as_deref() == Some(call.signature.as_str()) {
            return Err("downstream call reverted".to_string());
        }
        self.calls.push(call.clone());
        Ok(b"ok".to_vec())
    }
}

fn offline_signer() -> SigningKey {
    SigningKey::from_bytes(&[42u8; 32])
}

fn offline_voter() -> Address {
    Address::from_public_key(offline_signer().verifying_key().as_bytes())
}

/// Voting supply 1_000_000 from block 0. The creator holds 2% of
/// proposition supply; the whale holds 25% and the minnow 10% of voting
/// supply; the off-line signer holds 5%.
fn oracle() -> SnapshotPowerOracle {
    let mut oracle = SnapshotPowerOracle::new(STRATEGY);
    oracle.set_supply(0, 1_000_000, 1_000_000);
    oracle.set_power(CREATOR, 0, 20_000, 0);
    oracle.set_power(WHALE, 0, 0, 250_000);
    oracle.set_power(MINNOW, 0, 0, 100_000);
    oracle.set_power(offline_voter(), 0, 0, 50_000);
    oracle
}

// 1% proposition threshold, 20% quorum, 5% differential.
fn timelock() -> TimelockedExecutor {
    TimelockedExecutor::new(
        EXECUTOR,
        GOVERNANCE,
        DELAY,
        GRACE_PERIOD,
        60,
        1_000_000,
        ProposalValidator::new(100, VOTING_DURATION, 500, 2_000),
    )
    .unwrap()
}

fn governance() -> Governance {
    let mut governance = Governance::new(
        GOVERNANCE,
        OWNER,
        GUARDIAN,
        CHAIN_ID,
        Arc::new(oracle()),
        VOTING_DELAY,
    );
    governance.install_executor(OWNER, Box::new(timelock())).unwrap();
    governance.authorize_executors(OWNER, vec![EXECUTOR]).unwrap();
    governance
}

fn actions() -> Vec<ActionCall> {
    vec![
        ActionCall {
            target: Address([90u8; 20]),
            value: 0,
            signature: "setRate(uint256)".to_string(),
            data: vec![1],
            with_delegate_call: false,
        },
        ActionCall {
            target: Address([91u8; 20]),
            value: 500,
            signature: "transfer(address,uint256)".to_string(),
            data: vec![2, 3],
            with_delegate_call: false,
        },
    ]
}

/// Drive a fresh proposal to Succeeded: create at block 100, vote the
/// whale in favor during the active window. Returns (id, end_block).
fn succeeded_proposal(governance: &mut Governance) -> Result<(u64, u64)> {
    let ctx = ChainContext::new(100, 10_000);
    let id = governance.create(CREATOR, EXECUTOR, actions(), [7u8; 32], &ctx)?;

    let active = ChainContext::new(100 + VOTING_DELAY + 1, 10_100);
    governance.submit_vote(WHALE, id, true, &active)?;

    let end_block = governance.get_proposal_by_id(id)?.end_block;
    let closed = ChainContext::new(end_block + 1, 20_000);
    assert_eq!(governance.get_proposal_state(id, &closed)?, ProposalState::Succeeded);
    Ok((id, end_block))
}

#[test]
fn test_full_lifecycle_create_vote_queue_execute() -> Result<()> {
    let mut governance = governance();
    let (id, end_block) = succeeded_proposal(&mut governance)?;

    // Queue after the window closed.
    let queue_ctx = ChainContext::new(end_block + 1, 20_000);
    governance.queue(MINNOW, id, &queue_ctx)?;

    let proposal = governance.get_proposal_by_id(id)?;
    assert_eq!(proposal.execution_time, 20_000 + DELAY);
    assert_eq!(
        governance.get_proposal_state(id, &queue_ctx)?,
        ProposalState::Queued
    );

    // Execute exactly at the execution time.
    let mut dispatcher = RecordingDispatcher::new();
    let execute_ctx = ChainContext::new(end_block + 2, 20_000 + DELAY);
    governance.execute(MINNOW, id, &execute_ctx, &mut dispatcher)?;

    assert_eq!(dispatcher.calls, actions());
    assert!(governance.get_proposal_by_id(id)?.executed);
    assert_eq!(
        governance.get_proposal_state(id, &execute_ctx)?,
        ProposalState::Executed
    );

    // A second execute must not re-dispatch anything.
    let mut second = RecordingDispatcher::new();
    assert!(matches!(
        governance.execute(MINNOW, id, &execute_ctx, &mut second),
        Err(GovernanceError::InvalidStateForExecute)
    ));
    assert!(second.calls.is_empty());
    Ok(())
}

#[test]
fn test_vote_by_signature_counts_and_rejects_replay() -> Result<()> {
    let mut governance = governance();
    let ctx = ChainContext::new(100, 10_000);
    let id = governance.create(CREATOR, EXECUTOR, actions(), [7u8; 32], &ctx)?;

    let signer = offline_signer();
    let digest = vote_digest(CHAIN_ID, GOVERNANCE, id, true)?;
    let signature = signer.sign(&digest).to_bytes();
    let public_key = *signer.verifying_key().as_bytes();

    let active = ChainContext::new(100 + VOTING_DELAY + 1, 10_100);
    governance.submit_vote_by_signature(id, true, &public_key, &signature, &active)?;

    let vote = governance
        .get_vote_on_proposal(id, offline_voter())?
        .expect("vote recorded");
    assert!(vote.support);
    assert_eq!(vote.voting_power, 50_000);
    assert_eq!(governance.get_proposal_by_id(id)?.for_votes, 50_000);

    // Replaying the same signed vote trips the one-vote-per-voter guard.
    assert!(matches!(
        governance.submit_vote_by_signature(id, true, &public_key, &signature, &active),
        Err(GovernanceError::VoteAlreadySubmitted)
    ));

    // A signature over a different support value does not verify.
    assert!(matches!(
        governance.submit_vote_by_signature(id, false, &public_key, &signature, &active),
        Err(GovernanceError::Signature(_))
    ));
    Ok(())
}

#[test]
fn test_quorum_and_differential_decide_passage() -> Result<()> {
    let mut governance = governance();
    let ctx = ChainContext::new(100, 10_000);
    let id = governance.create(CREATOR, EXECUTOR, actions(), [7u8; 32], &ctx)?;

    // Whale for (25%), minnow against (10%): quorum 250k >= 200k and
    // differential 15% >= 5%.
    let active = ChainContext::new(100 + VOTING_DELAY + 1, 10_100);
    governance.submit_vote(WHALE, id, true, &active)?;
    governance.submit_vote(MINNOW, id, false, &active)?;

    let end_block = governance.get_proposal_by_id(id)?.end_block;
    let closed = ChainContext::new(end_block + 1, 20_000);
    assert_eq!(governance.get_proposal_state(id, &closed)?, ProposalState::Succeeded);

    // Only the minnow votes in favor on a second proposal: below quorum.
    let id2 = governance.create(CREATOR, EXECUTOR, actions(), [8u8; 32], &ctx)?;
    governance.submit_vote(MINNOW, id2, true, &active)?;
    assert_eq!(governance.get_proposal_state(id2, &closed)?, ProposalState::Failed);
    Ok(())
}

#[test]
fn test_execute_before_timelock_and_after_grace() -> Result<()> {
    let mut governance = governance();
    let (id, end_block) = succeeded_proposal(&mut governance)?;

    let queue_ctx = ChainContext::new(end_block + 1, 20_000);
    governance.queue(MINNOW, id, &queue_ctx)?;
    let execution_time = governance.get_proposal_by_id(id)?.execution_time;

    // One second early: still Queued, but the timelock has not finished.
    let mut dispatcher = RecordingDispatcher::new();
    let early = ChainContext::new(end_block + 2, execution_time - 1);
    assert!(matches!(
        governance.execute(MINNOW, id, &early, &mut dispatcher),
        Err(GovernanceError::Executor(_))
    ));
    assert!(dispatcher.calls.is_empty());

    // One second past the grace period: the proposal reads as Expired.
    let late = ChainContext::new(end_block + 3, execution_time + GRACE_PERIOD + 1);
    assert_eq!(governance.get_proposal_state(id, &late)?, ProposalState::Expired);
    assert!(matches!(
        governance.execute(MINNOW, id, &late, &mut dispatcher),
        Err(GovernanceError::InvalidStateForExecute)
    ));

    // Expired proposals can no longer be cancelled either.
    assert!(matches!(
        governance.cancel(GUARDIAN, id, &late),
        Err(GovernanceError::CancellationNotAllowed)
    ));
    Ok(())
}

#[test]
fn test_duplicate_actions_across_proposals_cannot_queue() -> Result<()> {
    let mut governance = governance();

    // Two identical proposals succeed in the same voting window.
    let ctx = ChainContext::new(100, 10_000);
    let id1 = governance.create(CREATOR, EXECUTOR, actions(), [7u8; 32], &ctx)?;
    let id2 = governance.create(CREATOR, EXECUTOR, actions(), [7u8; 32], &ctx)?;

    let active = ChainContext::new(100 + VOTING_DELAY + 1, 10_100);
    governance.submit_vote(WHALE, id1, true, &active)?;
    governance.submit_vote(WHALE, id2, true, &active)?;

    let end_block = governance.get_proposal_by_id(id1)?.end_block;
    let queue_ctx = ChainContext::new(end_block + 1, 20_000);
    governance.queue(MINNOW, id1, &queue_ctx)?;

    // Queued at the same timestamp, the second proposal hashes to the same
    // actions and must be rejected wholesale.
    assert!(matches!(
        governance.queue(MINNOW, id2, &queue_ctx),
        Err(GovernanceError::Executor(_))
    ));
    assert_eq!(governance.get_proposal_by_id(id2)?.execution_time, 0);

    // The first proposal's queue entries are untouched and executable.
    let mut dispatcher = RecordingDispatcher::new();
    let execute_ctx = ChainContext::new(end_block + 2, 20_000 + DELAY);
    governance.execute(MINNOW, id1, &execute_ctx, &mut dispatcher)?;
    assert_eq!(dispatcher.calls.len(), 2);
    Ok(())
}

#[test]
fn test_queue_rollback_releases_prefix_entries() -> Result<()> {
    let mut governance = governance();

    // One proposal carries both actions; a second carries only the second
    // action, so their hashes collide at a shared execution time.
    let ctx = ChainContext::new(100, 10_000);
    let full = governance.create(CREATOR, EXECUTOR, actions(), [7u8; 32], &ctx)?;
    let overlap = governance.create(
        CREATOR,
        EXECUTOR,
        vec![actions().remove(1)],
        [8u8; 32],
        &ctx,
    )?;

    let active = ChainContext::new(100 + VOTING_DELAY + 1, 10_100);
    governance.submit_vote(WHALE, full, true, &active)?;
    governance.submit_vote(WHALE, overlap, true, &active)?;

    let end_block = governance.get_proposal_by_id(full)?.end_block;
    let queue_ctx = ChainContext::new(end_block + 1, 20_000);
    governance.queue(MINNOW, overlap, &queue_ctx)?;

    // Queuing the full proposal queues its first action, collides on the
    // second, and must roll the first back out of the executor.
    assert!(matches!(
        governance.queue(MINNOW, full, &queue_ctx),
        Err(GovernanceError::Executor(_))
    ));
    assert_eq!(governance.get_proposal_by_id(full)?.execution_time, 0);

    // Freeing the colliding entry lets the full proposal queue at the same
    // timestamp. A leaked first-action entry would trip the duplicate guard
    // here.
    governance.cancel(GUARDIAN, overlap, &queue_ctx)?;
    governance.queue(MINNOW, full, &queue_ctx)?;
    assert_eq!(
        governance.get_proposal_state(full, &queue_ctx)?,
        ProposalState::Queued
    );

    let mut dispatcher = RecordingDispatcher::new();
    let execute_ctx = ChainContext::new(end_block + 2, 20_000 + DELAY);
    governance.execute(MINNOW, full, &execute_ctx, &mut dispatcher)?;
    assert_eq!(dispatcher.calls, actions());
    Ok(())
}

#[test]
fn test_failed_sub_action_keeps_proposal_retryable() -> Result<()> {
    let mut governance = governance();
    let (id, end_block) = succeeded_proposal(&mut governance)?;

    let queue_ctx = ChainContext::new(end_block + 1, 20_000);
    governance.queue(MINNOW, id, &queue_ctx)?;
    let execution_time = governance.get_proposal_by_id(id)?.execution_time;

    // The second sub-action reverts downstream: the whole call fails and
    // the executed flag is not committed.
    let mut failing = RecordingDispatcher::failing_on("transfer(address,uint256)");
    let execute_ctx = ChainContext::new(end_block + 2, execution_time);
    assert!(matches!(
        governance.execute(MINNOW, id, &execute_ctx, &mut failing),
        Err(GovernanceError::Executor(_))
    ));
    assert!(!governance.get_proposal_by_id(id)?.executed);
    assert_eq!(
        governance.get_proposal_state(id, &execute_ctx)?,
        ProposalState::Queued
    );

    // Retry within the grace window once the downstream condition is fixed.
    let mut healthy = RecordingDispatcher::new();
    let retry_ctx = ChainContext::new(end_block + 3, execution_time + 60);
    governance.execute(MINNOW, id, &retry_ctx, &mut healthy)?;
    assert_eq!(healthy.calls, actions());
    assert!(governance.get_proposal_by_id(id)?.executed);
    Ok(())
}

#[test]
fn test_guardian_cancels_queued_proposal() -> Result<()> {
    let mut governance = governance();
    let (id, end_block) = succeeded_proposal(&mut governance)?;

    let queue_ctx = ChainContext::new(end_block + 1, 20_000);
    governance.queue(MINNOW, id, &queue_ctx)?;

    governance.cancel(GUARDIAN, id, &queue_ctx)?;
    assert_eq!(
        governance.get_proposal_state(id, &queue_ctx)?,
        ProposalState::Cancelled
    );

    // The queued actions were cancelled on the executor: an otherwise
    // identical proposal can queue at the same timestamp without tripping
    // the duplicate guard.
    let ctx = ChainContext::new(end_block + 2, 20_000);
    let id2 = governance.create(CREATOR, EXECUTOR, actions(), [7u8; 32], &ctx)?;
    let active = ChainContext::new(end_block + 2 + VOTING_DELAY + 1, 20_100);
    governance.submit_vote(WHALE, id2, true, &active)?;
    let end2 = governance.get_proposal_by_id(id2)?.end_block;
    let queue2 = ChainContext::new(end2 + 1, 20_000);
    governance.queue(MINNOW, id2, &queue2)?;
    assert_eq!(governance.get_proposal_state(id2, &queue2)?, ProposalState::Queued);
    Ok(())
}
