// Proposal Lifecycle Manager: owns the proposal registry, drives state
// transitions, records votes, and orchestrates validator and executor calls.
//
// SAFETY INVARIANTS:
// 1. Proposal ids are dense, zero-based, and append-only
// 2. Proposal state is derived from stored fields plus the supplied clock,
//    never stored, so reads without mutation are always consistent
// 3. One vote per (proposal, voter); the vote record itself is the sentinel
// 4. Vote weight is read at the proposal's start marker, never at cast time
// 5. Each proposal pins the strategy captured at creation; later strategy
//    changes never retouch an in-flight proposal
// 6. The executed flag commits only after every sub-action dispatched
// 7. Guardian revocation is a one-way transition to the null identity

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::power_oracle::VotingPowerOracle;
use crate::timelock_executor::{CallDispatcher, ExecutorContract, ExecutorError};
use crate::types::{ActionCall, Address, ChainContext};
use crate::vote_signature::{self, VoteSignatureError};

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("invalid proposal id")]
    InvalidProposalId,

    #[error("a proposal needs at least one action")]
    EmptyTargets,

    #[error("executor is not authorized")]
    ExecutorNotAuthorized,

    #[error("executor is not installed")]
    ExecutorNotInstalled,

    #[error("strategy is not installed")]
    StrategyNotInstalled,

    #[error("proposition power below creation threshold")]
    PropositionPowerTooLow,

    #[error("proposal cannot be cancelled in its current state")]
    CancellationNotAllowed,

    #[error("creator still holds enough proposition power to keep the proposal")]
    NotEnoughPowerToCancel,

    #[error("only succeeded proposals can be queued")]
    InvalidStateForQueue,

    #[error("only queued proposals can be executed")]
    InvalidStateForExecute,

    #[error("voting is not active")]
    VotingClosed,

    #[error("voter already voted on this proposal")]
    VoteAlreadySubmitted,

    #[error("caller is not the owner")]
    OnlyOwner,

    #[error("caller is not the guardian")]
    OnlyGuardian,

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Signature(#[from] VoteSignatureError),
}

/// Derived proposal state. Pure function of stored fields plus the clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProposalState {
    Pending,
    Active,
    Failed,
    Succeeded,
    Queued,
    Executed,
    Expired,
    Cancelled,
}

impl ProposalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "Pending",
            ProposalState::Active => "Active",
            ProposalState::Failed => "Failed",
            ProposalState::Succeeded => "Succeeded",
            ProposalState::Queued => "Queued",
            ProposalState::Executed => "Executed",
            ProposalState::Expired => "Expired",
            ProposalState::Cancelled => "Cancelled",
        }
    }
}

/// A governance proposal. Created once, mutated only by the lifecycle
/// manager in response to cancel/queue/execute/vote, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    /// Dense, zero-based identifier (index into the registry).
    pub id: u64,

    pub creator: Address,

    /// Executor governing this proposal's timelock and thresholds.
    pub executor: Address,

    /// Ordered sub-actions, at least one.
    pub actions: Vec<ActionCall>,

    /// Voting window start marker (block).
    pub start_block: u64,

    /// Voting window end marker (block).
    pub end_block: u64,

    /// Shared execution time; zero until the proposal is queued.
    pub execution_time: u64,

    pub for_votes: u128,

    pub against_votes: u128,

    pub executed: bool,

    pub cancelled: bool,

    /// Strategy captured at creation; pins every power lookup for this
    /// proposal even if the global strategy changes mid-lifecycle.
    pub strategy: Address,

    /// Content-addressed pointer to the off-chain proposal document.
    pub ipfs_hash: [u8; 32],
}

#[cfg(test)]
impl Proposal {
    /// Bare record for rule-engine tests that only need tallies.
    pub(crate) fn empty_for_tests() -> Self {
        Proposal {
            id: 0,
            creator: Address::zero(),
            executor: Address::zero(),
            actions: Vec::new(),
            start_block: 0,
            end_block: 0,
            execution_time: 0,
            for_votes: 0,
            against_votes: 0,
            executed: false,
            cancelled: false,
            strategy: Address::zero(),
            ipfs_hash: [0u8; 32],
        }
    }
}

/// One recorded vote. Created on the voter's first vote for the proposal,
/// immutable thereafter. The presence of the record is the has-voted
/// sentinel, so a zero-power vote still blocks re-voting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vote {
    pub support: bool,

    /// Power at the proposal's start marker, captured at cast time.
    pub voting_power: u128,
}

/// Admin-mutated, process-wide configuration.
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    /// Identity of the current voting-power strategy.
    pub strategy: Address,

    /// Blocks between proposal creation and the start of voting.
    pub voting_delay: u64,

    /// Guardian identity; the null identity once abdicated, permanently.
    pub guardian: Address,

    /// Executor identities eligible for new proposals.
    pub authorized_executors: HashSet<Address>,
}

/// The governance engine.
pub struct Governance {
    /// Own identity: executor admin and the vote domain binding.
    address: Address,

    /// Ownable-admin surface: configuration setters are owner-gated.
    /// Ownership is meant to be handed to an executor so that every
    /// configuration change itself passes through a proposal.
    owner: Address,

    chain_id: u64,

    config: GovernanceConfig,

    /// Installed strategy instances, resolved by identity.
    strategies: HashMap<Address, Arc<dyn VotingPowerOracle>>,

    /// Installed executor instances, resolved by identity.
    executors: HashMap<Address, Box<dyn ExecutorContract>>,

    /// Dense append-only registry; proposal id == index.
    proposals: Vec<Proposal>,

    /// Per-proposal vote records, parallel to `proposals`.
    votes: Vec<HashMap<Address, Vote>>,
}

impl Governance {
    pub fn new(
        address: Address,
        owner: Address,
        guardian: Address,
        chain_id: u64,
        strategy: Arc<dyn VotingPowerOracle>,
        voting_delay: u64,
    ) -> Self {
        let strategy_address = strategy.address();
        let mut strategies: HashMap<Address, Arc<dyn VotingPowerOracle>> = HashMap::new();
        strategies.insert(strategy_address, strategy);

        Governance {
            address,
            owner,
            chain_id,
            config: GovernanceConfig {
                strategy: strategy_address,
                voting_delay,
                guardian,
                authorized_executors: HashSet::new(),
            },
            strategies,
            executors: HashMap::new(),
            proposals: Vec::new(),
            votes: Vec::new(),
        }
    }

    // ---- lifecycle operations -------------------------------------------

    /// Create a proposal. The creator's proposition power is checked at the
    /// block before the call, against the rules of this proposal's executor.
    pub fn create(
        &mut self,
        caller: Address,
        executor: Address,
        actions: Vec<ActionCall>,
        ipfs_hash: [u8; 32],
        ctx: &ChainContext,
    ) -> Result<u64, GovernanceError> {
        if actions.is_empty() {
            return Err(GovernanceError::EmptyTargets);
        }
        if !self.config.authorized_executors.contains(&executor) {
            return Err(GovernanceError::ExecutorNotAuthorized);
        }
        let executor_ref = self
            .executors
            .get(&executor)
            .ok_or(GovernanceError::ExecutorNotInstalled)?;
        let strategy = self
            .strategies
            .get(&self.config.strategy)
            .ok_or(GovernanceError::StrategyNotInstalled)?;

        let snapshot_marker = ctx.block_number.saturating_sub(1);
        if !executor_ref.validate_creator_of_proposal(strategy.as_ref(), caller, snapshot_marker) {
            return Err(GovernanceError::PropositionPowerTooLow);
        }

        let id = self.proposals.len() as u64;
        let start_block = ctx.block_number.saturating_add(self.config.voting_delay);
        let end_block = start_block.saturating_add(executor_ref.voting_duration());

        self.proposals.push(Proposal {
            id,
            creator: caller,
            executor,
            actions,
            start_block,
            end_block,
            execution_time: 0,
            for_votes: 0,
            against_votes: 0,
            executed: false,
            cancelled: false,
            strategy: self.config.strategy,
            ipfs_hash,
        });
        self.votes.push(HashMap::new());

        info!(
            "proposal {} created by {} (executor {}, voting blocks {}-{})",
            id, caller, executor, start_block, end_block
        );
        Ok(id)
    }

    /// Cancel a proposal. Allowed for the guardian, or for anyone once the
    /// creator's proposition power has fallen below the creation threshold.
    pub fn cancel(
        &mut self,
        caller: Address,
        id: u64,
        ctx: &ChainContext,
    ) -> Result<(), GovernanceError> {
        let state = self.get_proposal_state(id, ctx)?;
        if matches!(
            state,
            ProposalState::Executed | ProposalState::Cancelled | ProposalState::Expired
        ) {
            return Err(GovernanceError::CancellationNotAllowed);
        }

        let idx = id as usize;
        let creator = self.proposals[idx].creator;
        let executor_address = self.proposals[idx].executor;
        let strategy_address = self.proposals[idx].strategy;

        let is_guardian = !self.config.guardian.is_zero() && caller == self.config.guardian;
        if !is_guardian {
            let executor = self
                .executors
                .get(&executor_address)
                .ok_or(GovernanceError::ExecutorNotInstalled)?;
            let strategy = self
                .strategies
                .get(&strategy_address)
                .ok_or(GovernanceError::StrategyNotInstalled)?;
            let marker = ctx.block_number.saturating_sub(1);
            if !executor.validate_proposal_cancellation(strategy.as_ref(), creator, marker) {
                return Err(GovernanceError::NotEnoughPowerToCancel);
            }
        }

        let execution_time = self.proposals[idx].execution_time;
        let actions = self.proposals[idx].actions.clone();
        self.proposals[idx].cancelled = true;

        // Best-effort cancel of whatever was already queued. Executor-side
        // failures (e.g. the executor's admin was rotated away through an
        // earlier proposal) must not undo the cancellation itself; leftover
        // queue entries expire with the grace period.
        if execution_time != 0 {
            let governance = self.address;
            if let Some(executor) = self.executors.get_mut(&executor_address) {
                for action in &actions {
                    if let Err(e) = executor.cancel_transaction(governance, action, execution_time)
                    {
                        warn!("proposal {}: executor-side cancel failed: {}", id, e);
                    }
                }
            }
        }

        info!("proposal {} cancelled by {}", id, caller);
        Ok(())
    }

    /// Queue a succeeded proposal: every sub-action is queued at one shared
    /// execution time, all-or-nothing.
    pub fn queue(
        &mut self,
        caller: Address,
        id: u64,
        ctx: &ChainContext,
    ) -> Result<(), GovernanceError> {
        let state = self.get_proposal_state(id, ctx)?;
        if state != ProposalState::Succeeded {
            return Err(GovernanceError::InvalidStateForQueue);
        }

        let idx = id as usize;
        let executor_address = self.proposals[idx].executor;
        let actions = self.proposals[idx].actions.clone();
        let governance = self.address;

        let executor = self
            .executors
            .get_mut(&executor_address)
            .ok_or(GovernanceError::ExecutorNotInstalled)?;
        let execution_time = ctx.timestamp.saturating_add(executor.delay());

        for (queued, action) in actions.iter().enumerate() {
            if let Err(e) = executor.queue_transaction(governance, action, execution_time, ctx) {
                warn!("proposal {}: queue failed on action {}: {}", id, queued, e);
                // Roll back the prefix queued so far: all-or-nothing.
                for earlier in &actions[..queued] {
                    let _ = executor.cancel_transaction(governance, earlier, execution_time);
                }
                return Err(e.into());
            }
        }

        self.proposals[idx].execution_time = execution_time;
        info!(
            "proposal {} queued by {} for execution at {}",
            id, caller, execution_time
        );
        Ok(())
    }

    /// Execute a queued proposal. Every sub-action is dispatched in array
    /// order; any failure fails the whole call with the queue restored, and
    /// the executed flag commits only after full success.
    pub fn execute(
        &mut self,
        caller: Address,
        id: u64,
        ctx: &ChainContext,
        dispatcher: &mut dyn CallDispatcher,
    ) -> Result<(), GovernanceError> {
        let state = self.get_proposal_state(id, ctx)?;
        if state != ProposalState::Queued {
            return Err(GovernanceError::InvalidStateForExecute);
        }

        let idx = id as usize;
        let executor_address = self.proposals[idx].executor;
        let actions = self.proposals[idx].actions.clone();
        let execution_time = self.proposals[idx].execution_time;
        let governance = self.address;

        let executor = self
            .executors
            .get_mut(&executor_address)
            .ok_or(GovernanceError::ExecutorNotInstalled)?;
        executor.execute_batch(governance, &actions, execution_time, ctx, dispatcher)?;

        self.proposals[idx].executed = true;
        info!("proposal {} executed by {}", id, caller);
        Ok(())
    }

    /// Cast a direct vote. Only valid while the proposal is Active; weight
    /// is the voter's power at the proposal's start marker.
    pub fn submit_vote(
        &mut self,
        caller: Address,
        id: u64,
        support: bool,
        ctx: &ChainContext,
    ) -> Result<(), GovernanceError> {
        self.vote_on_proposal(caller, id, support, ctx)
    }

    /// Cast a vote signed off-line. The signer identity is derived from the
    /// verified public key and then follows the direct-vote path.
    pub fn submit_vote_by_signature(
        &mut self,
        id: u64,
        support: bool,
        public_key: &[u8; 32],
        signature: &[u8; 64],
        ctx: &ChainContext,
    ) -> Result<(), GovernanceError> {
        let voter = vote_signature::verify_vote_signature(
            self.chain_id,
            self.address,
            id,
            support,
            public_key,
            signature,
        )?;
        self.vote_on_proposal(voter, id, support, ctx)
    }

    fn vote_on_proposal(
        &mut self,
        voter: Address,
        id: u64,
        support: bool,
        ctx: &ChainContext,
    ) -> Result<(), GovernanceError> {
        if self.get_proposal_state(id, ctx)? != ProposalState::Active {
            return Err(GovernanceError::VotingClosed);
        }

        let idx = id as usize;
        if self.votes[idx].contains_key(&voter) {
            return Err(GovernanceError::VoteAlreadySubmitted);
        }

        let start_block = self.proposals[idx].start_block;
        let strategy_address = self.proposals[idx].strategy;
        let voting_power = self
            .strategies
            .get(&strategy_address)
            .ok_or(GovernanceError::StrategyNotInstalled)?
            .voting_power_at(voter, start_block);

        let proposal = &mut self.proposals[idx];
        if support {
            proposal.for_votes = proposal.for_votes.saturating_add(voting_power);
        } else {
            proposal.against_votes = proposal.against_votes.saturating_add(voting_power);
        }
        self.votes[idx].insert(
            voter,
            Vote {
                support,
                voting_power,
            },
        );

        info!(
            "vote on proposal {}: voter {}, support {}, power {}",
            id, voter, support, voting_power
        );
        Ok(())
    }

    // ---- configuration --------------------------------------------------

    /// Install an executor instance so its identity can be resolved.
    /// Installation alone does not authorize it for new proposals.
    pub fn install_executor(
        &mut self,
        caller: Address,
        executor: Box<dyn ExecutorContract>,
    ) -> Result<(), GovernanceError> {
        self.only_owner(caller)?;
        let address = executor.executor_address();
        self.executors.insert(address, executor);
        info!("executor {} installed", address);
        Ok(())
    }

    /// Install a strategy instance so its identity can be resolved, without
    /// making it the active strategy.
    pub fn install_strategy(
        &mut self,
        caller: Address,
        strategy: Arc<dyn VotingPowerOracle>,
    ) -> Result<(), GovernanceError> {
        self.only_owner(caller)?;
        let address = strategy.address();
        self.strategies.insert(address, strategy);
        info!("strategy {} installed", address);
        Ok(())
    }

    /// Install and activate a new voting-power strategy. In-flight
    /// proposals keep the strategy they pinned at creation.
    pub fn set_governance_strategy(
        &mut self,
        caller: Address,
        strategy: Arc<dyn VotingPowerOracle>,
    ) -> Result<(), GovernanceError> {
        self.only_owner(caller)?;
        let address = strategy.address();
        self.strategies.insert(address, strategy);
        self.config.strategy = address;
        info!("governance strategy set to {}", address);
        Ok(())
    }

    pub fn set_voting_delay(
        &mut self,
        caller: Address,
        voting_delay: u64,
    ) -> Result<(), GovernanceError> {
        self.only_owner(caller)?;
        self.config.voting_delay = voting_delay;
        info!("voting delay set to {}", voting_delay);
        Ok(())
    }

    /// Authorize executor identities for new proposals. Idempotent.
    pub fn authorize_executors(
        &mut self,
        caller: Address,
        executors: Vec<Address>,
    ) -> Result<(), GovernanceError> {
        self.only_owner(caller)?;
        for executor in executors {
            self.config.authorized_executors.insert(executor);
            info!("executor {} authorized", executor);
        }
        Ok(())
    }

    /// Revoke executor identities for new proposals. Idempotent; in-flight
    /// proposals keep their executor.
    pub fn unauthorize_executors(
        &mut self,
        caller: Address,
        executors: Vec<Address>,
    ) -> Result<(), GovernanceError> {
        self.only_owner(caller)?;
        for executor in executors {
            self.config.authorized_executors.remove(&executor);
            info!("executor {} unauthorized", executor);
        }
        Ok(())
    }

    /// Hand ownership over, typically to an executor so that further
    /// configuration changes must pass through a proposal.
    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), GovernanceError> {
        self.only_owner(caller)?;
        self.owner = new_owner;
        info!("ownership transferred to {}", new_owner);
        Ok(())
    }

    /// Irreversibly null the guardian identity.
    pub fn abdicate(&mut self, caller: Address) -> Result<(), GovernanceError> {
        if self.config.guardian.is_zero() || caller != self.config.guardian {
            return Err(GovernanceError::OnlyGuardian);
        }
        self.config.guardian = Address::zero();
        warn!("guardian abdicated; guardian powers are gone permanently");
        Ok(())
    }

    fn only_owner(&self, caller: Address) -> Result<(), GovernanceError> {
        if caller != self.owner {
            return Err(GovernanceError::OnlyOwner);
        }
        Ok(())
    }

    // ---- read surface ----------------------------------------------------

    /// Derive the proposal's current state. Strict order, first match wins.
    pub fn get_proposal_state(
        &self,
        id: u64,
        ctx: &ChainContext,
    ) -> Result<ProposalState, GovernanceError> {
        let proposal = self
            .proposals
            .get(id as usize)
            .ok_or(GovernanceError::InvalidProposalId)?;
        let executor = self
            .executors
            .get(&proposal.executor)
            .ok_or(GovernanceError::ExecutorNotInstalled)?;
        let strategy = self
            .strategies
            .get(&proposal.strategy)
            .ok_or(GovernanceError::StrategyNotInstalled)?;

        let state = if proposal.cancelled {
            ProposalState::Cancelled
        } else if ctx.block_number <= proposal.start_block {
            ProposalState::Pending
        } else if ctx.block_number <= proposal.end_block {
            ProposalState::Active
        } else if !executor.is_proposal_passed(strategy.as_ref(), proposal) {
            ProposalState::Failed
        } else if proposal.execution_time == 0 {
            ProposalState::Succeeded
        } else if proposal.executed {
            ProposalState::Executed
        } else if executor.is_proposal_over_grace_period(proposal, ctx) {
            ProposalState::Expired
        } else {
            ProposalState::Queued
        };
        Ok(state)
    }

    pub fn get_proposal_by_id(&self, id: u64) -> Result<&Proposal, GovernanceError> {
        self.proposals
            .get(id as usize)
            .ok_or(GovernanceError::InvalidProposalId)
    }

    pub fn get_vote_on_proposal(
        &self,
        id: u64,
        voter: Address,
    ) -> Result<Option<Vote>, GovernanceError> {
        let votes = self
            .votes
            .get(id as usize)
            .ok_or(GovernanceError::InvalidProposalId)?;
        Ok(votes.get(&voter).copied())
    }

    pub fn get_proposals_count(&self) -> u64 {
        self.proposals.len() as u64
    }

    pub fn is_executor_authorized(&self, executor: Address) -> bool {
        self.config.authorized_executors.contains(&executor)
    }

    pub fn get_guardian(&self) -> Address {
        self.config.guardian
    }

    pub fn get_voting_delay(&self) -> u64 {
        self.config.voting_delay
    }

    pub fn get_governance_strategy(&self) -> Address {
        self.config.strategy
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn governance_address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}
