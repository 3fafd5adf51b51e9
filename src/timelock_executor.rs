// Timelocked execution of governance-approved actions.
//
// SAFETY INVARIANTS:
// 1. Every queued action is keyed by a deterministic content hash
// 2. An identical action hash can never be queued twice
// 3. Execution happens no earlier than execution_time and no later than
//    execution_time + grace_period
// 4. A queue entry is consumed before its call is dispatched
// 5. Only the admin drives queue/cancel/execute; admin handover is two-step
// 6. The delay can only be changed by a call the executor itself dispatches

use std::collections::HashSet;
use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::governance_core::Proposal;
use crate::power_oracle::VotingPowerOracle;
use crate::proposal_validator::ProposalValidator;
use crate::types::{ActionCall, Address, ChainContext};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("caller is not the admin")]
    OnlyAdmin,

    #[error("caller is not the pending admin")]
    OnlyPendingAdmin,

    #[error("delay can only be changed by the executor itself")]
    OnlyExecutorItself,

    #[error("delay outside [minimum, maximum] bounds")]
    DelayOutOfBounds,

    #[error("execution time is earlier than now + delay")]
    ExecutionTimeUnderestimated,

    #[error("action is already queued")]
    DuplicateAction,

    #[error("action is not queued")]
    ActionNotQueued,

    #[error("timelock has not finished")]
    TimelockNotFinished,

    #[error("grace period is over")]
    GracePeriodOver,

    #[error("dispatched call failed: {0}")]
    ExecutionFailed(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Content hash of a queued action: SHA-256 over the bincode encoding of
/// (target, value, signature, data, execution_time, with_delegate_call).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActionHash(pub [u8; 32]);

impl ActionHash {
    pub fn of(action: &ActionCall, execution_time: u64) -> Result<Self, ExecutorError> {
        let serialized = bincode::serialize(&(
            action.target,
            action.value,
            &action.signature,
            &action.data,
            execution_time,
            action.with_delegate_call,
        ))
        .map_err(|e| ExecutorError::SerializationError(e.to_string()))?;

        let digest = Sha256::digest(&serialized);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(ActionHash(out))
    }
}

impl fmt::Display for ActionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Boundary through which the executor performs arbitrary external calls.
/// The production dispatcher is the runtime's concern; tests use a
/// recording mock. A dispatcher is expected to apply the calls of one
/// `execute` invocation transactionally, matching the serialized-ledger
/// execution model.
pub trait CallDispatcher {
    /// Perform the call (delegated or direct per the flag, forwarding the
    /// value) and return its output.
    fn dispatch(&mut self, call: &ActionCall) -> Result<Vec<u8>, String>;
}

/// Contract surface the lifecycle manager programs against. Each executor
/// instance carries its own timelock parameters and validation thresholds,
/// so distinct executors can gate proposals with distinct rules.
pub trait ExecutorContract {
    fn executor_address(&self) -> Address;

    fn admin(&self) -> Address;

    /// Seconds between queueing and earliest execution.
    fn delay(&self) -> u64;

    /// Seconds after execution_time during which the action stays
    /// executable.
    fn grace_period(&self) -> u64;

    /// Length of the voting window, in blocks, for proposals routed to
    /// this executor.
    fn voting_duration(&self) -> u64;

    fn is_action_queued(&self, hash: &ActionHash) -> bool;

    /// True once the proposal's shared execution time plus the grace
    /// period lies in the past.
    fn is_proposal_over_grace_period(&self, proposal: &Proposal, ctx: &ChainContext) -> bool;

    /// Queue one action at `execution_time`. Admin-only; rejects an
    /// execution time closer than the delay and an already queued hash.
    fn queue_transaction(
        &mut self,
        caller: Address,
        action: &ActionCall,
        execution_time: u64,
        ctx: &ChainContext,
    ) -> Result<ActionHash, ExecutorError>;

    /// Best-effort cancel: admin-only, succeeds whether or not the action
    /// was queued.
    fn cancel_transaction(
        &mut self,
        caller: Address,
        action: &ActionCall,
        execution_time: u64,
    ) -> Result<ActionHash, ExecutorError>;

    /// Execute one queued action. The queue entry is consumed before the
    /// call is dispatched; a dispatch failure restores the entry and fails
    /// the whole operation.
    fn execute_transaction(
        &mut self,
        caller: Address,
        action: &ActionCall,
        execution_time: u64,
        ctx: &ChainContext,
        dispatcher: &mut dyn CallDispatcher,
    ) -> Result<Vec<u8>, ExecutorError>;

    /// Execute a batch of queued actions sharing one execution time,
    /// all-or-nothing: every hash is consumed before the first dispatch,
    /// and any dispatch failure restores every hash.
    fn execute_batch(
        &mut self,
        caller: Address,
        actions: &[ActionCall],
        execution_time: u64,
        ctx: &ChainContext,
        dispatcher: &mut dyn CallDispatcher,
    ) -> Result<Vec<Vec<u8>>, ExecutorError>;

    fn validate_creator_of_proposal(
        &self,
        oracle: &dyn VotingPowerOracle,
        user: Address,
        marker: u64,
    ) -> bool;

    fn validate_proposal_cancellation(
        &self,
        oracle: &dyn VotingPowerOracle,
        user: Address,
        marker: u64,
    ) -> bool;

    fn is_proposal_passed(&self, oracle: &dyn VotingPowerOracle, proposal: &Proposal) -> bool;
}

/// Timelocked executor: holds the admin identity, the delay parameters, the
/// set of queued action hashes, and the validation thresholds applied to
/// proposals routed through it.
pub struct TimelockedExecutor {
    address: Address,
    admin: Address,
    pending_admin: Option<Address>,
    delay: u64,
    grace_period: u64,
    minimum_delay: u64,
    maximum_delay: u64,
    validator: ProposalValidator,
    queued_transactions: HashSet<ActionHash>,
}

impl TimelockedExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        admin: Address,
        delay: u64,
        grace_period: u64,
        minimum_delay: u64,
        maximum_delay: u64,
        validator: ProposalValidator,
    ) -> Result<Self, ExecutorError> {
        if delay < minimum_delay || delay > maximum_delay {
            return Err(ExecutorError::DelayOutOfBounds);
        }

        Ok(TimelockedExecutor {
            address,
            admin,
            pending_admin: None,
            delay,
            grace_period,
            minimum_delay,
            maximum_delay,
            validator,
            queued_transactions: HashSet::new(),
        })
    }

    pub fn pending_admin(&self) -> Option<Address> {
        self.pending_admin
    }

    pub fn minimum_delay(&self) -> u64 {
        self.minimum_delay
    }

    pub fn maximum_delay(&self) -> u64 {
        self.maximum_delay
    }

    pub fn validator(&self) -> &ProposalValidator {
        &self.validator
    }

    /// First half of the admin handover: only the current admin may
    /// nominate a successor.
    pub fn set_pending_admin(
        &mut self,
        caller: Address,
        new_admin: Address,
    ) -> Result<(), ExecutorError> {
        if caller != self.admin {
            return Err(ExecutorError::OnlyAdmin);
        }
        self.pending_admin = Some(new_admin);
        info!("executor {}: pending admin set to {}", self.address, new_admin);
        Ok(())
    }

    /// Second half of the handover: the nominated admin claims the role.
    pub fn accept_admin(&mut self, caller: Address) -> Result<(), ExecutorError> {
        if self.pending_admin != Some(caller) {
            return Err(ExecutorError::OnlyPendingAdmin);
        }
        self.admin = caller;
        self.pending_admin = None;
        info!("executor {}: admin handover completed to {}", self.address, caller);
        Ok(())
    }

    /// Change the delay. Only a call the executor itself dispatches may do
    /// this, so delay changes must pass through governance.
    pub fn set_delay(&mut self, caller: Address, new_delay: u64) -> Result<(), ExecutorError> {
        if caller != self.address {
            return Err(ExecutorError::OnlyExecutorItself);
        }
        if new_delay < self.minimum_delay || new_delay > self.maximum_delay {
            return Err(ExecutorError::DelayOutOfBounds);
        }
        self.delay = new_delay;
        info!("executor {}: delay set to {}", self.address, new_delay);
        Ok(())
    }

    fn require_admin(&self, caller: Address) -> Result<(), ExecutorError> {
        if caller != self.admin {
            return Err(ExecutorError::OnlyAdmin);
        }
        Ok(())
    }

    fn check_execution_window(
        &self,
        execution_time: u64,
        ctx: &ChainContext,
    ) -> Result<(), ExecutorError> {
        if ctx.timestamp < execution_time {
            return Err(ExecutorError::TimelockNotFinished);
        }
        if ctx.timestamp > execution_time.saturating_add(self.grace_period) {
            return Err(ExecutorError::GracePeriodOver);
        }
        Ok(())
    }
}

impl ExecutorContract for TimelockedExecutor {
    fn executor_address(&self) -> Address {
        self.address
    }

    fn admin(&self) -> Address {
        self.admin
    }

    fn delay(&self) -> u64 {
        self.delay
    }

    fn grace_period(&self) -> u64 {
        self.grace_period
    }

    fn voting_duration(&self) -> u64 {
        self.validator.voting_duration
    }

    fn is_action_queued(&self, hash: &ActionHash) -> bool {
        self.queued_transactions.contains(hash)
    }

    fn is_proposal_over_grace_period(&self, proposal: &Proposal, ctx: &ChainContext) -> bool {
        ctx.timestamp > proposal.execution_time.saturating_add(self.grace_period)
    }

    fn queue_transaction(
        &mut self,
        caller: Address,
        action: &ActionCall,
        execution_time: u64,
        ctx: &ChainContext,
    ) -> Result<ActionHash, ExecutorError> {
        self.require_admin(caller)?;

        if execution_time < ctx.timestamp.saturating_add(self.delay) {
            return Err(ExecutorError::ExecutionTimeUnderestimated);
        }

        let hash = ActionHash::of(action, execution_time)?;
        if !self.queued_transactions.insert(hash) {
            return Err(ExecutorError::DuplicateAction);
        }

        info!(
            "executor {}: queued action {} on {} at execution time {}",
            self.address, hash, action.target, execution_time
        );
        Ok(hash)
    }

    fn cancel_transaction(
        &mut self,
        caller: Address,
        action: &ActionCall,
        execution_time: u64,
    ) -> Result<ActionHash, ExecutorError> {
        self.require_admin(caller)?;

        let hash = ActionHash::of(action, execution_time)?;
        if self.queued_transactions.remove(&hash) {
            info!("executor {}: cancelled action {}", self.address, hash);
        }
        Ok(hash)
    }

    fn execute_transaction(
        &mut self,
        caller: Address,
        action: &ActionCall,
        execution_time: u64,
        ctx: &ChainContext,
        dispatcher: &mut dyn CallDispatcher,
    ) -> Result<Vec<u8>, ExecutorError> {
        self.require_admin(caller)?;

        let hash = ActionHash::of(action, execution_time)?;
        if !self.queued_transactions.contains(&hash) {
            return Err(ExecutorError::ActionNotQueued);
        }
        self.check_execution_window(execution_time, ctx)?;

        // Consume the queue entry before dispatching.
        self.queued_transactions.remove(&hash);

        match dispatcher.dispatch(action) {
            Ok(output) => {
                info!("executor {}: executed action {}", self.address, hash);
                Ok(output)
            }
            Err(reason) => {
                warn!("executor {}: action {} failed: {}", self.address, hash, reason);
                self.queued_transactions.insert(hash);
                Err(ExecutorError::ExecutionFailed(reason))
            }
        }
    }

    fn execute_batch(
        &mut self,
        caller: Address,
        actions: &[ActionCall],
        execution_time: u64,
        ctx: &ChainContext,
        dispatcher: &mut dyn CallDispatcher,
    ) -> Result<Vec<Vec<u8>>, ExecutorError> {
        self.require_admin(caller)?;
        self.check_execution_window(execution_time, ctx)?;

        // Consume every entry before the first dispatch. A miss (including
        // an action repeated within the batch) restores the consumed prefix
        // and fails the whole call.
        let mut hashes = Vec::with_capacity(actions.len());
        for action in actions {
            let hash = ActionHash::of(action, execution_time)?;
            if !self.queued_transactions.remove(&hash) {
                for restored in &hashes {
                    self.queued_transactions.insert(*restored);
                }
                return Err(ExecutorError::ActionNotQueued);
            }
            hashes.push(hash);
        }

        let mut outputs = Vec::with_capacity(actions.len());
        for (action, hash) in actions.iter().zip(&hashes) {
            match dispatcher.dispatch(action) {
                Ok(output) => {
                    info!("executor {}: executed action {}", self.address, hash);
                    outputs.push(output);
                }
                Err(reason) => {
                    warn!(
                        "executor {}: batch failed at action {}: {}",
                        self.address, hash, reason
                    );
                    // Restore the full batch so the whole operation has no
                    // net effect and can be retried within the grace window.
                    for restored in &hashes {
                        self.queued_transactions.insert(*restored);
                    }
                    return Err(ExecutorError::ExecutionFailed(reason));
                }
            }
        }

        Ok(outputs)
    }

    fn validate_creator_of_proposal(
        &self,
        oracle: &dyn VotingPowerOracle,
        user: Address,
        marker: u64,
    ) -> bool {
        self.validator.validate_creator_of_proposal(oracle, user, marker)
    }

    fn validate_proposal_cancellation(
        &self,
        oracle: &dyn VotingPowerOracle,
        user: Address,
        marker: u64,
    ) -> bool {
        self.validator.validate_proposal_cancellation(oracle, user, marker)
    }

    fn is_proposal_passed(&self, oracle: &dyn VotingPowerOracle, proposal: &Proposal) -> bool {
        self.validator.is_proposal_passed(oracle, proposal)
    }
}
