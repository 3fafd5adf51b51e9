// Proposal validation rules: creation eligibility, cancellation
// eligibility, and pass/fail determination.
//
// SAFETY INVARIANTS:
// 1. The validator is stateless: every check is a pure read over the oracle
// 2. Thresholds are fixed at construction and never mutated
// 3. Quorum and differential are measured against total voting supply,
//    so abstention counts against passage
// 4. Zero total supply always evaluates to "not reached"

use serde::{Deserialize, Serialize};

use crate::governance_core::Proposal;
use crate::power_oracle::VotingPowerOracle;
use crate::types::{Address, PRECISION};

/// Stateless rule engine gating proposal creation, cancellation, and
/// passage. All percentage parameters are expressed in hundredths of a
/// percent (PRECISION units, 10_000 == 100.00%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalValidator {
    /// Minimum fraction of total proposition supply a creator must hold.
    pub proposition_threshold: u128,

    /// Length of the voting window in blocks.
    pub voting_duration: u64,

    /// Minimum margin of for-votes over against-votes, as a fraction of
    /// total voting supply.
    pub vote_differential: u128,

    /// Minimum fraction of total voting supply that must vote in favor.
    pub minimum_quorum: u128,
}

impl ProposalValidator {
    pub fn new(
        proposition_threshold: u128,
        voting_duration: u64,
        vote_differential: u128,
        minimum_quorum: u128,
    ) -> Self {
        ProposalValidator {
            proposition_threshold,
            voting_duration,
            vote_differential,
            minimum_quorum,
        }
    }

    /// True iff `user` holds enough proposition power at `marker` to create
    /// a proposal. Callers evaluate this at the block before the creation
    /// call to rule out same-block power manipulation.
    pub fn validate_creator_of_proposal(
        &self,
        oracle: &dyn VotingPowerOracle,
        user: Address,
        marker: u64,
    ) -> bool {
        self.is_proposition_power_enough(oracle, user, marker)
    }

    /// True iff the creator's proposition power has fallen below the
    /// creation threshold. Cancellation without the guardian is only valid
    /// once the creator no longer qualifies.
    pub fn validate_proposal_cancellation(
        &self,
        oracle: &dyn VotingPowerOracle,
        user: Address,
        marker: u64,
    ) -> bool {
        !self.is_proposition_power_enough(oracle, user, marker)
    }

    pub fn is_proposition_power_enough(
        &self,
        oracle: &dyn VotingPowerOracle,
        user: Address,
        marker: u64,
    ) -> bool {
        oracle.proposition_power_at(user, marker)
            >= self.min_proposition_power_needed(oracle, marker)
    }

    /// Minimum proposition power required at `marker`.
    pub fn min_proposition_power_needed(
        &self,
        oracle: &dyn VotingPowerOracle,
        marker: u64,
    ) -> u128 {
        oracle.total_proposition_supply_at(marker) * self.proposition_threshold / PRECISION
    }

    /// Quorum: for-votes must reach `minimum_quorum` of the total voting
    /// supply at the proposal's start marker.
    pub fn is_quorum_valid(&self, oracle: &dyn VotingPowerOracle, proposal: &Proposal) -> bool {
        let supply = oracle.total_voting_supply_at(proposal.start_block);
        if supply == 0 {
            return false;
        }
        proposal.for_votes >= supply * self.minimum_quorum / PRECISION
    }

    /// Differential: the for-share must exceed the against-share by at
    /// least `vote_differential`, both shares measured against total voting
    /// supply at the start marker.
    pub fn is_vote_differential_valid(
        &self,
        oracle: &dyn VotingPowerOracle,
        proposal: &Proposal,
    ) -> bool {
        let supply = oracle.total_voting_supply_at(proposal.start_block);
        if supply == 0 {
            return false;
        }
        let for_share = proposal.for_votes * PRECISION / supply;
        let against_share = proposal.against_votes * PRECISION / supply;
        for_share >= against_share.saturating_add(self.vote_differential)
    }

    /// A proposal passes iff both quorum and differential are reached.
    pub fn is_proposal_passed(&self, oracle: &dyn VotingPowerOracle, proposal: &Proposal) -> bool {
        self.is_quorum_valid(oracle, proposal) && self.is_vote_differential_valid(oracle, proposal)
    }
}
