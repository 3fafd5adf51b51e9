// Voting-power strategy interface consumed by the governance engine.
//
// The strategy is an external collaborator: a deterministic, read-only
// function of chain history. The engine never asks for power "as of now";
// every query is pinned to a historical marker so late power acquisition
// cannot influence an in-flight proposal.

use std::collections::{BTreeMap, HashMap};

use crate::types::Address;

/// Historical snapshot queries for proposition/voting power and supply.
///
/// All four reads are pure over the marker: calling them twice with the
/// same arguments must return the same value.
pub trait VotingPowerOracle {
    /// Identity of this strategy, recorded in governance config and
    /// snapshotted into each proposal at creation.
    fn address(&self) -> Address;

    /// Weight determining eligibility to create or cancel a proposal.
    fn proposition_power_at(&self, account: Address, marker: u64) -> u128;

    /// Weight determining the influence of a cast vote.
    fn voting_power_at(&self, account: Address, marker: u64) -> u128;

    fn total_proposition_supply_at(&self, marker: u64) -> u128;

    fn total_voting_supply_at(&self, marker: u64) -> u128;
}

/// In-memory snapshot strategy backed by block-indexed histories.
///
/// Each account and supply series is a sorted map of (marker, amount);
/// a lookup takes the most recent entry at or before the queried marker,
/// so a value written at block N is visible from N onward. Accounts with
/// no history have zero power.
#[derive(Debug, Default)]
pub struct SnapshotPowerOracle {
    address: Address,
    proposition_power: HashMap<Address, BTreeMap<u64, u128>>,
    voting_power: HashMap<Address, BTreeMap<u64, u128>>,
    total_proposition_supply: BTreeMap<u64, u128>,
    total_voting_supply: BTreeMap<u64, u128>,
}

impl SnapshotPowerOracle {
    pub fn new(address: Address) -> Self {
        SnapshotPowerOracle {
            address,
            proposition_power: HashMap::new(),
            voting_power: HashMap::new(),
            total_proposition_supply: BTreeMap::new(),
            total_voting_supply: BTreeMap::new(),
        }
    }

    /// Record an account's proposition and voting power from `marker` on.
    pub fn set_power(&mut self, account: Address, marker: u64, proposition: u128, voting: u128) {
        self.proposition_power
            .entry(account)
            .or_default()
            .insert(marker, proposition);
        self.voting_power
            .entry(account)
            .or_default()
            .insert(marker, voting);
    }

    /// Record total proposition and voting supply from `marker` on.
    pub fn set_supply(&mut self, marker: u64, proposition: u128, voting: u128) {
        self.total_proposition_supply.insert(marker, proposition);
        self.total_voting_supply.insert(marker, voting);
    }

    fn lookup(series: &BTreeMap<u64, u128>, marker: u64) -> u128 {
        series
            .range(..=marker)
            .next_back()
            .map(|(_, amount)| *amount)
            .unwrap_or(0)
    }

    fn lookup_account(
        table: &HashMap<Address, BTreeMap<u64, u128>>,
        account: Address,
        marker: u64,
    ) -> u128 {
        table
            .get(&account)
            .map(|series| Self::lookup(series, marker))
            .unwrap_or(0)
    }
}

impl VotingPowerOracle for SnapshotPowerOracle {
    fn address(&self) -> Address {
        self.address
    }

    fn proposition_power_at(&self, account: Address, marker: u64) -> u128 {
        Self::lookup_account(&self.proposition_power, account, marker)
    }

    fn voting_power_at(&self, account: Address, marker: u64) -> u128 {
        Self::lookup_account(&self.voting_power, account, marker)
    }

    fn total_proposition_supply_at(&self, marker: u64) -> u128 {
        Self::lookup(&self.total_proposition_supply, marker)
    }

    fn total_voting_supply_at(&self, marker: u64) -> u128 {
        Self::lookup(&self.total_voting_supply, marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_is_zero_before_first_snapshot() {
        let mut oracle = SnapshotPowerOracle::new(Address::from_low_u64(100));
        let voter = Address::from_low_u64(1);
        oracle.set_power(voter, 10, 500, 700);

        assert_eq!(oracle.proposition_power_at(voter, 9), 0);
        assert_eq!(oracle.voting_power_at(voter, 9), 0);
        assert_eq!(oracle.proposition_power_at(voter, 10), 500);
        assert_eq!(oracle.voting_power_at(voter, 10), 700);
    }

    #[test]
    fn test_lookup_takes_most_recent_snapshot() {
        let mut oracle = SnapshotPowerOracle::new(Address::from_low_u64(100));
        let voter = Address::from_low_u64(1);
        oracle.set_power(voter, 10, 500, 500);
        oracle.set_power(voter, 20, 800, 800);

        assert_eq!(oracle.voting_power_at(voter, 15), 500);
        assert_eq!(oracle.voting_power_at(voter, 20), 800);
        assert_eq!(oracle.voting_power_at(voter, 1000), 800);
    }

    #[test]
    fn test_supply_series() {
        let mut oracle = SnapshotPowerOracle::new(Address::from_low_u64(100));
        oracle.set_supply(5, 1_000_000, 1_000_000);
        oracle.set_supply(50, 2_000_000, 2_500_000);

        assert_eq!(oracle.total_proposition_supply_at(4), 0);
        assert_eq!(oracle.total_proposition_supply_at(10), 1_000_000);
        assert_eq!(oracle.total_voting_supply_at(60), 2_500_000);
    }

    #[test]
    fn test_unknown_account_has_no_power() {
        let oracle = SnapshotPowerOracle::new(Address::from_low_u64(100));
        assert_eq!(oracle.voting_power_at(Address::from_low_u64(9), 100), 0);
    }
}
