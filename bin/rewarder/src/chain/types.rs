use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use std::fmt;

/// Protocol round number
pub type RoundNumber = u64;

/// Trigger published when a new round has been initialized
///
/// The worker treats it as opaque. `observed_round` is whatever the publisher
/// saw and is only used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundEvent {
    pub observed_round: Option<RoundNumber>,
    pub received_at: DateTime<Utc>,
}

impl RoundEvent {
    pub fn new() -> Self {
        Self {
            observed_round: None,
            received_at: Utc::now(),
        }
    }

    pub fn for_round(round: RoundNumber) -> Self {
        Self {
            observed_round: Some(round),
            received_at: Utc::now(),
        }
    }
}

impl Default for RoundEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// Reward-relevant slice of the participant's on-chain record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantStatus {
    pub active: bool,
    pub last_reward_round: RoundNumber,
}

impl ParticipantStatus {
    /// Whether a reward can still be claimed for `current_round`
    pub fn can_claim(&self, current_round: RoundNumber) -> bool {
        self.active && self.last_reward_round < current_round
    }
}

/// Per-round earnings bookkeeping, consulted for monitoring only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EarningsPool {
    pub total_stake: U256,
    pub reward_cut: U256,
    pub fee_share: U256,
    pub cumulative_reward_factor: U256,
    pub cumulative_fee_factor: U256,
}

/// A transaction sent to the chain and not yet known to be mined
///
/// Holds everything needed to rebuild it at the same nonce with higher fees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: B256,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub input: Bytes,
}

impl fmt::Display for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (nonce={}, max_fee={}, priority_fee={})",
            self.hash, self.nonce, self.max_fee_per_gas, self.max_priority_fee_per_gas
        )
    }
}

/// Saturating conversion for round numbers read from uint256 contract fields
pub fn round_from_u256(value: U256) -> RoundNumber {
    u64::try_from(value).unwrap_or(u64::MAX)
}
