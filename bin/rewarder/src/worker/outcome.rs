use crate::chain::{EarningsPool, RoundNumber};
use alloy_primitives::B256;
use std::fmt;
use std::time::Duration;

/// Step of the claim sequence an attempt failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    Submit,
    Confirm,
    Replace,
    ConfirmReplacement,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Submit => write!(f, "submit"),
            FailureStage::Confirm => write!(f, "confirm"),
            FailureStage::Replace => write!(f, "replace"),
            FailureStage::ConfirmReplacement => write!(f, "confirm_replacement"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Reward transaction mined successfully
    Claimed {
        tx_hash: B256,
        /// The mined transaction is the replacement, not the original
        replaced: bool,
        /// Bookkeeping for the claimed round, when the lookup succeeded
        earnings_pool: Option<EarningsPool>,
    },
    /// Attempt aborted
    Failed { stage: FailureStage, error: String },
}

/// Terminal notification of one claim attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardOutcome {
    pub round: RoundNumber,
    pub elapsed: Duration,
    pub kind: OutcomeKind,
}

impl RewardOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self.kind, OutcomeKind::Claimed { .. })
    }

    pub fn failure_stage(&self) -> Option<FailureStage> {
        match &self.kind {
            OutcomeKind::Failed { stage, .. } => Some(*stage),
            OutcomeKind::Claimed { .. } => None,
        }
    }
}

impl fmt::Display for RewardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OutcomeKind::Claimed { tx_hash, replaced, .. } => write!(
                f,
                "Reward[round={}, claimed tx={}, replaced={}, elapsed_ms={}]",
                self.round,
                tx_hash,
                replaced,
                self.elapsed.as_millis()
            ),
            OutcomeKind::Failed { stage, error } => write!(
                f,
                "Reward[round={}, failed at {}: {}, elapsed_ms={}]",
                self.round,
                stage,
                error,
                self.elapsed.as_millis()
            ),
        }
    }
}
