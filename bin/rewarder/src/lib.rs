//! Automatic per-round reward claiming for a staked protocol participant.
//!
//! `RewardWorker` drives the claim/confirm/replace sequence; the `chain`
//! module holds its collaborators and the alloy-backed implementations used
//! by the `rewarder` binary.

pub mod chain;
pub mod config;
pub mod metrics;
pub mod worker;

pub use worker::{FailureStage, OutcomeKind, RewardOutcome, RewardWorker, WorkerError, WorkerState};
