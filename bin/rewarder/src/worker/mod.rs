mod outcome;
mod reward_worker;

pub use outcome::{FailureStage, OutcomeKind, RewardOutcome};
pub use reward_worker::{RewardWorker, WorkerError, WorkerState};
