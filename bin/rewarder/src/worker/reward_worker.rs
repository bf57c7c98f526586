//! Reward claim worker
//!
//! Listens for new rounds and claims the participant's reward once per round.
//!
//! Flow per round:
//! 1. Check eligibility (active, reward not yet claimed for the current round)
//! 2. Submit the reward transaction
//! 3. Wait for confirmation
//! 4. On a confirmation timeout, replace the transaction once and wait again
//! 5. If the replacement path fails, count the original if it was mined late
//!
//! Every attempt that gets past the eligibility check ends in exactly one
//! `RewardOutcome`.

use super::outcome::{FailureStage, OutcomeKind, RewardOutcome};
use crate::chain::{
    ChainClient, ChainError, ConfirmError, PendingTx, RoundEvent, RoundEventSource, RoundNumber,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Errors returned by worker lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// `start` called while the worker is running
    AlreadyRunning,
    /// `stop` called while the worker is idle
    NotRunning,
    /// The round subscription ended with an error
    Subscription(ChainError),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::AlreadyRunning => write!(f, "Reward worker already running"),
            WorkerError::NotRunning => write!(f, "Reward worker not running"),
            WorkerError::Subscription(e) => write!(f, "Reward worker stopped by subscription failure: {}", e),
        }
    }
}

impl std::error::Error for WorkerError {}

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
}

enum Lifecycle {
    Idle,
    Running {
        run_id: u64,
        cancel: CancellationToken,
        /// Resolves once the loop of this run has exited
        stopped: oneshot::Receiver<()>,
    },
}

/// Claims the per-round reward on behalf of the local participant
pub struct RewardWorker<C, S>
where
    C: ChainClient,
    S: RoundEventSource,
{
    client: Arc<C>,
    rounds: Arc<S>,
    lifecycle: Mutex<Lifecycle>,
    next_run_id: AtomicU64,
    /// Held for the whole claim sequence of a round
    attempt_lock: tokio::sync::Mutex<()>,
    outcome_tx: Option<mpsc::UnboundedSender<RewardOutcome>>,
}

impl<C, S> RewardWorker<C, S>
where
    C: ChainClient + 'static,
    S: RoundEventSource + 'static,
{
    pub fn new(client: Arc<C>, rounds: Arc<S>) -> Self {
        Self {
            client,
            rounds,
            lifecycle: Mutex::new(Lifecycle::Idle),
            next_run_id: AtomicU64::new(1),
            attempt_lock: tokio::sync::Mutex::new(()),
            outcome_tx: None,
        }
    }

    /// Forward every attempt outcome to `sink`
    pub fn with_outcome_sink(mut self, sink: mpsc::UnboundedSender<RewardOutcome>) -> Self {
        self.outcome_tx = Some(sink);
        self
    }

    pub fn state(&self) -> WorkerState {
        match *self.lifecycle.lock() {
            Lifecycle::Idle => WorkerState::Idle,
            Lifecycle::Running { .. } => WorkerState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Run the worker until `token` (or `stop`) cancels it.
    ///
    /// Meant to be spawned as its own task. Fails immediately with
    /// `AlreadyRunning` if a run is active. Resolves with `Ok(())` after a
    /// cancellation, or with `Subscription` if the round feed failed. The
    /// worker is idle again in both cases.
    pub async fn start(&self, token: CancellationToken) -> Result<(), WorkerError> {
        let (run_id, cancel, stopped_tx) = {
            let mut lifecycle = self.lifecycle.lock();
            if let Lifecycle::Running { .. } = *lifecycle {
                return Err(WorkerError::AlreadyRunning);
            }

            let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
            let cancel = token.child_token();
            let (stopped_tx, stopped_rx) = oneshot::channel();
            *lifecycle = Lifecycle::Running {
                run_id,
                cancel: cancel.clone(),
                stopped: stopped_rx,
            };
            (run_id, cancel, stopped_tx)
        };

        tracing::info!(run_id, "🚀 Reward worker started");

        let result = self.run_loop(&cancel).await;

        {
            let mut lifecycle = self.lifecycle.lock();
            if let Lifecycle::Running { run_id: current, .. } = *lifecycle {
                // stop() already reset the state if it no longer matches this run
                if current == run_id {
                    *lifecycle = Lifecycle::Idle;
                }
            }
        }
        let _ = stopped_tx.send(());

        tracing::info!(run_id, "✓ Reward worker stopped");

        result
    }

    /// Stop the running worker.
    ///
    /// The worker reports `Idle` as soon as this is called; the returned
    /// future completes once the loop has unsubscribed and exited, so no chain
    /// call is made after it resolves. An attempt in flight is finished first.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        let (cancel, stopped) = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Idle) {
                Lifecycle::Running { cancel, stopped, .. } => (cancel, stopped),
                Lifecycle::Idle => return Err(WorkerError::NotRunning),
            }
        };

        tracing::info!("🛑 Stopping reward worker");
        cancel.cancel();
        let _ = stopped.await;

        Ok(())
    }

    async fn run_loop(&self, cancel: &CancellationToken) -> Result<(), WorkerError> {
        let (round_tx, mut round_rx) = mpsc::unbounded_channel();
        let mut subscription = self.rounds.subscribe_rounds(round_tx);

        let result = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!("Reward worker cancelled");
                    break Ok(());
                }
                error = subscription.err() => {
                    tracing::error!(error = %error, "Round subscription failed");
                    break Err(WorkerError::Subscription(error));
                }
                event = round_rx.recv() => {
                    match event {
                        Some(event) => self.handle_round(event).await,
                        None => {
                            tracing::error!("Round feed closed");
                            break Err(WorkerError::Subscription(ChainError::FeedClosed));
                        }
                    }
                }
            }
        };

        subscription.unsubscribe();
        result
    }

    async fn handle_round(&self, event: RoundEvent) {
        let _attempt = self.attempt_lock.lock().await;

        let round = self.rounds.last_initialized_round();
        let account = self.client.account();

        tracing::debug!(
            round,
            observed_round = ?event.observed_round,
            received_at = %event.received_at,
            "Received round event"
        );

        let status = match self.client.participant_status(account).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(round, account = %account, error = %e, "Failed to fetch participant status");
                return;
            }
        };

        if !status.can_claim(round) {
            tracing::debug!(
                round,
                active = status.active,
                last_reward_round = status.last_reward_round,
                "Not eligible for reward, skipping round"
            );
            return;
        }

        let started = Instant::now();
        let kind = self.claim(round).await;

        self.notify(RewardOutcome {
            round,
            elapsed: started.elapsed(),
            kind,
        });
    }

    /// Submit, confirm and at most once replace the reward transaction
    async fn claim(&self, round: RoundNumber) -> OutcomeKind {
        let tx = match self.client.submit_reward().await {
            Ok(tx) => tx,
            Err(e) => return failed(FailureStage::Submit, e),
        };

        tracing::info!(round, tx = %tx, "Submitted reward transaction");

        match self.client.check_transaction(&tx).await {
            Ok(()) => return self.claimed(round, &tx, false).await,
            Err(ConfirmError::DeadlineExceeded { tx_hash }) => {
                tracing::warn!(round, tx_hash = %tx_hash, "Reward transaction not mined before deadline");
            }
            Err(e) => return failed(FailureStage::Confirm, e),
        }

        let replacement = match self.client.replace_transaction(&tx).await {
            Ok(replacement) => replacement,
            Err(e) => {
                if self.original_landed(round, &tx).await {
                    return self.claimed(round, &tx, false).await;
                }
                return failed(FailureStage::Replace, e);
            }
        };

        tracing::info!(round, tx = %replacement, "Submitted replacement reward transaction");

        match self.client.check_transaction(&replacement).await {
            Ok(()) => self.claimed(round, &replacement, true).await,
            Err(e) => {
                if self.original_landed(round, &tx).await {
                    return self.claimed(round, &tx, false).await;
                }
                failed(FailureStage::ConfirmReplacement, e)
            }
        }
    }

    /// The original may still be mined after its deadline, taking the nonce
    /// the replacement needed
    async fn original_landed(&self, round: RoundNumber, original: &PendingTx) -> bool {
        match self.client.transaction_succeeded(original).await {
            Ok(true) => {
                tracing::info!(round, tx_hash = %original.hash, "Original reward transaction mined after deadline");
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(round, tx_hash = %original.hash, error = %e, "Failed to look up original reward transaction");
                false
            }
        }
    }

    async fn claimed(&self, round: RoundNumber, tx: &PendingTx, replaced: bool) -> OutcomeKind {
        let earnings_pool = match self
            .client
            .earnings_pool_for_round(self.client.account(), round)
            .await
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(round, error = %e, "Failed to fetch earnings pool for claimed round");
                None
            }
        };

        OutcomeKind::Claimed {
            tx_hash: tx.hash,
            replaced,
            earnings_pool,
        }
    }

    fn notify(&self, outcome: RewardOutcome) {
        match &outcome.kind {
            OutcomeKind::Claimed {
                tx_hash,
                replaced,
                earnings_pool,
            } => {
                tracing::info!(
                    round = outcome.round,
                    tx_hash = %tx_hash,
                    replaced,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    total_stake = ?earnings_pool.as_ref().map(|p| p.total_stake),
                    "✅ Reward claimed"
                );
            }
            OutcomeKind::Failed { stage, error } => {
                tracing::error!(
                    round = outcome.round,
                    stage = %stage,
                    error = %error,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "❌ Reward claim failed"
                );
            }
        }

        if let Some(sink) = &self.outcome_tx {
            if sink.send(outcome).is_err() {
                tracing::debug!("Outcome sink closed, dropping notification");
            }
        }
    }
}

fn failed(stage: FailureStage, error: impl std::fmt::Display) -> OutcomeKind {
    OutcomeKind::Failed {
        stage,
        error: error.to_string(),
    }
}
