//! Reward claim metrics
//!
//! Consumes the worker's outcome notifications and keeps running counters.
//! A summary is logged on an interval and once more at shutdown.

use crate::chain::RoundNumber;
use crate::worker::{FailureStage, OutcomeKind, RewardOutcome};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub claimed: u64,
    /// Claims that only succeeded through the replacement transaction
    pub replaced: u64,
    pub failed: u64,
    pub failures_by_stage: HashMap<FailureStage, u64>,
    pub last_claimed_round: Option<RoundNumber>,
    pub last_attempt_ms: Option<u64>,
}

#[derive(Default)]
pub struct RewardMetrics {
    inner: RwLock<MetricsSnapshot>,
}

impl RewardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &RewardOutcome) {
        let mut metrics = self.inner.write();
        metrics.attempts += 1;
        metrics.last_attempt_ms = Some(outcome.elapsed.as_millis() as u64);

        match &outcome.kind {
            OutcomeKind::Claimed { replaced, .. } => {
                metrics.claimed += 1;
                if *replaced {
                    metrics.replaced += 1;
                }
                metrics.last_claimed_round = Some(outcome.round);
            }
            OutcomeKind::Failed { stage, .. } => {
                metrics.failed += 1;
                *metrics.failures_by_stage.entry(*stage).or_insert(0) += 1;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.read().clone()
    }

    pub fn log_report(&self) {
        let metrics = self.snapshot();

        tracing::info!(
            "📈 Reward metrics: attempts={}, claimed={}, replaced={}, failed={}, last_claimed_round={:?}, last_attempt_ms={:?}",
            metrics.attempts,
            metrics.claimed,
            metrics.replaced,
            metrics.failed,
            metrics.last_claimed_round,
            metrics.last_attempt_ms
        );

        for (stage, count) in &metrics.failures_by_stage {
            tracing::info!("  Failures at {}: {}", stage, count);
        }
    }

    /// Drain `outcomes` until the channel closes or `cancel_token` fires.
    /// Outcomes queued at cancellation are still recorded.
    pub async fn run(
        self: Arc<Self>,
        mut outcomes: mpsc::UnboundedReceiver<RewardOutcome>,
        report_interval: Duration,
        cancel_token: CancellationToken,
    ) {
        let mut report = interval(report_interval);
        // First tick fires immediately
        report.tick().await;

        loop {
            tokio::select! {
                biased;

                outcome = outcomes.recv() => {
                    match outcome {
                        Some(outcome) => {
                            tracing::debug!(%outcome, "Recording reward outcome");
                            self.record(&outcome);
                        }
                        None => break,
                    }
                }
                _ = report.tick() => self.log_report(),
                _ = cancel_token.cancelled() => {
                    // Count what was already queued
                    while let Ok(outcome) = outcomes.try_recv() {
                        self.record(&outcome);
                    }
                    break;
                }
            }
        }

        self.log_report();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn claimed(round: RoundNumber, replaced: bool) -> RewardOutcome {
        RewardOutcome {
            round,
            elapsed: Duration::from_millis(120),
            kind: OutcomeKind::Claimed {
                tx_hash: B256::ZERO,
                replaced,
                earnings_pool: None,
            },
        }
    }

    fn failed(round: RoundNumber, stage: FailureStage) -> RewardOutcome {
        RewardOutcome {
            round,
            elapsed: Duration::from_millis(80),
            kind: OutcomeKind::Failed {
                stage,
                error: "boom".to_string(),
            },
        }
    }

    #[test]
    fn test_record_counts_outcomes() {
        let metrics = RewardMetrics::new();

        metrics.record(&claimed(10, false));
        metrics.record(&claimed(11, true));
        metrics.record(&failed(12, FailureStage::ConfirmReplacement));
        metrics.record(&failed(13, FailureStage::Submit));
        metrics.record(&failed(14, FailureStage::Submit));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 5);
        assert_eq!(snapshot.claimed, 2);
        assert_eq!(snapshot.replaced, 1);
        assert_eq!(snapshot.failed, 3);
        assert_eq!(snapshot.failures_by_stage.get(&FailureStage::Submit), Some(&2));
        assert_eq!(
            snapshot.failures_by_stage.get(&FailureStage::ConfirmReplacement),
            Some(&1)
        );
        assert_eq!(snapshot.last_claimed_round, Some(11));
        assert_eq!(snapshot.last_attempt_ms, Some(80));
    }

    #[tokio::test]
    async fn test_run_drains_until_channel_closes() {
        let metrics = Arc::new(RewardMetrics::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(metrics.clone().run(
            rx,
            Duration::from_secs(3600),
            CancellationToken::new(),
        ));

        tx.send(claimed(7, false)).unwrap();
        tx.send(failed(8, FailureStage::Confirm)).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("metrics task should exit")
            .unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.claimed, 1);
        assert_eq!(snapshot.failed, 1);
    }

    #[tokio::test]
    async fn test_run_records_queued_outcomes_on_cancel() {
        let metrics = Arc::new(RewardMetrics::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        tx.send(claimed(20, false)).unwrap();
        tx.send(claimed(21, true)).unwrap();
        tx.send(failed(22, FailureStage::Replace)).unwrap();
        cancel_token.cancel();

        // Sender stays alive, so only the drain can pick these up
        tokio::time::timeout(
            Duration::from_secs(2),
            metrics.clone().run(rx, Duration::from_secs(3600), cancel_token),
        )
        .await
        .expect("metrics task should exit");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.replaced, 1);
        assert_eq!(snapshot.last_claimed_round, Some(21));
        drop(tx);
    }
}
