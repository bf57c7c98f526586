//! Polling round watcher
//!
//! Reads the last initialized round on an interval and publishes a
//! `RoundEvent` on the feed every time it moves forward.

use super::errors::ChainError;
use super::rounds::{RoundEventSource, RoundFeed, RoundSubscription};
use super::types::{RoundEvent, RoundNumber};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Read access to the rounds contract
#[async_trait::async_trait]
pub trait RoundReader: Send + Sync {
    async fn read_last_initialized_round(&self) -> Result<RoundNumber, ChainError>;
}

/// Configuration for the round watcher
#[derive(Debug, Clone)]
pub struct RoundWatcherConfig {
    /// Polling interval in milliseconds
    pub polling_interval_ms: u64,
    /// Consecutive read failures before the feed is failed (0 = never)
    pub max_consecutive_failures: u32,
}

impl Default for RoundWatcherConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 5000,
            max_consecutive_failures: 20,
        }
    }
}

/// Round event source backed by polling
pub struct RoundWatcher<R>
where
    R: RoundReader,
{
    reader: Arc<R>,
    config: RoundWatcherConfig,
    feed: RoundFeed,
    last_round: RwLock<Option<RoundNumber>>,
    cancel_token: CancellationToken,
}

impl<R> RoundWatcher<R>
where
    R: RoundReader + 'static,
{
    pub fn new(reader: Arc<R>, config: RoundWatcherConfig) -> Arc<Self> {
        Arc::new(Self {
            reader,
            config,
            feed: RoundFeed::new(),
            last_round: RwLock::new(None),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Get cancellation token for graceful shutdown
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Read the round once. The first read only seeds the cache; later reads
    /// publish when the round increased. Returns the published round, if any.
    pub async fn poll_once(&self) -> Result<Option<RoundNumber>, ChainError> {
        let round = self.reader.read_last_initialized_round().await?;

        let previous = {
            let mut last = self.last_round.write();
            let previous = *last;
            match previous {
                Some(prev) if round <= prev => return Ok(None),
                _ => *last = Some(round),
            }
            previous
        };

        if previous.is_none() {
            tracing::info!(round, "Round watcher seeded");
            return Ok(None);
        }

        let delivered = self.feed.send(RoundEvent::for_round(round));
        tracing::info!(round, subscribers = delivered, "New round initialized");

        Ok(Some(round))
    }

    /// Poll until cancelled, or until reads keep failing
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            interval_ms = self.config.polling_interval_ms,
            "Starting round watcher"
        );

        let mut ticker = interval(Duration::from_millis(self.config.polling_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(_) => consecutive_failures = 0,
                        Err(e) => {
                            consecutive_failures += 1;
                            tracing::warn!(
                                error = %e,
                                attempt = consecutive_failures,
                                "Failed to read last initialized round"
                            );

                            let limit = self.config.max_consecutive_failures;
                            if limit > 0 && consecutive_failures >= limit {
                                self.feed.fail(ChainError::SubscriptionError(format!(
                                    "{} consecutive round reads failed, last: {}",
                                    consecutive_failures, e
                                )));
                                break;
                            }
                        }
                    }
                }
                _ = self.cancel_token.cancelled() => {
                    tracing::debug!("Round watcher cancelled");
                    break;
                }
            }
        }

        tracing::info!("Round watcher stopped");
    }
}

impl<R> RoundEventSource for RoundWatcher<R>
where
    R: RoundReader,
{
    fn subscribe_rounds(&self, sink: mpsc::UnboundedSender<RoundEvent>) -> RoundSubscription {
        self.feed.subscribe(sink)
    }

    fn last_initialized_round(&self) -> RoundNumber {
        self.last_round.read().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedReader {
        reads: Mutex<VecDeque<Result<RoundNumber, ChainError>>>,
    }

    impl ScriptedReader {
        fn new(reads: Vec<Result<RoundNumber, ChainError>>) -> Arc<Self> {
            Arc::new(Self {
                reads: Mutex::new(reads.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl RoundReader for ScriptedReader {
        async fn read_last_initialized_round(&self) -> Result<RoundNumber, ChainError> {
            self.reads
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ChainError::RpcError("script exhausted".to_string())))
        }
    }

    #[tokio::test]
    async fn test_first_read_seeds_without_publishing() {
        let watcher = RoundWatcher::new(ScriptedReader::new(vec![Ok(10)]), RoundWatcherConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = watcher.subscribe_rounds(tx);

        assert_eq!(watcher.poll_once().await.unwrap(), None);
        assert_eq!(watcher.last_initialized_round(), 10);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publishes_only_on_increase() {
        let reader = ScriptedReader::new(vec![Ok(10), Ok(10), Ok(11), Ok(9), Ok(13)]);
        let watcher = RoundWatcher::new(reader, RoundWatcherConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = watcher.subscribe_rounds(tx);

        assert_eq!(watcher.poll_once().await.unwrap(), None);
        assert_eq!(watcher.poll_once().await.unwrap(), None);
        assert_eq!(watcher.poll_once().await.unwrap(), Some(11));
        assert_eq!(watcher.poll_once().await.unwrap(), None);
        assert_eq!(watcher.poll_once().await.unwrap(), Some(13));

        assert_eq!(rx.recv().await.unwrap().observed_round, Some(11));
        assert_eq!(rx.recv().await.unwrap().observed_round, Some(13));
        assert_eq!(watcher.last_initialized_round(), 13);
    }

    #[tokio::test]
    async fn test_read_error_keeps_cached_round() {
        let reader = ScriptedReader::new(vec![
            Ok(4),
            Err(ChainError::RpcError("timeout".to_string())),
        ]);
        let watcher = RoundWatcher::new(reader, RoundWatcherConfig::default());

        watcher.poll_once().await.unwrap();
        assert!(watcher.poll_once().await.is_err());
        assert_eq!(watcher.last_initialized_round(), 4);
    }

    #[tokio::test]
    async fn test_run_fails_feed_after_repeated_errors() {
        let config = RoundWatcherConfig {
            polling_interval_ms: 1,
            max_consecutive_failures: 3,
        };
        let watcher = RoundWatcher::new(ScriptedReader::new(vec![]), config);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sub = watcher.subscribe_rounds(tx);

        let handle = tokio::spawn(watcher.clone().run());

        let err = tokio::time::timeout(Duration::from_secs(2), sub.err())
            .await
            .expect("feed should fail");
        assert!(matches!(err, ChainError::SubscriptionError(_)));

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let config = RoundWatcherConfig {
            polling_interval_ms: 10,
            max_consecutive_failures: 0,
        };
        let watcher = RoundWatcher::new(ScriptedReader::new(vec![]), config);
        let handle = tokio::spawn(watcher.clone().run());

        watcher.cancel_token().cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher should exit")
            .unwrap();
    }
}
