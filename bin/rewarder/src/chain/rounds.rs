//! Round notifications
//!
//! `RoundEventSource` is what the worker consumes. `RoundFeed` is the
//! in-process fan-out behind it: every subscriber gets its own sink, can
//! unsubscribe explicitly, and is told through `RoundSubscription::err` when
//! the feed has failed for good.

use super::errors::ChainError;
use super::types::{RoundEvent, RoundNumber};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};

/// Source of "new round initialized" notifications
pub trait RoundEventSource: Send + Sync {
    /// Register `sink` for round events
    fn subscribe_rounds(&self, sink: mpsc::UnboundedSender<RoundEvent>) -> RoundSubscription;

    /// Last round known to be initialized
    fn last_initialized_round(&self) -> RoundNumber;
}

struct Subscriber {
    sink: mpsc::UnboundedSender<RoundEvent>,
    err_tx: oneshot::Sender<ChainError>,
}

#[derive(Default)]
struct FeedState {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
    failed: Option<ChainError>,
}

/// Fan-out hub for round events
#[derive(Clone, Default)]
pub struct RoundFeed {
    state: Arc<Mutex<FeedState>>,
}

impl RoundFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink. On an already failed feed the subscription's error
    /// fires immediately.
    pub fn subscribe(&self, sink: mpsc::UnboundedSender<RoundEvent>) -> RoundSubscription {
        let (err_tx, err_rx) = oneshot::channel();
        let mut state = self.state.lock();

        let id = state.next_id;
        state.next_id += 1;

        match state.failed.clone() {
            Some(error) => {
                let _ = err_tx.send(error);
            }
            None => {
                state.subscribers.insert(id, Subscriber { sink, err_tx });
            }
        }

        tracing::debug!(subscription = id, "Round subscription added");

        RoundSubscription {
            id,
            feed: Arc::downgrade(&self.state),
            err_rx,
            terminated: false,
        }
    }

    /// Deliver `event` to every live subscriber, dropping closed sinks.
    /// Returns how many subscribers received it.
    pub fn send(&self, event: RoundEvent) -> usize {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|_, subscriber| subscriber.sink.send(event.clone()).is_ok());
        state.subscribers.len()
    }

    /// Terminate every subscription with `error`
    pub fn fail(&self, error: ChainError) {
        let mut state = self.state.lock();
        let count = state.subscribers.len();
        for (_, subscriber) in state.subscribers.drain() {
            let _ = subscriber.err_tx.send(error.clone());
        }
        tracing::warn!(subscribers = count, error = %error, "Round feed failed");
        state.failed = Some(error);
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

/// Handle for one registered sink
pub struct RoundSubscription {
    id: u64,
    feed: Weak<Mutex<FeedState>>,
    err_rx: oneshot::Receiver<ChainError>,
    terminated: bool,
}

impl RoundSubscription {
    /// Stop receiving events. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(state) = self.feed.upgrade() {
            if state.lock().subscribers.remove(&self.id).is_some() {
                tracing::debug!(subscription = self.id, "Round subscription removed");
            }
        }
    }

    /// Resolves once with the terminal error of the subscription; pending
    /// forever afterwards. Cancel safe.
    pub async fn err(&mut self) -> ChainError {
        if self.terminated {
            return std::future::pending().await;
        }

        let result = (&mut self.err_rx).await;
        self.terminated = true;

        match result {
            Ok(error) => error,
            Err(_) => ChainError::FeedClosed,
        }
    }
}

impl Drop for RoundSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_reaches_all_subscribers() {
        let feed = RoundFeed::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let _sub1 = feed.subscribe(tx1);
        let _sub2 = feed.subscribe(tx2);

        assert_eq!(feed.send(RoundEvent::for_round(5)), 2);

        assert_eq!(rx1.recv().await.unwrap().observed_round, Some(5));
        assert_eq!(rx2.recv().await.unwrap().observed_round, Some(5));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let feed = RoundFeed::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sub = feed.subscribe(tx);

        sub.unsubscribe();
        sub.unsubscribe();

        assert_eq!(feed.send(RoundEvent::new()), 0);
        assert_eq!(feed.subscriber_count(), 0);
        // Sender went away with the subscriber entry
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let feed = RoundFeed::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        {
            let _sub = feed.subscribe(tx);
            assert_eq!(feed.subscriber_count(), 1);
        }
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_sink_is_pruned() {
        let feed = RoundFeed::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let _sub = feed.subscribe(tx);
        drop(rx);

        assert_eq!(feed.send(RoundEvent::new()), 0);
    }

    #[tokio::test]
    async fn test_fail_reports_error_to_subscribers() {
        let feed = RoundFeed::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sub = feed.subscribe(tx);

        feed.fail(ChainError::SubscriptionError("rpc down".to_string()));

        let err = tokio::time::timeout(Duration::from_secs(1), sub.err())
            .await
            .expect("error should be delivered");
        assert_eq!(err, ChainError::SubscriptionError("rpc down".to_string()));
    }

    #[tokio::test]
    async fn test_subscribe_after_fail_errors_immediately() {
        let feed = RoundFeed::new();
        feed.fail(ChainError::SubscriptionError("gone".to_string()));

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sub = feed.subscribe(tx);

        let err = tokio::time::timeout(Duration::from_secs(1), sub.err())
            .await
            .expect("error should be immediate");
        assert_eq!(err, ChainError::SubscriptionError("gone".to_string()));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_feed_reports_closed() {
        let feed = RoundFeed::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sub = feed.subscribe(tx);
        drop(feed);

        let err = tokio::time::timeout(Duration::from_secs(1), sub.err())
            .await
            .expect("closed feed should resolve");
        assert_eq!(err, ChainError::FeedClosed);
    }
}
