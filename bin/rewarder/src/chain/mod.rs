//! Chain-facing collaborators of the reward worker
//!
//! This module provides:
//! - The `ChainClient` and `RoundEventSource` contracts the worker consumes
//! - `RoundFeed`, the subscription hub behind round notifications
//! - A polling `RoundWatcher`
//! - `AlloyChainClient`, the provider-backed client used by the binary

mod alloy_client;
mod client;
mod errors;
mod round_watcher;
mod rounds;
mod types;

pub use alloy_client::{bump_fees, AlloyChainClient, ClientConfig};
pub use client::ChainClient;
pub use errors::{ChainError, ConfirmError};
pub use round_watcher::{RoundReader, RoundWatcher, RoundWatcherConfig};
pub use rounds::{RoundEventSource, RoundFeed, RoundSubscription};
pub use types::{
    round_from_u256, EarningsPool, ParticipantStatus, PendingTx, RoundEvent, RoundNumber,
};
