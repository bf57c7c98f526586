use super::errors::{ChainError, ConfirmError};
use super::types::{EarningsPool, ParticipantStatus, PendingTx, RoundNumber};
use alloy_primitives::Address;

/// Chain operations the reward worker depends on
///
/// Transport, signing and gas estimation all live behind this trait.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the local participant
    fn account(&self) -> Address;

    /// Fetch the participant's current status (never cached by callers)
    async fn participant_status(&self, participant: Address) -> Result<ParticipantStatus, ChainError>;

    /// Earnings pool of `participant` for `round`
    async fn earnings_pool_for_round(
        &self,
        participant: Address,
        round: RoundNumber,
    ) -> Result<EarningsPool, ChainError>;

    /// Send the reward claim transaction
    async fn submit_reward(&self) -> Result<PendingTx, ChainError>;

    /// Wait until `tx` is mined or the client's own deadline passes
    async fn check_transaction(&self, tx: &PendingTx) -> Result<(), ConfirmError>;

    /// Single receipt lookup: whether `tx` has been mined without reverting
    async fn transaction_succeeded(&self, tx: &PendingTx) -> Result<bool, ChainError>;

    /// Resend `tx` at the same nonce with adjusted fees
    async fn replace_transaction(&self, tx: &PendingTx) -> Result<PendingTx, ChainError>;
}
