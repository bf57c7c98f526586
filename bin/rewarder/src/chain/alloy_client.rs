//! Chain client over an alloy provider
//!
//! Talks to the bonding manager (reward claim, participant status, earnings
//! pools) and the rounds manager (last initialized round). Transactions are
//! sent with an explicit nonce and EIP-1559 fee caps so that a stuck claim
//! can be replaced at the same nonce.

use super::client::ChainClient;
use super::errors::{ChainError, ConfirmError};
use super::round_watcher::RoundReader;
use super::types::{round_from_u256, EarningsPool, ParticipantStatus, PendingTx, RoundNumber};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes, B256, U256};
use std::time::Duration;

sol! {
    /// Bonding manager: stake bookkeeping and reward minting
    #[sol(rpc)]
    interface IBondingManager {
        function reward() external;

        function isActiveTranscoder(address _transcoder) external view returns (bool);

        function getTranscoder(address _transcoder) external view returns (
            uint256 lastRewardRound,
            uint256 rewardCut,
            uint256 feeShare,
            uint256 lastActiveStakeUpdateRound,
            uint256 activationRound,
            uint256 deactivationRound,
            uint256 activeCumulativeRewards,
            uint256 cumulativeRewards,
            uint256 cumulativeFees,
            uint256 lastFeeRound
        );

        function getTranscoderEarningsPoolForRound(address _transcoder, uint256 _round) external view returns (
            uint256 totalStake,
            uint256 transcoderRewardCut,
            uint256 transcoderFeeShare,
            uint256 cumulativeRewardFactor,
            uint256 cumulativeFeeFactor
        );
    }

    /// Rounds manager: round initialization
    #[sol(rpc)]
    interface IRoundsManager {
        function lastInitializedRound() external view returns (uint256);
    }
}

/// Consecutive receipt lookups that may fail before polling gives up early
const MAX_RECEIPT_POLL_ERRORS: u32 = 3;

/// Configuration for the alloy chain client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub bonding_manager: Address,
    pub rounds_manager: Address,
    /// Address of the signer the provider's wallet holds
    pub account: Address,
    /// How long `check_transaction` waits for a receipt
    pub confirm_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    /// Fee increase applied on replacement, in percent
    pub price_bump_percent: u64,
    /// Optional ceiling for `max_fee_per_gas`, in wei
    pub max_fee_per_gas: Option<u128>,
}

/// Chain client backed by an alloy provider - generic over provider type
pub struct AlloyChainClient<P>
where
    P: Provider + Clone,
{
    config: ClientConfig,
    provider: P,
}

impl<P> AlloyChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    /// Create a new client with an existing provider. The provider must be
    /// able to sign for `config.account`.
    pub fn new_with_provider(config: ClientConfig, provider: P) -> Self {
        Self { config, provider }
    }

    fn to_request(tx: &PendingTx) -> TransactionRequest {
        TransactionRequest::default()
            .from(tx.from)
            .to(tx.to)
            .nonce(tx.nonce)
            .gas_limit(tx.gas_limit)
            .max_fee_per_gas(tx.max_fee_per_gas)
            .max_priority_fee_per_gas(tx.max_priority_fee_per_gas)
            .input(tx.input.clone().into())
    }

    /// Send a fully specified transaction and return it with its hash
    async fn send(&self, mut tx: PendingTx) -> Result<PendingTx, ChainError> {
        let pending = self
            .provider
            .send_transaction(Self::to_request(&tx))
            .await
            .map_err(|e| ChainError::SubmissionFailed(e.to_string()))?;

        tx.hash = *pending.tx_hash();

        tracing::debug!(tx = %tx, "Transaction sent");

        Ok(tx)
    }
}

/// Raise both fee caps of `tx` by `bump_percent` (at least 1 wei each).
/// Refuses when the new max fee would pass `max_fee_cap`.
pub fn bump_fees(
    tx: &PendingTx,
    bump_percent: u64,
    max_fee_cap: Option<u128>,
) -> Result<PendingTx, ChainError> {
    let bump = |value: u128| -> u128 {
        let bumped = value.saturating_mul(100 + bump_percent as u128) / 100;
        bumped.max(value.saturating_add(1))
    };

    let max_fee_per_gas = bump(tx.max_fee_per_gas);
    let max_priority_fee_per_gas = bump(tx.max_priority_fee_per_gas).min(max_fee_per_gas);

    if let Some(cap) = max_fee_cap {
        if max_fee_per_gas > cap {
            return Err(ChainError::ReplacementRejected {
                tx_hash: tx.hash,
                reason: format!(
                    "bumped max fee {} exceeds configured cap {}",
                    max_fee_per_gas, cap
                ),
            });
        }
    }

    Ok(PendingTx {
        hash: B256::ZERO,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        ..tx.clone()
    })
}

#[async_trait::async_trait]
impl<P> ChainClient for AlloyChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn account(&self) -> Address {
        self.config.account
    }

    async fn participant_status(&self, participant: Address) -> Result<ParticipantStatus, ChainError> {
        let bonding = IBondingManager::new(self.config.bonding_manager, &self.provider);

        let active = bonding
            .isActiveTranscoder(participant)
            .call()
            .await
            .map_err(|e| ChainError::ContractCallFailed(format!("isActiveTranscoder failed: {}", e)))?;

        let record = bonding
            .getTranscoder(participant)
            .call()
            .await
            .map_err(|e| ChainError::ContractCallFailed(format!("getTranscoder failed: {}", e)))?;

        Ok(ParticipantStatus {
            active,
            last_reward_round: round_from_u256(record.lastRewardRound),
        })
    }

    async fn earnings_pool_for_round(
        &self,
        participant: Address,
        round: RoundNumber,
    ) -> Result<EarningsPool, ChainError> {
        let bonding = IBondingManager::new(self.config.bonding_manager, &self.provider);

        let pool = bonding
            .getTranscoderEarningsPoolForRound(participant, U256::from(round))
            .call()
            .await
            .map_err(|e| {
                ChainError::ContractCallFailed(format!(
                    "getTranscoderEarningsPoolForRound({}) failed: {}",
                    round, e
                ))
            })?;

        Ok(EarningsPool {
            total_stake: pool.totalStake,
            reward_cut: pool.transcoderRewardCut,
            fee_share: pool.transcoderFeeShare,
            cumulative_reward_factor: pool.cumulativeRewardFactor,
            cumulative_fee_factor: pool.cumulativeFeeFactor,
        })
    }

    async fn submit_reward(&self) -> Result<PendingTx, ChainError> {
        let input: Bytes = IBondingManager::rewardCall {}.abi_encode().into();

        let nonce = self
            .provider
            .get_transaction_count(self.config.account)
            .pending()
            .await
            .map_err(|e| ChainError::RpcError(format!("nonce lookup failed: {}", e)))?;

        let fees = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| ChainError::RpcError(format!("fee estimation failed: {}", e)))?;

        let estimate_request = TransactionRequest::default()
            .from(self.config.account)
            .to(self.config.bonding_manager)
            .input(input.clone().into());

        let gas_limit = self
            .provider
            .estimate_gas(estimate_request)
            .await
            .map_err(|e| ChainError::SubmissionFailed(format!("gas estimation failed: {}", e)))?;

        let mut max_fee_per_gas = fees.max_fee_per_gas;
        if let Some(cap) = self.config.max_fee_per_gas {
            if max_fee_per_gas > cap {
                tracing::warn!(estimated = max_fee_per_gas, cap, "Estimated max fee above cap, clamping");
                max_fee_per_gas = cap;
            }
        }

        let tx = PendingTx {
            hash: B256::ZERO,
            from: self.config.account,
            to: self.config.bonding_manager,
            nonce,
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas.min(max_fee_per_gas),
            input,
        };

        self.send(tx).await
    }

    async fn check_transaction(&self, tx: &PendingTx) -> Result<(), ConfirmError> {
        let deadline = Duration::from_secs(self.config.confirm_timeout_secs);
        let poll_interval = Duration::from_millis(self.config.receipt_poll_interval_ms);

        let wait_for_receipt = async {
            let mut consecutive_errors = 0u32;
            loop {
                match self.provider.get_transaction_receipt(tx.hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => consecutive_errors = 0,
                    Err(e) => {
                        consecutive_errors += 1;
                        tracing::warn!(
                            tx_hash = %tx.hash,
                            attempt = consecutive_errors,
                            error = %e,
                            "Receipt lookup failed"
                        );
                        if consecutive_errors >= MAX_RECEIPT_POLL_ERRORS {
                            return Err(ConfirmError::Rpc(e.to_string()));
                        }
                    }
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        let receipt = match tokio::time::timeout(deadline, wait_for_receipt).await {
            Ok(result) => result?,
            Err(_) => return Err(ConfirmError::DeadlineExceeded { tx_hash: tx.hash }),
        };

        let block_number = receipt.block_number.unwrap_or(0);
        if !receipt.status() {
            return Err(ConfirmError::Reverted {
                tx_hash: tx.hash,
                block_number,
            });
        }

        tracing::debug!(tx_hash = %tx.hash, block_number, gas_used = receipt.gas_used, "Transaction mined");

        Ok(())
    }

    async fn transaction_succeeded(&self, tx: &PendingTx) -> Result<bool, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx.hash)
            .await
            .map_err(|e| ChainError::RpcError(format!("receipt lookup for {} failed: {}", tx.hash, e)))?;

        Ok(receipt.is_some_and(|receipt| receipt.status()))
    }

    async fn replace_transaction(&self, tx: &PendingTx) -> Result<PendingTx, ChainError> {
        let replacement = bump_fees(tx, self.config.price_bump_percent, self.config.max_fee_per_gas)?;

        tracing::info!(
            original = %tx,
            max_fee = replacement.max_fee_per_gas,
            priority_fee = replacement.max_priority_fee_per_gas,
            "Replacing stuck transaction"
        );

        self.send(replacement).await
    }
}

#[async_trait::async_trait]
impl<P> RoundReader for AlloyChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn read_last_initialized_round(&self) -> Result<RoundNumber, ChainError> {
        let rounds = IRoundsManager::new(self.config.rounds_manager, &self.provider);

        let round = rounds
            .lastInitializedRound()
            .call()
            .await
            .map_err(|e| ChainError::ContractCallFailed(format!("lastInitializedRound failed: {}", e)))?;

        Ok(round_from_u256(round))
    }
}
