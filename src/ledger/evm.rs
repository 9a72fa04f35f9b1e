//! EVM JSON-RPC ledger client
//!
//! Reads go over HTTP through an ethers [`Provider`]. Sweep transactions are
//! signed locally with a [`LocalWallet`] and sent raw, so the nonce and fee
//! chosen by the builder are exactly what reaches the node.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, TransactionRequest, U256};
use tracing::{debug, info, warn};

use super::block_stream::{subscribe_new_heads, BlockStreamConfig};
use super::{BlockSubscription, LedgerClient, Receipt, TxHandle};
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::sweep::types::SweepTransaction;
use crate::units::{u256_to_u64, u256_to_wei, Wei};

/// Ledger client backed by an EVM node
pub struct EvmLedger {
    provider: Provider<Http>,
    wallet: Option<LocalWallet>,
    chain_id: u64,
    block_stream: Option<BlockStreamConfig>,
    receipt_poll_interval: Duration,
}

impl EvmLedger {
    /// Connect to the node, verify the chain and load the signer.
    ///
    /// The chain-id request is retried with exponential backoff for up to
    /// `connect_timeout_ms`; a mismatch with the configured chain id fails
    /// immediately.
    pub async fn connect(config: &NetworkConfig, private_key: Option<&str>) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))?
            .interval(Duration::from_millis(config.receipt_poll_interval_ms));

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(Duration::from_millis(config.connect_timeout_ms)),
            ..Default::default()
        };

        let chain_id = retry(backoff, || async {
            match provider.get_chainid().await {
                Ok(id) => Ok(id),
                Err(e) => {
                    warn!("Chain id request failed, retrying: {}", e);
                    Err(backoff::Error::transient(Error::Connection(e.to_string())))
                }
            }
        })
        .await?;
        let chain_id = u256_to_u64(chain_id)?;

        if let Some(expected) = config.chain_id {
            if expected != chain_id {
                return Err(Error::Config(format!(
                    "Chain ID mismatch: expected {}, node reports {}",
                    expected, chain_id
                )));
            }
        }

        let wallet = match private_key {
            Some(key) => Some(
                LocalWallet::from_str(key.trim())
                    .map_err(|e| Error::InvalidKey(e.to_string()))?
                    .with_chain_id(chain_id),
            ),
            None => None,
        };

        let block_stream = config.ws_url.as_ref().map(|url| BlockStreamConfig {
            ws_url: url.clone(),
            ping_interval_secs: config.ws_ping_interval_secs,
            connect_timeout_ms: config.connect_timeout_ms,
            ..BlockStreamConfig::new(url.clone())
        });

        info!(
            chain_id,
            signer = ?wallet.as_ref().map(|w| w.address()),
            push = block_stream.is_some(),
            "Connected to ledger"
        );

        Ok(Self {
            provider,
            wallet,
            chain_id,
            block_stream,
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms.max(1)),
        })
    }

    fn wallet(&self) -> Result<&LocalWallet> {
        self.wallet
            .as_ref()
            .ok_or_else(|| Error::Config("No signing key configured".to_string()))
    }

    fn rpc_error(method: &str, e: impl std::fmt::Display) -> Error {
        Error::Rpc(format!("{} failed: {}", method, e))
    }
}

/// Map a node's rejection message onto the sweep error taxonomy
pub(crate) fn classify_submit_error(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("nonce too low")
        || lower.contains("nonce too high")
        || lower.contains("already known")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("nonce has already been used")
        || lower.contains("nonce expired")
    {
        Error::NonceConflict(message.to_string())
    } else if lower.contains("insufficient funds") {
        Error::InsufficientFunds(message.to_string())
    } else {
        Error::TransactionSend(message.to_string())
    }
}

#[async_trait]
impl LedgerClient for EvmLedger {
    fn signer_address(&self) -> Option<Address> {
        self.wallet.as_ref().map(|w| w.address())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn get_balance(&self, account: Address) -> Result<Wei> {
        let balance = self
            .provider
            .get_balance(account, None)
            .await
            .map_err(|e| Self::rpc_error("eth_getBalance", e))?;
        u256_to_wei(balance)
    }

    async fn get_fee_price(&self) -> Result<Wei> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| Self::rpc_error("eth_gasPrice", e))?;
        u256_to_wei(price)
    }

    async fn get_block_number(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| Self::rpc_error("eth_blockNumber", e))?;
        Ok(block.as_u64())
    }

    async fn get_pending_nonce(&self, account: Address) -> Result<u64> {
        let nonce = self
            .provider
            .get_transaction_count(account, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(|e| Self::rpc_error("eth_getTransactionCount", e))?;
        u256_to_u64(nonce)
    }

    async fn estimate_transfer_cost(&self, to: Address, amount: Wei) -> Result<u64> {
        let from = self.wallet()?.address();
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(to)
            .value(U256::from(amount))
            .into();
        let gas = self
            .provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| Self::rpc_error("eth_estimateGas", e))?;
        u256_to_u64(gas)
    }

    async fn subscribe_blocks(&self) -> Result<BlockSubscription> {
        match &self.block_stream {
            Some(config) => subscribe_new_heads(config).await,
            None => Err(Error::Subscription(
                "No WebSocket endpoint configured".to_string(),
            )),
        }
    }

    async fn submit(&self, sweep: &SweepTransaction) -> Result<TxHandle> {
        let wallet = self.wallet()?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(wallet.address())
            .to(sweep.to)
            .value(U256::from(sweep.value))
            .gas(sweep.gas_limit)
            .gas_price(U256::from(sweep.gas_price))
            .nonce(sweep.nonce)
            .chain_id(self.chain_id)
            .into();

        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| Error::TransactionSend(format!("Signing failed: {}", e)))?;
        let raw = tx.rlp_signed(&signature);

        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| classify_submit_error(&e.to_string()))?;
        let tx_hash = pending.tx_hash();

        debug!(?tx_hash, nonce = sweep.nonce, "Transaction accepted by node");

        Ok(TxHandle {
            tx_hash,
            nonce: sweep.nonce,
        })
    }

    async fn wait_confirmation(&self, handle: &TxHandle, timeout: Duration) -> Result<Receipt> {
        let tx_hash = handle.tx_hash;
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        if let Some(block) = receipt.block_number {
                            return Receipt {
                                tx_hash,
                                block_number: block.as_u64(),
                                gas_used: receipt.gas_used.map(|g| g.low_u64()).unwrap_or(0),
                                success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(true),
                            };
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(?tx_hash, "Receipt query failed: {}", e),
                }
                tokio::time::sleep(self.receipt_poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| Error::TransactionTimeout {
                tx_hash,
                timeout_ms: timeout.as_millis() as u64,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(rpc_url: &str) -> NetworkConfig {
        NetworkConfig {
            rpc_url: rpc_url.to_string(),
            ws_url: None,
            chain_id: None,
            connect_timeout_ms: 200,
            receipt_poll_interval_ms: 50,
            ws_ping_interval_secs: 30,
        }
    }

    #[test]
    fn test_classify_nonce_conflicts() {
        for message in [
            "nonce too low",
            "Nonce too high",
            "already known",
            "replacement transaction underpriced",
            "nonce has already been used",
        ] {
            assert!(
                matches!(classify_submit_error(message), Error::NonceConflict(_)),
                "{} should be a nonce conflict",
                message
            );
        }
    }

    #[test]
    fn test_classify_insufficient_funds() {
        let err = classify_submit_error(
            "(code: -32000, message: insufficient funds for gas * price + value, data: None)",
        );
        assert!(matches!(err, Error::InsufficientFunds(_)));
    }

    #[test]
    fn test_classify_other() {
        assert!(matches!(
            classify_submit_error("intrinsic gas too low"),
            Error::TransactionSend(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = EvmLedger::connect(&network("not a url"), None).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_unreachable_node_fails() {
        let result = EvmLedger::connect(&network("http://127.0.0.1:1"), None).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }
}
