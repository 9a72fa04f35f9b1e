//! In-memory ledger for tests

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, TxHash};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{BlockSubscription, LedgerClient, Receipt, TxHandle, TRANSFER_GAS};
use crate::error::{Error, Result};
use crate::sweep::types::SweepTransaction;
use crate::units::{Wei, GWEI};

/// How `wait_confirmation` behaves
#[derive(Debug, Clone, Copy)]
pub enum Confirmation {
    Immediate,
    After(Duration),
    Never,
    Reverted,
}

/// Scriptable [`LedgerClient`]
pub struct MockLedger {
    signer: Option<Address>,
    balance: Mutex<Wei>,
    fee_price: Mutex<Option<Wei>>,
    nonce: AtomicU64,
    block: AtomicU64,
    push_available: bool,
    drain_on_submit: bool,
    confirmation: Confirmation,
    submit_errors: Mutex<VecDeque<Error>>,
    failing_targets: HashSet<Address>,
    block_tx: Mutex<Option<mpsc::Sender<u64>>>,
    submitted: Mutex<Vec<SweepTransaction>>,
    balance_queries: AtomicUsize,
    nonce_queries: AtomicUsize,
    balance_delay: Duration,
    gas_estimate: u64,
    estimated_amounts: Mutex<Vec<Wei>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            signer: Some(Address::from_low_u64_be(0xA11CE)),
            balance: Mutex::new(0),
            fee_price: Mutex::new(Some(20 * GWEI)),
            nonce: AtomicU64::new(0),
            block: AtomicU64::new(1),
            push_available: false,
            drain_on_submit: false,
            confirmation: Confirmation::Immediate,
            submit_errors: Mutex::new(VecDeque::new()),
            failing_targets: HashSet::new(),
            block_tx: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            balance_queries: AtomicUsize::new(0),
            nonce_queries: AtomicUsize::new(0),
            balance_delay: Duration::ZERO,
            gas_estimate: TRANSFER_GAS,
            estimated_amounts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_balance(self, balance: Wei) -> Self {
        *self.balance.lock().unwrap() = balance;
        self
    }

    pub fn with_fee_price(self, price: Wei) -> Self {
        *self.fee_price.lock().unwrap() = Some(price);
        self
    }

    pub fn with_failing_fee_price(self) -> Self {
        *self.fee_price.lock().unwrap() = None;
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.nonce.store(nonce, Ordering::SeqCst);
        self
    }

    pub fn without_signer(mut self) -> Self {
        self.signer = None;
        self
    }

    pub fn with_push(mut self) -> Self {
        self.push_available = true;
        self
    }

    /// Zero the balance after each successful submission
    pub fn draining(mut self) -> Self {
        self.drain_on_submit = true;
        self
    }

    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Queue an error for the next submission
    pub fn fail_next_submit(self, error: Error) -> Self {
        self.submit_errors.lock().unwrap().push_back(error);
        self
    }

    pub fn with_failing_target(mut self, target: Address) -> Self {
        self.failing_targets.insert(target);
        self
    }

    /// Slow down every balance read
    pub fn with_balance_delay(mut self, delay: Duration) -> Self {
        self.balance_delay = delay;
        self
    }

    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = gas;
        self
    }

    pub fn signer(&self) -> Address {
        self.signer.unwrap_or_default()
    }

    pub fn set_balance(&self, balance: Wei) {
        *self.balance.lock().unwrap() = balance;
    }

    /// Push a block notification to the open subscription
    pub async fn emit_block(&self, number: u64) -> bool {
        self.block.store(number, Ordering::SeqCst);
        let sender = self.block_tx.lock().unwrap().clone();
        match sender {
            Some(tx) => tx.send(number).await.is_ok(),
            None => false,
        }
    }

    pub fn submitted(&self) -> Vec<SweepTransaction> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn balance_queries(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }

    pub fn nonce_queries(&self) -> usize {
        self.nonce_queries.load(Ordering::SeqCst)
    }

    /// Values passed to `estimate_transfer_cost`
    pub fn estimated_amounts(&self) -> Vec<Wei> {
        self.estimated_amounts.lock().unwrap().clone()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(31337)
    }

    async fn get_balance(&self, _account: Address) -> Result<Wei> {
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        if !self.balance_delay.is_zero() {
            tokio::time::sleep(self.balance_delay).await;
        }
        Ok(*self.balance.lock().unwrap())
    }

    async fn get_fee_price(&self) -> Result<Wei> {
        let price = *self.fee_price.lock().unwrap();
        price.ok_or_else(|| Error::Rpc("eth_gasPrice unavailable".to_string()))
    }

    async fn get_block_number(&self) -> Result<u64> {
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn get_pending_nonce(&self, _account: Address) -> Result<u64> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn estimate_transfer_cost(&self, _to: Address, amount: Wei) -> Result<u64> {
        self.estimated_amounts.lock().unwrap().push(amount);
        Ok(self.gas_estimate)
    }

    async fn subscribe_blocks(&self) -> Result<BlockSubscription> {
        if !self.push_available {
            return Err(Error::Subscription("push endpoint unreachable".to_string()));
        }
        let (tx, rx) = mpsc::channel(16);
        *self.block_tx.lock().unwrap() = Some(tx);
        Ok(BlockSubscription::new(rx, CancellationToken::new()))
    }

    async fn submit(&self, tx: &SweepTransaction) -> Result<TxHandle> {
        let queued = self.submit_errors.lock().unwrap().pop_front();
        if let Some(error) = queued {
            // A conflicting submission consumed this nonce
            if matches!(error, Error::NonceConflict(_)) {
                self.nonce.fetch_add(1, Ordering::SeqCst);
            }
            return Err(error);
        }
        if self.failing_targets.contains(&tx.to) {
            return Err(Error::TransactionSend(format!("target {:?} rejected", tx.to)));
        }

        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(tx.clone());
        self.nonce.fetch_add(1, Ordering::SeqCst);
        if self.drain_on_submit {
            *self.balance.lock().unwrap() = 0;
        }

        Ok(TxHandle {
            tx_hash: TxHash::from_low_u64_be(submitted.len() as u64),
            nonce: tx.nonce,
        })
    }

    async fn wait_confirmation(&self, handle: &TxHandle, timeout: Duration) -> Result<Receipt> {
        let receipt = Receipt {
            tx_hash: handle.tx_hash,
            block_number: self.block.load(Ordering::SeqCst) + 1,
            gas_used: TRANSFER_GAS,
            success: true,
        };

        match self.confirmation {
            Confirmation::Immediate => Ok(receipt),
            Confirmation::After(delay) => {
                tokio::time::sleep(delay).await;
                Ok(receipt)
            }
            Confirmation::Never => {
                tokio::time::sleep(timeout).await;
                Err(Error::TransactionTimeout {
                    tx_hash: handle.tx_hash,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Confirmation::Reverted => Ok(Receipt {
                success: false,
                ..receipt
            }),
        }
    }
}
