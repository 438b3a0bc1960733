//! In-memory [`ChainClient`] for unit tests: canned `eth_call` responses keyed by
//! `(contract, selector)`, per-contract read failures, and a log of every
//! submitted transaction.

use super::{ChainClient, ReceiptSummary};
use alloy::{
    primitives::{Address, Bytes, B256, U256},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::{SolCall, SolValue},
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub to: Address,
    pub selector: [u8; 4],
    pub input: Bytes,
    pub value: U256,
    pub hash: B256,
}

#[derive(Debug)]
pub struct MockChain {
    responses: Mutex<HashMap<(Address, [u8; 4]), Bytes>>,
    failing_reads: Mutex<HashSet<Address>>,
    failing_submits: Mutex<HashSet<Address>>,
    native_balance: Mutex<U256>,
    submitted: Mutex<Vec<SubmittedTx>>,
    network_calls: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            responses: Mutex::default(),
            failing_reads: Mutex::default(),
            failing_submits: Mutex::default(),
            native_balance: Mutex::new(U256::from(1_000_000_000_000_000_000_000_000_u128)),
            submitted: Mutex::default(),
            network_calls: AtomicUsize::new(0),
        }
    }
}

fn selector_of(data: &[u8]) -> [u8; 4] {
    let mut sel = [0_u8; 4];
    if let Some(head) = data.get(..4) {
        sel.copy_from_slice(head);
    }
    sel
}

/// ABI-encode a return value the way a node would. Multi-value returns are
/// passed as a tuple of static types, whose encoding matches the return data.
pub fn ret<T: SolValue>(v: T) -> Bytes {
    Bytes::from(v.abi_encode())
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `C` call against `to` with `data`.
    pub fn respond<C: SolCall>(&self, to: Address, data: Bytes) -> &Self {
        if let Ok(mut g) = self.responses.lock() {
            g.insert((to, C::SELECTOR), data);
        }
        self
    }

    pub fn fail_reads_from(&self, to: Address) -> &Self {
        if let Ok(mut g) = self.failing_reads.lock() {
            g.insert(to);
        }
        self
    }

    pub fn fail_submits_to(&self, to: Address) -> &Self {
        if let Ok(mut g) = self.failing_submits.lock() {
            g.insert(to);
        }
        self
    }

    pub fn set_native_balance(&self, v: U256) -> &Self {
        if let Ok(mut g) = self.native_balance.lock() {
            *g = v;
        }
        self
    }

    /// Every collaborator round-trip (reads, balances, submits, receipts).
    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<SubmittedTx> {
        self.submitted.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Selectors of submitted transactions, in submission order.
    pub fn submitted_selectors(&self) -> Vec<[u8; 4]> {
        self.submitted().iter().map(|t| t.selector).collect()
    }

    fn tick(&self) {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes> {
        self.tick();
        let failing = self
            .failing_reads
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
            .contains(&to);
        if failing {
            eyre::bail!("server returned an error response: execution reverted");
        }
        let sel = selector_of(&data);
        self.responses
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
            .get(&(to, sel))
            .cloned()
            .ok_or_else(|| eyre::eyre!("no canned response for {to} selector 0x{}", alloy::hex::encode(sel)))
    }

    async fn send_transaction(
        &self,
        _signer: &PrivateKeySigner,
        tx: TransactionRequest,
    ) -> eyre::Result<B256> {
        self.tick();
        let to = tx
            .to
            .and_then(|k| k.to().copied())
            .ok_or_else(|| eyre::eyre!("missing to"))?;
        let failing = self
            .failing_submits
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
            .contains(&to);
        if failing {
            eyre::bail!("execution reverted");
        }
        let input = tx.input.into_input().unwrap_or_default();
        let mut log = self
            .submitted
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?;
        let n = u64::try_from(log.len()).unwrap_or(u64::MAX).saturating_add(1);
        let hash = B256::from(U256::from(n));
        log.push(SubmittedTx {
            to,
            selector: selector_of(&input),
            input,
            value: tx.value.unwrap_or(U256::ZERO),
            hash,
        });
        Ok(hash)
    }

    async fn native_balance(&self, _owner: Address) -> eyre::Result<U256> {
        self.tick();
        Ok(*self
            .native_balance
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?)
    }

    async fn wait_for_receipt(&self, tx: B256) -> eyre::Result<ReceiptSummary> {
        self.tick();
        Ok(ReceiptSummary {
            tx_hash: tx,
            success: true,
            block_number: Some(1),
            gas_used: 21_000,
        })
    }

    async fn transaction_receipt(&self, tx: B256) -> eyre::Result<Option<ReceiptSummary>> {
        self.tick();
        let known = self
            .submitted
            .lock()
            .map_err(|e| eyre::eyre!("mutex poisoned: {e}"))?
            .iter()
            .any(|t| t.hash == tx);
        Ok(known.then_some(ReceiptSummary {
            tx_hash: tx,
            success: true,
            block_number: Some(1),
            gas_used: 21_000,
        }))
    }
}
