use super::{ChainClient, ReceiptSummary};
use crate::{
    config::ChainConfig,
    registry::NetworkProfile,
    retry::{try_endpoints, BackoffConfig},
};
use alloy::{
    consensus::{SignableTransaction as _, TxEip1559, TxEnvelope, TxLegacy},
    network::{ReceiptResponse, TransactionBuilder as _},
    primitives::{Address, Bytes, TxKind, B256, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest},
    signers::{local::PrivateKeySigner, SignerSync as _},
};
use async_trait::async_trait;
use eyre::Context as _;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

type EvmProvider = RootProvider;

pub fn compute_eip1559_fees(base_fee: u128, gas_price: u128) -> (u128, u128) {
    // Conservative fee policy:
    // - priority: max(1.5 gwei, gas_price / 10)
    // - max_fee: base_fee * 2 + priority
    let min_priority: u128 = 1_500_000_000;
    let priority = std::cmp::max(min_priority, gas_price / 10);

    let mut max_fee = base_fee.saturating_mul(2).saturating_add(priority);
    let min_fee = base_fee.saturating_add(priority);
    if max_fee < min_fee {
        max_fee = min_fee;
    }
    (max_fee, priority)
}

/// Prefer EIP-1559 fees when the chain reports a base fee; legacy pricing otherwise.
///
/// Pure so fee selection can be unit-tested without a node.
pub fn apply_fee_policy(
    mut tx: TransactionRequest,
    base_fee: Option<u128>,
    gas_price: u128,
    from: Address,
    chain_id: u64,
) -> TransactionRequest {
    if tx.max_fee_per_gas.is_some()
        || tx.max_priority_fee_per_gas.is_some()
        || tx.gas_price.is_some()
    {
        return tx;
    }

    if tx.chain_id.is_none() {
        tx.chain_id = Some(chain_id);
    }
    if tx.from.is_none() {
        tx.from = Some(from);
    }

    if let Some(base_fee) = base_fee {
        let (max_fee, priority) = compute_eip1559_fees(base_fee, gas_price);
        tx.max_fee_per_gas = Some(max_fee);
        tx.max_priority_fee_per_gas = Some(priority);
    } else {
        tx.gas_price = Some(gas_price);
    }
    tx
}

fn broadcast_err_is_ok(err: &eyre::Report) -> bool {
    let s = format!("{err:#}").to_lowercase();
    s.contains("already known")
        || s.contains("known transaction")
        || s.contains("already imported")
        || s.contains("already in mempool")
}

fn build_and_sign_tx(
    signer: &PrivateKeySigner,
    tx: &TransactionRequest,
) -> eyre::Result<(TxEnvelope, B256)> {
    let to = tx.to.unwrap_or(TxKind::Create);
    let value = tx.value.unwrap_or(U256::ZERO);
    let input = tx.input.clone().into_input().unwrap_or_default();
    let nonce = tx.nonce.unwrap_or(0);
    let gas_limit = tx.gas.unwrap_or(21_000);

    if tx.max_fee_per_gas.is_some() {
        let consensus_tx = TxEip1559 {
            chain_id: tx.chain_id.unwrap_or(1),
            nonce,
            gas_limit,
            max_fee_per_gas: tx.max_fee_per_gas.unwrap_or(0),
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas.unwrap_or(0),
            to,
            value,
            input,
            access_list: tx.access_list.clone().unwrap_or_default(),
        };
        let hash = consensus_tx.signature_hash();
        let sig = signer.sign_hash_sync(&hash).context("sign eip1559")?;
        let signed_tx = consensus_tx.into_signed(sig);
        let tx_hash = *signed_tx.hash();
        Ok((TxEnvelope::Eip1559(signed_tx), tx_hash))
    } else {
        let consensus_tx = TxLegacy {
            chain_id: tx.chain_id,
            nonce,
            gas_price: tx.gas_price.unwrap_or(0),
            gas_limit,
            to,
            value,
            input,
        };
        let hash = consensus_tx.signature_hash();
        let sig = signer.sign_hash_sync(&hash).context("sign legacy")?;
        let signed_tx = consensus_tx.into_signed(sig);
        let tx_hash = *signed_tx.hash();
        Ok((TxEnvelope::Legacy(signed_tx), tx_hash))
    }
}

fn summarize_receipt(r: &TransactionReceipt) -> ReceiptSummary {
    ReceiptSummary {
        tx_hash: r.transaction_hash,
        success: ReceiptResponse::status(r),
        block_number: r.block_number,
        gas_used: r.gas_used,
    }
}

/// JSON-RPC client for one EVM chain, failing over across its endpoint list.
#[derive(Debug, Clone)]
pub struct EvmChain {
    pub name: String,
    pub chain_id: u64,
    rpc_urls: Vec<String>,
    backoff: BackoffConfig,
    receipt_timeout: Duration,
}

impl EvmChain {
    pub fn for_network(network: &NetworkProfile, cfg: &ChainConfig) -> Self {
        let mut urls: Vec<String> = Vec::new();
        for u in network.rpc_urls() {
            let t = u.trim();
            if !t.is_empty() && !urls.iter().any(|x| x == t) {
                urls.push(t.to_owned());
            }
        }
        Self {
            name: network.name.clone(),
            chain_id: network.chain_id,
            rpc_urls: urls,
            backoff: BackoffConfig::for_rounds(cfg.backoff_rounds),
            receipt_timeout: Duration::from_secs(cfg.receipt_timeout_seconds.max(1)),
        }
    }

    fn provider_for_url(url: &str) -> eyre::Result<EvmProvider> {
        let u: reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(DEFAULT_RPC_TIMEOUT)
            .connect_timeout(DEFAULT_RPC_CONNECT_TIMEOUT)
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
        Ok(RootProvider::new(rpc_client))
    }

    async fn with_fallback_and_backoff<T, Fut>(
        &self,
        context_label: &'static str,
        f: impl Fn(EvmProvider) -> Fut + Sync,
    ) -> eyre::Result<T>
    where
        T: Send,
        Fut: std::future::Future<Output = eyre::Result<T>> + Send,
    {
        try_endpoints(
            &self.rpc_urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                let f = &f;
                async move {
                    let p = Self::provider_for_url(&u)?;
                    f(p).await
                }
            },
            context_label,
        )
        .await
    }

    async fn pick_healthy_provider(&self) -> eyre::Result<EvmProvider> {
        try_endpoints(
            &self.rpc_urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                async move {
                    let p = Self::provider_for_url(&u)?;
                    p.get_block_number().await.context("get block number")?;
                    Ok(p)
                }
            },
            "select rpc",
        )
        .await
    }

    /// Probe the endpoint list; returns the latest block number.
    pub async fn block_number(&self) -> eyre::Result<u64> {
        self.with_fallback_and_backoff("get block number", |p| async move {
            p.get_block_number().await.context("get block number")
        })
        .await
    }

    async fn get_tx_receipt(&self, tx: B256) -> eyre::Result<Option<TransactionReceipt>> {
        self.with_fallback_and_backoff("get tx receipt", |p| async move {
            p.get_transaction_receipt(tx)
                .await
                .context("get transaction receipt")
        })
        .await
    }
}

#[async_trait]
impl ChainClient for EvmChain {
    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes> {
        let req = TransactionRequest::default().with_to(to).with_input(data);
        self.with_fallback_and_backoff("eth_call", |p| {
            let req = req.clone();
            async move { p.call(req).await.context("eth_call") }
        })
        .await
    }

    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        mut tx: TransactionRequest,
    ) -> eyre::Result<B256> {
        let provider = self.pick_healthy_provider().await?;
        let from = signer.address();

        tx.chain_id = Some(self.chain_id);
        if tx.from.is_none() {
            tx.from = Some(from);
        }

        if tx.gas_price.is_none() && tx.max_fee_per_gas.is_none() {
            let base_fee = provider
                .get_block_by_number(BlockNumberOrTag::Pending)
                .await
                .ok()
                .flatten()
                .and_then(|b| b.header.base_fee_per_gas.map(u128::from));

            let gp = provider.get_gas_price().await.context("get gas price")?;
            tx = apply_fee_policy(tx, base_fee, gp, from, self.chain_id);
        }

        if tx.nonce.is_none() {
            let n = provider
                .get_transaction_count(from)
                .pending()
                .await
                .context("get nonce")?;
            tx.nonce = Some(n);
        }

        if tx.gas.is_none() {
            let gas = provider
                .estimate_gas(tx.clone())
                .await
                .context("estimate gas")?;
            // Headroom for estimators that undercount storage refunds.
            tx.gas = Some(gas.saturating_mul(120) / 100);
        }

        // Sign once; then broadcast the same raw tx across every endpoint.
        let (envelope, tx_hash) = build_and_sign_tx(signer, &tx).context("sign tx")?;
        let raw_bytes = alloy::eips::eip2718::Encodable2718::encoded_2718(&envelope);

        try_endpoints(
            &self.rpc_urls,
            &self.backoff,
            |u| {
                let u = u.clone();
                let raw_bytes = raw_bytes.clone();
                async move {
                    let p = Self::provider_for_url(&u)?;
                    match p.send_raw_transaction(&raw_bytes).await {
                        Ok(_pending) => Ok(()),
                        Err(e) => {
                            let ae: eyre::Report = e.into();
                            if broadcast_err_is_ok(&ae) {
                                Ok(())
                            } else {
                                Err(ae).context("broadcast raw tx")
                            }
                        }
                    }
                }
            },
            "send transaction",
        )
        .await?;

        debug!(chain = %self.name, tx_hash = %tx_hash, "broadcast accepted");
        Ok(tx_hash)
    }

    async fn native_balance(&self, owner: Address) -> eyre::Result<U256> {
        self.with_fallback_and_backoff("get balance", |p| async move {
            p.get_balance(owner).await.context("get balance")
        })
        .await
    }

    async fn wait_for_receipt(&self, tx: B256) -> eyre::Result<ReceiptSummary> {
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > self.receipt_timeout {
                eyre::bail!("timed out waiting for tx receipt");
            }
            if let Some(r) = self.get_tx_receipt(tx).await? {
                return Ok(summarize_receipt(&r));
            }
            sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    async fn transaction_receipt(&self, tx: B256) -> eyre::Result<Option<ReceiptSummary>> {
        Ok(self.get_tx_receipt(tx).await?.as_ref().map(summarize_receipt))
    }
}
