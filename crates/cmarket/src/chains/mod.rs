//! The chain-client seam: everything the lending core needs from an RPC node.

pub mod evm;
#[cfg(test)]
pub mod mock;

use alloy::{
    network::TransactionBuilder as _,
    primitives::{Address, Bytes, B256, U256},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use async_trait::async_trait;
use serde::Serialize;

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiptSummary {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `eth_call` against `to` with raw calldata.
    async fn call(&self, to: Address, data: Bytes) -> eyre::Result<Bytes>;

    /// Fill, sign and broadcast; returns once the node accepted the transaction.
    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        tx: TransactionRequest,
    ) -> eyre::Result<B256>;

    async fn native_balance(&self, owner: Address) -> eyre::Result<U256>;

    /// Block until mined or the client's receipt timeout elapses.
    async fn wait_for_receipt(&self, tx: B256) -> eyre::Result<ReceiptSummary>;

    /// Single poll; `None` while pending or unknown.
    async fn transaction_receipt(&self, tx: B256) -> eyre::Result<Option<ReceiptSummary>>;
}

/// Call a view function and decode its return value.
pub async fn read_contract<C>(chain: &dyn ChainClient, to: Address, call: C) -> eyre::Result<C::Return>
where
    C: SolCall + Send + Sync,
{
    let data = chain.call(to, Bytes::from(call.abi_encode())).await?;
    C::abi_decode_returns(&data).map_err(|e| eyre::eyre!("decode {} return: {e}", C::SIGNATURE))
}

/// Build the transaction for a contract call; `value` is only non-zero for payable calls.
pub fn call_request<C: SolCall>(from: Address, to: Address, call: &C, value: U256) -> TransactionRequest {
    let req = TransactionRequest::default()
        .with_from(from)
        .with_to(to)
        .with_input(call.abi_encode());
    if value.is_zero() {
        req
    } else {
        req.with_value(value)
    }
}

/// Sign and broadcast a contract call.
pub async fn submit_call<C>(
    chain: &dyn ChainClient,
    signer: &PrivateKeySigner,
    to: Address,
    call: C,
    value: U256,
) -> eyre::Result<B256>
where
    C: SolCall + Send + Sync,
{
    let tx = call_request(signer.address(), to, &call, value);
    chain.send_transaction(signer, tx).await
}
