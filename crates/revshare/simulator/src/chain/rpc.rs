//! Ledger and contract client backed by an HTTP JSON-RPC provider.

use std::{fmt, time::Duration};

use alloy_consensus::{SignableTransaction, TxEnvelope};
use alloy_eips::{BlockNumberOrTag, eip2718::Encodable2718};
use alloy_network::{ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer::SignerSync;
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use super::{
    ContractClient, FeeMode, IERC20, ITokenTransferProxy, Ledger, TxReceipt, TxRequest,
};
use crate::{ChainError, ChainResult, accounts::Account};

/// Priority fee attached to EIP-1559 transactions, in wei.
const DEFAULT_PRIORITY_FEE: u128 = 1_000_000;

/// Delay between receipt lookups.
const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn rpc_error(context: &str, err: impl fmt::Display) -> ChainError {
    ChainError::Rpc(format!("{context}: {err}"))
}

/// [`Ledger`] over a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    provider: RootProvider,
}

impl RpcLedger {
    /// Connects to the node at `url`.
    pub fn new(url: Url) -> Self {
        Self { provider: RootProvider::new_http(url) }
    }

    /// Underlying provider.
    pub const fn provider(&self) -> &RootProvider {
        &self.provider
    }

    /// Token forwarded by the transfer proxy at `proxy`.
    pub async fn proxy_token(&self, proxy: Address) -> ChainResult<Address> {
        ITokenTransferProxy::new(proxy, self.provider.clone())
            .tokenAddress()
            .call()
            .await
            .map_err(|e| ChainError::Contract(format!("tokenAddress failed: {e}")))
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn balance(&self, address: Address) -> ChainResult<U256> {
        self.provider.get_balance(address).await.map_err(|e| rpc_error("eth_getBalance", e))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256> {
        IERC20::new(token, self.provider.clone())
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ChainError::Contract(format!("balanceOf({owner}) failed: {e}")))
    }

    async fn token_symbol(&self, token: Address) -> ChainResult<String> {
        IERC20::new(token, self.provider.clone())
            .symbol()
            .call()
            .await
            .map_err(|e| ChainError::Contract(format!("symbol failed: {e}")))
    }

    async fn pending_nonce(&self, address: Address) -> ChainResult<u64> {
        self.provider
            .get_transaction_count(address)
            .block_id(BlockNumberOrTag::Pending.into())
            .await
            .map_err(|e| rpc_error("eth_getTransactionCount", e))
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        self.provider.get_gas_price().await.map_err(|e| rpc_error("eth_gasPrice", e))
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.provider.get_block_number().await.map_err(|e| rpc_error("eth_blockNumber", e))
    }
}

/// [`ContractClient`] that signs locally and submits raw transactions.
#[derive(Debug, Clone)]
pub struct RpcContractClient {
    provider: RootProvider,
    chain_id: u64,
    fee_mode: FeeMode,
    receipt_poll_interval: Duration,
}

impl RpcContractClient {
    /// Connects to the node at `url` and reads its chain id.
    pub async fn connect(url: Url, fee_mode: FeeMode) -> ChainResult<Self> {
        let provider = RootProvider::new_http(url);
        let chain_id = provider.get_chain_id().await.map_err(|e| rpc_error("eth_chainId", e))?;
        Ok(Self { provider, chain_id, fee_mode, receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL })
    }

    /// Sets the delay between receipt lookups.
    pub const fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    /// Chain id transactions are signed for.
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn build(&self, from: Address, request: &TxRequest) -> ChainResult<TransactionRequest> {
        let nonce = self
            .provider
            .get_transaction_count(from)
            .block_id(BlockNumberOrTag::Pending.into())
            .await
            .map_err(|e| rpc_error("eth_getTransactionCount", e))?;
        let gas_price =
            self.provider.get_gas_price().await.map_err(|e| rpc_error("eth_gasPrice", e))?;

        let tx = TransactionRequest::default()
            .from(from)
            .to(request.to())
            .value(request.amount())
            .input(request.input().into())
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);

        let gas_limit = self
            .provider
            .estimate_gas(tx.clone())
            .await
            .map_err(|e| rpc_error("eth_estimateGas", e))?;

        let tx = tx.with_gas_limit(gas_limit);
        Ok(match self.fee_mode {
            FeeMode::Legacy => tx.with_gas_price(gas_price),
            FeeMode::Eip1559 => tx
                .with_max_fee_per_gas(gas_price.saturating_mul(2))
                .with_max_priority_fee_per_gas(DEFAULT_PRIORITY_FEE.min(gas_price)),
        })
    }
}

#[async_trait]
impl ContractClient for RpcContractClient {
    async fn submit(&self, signer: &Account, request: TxRequest) -> ChainResult<TxReceipt> {
        let method = request.method();
        let tx = self.build(signer.address(), &request).await?;

        let tx = tx.build_typed_tx().map_err(|e| ChainError::Request(format!("{e:?}")))?;
        let signature = signer
            .signer()
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| ChainError::Signing(e.to_string()))?;
        let envelope: TxEnvelope = tx.into_signed(signature).into();
        let tx_hash = *envelope.tx_hash();

        debug!(%tx_hash, method, from = %signer.address(), "sending transaction");
        let _ = self
            .provider
            .send_raw_transaction(&envelope.encoded_2718())
            .await
            .map_err(|e| rpc_error("eth_sendRawTransaction", e))?;

        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| rpc_error("eth_getTransactionReceipt", e))?;

            if let Some(receipt) = receipt {
                if !receipt.status() {
                    return Err(ChainError::Reverted { method, tx_hash });
                }
                return Ok(TxReceipt {
                    tx_hash,
                    block_number: receipt.block_number,
                    gas_used: receipt.gas_used,
                });
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}
