//! Transaction signing and broadcast.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! Submission is fire-and-forget: the hash is returned as soon as the
//! transaction is accepted by the node; confirmation tracking is out of scope.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Default gas limit for a flash-loan liquidation (multi-swap path).
const DEFAULT_LIQUIDATION_GAS_LIMIT: u64 = 2_000_000;

/// Cached nonce manager.
/// Tracks the nonce locally with atomic operations; re-synced from the chain
/// before each evaluated candidate and after failed broadcasts.
pub struct NonceManager {
    /// Current nonce (atomically incremented)
    current: AtomicU64,
    /// Last confirmed nonce from chain
    last_synced: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
            last_synced: AtomicU64::new(initial_nonce),
        }
    }

    /// Get next nonce and increment counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Get current nonce without incrementing.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Sync nonce from chain; only moves forward.
    pub fn sync(&self, chain_nonce: u64) {
        let current = self.current.load(Ordering::SeqCst);
        if chain_nonce > current {
            self.current.store(chain_nonce, Ordering::SeqCst);
        }
        self.last_synced.store(chain_nonce, Ordering::SeqCst);
    }

    /// Reset nonce to chain value (use after tx failure).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
        self.last_synced.store(chain_nonce, Ordering::SeqCst);
    }
}

/// Transaction sender with legacy gas pricing.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    /// Signer address
    pub address: Address,
    chain_id: u64,
    nonce_manager: NonceManager,
    default_gas_limit: u64,
}

impl TransactionSender {
    /// Create a new transaction sender from a private key (with or without
    /// the 0x prefix). Fetches the initial nonce from the chain.
    pub async fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
        let initial_nonce = provider.get_transaction_count(address).await?;

        info!(
            address = %address,
            chain_id,
            initial_nonce,
            "Transaction sender initialized"
        );

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet,
            address,
            chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            default_gas_limit: DEFAULT_LIQUIDATION_GAS_LIMIT,
        })
    }

    /// Override the default gas limit.
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.default_gas_limit = gas_limit;
        self
    }

    pub fn default_gas_limit(&self) -> u64 {
        self.default_gas_limit
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }

    /// Fetch the account nonce from the chain and sync the local counter.
    pub async fn chain_nonce(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let nonce = provider.get_transaction_count(self.address).await?;
        self.nonce_manager.sync(nonce);
        Ok(nonce)
    }

    /// Sign and broadcast a transaction; returns the hash without waiting
    /// for a receipt.
    ///
    /// `nonce` is the value the caller computed when building the pending
    /// transaction; pass `None` to draw from the local counter.
    pub async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        gas_price_wei: u128,
        nonce: Option<u64>,
    ) -> Result<B256> {
        let nonce = nonce.unwrap_or_else(|| self.nonce_manager.next());

        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_value(U256::ZERO)
            .with_nonce(nonce)
            .with_gas_limit(self.default_gas_limit)
            .with_gas_price(gas_price_wei)
            .with_chain_id(self.chain_id);

        info!(
            to = %to,
            nonce,
            gas_limit = self.default_gas_limit,
            gas_price_gwei = gas_price_wei as f64 / 1e9,
            "Broadcasting transaction"
        );

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        match provider.send_transaction(tx).await {
            Ok(pending) => {
                let tx_hash = *pending.tx_hash();
                debug!(tx_hash = %tx_hash, "Transaction accepted by node");
                Ok(tx_hash)
            }
            Err(e) => {
                warn!(error = %e, "Broadcast failed, syncing nonce");
                self.sync_nonce().await;
                Err(e.into())
            }
        }
    }

    /// Sync nonce from chain (call on error or periodically).
    pub async fn sync_nonce(&self) {
        let provider = match self.rpc_url.parse() {
            Ok(url) => ProviderBuilder::new().on_http(url),
            Err(e) => {
                warn!(error = %e, "Invalid RPC URL during nonce sync");
                return;
            }
        };
        match provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }

    /// Get current native balance of the signer.
    pub async fn get_balance(&self) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        Ok(provider.get_balance(self.address).await?)
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url)
            .finish_non_exhaustive()
    }
}
