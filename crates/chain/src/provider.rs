//! Provider management and lending-pool reads.
//! Uses Alloy providers for type-safe RPC interactions.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info};

sol! {
    /// Lending pool account data, as returned by Aave-style pools.
    #[sol(rpc)]
    interface ILendingPool {
        function getUserAccountData(address user)
            external
            view
            returns (
                uint256 totalLiquidityETH,
                uint256 totalCollateralETH,
                uint256 totalBorrowsETH,
                uint256 totalFeesETH,
                uint256 availableBorrowsETH,
                uint256 currentLiquidationThreshold,
                uint256 ltv,
                uint256 healthFactor
            );
    }
}

/// Health factors are WAD-scaled on-chain (1e18 = 1.0).
const WAD_F64: f64 = 1e18;

/// Dry-run and gas-estimation failures.
#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    /// The call reverted; `reason` is the decoded revert message.
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },
    /// Transport-level failure, no revert data available.
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Provider manager for chain reads and dry-run calls.
#[derive(Debug, Clone)]
pub struct ProviderManager {
    http_url: String,
    lending_pool: Address,
}

impl ProviderManager {
    /// Create a new provider manager and verify connectivity.
    pub async fn new(http_url: &str, lending_pool: Address) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(http_url.parse()?);
        let block = provider.get_block_number().await?;
        info!(block, pool = %lending_pool, "Provider connection verified");

        Ok(Self {
            http_url: http_url.to_string(),
            lending_pool,
        })
    }

    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    pub fn lending_pool(&self) -> Address {
        self.lending_pool
    }

    /// Get current block number.
    pub async fn block_number(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        Ok(provider.get_block_number().await?)
    }

    /// Read the authoritative health factor for a borrower from the pool.
    /// Returns the WAD-scaled value as f64 (1.0 = liquidation threshold).
    pub async fn health_factor(&self, user: Address) -> Result<f64> {
        let provider = ProviderBuilder::new().on_http(self.http_url.parse()?);
        let pool = ILendingPool::new(self.lending_pool, &provider);

        let data = pool.getUserAccountData(user).call().await?;
        let hf = wad_to_f64(data.healthFactor);

        debug!(user = %user, health_factor = hf, "Health factor re-checked");
        Ok(hf)
    }

    /// Estimate gas for a call.
    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        calldata: Bytes,
    ) -> Result<u64, SimulationError> {
        let provider = ProviderBuilder::new()
            .on_http(self.http_url.parse().map_err(|e| {
                SimulationError::Rpc(format!("invalid rpc url: {e}"))
            })?);

        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(calldata);

        provider
            .estimate_gas(tx)
            .await
            .map_err(classify_call_error)
    }

    /// Dry-run a call without state changes and return the raw return data.
    /// Reverts are decoded into [`SimulationError::Reverted`].
    pub async fn simulate(
        &self,
        from: Address,
        to: Address,
        calldata: Bytes,
        gas_limit: u64,
    ) -> Result<Bytes, SimulationError> {
        let provider = ProviderBuilder::new()
            .on_http(self.http_url.parse().map_err(|e| {
                SimulationError::Rpc(format!("invalid rpc url: {e}"))
            })?);

        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(calldata)
            .with_gas_limit(gas_limit);

        provider.call(tx).await.map_err(classify_call_error)
    }
}

/// Map an RPC error to a simulation error, extracting revert data if present.
fn classify_call_error(err: alloy::transports::TransportError) -> SimulationError {
    if let Some(payload) = err.as_error_resp() {
        if let Some(data) = payload.as_revert_data() {
            return SimulationError::Reverted {
                reason: decode_revert(&data),
            };
        }
        return SimulationError::Reverted {
            reason: payload.message.to_string(),
        };
    }
    SimulationError::Rpc(err.to_string())
}

/// Decode revert data into a human-readable reason.
///
/// Handles the standard `Error(string)` / `Panic(uint256)` encodings, then
/// falls back to the printable-ASCII subset of the payload, then raw hex.
pub fn decode_revert(data: &[u8]) -> String {
    if let Some(reason) = decode_standard_revert(data) {
        return reason;
    }

    let ascii: String = data
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|b| *b as char)
        .collect();

    if !ascii.is_empty() {
        ascii
    } else {
        format!("0x{}", hex::encode(data))
    }
}

fn u256_word_to_usize(word: &[u8]) -> Option<usize> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..32]);
    Some(u64::from_be_bytes(tail) as usize)
}

fn decode_standard_revert(output: &[u8]) -> Option<String> {
    if output.len() < 4 {
        return None;
    }
    // Error(string)
    if output[0..4] == [0x08, 0xc3, 0x79, 0xa0] {
        let args = &output[4..];
        if args.len() < 64 {
            return None;
        }
        let offset = u256_word_to_usize(&args[0..32])?;
        if offset.saturating_add(32) > args.len() {
            return None;
        }
        let len = u256_word_to_usize(&args[offset..offset.saturating_add(32)])?;
        let start = offset.saturating_add(32);
        if start.saturating_add(len) > args.len() {
            return None;
        }
        let raw = &args[start..start.saturating_add(len)];
        return std::str::from_utf8(raw).ok().map(|s| s.to_string());
    }
    // Panic(uint256)
    if output[0..4] == [0x4e, 0x48, 0x7b, 0x71] {
        if output.len() < 4 + 32 {
            return None;
        }
        return Some(match u256_word_to_usize(&output[4..36]) {
            Some(code) => format!("panic_code=0x{:x}", code),
            None => "panic_code=<malformed>".to_string(),
        });
    }
    None
}

/// Convert a WAD-scaled (1e18) value to f64.
fn wad_to_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        let v: u128 = value.to();
        v as f64 / WAD_F64
    } else {
        let mut v = 0.0_f64;
        for (i, limb) in value.as_limbs().iter().enumerate() {
            v += *limb as f64 * 2.0_f64.powi(64 * i as i32);
        }
        v / WAD_F64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ABI-encode an `Error(string)` revert payload by hand.
    fn error_string_payload(reason: &str) -> Vec<u8> {
        let mut data = vec![0x08, 0xc3, 0x79, 0xa0];
        // offset word
        let mut offset = [0u8; 32];
        offset[31] = 0x20;
        data.extend_from_slice(&offset);
        // length word
        let mut len = [0u8; 32];
        len[24..32].copy_from_slice(&(reason.len() as u64).to_be_bytes());
        data.extend_from_slice(&len);
        // padded string data
        let mut body = reason.as_bytes().to_vec();
        body.resize(reason.len().div_ceil(32) * 32, 0);
        data.extend_from_slice(&body);
        data
    }

    #[test]
    fn test_wad_to_f64() {
        // HF = 1.0
        assert!((wad_to_f64(U256::from(1_000_000_000_000_000_000u128)) - 1.0).abs() < 1e-9);
        // HF = 0.97
        assert!((wad_to_f64(U256::from(970_000_000_000_000_000u128)) - 0.97).abs() < 1e-9);
        // Unborrowed positions report u256::MAX-ish values; just needs to be huge
        assert!(wad_to_f64(U256::MAX) > 1e50);
    }

    #[test]
    fn test_decode_revert_standard_error() {
        let data = error_string_payload("HEALTH_FACTOR_NOT_BELOW_THRESHOLD");
        assert_eq!(decode_revert(&data), "HEALTH_FACTOR_NOT_BELOW_THRESHOLD");
    }

    #[test]
    fn test_decode_revert_panic() {
        let mut data = vec![0x4e, 0x48, 0x7b, 0x71];
        let mut code = [0u8; 32];
        code[31] = 0x11; // arithmetic overflow
        data.extend_from_slice(&code);
        assert_eq!(decode_revert(&data), "panic_code=0x11");
    }

    #[test]
    fn test_decode_revert_ascii_fallback() {
        let decoded = decode_revert(b"insufficient output amount");
        assert_eq!(decoded, "insufficient output amount");
    }

    #[test]
    fn test_decode_revert_hex_fallback() {
        let decoded = decode_revert(&[0x01, 0x02, 0x03]);
        assert_eq!(decoded, "0x010203");
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_provider_creation() {
        let provider = ProviderManager::new(
            "https://eth.llamarpc.com",
            "0x398eC7346DcD622eDc5ae82352F02bE94C62d119"
                .parse()
                .unwrap(),
        )
        .await;
        assert!(provider.is_ok());
    }
}
