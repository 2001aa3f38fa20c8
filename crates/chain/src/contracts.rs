//! Flash-liquidator contract interface.
//!
//! The on-chain executable is pre-deployed; the bot only encodes the
//! `liquidate` call. The contract flash-borrows the named market, runs the
//! pre-liquidation swap, liquidates, runs the post-liquidation swap and
//! repays — all within one transaction — returning the profit amount.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    interface IFlashLiquidator {
        function liquidate(
            uint256 flashTokenId,
            uint256 flashTokenAmount,
            address user,
            address reserve,
            address collateral,
            uint256[] calldata distributionTo,
            uint256[] calldata distributionFrom
        ) external returns (uint256 profit);
    }
}

/// Arguments for one liquidation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidateArgs {
    /// Flash-loan market id
    pub flash_token_id: u8,
    /// Flash-loan amount in the flash asset's smallest unit
    pub flash_token_amount: U256,
    /// Borrower being liquidated
    pub user: Address,
    /// Borrowed (debt) asset
    pub reserve: Address,
    /// Collateral asset to seize
    pub collateral: Address,
    /// Routing weights for the pre-liquidation swap (flash asset -> debt asset)
    pub distribution_to: Vec<U256>,
    /// Routing weights for the post-liquidation swap (collateral -> flash asset)
    pub distribution_from: Vec<U256>,
}

/// Wrapper around the deployed flash-liquidator contract.
#[derive(Debug, Clone)]
pub struct FlashLiquidatorContract {
    address: Address,
}

impl FlashLiquidatorContract {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Encode `liquidate` calldata for simulation or submission.
    pub fn encode_liquidate(&self, args: &LiquidateArgs) -> Bytes {
        let call = IFlashLiquidator::liquidateCall {
            flashTokenId: U256::from(args.flash_token_id),
            flashTokenAmount: args.flash_token_amount,
            user: args.user,
            reserve: args.reserve,
            collateral: args.collateral,
            distributionTo: args.distribution_to.clone(),
            distributionFrom: args.distribution_from.clone(),
        };
        Bytes::from(call.abi_encode())
    }

    /// Decode the raw return of a simulated `liquidate` call into the profit
    /// amount (flash asset smallest unit).
    pub fn decode_profit(ret: &[u8]) -> Option<U256> {
        IFlashLiquidator::liquidateCall::abi_decode_returns(ret, true)
            .ok()
            .map(|r| r.profit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    fn sample_args() -> LiquidateArgs {
        LiquidateArgs {
            flash_token_id: 1,
            flash_token_amount: U256::from(1000u64),
            user: Address::repeat_byte(0xaa),
            reserve: Address::repeat_byte(0xbb),
            collateral: Address::repeat_byte(0xcc),
            distribution_to: vec![U256::from(60u64), U256::from(40u64)],
            distribution_from: vec![U256::from(100u64)],
        }
    }

    #[test]
    fn test_encode_liquidate() {
        let contract = FlashLiquidatorContract::new(Address::repeat_byte(0x11));
        let calldata = contract.encode_liquidate(&sample_args());

        // Selector plus ABI-encoded args
        assert_eq!(calldata[..4], IFlashLiquidator::liquidateCall::SELECTOR);
        assert!(calldata.len() > 4);

        let decoded =
            IFlashLiquidator::liquidateCall::abi_decode(&calldata, true).unwrap();
        assert_eq!(decoded.flashTokenId, U256::from(1u64));
        assert_eq!(decoded.user, Address::repeat_byte(0xaa));
        assert_eq!(decoded.distributionTo.len(), 2);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let contract = FlashLiquidatorContract::new(Address::repeat_byte(0x11));
        let args = sample_args();
        assert_eq!(
            contract.encode_liquidate(&args),
            contract.encode_liquidate(&args)
        );
    }

    #[test]
    fn test_decode_profit() {
        let ret = U256::from(123_456u64).abi_encode();
        assert_eq!(
            FlashLiquidatorContract::decode_profit(&ret),
            Some(U256::from(123_456u64))
        );

        // Garbage return data is not a profit
        assert_eq!(FlashLiquidatorContract::decode_profit(&[0x01, 0x02]), None);
    }
}
