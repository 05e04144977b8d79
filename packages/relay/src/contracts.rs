//! Contract Interfaces
//!
//! View-function ABIs of the vault platform contracts and a typed helper to
//! call them through a `ChainReader`.

use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::chain::{ChainError, ChainReader};

sol! {
    interface IErc20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
    }

    interface IVersioned {
        function VERSION() external view returns (string);
    }

    interface IProxy {
        function implementation() external view returns (address);
    }

    interface ISmartVault {
        function strategy() external view returns (address);
        function underlying() external view returns (address);
    }

    /// Strategies and splitters both expose their vault
    interface IStrategy {
        function STRATEGY_NAME() external view returns (string);
        function vault() external view returns (address);
    }

    interface IController {
        function isValidVault(address vault) external view returns (bool);
    }

    interface IContractReader {
        function getPrice(address token) external view returns (uint256);
    }

    interface ITetuToken {
        function maxTotalSupplyForCurrentBlock() external view returns (uint256);
    }

    interface IAnnouncer {
        struct TimeLockInfo {
            uint8 opCode;
            bytes32 opHash;
            address target;
            address[] adrValues;
            uint256[] numValues;
        }

        function timeLockInfosLength() external view returns (uint256);
        function timeLockInfo(uint256 idx) external view returns (TimeLockInfo);
    }

    interface IBookkeeper {
        function vaults() external view returns (address[]);
    }
}

/// Call a view function and decode its return
///
/// # Arguments
/// * `chain` - Chain reader to send the call through
/// * `to` - Contract address
/// * `call` - ABI call value
/// * `block` - Pin the call to this block, latest when `None`
pub async fn call_view<C: SolCall>(
    chain: &dyn ChainReader,
    to: Address,
    call: C,
    block: Option<u64>,
) -> Result<C::Return, ChainError> {
    let output = chain.call(to, Bytes::from(call.abi_encode()), block).await?;
    C::abi_decode_returns(&output, true).map_err(|e| ChainError::AbiDecode {
        method: C::SIGNATURE,
        reason: e.to_string(),
    })
}
