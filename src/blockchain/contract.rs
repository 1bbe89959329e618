//! Escrow contract ABI bindings.

use alloy::sol;

sol! {
    /// Two-party escrow with platform-operated dispute resolution.
    #[derive(Debug, PartialEq, Eq)]
    interface IEscrow {
        /// Emitted when a new escrow is registered.
        event EscrowCreated(uint256 indexed escrowId, address buyer, address seller);

        function createEscrow(address buyer, address seller) external;
        function fund(uint256 escrowId) external payable;
        function approveRelease(uint256 escrowId) external;
        function resolveDispute(uint256 escrowId, bool refundBuyer) external;
        function getEscrow(uint256 escrowId)
            external
            view
            returns (address buyer, address seller, uint256 amount, bool isFunded, uint256 approvalCount);
    }
}

pub use IEscrow::{
    approveReleaseCall, createEscrowCall, fundCall, getEscrowCall, resolveDisputeCall,
    EscrowCreated, IEscrowCalls,
};

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn test_call_selectors_match_abi() {
        assert_eq!(createEscrowCall::SIGNATURE, "createEscrow(address,address)");
        assert_eq!(fundCall::SIGNATURE, "fund(uint256)");
        assert_eq!(approveReleaseCall::SIGNATURE, "approveRelease(uint256)");
        assert_eq!(resolveDisputeCall::SIGNATURE, "resolveDispute(uint256,bool)");
        assert_eq!(EscrowCreated::SIGNATURE, "EscrowCreated(uint256,address,address)");
    }

    #[test]
    fn test_encoded_call_starts_with_selector() {
        let call = createEscrowCall {
            buyer: Address::ZERO,
            seller: Address::repeat_byte(0x11),
        };
        let data = call.abi_encode();
        assert_eq!(&data[..4], createEscrowCall::SELECTOR.as_slice());
        assert_eq!(data.len(), 4 + 64);

        let fund = fundCall { escrowId: U256::from(7) };
        assert_eq!(fund.abi_encode().len(), 4 + 32);
    }
}
