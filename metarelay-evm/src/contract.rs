//! Solidity interface definitions for the forwarder and the registry.
//!
//! - [`IForwarder`] - EIP-2771 minimal forwarder (`getNonce`, `verify`, `execute`)
//! - [`IRegistry`] - name registry whose `Registered` events are reconciled

use alloy_sol_types::sol;
use metarelay::ForwardRequest;

sol! {
    /// Minimal EIP-2771 forwarder.
    ///
    /// `execute` does not revert when the forwarded call fails; it returns
    /// `success == false` with the call's revert data.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IForwarder {
        struct ForwardRequest {
            address from;
            address to;
            uint256 value;
            uint256 gas;
            uint256 nonce;
            bytes data;
        }

        function getNonce(address from) external view returns (uint256);
        function verify(ForwardRequest calldata req, bytes calldata signature) external view returns (bool);
        function execute(ForwardRequest calldata req, bytes calldata signature)
            external
            payable
            returns (bool success, bytes memory ret);
    }
}

sol! {
    /// Name registry targeted by relayed calls.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IRegistry {
        event Registered(string name, address who);

        function register(string name) external;
    }
}

impl From<&ForwardRequest> for IForwarder::ForwardRequest {
    fn from(request: &ForwardRequest) -> Self {
        Self {
            from: request.from,
            to: request.to,
            value: request.value,
            gas: request.gas_limit,
            nonce: request.nonce,
            data: request.data.clone(),
        }
    }
}
