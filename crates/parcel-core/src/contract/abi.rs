//! ABI of the delivery-token contract.

use alloy_sol_types::sol;

sol! {
	/// Delivery-token contract: one token per order, owned by the vendor
	/// until a customer buys it.
	interface IDeliveryContract {
		function mintToken(uint256 deliveryPrice, uint256 purchasePrice, string orderId, address recipient) external;
		function getTokenIdForOrder(string orderId) external view returns (uint256);
		function buy(uint256 tokenId) external payable;
		function withdraw(uint256 tokenId) external;
		function ownerOf(uint256 tokenId) external view returns (address);
		function burnTokenByOrderId(string orderId) external;
	}
}
