//! # Contract Definitions
//!
//! Solidity interfaces for the request registry and the NFT contract it mints into.

// The sol! macro generates code that we can't document, so allow missing_docs
#![allow(missing_docs)]

use alloy_sol_types::sol;

sol! {
    /// Payload a requester submits with a mint request.
    #[derive(Debug, PartialEq, Eq)]
    struct RequestData {
        string title;
        string storyDetails;
        uint256 carbonReduction;
        string tokenURI;
        uint256 requestFee;
    }

    /// A mint request as stored by the registry.
    ///
    /// `status`: 0 = pending, 1 = approved, 2 = rejected.
    /// `nftTokenId` is 0 until the NFT has been minted.
    #[derive(Debug, PartialEq, Eq)]
    struct MintRequest {
        address requester;
        RequestData requestData;
        uint8 status;
        address auditor;
        uint256 carbonValue;
        string auditComment;
        uint256 requestTimestamp;
        uint256 auditTimestamp;
        uint256 nftTokenId;
    }

    /// An exchange (cash-out) request for an already minted NFT.
    #[derive(Debug, PartialEq, Eq)]
    struct CashRequest {
        address requester;
        uint256 nftTokenId;
        uint256 basePrice;
        uint256 requestFee;
        uint8 status;
        address auditor;
        uint256 carbonValue;
        string auditComment;
        uint256 requestTimestamp;
        uint256 auditTimestamp;
    }

    /// The request registry.
    #[derive(Debug)]
    interface IGreenTrace {
        /// A new mint request was submitted.
        event MintRequested(
            uint256 indexed tokenId,
            address indexed requester,
            string title,
            string details,
            uint256 carbonReduction,
            string tokenURI,
            uint256 totalFee
        );

        /// An auditor approved a request. `auditType`: 0 = mint, 1 = exchange.
        event AuditSubmitted(
            uint256 indexed tokenId,
            address indexed auditor,
            uint256 carbonValue,
            uint8 auditType
        );

        /// An auditor rejected a request.
        event AuditRejected(
            uint256 indexed tokenId,
            address indexed auditor,
            string reason
        );

        /// The NFT for an approved mint request was produced.
        event NFTMintedAfterAudit(
            uint256 indexed tokenId,
            address indexed recipient,
            string title,
            uint256 carbonValue
        );

        /// A new exchange request was submitted.
        event ExchangeRequested(
            uint256 indexed tokenId,
            address indexed requester,
            uint256 basePrice,
            uint256 totalFee
        );

        /// An NFT was burned in exchange for tokens.
        event NFTExchanged(
            uint256 indexed tokenId,
            address indexed owner,
            uint256 carbonAmount
        );

        function getUserMintRequests(address user) external view returns (uint256[] memory);
        function getPendingMintAudits() external view returns (uint256[] memory);
        function getAllAuditedMintRequests() external view returns (uint256[] memory);
        function getRequestById(uint256 requestId) external view returns (MintRequest memory);

        function getPendingCashAudits() external view returns (uint256[] memory);
        function getAllAuditedCashRequests() external view returns (uint256[] memory);
        function getCashById(uint256 cashId) external view returns (CashRequest memory);
    }

    /// The NFT contract approved mint requests are minted into.
    #[derive(Debug)]
    interface IGreenTalesNFT {
        event Transfer(
            address indexed from,
            address indexed to,
            uint256 indexed tokenId
        );

        /// Reverts with `ERC721NonexistentToken` once the token is burned.
        function ownerOf(uint256 tokenId) external view returns (address);

        error ERC721NonexistentToken(uint256 tokenId);
    }
}
