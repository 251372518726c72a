use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{MintConfig, NftMetadataConfig};
use crate::wallet::{NftMintRequest, WalletClient};

/// Outcomes of supply operations the distribution engine branches on. An
/// empty wallet is unrecoverable without operator action; a balance
/// shortfall is retried on later cycles once the wallet is topped up.
#[derive(Debug, thiserror::Error)]
pub enum SupplyError {
    #[error(
        "no NFTs available in the issuing wallet; deposit the collection NFT before restarting"
    )]
    Exhausted,
    #[error("balance of {balance} glow at {address} is below the {minimum} glow mint minimum")]
    InsufficientBalance {
        address: String,
        balance: u64,
        minimum: u64,
    },
    #[error(transparent)]
    Wallet(#[from] anyhow::Error),
}

/// Source of distributable NFT ids. The distribution engine provisions
/// against this seam, like address validation goes through its oracle.
#[async_trait]
pub trait TokenSupply: Send + Sync {
    /// Currently held NFT ids. An empty holding means there is nothing to
    /// distribute and no recovery path.
    async fn available(&self) -> Result<Vec<String>, SupplyError>;

    /// Mints `count` more collection NFTs.
    async fn mint(&self, count: usize) -> Result<(), SupplyError>;

    /// Id of the collection representative, which is held but never
    /// distributable.
    fn collection_nft_id(&self) -> &str;
}

/// Queries unassigned NFTs from the issuing wallet and mints more in
/// batches when demand exceeds supply.
pub struct SupplyManager {
    wallet: WalletClient,
    config: MintConfig,
}

impl SupplyManager {
    pub fn new(wallet: WalletClient, config: MintConfig) -> Self {
        assert!(config.batch_size > 0, "Mint batch size must be positive");
        Self { wallet, config }
    }
}

#[async_trait]
impl TokenSupply for SupplyManager {
    fn collection_nft_id(&self) -> &str {
        &self.config.collection_nft_id
    }

    /// Syncs the wallet and returns the currently held NFT ids.
    async fn available(&self) -> Result<Vec<String>, SupplyError> {
        debug!("Checking for available NFTs");
        let state = self.wallet.sync_account().await?;
        if state.nfts.is_empty() {
            return Err(SupplyError::Exhausted);
        }
        info!("Available NFTs: {}", state.nfts.len());
        Ok(state.nfts)
    }

    /// Mints `count` collection NFTs in sequential batches, blocking on
    /// inclusion per batch. Preconditioned on the base-coin balance.
    async fn mint(&self, count: usize) -> Result<(), SupplyError> {
        assert!(count > 0, "Mint count must be positive");
        assert!(count <= 10_000, "Mint count exceeds defensive bound");

        let state = self.wallet.sync_account().await?;
        debug!("Available balance: {} glow", state.base_coin_balance);
        if state.base_coin_balance < self.config.min_balance_glow {
            warn!(
                "Not enough balance to mint. Send at least {} glow to {} before relaunching",
                self.config.min_balance_glow, state.deposit_address
            );
            return Err(SupplyError::InsufficientBalance {
                address: state.deposit_address,
                balance: state.base_coin_balance,
                minimum: self.config.min_balance_glow,
            });
        }

        let metadata = irc27_metadata_hex(&self.config.metadata).context("Bad mint metadata")?;
        let requests: Vec<NftMintRequest> = (0..count)
            .map(|_| NftMintRequest {
                immutable_metadata: metadata.clone(),
                issuer: self.config.collection_nft_address.clone(),
            })
            .collect();

        for batch in requests.chunks(self.config.batch_size) {
            let transaction_id = self.wallet.mint_nfts(batch).await?;
            debug!("Mint transaction pending: {transaction_id}");
            self.wallet.retry_until_included(&transaction_id).await?;
            self.wallet.sync_account().await?;
        }

        info!("Minted {count} NFTs");
        Ok(())
    }
}

/// Hex-encodes the IRC27 immutable metadata payload attached to every
/// minted NFT.
pub fn irc27_metadata_hex(metadata: &NftMetadataConfig) -> Result<String> {
    assert!(!metadata.name.is_empty(), "NFT name must be provided");
    assert!(!metadata.uri.is_empty(), "NFT URI must be provided");

    let attributes: Vec<serde_json::Value> = metadata
        .attributes
        .iter()
        .map(|attribute| {
            json!({
                "trait_type": attribute.trait_type,
                "value": attribute.value,
            })
        })
        .collect();
    let payload = json!({
        "standard": "IRC27",
        "version": "v1.0",
        "type": "image/png",
        "uri": metadata.uri,
        "name": metadata.name,
        "description": metadata.description,
        "issuerName": metadata.issuer_name,
        "collectionName": metadata.collection_name,
        "attributes": attributes,
    });
    let encoded = serde_json::to_string(&payload).context("Failed to encode IRC27 metadata")?;
    Ok(format!("0x{}", hex::encode(encoded.as_bytes())))
}
