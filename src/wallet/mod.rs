use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::ValidityOracle;
use crate::config::WalletConfig;

pub const MAX_OUTPUTS_PER_TRANSACTION: usize = 127;

/// Gift-deposit transfer output: zero base-coin amount, time-locked, one
/// NFT attached. Constructed per batch, submitted, then discarded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOutput {
    pub amount: String,
    pub recipient_address: String,
    pub unlocks: UnlockConditions,
    pub storage_deposit: StorageDeposit,
    pub assets: OutputAssets,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConditions {
    pub expiration_unix_time: i64,
    pub timelock_unix_time: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDeposit {
    pub return_strategy: String,
}

impl StorageDeposit {
    pub fn gift() -> Self {
        Self {
            return_strategy: "Gift".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputAssets {
    pub nft_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NftMintRequest {
    pub immutable_metadata: String,
    pub issuer: String,
}

/// Wallet state after a sync round-trip with the node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub deposit_address: String,
    pub base_coin_balance: u64,
    #[serde(default)]
    pub nfts: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub network_id: String,
    pub block_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressValidityResponse {
    valid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    created: bool,
}

/// RPC client for the wallet daemon holding the issuing account.
#[derive(Clone)]
pub struct WalletClient {
    inner: HttpClient,
    account: String,
}

impl WalletClient {
    pub fn new(endpoint: &str, account: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "Wallet endpoint must be provided");
        assert!(!account.is_empty(), "Wallet account name must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build wallet client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            account: account.to_string(),
        })
    }

    /// Startup provisioning: stores the mnemonic and creates the account
    /// when the wallet daemon has no profile yet. A no-op on restarts.
    pub async fn ensure_profile(&self, config: &WalletConfig) -> Result<()> {
        let mut params = ObjectParams::new();
        params
            .insert("account", &self.account)
            .context("Failed to encode account parameter")?;
        params
            .insert("mnemonic", &config.mnemonic)
            .context("Failed to encode mnemonic parameter")?;
        params
            .insert("strongholdPassword", &config.stronghold_password)
            .context("Failed to encode stronghold password parameter")?;
        params
            .insert("strongholdDbName", &config.stronghold_db_name)
            .context("Failed to encode stronghold db name parameter")?;
        params
            .insert("walletDbName", &config.wallet_db_name)
            .context("Failed to encode wallet db name parameter")?;

        let response: ProfileResponse = self
            .inner
            .request("wallet_ensureProfile", params)
            .await
            .context("RPC call wallet_ensureProfile failed")?;

        if response.created {
            debug!("Created new wallet profile for account {}", self.account);
        } else {
            debug!("Profile already exists. We continue");
        }
        Ok(())
    }

    /// Syncs the account with the node and returns its current state:
    /// deposit address, base-coin balance, and held NFT ids.
    pub async fn sync_account(&self) -> Result<AccountState> {
        let state: AccountState = self
            .inner
            .request("wallet_syncAccount", rpc_params![&self.account])
            .await
            .context("RPC call wallet_syncAccount failed")?;

        assert!(
            !state.deposit_address.is_empty(),
            "Wallet returned empty deposit address"
        );
        assert!(
            state.nfts.len() <= 1_000_000,
            "Wallet NFT holdings exceed defensive bound"
        );
        debug!(
            "Account synced: balance {} glow, {} NFTs held",
            state.base_coin_balance,
            state.nfts.len()
        );
        Ok(state)
    }

    /// Submits one batch of mint requests and returns the transaction id.
    pub async fn mint_nfts(&self, requests: &[NftMintRequest]) -> Result<String> {
        assert!(!requests.is_empty(), "Mint batch cannot be empty");
        assert!(
            requests.len() <= 50,
            "Mint batch exceeds wallet batch limit"
        );

        let mut params = ObjectParams::new();
        params
            .insert("account", &self.account)
            .context("Failed to encode account parameter")?;
        params
            .insert("nfts", requests)
            .context("Failed to encode mint requests")?;

        let receipt: TransactionReceipt = self
            .inner
            .request("wallet_mintNfts", params)
            .await
            .context("RPC call wallet_mintNfts failed")?;

        assert!(
            !receipt.transaction_id.is_empty(),
            "Wallet returned empty mint transaction id"
        );
        Ok(receipt.transaction_id)
    }

    /// Sends one batch of prepared outputs as a single transaction.
    pub async fn send_outputs(&self, outputs: &[NftOutput]) -> Result<String> {
        assert!(!outputs.is_empty(), "Output batch cannot be empty");
        assert!(
            outputs.len() <= MAX_OUTPUTS_PER_TRANSACTION,
            "Output batch exceeds UTXO limit"
        );

        let mut params = ObjectParams::new();
        params
            .insert("account", &self.account)
            .context("Failed to encode account parameter")?;
        params
            .insert("outputs", outputs)
            .context("Failed to encode transfer outputs")?;

        let receipt: TransactionReceipt = self
            .inner
            .request("wallet_sendOutputs", params)
            .await
            .context("RPC call wallet_sendOutputs failed")?;

        assert!(
            !receipt.transaction_id.is_empty(),
            "Wallet returned empty send transaction id"
        );
        Ok(receipt.transaction_id)
    }

    /// Blocks until the given transaction is included in the ledger.
    pub async fn retry_until_included(&self, transaction_id: &str) -> Result<()> {
        assert!(!transaction_id.is_empty(), "Transaction id must be provided");
        let _: serde_json::Value = self
            .inner
            .request(
                "wallet_retryTransactionUntilIncluded",
                rpc_params![&self.account, transaction_id],
            )
            .await
            .with_context(|| format!("Inclusion retry failed for {transaction_id}"))?;
        Ok(())
    }

    /// Looks up an included transaction's network and block ids.
    pub async fn transaction(&self, transaction_id: &str) -> Result<TransactionDetails> {
        assert!(!transaction_id.is_empty(), "Transaction id must be provided");
        let details: TransactionDetails = self
            .inner
            .request(
                "wallet_getTransaction",
                rpc_params![&self.account, transaction_id],
            )
            .await
            .with_context(|| format!("Transaction lookup failed for {transaction_id}"))?;

        assert!(
            !details.network_id.is_empty(),
            "Wallet returned empty network id"
        );
        assert!(
            !details.block_id.is_empty(),
            "Wallet returned empty block id"
        );
        Ok(details)
    }
}

#[async_trait]
impl ValidityOracle for WalletClient {
    async fn is_address_valid(&self, address: &str) -> Result<bool> {
        assert!(!address.is_empty(), "Address must be provided");
        let response: AddressValidityResponse = self
            .inner
            .request("client_isAddressValid", rpc_params![address])
            .await
            .context("RPC call client_isAddressValid failed")?;
        Ok(response.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_serializes_to_wallet_shape() {
        let output = NftOutput {
            amount: "0".to_string(),
            recipient_address: "smr1qqk87fj".to_string(),
            unlocks: UnlockConditions {
                expiration_unix_time: 1_717_000_000,
                timelock_unix_time: 1_701_000_000,
            },
            storage_deposit: StorageDeposit::gift(),
            assets: OutputAssets {
                nft_id: "0xnft".to_string(),
            },
        };

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["amount"], "0");
        assert_eq!(json["recipientAddress"], "smr1qqk87fj");
        assert_eq!(json["unlocks"]["timelockUnixTime"], 1_701_000_000);
        assert_eq!(json["unlocks"]["expirationUnixTime"], 1_717_000_000);
        assert_eq!(json["storageDeposit"]["returnStrategy"], "Gift");
        assert_eq!(json["assets"]["nftId"], "0xnft");
    }

    #[test]
    fn account_state_decodes_with_missing_nfts() {
        let raw = r#"{"depositAddress": "smr1issuer", "baseCoinBalance": 12345}"#;
        let state: AccountState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.base_coin_balance, 12345);
        assert!(state.nfts.is_empty());
    }
}
