use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub quest: QuestConfig,
    pub wallet: WalletConfig,
    pub mint: MintConfig,
    pub distribution: DistributionConfig,
}

impl BotConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("QUEST_DROPPER_CONFIG")
            .unwrap_or_else(|_| "config/bot.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("QUEST_DROPPER_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/bot.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        // Secrets come in via QUEST_DROPPER__QUEST__API_KEY and friends.
        builder = builder.add_source(Environment::with_prefix("QUEST_DROPPER").separator("__"));

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize bot configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.quest.subdomain.is_empty(),
            "Quest subdomain must be specified"
        );
        assert!(
            !self.wallet.endpoint.is_empty(),
            "Wallet endpoint must be specified"
        );
        assert!(
            !self.wallet.address_hrp.is_empty(),
            "Address HRP must be specified"
        );
        self.mint.ensure_bounds()?;
        self.distribution.ensure_bounds()?;
        Ok(())
    }

    /// Startup check: every setting should carry a value, but an empty one
    /// only warns so an operator can still bring the process up and read
    /// the log.
    pub fn warn_on_missing_values(&self) {
        let checks = [
            ("quest.api_key", self.quest.api_key.is_empty()),
            (
                "quest.nft_drop_quest_id",
                self.quest.nft_drop_quest_id.is_empty(),
            ),
            (
                "quest.address_quest_id",
                self.quest.address_quest_id.is_empty(),
            ),
            ("wallet.account_name", self.wallet.account_name.is_empty()),
            ("wallet.mnemonic", self.wallet.mnemonic.is_empty()),
            (
                "wallet.stronghold_password",
                self.wallet.stronghold_password.is_empty(),
            ),
            (
                "wallet.stronghold_db_name",
                self.wallet.stronghold_db_name.is_empty(),
            ),
            ("wallet.wallet_db_name", self.wallet.wallet_db_name.is_empty()),
            (
                "mint.collection_nft_id",
                self.mint.collection_nft_id.is_empty(),
            ),
            (
                "mint.collection_nft_address",
                self.mint.collection_nft_address.is_empty(),
            ),
            (
                "distribution.history_file",
                self.distribution.history_file.is_empty(),
            ),
        ];

        for (name, missing) in checks {
            if missing {
                warn!("Configuration value {name} is empty. Fill it out before going live");
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestConfig {
    #[serde(default = "QuestConfig::default_api_base")]
    pub api_base: String,
    pub subdomain: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub nft_drop_quest_id: String,
    #[serde(default)]
    pub address_quest_id: String,
    pub request_timeout_ms: Option<u64>,
}

impl QuestConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(10_000);
        assert!(millis >= 100, "Quest API timeout must be at least 100ms");
        assert!(
            millis <= 60_000,
            "Quest API timeout cannot exceed 60 seconds"
        );
        Duration::from_millis(millis)
    }

    fn default_api_base() -> String {
        "https://api.zealy.io".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub endpoint: String,
    pub account_name: String,
    pub address_hrp: String,
    #[serde(default)]
    pub mnemonic: String,
    #[serde(default)]
    pub stronghold_password: String,
    #[serde(default)]
    pub stronghold_db_name: String,
    #[serde(default)]
    pub wallet_db_name: String,
    pub request_timeout_ms: Option<u64>,
}

impl WalletConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(30_000);
        assert!(millis >= 100, "Wallet timeout must be at least 100ms");
        assert!(millis <= 300_000, "Wallet timeout cannot exceed 5 minutes");
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MintConfig {
    #[serde(default)]
    pub collection_nft_id: String,
    #[serde(default)]
    pub collection_nft_address: String,
    #[serde(default = "MintConfig::default_min_balance")]
    pub min_balance_glow: u64,
    #[serde(default = "MintConfig::default_batch_size")]
    pub batch_size: usize,
    pub metadata: NftMetadataConfig,
}

impl MintConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(self.batch_size > 0, "Mint batch size must be positive");
        assert!(
            self.batch_size <= 50,
            "Mint batch size exceeds wallet batch limit"
        );
        assert!(
            self.min_balance_glow >= 1_000_000,
            "Minimum mint balance below storage-deposit floor"
        );
        Ok(())
    }

    const fn default_min_balance() -> u64 {
        10_000_000
    }

    const fn default_batch_size() -> usize {
        50
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NftMetadataConfig {
    pub name: String,
    pub description: String,
    pub uri: String,
    pub issuer_name: String,
    pub collection_name: String,
    #[serde(default)]
    pub attributes: Vec<NftAttributeConfig>,
}

/// One IRC27 attribute entry attached to the immutable metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct NftAttributeConfig {
    pub trait_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    pub history_file: String,
    #[serde(default = "DistributionConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "DistributionConfig::default_chunk_size")]
    pub chunk_size: usize,
    pub recorded_network_id: String,
    #[serde(default = "DistributionConfig::default_timelock_days")]
    pub timelock_days: i64,
    #[serde(default = "DistributionConfig::default_expiration_days")]
    pub expiration_days: i64,
}

impl DistributionConfig {
    pub fn poll_interval(&self) -> Duration {
        assert!(
            self.poll_interval_ms >= 1_000,
            "Poll interval must be >= 1 second"
        );
        assert!(
            self.poll_interval_ms <= 3_600_000,
            "Poll interval must be <= 1 hour"
        );
        Duration::from_millis(self.poll_interval_ms)
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(self.chunk_size > 0, "Send chunk size must be positive");
        assert!(
            self.chunk_size <= 127,
            "Send chunk size exceeds the UTXO limit"
        );
        assert!(self.timelock_days > 0, "Timelock offset must be positive");
        assert!(
            self.expiration_days > self.timelock_days,
            "Expiration must fall after the timelock"
        );
        assert!(
            !self.recorded_network_id.is_empty(),
            "Recorded network id must be specified"
        );
        Ok(())
    }

    const fn default_poll_interval_ms() -> u64 {
        120_000
    }

    const fn default_chunk_size() -> usize {
        10
    }

    const fn default_timelock_days() -> i64 {
        183
    }

    const fn default_expiration_days() -> i64 {
        365
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
