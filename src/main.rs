mod address;
mod config;
mod distributor;
mod ledger;
mod quest;
mod reconcile;
mod supply;
mod verification;
mod wallet;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::address::{AddressExtractor, AddressValidator};
use crate::config::BotConfig;
use crate::distributor::DistributionTask;
use crate::ledger::SendHistory;
use crate::quest::QuestClient;
use crate::supply::SupplyManager;
use crate::verification::VerificationTask;
use crate::wallet::WalletClient;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = BotConfig::load().context("Failed to load configuration")?;
    config.warn_on_missing_values();

    let history = SendHistory::new(&config.distribution.history_file);
    history
        .ensure_exists()
        .context("Send-history startup check failed")?;

    let quest = QuestClient::new(
        &config.quest.api_base,
        &config.quest.subdomain,
        &config.quest.api_key,
        config.quest.request_timeout(),
    )
    .context("Failed to initialize quest platform client")?;

    let wallet = WalletClient::new(
        &config.wallet.endpoint,
        &config.wallet.account_name,
        config.wallet.request_timeout(),
    )
    .context("Failed to initialize wallet client")?;
    wallet
        .ensure_profile(&config.wallet)
        .await
        .context("Failed to provision the wallet profile")?;

    let extractor = AddressExtractor::new(&config.wallet.address_hrp)?;
    let supply = SupplyManager::new(wallet.clone(), config.mint.clone());

    let distribution = DistributionTask::new(
        quest.clone(),
        wallet.clone(),
        supply,
        history,
        extractor,
        AddressValidator::new(&config.wallet.address_hrp, Arc::new(wallet.clone())),
        config.quest.nft_drop_quest_id.clone(),
        config.quest.address_quest_id.clone(),
        config.distribution.clone(),
    );
    let verification = VerificationTask::new(
        quest,
        AddressValidator::new(&config.wallet.address_hrp, Arc::new(wallet)),
        config.quest.address_quest_id.clone(),
        config.distribution.poll_interval(),
    );

    info!("Starting processes");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let distribution_handle = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { distribution.run(shutdown).await }
    });
    let verification_handle = tokio::spawn(verification.run(shutdown_rx));
    tokio::spawn(shutdown_signal(shutdown_tx.clone()));

    let distribution_result = distribution_handle.await;
    shutdown_tx.send(true).ok();
    if let Err(join_err) = verification_handle.await {
        error!("Verification task join error: {join_err}");
    }

    match distribution_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!("Distribution terminated with error: {err}");
            Err(anyhow!(err))
        }
        Err(join_err) => Err(anyhow!("Distribution task join error: {join_err}")),
    }
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
