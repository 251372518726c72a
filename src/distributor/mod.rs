use std::collections::HashSet;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::address::{AddressExtractor, AddressValidator};
use crate::config::DistributionConfig;
use crate::ledger::{SendHistory, SentRecord};
use crate::quest::{ClaimStatus, QuestClient};
use crate::reconcile::{Submitter, reconcile, unique_addresses};
use crate::supply::{SupplyError, SupplyManager, TokenSupply};
use crate::wallet::{
    NftOutput, OutputAssets, StorageDeposit, UnlockConditions, WalletClient,
};

const MAX_PROVISION_ITERATIONS: usize = 64;

/// Cycle outcome the run loop branches on: fatal errors terminate the
/// task, transient ones are logged and retried next cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("send history unavailable: {0}")]
    Ledger(#[source] anyhow::Error),
    #[error(transparent)]
    Supply(#[from] SupplyError),
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl CycleError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CycleError::Ledger(_) | CycleError::Supply(SupplyError::Exhausted)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub address: String,
    pub nft_id: String,
}

/// Long-running distribution workflow: reconcile winners against address
/// submitters, drop already-served addresses, validate the rest, and send
/// one time-locked NFT per address in bounded batches.
pub struct DistributionTask {
    quest: QuestClient,
    wallet: WalletClient,
    supply: SupplyManager,
    history: SendHistory,
    extractor: AddressExtractor,
    validator: AddressValidator,
    nft_drop_quest_id: String,
    address_quest_id: String,
    config: DistributionConfig,
}

impl DistributionTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        quest: QuestClient,
        wallet: WalletClient,
        supply: SupplyManager,
        history: SendHistory,
        extractor: AddressExtractor,
        validator: AddressValidator,
        nft_drop_quest_id: String,
        address_quest_id: String,
        config: DistributionConfig,
    ) -> Self {
        assert!(config.chunk_size > 0, "Chunk size must be positive");
        Self {
            quest,
            wallet,
            supply,
            history,
            extractor,
            validator,
            nft_drop_quest_id,
            address_quest_id,
            config,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), CycleError> {
        info!("Running NFT dropper process");
        loop {
            match self.cycle().await {
                Ok(()) => {}
                Err(err) if err.is_fatal() => {
                    return Err(err);
                }
                Err(err) => {
                    warn!("Distribution cycle failed: {err:#}");
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Distribution shutdown signal received");
                                return Ok(());
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting distribution loop");
                            return Ok(());
                        }
                    }
                }
                _ = sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// One reconciliation-and-distribution pass.
    async fn cycle(&self) -> Result<(), CycleError> {
        let winners = self.fetch_winners().await;
        if winners.is_empty() {
            info!("No NFT winners this cycle");
            return Ok(());
        }

        let submitters = self.fetch_submitters().await;
        let addresses = unique_addresses(reconcile(&winners, &submitters));
        debug!("Reconciled unique addresses: {}", addresses.len());

        let unsent = self
            .history
            .filter_unsent(&addresses)
            .map_err(CycleError::Ledger)?;

        let mut valid = Vec::with_capacity(unsent.len());
        for address in unsent {
            match self.validator.is_valid(&address).await {
                Ok(true) => valid.push(address),
                Ok(false) => debug!("Skipping invalid address: {address}"),
                Err(err) => warn!("Could not validate {address} this cycle: {err:#}"),
            }
        }

        if valid.is_empty() {
            info!("No addresses provided");
            return Ok(());
        }

        self.distribute(&valid).await
    }

    /// Users who completed the NFT-drop quest with status success.
    async fn fetch_winners(&self) -> HashSet<String> {
        info!("Get the list of the NFT winners");
        match self
            .quest
            .fetch_claims(&self.nft_drop_quest_id, ClaimStatus::Success)
            .await
        {
            Ok(claims) => claims.into_iter().map(|claim| claim.user.id).collect(),
            Err(err) => {
                warn!("Winner fetch failed, treating as no records: {err:#}");
                HashSet::new()
            }
        }
    }

    /// Users who successfully submitted an address, with the address token
    /// extracted. Records without an address-shaped token are dropped.
    async fn fetch_submitters(&self) -> Vec<Submitter> {
        info!("Query the quest platform for submitted addresses");
        let claims = match self
            .quest
            .fetch_claims(&self.address_quest_id, ClaimStatus::Success)
            .await
        {
            Ok(claims) => claims,
            Err(err) => {
                warn!("Submitter fetch failed, treating as no records: {err:#}");
                return Vec::new();
            }
        };

        claims
            .into_iter()
            .filter_map(|claim| {
                self.extractor
                    .extract(&claim.submission.value)
                    .map(|address| Submitter::new(claim.user.id, address))
            })
            .collect()
    }

    async fn distribute(&self, addresses: &[String]) -> Result<(), CycleError> {
        info!("Sending NFTs to {} addresses", addresses.len());
        let unlocks = cycle_unlocks(&self.config);

        let mut supply = provision(&self.supply, addresses.len()).await?;

        for chunk in addresses.chunks(self.config.chunk_size) {
            let (assignments, unassigned) =
                assign_tokens(chunk, &mut supply, self.supply.collection_nft_id());
            for address in &unassigned {
                warn!("No more available NFTs for address {address}");
            }
            if assignments.is_empty() {
                continue;
            }

            let outputs: Vec<NftOutput> = assignments
                .iter()
                .map(|assignment| NftOutput {
                    amount: "0".to_string(),
                    recipient_address: assignment.address.clone(),
                    unlocks: unlocks.clone(),
                    storage_deposit: StorageDeposit::gift(),
                    assets: OutputAssets {
                        nft_id: assignment.nft_id.clone(),
                    },
                })
                .collect();

            debug!("Prepared outputs chunk of {}", outputs.len());
            let transaction_id = self.wallet.send_outputs(&outputs).await?;
            info!("Transaction sent: {transaction_id}");
            self.wallet.retry_until_included(&transaction_id).await?;
            self.wallet.sync_account().await?;

            let details = self.wallet.transaction(&transaction_id).await?;
            if details.network_id == self.config.recorded_network_id {
                for assignment in &assignments {
                    let record =
                        SentRecord::new(&assignment.address, &assignment.nft_id, &details.block_id);
                    // An append failure risks a duplicate send next cycle;
                    // accepted and logged rather than aborting the batch.
                    if let Err(err) = self.history.record(&record) {
                        warn!(
                            "Failed to record {} in the send history: {err:#}",
                            assignment.address
                        );
                    }
                }
            } else {
                info!(
                    "Network id {} does not match {}, batch not recorded",
                    details.network_id, self.config.recorded_network_id
                );
            }
        }

        Ok(())
    }
}

/// Tops up the supply until it can serve `demand` addresses and returns
/// the held NFT ids. One NFT is reserved: the collection representative
/// is never assignable.
async fn provision(
    supply: &dyn TokenSupply,
    demand: usize,
) -> Result<Vec<String>, SupplyError> {
    let mut held = supply.available().await?;
    let mut iterations = 0usize;
    while demand > held.len().saturating_sub(1) {
        iterations += 1;
        assert!(
            iterations <= MAX_PROVISION_ITERATIONS,
            "Provisioning exceeded iteration bound"
        );
        let shortfall = demand - (held.len().saturating_sub(1));
        warn!("Not enough available NFTs for all addresses. Minting {shortfall} more");
        supply.mint(shortfall).await?;
        held = supply.available().await?;
    }
    assert!(
        held.len() >= demand + 1,
        "Provisioning post-condition violated"
    );
    Ok(held)
}

/// Expiration and timelock are computed once per cycle and shared by every
/// output in that cycle.
fn cycle_unlocks(config: &DistributionConfig) -> UnlockConditions {
    let now = Utc::now();
    let expiration = now + ChronoDuration::days(config.expiration_days);
    let timelock = now + ChronoDuration::days(config.timelock_days);
    assert!(
        expiration > timelock,
        "Expiration must fall after the timelock"
    );
    UnlockConditions {
        expiration_unix_time: expiration.timestamp(),
        timelock_unix_time: timelock.timestamp(),
    }
}

/// Pops NFT ids from the front of the supply, one per address, skipping
/// the collection-representative id. Addresses left without a token when
/// the supply runs dry come back as unassigned.
fn assign_tokens(
    addresses: &[String],
    supply: &mut Vec<String>,
    collection_nft_id: &str,
) -> (Vec<Assignment>, Vec<String>) {
    let mut assignments = Vec::with_capacity(addresses.len());
    let mut unassigned = Vec::new();

    'addresses: for address in addresses {
        loop {
            if supply.is_empty() {
                unassigned.push(address.clone());
                continue 'addresses;
            }
            let nft_id = supply.remove(0);
            if nft_id == collection_nft_id {
                warn!("Skipping collection NFT id {nft_id} for address {address}");
                continue;
            }
            assignments.push(Assignment {
                address: address.clone(),
                nft_id,
            });
            continue 'addresses;
        }
    }

    assert!(
        assignments.len() + unassigned.len() == addresses.len(),
        "Every address must be assigned or reported unassignable"
    );
    (assignments, unassigned)
}
