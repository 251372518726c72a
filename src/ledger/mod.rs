use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const EXPLORER_BASE_URL: &str = "https://explorer.shimmer.network/shimmer/block";
const MAX_HISTORY_ROWS: usize = 1_000_000;

/// One appended row per delivered NFT. The address column doubles as the
/// membership key for the already-sent check; rows are never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentRecord {
    pub address: String,
    pub nft_id: String,
    pub explorer_link: String,
    pub timestamp: String,
}

impl SentRecord {
    pub fn new(address: impl Into<String>, nft_id: impl Into<String>, block_id: &str) -> Self {
        assert!(!block_id.is_empty(), "Block id must be provided");
        Self {
            address: address.into(),
            nft_id: nft_id.into(),
            explorer_link: explorer_block_link(block_id),
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub fn explorer_block_link(block_id: &str) -> String {
    format!("{EXPLORER_BASE_URL}/{block_id}")
}

/// Append-only CSV ledger of addresses already served.
#[derive(Debug, Clone)]
pub struct SendHistory {
    path: PathBuf,
}

impl SendHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        assert!(
            !path.as_os_str().is_empty(),
            "Send-history path must be provided"
        );
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Startup check: creates an empty history file when none exists.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("Failed to create send history {}", self.path.display()))?;
        info!("Created send history file {}", self.path.display());
        Ok(())
    }

    /// Loads the full history into memory and returns the subsequence of
    /// `addresses` not yet present. A missing file is a hard error; the
    /// startup checks are responsible for creating it.
    pub fn filter_unsent(&self, addresses: &[String]) -> Result<Vec<String>> {
        let sent = self.load_sent_set()?;

        let mut unsent = Vec::with_capacity(addresses.len());
        for address in addresses {
            if sent.contains(address) {
                info!("{address} is already in the send history");
            } else {
                info!("{address} is a new address, sending");
                unsent.push(address.clone());
            }
        }
        Ok(unsent)
    }

    /// Appends one row. Callers decide whether append failures are fatal;
    /// the distribution engine logs and keeps going.
    pub fn record(&self, record: &SentRecord) -> Result<()> {
        assert!(!record.address.is_empty(), "Ledger row needs an address");
        assert!(!record.nft_id.is_empty(), "Ledger row needs an NFT id");

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open send history {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .serialize(record)
            .context("Failed to append send-history row")?;
        writer.flush().context("Failed to flush send history")?;
        debug!(
            "Recorded NFT {} sent to {} ({})",
            record.nft_id, record.address, record.explorer_link
        );
        Ok(())
    }

    fn load_sent_set(&self) -> Result<HashSet<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to read send history {}", self.path.display()))?;

        let mut sent = HashSet::new();
        for row in reader.records() {
            let row = row.context("Malformed send-history row")?;
            if let Some(address) = row.get(0) {
                sent.insert(address.to_string());
            }
            assert!(
                sent.len() <= MAX_HISTORY_ROWS,
                "Send history exceeds defensive row bound"
            );
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_history() -> SendHistory {
        let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "quest-dropper-history-{}-{unique}.csv",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        SendHistory::new(path)
    }

    #[test]
    fn filter_requires_existing_file() {
        let history = temp_history();
        let err = history.filter_unsent(&["smr1aaa".to_string()]);
        assert!(err.is_err(), "missing history file must be fatal");
    }

    #[test]
    fn filter_returns_only_unsent_addresses() {
        let history = temp_history();
        history.ensure_exists().unwrap();
        history
            .record(&SentRecord::new("smr1aaa", "0xnft1", "blockid"))
            .unwrap();

        let input = vec!["smr1aaa".to_string(), "smr1bbb".to_string()];
        let unsent = history.filter_unsent(&input).unwrap();
        assert_eq!(unsent, vec!["smr1bbb"]);

        std::fs::remove_file(history.path()).unwrap();
    }

    #[test]
    fn filter_output_is_subset_of_input() {
        let history = temp_history();
        history.ensure_exists().unwrap();
        let input = vec!["smr1one".to_string(), "smr1two".to_string()];
        let unsent = history.filter_unsent(&input).unwrap();
        assert!(unsent.iter().all(|a| input.contains(a)));
        assert_eq!(unsent, input);

        std::fs::remove_file(history.path()).unwrap();
    }

    #[test]
    fn record_appends_without_rewriting() {
        let history = temp_history();
        history.ensure_exists().unwrap();
        history
            .record(&SentRecord::new("smr1one", "0xnft1", "block1"))
            .unwrap();
        history
            .record(&SentRecord::new("smr1two", "0xnft2", "block2"))
            .unwrap();

        let contents = std::fs::read_to_string(history.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("smr1one,0xnft1,"));

        std::fs::remove_file(history.path()).unwrap();
    }

    #[test]
    fn explorer_link_points_at_block() {
        assert_eq!(
            explorer_block_link("0xabc"),
            "https://explorer.shimmer.network/shimmer/block/0xabc"
        );
    }

    #[test]
    fn ensure_exists_is_idempotent() {
        let history = temp_history();
        history.ensure_exists().unwrap();
        history
            .record(&SentRecord::new("smr1keep", "0xnft", "block"))
            .unwrap();
        history.ensure_exists().unwrap();

        let contents = std::fs::read_to_string(history.path()).unwrap();
        assert!(contents.contains("smr1keep"), "existing rows survive");

        std::fs::remove_file(history.path()).unwrap();
    }
}
