use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

pub const MAX_SUBMISSION_LEN: usize = 4096;

/// Structural validity check for a candidate address. Implemented by the
/// wallet client against the node; tests substitute fixtures.
#[async_trait]
pub trait ValidityOracle: Send + Sync {
    async fn is_address_valid(&self, address: &str) -> Result<bool>;
}

/// Pulls the first HRP-anchored address token out of free-text submissions.
#[derive(Debug, Clone)]
pub struct AddressExtractor {
    pattern: Regex,
}

impl AddressExtractor {
    pub fn new(hrp: &str) -> Result<Self> {
        assert!(!hrp.is_empty(), "Address HRP must be provided");
        assert!(hrp.len() <= 16, "Address HRP exceeds defensive bound");
        let pattern = Regex::new(&format!(r"{}1\w+", regex::escape(hrp)))
            .with_context(|| format!("Failed to compile address pattern for HRP {hrp}"))?;
        Ok(Self { pattern })
    }

    /// Returns the first address-shaped token, or `None` when the text
    /// carries nothing usable. Callers drop such submissions silently.
    pub fn extract(&self, text: &str) -> Option<String> {
        if text.len() > MAX_SUBMISSION_LEN {
            debug!("Submission exceeds {MAX_SUBMISSION_LEN} bytes, skipping");
            return None;
        }
        self.pattern.find(text).map(|m| m.as_str().to_string())
    }
}

/// Validity is the conjunction of the configured HRP prefix and the
/// external oracle's structural check.
pub struct AddressValidator {
    hrp: String,
    oracle: Arc<dyn ValidityOracle>,
}

impl AddressValidator {
    pub fn new(hrp: impl Into<String>, oracle: Arc<dyn ValidityOracle>) -> Self {
        let hrp = hrp.into();
        assert!(!hrp.is_empty(), "Address HRP must be provided");
        Self { hrp, oracle }
    }

    pub fn hrp(&self) -> &str {
        &self.hrp
    }

    pub async fn is_valid(&self, address: &str) -> Result<bool> {
        if !address.starts_with(&self.hrp) {
            debug!("Address {address} does not carry the {} HRP", self.hrp);
            return Ok(false);
        }
        self.oracle
            .is_address_valid(address)
            .await
            .with_context(|| format!("Validity check failed for {address}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PrefixOracle;

    #[async_trait]
    impl ValidityOracle for PrefixOracle {
        async fn is_address_valid(&self, address: &str) -> Result<bool> {
            Ok(address.len() > 4)
        }
    }

    struct RejectingOracle;

    #[async_trait]
    impl ValidityOracle for RejectingOracle {
        async fn is_address_valid(&self, _address: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn extracts_address_from_surrounding_text() {
        let extractor = AddressExtractor::new("smr").expect("pattern compiles");
        assert_eq!(
            extractor.extract("please use smr1xyz thanks"),
            Some("smr1xyz".to_string())
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        let extractor = AddressExtractor::new("smr").expect("pattern compiles");
        let first = extractor.extract("my address: smr1qqk87fj").unwrap();
        assert_eq!(extractor.extract(&first), Some(first.clone()));
    }

    #[test]
    fn extraction_drops_unmatched_text() {
        let extractor = AddressExtractor::new("smr").expect("pattern compiles");
        assert_eq!(extractor.extract("i forgot my wallet"), None);
        assert_eq!(extractor.extract(""), None);
    }

    #[test]
    fn extraction_requires_hrp_separator() {
        let extractor = AddressExtractor::new("smr").expect("pattern compiles");
        assert_eq!(extractor.extract("smrabc"), None);
    }

    #[tokio::test]
    async fn validity_requires_both_prefix_and_oracle() {
        let validator = AddressValidator::new("smr", Arc::new(PrefixOracle));
        assert!(validator.is_valid("smr1qqk87fj").await.unwrap());
        // Wrong prefix short-circuits before the oracle.
        assert!(!validator.is_valid("iota1qqk87fj").await.unwrap());

        let strict = AddressValidator::new("smr", Arc::new(RejectingOracle));
        assert!(!strict.is_valid("smr1qqk87fj").await.unwrap());
    }
}
