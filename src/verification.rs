use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::address::AddressValidator;
use crate::quest::{ClaimStatus, ClaimedQuest, MAX_REVIEW_BATCH, QuestClient};

/// Long-running verification workflow: polls pending address submissions,
/// validates every whitespace-separated token, and reports pass/fail back
/// to the quest platform with a user-facing comment.
pub struct VerificationTask {
    quest: QuestClient,
    validator: AddressValidator,
    address_quest_id: String,
    poll_interval: Duration,
}

impl VerificationTask {
    pub fn new(
        quest: QuestClient,
        validator: AddressValidator,
        address_quest_id: String,
        poll_interval: Duration,
    ) -> Self {
        assert!(
            poll_interval >= Duration::from_secs(1),
            "Poll interval must be at least one second"
        );
        Self {
            quest,
            validator,
            address_quest_id,
            poll_interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Get {} address from address submission quest",
            self.validator.hrp()
        );
        loop {
            let claims = match self
                .quest
                .fetch_claims(&self.address_quest_id, ClaimStatus::Pending)
                .await
            {
                Ok(claims) => claims,
                Err(err) => {
                    // Matches the deployed behavior: a failed fetch ends the
                    // verification loop while the distribution task keeps
                    // running.
                    warn!("Pending submission fetch failed, verification loop ends: {err:#}");
                    return;
                }
            };

            let (valid_ids, invalid_ids) = self.classify(&claims).await;
            debug!("valid claims {valid_ids:?}");
            debug!("invalid claims {invalid_ids:?}");

            if !valid_ids.is_empty() {
                let comment = format!(
                    "Thank you for submitting a valid {} address.",
                    self.validator.hrp()
                );
                self.post_reviews(&valid_ids, ClaimStatus::Success, &comment)
                    .await;
            }

            if !invalid_ids.is_empty() {
                let comment = format!(
                    "Thank you, but the submitted address is not valid. A valid address starts \
                     with {}. Download the official Firefly wallet from https://firefly.iota.org \
                     and submit a new address.",
                    self.validator.hrp()
                );
                self.post_reviews(&invalid_ids, ClaimStatus::Fail, &comment)
                    .await;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Verification shutdown signal received");
                                return;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting verification loop");
                            return;
                        }
                    }
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    /// Posts one review decision per platform-sized batch. Per-token
    /// classification can produce far more ids than one request accepts,
    /// so the list is split; a failed post is logged and the remaining
    /// batches still go out.
    async fn post_reviews(&self, claim_ids: &[String], status: ClaimStatus, comment: &str) {
        assert!(!claim_ids.is_empty(), "Review posting needs claim ids");
        for batch in claim_ids.chunks(MAX_REVIEW_BATCH) {
            if let Err(err) = self.quest.submit_review(batch, status, comment).await {
                warn!(
                    "Failed to post {} reviews for {} claims: {err:#}",
                    status.as_str(),
                    batch.len()
                );
            }
        }
    }

    /// Splits each submission on whitespace and validates every token
    /// independently. A claim id lands in the valid list when any token
    /// validates and in the invalid list once per failing token, so a
    /// mixed submission is reported on both sides.
    async fn classify(&self, claims: &[ClaimedQuest]) -> (Vec<String>, Vec<String>) {
        let mut valid_ids = Vec::new();
        let mut invalid_ids = Vec::new();

        for claim in claims {
            debug!("Validating submission {}", claim.id);
            for token in claim.submission.value.split_whitespace() {
                match self.validator.is_valid(token).await {
                    Ok(true) => valid_ids.push(claim.id.clone()),
                    Ok(false) => invalid_ids.push(claim.id.clone()),
                    Err(err) => {
                        warn!("Could not validate token in {} this cycle: {err:#}", claim.id);
                    }
                }
            }
        }

        (valid_ids, invalid_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ValidityOracle;
    use crate::quest::{QuestSubmission, QuestUser};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct SetOracle {
        valid: HashSet<String>,
    }

    #[async_trait]
    impl ValidityOracle for SetOracle {
        async fn is_address_valid(&self, address: &str) -> Result<bool> {
            Ok(self.valid.contains(address))
        }
    }

    fn validator(valid: &[&str]) -> AddressValidator {
        AddressValidator::new(
            "smr",
            Arc::new(SetOracle {
                valid: valid.iter().map(|v| v.to_string()).collect(),
            }),
        )
    }

    fn claim(id: &str, value: &str) -> ClaimedQuest {
        ClaimedQuest {
            id: id.to_string(),
            user: QuestUser {
                id: format!("user-{id}"),
            },
            submission: QuestSubmission {
                value: value.to_string(),
            },
        }
    }

    fn task(validator: AddressValidator) -> VerificationTask {
        let quest = QuestClient::new(
            "https://api.zealy.io",
            "community",
            "key",
            Duration::from_secs(5),
        )
        .unwrap();
        VerificationTask::new(
            quest,
            validator,
            "quest-1".to_string(),
            Duration::from_secs(120),
        )
    }

    #[tokio::test]
    async fn valid_and_invalid_tokens_are_classified() {
        let task = task(validator(&["smr1good"]));
        let claims = vec![claim("c1", "smr1good"), claim("c2", "smr1nope")];

        let (valid, invalid) = task.classify(&claims).await;
        assert_eq!(valid, vec!["c1"]);
        assert_eq!(invalid, vec!["c2"]);
    }

    #[tokio::test]
    async fn mixed_submission_lands_in_both_lists() {
        let task = task(validator(&["smr1good"]));
        let claims = vec![claim("c1", "please use smr1good not smr1bad")];

        let (valid, invalid) = task.classify(&claims).await;
        // Per-token reporting: the same claim passes and fails at once.
        assert_eq!(valid, vec!["c1"]);
        assert!(invalid.contains(&"c1".to_string()));
        // "please", "use", "not" and "smr1bad" each fail independently.
        assert_eq!(invalid.len(), 4);
    }

    #[tokio::test]
    async fn wrong_prefix_fails_without_reaching_the_oracle() {
        let task = task(validator(&["iota1good"]));
        let claims = vec![claim("c1", "iota1good")];

        let (valid, invalid) = task.classify(&claims).await;
        assert!(valid.is_empty());
        assert_eq!(invalid, vec!["c1"]);
    }

    #[tokio::test]
    async fn oversized_fail_batches_are_posted_in_bounded_chunks() {
        // Free-text submissions fan out to several invalid ids each, so a
        // modest page overshoots one review request. Point the client at a
        // closed local port: every post soft-fails, and the loop must walk
        // all batches without tripping the per-request bound.
        let quest = QuestClient::new(
            "http://127.0.0.1:9",
            "community",
            "key",
            Duration::from_secs(1),
        )
        .unwrap();
        let task = VerificationTask::new(
            quest,
            validator(&[]),
            "quest-1".to_string(),
            Duration::from_secs(120),
        );

        let claims: Vec<ClaimedQuest> = (0..130)
            .map(|n| claim(&format!("c{n}"), "here is my wallet address"))
            .collect();

        let (valid, invalid) = task.classify(&claims).await;
        assert!(valid.is_empty());
        assert_eq!(invalid.len(), 130 * 5);
        assert!(invalid.len() > MAX_REVIEW_BATCH);

        task.post_reviews(&invalid, ClaimStatus::Fail, "resubmit please")
            .await;
    }

    #[tokio::test]
    async fn empty_submission_reports_nothing() {
        let task = task(validator(&[]));
        let claims = vec![claim("c1", "   ")];

        let (valid, invalid) = task.classify(&claims).await;
        assert!(valid.is_empty());
        assert!(invalid.is_empty());
    }
}
