use std::collections::HashSet;

use tracing::{debug, info};

/// A user that submitted an address through the address quest, paired with
/// the address token extracted from their submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitter {
    pub user_id: String,
    pub address: String,
}

impl Submitter {
    pub fn new(user_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            address: address.into(),
        }
    }
}

/// Intersects the winner set with the address submitters: every submitter
/// whose user id is in `winners` contributes their address, in submitter
/// order. No ordering is assumed on `winners` itself.
pub fn reconcile(winners: &HashSet<String>, submitters: &[Submitter]) -> Vec<String> {
    assert!(
        submitters.len() <= 100_000,
        "Submitter batch exceeds defensive bound"
    );

    let mut addresses = Vec::new();
    for submitter in submitters {
        if winners.contains(&submitter.user_id) {
            addresses.push(submitter.address.clone());
        }
    }
    debug!("Reconciled {} winner addresses", addresses.len());
    addresses
}

/// Removes repeated address values while preserving first-occurrence order.
pub fn unique_addresses(addresses: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(addresses.len());
    let mut unique = Vec::with_capacity(addresses.len());
    for address in addresses {
        if seen.insert(address.clone()) {
            unique.push(address);
        } else {
            info!("Skipping duplicate address: {address}");
        }
    }
    assert_eq!(
        seen.len(),
        unique.len(),
        "Dedup bookkeeping out of sync"
    );
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winners(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn reconcile_keeps_winning_submitters_in_order() {
        let winners = winners(&["1", "2", "3"]);
        let submitters = vec![
            Submitter::new("1", "smr1aaa"),
            Submitter::new("2", "smr1bbb"),
            Submitter::new("4", "smr1ccc"),
        ];

        let reconciled = reconcile(&winners, &submitters);
        assert_eq!(reconciled, vec!["smr1aaa", "smr1bbb"]);
    }

    #[test]
    fn reconcile_output_is_subset_of_submitters() {
        let winners = winners(&["7"]);
        let submitters = vec![
            Submitter::new("9", "smr1xxx"),
            Submitter::new("7", "smr1yyy"),
        ];

        let reconciled = reconcile(&winners, &submitters);
        for address in &reconciled {
            assert!(submitters.iter().any(|s| &s.address == address));
        }
        assert_eq!(reconciled, vec!["smr1yyy"]);
    }

    #[test]
    fn reconcile_empty_winners_yields_nothing() {
        let submitters = vec![Submitter::new("1", "smr1aaa")];
        assert!(reconcile(&HashSet::new(), &submitters).is_empty());
    }

    #[test]
    fn dedup_preserves_first_occurrence() {
        let input = vec![
            "smr1aaa".to_string(),
            "smr1bbb".to_string(),
            "smr1aaa".to_string(),
            "smr1ccc".to_string(),
            "smr1bbb".to_string(),
        ];
        let unique = unique_addresses(input);
        assert_eq!(unique, vec!["smr1aaa", "smr1bbb", "smr1ccc"]);
    }

    #[test]
    fn dedup_is_stable_on_already_unique_input() {
        let input = vec!["smr1one".to_string(), "smr1two".to_string()];
        assert_eq!(unique_addresses(input.clone()), input);
    }
}
