//! Caller-side dedup of push challenges arriving over several channels.

use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::PushChallenge;

/// Pending push challenges keyed by transaction id.
///
/// The engine itself remembers nothing between flows; an inbox is for
/// callers that combine notification delivery with periodic pulls and must
/// not show the same transaction twice.
#[derive(Debug, Default)]
pub struct PushInbox {
    pending: DashMap<String, PushChallenge>,
}

impl PushInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a challenge. Returns false when its transaction is already pending.
    pub fn insert(&self, challenge: PushChallenge) -> bool {
        let transaction_id = challenge.transaction_id().to_string();
        match self.pending.entry(transaction_id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                debug!(transaction_id = %entry.key(), "Duplicate push challenge ignored");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(challenge);
                true
            }
        }
    }

    /// Store every challenge, returning the ones that were new.
    pub fn extend(&self, challenges: impl IntoIterator<Item = PushChallenge>) -> Vec<PushChallenge> {
        challenges
            .into_iter()
            .filter(|challenge| self.insert(challenge.clone()))
            .collect()
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.pending.contains_key(transaction_id)
    }

    /// Remove a challenge so it can be resolved.
    pub fn take(&self, transaction_id: &str) -> Option<PushChallenge> {
        self.pending.remove(transaction_id).map(|(_, challenge)| challenge)
    }

    /// Drop expired challenges, returning how many were removed.
    pub fn prune_expired(&self, clock_skew: Duration) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, challenge| !challenge.is_expired(clock_skew));
        before.saturating_sub(self.pending.len())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{challenge_claims, parse};

    #[tokio::test]
    async fn test_same_transaction_is_kept_once() {
        let inbox = PushInbox::new();
        let first = PushChallenge::new(parse(&challenge_claims("tx-1")).await);
        let again = PushChallenge::new(parse(&challenge_claims("tx-1")).await);
        let other = PushChallenge::new(parse(&challenge_claims("tx-2")).await);

        assert!(inbox.insert(first));
        let fresh = inbox.extend([again, other]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].transaction_id(), "tx-2");
        assert_eq!(inbox.len(), 2);

        assert!(inbox.take("tx-1").is_some());
        assert!(!inbox.contains("tx-1"));
        assert_eq!(inbox.prune_expired(Duration::from_secs(300)), 0);
    }
}
