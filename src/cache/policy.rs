//! Cache policies and the expiry model.

use std::num::NonZeroU64;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::{CourierError, Result};

/// How long a cached response stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Entries are expired the instant they are written, but remain readable.
    ExpireImmediately,
    /// Entries expire after the given number of seconds (at least one; a zero
    /// duration is unrepresentable).
    Timed(NonZeroU64),
    /// Entries never expire.
    Forever,
}

impl CachePolicy {
    /// Timed policy, rejecting a zero duration at construction.
    pub fn timed(seconds: u64) -> Result<Self> {
        NonZeroU64::new(seconds)
            .map(Self::Timed)
            .ok_or_else(|| CourierError::config("timed cache policy requires seconds >= 1"))
    }

    /// Deadline this policy produces for a write happening at `now`.
    pub fn deadline(&self, now: SystemTime) -> Expiry {
        match self {
            Self::ExpireImmediately => Expiry::At(now),
            Self::Timed(seconds) => Expiry::At(now + Duration::from_secs(seconds.get())),
            Self::Forever => Expiry::Never,
        }
    }

    /// Shorter-policy rule: would this policy, evaluated now, produce a
    /// deadline earlier than the stored expiry? If so the stored entry is
    /// treated as expired: a new, stricter policy shortens validity.
    pub(crate) fn shortens(&self, stored: Expiry, now: SystemTime) -> bool {
        match (self.deadline(now), stored) {
            (Expiry::Never, _) => false,
            (Expiry::At(_), Expiry::Never) => true,
            (Expiry::At(deadline), Expiry::At(stored_at)) => deadline < stored_at,
        }
    }
}

/// Point past which a cache entry no longer counts as fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expiry {
    At(SystemTime),
    Never,
}

impl Expiry {
    /// An entry is expired iff its expiry is a concrete instant at or before `now`.
    pub fn is_elapsed(&self, now: SystemTime) -> bool {
        match self {
            Self::At(instant) => *instant <= now,
            Self::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_zero_is_rejected() {
        assert!(matches!(
            CachePolicy::timed(0),
            Err(CourierError::Config(_))
        ));
        assert!(CachePolicy::timed(1).is_ok());
    }

    #[test]
    fn deadlines_follow_the_policy() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);

        assert_eq!(
            CachePolicy::ExpireImmediately.deadline(now),
            Expiry::At(now)
        );
        assert_eq!(
            CachePolicy::timed(60).unwrap().deadline(now),
            Expiry::At(now + Duration::from_secs(60))
        );
        assert_eq!(CachePolicy::Forever.deadline(now), Expiry::Never);
    }

    #[test]
    fn expiry_monotonicity() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let expiry = CachePolicy::timed(60).unwrap().deadline(t0);

        assert!(!expiry.is_elapsed(t0));
        assert!(!expiry.is_elapsed(t0 + Duration::from_secs(59)));
        assert!(expiry.is_elapsed(t0 + Duration::from_secs(60)));
        assert!(expiry.is_elapsed(t0 + Duration::from_secs(3600)));

        assert!(!Expiry::Never.is_elapsed(t0 + Duration::from_secs(u32::MAX as u64)));
        assert!(Expiry::At(t0).is_elapsed(t0));
    }

    #[test]
    fn shorter_policy_marks_fresh_entries_expired() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        let stored = Expiry::At(now + Duration::from_secs(3600));

        // Timed(60) produces an earlier deadline than the stored hour.
        assert!(CachePolicy::timed(60).unwrap().shortens(stored, now));
        // An equal-or-later deadline leaves the entry alone.
        assert!(!CachePolicy::timed(3600).unwrap().shortens(stored, now));
        assert!(!CachePolicy::timed(7200).unwrap().shortens(stored, now));
        // Immediate expiry always shortens a timed entry.
        assert!(CachePolicy::ExpireImmediately.shortens(stored, now));
        // Forever never shortens anything.
        assert!(!CachePolicy::Forever.shortens(stored, now));
        // Any timed policy shortens a never-expiring entry.
        assert!(CachePolicy::timed(60).unwrap().shortens(Expiry::Never, now));
    }
}
