use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of a poll.
///
/// A poll that has never gone live (`Draft`) is distinct from one that has
/// finished collecting votes (`Ended`); the three states are deliberately an
/// enum rather than a boolean flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    /// Created but not yet accepting votes.
    Draft,
    /// The single poll currently accepting votes.
    Live,
    /// Terminal state; results are frozen.
    Ended,
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PollState::Draft => "draft",
            PollState::Live => "live",
            PollState::Ended => "ended",
        };
        f.write_str(label)
    }
}

/// Aggregate poll entity persisted by the storage layer.
///
/// Tallies are stored positionally, aligned with `options`, so the storage
/// backend can increment a single counter without interpreting option text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollEntity {
    /// Primary key of the poll.
    pub id: Uuid,
    /// Question shown to voters.
    pub question: String,
    /// Ordered, unique answer options; immutable after creation.
    pub options: Vec<String>,
    /// Current lifecycle state.
    pub state: PollState,
    /// Identity of the teacher who created the poll.
    pub created_by: String,
    /// Per-option vote counts, index-aligned with `options`.
    pub tallies: Vec<u64>,
    /// Identities that have successfully voted on this poll.
    pub voted_users: Vec<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Set exactly once on the draft-to-live transition.
    pub activated_at: Option<SystemTime>,
    /// Set exactly once on the transition into the ended state.
    pub ended_at: Option<SystemTime>,
    /// Optional vote window in seconds, measured from activation.
    pub duration_secs: Option<u64>,
}

impl PollEntity {
    /// Build a fresh draft poll with zero-initialised tallies.
    pub fn new(
        question: String,
        options: Vec<String>,
        created_by: String,
        duration_secs: Option<u64>,
    ) -> Self {
        let tallies = vec![0; options.len()];
        Self {
            id: Uuid::new_v4(),
            question,
            options,
            state: PollState::Draft,
            created_by,
            tallies,
            voted_users: Vec::new(),
            created_at: SystemTime::now(),
            activated_at: None,
            ended_at: None,
            duration_secs,
        }
    }

    /// Instant after which votes must be refused, when a duration is set.
    pub fn deadline(&self) -> Option<SystemTime> {
        let activated_at = self.activated_at?;
        let duration = Duration::from_secs(self.duration_secs?);
        Some(activated_at + duration)
    }

    /// Whether the vote window has elapsed at `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Position of `option` in the option list, if it is a member.
    pub fn option_index(&self, option: &str) -> Option<usize> {
        self.options.iter().position(|candidate| candidate == option)
    }

    /// Whether `voter` has already voted on this poll.
    pub fn has_voted(&self, voter: &str) -> bool {
        self.voted_users.iter().any(|existing| existing == voter)
    }

    /// Total number of recorded votes.
    pub fn total_votes(&self) -> u64 {
        self.tallies.iter().sum()
    }

    /// Option-keyed view of the tallies, preserving option order.
    pub fn results(&self) -> IndexMap<String, u64> {
        self.options
            .iter()
            .cloned()
            .zip(self.tallies.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll() -> PollEntity {
        PollEntity::new(
            "Color?".into(),
            vec!["Red".into(), "Blue".into()],
            "teacher-1".into(),
            Some(60),
        )
    }

    #[test]
    fn new_poll_starts_draft_with_zero_tallies() {
        let poll = poll();
        assert_eq!(poll.state, PollState::Draft);
        assert_eq!(poll.tallies, vec![0, 0]);
        assert!(poll.voted_users.is_empty());
        assert!(poll.activated_at.is_none());
        assert!(poll.ended_at.is_none());
    }

    #[test]
    fn deadline_requires_activation() {
        let mut poll = poll();
        assert!(poll.deadline().is_none());

        let activated = SystemTime::now();
        poll.activated_at = Some(activated);
        assert_eq!(poll.deadline(), Some(activated + Duration::from_secs(60)));
        assert!(!poll.is_expired(activated + Duration::from_secs(59)));
        assert!(poll.is_expired(activated + Duration::from_secs(60)));
    }

    #[test]
    fn option_lookup_is_case_sensitive() {
        let poll = poll();
        assert_eq!(poll.option_index("Red"), Some(0));
        assert_eq!(poll.option_index("red"), None);
    }

    #[test]
    fn results_preserve_option_order() {
        let mut poll = poll();
        poll.tallies = vec![3, 1];
        let results = poll.results();
        assert_eq!(
            results.into_iter().collect::<Vec<_>>(),
            vec![("Red".to_string(), 3), ("Blue".to_string(), 1)]
        );
        assert_eq!(poll.total_votes(), 4);
    }
}
