//! In-process poll store.
//!
//! Backs the test suite and the storeless development mode. All conditional
//! updates run under a single write lock, which gives the same atomicity
//! guarantees as the database-backed conditional updates, within one process.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    dao::{
        models::{PollEntity, PollState},
        poll_store::{ActivationOutcome, PollStore, StorageResult, TransitionOutcome, VoteOutcome},
    },
    state::lifecycle::{self, LifecycleEvent},
};

/// Poll store keeping every entity in a shared in-memory map.
#[derive(Clone, Default)]
pub struct MemoryPollStore {
    polls: Arc<RwLock<HashMap<Uuid, PollEntity>>>,
}

impl MemoryPollStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn begin_live_inner(&self, id: Uuid, now: SystemTime) -> ActivationOutcome {
        let mut polls = self.polls.write().await;

        // Take the target out so the live poll can be ended in between.
        let Some(mut poll) = polls.remove(&id) else {
            return ActivationOutcome::NotFound;
        };

        let next = match lifecycle::next_state(poll.state, LifecycleEvent::Activate) {
            Ok(next) => next,
            Err(rejected) => {
                polls.insert(id, poll);
                return ActivationOutcome::NotDraft(rejected.from);
            }
        };

        let superseded = polls
            .values_mut()
            .find(|candidate| candidate.state == PollState::Live)
            .map(|live| {
                live.state = PollState::Ended;
                live.ended_at = Some(now);
                live.clone()
            });

        poll.state = next;
        poll.activated_at = Some(now);
        let activated = poll.clone();
        polls.insert(id, poll);

        ActivationOutcome::Activated {
            poll: activated,
            superseded,
        }
    }

    async fn end_live_inner(&self, id: Uuid, now: SystemTime) -> TransitionOutcome {
        let mut polls = self.polls.write().await;
        let Some(poll) = polls.get_mut(&id) else {
            return TransitionOutcome::NotFound;
        };

        match lifecycle::next_state(poll.state, LifecycleEvent::End) {
            Ok(next) => {
                poll.state = next;
                poll.ended_at = Some(now);
                TransitionOutcome::Ended(poll.clone())
            }
            Err(rejected) => TransitionOutcome::NotLive(rejected.from),
        }
    }

    async fn record_vote_inner(&self, id: Uuid, voter: String, option_index: usize) -> VoteOutcome {
        let mut polls = self.polls.write().await;
        let Some(poll) = polls.get_mut(&id) else {
            return VoteOutcome::NotFound;
        };

        if poll.state != PollState::Live {
            return VoteOutcome::NotLive(poll.state);
        }

        if poll.has_voted(&voter) {
            return VoteOutcome::DuplicateVote;
        }

        let Some(tally) = poll.tallies.get_mut(option_index) else {
            // The engine resolves the index from the same entity, so an
            // out-of-range index means the poll was swapped out underneath us.
            return VoteOutcome::NotFound;
        };
        *tally += 1;
        poll.voted_users.push(voter);

        VoteOutcome::Recorded(poll.clone())
    }
}

impl PollStore for MemoryPollStore {
    fn insert_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.polls.write().await.insert(poll.id, poll);
            Ok(())
        })
    }

    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.polls.read().await.get(&id).cloned()) })
    }

    fn find_by_state(
        &self,
        state: PollState,
    ) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let polls = store.polls.read().await;
            let mut matching: Vec<_> = polls
                .values()
                .filter(|poll| poll.state == state)
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(matching)
        })
    }

    fn list_polls(&self) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let polls = store.polls.read().await;
            let mut all: Vec<_> = polls.values().cloned().collect();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(all)
        })
    }

    fn begin_live(
        &self,
        id: Uuid,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ActivationOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.begin_live_inner(id, now).await) })
    }

    fn end_live(
        &self,
        id: Uuid,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.end_live_inner(id, now).await) })
    }

    fn record_vote(
        &self,
        id: Uuid,
        voter: String,
        option_index: usize,
    ) -> BoxFuture<'static, StorageResult<VoteOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.record_vote_inner(id, voter, option_index).await) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(question: &str) -> PollEntity {
        PollEntity::new(
            question.into(),
            vec!["Yes".into(), "No".into()],
            "teacher-1".into(),
            None,
        )
    }

    #[tokio::test]
    async fn activation_supersedes_the_live_poll() {
        let store = MemoryPollStore::new();
        let first = draft("First?");
        let second = draft("Second?");
        store.insert_poll(first.clone()).await.unwrap();
        store.insert_poll(second.clone()).await.unwrap();

        let now = SystemTime::now();
        match store.begin_live(first.id, now).await.unwrap() {
            ActivationOutcome::Activated { superseded, .. } => assert!(superseded.is_none()),
            other => panic!("expected activation, got {other:?}"),
        }

        match store.begin_live(second.id, now).await.unwrap() {
            ActivationOutcome::Activated { poll, superseded } => {
                assert_eq!(poll.state, PollState::Live);
                let superseded = superseded.expect("first poll should be superseded");
                assert_eq!(superseded.id, first.id);
                assert_eq!(superseded.state, PollState::Ended);
            }
            other => panic!("expected activation, got {other:?}"),
        }

        let live = store.find_by_state(PollState::Live).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, second.id);
    }

    #[tokio::test]
    async fn reactivation_is_rejected() {
        let store = MemoryPollStore::new();
        let poll = draft("Once?");
        store.insert_poll(poll.clone()).await.unwrap();

        let now = SystemTime::now();
        store.begin_live(poll.id, now).await.unwrap();
        store.end_live(poll.id, now).await.unwrap();

        assert_eq!(
            store.begin_live(poll.id, now).await.unwrap(),
            ActivationOutcome::NotDraft(PollState::Ended)
        );
    }

    #[tokio::test]
    async fn failed_activation_does_not_end_the_live_poll() {
        let store = MemoryPollStore::new();
        let poll = draft("Survivor?");
        store.insert_poll(poll.clone()).await.unwrap();

        let now = SystemTime::now();
        store.begin_live(poll.id, now).await.unwrap();

        assert_eq!(
            store.begin_live(Uuid::new_v4(), now).await.unwrap(),
            ActivationOutcome::NotFound
        );
        assert_eq!(
            store.begin_live(poll.id, now).await.unwrap(),
            ActivationOutcome::NotDraft(PollState::Live)
        );

        let live = store.find_by_state(PollState::Live).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, poll.id);
        assert!(live[0].ended_at.is_none());
    }

    #[tokio::test]
    async fn vote_is_conditional_on_state_and_voter() {
        let store = MemoryPollStore::new();
        let poll = draft("Vote?");
        store.insert_poll(poll.clone()).await.unwrap();

        assert_eq!(
            store
                .record_vote(poll.id, "student-1".into(), 0)
                .await
                .unwrap(),
            VoteOutcome::NotLive(PollState::Draft)
        );

        store.begin_live(poll.id, SystemTime::now()).await.unwrap();

        match store
            .record_vote(poll.id, "student-1".into(), 0)
            .await
            .unwrap()
        {
            VoteOutcome::Recorded(updated) => {
                assert_eq!(updated.tallies, vec![1, 0]);
                assert_eq!(updated.voted_users, vec!["student-1".to_string()]);
            }
            other => panic!("expected recorded vote, got {other:?}"),
        }

        assert_eq!(
            store
                .record_vote(poll.id, "student-1".into(), 1)
                .await
                .unwrap(),
            VoteOutcome::DuplicateVote
        );
    }

    #[tokio::test]
    async fn concurrent_votes_with_distinct_voters_all_count() {
        let store = MemoryPollStore::new();
        let poll = draft("Busy?");
        store.insert_poll(poll.clone()).await.unwrap();
        store.begin_live(poll.id, SystemTime::now()).await.unwrap();

        let votes = (0..32).map(|n| {
            let store = store.clone();
            let id = poll.id;
            async move { store.record_vote(id, format!("student-{n}"), n % 2).await }
        });
        for outcome in futures::future::join_all(votes).await {
            assert!(matches!(outcome.unwrap(), VoteOutcome::Recorded(_)));
        }

        let final_poll = store.find_poll(poll.id).await.unwrap().unwrap();
        assert_eq!(final_poll.total_votes(), 32);
        assert_eq!(final_poll.voted_users.len(), 32);
    }
}
