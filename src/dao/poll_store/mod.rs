//! Persistence contract for polls.
//!
//! Every mutating operation that could race (activation, ending, voting) is a
//! conditional update executed atomically by the backend, so the store remains
//! the single arbiter of lifecycle transitions even with several gateway
//! processes sharing one database.

pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{error::Error, time::SystemTime};

use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{PollEntity, PollState};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not service the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Outcome of the atomic draft-to-live activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The target poll went live; any previously live poll was force-ended.
    Activated {
        /// The freshly activated poll.
        poll: PollEntity,
        /// The poll that was live before and got superseded, if any.
        superseded: Option<PollEntity>,
    },
    /// No poll with the requested id exists.
    NotFound,
    /// The target poll was not in the draft state.
    NotDraft(PollState),
    /// Another poll went live concurrently (cross-process race).
    LiveConflict,
}

/// Outcome of the atomic live-to-ended transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The poll was ended; carries the final snapshot.
    Ended(PollEntity),
    /// No poll with the requested id exists.
    NotFound,
    /// The poll was not live.
    NotLive(PollState),
}

/// Outcome of the atomic conditional vote update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was counted; carries the updated snapshot.
    Recorded(PollEntity),
    /// No poll with the requested id exists.
    NotFound,
    /// The poll was not live.
    NotLive(PollState),
    /// The voter was already present in the voted set; nothing changed.
    DuplicateVote,
}

/// Abstraction over the persistence layer for polls.
pub trait PollStore: Send + Sync {
    /// Persist a freshly created draft poll.
    fn insert_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Fetch a poll by id.
    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollEntity>>>;
    /// Fetch all polls currently in `state`.
    fn find_by_state(&self, state: PollState)
    -> BoxFuture<'static, StorageResult<Vec<PollEntity>>>;
    /// Fetch every poll, newest first.
    fn list_polls(&self) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>>;
    /// Atomically end any live poll and promote `id` from draft to live.
    fn begin_live(
        &self,
        id: Uuid,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ActivationOutcome>>;
    /// Atomically transition `id` from live to ended, stamping `ended_at`.
    fn end_live(
        &self,
        id: Uuid,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>>;
    /// Atomically count a vote: increment the tally at `option_index` and
    /// append `voter`, but only while the poll is live and the voter absent.
    fn record_vote(
        &self,
        id: Uuid,
        voter: String,
        option_index: usize,
    ) -> BoxFuture<'static, StorageResult<VoteOutcome>>;
    /// Probe backend connectivity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish a lost backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
