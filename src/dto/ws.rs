//! Websocket action and event payloads.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::poll::{CreatePollRequest, PollSnapshot},
    error::ErrorCode,
    services::credential_service::Role,
};

/// Actions a connected client may submit over the websocket.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ClientAction {
    /// Create a draft poll (teacher only).
    CreatePoll(CreatePollRequest),
    /// Promote a draft to live (teacher only).
    ActivatePoll {
        /// Target poll.
        poll_id: Uuid,
    },
    /// End the live poll (teacher only).
    EndPoll {
        /// Target poll.
        poll_id: Uuid,
    },
    /// Cast a vote on the live poll (student only).
    SubmitVote {
        /// Target poll.
        poll_id: Uuid,
        /// Option text, matched case-sensitively.
        option: String,
    },
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A draft poll was created; teachers only.
    PollCreated(PollSnapshot),
    /// A poll went live; everyone.
    PollActivated(PollSnapshot),
    /// A poll ended, by hand or by deadline; everyone.
    PollEnded(PollSnapshot),
    /// Aggregated results changed after a vote; everyone.
    PollUpdated(ResultsUpdate),
    /// Operational detail for teachers alongside the public events.
    PollStatus(PollStatusEvent),
    /// A client joined or left the room.
    ConnectionStatus(ConnectionUpdate),
    /// A submitted action failed; sent to the origin connection only.
    Error(ErrorEvent),
}

/// Incremental results payload for `poll-updated`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResultsUpdate {
    /// Poll identifier.
    pub poll_id: Uuid,
    /// Vote counts keyed by option text, in option order.
    pub results: IndexMap<String, u64>,
}

/// Teacher-scoped detail accompanying lifecycle and vote events.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PollStatusEvent {
    /// A poll was activated.
    Activated {
        /// Poll identifier.
        poll_id: Uuid,
        /// Users currently connected to the room.
        participants: Vec<Participant>,
    },
    /// A poll ended.
    Ended {
        /// Poll identifier.
        poll_id: Uuid,
        /// Final vote counts keyed by option text.
        final_results: IndexMap<String, u64>,
        /// Number of connected clients at the time the poll ended.
        participants: usize,
    },
    /// A vote was recorded.
    VoteSubmitted {
        /// Poll identifier.
        poll_id: Uuid,
        /// Total votes recorded so far.
        total_votes: u64,
        /// Instant of the latest vote, RFC 3339.
        last_vote_at: String,
    },
}

/// A connected user as seen by teachers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Participant {
    /// Stable user identifier.
    pub user_id: String,
    /// Role the user connected with.
    pub role: Role,
}

/// Payload for `connection-status`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionUpdate {
    /// User whose connection changed.
    pub user_id: String,
    /// Role of that user.
    pub role: Role,
    /// `connected` or `disconnected`.
    pub status: String,
    /// Number of open connections after the change.
    pub active_connections: usize,
}

/// Payload for `error` events.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorEvent {
    /// Machine-readable failure category.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}
