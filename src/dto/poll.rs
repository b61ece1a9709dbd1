use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{PollEntity, PollState},
    dto::format_system_time,
};

/// Request body for creating a draft poll.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePollRequest {
    /// Question shown to voters.
    #[validate(length(min = 1, max = 500, message = "question must be 1 to 500 characters"))]
    pub question: String,
    /// Answer options, in display order.
    #[validate(length(min = 2, max = 5, message = "a poll needs 2 to 5 options"))]
    pub options: Vec<String>,
    /// Optional lifetime in seconds once activated.
    #[validate(range(min = 15, max = 86400, message = "duration must be 15s to 24h"))]
    pub duration_secs: Option<u64>,
}

/// Full poll view sent to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollSnapshot {
    /// Poll identifier.
    pub id: Uuid,
    /// Question shown to voters.
    pub question: String,
    /// Answer options, in display order.
    pub options: Vec<String>,
    /// Current lifecycle state.
    pub state: PollState,
    /// User that created the poll.
    pub created_by: String,
    /// Vote counts keyed by option text, in option order.
    pub results: IndexMap<String, u64>,
    /// Total number of recorded votes.
    pub total_votes: u64,
    /// Creation instant, RFC 3339.
    pub created_at: String,
    /// Activation instant, RFC 3339, once live.
    pub activated_at: Option<String>,
    /// End instant, RFC 3339, once ended.
    pub ended_at: Option<String>,
    /// Configured lifetime in seconds, if any.
    pub duration_secs: Option<u64>,
}

impl From<PollEntity> for PollSnapshot {
    fn from(value: PollEntity) -> Self {
        Self {
            id: value.id,
            question: value.question.clone(),
            state: value.state,
            created_by: value.created_by.clone(),
            results: value.results(),
            total_votes: value.total_votes(),
            created_at: format_system_time(value.created_at),
            activated_at: value.activated_at.map(format_system_time),
            ended_at: value.ended_at.map(format_system_time),
            duration_secs: value.duration_secs,
            options: value.options,
        }
    }
}

/// Aggregated results for a single poll.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollResultsResponse {
    /// Poll identifier.
    pub poll_id: Uuid,
    /// Current lifecycle state.
    pub state: PollState,
    /// Vote counts keyed by option text, in option order.
    pub results: IndexMap<String, u64>,
    /// Total number of recorded votes.
    pub total_votes: u64,
}

impl From<PollEntity> for PollResultsResponse {
    fn from(value: PollEntity) -> Self {
        Self {
            poll_id: value.id,
            state: value.state,
            results: value.results(),
            total_votes: value.total_votes(),
        }
    }
}
