//! Fan-out of lifecycle and vote events to connected clients.
//!
//! Public events go to every connection; operational detail rides alongside
//! on teacher connections only. Errors never leave the origin connection.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::PollEntity,
    dto::{
        format_system_time,
        ws::{ConnectionUpdate, ErrorEvent, PollStatusEvent, ResultsUpdate, ServerEvent},
    },
    error::{ErrorCode, ServiceError},
    services::credential_service::{Identity, Role},
    state::SharedState,
};

/// Announce a freshly created draft to teachers.
pub fn broadcast_poll_created(state: &SharedState, poll: &PollEntity) {
    state
        .clients()
        .broadcast_role(Role::Teacher, &ServerEvent::PollCreated(poll.clone().into()));
}

/// Announce an activation to everyone, with participant detail for teachers.
pub fn broadcast_poll_activated(state: &SharedState, poll: &PollEntity) {
    let clients = state.clients();
    clients.broadcast_all(&ServerEvent::PollActivated(poll.clone().into()));
    clients.broadcast_role(
        Role::Teacher,
        &ServerEvent::PollStatus(PollStatusEvent::Activated {
            poll_id: poll.id,
            participants: clients.participants(),
        }),
    );
}

/// Announce an ended poll to everyone, with final results for teachers.
/// Covers manual ends, supersession, deadline sweeps, and late-vote ends.
pub fn broadcast_poll_ended(state: &SharedState, poll: &PollEntity) {
    let clients = state.clients();
    clients.broadcast_all(&ServerEvent::PollEnded(poll.clone().into()));
    clients.broadcast_role(
        Role::Teacher,
        &ServerEvent::PollStatus(PollStatusEvent::Ended {
            poll_id: poll.id,
            final_results: poll.results(),
            participants: clients.len(),
        }),
    );
}

/// Push updated tallies to everyone after a recorded vote.
pub fn broadcast_vote_recorded(state: &SharedState, poll: &PollEntity) {
    let clients = state.clients();
    clients.broadcast_all(&ServerEvent::PollUpdated(ResultsUpdate {
        poll_id: poll.id,
        results: poll.results(),
    }));
    clients.broadcast_role(
        Role::Teacher,
        &ServerEvent::PollStatus(PollStatusEvent::VoteSubmitted {
            poll_id: poll.id,
            total_votes: poll.total_votes(),
            last_vote_at: format_system_time(SystemTime::now()),
        }),
    );
}

/// Tell everyone a client joined or left.
pub fn broadcast_connection_status(state: &SharedState, identity: &Identity, connected: bool) {
    let clients = state.clients();
    clients.broadcast_all(&ServerEvent::ConnectionStatus(ConnectionUpdate {
        user_id: identity.user_id.clone(),
        role: identity.role,
        status: if connected { "connected" } else { "disconnected" }.to_string(),
        active_connections: clients.len(),
    }));
}

/// Report a failed action to the connection that submitted it.
pub fn send_error(state: &SharedState, connection_id: Uuid, error: &ServiceError) {
    state.clients().send_to(
        connection_id,
        &ServerEvent::Error(ErrorEvent {
            code: ErrorCode::from(error),
            message: error.to_string(),
        }),
    );
}
