//! Websocket gateway: one task per connection, actions in, events out.
//!
//! Each connection gets a dedicated writer task fed through an unbounded
//! channel, so broadcasts never await a slow socket. Liveness is probed with
//! server-sent pings; a connection that misses a whole probe window is
//! dropped.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::ClientAction,
    error::ServiceError,
    services::{
        credential_service::Identity,
        gateway_events::{
            broadcast_connection_status, broadcast_poll_activated, broadcast_poll_created,
            broadcast_poll_ended, broadcast_vote_recorded, send_error,
        },
        poll_service,
    },
    state::{SharedState, clients::ClientConnection},
};

/// Drive an authenticated websocket connection until it closes.
pub async fn handle_socket(state: SharedState, socket: WebSocket, identity: Identity) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    state.clients().insert(ClientConnection {
        id: connection_id,
        identity: identity.clone(),
        tx: outbound_tx.clone(),
    });
    info!(connection = %connection_id, user = %identity.user_id, role = %identity.role, "client connected");
    broadcast_connection_status(&state, &identity, true);

    let mut ping_interval = tokio::time::interval(state.config().ping_interval);
    // The first tick fires immediately; skip it so the probe window starts
    // after the handshake.
    ping_interval.tick().await;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong {
                    warn!(connection = %connection_id, "liveness probe missed, closing");
                    break;
                }
                if outbound_tx.send(Message::Ping(Vec::new().into())).is_err() {
                    break;
                }
                awaiting_pong = true;
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, connection_id, &identity, text.as_str()).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        debug!(connection = %connection_id, %error, "websocket read failed");
                        break;
                    }
                }
            }
        }
    }

    state.clients().remove(connection_id);
    broadcast_connection_status(&state, &identity, false);
    info!(connection = %connection_id, user = %identity.user_id, "client disconnected");

    // Dropping the last sender ends the writer loop.
    drop(outbound_tx);
    let _ = writer.await;
}

async fn handle_text(
    state: &SharedState,
    connection_id: Uuid,
    identity: &Identity,
    text: &str,
) {
    let action: ClientAction = match serde_json::from_str(text) {
        Ok(action) => action,
        Err(error) => {
            let err = ServiceError::InvalidInput(format!("unreadable action: {error}"));
            send_error(state, connection_id, &err);
            return;
        }
    };
    dispatch(state, connection_id, identity, action).await;
}

/// Apply one action and fan out its events. The gate is held across both so
/// events leave this process in the order transitions were applied.
async fn dispatch(
    state: &SharedState,
    connection_id: Uuid,
    identity: &Identity,
    action: ClientAction,
) {
    let _ordering = state.dispatch_gate().lock().await;

    match action {
        ClientAction::CreatePoll(request) => {
            match poll_service::create_poll(state, identity, request).await {
                Ok(poll) => broadcast_poll_created(state, &poll),
                Err(err) => report_failure(state, connection_id, &err),
            }
        }
        ClientAction::ActivatePoll { poll_id } => {
            match poll_service::activate_poll(state, identity, poll_id).await {
                Ok(activated) => {
                    if let Some(superseded) = &activated.superseded {
                        broadcast_poll_ended(state, superseded);
                    }
                    broadcast_poll_activated(state, &activated.poll);
                }
                Err(err) => report_failure(state, connection_id, &err),
            }
        }
        ClientAction::EndPoll { poll_id } => {
            match poll_service::end_poll(state, identity, poll_id).await {
                Ok(poll) => broadcast_poll_ended(state, &poll),
                Err(err) => report_failure(state, connection_id, &err),
            }
        }
        ClientAction::SubmitVote { poll_id, option } => {
            match poll_service::submit_vote(state, identity, poll_id, &option).await {
                Ok(poll) => broadcast_vote_recorded(state, &poll),
                Err(err) => report_failure(state, connection_id, &err),
            }
        }
    }
}

fn report_failure(state: &SharedState, connection_id: Uuid, err: &ServiceError) {
    // A vote landing after the deadline force-ends the poll; everyone learns
    // about the end, only the voter sees the rejection.
    if let ServiceError::Expired(poll) = err {
        broadcast_poll_ended(state, poll);
    }
    send_error(state, connection_id, err);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::poll_store::memory::MemoryPollStore,
        dto::poll::CreatePollRequest,
        services::credential_service::Role,
        state::AppState,
    };

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_poll_store(Arc::new(MemoryPollStore::default()))
            .await;
        state
    }

    fn register(
        state: &SharedState,
        user: &str,
        role: Role,
    ) -> (Uuid, Identity, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = Identity {
            user_id: user.to_owned(),
            role,
        };
        let connection_id = Uuid::new_v4();
        state.clients().insert(ClientConnection {
            id: connection_id,
            identity: identity.clone(),
            tx,
        });
        (connection_id, identity, rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        match rx.try_recv().expect("expected a pending event") {
            Message::Text(text) => serde_json::from_str(text.as_str()).expect("event is json"),
            other => panic!("unexpected message {other:?}"),
        }
    }

    fn color_poll() -> CreatePollRequest {
        CreatePollRequest {
            question: "Color?".into(),
            options: vec!["Red".into(), "Blue".into()],
            duration_secs: None,
        }
    }

    #[tokio::test]
    async fn poll_created_reaches_teachers_only() {
        let state = test_state().await;
        let (teacher_conn, teacher, mut teacher_rx) = register(&state, "teacher-1", Role::Teacher);
        let (_, _, mut student_rx) = register(&state, "student-1", Role::Student);

        dispatch(
            &state,
            teacher_conn,
            &teacher,
            ClientAction::CreatePoll(color_poll()),
        )
        .await;

        let event = next_event(&mut teacher_rx);
        assert_eq!(event["event"], "poll-created");
        assert!(student_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn supersession_broadcasts_ended_before_activated() {
        let state = test_state().await;
        let (teacher_conn, teacher, mut teacher_rx) = register(&state, "teacher-1", Role::Teacher);
        let (_, _, mut student_rx) = register(&state, "student-1", Role::Student);

        let first = poll_service::create_poll(&state, &teacher, color_poll())
            .await
            .unwrap();
        let second = poll_service::create_poll(&state, &teacher, color_poll())
            .await
            .unwrap();

        dispatch(
            &state,
            teacher_conn,
            &teacher,
            ClientAction::ActivatePoll { poll_id: first.id },
        )
        .await;
        let event = next_event(&mut student_rx);
        assert_eq!(event["event"], "poll-activated");
        assert_eq!(event["data"]["id"], first.id.to_string());

        dispatch(
            &state,
            teacher_conn,
            &teacher,
            ClientAction::ActivatePoll { poll_id: second.id },
        )
        .await;

        let ended = next_event(&mut student_rx);
        assert_eq!(ended["event"], "poll-ended");
        assert_eq!(ended["data"]["id"], first.id.to_string());

        let activated = next_event(&mut student_rx);
        assert_eq!(activated["event"], "poll-activated");
        assert_eq!(activated["data"]["id"], second.id.to_string());

        // Teachers see the same public sequence, interleaved with status
        // detail.
        let public: Vec<String> = std::iter::from_fn(|| teacher_rx.try_recv().ok())
            .filter_map(|message| match message {
                Message::Text(text) => serde_json::from_str::<Value>(text.as_str()).ok(),
                _ => None,
            })
            .filter(|event| event["event"] != "poll-status")
            .map(|event| event["event"].as_str().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(public, vec!["poll-activated", "poll-ended", "poll-activated"]);
    }

    #[tokio::test]
    async fn engine_errors_stay_on_the_origin_connection() {
        let state = test_state().await;
        let (_, _, mut teacher_rx) = register(&state, "teacher-1", Role::Teacher);
        let (student_conn, student, mut student_rx) = register(&state, "student-1", Role::Student);

        dispatch(
            &state,
            student_conn,
            &student,
            ClientAction::SubmitVote {
                poll_id: Uuid::new_v4(),
                option: "Red".into(),
            },
        )
        .await;

        let event = next_event(&mut student_rx);
        assert_eq!(event["event"], "error");
        assert_eq!(event["data"]["code"], "not-found");
        assert!(student_rx.try_recv().is_err());
        assert!(teacher_rx.try_recv().is_err());
    }
}
