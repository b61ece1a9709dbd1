//! Registry of live websocket connections.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::ws::{Participant, ServerEvent},
    services::credential_service::{Identity, Role},
};

/// One open websocket connection and its outbound channel.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Connection identifier, distinct from the user identifier so the same
    /// user may hold several tabs.
    pub id: Uuid,
    /// Verified identity the connection authenticated with.
    pub identity: Identity,
    /// Sender feeding the connection's dedicated writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// All connections currently attached to the gateway.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    connections: DashMap<Uuid, ClientConnection>,
}

impl ClientRegistry {
    /// Register a freshly accepted connection.
    pub fn insert(&self, connection: ClientConnection) {
        self.connections.insert(connection.id, connection);
    }

    /// Drop a connection, returning it if it was still registered.
    pub fn remove(&self, connection_id: Uuid) -> Option<ClientConnection> {
        self.connections
            .remove(&connection_id)
            .map(|(_, connection)| connection)
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no client is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connected users, as shown to teachers.
    pub fn participants(&self) -> Vec<Participant> {
        self.connections
            .iter()
            .map(|entry| Participant {
                user_id: entry.identity.user_id.clone(),
                role: entry.identity.role,
            })
            .collect()
    }

    /// Send an event to a single connection.
    pub fn send_to(&self, connection_id: Uuid, event: &ServerEvent) {
        let Some(payload) = serialize(event) else {
            return;
        };
        if let Some(connection) = self.connections.get(&connection_id) {
            deliver(&connection, payload);
        }
    }

    /// Send an event to every connection.
    pub fn broadcast_all(&self, event: &ServerEvent) {
        let Some(payload) = serialize(event) else {
            return;
        };
        for connection in self.connections.iter() {
            deliver(&connection, payload.clone());
        }
    }

    /// Send an event to every connection holding the given role.
    pub fn broadcast_role(&self, role: Role, event: &ServerEvent) {
        let Some(payload) = serialize(event) else {
            return;
        };
        for connection in self.connections.iter() {
            if connection.identity.role == role {
                deliver(&connection, payload.clone());
            }
        }
    }
}

fn serialize(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(payload) => Some(payload),
        Err(error) => {
            warn!(%error, "failed to serialize websocket event");
            None
        }
    }
}

fn deliver(connection: &ClientConnection, payload: String) {
    // A send error means the writer task is gone; the reader loop will
    // unregister the connection on its way out.
    if connection.tx.send(Message::Text(payload.into())).is_err() {
        warn!(connection = %connection.id, "dropping event for closed connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::ws::{ConnectionUpdate, ErrorEvent};
    use crate::error::ErrorCode;

    fn connection(role: Role, user: &str) -> (ClientConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ClientConnection {
            id: Uuid::new_v4(),
            identity: Identity {
                user_id: user.to_owned(),
                role,
            },
            tx,
        };
        (conn, rx)
    }

    fn sample_event() -> ServerEvent {
        ServerEvent::ConnectionStatus(ConnectionUpdate {
            user_id: "student-1".into(),
            role: Role::Student,
            status: "connected".into(),
            active_connections: 1,
        })
    }

    #[test]
    fn broadcast_role_only_reaches_matching_connections() {
        let registry = ClientRegistry::default();
        let (teacher, mut teacher_rx) = connection(Role::Teacher, "teacher-1");
        let (student, mut student_rx) = connection(Role::Student, "student-1");
        registry.insert(teacher);
        registry.insert(student);

        registry.broadcast_role(Role::Teacher, &sample_event());

        assert!(teacher_rx.try_recv().is_ok());
        assert!(student_rx.try_recv().is_err());
    }

    #[test]
    fn send_to_targets_one_connection() {
        let registry = ClientRegistry::default();
        let (first, mut first_rx) = connection(Role::Student, "student-1");
        let (second, mut second_rx) = connection(Role::Student, "student-2");
        let first_id = first.id;
        registry.insert(first);
        registry.insert(second);

        let event = ServerEvent::Error(ErrorEvent {
            code: ErrorCode::Validation,
            message: "bad input".into(),
        });
        registry.send_to(first_id, &event);

        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn remove_unregisters_the_connection() {
        let registry = ClientRegistry::default();
        let (conn, _rx) = connection(Role::Student, "student-1");
        let id = conn.id;
        registry.insert(conn);
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id).is_some());
        assert!(registry.is_empty());
    }
}
