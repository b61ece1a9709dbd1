//! Shared application state.

pub mod clients;
pub mod lifecycle;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::{
    config::AppConfig,
    dao::poll_store::PollStore,
    error::ServiceError,
    services::credential_service::CredentialService,
    state::clients::ClientRegistry,
};

/// State shared by every route handler and background task.
pub struct AppState {
    config: AppConfig,
    /// Installed by the storage supervisor; `None` while degraded.
    poll_store: RwLock<Option<Arc<dyn PollStore>>>,
    clients: ClientRegistry,
    credentials: CredentialService,
    /// Serializes lifecycle dispatch with its fan-out, so events leave this
    /// process in the order the transitions were applied.
    dispatch_gate: Mutex<()>,
}

/// Shared handle to [`AppState`].
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the shared state from configuration. The poll store starts
    /// empty; the application is degraded until one is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let credentials = CredentialService::new(&config.jwt_secret, config.credential_ttl);
        Arc::new(Self {
            config,
            poll_store: RwLock::new(None),
            clients: ClientRegistry::default(),
            credentials,
            dispatch_gate: Mutex::new(()),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Connection registry for the websocket gateway.
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Credential issuing and verification service.
    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    /// Gate held across a lifecycle transition and its broadcast.
    pub fn dispatch_gate(&self) -> &Mutex<()> {
        &self.dispatch_gate
    }

    /// Current poll store, if one is installed.
    pub async fn poll_store(&self) -> Option<Arc<dyn PollStore>> {
        self.poll_store.read().await.clone()
    }

    /// Current poll store, or [`ServiceError::Degraded`] when none is
    /// installed.
    pub async fn require_poll_store(&self) -> Result<Arc<dyn PollStore>, ServiceError> {
        self.poll_store
            .read()
            .await
            .clone()
            .ok_or(ServiceError::Degraded)
    }

    /// Install a poll store, leaving degraded mode.
    pub async fn install_poll_store(&self, store: Arc<dyn PollStore>) {
        *self.poll_store.write().await = Some(store);
    }

    /// Drop the poll store, entering degraded mode.
    pub async fn clear_poll_store(&self) {
        *self.poll_store.write().await = None;
    }

    /// Whether the application currently has no storage attached.
    pub async fn is_degraded(&self) -> bool {
        self.poll_store.read().await.is_none()
    }
}
