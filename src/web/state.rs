//! Shared state behind the HTTP and WebSocket handlers.

use crate::pipeline::SessionState;
use crate::reading::{ConvertedValue, UnitControl};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::trace;

/// A connected WebSocket client.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub connected_at: SystemTime,
}

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    units: UnitControl,
    session: watch::Receiver<SessionState>,
    latest: Arc<watch::Sender<Option<ConvertedValue>>>,
    readings: broadcast::Sender<ConvertedValue>,
    clients: Arc<RwLock<HashMap<String, Client>>>,
    max_connections: usize,
}

impl AppState {
    pub fn new(
        units: UnitControl,
        session: watch::Receiver<SessionState>,
        broadcast_capacity: usize,
        max_connections: usize,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        let (readings, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            units,
            session,
            latest: Arc::new(latest),
            readings,
            clients: Arc::new(RwLock::new(HashMap::new())),
            max_connections,
        }
    }

    /// Record a delivered value as the latest and fan it out to clients.
    pub fn publish(&self, value: ConvertedValue) {
        self.latest.send_replace(Some(value));
        // No receivers just means no clients are connected
        if let Ok(receivers) = self.readings.send(value) {
            trace!("Broadcast {} to {} clients", value, receivers);
        }
    }

    /// Last delivered value; stays available after the session ends.
    pub fn latest(&self) -> Option<ConvertedValue> {
        *self.latest.borrow()
    }

    pub fn subscribe_readings(&self) -> broadcast::Receiver<ConvertedValue> {
        self.readings.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        *self.session.borrow()
    }

    /// Whether a session is currently delivering fresh values.
    pub fn is_live(&self) -> bool {
        self.session_state() == SessionState::Open
    }

    pub fn units(&self) -> &UnitControl {
        &self.units
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub async fn register_client(&self, client: Client) {
        self.clients.write().await.insert(client.id.clone(), client);
    }

    /// Forget a client, returning it if it was registered.
    pub async fn remove_client(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
