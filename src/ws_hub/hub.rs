// =============================================================================
// Connection registry and fan-out
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::models::{Alert, ToplistRanking};

use super::connection::{ConnectionState, ServerMessage};

pub struct Hub {
    connections: RwLock<HashMap<String, ConnectionState>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, conn: ConnectionState) {
        self.connections.write().insert(conn.id.clone(), conn);
    }

    pub fn unregister(&self, id: &str) {
        self.connections.write().remove(id);
    }

    pub fn with_connection_mut<F: FnOnce(&mut ConnectionState)>(&self, id: &str, f: F) {
        if let Some(conn) = self.connections.write().get_mut(id) {
            f(conn);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Broadcast an alert to every connection subscribed to its symbol.
    /// Enqueue failure (the connection's bounded channel is full, i.e. a
    /// slow consumer) drops the connection immediately rather than
    /// buffering further.
    pub fn broadcast_alert(&self, alert: &Alert) {
        let Ok(body) = serde_json::to_string(&ServerMessage::Alert(alert)) else {
            return;
        };
        let mut stale = Vec::new();
        for conn in self.connections.read().values() {
            if conn.should_receive_alert(alert) {
                if conn.send_queue.try_send(body.clone()).is_err() {
                    stale.push(conn.id.clone());
                }
            }
        }
        self.drop_stale(stale);
    }

    pub fn broadcast_toplist(&self, name: &str, rankings: &[ToplistRanking]) {
        let Ok(body) = serde_json::to_string(&ServerMessage::Toplist { name, rankings }) else {
            return;
        };
        let mut stale = Vec::new();
        for conn in self.connections.read().values() {
            if conn.should_receive_toplist(name) {
                if conn.send_queue.try_send(body.clone()).is_err() {
                    stale.push(conn.id.clone());
                }
            }
        }
        self.drop_stale(stale);
    }

    fn drop_stale(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let mut connections = self.connections.write();
        for id in ids {
            debug!(connection_id = %id, "dropping slow-consumer connection");
            connections.remove(&id);
        }
    }

    /// Remove connections whose last pong is older than `idle_timeout`.
    pub fn sweep_idle(&self, idle_timeout: Duration) -> usize {
        let mut connections = self.connections.write();
        let before = connections.len();
        connections.retain(|_, conn| !conn.is_idle(idle_timeout));
        before - connections.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
