// Agent Session Registry
//
// Tracks the scanning agents currently connected to the listener.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A connected agent
#[derive(Debug, Clone)]
pub struct AgentSession {
    pub id: String,

    /// Zone label sent by the agent on connect
    pub label: String,

    pub addr: SocketAddr,

    pub connected_at: DateTime<Local>,
}

impl AgentSession {
    pub fn new(label: String, addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label,
            addr,
            connected_at: Local::now(),
        }
    }
}

pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, AgentSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, label: String, addr: SocketAddr) -> AgentSession {
        let session = AgentSession::new(label, addr);
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub async fn remove(&self, id: &str) -> Option<AgentSession> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id)
    }

    /// Oldest connection first
    pub async fn list(&self) -> Vec<AgentSession> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<_> = sessions.values().cloned().collect();
        list.sort_by_key(|s| s.connected_at);
        list
    }

    pub async fn count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_register_and_remove() {
        let registry = SessionRegistry::new();
        let room = registry.register("Room1".to_string(), addr(4001)).await;
        let canteen = registry.register("Canteen".to_string(), addr(4002)).await;
        assert_ne!(room.id, canteen.id);
        assert_eq!(registry.count().await, 2);
        assert_eq!(registry.list().await[0].label, "Room1");

        let removed = registry.remove(&room.id).await.unwrap();
        assert_eq!(removed.addr, addr(4001));
        assert!(registry.remove(&room.id).await.is_none());

        let remaining = registry.list().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].label, "Canteen");
    }
}
