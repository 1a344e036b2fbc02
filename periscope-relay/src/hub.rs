use axum::extract::ws::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Identifies one relay connection for membership and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The relay's connection set. A message received from one member is
/// forwarded unmodified to every other member; nothing is interpreted or
/// stored.
///
/// Membership and the whole forward cycle run under a single exclusion
/// lock, so a forward never targets a connection removed concurrently.
#[derive(Clone, Default)]
pub struct Hub {
    members: Arc<Mutex<HashMap<ConnId, mpsc::UnboundedSender<Message>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new member and return its id.
    pub fn register(&self, tx: mpsc::UnboundedSender<Message>) -> ConnId {
        let id = ConnId::new();
        self.members.lock().expect("hub lock poisoned").insert(id, tx);
        id
    }

    /// Remove a member. Subsequent forwards never target it again.
    pub fn unregister(&self, id: ConnId) {
        self.members.lock().expect("hub lock poisoned").remove(&id);
    }

    /// Forward `msg` to every member except `from`. A failed send to one
    /// recipient is logged and does not abort delivery to the rest; the
    /// failing connection is cleaned up by its own read loop, not here.
    pub fn broadcast(&self, from: ConnId, msg: Message) {
        let members = self.members.lock().expect("hub lock poisoned");
        for (id, tx) in members.iter() {
            if *id == from {
                continue;
            }
            if tx.send(msg.clone()).is_err() {
                warn!("relay write to {id} failed, leaving cleanup to its read loop");
            }
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().expect("hub lock poisoned").len()
    }
}
