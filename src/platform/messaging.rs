//! Push-messaging collaborator: permission, device token, foreground delivery.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    api::error,
    platform::document::{ListenerRegistration, SnapshotResult, Subscription},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[async_trait]
pub trait PushMessaging: Send + Sync {
    async fn request_permission(&self) -> Permission;

    /// Device token for this installation, `None` when none can be issued.
    async fn get_token(&self, vapid_key: &str) -> Result<Option<String>, error::SystemError>;

    /// Messages delivered while the app is in the foreground.
    fn on_message(&self) -> Subscription<PushPayload>;
}

type Listeners = HashMap<u64, mpsc::UnboundedSender<SnapshotResult<PushPayload>>>;

pub struct InMemoryPush {
    permission: Permission,
    token: Mutex<Option<String>>,
    listeners: Arc<Mutex<Listeners>>,
    next_listener: AtomicU64,
    issued: Mutex<HashSet<String>>,
}

impl InMemoryPush {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            token: Mutex::new(None),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(0),
            issued: Mutex::new(HashSet::new()),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulates a foreground delivery; returns how many listeners received it.
    pub fn deliver(&self, payload: PushPayload) -> usize {
        let mut listeners = self.listeners();
        listeners.retain(|_, tx| tx.send(Ok(payload.clone())).is_ok());
        listeners.len()
    }
}

#[async_trait]
impl PushMessaging for InMemoryPush {
    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn get_token(&self, vapid_key: &str) -> Result<Option<String>, error::SystemError> {
        if self.permission == Permission::Denied {
            return Ok(None);
        }
        let mut token = self.token.lock().unwrap_or_else(|p| p.into_inner());
        let issued = token
            .get_or_insert_with(|| format!("{}:{}", vapid_key.len(), Uuid::now_v7().simple()))
            .clone();
        self.issued.lock().unwrap_or_else(|p| p.into_inner()).insert(issued.clone());
        Ok(Some(issued))
    }

    fn on_message(&self) -> Subscription<PushPayload> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners().insert(id, tx);

        let weak = Arc::downgrade(&self.listeners);
        Subscription::new(
            rx,
            ListenerRegistration::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.lock().unwrap_or_else(|p| p.into_inner()).remove(&id);
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_is_stable_per_installation() {
        let push = InMemoryPush::new(Permission::Granted);
        let a = push.get_token("vapid").await.unwrap();
        let b = push.get_token("vapid").await.unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);

        let denied = InMemoryPush::new(Permission::Denied);
        assert_eq!(denied.get_token("vapid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn foreground_delivery_reaches_live_listeners_only() {
        let push = InMemoryPush::new(Permission::Granted);
        let mut sub = push.on_message();
        let payload = PushPayload { title: Some("oi".into()), ..Default::default() };
        assert_eq!(push.deliver(payload.clone()), 1);
        assert_eq!(sub.recv().await.unwrap().unwrap(), payload);

        drop(sub);
        assert_eq!(push.deliver(payload), 0);
    }
}
