//! The identity → session cache.
//!
//! Each `(endpoint, username)` pair owns one slot guarded by its own async
//! mutex. Callers for the same slot queue on that mutex, so at most one
//! connect attempt per slot is in flight and later callers see its result.
//! Callers for different slots never wait on each other beyond the brief
//! lookup in the slot table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use keyscope_store::{Connector, StoreClient};
use keyscope_types::Identity;
use tokio::sync::Mutex;

use crate::error::{SessionError, SessionResult};

/// A live store session and the identity it was opened for.
pub struct ConnectionHandle {
    identity: Identity,
    client: Arc<dyn StoreClient>,
}

impl ConnectionHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn client(&self) -> &dyn StoreClient {
        self.client.as_ref()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

type SlotKey = (String, String);
type Slot = Arc<Mutex<Option<Arc<ConnectionHandle>>>>;

/// Process-lifetime cache of store sessions keyed by identity.
pub struct ConnectionCache {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    slots: Mutex<HashMap<SlotKey, Slot>>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the session for `identity`, opening one if needed.
    ///
    /// - No session in the slot: connect, store, return.
    /// - Session opened with the same credentials: return it unchanged.
    /// - Session opened with other credentials: connect anew, then close
    ///   and replace the old one. If the new connect fails the old session
    ///   stays in place and the error is returned.
    pub async fn acquire(&self, identity: &Identity) -> SessionResult<Arc<ConnectionHandle>> {
        let (endpoint, username) = identity.slot();
        let key: SlotKey = (endpoint.to_string(), username.to_string());
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut current = slot.lock().await;
        if let Some(handle) = current.as_ref() {
            if handle.identity == *identity {
                return Ok(Arc::clone(handle));
            }
        }

        let client = match self.connect(identity).await {
            Ok(client) => client,
            Err(err) => {
                if current.is_none() {
                    self.forget_empty(&key, &slot).await;
                }
                return Err(err);
            }
        };
        let handle = Arc::new(ConnectionHandle {
            identity: identity.clone(),
            client,
        });

        match current.replace(Arc::clone(&handle)) {
            Some(stale) => {
                tracing::info!(identity = %identity, "credentials changed, replacing session");
                stale.client.close().await;
            }
            None => tracing::info!(identity = %identity, "opened store session"),
        }
        Ok(handle)
    }

    /// Drop a slot that never held a session, unless another caller is
    /// already queued on it.
    async fn forget_empty(&self, key: &SlotKey, slot: &Slot) {
        let mut slots = self.slots.lock().await;
        let unshared = slots
            .get(key)
            .is_some_and(|held| Arc::ptr_eq(held, slot) && Arc::strong_count(slot) == 2);
        if unshared {
            slots.remove(key);
        }
    }

    async fn connect(&self, identity: &Identity) -> SessionResult<Arc<dyn StoreClient>> {
        let attempt = self.connector.connect(identity);
        match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(source)) => {
                tracing::warn!(identity = %identity, error = %source, "store connect failed");
                Err(SessionError::ConnectFailed {
                    target: identity.to_string(),
                    source,
                })
            }
            Err(_) => Err(SessionError::ConnectTimeout {
                target: identity.to_string(),
                seconds: self.connect_timeout.as_secs(),
            }),
        }
    }

    /// Number of slots holding a live session.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every cached session and forget all slots.
    pub async fn close_all(&self) {
        let slots: Vec<Slot> = self.slots.lock().await.drain().map(|(_, s)| s).collect();
        for slot in slots {
            if let Some(handle) = slot.lock().await.take() {
                handle.client.close().await;
            }
        }
    }
}

impl fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
