use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::{Connection, ConnectionId};

/// The set of connections that are open and eligible for broadcasts.
///
/// Every operation runs inside the same critical section. Broadcasts iterate a
/// `snapshot()`, never the live map.
#[derive(Debug, Default)]
pub struct Registry {
    members: Mutex<HashMap<ConnectionId, Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // Set operations cannot be left half-applied, so a poisoned lock is still usable.
    fn members(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts the connection. Returns false, keeping the existing entry, if it is already present.
    pub fn add(&self, conn: Connection) -> bool {
        match self.members().entry(conn.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(conn);
                true
            }
        }
    }

    /// Removes the connection if present. Removing twice is harmless.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        self.members().remove(id).is_some()
    }

    /// Copy of the current members. Later adds and removes do not affect it.
    pub fn snapshot(&self) -> Vec<Connection> {
        self.members().values().cloned().collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }
}
