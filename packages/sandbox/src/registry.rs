// ABOUTME: In-memory registry of live sandbox containers keyed by session id
// ABOUTME: Owned by a backend instance; insert and take are atomic per key

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::ContainerDescriptor;

/// Why a bounded insert was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertRefused {
    Duplicate,
    Full { live: usize, limit: usize },
}

/// Session id → descriptor for every container a backend currently owns
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    entries: RwLock<HashMap<String, ContainerDescriptor>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor unless its session id is already taken.
    ///
    /// Hands the descriptor back on conflict so the caller can tear down what it built.
    pub async fn insert(
        &self,
        descriptor: ContainerDescriptor,
    ) -> std::result::Result<(), ContainerDescriptor> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&descriptor.session_id) {
            return Err(descriptor);
        }
        entries.insert(descriptor.session_id.clone(), descriptor);
        Ok(())
    }

    /// Register a descriptor if the id is free and fewer than `limit` entries exist
    /// (0 = unlimited). Both checks and the insert happen under one write lock.
    pub async fn insert_within(
        &self,
        descriptor: ContainerDescriptor,
        limit: usize,
    ) -> std::result::Result<(), InsertRefused> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&descriptor.session_id) {
            return Err(InsertRefused::Duplicate);
        }
        let live = entries.len();
        if limit > 0 && live >= limit {
            return Err(InsertRefused::Full { live, limit });
        }
        entries.insert(descriptor.session_id.clone(), descriptor);
        Ok(())
    }

    /// Remove and return the entry; only one caller can ever get `Some` for a given entry
    pub async fn take(&self, session_id: &str) -> Option<ContainerDescriptor> {
        self.entries.write().await.remove(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Option<ContainerDescriptor> {
        self.entries.read().await.get(session_id).cloned()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.entries.read().await.contains_key(session_id)
    }

    pub async fn snapshot(&self) -> HashMap<String, ContainerDescriptor> {
        self.entries.read().await.clone()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
