//! Process-wide item store.
//!
//! Every session shares one store. Reads take an `Arc` snapshot of the
//! current sequence; `add` is the single writer and holds the write lock for
//! the whole append, so concurrent adds never lose an update.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default bound on the number of items the store will hold.
pub const DEFAULT_MAX_ITEMS: usize = 10_000;

/// One entry in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Display name as the caller supplied it.
    pub name: String,
}

/// Errors returned by [`ItemStore::add`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The name is empty once surrounding whitespace is removed.
    #[error("name must not be empty")]
    EmptyName,

    /// The store already holds `limit` items.
    #[error("item limit of {limit} reached")]
    CapacityExceeded {
        /// Configured maximum.
        limit: usize,
    },
}

/// Shared, append-only list of items.
///
/// Cloning is cheap and every clone refers to the same list.
#[derive(Debug, Clone)]
pub struct ItemStore {
    items: Arc<RwLock<Arc<Vec<Item>>>>,
    max_items: usize,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}

impl ItemStore {
    /// Creates an empty store holding at most `max_items` items.
    #[must_use]
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            max_items,
        }
    }

    /// Returns the current items in insertion order.
    pub async fn list(&self) -> Arc<Vec<Item>> {
        Arc::clone(&*self.items.read().await)
    }

    /// Appends a new item.
    ///
    /// Returns the new item together with the updated sequence.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EmptyName`] if `name` is blank
    /// - [`StoreError::CapacityExceeded`] if the store is full
    pub async fn add(&self, name: &str) -> Result<(Item, Arc<Vec<Item>>), StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::EmptyName);
        }

        let mut guard = self.items.write().await;
        if guard.len() >= self.max_items {
            return Err(StoreError::CapacityExceeded {
                limit: self.max_items,
            });
        }

        let item = Item {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        // Readers holding an older snapshot keep it; the copy happens only then.
        Arc::make_mut(&mut *guard).push(item.clone());

        Ok((item, Arc::clone(&*guard)))
    }

    /// Number of items currently stored.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Returns `true` if the store holds no items.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}
