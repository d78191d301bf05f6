//! Deduplicating notification store.
//!
//! Holds at most one entry per [`NotificationKey`], in first-seen order, along
//! with each entry's dismissal state. The store is the only owner of that
//! state; callers go through [`NotificationStore::merge`],
//! [`NotificationStore::close`] and [`NotificationStore::remove`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::model::{EventType, Notification, NotificationKey};

pub type BatchId = u64;

/// Where an entry is in its dismissal lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Dismissal {
    Open,
    /// Closed by the player but still listed
    Closed,
    /// Part of a bulk action whose external call has not settled yet
    Pending { batch: BatchId },
    /// A bulk action failed and the entry was handed back to the player
    Reopened,
}

impl Dismissal {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::Pending { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: NotificationKey,
    pub notification: Notification,
    pub dismissal: Dismissal,
}

#[derive(Debug, Default)]
pub struct NotificationStore {
    entries: HashMap<NotificationKey, Entry>,
    order: Vec<NotificationKey>,
    next_batch: BatchId,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &NotificationKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &NotificationKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Merges a batch of candidates, keeping the first payload seen per key.
    ///
    /// Candidates are walked in order. Keys already in the store, or already
    /// inserted earlier in the same batch, are discarded. Returns how many
    /// entries were added.
    pub fn merge<I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = Notification>,
    {
        let mut added = 0;
        for notification in candidates {
            let key = notification.key();
            if self.entries.contains_key(&key) {
                continue;
            }
            self.order.push(key.clone());
            self.entries.insert(
                key.clone(),
                Entry {
                    key,
                    notification,
                    dismissal: Dismissal::Open,
                },
            );
            added += 1;
        }
        added
    }

    /// Marks an entry closed. Returns false if the key is unknown.
    ///
    /// Entries that are already closed or pending keep their state.
    pub fn close(&mut self, key: &NotificationKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                if matches!(entry.dismissal, Dismissal::Open | Dismissal::Reopened) {
                    entry.dismissal = Dismissal::Closed;
                }
                true
            }
            None => false,
        }
    }

    /// Drops an entry and its closed state.
    pub fn remove(&mut self, key: &NotificationKey) -> Option<Notification> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry.notification)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.order.iter().filter_map(move |key| self.entries.get(key))
    }

    pub fn keys_of(&self, event_type: EventType) -> Vec<NotificationKey> {
        self.iter()
            .filter(|entry| entry.notification.event_type == event_type)
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn is_closed(&self, key: &NotificationKey) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.dismissal.is_closed())
            .unwrap_or(false)
    }

    /// Keys currently waiting on `batch`, in insertion order
    pub fn pending_keys(&self, batch: BatchId) -> Vec<NotificationKey> {
        self.iter()
            .filter(|entry| entry.dismissal == Dismissal::Pending { batch })
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub(crate) fn set_dismissal(&mut self, key: &NotificationKey, dismissal: Dismissal) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.dismissal = dismissal;
        }
    }

    pub(crate) fn next_batch_id(&mut self) -> BatchId {
        self.next_batch += 1;
        self.next_batch
    }
}
