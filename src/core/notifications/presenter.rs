// Presenter: the ordered view of the store and the bulk resolve action.
//
// A bulk action runs in two phases. `begin_bulk` picks up to `max_batch`
// entries of one category and marks them pending, which is the optimistic
// close the player sees. Once the single external call returns,
// `settle_batch` removes them, or applies the failure policy.

use serde::{Deserialize, Serialize};

use super::model::{EventType, NotificationKey};
use super::store::{BatchId, Dismissal, NotificationStore};
use crate::core::submit::SubmitError;

/// Default cap on entries resolved by one bulk action
pub const MAX_BATCH: usize = 11;

/// What happens to pending entries when the external call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Hand the entries back to the player, flagged as reopened
    #[default]
    Reopen,
    /// Remove them anyway, as if the call had succeeded
    DiscardOptimistic,
}

/// One row of the presented list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationView {
    pub key: NotificationKey,
    pub event_type: EventType,
    pub title: String,
    pub message: String,
    pub keys: Vec<String>,
    pub closed: bool,
    pub pending: bool,
    pub reopened: bool,
}

/// Projects the store into display order.
pub fn view(store: &NotificationStore) -> Vec<NotificationView> {
    store
        .iter()
        .map(|entry| NotificationView {
            key: entry.key.clone(),
            event_type: entry.notification.event_type,
            title: entry.notification.event_type.display_name().to_string(),
            message: entry.notification.message(),
            keys: entry.notification.keys.clone(),
            closed: entry.dismissal.is_closed(),
            pending: matches!(entry.dismissal, Dismissal::Pending { .. }),
            reopened: entry.dismissal == Dismissal::Reopened,
        })
        .collect()
}

/// Entries selected by a bulk action, waiting on the external call
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBatch {
    pub id: BatchId,
    pub event_type: EventType,
    pub keys: Vec<NotificationKey>,
    /// The `keys` of each selected notification, in the same order
    pub entity_ids: Vec<Vec<String>>,
}

/// Selects up to `max_batch` entries of `event_type` in insertion order and
/// marks them pending. Entries already pending in another batch are skipped.
///
/// Returns `None` when nothing is eligible.
pub fn begin_bulk(
    store: &mut NotificationStore,
    event_type: EventType,
    max_batch: usize,
) -> Option<PendingBatch> {
    if !event_type.is_batch_resolvable() {
        return None;
    }

    let selected: Vec<(NotificationKey, Vec<String>)> = store
        .iter()
        .filter(|entry| entry.notification.event_type == event_type)
        .filter(|entry| !matches!(entry.dismissal, Dismissal::Pending { .. }))
        .take(max_batch)
        .map(|entry| (entry.key.clone(), entry.notification.keys.clone()))
        .collect();

    if selected.is_empty() {
        return None;
    }

    let id = store.next_batch_id();
    for (key, _) in &selected {
        store.set_dismissal(key, Dismissal::Pending { batch: id });
    }

    let (keys, entity_ids): (Vec<_>, Vec<_>) = selected.into_iter().unzip();
    Some(PendingBatch {
        id,
        event_type,
        keys,
        entity_ids,
    })
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettleReport {
    pub removed: Vec<NotificationKey>,
    pub reopened: Vec<NotificationKey>,
    pub error: Option<String>,
}

/// Applies the outcome of a batch's external call.
pub fn settle_batch(
    store: &mut NotificationStore,
    batch: BatchId,
    outcome: &Result<(), SubmitError>,
    policy: FailurePolicy,
) -> SettleReport {
    let keys = store.pending_keys(batch);
    let mut report = SettleReport::default();

    match (outcome, policy) {
        (Ok(()), _) | (Err(_), FailurePolicy::DiscardOptimistic) => {
            for key in keys {
                store.remove(&key);
                report.removed.push(key);
            }
        }
        (Err(_), FailurePolicy::Reopen) => {
            for key in keys {
                store.set_dismissal(&key, Dismissal::Reopened);
                report.reopened.push(key);
            }
        }
    }

    if let Err(e) = outcome {
        report.error = Some(e.to_string());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notifications::model::{Notification, NotificationData};

    fn harvest(realm: u64) -> Notification {
        Notification::new(
            EventType::Harvest,
            vec![realm.to_string(), "3".to_string()],
            NotificationData::Harvest {
                realm_entity_id: realm,
                resource_id: 3,
                amount: 21,
            },
        )
    }

    fn offer(trade: u64) -> Notification {
        Notification::new(
            EventType::DirectOffer,
            vec![trade.to_string()],
            NotificationData::DirectOffer {
                trade_id: trade,
                maker_id: 9,
                taker_id: 1,
                expires_at: None,
            },
        )
    }

    fn store_with_harvests(count: u64) -> NotificationStore {
        let mut store = NotificationStore::new();
        store.merge((1..=count).map(harvest));
        store
    }

    #[test]
    fn test_bulk_caps_at_max_batch_in_insertion_order() {
        let mut store = store_with_harvests(15);
        let batch = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();

        assert_eq!(batch.keys.len(), 11);
        assert_eq!(batch.entity_ids.len(), 11);
        let expected: Vec<Vec<String>> = (1..=11u64)
            .map(|realm| vec![realm.to_string(), "3".to_string()])
            .collect();
        assert_eq!(batch.entity_ids, expected);

        let rows = view(&store);
        assert_eq!(rows.iter().filter(|r| r.closed).count(), 11);
        assert!(rows[11..].iter().all(|r| !r.closed));
    }

    #[test]
    fn test_successful_batch_removes_selected_and_keeps_rest_open() {
        let mut store = store_with_harvests(15);
        let batch = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();

        let report = settle_batch(&mut store, batch.id, &Ok(()), FailurePolicy::Reopen);
        assert_eq!(report.removed, batch.keys);
        assert!(report.error.is_none());

        let rows = view(&store);
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| !r.closed));
        let remaining: Vec<_> = rows.iter().map(|r| r.keys[0].clone()).collect();
        assert_eq!(remaining, vec!["12", "13", "14", "15"]);
    }

    #[test]
    fn test_failed_batch_reopens_entries() {
        let mut store = store_with_harvests(3);
        let batch = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();

        let outcome = Err(SubmitError::Rejected("out of gas".to_string()));
        let report = settle_batch(&mut store, batch.id, &outcome, FailurePolicy::Reopen);

        assert_eq!(report.reopened.len(), 3);
        assert!(report.removed.is_empty());
        assert!(report.error.unwrap().contains("out of gas"));
        let rows = view(&store);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.reopened && !r.closed && !r.pending));
    }

    #[test]
    fn test_failed_batch_discarded_under_optimistic_policy() {
        let mut store = store_with_harvests(3);
        let batch = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();

        let outcome = Err(SubmitError::Transport("connection reset".to_string()));
        let report = settle_batch(&mut store, batch.id, &outcome, FailurePolicy::DiscardOptimistic);

        assert_eq!(report.removed.len(), 3);
        assert!(report.error.is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_bulk_only_touches_requested_category() {
        let mut store = NotificationStore::new();
        store.merge(vec![offer(1), harvest(1), offer(2), harvest(2)]);

        let batch = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();
        assert_eq!(batch.keys.len(), 2);
        settle_batch(&mut store, batch.id, &Ok(()), FailurePolicy::Reopen);

        let rows = view(&store);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.event_type == EventType::DirectOffer && !r.closed));
    }

    #[test]
    fn test_second_bulk_skips_pending_entries() {
        let mut store = store_with_harvests(15);
        let first = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();
        let second = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.keys.len(), 4);
        assert!(begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).is_none());
    }

    #[test]
    fn test_bulk_includes_player_closed_entries() {
        let mut store = store_with_harvests(2);
        let first_key = store.keys_of(EventType::Harvest)[0].clone();
        store.close(&first_key);

        let batch = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();
        assert_eq!(batch.keys.len(), 2);
        assert_eq!(batch.keys[0], first_key);
    }

    #[test]
    fn test_bulk_with_nothing_eligible() {
        let mut store = NotificationStore::new();
        store.merge(vec![offer(1)]);
        assert!(begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).is_none());
    }

    #[test]
    fn test_bulk_refuses_category_without_batched_call() {
        let mut store = NotificationStore::new();
        store.merge(vec![offer(77), harvest(1)]);

        assert!(begin_bulk(&mut store, EventType::DirectOffer, MAX_BATCH).is_none());
        let rows = view(&store);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.pending && !r.closed));
    }

    #[test]
    fn test_settle_after_entry_removed_by_player() {
        let mut store = store_with_harvests(2);
        let batch = begin_bulk(&mut store, EventType::Harvest, MAX_BATCH).unwrap();
        store.remove(&batch.keys[0]);

        let report = settle_batch(&mut store, batch.id, &Ok(()), FailurePolicy::Reopen);
        assert_eq!(report.removed, vec![batch.keys[1].clone()]);
        assert!(store.is_empty());
    }
}
