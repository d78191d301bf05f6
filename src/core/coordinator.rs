use super::model::{DomainEvent, StateSnapshot};
use super::notifications::generators::{self, GeneratorConfig, LaborConfig};
use super::notifications::store::NotificationStore;

pub struct CoordinatorOutput {
    /// Entries newly added to the store
    pub added: usize,
    pub logs: Vec<String>,
}

/// Feeds snapshots and pushed events through the generators into the store.
pub struct Coordinator {
    store: NotificationStore,
    generators: GeneratorConfig,
    labor: LaborConfig,

    // Latest polled state, used by push mappers
    last_snapshot: Option<StateSnapshot>,
}

impl Coordinator {
    pub fn new(generators: GeneratorConfig, labor: LaborConfig) -> Self {
        Self {
            store: NotificationStore::new(),
            generators,
            labor,
            last_snapshot: None,
        }
    }

    /// Hot-reload generator settings. Existing entries are kept.
    pub fn update_config(&mut self, generators: GeneratorConfig, labor: LaborConfig) {
        self.generators = generators;
        self.labor = labor;
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut NotificationStore {
        &mut self.store
    }

    pub fn last_snapshot(&self) -> Option<&StateSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// One poll cycle: regenerate every polled category and merge.
    pub fn tick(&mut self, snapshot: StateSnapshot) -> CoordinatorOutput {
        let mut logs = Vec::new();

        if let Some(prev) = &self.last_snapshot {
            if snapshot.timestamp < prev.timestamp {
                logs.push(format!(
                    "Snapshot timestamp went backwards: {} -> {}",
                    prev.timestamp, snapshot.timestamp
                ));
            }
        }

        let candidates = generators::generate_all(&snapshot, &self.generators, &self.labor);
        let generated = candidates.len();
        let added = self.store.merge(candidates);
        if added > 0 {
            logs.push(format!(
                "Added {} new notifications ({} generated at {})",
                added, generated, snapshot.timestamp
            ));
        }

        self.last_snapshot = Some(snapshot);
        CoordinatorOutput { added, logs }
    }

    /// Maps one pushed event and merges the result.
    pub fn handle_event(&mut self, event: &DomainEvent) -> CoordinatorOutput {
        let mut logs = Vec::new();

        let added = match generators::map_event(event, self.last_snapshot.as_ref()) {
            Some(notification) if self.generators.is_enabled(notification.event_type) => {
                let event_type = notification.event_type;
                let added = self.store.merge([notification]);
                if added > 0 {
                    logs.push(format!("Added {} notification from subscription", event_type));
                }
                added
            }
            _ => 0,
        };

        CoordinatorOutput { added, logs }
    }
}
