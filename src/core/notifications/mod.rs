// Notification pipeline: generators, dedup store and presenter.
//
// Architecture:
// - model.rs: categories, payloads and dedup keys
// - generators.rs: snapshot/event -> candidate notifications
// - store.rs: first-seen-wins dedup store with dismissal state
// - presenter.rs: ordered view and the two-phase bulk action

pub mod generators;
pub mod model;
pub mod presenter;
pub mod store;
