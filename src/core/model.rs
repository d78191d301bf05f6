// Game-state snapshot and domain event types.
//
// These are read-only views of chain state exported by the indexer. Nothing in
// this crate writes them back.

use serde::{Deserialize, Serialize};

pub type EntityId = u64;
pub type ResourceId = u16;
/// Chain timestamp in seconds.
pub type Timestamp = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub resource_id: ResourceId,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmState {
    pub entity_id: EntityId,
    pub position: Position,
    #[serde(default)]
    pub level: u32,
}

/// Labor running on one resource of one realm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborState {
    pub realm_entity_id: EntityId,
    pub resource_id: ResourceId,
    /// Timestamp until which labor has been paid for.
    pub balance: Timestamp,
    pub last_harvest: Timestamp,
    #[serde(default = "default_multiplier")]
    pub multiplier: u64,
}

fn default_multiplier() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaravanState {
    pub entity_id: EntityId,
    /// Account address of the caravan owner.
    pub owner: String,
    pub position: Option<Position>,
    pub arrival_time: Option<Timestamp>,
    #[serde(default)]
    pub resources: Vec<ResourceAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankState {
    pub entity_id: EntityId,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaiderState {
    pub entity_id: EntityId,
    /// Realm entity that owns the raiders.
    pub owner_entity_id: Option<EntityId>,
    pub position: Option<Position>,
    pub arrival_time: Option<Timestamp>,
    #[serde(default)]
    pub soldiers: u64,
    #[serde(default)]
    pub health: u64,
}

/// Everything the polled generators look at, taken at one chain timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub account_address: String,
    #[serde(default)]
    pub realms: Vec<RealmState>,
    #[serde(default)]
    pub hyperstructure_level: Option<u32>,
    #[serde(default)]
    pub labor: Vec<LaborState>,
    #[serde(default)]
    pub caravans: Vec<CaravanState>,
    #[serde(default)]
    pub banks: Vec<BankState>,
    #[serde(default)]
    pub raiders: Vec<RaiderState>,
}

impl StateSnapshot {
    pub fn is_own_realm(&self, entity_id: EntityId) -> bool {
        self.realms.iter().any(|realm| realm.entity_id == entity_id)
    }

    pub fn realm(&self, entity_id: EntityId) -> Option<&RealmState> {
        self.realms.iter().find(|realm| realm.entity_id == entity_id)
    }

    /// The player's realm standing at `position`, if any.
    pub fn realm_at(&self, position: Position) -> Option<&RealmState> {
        self.realms.iter().find(|realm| realm.position == position)
    }

    pub fn bank_at(&self, position: Position) -> Option<&BankState> {
        self.banks.iter().find(|bank| bank.position == position)
    }

    /// Non-empty resource stacks held by an entity (caravan inventory).
    pub fn resources_in_inventory(&self, entity_id: EntityId) -> Vec<ResourceAmount> {
        self.caravans
            .iter()
            .find(|caravan| caravan.entity_id == entity_id)
            .map(|caravan| {
                caravan
                    .resources
                    .iter()
                    .filter(|r| r.amount > 0)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn realm_level(&self, entity_id: EntityId) -> Option<u32> {
        self.realm(entity_id).map(|realm| realm.level)
    }
}

/// A trade offer made directly to one of the player's realms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectOfferEvent {
    pub trade_id: EntityId,
    pub maker_id: EntityId,
    pub taker_id: EntityId,
    pub expires_at: Option<Timestamp>,
}

/// Result of an attack involving one of the player's realms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatOutcome {
    pub attacker_ids: Vec<EntityId>,
    pub target_id: EntityId,
    #[serde(default)]
    pub damage: u64,
    #[serde(default)]
    pub stolen: Vec<ResourceAmount>,
    pub timestamp: Timestamp,
}

/// An entity started travelling towards a watched position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelEvent {
    pub entity_id: EntityId,
    pub owner_entity_id: Option<EntityId>,
    pub destination: Position,
    pub arrival_time: Option<Timestamp>,
}

/// Payloads delivered by push subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    DirectOffer(DirectOfferEvent),
    Combat(CombatOutcome),
    Travel(TravelEvent),
}
