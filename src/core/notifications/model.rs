// Notification model types: categories, payloads and dedup keys.

use std::fmt;
use std::fmt::Write as _;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::core::model::{CombatOutcome, EntityId, Position, ResourceAmount, ResourceId, Timestamp};

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Labor produced resources that can be harvested
    Harvest,
    /// A caravan reached one of our realms and can be unloaded
    EmptyChest,
    /// One of our caravans reached a bank
    ArrivedAtBank,
    /// Foreign raiders are standing on one of our realms
    EnemyRaidersHaveArrived,
    /// Our raiders reached their target
    YourRaidersHaveArrived,
    /// Foreign raiders are on their way to one of our realms
    EnemyRaidersArriving,
    /// A trade offer was made directly to one of our realms
    DirectOffer,
    /// One of our realms was attacked
    Attacked,
    /// Resources were stolen from one of our realms
    StolenResource,
}

impl EventType {
    /// Stable tag used in keys, config and commands
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::EmptyChest => "empty_chest",
            Self::ArrivedAtBank => "arrived_at_bank",
            Self::EnemyRaidersHaveArrived => "enemy_raiders_have_arrived",
            Self::YourRaidersHaveArrived => "your_raiders_have_arrived",
            Self::EnemyRaidersArriving => "enemy_raiders_arriving",
            Self::DirectOffer => "direct_offer",
            Self::Attacked => "attacked",
            Self::StolenResource => "stolen_resource",
        }
    }

    /// Whether a bulk action has a batched system call to resolve this category.
    /// Only labor harvests do.
    pub fn is_batch_resolvable(&self) -> bool {
        matches!(self, Self::Harvest)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Harvest => "Harvest",
            Self::EmptyChest => "Caravan Arrived",
            Self::ArrivedAtBank => "Arrived At Bank",
            Self::EnemyRaidersHaveArrived => "Enemy Raiders Arrived",
            Self::YourRaidersHaveArrived => "Raiders Arrived",
            Self::EnemyRaidersArriving => "Enemy Raiders Incoming",
            Self::DirectOffer => "Direct Offer",
            Self::Attacked => "Realm Attacked",
            Self::StolenResource => "Resources Stolen",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Harvest => "Labor has produced resources that are ready to harvest",
            Self::EmptyChest => "A caravan has arrived at one of your realms with resources to claim",
            Self::ArrivedAtBank => "One of your caravans has arrived at a bank",
            Self::EnemyRaidersHaveArrived => "Enemy raiders have arrived at one of your realms",
            Self::YourRaidersHaveArrived => "Your raiders have arrived at their destination",
            Self::EnemyRaidersArriving => "Enemy raiders are travelling towards one of your realms",
            Self::DirectOffer => "Someone made a trade offer directly to one of your realms",
            Self::Attacked => "One of your realms was attacked",
            Self::StolenResource => "Raiders stole resources from one of your realms",
        }
    }

    pub fn all() -> &'static [EventType] {
        &[
            Self::Harvest,
            Self::EmptyChest,
            Self::ArrivedAtBank,
            Self::EnemyRaidersHaveArrived,
            Self::YourRaidersHaveArrived,
            Self::EnemyRaidersArriving,
            Self::DirectOffer,
            Self::Attacked,
            Self::StolenResource,
        ]
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::all().iter().copied().find(|event_type| event_type.tag() == tag)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Dedup identity of a notification.
///
/// Derived from the category tag and the ordered `keys`. Every key is written
/// with its byte length, so no two different key sequences can collide even
/// when a key contains the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn derive(event_type: EventType, keys: &[String]) -> Self {
        let mut id = String::from(event_type.tag());
        for key in keys {
            // Writing into a String cannot fail.
            let _ = write!(id, ":{}.{}", key.len(), key);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raiders as seen by a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidersInfo {
    pub entity_id: EntityId,
    pub owner_entity_id: Option<EntityId>,
    pub position: Option<Position>,
    pub arrival_time: Option<Timestamp>,
    pub soldiers: u64,
    pub health: u64,
}

/// Category-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationData {
    Harvest {
        realm_entity_id: EntityId,
        resource_id: ResourceId,
        amount: u64,
    },
    EmptyChest {
        realm_entity_id: EntityId,
        caravan_id: EntityId,
        resources: Vec<ResourceAmount>,
    },
    ArrivedAtBank {
        bank_id: EntityId,
        caravan_id: EntityId,
        resources: Vec<ResourceAmount>,
    },
    Raiders {
        raiders: RaidersInfo,
        /// Realm of ours the raiders are at or heading to
        realm_entity_id: Option<EntityId>,
    },
    DirectOffer {
        trade_id: EntityId,
        maker_id: EntityId,
        taker_id: EntityId,
        expires_at: Option<Timestamp>,
    },
    Combat(CombatOutcome),
}

/// A user-facing record derived from game state. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_type: EventType,
    pub keys: Vec<String>,
    pub data: NotificationData,
}

impl Notification {
    pub fn new(event_type: EventType, keys: Vec<String>, data: NotificationData) -> Self {
        Self {
            event_type,
            keys,
            data,
        }
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey::derive(self.event_type, &self.keys)
    }

    /// One-line text shown to the player
    pub fn message(&self) -> String {
        match &self.data {
            NotificationData::Harvest {
                realm_entity_id,
                resource_id,
                amount,
            } => format!(
                "Realm {} can harvest {} of resource {}",
                realm_entity_id, amount, resource_id
            ),
            NotificationData::EmptyChest {
                realm_entity_id,
                caravan_id,
                resources,
            } => format!(
                "Caravan {} arrived at realm {} carrying {}",
                caravan_id,
                realm_entity_id,
                format_resources(resources)
            ),
            NotificationData::ArrivedAtBank {
                bank_id,
                caravan_id,
                resources,
            } => format!(
                "Caravan {} arrived at bank {} carrying {}",
                caravan_id,
                bank_id,
                format_resources(resources)
            ),
            NotificationData::Raiders {
                raiders,
                realm_entity_id,
            } => {
                let realm = realm_entity_id
                    .map(|id| format!("realm {}", id))
                    .unwrap_or_else(|| "their target".to_string());
                let when = raiders
                    .arrival_time
                    .map(format_timestamp)
                    .unwrap_or_else(|| "unknown time".to_string());
                match self.event_type {
                    EventType::EnemyRaidersArriving => format!(
                        "Enemy raiders {} ({} soldiers) will reach {} at {}",
                        raiders.entity_id, raiders.soldiers, realm, when
                    ),
                    EventType::YourRaidersHaveArrived => format!(
                        "Your raiders {} ({} soldiers) reached {} at {}",
                        raiders.entity_id, raiders.soldiers, realm, when
                    ),
                    _ => format!(
                        "Enemy raiders {} ({} soldiers) have arrived at {}",
                        raiders.entity_id, raiders.soldiers, realm
                    ),
                }
            }
            NotificationData::DirectOffer {
                trade_id,
                maker_id,
                taker_id,
                expires_at,
            } => {
                let expiry = expires_at
                    .map(|ts| format!(", expires {}", format_timestamp(ts)))
                    .unwrap_or_default();
                format!(
                    "Realm {} offered trade {} to realm {}{}",
                    maker_id, trade_id, taker_id, expiry
                )
            }
            NotificationData::Combat(outcome) => {
                let attackers = outcome
                    .attacker_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                if outcome.stolen.is_empty() {
                    format!(
                        "Realm {} was attacked by {} ({} damage) at {}",
                        outcome.target_id,
                        attackers,
                        outcome.damage,
                        format_timestamp(outcome.timestamp)
                    )
                } else {
                    format!(
                        "Raiders {} stole {} from realm {}",
                        attackers,
                        format_resources(&outcome.stolen),
                        outcome.target_id
                    )
                }
            }
        }
    }
}

/// Formats a chain timestamp as UTC, falling back to the raw number.
pub fn format_timestamp(ts: Timestamp) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_resources(resources: &[ResourceAmount]) -> String {
    if resources.is_empty() {
        return "nothing".to_string();
    }
    resources
        .iter()
        .map(|r| format!("{} x{}", r.amount, r.resource_id))
        .collect::<Vec<_>>()
        .join(", ")
}
