// Notification generators.
//
// Polled generators look at one snapshot and return every notification that
// should currently be visible for their category. They keep no memory between
// calls: a condition that has resolved by `snapshot.timestamp` yields nothing.
// Missing snapshot data means "condition not met", never an error.
//
// Push mappers turn a single delivered domain event into zero or one
// notification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::model::{EventType, Notification, NotificationData, RaidersInfo};
use crate::core::model::{
    CombatOutcome, DirectOfferEvent, DomainEvent, LaborState, RaiderState, ResourceId,
    StateSnapshot, Timestamp, TravelEvent,
};

/// Labor production constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborConfig {
    /// Seconds of labor per production cycle
    pub base_labor_units: u64,
    pub base_resources_per_cycle: u64,
    pub base_food_per_cycle: u64,
    /// Food resources scale with the labor multiplier
    pub food_resource_ids: Vec<ResourceId>,
}

impl Default for LaborConfig {
    fn default() -> Self {
        Self {
            base_labor_units: 7200,
            base_resources_per_cycle: 21,
            base_food_per_cycle: 14,
            food_resource_ids: vec![254, 255],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub enabled: bool,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Per-category switches - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub categories: HashMap<EventType, CategoryConfig>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::default_enabled()
    }
}

impl GeneratorConfig {
    /// Config with every category enabled
    pub fn default_enabled() -> Self {
        let categories = EventType::all()
            .iter()
            .map(|event_type| (*event_type, CategoryConfig::default()))
            .collect();
        Self { categories }
    }

    /// Categories missing from the map count as enabled.
    pub fn is_enabled(&self, event_type: EventType) -> bool {
        self.categories
            .get(&event_type)
            .map(|c| c.enabled)
            .unwrap_or(true)
    }

    pub fn set_enabled(&mut self, event_type: EventType, enabled: bool) {
        self.categories.insert(event_type, CategoryConfig { enabled });
    }
}

/// Categories produced by polling, in evaluation order.
pub const POLLED: &[EventType] = &[
    EventType::Harvest,
    EventType::EmptyChest,
    EventType::ArrivedAtBank,
    EventType::EnemyRaidersHaveArrived,
    EventType::YourRaidersHaveArrived,
];

/// Inputs shared by all polled generators
pub struct GeneratorContext<'a> {
    pub snapshot: &'a StateSnapshot,
    pub labor: &'a LaborConfig,
}

/// Runs the generator for one polled category.
pub fn generate(event_type: EventType, ctx: &GeneratorContext) -> Vec<Notification> {
    match event_type {
        EventType::Harvest => labor_notifications(ctx.snapshot, ctx.labor),
        EventType::EmptyChest => empty_chest_notifications(ctx.snapshot),
        EventType::ArrivedAtBank => arrived_at_bank_notifications(ctx.snapshot),
        EventType::EnemyRaidersHaveArrived => enemy_raiders_arrived_notifications(ctx.snapshot),
        EventType::YourRaidersHaveArrived => your_raiders_arrived_notifications(ctx.snapshot),
        // Push-only categories
        EventType::EnemyRaidersArriving
        | EventType::DirectOffer
        | EventType::Attacked
        | EventType::StolenResource => Vec::new(),
    }
}

/// Runs every enabled polled generator and concatenates the results.
pub fn generate_all(
    snapshot: &StateSnapshot,
    config: &GeneratorConfig,
    labor: &LaborConfig,
) -> Vec<Notification> {
    let ctx = GeneratorContext { snapshot, labor };
    POLLED
        .iter()
        .filter(|event_type| config.is_enabled(**event_type))
        .flat_map(|event_type| generate(*event_type, &ctx))
        .collect()
}

/// Harvest bonus in percent granted by a realm level
pub fn realm_level_bonus(level: u32) -> u64 {
    u64::from(level) * 25
}

/// Harvest bonus in percent granted by the hyperstructure level
pub fn hyperstructure_level_bonus(level: u32) -> u64 {
    u64::from(level) * 10
}

/// Resources produced by labor and not yet harvested at `now`.
pub fn harvestable_amount(labor: &LaborState, now: Timestamp, config: &LaborConfig, bonus_percent: u64) -> u64 {
    if config.base_labor_units == 0 {
        return 0;
    }
    let produced_until = labor.balance.min(now);
    let cycles = produced_until.saturating_sub(labor.last_harvest) / config.base_labor_units;

    let per_cycle = if config.food_resource_ids.contains(&labor.resource_id) {
        config.base_food_per_cycle.saturating_mul(labor.multiplier)
    } else {
        config.base_resources_per_cycle
    };

    cycles
        .saturating_mul(per_cycle)
        .saturating_mul(100 + bonus_percent)
        / 100
}

/// Labor that can be harvested right now
pub fn labor_notifications(snapshot: &StateSnapshot, config: &LaborConfig) -> Vec<Notification> {
    let hyperstructure_bonus = snapshot
        .hyperstructure_level
        .map(hyperstructure_level_bonus)
        .unwrap_or(0);

    snapshot
        .labor
        .iter()
        .filter_map(|labor| {
            let level = snapshot.realm_level(labor.realm_entity_id)?;
            let bonus = realm_level_bonus(level) + hyperstructure_bonus;
            let amount = harvestable_amount(labor, snapshot.timestamp, config, bonus);
            if amount == 0 {
                return None;
            }
            Some(Notification::new(
                EventType::Harvest,
                vec![
                    labor.realm_entity_id.to_string(),
                    labor.resource_id.to_string(),
                ],
                NotificationData::Harvest {
                    realm_entity_id: labor.realm_entity_id,
                    resource_id: labor.resource_id,
                    amount,
                },
            ))
        })
        .collect()
}

fn has_arrived(arrival_time: Option<Timestamp>, now: Timestamp) -> bool {
    arrival_time.map(|t| t <= now).unwrap_or(false)
}

/// Caravans standing on one of our realms with resources still to claim
pub fn empty_chest_notifications(snapshot: &StateSnapshot) -> Vec<Notification> {
    snapshot
        .caravans
        .iter()
        .filter(|caravan| has_arrived(caravan.arrival_time, snapshot.timestamp))
        .filter_map(|caravan| {
            let realm = snapshot.realm_at(caravan.position?)?;
            let resources = snapshot.resources_in_inventory(caravan.entity_id);
            if resources.is_empty() {
                return None;
            }
            Some(Notification::new(
                EventType::EmptyChest,
                vec![caravan.entity_id.to_string()],
                NotificationData::EmptyChest {
                    realm_entity_id: realm.entity_id,
                    caravan_id: caravan.entity_id,
                    resources,
                },
            ))
        })
        .collect()
}

/// Our caravans that reached a bank carrying resources
pub fn arrived_at_bank_notifications(snapshot: &StateSnapshot) -> Vec<Notification> {
    if snapshot.account_address.is_empty() {
        return Vec::new();
    }
    snapshot
        .caravans
        .iter()
        .filter(|caravan| caravan.owner.eq_ignore_ascii_case(&snapshot.account_address))
        .filter(|caravan| has_arrived(caravan.arrival_time, snapshot.timestamp))
        .filter_map(|caravan| {
            let bank = snapshot.bank_at(caravan.position?)?;
            let resources = snapshot.resources_in_inventory(caravan.entity_id);
            if resources.is_empty() {
                return None;
            }
            Some(Notification::new(
                EventType::ArrivedAtBank,
                vec![caravan.entity_id.to_string()],
                NotificationData::ArrivedAtBank {
                    bank_id: bank.entity_id,
                    caravan_id: caravan.entity_id,
                    resources,
                },
            ))
        })
        .collect()
}

fn raiders_info(raider: &RaiderState) -> RaidersInfo {
    RaidersInfo {
        entity_id: raider.entity_id,
        owner_entity_id: raider.owner_entity_id,
        position: raider.position,
        arrival_time: raider.arrival_time,
        soldiers: raider.soldiers,
        health: raider.health,
    }
}

/// Foreign raiders standing on one of our realms
pub fn enemy_raiders_arrived_notifications(snapshot: &StateSnapshot) -> Vec<Notification> {
    snapshot
        .raiders
        .iter()
        .filter(|raider| has_arrived(raider.arrival_time, snapshot.timestamp))
        .filter_map(|raider| {
            let owner = raider.owner_entity_id?;
            if snapshot.is_own_realm(owner) {
                return None;
            }
            let realm = snapshot.realm_at(raider.position?)?;
            Some(Notification::new(
                EventType::EnemyRaidersHaveArrived,
                vec![raider.entity_id.to_string()],
                NotificationData::Raiders {
                    raiders: raiders_info(raider),
                    realm_entity_id: Some(realm.entity_id),
                },
            ))
        })
        .collect()
}

/// Our raiders that reached a position away from home
pub fn your_raiders_arrived_notifications(snapshot: &StateSnapshot) -> Vec<Notification> {
    snapshot
        .raiders
        .iter()
        .filter(|raider| has_arrived(raider.arrival_time, snapshot.timestamp))
        .filter_map(|raider| {
            let owner = raider.owner_entity_id?;
            if !snapshot.is_own_realm(owner) {
                return None;
            }
            let position = raider.position?;
            if snapshot.realm_at(position).is_some() {
                return None;
            }
            Some(Notification::new(
                EventType::YourRaidersHaveArrived,
                vec![raider.entity_id.to_string()],
                NotificationData::Raiders {
                    raiders: raiders_info(raider),
                    realm_entity_id: None,
                },
            ))
        })
        .collect()
}

pub fn direct_offer_notification(event: &DirectOfferEvent) -> Notification {
    Notification::new(
        EventType::DirectOffer,
        vec![event.trade_id.to_string()],
        NotificationData::DirectOffer {
            trade_id: event.trade_id,
            maker_id: event.maker_id,
            taker_id: event.taker_id,
            expires_at: event.expires_at,
        },
    )
}

pub fn combat_notification(outcome: &CombatOutcome) -> Notification {
    let event_type = if outcome.stolen.iter().any(|r| r.amount > 0) {
        EventType::StolenResource
    } else {
        EventType::Attacked
    };
    let mut keys: Vec<String> = outcome.attacker_ids.iter().map(|id| id.to_string()).collect();
    keys.push(outcome.target_id.to_string());
    keys.push(outcome.timestamp.to_string());
    Notification::new(event_type, keys, NotificationData::Combat(outcome.clone()))
}

/// Raiders that are still travelling towards one of our realms.
///
/// Needs the latest snapshot for the current timestamp and our realm list.
pub fn enemy_raiders_arriving_notification(
    event: &TravelEvent,
    snapshot: Option<&StateSnapshot>,
) -> Option<Notification> {
    let snapshot = snapshot?;
    let arrival = event.arrival_time?;
    if arrival <= snapshot.timestamp {
        return None;
    }
    let owner = event.owner_entity_id?;
    if snapshot.is_own_realm(owner) {
        return None;
    }
    let realm = snapshot.realm_at(event.destination)?;
    let raiders = snapshot
        .raiders
        .iter()
        .find(|r| r.entity_id == event.entity_id)
        .map(raiders_info)
        .unwrap_or(RaidersInfo {
            entity_id: event.entity_id,
            owner_entity_id: Some(owner),
            position: None,
            arrival_time: Some(arrival),
            soldiers: 0,
            health: 0,
        });
    Some(Notification::new(
        EventType::EnemyRaidersArriving,
        vec![event.entity_id.to_string()],
        NotificationData::Raiders {
            raiders: RaidersInfo {
                arrival_time: Some(arrival),
                ..raiders
            },
            realm_entity_id: Some(realm.entity_id),
        },
    ))
}

/// Maps one pushed event to at most one notification.
pub fn map_event(event: &DomainEvent, snapshot: Option<&StateSnapshot>) -> Option<Notification> {
    match event {
        DomainEvent::DirectOffer(offer) => Some(direct_offer_notification(offer)),
        DomainEvent::Combat(outcome) => Some(combat_notification(outcome)),
        DomainEvent::Travel(travel) => enemy_raiders_arriving_notification(travel, snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{BankState, CaravanState, Position, RealmState, ResourceAmount};

    const NOW: Timestamp = 1_000_000;

    fn base_snapshot() -> StateSnapshot {
        StateSnapshot {
            timestamp: NOW,
            account_address: "0xabc".to_string(),
            realms: vec![
                RealmState { entity_id: 1, position: Position { x: 10, y: 10 }, level: 0 },
                RealmState { entity_id: 2, position: Position { x: 20, y: 20 }, level: 2 },
            ],
            banks: vec![BankState { entity_id: 500, position: Position { x: 50, y: 50 } }],
            ..Default::default()
        }
    }

    fn labor(realm: u64, resource: ResourceId, balance: Timestamp, last_harvest: Timestamp) -> LaborState {
        LaborState {
            realm_entity_id: realm,
            resource_id: resource,
            balance,
            last_harvest,
            multiplier: 1,
        }
    }

    fn caravan(id: u64, owner: &str, pos: Position, arrival: Timestamp, amount: u64) -> CaravanState {
        CaravanState {
            entity_id: id,
            owner: owner.to_string(),
            position: Some(pos),
            arrival_time: Some(arrival),
            resources: vec![ResourceAmount { resource_id: 3, amount }],
        }
    }

    fn raider(id: u64, owner: u64, pos: Position, arrival: Timestamp) -> RaiderState {
        RaiderState {
            entity_id: id,
            owner_entity_id: Some(owner),
            position: Some(pos),
            arrival_time: Some(arrival),
            soldiers: 10,
            health: 100,
        }
    }

    #[test]
    fn test_harvestable_amount_counts_full_cycles_only() {
        let config = LaborConfig::default();
        let l = labor(1, 3, NOW + 100_000, NOW - 7200 * 3 - 10);
        assert_eq!(harvestable_amount(&l, NOW, &config, 0), 3 * 21);

        let partial = labor(1, 3, NOW + 100_000, NOW - 7199);
        assert_eq!(harvestable_amount(&partial, NOW, &config, 0), 0);
    }

    #[test]
    fn test_harvestable_amount_stops_at_balance() {
        let config = LaborConfig::default();
        // Labor ran out two cycles after the last harvest
        let l = labor(1, 3, NOW - 50_000, NOW - 50_000 - 7200 * 2);
        assert_eq!(harvestable_amount(&l, NOW, &config, 0), 2 * 21);
    }

    #[test]
    fn test_harvestable_amount_food_and_bonus() {
        let config = LaborConfig::default();
        let mut food = labor(1, 254, NOW, NOW - 7200);
        food.multiplier = 3;
        assert_eq!(harvestable_amount(&food, NOW, &config, 50), 14 * 3 * 150 / 100);
    }

    #[test]
    fn test_labor_notifications_one_per_resource() {
        let mut snapshot = base_snapshot();
        snapshot.labor = vec![
            labor(1, 3, NOW + 1, NOW - 7200),
            labor(1, 4, NOW + 1, NOW - 7200),
            labor(2, 3, NOW + 1, NOW - 7200),
        ];
        snapshot.hyperstructure_level = Some(1);

        let notifications = labor_notifications(&snapshot, &LaborConfig::default());
        assert_eq!(notifications.len(), 3);
        assert_eq!(notifications[0].keys, vec!["1".to_string(), "3".to_string()]);
        match &notifications[2].data {
            // realm level 2 (+50%) plus hyperstructure level 1 (+10%)
            NotificationData::Harvest { amount, .. } => assert_eq!(*amount, 21 * 160 / 100),
            other => panic!("unexpected data: {:?}", other),
        }
    }

    #[test]
    fn test_labor_already_harvested_yields_nothing() {
        let mut snapshot = base_snapshot();
        snapshot.labor = vec![labor(1, 3, NOW + 10_000, NOW)];
        assert!(labor_notifications(&snapshot, &LaborConfig::default()).is_empty());
    }

    #[test]
    fn test_labor_for_unknown_realm_is_skipped() {
        let mut snapshot = base_snapshot();
        snapshot.labor = vec![labor(99, 3, NOW, NOW - 72_000)];
        assert!(labor_notifications(&snapshot, &LaborConfig::default()).is_empty());
    }

    #[test]
    fn test_empty_chest_requires_arrival_and_resources() {
        let mut snapshot = base_snapshot();
        let home = Position { x: 10, y: 10 };
        snapshot.caravans = vec![
            caravan(100, "0xother", home, NOW - 5, 40),
            caravan(101, "0xother", home, NOW + 5, 40),
            caravan(102, "0xother", home, NOW - 5, 0),
            caravan(103, "0xother", Position { x: 99, y: 99 }, NOW - 5, 40),
        ];

        let notifications = empty_chest_notifications(&snapshot);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].keys, vec!["100".to_string()]);
        assert_eq!(notifications[0].event_type, EventType::EmptyChest);
    }

    #[test]
    fn test_arrived_at_bank_only_for_own_caravans() {
        let mut snapshot = base_snapshot();
        let bank = Position { x: 50, y: 50 };
        snapshot.caravans = vec![
            caravan(200, "0xABC", bank, NOW, 10),
            caravan(201, "0xother", bank, NOW, 10),
        ];

        let notifications = arrived_at_bank_notifications(&snapshot);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].keys, vec!["200".to_string()]);
    }

    #[test]
    fn test_raiders_split_by_owner() {
        let mut snapshot = base_snapshot();
        snapshot.raiders = vec![
            raider(300, 77, Position { x: 10, y: 10 }, NOW - 1),
            raider(301, 1, Position { x: 70, y: 70 }, NOW - 1),
            raider(302, 1, Position { x: 20, y: 20 }, NOW - 1),
            raider(303, 77, Position { x: 10, y: 10 }, NOW + 60),
        ];

        let enemy = enemy_raiders_arrived_notifications(&snapshot);
        assert_eq!(enemy.len(), 1);
        assert_eq!(enemy[0].keys, vec!["300".to_string()]);

        let ours = your_raiders_arrived_notifications(&snapshot);
        assert_eq!(ours.len(), 1);
        assert_eq!(ours[0].keys, vec!["301".to_string()]);
    }

    #[test]
    fn test_generate_all_respects_disabled_categories() {
        let mut snapshot = base_snapshot();
        snapshot.labor = vec![labor(1, 3, NOW, NOW - 7200)];
        snapshot.caravans = vec![caravan(100, "0xother", Position { x: 10, y: 10 }, NOW, 5)];

        let mut config = GeneratorConfig::default_enabled();
        assert_eq!(generate_all(&snapshot, &config, &LaborConfig::default()).len(), 2);

        config.set_enabled(EventType::Harvest, false);
        let notifications = generate_all(&snapshot, &config, &LaborConfig::default());
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].event_type, EventType::EmptyChest);
    }

    #[test]
    fn test_generate_all_is_pure() {
        let mut snapshot = base_snapshot();
        snapshot.labor = vec![labor(1, 3, NOW, NOW - 7200)];
        let config = GeneratorConfig::default();
        let labor_config = LaborConfig::default();

        let first = generate_all(&snapshot, &config, &labor_config);
        let second = generate_all(&snapshot, &config, &labor_config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_snapshot_yields_nothing() {
        let snapshot = StateSnapshot::default();
        let notifications = generate_all(&snapshot, &GeneratorConfig::default(), &LaborConfig::default());
        assert!(notifications.is_empty());
    }

    #[test]
    fn test_combat_notification_kinds() {
        let mut outcome = CombatOutcome {
            attacker_ids: vec![8, 9],
            target_id: 1,
            damage: 40,
            stolen: Vec::new(),
            timestamp: NOW,
        };
        let attacked = combat_notification(&outcome);
        assert_eq!(attacked.event_type, EventType::Attacked);
        assert_eq!(
            attacked.keys,
            vec!["8".to_string(), "9".to_string(), "1".to_string(), NOW.to_string()]
        );

        outcome.stolen = vec![ResourceAmount { resource_id: 2, amount: 5 }];
        assert_eq!(combat_notification(&outcome).event_type, EventType::StolenResource);
    }

    #[test]
    fn test_enemy_raiders_arriving() {
        let snapshot = base_snapshot();
        let mut travel = TravelEvent {
            entity_id: 400,
            owner_entity_id: Some(77),
            destination: Position { x: 20, y: 20 },
            arrival_time: Some(NOW + 300),
        };

        let notification = enemy_raiders_arriving_notification(&travel, Some(&snapshot)).unwrap();
        assert_eq!(notification.event_type, EventType::EnemyRaidersArriving);
        assert_eq!(notification.keys, vec!["400".to_string()]);

        // No snapshot yet
        assert!(enemy_raiders_arriving_notification(&travel, None).is_none());

        // Already arrived
        travel.arrival_time = Some(NOW);
        assert!(enemy_raiders_arriving_notification(&travel, Some(&snapshot)).is_none());

        // Our own raiders coming home
        travel.arrival_time = Some(NOW + 300);
        travel.owner_entity_id = Some(1);
        assert!(enemy_raiders_arriving_notification(&travel, Some(&snapshot)).is_none());
    }

    #[test]
    fn test_map_event_direct_offer() {
        let event = DomainEvent::DirectOffer(DirectOfferEvent {
            trade_id: 12,
            maker_id: 40,
            taker_id: 1,
            expires_at: None,
        });
        let notification = map_event(&event, None).unwrap();
        assert_eq!(notification.event_type, EventType::DirectOffer);
        assert_eq!(notification.keys, vec!["12".to_string()]);
    }
}
