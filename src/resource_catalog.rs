/******************************************************************************
 *                                                                            *
 * Static catalog of mineable resource types, grouped by rarity tier.        *
 * The catalog is seeded into the public resource_type table once at         *
 * module init and treated as read-only afterwards; clients subscribe to     *
 * it for names, values, and mining durations. Rarity tiers carry the        *
 * spawn distribution, mining duration, and lifespan shared by their         *
 * member types.                                                             *
 *                                                                            *
 ******************************************************************************/

use lazy_static::lazy_static;
use rand::Rng;
use serde::{Deserialize, Serialize};
use spacetimedb::{ReducerContext, SpacetimeType, Table, TimeDuration, Timestamp};
use std::time::Duration;

// --- Rarity Tiers ---

#[derive(SpacetimeType, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RarityTier {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl RarityTier {
    /// Draw order for `pick_rarity_tier`. Common is checked first, so any
    /// shortfall in the chance total lands there.
    pub const ALL: [RarityTier; 5] = [
        RarityTier::Common,
        RarityTier::Uncommon,
        RarityTier::Rare,
        RarityTier::Epic,
        RarityTier::Legendary,
    ];

    /// Share of spawns this tier receives, in percent of the whole draw.
    pub fn spawn_chance_percent(self) -> f64 {
        match self {
            RarityTier::Common => 60.0,
            RarityTier::Uncommon => 25.0,
            RarityTier::Rare => 10.0,
            RarityTier::Epic => 4.0,
            RarityTier::Legendary => 1.0,
        }
    }

    /// How long a mining session on this tier runs.
    pub fn mining_duration_ms(self) -> u64 {
        match self {
            RarityTier::Common => 3_000,
            RarityTier::Uncommon => 5_000,
            RarityTier::Rare => 8_000,
            RarityTier::Epic => 12_000,
            RarityTier::Legendary => 20_000,
        }
    }

    /// How long a spawned instance of this tier stays claimable.
    pub fn lifespan_hours(self) -> u32 {
        match self {
            RarityTier::Common => 6,
            RarityTier::Uncommon => 12,
            RarityTier::Rare => 24,
            RarityTier::Epic => 48,
            RarityTier::Legendary => 72,
        }
    }
}

/// Weighted draw over the tier spawn chances. `roll_percent` must be in
/// [0, 100). Walks the tiers in `RarityTier::ALL` order accumulating each
/// chance; if the chances are ever tuned to sum short of 100, rolls past
/// the cumulative total fall back to the first tier checked, quietly
/// inflating its share. Inherited behavior, kept on purpose.
pub fn pick_rarity_tier(roll_percent: f64) -> RarityTier {
    let mut cumulative = 0.0;
    for tier in RarityTier::ALL {
        cumulative += tier.spawn_chance_percent();
        if roll_percent < cumulative {
            return tier;
        }
    }
    RarityTier::ALL[0]
}

// --- Resource Type Definitions ---

/// One entry of the built-in catalog. Seeded into `resource_type` rows at
/// init; mining duration and lifespan come from the entry's tier.
#[derive(Clone, Debug)]
pub struct ResourceTypeData {
    pub name: &'static str,
    pub category: &'static str,
    pub rarity: RarityTier,
    /// Reward units credited per mined instance.
    pub base_value: u32,
    /// Relative weight within the tier. Carried for tuning; selection
    /// within a tier is currently uniform.
    pub spawn_weight: u32,
}

lazy_static! {
    pub static ref RESOURCE_TYPE_DATABASE: Vec<ResourceTypeData> = vec![
        // === COMMON ===
        ResourceTypeData { name: "Quartz Pebble",       category: "mineral", rarity: RarityTier::Common,    base_value: 1,   spawn_weight: 10 },
        ResourceTypeData { name: "Copper Nugget",       category: "metal",   rarity: RarityTier::Common,    base_value: 2,   spawn_weight: 8 },
        ResourceTypeData { name: "Salt Crystal",        category: "mineral", rarity: RarityTier::Common,    base_value: 1,   spawn_weight: 6 },
        ResourceTypeData { name: "Clay Lump",           category: "mineral", rarity: RarityTier::Common,    base_value: 1,   spawn_weight: 6 },
        // === UNCOMMON ===
        ResourceTypeData { name: "Amethyst Shard",      category: "gem",     rarity: RarityTier::Uncommon,  base_value: 5,   spawn_weight: 5 },
        ResourceTypeData { name: "Iron Nugget",         category: "metal",   rarity: RarityTier::Uncommon,  base_value: 4,   spawn_weight: 6 },
        ResourceTypeData { name: "Pyrite Cluster",      category: "mineral", rarity: RarityTier::Uncommon,  base_value: 4,   spawn_weight: 4 },
        // === RARE ===
        ResourceTypeData { name: "Silver Vein",         category: "metal",   rarity: RarityTier::Rare,      base_value: 12,  spawn_weight: 4 },
        ResourceTypeData { name: "Topaz Fragment",      category: "gem",     rarity: RarityTier::Rare,      base_value: 15,  spawn_weight: 3 },
        ResourceTypeData { name: "Jade Pebble",         category: "gem",     rarity: RarityTier::Rare,      base_value: 14,  spawn_weight: 3 },
        // === EPIC ===
        ResourceTypeData { name: "Emerald Shard",       category: "gem",     rarity: RarityTier::Epic,      base_value: 40,  spawn_weight: 2 },
        ResourceTypeData { name: "Sapphire Geode",      category: "gem",     rarity: RarityTier::Epic,      base_value: 45,  spawn_weight: 2 },
        // === LEGENDARY ===
        ResourceTypeData { name: "Diamond in the Rough", category: "gem",    rarity: RarityTier::Legendary, base_value: 150, spawn_weight: 2 },
        ResourceTypeData { name: "Meteorite Fragment",  category: "exotic",  rarity: RarityTier::Legendary, base_value: 200, spawn_weight: 1 },
    ];
}

// --- Catalog Table ---

#[spacetimedb::table(accessor = resource_type, public)]
#[derive(Clone, Debug)]
pub struct ResourceType {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub name: String,
    pub category: String,
    pub rarity: RarityTier,
    pub base_value: u32,
    pub spawn_weight: u32,
    pub mining_duration_ms: u64,
    pub lifespan_hours: u32,
}

/// When a resource with the given lifespan, spawned now, stops being
/// claimable.
pub fn expiry_for(lifespan_hours: u32, now: Timestamp) -> Timestamp {
    now + TimeDuration::from(Duration::from_secs(lifespan_hours as u64 * 3600))
}

/// Uniform pick among catalog rows of the given tier. Returns None when
/// the tier has no entries (possible with a trimmed or empty catalog).
pub fn pick_type_within_tier<'a>(
    rng: &mut impl Rng,
    types: &'a [ResourceType],
    tier: RarityTier,
) -> Option<&'a ResourceType> {
    let candidates: Vec<&ResourceType> = types.iter().filter(|t| t.rarity == tier).collect();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.gen_range(0..candidates.len())])
}

/// Seeds the resource_type table from the static database. Idempotent:
/// a populated table is left untouched, so republishing the module does
/// not duplicate the catalog.
pub fn seed_resource_types(ctx: &ReducerContext) -> Result<(), String> {
    let types = ctx.db.resource_type();
    if types.iter().count() > 0 {
        log::debug!("Resource type catalog already seeded.");
        return Ok(());
    }

    let mut seeded = 0u32;
    for data in RESOURCE_TYPE_DATABASE.iter() {
        match types.try_insert(ResourceType {
            id: 0,
            name: data.name.to_string(),
            category: data.category.to_string(),
            rarity: data.rarity,
            base_value: data.base_value,
            spawn_weight: data.spawn_weight,
            mining_duration_ms: data.rarity.mining_duration_ms(),
            lifespan_hours: data.rarity.lifespan_hours(),
        }) {
            Ok(_) => seeded += 1,
            Err(e) => log::error!("Failed to seed resource type '{}': {}", data.name, e),
        }
    }
    log::info!("Seeded {} resource types.", seeded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog_rows() -> Vec<ResourceType> {
        RESOURCE_TYPE_DATABASE
            .iter()
            .enumerate()
            .map(|(i, data)| ResourceType {
                id: i as u64 + 1,
                name: data.name.to_string(),
                category: data.category.to_string(),
                rarity: data.rarity,
                base_value: data.base_value,
                spawn_weight: data.spawn_weight,
                mining_duration_ms: data.rarity.mining_duration_ms(),
                lifespan_hours: data.rarity.lifespan_hours(),
            })
            .collect()
    }

    #[test]
    fn rarity_bands_follow_the_cumulative_chances() {
        // Cumulative bounds: 60, 85, 95, 99, 100.
        assert_eq!(pick_rarity_tier(0.0), RarityTier::Common);
        assert_eq!(pick_rarity_tier(59.9), RarityTier::Common);
        assert_eq!(pick_rarity_tier(60.0), RarityTier::Uncommon);
        assert_eq!(pick_rarity_tier(84.9), RarityTier::Uncommon);
        assert_eq!(pick_rarity_tier(85.0), RarityTier::Rare);
        assert_eq!(pick_rarity_tier(94.9), RarityTier::Rare);
        assert_eq!(pick_rarity_tier(95.0), RarityTier::Epic);
        assert_eq!(pick_rarity_tier(98.9), RarityTier::Epic);
        assert_eq!(pick_rarity_tier(99.0), RarityTier::Legendary);
        assert_eq!(pick_rarity_tier(99.9), RarityTier::Legendary);
    }

    #[test]
    fn rolls_past_the_cumulative_total_fall_back_to_the_first_tier() {
        // With chances tuned short of 100 this is the band the remainder
        // lands in; an out-of-range roll exercises the same path.
        assert_eq!(pick_rarity_tier(100.0), RarityTier::Common);
        assert_eq!(pick_rarity_tier(250.0), RarityTier::Common);
    }

    #[test]
    fn every_tier_has_catalog_entries() {
        let rows = catalog_rows();
        for tier in RarityTier::ALL {
            assert!(
                rows.iter().any(|t| t.rarity == tier),
                "tier {:?} has no entries",
                tier
            );
        }
    }

    #[test]
    fn catalog_names_are_unique_and_values_positive() {
        let rows = catalog_rows();
        for (i, a) in rows.iter().enumerate() {
            assert!(a.base_value > 0, "{} has zero value", a.name);
            assert!(a.spawn_weight > 0, "{} has zero weight", a.name);
            for b in rows.iter().skip(i + 1) {
                assert_ne!(a.name, b.name, "duplicate catalog name");
            }
        }
    }

    #[test]
    fn type_pick_stays_inside_the_requested_tier() {
        let rows = catalog_rows();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let picked = pick_type_within_tier(&mut rng, &rows, RarityTier::Rare)
                .expect("rare tier is populated");
            assert_eq!(picked.rarity, RarityTier::Rare);
        }
    }

    #[test]
    fn type_pick_on_an_empty_tier_returns_none() {
        let rows: Vec<ResourceType> = catalog_rows()
            .into_iter()
            .filter(|t| t.rarity != RarityTier::Legendary)
            .collect();
        let mut rng = StdRng::seed_from_u64(4);
        assert!(pick_type_within_tier(&mut rng, &rows, RarityTier::Legendary).is_none());
    }

    #[test]
    fn expiry_is_the_lifespan_past_now() {
        let now = Timestamp::from_micros_since_unix_epoch(5_000_000);
        let expiry = expiry_for(6, now);
        let expected = 5_000_000 + 6 * 3600 * 1_000_000i64;
        assert_eq!(expiry.to_micros_since_unix_epoch(), expected);
    }

    #[test]
    fn mining_duration_grows_with_rarity() {
        let mut last = 0u64;
        for tier in RarityTier::ALL {
            assert!(tier.mining_duration_ms() > last);
            last = tier.mining_duration_ms();
        }
    }
}
