/******************************************************************************
 *                                                                            *
 * Spawns collectible resources around each player's position and owns       *
 * the world_resource table. Placement respects a per-player density cap     *
 * and a minimum spacing between instances; slots that cannot find a valid   *
 * point are silently skipped. The scheduled sweep flips expired rows        *
 * inactive and drives the other periodic housekeeping.                      *
 *                                                                            *
 ******************************************************************************/

use spacetimedb::spacetimedb_lib::{ScheduleAt, TimeDuration};
use spacetimedb::{Identity, ReducerContext, Table, Timestamp};
use std::time::Duration;

use rand::Rng;

use crate::geo::{self, GeoPoint};
use crate::resource_catalog::resource_type as ResourceTypeTableTrait;
use crate::resource_catalog::{expiry_for, pick_rarity_tier, pick_type_within_tier, ResourceType};
use crate::player as PlayerTableTrait;
use crate::Player;

// --- Population Constants ---

/// Maximum simultaneously active resources in one player's working set.
pub const DENSITY_CAP: u32 = 15;
/// How many new resources one refresh tries to place, before capping.
pub const MIN_SPAWN_PER_REFRESH: u32 = 3;
pub const MAX_SPAWN_PER_REFRESH: u32 = 6;
/// Minimum great-circle spacing between any two active resources.
pub const MIN_RESOURCE_SPACING_M: f64 = 25.0;
/// Placement ring around the player. Close enough to walk to, far enough
/// that resources don't spawn on top of the player.
pub const SPAWN_ANNULUS_MIN_M: f64 = 40.0;
pub const SPAWN_ANNULUS_MAX_M: f64 = 250.0;
/// Samples tried per slot before giving up on it.
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 20;
/// Radius of the working set considered "near" a player.
pub const WORKING_SET_RADIUS_M: f64 = 500.0;

pub(crate) const SWEEP_INTERVAL_SECS: u64 = 60;

// --- World Resource Table ---

#[spacetimedb::table(
    accessor = world_resource,
    public,
    index(name = "idx_active", accessor = idx_active, btree(columns = [active]))
)]
#[derive(Clone, Debug)]
pub struct WorldResource {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub resource_type_id: u64,
    pub lat: f64,
    pub lng: f64,
    pub spawned_at: Timestamp,
    pub expires_at: Timestamp,
    /// Set exactly once, by the claim arbiter. Never cleared.
    pub claimed_by: Option<Identity>,
    pub claimed_at: Option<Timestamp>,
    /// True iff unclaimed and unexpired as of the last write. Flipped
    /// false exactly once, by a successful claim or the expiry sweep.
    pub active: bool,
}

pub fn is_expired(resource: &WorldResource, now: Timestamp) -> bool {
    now.to_micros_since_unix_epoch() >= resource.expires_at.to_micros_since_unix_epoch()
}

/// Read-time availability filter. Expiry counts even when the sweep has
/// not flipped the row yet, so a stale `active` flag can never make an
/// expired resource claimable.
pub fn is_available(resource: &WorldResource, now: Timestamp) -> bool {
    resource.active && resource.claimed_by.is_none() && !is_expired(resource, now)
}

// --- Placement Planning ---

/// Caps a requested spawn batch so the working set never exceeds
/// `DENSITY_CAP`.
pub fn capped_spawn_count(requested: u32, current: u32) -> u32 {
    requested.min(DENSITY_CAP.saturating_sub(current))
}

/// Picks up to `spawn_count` points in the annulus around `center`, each
/// at least `MIN_RESOURCE_SPACING_M` from every existing point and every
/// point already placed in this batch. A slot that finds no valid point
/// within `MAX_PLACEMENT_ATTEMPTS` samples is skipped; a crowded area
/// simply stays sparser until a later refresh.
pub fn plan_spawn_points(
    rng: &mut impl Rng,
    center: GeoPoint,
    existing: &[GeoPoint],
    spawn_count: u32,
) -> Vec<GeoPoint> {
    let mut placed: Vec<GeoPoint> = Vec::with_capacity(spawn_count as usize);
    for _slot in 0..spawn_count {
        for _attempt in 0..MAX_PLACEMENT_ATTEMPTS {
            let candidate =
                geo::random_point_in_annulus(rng, center, SPAWN_ANNULUS_MIN_M, SPAWN_ANNULUS_MAX_M);
            if geo::far_enough_apart(candidate, existing, MIN_RESOURCE_SPACING_M)
                && geo::far_enough_apart(candidate, &placed, MIN_RESOURCE_SPACING_M)
            {
                placed.push(candidate);
                break;
            }
        }
    }
    placed
}

/// Tops up the working set around `player` to the target density. Inserts
/// fully-formed rows (rarity first, then a type within the rarity, then
/// expiry from the type's lifespan) and never mutates an existing row.
/// Returns how many resources were spawned.
pub fn ensure_population(ctx: &ReducerContext, player: &Player) -> Result<u32, String> {
    let now = ctx.timestamp;
    let center = GeoPoint::new(player.lat, player.lng);

    let working_set: Vec<GeoPoint> = ctx
        .db
        .world_resource()
        .iter()
        .filter(|r| is_available(r, now))
        .map(|r| GeoPoint::new(r.lat, r.lng))
        .filter(|p| geo::distance_meters(center, *p) <= WORKING_SET_RADIUS_M)
        .collect();

    let current = working_set.len() as u32;
    if current >= DENSITY_CAP {
        return Ok(0);
    }

    let catalog: Vec<ResourceType> = ctx.db.resource_type().iter().collect();
    if catalog.is_empty() {
        log::warn!("Resource catalog is empty; skipping spawn for {:?}.", player.identity);
        return Ok(0);
    }

    let mut rng = ctx.rng();
    let requested = rng.gen_range(MIN_SPAWN_PER_REFRESH..=MAX_SPAWN_PER_REFRESH);
    let spawn_count = capped_spawn_count(requested, current);
    let points = plan_spawn_points(&mut rng, center, &working_set, spawn_count);

    let mut spawned = 0u32;
    for point in points {
        let roll = rng.gen_range(0.0..100.0);
        let tier = pick_rarity_tier(roll);
        let type_def = match pick_type_within_tier(&mut rng, &catalog, tier) {
            Some(t) => t,
            None => {
                log::debug!("No catalog entries for tier {:?}; slot skipped.", tier);
                continue;
            }
        };
        let expires_at = expiry_for(type_def.lifespan_hours, now);
        ctx.db.world_resource().insert(WorldResource {
            id: 0,
            resource_type_id: type_def.id,
            lat: point.lat,
            lng: point.lng,
            spawned_at: now,
            expires_at,
            claimed_by: None,
            claimed_at: None,
            active: true,
        });
        spawned += 1;
    }

    if spawned > 0 {
        log::info!(
            "Spawned {} resources near {:?} ({} already in the working set).",
            spawned,
            player.identity,
            current
        );
    }
    Ok(spawned)
}

/// Client-triggered view refresh: tops up the working set without waiting
/// for the next position update.
#[spacetimedb::reducer]
pub fn refresh_resources(ctx: &ReducerContext) -> Result<(), String> {
    let player = ctx
        .db
        .player()
        .identity()
        .find(ctx.sender())
        .ok_or_else(|| "Player not found".to_string())?;
    if !crate::player_position::has_fresh_position(&player, ctx.timestamp) {
        return Err("Current position is unknown or stale".to_string());
    }
    ensure_population(ctx, &player)?;
    Ok(())
}

// --- Scheduled Sweep ---

#[spacetimedb::table(accessor = resource_sweep_schedule, scheduled(process_resource_sweep))]
#[derive(Clone)]
pub struct ResourceSweepSchedule {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub scheduled_at: ScheduleAt,
}

pub fn init_resource_sweep_schedule(ctx: &ReducerContext) -> Result<(), String> {
    let schedule_table = ctx.db.resource_sweep_schedule();
    if schedule_table.iter().count() == 0 {
        log::info!("Starting resource sweep schedule (every {}s).", SWEEP_INTERVAL_SECS);
        match schedule_table.try_insert(ResourceSweepSchedule {
            id: 0,
            scheduled_at: ScheduleAt::Interval(TimeDuration::from(Duration::from_secs(
                SWEEP_INTERVAL_SECS,
            ))),
        }) {
            Ok(_) => {}
            Err(e) => {
                // Read-time filters keep expiry correct without the sweep;
                // the table just stays untidy until the next publish.
                log::error!("Failed to initialize resource sweep schedule: {}", e);
            }
        }
    } else {
        log::debug!("Resource sweep schedule already exists.");
    }
    Ok(())
}

/// Periodic housekeeping: flips expired rows inactive, reaps abandoned
/// mining sessions, and retries parked inventory credits.
#[spacetimedb::reducer]
pub fn process_resource_sweep(
    ctx: &ReducerContext,
    _schedule: ResourceSweepSchedule,
) -> Result<(), String> {
    if ctx.sender() != ctx.identity() {
        return Err("process_resource_sweep may only be called by the scheduler.".to_string());
    }

    let now = ctx.timestamp;
    let resources = ctx.db.world_resource();
    let expired: Vec<WorldResource> = resources
        .iter()
        .filter(|r| r.active && is_expired(r, now))
        .collect();
    let expired_count = expired.len();
    for mut resource in expired {
        resource.active = false;
        resources.id().update(resource);
    }
    if expired_count > 0 {
        log::info!("Sweep deactivated {} expired resources.", expired_count);
    }

    crate::mining::reap_abandoned_sessions(ctx);
    crate::inventory::retry_pending_credits(ctx);
    Ok(())
}
