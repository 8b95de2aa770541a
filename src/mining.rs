/******************************************************************************
 *                                                                            *
 * Timed mining sessions, one per player. A session validates proximity      *
 * and availability up front, runs a server-recorded timer whose duration    *
 * comes from the resource's rarity tier, and issues exactly one claim       *
 * attempt when the client reports completion. Cancelling before the timer   *
 * elapses removes the session and nothing else; a failed claim returns      *
 * the player to idle with no retry.                                         *
 *                                                                            *
 ******************************************************************************/

use spacetimedb::{Identity, ReducerContext, Table, TimeDuration, Timestamp};
use std::time::Duration;

use crate::claim::{self, ClaimError};
use crate::geo::{self, GeoPoint};
use crate::player as PlayerTableTrait;
use crate::player_position;
use crate::resource_catalog::resource_type as ResourceTypeTableTrait;
use crate::resource_spawning::world_resource as WorldResourceTableTrait;

/// Sessions whose timer finished this long ago with no completion call
/// (crashed client, dropped connection) are reaped by the sweep.
pub(crate) const SESSION_REAP_GRACE_SECS: u64 = 300;

#[spacetimedb::table(accessor = mining_session, public)]
#[derive(Clone, Debug)]
pub struct MiningSession {
    #[primary_key]
    pub player_id: Identity,
    pub resource_id: u64,
    pub started_at: Timestamp,
    pub finishes_at: Timestamp,
}

/// Progress of a session in percent, clamped to [0, 100]. The client
/// animates from this; the server only cares about the endpoints.
pub fn progress_percent(session: &MiningSession, now: Timestamp) -> u8 {
    let started = session.started_at.to_micros_since_unix_epoch();
    let finishes = session.finishes_at.to_micros_since_unix_epoch();
    let total = finishes.saturating_sub(started);
    if total <= 0 {
        return 100;
    }
    let elapsed = now.to_micros_since_unix_epoch().saturating_sub(started);
    if elapsed <= 0 {
        return 0;
    }
    ((elapsed.saturating_mul(100) / total).min(100)) as u8
}

/// Starts a mining session on `resource_id`. All validation happens here,
/// before any timer exists: an out-of-range or unavailable resource is
/// rejected with no session created.
#[spacetimedb::reducer]
pub fn start_mining(ctx: &ReducerContext, resource_id: u64) -> Result<(), String> {
    let player_id = ctx.sender();
    let player = ctx
        .db
        .player()
        .identity()
        .find(player_id)
        .ok_or_else(|| "Player not found".to_string())?;
    if !player.is_online {
        return Err("Player is not online".to_string());
    }
    if !player_position::has_fresh_position(&player, ctx.timestamp) {
        return Err("Current position is unknown or stale".to_string());
    }
    if let Some(existing) = ctx.db.mining_session().player_id().find(player_id) {
        if ctx.timestamp.to_micros_since_unix_epoch()
            < existing.finishes_at.to_micros_since_unix_epoch()
        {
            return Err("Already mining".to_string());
        }
        // A finished session that never produced a successful claim (a
        // failed completion aborts its transaction and leaves the row).
        // The new attempt replaces it.
        ctx.db.mining_session().player_id().delete(player_id);
    }

    let resource = ctx
        .db
        .world_resource()
        .id()
        .find(resource_id)
        .ok_or_else(|| ClaimError::NotAvailable.to_string())?;
    claim::evaluate_availability(&resource, ctx.timestamp).map_err(|e| e.to_string())?;

    let distance = geo::distance_meters(
        GeoPoint::new(player.lat, player.lng),
        GeoPoint::new(resource.lat, resource.lng),
    );
    if distance > claim::PROXIMITY_THRESHOLD_M {
        return Err(ClaimError::TooFar.to_string());
    }

    let type_def = ctx
        .db
        .resource_type()
        .id()
        .find(resource.resource_type_id)
        .ok_or_else(|| ClaimError::NotAvailable.to_string())?;

    let finishes_at =
        ctx.timestamp + TimeDuration::from(Duration::from_millis(type_def.mining_duration_ms));
    ctx.db.mining_session().insert(MiningSession {
        player_id,
        resource_id,
        started_at: ctx.timestamp,
        finishes_at,
    });

    log::info!(
        "Player {:?} started mining resource {} ({}, {:?}, {} ms).",
        player_id,
        resource_id,
        type_def.name,
        type_def.rarity,
        type_def.mining_duration_ms
    );
    Ok(())
}

/// Abandons the active session, if any. Cancelling before completion has
/// zero effects beyond deleting the session row, and calling with no
/// session is a no-op, so a closing client can always fire this safely.
#[spacetimedb::reducer]
pub fn cancel_mining(ctx: &ReducerContext) -> Result<(), String> {
    let player_id = ctx.sender();
    if ctx.db.mining_session().player_id().find(player_id).is_some() {
        ctx.db.mining_session().player_id().delete(player_id);
        log::info!("Player {:?} cancelled mining.", player_id);
    }
    Ok(())
}

/// Completes the session and issues the one claim attempt. On success the
/// session delete, the claim, and the inventory credit commit together; a
/// failure aborts the whole transaction, so a failed attempt has no side
/// effects at all and the spent session row is cleared by the next
/// start_mining or the sweep.
#[spacetimedb::reducer]
pub fn complete_mining(ctx: &ReducerContext) -> Result<(), String> {
    let player_id = ctx.sender();
    let session = ctx
        .db
        .mining_session()
        .player_id()
        .find(player_id)
        .ok_or_else(|| "No active mining session".to_string())?;

    if ctx.timestamp.to_micros_since_unix_epoch()
        < session.finishes_at.to_micros_since_unix_epoch()
    {
        return Err("Mining is still in progress".to_string());
    }

    ctx.db.mining_session().player_id().delete(player_id);

    let player = ctx
        .db
        .player()
        .identity()
        .find(player_id)
        .ok_or_else(|| "Player not found".to_string())?;
    if !player_position::has_fresh_position(&player, ctx.timestamp) {
        return Err("Current position is unknown or stale".to_string());
    }

    let claimant_pos = GeoPoint::new(player.lat, player.lng);
    match claim::try_claim(ctx, session.resource_id, player_id, claimant_pos) {
        Ok(resource) => {
            crate::inventory::credit_or_park(ctx, player_id, resource.resource_type_id, 1);
            Ok(())
        }
        Err(reason) => {
            log::info!(
                "Player {:?} failed to claim resource {}: {}",
                player_id,
                session.resource_id,
                reason
            );
            Err(reason.to_string())
        }
    }
}

/// Removes sessions whose timer elapsed long ago without a completion
/// call. The resource itself was never touched, so nothing else needs
/// undoing. Called from the scheduled sweep.
pub(crate) fn reap_abandoned_sessions(ctx: &ReducerContext) {
    let cutoff_micros = ctx
        .timestamp
        .to_micros_since_unix_epoch()
        .saturating_sub(SESSION_REAP_GRACE_SECS as i64 * 1_000_000);
    let stale: Vec<MiningSession> = ctx
        .db
        .mining_session()
        .iter()
        .filter(|s| s.finishes_at.to_micros_since_unix_epoch() < cutoff_micros)
        .collect();
    for session in stale {
        log::warn!(
            "Reaping abandoned mining session for {:?} (resource {}).",
            session.player_id,
            session.resource_id
        );
        ctx.db.mining_session().player_id().delete(session.player_id);
    }
}
