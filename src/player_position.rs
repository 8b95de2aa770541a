// Position feed handling. The client pushes geolocation fixes as they
// arrive; the server keeps the latest usable fix per player and treats a
// stale or missing fix as "no position", pausing spawning and claim
// eligibility until the next update.

use spacetimedb::{ReducerContext, Table, Timestamp};

use crate::player as PlayerTableTrait;
use crate::Player;

/// A fix older than this is "no position".
pub const POSITION_STALE_SECS: u64 = 60;

/// Fixes with worse reported accuracy than this are dropped: a fix that
/// coarse cannot gate a 50 m proximity check.
pub const MAX_ACCEPTED_ACCURACY_M: f64 = 100.0;

/// True iff the player has a usable, recent fix. `last_position_update`
/// of UNIX_EPOCH means no fix was ever accepted.
pub fn has_fresh_position(player: &Player, now: Timestamp) -> bool {
    if player.last_position_update == Timestamp::UNIX_EPOCH {
        return false;
    }
    let age_micros = now
        .to_micros_since_unix_epoch()
        .saturating_sub(player.last_position_update.to_micros_since_unix_epoch());
    age_micros <= POSITION_STALE_SECS as i64 * 1_000_000
}

/// Sanity check on raw fix values before they touch the player row.
pub fn is_valid_fix(lat: f64, lng: f64, accuracy_m: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && accuracy_m.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
        && accuracy_m >= 0.0
}

/// Stores the latest geolocation fix for the calling player and tops up
/// the resource working set around the new position.
#[spacetimedb::reducer]
pub fn update_player_position(
    ctx: &ReducerContext,
    lat: f64,
    lng: f64,
    accuracy_m: f64,
) -> Result<(), String> {
    let player_id = ctx.sender();
    if !is_valid_fix(lat, lng, accuracy_m) {
        return Err("Invalid position fix".to_string());
    }
    if accuracy_m > MAX_ACCEPTED_ACCURACY_M {
        // Keep the previous fix and let it age out instead.
        log::debug!(
            "Ignoring low-accuracy fix ({:.0} m) from {:?}.",
            accuracy_m,
            player_id
        );
        return Ok(());
    }

    let players = ctx.db.player();
    let mut player = players
        .identity()
        .find(player_id)
        .ok_or_else(|| "Player not found".to_string())?;
    player.lat = lat;
    player.lng = lng;
    player.accuracy_m = accuracy_m;
    player.last_position_update = ctx.timestamp;
    players.identity().update(player.clone());

    crate::resource_spawning::ensure_population(ctx, &player)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacetimedb::Identity;

    fn player_with_fix_at(micros: i64) -> Player {
        Player {
            identity: Identity::from_be_byte_array([1u8; 32]),
            username: "tester".to_string(),
            lat: 47.6,
            lng: -122.3,
            accuracy_m: 10.0,
            last_position_update: Timestamp::from_micros_since_unix_epoch(micros),
            is_online: true,
            registered_at: Timestamp::from_micros_since_unix_epoch(0),
        }
    }

    #[test]
    fn a_recent_fix_is_fresh() {
        let player = player_with_fix_at(10_000_000);
        let now = Timestamp::from_micros_since_unix_epoch(20_000_000);
        assert!(has_fresh_position(&player, now));
    }

    #[test]
    fn a_fix_past_the_staleness_window_is_not_fresh() {
        let player = player_with_fix_at(10_000_000);
        let now = Timestamp::from_micros_since_unix_epoch(10_000_000 + 61 * 1_000_000);
        assert!(!has_fresh_position(&player, now));
    }

    #[test]
    fn a_player_with_no_fix_is_never_fresh() {
        let mut player = player_with_fix_at(0);
        player.last_position_update = Timestamp::UNIX_EPOCH;
        let now = Timestamp::from_micros_since_unix_epoch(1);
        assert!(!has_fresh_position(&player, now));
    }

    #[test]
    fn fix_validation_rejects_garbage() {
        assert!(is_valid_fix(47.6, -122.3, 5.0));
        assert!(is_valid_fix(-90.0, 180.0, 0.0));
        assert!(!is_valid_fix(f64::NAN, 0.0, 5.0));
        assert!(!is_valid_fix(0.0, f64::INFINITY, 5.0));
        assert!(!is_valid_fix(91.0, 0.0, 5.0));
        assert!(!is_valid_fix(0.0, -181.0, 5.0));
        assert!(!is_valid_fix(0.0, 0.0, -1.0));
    }
}
