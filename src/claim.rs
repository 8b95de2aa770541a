/******************************************************************************
 *                                                                            *
 * Claim arbitration: converts an active world resource into a claimed one   *
 * for exactly one player. The transition is a conditional write executed    *
 * inside the calling reducer's transaction, so concurrent attempts on the   *
 * same row serialize and at most one wins; every later attempt reads the    *
 * claimed row and loses the race. Only this module flips a resource's       *
 * terminal state.                                                           *
 *                                                                            *
 ******************************************************************************/

use spacetimedb::{Identity, ReducerContext, Table, Timestamp};

use crate::geo::{self, GeoPoint};
use crate::resource_spawning::world_resource as WorldResourceTableTrait;
use crate::resource_spawning::{is_expired, WorldResource};

/// Maximum distance from which a claim may be attempted, in meters.
pub const PROXIMITY_THRESHOLD_M: f64 = 50.0;

/// Why a claim attempt did not award the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimError {
    /// Resource missing, expired, swept inactive, or already claimed as
    /// seen by a pre-write validation.
    NotAvailable,
    /// Claimant is outside the proximity threshold.
    TooFar,
    /// A competing claim committed first. Terminal for this attempt:
    /// retrying would target a resource that is inactive by definition.
    LostRace,
    /// Transport/backend failure. Raised by the client SDK when the module
    /// is unreachable; listed here so the wire contract names every case.
    StoreUnavailable,
    /// The inventory credit failed after a successful claim. The claim
    /// stands; the credit is parked and reconciled later.
    InventoryInconsistent,
}

impl std::fmt::Display for ClaimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ClaimError::NotAvailable => "Resource is no longer available",
            ClaimError::TooFar => "Too far away to mine this resource",
            ClaimError::LostRace => "Another prospector claimed this resource first",
            ClaimError::StoreUnavailable => "Store unavailable",
            ClaimError::InventoryInconsistent => "Claim succeeded but the credit is still pending",
        };
        write!(f, "{}", msg)
    }
}

impl From<ClaimError> for String {
    fn from(e: ClaimError) -> String {
        e.to_string()
    }
}

/// Pre-write validation used before a mining timer ever starts. Anything
/// short of "active, unexpired, unclaimed" reads as NotAvailable here;
/// the finer LostRace distinction only exists at write time.
pub fn evaluate_availability(resource: &WorldResource, now: Timestamp) -> Result<(), ClaimError> {
    if resource.claimed_by.is_some() || !resource.active || is_expired(resource, now) {
        return Err(ClaimError::NotAvailable);
    }
    Ok(())
}

/// The conditional transition itself. Checks run in contract order and a
/// failure leaves the row untouched:
/// 1. a row someone already claimed is the zero-rows-affected outcome of
///    the conditional write: LostRace;
/// 2. an expired or swept row is NotAvailable, even when the sweep never
///    got around to flipping `active`;
/// 3. a claimant outside the threshold is TooFar;
/// 4. otherwise the row is claimed and permanently deactivated.
pub fn apply_claim(
    resource: &mut WorldResource,
    claimant: Identity,
    claimant_pos: GeoPoint,
    now: Timestamp,
) -> Result<(), ClaimError> {
    if resource.claimed_by.is_some() {
        return Err(ClaimError::LostRace);
    }
    if !resource.active || is_expired(resource, now) {
        return Err(ClaimError::NotAvailable);
    }

    let distance =
        geo::distance_meters(claimant_pos, GeoPoint::new(resource.lat, resource.lng));
    if distance > PROXIMITY_THRESHOLD_M {
        return Err(ClaimError::TooFar);
    }

    resource.claimed_by = Some(claimant);
    resource.claimed_at = Some(now);
    resource.active = false;
    Ok(())
}

/// Attempts to claim `resource_id` for `claimant`. Runs inside the calling
/// reducer's transaction: the load, the checks, and the update commit
/// atomically, so under N concurrent attempts exactly one caller gets Ok
/// and the rest observe the claimed row. Returns the claimed row so the
/// caller can credit the right resource type.
pub fn try_claim(
    ctx: &ReducerContext,
    resource_id: u64,
    claimant: Identity,
    claimant_pos: GeoPoint,
) -> Result<WorldResource, ClaimError> {
    let resources = ctx.db.world_resource();
    let mut resource = match resources.id().find(resource_id) {
        Some(r) => r,
        None => return Err(ClaimError::NotAvailable),
    };

    apply_claim(&mut resource, claimant, claimant_pos, ctx.timestamp)?;

    resources.id().update(resource.clone());
    log::info!(
        "Resource {} claimed by {:?} (type {}).",
        resource.id,
        claimant,
        resource.resource_type_id
    );
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANCHOR: GeoPoint = GeoPoint { lat: 47.6062, lng: -122.3321 };
    const FAR_FUTURE_MICROS: i64 = 4_000_000_000_000_000;

    fn user(n: u8) -> Identity {
        Identity::from_be_byte_array([n; 32])
    }

    fn active_resource() -> WorldResource {
        WorldResource {
            id: 7,
            resource_type_id: 3,
            lat: ANCHOR.lat,
            lng: ANCHOR.lng,
            spawned_at: Timestamp::from_micros_since_unix_epoch(0),
            expires_at: Timestamp::from_micros_since_unix_epoch(FAR_FUTURE_MICROS),
            claimed_by: None,
            claimed_at: None,
            active: true,
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_micros_since_unix_epoch(1_000_000)
    }

    #[test]
    fn a_single_claim_wins_and_deactivates_the_resource() {
        let mut resource = active_resource();
        let winner = user(1);
        assert_eq!(apply_claim(&mut resource, winner, ANCHOR, now()), Ok(()));
        assert_eq!(resource.claimed_by, Some(winner));
        assert!(resource.claimed_at.is_some());
        assert!(!resource.active);
    }

    #[test]
    fn exactly_one_of_k_attempts_wins() {
        for k in 1..=8u8 {
            let mut resource = active_resource();
            let mut wins = 0;
            let mut lost_races = 0;
            for n in 1..=k {
                let pos = geo::offset_by_meters(ANCHOR, n as f64, 0.0);
                match apply_claim(&mut resource, user(n), pos, now()) {
                    Ok(()) => wins += 1,
                    Err(ClaimError::LostRace) => lost_races += 1,
                    Err(other) => panic!("unexpected error {:?}", other),
                }
            }
            assert_eq!(wins, 1, "k={}", k);
            assert_eq!(lost_races, (k - 1) as u32, "k={}", k);
            assert_eq!(resource.claimed_by, Some(user(1)));
            assert!(!resource.active);
        }
    }

    #[test]
    fn two_way_race_has_one_winner_and_one_lost_race() {
        let mut resource = active_resource();
        let pos_a = geo::offset_by_meters(ANCHOR, 10.0, 0.0);
        let pos_b = geo::offset_by_meters(ANCHOR, 0.0, 10.0);
        assert_eq!(apply_claim(&mut resource, user(1), pos_a, now()), Ok(()));
        assert_eq!(
            apply_claim(&mut resource, user(2), pos_b, now()),
            Err(ClaimError::LostRace)
        );
        assert_eq!(resource.claimed_by, Some(user(1)));
        assert!(!resource.active);
    }

    #[test]
    fn out_of_range_claim_fails_without_mutation() {
        let mut resource = active_resource();
        let far = geo::offset_by_meters(ANCHOR, 0.0, 200.0);
        assert_eq!(
            apply_claim(&mut resource, user(1), far, now()),
            Err(ClaimError::TooFar)
        );
        assert!(resource.active);
        assert_eq!(resource.claimed_by, None);
        assert_eq!(resource.claimed_at, None);
    }

    #[test]
    fn claim_just_inside_the_threshold_succeeds() {
        let mut resource = active_resource();
        let close = geo::offset_by_meters(ANCHOR, 49.0, 0.0);
        assert_eq!(apply_claim(&mut resource, user(1), close, now()), Ok(()));
    }

    #[test]
    fn claim_just_outside_the_threshold_fails() {
        let mut resource = active_resource();
        let outside = geo::offset_by_meters(ANCHOR, 52.0, 0.0);
        assert_eq!(
            apply_claim(&mut resource, user(1), outside, now()),
            Err(ClaimError::TooFar)
        );
    }

    #[test]
    fn expired_resource_is_not_available_even_while_flagged_active() {
        let mut resource = active_resource();
        resource.expires_at = Timestamp::from_micros_since_unix_epoch(500);
        assert!(resource.active);
        assert_eq!(
            apply_claim(&mut resource, user(1), ANCHOR, now()),
            Err(ClaimError::NotAvailable)
        );
        assert_eq!(resource.claimed_by, None);
    }

    #[test]
    fn swept_resource_is_not_available() {
        let mut resource = active_resource();
        resource.active = false;
        assert_eq!(
            apply_claim(&mut resource, user(1), ANCHOR, now()),
            Err(ClaimError::NotAvailable)
        );
    }

    #[test]
    fn claimed_resource_loses_the_race_even_when_also_expired() {
        let mut resource = active_resource();
        assert_eq!(apply_claim(&mut resource, user(1), ANCHOR, now()), Ok(()));
        resource.expires_at = Timestamp::from_micros_since_unix_epoch(500);
        assert_eq!(
            apply_claim(&mut resource, user(2), ANCHOR, now()),
            Err(ClaimError::LostRace)
        );
    }

    #[test]
    fn pre_write_validation_reads_every_dead_state_as_not_available() {
        let mut claimed = active_resource();
        claimed.claimed_by = Some(user(1));
        claimed.active = false;
        assert_eq!(
            evaluate_availability(&claimed, now()),
            Err(ClaimError::NotAvailable)
        );

        let mut expired = active_resource();
        expired.expires_at = Timestamp::from_micros_since_unix_epoch(500);
        assert_eq!(
            evaluate_availability(&expired, now()),
            Err(ClaimError::NotAvailable)
        );

        assert_eq!(evaluate_availability(&active_resource(), now()), Ok(()));
    }
}
