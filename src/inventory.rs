/******************************************************************************
 *                                                                            *
 * Inventory ledger: per-player holdings keyed by resource type. Mining      *
 * only ever increments; selling is the single decrement path and feeds      *
 * the append-only wallet_transaction table the wallet subsystem reads.      *
 * Credits that fail after a won claim are parked and reconciled by the      *
 * sweep instead of rolling the claim back.                                  *
 *                                                                            *
 ******************************************************************************/

use spacetimedb::{Identity, ReducerContext, Table, Timestamp};

use crate::resource_catalog::resource_type as ResourceTypeTableTrait;

#[spacetimedb::table(
    accessor = inventory_entry,
    public,
    index(name = "idx_owner", accessor = idx_owner, btree(columns = [owner]))
)]
#[derive(Clone, Debug)]
pub struct InventoryEntry {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub owner: Identity,
    pub resource_type_id: u64,
    pub quantity: u32,
    pub last_acquired_at: Timestamp,
}

/// A credit that failed after its claim committed. Retried by the sweep;
/// the claim itself is never reversed.
#[spacetimedb::table(accessor = pending_inventory_credit)]
#[derive(Clone, Debug)]
pub struct PendingInventoryCredit {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub owner: Identity,
    pub resource_type_id: u64,
    pub quantity: u32,
    pub first_failed_at: Timestamp,
    pub attempts: u32,
}

/// Append-only feed for the wallet subsystem. Mining and selling only
/// ever insert here; nothing in this module reads it back.
#[spacetimedb::table(accessor = wallet_transaction, public)]
#[derive(Clone, Debug)]
pub struct WalletTransaction {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    pub owner: Identity,
    pub amount: i64,
    pub reason: String,
    pub created_at: Timestamp,
}

/// Upsert-increment of the (owner, type) entry. Runs inside the calling
/// reducer's transaction, so two simultaneous credits for the same owner
/// serialize and neither update is lost.
pub fn credit(
    ctx: &ReducerContext,
    owner: Identity,
    resource_type_id: u64,
    quantity: u32,
) -> Result<(), String> {
    if ctx.db.resource_type().id().find(resource_type_id).is_none() {
        return Err(format!(
            "Resource type {} not found in catalog",
            resource_type_id
        ));
    }

    let entries = ctx.db.inventory_entry();
    let existing = entries
        .idx_owner()
        .filter(owner)
        .find(|e| e.resource_type_id == resource_type_id);
    match existing {
        Some(mut entry) => {
            entry.quantity = entry.quantity.saturating_add(quantity);
            entry.last_acquired_at = ctx.timestamp;
            entries.id().update(entry);
        }
        None => {
            entries.insert(InventoryEntry {
                id: 0,
                owner,
                resource_type_id,
                quantity,
                last_acquired_at: ctx.timestamp,
            });
        }
    }
    Ok(())
}

/// Credits a won claim. The claim is already committed by the caller and
/// is never rolled back: a failed credit is parked for reconciliation, so
/// the player sees a delayed credit rather than an un-mined resource.
pub(crate) fn credit_or_park(
    ctx: &ReducerContext,
    owner: Identity,
    resource_type_id: u64,
    quantity: u32,
) {
    match credit(ctx, owner, resource_type_id, quantity) {
        Ok(()) => {
            log::info!(
                "Credited {} x type {} to {:?}.",
                quantity,
                resource_type_id,
                owner
            );
        }
        Err(e) => {
            log::error!(
                "Inventory credit failed for {:?} (type {}): {}. Parking for reconciliation.",
                owner,
                resource_type_id,
                e
            );
            ctx.db.pending_inventory_credit().insert(PendingInventoryCredit {
                id: 0,
                owner,
                resource_type_id,
                quantity,
                first_failed_at: ctx.timestamp,
                attempts: 1,
            });
        }
    }
}

/// Re-attempts parked credits. Called from the scheduled sweep.
pub(crate) fn retry_pending_credits(ctx: &ReducerContext) {
    let pending: Vec<PendingInventoryCredit> =
        ctx.db.pending_inventory_credit().iter().collect();
    for mut parked in pending {
        match credit(ctx, parked.owner, parked.resource_type_id, parked.quantity) {
            Ok(()) => {
                log::info!(
                    "Reconciled pending credit of {} x type {} for {:?} after {} attempts.",
                    parked.quantity,
                    parked.resource_type_id,
                    parked.owner,
                    parked.attempts
                );
                ctx.db.pending_inventory_credit().id().delete(parked.id);
            }
            Err(e) => {
                parked.attempts += 1;
                log::warn!(
                    "Pending credit for {:?} (type {}) still failing after {} attempts: {}",
                    parked.owner,
                    parked.resource_type_id,
                    parked.attempts,
                    e
                );
                ctx.db.pending_inventory_credit().id().update(parked);
            }
        }
    }
}

/// Currency value of a sale.
pub fn sale_value(base_value: u32, quantity: u32) -> i64 {
    base_value as i64 * quantity as i64
}

/// Economy interface for the wallet subsystem: converts held resources
/// into an append-only currency credit. The only operation that ever
/// decrements an inventory entry; the entry survives at zero.
#[spacetimedb::reducer]
pub fn sell_resource(ctx: &ReducerContext, resource_type_id: u64, quantity: u32) -> Result<(), String> {
    if quantity == 0 {
        return Err("Cannot sell zero items".to_string());
    }
    let seller = ctx.sender();
    let type_def = ctx
        .db
        .resource_type()
        .id()
        .find(resource_type_id)
        .ok_or_else(|| format!("Resource type {} not found", resource_type_id))?;

    let entries = ctx.db.inventory_entry();
    let mut entry = entries
        .idx_owner()
        .filter(seller)
        .find(|e| e.resource_type_id == resource_type_id)
        .ok_or_else(|| format!("No {} to sell", type_def.name))?;
    if entry.quantity < quantity {
        return Err(format!(
            "Not enough {} to sell: have {}, asked for {}",
            type_def.name, entry.quantity, quantity
        ));
    }

    entry.quantity -= quantity;
    entries.id().update(entry);

    let amount = sale_value(type_def.base_value, quantity);
    ctx.db.wallet_transaction().insert(WalletTransaction {
        id: 0,
        owner: seller,
        amount,
        reason: format!("Sold {} x {}", quantity, type_def.name),
        created_at: ctx.timestamp,
    });

    log::info!(
        "Player {:?} sold {} x {} for {}.",
        seller,
        quantity,
        type_def.name,
        amount
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_value_scales_with_quantity() {
        assert_eq!(sale_value(1, 1), 1);
        assert_eq!(sale_value(150, 3), 450);
        assert_eq!(sale_value(0, 10), 0);
    }

    #[test]
    fn sale_value_does_not_overflow_u32_math() {
        assert_eq!(
            sale_value(u32::MAX, u32::MAX),
            u32::MAX as i64 * u32::MAX as i64
        );
    }
}
