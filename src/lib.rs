use spacetimedb::{ConnectionId, Identity, ReducerContext, Table, Timestamp};

mod claim;
mod geo;
mod inventory;
mod mining;
mod player_position;
mod resource_catalog;
mod resource_spawning;

// Re-export the claim taxonomy and client-facing reducers for bindings.
pub use claim::ClaimError;
pub use inventory::sell_resource;
pub use mining::{cancel_mining, complete_mining, start_mining};
pub use player_position::update_player_position;
pub use resource_spawning::refresh_resources;

use mining::mining_session as MiningSessionTableTrait;

// --- Player Table ---

#[spacetimedb::table(accessor = player, public)]
#[derive(Clone, Debug)]
pub struct Player {
    #[primary_key]
    pub identity: Identity,
    pub username: String,
    /// Latest accepted geolocation fix. Meaningless until
    /// `last_position_update` moves off UNIX_EPOCH.
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: f64,
    /// Timestamp of the last accepted fix; UNIX_EPOCH means none yet.
    pub last_position_update: Timestamp,
    pub is_online: bool,
    pub registered_at: Timestamp,
}

// --- Active Connection Tracking ---

#[spacetimedb::table(accessor = active_connection)]
#[derive(Clone, Debug)]
pub struct ActiveConnection {
    #[primary_key]
    identity: Identity,
    connection_id: ConnectionId,
    timestamp: Timestamp,
}

// --- Lifecycle Reducers ---

// Called once when the module is published or updated.
#[spacetimedb::reducer(init)]
pub fn init_module(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Initializing module...");
    crate::resource_catalog::seed_resource_types(ctx)?;
    crate::resource_spawning::init_resource_sweep_schedule(ctx)?;
    log::info!("Module initialization complete.");
    Ok(())
}

#[spacetimedb::reducer(client_connected)]
pub fn identity_connected(ctx: &ReducerContext) -> Result<(), String> {
    let client_identity = ctx.sender();
    let connection_id = ctx.connection_id().ok_or_else(|| {
        log::error!(
            "[Connect] Missing ConnectionId in client_connected context for {:?}",
            client_identity
        );
        "Internal error: Missing connection ID on connect".to_string()
    })?;

    let active_connections = ctx.db.active_connection();
    let new_active_conn = ActiveConnection {
        identity: client_identity,
        connection_id,
        timestamp: ctx.timestamp,
    };
    if active_connections.identity().find(client_identity).is_some() {
        active_connections.identity().update(new_active_conn);
    } else {
        match active_connections.try_insert(new_active_conn) {
            Ok(_) => {}
            Err(e) => {
                log::error!(
                    "[Connect] Failed to insert active connection for {:?}: {}",
                    client_identity,
                    e
                );
                return Err(format!("Failed to track connection: {}", e));
            }
        }
    }

    let players = ctx.db.player();
    if let Some(mut player) = players.identity().find(client_identity) {
        if !player.is_online {
            player.is_online = true;
            players.identity().update(player);
            log::info!("[Connect] Set player {:?} to online.", client_identity);
        }
    } else {
        log::debug!(
            "[Connect] Player {:?} not registered yet.",
            client_identity
        );
    }
    Ok(())
}

/// Disconnect cleanup: drops the connection record, marks the player
/// offline, and cancels any running mining session. Cancellation is just
/// the session row going away; no claim or credit can result from it.
#[spacetimedb::reducer(client_disconnected)]
pub fn identity_disconnected(ctx: &ReducerContext) {
    let sender_id = ctx.sender();
    let disconnecting_connection_id = match ctx.connection_id() {
        Some(id) => id,
        None => {
            return;
        }
    };

    let active_connections = ctx.db.active_connection();
    if let Some(active_conn) = active_connections.identity().find(sender_id) {
        // A different connection id means the player already reconnected;
        // leave the newer record alone.
        if active_conn.connection_id != disconnecting_connection_id {
            return;
        }
        active_connections.identity().delete(sender_id);
    }

    let players = ctx.db.player();
    if let Some(mut player) = players.identity().find(sender_id) {
        if player.is_online {
            player.is_online = false;
            players.identity().update(player);
            log::info!("[Disconnect] Set player {:?} to offline.", sender_id);
        }
    }

    if ctx.db.mining_session().player_id().find(sender_id).is_some() {
        ctx.db.mining_session().player_id().delete(sender_id);
        log::info!(
            "[Disconnect] Cancelled mining session for {:?}.",
            sender_id
        );
    }
}

/// Creates the player row for a new identity. Re-registering an existing
/// identity just refreshes the username.
#[spacetimedb::reducer]
pub fn register_player(ctx: &ReducerContext, username: String) -> Result<(), String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err("Username cannot be empty".to_string());
    }

    let players = ctx.db.player();
    if let Some(mut player) = players.identity().find(ctx.sender()) {
        player.username = trimmed.to_string();
        player.is_online = true;
        players.identity().update(player);
        log::info!("Player {:?} re-registered as '{}'.", ctx.sender(), trimmed);
        return Ok(());
    }

    let player = Player {
        identity: ctx.sender(),
        username: trimmed.to_string(),
        lat: 0.0,
        lng: 0.0,
        accuracy_m: 0.0,
        last_position_update: Timestamp::UNIX_EPOCH,
        is_online: true,
        registered_at: ctx.timestamp,
    };
    match players.try_insert(player) {
        Ok(_) => {
            log::info!("Registered new player {:?} as '{}'.", ctx.sender(), trimmed);
            Ok(())
        }
        Err(e) => Err(format!("Failed to register player: {}", e)),
    }
}
