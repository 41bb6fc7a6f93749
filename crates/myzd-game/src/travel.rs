// travel.rs — carrying player pawns across a level boundary
//
// Two-phase handoff. start_travel detaches the living players' pawns
// (and their items) from the outgoing world and parks them in the
// travelling category, unique identifier intact. finish_travel runs
// once the new level's start spawns exist: each traveller takes over
// its placeholder's placement, all external references swing from the
// placeholder to the traveller, and the placeholder dies. A traveller
// without a placeholder has no start in the new level and is destroyed
// as orphaned.

use myzd_common::console::con_dprintf;

use crate::game::{GameContext, PlayerState, MAX_PLAYERS};
use crate::transition::Collaborators;
use crate::world::{ActorId, ScriptType, StatNum};

/// Per-player level-finish step. Runs at level completion, before any
/// snapshot is taken, so a requested inventory reset never leaks into
/// the outgoing level's snapshot.
pub fn finish_players(ctx: &mut GameContext) {
    if !std::mem::take(&mut ctx.reset_inventory) {
        return;
    }
    for pnum in 0..MAX_PLAYERS {
        if !ctx.players[pnum].in_game {
            continue;
        }
        let Some(pawn) = ctx.players[pnum].mo else {
            continue;
        };
        let items = ctx
            .world
            .get(pawn)
            .map(|a| a.inventory.clone())
            .unwrap_or_default();
        for item in items {
            ctx.world.destroy(item);
        }
        if let Some(actor) = ctx.world.get_mut(pawn) {
            actor.inventory.clear();
        }
    }
}

/// Detach the living players' pawns from the outgoing level. Dead
/// players are skipped; they get a fresh body on the other side. In
/// deathmatch nothing travels.
pub fn start_travel(ctx: &mut GameContext) {
    if ctx.deathmatch {
        return;
    }

    for pnum in 0..MAX_PLAYERS {
        if !ctx.players[pnum].in_game || ctx.players[pnum].state == PlayerState::Dead {
            continue;
        }
        let Some(pawn) = ctx.players[pnum].mo else {
            continue;
        };
        if ctx.world.get(pawn).is_none() {
            continue;
        }

        ctx.world.unlink(pawn);
        // Out of the TID hash, but the TID value itself travels along.
        ctx.world.remove_tid(pawn);
        ctx.world.change_stat(pawn, StatNum::Travelling);

        let items = ctx
            .world
            .get(pawn)
            .map(|a| a.inventory.clone())
            .unwrap_or_default();
        for item in items {
            ctx.world.unlink(item);
            ctx.world.change_stat(item, StatNum::Travelling);
        }
    }
}

/// Pair each travelling pawn with the placeholder spawned at its
/// player's start, take over its placement, and re-enter the world.
pub fn finish_travel(ctx: &mut GameContext, co: &mut Collaborators) {
    let keep_facing = std::mem::take(&mut ctx.start_keep_facing);

    let travellers: Vec<ActorId> = ctx
        .world
        .ids_in_stat(StatNum::Travelling)
        .into_iter()
        .filter(|&id| ctx.world.get(id).map_or(false, |a| a.player.is_some()))
        .collect();

    for pawn in travellers {
        let Some(pnum) = ctx.world.get(pawn).and_then(|a| a.player) else {
            continue;
        };
        let placeholder = ctx
            .world
            .ids_in_stat(StatNum::Player)
            .into_iter()
            .find(|&id| {
                id != pawn && ctx.world.get(id).map_or(false, |a| a.player == Some(pnum))
            });
        let Some(placeholder) = placeholder else {
            con_dprintf(&format!(
                "travelling pawn for player {} has no start spot, destroying it\n",
                pnum
            ));
            if ctx.players[pnum].mo == Some(pawn) {
                ctx.players[pnum].mo = None;
            }
            ctx.world.destroy(pawn);
            continue;
        };

        let spot = ctx.world.get(placeholder).cloned();
        if let (Some(spot), Some(actor)) = (spot, ctx.world.get_mut(pawn)) {
            actor.pos = spot.pos;
            actor.vel = [0.0; 3];
            actor.floor_z = spot.floor_z;
            actor.ceiling_z = spot.ceiling_z;
            actor.dropoff_z = spot.dropoff_z;
            actor.floor_sector = spot.floor_sector;
            if !keep_facing {
                actor.angle = spot.angle;
                actor.pitch = spot.pitch;
            }
        }

        ctx.world.destroy(placeholder);
        ctx.world.change_stat(pawn, StatNum::Player);
        ctx.world.link(pawn);
        ctx.world.insert_tid(pawn);

        // Every external reference now points at the traveller.
        ctx.players[pnum].mo = Some(pawn);
        ctx.players[pnum].state = PlayerState::Live;
        ctx.players[pnum].health = ctx.world.get(pawn).map_or(100, |a| a.health);

        let items = ctx
            .world
            .get(pawn)
            .map(|a| a.inventory.clone())
            .unwrap_or_default();
        for item in items {
            ctx.world.change_stat(item, StatNum::Inventory);
            ctx.world.link(item);
        }

        if ctx.level.from_snapshot {
            co.scripts.start_typed_scripts(ScriptType::Return, Some(pawn));
        }
    }
}
