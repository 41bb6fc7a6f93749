// transition.rs — the level transition state machine
//
// Playing -> Completed -> Intermission -> WorldDone -> Playing(next),
// with the travel protocol slotted between WorldDone and the next load.
// Title levels short-circuit straight back into a load. Pending actions
// latch into GameContext::game_action and fire once per tick through
// run_pending_action.
//
// change_level trusts its caller: an unknown map name falls through to
// the store's default descriptor. The console commands validate first;
// programmatic transitions are assumed pre-validated by level design.

use myzd_common::console::con_printf;
use myzd_common::sc_man::upper_copy;
use myzd_common::TICRATE;

use crate::game::{
    DmFlags, Finale, GameAction, GameContext, GameError, GameState, PlayerState, NUM_WORLD_VARS,
};
use crate::level_info::{ClusterFlags, LevelFlags, MapTarget};
use crate::skill::verify_skill;
use crate::snapshot::{snapshot_level, unsnapshot_level};
use crate::travel::{finish_players, finish_travel, start_travel};
use crate::world::{LevelSetup, ScriptEngine, ScriptType, StatNum, TextureLookup};

use rand::Rng;

/// External systems the controller drives. The real engine passes its
/// script VM, texture manager and map loader; tests pass stubs.
pub struct Collaborators<'a> {
    pub scripts: &'a mut dyn ScriptEngine,
    pub textures: &'a dyn TextureLookup,
    pub setup: &'a mut dyn LevelSetup,
}

/// How a completed level relates to the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishMode {
    /// Staying inside one hub: snapshot the level for the return visit.
    SameHub,
    /// Crossing into a different hub: snapshots and world variables die.
    NextHub,
    /// Ordinary progression, no hub on either side.
    NoHub,
}

// ============================================================
// Requesting a change
// ============================================================

/// Queue a transition to `target`. No state is mutated until the
/// pending Completed action fires, except that unloading scripts run
/// now, against the pre-transition world.
#[allow(clippy::too_many_arguments)]
pub fn change_level(
    ctx: &mut GameContext,
    co: &mut Collaborators,
    target: MapTarget,
    position: i32,
    keep_facing: bool,
    next_skill: Option<usize>,
    no_intermission: bool,
    reset_inventory: bool,
    no_monsters: bool,
) {
    if ctx.unloading {
        con_printf("Unloading scripts cannot exit the level again.\n");
        return;
    }

    let mut target = target;
    let redirected = match &target {
        MapTarget::Literal(name) => resolve_redirect(ctx, co, name),
        _ => None,
    };
    if let Some(name) = redirected {
        target = MapTarget::Literal(name);
    }

    ctx.next_level = target;
    ctx.start_pos = position;
    ctx.start_keep_facing = keep_facing;
    ctx.next_skill = next_skill;
    ctx.reset_inventory = reset_inventory;
    if no_intermission {
        ctx.level.flags |= LevelFlags::NO_INTERMISSION;
    }
    if no_monsters {
        ctx.dm_flags |= DmFlags::NO_MONSTERS;
    }

    // Scripts observing the outgoing level must see it untouched; the
    // unloading latch keeps them from triggering another exit.
    if ctx.game_state == GameState::Level {
        ctx.unloading = true;
        co.scripts.start_typed_scripts(ScriptType::Unloading, None);
        ctx.unloading = false;
    }

    // Dead co-op players respawn into the next level with their
    // inventory instead of getting a fresh body.
    if ctx.is_coop() {
        for player in ctx.players.iter_mut() {
            if player.in_game && player.state == PlayerState::Dead {
                player.state = PlayerState::Reborn;
            }
        }
    }

    ctx.game_action = GameAction::Completed;
}

/// One redirect hop: a level may name an inventory class and an
/// alternate map; if any player carries the item and the alternate is
/// loadable, it replaces the requested target. The redirect target's
/// own redirect is never followed.
fn resolve_redirect(
    ctx: &GameContext,
    co: &Collaborators,
    name: &str,
) -> Option<String> {
    let info = ctx.store.find_level_info(name)?;
    if info.redirect_type.is_empty() {
        return None;
    }
    let redirect_map = info.redirect_map.as_literal()?;
    let carried = ctx.players.iter().filter(|p| p.in_game).any(|player| {
        let Some(pawn) = player.mo.and_then(|id| ctx.world.get(id)) else {
            return false;
        };
        pawn.inventory.iter().any(|&item| {
            ctx.world
                .get(item)
                .map_or(false, |a| a.class.eq_ignore_ascii_case(&info.redirect_type))
        })
    });
    if carried && co.setup.check_map_data(redirect_map) {
        Some(redirect_map.to_string())
    } else {
        None
    }
}

/// Normal exit trigger: go wherever the current level routes to.
pub fn exit_level(ctx: &mut GameContext, co: &mut Collaborators, position: i32) {
    let mut target = ctx.level.next_map.clone();
    if target.is_none() {
        let info = ctx.info.clone();
        ctx.store.set_for_end_game(&mut target, &info);
    }
    change_level(ctx, co, target, position, false, None, false, false, false);
}

/// Secret exit trigger. Falls back to the normal exit when the secret
/// map has no loadable data.
pub fn secret_exit_level(ctx: &mut GameContext, co: &mut Collaborators, position: i32) {
    let secret_ok = match ctx.level.secret_map {
        MapTarget::Literal(ref name) => co.setup.check_map_data(name),
        MapTarget::EndSequence(_) => true,
        MapTarget::None => false,
    };
    if secret_ok {
        let target = ctx.level.secret_map.clone();
        change_level(ctx, co, target, position, false, None, false, false, false);
    } else {
        exit_level(ctx, co, position);
    }
}

// ============================================================
// Completion
// ============================================================

/// Fired by the pending Completed action. Marks the level visited,
/// builds the intermission stats, decides the hub mode and either shows
/// the intermission or goes straight to WorldDone.
pub fn complete_level(
    ctx: &mut GameContext,
    co: &mut Collaborators,
) -> Result<FinishMode, GameError> {
    ctx.game_action = GameAction::Nothing;

    // Title levels skip everything and chain straight into the next map.
    if ctx.game_state == GameState::TitleLevel {
        if let MapTarget::Literal(name) = ctx.next_level.clone() {
            ctx.level.map_name = upper_copy(&name);
        }
        do_load_level(ctx, co, ctx.start_pos, false)?;
        ctx.start_pos = 0;
        ctx.game_state = GameState::TitleLevel;
        return Ok(FinishMode::NoHub);
    }

    if !ctx.level.flags.contains(LevelFlags::CHANGE_MAP_CHEAT) {
        if let Some(info) = ctx.store.find_level_info_mut(&ctx.level.map_name) {
            info.flags |= LevelFlags::VISITED;
        }
    }

    fill_intermission_stats(ctx);

    // Per-player finish runs before the snapshot below so dropped
    // inventory stays dropped on a hub return.
    finish_players(ctx);

    let this_cluster = ctx.level.cluster;
    let this_hub = ctx.store.find_cluster_info(this_cluster).is_hub();
    let next_cluster = match ctx.next_level {
        MapTarget::Literal(ref name) => ctx.store.level_info_or_default(name).cluster,
        // End sequences stay in the finished level's cluster.
        MapTarget::EndSequence(_) | MapTarget::None => this_cluster,
    };
    let next_hub = ctx.store.find_cluster_info(next_cluster).is_hub();

    let mode = if this_cluster != next_cluster || ctx.deathmatch || !this_hub {
        if next_hub {
            FinishMode::NextHub
        } else {
            FinishMode::NoHub
        }
    } else {
        FinishMode::SameHub
    };

    match mode {
        FinishMode::SameHub => {
            // Remember this level's state for the return visit.
            snapshot_level(ctx, co)?;
        }
        FinishMode::NextHub | FinishMode::NoHub => {
            ctx.store.clear_snapshots();
            if mode == FinishMode::NextHub {
                // World-scope script variables belong to the hub.
                ctx.world_vars = [0; NUM_WORLD_VARS];
            }
            ctx.level.total_time = 0;
        }
    }

    // Deathmatch always gets its scoreboard; only co-op may skip it.
    if !ctx.deathmatch
        && (ctx.level.flags.contains(LevelFlags::NO_INTERMISSION)
            || (next_cluster == this_cluster && this_hub))
    {
        world_done(ctx);
        return Ok(mode);
    }

    ctx.game_state = GameState::Intermission;
    ctx.game_action = GameAction::Nothing;
    Ok(mode)
}

fn fill_intermission_stats(ctx: &mut GameContext) {
    let wi = &mut ctx.wminfo;
    wi.finished_map = ctx.level.map_name.clone();
    wi.finished_name = match ctx.store.find_level_info(&ctx.level.map_name) {
        Some(info) => info.lookup_display_name(&ctx.strings),
        None => ctx.level.level_name.clone(),
    };
    wi.exit_pic = ctx.level.map_name.clone();
    match ctx.next_level {
        MapTarget::Literal(ref name) => {
            let next = ctx.store.level_info_or_default(name);
            wi.next_map = next.map_name.clone();
            wi.next_name = next.lookup_display_name(&ctx.strings);
            wi.enter_pic = next.enter_pic.clone();
        }
        _ => {
            wi.next_map.clear();
            wi.next_name.clear();
            wi.enter_pic.clear();
        }
    }
    wi.max_kills = ctx.level.total_kills;
    wi.max_items = ctx.level.total_items;
    wi.max_secrets = ctx.level.total_secrets;
    wi.par_time = TICRATE * ctx.level.par_time;
    wi.suck_time = ctx.level.suck_time;
    wi.pnum = ctx.console_player;
    wi.max_frags = 0;
    for (i, player) in ctx.players.iter().enumerate() {
        let slot = &mut wi.plyr[i];
        slot.in_game = player.in_game;
        slot.kills = player.kill_count;
        slot.items = player.item_count;
        slot.secrets = player.secret_count;
        slot.frags = player.frag_count;
        slot.time = ctx.level.time;
        wi.max_frags = wi.max_frags.max(player.frag_count);
    }
}

// ============================================================
// World done
// ============================================================

/// Called when the intermission (or its skip path) finishes. Queues a
/// finale when the routing target is an end sequence or when a cluster
/// boundary with enter/exit text is being crossed.
pub fn world_done(ctx: &mut GameContext) {
    ctx.game_action = GameAction::WorldDone;

    if ctx.level.flags.contains(LevelFlags::CHANGE_MAP_CHEAT) {
        return;
    }

    let this_cluster = ctx.store.find_cluster_info(ctx.level.cluster).clone();
    match ctx.next_level {
        MapTarget::EndSequence(index) => {
            ctx.pending_finale = Some(Finale {
                text: this_cluster.exit_text.clone(),
                text_in_lump: this_cluster.flags.contains(ClusterFlags::EXITTEXT_IN_LUMP),
                lookup_text: this_cluster.flags.contains(ClusterFlags::LOOKUP_EXITTEXT),
                music: this_cluster.message_music.clone(),
                flat: this_cluster.finale_flat.clone(),
                end_sequence: Some(index),
            });
            ctx.game_state = GameState::Finale;
        }
        MapTarget::Literal(ref name) => {
            let next_cluster = ctx
                .store
                .find_cluster_info(ctx.store.level_info_or_default(name).cluster)
                .clone();
            if next_cluster.cluster == this_cluster.cluster || ctx.deathmatch {
                return;
            }
            // Enter text beats exit text when both are present.
            let finale = if !next_cluster.enter_text.is_empty() {
                Some(Finale {
                    text: next_cluster.enter_text.clone(),
                    text_in_lump: next_cluster
                        .flags
                        .contains(ClusterFlags::ENTERTEXT_IN_LUMP),
                    lookup_text: next_cluster.flags.contains(ClusterFlags::LOOKUP_ENTERTEXT),
                    music: next_cluster.message_music.clone(),
                    flat: next_cluster.finale_flat.clone(),
                    end_sequence: None,
                })
            } else if !this_cluster.exit_text.is_empty() {
                Some(Finale {
                    text: this_cluster.exit_text.clone(),
                    text_in_lump: this_cluster.flags.contains(ClusterFlags::EXITTEXT_IN_LUMP),
                    lookup_text: this_cluster.flags.contains(ClusterFlags::LOOKUP_EXITTEXT),
                    music: this_cluster.message_music.clone(),
                    flat: this_cluster.finale_flat.clone(),
                    end_sequence: None,
                })
            } else {
                None
            };
            if finale.is_some() {
                ctx.pending_finale = finale;
                ctx.game_state = GameState::Finale;
            }
        }
        MapTarget::None => {}
    }
}

/// Fired by the pending WorldDone action: start travel and load the
/// next level.
pub fn do_world_done(ctx: &mut GameContext, co: &mut Collaborators) -> Result<(), GameError> {
    ctx.game_state = GameState::Level;
    match ctx.next_level.clone() {
        MapTarget::Literal(name) => {
            let resolved = ctx
                .store
                .check_warp_trans_map(&name, true)
                .unwrap_or(name);
            ctx.level.map_name = upper_copy(&resolved);
        }
        MapTarget::EndSequence(_) => {
            // End of the game; the finale owns the screen from here.
            ctx.game_state = GameState::Finale;
            ctx.game_action = GameAction::Nothing;
            return Ok(());
        }
        MapTarget::None => {
            // No destination was given. Repeat the current map rather
            // than crash.
        }
    }
    start_travel(ctx);
    do_load_level(ctx, co, ctx.start_pos, true)?;
    ctx.start_pos = 0;
    ctx.game_action = GameAction::Nothing;
    Ok(())
}

// ============================================================
// Loading
// ============================================================

/// Load ctx.level.map_name: apply a deferred skill change, reset
/// per-level state, run map setup, restore a snapshot if one exists,
/// finish travel, run deferred scripts, and queue an autosave.
pub fn do_load_level(
    ctx: &mut GameContext,
    co: &mut Collaborators,
    position: i32,
    autosave: bool,
) -> Result<(), GameError> {
    if let Some(skill) = ctx.next_skill.take() {
        ctx.game_skill = verify_skill(&ctx.store.skills, skill as i32);
        ctx.cvars.set_value("skill", ctx.game_skill as f32);
    }

    let position = if position == -1 {
        ctx.last_start_pos
    } else {
        ctx.last_start_pos = position;
        position
    };

    init_level_locals(ctx);

    for name in [&ctx.level.sky_pic1, &ctx.level.sky_pic2] {
        if !name.is_empty() && !co.textures.texture_exists(name) {
            con_printf(&format!("Sky texture '{}' not found\n", name));
        }
    }

    if ctx.game_state != GameState::TitleLevel {
        ctx.game_state = GameState::Level;
    }
    ctx.paused = false;
    ctx.pending_finale = None;

    for player in ctx.players.iter_mut() {
        if !player.in_game {
            continue;
        }
        if ctx.deathmatch || player.state == PlayerState::Dead {
            player.state = PlayerState::Enter;
        }
        player.kill_count = 0;
        player.item_count = 0;
        player.secret_count = 0;
        player.extra_light = 0;
        player.fixed_colormap = 0;
    }

    let active = ctx.active_players();
    ctx.world.unload_level();
    co.setup.setup_level(&mut ctx.world, &active, position);

    // Hand each player the pawn the setup spawned at their start.
    for &pnum in &active {
        let pawn = ctx
            .world
            .ids_in_stat(StatNum::Player)
            .into_iter()
            .find(|&id| ctx.world.get(id).map_or(false, |a| a.player == Some(pnum)));
        if let Some(id) = pawn {
            ctx.players[pnum].mo = Some(id);
            ctx.players[pnum].state = PlayerState::Live;
            ctx.players[pnum].health = ctx.world.get(id).map_or(100, |a| a.health);
        }
    }

    let has_snapshot = ctx
        .store
        .find_level_info(&ctx.level.map_name)
        .map_or(false, |info| info.snapshot.is_some());
    if has_snapshot {
        unsnapshot_level(ctx, co, autosave)?;
    }

    finish_travel(ctx, co);

    if let Some(info) = ctx.store.find_level_info_mut(&ctx.level.map_name) {
        let deferred: Vec<_> = info.defered.drain(..).collect();
        for script in &deferred {
            co.scripts.run_deferred_script(script);
        }
    }

    if autosave && !ctx.deathmatch && ctx.cvars.variable_value("disableautosave") < 1.0 {
        ctx.pending_autosave = true;
    }

    ctx.game_action = GameAction::Nothing;
    Ok(())
}

/// Rebuild the runtime level state from the matching descriptor. Time
/// and counters reset; total_time carries (its reset belongs to the
/// hub-exit path in complete_level).
pub fn init_level_locals(ctx: &mut GameContext) {
    let info = ctx.store.level_info_or_default(&ctx.level.map_name).clone();
    let base_compat = ctx.cvars.variable_value("compatflags") as u32;

    let level = &mut ctx.level;
    level.time = 0;
    level.level_num = info.level_num;
    level.level_name = info.lookup_display_name(&ctx.strings);
    level.cluster = info.cluster;
    level.next_map = info.next_map.clone();
    level.secret_map = info.secret_map.clone();
    level.par_time = info.par_time;
    level.suck_time = info.suck_time;
    level.flags = info.flags;
    level.compat_flags = crate::level_info::CompatFlags::from_bits_truncate(
        (base_compat & !info.compat_mask.bits()) | (info.compat_flags & info.compat_mask).bits(),
    );
    level.music = info.music.clone();
    level.music_order = info.music_order;
    level.sky_pic1 = info.sky_pic1.clone();
    level.sky_speed1 = info.sky_speed1;
    level.sky_pic2 = info.sky_pic2.clone();
    level.sky_speed2 = info.sky_speed2;
    level.fade_to = info.fade_to;
    level.outside_fog = info.outside_fog;
    level.wall_vert_light = info.wall_vert_light;
    level.wall_horiz_light = info.wall_horiz_light;
    level.air_supply = info.air_supply;
    level.total_kills = 0;
    level.killed_monsters = 0;
    level.total_items = 0;
    level.found_items = 0;
    level.total_secrets = 0;
    level.found_secrets = 0;
    level.scrolls.clear();
    level.from_snapshot = false;

    // Physics defaults come from cvars; a descriptor value overrides.
    level.gravity = if info.gravity == 0.0 {
        ctx.cvars.variable_value("sv_gravity")
    } else {
        info.gravity
    };
    level.air_control = if info.air_control == 0.0 {
        ctx.cvars.variable_value("sv_aircontrol")
    } else {
        info.air_control
    };
    level.air_control_changed();
    level.team_damage = if info.team_damage == 0.0 {
        ctx.cvars.variable_value("teamdamage")
    } else {
        info.team_damage
    };
}

// ============================================================
// Starting a game
// ============================================================

/// Start a brand-new game on the given map. The map must exist: unlike
/// change_level this path is fatal on a bad name.
pub fn init_new(
    ctx: &mut GameContext,
    co: &mut Collaborators,
    map_name: &str,
    skill: i32,
) -> Result<(), GameError> {
    let map_name = upper_copy(map_name);
    if !co.setup.check_map_data(&map_name) {
        return Err(GameError::MapNotFound(map_name));
    }

    new_init(ctx);
    ctx.game_skill = verify_skill(&ctx.store.skills, skill);
    ctx.cvars.set_value("skill", ctx.game_skill as f32);
    ctx.dm_flags = DmFlags::from_bits_truncate(ctx.cvars.variable_value("dmflags") as u32);

    ctx.game_state = if !ctx.info.title_map.is_empty()
        && map_name.eq_ignore_ascii_case(&ctx.info.title_map)
    {
        GameState::TitleLevel
    } else {
        GameState::Level
    };
    ctx.level.map_name = map_name;
    ctx.level.total_time = 0;
    do_load_level(ctx, co, 0, false)
}

/// Reset everything a new game must not inherit: snapshots, deferred
/// scripts, visited flags, world variables, player classes.
pub fn new_init(ctx: &mut GameContext) {
    ctx.store.clear_snapshots();
    ctx.store.remove_defereds();
    for info in &mut ctx.store.levels {
        info.flags.remove(LevelFlags::VISITED);
    }
    ctx.world_vars = [0; NUM_WORLD_VARS];
    ctx.world.clear();
    ctx.unloading = false;
    ctx.paused = false;
    ctx.pending_finale = None;
    ctx.random_classes.clear();

    let classes = ctx.info.player_classes.clone();
    let mut rng = rand::thread_rng();
    for player in ctx.players.iter_mut() {
        if !player.in_game {
            continue;
        }
        player.state = PlayerState::Enter;
        player.mo = None;
        player.frag_count = 0;
        player.kill_count = 0;
        player.item_count = 0;
        player.secret_count = 0;
        if player.class_name.is_empty() || player.class_name.eq_ignore_ascii_case("random") {
            let pick = classes[rng.gen_range(0..classes.len())].clone();
            ctx.random_classes.push(pick.clone());
            player.class_name = pick;
        }
    }
}

/// Queue a new game for the next tick. Deferred map names may carry a
/// "&wt@xx" warp token which resolves (or degrades to MAPxx) here.
pub fn defered_init_new(ctx: &mut GameContext, map_name: &str, skill: Option<usize>) {
    let name = if map_name.len() > 5 && map_name[..5].eq_ignore_ascii_case("file:") {
        map_name.to_string()
    } else {
        ctx.store
            .check_warp_trans_map(map_name, true)
            .unwrap_or_else(|| upper_copy(map_name))
    };
    ctx.next_level = MapTarget::Literal(name);
    ctx.next_skill = skill;
    ctx.game_action = GameAction::NewGame;
}

/// Dispatch the latched game action, once. Mirrors the simulation
/// tick's action switch.
pub fn run_pending_action(ctx: &mut GameContext, co: &mut Collaborators) -> Result<(), GameError> {
    match ctx.game_action {
        GameAction::Nothing => Ok(()),
        GameAction::NewGame => {
            ctx.game_action = GameAction::Nothing;
            let name = match ctx.next_level.clone() {
                MapTarget::Literal(name) => name,
                _ => return Ok(()),
            };
            let skill = ctx
                .next_skill
                .take()
                .map(|s| s as i32)
                .unwrap_or(ctx.game_skill as i32);
            init_new(ctx, co, &name, skill)
        }
        GameAction::LoadLevel => {
            ctx.game_action = GameAction::Nothing;
            do_load_level(ctx, co, ctx.start_pos, false)
        }
        GameAction::Completed => complete_level(ctx, co).map(|_| ()),
        GameAction::WorldDone => do_world_done(ctx, co),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameContext;
    use crate::level_info::GameInfo;
    use crate::mapinfo::MapInfoParser;
    use crate::world::{AnyTexture, RecordingScriptEngine, SimpleLevelSetup};

    fn context_with(text: &str) -> GameContext {
        let game = GameInfo::default();
        let mut ctx = GameContext::new(game.clone());
        let mut parser = MapInfoParser::new(&mut ctx.store, &game);
        parser.parse_chunk("MAPINFO", text).unwrap();
        parser.finish().unwrap();
        ctx
    }

    #[test]
    fn test_init_level_locals_from_descriptor() {
        let mut ctx = context_with(
            "map MAP01 \"Entry Way\"\ncluster 1\npar 30\nsky1 SKY1 8.0\ngravity 400\n",
        );
        ctx.level.map_name = "MAP01".to_string();
        init_level_locals(&mut ctx);
        assert_eq!(ctx.level.level_name, "Entry Way");
        assert_eq!(ctx.level.cluster, 1);
        assert_eq!(ctx.level.par_time, 30);
        assert_eq!(ctx.level.gravity, 400.0);
        assert!((ctx.level.sky_speed1 - 0.28).abs() < 1e-6);
        // No descriptor gravity falls back to the cvar default.
        ctx.level.map_name = "NOSUCH".to_string();
        init_level_locals(&mut ctx);
        assert_eq!(ctx.level.gravity, 800.0);
    }

    #[test]
    fn test_unloading_guard_rejects_reentry() {
        let mut ctx = context_with("map MAP01 \"x\"\nnext MAP02\n");
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        ctx.unloading = true;
        change_level(
            &mut ctx,
            &mut co,
            MapTarget::literal("MAP02"),
            0,
            false,
            None,
            false,
            false,
            false,
        );
        assert_eq!(ctx.game_action, GameAction::Nothing);
        assert_eq!(ctx.next_level, MapTarget::None);
    }

    #[test]
    fn test_change_level_runs_unloading_scripts_and_reborn() {
        let mut ctx = context_with("map MAP01 \"x\"\nnext MAP02\n");
        ctx.game_state = GameState::Level;
        ctx.players[0].in_game = true;
        ctx.players[0].state = PlayerState::Dead;
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        change_level(
            &mut ctx,
            &mut co,
            MapTarget::literal("MAP02"),
            0,
            false,
            None,
            false,
            false,
            false,
        );
        assert_eq!(ctx.game_action, GameAction::Completed);
        assert_eq!(ctx.players[0].state, PlayerState::Reborn);
        assert!(!ctx.unloading);
        assert_eq!(scripts.calls, vec![(ScriptType::Unloading, None)]);
    }

    #[test]
    fn test_secret_exit_falls_back_without_map_data() {
        struct OnlyMap02;
        impl LevelSetup for OnlyMap02 {
            fn check_map_data(&self, map_name: &str) -> bool {
                map_name.eq_ignore_ascii_case("MAP02")
            }
            fn setup_level(
                &mut self,
                _world: &mut crate::world::World,
                _players: &[usize],
                _position: i32,
            ) {
            }
        }
        let mut ctx = context_with("map MAP01 \"x\"\nnext MAP02\nsecretnext MAP31\n");
        ctx.level.map_name = "MAP01".to_string();
        init_level_locals(&mut ctx);
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = OnlyMap02;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        secret_exit_level(&mut ctx, &mut co, 0);
        assert_eq!(ctx.next_level, MapTarget::literal("MAP02"));
    }

    #[test]
    fn test_exit_level_defaults_to_end_sequence() {
        let mut ctx = context_with("map MAP30 \"x\"\n");
        ctx.level.map_name = "MAP30".to_string();
        init_level_locals(&mut ctx);
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        exit_level(&mut ctx, &mut co, 0);
        assert!(ctx.next_level.is_end_sequence());
    }

    #[test]
    fn test_init_new_unknown_map_is_fatal() {
        struct NoMaps;
        impl LevelSetup for NoMaps {
            fn check_map_data(&self, _map_name: &str) -> bool {
                false
            }
            fn setup_level(
                &mut self,
                _world: &mut crate::world::World,
                _players: &[usize],
                _position: i32,
            ) {
            }
        }
        let mut ctx = context_with("map MAP01 \"x\"\n");
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = NoMaps;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        let err = init_new(&mut ctx, &mut co, "MAP99", 2).unwrap_err();
        assert!(matches!(err, GameError::MapNotFound(ref m) if m == "MAP99"));
    }

    #[test]
    fn test_world_done_enter_text_beats_exit_text() {
        let mut ctx = context_with(
            r#"
            clusterdef 1
            exittext "leaving"
            clusterdef 2
            entertext "arriving"

            map MAP01 "a"
            cluster 1
            next MAP02
            map MAP02 "b"
            cluster 2
            "#,
        );
        ctx.level.map_name = "MAP01".to_string();
        init_level_locals(&mut ctx);
        ctx.next_level = MapTarget::literal("MAP02");
        world_done(&mut ctx);
        let finale = ctx.pending_finale.expect("finale queued");
        assert_eq!(finale.text, "arriving");
        assert_eq!(ctx.game_action, GameAction::WorldDone);

        // Deathmatch never fires cluster-text finales.
        ctx.pending_finale = None;
        ctx.game_state = GameState::Level;
        ctx.deathmatch = true;
        world_done(&mut ctx);
        assert!(ctx.pending_finale.is_none());
    }

    #[test]
    fn test_deferred_skill_applied_on_load() {
        let mut ctx = context_with(
            "skill easy\nskill normal\nskill hard\nmap MAP01 \"x\"\n",
        );
        ctx.level.map_name = "MAP01".to_string();
        ctx.next_skill = Some(99);
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        do_load_level(&mut ctx, &mut co, 0, false).unwrap();
        assert_eq!(ctx.game_skill, 2);
        assert_eq!(ctx.cvars.variable_value("skill"), 2.0);
        assert!(ctx.next_skill.is_none());
    }

    #[test]
    fn test_deferred_scripts_run_once_on_load() {
        use crate::level_info::DeferredScript;
        let mut ctx = context_with("map MAP01 \"x\"\n");
        ctx.level.map_name = "MAP01".to_string();
        let script = DeferredScript {
            script: 7,
            player_num: -1,
            always: true,
            args: [1, 2, 3],
        };
        ctx.store
            .find_level_info_mut("MAP01")
            .unwrap()
            .defered
            .push(script);
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        do_load_level(&mut ctx, &mut co, 0, false).unwrap();
        do_load_level(&mut ctx, &mut co, 0, false).unwrap();
        assert_eq!(scripts.deferred_runs, vec![script]);
        assert!(ctx
            .store
            .find_level_info("MAP01")
            .unwrap()
            .defered
            .is_empty());
    }

    #[test]
    fn test_autosave_gate() {
        let mut ctx = context_with("map MAP01 \"x\"\n");
        ctx.level.map_name = "MAP01".to_string();
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        do_load_level(&mut ctx, &mut co, 0, true).unwrap();
        assert!(ctx.pending_autosave);

        ctx.pending_autosave = false;
        ctx.cvars.set("disableautosave", "1");
        do_load_level(&mut ctx, &mut co, 0, true).unwrap();
        assert!(!ctx.pending_autosave);
    }

    #[test]
    fn test_deathmatch_always_gets_intermission() {
        let mut ctx = context_with(
            "map MAP01 \"x\"\nnointermission\nnext MAP02\nmap MAP02 \"y\"\n",
        );
        ctx.level.map_name = "MAP01".to_string();
        init_level_locals(&mut ctx);
        ctx.game_state = GameState::Level;
        ctx.deathmatch = true;
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        exit_level(&mut ctx, &mut co, 0);
        complete_level(&mut ctx, &mut co).unwrap();
        assert_eq!(ctx.game_state, GameState::Intermission);

        // Co-op honors the flag and skips straight to world-done.
        ctx.deathmatch = false;
        ctx.game_state = GameState::Level;
        complete_level(&mut ctx, &mut co).unwrap();
        assert_eq!(ctx.game_action, GameAction::WorldDone);
    }

    #[test]
    fn test_inventory_reset_happens_before_hub_snapshot() {
        use crate::snapshot::unsnapshot_level;
        use crate::world::Actor;
        let mut ctx = context_with(
            "clusterdef 5\nhub\nmap MAP01 \"a\"\ncluster 5\nnext MAP02\nmap MAP02 \"b\"\ncluster 5\n",
        );
        ctx.players[0].in_game = true;
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        init_new(&mut ctx, &mut co, "MAP01", 2).unwrap();
        let pawn = ctx.players[0].mo.unwrap();
        let item = ctx.world.spawn(Actor {
            class: "SilverKey".to_string(),
            stat: StatNum::Inventory,
            owner: Some(pawn),
            ..Actor::default()
        });
        ctx.world.get_mut(pawn).unwrap().inventory.push(item);

        change_level(
            &mut ctx,
            &mut co,
            MapTarget::literal("MAP02"),
            0,
            false,
            None,
            false,
            true,
            false,
        );
        let mode = complete_level(&mut ctx, &mut co).unwrap();
        assert_eq!(mode, FinishMode::SameHub);
        assert!(ctx.world.get(item).is_none());
        assert!(!ctx.reset_inventory);

        // The snapshot agrees: restoring it brings no item back.
        ctx.world.clear();
        unsnapshot_level(&mut ctx, &mut co, true).unwrap();
        assert!(ctx
            .world
            .ids()
            .into_iter()
            .all(|id| ctx.world.get(id).unwrap().class != "SilverKey"));
    }
}
