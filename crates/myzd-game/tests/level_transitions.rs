// End-to-end transitions: new game, hub travel with snapshots, ordinary
// progression, and the save-file chunk round trip.

use myzd_game::game::{GameAction, GameContext, GameState};
use myzd_game::level_info::{GameInfo, LevelFlags, MapTarget, Snapshot};
use myzd_game::mapinfo::MapInfoParser;
use myzd_game::snapshot::{
    read_acs_defereds, read_snapshots, snapshot_level, write_acs_defereds, write_snapshots,
    SNAPSHOT_VERSION,
};
use myzd_game::transition::{
    change_level, complete_level, defered_init_new, exit_level, init_new, run_pending_action,
    world_done, Collaborators, FinishMode,
};
use myzd_game::world::{
    Actor, AnyTexture, RecordingScriptEngine, SimpleLevelSetup, StatNum,
};

const HUB_MAPINFO: &str = r#"
clusterdef 5
hub
entertext "welcome to the hub"

clusterdef 1
clusterdef 2

map MAP01 "Winnowing Hall"
cluster 5
next MAP02

map MAP02 "Seven Portals"
cluster 5
next MAP01

map MAP11 "Entryway"
cluster 1
next MAP12

map MAP12 "Underhalls"
cluster 2
"#;

fn hub_context() -> GameContext {
    let game = GameInfo::default();
    let mut ctx = GameContext::new(game.clone());
    let mut parser = MapInfoParser::new(&mut ctx.store, &game);
    parser.parse_chunk("MAPINFO", HUB_MAPINFO).unwrap();
    parser.finish().unwrap();
    ctx.players[0].in_game = true;
    ctx.players[0].class_name = "DoomPlayer".to_string();
    ctx
}

/// Drive the pending-action loop until it settles.
fn run_until_idle(ctx: &mut GameContext, co: &mut Collaborators) {
    while ctx.game_action != GameAction::Nothing {
        run_pending_action(ctx, co).unwrap();
    }
}

macro_rules! collaborators {
    ($scripts:ident, $textures:ident, $setup:ident) => {
        Collaborators {
            scripts: &mut $scripts,
            textures: &$textures,
            setup: &mut $setup,
        }
    };
}

#[test]
fn test_new_game_loads_first_map() {
    let mut ctx = hub_context();
    let mut scripts = RecordingScriptEngine::default();
    let textures = AnyTexture;
    let mut setup = SimpleLevelSetup;
    let mut co = collaborators!(scripts, textures, setup);

    defered_init_new(&mut ctx, "map01", Some(3));
    assert_eq!(ctx.game_action, GameAction::NewGame);
    run_until_idle(&mut ctx, &mut co);

    assert_eq!(ctx.game_state, GameState::Level);
    assert_eq!(ctx.level.map_name, "MAP01");
    assert_eq!(ctx.level.cluster, 5);
    assert_eq!(ctx.level.level_name, "Winnowing Hall");
    let pawn = ctx.players[0].mo.expect("player has a pawn");
    assert_eq!(ctx.world.get(pawn).unwrap().player, Some(0));
}

#[test]
fn test_hub_exit_snapshots_and_skips_intermission() {
    let mut ctx = hub_context();
    let mut scripts = RecordingScriptEngine::default();
    let textures = AnyTexture;
    let mut setup = SimpleLevelSetup;
    let mut co = collaborators!(scripts, textures, setup);

    init_new(&mut ctx, &mut co, "MAP01", 2).unwrap();
    ctx.world_vars[3] = 7;
    ctx.level.total_time = 4200;

    // Give the pawn something to carry across.
    let pawn = ctx.players[0].mo.unwrap();
    let item = ctx.world.spawn(Actor {
        class: "KeySteel".to_string(),
        stat: StatNum::Inventory,
        owner: Some(pawn),
        ..Actor::default()
    });
    ctx.world.get_mut(pawn).unwrap().inventory.push(item);

    exit_level(&mut ctx, &mut co, 0);
    assert_eq!(ctx.game_action, GameAction::Completed);
    let mode = complete_level(&mut ctx, &mut co).unwrap();
    assert_eq!(mode, FinishMode::SameHub);

    // Same hub: no intermission screen, straight to world-done.
    assert_ne!(ctx.game_state, GameState::Intermission);
    assert_eq!(ctx.game_action, GameAction::WorldDone);
    assert!(ctx
        .store
        .find_level_info("MAP01")
        .unwrap()
        .snapshot
        .is_some());
    assert!(ctx
        .store
        .find_level_info("MAP01")
        .unwrap()
        .flags
        .contains(LevelFlags::VISITED));

    run_until_idle(&mut ctx, &mut co);
    assert_eq!(ctx.level.map_name, "MAP02");
    assert_eq!(ctx.world_vars[3], 7);
    assert_eq!(ctx.level.total_time, 4200);

    // The pawn travelled with its inventory, identity intact.
    assert_eq!(ctx.players[0].mo, Some(pawn));
    assert_eq!(ctx.world.get(pawn).unwrap().stat, StatNum::Player);
    assert_eq!(ctx.world.get(item).unwrap().class, "KeySteel");
}

#[test]
fn test_hub_return_restores_snapshot() {
    let mut ctx = hub_context();
    let mut scripts = RecordingScriptEngine::default();
    let textures = AnyTexture;
    let mut setup = SimpleLevelSetup;
    let mut co = collaborators!(scripts, textures, setup);

    init_new(&mut ctx, &mut co, "MAP01", 2).unwrap();
    ctx.level.found_secrets = 3;
    let pawn = ctx.players[0].mo.unwrap();

    // Over to MAP02 and straight back.
    exit_level(&mut ctx, &mut co, 0);
    run_until_idle(&mut ctx, &mut co);
    assert_eq!(ctx.level.map_name, "MAP02");
    exit_level(&mut ctx, &mut co, 0);
    run_until_idle(&mut ctx, &mut co);

    assert_eq!(ctx.level.map_name, "MAP01");
    assert!(ctx.level.from_snapshot);
    assert_eq!(ctx.level.found_secrets, 3);
    // The traveller won over its restored duplicate.
    assert_eq!(ctx.players[0].mo, Some(pawn));
    assert_eq!(
        ctx.world.ids_in_stat(StatNum::Player).len(),
        1,
        "exactly one pawn for the one player"
    );
    // Restored once, then dropped.
    assert!(ctx
        .store
        .find_level_info("MAP01")
        .unwrap()
        .snapshot
        .is_none());
    // Re-entering a snapshotted level fires the return scripts.
    assert!(scripts
        .calls
        .iter()
        .any(|(kind, _)| *kind == myzd_game::world::ScriptType::Return));
}

#[test]
fn test_ordinary_progression_shows_intermission_and_clears_state() {
    let mut ctx = hub_context();
    let mut scripts = RecordingScriptEngine::default();
    let textures = AnyTexture;
    let mut setup = SimpleLevelSetup;
    let mut co = collaborators!(scripts, textures, setup);

    init_new(&mut ctx, &mut co, "MAP11", 2).unwrap();
    ctx.world_vars[0] = 99;
    ctx.level.total_time = 1000;
    // A stale snapshot from an earlier hub should not survive the exit.
    ctx.store.find_level_info_mut("MAP01").unwrap().snapshot = Some(Snapshot {
        version: SNAPSHOT_VERSION,
        data: vec![1, 2, 3],
    });

    exit_level(&mut ctx, &mut co, 0);
    let mode = complete_level(&mut ctx, &mut co).unwrap();
    assert_eq!(mode, FinishMode::NoHub);
    assert_eq!(ctx.game_state, GameState::Intermission);
    assert!(ctx
        .store
        .find_level_info("MAP01")
        .unwrap()
        .snapshot
        .is_none());
    assert_eq!(ctx.level.total_time, 0);
    // Crossing plain clusters keeps world variables.
    assert_eq!(ctx.world_vars[0], 99);
    assert_eq!(ctx.wminfo.finished_map, "MAP11");
    assert_eq!(ctx.wminfo.next_map, "MAP12");

    // Intermission over.
    world_done(&mut ctx);
    run_until_idle(&mut ctx, &mut co);
    assert_eq!(ctx.level.map_name, "MAP12");
    assert_eq!(ctx.game_state, GameState::Level);
}

#[test]
fn test_entering_hub_zeroes_world_vars() {
    let mut ctx = hub_context();
    let mut scripts = RecordingScriptEngine::default();
    let textures = AnyTexture;
    let mut setup = SimpleLevelSetup;
    let mut co = collaborators!(scripts, textures, setup);

    // MAP12 routes nowhere; send it into the hub cluster explicitly.
    init_new(&mut ctx, &mut co, "MAP12", 2).unwrap();
    ctx.world_vars[0] = 99;
    change_level(
        &mut ctx,
        &mut co,
        MapTarget::literal("MAP01"),
        0,
        false,
        None,
        false,
        false,
        false,
    );
    let mode = complete_level(&mut ctx, &mut co).unwrap();
    assert_eq!(mode, FinishMode::NextHub);
    assert_eq!(ctx.world_vars[0], 0);
}

#[test]
fn test_redirect_follows_carried_item() {
    let mut ctx = hub_context();
    ctx.store.find_level_info_mut("MAP11").unwrap().redirect_type = "QuestItem".to_string();
    ctx.store.find_level_info_mut("MAP11").unwrap().redirect_map =
        MapTarget::literal("MAP12");

    let mut scripts = RecordingScriptEngine::default();
    let textures = AnyTexture;
    let mut setup = SimpleLevelSetup;
    let mut co = collaborators!(scripts, textures, setup);

    init_new(&mut ctx, &mut co, "MAP01", 2).unwrap();

    // Without the item the request goes where it was aimed.
    change_level(
        &mut ctx,
        &mut co,
        MapTarget::literal("MAP11"),
        0,
        false,
        None,
        false,
        false,
        false,
    );
    assert_eq!(ctx.next_level, MapTarget::literal("MAP11"));

    // With the item the redirect kicks in.
    let pawn = ctx.players[0].mo.unwrap();
    let quest = ctx.world.spawn(Actor {
        class: "QuestItem".to_string(),
        stat: StatNum::Inventory,
        owner: Some(pawn),
        ..Actor::default()
    });
    ctx.world.get_mut(pawn).unwrap().inventory.push(quest);
    change_level(
        &mut ctx,
        &mut co,
        MapTarget::literal("MAP11"),
        0,
        false,
        None,
        false,
        false,
        false,
    );
    assert_eq!(ctx.next_level, MapTarget::literal("MAP12"));
}

#[test]
fn test_save_chunks_roundtrip_through_a_file() {
    let mut ctx = hub_context();
    let mut scripts = RecordingScriptEngine::default();
    let textures = AnyTexture;
    let mut setup = SimpleLevelSetup;
    let mut co = collaborators!(scripts, textures, setup);

    init_new(&mut ctx, &mut co, "MAP01", 2).unwrap();
    ctx.level.found_items = 5;
    snapshot_level(&mut ctx, &mut co).unwrap();
    ctx.store
        .find_level_info_mut("MAP02")
        .unwrap()
        .flags |= LevelFlags::VISITED;
    ctx.store
        .find_level_info_mut("MAP02")
        .unwrap()
        .defered
        .push(myzd_game::level_info::DeferredScript {
            script: 31,
            player_num: -1,
            always: true,
            args: [0, 0, 0],
        });

    let mut buf = Vec::new();
    write_snapshots(&ctx, &mut buf);
    write_acs_defereds(&ctx.store, &mut buf);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save.dat");
    std::fs::write(&path, &buf).unwrap();
    let data = std::fs::read(&path).unwrap();

    let mut fresh = hub_context();
    read_snapshots(&mut fresh, &data).unwrap();
    read_acs_defereds(&mut fresh.store, &data).unwrap();

    assert!(fresh
        .store
        .find_level_info("MAP02")
        .unwrap()
        .flags
        .contains(LevelFlags::VISITED));
    assert_eq!(
        fresh
            .store
            .find_level_info("MAP02")
            .unwrap()
            .defered
            .len(),
        1
    );

    // The restored snapshot is usable: load MAP01 and the level state
    // comes back.
    fresh.players[0].in_game = true;
    fresh.level.map_name = "MAP01".to_string();
    let mut scripts2 = RecordingScriptEngine::default();
    let mut setup2 = SimpleLevelSetup;
    let mut co2 = collaborators!(scripts2, textures, setup2);
    myzd_game::transition::do_load_level(&mut fresh, &mut co2, 0, false).unwrap();
    assert!(fresh.level.from_snapshot);
    assert_eq!(fresh.level.found_items, 5);
}
