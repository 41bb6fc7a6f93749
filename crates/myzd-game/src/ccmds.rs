// ccmds.rs — console commands for moving between maps
//
// These are the validated entry points: they check the map name before
// queueing anything, unlike the programmatic change_level path which
// trusts level designers.

use std::path::Path;

use myzd_common::console::con_printf;

use crate::game::{GameContext, GameError};
use crate::level_info::{LevelFlags, MapTarget};
use crate::transition::{change_level, defered_init_new, Collaborators};

/// `map <name>` — start a new game on the named map. Single-player
/// only; net games change maps with `changemap` so everyone moves
/// together.
pub fn cmd_map(ctx: &mut GameContext, co: &mut Collaborators, args: &[&str]) {
    if ctx.net_game {
        con_printf("Use \"changemap\" instead. \"map\" is for single-player only.\n");
        return;
    }
    let Some(&name) = args.first() else {
        con_printf("Usage: map <map name>\n");
        return;
    };
    let resolved = ctx
        .store
        .check_warp_trans_map(name, true)
        .unwrap_or_else(|| name.to_string());
    if !co.setup.check_map_data(&resolved) {
        con_printf(&format!("No map {}\n", resolved));
        return;
    }
    defered_init_new(ctx, &resolved, None);
}

/// `open <file>` — start a new game on a map loaded straight from a
/// file rather than the WAD directory. The name passes through with a
/// "file:" prefix so the loader knows where to look, case and length
/// intact.
pub fn cmd_open(ctx: &mut GameContext, args: &[&str]) {
    if ctx.net_game {
        con_printf("You cannot use open in multiplayer games.\n");
        return;
    }
    let Some(&name) = args.first() else {
        con_printf("Usage: open <map file>\n");
        return;
    };
    defered_init_new(ctx, &format!("file:{}", name), None);
}

/// `changemap <name> [position]` — mid-game map change for net games.
/// The flag keeps the abandoned level out of the visited list.
pub fn cmd_changemap(ctx: &mut GameContext, co: &mut Collaborators, args: &[&str]) {
    if !ctx.net_game {
        con_printf("Use \"map\" instead. \"changemap\" is for net games.\n");
        return;
    }
    let Some(&name) = args.first() else {
        con_printf("Usage: changemap <map name> [position]\n");
        return;
    };
    if !co.setup.check_map_data(name) {
        con_printf(&format!("No map {}\n", name));
        return;
    }
    let position = args
        .get(1)
        .and_then(|p| p.parse::<i32>().ok())
        .unwrap_or(0);
    ctx.level.flags |= LevelFlags::CHANGE_MAP_CHEAT;
    change_level(
        ctx,
        co,
        MapTarget::literal(name),
        position,
        false,
        None,
        false,
        false,
        false,
    );
}

/// `listmaps` — print every defined map that has loadable data.
pub fn cmd_listmaps(ctx: &GameContext, co: &Collaborators) {
    for info in &ctx.store.levels {
        if co.setup.check_map_data(&info.map_name) {
            con_printf(&format!(
                "{}: '{}'\n",
                info.map_name,
                info.lookup_display_name(&ctx.strings)
            ));
        }
    }
}

/// `writeini <file>` — write every archived cvar to a configuration
/// file as `set` lines.
pub fn cmd_writeini(ctx: &GameContext, path: &Path) -> Result<(), GameError> {
    std::fs::write(path, ctx.cvars.write_variables())
        .map_err(|e| GameError::Fatal(format!("could not write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameAction;
    use crate::level_info::{GameInfo, LevelInfo};
    use crate::world::{AnyTexture, LevelSetup, RecordingScriptEngine, SimpleLevelSetup, World};

    struct OnlyKnownMaps(Vec<&'static str>);

    impl LevelSetup for OnlyKnownMaps {
        fn check_map_data(&self, map_name: &str) -> bool {
            self.0.iter().any(|m| m.eq_ignore_ascii_case(map_name))
        }
        fn setup_level(&mut self, _world: &mut World, _players: &[usize], _position: i32) {}
    }

    fn context() -> GameContext {
        let mut ctx = GameContext::new(GameInfo::default());
        ctx.store.put_level(LevelInfo {
            map_name: "MAP01".to_string(),
            display_name: "Entry Way".to_string(),
            ..LevelInfo::default()
        });
        ctx
    }

    #[test]
    fn test_map_command_queues_new_game() {
        let mut ctx = context();
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = OnlyKnownMaps(vec!["MAP01"]);
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        cmd_map(&mut ctx, &mut co, &["map01"]);
        assert_eq!(ctx.game_action, GameAction::NewGame);
        assert_eq!(ctx.next_level, MapTarget::literal("MAP01"));
    }

    #[test]
    fn test_map_command_rejects_unknown_and_netgame() {
        let mut ctx = context();
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = OnlyKnownMaps(vec!["MAP01"]);
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        cmd_map(&mut ctx, &mut co, &["MAP99"]);
        assert_eq!(ctx.game_action, GameAction::Nothing);

        ctx.net_game = true;
        cmd_map(&mut ctx, &mut co, &["MAP01"]);
        assert_eq!(ctx.game_action, GameAction::Nothing);
    }

    #[test]
    fn test_map_command_resolves_warp_trans() {
        let mut ctx = context();
        ctx.store.put_level(LevelInfo {
            map_name: "MAP09".to_string(),
            warp_trans: 5,
            ..LevelInfo::default()
        });
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = OnlyKnownMaps(vec!["MAP09"]);
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        cmd_map(&mut ctx, &mut co, &["&wt@05"]);
        assert_eq!(ctx.next_level, MapTarget::literal("MAP09"));
    }

    #[test]
    fn test_open_command_keeps_file_name_intact() {
        let mut ctx = context();
        cmd_open(&mut ctx, &["mymaps/longfilename.wad"]);
        assert_eq!(ctx.game_action, GameAction::NewGame);
        assert_eq!(
            ctx.next_level,
            MapTarget::Literal("file:mymaps/longfilename.wad".to_string())
        );
    }

    #[test]
    fn test_changemap_requires_netgame_and_flags_cheat() {
        let mut ctx = context();
        let mut scripts = RecordingScriptEngine::default();
        let textures = AnyTexture;
        let mut setup = SimpleLevelSetup;
        let mut co = Collaborators {
            scripts: &mut scripts,
            textures: &textures,
            setup: &mut setup,
        };
        cmd_changemap(&mut ctx, &mut co, &["MAP01"]);
        assert_eq!(ctx.game_action, GameAction::Nothing);

        ctx.net_game = true;
        cmd_changemap(&mut ctx, &mut co, &["MAP01", "2"]);
        assert_eq!(ctx.game_action, GameAction::Completed);
        assert_eq!(ctx.start_pos, 2);
        assert!(ctx.level.flags.contains(LevelFlags::CHANGE_MAP_CHEAT));
    }

    #[test]
    fn test_writeini_writes_archived_cvars() {
        let ctx = context();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        cmd_writeini(&ctx, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("set sv_gravity \"800\""));
        assert!(!written.contains("developer"));
    }
}
