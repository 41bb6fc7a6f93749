// game.rs — game context and runtime level state
//
// One GameContext owns everything the transition machinery touches:
// descriptor store, cvars, the live world, players, and the current
// level's mutable state. No globals; tests build as many contexts as
// they like.

use std::collections::HashMap;

use myzd_common::archive::ArchiveError;
use myzd_common::cvar::{CvarContext, CVAR_ARCHIVE};
use myzd_common::sc_man::ParseError;
use thiserror::Error;

use crate::level_info::{
    CompatFlags, GameInfo, LevelFlags, MapInfoStore, MapTarget, UNNAMED_LEVEL,
};
use crate::world::{ActorId, World};

pub const MAX_PLAYERS: usize = 8;

#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("no map data for '{0}'")]
    MapNotFound(String),
    #[error("{0}")]
    Fatal(String),
}

// ============================================================
// Rule flags
// ============================================================

bitflags::bitflags! {
    /// Subset of the dmflags word the level subsystem consults.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DmFlags: u32 {
        const NO_MONSTERS      = 1 << 0;
        const FAST_MONSTERS    = 1 << 1;
        const MONSTERS_RESPAWN = 1 << 2;
        const DOUBLE_AMMO      = 1 << 3;
        const NO_FREELOOK      = 1 << 4;
        const NO_JUMP          = 1 << 5;
        const NO_CROUCH        = 1 << 6;
        const FORCE_FALLINGZD  = 1 << 7;
        const FORCE_FALLINGHX  = 1 << 8;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GameState {
    #[default]
    FullConsole,
    Level,
    Intermission,
    Finale,
    /// A map running behind the title screen. Completing it loads the
    /// next one directly, skipping intermission and finale.
    TitleLevel,
}

/// Pending deferred action, dispatched once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GameAction {
    #[default]
    Nothing,
    NewGame,
    LoadLevel,
    Completed,
    WorldDone,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallingDamage {
    #[default]
    None,
    ZDoom,
    Hexen,
    Strife,
}

// ============================================================
// Players
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerState {
    #[default]
    Live,
    Dead,
    /// Dead and waiting to be respawned.
    Reborn,
    /// Entering the game fresh.
    Enter,
}

#[derive(Clone, Debug, Default)]
pub struct Player {
    pub in_game: bool,
    pub state: PlayerState,
    pub mo: Option<ActorId>,
    pub health: i32,
    pub frag_count: i32,
    pub kill_count: i32,
    pub item_count: i32,
    pub secret_count: i32,
    pub extra_light: i32,
    pub fixed_colormap: i32,
    pub class_name: String,
}

// ============================================================
// Intermission stats
// ============================================================

#[derive(Clone, Copy, Debug, Default)]
pub struct WiPlayer {
    pub in_game: bool,
    pub kills: i32,
    pub items: i32,
    pub secrets: i32,
    pub time: i32,
    pub frags: i32,
}

/// Everything the intermission screen needs, filled by complete_level.
#[derive(Clone, Debug, Default)]
pub struct IntermissionInfo {
    pub finished_map: String,
    pub finished_name: String,
    pub next_map: String,
    pub next_name: String,
    pub exit_pic: String,
    pub enter_pic: String,
    pub max_kills: i32,
    pub max_items: i32,
    pub max_secrets: i32,
    pub max_frags: i32,
    pub par_time: i32,
    pub suck_time: i32,
    /// Console player's slot.
    pub pnum: usize,
    pub plyr: [WiPlayer; MAX_PLAYERS],
}

/// A queued finale, consumed when the game state flips to Finale.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Finale {
    pub text: String,
    pub text_in_lump: bool,
    pub lookup_text: bool,
    pub music: String,
    pub flat: String,
    pub end_sequence: Option<u16>,
}

// ============================================================
// Runtime level state
// ============================================================

/// Mutable state of the level currently being played. Reset by
/// init_level_locals from the matching descriptor.
#[derive(Clone, Debug, Default)]
pub struct LevelLocals {
    /// Tics spent in this level.
    pub time: i32,
    /// Tics across the whole game, carried over hub returns.
    pub total_time: i32,
    pub map_name: String,
    pub level_name: String,
    pub level_num: i32,
    pub cluster: i32,
    pub next_map: MapTarget,
    pub secret_map: MapTarget,
    pub par_time: i32,
    pub suck_time: i32,
    pub flags: LevelFlags,
    pub compat_flags: CompatFlags,
    pub total_kills: i32,
    pub killed_monsters: i32,
    pub total_items: i32,
    pub found_items: i32,
    pub total_secrets: i32,
    pub found_secrets: i32,
    pub music: String,
    pub music_order: i32,
    pub sky_pic1: String,
    pub sky_speed1: f32,
    pub sky_pic2: String,
    pub sky_speed2: f32,
    pub fade_to: u32,
    pub outside_fog: u32,
    pub wall_vert_light: i8,
    pub wall_horiz_light: i8,
    pub gravity: f32,
    pub air_control: f32,
    pub air_friction: f32,
    pub air_supply: i32,
    pub team_damage: f32,
    /// Per-sector scroll offsets carried by the additive-scroller
    /// compatibility mode. Serialized with the level snapshot.
    pub scrolls: Vec<[f32; 2]>,
    /// The level was just restored from a snapshot.
    pub from_snapshot: bool,
}

impl LevelLocals {
    /// Recompute air friction whenever air control changes. Tiny control
    /// values mean full friction.
    pub fn air_control_changed(&mut self) {
        if self.air_control <= 1.0 / 256.0 {
            self.air_friction = 1.0;
        } else {
            self.air_friction = self.air_control * -0.0941 + 1.0004;
        }
    }

    pub fn is_jump_allowed(&self, dmflags: DmFlags) -> bool {
        !self.flags.contains(LevelFlags::JUMP_NO) && !dmflags.contains(DmFlags::NO_JUMP)
    }

    pub fn is_crouch_allowed(&self, dmflags: DmFlags) -> bool {
        !self.flags.contains(LevelFlags::CROUCH_NO) && !dmflags.contains(DmFlags::NO_CROUCH)
    }

    pub fn is_freelook_allowed(&self, dmflags: DmFlags) -> bool {
        if self.flags.contains(LevelFlags::FREELOOK_NO) {
            false
        } else if self.flags.contains(LevelFlags::FREELOOK_YES) {
            true
        } else {
            !dmflags.contains(DmFlags::NO_FREELOOK)
        }
    }

    /// Effective falling damage rule. dmflags override the level; both
    /// level bits together mean the Strife rule.
    pub fn falling_damage(&self, dmflags: DmFlags) -> FallingDamage {
        if dmflags.contains(DmFlags::FORCE_FALLINGZD) {
            return FallingDamage::ZDoom;
        }
        if dmflags.contains(DmFlags::FORCE_FALLINGHX) {
            return FallingDamage::Hexen;
        }
        let zd = self.flags.contains(LevelFlags::FALLDMG_ZD);
        let hx = self.flags.contains(LevelFlags::FALLDMG_HX);
        match (zd, hx) {
            (true, true) => FallingDamage::Strife,
            (true, false) => FallingDamage::ZDoom,
            (false, true) => FallingDamage::Hexen,
            (false, false) => FallingDamage::None,
        }
    }
}

// ============================================================
// The context
// ============================================================

pub const NUM_WORLD_VARS: usize = 64;

pub struct GameContext {
    pub store: MapInfoStore,
    pub cvars: CvarContext,
    pub info: GameInfo,
    pub level: LevelLocals,
    pub world: World,
    pub players: [Player; MAX_PLAYERS],
    pub game_state: GameState,
    pub game_action: GameAction,
    pub game_skill: usize,
    /// Skill change requested mid-game, applied at the next level load.
    pub next_skill: Option<usize>,
    pub dm_flags: DmFlags,
    pub deathmatch: bool,
    pub net_game: bool,
    pub paused: bool,
    pub console_player: usize,
    pub wminfo: IntermissionInfo,
    pub pending_finale: Option<Finale>,
    pub pending_autosave: bool,
    /// Player-start slot requested for the next load.
    pub start_pos: i32,
    /// Last start slot actually used; -1 in a change request means
    /// "reuse this".
    pub last_start_pos: i32,
    /// Set while the current level is being torn down; re-entrant exit
    /// triggers are ignored.
    pub unloading: bool,
    /// Keep pawn facing across hub travel instead of adopting the start
    /// spot's angle.
    pub start_keep_facing: bool,
    /// Drop carried items instead of travelling them to the next level.
    pub reset_inventory: bool,
    pub world_vars: [i32; NUM_WORLD_VARS],
    /// Language string table.
    pub strings: HashMap<String, String>,
    /// Where the pending action leads when it fires.
    pub next_level: MapTarget,
    /// Classes handed out to players who asked for a random one, in
    /// hand-out order. Persisted with save games.
    pub random_classes: Vec<String>,
}

impl GameContext {
    pub fn new(info: GameInfo) -> Self {
        let mut cvars = CvarContext::new();
        register_game_cvars(&mut cvars);
        Self {
            store: MapInfoStore::new(),
            cvars,
            info,
            level: LevelLocals::default(),
            world: World::new(),
            players: Default::default(),
            game_state: GameState::default(),
            game_action: GameAction::default(),
            game_skill: 2,
            next_skill: None,
            dm_flags: DmFlags::empty(),
            deathmatch: false,
            net_game: false,
            paused: false,
            console_player: 0,
            wminfo: IntermissionInfo::default(),
            pending_finale: None,
            pending_autosave: false,
            start_pos: 0,
            last_start_pos: 0,
            unloading: false,
            start_keep_facing: false,
            reset_inventory: false,
            world_vars: [0; NUM_WORLD_VARS],
            strings: HashMap::new(),
            next_level: MapTarget::None,
            random_classes: Vec::new(),
        }
    }

    pub fn active_players(&self) -> Vec<usize> {
        (0..MAX_PLAYERS).filter(|&i| self.players[i].in_game).collect()
    }

    /// True for single-player and co-op; false only in deathmatch.
    pub fn is_coop(&self) -> bool {
        !self.deathmatch
    }

    /// Display name of the current level, through the string table when
    /// the descriptor asks for a lookup.
    pub fn current_level_name(&self) -> String {
        match self.store.find_level_info(&self.level.map_name) {
            Some(info) => info.lookup_display_name(&self.strings),
            None => UNNAMED_LEVEL.to_string(),
        }
    }

    /// Look a cluster text up through the string table when flagged.
    pub fn lookup_string(&self, key: &str) -> String {
        self.strings.get(key).cloned().unwrap_or_else(|| key.to_string())
    }
}

/// Register the cvars the level subsystem reads.
pub fn register_game_cvars(cvars: &mut CvarContext) {
    cvars.get("skill", "2", CVAR_ARCHIVE);
    cvars.get("developer", "0", 0);
    cvars.get("disableautosave", "0", CVAR_ARCHIVE);
    cvars.get("sv_gravity", "800", CVAR_ARCHIVE);
    cvars.get("sv_aircontrol", "0.00390625", CVAR_ARCHIVE);
    cvars.get("teamdamage", "0", CVAR_ARCHIVE);
    cvars.get("teamplay", "0", CVAR_ARCHIVE);
    cvars.get("dmflags", "0", CVAR_ARCHIVE);
    cvars.get("compatflags", "0", CVAR_ARCHIVE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_control_changed() {
        let mut level = LevelLocals::default();
        level.air_control = 0.001;
        level.air_control_changed();
        assert_eq!(level.air_friction, 1.0);

        level.air_control = 0.5;
        level.air_control_changed();
        assert!((level.air_friction - (0.5 * -0.0941 + 1.0004)).abs() < 1e-6);
    }

    #[test]
    fn test_freelook_resolution() {
        let mut level = LevelLocals::default();
        assert!(level.is_freelook_allowed(DmFlags::empty()));
        assert!(!level.is_freelook_allowed(DmFlags::NO_FREELOOK));

        level.flags |= LevelFlags::FREELOOK_YES;
        assert!(level.is_freelook_allowed(DmFlags::NO_FREELOOK));

        level.flags |= LevelFlags::FREELOOK_NO;
        assert!(!level.is_freelook_allowed(DmFlags::empty()));
    }

    #[test]
    fn test_falling_damage_resolution() {
        let mut level = LevelLocals::default();
        assert_eq!(level.falling_damage(DmFlags::empty()), FallingDamage::None);

        level.flags |= LevelFlags::FALLDMG_HX;
        assert_eq!(level.falling_damage(DmFlags::empty()), FallingDamage::Hexen);

        level.flags |= LevelFlags::FALLDMG_ZD;
        assert_eq!(level.falling_damage(DmFlags::empty()), FallingDamage::Strife);

        assert_eq!(
            level.falling_damage(DmFlags::FORCE_FALLINGZD),
            FallingDamage::ZDoom
        );
    }

    #[test]
    fn test_cvar_registration() {
        let ctx = GameContext::new(GameInfo::default());
        assert_eq!(ctx.cvars.variable_value("sv_gravity"), 800.0);
        assert_eq!(ctx.cvars.variable_value("skill"), 2.0);
    }
}
