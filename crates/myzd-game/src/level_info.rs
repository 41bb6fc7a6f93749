// level_info.rs — level/cluster descriptors and the descriptor store
//
// Descriptors are static configuration records produced by the MAPINFO
// parser. They are immutable between parses except for the owned
// snapshot, the visited flag and the deferred-script list, all of which
// belong to the running game rather than the lump.

use std::collections::HashMap;

use myzd_common::sc_man::upper_copy;

// ============================================================
// Level behavior flags
// ============================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LevelFlags: u64 {
        const NO_INTERMISSION          = 1 << 0;
        const DOUBLE_SKY               = 1 << 1;
        const MONSTERS_TELEFRAG        = 1 << 2;
        const MAP07_SPECIAL            = 1 << 3;
        const BRUISER_SPECIAL          = 1 << 4;
        const CYBORG_SPECIAL           = 1 << 5;
        const SPIDER_SPECIAL           = 1 << 6;
        const MINOTAUR_SPECIAL         = 1 << 7;
        const SORCERER2_SPECIAL        = 1 << 8;
        const HEAD_SPECIAL             = 1 << 9;
        const SPEC_LOWER_FLOOR         = 1 << 10;
        const SPEC_OPEN_DOOR           = 1 << 11;
        const SPEC_KILL_MONSTERS       = 1 << 12;
        const START_LIGHTNING          = 1 << 13;
        const SNDSEQ_TOTAL_CTRL        = 1 << 14;
        const FORCE_NO_SKY_STRETCH     = 1 << 15;
        const FREELOOK_YES             = 1 << 16;
        const FREELOOK_NO              = 1 << 17;
        const JUMP_NO                  = 1 << 18;
        const CROUCH_NO                = 1 << 19;
        const FALLDMG_ZD               = 1 << 20;
        const FALLDMG_HX               = 1 << 21;
        const ACT_OWN_SPECIAL          = 1 << 22;
        const MISSILES_ACTIVATE_IMPACT = 1 << 23;
        const INFINITE_FLIGHT          = 1 << 24;
        const MONSTER_FALLING_DAMAGE   = 1 << 25;
        const NO_ALLIES                = 1 << 26;
        const FILTER_STARTS            = 1 << 27;
        const NO_INVENTORY_BAR         = 1 << 28;
        const DEATH_SLIDESHOW          = 1 << 29;
        const LAX_MONSTER_ACTIVATION   = 1 << 30;
        const LAX_ACTIVATION_MAPINFO   = 1 << 31;
        const KEEP_FULL_INVENTORY      = 1 << 32;
        const CLIP_MIDTEX              = 1 << 33;
        const WRAP_MIDTEX              = 1 << 34;
        const PAUSE_MUSIC_IN_MENUS     = 1 << 35;
        const NO_INFIGHTING            = 1 << 36;
        const TOTAL_INFIGHTING         = 1 << 37;
        const ALLOW_RESPAWN            = 1 << 38;
        const FORCE_TEAMPLAY_ON        = 1 << 39;
        const FORCE_TEAMPLAY_OFF      = 1 << 40;
        const CHECK_SWITCH_RANGE       = 1 << 41;
        const CONV_SINGLE_UNFREEZE     = 1 << 42;
        const LEGACY_NUM_MODE          = 1 << 43;
        const MUSIC_DEFINED            = 1 << 44;
        const VISITED                  = 1 << 45;
        const CHANGE_MAP_CHEAT         = 1 << 46;
        const HAS_FADE_TABLE           = 1 << 47;
        const LOOKUP_LEVEL_NAME        = 1 << 48;
        const NO_MONSTERS              = 1 << 49;
    }
}

impl LevelFlags {
    /// The mutually exclusive boss-action bits.
    pub const SPEC_ACTIONS_MASK: LevelFlags = LevelFlags::SPEC_LOWER_FLOOR
        .union(LevelFlags::SPEC_OPEN_DOOR)
        .union(LevelFlags::SPEC_KILL_MONSTERS);
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CompatFlags: u32 {
        const SHORTTEX              = 1 << 0;
        const STAIR_INDEX           = 1 << 1;
        const LIMIT_PAIN            = 1 << 2;
        const NO_PASS_MOBJ          = 1 << 3;
        const NO_TOSS_DROPS         = 1 << 4;
        const USE_BLOCKING          = 1 << 5;
        const NO_DOOR_LIGHT         = 1 << 6;
        const RAVEN_SCROLL          = 1 << 7;
        const SOUND_TARGET          = 1 << 8;
        const DEH_HEALTH            = 1 << 9;
        const TRACE                 = 1 << 10;
        const DROPOFF               = 1 << 11;
        const BOOM_SCROLL           = 1 << 12;
        const INVISIBILITY          = 1 << 13;
        const SILENT_INSTANT_FLOORS = 1 << 14;
        const SECTOR_SOUNDS         = 1 << 15;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ClusterFlags: u32 {
        const HUB                 = 1 << 0;
        const ENTERTEXT_IN_LUMP   = 1 << 1;
        const EXITTEXT_IN_LUMP    = 1 << 2;
        const FINALE_PIC          = 1 << 3;
        const LOOKUP_ENTERTEXT    = 1 << 4;
        const LOOKUP_EXITTEXT     = 1 << 5;
        const LOOKUP_NAME         = 1 << 6;
    }
}

// ============================================================
// Map routing targets
// ============================================================

/// Sentinel prefix used by the persisted format to smuggle an end
/// sequence index through an 8-byte map-name field.
pub const END_SEQUENCE_TAG: &[u8; 6] = b"enDSeQ";

/// Where a level exit leads. The persisted save format packs the
/// EndSequence variant into an 8-byte name field; that encoding only
/// exists at the archive boundary (to_wire8 / from_wire8).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MapTarget {
    #[default]
    None,
    Literal(String),
    EndSequence(u16),
}

impl MapTarget {
    pub fn literal(name: &str) -> Self {
        MapTarget::Literal(upper_copy(name))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, MapTarget::None)
    }

    pub fn is_end_sequence(&self) -> bool {
        matches!(self, MapTarget::EndSequence(_))
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            MapTarget::Literal(name) => Some(name),
            _ => None,
        }
    }

    /// Encode into the fixed 8-byte map-name field of the save format.
    pub fn to_wire8(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        match self {
            MapTarget::None => {}
            MapTarget::Literal(name) => {
                let bytes = name.as_bytes();
                let len = bytes.len().min(8);
                out[..len].copy_from_slice(&bytes[..len]);
            }
            MapTarget::EndSequence(index) => {
                out[..6].copy_from_slice(END_SEQUENCE_TAG);
                out[6..].copy_from_slice(&index.to_le_bytes());
            }
        }
        out
    }

    pub fn from_wire8(field: &[u8; 8]) -> Self {
        if &field[..6] == END_SEQUENCE_TAG {
            return MapTarget::EndSequence(u16::from_le_bytes([field[6], field[7]]));
        }
        let end = field.iter().position(|&b| b == 0).unwrap_or(8);
        if end == 0 {
            MapTarget::None
        } else {
            MapTarget::Literal(String::from_utf8_lossy(&field[..end]).into_owned())
        }
    }
}

// ============================================================
// End sequences
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndType {
    #[default]
    Pic,
    Pic1,
    Pic2,
    Pic3,
    Bunny,
    Cast,
    Demon,
    Underwater,
    Chess,
    Strife,
    BuyStrife,
}

/// A finale presentation referenced by index from a MapTarget.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EndSequence {
    pub end_type: EndType,
    pub pic_name: String,
    pub pic_name2: String,
    pub music: String,
    pub music_looping: bool,
    pub play_the_end: bool,
    /// Advanced sequences come from an endgame block and are never
    /// deduplicated.
    pub advanced: bool,
}

// ============================================================
// Special actions and extension records
// ============================================================

/// A boss-death (or similar) action attached to a level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecialAction {
    /// Actor class whose death triggers the action.
    pub actor_type: String,
    /// Line special number.
    pub action: i32,
    pub args: [i32; 5],
}

/// Opaque record produced by a registered extension parser for a block
/// the core keyword table does not know.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionalData {
    pub keyword: String,
    pub values: Vec<String>,
}

/// A script action queued for a level that is not currently loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeferredScript {
    pub script: i32,
    pub player_num: i32,
    pub always: bool,
    pub args: [i32; 3],
}

/// Serialized capture of a level's mutable state, compressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u32,
    pub data: Vec<u8>,
}

// ============================================================
// Level descriptor
// ============================================================

pub const UNNAMED_LEVEL: &str = "Unnamed";

#[derive(Clone, Debug, PartialEq)]
pub struct LevelInfo {
    pub map_name: String,
    pub level_num: i32,
    pub title_patch: String,
    pub next_map: MapTarget,
    pub secret_map: MapTarget,
    pub sky_pic1: String,
    pub sky_speed1: f32,
    pub sky_pic2: String,
    pub sky_speed2: f32,
    pub cluster: i32,
    pub par_time: i32,
    pub suck_time: i32,
    pub flags: LevelFlags,
    pub compat_flags: CompatFlags,
    pub compat_mask: CompatFlags,
    pub music: String,
    pub music_order: i32,
    pub display_name: String,
    pub fade_table: String,
    pub fade_to: u32,
    pub outside_fog: u32,
    pub wall_vert_light: i8,
    pub wall_horiz_light: i8,
    pub f1_pic: String,
    pub border_texture: String,
    pub cd_track: i32,
    pub cd_id: i32,
    pub warp_trans: i32,
    pub gravity: f32,
    pub air_control: f32,
    pub team_damage: f32,
    pub air_supply: i32,
    pub exit_pic: String,
    pub enter_pic: String,
    pub inter_music: String,
    pub inter_music_order: i32,
    pub snd_seq: String,
    pub sound_info: String,
    pub translator: String,
    pub redirect_type: String,
    pub redirect_map: MapTarget,
    pub special_actions: Vec<SpecialAction>,
    pub opt_data: Vec<OptionalData>,
    pub snapshot: Option<Snapshot>,
    pub defered: Vec<DeferredScript>,
}

impl Default for LevelInfo {
    fn default() -> Self {
        Self {
            map_name: String::new(),
            level_num: 0,
            title_patch: String::new(),
            next_map: MapTarget::None,
            secret_map: MapTarget::None,
            sky_pic1: String::new(),
            sky_speed1: 0.0,
            sky_pic2: String::new(),
            sky_speed2: 0.0,
            cluster: 0,
            par_time: 0,
            suck_time: 0,
            flags: LevelFlags::empty(),
            compat_flags: CompatFlags::empty(),
            compat_mask: CompatFlags::empty(),
            music: String::new(),
            music_order: 0,
            display_name: String::new(),
            fade_table: String::new(),
            fade_to: 0,
            outside_fog: 0,
            wall_vert_light: 0,
            wall_horiz_light: 0,
            f1_pic: String::new(),
            border_texture: String::new(),
            cd_track: 0,
            cd_id: 0,
            warp_trans: 0,
            gravity: 0.0,
            air_control: 0.0,
            team_damage: 0.0,
            air_supply: 0,
            exit_pic: String::new(),
            enter_pic: String::new(),
            inter_music: String::new(),
            inter_music_order: 0,
            snd_seq: String::new(),
            sound_info: String::new(),
            translator: String::new(),
            redirect_type: String::new(),
            redirect_map: MapTarget::None,
            special_actions: Vec::new(),
            opt_data: Vec::new(),
            snapshot: None,
            defered: Vec::new(),
        }
    }
}

impl LevelInfo {
    /// Resolve the display name, going through the string table when the
    /// lookup flag is set. Localized entries may carry a "MAP01: " or
    /// "E1M1: " style header which gets stripped.
    pub fn lookup_display_name(&self, strings: &HashMap<String, String>) -> String {
        if !self.flags.contains(LevelFlags::LOOKUP_LEVEL_NAME) {
            return self.display_name.clone();
        }
        let looked_up = match strings.get(&self.display_name) {
            Some(s) => s,
            None => return self.display_name.clone(),
        };

        let header = if self.map_name.len() == 4
            && self.map_name.starts_with('E')
            && self.map_name.as_bytes()[2] == b'M'
        {
            format!("{}: ", self.map_name)
        } else if let Some(num) = self.map_name.strip_prefix("MAP") {
            match num.parse::<i32>() {
                Ok(n) => format!("{}: ", n),
                Err(_) => String::new(),
            }
        } else {
            String::new()
        };

        if !header.is_empty() {
            if let Some(pos) = looked_up.find(&header) {
                return looked_up[pos + header.len()..].to_string();
            }
        }
        looked_up.clone()
    }
}

// ============================================================
// Cluster descriptor
// ============================================================

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterInfo {
    pub cluster: i32,
    pub flags: ClusterFlags,
    pub enter_text: String,
    pub exit_text: String,
    pub message_music: String,
    pub music_order: i32,
    pub finale_flat: String,
    pub cluster_name: String,
    pub cd_track: i32,
    pub cd_id: i32,
}

impl ClusterInfo {
    pub fn is_hub(&self) -> bool {
        self.flags.contains(ClusterFlags::HUB)
    }
}

// ============================================================
// Game identity
// ============================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GameType {
    #[default]
    Doom,
    Heretic,
    Hexen,
    Strife,
}

/// Static facts about which game is being played. The parser and the
/// finale selection consult these.
#[derive(Clone, Debug)]
pub struct GameInfo {
    pub game_type: GameType,
    pub shareware: bool,
    /// Commercial (MAPxx) naming rather than ExMy.
    pub commercial: bool,
    pub border_flat: String,
    pub sky_flat_name: String,
    /// Map used behind the title screen; empty for a static title.
    pub title_map: String,
    /// Selectable player classes. A "Random" request picks one of these.
    pub player_classes: Vec<String>,
}

impl Default for GameInfo {
    fn default() -> Self {
        Self {
            game_type: GameType::Doom,
            shareware: false,
            commercial: true,
            border_flat: "FLOOR7_2".to_string(),
            sky_flat_name: "F_SKY1".to_string(),
            title_map: String::new(),
            player_classes: vec!["DoomPlayer".to_string()],
        }
    }
}

/// Compose a standard lump name from episode/map numbers.
pub fn calc_map_name(info: &GameInfo, episode: i32, map: i32) -> String {
    if info.commercial {
        format!("MAP{:02}", map)
    } else {
        format!("E{}M{}", episode, map)
    }
}

// ============================================================
// The descriptor store
// ============================================================

pub use crate::episode::{EpisodeInfo, MAX_EPISODES};
pub use crate::skill::SkillInfo;

/// Process-wide store for everything MAPINFO defines. Built by the
/// parser at startup and on WAD reload; read by the transition
/// controller and the menus. Never written during gameplay except for
/// snapshots, deferred scripts and the visited flag.
pub struct MapInfoStore {
    pub levels: Vec<LevelInfo>,
    level_index: HashMap<String, usize>,
    pub clusters: Vec<ClusterInfo>,
    pub episodes: Vec<EpisodeInfo>,
    pub skills: Vec<SkillInfo>,
    pub end_sequences: Vec<EndSequence>,
    /// Placeholder descriptor handed out for unknown map names. Mutable
    /// because save files may carry a snapshot for it.
    pub default_info: LevelInfo,
    default_cluster: ClusterInfo,
}

impl MapInfoStore {
    pub fn new() -> Self {
        let mut default_info = LevelInfo {
            sky_pic1: "SKY1".to_string(),
            fade_table: "COLORMAP".to_string(),
            display_name: UNNAMED_LEVEL.to_string(),
            wall_vert_light: 8,
            wall_horiz_light: -8,
            ..LevelInfo::default()
        };
        default_info.sky_pic2 = default_info.sky_pic1.clone();
        Self {
            levels: Vec::new(),
            level_index: HashMap::new(),
            clusters: Vec::new(),
            episodes: Vec::new(),
            skills: Vec::new(),
            end_sequences: Vec::new(),
            default_info,
            default_cluster: ClusterInfo::default(),
        }
    }

    fn key(name: &str) -> String {
        upper_copy(name)
    }

    pub fn find_level_index(&self, map_name: &str) -> Option<usize> {
        self.level_index.get(&Self::key(map_name)).copied()
    }

    pub fn find_level_info(&self, map_name: &str) -> Option<&LevelInfo> {
        self.find_level_index(map_name).map(|i| &self.levels[i])
    }

    pub fn find_level_info_mut(&mut self, map_name: &str) -> Option<&mut LevelInfo> {
        if let Some(i) = self.find_level_index(map_name) {
            Some(&mut self.levels[i])
        } else {
            None
        }
    }

    /// Lookup that never fails: unknown names resolve to the default
    /// placeholder descriptor. Programmatic level changes rely on this.
    pub fn level_info_or_default(&self, map_name: &str) -> &LevelInfo {
        self.find_level_info(map_name).unwrap_or(&self.default_info)
    }

    /// Insert or overwrite a level record, keyed by its map_name.
    pub fn put_level(&mut self, info: LevelInfo) -> usize {
        let key = Self::key(&info.map_name);
        match self.level_index.get(&key).copied() {
            Some(i) => {
                self.levels[i] = info;
                i
            }
            None => {
                let i = self.levels.len();
                self.level_index.insert(key, i);
                self.levels.push(info);
                i
            }
        }
    }

    /// Assign a level number, wiping it from any other holder first.
    pub fn set_level_num(&mut self, index: usize, num: i32) {
        if num != 0 {
            for (i, info) in self.levels.iter_mut().enumerate() {
                if i != index && info.level_num == num {
                    info.level_num = 0;
                }
            }
        }
        self.levels[index].level_num = num;
    }

    pub fn find_level_by_num(&self, num: i32) -> Option<&LevelInfo> {
        if num == 0 {
            return None;
        }
        self.levels.iter().find(|info| info.level_num == num)
    }

    pub fn find_level_by_warp_trans(&self, num: i32) -> Option<&LevelInfo> {
        self.levels.iter().rev().find(|info| info.warp_trans == num)
    }

    /// Resolve a "&wt@xx" warp-translation token to a real map name.
    /// With substitute set, an unmatched token degrades to "MAPxx".
    pub fn check_warp_trans_map(&self, map_name: &str, substitute: bool) -> Option<String> {
        let digits = map_name.strip_prefix("&wt@").or_else(|| {
            map_name
                .strip_prefix("&WT@")
                .or_else(|| map_name.strip_prefix("&Wt@").or_else(|| map_name.strip_prefix("&wT@")))
        })?;
        if let Ok(num) = digits.parse::<i32>() {
            if let Some(info) = self.find_level_by_warp_trans(num) {
                return Some(info.map_name.clone());
            }
        }
        if substitute {
            Some(format!("MAP{}", digits))
        } else {
            None
        }
    }

    pub fn find_cluster_index(&self, cluster: i32) -> Option<usize> {
        self.clusters.iter().position(|c| c.cluster == cluster)
    }

    pub fn find_cluster_info(&self, cluster: i32) -> &ClusterInfo {
        match self.find_cluster_index(cluster) {
            Some(i) => &self.clusters[i],
            None => &self.default_cluster,
        }
    }

    pub fn find_cluster_info_mut(&mut self, cluster: i32) -> Option<&mut ClusterInfo> {
        if let Some(i) = self.find_cluster_index(cluster) {
            Some(&mut self.clusters[i])
        } else {
            None
        }
    }

    /// Auto-create a cluster referenced before it is defined. Under
    /// legacy numeric-map mode the new cluster is flagged as a hub,
    /// because that game family has no clusterdefs of its own.
    pub fn find_or_create_cluster(&mut self, cluster: i32, legacy_mode: bool) -> usize {
        if let Some(i) = self.find_cluster_index(cluster) {
            return i;
        }
        let mut info = ClusterInfo {
            cluster,
            ..ClusterInfo::default()
        };
        if legacy_mode {
            info.flags |= ClusterFlags::HUB;
        }
        self.clusters.push(info);
        self.clusters.len() - 1
    }

    // ------------------------------------------------------------
    // End sequences
    // ------------------------------------------------------------

    /// Find an existing non-advanced sequence by type (and picture, for
    /// picture sequences).
    pub fn find_end_sequence(&self, end_type: EndType, pic_name: &str) -> Option<usize> {
        self.end_sequences.iter().position(|seq| {
            seq.end_type == end_type
                && !seq.advanced
                && (end_type != EndType::Pic || seq.pic_name.eq_ignore_ascii_case(pic_name))
        })
    }

    /// Register a sequence, deduplicating unless it is advanced.
    pub fn add_end_sequence(&mut self, seq: EndSequence) -> u16 {
        if !seq.advanced {
            if let Some(i) = self.find_end_sequence(seq.end_type, &seq.pic_name) {
                return i as u16;
            }
        }
        self.end_sequences.push(seq);
        (self.end_sequences.len() - 1) as u16
    }

    /// Find-or-create a plain sequence of the given type and return a
    /// routing target for it.
    pub fn set_end_sequence(&mut self, end_type: EndType) -> MapTarget {
        let index = self.add_end_sequence(EndSequence {
            end_type,
            ..EndSequence::default()
        });
        MapTarget::EndSequence(index)
    }

    /// Give a routing target with no destination a game-appropriate end
    /// sequence. Existing end sequences are left alone.
    pub fn set_for_end_game(&mut self, target: &mut MapTarget, info: &GameInfo) {
        if target.is_end_sequence() {
            return;
        }
        let end_type = match info.game_type {
            GameType::Strife => {
                if info.shareware {
                    EndType::BuyStrife
                } else {
                    EndType::Strife
                }
            }
            GameType::Hexen => EndType::Chess,
            _ if info.commercial => EndType::Cast,
            _ => EndType::Pic1,
        };
        *target = self.set_end_sequence(end_type);
    }

    // ------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------

    pub fn clear_snapshots(&mut self) {
        for info in &mut self.levels {
            info.snapshot = None;
        }
        self.default_info.snapshot = None;
    }

    pub fn remove_defereds(&mut self) {
        for info in &mut self.levels {
            info.defered.clear();
        }
    }

    pub fn clear_episodes(&mut self) {
        self.episodes.clear();
    }

    /// Drop everything; used on WAD reload and at exit.
    pub fn unload(&mut self) {
        self.clear_snapshots();
        self.levels.clear();
        self.level_index.clear();
        self.clusters.clear();
        self.episodes.clear();
        self.skills.clear();
        self.end_sequences.clear();
    }
}

impl Default for MapInfoStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_level_overrides_in_place() {
        let mut store = MapInfoStore::new();
        let mut a = LevelInfo::default();
        a.map_name = "MAP01".to_string();
        a.par_time = 30;
        store.put_level(a);

        let mut b = LevelInfo::default();
        b.map_name = "map01".to_string();
        b.par_time = 90;
        store.put_level(b);

        assert_eq!(store.levels.len(), 1);
        assert_eq!(store.find_level_info("MAP01").unwrap().par_time, 90);
    }

    #[test]
    fn test_level_num_uniqueness() {
        let mut store = MapInfoStore::new();
        let mut a = LevelInfo::default();
        a.map_name = "MAP01".to_string();
        let ia = store.put_level(a);
        store.set_level_num(ia, 1);

        let mut b = LevelInfo::default();
        b.map_name = "E1M1".to_string();
        let ib = store.put_level(b);
        store.set_level_num(ib, 1);

        assert_eq!(store.find_level_info("MAP01").unwrap().level_num, 0);
        assert_eq!(store.find_level_info("E1M1").unwrap().level_num, 1);
        assert_eq!(store.find_level_by_num(1).unwrap().map_name, "E1M1");
    }

    #[test]
    fn test_end_sequence_dedup() {
        let mut store = MapInfoStore::new();
        let a = store.add_end_sequence(EndSequence {
            end_type: EndType::Pic,
            pic_name: "VICTORY".to_string(),
            ..EndSequence::default()
        });
        let b = store.add_end_sequence(EndSequence {
            end_type: EndType::Pic,
            pic_name: "VICTORY".to_string(),
            ..EndSequence::default()
        });
        assert_eq!(a, b);

        let c = store.add_end_sequence(EndSequence {
            end_type: EndType::Pic,
            pic_name: "VICTORY".to_string(),
            advanced: true,
            ..EndSequence::default()
        });
        let d = store.add_end_sequence(EndSequence {
            end_type: EndType::Pic,
            pic_name: "VICTORY".to_string(),
            advanced: true,
            ..EndSequence::default()
        });
        assert_ne!(c, d);
    }

    #[test]
    fn test_map_target_wire_encoding() {
        let lit = MapTarget::literal("MAP02");
        let wire = lit.to_wire8();
        assert_eq!(&wire[..5], b"MAP02");
        assert_eq!(MapTarget::from_wire8(&wire), lit);

        let seq = MapTarget::EndSequence(3);
        let wire = seq.to_wire8();
        assert_eq!(&wire[..6], END_SEQUENCE_TAG);
        assert_eq!(MapTarget::from_wire8(&wire), seq);

        assert_eq!(MapTarget::from_wire8(&[0u8; 8]), MapTarget::None);
    }

    #[test]
    fn test_cluster_auto_create_hub_only_in_legacy_mode() {
        let mut store = MapInfoStore::new();
        let i = store.find_or_create_cluster(5, true);
        assert!(store.clusters[i].is_hub());
        let j = store.find_or_create_cluster(6, false);
        assert!(!store.clusters[j].is_hub());
        // existing cluster is returned unchanged
        assert_eq!(store.find_or_create_cluster(5, false), i);
    }

    #[test]
    fn test_warp_trans_lookup() {
        let mut store = MapInfoStore::new();
        let mut a = LevelInfo::default();
        a.map_name = "MAP09".to_string();
        a.warp_trans = 5;
        store.put_level(a);

        assert_eq!(store.check_warp_trans_map("&wt@05", true).unwrap(), "MAP09");
        assert_eq!(store.check_warp_trans_map("&wt@77", true).unwrap(), "MAP77");
        assert!(store.check_warp_trans_map("MAP01", true).is_none());
    }

    #[test]
    fn test_display_name_lookup_strips_header() {
        let mut strings = HashMap::new();
        strings.insert("HUSTR_1".to_string(), "1: Entry Way".to_string());

        let mut info = LevelInfo::default();
        info.map_name = "MAP01".to_string();
        info.display_name = "HUSTR_1".to_string();
        info.flags |= LevelFlags::LOOKUP_LEVEL_NAME;
        assert_eq!(info.lookup_display_name(&strings), "Entry Way");

        // No lookup flag: name passes through untouched.
        info.flags.remove(LevelFlags::LOOKUP_LEVEL_NAME);
        assert_eq!(info.lookup_display_name(&strings), "HUSTR_1");
    }
}
