// mapinfo.rs — MAPINFO lump parser
//
// Builds the descriptor store from the declarative MAPINFO text format.
// Map and cluster bodies are keyword-delimited; a body ends at the next
// top-level keyword. Braces appear only in endgame blocks and in
// extension blocks hanging off unknown keywords.
//
// Keys dispatch through a typed handler table. Field access goes through
// fn-pointer accessors so one match arm serves every key of a type.

use myzd_common::console::con_printf;
use myzd_common::sc_man::{is_num, upper_copy, ParseError, Scanner};

use crate::episode::{EpisodeInfo, MAX_EPISODES};
use crate::game::GameError;
use crate::level_info::{
    ClusterFlags, ClusterInfo, CompatFlags, EndSequence, EndType, GameInfo, GameType, LevelFlags,
    LevelInfo, MapInfoStore, MapTarget, SpecialAction,
};
use crate::skill::SkillInfo;
use crate::world::{LevelSetup, TextureLookup};
use myzd_common::TICRATE;

// ============================================================
// Handler table
// ============================================================

type IntAcc = for<'r> fn(&'r mut LevelInfo) -> &'r mut i32;
type FloatAcc = for<'r> fn(&'r mut LevelInfo) -> &'r mut f32;
type StrAcc = for<'r> fn(&'r mut LevelInfo) -> &'r mut String;
type ColorAcc = for<'r> fn(&'r mut LevelInfo) -> &'r mut u32;
type LightAcc = for<'r> fn(&'r mut LevelInfo) -> &'r mut i8;
type MapAcc = for<'r> fn(&'r mut LevelInfo) -> &'r mut MapTarget;

#[derive(Clone, Copy)]
enum MapKey {
    /// Swallow one token.
    EatNext,
    Ignore,
    Int(IntAcc),
    Float(FloatAcc),
    /// Bare hex token, e.g. CD id.
    Hex(IntAcc),
    Color(ColorAcc),
    /// Map routing target; understands end-sequence shorthands.
    MapName(MapAcc),
    /// Uppercased, truncated to 8 characters.
    LumpName(StrAcc),
    String(StrAcc),
    /// Texture name plus scroll speed.
    Sky(StrAcc, FloatAcc),
    SetFlag(LevelFlags),
    ClearFlag(LevelFlags),
    /// flags = (flags & !clear) | set
    ScFlags(LevelFlags, LevelFlags),
    Cluster,
    /// "name:order" music reference.
    Music(StrAcc, IntAcc),
    /// Halved and clamped to a signed byte.
    RelLight(LightAcc),
    /// evenlighting: zero both wall shades.
    ClearLights,
    Redirect,
    SpecialAction,
    CompatFlag(CompatFlags),
}

const HEXEN_LEVEL_FLAGS: LevelFlags = LevelFlags::NO_INTERMISSION
    .union(LevelFlags::SNDSEQ_TOTAL_CTRL)
    .union(LevelFlags::FALLDMG_HX)
    .union(LevelFlags::ACT_OWN_SPECIAL)
    .union(LevelFlags::MISSILES_ACTIVATE_IMPACT)
    .union(LevelFlags::INFINITE_FLIGHT)
    .union(LevelFlags::MONSTER_FALLING_DAMAGE)
    .union(LevelFlags::LEGACY_NUM_MODE);

const FALLDMG_BOTH: LevelFlags = LevelFlags::FALLDMG_ZD.union(LevelFlags::FALLDMG_HX);
const INFIGHT_BOTH: LevelFlags = LevelFlags::NO_INFIGHTING.union(LevelFlags::TOTAL_INFIGHTING);
const FREELOOK_BOTH: LevelFlags = LevelFlags::FREELOOK_YES.union(LevelFlags::FREELOOK_NO);
const TEAMPLAY_BOTH: LevelFlags =
    LevelFlags::FORCE_TEAMPLAY_ON.union(LevelFlags::FORCE_TEAMPLAY_OFF);
const LAX_BOTH: LevelFlags =
    LevelFlags::LAX_MONSTER_ACTIVATION.union(LevelFlags::LAX_ACTIVATION_MAPINFO);

static MAP_KEYWORDS: &[(&str, MapKey)] = &[
    ("levelnum", MapKey::Int(|i: &mut LevelInfo| &mut i.level_num)),
    ("next", MapKey::MapName(|i: &mut LevelInfo| &mut i.next_map)),
    ("secretnext", MapKey::MapName(|i: &mut LevelInfo| &mut i.secret_map)),
    ("cluster", MapKey::Cluster),
    ("sky1", MapKey::Sky(
        |i: &mut LevelInfo| &mut i.sky_pic1,
        |i: &mut LevelInfo| &mut i.sky_speed1,
    )),
    ("sky2", MapKey::Sky(
        |i: &mut LevelInfo| &mut i.sky_pic2,
        |i: &mut LevelInfo| &mut i.sky_speed2,
    )),
    ("fade", MapKey::Color(|i: &mut LevelInfo| &mut i.fade_to)),
    ("outsidefog", MapKey::Color(|i: &mut LevelInfo| &mut i.outside_fog)),
    ("titlepatch", MapKey::LumpName(|i: &mut LevelInfo| &mut i.title_patch)),
    ("par", MapKey::Int(|i: &mut LevelInfo| &mut i.par_time)),
    ("sucktime", MapKey::Int(|i: &mut LevelInfo| &mut i.suck_time)),
    ("music", MapKey::Music(
        |i: &mut LevelInfo| &mut i.music,
        |i: &mut LevelInfo| &mut i.music_order,
    )),
    ("nointermission", MapKey::SetFlag(LevelFlags::NO_INTERMISSION)),
    ("intermission", MapKey::ClearFlag(LevelFlags::NO_INTERMISSION)),
    ("doublesky", MapKey::SetFlag(LevelFlags::DOUBLE_SKY)),
    ("nosoundclipping", MapKey::Ignore),
    ("allowmonstertelefrags", MapKey::SetFlag(LevelFlags::MONSTERS_TELEFRAG)),
    ("map07special", MapKey::SetFlag(LevelFlags::MAP07_SPECIAL)),
    ("baronspecial", MapKey::SetFlag(LevelFlags::BRUISER_SPECIAL)),
    ("cyberdemonspecial", MapKey::SetFlag(LevelFlags::CYBORG_SPECIAL)),
    ("spidermastermindspecial", MapKey::SetFlag(LevelFlags::SPIDER_SPECIAL)),
    ("minotaurspecial", MapKey::SetFlag(LevelFlags::MINOTAUR_SPECIAL)),
    ("dsparilspecial", MapKey::SetFlag(LevelFlags::SORCERER2_SPECIAL)),
    ("ironlichspecial", MapKey::SetFlag(LevelFlags::HEAD_SPECIAL)),
    ("specialaction_exitlevel", MapKey::ScFlags(
        LevelFlags::empty(),
        LevelFlags::SPEC_ACTIONS_MASK,
    )),
    ("specialaction_opendoor", MapKey::ScFlags(
        LevelFlags::SPEC_OPEN_DOOR,
        LevelFlags::SPEC_ACTIONS_MASK,
    )),
    ("specialaction_lowerfloor", MapKey::ScFlags(
        LevelFlags::SPEC_LOWER_FLOOR,
        LevelFlags::SPEC_ACTIONS_MASK,
    )),
    ("specialaction_killmonsters", MapKey::SetFlag(LevelFlags::SPEC_KILL_MONSTERS)),
    ("lightning", MapKey::SetFlag(LevelFlags::START_LIGHTNING)),
    ("fadetable", MapKey::LumpName(|i: &mut LevelInfo| &mut i.fade_table)),
    ("evenlighting", MapKey::ClearLights),
    ("noautosequences", MapKey::SetFlag(LevelFlags::SNDSEQ_TOTAL_CTRL)),
    ("forcenoskystretch", MapKey::SetFlag(LevelFlags::FORCE_NO_SKY_STRETCH)),
    ("allowfreelook", MapKey::ScFlags(LevelFlags::FREELOOK_YES, FREELOOK_BOTH)),
    ("nofreelook", MapKey::ScFlags(LevelFlags::FREELOOK_NO, FREELOOK_BOTH)),
    ("allowjump", MapKey::ClearFlag(LevelFlags::JUMP_NO)),
    ("nojump", MapKey::SetFlag(LevelFlags::JUMP_NO)),
    ("fallingdamage", MapKey::ScFlags(LevelFlags::FALLDMG_HX, FALLDMG_BOTH)),
    ("oldfallingdamage", MapKey::ScFlags(LevelFlags::FALLDMG_ZD, FALLDMG_BOTH)),
    ("forcefallingdamage", MapKey::ScFlags(LevelFlags::FALLDMG_ZD, FALLDMG_BOTH)),
    ("strifefallingdamage", MapKey::SetFlag(FALLDMG_BOTH)),
    ("nofallingdamage", MapKey::ScFlags(LevelFlags::empty(), FALLDMG_BOTH)),
    ("noallies", MapKey::SetFlag(LevelFlags::NO_ALLIES)),
    ("cdtrack", MapKey::Int(|i: &mut LevelInfo| &mut i.cd_track)),
    ("cdid", MapKey::Hex(|i: &mut LevelInfo| &mut i.cd_id)),
    ("cd_start_track", MapKey::EatNext),
    ("cd_end1_track", MapKey::EatNext),
    ("cd_end2_track", MapKey::EatNext),
    ("cd_end3_track", MapKey::EatNext),
    ("cd_intermission_track", MapKey::EatNext),
    ("cd_title_track", MapKey::EatNext),
    ("warptrans", MapKey::Int(|i: &mut LevelInfo| &mut i.warp_trans)),
    ("vertwallshade", MapKey::RelLight(|i: &mut LevelInfo| &mut i.wall_vert_light)),
    ("horizwallshade", MapKey::RelLight(|i: &mut LevelInfo| &mut i.wall_horiz_light)),
    ("gravity", MapKey::Float(|i: &mut LevelInfo| &mut i.gravity)),
    ("aircontrol", MapKey::Float(|i: &mut LevelInfo| &mut i.air_control)),
    ("filterstarts", MapKey::SetFlag(LevelFlags::FILTER_STARTS)),
    ("activateowndeathspecials", MapKey::SetFlag(LevelFlags::ACT_OWN_SPECIAL)),
    ("killeractivatesdeathspecials", MapKey::ClearFlag(LevelFlags::ACT_OWN_SPECIAL)),
    ("missilesactivateimpactlines", MapKey::SetFlag(LevelFlags::MISSILES_ACTIVATE_IMPACT)),
    ("missileshootersactivetimpactlines", MapKey::ClearFlag(LevelFlags::MISSILES_ACTIVATE_IMPACT)),
    ("noinventorybar", MapKey::SetFlag(LevelFlags::NO_INVENTORY_BAR)),
    ("deathslideshow", MapKey::SetFlag(LevelFlags::DEATH_SLIDESHOW)),
    ("redirect", MapKey::Redirect),
    ("strictmonsteractivation", MapKey::ScFlags(
        LevelFlags::LAX_ACTIVATION_MAPINFO,
        LAX_BOTH,
    )),
    ("laxmonsteractivation", MapKey::SetFlag(LAX_BOTH)),
    ("additive_scrollers", MapKey::CompatFlag(CompatFlags::BOOM_SCROLL)),
    ("interpic", MapKey::String(|i: &mut LevelInfo| &mut i.exit_pic)),
    ("exitpic", MapKey::String(|i: &mut LevelInfo| &mut i.exit_pic)),
    ("enterpic", MapKey::String(|i: &mut LevelInfo| &mut i.enter_pic)),
    ("intermusic", MapKey::Music(
        |i: &mut LevelInfo| &mut i.inter_music,
        |i: &mut LevelInfo| &mut i.inter_music_order,
    )),
    ("airsupply", MapKey::Int(|i: &mut LevelInfo| &mut i.air_supply)),
    ("specialaction", MapKey::SpecialAction),
    ("keepfullinventory", MapKey::SetFlag(LevelFlags::KEEP_FULL_INVENTORY)),
    ("monsterfallingdamage", MapKey::SetFlag(LevelFlags::MONSTER_FALLING_DAMAGE)),
    ("nomonsterfallingdamage", MapKey::ClearFlag(LevelFlags::MONSTER_FALLING_DAMAGE)),
    ("sndseq", MapKey::String(|i: &mut LevelInfo| &mut i.snd_seq)),
    ("sndinfo", MapKey::String(|i: &mut LevelInfo| &mut i.sound_info)),
    ("soundinfo", MapKey::String(|i: &mut LevelInfo| &mut i.sound_info)),
    ("clipmidtextures", MapKey::SetFlag(LevelFlags::CLIP_MIDTEX)),
    ("wrapmidtextures", MapKey::SetFlag(LevelFlags::WRAP_MIDTEX)),
    ("allowcrouch", MapKey::ClearFlag(LevelFlags::CROUCH_NO)),
    ("nocrouch", MapKey::SetFlag(LevelFlags::CROUCH_NO)),
    ("pausemusicinmenus", MapKey::SetFlag(LevelFlags::PAUSE_MUSIC_IN_MENUS)),
    ("compat_shorttex", MapKey::CompatFlag(CompatFlags::SHORTTEX)),
    ("compat_stairs", MapKey::CompatFlag(CompatFlags::STAIR_INDEX)),
    ("compat_limitpain", MapKey::CompatFlag(CompatFlags::LIMIT_PAIN)),
    ("compat_nopassover", MapKey::CompatFlag(CompatFlags::NO_PASS_MOBJ)),
    ("compat_notossdrops", MapKey::CompatFlag(CompatFlags::NO_TOSS_DROPS)),
    ("compat_useblocking", MapKey::CompatFlag(CompatFlags::USE_BLOCKING)),
    ("compat_nodoorlight", MapKey::CompatFlag(CompatFlags::NO_DOOR_LIGHT)),
    ("compat_ravenscroll", MapKey::CompatFlag(CompatFlags::RAVEN_SCROLL)),
    ("compat_soundtarget", MapKey::CompatFlag(CompatFlags::SOUND_TARGET)),
    ("compat_dehhealth", MapKey::CompatFlag(CompatFlags::DEH_HEALTH)),
    ("compat_trace", MapKey::CompatFlag(CompatFlags::TRACE)),
    ("compat_dropoff", MapKey::CompatFlag(CompatFlags::DROPOFF)),
    ("compat_boomscroll", MapKey::CompatFlag(CompatFlags::BOOM_SCROLL)),
    ("compat_invisibility", MapKey::CompatFlag(CompatFlags::INVISIBILITY)),
    ("compat_silent_instant_floors", MapKey::CompatFlag(CompatFlags::SILENT_INSTANT_FLOORS)),
    ("compat_sectorsounds", MapKey::CompatFlag(CompatFlags::SECTOR_SOUNDS)),
    ("bordertexture", MapKey::LumpName(|i: &mut LevelInfo| &mut i.border_texture)),
    ("f1", MapKey::LumpName(|i: &mut LevelInfo| &mut i.f1_pic)),
    ("noinfighting", MapKey::ScFlags(LevelFlags::NO_INFIGHTING, INFIGHT_BOTH)),
    ("normalinfighting", MapKey::ScFlags(LevelFlags::empty(), INFIGHT_BOTH)),
    ("totalinfighting", MapKey::ScFlags(LevelFlags::TOTAL_INFIGHTING, INFIGHT_BOTH)),
    ("infiniteflightpowerup", MapKey::SetFlag(LevelFlags::INFINITE_FLIGHT)),
    ("noinfiniteflightpowerup", MapKey::ClearFlag(LevelFlags::INFINITE_FLIGHT)),
    ("allowrespawn", MapKey::SetFlag(LevelFlags::ALLOW_RESPAWN)),
    ("teamdamage", MapKey::Float(|i: &mut LevelInfo| &mut i.team_damage)),
    ("teamplayon", MapKey::ScFlags(LevelFlags::FORCE_TEAMPLAY_ON, TEAMPLAY_BOTH)),
    ("teamplayoff", MapKey::ScFlags(LevelFlags::FORCE_TEAMPLAY_OFF, TEAMPLAY_BOTH)),
    ("checkswitchrange", MapKey::SetFlag(LevelFlags::CHECK_SWITCH_RANGE)),
    ("nocheckswitchrange", MapKey::ClearFlag(LevelFlags::CHECK_SWITCH_RANGE)),
    ("translator", MapKey::String(|i: &mut LevelInfo| &mut i.translator)),
    ("unfreezesingleplayerconversations", MapKey::SetFlag(LevelFlags::CONV_SINGLE_UNFREEZE)),
    ("nobotnodes", MapKey::Ignore),
];

static TOP_LEVEL: &[&str] = &[
    "map",
    "defaultmap",
    "adddefaultmap",
    "clusterdef",
    "episode",
    "clearepisodes",
    "skill",
    "clearskills",
];

static CLUSTER_KEYWORDS: &[&str] = &[
    "entertext",
    "exittext",
    "music",
    "flat",
    "pic",
    "hub",
    "cdtrack",
    "cdid",
    "entertextislump",
    "exittextislump",
    "name",
];

/// Line specials a specialaction may invoke, by name.
static LINE_SPECIALS: &[(&str, i32)] = &[
    ("Door_Close", 10),
    ("Door_Open", 11),
    ("Door_Raise", 12),
    ("Floor_LowerByValue", 20),
    ("Floor_LowerToLowest", 21),
    ("Floor_LowerToNearest", 22),
    ("Floor_RaiseByValue", 23),
    ("Floor_RaiseToHighest", 24),
    ("Floor_RaiseToNearest", 25),
    ("Teleport_NewMap", 74),
    ("ACS_Execute", 80),
    ("ACS_ExecuteAlways", 226),
    ("Light_ChangeToValue", 112),
    ("Floor_LowerToHighest", 242),
    ("Exit_Normal", 243),
    ("Exit_Secret", 244),
];

fn find_line_special(name: &str) -> Option<i32> {
    LINE_SPECIALS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, num)| num)
}

// ============================================================
// Parser
// ============================================================

/// Handler registered for an unknown map-block keyword. Called with the
/// scanner positioned just past the opening brace; must consume through
/// the closing brace.
pub type OptionalHandler =
    Box<dyn FnMut(&mut Scanner, &mut LevelInfo) -> Result<(), ParseError>>;

pub struct MapInfoParser<'a> {
    store: &'a mut MapInfoStore,
    game: &'a GameInfo,
    texture_check: Option<&'a dyn TextureLookup>,
    map_check: Option<&'a dyn LevelSetup>,
    template: LevelInfo,
    /// Set for the remainder of a chunk once a numeric map name is seen.
    hexen_mode: bool,
    cleared_episodes: bool,
    cleared_skills: bool,
    extensions: Vec<(String, OptionalHandler)>,
}

impl<'a> MapInfoParser<'a> {
    pub fn new(store: &'a mut MapInfoStore, game: &'a GameInfo) -> Self {
        let template = fresh_template(game);
        Self {
            store,
            game,
            texture_check: None,
            map_check: None,
            template,
            hexen_mode: false,
            cleared_episodes: false,
            cleared_skills: false,
            extensions: Vec::new(),
        }
    }

    /// Validate title patches against real textures.
    pub fn set_texture_check(&mut self, lookup: &'a dyn TextureLookup) {
        self.texture_check = Some(lookup);
    }

    /// Drop optional episodes whose map data is missing.
    pub fn set_map_check(&mut self, setup: &'a dyn LevelSetup) {
        self.map_check = Some(setup);
    }

    /// Register a handler for a keyword the core table does not know.
    /// Consulted before the skip-unknown-block fallback.
    pub fn register_extension(&mut self, keyword: &str, handler: OptionalHandler) {
        self.extensions.push((keyword.to_string(), handler));
    }

    /// Parse one MAPINFO chunk. The default template and legacy mode are
    /// per chunk.
    pub fn parse_chunk(&mut self, source: &str, text: &str) -> Result<(), ParseError> {
        self.template = fresh_template(self.game);
        self.hexen_mode = false;

        let mut sc = Scanner::new(source, text);
        while sc.get_string() {
            match sc.must_match_string(TOP_LEVEL)? {
                0 => self.parse_map(&mut sc)?,
                1 => {
                    self.template = fresh_template(self.game);
                    let mut template = std::mem::take(&mut self.template);
                    self.parse_map_block(&mut sc, &mut template)?;
                    self.template = template;
                }
                2 => {
                    let mut template = std::mem::take(&mut self.template);
                    self.parse_map_block(&mut sc, &mut template)?;
                    self.template = template;
                }
                3 => self.parse_cluster(&mut sc)?,
                4 => self.parse_episode(&mut sc)?,
                5 => {
                    self.store.clear_episodes();
                    self.cleared_episodes = true;
                }
                6 => self.parse_skill(&mut sc)?,
                7 => {
                    self.store.skills.clear();
                    self.cleared_skills = true;
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }

    /// Checks run after every chunk has been parsed. Clearing episodes
    /// or skills without redefining any is fatal.
    pub fn finish(self) -> Result<(), GameError> {
        if self.cleared_episodes && self.store.episodes.is_empty() {
            return Err(GameError::Fatal(
                "you cannot use clearepisodes in a MAPINFO if you do not define any new episodes after it"
                    .to_string(),
            ));
        }
        if self.cleared_skills && self.store.skills.is_empty() {
            return Err(GameError::Fatal(
                "you cannot use clearskills in a MAPINFO if you do not define any new skills after it"
                    .to_string(),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // map <name> <nice name>
    // ------------------------------------------------------------

    fn parse_map(&mut self, sc: &mut Scanner) -> Result<(), ParseError> {
        sc.must_get_string()?;
        let mut info = self.template.clone();

        let map_name = if is_num(&sc.string) {
            // A numeric map name means a Hexen-style lump. Those maps
            // are nointermission, use total sound sequence control,
            // Hexen falling damage, and self-activated death specials.
            let mapnum: i32 = sc.string.parse().unwrap_or(0);
            self.hexen_mode = true;
            info.flags |= HEXEN_LEVEL_FLAGS;
            // Hexen maps light walls evenly regardless of orientation.
            info.wall_vert_light = 0;
            info.wall_horiz_light = 0;
            format!("MAP{:02}", mapnum)
        } else {
            upper_copy(&sc.string)
        };
        info.map_name = map_name;

        sc.must_get_string()?;
        if let Some(tag) = sc.string.strip_prefix('$') {
            info.flags |= LevelFlags::LOOKUP_LEVEL_NAME;
            info.display_name = tag.to_string();
        } else if sc.compare("lookup") {
            info.flags |= LevelFlags::LOOKUP_LEVEL_NAME;
            sc.must_get_string()?;
            info.display_name = sc.string.clone();
        } else {
            info.display_name = sc.string.clone();
        }

        // Derive a levelnum from standard names so Teleport_NewMap works
        // without an explicit one.
        if let Some(num) = derive_level_num(&info.map_name) {
            info.level_num = num;
        }

        self.parse_map_block(sc, &mut info)?;

        if info.sky_pic2 == "-NOFLAT-" {
            info.sky_pic2 = info.sky_pic1.clone();
        }
        if !info.title_patch.is_empty() {
            if let Some(lookup) = self.texture_check {
                if !lookup.texture_exists(&info.title_patch) {
                    info.title_patch.clear();
                }
            }
        }

        let num = info.level_num;
        let index = self.store.put_level(info);
        self.store.set_level_num(index, num);
        Ok(())
    }

    fn parse_map_block(
        &mut self,
        sc: &mut Scanner,
        info: &mut LevelInfo,
    ) -> Result<(), ParseError> {
        let mut flags = info.flags;

        while sc.get_string() {
            if sc.match_string(TOP_LEVEL).is_some() {
                sc.un_get();
                break;
            }
            let entry = MAP_KEYWORDS.iter().find(|(k, _)| sc.compare(k));
            let Some(&(_, key)) = entry else {
                let keyword = sc.string.clone();
                sc.must_get_string()?;
                if sc.compare("{") {
                    self.parse_optional_block(&keyword, sc, info)?;
                    continue;
                }
                return Err(sc.script_error(&format!("unknown keyword '{}'", keyword)));
            };

            match key {
                MapKey::EatNext => {
                    sc.must_get_string()?;
                }
                MapKey::Ignore => {}
                MapKey::Int(field) => {
                    sc.must_get_number()?;
                    *field(info) = sc.number;
                }
                MapKey::Float(field) => {
                    sc.must_get_float()?;
                    *field(info) = sc.float;
                }
                MapKey::Hex(field) => {
                    sc.must_get_string()?;
                    *field(info) = u32::from_str_radix(&sc.string, 16).unwrap_or(0) as i32;
                }
                MapKey::Color(field) => {
                    sc.must_get_string()?;
                    *field(info) = parse_color(sc)?;
                }
                MapKey::MapName(field) => {
                    *field(info) = self.parse_map_name(sc)?;
                }
                MapKey::LumpName(field) => {
                    sc.must_get_string()?;
                    *field(info) = upper_copy(&sc.string);
                }
                MapKey::String(field) => {
                    sc.must_get_string()?;
                    *field(info) = sc.string.clone();
                }
                MapKey::Sky(pic, speed) => {
                    sc.must_get_string()?;
                    *pic(info) = upper_copy(&sc.string);
                    sc.must_get_float()?;
                    let mut raw = sc.float;
                    if self.hexen_mode {
                        raw /= 256.0;
                    }
                    // Speed is given in pixels per tic; store pixels per
                    // millisecond.
                    *speed(info) = raw * 35.0 / 1000.0;
                }
                MapKey::SetFlag(bits) => {
                    flags |= bits;
                }
                MapKey::ClearFlag(bits) => {
                    flags &= !bits;
                }
                MapKey::ScFlags(set, clear) => {
                    flags = (flags & !clear) | set;
                }
                MapKey::Cluster => {
                    sc.must_get_number()?;
                    info.cluster = sc.number;
                    // Auto-create clusters referenced before definition.
                    // Hexen has no clusterdefs at all; without this every
                    // one of its levels would land on the same hub.
                    self.store.find_or_create_cluster(sc.number, self.hexen_mode);
                }
                MapKey::Music(name, order) => {
                    let (music, ord) = parse_music(sc)?;
                    *name(info) = music;
                    *order(info) = ord;
                    // Keep the CD $MAP command from overriding this.
                    flags |= LevelFlags::MUSIC_DEFINED;
                }
                MapKey::RelLight(field) => {
                    sc.must_get_number()?;
                    *field(info) = (sc.number / 2).clamp(-128, 127) as i8;
                }
                MapKey::ClearLights => {
                    info.wall_vert_light = 0;
                    info.wall_horiz_light = 0;
                }
                MapKey::Redirect => {
                    sc.must_get_string()?;
                    info.redirect_type = sc.string.clone();
                    info.redirect_map = self.parse_map_name(sc)?;
                }
                MapKey::SpecialAction => {
                    info.special_actions.push(parse_special_action(sc)?);
                }
                MapKey::CompatFlag(bits) => {
                    let value = if sc.check_number() { sc.number } else { 1 };
                    if value != 0 {
                        info.compat_flags |= bits;
                    } else {
                        info.compat_flags &= !bits;
                    }
                    info.compat_mask |= bits;
                }
            }
        }

        info.flags = flags;
        Ok(())
    }

    fn parse_optional_block(
        &mut self,
        keyword: &str,
        sc: &mut Scanner,
        info: &mut LevelInfo,
    ) -> Result<(), ParseError> {
        if let Some(index) = self
            .extensions
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(keyword))
        {
            return (self.extensions[index].1)(sc, info);
        }
        con_printf(&format!("skipping unknown MAPINFO block '{}'\n", keyword));
        let mut depth = 0;
        while sc.get_string() {
            if sc.compare("{") {
                depth += 1;
            } else if sc.compare("}") {
                depth -= 1;
                if depth < 0 {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // Routing targets and end sequences
    // ------------------------------------------------------------

    fn parse_map_name(&mut self, sc: &mut Scanner) -> Result<MapTarget, ParseError> {
        sc.must_get_string()?;

        let name = if is_num(&sc.string) {
            let mapnum: i32 = sc.string.parse().unwrap_or(0);
            if self.hexen_mode {
                // Hexen map transitions go through the warp table.
                format!("&wt@{:02}", mapnum)
            } else {
                format!("MAP{:02}", mapnum)
            }
        } else {
            sc.string.clone()
        };

        let mut seq = EndSequence {
            music_looping: true,
            ..EndSequence::default()
        };
        let use_seq = if name.eq_ignore_ascii_case("endgame") {
            seq.advanced = true;
            seq.end_type = EndType::Pic1;
            self.parse_end_game_block(sc, &mut seq)?;
            true
        } else if name.len() == 8 && name[..7].eq_ignore_ascii_case("endgame") {
            seq.end_type = match name.as_bytes()[7].to_ascii_uppercase() {
                b'1' => EndType::Pic1,
                b'2' => EndType::Pic2,
                b'3' => EndType::Bunny,
                b'C' => EndType::Cast,
                b'W' => EndType::Underwater,
                b'S' => EndType::Strife,
                _ => EndType::Pic3,
            };
            true
        } else if name.eq_ignore_ascii_case("endpic") {
            sc.must_get_string()?;
            seq.end_type = EndType::Pic;
            seq.pic_name = sc.string.clone();
            true
        } else if name.eq_ignore_ascii_case("endbunny") {
            seq.end_type = EndType::Bunny;
            true
        } else if name.eq_ignore_ascii_case("endcast") {
            seq.end_type = EndType::Cast;
            true
        } else if name.eq_ignore_ascii_case("enddemon") {
            seq.end_type = EndType::Demon;
            true
        } else if name.eq_ignore_ascii_case("endchess") {
            seq.end_type = EndType::Chess;
            true
        } else if name.eq_ignore_ascii_case("endunderwater") {
            seq.end_type = EndType::Underwater;
            true
        } else if name.eq_ignore_ascii_case("endbuystrife") {
            seq.end_type = EndType::BuyStrife;
            true
        } else {
            false
        };

        if use_seq {
            let index = self.store.add_end_sequence(seq);
            Ok(MapTarget::EndSequence(index))
        } else {
            Ok(MapTarget::literal(&name))
        }
    }

    fn parse_end_game_block(
        &mut self,
        sc: &mut Scanner,
        seq: &mut EndSequence,
    ) -> Result<(), ParseError> {
        sc.must_get_string_name("{")?;
        while !sc.check_string("}") {
            sc.must_get_string()?;
            if sc.compare("pic") {
                sc.must_get_string()?;
                seq.end_type = EndType::Pic;
                seq.pic_name = sc.string.clone();
            } else if sc.compare("hscroll") {
                seq.end_type = EndType::Bunny;
                sc.must_get_string()?;
                seq.pic_name = sc.string.clone();
                sc.must_get_string()?;
                seq.pic_name2 = sc.string.clone();
                if sc.check_number() {
                    seq.play_the_end = sc.number != 0;
                }
            } else if sc.compare("vscroll") {
                seq.end_type = EndType::Demon;
                sc.must_get_string()?;
                seq.pic_name = sc.string.clone();
                sc.must_get_string()?;
                seq.pic_name2 = sc.string.clone();
            } else if sc.compare("cast") {
                seq.end_type = EndType::Cast;
            } else if sc.compare("music") {
                sc.must_get_string()?;
                seq.music = sc.string.clone();
                if sc.check_number() {
                    seq.music_looping = sc.number != 0;
                }
            } else {
                return Err(sc.script_error(&format!(
                    "unknown endgame property '{}'",
                    sc.string
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // clusterdef <clusternum>
    // ------------------------------------------------------------

    fn parse_cluster(&mut self, sc: &mut Scanner) -> Result<(), ParseError> {
        sc.must_get_number()?;
        let mut cinfo = ClusterInfo {
            cluster: sc.number,
            ..ClusterInfo::default()
        };
        let mut flags = ClusterFlags::empty();

        while sc.get_string() {
            if sc.match_string(TOP_LEVEL).is_some() {
                sc.un_get();
                break;
            }
            match sc.must_match_string(CLUSTER_KEYWORDS)? {
                0 => {
                    let (text, lookup) = parse_lookup_string(sc)?;
                    cinfo.enter_text = text;
                    if lookup {
                        flags |= ClusterFlags::LOOKUP_ENTERTEXT;
                    }
                }
                1 => {
                    let (text, lookup) = parse_lookup_string(sc)?;
                    cinfo.exit_text = text;
                    if lookup {
                        flags |= ClusterFlags::LOOKUP_EXITTEXT;
                    }
                }
                2 => {
                    let (music, order) = parse_music(sc)?;
                    cinfo.message_music = music;
                    cinfo.music_order = order;
                }
                3 => {
                    sc.must_get_string()?;
                    cinfo.finale_flat = upper_copy(&sc.string);
                }
                4 => {
                    sc.must_get_string()?;
                    cinfo.finale_flat = upper_copy(&sc.string);
                    flags |= ClusterFlags::FINALE_PIC;
                }
                5 => flags |= ClusterFlags::HUB,
                6 => {
                    sc.must_get_number()?;
                    cinfo.cd_track = sc.number;
                }
                7 => {
                    sc.must_get_string()?;
                    cinfo.cd_id = u32::from_str_radix(&sc.string, 16).unwrap_or(0) as i32;
                }
                8 => flags |= ClusterFlags::ENTERTEXT_IN_LUMP,
                9 => flags |= ClusterFlags::EXITTEXT_IN_LUMP,
                10 => {
                    let (text, lookup) = parse_lookup_string(sc)?;
                    cinfo.cluster_name = text;
                    if lookup {
                        flags |= ClusterFlags::LOOKUP_NAME;
                    }
                }
                _ => unreachable!(),
            }
        }

        cinfo.flags = flags;
        match self.store.find_cluster_index(cinfo.cluster) {
            Some(i) => self.store.clusters[i] = cinfo,
            None => self.store.clusters.push(cinfo),
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // episode <start-map> [teaser <map>]
    // ------------------------------------------------------------

    fn parse_episode(&mut self, sc: &mut Scanner) -> Result<(), ParseError> {
        sc.must_get_string()?;
        let mut map = upper_copy(&sc.string);

        let mut name = String::new();
        let mut pic_name = String::new();
        let mut remove = false;
        let mut shortcut = 0u8;
        let mut no_skill = false;
        let mut optional = false;

        sc.must_get_string()?;
        if sc.compare("teaser") {
            sc.must_get_string()?;
            if self.game.shareware {
                map = upper_copy(&sc.string);
            }
            sc.must_get_string()?;
        }
        loop {
            if sc.compare("optional") {
                optional = true;
            } else if sc.compare("name") {
                sc.must_get_string()?;
                name = sc.string.clone();
                pic_name.clear();
            } else if sc.compare("picname") {
                sc.must_get_string()?;
                pic_name = sc.string.clone();
                name.clear();
            } else if sc.compare("remove") {
                remove = true;
            } else if sc.compare("key") {
                sc.must_get_string()?;
                shortcut = sc.string.bytes().next().unwrap_or(0).to_ascii_lowercase();
            } else if sc.compare("noskillmenu") {
                no_skill = true;
            } else {
                sc.un_get();
                break;
            }
            if !sc.get_string() {
                break;
            }
        }

        if optional && !remove {
            if let Some(setup) = self.map_check {
                if !setup.check_map_data(&map) {
                    // Optional episode for a map that is not there;
                    // silently drop the definition.
                    return Ok(());
                }
            }
        }

        let existing = self.store.episodes.iter().position(|e| e.map == map);
        if remove {
            if let Some(i) = existing {
                self.store.episodes.remove(i);
            }
            return Ok(());
        }

        if name.is_empty() && pic_name.is_empty() {
            name = map.clone();
        }
        let episode = EpisodeInfo {
            map,
            name,
            pic_name,
            shortcut,
            no_skill_menu: no_skill,
        };
        match existing {
            Some(i) => self.store.episodes[i] = episode,
            None if self.store.episodes.len() < MAX_EPISODES => {
                self.store.episodes.push(episode)
            }
            None => {
                // Menu is full; the last slot gets replaced.
                *self.store.episodes.last_mut().unwrap() = episode;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // skill <name>
    // ------------------------------------------------------------

    fn parse_skill(&mut self, sc: &mut Scanner) -> Result<(), ParseError> {
        sc.must_get_string()?;
        let mut skill = SkillInfo::new(&sc.string);
        skill.acs_return = self.store.skills.len() as i32;

        while sc.get_string() {
            if sc.compare("ammofactor") {
                sc.must_get_float()?;
                skill.ammo_factor = sc.float;
            } else if sc.compare("doubleammofactor") {
                sc.must_get_float()?;
                skill.double_ammo_factor = sc.float;
            } else if sc.compare("damagefactor") {
                sc.must_get_float()?;
                skill.damage_factor = sc.float;
            } else if sc.compare("fastmonsters") {
                skill.fast_monsters = true;
            } else if sc.compare("disablecheats") {
                skill.disable_cheats = true;
            } else if sc.compare("easybossbrain") {
                skill.easy_boss_brain = true;
            } else if sc.compare("autousehealth") {
                skill.auto_use_health = true;
            } else if sc.compare("respawntime") {
                sc.must_get_float()?;
                skill.respawn_counter = (sc.float * TICRATE as f32) as i32;
            } else if sc.compare("respawnlimit") {
                sc.must_get_number()?;
                skill.respawn_limit = sc.number;
            } else if sc.compare("aggressiveness") {
                sc.must_get_float()?;
                skill.aggressiveness = 1.0 - sc.float.clamp(0.0, 1.0);
            } else if sc.compare("spawnfilter") {
                if sc.check_number() {
                    if sc.number > 0 && sc.number <= 30 {
                        skill.spawn_filter |= 1 << (sc.number - 1);
                    }
                } else {
                    sc.must_get_string()?;
                    if sc.compare("baby") {
                        skill.spawn_filter |= 1;
                    } else if sc.compare("easy") {
                        skill.spawn_filter |= 2;
                    } else if sc.compare("normal") {
                        skill.spawn_filter |= 4;
                    } else if sc.compare("hard") {
                        skill.spawn_filter |= 8;
                    } else if sc.compare("nightmare") {
                        skill.spawn_filter |= 16;
                    }
                }
            } else if sc.compare("acsreturn") {
                sc.must_get_number()?;
                skill.acs_return = sc.number;
            } else if sc.compare("name") {
                sc.must_get_string()?;
                skill.menu_name = sc.string.clone();
                skill.pic_name.clear();
            } else if sc.compare("playerclassname") {
                sc.must_get_string()?;
                let class = sc.string.clone();
                sc.must_get_string()?;
                skill
                    .menu_names_for_player_class
                    .insert(class, sc.string.clone());
            } else if sc.compare("picname") {
                sc.must_get_string()?;
                skill.pic_name = sc.string.clone();
                skill.menu_name.clear();
            } else if sc.compare("mustconfirm") {
                skill.must_confirm = true;
                if sc.get_string() {
                    if sc.quoted {
                        skill.must_confirm_text = sc.string.clone();
                    } else {
                        sc.un_get();
                    }
                }
            } else if sc.compare("key") {
                sc.must_get_string()?;
                skill.shortcut = sc.string.bytes().next().unwrap_or(0).to_ascii_lowercase();
            } else if sc.compare("textcolor") {
                sc.must_get_string()?;
                skill.text_color = format!("[{}]", sc.string);
            } else {
                sc.un_get();
                break;
            }
        }

        match self
            .store
            .skills
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(&skill.name))
        {
            Some(i) => self.store.skills[i] = skill,
            None => self.store.skills.push(skill),
        }
        Ok(())
    }
}

// ============================================================
// Helpers
// ============================================================

fn fresh_template(game: &GameInfo) -> LevelInfo {
    let mut info = LevelInfo {
        outside_fog: 0xff00_0000,
        wall_vert_light: 8,
        wall_horiz_light: -8,
        fade_table: "COLORMAP".to_string(),
        sky_pic1: "-NOFLAT-".to_string(),
        sky_pic2: "-NOFLAT-".to_string(),
        border_texture: game.border_flat.clone(),
        air_supply: 20,
        ..LevelInfo::default()
    };
    if game.game_type != GameType::Hexen {
        // Maps without compiled scripts get this cleared at load time.
        info.flags |= LevelFlags::LAX_MONSTER_ACTIVATION;
    }
    info
}

fn derive_level_num(map_name: &str) -> Option<i32> {
    let bytes = map_name.as_bytes();
    if map_name.len() == 5 && map_name.starts_with("MAP") {
        let num: i32 = map_name[3..].parse().ok()?;
        if (1..=99).contains(&num) {
            return Some(num);
        }
    } else if map_name.len() == 4
        && bytes[0] == b'E'
        && bytes[1].is_ascii_digit()
        && bytes[2] == b'M'
        && bytes[3].is_ascii_digit()
    {
        let episode = (bytes[1] - b'1') as i32;
        let map = (bytes[3] - b'0') as i32;
        return Some(episode * 10 + map);
    }
    None
}

/// "lookup XYZ" or "$XYZ" mark a string-table reference.
fn parse_lookup_string(sc: &mut Scanner) -> Result<(String, bool), ParseError> {
    sc.must_get_string()?;
    if let Some(tag) = sc.string.strip_prefix('$') {
        return Ok((tag.to_string(), true));
    }
    if sc.compare("lookup") {
        sc.must_get_string()?;
        return Ok((sc.string.clone(), true));
    }
    Ok((sc.string.clone(), false))
}

/// Music references may carry a subsong: "name:order".
fn parse_music(sc: &mut Scanner) -> Result<(String, i32), ParseError> {
    sc.must_get_string()?;
    match sc.string.split_once(':') {
        Some((name, order)) => Ok((name.to_string(), order.parse().unwrap_or(0))),
        None => Ok((sc.string.clone(), 0)),
    }
}

/// Colors are "RRGGBB" or "RR GG BB". Bad strings print a warning and
/// come out black, matching the leniency of the original format.
fn parse_color(sc: &Scanner) -> Result<u32, ParseError> {
    let hex: String = sc.string.chars().filter(|c| !c.is_whitespace()).collect();
    if hex.len() == 6 {
        if let Ok(value) = u32::from_str_radix(&hex, 16) {
            return Ok(value);
        }
    }
    con_printf(&format!("bad color value '{}'\n", sc.string));
    Ok(0)
}

/// specialaction "<actor class>", "<special>" [, arg...]
fn parse_special_action(sc: &mut Scanner) -> Result<SpecialAction, ParseError> {
    let mut action = SpecialAction::default();
    sc.set_c_mode(true);
    let result = (|| {
        sc.must_get_string()?;
        action.actor_type = sc.string.clone();
        sc.check_string(",");
        sc.must_get_string()?;
        action.action = find_line_special(&sc.string)
            .ok_or_else(|| sc.script_error(&format!("unknown specialaction '{}'", sc.string)))?;
        let mut arg = 0;
        while arg < 5 && sc.check_string(",") {
            sc.must_get_number()?;
            action.args[arg] = sc.number;
            arg += 1;
        }
        Ok(())
    })();
    sc.set_c_mode(false);
    result.map(|_| action)
}
