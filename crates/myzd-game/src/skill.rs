// skill.rs — difficulty definitions and queries
//
// Skills are defined wholesale by MAPINFO; later definitions of the same
// name overwrite the earlier one in place so menu order is stable. All
// gameplay code reads difficulty through skill_property, which folds the
// dmflags overrides into the answer.

use std::collections::HashMap;

use myzd_common::TICRATE;

use crate::game::DmFlags;

/// One difficulty level.
#[derive(Clone, Debug, PartialEq)]
pub struct SkillInfo {
    /// Internal name used by verify_skill and the skill cvar.
    pub name: String,
    pub ammo_factor: f32,
    /// Ammo factor when the double-ammo dmflag is on.
    pub double_ammo_factor: f32,
    pub damage_factor: f32,
    pub fast_monsters: bool,
    pub disable_cheats: bool,
    pub auto_use_health: bool,
    pub easy_boss_brain: bool,
    /// Tics until a killed monster respawns; 0 disables.
    pub respawn_counter: i32,
    /// Maximum respawns per monster; 0 is unlimited.
    pub respawn_limit: i32,
    /// 0.0 is maximally aggressive, 1.0 fully passive.
    pub aggressiveness: f32,
    /// Bit mask matched against thing spawnflags, 1 << (skill - 1).
    pub spawn_filter: i32,
    /// Value ACS GameSkill() reports for this skill.
    pub acs_return: i32,
    pub menu_name: String,
    pub menu_names_for_player_class: HashMap<String, String>,
    pub pic_name: String,
    pub must_confirm: bool,
    pub must_confirm_text: String,
    pub shortcut: u8,
    pub text_color: String,
}

impl SkillInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ammo_factor: 1.0,
            double_ammo_factor: 2.0,
            damage_factor: 1.0,
            fast_monsters: false,
            disable_cheats: false,
            auto_use_health: false,
            easy_boss_brain: false,
            respawn_counter: 0,
            respawn_limit: 0,
            aggressiveness: 1.0,
            spawn_filter: 0,
            acs_return: 0,
            menu_name: String::new(),
            menu_names_for_player_class: HashMap::new(),
            pic_name: String::new(),
            must_confirm: false,
            must_confirm_text: String::new(),
            shortcut: 0,
            text_color: String::new(),
        }
    }
}

/// Questions gameplay code asks about the current difficulty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkillProperty {
    FastMonsters,
    Respawn,
    RespawnLimit,
    DisableCheats,
    AutoUseHealth,
    EasyBossBrain,
    SpawnFilter,
    AcsReturn,
}

/// Integer skill queries. dmflags can force fast monsters and monster
/// respawning regardless of skill.
pub fn skill_property(
    skills: &[SkillInfo],
    skill: usize,
    dmflags: DmFlags,
    prop: SkillProperty,
) -> i32 {
    let fallback;
    let info = match skills.get(skill.min(skills.len().saturating_sub(1))) {
        Some(info) => info,
        // An empty table (clearskills with nothing after it yet)
        // answers with stock difficulty.
        None => {
            fallback = SkillInfo::new("default");
            &fallback
        }
    };
    match prop {
        SkillProperty::FastMonsters => {
            (info.fast_monsters || dmflags.contains(DmFlags::FAST_MONSTERS)) as i32
        }
        SkillProperty::Respawn => {
            if dmflags.contains(DmFlags::MONSTERS_RESPAWN) && info.respawn_counter == 0 {
                TICRATE * 12
            } else {
                info.respawn_counter
            }
        }
        SkillProperty::RespawnLimit => info.respawn_limit,
        SkillProperty::DisableCheats => info.disable_cheats as i32,
        SkillProperty::AutoUseHealth => info.auto_use_health as i32,
        SkillProperty::EasyBossBrain => info.easy_boss_brain as i32,
        SkillProperty::SpawnFilter => info.spawn_filter,
        SkillProperty::AcsReturn => info.acs_return,
    }
}

/// Float skill queries.
pub fn skill_property_float(
    skills: &[SkillInfo],
    skill: usize,
    dmflags: DmFlags,
    prop: SkillFloatProperty,
) -> f32 {
    let fallback;
    let info = match skills.get(skill.min(skills.len().saturating_sub(1))) {
        Some(info) => info,
        None => {
            fallback = SkillInfo::new("default");
            &fallback
        }
    };
    match prop {
        SkillFloatProperty::AmmoFactor => {
            if dmflags.contains(DmFlags::DOUBLE_AMMO) {
                info.double_ammo_factor
            } else {
                info.ammo_factor
            }
        }
        SkillFloatProperty::DamageFactor => info.damage_factor,
        SkillFloatProperty::Aggressiveness => info.aggressiveness,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkillFloatProperty {
    AmmoFactor,
    DamageFactor,
    Aggressiveness,
}

/// Clamp a requested skill index to the defined range.
pub fn verify_skill(skills: &[SkillInfo], requested: i32) -> usize {
    if skills.is_empty() {
        return 0;
    }
    requested.clamp(0, skills.len() as i32 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_skills() -> Vec<SkillInfo> {
        let mut easy = SkillInfo::new("easy");
        easy.ammo_factor = 1.5;
        easy.auto_use_health = true;
        easy.spawn_filter = 1;
        let mut nightmare = SkillInfo::new("nightmare");
        nightmare.fast_monsters = true;
        nightmare.respawn_counter = TICRATE * 16;
        nightmare.disable_cheats = true;
        nightmare.spawn_filter = 16;
        nightmare.acs_return = 4;
        vec![easy, nightmare]
    }

    #[test]
    fn test_skill_property_lookup() {
        let skills = two_skills();
        let none = DmFlags::empty();
        assert_eq!(
            skill_property(&skills, 0, none, SkillProperty::FastMonsters),
            0
        );
        assert_eq!(
            skill_property(&skills, 1, none, SkillProperty::FastMonsters),
            1
        );
        assert_eq!(
            skill_property(&skills, 1, none, SkillProperty::Respawn),
            TICRATE * 16
        );
        assert_eq!(skill_property(&skills, 1, none, SkillProperty::AcsReturn), 4);
    }

    #[test]
    fn test_dmflags_override() {
        let skills = two_skills();
        let flags = DmFlags::FAST_MONSTERS | DmFlags::MONSTERS_RESPAWN;
        assert_eq!(
            skill_property(&skills, 0, flags, SkillProperty::FastMonsters),
            1
        );
        // Respawn dmflag only applies when the skill itself has no counter.
        assert_eq!(
            skill_property(&skills, 0, flags, SkillProperty::Respawn),
            TICRATE * 12
        );
        assert_eq!(
            skill_property(&skills, 1, flags, SkillProperty::Respawn),
            TICRATE * 16
        );
    }

    #[test]
    fn test_ammo_factor_doubles() {
        let skills = two_skills();
        assert_eq!(
            skill_property_float(&skills, 0, DmFlags::empty(), SkillFloatProperty::AmmoFactor),
            1.5
        );
        assert_eq!(
            skill_property_float(&skills, 0, DmFlags::DOUBLE_AMMO, SkillFloatProperty::AmmoFactor),
            2.0
        );
    }

    #[test]
    fn test_empty_skill_table_answers_with_defaults() {
        let none = DmFlags::empty();
        assert_eq!(skill_property(&[], 2, none, SkillProperty::FastMonsters), 0);
        assert_eq!(skill_property(&[], 0, none, SkillProperty::Respawn), 0);
        assert_eq!(
            skill_property(&[], 0, DmFlags::MONSTERS_RESPAWN, SkillProperty::Respawn),
            TICRATE * 12
        );
        assert_eq!(
            skill_property_float(&[], 5, none, SkillFloatProperty::AmmoFactor),
            1.0
        );
        assert_eq!(
            skill_property_float(&[], 5, DmFlags::DOUBLE_AMMO, SkillFloatProperty::AmmoFactor),
            2.0
        );
    }

    #[test]
    fn test_verify_skill_clamps() {
        let skills = two_skills();
        assert_eq!(verify_skill(&skills, -3), 0);
        assert_eq!(verify_skill(&skills, 0), 0);
        assert_eq!(verify_skill(&skills, 99), 1);
        assert_eq!(verify_skill(&[], 2), 0);
    }
}
