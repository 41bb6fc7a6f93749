// episode.rs — episode menu definitions

/// Fixed capacity of the episode menu.
pub const MAX_EPISODES: usize = 8;

/// One entry in the episode selection menu, defined by MAPINFO.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpisodeInfo {
    /// Starting map of the episode.
    pub map: String,
    /// Menu text; empty when a picture is used instead.
    pub name: String,
    /// Menu graphic lump; empty when text is used.
    pub pic_name: String,
    /// Keyboard shortcut character, lowercased. 0 for none.
    pub shortcut: u8,
    /// Skip the skill menu and start on the default skill.
    pub no_skill_menu: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entry_is_blank() {
        let ep = EpisodeInfo::default();
        assert!(ep.map.is_empty());
        assert_eq!(ep.shortcut, 0);
        assert!(!ep.no_skill_menu);
    }
}
