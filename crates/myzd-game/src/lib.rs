// myzd-game: MAPINFO-driven level descriptors and the game-state
// machinery that moves play between them.

pub mod ccmds;
pub mod episode;
pub mod game;
pub mod level_info;
pub mod mapinfo;
pub mod skill;
pub mod snapshot;
pub mod transition;
pub mod travel;
pub mod world;
