pub mod archive;
pub mod console;
pub mod cvar;
pub mod sc_man;

/// Simulation tics per second. Every time-valued MAPINFO field that is
/// expressed in seconds gets scaled by this at parse time.
pub const TICRATE: i32 = 35;
