// world.rs — actor storage and the collaborator seams
//
// Actors live in a slab indexed by ActorId; all cross-references are
// indices, never pointers. Statnum buckets drive iteration: the travel
// protocol moves pawns between STAT_PLAYER and STAT_TRAVELLING, and
// inventory items ride along in STAT_INVENTORY.

use std::collections::HashMap;

use myzd_common::archive::{ArchiveError, Reader, Writer};

use crate::level_info::DeferredScript;

pub type ActorId = usize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatNum {
    #[default]
    Default,
    Player,
    /// Pawns in transit between hub levels. Not ticked, not linked.
    Travelling,
    Inventory,
}

#[derive(Clone, Debug, Default)]
pub struct Actor {
    pub class: String,
    pub stat: StatNum,
    pub tid: i32,
    pub in_tid_hash: bool,
    /// Linked into the sector and blockmap structures.
    pub linked: bool,
    pub pos: [f32; 3],
    pub vel: [f32; 3],
    pub angle: f32,
    pub pitch: f32,
    pub floor_z: f32,
    pub ceiling_z: f32,
    pub dropoff_z: f32,
    pub floor_sector: i32,
    pub health: i32,
    /// Owning player slot, for pawns.
    pub player: Option<usize>,
    /// Owning actor, for inventory items.
    pub owner: Option<ActorId>,
    /// Carried items, for pawns.
    pub inventory: Vec<ActorId>,
}

impl Actor {
    pub fn pawn(class: &str, player: usize) -> Self {
        Self {
            class: class.to_string(),
            stat: StatNum::Player,
            linked: true,
            health: 100,
            player: Some(player),
            ..Actor::default()
        }
    }
}

/// The live actor set for the current level.
#[derive(Default)]
pub struct World {
    slots: Vec<Option<Actor>>,
    tid_hash: HashMap<i32, Vec<ActorId>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.tid_hash.clear();
    }

    pub fn spawn(&mut self, actor: Actor) -> ActorId {
        let tid = actor.tid;
        let in_hash = actor.in_tid_hash;
        let id = match self.slots.iter().position(|s| s.is_none()) {
            Some(i) => {
                self.slots[i] = Some(actor);
                i
            }
            None => {
                self.slots.push(Some(actor));
                self.slots.len() - 1
            }
        };
        if in_hash && tid != 0 {
            self.tid_hash.entry(tid).or_default().push(id);
        }
        id
    }

    /// Destroy an actor and everything it carries.
    pub fn destroy(&mut self, id: ActorId) {
        let carried = match self.slots.get_mut(id).and_then(|s| s.take()) {
            Some(actor) => {
                if actor.in_tid_hash {
                    self.remove_tid_entry(actor.tid, id);
                }
                actor.inventory
            }
            None => return,
        };
        for item in carried {
            self.destroy(item);
        }
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.slots.get(id).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.slots.get_mut(id).and_then(|s| s.as_mut())
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn ids(&self) -> Vec<ActorId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    pub fn ids_in_stat(&self, stat: StatNum) -> Vec<ActorId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(a) if a.stat == stat => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn change_stat(&mut self, id: ActorId, stat: StatNum) {
        if let Some(actor) = self.get_mut(id) {
            actor.stat = stat;
        }
    }

    /// Tear the level down. Travelling actors survive; everything else
    /// goes away. Slot-by-slot so a travelling pawn's carried items are
    /// not swept up by a recursive destroy.
    pub fn unload_level(&mut self) {
        for id in 0..self.slots.len() {
            let keep = matches!(
                self.slots[id],
                Some(ref a) if a.stat == StatNum::Travelling
            );
            if keep {
                continue;
            }
            if let Some(actor) = self.slots[id].take() {
                if actor.in_tid_hash {
                    self.remove_tid_entry(actor.tid, id);
                }
            }
        }
    }

    // ------------------------------------------------------------
    // TID hash
    // ------------------------------------------------------------

    pub fn insert_tid(&mut self, id: ActorId) {
        let tid = match self.get_mut(id) {
            Some(a) if a.tid != 0 && !a.in_tid_hash => {
                a.in_tid_hash = true;
                a.tid
            }
            _ => return,
        };
        self.tid_hash.entry(tid).or_default().push(id);
    }

    pub fn remove_tid(&mut self, id: ActorId) {
        let tid = match self.get_mut(id) {
            Some(a) if a.in_tid_hash => {
                a.in_tid_hash = false;
                a.tid
            }
            _ => return,
        };
        self.remove_tid_entry(tid, id);
    }

    fn remove_tid_entry(&mut self, tid: i32, id: ActorId) {
        if let Some(list) = self.tid_hash.get_mut(&tid) {
            list.retain(|&a| a != id);
            if list.is_empty() {
                self.tid_hash.remove(&tid);
            }
        }
    }

    pub fn find_by_tid(&self, tid: i32) -> &[ActorId] {
        self.tid_hash.get(&tid).map(|v| v.as_slice()).unwrap_or(&[])
    }

    // ------------------------------------------------------------
    // Blockmap linkage (modeled as a flag)
    // ------------------------------------------------------------

    pub fn unlink(&mut self, id: ActorId) {
        if let Some(actor) = self.get_mut(id) {
            actor.linked = false;
        }
    }

    pub fn link(&mut self, id: ActorId) {
        if let Some(actor) = self.get_mut(id) {
            actor.linked = true;
        }
    }
}

// ============================================================
// Collaborator seams
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptType {
    Open,
    Enter,
    Return,
    Respawn,
    Unloading,
}

/// Script engine hooks the transition controller fires.
pub trait ScriptEngine {
    /// Run every script of the given type. `activator` is the triggering
    /// pawn where one exists.
    fn start_typed_scripts(&mut self, kind: ScriptType, activator: Option<ActorId>);

    /// Append per-module script state to a snapshot.
    fn write_module_states(&self, arc: &mut Writer);

    /// Restore per-module script state from a snapshot.
    fn read_module_states(&mut self, arc: &mut Reader) -> Result<(), ArchiveError>;

    /// Execute a script action that was queued while its level was not
    /// loaded. Fired during level load, after travel finishes.
    fn run_deferred_script(&mut self, script: &DeferredScript);
}

/// Resolves texture and flat names; used for sky setup and title patch
/// validation.
pub trait TextureLookup {
    fn texture_exists(&self, name: &str) -> bool;
}

/// Loads map geometry and spawns things. The real implementation is the
/// map loader; tests plug in a stub.
pub trait LevelSetup {
    /// True when a playable lump exists for the map name.
    fn check_map_data(&self, map_name: &str) -> bool;

    /// Build the level and spawn a pawn for every active player.
    fn setup_level(&mut self, world: &mut World, active_players: &[usize], position: i32);
}

// ------------------------------------------------------------
// Default collaborators
// ------------------------------------------------------------

/// Script engine that records the calls it receives.
#[derive(Default)]
pub struct RecordingScriptEngine {
    pub calls: Vec<(ScriptType, Option<ActorId>)>,
    pub deferred_runs: Vec<DeferredScript>,
    pub module_state: Vec<u8>,
}

impl ScriptEngine for RecordingScriptEngine {
    fn start_typed_scripts(&mut self, kind: ScriptType, activator: Option<ActorId>) {
        self.calls.push((kind, activator));
    }

    fn write_module_states(&self, arc: &mut Writer) {
        arc.write_u32(self.module_state.len() as u32);
        arc.write_bytes(&self.module_state);
    }

    fn read_module_states(&mut self, arc: &mut Reader) -> Result<(), ArchiveError> {
        let len = arc.read_u32()? as usize;
        self.module_state = arc.read_bytes(len)?.to_vec();
        Ok(())
    }

    fn run_deferred_script(&mut self, script: &DeferredScript) {
        self.deferred_runs.push(*script);
    }
}

/// Texture lookup that knows a fixed set of names.
pub struct StaticTextureLookup {
    pub names: Vec<String>,
}

impl TextureLookup for StaticTextureLookup {
    fn texture_exists(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// Texture lookup that accepts everything.
pub struct AnyTexture;

impl TextureLookup for AnyTexture {
    fn texture_exists(&self, _name: &str) -> bool {
        true
    }
}

/// Minimal setup: accepts every map name and spawns one pawn per player
/// at the origin.
#[derive(Default)]
pub struct SimpleLevelSetup;

impl LevelSetup for SimpleLevelSetup {
    fn check_map_data(&self, _map_name: &str) -> bool {
        true
    }

    fn setup_level(&mut self, world: &mut World, active_players: &[usize], _position: i32) {
        for &pnum in active_players {
            world.spawn(Actor::pawn("PlayerPawn", pnum));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_destroy_reuses_slots() {
        let mut world = World::new();
        let a = world.spawn(Actor::default());
        let b = world.spawn(Actor::default());
        world.destroy(a);
        assert_eq!(world.count(), 1);
        let c = world.spawn(Actor::default());
        assert_eq!(c, a);
        assert!(world.get(b).is_some());
    }

    #[test]
    fn test_destroy_takes_inventory_along() {
        let mut world = World::new();
        let item = world.spawn(Actor {
            stat: StatNum::Inventory,
            ..Actor::default()
        });
        let mut pawn = Actor::pawn("PlayerPawn", 0);
        pawn.inventory.push(item);
        let pawn_id = world.spawn(pawn);
        world.get_mut(item).unwrap().owner = Some(pawn_id);

        world.destroy(pawn_id);
        assert_eq!(world.count(), 0);
    }

    #[test]
    fn test_tid_hash() {
        let mut world = World::new();
        let a = world.spawn(Actor {
            tid: 5,
            ..Actor::default()
        });
        world.insert_tid(a);
        assert_eq!(world.find_by_tid(5), &[a]);

        world.remove_tid(a);
        assert!(world.find_by_tid(5).is_empty());
        assert_eq!(world.get(a).unwrap().tid, 5);

        // destroy cleans the hash up too
        world.insert_tid(a);
        world.destroy(a);
        assert!(world.find_by_tid(5).is_empty());
    }

    #[test]
    fn test_unload_level_spares_travellers() {
        let mut world = World::new();
        let pawn = world.spawn(Actor {
            stat: StatNum::Travelling,
            ..Actor::pawn("PlayerPawn", 0)
        });
        let item = world.spawn(Actor {
            stat: StatNum::Travelling,
            owner: Some(pawn),
            ..Actor::default()
        });
        world.get_mut(pawn).unwrap().inventory.push(item);
        let monster = world.spawn(Actor {
            tid: 9,
            in_tid_hash: true,
            ..Actor::default()
        });

        world.unload_level();
        assert_eq!(world.count(), 2);
        assert!(world.get(pawn).is_some());
        assert!(world.get(item).is_some());
        assert!(world.get(monster).is_none());
        assert!(world.find_by_tid(9).is_empty());
    }

    #[test]
    fn test_stat_buckets() {
        let mut world = World::new();
        let a = world.spawn(Actor::pawn("PlayerPawn", 0));
        let _b = world.spawn(Actor::default());
        assert_eq!(world.ids_in_stat(StatNum::Player), vec![a]);
        world.change_stat(a, StatNum::Travelling);
        assert!(world.ids_in_stat(StatNum::Player).is_empty());
        assert_eq!(world.ids_in_stat(StatNum::Travelling), vec![a]);
    }
}
