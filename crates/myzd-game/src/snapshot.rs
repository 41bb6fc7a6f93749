// snapshot.rs — per-level state capture for hub travel and save files
//
// A snapshot is one deflate-compressed buffer owned by the level's
// descriptor: runtime level state, script module state, the world's
// actors (travellers excluded; they belong to no level while in
// transit) and the player structs. Save files carry the snapshots as
// tagged chunks; tags and layout are a compatibility contract.

use myzd_common::archive::{
    compress_blob, decompress_blob, find_chunk, write_chunk, ArchiveError, ChunkIter, Reader,
    Writer, ACSD_ID, DSNP_ID, PCLS_ID, RCLS_ID, SNAP_ID, VIST_ID,
};
use myzd_common::console::{con_dprintf, con_printf};

use crate::game::{GameContext, GameError, LevelLocals, Player, PlayerState, MAX_PLAYERS};
use crate::level_info::{
    CompatFlags, DeferredScript, LevelFlags, MapInfoStore, Snapshot,
};
use crate::transition::Collaborators;
use crate::world::{Actor, ActorId, StatNum, World};

pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================
// Level state
// ============================================================

pub fn serialize_level(level: &LevelLocals, arc: &mut Writer) {
    arc.write_u64(level.flags.bits());
    arc.write_u32(level.compat_flags.bits());
    arc.write_u32(level.fade_to);
    arc.write_u32(level.outside_fog);
    arc.write_i8(level.wall_vert_light);
    arc.write_i8(level.wall_horiz_light);
    arc.write_f32(level.gravity);
    arc.write_f32(level.air_control);
    arc.write_f32(level.team_damage);
    arc.write_i32(level.air_supply);
    arc.write_i32(level.time);
    arc.write_i32(level.total_time);
    arc.write_i32(level.total_kills);
    arc.write_i32(level.killed_monsters);
    arc.write_i32(level.total_items);
    arc.write_i32(level.found_items);
    arc.write_i32(level.total_secrets);
    arc.write_i32(level.found_secrets);
    arc.write_string(&level.music);
    arc.write_i32(level.music_order);
    arc.write_name8(&level.sky_pic1);
    arc.write_f32(level.sky_speed1);
    arc.write_name8(&level.sky_pic2);
    arc.write_f32(level.sky_speed2);
    arc.write_bool(!level.scrolls.is_empty());
    if !level.scrolls.is_empty() {
        arc.write_u32(level.scrolls.len() as u32);
        for scroll in &level.scrolls {
            arc.write_f32(scroll[0]);
            arc.write_f32(scroll[1]);
        }
    }
}

/// Inverse of serialize_level. On a hub load the running total-time
/// counter wins over the stored one.
pub fn deserialize_level(
    level: &mut LevelLocals,
    arc: &mut Reader,
    hub_load: bool,
) -> Result<(), ArchiveError> {
    level.flags = LevelFlags::from_bits_truncate(arc.read_u64()?);
    level.compat_flags = CompatFlags::from_bits_truncate(arc.read_u32()?);
    level.fade_to = arc.read_u32()?;
    level.outside_fog = arc.read_u32()?;
    level.wall_vert_light = arc.read_i8()?;
    level.wall_horiz_light = arc.read_i8()?;
    level.gravity = arc.read_f32()?;
    level.air_control = arc.read_f32()?;
    level.air_control_changed();
    level.team_damage = arc.read_f32()?;
    level.air_supply = arc.read_i32()?;
    level.time = arc.read_i32()?;
    let total_time = arc.read_i32()?;
    if !hub_load {
        level.total_time = total_time;
    }
    level.total_kills = arc.read_i32()?;
    level.killed_monsters = arc.read_i32()?;
    level.total_items = arc.read_i32()?;
    level.found_items = arc.read_i32()?;
    level.total_secrets = arc.read_i32()?;
    level.found_secrets = arc.read_i32()?;
    level.music = arc.read_string()?;
    level.music_order = arc.read_i32()?;
    level.sky_pic1 = arc.read_name8()?;
    level.sky_speed1 = arc.read_f32()?;
    level.sky_pic2 = arc.read_name8()?;
    level.sky_speed2 = arc.read_f32()?;
    level.scrolls.clear();
    if arc.read_bool()? {
        let count = arc.read_u32()? as usize;
        level.scrolls.reserve(count);
        for _ in 0..count {
            let x = arc.read_f32()?;
            let y = arc.read_f32()?;
            level.scrolls.push([x, y]);
        }
    }
    Ok(())
}

// ============================================================
// World actors
// ============================================================

fn stat_to_wire(stat: StatNum) -> u8 {
    match stat {
        StatNum::Default => 0,
        StatNum::Player => 1,
        StatNum::Travelling => 2,
        StatNum::Inventory => 3,
    }
}

fn stat_from_wire(v: u8) -> StatNum {
    match v {
        1 => StatNum::Player,
        2 => StatNum::Travelling,
        3 => StatNum::Inventory,
        _ => StatNum::Default,
    }
}

/// Serialize every actor except the travelling ones. Cross-references
/// are written as positions in the serialized sequence, since slot
/// indices do not survive a reload.
pub fn write_world_actors(world: &World, arc: &mut Writer) {
    let ids: Vec<ActorId> = world
        .ids()
        .into_iter()
        .filter(|&id| world.get(id).map_or(false, |a| a.stat != StatNum::Travelling))
        .collect();
    let seq_of = |id: ActorId| -> i32 {
        ids.iter().position(|&i| i == id).map_or(-1, |p| p as i32)
    };

    arc.write_u32(ids.len() as u32);
    for &id in &ids {
        let Some(actor) = world.get(id) else { continue };
        arc.write_string(&actor.class);
        arc.write_u8(stat_to_wire(actor.stat));
        arc.write_i32(actor.tid);
        arc.write_bool(actor.in_tid_hash);
        arc.write_bool(actor.linked);
        for axis in 0..3 {
            arc.write_f32(actor.pos[axis]);
        }
        for axis in 0..3 {
            arc.write_f32(actor.vel[axis]);
        }
        arc.write_f32(actor.angle);
        arc.write_f32(actor.pitch);
        arc.write_f32(actor.floor_z);
        arc.write_f32(actor.ceiling_z);
        arc.write_f32(actor.dropoff_z);
        arc.write_i32(actor.floor_sector);
        arc.write_i32(actor.health);
        arc.write_i32(actor.player.map_or(-1, |p| p as i32));
        arc.write_i32(actor.owner.map_or(-1, seq_of));
        arc.write_u32(actor.inventory.len() as u32);
        for &item in &actor.inventory {
            arc.write_i32(seq_of(item));
        }
    }
}

/// Spawn the serialized actors into the world (alongside whatever is
/// already there) and return their new ids in sequence order.
pub fn read_world_actors(
    world: &mut World,
    arc: &mut Reader,
) -> Result<Vec<ActorId>, ArchiveError> {
    let count = arc.read_u32()? as usize;
    let mut spawned = Vec::with_capacity(count);
    let mut links: Vec<(i32, Vec<i32>)> = Vec::with_capacity(count);

    for _ in 0..count {
        let mut actor = Actor {
            class: arc.read_string()?,
            stat: stat_from_wire(arc.read_u8()?),
            tid: arc.read_i32()?,
            in_tid_hash: arc.read_bool()?,
            linked: arc.read_bool()?,
            ..Actor::default()
        };
        for axis in 0..3 {
            actor.pos[axis] = arc.read_f32()?;
        }
        for axis in 0..3 {
            actor.vel[axis] = arc.read_f32()?;
        }
        actor.angle = arc.read_f32()?;
        actor.pitch = arc.read_f32()?;
        actor.floor_z = arc.read_f32()?;
        actor.ceiling_z = arc.read_f32()?;
        actor.dropoff_z = arc.read_f32()?;
        actor.floor_sector = arc.read_i32()?;
        actor.health = arc.read_i32()?;
        let player = arc.read_i32()?;
        actor.player = (player >= 0).then_some(player as usize);
        let owner = arc.read_i32()?;
        let item_count = arc.read_u32()? as usize;
        let mut items = Vec::with_capacity(item_count);
        for _ in 0..item_count {
            items.push(arc.read_i32()?);
        }
        links.push((owner, items));
        spawned.push(world.spawn(actor));
    }

    // Second pass rewires the cross-references to the new ids.
    for (seq, (owner, items)) in links.into_iter().enumerate() {
        let id = spawned[seq];
        if let Some(actor) = world.get_mut(id) {
            actor.owner = usize::try_from(owner).ok().map(|o| spawned[o]);
            actor.inventory = items
                .into_iter()
                .filter_map(|i| usize::try_from(i).ok().map(|i| spawned[i]))
                .collect();
        }
    }
    Ok(spawned)
}

// ============================================================
// Players
// ============================================================

fn player_state_to_wire(state: PlayerState) -> u8 {
    match state {
        PlayerState::Live => 0,
        PlayerState::Dead => 1,
        PlayerState::Reborn => 2,
        PlayerState::Enter => 3,
    }
}

fn player_state_from_wire(v: u8) -> PlayerState {
    match v {
        1 => PlayerState::Dead,
        2 => PlayerState::Reborn,
        3 => PlayerState::Enter,
        _ => PlayerState::Live,
    }
}

pub fn write_players(players: &[Player; MAX_PLAYERS], arc: &mut Writer) {
    arc.write_u32(MAX_PLAYERS as u32);
    for player in players {
        arc.write_bool(player.in_game);
        arc.write_u8(player_state_to_wire(player.state));
        arc.write_i32(player.health);
        arc.write_i32(player.frag_count);
        arc.write_i32(player.kill_count);
        arc.write_i32(player.item_count);
        arc.write_i32(player.secret_count);
        arc.write_string(&player.class_name);
    }
}

/// Restore player structs. Pawn references are left alone; the caller
/// rewires them once the surplus-pawn cleanup is done.
pub fn read_players(
    players: &mut [Player; MAX_PLAYERS],
    arc: &mut Reader,
) -> Result<(), ArchiveError> {
    let count = arc.read_u32()? as usize;
    for i in 0..count.min(MAX_PLAYERS) {
        let player = &mut players[i];
        player.in_game = arc.read_bool()?;
        player.state = player_state_from_wire(arc.read_u8()?);
        player.health = arc.read_i32()?;
        player.frag_count = arc.read_i32()?;
        player.kill_count = arc.read_i32()?;
        player.item_count = arc.read_i32()?;
        player.secret_count = arc.read_i32()?;
        player.class_name = arc.read_string()?;
    }
    Ok(())
}

// ============================================================
// Snapshot capture / restore
// ============================================================

/// Capture the current level into its descriptor, replacing any prior
/// snapshot.
pub fn snapshot_level(ctx: &mut GameContext, co: &mut Collaborators) -> Result<(), GameError> {
    let mut arc = Writer::new();
    arc.write_map_name(&ctx.level.map_name);
    serialize_level(&ctx.level, &mut arc);
    co.scripts.write_module_states(&mut arc);
    write_world_actors(&ctx.world, &mut arc);
    write_players(&ctx.players, &mut arc);

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        data: compress_blob(&arc.into_bytes())?,
    };
    match ctx.store.find_level_info_mut(&ctx.level.map_name) {
        Some(info) => info.snapshot = Some(snapshot),
        None => ctx.store.default_info.snapshot = Some(snapshot),
    }
    Ok(())
}

/// Restore the current level's snapshot into the live world and consume
/// it. Surplus player pawns left over from the restore are destroyed:
/// a travelling body wins over its restored duplicate, and a restored
/// body replaces the freshly spawned placeholder.
pub fn unsnapshot_level(
    ctx: &mut GameContext,
    co: &mut Collaborators,
    hub_load: bool,
) -> Result<(), GameError> {
    let snapshot = match ctx.store.find_level_info_mut(&ctx.level.map_name) {
        Some(info) => info.snapshot.take(),
        None => ctx.store.default_info.snapshot.take(),
    };
    let Some(snapshot) = snapshot else {
        return Ok(());
    };

    let raw = decompress_blob(&snapshot.data)?;
    let mut arc = Reader::new(&raw);
    let _map_name = arc.read_map_name()?;
    deserialize_level(&mut ctx.level, &mut arc, hub_load)?;
    co.scripts.read_module_states(&mut arc)?;
    let restored = read_world_actors(&mut ctx.world, &mut arc)?;
    read_players(&mut ctx.players, &mut arc)?;

    // Restored sky names go back through the texture collaborator.
    for name in [&ctx.level.sky_pic1, &ctx.level.sky_pic2] {
        if !name.is_empty() && !co.textures.texture_exists(name) {
            con_printf(&format!("Sky texture '{}' not found\n", name));
        }
    }

    for pnum in 0..MAX_PLAYERS {
        if !ctx.players[pnum].in_game {
            continue;
        }
        let traveller = ctx
            .world
            .ids_in_stat(StatNum::Travelling)
            .into_iter()
            .find(|&id| ctx.world.get(id).map_or(false, |a| a.player == Some(pnum)));
        let restored_pawn = restored.iter().copied().find(|&id| {
            ctx.world
                .get(id)
                .map_or(false, |a| a.stat == StatNum::Player && a.player == Some(pnum))
        });
        if traveller.is_some() {
            if let Some(id) = restored_pawn {
                ctx.world.destroy(id);
            }
        } else if let Some(id) = restored_pawn {
            if let Some(placeholder) = ctx.players[pnum].mo {
                if placeholder != id {
                    ctx.world.destroy(placeholder);
                }
            }
            ctx.players[pnum].mo = Some(id);
        }
    }

    ctx.level.from_snapshot = true;
    Ok(())
}

// ============================================================
// Save-file chunks
// ============================================================

/// Append the snapshot, visited-map and player-class chunks to a save
/// buffer. Chunk order matches existing save files.
pub fn write_snapshots(ctx: &GameContext, out: &mut Vec<u8>) {
    for info in &ctx.store.levels {
        if let Some(snapshot) = &info.snapshot {
            let mut arc = Writer::new();
            arc.write_map_name(&info.map_name);
            arc.write_u32(snapshot.version);
            arc.write_bytes(&snapshot.data);
            write_chunk(out, SNAP_ID, &arc.into_bytes());
        }
    }
    if let Some(snapshot) = &ctx.store.default_info.snapshot {
        let mut arc = Writer::new();
        arc.write_u32(snapshot.version);
        arc.write_bytes(&snapshot.data);
        write_chunk(out, DSNP_ID, &arc.into_bytes());
    }
    for info in &ctx.store.levels {
        if info.flags.contains(LevelFlags::VISITED) {
            let mut arc = Writer::new();
            arc.write_map_name(&info.map_name);
            write_chunk(out, VIST_ID, &arc.into_bytes());
        }
    }
    {
        let mut arc = Writer::new();
        arc.write_u8(ctx.random_classes.len() as u8);
        for class in &ctx.random_classes {
            arc.write_string(class);
        }
        write_chunk(out, RCLS_ID, &arc.into_bytes());
    }
    {
        let in_game: Vec<usize> = (0..MAX_PLAYERS).filter(|&i| ctx.players[i].in_game).collect();
        let mut arc = Writer::new();
        arc.write_u8(in_game.len() as u8);
        for pnum in in_game {
            arc.write_u8(pnum as u8);
            arc.write_string(&ctx.players[pnum].class_name);
        }
        write_chunk(out, PCLS_ID, &arc.into_bytes());
    }
}

/// Read the chunks written by write_snapshots. Snapshots for maps that
/// no longer exist are skipped; unknown chunk tags are ignored.
pub fn read_snapshots(ctx: &mut GameContext, data: &[u8]) -> Result<(), GameError> {
    for (id, payload) in ChunkIter::new(data) {
        let mut arc = Reader::new(payload);
        match id {
            SNAP_ID => {
                let map_name = arc.read_map_name()?;
                let version = arc.read_u32()?;
                let body = arc.read_bytes(arc.remaining())?.to_vec();
                match ctx.store.find_level_info_mut(&map_name) {
                    Some(info) => {
                        info.snapshot = Some(Snapshot {
                            version,
                            data: body,
                        })
                    }
                    None => con_dprintf(&format!(
                        "dropping snapshot for unknown map '{}'\n",
                        map_name
                    )),
                }
            }
            DSNP_ID => {
                let version = arc.read_u32()?;
                let body = arc.read_bytes(arc.remaining())?.to_vec();
                ctx.store.default_info.snapshot = Some(Snapshot {
                    version,
                    data: body,
                });
            }
            VIST_ID => {
                let map_name = arc.read_map_name()?;
                if let Some(info) = ctx.store.find_level_info_mut(&map_name) {
                    info.flags |= LevelFlags::VISITED;
                }
            }
            RCLS_ID => {
                let count = arc.read_u8()? as usize;
                ctx.random_classes.clear();
                for _ in 0..count {
                    ctx.random_classes.push(arc.read_string()?);
                }
            }
            PCLS_ID => {
                let count = arc.read_u8()? as usize;
                for _ in 0..count {
                    let pnum = arc.read_u8()? as usize;
                    let class = arc.read_string()?;
                    if pnum < MAX_PLAYERS {
                        ctx.players[pnum].class_name = class;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Append one chunk per level that has deferred script actions queued.
pub fn write_acs_defereds(store: &MapInfoStore, out: &mut Vec<u8>) {
    for info in &store.levels {
        if info.defered.is_empty() {
            continue;
        }
        let mut arc = Writer::new();
        arc.write_map_name(&info.map_name);
        arc.write_u32(info.defered.len() as u32);
        for script in &info.defered {
            arc.write_i32(script.script);
            arc.write_i32(script.player_num);
            arc.write_bool(script.always);
            for arg in script.args {
                arc.write_i32(arg);
            }
        }
        write_chunk(out, ACSD_ID, &arc.into_bytes());
    }
}

/// Read deferred-script chunks back. A deferred list for a map the
/// store does not know makes the save unusable.
pub fn read_acs_defereds(store: &mut MapInfoStore, data: &[u8]) -> Result<(), GameError> {
    for (id, payload) in ChunkIter::new(data) {
        if id != ACSD_ID {
            continue;
        }
        let mut arc = Reader::new(payload);
        let map_name = arc.read_map_name()?;
        let count = arc.read_u32()? as usize;
        let mut scripts = Vec::with_capacity(count);
        for _ in 0..count {
            let mut script = DeferredScript {
                script: arc.read_i32()?,
                player_num: arc.read_i32()?,
                always: arc.read_bool()?,
                args: [0; 3],
            };
            for arg in &mut script.args {
                *arg = arc.read_i32()?;
            }
            scripts.push(script);
        }
        match store.find_level_info_mut(&map_name) {
            Some(info) => info.defered = scripts,
            None => {
                return Err(GameError::Fatal(format!(
                    "Unknown map '{}' in savegame",
                    map_name
                )))
            }
        }
    }
    Ok(())
}

/// True when a save buffer contains a deferred-script chunk; used by
/// the save loader to decide whether read_acs_defereds must run.
pub fn has_acs_defereds(data: &[u8]) -> bool {
    find_chunk(data, ACSD_ID).is_some()
}
