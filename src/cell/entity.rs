//! Entity records observed by witnesses, and the registry that owns them.
//!
//! The registry is the single lifetime root of all entities in a cell, every
//! other structure refers to an entity through its id. A witness and the
//! entities it replicates therefore form two non-owning relations that are
//! both resolved here.

use std::collections::HashMap;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::fmt;

use glam::Vec3;
use smallvec::SmallVec;

use crate::net::bundle::Bundle;
use crate::net::channel::Channel;
use crate::util::io::CellWriteExt;

use super::tick::GameTime;


/// Stable numerical identifier of an entity, unique within a cell.
pub type EntityId = u32;


/// Orientation of an entity, all angles in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Direction {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Direction {
    pub const fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }
}


/// Per-field activity thresholds for high-frequency replication: a field is
/// replicated to clients while its threshold is strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatileInfo {
    pub position: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl VolatileInfo {

    /// Replicate every volatile field.
    pub const ALWAYS: Self = Self { position: 1.0, yaw: 1.0, pitch: 1.0, roll: 1.0 };

    /// Replicate no volatile field.
    pub const NEVER: Self = Self { position: 0.0, yaw: 0.0, pitch: 0.0, roll: 0.0 };

    #[inline]
    pub fn has_position(&self) -> bool {
        self.position > 0.0
    }

    #[inline]
    pub fn has_yaw(&self) -> bool {
        self.yaw > 0.0
    }

    #[inline]
    pub fn has_pitch(&self) -> bool {
        self.pitch > 0.0
    }

    #[inline]
    pub fn has_roll(&self) -> bool {
        self.roll > 0.0
    }

}

impl Default for VolatileInfo {
    fn default() -> Self {
        Self::ALWAYS
    }
}


/// Mailbox resolving to the channel of the entity's connected client.
#[derive(Clone)]
pub struct ClientMailbox {
    channel: Rc<RefCell<Channel>>,
}

impl ClientMailbox {

    pub fn new(channel: Rc<RefCell<Channel>>) -> Self {
        Self { channel }
    }

    /// The channel owning the outbound bundle queue.
    pub fn channel(&self) -> Rc<RefCell<Channel>> {
        Rc::clone(&self.channel)
    }

    /// Queue a bundle and immediately flush the channel.
    pub fn post_mail(&self, bundle: Bundle) {
        let mut channel = self.channel.borrow_mut();
        channel.push_bundle(bundle);
        channel.send();
    }

}

impl fmt::Debug for ClientMailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientMailbox").finish_non_exhaustive()
    }
}


/// A simulated entity as seen by the replication layer.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    /// The entity type id, sent to clients so they can instantiate the right
    /// script type.
    type_id: u16,
    position: Vec3,
    direction: Direction,
    on_ground: bool,
    pos_changed_time: GameTime,
    dir_changed_time: GameTime,
    volatile_info: VolatileInfo,
    /// Opaque encoded client-visible properties.
    client_data: Vec<u8>,
    /// Viewers currently witnessing this entity.
    witnessed_by: SmallVec<[EntityId; 4]>,
    client_mailbox: Option<ClientMailbox>,
}

impl Entity {

    pub fn new(id: EntityId, type_id: u16) -> Self {
        Self {
            id,
            type_id,
            position: Vec3::ZERO,
            direction: Direction::default(),
            on_ground: false,
            pos_changed_time: 0,
            dir_changed_time: 0,
            volatile_info: VolatileInfo::default(),
            client_data: Vec::new(),
            witnessed_by: SmallVec::new(),
            client_mailbox: None,
        }
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[inline]
    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3, now: GameTime) {
        self.position = position;
        self.pos_changed_time = now;
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction, now: GameTime) {
        self.direction = direction;
        self.dir_changed_time = now;
    }

    #[inline]
    pub fn on_ground(&self) -> bool {
        self.on_ground
    }

    pub fn set_on_ground(&mut self, on_ground: bool) {
        self.on_ground = on_ground;
    }

    #[inline]
    pub fn pos_changed_time(&self) -> GameTime {
        self.pos_changed_time
    }

    #[inline]
    pub fn dir_changed_time(&self) -> GameTime {
        self.dir_changed_time
    }

    #[inline]
    pub fn volatile_info(&self) -> &VolatileInfo {
        &self.volatile_info
    }

    pub fn set_volatile_info(&mut self, volatile_info: VolatileInfo) {
        self.volatile_info = volatile_info;
    }

    #[inline]
    pub fn client_data(&self) -> &[u8] {
        &self.client_data[..]
    }

    pub fn set_client_data(&mut self, client_data: Vec<u8>) {
        self.client_data = client_data;
    }

    #[inline]
    pub fn client_mailbox(&self) -> Option<&ClientMailbox> {
        self.client_mailbox.as_ref()
    }

    pub fn set_client_mailbox(&mut self, client_mailbox: Option<ClientMailbox>) {
        self.client_mailbox = client_mailbox;
    }

    /// Viewers currently witnessing this entity.
    #[inline]
    pub fn witnessed_by(&self) -> &[EntityId] {
        &self.witnessed_by[..]
    }

    /// Record that the given viewer started witnessing this entity,
    /// duplicates are ignored.
    pub fn add_witnessed_by(&mut self, viewer: EntityId) {
        if !self.witnessed_by.contains(&viewer) {
            self.witnessed_by.push(viewer);
        }
    }

    /// Record that the given viewer stopped witnessing this entity, returning
    /// whether it was witnessing it.
    pub fn remove_witnessed_by(&mut self, viewer: EntityId) -> bool {
        match self.witnessed_by.iter().position(|&id| id == viewer) {
            Some(index) => {
                self.witnessed_by.remove(index);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn is_witnessed(&self) -> bool {
        !self.witnessed_by.is_empty()
    }

    /// Write the absolute position and direction of this entity, the layout
    /// expected at the head of a property frame.
    pub fn add_position_and_direction_to_stream(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_vec3(self.position)?;
        write.write_f32(self.direction.yaw)?;
        write.write_f32(self.direction.pitch)?;
        write.write_f32(self.direction.roll)
    }

    /// Append the opaque client-visible property data of this entity.
    pub fn add_client_data_to_stream(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_blob(&self.client_data)
    }

}


/// The registry owning every entity of a cell.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Entity>,
}

impl EntityRegistry {

    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity, returning the previous one registered under the same
    /// id, if any.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.id(), entity)
    }

    /// Destroy an entity, any witness still holding its id will observe the
    /// failed lookup and degrade to a silent leave.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

}
