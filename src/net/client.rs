//! Definition of the elements that can be sent from the cell server to its
//! connected client.
//!
//! Only the identities and payload layouts live here, delivery is the
//! channel's concern.

use std::io::{self, Read, Write};

use glam::Vec3;

use crate::util::io::{CellReadExt, CellWriteExt};

use super::element::{ElementLength, SimpleElement, TopElement};


/// Internal module containing all raw elements numerical ids.
pub mod id {

    pub const UPDATE_PROPERTYS: u8              = 0x00;
    pub const ENTITY_ENTER_WORLD: u8            = 0x01;
    pub const ENTITY_LEAVE_WORLD: u8            = 0x02;
    pub const ENTITY_LEAVE_WORLD_OPTIMIZED: u8  = 0x03;
    pub const SELECT_ENTITY: u8                 = 0x04;
    pub const SELECT_ALIASED_ENTITY: u8         = 0x05;
    pub const UPDATE_BASE_POS: u8               = 0x06;
    pub const UPDATE_BASE_POS_XZ: u8            = 0x07;

    pub const UPDATE_DATA: u8                   = 0x08;
    pub const UPDATE_DATA_XZ: u8                = 0x09;
    pub const UPDATE_DATA_XYZ: u8               = 0x0A;
    pub const UPDATE_DATA_Y: u8                 = 0x0B;
    pub const UPDATE_DATA_P: u8                 = 0x0C;
    pub const UPDATE_DATA_R: u8                 = 0x0D;
    pub const UPDATE_DATA_YP: u8                = 0x0E;
    pub const UPDATE_DATA_YR: u8                = 0x0F;
    pub const UPDATE_DATA_PR: u8                = 0x10;
    pub const UPDATE_DATA_YPR: u8               = 0x11;
    pub const UPDATE_DATA_XZ_Y: u8              = 0x12;
    pub const UPDATE_DATA_XZ_P: u8              = 0x13;
    pub const UPDATE_DATA_XZ_R: u8              = 0x14;
    pub const UPDATE_DATA_XZ_YP: u8             = 0x15;
    pub const UPDATE_DATA_XZ_YR: u8             = 0x16;
    pub const UPDATE_DATA_XZ_PR: u8             = 0x17;
    pub const UPDATE_DATA_XZ_YPR: u8            = 0x18;
    pub const UPDATE_DATA_XYZ_Y: u8             = 0x19;
    pub const UPDATE_DATA_XYZ_P: u8             = 0x1A;
    pub const UPDATE_DATA_XYZ_R: u8             = 0x1B;
    pub const UPDATE_DATA_XYZ_YP: u8            = 0x1C;
    pub const UPDATE_DATA_XYZ_YR: u8            = 0x1D;
    pub const UPDATE_DATA_XYZ_PR: u8            = 0x1E;
    pub const UPDATE_DATA_XYZ_YPR: u8           = 0x1F;

}


/// Resolve the way an element's length is encoded from its id, this is what
/// a bundle reader needs to iterate a client-bound bundle.
pub fn element_length(id: u8) -> Option<ElementLength> {
    match id {
        id::UPDATE_PROPERTYS => Some(UpdateProperties::LEN),
        id::ENTITY_ENTER_WORLD => Some(EntityEnterWorld::LEN),
        id::ENTITY_LEAVE_WORLD => Some(EntityLeaveWorld::LEN),
        id::ENTITY_LEAVE_WORLD_OPTIMIZED => Some(EntityLeaveWorldOptimized::LEN),
        id::SELECT_ENTITY => Some(SelectEntity::LEN),
        id::SELECT_ALIASED_ENTITY => Some(SelectAliasedEntity::LEN),
        id::UPDATE_BASE_POS => Some(UpdateBasePos::LEN),
        id::UPDATE_BASE_POS_XZ => Some(UpdateBasePosXz::LEN),
        // All volatile updates carry an alias-or-full id, so their payload
        // length is not implied by the id alone.
        id::UPDATE_DATA..=id::UPDATE_DATA_XYZ_YPR => Some(ElementLength::Variable8),
        _ => None,
    }
}


/// An entity identity as written on the wire, either the full 32-bit id or
/// its 8-bit alias within the membership of the frame being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEntityId {
    Full(u32),
    Alias(u8),
}

impl WireEntityId {

    pub fn write(self, write: &mut impl Write) -> io::Result<()> {
        match self {
            Self::Full(id) => write.write_u32(id),
            Self::Alias(alias) => write.write_u8(alias),
        }
    }

    /// Read back an identity, the wire form is implied by the remaining
    /// payload length.
    pub fn read(read: &mut impl Read, len: usize) -> io::Result<Self> {
        match len {
            1 => read.read_u8().map(Self::Alias),
            4 => read.read_u32().map(Self::Full),
            _ => Err(io::Error::new(io::ErrorKind::InvalidData, "invalid wire entity id length")),
        }
    }

}


/// Full property frame for one entity: its absolute position and direction
/// followed by the opaque client-visible property data.
#[derive(Debug, Clone)]
pub struct UpdateProperties {
    pub entity_id: u32,
    /// Encoded position, direction and properties, produced by the entity.
    pub data: Vec<u8>,
}

impl SimpleElement for UpdateProperties {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_u32(self.entity_id)?;
        write.write_blob(&self.data)
    }

    fn decode(read: &mut impl Read, _len: usize) -> io::Result<Self> {
        Ok(Self {
            entity_id: read.read_u32()?,
            data: read.read_blob_to_end()?,
        })
    }

}

impl TopElement for UpdateProperties {
    const ID: u8 = id::UPDATE_PROPERTYS;
    const LEN: ElementLength = ElementLength::Variable16;
}


/// An entity becomes visible to the client, its property frame has just been
/// sent with [`UpdateProperties`].
#[derive(Debug, Clone)]
pub struct EntityEnterWorld {
    pub entity_id: u32,
    /// The entity type id.
    pub entity_type_id: u16,
}

impl SimpleElement for EntityEnterWorld {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_u32(self.entity_id)?;
        write.write_u16(self.entity_type_id)
    }

    fn decode(read: &mut impl Read, _len: usize) -> io::Result<Self> {
        Ok(Self {
            entity_id: read.read_u32()?,
            entity_type_id: read.read_u16()?,
        })
    }

}

impl TopElement for EntityEnterWorld {
    const ID: u8 = id::ENTITY_ENTER_WORLD;
    const LEN: ElementLength = ElementLength::Fixed(6);
}


/// An entity is no longer visible to the client, full-id form.
#[derive(Debug, Clone)]
pub struct EntityLeaveWorld {
    pub entity_id: u32,
}

impl SimpleElement for EntityLeaveWorld {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_u32(self.entity_id)
    }

    fn decode(read: &mut impl Read, _len: usize) -> io::Result<Self> {
        Ok(Self {
            entity_id: read.read_u32()?,
        })
    }

}

impl TopElement for EntityLeaveWorld {
    const ID: u8 = id::ENTITY_LEAVE_WORLD;
    const LEN: ElementLength = ElementLength::Fixed(4);
}


/// An entity is no longer visible to the client, compact form carrying the
/// alias id when the frame's membership allows it.
#[derive(Debug, Clone)]
pub struct EntityLeaveWorldOptimized {
    pub entity_id: WireEntityId,
}

impl SimpleElement for EntityLeaveWorldOptimized {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        self.entity_id.write(write)
    }

    fn decode(read: &mut impl Read, len: usize) -> io::Result<Self> {
        Ok(Self {
            entity_id: WireEntityId::read(read, len)?,
        })
    }

}

impl TopElement for EntityLeaveWorldOptimized {
    const ID: u8 = id::ENTITY_LEAVE_WORLD_OPTIMIZED;
    const LEN: ElementLength = ElementLength::Variable8;
}


/// Sent at the start of a tick frame to inform that subsequent elements are
/// relative to the given entity, full-id form.
#[derive(Debug, Clone)]
pub struct SelectEntity {
    pub entity_id: u32,
}

impl SimpleElement for SelectEntity {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_u32(self.entity_id)
    }

    fn decode(read: &mut impl Read, _len: usize) -> io::Result<Self> {
        Ok(Self {
            entity_id: read.read_u32()?,
        })
    }

}

impl TopElement for SelectEntity {
    const ID: u8 = id::SELECT_ENTITY;
    const LEN: ElementLength = ElementLength::Fixed(4);
}


/// Sent at the start of a tick frame to inform that subsequent elements are
/// relative to the given aliased entity, the frame's viewer is always alias 0.
#[derive(Debug, Clone)]
pub struct SelectAliasedEntity {
    pub alias: u8,
}

impl SimpleElement for SelectAliasedEntity {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_u8(self.alias)
    }

    fn decode(read: &mut impl Read, _len: usize) -> io::Result<Self> {
        Ok(Self {
            alias: read.read_u8()?,
        })
    }

}

impl TopElement for SelectAliasedEntity {
    const ID: u8 = id::SELECT_ALIASED_ENTITY;
    const LEN: ElementLength = ElementLength::Fixed(1);
}


/// The viewer's own absolute position, the reference for the relative
/// positions of subsequent volatile updates.
#[derive(Debug, Clone)]
pub struct UpdateBasePos {
    pub position: Vec3,
}

impl SimpleElement for UpdateBasePos {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_vec3(self.position)
    }

    fn decode(read: &mut impl Read, _len: usize) -> io::Result<Self> {
        Ok(Self {
            position: read.read_vec3()?,
        })
    }

}

impl TopElement for UpdateBasePos {
    const ID: u8 = id::UPDATE_BASE_POS;
    const LEN: ElementLength = ElementLength::Fixed(12);
}


/// Same as [`UpdateBasePos`] with the height axis elided, used when the
/// viewer's height did not noticeably change.
#[derive(Debug, Clone)]
pub struct UpdateBasePosXz {
    pub x: f32,
    pub z: f32,
}

impl SimpleElement for UpdateBasePosXz {

    fn encode(&self, write: &mut impl Write) -> io::Result<()> {
        write.write_f32(self.x)?;
        write.write_f32(self.z)
    }

    fn decode(read: &mut impl Read, _len: usize) -> io::Result<Self> {
        Ok(Self {
            x: read.read_f32()?,
            z: read.read_f32()?,
        })
    }

}

impl TopElement for UpdateBasePosXz {
    const ID: u8 = id::UPDATE_BASE_POS_XZ;
    const LEN: ElementLength = ElementLength::Fixed(8);
}
