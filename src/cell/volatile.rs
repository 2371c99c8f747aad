//! Volatile position/direction delta encoding and the dispatch from the
//! resulting update flags to the compact wire message identity.

use std::io::{self, Write};

use glam::Vec3;

use crate::net::client::id;
use crate::util::io::CellWriteExt;

use super::entity::Entity;
use super::tick::GameTime;


/// Number of ticks after which a position or direction change is considered
/// stale and stops being replicated as volatile data.
pub const VOLATILE_STALE_TICKS: GameTime = 5;


/// Flags describing the content of one volatile update, combined by the
/// encoder and dispatched to a message identity with
/// [`update_data_message_id`].
pub mod update_flags {

    pub const NONE: u16             = 0x0000;
    pub const XZ: u16               = 0x0001;
    pub const XYZ: u16              = 0x0002;
    pub const YAW: u16              = 0x0004;
    pub const ROLL: u16             = 0x0008;
    pub const PITCH: u16            = 0x0010;
    pub const YAW_PITCH_ROLL: u16   = 0x0020;
    pub const YAW_PITCH: u16        = 0x0040;
    pub const YAW_ROLL: u16         = 0x0080;
    pub const PITCH_ROLL: u16       = 0x0100;

}

/// Sentinel for flag combinations no message identity exists for.
const ILLEGAL: u8 = 0xFF;

/// Dense dispatch from the 9-bit update-flag value to the message identity.
static UPDATE_DATA_MESSAGES: [u8; 512] = build_update_data_messages();

const fn build_update_data_messages() -> [u8; 512] {

    use update_flags::*;

    let mut table = [ILLEGAL; 512];

    table[NONE as usize] = id::UPDATE_DATA;
    table[XZ as usize] = id::UPDATE_DATA_XZ;
    table[XYZ as usize] = id::UPDATE_DATA_XYZ;

    table[YAW as usize] = id::UPDATE_DATA_Y;
    table[PITCH as usize] = id::UPDATE_DATA_P;
    table[ROLL as usize] = id::UPDATE_DATA_R;
    table[YAW_PITCH as usize] = id::UPDATE_DATA_YP;
    table[YAW_ROLL as usize] = id::UPDATE_DATA_YR;
    table[PITCH_ROLL as usize] = id::UPDATE_DATA_PR;
    table[YAW_PITCH_ROLL as usize] = id::UPDATE_DATA_YPR;

    table[(XZ | YAW) as usize] = id::UPDATE_DATA_XZ_Y;
    table[(XZ | PITCH) as usize] = id::UPDATE_DATA_XZ_P;
    table[(XZ | ROLL) as usize] = id::UPDATE_DATA_XZ_R;
    table[(XZ | YAW_PITCH) as usize] = id::UPDATE_DATA_XZ_YP;
    table[(XZ | YAW_ROLL) as usize] = id::UPDATE_DATA_XZ_YR;
    table[(XZ | PITCH_ROLL) as usize] = id::UPDATE_DATA_XZ_PR;
    table[(XZ | YAW_PITCH_ROLL) as usize] = id::UPDATE_DATA_XZ_YPR;

    table[(XYZ | YAW) as usize] = id::UPDATE_DATA_XYZ_Y;
    table[(XYZ | PITCH) as usize] = id::UPDATE_DATA_XYZ_P;
    table[(XYZ | ROLL) as usize] = id::UPDATE_DATA_XYZ_R;
    table[(XYZ | YAW_PITCH) as usize] = id::UPDATE_DATA_XYZ_YP;
    table[(XYZ | YAW_ROLL) as usize] = id::UPDATE_DATA_XYZ_YR;
    table[(XYZ | PITCH_ROLL) as usize] = id::UPDATE_DATA_XYZ_PR;
    table[(XYZ | YAW_PITCH_ROLL) as usize] = id::UPDATE_DATA_XYZ_YPR;

    table

}

/// Select the message identity carrying a volatile update with the given
/// flags.
///
/// Panics if the combination is not one produced by
/// [`write_volatile_data`], which is a programmer error.
pub fn update_data_message_id(flags: u16) -> u8 {
    let message_id = UPDATE_DATA_MESSAGES.get(flags as usize).copied().unwrap_or(ILLEGAL);
    assert!(message_id != ILLEGAL, "no update message for flag combination {flags:#05X}");
    message_id
}


/// Write the volatile delta of `target` as observed from `viewer_pos` at tick
/// `now`, returning the update flags describing what was written.
///
/// The position is relative to the viewer's base position and packed, angles
/// are quantized to 8 bits. A field is only written while its volatile
/// threshold is active and the last change is fresher than
/// [`VOLATILE_STALE_TICKS`].
pub fn write_volatile_data(stream: &mut impl Write, viewer_pos: Vec3,
    target: &Entity, now: GameTime) -> io::Result<u16>
{

    use update_flags::*;

    let mut flags = NONE;
    let volatile = target.volatile_info();
    let relative_pos = target.position() - viewer_pos;
    let dir = target.direction();

    if volatile.has_position() && now.wrapping_sub(target.pos_changed_time()) < VOLATILE_STALE_TICKS {
        stream.write_packed_xz(relative_pos.x, relative_pos.z)?;
        if !target.on_ground() {
            stream.write_packed_y(relative_pos.y)?;
            flags |= XYZ;
        } else {
            flags |= XZ;
        }
    }

    if now.wrapping_sub(target.dir_changed_time()) < VOLATILE_STALE_TICKS {
        // Only the first matching combination fires, a pitch+roll pair takes
        // precedence over any yaw pair.
        if volatile.has_yaw() && volatile.has_roll() && volatile.has_pitch() {
            stream.write_angle(dir.yaw)?;
            stream.write_angle(dir.pitch)?;
            stream.write_angle(dir.roll)?;
            flags |= YAW_PITCH_ROLL;
        } else if volatile.has_roll() && volatile.has_pitch() {
            stream.write_angle(dir.pitch)?;
            stream.write_angle(dir.roll)?;
            flags |= PITCH_ROLL;
        } else if volatile.has_yaw() && volatile.has_pitch() {
            stream.write_angle(dir.yaw)?;
            stream.write_angle(dir.pitch)?;
            flags |= YAW_PITCH;
        } else if volatile.has_yaw() && volatile.has_roll() {
            stream.write_angle(dir.yaw)?;
            stream.write_angle(dir.roll)?;
            flags |= YAW_ROLL;
        } else if volatile.has_yaw() {
            stream.write_angle(dir.yaw)?;
            flags |= YAW;
        } else if volatile.has_roll() {
            stream.write_angle(dir.roll)?;
            flags |= ROLL;
        } else if volatile.has_pitch() {
            stream.write_angle(dir.pitch)?;
            flags |= PITCH;
        }
    }

    Ok(flags)

}
