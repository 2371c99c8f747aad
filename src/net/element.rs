//! Definitions for elements contained in bundles.

use std::io::{self, Read, Write};


/// A trait to be implemented on a structure that can be interpreted as a
/// bundle's element. Elements are slices of data in a bundle; if a bundle
/// contains multiple elements they are written contiguously.
pub trait SimpleElement: Sized {

    /// Encode the element with the given writer.
    fn encode(&self, write: &mut impl Write) -> io::Result<()>;

    /// Decode the element from the given reader.
    ///
    /// The total length that is available in the reader is also given.
    fn decode(read: &mut impl Read, len: usize) -> io::Result<Self>;

}

/// A "top element" extends the behavior of a regular [`SimpleElement`] by
/// providing the element's numerical identifier and the way its length is
/// encoded in its header. Only top elements can be directly written to and
/// read from a bundle.
pub trait TopElement: SimpleElement {

    /// The numerical identifier of this element.
    const ID: u8;

    /// The type of length that prefixes the element's content and describes
    /// how much space is taken by the element.
    const LEN: ElementLength;

}

/// Type of length used by a specific element.
/// This describes how the length of an element should be encoded in a bundle.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ElementLength {
    /// A fixed length element, the length is not written in the header.
    Fixed(u32),
    /// The length is encoded on 8 bits in the element's header.
    Variable8,
    /// The length is encoded on 16 bits in the element's header.
    Variable16,
    /// The length is encoded on 24 bits in the element's header.
    Variable24,
    /// The length is encoded on 32 bits in the element's header.
    Variable32,
}

impl ElementLength {

    /// Read the length from a given reader.
    pub fn read(self, mut reader: impl Read) -> io::Result<u32> {
        use crate::util::io::CellReadExt;
        match self {
            Self::Fixed(len) => Ok(len),
            Self::Variable8 => reader.read_u8().map(|n| n as u32),
            Self::Variable16 => reader.read_u16().map(|n| n as u32),
            Self::Variable24 => reader.read_u24(),
            Self::Variable32 => reader.read_u32(),
        }
    }

    /// Write the length to the given writer.
    pub fn write(self, mut writer: impl Write, len: u32) -> io::Result<()> {
        use crate::util::io::CellWriteExt;
        match self {
            Self::Fixed(expected_len) => {
                assert_eq!(expected_len, len, "this element has fixed length but the actual written length is not coherent");
                Ok(())
            }
            Self::Variable8 => writer.write_u8(len as u8),
            Self::Variable16 => writer.write_u16(len as u16),
            Self::Variable24 => writer.write_u24(len),
            Self::Variable32 => writer.write_u32(len),
        }
    }

    /// Return the size in bytes of this type of length.
    pub fn len(&self) -> usize {
        match self {
            Self::Fixed(_) => 0,
            Self::Variable8 => 1,
            Self::Variable16 => 2,
            Self::Variable24 => 3,
            Self::Variable32 => 4,
        }
    }

}
