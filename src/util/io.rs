//! This module provides extension traits for [`Read`] and [`Write`] supporting
//! the wire primitives used by the client update protocol.

use std::f32::consts::PI;
use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use glam::Vec3;


/// Quantize a relative coordinate to signed 8.8 fixed point, saturating at the
/// representable range (about ±128 m, which always covers an AOI disc).
pub fn pack_fixed88(v: f32) -> i16 {
    (v * 256.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Inverse of [`pack_fixed88`].
pub fn unpack_fixed88(v: i16) -> f32 {
    v as f32 / 256.0
}

/// Quantize an angle in radians to a signed 8-bit fraction of ±π.
pub fn pack_angle(radians: f32) -> i8 {
    (radians * (128.0 / PI)).round().clamp(i8::MIN as f32, i8::MAX as f32) as i8
}

/// Inverse of [`pack_angle`].
pub fn unpack_angle(v: i8) -> f32 {
    v as f32 * (PI / 128.0)
}


/// An extension to the [`Read`] trait used to decode the update protocol's
/// primitives, everything is little endian.
pub trait CellReadExt: Read {

    /// Reads an unsigned 8 bit integer from the underlying reader.
    #[inline]
    fn read_u8(&mut self) -> io::Result<u8> {
        ReadBytesExt::read_u8(self)
    }

    /// Reads a signed 8 bit integer from the underlying reader.
    #[inline]
    fn read_i8(&mut self) -> io::Result<i8> {
        ReadBytesExt::read_i8(self)
    }

    /// Reads an unsigned 16 bit integer from the underlying reader.
    #[inline]
    fn read_u16(&mut self) -> io::Result<u16> {
        ReadBytesExt::read_u16::<LE>(self)
    }

    /// Reads a signed 16 bit integer from the underlying reader.
    #[inline]
    fn read_i16(&mut self) -> io::Result<i16> {
        ReadBytesExt::read_i16::<LE>(self)
    }

    /// Reads an unsigned 24 bit integer from the underlying reader.
    #[inline]
    fn read_u24(&mut self) -> io::Result<u32> {
        ReadBytesExt::read_u24::<LE>(self)
    }

    /// Reads an unsigned 32 bit integer from the underlying reader.
    #[inline]
    fn read_u32(&mut self) -> io::Result<u32> {
        ReadBytesExt::read_u32::<LE>(self)
    }

    /// Reads a IEEE754 single-precision (4 bytes) floating point number
    /// from the underlying reader.
    #[inline]
    fn read_f32(&mut self) -> io::Result<f32> {
        ReadBytesExt::read_f32::<LE>(self)
    }

    /// Read a blob of the given length.
    fn read_blob(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.read_exact(&mut buf[..])?;
        Ok(buf)
    }

    /// Read a blob of all the remaining data.
    fn read_blob_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    fn read_vec3(&mut self) -> io::Result<Vec3> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Read a relative XZ coordinate pair packed as two 8.8 fixed-point values.
    fn read_packed_xz(&mut self) -> io::Result<(f32, f32)> {
        let x = unpack_fixed88(self.read_i16()?);
        let z = unpack_fixed88(self.read_i16()?);
        Ok((x, z))
    }

    /// Read a relative Y coordinate packed as one 8.8 fixed-point value.
    #[inline]
    fn read_packed_y(&mut self) -> io::Result<f32> {
        Ok(unpack_fixed88(self.read_i16()?))
    }

    /// Read an angle quantized to a signed 8-bit fraction of ±π.
    #[inline]
    fn read_angle(&mut self) -> io::Result<f32> {
        Ok(unpack_angle(self.read_i8()?))
    }

}

impl<R: Read> CellReadExt for R {}


/// An extension to the [`Write`] trait used to encode the update protocol's
/// primitives, everything is little endian.
pub trait CellWriteExt: Write {

    /// Writes an unsigned 8 bit integer to the underlying writer.
    #[inline]
    fn write_u8(&mut self, n: u8) -> io::Result<()> {
        WriteBytesExt::write_u8(self, n)
    }

    /// Writes a signed 8 bit integer to the underlying writer.
    #[inline]
    fn write_i8(&mut self, n: i8) -> io::Result<()> {
        WriteBytesExt::write_i8(self, n)
    }

    /// Writes an unsigned 16 bit integer to the underlying writer.
    #[inline]
    fn write_u16(&mut self, n: u16) -> io::Result<()> {
        WriteBytesExt::write_u16::<LE>(self, n)
    }

    /// Writes a signed 16 bit integer to the underlying writer.
    #[inline]
    fn write_i16(&mut self, n: i16) -> io::Result<()> {
        WriteBytesExt::write_i16::<LE>(self, n)
    }

    /// Writes an unsigned 24 bit integer to the underlying writer.
    #[inline]
    fn write_u24(&mut self, n: u32) -> io::Result<()> {
        WriteBytesExt::write_u24::<LE>(self, n)
    }

    /// Writes an unsigned 32 bit integer to the underlying writer.
    #[inline]
    fn write_u32(&mut self, n: u32) -> io::Result<()> {
        WriteBytesExt::write_u32::<LE>(self, n)
    }

    /// Writes a IEEE754 single-precision (4 bytes) floating point number
    /// to the underlying writer.
    #[inline]
    fn write_f32(&mut self, n: f32) -> io::Result<()> {
        WriteBytesExt::write_f32::<LE>(self, n)
    }

    /// Write a blob of raw data.
    #[inline]
    fn write_blob(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)
    }

    #[inline]
    fn write_vec3(&mut self, vec: Vec3) -> io::Result<()> {
        self.write_f32(vec.x)?;
        self.write_f32(vec.y)?;
        self.write_f32(vec.z)
    }

    /// Write a relative XZ coordinate pair packed as two 8.8 fixed-point values.
    fn write_packed_xz(&mut self, x: f32, z: f32) -> io::Result<()> {
        self.write_i16(pack_fixed88(x))?;
        self.write_i16(pack_fixed88(z))
    }

    /// Write a relative Y coordinate packed as one 8.8 fixed-point value.
    #[inline]
    fn write_packed_y(&mut self, y: f32) -> io::Result<()> {
        self.write_i16(pack_fixed88(y))
    }

    /// Write an angle quantized to a signed 8-bit fraction of ±π.
    #[inline]
    fn write_angle(&mut self, radians: f32) -> io::Result<()> {
        self.write_i8(pack_angle(radians))
    }

}

impl<W: Write> CellWriteExt for W {}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn fixed88_saturates() {
        assert_eq!(pack_fixed88(0.0), 0);
        assert_eq!(pack_fixed88(1.0), 256);
        assert_eq!(pack_fixed88(-1.0), -256);
        assert_eq!(pack_fixed88(1000.0), i16::MAX);
        assert_eq!(pack_fixed88(-1000.0), i16::MIN);
        // Quantization error stays below half a step.
        let v = 12.3456;
        assert!((unpack_fixed88(pack_fixed88(v)) - v).abs() <= 1.0 / 512.0);
    }

    #[test]
    fn angle_quantization() {
        assert_eq!(pack_angle(0.0), 0);
        assert_eq!(pack_angle(PI), i8::MAX); // +π saturates, -π is exact.
        assert_eq!(pack_angle(-PI), -128);
        let v = PI / 3.0;
        assert!((unpack_angle(pack_angle(v)) - v).abs() <= PI / 256.0);
    }

    #[test]
    fn packed_roundtrip_through_stream() {
        let mut buf = Vec::new();
        buf.write_packed_xz(4.5, -2.25).unwrap();
        buf.write_packed_y(0.5).unwrap();
        assert_eq!(buf.len(), 6);
        let mut read = &buf[..];
        assert_eq!(read.read_packed_xz().unwrap(), (4.5, -2.25));
        assert_eq!(read.read_packed_y().unwrap(), 0.5);
    }

}
