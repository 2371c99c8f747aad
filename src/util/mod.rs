//! Provides various internal utilities.

use std::fmt;

pub mod io;


/// A formatter wrapper for printing a byte slice as contiguous
/// hexadecimal digits.
pub struct BytesFmt<'a>(pub &'a [u8]);

impl fmt::UpperHex for BytesFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
