//! Structures for building and reading bundles of elements.
//!
//! A bundle is the unit pushed onto a client channel's outbound queue: a
//! contiguous byte sequence of elements, each prefixed by its one-byte id and
//! its length header. Its byte length is what the per-tick packet budget is
//! accounted against.

use std::io::{self, Cursor};
use std::fmt;

use crate::util::BytesFmt;

use super::element::{ElementLength, SimpleElement, TopElement};


/// An elements bundle, used to pack elements and encode them.
#[derive(Default)]
pub struct Bundle {
    /// Contiguous encoded elements.
    data: Vec<u8>,
}

impl Bundle {

    /// Construct a new empty bundle, this bundle doesn't allocate until you
    /// add the first element.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total size of this bundle in bytes, headers included.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the raw encoded data of this bundle.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Add an element to this bundle, returning the number of bytes it
    /// occupies, header included.
    pub fn add_element<E: TopElement>(&mut self, elt: &E) -> usize {
        self.add_element_with(E::ID, E::LEN, |data| elt.encode(data))
    }

    /// Add an already-encoded element payload under the given id and length
    /// kind, returning the number of bytes it occupies, header included.
    pub fn add_element_raw(&mut self, id: u8, len: ElementLength, payload: &[u8]) -> usize {
        self.add_element_with(id, len, |data| {
            data.extend_from_slice(payload);
            Ok(())
        })
    }

    fn add_element_with(&mut self, id: u8, len: ElementLength,
        encode: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> usize
    {

        let elt_offset = self.data.len();
        self.data.push(id);

        // Reserve the length header, it is patched once the payload is known.
        let len_offset = self.data.len();
        self.data.resize(len_offset + len.len(), 0);

        // No IO error can be produced when writing to a vector.
        encode(&mut self.data).unwrap();

        let payload_len = self.data.len() - len_offset - len.len();
        len.write(Cursor::new(&mut self.data[len_offset..]), payload_len as u32).unwrap();

        self.data.len() - elt_offset

    }

    /// Iterate over the elements of this bundle, the given resolver maps an
    /// element id to the way its length is encoded, returning `None` for
    /// unknown ids.
    pub fn element_reader(&self, length_resolver: fn(u8) -> Option<ElementLength>) -> BundleElementReader<'_> {
        BundleElementReader {
            data: &self.data[..],
            length_resolver,
        }
    }

}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Bundle")
            .field(&self.data.len())
            .field(&format_args!("{:X}", BytesFmt(&self.data)))
            .finish()
    }
}


/// An iterator-like reader fetching each element of a bundle in order.
pub struct BundleElementReader<'bundle> {
    data: &'bundle [u8],
    length_resolver: fn(u8) -> Option<ElementLength>,
}

impl<'bundle> BundleElementReader<'bundle> {

    /// Iterate over already-encoded bundle data, see
    /// [`Bundle::element_reader`].
    pub fn new(data: &'bundle [u8], length_resolver: fn(u8) -> Option<ElementLength>) -> Self {
        Self {
            data,
            length_resolver,
        }
    }

    /// Read the next raw element, `None` when the bundle is exhausted.
    pub fn next_element(&mut self) -> Option<io::Result<RawElement<'bundle>>> {

        if self.data.is_empty() {
            return None;
        }

        let id = self.data[0];
        let Some(len) = (self.length_resolver)(id) else {
            return Some(Err(io::Error::new(io::ErrorKind::InvalidData,
                format!("unknown element id: {id:02X}"))));
        };

        let header_len = 1 + len.len();
        let payload_len = match len.read(&self.data[1..]) {
            Ok(n) => n as usize,
            Err(e) => return Some(Err(e)),
        };

        if self.data.len() < header_len + payload_len {
            return Some(Err(io::Error::new(io::ErrorKind::UnexpectedEof,
                format!("truncated element: {id:02X}"))));
        }

        let payload = &self.data[header_len..header_len + payload_len];
        self.data = &self.data[header_len + payload_len..];
        Some(Ok(RawElement { id, data: payload }))

    }

}

/// A raw element read from a bundle: its id and its payload bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawElement<'bundle> {
    pub id: u8,
    pub data: &'bundle [u8],
}

impl RawElement<'_> {

    /// Decode this raw element's payload as the given top element type.
    pub fn read<E: TopElement>(&self) -> io::Result<E> {
        debug_assert_eq!(self.id, E::ID);
        E::decode(&mut &self.data[..], self.data.len())
    }

}
