//! `burrow-bytes`: Utilities to decode/encode small wire messages.
//!
//! # Overview
//!
//! This crate is part of Burrow, a SOCKS5 proxy and encrypted tunnel
//! client.  The other Burrow crates use it to build and parse the
//! byte-oriented messages of the SOCKS5 protocol.
//!
//! It is meant for formats that are too irregular for serde and too
//! simple to need a parser generator.  Everything here works on bytes
//! that are already in memory: IO belongs to the caller.
//!
//! # Contents and concepts
//!
//! * [`Reader`]: A view of a byte slice, from which data can be decoded.
//! * [`Writer`]: Trait to represent a growable buffer of bytes.
//!   (`Vec<u8>` and [`bytes::BytesMut`] implement this.)
//! * [`Writeable`]: Trait for an object that can be encoded onto a [`Writer`]
//! * [`Readable`]: Trait for an object that can be decoded from a [`Reader`].
//!
//! Multi-byte integers are always big-endian ("network order").

#![deny(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::needless_borrow)]
#![deny(clippy::unnecessary_wraps)]

mod err;
mod impls;
mod reader;
mod writer;

pub use err::Error;
pub use reader::Reader;
pub use writer::Writer;

/// Result type returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for an object that can be encoded onto a Writer by reference.
///
/// # Example
///
/// ```
/// use burrow_bytes::{Writeable, Writer};
/// struct Greeting {
///   version: u8,
///   methods: Vec<u8>,
/// }
///
/// impl Writeable for Greeting {
///     fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
///         b.write_u8(self.version);
///         b.write_u8(self.methods.len() as u8);
///         b.write_all(&self.methods[..]);
///     }
/// }
///
/// let msg = Greeting { version: 5, methods: vec![0, 2] };
/// let mut w: Vec<u8> = Vec::new();
/// w.write(&msg);
/// assert_eq!(w, &[5, 2, 0, 2]);
/// ```
pub trait Writeable {
    /// Encode this object into the writer `b`.
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B);
}

/// Trait for an object that can be extracted from a Reader.
///
/// # Example
///
/// ```
/// use burrow_bytes::{Readable, Reader, Result};
/// #[derive(Debug, Eq, PartialEq)]
/// struct Reply {
///   version: u8,
///   status: u8,
/// }
///
/// impl Readable for Reply {
///     fn take_from(r: &mut Reader<'_>) -> Result<Self> {
///         let version = r.take_u8()?;
///         let status = r.take_u8()?;
///         Ok(Reply { version, status })
///     }
/// }
///
/// let encoded = [0x01, 0x00];
/// let mut reader = Reader::from_slice(&encoded);
/// let m: Reply = reader.extract()?;
/// assert_eq!(m, Reply { version: 1, status: 0 });
/// reader.should_be_exhausted()?;
/// # Result::Ok(())
/// ```
pub trait Readable: Sized {
    /// Try to extract an object of this type from a Reader.
    fn take_from(b: &mut Reader<'_>) -> Result<Self>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn writer() {
        let mut v: Vec<u8> = Vec::new();
        v.write_u8(0x05);
        v.write_u16(0x0102);
        v.write(&0x7f_u8);
        v.write_all(b"burrow");
        assert_eq!(&v[..], &b"\x05\x01\x02\x7fburrow"[..]);
    }
}
