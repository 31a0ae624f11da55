//! Internal: the Writer trait.

use crate::Writeable;

/// A growable buffer that SOCKS messages are encoded into.
///
/// Appending can't fail, so none of these methods return a Result.
pub trait Writer {
    /// Append `bytes`.
    fn write_all(&mut self, bytes: &[u8]);

    /// Append one byte.
    fn write_u8(&mut self, x: u8) {
        self.write_all(&[x])
    }

    /// Append a big-endian u16.
    fn write_u16(&mut self, x: u16) {
        self.write_all(&x.to_be_bytes())
    }

    /// Append the encoding of `e`.
    fn write<E: Writeable + ?Sized>(&mut self, e: &E) {
        e.write_onto(self)
    }
}
