//! Internal: the Reader type.

use crate::{Error, Readable, Result};

/// A cursor over an in-memory SOCKS message.
///
/// Every accessor fails with [`Error::Truncated`] instead of panicking
/// when the input runs out; the decoder treats that as "wait for more
/// bytes".  Accessors that fail part-way leave the cursor where it was.
///
/// # Example
///
/// ```
/// use burrow_bytes::{Reader, Result};
/// let msg = [ 0x05, 0x01, 0x00, 0x01, 0x7f, 0x00, 0x00, 0x01, 0x01, 0xbb ];
/// let mut r = Reader::from_slice(&msg[..]);
/// assert_eq!(r.take_u8()?, 5);
/// assert_eq!(r.take_u8()?, 1);
/// r.advance(2)?;
/// assert_eq!(r.take(4)?, &[0x7f, 0, 0, 1]);
/// assert_eq!(r.take_u16()?, 443);
/// r.should_be_exhausted()?;
/// # Result::Ok(())
/// ```
#[derive(Clone, Debug)]
pub struct Reader<'a> {
    /// The whole message.
    buf: &'a [u8],
    /// How many bytes of `buf` we've used up.
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    /// Return the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Return the number of bytes read so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Skip over `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Fail with [`Error::ExtraneousBytes`] unless every byte has been
    /// read.
    pub fn should_be_exhausted(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            _ => Err(Error::ExtraneousBytes),
        }
    }

    /// Read the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read one byte.
    pub fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u16.
    pub fn take_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a one-byte length, then that many bytes.
    ///
    /// SOCKS5 encodes method lists, hostnames, usernames, and passwords
    /// this way.
    pub fn take_u8_prefixed(&mut self) -> Result<&'a [u8]> {
        self.rewind_on_err(|r| {
            let len = r.take_u8()?;
            r.take(usize::from(len))
        })
    }

    /// Decode a [`Readable`] value.
    pub fn extract<E: Readable>(&mut self) -> Result<E> {
        self.rewind_on_err(E::take_from)
    }

    /// Run `f`; if it fails, put the cursor back where it started.
    fn rewind_on_err<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let start = self.pos;
        let outcome = f(self);
        if outcome.is_err() {
            self.pos = start;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_ok() {
        let bytes = b"\x05\x02\x00\x02tail";
        let mut r = Reader::from_slice(&bytes[..]);
        assert_eq!(r.remaining(), 8);
        assert_eq!(r.take_u8().unwrap(), 5);
        assert_eq!(r.take_u8_prefixed().unwrap(), &[0x00, 0x02]);
        assert_eq!(r.consumed(), 4);
        assert_eq!(r.take(4).unwrap(), b"tail");
        assert!(r.should_be_exhausted().is_ok());
    }

    #[test]
    fn read_missing() {
        let bytes = b"\x01\x02\x03";
        let mut r = Reader::from_slice(&bytes[..]);
        assert_eq!(r.take(4), Err(Error::Truncated));
        assert_eq!(r.consumed(), 0);
        assert_eq!(r.take_u16().unwrap(), 0x0102);
        assert_eq!(r.take_u16(), Err(Error::Truncated));
        assert_eq!(r.advance(2), Err(Error::Truncated));
        assert_eq!(r.should_be_exhausted(), Err(Error::ExtraneousBytes));
        assert_eq!(r.take_u8().unwrap(), 3);
        assert!(r.should_be_exhausted().is_ok());
    }

    #[test]
    fn prefixed_truncated_rewinds() {
        let bytes = b"\x05abc";
        let mut r = Reader::from_slice(&bytes[..]);
        assert_eq!(r.take_u8_prefixed(), Err(Error::Truncated));
        assert_eq!(r.consumed(), 0);
    }

    #[test]
    fn extract_rewinds() {
        use std::net::Ipv4Addr;
        let bytes = [0x7f, 0x00, 0x00];
        let mut r = Reader::from_slice(&bytes[..]);
        let ip: Result<Ipv4Addr> = r.extract();
        assert_eq!(ip, Err(Error::Truncated));
        assert_eq!(r.consumed(), 0);
    }
}
