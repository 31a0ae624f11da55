//! Implementations of Writeable and Readable for the primitive items
//! that SOCKS messages are built from.

use super::*;

use std::net::{Ipv4Addr, Ipv6Addr};

/// Vec<u8> is the main type that implements Writer.
impl Writer for Vec<u8> {
    fn write_all(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
    fn write_u8(&mut self, byte: u8) {
        self.push(byte);
    }
}

impl Writer for bytes::BytesMut {
    fn write_all(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl Writeable for [u8] {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
        b.write_all(self)
    }
}

impl Writeable for Vec<u8> {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
        b.write_all(&self[..])
    }
}

// Implementations for reading and writing the unsigned types.
macro_rules! impl_u {
    ( $t:ty, $wrfn:ident, $rdfn:ident ) => {
        impl Writeable for $t {
            fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
                b.$wrfn(*self)
            }
        }
        impl Readable for $t {
            fn take_from(b: &mut Reader<'_>) -> Result<Self> {
                b.$rdfn()
            }
        }
    };
}

impl_u!(u8, write_u8, take_u8);
impl_u!(u16, write_u16, take_u16);

impl Writeable for Ipv4Addr {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
        b.write_all(&self.octets()[..])
    }
}

impl Readable for Ipv4Addr {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let b = r.take(4)?;
        Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    }
}

impl Writeable for Ipv6Addr {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) {
        b.write_all(&self.octets()[..])
    }
}

impl Readable for Ipv6Addr {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let mut octets = [0_u8; 16];
        octets.copy_from_slice(r.take(16)?);
        Ok(octets.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn addrs() {
        let v4: Ipv4Addr = "192.0.2.7".parse().unwrap();
        let v6: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let mut w: Vec<u8> = Vec::new();
        w.write(&v4);
        w.write(&v6);
        assert_eq!(
            &w[..],
            &hex!("C0000207 20010DB8000000000000000000000001")[..]
        );

        let mut r = Reader::from_slice(&w[..]);
        let v4b: Ipv4Addr = r.extract().unwrap();
        let v6b: Ipv6Addr = r.extract().unwrap();
        assert_eq!(v4, v4b);
        assert_eq!(v6, v6b);
        r.should_be_exhausted().unwrap();
    }

    #[test]
    fn bytesmut() {
        let mut w = bytes::BytesMut::new();
        w.write_u16(1080);
        w.write(&b"ok"[..]);
        assert_eq!(&w[..], &hex!("0438 6F6B")[..]);
    }
}
