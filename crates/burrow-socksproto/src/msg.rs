//! Values that appear inside SOCKS5 packets

use crate::{Error, Result};

use burrow_bytes::{Reader, Writeable, Writer};
use caret::caret_int;
use std::convert::TryFrom;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

caret_int! {
    /// An authentication method, as offered by a client or chosen by
    /// a server.
    pub struct SocksMethod(u8) {
        /// No authentication required.
        NO_AUTH = 0x00,
        /// GSSAPI (RFC 1961).  We never select it.
        GSSAPI = 0x01,
        /// Username and password (RFC 1929).
        USER_PASS = 0x02,
        /// Sent by the server when none of the offered methods is
        /// acceptable.
        NO_ACCEPTABLE = 0xFF,
    }
}

caret_int! {
    /// Command from the socks client telling us what to do.
    pub struct SocksCmd(u8) {
        /// Connect to a remote TCP address:port.
        CONNECT = 1,
        /// Not supported by Burrow.
        BIND = 2,
        /// Not supported by Burrow.
        UDP_ASSOCIATE = 3,
    }
}

caret_int! {
    /// Possible reply values for a CONNECT request.
    ///
    /// The documentation for these values is limited to what
    /// RFC 1928 says.
    pub struct SocksReply(u8) {
        /// RFC 1928: "succeeded"
        SUCCEEDED = 0x00,
        /// RFC 1928: "general SOCKS server failure"
        GENERAL_FAILURE = 0x01,
        /// RFC 1928: "connection not allowable by ruleset"
        NOT_ALLOWED = 0x02,
        /// RFC 1928: "Network unreachable"
        NETWORK_UNREACHABLE = 0x03,
        /// RFC 1928: "Host unreachable"
        HOST_UNREACHABLE = 0x04,
        /// RFC 1928: "Connection refused"
        CONNECTION_REFUSED = 0x05,
        /// RFC 1928: "TTL expired"
        TTL_EXPIRED = 0x06,
        /// RFC 1928: "Command not supported"
        COMMAND_NOT_SUPPORTED = 0x07,
        /// RFC 1928: "Address type not supported"
        ADDRTYPE_NOT_SUPPORTED = 0x08,
    }
}

caret_int! {
    /// Result of a username/password subnegotiation.
    pub struct AuthStatus(u8) {
        /// The credentials were accepted.
        SUCCEEDED = 0x00,
        /// The credentials were rejected.  The server closes the
        /// connection after sending this.
        FAILED = 0x01,
    }
}

caret_int! {
    /// The type of a [`SocksAddr`] on the wire.
    pub struct AddrType(u8) {
        /// Four bytes of IPv4 address.
        IPV4 = 0x01,
        /// A length byte, followed by that many bytes of hostname.
        HOSTNAME = 0x03,
        /// Sixteen bytes of IPv6 address.
        IPV6 = 0x04,
    }
}

/// An address sent or received as part of a SOCKS exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocksAddr {
    /// A regular DNS hostname.
    Hostname(SocksHostname),
    /// An IP address.
    Ip(IpAddr),
}

/// A hostname for use with SOCKS.  It is limited in length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocksHostname(String);

impl TryFrom<String> for SocksHostname {
    type Error = Error;
    fn try_from(s: String) -> Result<SocksHostname> {
        if s.len() > 255 {
            Err(Error::Syntax("hostname longer than 255 bytes"))
        } else {
            Ok(SocksHostname(s))
        }
    }
}

impl AsRef<str> for SocksHostname {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<SocksHostname> for String {
    fn from(s: SocksHostname) -> String {
        s.0
    }
}

impl From<IpAddr> for SocksAddr {
    fn from(a: IpAddr) -> SocksAddr {
        SocksAddr::Ip(a)
    }
}

impl SocksAddr {
    /// Build an address from a string, treating it as an IP address if it
    /// parses as one, and as a hostname otherwise.
    pub fn parse(s: &str) -> Result<SocksAddr> {
        match s.parse::<IpAddr>() {
            Ok(ip) => Ok(SocksAddr::Ip(ip)),
            Err(_) => Ok(SocksAddr::Hostname(SocksHostname::try_from(
                s.to_string(),
            )?)),
        }
    }

    /// Return the wire type of this address.
    pub fn addr_type(&self) -> AddrType {
        match self {
            SocksAddr::Ip(IpAddr::V4(_)) => AddrType::IPV4,
            SocksAddr::Ip(IpAddr::V6(_)) => AddrType::IPV6,
            SocksAddr::Hostname(_) => AddrType::HOSTNAME,
        }
    }

    /// Read an address type byte and the address that follows it.
    pub(crate) fn take_from(r: &mut Reader<'_>) -> Result<SocksAddr> {
        let atype: AddrType = r.take_u8()?.into();
        match atype {
            AddrType::IPV4 => {
                let ip4: Ipv4Addr = r.extract()?;
                Ok(SocksAddr::Ip(ip4.into()))
            }
            AddrType::IPV6 => {
                let ip6: Ipv6Addr = r.extract()?;
                Ok(SocksAddr::Ip(ip6.into()))
            }
            AddrType::HOSTNAME => {
                let hostname = r.take_u8_prefixed()?;
                let hostname = std::str::from_utf8(hostname)
                    .map_err(|_| Error::Syntax("hostname is not valid UTF-8"))?
                    .to_string();
                Ok(SocksAddr::Hostname(SocksHostname::try_from(hostname)?))
            }
            other => Err(Error::BadAddrType(u8::from(other))),
        }
    }

    /// Given a reader positioned at an address type byte, return how many
    /// bytes the whole address occupies, type byte included.
    ///
    /// Fails with [`Error::Truncated`] when not even the length can be
    /// known yet, and with [`Error::BadAddrType`] as soon as the type
    /// byte is seen to be bad.
    pub(crate) fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        let atype: AddrType = r.take_u8()?.into();
        match atype {
            AddrType::IPV4 => Ok(1 + 4),
            AddrType::IPV6 => Ok(1 + 16),
            AddrType::HOSTNAME => Ok(1 + 1 + r.take_u8()? as usize),
            other => Err(Error::BadAddrType(u8::from(other))),
        }
    }
}

impl Writeable for SocksAddr {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(u8::from(self.addr_type()));
        match self {
            SocksAddr::Ip(IpAddr::V4(ip)) => w.write(ip),
            SocksAddr::Ip(IpAddr::V6(ip)) => w.write(ip),
            SocksAddr::Hostname(h) => {
                // Length is checked when the hostname is built.
                let h = h.as_ref().as_bytes();
                w.write_u8(h.len() as u8);
                w.write_all(h);
            }
        }
    }
}

impl fmt::Display for SocksAddr {
    /// Format a string (a hostname or IP address) corresponding to this
    /// SocksAddr.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksAddr::Ip(a) => write!(f, "{}", a),
            SocksAddr::Hostname(h) => write!(f, "{}", h.0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn display_sa() {
        let a = SocksAddr::Ip(IpAddr::V4("127.0.0.1".parse().unwrap()));
        assert_eq!(a.to_string(), "127.0.0.1");

        let a = SocksAddr::Ip(IpAddr::V6("f00::9999".parse().unwrap()));
        assert_eq!(a.to_string(), "f00::9999");

        let a = SocksAddr::parse("www.example.com").unwrap();
        assert_eq!(a.to_string(), "www.example.com");
        assert_eq!(a.addr_type(), AddrType::HOSTNAME);
    }

    #[test]
    fn hostname_too_long() {
        let long = "a".repeat(256);
        assert!(matches!(
            SocksHostname::try_from(long),
            Err(Error::Syntax(_))
        ));
        assert!(SocksHostname::try_from("a".repeat(255)).is_ok());
    }

    #[test]
    fn encode_addrs() {
        let mut v = Vec::new();
        v.write(&SocksAddr::parse("10.0.0.1").unwrap());
        assert_eq!(&v[..], &hex!("01 0a000001")[..]);

        let mut v = Vec::new();
        v.write(&SocksAddr::parse("::1").unwrap());
        assert_eq!(
            &v[..],
            &hex!("04 00000000000000000000000000000001")[..]
        );

        let mut v = Vec::new();
        v.write(&SocksAddr::parse("abc.de").unwrap());
        assert_eq!(&v[..], &hex!("03 06 6162632e6465")[..]);
    }

    #[test]
    fn wire_len() {
        let mut r = Reader::from_slice(&hex!("03 06"));
        assert_eq!(SocksAddr::wire_len(&mut r).unwrap(), 8);

        let mut r = Reader::from_slice(&hex!("03"));
        assert!(matches!(SocksAddr::wire_len(&mut r), Err(Error::Truncated)));

        let mut r = Reader::from_slice(&hex!("02"));
        assert!(matches!(
            SocksAddr::wire_len(&mut r),
            Err(Error::BadAddrType(2))
        ));
    }

    #[test]
    fn decode_bad_hostname() {
        let mut r = Reader::from_slice(&hex!("03 02 c328"));
        assert!(matches!(
            SocksAddr::take_from(&mut r),
            Err(Error::Syntax(_))
        ));
    }
}
