//! The packets exchanged during a SOCKS5 session.
//!
//! Every packet type implements [`SocksPacket`], which knows how to
//! find the length of a packet at the head of a buffer, and how to
//! parse it once enough bytes are present.  Encoding goes through
//! [`Writeable`].

use crate::msg::{AddrType, AuthStatus, SocksAddr, SocksCmd, SocksMethod, SocksReply};
use crate::{Error, Result, AUTH_VERSION, SOCKS_VERSION};

use burrow_bytes::{Reader, Writeable, Writer};

/// The kind of a [`Packet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// A [`HandshakeRequest`].
    HandshakeRequest,
    /// A [`HandshakeResponse`].
    HandshakeResponse,
    /// An [`AuthRequest`].
    AuthRequest,
    /// An [`AuthResponse`].
    AuthResponse,
    /// A [`ConnectRequest`].
    ConnectRequest,
    /// A [`ConnectResponse`].
    ConnectResponse,
    /// A [`TunnelRequest`].
    TunnelRequest,
}

/// Trait implemented by every packet type.
pub trait SocksPacket: Sized + Writeable {
    /// The kind of this packet.
    const KIND: PacketKind;

    /// Given a reader positioned at the start of a packet, return the
    /// packet's total length on the wire.
    ///
    /// Reads only as far as the length-determining fields, validating
    /// every byte it reads.  Returns [`Error::Truncated`] if those
    /// fields are not all present yet.
    fn wire_len(r: &mut Reader<'_>) -> Result<usize>;

    /// Parse a packet from a reader that holds exactly one packet.
    fn decode(r: &mut Reader<'_>) -> Result<Self>;

    /// Return the length of the packet at the head of `buf`, or 0 if
    /// it can't be known yet.
    ///
    /// A bad field value is reported as soon as its byte is present,
    /// even when the length is still unknown.
    fn packet_len(buf: &[u8]) -> Result<usize> {
        match Self::wire_len(&mut Reader::from_slice(buf)) {
            Err(Error::Truncated) => Ok(0),
            other => other,
        }
    }

    /// Parse the packet at the head of `buf`.  Bytes after the packet
    /// are ignored.
    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let len = Self::packet_len(buf)?;
        if len == 0 || buf.len() < len {
            return Err(Error::Truncated);
        }
        let mut r = Reader::from_slice(&buf[..len]);
        let packet = Self::decode(&mut r)?;
        r.should_be_exhausted()?;
        Ok(packet)
    }

    /// Return the canonical wire encoding of this packet.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.write(self);
        v
    }
}

/// Return an error unless `found` is the version we expect.
fn check_version(found: u8, expected: u8) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(Error::BadVersion(found))
    }
}

/// Read a length-prefixed UTF-8 string, as used in [`AuthRequest`].
fn take_string(r: &mut Reader<'_>, what: &'static str) -> Result<String> {
    let s = r.take_u8_prefixed()?;
    std::str::from_utf8(s)
        .map(str::to_string)
        .map_err(|_| Error::Syntax(what))
}

/// Write `s` with a one-byte length prefix.  The caller has already
/// checked that it fits.
fn write_string<B: Writer + ?Sized>(w: &mut B, s: &str) {
    w.write_u8(s.len() as u8);
    w.write_all(s.as_bytes());
}

/// A client's opening message: `[ver][nmethods][methods]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Protocol version; always 5.
    version: u8,
    /// The authentication methods that the client offers.
    methods: Vec<SocksMethod>,
}

impl HandshakeRequest {
    /// Construct a new HandshakeRequest offering `methods`.
    pub fn new(methods: Vec<SocksMethod>) -> Result<Self> {
        if methods.len() > 255 {
            return Err(Error::Syntax("too many authentication methods"));
        }
        Ok(HandshakeRequest {
            version: SOCKS_VERSION,
            methods,
        })
    }
    /// Return the protocol version of this request.
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Return the offered methods, in the order the client sent them.
    pub fn methods(&self) -> &[SocksMethod] {
        &self.methods[..]
    }
    /// Return true if the client offered `method`.
    pub fn offers(&self, method: SocksMethod) -> bool {
        self.methods.contains(&method)
    }
}

impl SocksPacket for HandshakeRequest {
    const KIND: PacketKind = PacketKind::HandshakeRequest;
    fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        check_version(r.take_u8()?, SOCKS_VERSION)?;
        let n = r.take_u8()? as usize;
        Ok(2 + n)
    }
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        check_version(version, SOCKS_VERSION)?;
        let methods = r.take_u8_prefixed()?.iter().map(|m| (*m).into()).collect();
        Ok(HandshakeRequest { version, methods })
    }
}

impl Writeable for HandshakeRequest {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(self.version);
        w.write_u8(self.methods.len() as u8);
        for m in &self.methods {
            w.write_u8(u8::from(*m));
        }
    }
}

/// The server's choice of method: `[ver][method]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Protocol version; always 5.
    version: u8,
    /// The method the server selected, or NO_ACCEPTABLE.
    method: SocksMethod,
}

impl HandshakeResponse {
    /// Construct a new HandshakeResponse selecting `method`.
    pub fn new(method: SocksMethod) -> Self {
        HandshakeResponse {
            version: SOCKS_VERSION,
            method,
        }
    }
    /// Return the protocol version of this response.
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Return the selected method.
    pub fn method(&self) -> SocksMethod {
        self.method
    }
}

impl SocksPacket for HandshakeResponse {
    const KIND: PacketKind = PacketKind::HandshakeResponse;
    fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        check_version(r.take_u8()?, SOCKS_VERSION)?;
        Ok(2)
    }
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        check_version(version, SOCKS_VERSION)?;
        let method = r.take_u8()?.into();
        Ok(HandshakeResponse { version, method })
    }
}

impl Writeable for HandshakeResponse {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(self.version);
        w.write_u8(u8::from(self.method));
    }
}

/// A username/password subnegotiation: `[ver][ulen][user][plen][pass]`.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Subnegotiation version; always 1.
    version: u8,
    /// The username.
    username: String,
    /// The password.
    password: String,
}

impl AuthRequest {
    /// Construct a new AuthRequest.
    ///
    /// Fails if either string is longer than 255 bytes.
    pub fn new(username: &str, password: &str) -> Result<Self> {
        if username.len() > 255 || password.len() > 255 {
            return Err(Error::Syntax("username or password longer than 255 bytes"));
        }
        Ok(AuthRequest {
            version: AUTH_VERSION,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
    /// Return the subnegotiation version of this request.
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Return the username.
    pub fn username(&self) -> &str {
        &self.username
    }
    /// Return the password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("version", &self.version)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl SocksPacket for AuthRequest {
    const KIND: PacketKind = PacketKind::AuthRequest;
    fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        check_version(r.take_u8()?, AUTH_VERSION)?;
        let ulen = r.take_u8()? as usize;
        r.advance(ulen)?;
        let plen = r.take_u8()? as usize;
        Ok(3 + ulen + plen)
    }
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        check_version(version, AUTH_VERSION)?;
        let username = take_string(r, "username is not valid UTF-8")?;
        let password = take_string(r, "password is not valid UTF-8")?;
        Ok(AuthRequest {
            version,
            username,
            password,
        })
    }
}

impl Writeable for AuthRequest {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(self.version);
        write_string(w, &self.username);
        write_string(w, &self.password);
    }
}

/// The outcome of a subnegotiation: `[ver][status]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthResponse {
    /// Subnegotiation version; always 1.
    version: u8,
    /// Whether the credentials were accepted.
    status: AuthStatus,
}

impl AuthResponse {
    /// Construct a new AuthResponse.
    pub fn new(status: AuthStatus) -> Self {
        AuthResponse {
            version: AUTH_VERSION,
            status,
        }
    }
    /// Return the subnegotiation version of this response.
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Return the status.
    pub fn status(&self) -> AuthStatus {
        self.status
    }
}

/// Read an [`AuthStatus`], rejecting values we don't know.
fn take_auth_status(r: &mut Reader<'_>) -> Result<AuthStatus> {
    let status: AuthStatus = r.take_u8()?.into();
    if status.is_recognized() {
        Ok(status)
    } else {
        Err(Error::BadAuthStatus(u8::from(status)))
    }
}

impl SocksPacket for AuthResponse {
    const KIND: PacketKind = PacketKind::AuthResponse;
    fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        check_version(r.take_u8()?, AUTH_VERSION)?;
        take_auth_status(r)?;
        Ok(2)
    }
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        check_version(version, AUTH_VERSION)?;
        let status = take_auth_status(r)?;
        Ok(AuthResponse { version, status })
    }
}

impl Writeable for AuthResponse {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(self.version);
        w.write_u8(u8::from(self.status));
    }
}

/// A request to reach a destination:
/// `[ver][cmd][rsv][atyp][addr][port]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Protocol version; always 5.
    version: u8,
    /// What the client wants us to do.
    command: SocksCmd,
    /// The destination address.
    addr: SocksAddr,
    /// The destination port.
    port: u16,
}

impl ConnectRequest {
    /// Construct a new ConnectRequest.
    pub fn new(command: SocksCmd, addr: SocksAddr, port: u16) -> Self {
        ConnectRequest {
            version: SOCKS_VERSION,
            command,
            addr,
            port,
        }
    }
    /// Return the protocol version of this request.
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Return the command the client requested.
    pub fn command(&self) -> SocksCmd {
        self.command
    }
    /// Return the wire type of the requested address.
    pub fn address_type(&self) -> AddrType {
        self.addr.addr_type()
    }
    /// Return the requested address.
    pub fn addr(&self) -> &SocksAddr {
        &self.addr
    }
    /// Return the requested port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Read a [`SocksCmd`], rejecting values we don't know.
fn take_command(r: &mut Reader<'_>) -> Result<SocksCmd> {
    let cmd: SocksCmd = r.take_u8()?.into();
    if cmd.is_recognized() {
        Ok(cmd)
    } else {
        Err(Error::BadCommand(u8::from(cmd)))
    }
}

impl SocksPacket for ConnectRequest {
    const KIND: PacketKind = PacketKind::ConnectRequest;
    fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        check_version(r.take_u8()?, SOCKS_VERSION)?;
        take_command(r)?;
        r.advance(1)?;
        let alen = SocksAddr::wire_len(r)?;
        Ok(3 + alen + 2)
    }
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        check_version(version, SOCKS_VERSION)?;
        let command = take_command(r)?;
        let _ignore = r.take_u8()?;
        let addr = SocksAddr::take_from(r)?;
        let port = r.take_u16()?;
        Ok(ConnectRequest {
            version,
            command,
            addr,
            port,
        })
    }
}

impl Writeable for ConnectRequest {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(self.version);
        w.write_u8(u8::from(self.command));
        w.write_u8(0); // reserved
        w.write(&self.addr);
        w.write_u16(self.port);
    }
}

/// The server's answer to a [`ConnectRequest`]:
/// `[ver][reply][rsv][atyp][addr][port]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Protocol version; always 5.
    version: u8,
    /// Whether we could do what the client asked.
    reply: SocksReply,
    /// The bound address.
    addr: SocksAddr,
    /// The bound port.
    port: u16,
}

impl ConnectResponse {
    /// Construct a new ConnectResponse.
    pub fn new(reply: SocksReply, addr: SocksAddr, port: u16) -> Self {
        ConnectResponse {
            version: SOCKS_VERSION,
            reply,
            addr,
            port,
        }
    }
    /// Return the protocol version of this response.
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Return the reply code.
    pub fn reply(&self) -> SocksReply {
        self.reply
    }
    /// Return the wire type of the bound address.
    pub fn address_type(&self) -> AddrType {
        self.addr.addr_type()
    }
    /// Return the bound address.
    pub fn addr(&self) -> &SocksAddr {
        &self.addr
    }
    /// Return the bound port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Read a [`SocksReply`], rejecting values we don't know.
fn take_reply(r: &mut Reader<'_>) -> Result<SocksReply> {
    let reply: SocksReply = r.take_u8()?.into();
    if reply.is_recognized() {
        Ok(reply)
    } else {
        Err(Error::BadReply(u8::from(reply)))
    }
}

impl SocksPacket for ConnectResponse {
    const KIND: PacketKind = PacketKind::ConnectResponse;
    fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        check_version(r.take_u8()?, SOCKS_VERSION)?;
        take_reply(r)?;
        r.advance(1)?;
        let alen = SocksAddr::wire_len(r)?;
        Ok(3 + alen + 2)
    }
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        check_version(version, SOCKS_VERSION)?;
        let reply = take_reply(r)?;
        let _ignore = r.take_u8()?;
        let addr = SocksAddr::take_from(r)?;
        let port = r.take_u16()?;
        Ok(ConnectResponse {
            version,
            reply,
            addr,
            port,
        })
    }
}

impl Writeable for ConnectResponse {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(self.version);
        w.write_u8(u8::from(self.reply));
        w.write_u8(0); // reserved
        w.write(&self.addr);
        w.write_u16(self.port);
    }
}

/// The first message sent through an encrypted tunnel, naming the real
/// destination: `[ver][atyp][addr][port]`.
///
/// There is no response; relayed bytes follow immediately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TunnelRequest {
    /// Protocol version; always 5.
    version: u8,
    /// The destination address.
    addr: SocksAddr,
    /// The destination port.
    port: u16,
}

impl TunnelRequest {
    /// Construct a new TunnelRequest.
    pub fn new(addr: SocksAddr, port: u16) -> Self {
        TunnelRequest {
            version: SOCKS_VERSION,
            addr,
            port,
        }
    }
    /// Return the protocol version of this request.
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Return the wire type of the destination address.
    pub fn address_type(&self) -> AddrType {
        self.addr.addr_type()
    }
    /// Return the destination address.
    pub fn addr(&self) -> &SocksAddr {
        &self.addr
    }
    /// Return the destination port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<&ConnectRequest> for TunnelRequest {
    fn from(req: &ConnectRequest) -> TunnelRequest {
        TunnelRequest {
            version: req.version,
            addr: req.addr.clone(),
            port: req.port,
        }
    }
}

impl SocksPacket for TunnelRequest {
    const KIND: PacketKind = PacketKind::TunnelRequest;
    fn wire_len(r: &mut Reader<'_>) -> Result<usize> {
        check_version(r.take_u8()?, SOCKS_VERSION)?;
        let alen = SocksAddr::wire_len(r)?;
        Ok(1 + alen + 2)
    }
    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        check_version(version, SOCKS_VERSION)?;
        let addr = SocksAddr::take_from(r)?;
        let port = r.take_u16()?;
        Ok(TunnelRequest {
            version,
            addr,
            port,
        })
    }
}

impl Writeable for TunnelRequest {
    fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
        w.write_u8(self.version);
        w.write(&self.addr);
        w.write_u16(self.port);
    }
}

/// Any packet that Burrow knows how to encode or decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// See [`HandshakeRequest`].
    HandshakeRequest(HandshakeRequest),
    /// See [`HandshakeResponse`].
    HandshakeResponse(HandshakeResponse),
    /// See [`AuthRequest`].
    AuthRequest(AuthRequest),
    /// See [`AuthResponse`].
    AuthResponse(AuthResponse),
    /// See [`ConnectRequest`].
    ConnectRequest(ConnectRequest),
    /// See [`ConnectResponse`].
    ConnectResponse(ConnectResponse),
    /// See [`TunnelRequest`].
    TunnelRequest(TunnelRequest),
}

/// Implement the kind-based dispatch between [`PacketKind`], [`Packet`],
/// and the individual packet types.
macro_rules! packet_dispatch {
    { $( $name:ident ),* } => {
        impl PacketKind {
            /// Return the length of a packet of this kind at the head of
            /// `buf`, or 0 if it can't be known yet.
            pub fn packet_len(self, buf: &[u8]) -> Result<usize> {
                match self {
                    $( PacketKind::$name => $name::packet_len(buf), )*
                }
            }
            /// Parse a packet of this kind from the head of `buf`.
            pub fn parse(self, buf: &[u8]) -> Result<Packet> {
                match self {
                    $( PacketKind::$name => $name::from_bytes(buf).map(Packet::$name), )*
                }
            }
        }

        impl Packet {
            /// Return the kind of this packet.
            pub fn kind(&self) -> PacketKind {
                match self {
                    $( Packet::$name(_) => PacketKind::$name, )*
                }
            }
        }

        impl Writeable for Packet {
            fn write_onto<B: Writer + ?Sized>(&self, w: &mut B) {
                match self {
                    $( Packet::$name(p) => p.write_onto(w), )*
                }
            }
        }

        $(
            impl From<$name> for Packet {
                fn from(p: $name) -> Packet {
                    Packet::$name(p)
                }
            }
        )*
    }
}

packet_dispatch! {
    HandshakeRequest,
    HandshakeResponse,
    AuthRequest,
    AuthResponse,
    ConnectRequest,
    ConnectResponse,
    TunnelRequest
}

impl PacketKind {
    /// Return the version byte that every packet of this kind starts
    /// with.
    pub fn version(self) -> u8 {
        match self {
            PacketKind::AuthRequest | PacketKind::AuthResponse => AUTH_VERSION,
            _ => SOCKS_VERSION,
        }
    }
}

impl Packet {
    /// Return the canonical wire encoding of this packet.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        v.write(self);
        v
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;
    use std::net::IpAddr;

    fn localhost() -> SocksAddr {
        SocksAddr::Ip(IpAddr::V4("127.0.0.1".parse().unwrap()))
    }

    #[test]
    fn handshake_request() {
        let bytes = hex!("05 02 00 02");
        assert_eq!(HandshakeRequest::packet_len(&bytes[..1]).unwrap(), 0);
        assert_eq!(HandshakeRequest::packet_len(&bytes[..2]).unwrap(), 4);
        let p = HandshakeRequest::from_bytes(&bytes).unwrap();
        assert_eq!(p.version(), 5);
        assert_eq!(p.methods(), &[SocksMethod::NO_AUTH, SocksMethod::USER_PASS]);
        assert!(p.offers(SocksMethod::USER_PASS));
        assert!(!p.offers(SocksMethod::GSSAPI));
        assert_eq!(&p.to_bytes()[..], &bytes[..]);

        assert!(matches!(
            HandshakeRequest::packet_len(&hex!("04 01")),
            Err(Error::BadVersion(4))
        ));
    }

    #[test]
    fn handshake_response() {
        let p = HandshakeResponse::new(SocksMethod::NO_ACCEPTABLE);
        assert_eq!(&p.to_bytes()[..], &hex!("05 ff")[..]);
        assert_eq!(HandshakeResponse::from_bytes(&hex!("05 ff")).unwrap(), p);
    }

    #[test]
    fn auth_request() {
        let bytes = hex!("01 03 626f62 05 7269676874");
        // The length is known once the password length byte arrives.
        for n in 0..6 {
            assert_eq!(AuthRequest::packet_len(&bytes[..n]).unwrap(), 0);
        }
        assert_eq!(AuthRequest::packet_len(&bytes[..6]).unwrap(), bytes.len());
        let p = AuthRequest::from_bytes(&bytes).unwrap();
        assert_eq!(p.username(), "bob");
        assert_eq!(p.password(), "right");
        assert_eq!(p, AuthRequest::new("bob", "right").unwrap());
        assert_eq!(&p.to_bytes()[..], &bytes[..]);
        assert!(!format!("{:?}", p).contains("right"));

        assert!(AuthRequest::new(&"x".repeat(256), "pw").is_err());
        assert!(matches!(
            AuthRequest::from_bytes(&hex!("01 01 ff 00")),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn auth_response() {
        let p = AuthResponse::from_bytes(&hex!("01 01")).unwrap();
        assert_eq!(p.status(), AuthStatus::FAILED);
        assert!(matches!(
            AuthResponse::packet_len(&hex!("01 07")),
            Err(Error::BadAuthStatus(7))
        ));
        assert!(matches!(
            AuthResponse::packet_len(&hex!("05")),
            Err(Error::BadVersion(5))
        ));
    }

    #[test]
    fn connect_request() {
        let bytes = hex!("05 01 00 03 0b 6578616d706c652e636f6d 0050");
        assert_eq!(ConnectRequest::packet_len(&bytes[..4]).unwrap(), 0);
        assert_eq!(ConnectRequest::packet_len(&bytes[..5]).unwrap(), bytes.len());
        let p = ConnectRequest::from_bytes(&bytes).unwrap();
        assert_eq!(p.command(), SocksCmd::CONNECT);
        assert_eq!(p.address_type(), AddrType::HOSTNAME);
        assert_eq!(p.addr().to_string(), "example.com");
        assert_eq!(p.port(), 80);
        assert_eq!(&p.to_bytes()[..], &bytes[..]);

        let p = ConnectRequest::new(SocksCmd::CONNECT, localhost(), 443);
        assert_eq!(&p.to_bytes()[..], &hex!("05 01 00 01 7f000001 01bb")[..]);

        let ip6 = hex!("05 01 00 04 20010db8000000000000000000000001 1f90");
        assert_eq!(ConnectRequest::packet_len(&ip6[..4]).unwrap(), ip6.len());
        let p = ConnectRequest::from_bytes(&ip6).unwrap();
        assert_eq!(p.address_type(), AddrType::IPV6);
        assert_eq!(p.port(), 8080);
    }

    #[test]
    fn connect_request_eager_errors() {
        // Bad address type, reported before the length is known.
        assert!(matches!(
            ConnectRequest::packet_len(&hex!("05 01 00 02")),
            Err(Error::BadAddrType(2))
        ));
        assert!(matches!(
            ConnectRequest::packet_len(&hex!("05 09")),
            Err(Error::BadCommand(9))
        ));
        assert!(matches!(
            ConnectRequest::packet_len(&hex!("06")),
            Err(Error::BadVersion(6))
        ));
        // Commands we don't support are still valid packets.
        let p = ConnectRequest::from_bytes(&hex!("05 03 00 01 00000000 0000")).unwrap();
        assert_eq!(p.command(), SocksCmd::UDP_ASSOCIATE);
    }

    #[test]
    fn connect_response() {
        let p = ConnectResponse::new(SocksReply::SUCCEEDED, localhost(), 1080);
        let bytes = p.to_bytes();
        assert_eq!(&bytes[..], &hex!("05 00 00 01 7f000001 0438")[..]);
        assert_eq!(ConnectResponse::from_bytes(&bytes).unwrap(), p);
        assert!(matches!(
            ConnectResponse::packet_len(&hex!("05 09 00")),
            Err(Error::BadReply(9))
        ));
    }

    #[test]
    fn tunnel_request() {
        let req = ConnectRequest::new(SocksCmd::CONNECT, SocksAddr::parse("a.b").unwrap(), 22);
        let p = TunnelRequest::from(&req);
        let bytes = p.to_bytes();
        assert_eq!(&bytes[..], &hex!("05 03 03 612e62 0016")[..]);
        assert_eq!(TunnelRequest::from_bytes(&bytes).unwrap(), p);
    }

    #[test]
    fn trailing_bytes_ignored() {
        let p = HandshakeResponse::from_bytes(&hex!("05 02 ffff")).unwrap();
        assert_eq!(p.method(), SocksMethod::USER_PASS);
        assert!(matches!(
            HandshakeResponse::from_bytes(&hex!("05")),
            Err(Error::Truncated)
        ));
    }

    #[test]
    fn codes_on_the_wire() {
        let p = HandshakeRequest::new(vec![SocksMethod::GSSAPI, SocksMethod::USER_PASS]).unwrap();
        assert_eq!(&p.to_bytes()[..], &hex!("05 02 01 02")[..]);
        let p = AuthResponse::new(AuthStatus::FAILED);
        assert_eq!(&p.to_bytes()[..], &hex!("01 01")[..]);
        let p = ConnectRequest::new(SocksCmd::BIND, localhost(), 1);
        assert_eq!(&p.to_bytes()[..], &hex!("05 02 00 01 7f000001 0001")[..]);
        let p = ConnectResponse::new(SocksReply::COMMAND_NOT_SUPPORTED, localhost(), 1);
        assert_eq!(&p.to_bytes()[..], &hex!("05 07 00 01 7f000001 0001")[..]);

        // Unknown codes come back exactly as the peer sent them.
        for &code in &[0x00_u8, 0x02, 0x7f, 0xfe] {
            let bytes = [5, 1, 0, code];
            assert!(matches!(
                ConnectRequest::packet_len(&bytes),
                Err(Error::BadAddrType(c)) if c == code
            ));
        }
        assert!(matches!(
            ConnectRequest::packet_len(&hex!("05 fe")),
            Err(Error::BadCommand(0xfe))
        ));
    }

    #[test]
    fn dispatch() {
        let p: Packet = AuthResponse::new(AuthStatus::SUCCEEDED).into();
        assert_eq!(p.kind(), PacketKind::AuthResponse);
        assert_eq!(p.kind().version(), AUTH_VERSION);
        let bytes = p.to_bytes();
        assert_eq!(PacketKind::AuthResponse.packet_len(&bytes).unwrap(), 2);
        assert_eq!(PacketKind::AuthResponse.parse(&bytes).unwrap(), p);
    }
}
