//! Stream ciphers for the encrypted tunnel to an upstream relay.
//!
//! Each tunnel gets two fresh cipher instances from a [`CipherFactory`]:
//! one to encrypt what we send upstream, and one to decrypt what comes
//! back.  A [`CipherStream`] applies them to an underlying stream.
//!
//! The bundled factory, [`PasswordCipher`], uses AES in counter mode
//! with a key and IV derived from a shared password.

use crate::{Error, Result};

use cipher::generic_array::GenericArray;
use cipher::{NewCipher, StreamCipher};
use futures::io::{AsyncRead, AsyncWrite};
use futures::ready;
use md5::{Digest, Md5};
use std::fmt;
use std::io::Result as IoResult;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

/// One direction's worth of stream cipher state.
///
/// Every [`cipher::StreamCipher`] is a TunnelCipher.
pub trait TunnelCipher: Send + 'static {
    /// Encrypt or decrypt `data` in place, advancing the keystream.
    fn apply(&mut self, data: &mut [u8]);
}

impl<C> TunnelCipher for C
where
    C: StreamCipher + Send + 'static,
{
    fn apply(&mut self, data: &mut [u8]) {
        self.apply_keystream(data)
    }
}

/// Produces the cipher state for each new tunnel.
pub trait CipherFactory: Send + Sync {
    /// Return a new `(encryptor, decryptor)` pair.
    fn ciphers(&self) -> (Box<dyn TunnelCipher>, Box<dyn TunnelCipher>);
}

/// A cipher algorithm that [`PasswordCipher`] supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherMethod {
    /// AES-128 in counter mode.
    Aes128Ctr,
    /// AES-192 in counter mode.
    Aes192Ctr,
    /// AES-256 in counter mode.
    Aes256Ctr,
}

impl CipherMethod {
    /// Return the key length of this method, in bytes.
    pub fn key_len(self) -> usize {
        match self {
            CipherMethod::Aes128Ctr => 16,
            CipherMethod::Aes192Ctr => 24,
            CipherMethod::Aes256Ctr => 32,
        }
    }

    /// Return the IV length of this method, in bytes.
    pub fn iv_len(self) -> usize {
        16
    }
}

impl FromStr for CipherMethod {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aes-128-ctr" => Ok(CipherMethod::Aes128Ctr),
            "aes-192-ctr" => Ok(CipherMethod::Aes192Ctr),
            "aes-256-ctr" => Ok(CipherMethod::Aes256Ctr),
            _ => Err(Error::Config(format!("unsupported cipher method {:?}", s))),
        }
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CipherMethod::Aes128Ctr => "aes-128-ctr",
            CipherMethod::Aes192Ctr => "aes-192-ctr",
            CipherMethod::Aes256Ctr => "aes-256-ctr",
        };
        write!(f, "{}", name)
    }
}

/// Derive `len` bytes of key material from `password`, the way
/// OpenSSL's `EVP_BytesToKey` does with MD5, one iteration, and no
/// salt.
pub fn evp_bytes_to_key(password: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 16);
    let mut prev: Vec<u8> = Vec::new();
    while out.len() < len {
        let mut d = Md5::new();
        d.update(&prev);
        d.update(password);
        prev = d.finalize().to_vec();
        out.extend_from_slice(&prev);
    }
    out.truncate(len);
    out
}

/// A [`CipherFactory`] for AES-CTR with a password-derived key and IV.
///
/// Both directions start from the same key and IV.
#[derive(Clone)]
pub struct PasswordCipher {
    /// Which algorithm to use.
    method: CipherMethod,
    /// The derived key.
    key: Vec<u8>,
    /// The derived IV.
    iv: Vec<u8>,
}

impl PasswordCipher {
    /// Construct a new PasswordCipher using `method`, with key material
    /// derived from `password`.
    pub fn new(method: CipherMethod, password: &str) -> Self {
        let key_len = method.key_len();
        let mut key = evp_bytes_to_key(password.as_bytes(), key_len + method.iv_len());
        let iv = key.split_off(key_len);
        PasswordCipher { method, key, iv }
    }

    /// Return the method this factory uses.
    pub fn method(&self) -> CipherMethod {
        self.method
    }

    /// Build one cipher instance.
    fn build(&self) -> Box<dyn TunnelCipher> {
        /// Construct a boxed `$c` from our key and IV.
        macro_rules! build {
            ($c:ty) => {
                Box::new(<$c>::new(
                    GenericArray::from_slice(&self.key[..]),
                    GenericArray::from_slice(&self.iv[..]),
                ))
            };
        }
        match self.method {
            CipherMethod::Aes128Ctr => build!(aes::Aes128Ctr),
            CipherMethod::Aes192Ctr => build!(aes::Aes192Ctr),
            CipherMethod::Aes256Ctr => build!(aes::Aes256Ctr),
        }
    }
}

impl fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCipher")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl CipherFactory for PasswordCipher {
    fn ciphers(&self) -> (Box<dyn TunnelCipher>, Box<dyn TunnelCipher>) {
        (self.build(), self.build())
    }
}

/// A stream that encrypts everything written to it, and decrypts
/// everything read from it.
pub struct CipherStream<S> {
    /// The stream carrying ciphertext.
    inner: S,
    /// Cipher for outbound bytes.
    encrypt: Box<dyn TunnelCipher>,
    /// Cipher for inbound bytes.
    decrypt: Box<dyn TunnelCipher>,
    /// Ciphertext that we have accepted from the caller, but not yet
    /// written to `inner`.
    pending: Vec<u8>,
    /// How much of `pending` has already been written.
    written: usize,
}

impl<S> CipherStream<S> {
    /// Wrap `inner`, using `encrypt` for outbound data and `decrypt` for
    /// inbound data.
    pub fn new(inner: S, encrypt: Box<dyn TunnelCipher>, decrypt: Box<dyn TunnelCipher>) -> Self {
        CipherStream {
            inner,
            encrypt,
            decrypt,
            pending: Vec::new(),
            written: 0,
        }
    }

    /// Return the underlying stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncWrite + Unpin> CipherStream<S> {
    /// Write out any pending ciphertext.
    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        while self.written < self.pending.len() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.pending[self.written..]))?;
            if n == 0 {
                return Poll::Ready(Err(std::io::ErrorKind::WriteZero.into()));
            }
            self.written += n;
        }
        self.pending.clear();
        self.written = 0;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CipherStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<IoResult<usize>> {
        let this = self.get_mut();
        let n = ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.decrypt.apply(&mut buf[..n]);
        Poll::Ready(Ok(n))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CipherStream<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<IoResult<usize>> {
        let this = self.get_mut();
        ready!(this.poll_pending(cx))?;
        this.pending.extend_from_slice(buf);
        this.encrypt.apply(&mut this.pending[..]);
        // The bytes are ours now; if the write stalls, a later call
        // will finish it.
        if let Poll::Ready(Err(e)) = this.poll_pending(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        let this = self.get_mut();
        ready!(this.poll_pending(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        let this = self.get_mut();
        ready!(this.poll_pending(cx))?;
        Pin::new(&mut this.inner).poll_close(cx)
    }
}
