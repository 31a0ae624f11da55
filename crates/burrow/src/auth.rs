//! Decide whether a client's username and password are acceptable.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Something that can check the credentials sent in a SOCKS5
/// username/password subnegotiation.
///
/// If a server has an authenticator, clients must use username/password
/// authentication; otherwise they must use none.
///
/// Any `Fn(&str, &str, SocketAddr) -> bool` closure is an authenticator.
#[async_trait]
pub trait Authenticate: Send + Sync {
    /// Return true if `username` and `password`, sent by the client at
    /// `peer`, should be accepted.
    async fn authenticate(&self, username: &str, password: &str, peer: SocketAddr) -> bool;
}

#[async_trait]
impl<F> Authenticate for F
where
    F: Fn(&str, &str, SocketAddr) -> bool + Send + Sync,
{
    async fn authenticate(&self, username: &str, password: &str, peer: SocketAddr) -> bool {
        self(username, password, peer)
    }
}

/// An authenticator that checks credentials against a fixed table.
#[derive(Clone, Default)]
pub struct StaticAuthenticator {
    /// Map from username to password.
    users: HashMap<String, String>,
}

impl StaticAuthenticator {
    /// Construct a new StaticAuthenticator that accepts exactly the
    /// username/password pairs in `users`.
    pub fn new(users: HashMap<String, String>) -> Self {
        StaticAuthenticator { users }
    }

    /// Return true if this authenticator has no users at all.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl std::fmt::Debug for StaticAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticAuthenticator")
            .field("users", &self.users.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Authenticate for StaticAuthenticator {
    async fn authenticate(&self, username: &str, password: &str, _peer: SocketAddr) -> bool {
        self.users.get(username).map(String::as_str) == Some(password)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::executor::block_on;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn static_table() {
        let mut users = HashMap::new();
        users.insert("bob".to_string(), "right".to_string());
        let auth = StaticAuthenticator::new(users);
        assert!(!auth.is_empty());
        assert!(block_on(auth.authenticate("bob", "right", peer())));
        assert!(!block_on(auth.authenticate("bob", "wrong", peer())));
        assert!(!block_on(auth.authenticate("alice", "right", peer())));
        assert!(!format!("{:?}", auth).contains("right"));
    }

    #[test]
    fn closure() {
        let auth = |user: &str, _pw: &str, peer: SocketAddr| user == "bob" && peer.port() == 4000;
        assert!(block_on(auth.authenticate("bob", "", peer())));
        assert!(!block_on(auth.authenticate("eve", "", peer())));
    }
}
