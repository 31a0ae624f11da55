//! Configuration for Burrow.
//!
//! We use `serde` and the `config` crate.  A configuration is built from
//! three layers: the built-in defaults in [`BURROW_DEFAULTS`], then any
//! TOML files, then `key=value` options from the command line (see
//! [`CmdLine`]).

mod cmdline;

pub use cmdline::CmdLine;

use crate::auth::{Authenticate, StaticAuthenticator};
use crate::cipher::{CipherMethod, PasswordCipher};
use crate::connection::{ConnectionConfig, ConnectionSettings};
use crate::dialer::{DirectDialer, Dialer};
use crate::server::{ListenAddr, ServerConfig};
use crate::tunnel::TunnelDialer;
use crate::{Error, Result};

use burrow_rtcompat::Runtime;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default options to use for our configuration.
pub const BURROW_DEFAULTS: &str = include_str!("./burrow_defaults.toml");

/// Structure to hold our configuration options, whether from a
/// configuration file or the command line.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct BurrowConfig {
    /// Whether to log at trace level.
    pub trace: bool,
    /// How to run the proxy itself.
    pub proxy: ProxyConfig,
    /// Who may use the proxy.
    #[serde(default)]
    pub auth: AuthConfig,
    /// An encrypted upstream to relay through, if any.
    pub upstream: Option<UpstreamConfig>,
}

/// Listeners and timeouts.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Addresses to accept SOCKS connections on.
    pub listen: Vec<ListenConfig>,
    /// Milliseconds to wait for connections to close at shutdown.
    pub kill_timeout: u64,
    /// Milliseconds a connection may go without traffic.
    pub max_idle_time: u64,
    /// Milliseconds to wait while reaching a destination.
    pub connect_timeout: u64,
}

/// One address to listen on.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ListenConfig {
    /// Hostname or IP address.
    pub host: String,
    /// Port, or 0 to pick one.
    pub port: u16,
}

/// Username/password authentication.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Accepted users.  If empty, clients don't authenticate.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// One accepted username and password.
#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// The username.
    pub name: String,
    /// The password.
    pub password: String,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An encrypted upstream relay.
#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Hostname or address of the relay.
    pub host: String,
    /// Port of the relay.
    pub port: u16,
    /// Cipher name, like `aes-256-ctr`.
    pub method: String,
    /// Shared password that the key is derived from.
    pub password: String,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Merge configuration files and command-line options into `cfg`.
///
/// The files must be TOML, and must exist.  The options use the
/// extended syntax of [`CmdLine`], and take precedence over the files.
pub fn load<'a, C1, P, C2>(
    cfg: &mut config::Config,
    files: C1,
    opts: C2,
) -> std::result::Result<(), config::ConfigError>
where
    C1: IntoIterator<Item = &'a P>,
    P: AsRef<Path> + ?Sized + 'a,
    C2: IntoIterator,
    C2::Item: AsRef<str>,
{
    for f in files {
        let file: config::File<_> = f.as_ref().into();
        cfg.merge(file.format(config::FileFormat::Toml).required(true))?;
    }

    let cmdline: CmdLine = opts.into_iter().map(|o| o.as_ref().to_string()).collect();
    cfg.merge(cmdline)?;
    Ok(())
}

impl BurrowConfig {
    /// Build a configuration from the built-in defaults, then `files`,
    /// then `opts`.
    pub fn load<'a, C1, P, C2>(files: C1, opts: C2) -> Result<Self>
    where
        C1: IntoIterator<Item = &'a P>,
        P: AsRef<Path> + ?Sized + 'a,
        C2: IntoIterator,
        C2::Item: AsRef<str>,
    {
        let config_err = |e: config::ConfigError| Error::Config(e.to_string());
        let mut cfg = config::Config::new();
        cfg.merge(config::File::from_str(
            BURROW_DEFAULTS,
            config::FileFormat::Toml,
        ))
        .map_err(config_err)?;
        load(&mut cfg, files, opts).map_err(config_err)?;
        cfg.try_into().map_err(config_err)
    }

    /// Return the configuration for the server's listeners.
    pub fn server_config(&self) -> Result<ServerConfig> {
        if self.proxy.listen.is_empty() {
            return Err(Error::Config("no listen addresses configured".into()));
        }
        let listen = self
            .proxy
            .listen
            .iter()
            .map(|l| ListenAddr {
                host: l.host.clone(),
                port: l.port,
            })
            .collect();
        Ok(ServerConfig {
            listen,
            kill_timeout: Duration::from_millis(self.proxy.kill_timeout),
        })
    }

    /// Return the timing parameters for each connection.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_idle_time: Duration::from_millis(self.proxy.max_idle_time),
            connect_timeout: Duration::from_millis(self.proxy.connect_timeout),
        }
    }

    /// Return an authenticator for the configured users, or None if
    /// there are none.
    pub fn authenticator(&self) -> Option<Arc<dyn Authenticate>> {
        if self.auth.users.is_empty() {
            return None;
        }
        let users = self
            .auth
            .users
            .iter()
            .map(|u| (u.name.clone(), u.password.clone()))
            .collect();
        Some(Arc::new(StaticAuthenticator::new(users)))
    }

    /// Return the settings that connections should use: our timeouts,
    /// our authenticator, and a dialer that either connects directly or
    /// goes through the configured upstream.
    pub fn connection_settings<R: Runtime>(&self, runtime: R) -> Result<ConnectionSettings> {
        let dialer: Arc<dyn Dialer> = match &self.upstream {
            None => Arc::new(DirectDialer::new(runtime)),
            Some(up) => {
                let method: CipherMethod = up.method.parse()?;
                let ciphers = Arc::new(PasswordCipher::new(method, &up.password));
                Arc::new(TunnelDialer::new(runtime, &up.host, up.port, ciphers))
            }
        };
        let settings = ConnectionSettings::new(self.connection_config(), dialer);
        Ok(match self.authenticator() {
            Some(a) => settings.with_authenticator(a),
            None => settings,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use burrow_rtcompat::tokio::test_with_runtime;

    /// No files.
    const NO_FILES: [&str; 0] = [];

    #[test]
    fn load_default_config() -> Result<()> {
        let cfg = BurrowConfig::load(&NO_FILES, &NO_FILES)?;
        assert!(!cfg.trace);
        assert!(cfg.upstream.is_none());
        assert!(cfg.authenticator().is_none());

        let server = cfg.server_config()?;
        assert_eq!(server.listen.len(), 1);
        assert_eq!(server.listen[0].to_string(), "127.0.0.1:1080");
        assert_eq!(server.kill_timeout, Duration::from_secs(10));

        let conn = cfg.connection_config();
        assert_eq!(conn.max_idle_time, Duration::from_secs(30));
        assert_eq!(conn.connect_timeout, Duration::from_secs(3));
        Ok(())
    }

    #[test]
    fn command_line_overrides() -> Result<()> {
        let opts = [
            "trace=true",
            "proxy.connect_timeout=250",
            r#"auth.users=[{name="bob", password="right"}]"#,
        ];
        let cfg = BurrowConfig::load(&NO_FILES, &opts)?;
        assert!(cfg.trace);
        assert_eq!(
            cfg.connection_config().connect_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(cfg.auth.users.len(), 1);
        assert_eq!(cfg.auth.users[0].name, "bob");
        assert!(cfg.authenticator().is_some());
        Ok(())
    }

    #[test]
    fn unknown_option() {
        let r = BurrowConfig::load(&NO_FILES, &["proxy.socks_port=9150"]);
        assert!(matches!(r, Err(Error::Config(_))));
    }

    #[test]
    fn missing_file() {
        let r = BurrowConfig::load(&["/nonexistent/burrow.toml"], &NO_FILES);
        assert!(matches!(r, Err(Error::Config(_))));
    }

    #[test]
    fn upstream() {
        test_with_runtime(|rt| async move {
            let opts = [
                r#"upstream={host="127.0.0.1", port=8388, method="aes-192-ctr", password="pw"}"#,
            ];
            let cfg = BurrowConfig::load(&NO_FILES, &opts).unwrap();
            let up = cfg.upstream.as_ref().unwrap();
            assert_eq!(up.port, 8388);
            assert!(!format!("{:?}", up).contains("pw"));
            assert!(cfg.connection_settings(rt.clone()).is_ok());

            let opts = [
                r#"upstream={host="127.0.0.1", port=8388, method="rot13", password="pw"}"#,
            ];
            let cfg = BurrowConfig::load(&NO_FILES, &opts).unwrap();
            assert!(matches!(
                cfg.connection_settings(rt),
                Err(Error::Config(_))
            ));
        });
    }

    #[test]
    fn no_listeners() {
        let cfg = BurrowConfig::load(&NO_FILES, &["proxy.listen=[]"]).unwrap();
        assert!(matches!(cfg.server_config(), Err(Error::Config(_))));
    }
}
