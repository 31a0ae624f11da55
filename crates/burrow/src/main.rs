//! Run a SOCKS5 proxy until interrupted.

#![warn(missing_docs)]

mod exit;

use burrow::config::BurrowConfig;
use burrow::SocksServer;
use burrow_rtcompat::tokio::create_runtime;

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing::{info, warn, Level};

#[derive(FromArgs, Debug, Clone)]
/// Accept SOCKS5 connections and relay them, directly or through an
/// encrypted upstream.
struct Args {
    /// read configuration from this file (may be repeated)
    #[argh(option, short = 'f')]
    config: Vec<String>,
    /// override a configuration option (uses toml syntax)
    #[argh(option, short = 'o')]
    option: Vec<String>,
    /// log at debug level
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    let config = BurrowConfig::load(&args.config, &args.option)
        .context("Couldn't load configuration")?;

    let level = if config.trace {
        Level::TRACE
    } else if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let runtime = create_runtime().context("Couldn't create a runtime")?;
    let handle = runtime.handle();
    let settings = config.connection_settings(handle.clone())?;
    let server = SocksServer::with_settings(handle, config.server_config()?, settings);

    runtime.block_on(async {
        let addrs = server.start().await.context("Couldn't start the proxy")?;
        info!("Accepting SOCKS connections on {:?}", addrs);
        if let Some(up) = &config.upstream {
            info!("Relaying through {}:{} ({})", up.host, up.port, up.method);
        }

        exit::wait_for_ctrl_c().await?;
        info!("Received a ctrl-c; stopping the proxy.");
        if let Err(e) = server.shutdown().await {
            warn!("{}", e);
            return Err(e).context("Couldn't shut down cleanly");
        }
        Ok(())
    })
}
