//! Process configuration. Generalizes the teacher's `AppConfig`-from-YAML
//! idea onto the flat CLI surface spec.md §6 actually calls for: there is no
//! config file here, only `[--daemon|-d] [--port|-p PORT] remote [remote_port]`.

use clap::Parser;

use crate::error::{GatewayError, Result};

const DEFAULT_SERVER_PORT: u32 = 80;
const DEFAULT_REMOTE_PORT: u32 = 70;
const MAX_PORT: u32 = 65536; // inclusive, matching the original's `port > 1<<16` check

#[derive(Debug, Parser)]
#[command(
    name = "gopher-gateway",
    about = "HTTP-to-Gopher protocol gateway",
    disable_help_flag = false
)]
struct Cli {
    /// Detach from the terminal and switch logging to the system log.
    #[arg(short = 'd', long = "daemon")]
    daemon: bool,

    /// TCP port to listen on.
    #[arg(short = 'p', long = "port", value_name = "server_port")]
    port: Option<u32>,

    /// Gopher host to forward requests to.
    remote_host: String,

    /// Gopher port to forward requests to (default 70).
    remote_port: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub daemon: bool,
    pub server_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl AppConfig {
    /// Parses `std::env::args_os()` into a validated config, exactly as
    /// spec.md §6 describes the CLI surface. `--help` is handled here
    /// directly rather than left to clap's default exit code: it must print
    /// to stdout and exit 0, while every other parse failure is a startup
    /// error that exits 1 (spec.md §6, §7) — clap's own default is exit 2
    /// for usage errors, which this crate does not want.
    pub fn from_args() -> Result<Self> {
        let cli = match Cli::try_parse() {
            Ok(cli) => cli,
            Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => {
                print!("{}", e);
                std::process::exit(0);
            }
            Err(e) => return Err(GatewayError::from(e)),
        };

        let server_port = validate_port(cli.port.unwrap_or(DEFAULT_SERVER_PORT))?;
        let remote_port = validate_port(cli.remote_port.unwrap_or(DEFAULT_REMOTE_PORT))?;

        Ok(AppConfig {
            daemon: cli.daemon,
            server_port,
            remote_host: cli.remote_host,
            remote_port,
        })
    }
}

fn validate_port(port: u32) -> Result<u16> {
    if port > MAX_PORT {
        return Err(GatewayError::from(format!(
            "port {} out of range (expected 0..={})",
            port, MAX_PORT
        )));
    }
    u16::try_from(port).map_err(|_| {
        GatewayError::from(format!(
            "port {} cannot be bound (largest usable TCP port is {})",
            port,
            u16::MAX
        ))
    })
}
