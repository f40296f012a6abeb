use gopher_gateway::config::AppConfig;
use gopher_gateway::error::Result;
use gopher_gateway::{daemon, server::Server};

fn main() {
    if let Err(e) = run() {
        gateway_log::errors!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = AppConfig::from_args()?;

    if config.daemon {
        daemon::daemonize()?;
        let _ = gateway_log::use_syslog("gopher-gateway");
    }

    let mut server = Server::new(&config)?;

    daemon::drop_privileges()?;

    server.run()
}
