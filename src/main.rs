use std::process::ExitCode;

use gmonad::logger::Format;
use gmonad::middleware::{Cors, CorsPolicy};
use gmonad::{Config, Dispatcher, Error, Logger, Router, Server, routes};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gmonad: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::load()?;
    let settings = config.settings()?;

    let log_file = config.get_string("log.file").unwrap_or_default();
    let log_level = config.get_string("log.level").unwrap_or_else(|| "info".to_owned());
    let log_format = Format::parse(&settings.log.format)?;
    let _logger = Logger::init_with_format(&log_file, &log_level, log_format)?;

    let policy = CorsPolicy::try_from(&settings.cors)?;
    let app = Dispatcher::new(routes::setup(Router::new()))
        .register(Cors::new(policy));

    let server = Server::bind(&settings.server.addr).await.inspect_err(|e| {
        error!("{e}");
    })?;
    server.serve(app).await
}
