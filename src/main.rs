//! froniusd — always-on collector for Fronius Gen24 inverters.

use froniusd::core::config::{Config, configure_logger};
use froniusd::core::container::Container;
use froniusd::http;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    configure_logger();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration error: {error}");
            std::process::exit(1);
        }
    };
    let container = Container::new(&config);
    log::info!("{} (v{}) started", config.app_name, config.app_version);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutdown requested");
            signal_token.cancel();
        }
    });

    let collector = container.collector();
    let push_service = container.push_service();
    let result = tokio::select! {
        result = http::serve(collector.clone(), config.port, shutdown.clone()) => result,
        _ = async {
            tokio::join!(
                collector.run(shutdown.clone()),
                push_service.run(shutdown.clone()),
            )
        } => Ok(()),
    };
    shutdown.cancel();
    container.shutdown();

    match result {
        Ok(()) => {
            log::info!("{} stopped", config.app_name);
            std::process::exit(0);
        }
        Err(error) => {
            log::error!("Fatal: {error:#}");
            std::process::exit(1);
        }
    }
}
