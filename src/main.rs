use clap::Parser;
use log::info;
use means_to_an_end::{config::Config, server::Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let _logger = flexi_logger::Logger::try_with_env_or_str(&config.log_level)?
        .adaptive_format_for_stdout(flexi_logger::AdaptiveFormat::WithThread)
        .log_to_stdout()
        .start()?;

    let server = Server::run(&config.address()).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Shutting down");
        }
        _ = server.wait_shutdown() => {}
    };
    info!(
        "Shutting down with {} sessions registered",
        server.session_count()
    );
    server.shutdown();

    info!("Server shutdown");
    Ok(())
}
