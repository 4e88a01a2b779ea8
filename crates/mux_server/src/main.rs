use anyhow::Context;
use mux_server::config::{resolve_config_path, CONFIG_ENV_VAR};
use mux_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = resolve_config_path(std::env::args().nth(1), std::env::var_os(CONFIG_ENV_VAR));
    let config = ServerConfig::load(path.as_deref()).context("load configuration")?;
    engine_logging::initialize(config.log_destination, config.level_filter()?);
    mux_server::run(config).await
}
