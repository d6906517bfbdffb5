//! Chat relay daemon.

use relay_server::config::Config;
use relay_server::{server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    telemetry::init(&config.log_filter);

    info!(
        http = %config.http_addr_string(),
        tcp = config.tcp_addr_string().as_deref().unwrap_or("disabled"),
        max_connections = config.max_connections,
        echo_to_self = config.echo_to_self,
        groups = config.groups.len(),
        "starting relayd"
    );

    server::run(config).await
}
