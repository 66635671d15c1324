use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use medilink::config::{self, PortalConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if config::has_flag(&args, "--help") || config::has_flag(&args, "-h") {
        println!("{}", config::USAGE);
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = PortalConfig::load();
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "server",
        "medilink starting: RUST_LOG='{}', addr={}, session_ttl={}s, check_timeout={}ms, require_verification={}, seed={}",
        rust_log,
        config.addr(),
        config.session_ttl.as_secs(),
        config.session_check_timeout.as_millis(),
        config.require_verification,
        config.seed_demo_accounts
    );

    medilink::server::run(config).await
}
