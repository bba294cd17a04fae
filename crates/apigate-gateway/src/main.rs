//! Apigate API gateway: entry point.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `APIGATE_CONFIG` | *(none)* | Settings file (TOML, YAML, JSON, ...). Defaults apply when unset. |
//! | `APIGATE_LOG_JSON` | *(unset)* | `1` switches log output to JSON. |
//! | `RUST_LOG` | `apigate_gateway=info` | Log filter. |

use apigate_gateway::server::ApiServer;
use apigate_kernel::config::GatewaySettings;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("apigate_gateway=info"));
    if std::env::var("APIGATE_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config_path = std::env::var("APIGATE_CONFIG").ok();
    let settings = match GatewaySettings::load_or_default(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(report) => {
            eprintln!("failed to load settings: {report:?}");
            std::process::exit(1);
        }
    };
    info!(
        config = config_path.as_deref().unwrap_or("<defaults>"),
        enable_write = settings.enable_write,
        "settings loaded"
    );

    if let Err(err) = ApiServer::new(settings).start().await {
        eprintln!("apigate exited: {err:#}");
        std::process::exit(1);
    }
}
