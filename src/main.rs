//! OpenStack Volume Type Provider
//!
//! Plugin binary serving the `openstack_blockstorage_volume_type_v3`
//! resource and data source. On startup it prints a handshake line
//! (`VOLUME_TYPE_PROVIDER|1|<addr>`) to stdout; all logs go to stderr.

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use openstack_volume_type_provider::{
    handshake_line, ApiServer, ApiServerConfig, BlockStorageConnector, CloudsFile,
    ConfigOverrides, InMemoryCloud, OpenStackConfig, OpenStackConnector, Provider,
    ProviderMetrics,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// OpenStack Volume Type Provider - Cinder v3 volume type resource and data source
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Plugin API bind address (port 0 picks a free port)
    #[arg(long, env = "PROVIDER_LISTEN_ADDR", default_value = "127.0.0.1:0")]
    listen_addr: SocketAddr,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Named cloud in clouds.yaml
    #[arg(long, env = "OS_CLOUD")]
    cloud: Option<String>,

    /// Explicit clouds.yaml path
    #[arg(long, env = "OS_CLIENT_CONFIG_FILE")]
    clouds_file: Option<PathBuf>,

    /// Keystone auth URL
    #[arg(long, env = "OS_AUTH_URL")]
    auth_url: Option<String>,

    /// User name
    #[arg(long, env = "OS_USERNAME")]
    username: Option<String>,

    /// Password
    #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Project name
    #[arg(long, env = "OS_PROJECT_NAME")]
    project_name: Option<String>,

    /// User domain name
    #[arg(long, env = "OS_USER_DOMAIN_NAME")]
    user_domain_name: Option<String>,

    /// Project domain name
    #[arg(long, env = "OS_PROJECT_DOMAIN_NAME")]
    project_domain_name: Option<String>,

    /// Default region
    #[arg(long, env = "OS_REGION_NAME")]
    region: Option<String>,

    /// Pre-issued Keystone token
    #[arg(long, env = "OS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Application credential id
    #[arg(long, env = "OS_APPLICATION_CREDENTIAL_ID")]
    application_credential_id: Option<String>,

    /// Application credential secret
    #[arg(long, env = "OS_APPLICATION_CREDENTIAL_SECRET", hide_env_values = true)]
    application_credential_secret: Option<String>,

    /// Catalog interface (public, internal, admin)
    #[arg(long, env = "OS_INTERFACE")]
    interface: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, env = "OS_INSECURE")]
    insecure: Option<bool>,

    /// Endpoint override as service_type=url (repeatable)
    #[arg(long = "endpoint-override")]
    endpoint_overrides: Vec<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "OS_REQUEST_TIMEOUT", default_value = "60")]
    request_timeout_secs: u64,

    /// Serve an in-memory block storage service instead of a real cloud
    #[arg(long, env = "PROVIDER_SIMULATE")]
    simulate: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            auth_url: self.auth_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            project_name: self.project_name.clone(),
            user_domain_name: self.user_domain_name.clone(),
            project_domain_name: self.project_domain_name.clone(),
            region: self.region.clone(),
            token: self.token.clone(),
            application_credential_id: self.application_credential_id.clone(),
            application_credential_secret: self.application_credential_secret.clone(),
            interface: self.interface.clone(),
            insecure: self.insecure,
            endpoint_overrides: self.endpoint_overrides.clone(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting OpenStack Volume Type Provider");
    info!("  Version: {}", openstack_volume_type_provider::VERSION);
    info!("  Simulate: {}", args.simulate);

    let connector = build_connector(&args)?;
    let metrics = Arc::new(ProviderMetrics::new().context("Failed to register metrics")?);
    let provider = Arc::new(Provider::new(connector, metrics));

    let server = ApiServer::new(
        ApiServerConfig {
            listen_addr: args.listen_addr,
            metrics_addr: args.metrics_addr,
        },
        provider,
    );

    let listeners = server.bind().await?;
    let addr = listeners.local_addr()?;

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", handshake_line(addr)).context("Failed to write handshake")?;
    stdout.flush().context("Failed to write handshake")?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    server.serve(listeners).await?;

    info!("Provider shutdown complete");
    Ok(())
}

/// Build the block storage connector from CLI and `clouds.yaml` settings
fn build_connector(args: &Args) -> anyhow::Result<Arc<dyn BlockStorageConnector>> {
    if args.simulate {
        let region = args.region.clone().unwrap_or_else(|| "RegionOne".to_string());
        info!("Using in-memory block storage in {}", region);
        return Ok(Arc::new(InMemoryCloud::new(region)));
    }

    let config = load_config(args)?;
    config
        .auth_method()
        .context("Incomplete OpenStack credentials")?;

    info!("  Auth URL: {}", config.auth_url);
    info!("  Region: {}", config.region);
    info!("  Interface: {}", config.interface);

    let connector = OpenStackConnector::new(config)?;
    Ok(Arc::new(connector))
}

/// Layer defaults, the selected `clouds.yaml` entry and explicit overrides
fn load_config(args: &Args) -> anyhow::Result<OpenStackConfig> {
    let mut config = OpenStackConfig {
        request_timeout_secs: args.request_timeout_secs,
        ..Default::default()
    };

    if let Some(name) = &args.cloud {
        let path = match &args.clouds_file {
            Some(path) => path.clone(),
            None => CloudsFile::locate(&CloudsFile::search_paths())?,
        };
        let clouds = CloudsFile::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        config.apply_cloud(clouds.cloud(name)?)?;
        info!("  Cloud: {} ({})", name, path.display());
    } else if args.clouds_file.is_some() {
        warn!("--clouds-file given without --cloud, ignoring it");
    }

    config.apply_overrides(&args.overrides())?;
    Ok(config)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "tower=warn", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries only the handshake line
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
