use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use futures_util::future;
use prometheus_client::registry::Registry;
use tracing::{info, warn};

use attestation_gateway::handler;
use attestation_gateway::logging::{self, LoggingOpts};
use attestation_gateway::metrics::{self, Metrics};
use attestation_gateway::provider::{
    AttestationProvider, SimulatedProvider, TsmProvider, DEFAULT_TSM_REPORT_PATH,
};
use attestation_gateway::readiness::Readiness;
use attestation_gateway::types::{AppState, ProviderKind, ServerConfig};
use attestation_gateway::verifier::{DcapVerifier, VerifyOptions, INTEL_PCS_URL};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// address to serve the attestation api on
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    listen_addr: String,

    /// address to serve prometheus metrics on
    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:8090")]
    metrics_addr: String,

    /// how long /drain holds the request after marking the server not ready
    #[arg(long, env = "DRAIN_SECONDS", default_value_t = 45)]
    drain_seconds: u64,

    /// quote provider
    #[arg(long, env = "PROVIDER", value_enum, default_value_t = ProviderKind::Simulated)]
    provider: ProviderKind,

    /// configfs-tsm report directory used by the tdx provider
    #[arg(long, env = "TSM_PATH", default_value = DEFAULT_TSM_REPORT_PATH)]
    tsm_path: PathBuf,

    /// PCS/PCCS base url verification collateral is fetched from
    #[arg(long, env = "PCCS_URL", default_value = INTEL_PCS_URL)]
    pccs_url: String,

    /// log in JSON format
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// log debug messages
    #[arg(long, env = "LOG_DEBUG")]
    log_debug: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.listen_addr.clone(),
            metrics_addr: self.metrics_addr.clone(),
            drain_duration: Duration::from_secs(self.drain_seconds),
            provider: self.provider,
            tsm_path: self.tsm_path.clone(),
            verify_options: VerifyOptions {
                pccs_url: self.pccs_url.clone(),
            },
        }
    }
}

fn build_provider(config: &ServerConfig) -> Result<Arc<dyn AttestationProvider>> {
    Ok(match config.provider {
        ProviderKind::Simulated => {
            warn!("using the simulated provider, quotes are the appdata itself");
            Arc::new(SimulatedProvider)
        }
        ProviderKind::Tdx => Arc::new(
            TsmProvider::new(&config.tsm_path)
                .context("unable to set up the tdx quote provider")?,
        ),
    })
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LoggingOpts {
        debug: cli.log_debug,
        json: cli.log_json,
    });
    let config = cli.server_config();

    let mut registry = Registry::default();
    let state = web::Data::new(AppState {
        provider: build_provider(&config)?,
        verifier: Arc::new(DcapVerifier),
        verify_options: config.verify_options.clone(),
        readiness: Readiness::new(),
        drain_duration: config.drain_duration,
        metrics: Metrics::new(&mut registry),
    });
    let registry = web::Data::new(registry);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handler::configure)
    })
    .bind(&config.listen_addr)
    .with_context(|| format!("unable to bind {}", config.listen_addr))?
    .run();

    let metrics_server = HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .service(metrics::serve_metrics)
    })
    .workers(1)
    .bind(&config.metrics_addr)
    .with_context(|| format!("unable to bind {}", config.metrics_addr))?
    .run();

    info!(
        listen_addr = %config.listen_addr,
        metrics_addr = %config.metrics_addr,
        provider = ?config.provider,
        "attestation gateway running"
    );
    future::try_join(server, metrics_server)
        .await
        .context("error while running server")?;
    Ok(())
}
