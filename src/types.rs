use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;

use crate::metrics::Metrics;
use crate::provider::AttestationProvider;
use crate::readiness::Readiness;
use crate::verifier::{QuoteVerifier, VerifyOptions};

/// Shared by every worker for the lifetime of the server.
pub struct AppState {
    pub provider: Arc<dyn AttestationProvider>,
    pub verifier: Arc<dyn QuoteVerifier>,
    pub verify_options: VerifyOptions,
    pub readiness: Readiness,
    pub drain_duration: Duration,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// return the appdata itself as the quote
    Simulated,
    /// request quotes from the TDX module through configfs-tsm
    Tdx,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub metrics_addr: String,
    pub drain_duration: Duration,
    pub provider: ProviderKind,
    pub tsm_path: PathBuf,
    pub verify_options: VerifyOptions,
}
