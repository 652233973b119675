use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use actix_web::web;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::appdata::AppData;

pub const DEFAULT_TSM_REPORT_PATH: &str = "/sys/kernel/config/tsm/report";

static TSM_ENTRY_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("attestation provider unavailable: {0}")]
    Unavailable(String),
}

/// Produces a quote binding the given app data to the platform identity.
#[async_trait]
pub trait AttestationProvider: Send + Sync {
    async fn generate_quote(&self, app_data: &AppData) -> Result<Vec<u8>, ProviderError>;
}

/// Returns the app data itself as the quote. Useful without TEE hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedProvider;

#[async_trait]
impl AttestationProvider for SimulatedProvider {
    async fn generate_quote(&self, app_data: &AppData) -> Result<Vec<u8>, ProviderError> {
        Ok(app_data.as_bytes().to_vec())
    }
}

/// Requests TDX quotes through the Linux configfs-tsm interface.
#[derive(Debug, Clone)]
pub struct TsmProvider {
    report_path: PathBuf,
}

impl TsmProvider {
    pub fn new(report_path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let report_path = report_path.into();
        if !report_path.is_dir() {
            return Err(ProviderError::Unavailable(format!(
                "configfs-tsm report directory {} does not exist",
                report_path.display()
            )));
        }
        Ok(Self { report_path })
    }

    fn quote_blocking(report_path: &Path, app_data: &AppData) -> Result<Vec<u8>, ProviderError> {
        let entry_name = format!(
            "gateway-{}-{}",
            std::process::id(),
            TSM_ENTRY_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let entry = TsmEntry::create(report_path.join(entry_name))?;

        fs::write(entry.path.join("inblob"), app_data.as_bytes())
            .map_err(|e| ProviderError::Unavailable(format!("failed to write inblob: {e}")))?;

        let quote = fs::read(entry.path.join("outblob"))
            .map_err(|e| ProviderError::Unavailable(format!("failed to read outblob: {e}")))?;

        debug!(entry = %entry.path.display(), size = quote.len(), "quote generated");
        Ok(quote)
    }
}

#[async_trait]
impl AttestationProvider for TsmProvider {
    async fn generate_quote(&self, app_data: &AppData) -> Result<Vec<u8>, ProviderError> {
        let report_path = self.report_path.clone();
        let app_data = *app_data;
        web::block(move || Self::quote_blocking(&report_path, &app_data))
            .await
            .map_err(|e| ProviderError::Unavailable(format!("quote generation aborted: {e}")))?
    }
}

/// Report entry that is removed when dropped, whatever the outcome.
struct TsmEntry {
    path: PathBuf,
}

impl TsmEntry {
    fn create(path: PathBuf) -> Result<Self, ProviderError> {
        fs::create_dir(&path).map_err(|e| {
            ProviderError::Unavailable(format!(
                "failed to create report entry {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { path })
    }
}

impl Drop for TsmEntry {
    fn drop(&mut self) {
        // configfs entries go away with rmdir; plain directories in tests need the recursive form
        if fs::remove_dir(&self.path).is_err() {
            if let Err(err) = fs::remove_dir_all(&self.path) {
                warn!(entry = %self.path.display(), %err, "could not remove report entry");
            }
        }
    }
}
