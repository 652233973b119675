use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use attestation_gateway::logging::{self, LoggingOpts};

/// Request an attestation quote from the gateway
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// attestation gateway url to request
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// appdata (user data) to submit, hex encoded
    #[arg(long, default_value_t = "00".repeat(64))]
    appdata: String,

    /// log in JSON format
    #[arg(long)]
    log_json: bool,

    /// log debug messages
    #[arg(long)]
    log_debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LoggingOpts {
        debug: cli.log_debug,
        json: cli.log_json,
    });

    let url = format!("{}/attestation/{}", cli.url.trim_end_matches('/'), cli.appdata);
    let resp = reqwest::blocking::get(&url)
        .with_context(|| format!("could not request a quote from {url}"))?;
    let status = resp.status();
    let body = resp
        .bytes()
        .context("could not read the quote from the response")?;

    if !status.is_success() {
        let reason = String::from_utf8_lossy(&body);
        warn!(%status, %reason, "Failure");
        bail!("quote request failed with {status}: {reason}");
    }

    info!(quote = %hex::encode(&body), "Success");
    Ok(())
}
