use anyhow::{bail, Context, Result};
use clap::Parser;
use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use attestation_gateway::logging::{self, LoggingOpts};

/// Submit a quote to the gateway for verification
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// attestation gateway url to request
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// hex encoded quote to verify
    #[arg(long)]
    quote: String,

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

    let raw_quote = hex::decode(cli.quote.trim()).context("could not parse quote")?;

    let url = format!("{}/verify", cli.url.trim_end_matches('/'));
    let resp = reqwest::blocking::Client::new()
        .post(&url)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(raw_quote)
        .send()
        .with_context(|| format!("could not reach {url}"))?;
    let status = resp.status();
    let body = resp
        .text()
        .context("could not read the verification response")?;

    if status.is_success() {
        info!(quote = %body, "Success");
        Ok(())
    } else {
        warn!(%status, reason = %body.trim_end(), "Failure");
        bail!("quote did not verify ({status})")
    }
}
