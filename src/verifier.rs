use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dcap_qvl::QuoteCollateralV3;
use thiserror::Error;

use crate::quote::{parse_quote, ParseError, Quote, QuoteV4};

pub const INTEL_PCS_URL: &str = "https://api.trustedservices.intel.com";

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("could not fetch verification collateral: {0}")]
    Collateral(String),
    #[error("quote verification failed: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// PCS or PCCS base url collateral is fetched from.
    pub pccs_url: String,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            pccs_url: INTEL_PCS_URL.to_string(),
        }
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub tcb_status: String,
    pub advisory_ids: Vec<String>,
}

#[async_trait]
pub trait QuoteVerifier: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<Quote, ParseError> {
        parse_quote(raw)
    }

    async fn validate(
        &self,
        quote: &QuoteV4,
        options: &VerifyOptions,
    ) -> Result<Verdict, VerificationError>;
}

/// Checks a raw quote against already fetched collateral at time `now` (unix seconds).
pub fn verify_with_collateral(
    raw: &[u8],
    collateral: &QuoteCollateralV3,
    now: u64,
) -> Result<Verdict, VerificationError> {
    let report = dcap_qvl::verify::verify(raw, collateral, now)
        .map_err(|e| VerificationError::Rejected(format!("{e:#}")))?;

    Ok(Verdict {
        tcb_status: report.status,
        advisory_ids: report.advisory_ids,
    })
}

/// Checks quotes against Intel collateral using `dcap-qvl`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DcapVerifier;

#[async_trait]
impl QuoteVerifier for DcapVerifier {
    async fn validate(
        &self,
        quote: &QuoteV4,
        options: &VerifyOptions,
    ) -> Result<Verdict, VerificationError> {
        let collateral = dcap_qvl::collateral::get_collateral(&options.pccs_url, quote.raw())
            .await
            .map_err(|e| VerificationError::Collateral(format!("{e:#}")))?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VerificationError::Rejected(format!("system clock before epoch: {e}")))?
            .as_secs();

        verify_with_collateral(quote.raw(), &collateral, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_point_at_intel_pcs() {
        assert_eq!(VerifyOptions::default().pccs_url, INTEL_PCS_URL);
    }

    #[test]
    fn dcap_verifier_parses_with_the_quote_parser() {
        let raw = hex::decode(include_str!("../testdata/sample_quote.hex").trim()).unwrap();
        let quote = DcapVerifier.parse(&raw).unwrap();
        assert_eq!(quote.version(), 4);

        assert!(DcapVerifier.parse(&raw[..100]).is_err());
    }

    // inside the validity window of every item in tdx_quote_collateral.json
    const COLLATERAL_NOW: u64 = 1_751_500_000;

    fn collateral() -> QuoteCollateralV3 {
        serde_json::from_str(include_str!("../testdata/tdx_quote_collateral.json")).unwrap()
    }

    #[test]
    fn genuine_quote_is_up_to_date() {
        let raw = include_bytes!("../testdata/tdx_quote");
        let verdict = verify_with_collateral(raw, &collateral(), COLLATERAL_NOW).unwrap();
        assert_eq!(verdict.tcb_status, "UpToDate");
        assert!(verdict.advisory_ids.is_empty());

        let quote = DcapVerifier.parse(raw).unwrap();
        assert_eq!(quote.version(), 4);
    }

    #[test]
    fn flipped_report_byte_is_rejected() {
        let mut raw = include_bytes!("../testdata/tdx_quote").to_vec();
        // td report body, covered by the attestation key signature
        raw[100] ^= 0x01;

        let err = verify_with_collateral(&raw, &collateral(), COLLATERAL_NOW).unwrap_err();
        assert!(matches!(err, VerificationError::Rejected(_)), "{err}");
    }
}
