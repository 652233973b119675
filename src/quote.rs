//! Structural parser for Intel TDX DCAP quotes.
//!
//! Only the layout is checked here. Signatures, certificate chains and TCB
//! status are the verifier's business.

use serde::{Serialize, Serializer};
use thiserror::Error;

pub const QUOTE_VERSION_V4: u16 = 4;
pub const QUOTE_VERSION_V5: u16 = 5;

/// ECDSA-256-with-P-256 curve.
pub const ATTESTATION_KEY_TYPE_ECDSA_P256: u16 = 2;
pub const TEE_TYPE_TDX: u32 = 0x0000_0081;

pub const CERT_DATA_TYPE_PCK_CHAIN: u16 = 5;
pub const CERT_DATA_TYPE_QE_REPORT: u16 = 6;

const HEADER_SIZE: usize = 48;
const TD_QUOTE_BODY_SIZE: usize = 584;
const TD_QUOTE_BODY_1_5_SIZE: usize = 648;
const ENCLAVE_REPORT_SIZE: usize = 384;

const BODY_TYPE_TDX_1_0: u16 = 2;
const BODY_TYPE_TDX_1_5: u16 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("quote truncated reading {field}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("unsupported quote version {0}")]
    UnsupportedVersion(u16),
    #[error("unsupported attestation key type {0}")]
    UnsupportedAttestationKeyType(u16),
    #[error("unsupported tee type {0:#x}")]
    UnsupportedTeeType(u32),
    #[error("unsupported td quote body type {0}")]
    UnsupportedBodyType(u16),
    #[error("{field} has type {found}, expected {expected}")]
    UnexpectedCertificationDataType {
        field: &'static str,
        found: u16,
        expected: u16,
    },
    #[error("{field} declares {declared} bytes, expected {expected}")]
    SizeMismatch {
        field: &'static str,
        declared: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Quote {
    V4(QuoteV4),
    V5(QuoteV5),
}

impl Quote {
    pub fn version(&self) -> u16 {
        match self {
            Quote::V4(quote) => quote.header.version,
            Quote::V5(quote) => quote.header.version,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteV4 {
    pub header: Header,
    pub td_quote_body: TdQuoteBody,
    pub signed_data_size: u32,
    pub signed_data: SignedData,
    #[serde(serialize_with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub extra_bytes: Vec<u8>,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl QuoteV4 {
    /// The exact bytes this quote was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteV5 {
    pub header: Header,
    pub body_type: u16,
    pub body_size: u32,
    pub td_quote_body: TdQuoteBody,
    /// TDX 1.5 fields following the 1.0 body: `tee_tcb_svn_2` and `mr_service_td`.
    #[serde(serialize_with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub body_extension: Vec<u8>,
    pub signed_data_size: u32,
    pub signed_data: SignedData,
    #[serde(serialize_with = "hex_bytes", skip_serializing_if = "Vec::is_empty")]
    pub extra_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Header {
    pub version: u16,
    pub attestation_key_type: u16,
    pub tee_type: u32,
    pub qe_svn: u16,
    pub pce_svn: u16,
    #[serde(serialize_with = "hex_bytes")]
    pub qe_vendor_id: [u8; 16],
    #[serde(serialize_with = "hex_bytes")]
    pub user_data: [u8; 20],
}

#[derive(Debug, Clone, Serialize)]
pub struct TdQuoteBody {
    #[serde(serialize_with = "hex_bytes")]
    pub tee_tcb_svn: [u8; 16],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_seam: [u8; 48],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_signer_seam: [u8; 48],
    #[serde(serialize_with = "hex_bytes")]
    pub seam_attributes: [u8; 8],
    #[serde(serialize_with = "hex_bytes")]
    pub td_attributes: [u8; 8],
    #[serde(serialize_with = "hex_bytes")]
    pub xfam: [u8; 8],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_td: [u8; 48],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_config_id: [u8; 48],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_owner: [u8; 48],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_owner_config: [u8; 48],
    #[serde(serialize_with = "hex_list")]
    pub rtmrs: [[u8; 48]; 4],
    #[serde(serialize_with = "hex_bytes")]
    pub report_data: [u8; 64],
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedData {
    #[serde(serialize_with = "hex_bytes")]
    pub signature: [u8; 64],
    #[serde(serialize_with = "hex_bytes")]
    pub ecdsa_attestation_key: [u8; 64],
    pub certification_data: CertificationData,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificationData {
    pub certificate_data_type: u16,
    pub size: u32,
    pub qe_report_certification_data: QeReportCertificationData,
}

#[derive(Debug, Clone, Serialize)]
pub struct QeReportCertificationData {
    pub qe_report: EnclaveReport,
    #[serde(serialize_with = "hex_bytes")]
    pub qe_report_signature: [u8; 64],
    pub qe_auth_data: QeAuthData,
    pub pck_certificate_chain_data: PckCertificateChainData,
}

/// SGX report body of the quoting enclave.
#[derive(Debug, Clone, Serialize)]
pub struct EnclaveReport {
    #[serde(serialize_with = "hex_bytes")]
    pub cpu_svn: [u8; 16],
    pub misc_select: u32,
    #[serde(serialize_with = "hex_bytes")]
    pub reserved1: [u8; 28],
    #[serde(serialize_with = "hex_bytes")]
    pub attributes: [u8; 16],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_enclave: [u8; 32],
    #[serde(serialize_with = "hex_bytes")]
    pub reserved2: [u8; 32],
    #[serde(serialize_with = "hex_bytes")]
    pub mr_signer: [u8; 32],
    #[serde(serialize_with = "hex_bytes")]
    pub reserved3: [u8; 96],
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    #[serde(serialize_with = "hex_bytes")]
    pub reserved4: [u8; 60],
    #[serde(serialize_with = "hex_bytes")]
    pub report_data: [u8; 64],
}

#[derive(Debug, Clone, Serialize)]
pub struct QeAuthData {
    pub parsed_data_size: u16,
    #[serde(serialize_with = "hex_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PckCertificateChainData {
    pub certificate_data_type: u16,
    pub size: u32,
    #[serde(serialize_with = "hex_bytes")]
    pub pck_cert_chain: Vec<u8>,
}

pub fn parse_quote(input: &[u8]) -> Result<Quote, ParseError> {
    let mut reader = Reader::new(input);
    let header = Header::parse(&mut reader)?;

    match header.version {
        QUOTE_VERSION_V4 => {
            let td_quote_body = TdQuoteBody::parse(&mut reader)?;
            let (signed_data_size, signed_data) = parse_signed_data(&mut reader)?;
            Ok(Quote::V4(QuoteV4 {
                header,
                td_quote_body,
                signed_data_size,
                signed_data,
                extra_bytes: reader.rest().to_vec(),
                raw: input.to_vec(),
            }))
        }
        QUOTE_VERSION_V5 => {
            let body_type = reader.u16("body_type")?;
            let expected_size = match body_type {
                BODY_TYPE_TDX_1_0 => TD_QUOTE_BODY_SIZE,
                BODY_TYPE_TDX_1_5 => TD_QUOTE_BODY_1_5_SIZE,
                other => return Err(ParseError::UnsupportedBodyType(other)),
            };
            let body_size = reader.u32("body_size")?;
            if body_size as usize != expected_size {
                return Err(ParseError::SizeMismatch {
                    field: "body_size",
                    declared: body_size as usize,
                    expected: expected_size,
                });
            }
            let td_quote_body = TdQuoteBody::parse(&mut reader)?;
            let body_extension = reader
                .take(expected_size - TD_QUOTE_BODY_SIZE, "td_quote_body")?
                .to_vec();
            let (signed_data_size, signed_data) = parse_signed_data(&mut reader)?;
            Ok(Quote::V5(QuoteV5 {
                header,
                body_type,
                body_size,
                td_quote_body,
                body_extension,
                signed_data_size,
                signed_data,
                extra_bytes: reader.rest().to_vec(),
            }))
        }
        other => Err(ParseError::UnsupportedVersion(other)),
    }
}

impl Header {
    fn parse(reader: &mut Reader<'_>) -> Result<Self, ParseError> {
        reader.require(HEADER_SIZE, "header")?;

        let header = Header {
            version: reader.u16("header.version")?,
            attestation_key_type: reader.u16("header.attestation_key_type")?,
            tee_type: reader.u32("header.tee_type")?,
            qe_svn: reader.u16("header.qe_svn")?,
            pce_svn: reader.u16("header.pce_svn")?,
            qe_vendor_id: reader.array("header.qe_vendor_id")?,
            user_data: reader.array("header.user_data")?,
        };

        if header.version != QUOTE_VERSION_V4 && header.version != QUOTE_VERSION_V5 {
            return Err(ParseError::UnsupportedVersion(header.version));
        }
        if header.attestation_key_type != ATTESTATION_KEY_TYPE_ECDSA_P256 {
            return Err(ParseError::UnsupportedAttestationKeyType(
                header.attestation_key_type,
            ));
        }
        if header.tee_type != TEE_TYPE_TDX {
            return Err(ParseError::UnsupportedTeeType(header.tee_type));
        }

        Ok(header)
    }
}

impl TdQuoteBody {
    fn parse(reader: &mut Reader<'_>) -> Result<Self, ParseError> {
        reader.require(TD_QUOTE_BODY_SIZE, "td_quote_body")?;

        Ok(TdQuoteBody {
            tee_tcb_svn: reader.array("td_quote_body.tee_tcb_svn")?,
            mr_seam: reader.array("td_quote_body.mr_seam")?,
            mr_signer_seam: reader.array("td_quote_body.mr_signer_seam")?,
            seam_attributes: reader.array("td_quote_body.seam_attributes")?,
            td_attributes: reader.array("td_quote_body.td_attributes")?,
            xfam: reader.array("td_quote_body.xfam")?,
            mr_td: reader.array("td_quote_body.mr_td")?,
            mr_config_id: reader.array("td_quote_body.mr_config_id")?,
            mr_owner: reader.array("td_quote_body.mr_owner")?,
            mr_owner_config: reader.array("td_quote_body.mr_owner_config")?,
            rtmrs: [
                reader.array("td_quote_body.rtmr0")?,
                reader.array("td_quote_body.rtmr1")?,
                reader.array("td_quote_body.rtmr2")?,
                reader.array("td_quote_body.rtmr3")?,
            ],
            report_data: reader.array("td_quote_body.report_data")?,
        })
    }
}

impl EnclaveReport {
    fn parse(reader: &mut Reader<'_>) -> Result<Self, ParseError> {
        reader.require(ENCLAVE_REPORT_SIZE, "qe_report")?;

        Ok(EnclaveReport {
            cpu_svn: reader.array("qe_report.cpu_svn")?,
            misc_select: reader.u32("qe_report.misc_select")?,
            reserved1: reader.array("qe_report.reserved1")?,
            attributes: reader.array("qe_report.attributes")?,
            mr_enclave: reader.array("qe_report.mr_enclave")?,
            reserved2: reader.array("qe_report.reserved2")?,
            mr_signer: reader.array("qe_report.mr_signer")?,
            reserved3: reader.array("qe_report.reserved3")?,
            isv_prod_id: reader.u16("qe_report.isv_prod_id")?,
            isv_svn: reader.u16("qe_report.isv_svn")?,
            reserved4: reader.array("qe_report.reserved4")?,
            report_data: reader.array("qe_report.report_data")?,
        })
    }
}

fn parse_signed_data(reader: &mut Reader<'_>) -> Result<(u32, SignedData), ParseError> {
    let signed_data_size = reader.u32("signed_data_size")?;
    let mut signed = Reader::new(reader.take(signed_data_size as usize, "signed_data")?);

    let signature = signed.array("signed_data.signature")?;
    let ecdsa_attestation_key = signed.array("signed_data.ecdsa_attestation_key")?;

    let certificate_data_type = signed.u16("certification_data.type")?;
    expect_type(
        "certification_data",
        certificate_data_type,
        CERT_DATA_TYPE_QE_REPORT,
    )?;
    let size = signed.u32("certification_data.size")?;
    let mut certification = Reader::new(signed.take(size as usize, "certification_data")?);

    let qe_report = EnclaveReport::parse(&mut certification)?;
    let qe_report_signature = certification.array("qe_report_signature")?;

    let parsed_data_size = certification.u16("qe_auth_data.size")?;
    let qe_auth_data = QeAuthData {
        parsed_data_size,
        data: certification
            .take(parsed_data_size as usize, "qe_auth_data")?
            .to_vec(),
    };

    let chain_type = certification.u16("pck_certificate_chain_data.type")?;
    expect_type(
        "pck_certificate_chain_data",
        chain_type,
        CERT_DATA_TYPE_PCK_CHAIN,
    )?;
    let chain_size = certification.u32("pck_certificate_chain_data.size")?;
    let pck_cert_chain = certification
        .take(chain_size as usize, "pck_cert_chain")?
        .to_vec();

    Ok((
        signed_data_size,
        SignedData {
            signature,
            ecdsa_attestation_key,
            certification_data: CertificationData {
                certificate_data_type,
                size,
                qe_report_certification_data: QeReportCertificationData {
                    qe_report,
                    qe_report_signature,
                    qe_auth_data,
                    pck_certificate_chain_data: PckCertificateChainData {
                        certificate_data_type: chain_type,
                        size: chain_size,
                        pck_cert_chain,
                    },
                },
            },
        },
    ))
}

fn expect_type(field: &'static str, found: u16, expected: u16) -> Result<(), ParseError> {
    if found != expected {
        return Err(ParseError::UnexpectedCertificationDataType {
            field,
            found,
            expected,
        });
    }
    Ok(())
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.offset
    }

    fn require(&self, needed: usize, field: &'static str) -> Result<(), ParseError> {
        if self.remaining() < needed {
            return Err(ParseError::Truncated {
                field,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], ParseError> {
        self.require(len, field)?;
        let slice = &self.input[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], ParseError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.array(field)?))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.array(field)?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.input[self.offset..];
        self.offset = self.input.len();
        rest
    }
}

fn hex_bytes<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&hex::encode(bytes))
}

fn hex_list<S, T, const N: usize>(items: &[T; N], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.collect_seq(items.iter().map(hex::encode))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_QUOTE_HEX: &str = include_str!("../testdata/sample_quote.hex");
    const SAMPLE_RESULT_JSON: &str = include_str!("../testdata/sample_result.json");

    fn sample_quote() -> Vec<u8> {
        hex::decode(SAMPLE_QUOTE_HEX.trim()).unwrap()
    }

    fn as_v4(quote: Quote) -> QuoteV4 {
        match quote {
            Quote::V4(quote) => quote,
            Quote::V5(_) => panic!("expected a v4 quote"),
        }
    }

    #[test]
    fn parses_sample_quote() {
        let raw = sample_quote();
        let quote = as_v4(parse_quote(&raw).unwrap());

        assert_eq!(quote.header.version, QUOTE_VERSION_V4);
        assert_eq!(quote.header.tee_type, TEE_TYPE_TDX);
        assert_eq!(quote.raw(), raw.as_slice());
        assert_eq!(
            quote.signed_data.certification_data.certificate_data_type,
            CERT_DATA_TYPE_QE_REPORT
        );
        assert!(quote.extra_bytes.is_empty());
    }

    #[test]
    fn sample_quote_serializes_to_frozen_json() {
        let quote = parse_quote(&sample_quote()).unwrap();

        let actual = serde_json::to_value(&quote).unwrap();
        let expected: serde_json::Value = serde_json::from_str(SAMPLE_RESULT_JSON).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn report_data_carries_app_data() {
        let quote = as_v4(parse_quote(&sample_quote()).unwrap());
        let report_data = quote.td_quote_body.report_data;
        assert_eq!(&report_data[..32], &[0x11; 32]);
        assert_eq!(&report_data[32..], &[0u8; 32]);
    }

    #[test]
    fn every_truncation_is_rejected() {
        let raw = sample_quote();
        for len in 0..raw.len() {
            assert!(
                parse_quote(&raw[..len]).is_err(),
                "quote truncated to {len} bytes parsed"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_preserved() {
        let mut raw = sample_quote();
        raw.extend_from_slice(&[0xaa, 0xbb]);

        let quote = as_v4(parse_quote(&raw).unwrap());
        assert_eq!(quote.extra_bytes, vec![0xaa, 0xbb]);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut raw = sample_quote();
        raw[0..2].copy_from_slice(&3u16.to_le_bytes());
        assert_eq!(parse_quote(&raw).unwrap_err(), ParseError::UnsupportedVersion(3));
    }

    #[test]
    fn rejects_non_tdx_tee_type() {
        let mut raw = sample_quote();
        raw[4..8].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(parse_quote(&raw).unwrap_err(), ParseError::UnsupportedTeeType(0));
    }

    #[test]
    fn rejects_unknown_attestation_key_type() {
        let mut raw = sample_quote();
        raw[2..4].copy_from_slice(&3u16.to_le_bytes());
        assert_eq!(
            parse_quote(&raw).unwrap_err(),
            ParseError::UnsupportedAttestationKeyType(3)
        );
    }

    #[test]
    fn rejects_wrong_certification_data_type() {
        let mut raw = sample_quote();
        // header + body + signed_data_size + signature + attestation key
        let offset = HEADER_SIZE + TD_QUOTE_BODY_SIZE + 4 + 64 + 64;
        raw[offset..offset + 2].copy_from_slice(&5u16.to_le_bytes());
        assert!(matches!(
            parse_quote(&raw).unwrap_err(),
            ParseError::UnexpectedCertificationDataType { found: 5, .. }
        ));
    }

    #[test]
    fn parses_v5_quote() {
        let v4 = sample_quote();
        let mut raw = v4[..HEADER_SIZE].to_vec();
        raw[0..2].copy_from_slice(&QUOTE_VERSION_V5.to_le_bytes());
        raw.extend_from_slice(&BODY_TYPE_TDX_1_5.to_le_bytes());
        raw.extend_from_slice(&(TD_QUOTE_BODY_1_5_SIZE as u32).to_le_bytes());
        raw.extend_from_slice(&v4[HEADER_SIZE..HEADER_SIZE + TD_QUOTE_BODY_SIZE]);
        raw.extend_from_slice(&[0x5a; TD_QUOTE_BODY_1_5_SIZE - TD_QUOTE_BODY_SIZE]);
        raw.extend_from_slice(&v4[HEADER_SIZE + TD_QUOTE_BODY_SIZE..]);

        let quote = parse_quote(&raw).unwrap();
        assert_eq!(quote.version(), QUOTE_VERSION_V5);
        let Quote::V5(quote) = quote else {
            panic!("expected a v5 quote");
        };
        assert_eq!(quote.body_type, BODY_TYPE_TDX_1_5);
        assert_eq!(quote.body_extension, vec![0x5a; 64]);
    }

    #[test]
    fn rejects_v5_body_size_mismatch() {
        let mut raw = sample_quote()[..HEADER_SIZE].to_vec();
        raw[0..2].copy_from_slice(&QUOTE_VERSION_V5.to_le_bytes());
        raw.extend_from_slice(&BODY_TYPE_TDX_1_0.to_le_bytes());
        raw.extend_from_slice(&100u32.to_le_bytes());

        assert!(matches!(
            parse_quote(&raw).unwrap_err(),
            ParseError::SizeMismatch {
                field: "body_size",
                ..
            }
        ));
    }
}
