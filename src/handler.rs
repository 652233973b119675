use actix_web::http::header::{self, ContentType};
use actix_web::http::StatusCode;
use actix_web::{error, get, post, web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::appdata::AppData;
use crate::provider::ProviderError;
use crate::quote::{ParseError, Quote};
use crate::types::AppState;
use crate::verifier::VerificationError;

/// Upper bound on the size of a quote submitted to `/verify`.
pub const MAX_QUOTE_SIZE: usize = 12_800;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid appdata: {0}")]
    MalformedHex(#[from] hex::FromHexError),
    #[error("no quote")]
    NoQuote,
    #[error("quote too large: limit is {limit} bytes")]
    QuoteTooLarge { limit: usize },
    #[error("could not read quote: {0}")]
    PayloadRead(String),
    #[error("malformed quote: {0}")]
    MalformedQuote(#[from] ParseError),
    #[error("unsupported quote type: version {0}")]
    UnsupportedQuoteType(u16),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl error::ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedHex(_)
            | ApiError::NoQuote
            | ApiError::QuoteTooLarge { .. }
            | ApiError::PayloadRead(_)
            | ApiError::MalformedQuote(_)
            | ApiError::UnsupportedQuoteType(_) => StatusCode::BAD_REQUEST,
            ApiError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Collateral failures are not told apart from invalid quotes on the wire.
            ApiError::Verification(_) => StatusCode::IM_A_TEAPOT,
        }
    }
}

/// Routing table of the public listener.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(attest)
        .service(verify)
        .service(liveness)
        .service(readiness)
        .service(drain)
        .service(undrain);
}

#[get("/attestation/{appdata}")]
async fn attest(
    appdata: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let _timer = state.metrics.start_timer("attestation");

    let app_data = AppData::from_hex(&appdata)?;
    let quote = state
        .provider
        .generate_quote(&app_data)
        .await
        .inspect_err(|err| warn!(%err, "could not generate quote"))?;

    Ok(HttpResponse::Ok()
        .insert_header(ContentType::octet_stream())
        .body(quote))
}

#[post("/verify")]
async fn verify(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let _timer = state.metrics.start_timer("verify");

    let raw = read_quote(&req, payload).await?;
    let quote = match state.verifier.parse(&raw)? {
        Quote::V4(quote) => quote,
        other => return Err(ApiError::UnsupportedQuoteType(other.version())),
    };
    debug!(header = ?quote.header, "quote");

    let verdict = state
        .verifier
        .validate(&quote, &state.verify_options)
        .await
        .inspect_err(|err| warn!(%err, "quote did not verify"))?;
    info!(
        tcb_status = %verdict.tcb_status,
        advisories = ?verdict.advisory_ids,
        "quote verified"
    );

    Ok(HttpResponse::Ok().json(&quote))
}

/// Reads the request body, giving up as soon as it exceeds [`MAX_QUOTE_SIZE`].
async fn read_quote(req: &HttpRequest, mut payload: web::Payload) -> Result<web::Bytes, ApiError> {
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_QUOTE_SIZE) {
        return Err(ApiError::QuoteTooLarge {
            limit: MAX_QUOTE_SIZE,
        });
    }

    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|err| ApiError::PayloadRead(err.to_string()))?;
        if body.len() + chunk.len() > MAX_QUOTE_SIZE {
            return Err(ApiError::QuoteTooLarge {
                limit: MAX_QUOTE_SIZE,
            });
        }
        body.extend_from_slice(&chunk);
    }

    if body.is_empty() {
        return Err(ApiError::NoQuote);
    }
    Ok(body.freeze())
}

#[get("/healthz")]
async fn liveness() -> HttpResponse {
    HttpResponse::Ok().finish()
}

#[get("/readyz")]
async fn readiness(state: web::Data<AppState>) -> HttpResponse {
    if state.readiness.is_ready() {
        HttpResponse::Ok().finish()
    } else {
        HttpResponse::ServiceUnavailable().finish()
    }
}

#[get("/drain")]
async fn drain(state: web::Data<AppState>) -> HttpResponse {
    if state.readiness.drain() {
        info!(drain_duration = ?state.drain_duration, "server marked as not ready");
        // give the load balancer time to notice the failing readiness check
        actix_web::rt::time::sleep(state.drain_duration).await;
    }
    HttpResponse::Ok().finish()
}

#[get("/undrain")]
async fn undrain(state: web::Data<AppState>) -> HttpResponse {
    if state.readiness.undrain() {
        info!("server marked as ready");
    }
    HttpResponse::Ok().finish()
}
