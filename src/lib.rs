//! HTTP gateway in front of TDX quote generation and DCAP quote verification.

pub mod appdata;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod provider;
pub mod quote;
pub mod readiness;
pub mod types;
pub mod verifier;
