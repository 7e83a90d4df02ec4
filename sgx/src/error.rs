use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("attestation device file {path} is unusable: {source}")]
    DeviceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("attestation device path {0} escapes the device root")]
    PathOutsideDeviceRoot(PathBuf),

    #[error("reading SGX report: {0}")]
    ReadingReport(String),

    #[error("invalid SGX report size: {0} (expected 432)")]
    InvalidSGXReportSize(usize),

    #[error("quote generation failed: {0}")]
    QuoteGenerationFailed(String),

    #[error("unsupported attestation type {0:?} (expected \"dcap\")")]
    UnsupportedAttestationType(String),

    #[error("refusing to run: enclave debug flag is set")]
    DebugEnclave,
}

impl EnclaveError {
    /// Stable code surfaced to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            EnclaveError::DeviceFile { .. } => "EnclaveDeviceFile",
            EnclaveError::PathOutsideDeviceRoot(_) => "EnclaveDeviceFile",
            EnclaveError::ReadingReport(_) => "ReadingReport",
            EnclaveError::InvalidSGXReportSize(_) => "InvalidSGXReportSize",
            EnclaveError::QuoteGenerationFailed(_) => "QuoteGenerationFailed",
            EnclaveError::UnsupportedAttestationType(_) => "UnsupportedAttestationType",
            EnclaveError::DebugEnclave => "DebugEnclave",
        }
    }
}
