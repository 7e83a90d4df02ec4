use thiserror::Error;

/// Errors produced by the byte-level encoders.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid chunk count: {0} (expected 1..=32)")]
    InvalidChunkCount(usize),

    #[error("message too short: {0} bytes")]
    MessageTooShort(usize),

    #[error("message of {len} bytes does not fit in {target_chunks} chunks")]
    MessageTooLongForChunks { len: usize, target_chunks: usize },

    #[error("value of {0} bytes does not fit in a u128")]
    ValueTooLarge(usize),

    #[error("attestation data of {len} bytes exceeds the {max} byte slot")]
    AttestationDataTooLarge { len: usize, max: usize },

    #[error("url of {len} bytes exceeds the {max} byte slot")]
    UrlTooLarge { len: usize, max: usize },

    #[error("selector of {len} bytes exceeds the {max} byte slot")]
    SelectorTooLarge { len: usize, max: usize },
}

impl EncodingError {
    /// Stable code surfaced to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            EncodingError::InvalidChunkCount(_) => "InvalidChunkCount",
            EncodingError::MessageTooShort(_) => "MessageTooShort",
            EncodingError::MessageTooLongForChunks { .. } => "MessageTooLongForChunks",
            EncodingError::ValueTooLarge(_) => "ValueTooLarge",
            EncodingError::AttestationDataTooLarge { .. } => "AttestationDataTooLarge",
            EncodingError::UrlTooLarge { .. } => "UrlTooLarge",
            EncodingError::SelectorTooLarge { .. } => "SelectorTooLarge",
        }
    }
}

/// Errors produced by the Aleo signing context.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("keypair generation failed: {0}")]
    KeypairGeneration(String),

    #[error("message hashing failed: {0}")]
    MessageHashing(String),

    #[error("signature generation failed: {0}")]
    SignatureGeneration(String),
}

impl SigningError {
    pub fn code(&self) -> &'static str {
        match self {
            SigningError::Encoding(e) => e.code(),
            SigningError::KeypairGeneration(_) => "KeypairGeneration",
            SigningError::MessageHashing(_) => "MessageHashing",
            SigningError::SignatureGeneration(_) => "SignatureGeneration",
        }
    }
}
