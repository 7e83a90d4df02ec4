//! The signable oracle report.
//!
//! On-chain consumers verify two things: the quote against the platform's
//! root of trust, and an enclave-key signature over a report derived from
//! that quote and the sealed request metadata. The report is the user-data
//! region followed by the quote, rendered in the same chunk-envelope text
//! the verification program reconstructs — so the signature covers what was
//! notarized (url, selector, timestamp, status, attestation data), not just
//! the opaque quote bytes.

use crate::encoding::chunks_for_len;
use crate::error::SigningError;
use crate::signer::SigningContext;

#[derive(Debug, Clone)]
pub struct OracleReport {
    data: String,
    chunks: usize,
}

impl OracleReport {
    /// Render the sealed user data and the quote as one chunk-envelope
    /// text. `user_data` is the positional chunk region the quote's digest
    /// was computed over; it leads so verifiers can read the request
    /// metadata at fixed offsets before the variable-length quote.
    pub fn new(
        ctx: &SigningContext,
        quote: &[u8],
        user_data: &[u8],
    ) -> Result<Self, SigningError> {
        let mut message = Vec::with_capacity(user_data.len() + quote.len());
        message.extend_from_slice(user_data);
        message.extend_from_slice(quote);
        let chunks = chunks_for_len(message.len());
        let data = ctx.format_message(&message, chunks)?;
        Ok(Self { data, chunks })
    }

    /// The signable report text.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Sign the report with the enclave-held key.
    pub fn sign(&self, ctx: &SigningContext) -> Result<String, SigningError> {
        ctx.sign(self.data.as_bytes())
    }
}
