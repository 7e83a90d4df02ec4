//! Core library for the Aleo notarization backend.
//!
//! Everything that has to agree byte-for-byte between the HTTP host and the
//! on-chain verifier lives here: the little-endian field-element encoding,
//! the textual chunk format that is the Poseidon hash preimage, the
//! positional user-data layout sealed into the TEE quote, and the signing
//! context wrapping an enclave-held Aleo keypair.

pub mod encoding;
pub mod error;
pub mod proof_data;
pub mod report;
pub mod signer;

pub use error::{EncodingError, SigningError};
pub use proof_data::{
    AttestationRequest, AttestationRequestWithDebug, EncodedPositions, EncodingOptions,
    EncodingValue, HtmlResultType, HttpMethod, QuotePreparationData, ResponseFormat,
};
pub use report::OracleReport;
pub use signer::SigningContext;
