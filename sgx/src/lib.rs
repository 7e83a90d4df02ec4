//! Enclave adapter for Gramine's `/dev/attestation` pseudo-filesystem.
//!
//! Gramine exposes SGX attestation as a handful of pseudo-files: writing
//! 64 bytes of report data and reading back a report or quote drives the
//! hardware. The whole write-then-read sequence is one critical section;
//! interleaving two callers would bind one caller's digest into the other
//! caller's quote.

pub mod error;
pub mod gramine;
pub mod report;
pub mod startup;

pub use error::EnclaveError;
pub use gramine::Enclave;
pub use report::SgxReport;
pub use startup::enforce_sgx_startup;
