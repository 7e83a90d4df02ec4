//! Startup self-check: prove the attestation path works before the server
//! accepts its first request.

use tracing::info;

use crate::error::EnclaveError;
use crate::gramine::Enclave;
use crate::report::SgxReport;

/// The only attestation scheme the backend supports.
pub const EXPECTED_ATTESTATION_TYPE: &str = "dcap";

/// Payload of the throw-away startup quote.
const SELF_TEST_REPORT_DATA: &[u8] = b"test";

/// Verify the host attestation environment end to end.
///
/// Opens every pseudo-file, requires DCAP, refuses debug-mode enclaves and
/// mints one throw-away quote. Callers treat any error as fatal.
pub fn enforce_sgx_startup(enclave: &Enclave) -> Result<SgxReport, EnclaveError> {
    enclave.check_device_files()?;

    let attestation_type = enclave.attestation_type()?;
    if attestation_type != EXPECTED_ATTESTATION_TYPE {
        return Err(EnclaveError::UnsupportedAttestationType(attestation_type));
    }

    let report = enclave.generate_report(SELF_TEST_REPORT_DATA)?;
    if report.is_debug() {
        return Err(EnclaveError::DebugEnclave);
    }

    let quote = enclave.generate_quote(SELF_TEST_REPORT_DATA)?;
    info!(
        mr_enclave = %hex::encode(report.mr_enclave),
        mr_signer = %hex::encode(report.mr_signer),
        isv_prod_id = report.isv_prod_id,
        isv_svn = report.isv_svn,
        quote_len = quote.len(),
        "SGX startup self-check passed"
    );
    Ok(report)
}
