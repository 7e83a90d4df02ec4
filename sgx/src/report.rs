//! The 432-byte SGX report structure.
//!
//! Layout follows the Intel SDM; only the fields the notarization pipeline
//! reads are decoded. Offsets are fixed by hardware: flags at 48 (debug bit
//! 0x02), MRENCLAVE at 64, MRSIGNER at 128, ISVPRODID at 256, ISVSVN at
//! 258, report data at 320.

use crate::error::EnclaveError;

/// Exact size of an SGX report.
pub const SGX_REPORT_SIZE: usize = 432;
/// Bit set in the attribute flags when the enclave runs in debug mode.
pub const DEBUG_FLAG: u64 = 0x02;

const CPU_SVN_OFFSET: usize = 0;
const MISC_SELECT_OFFSET: usize = 16;
const FLAGS_OFFSET: usize = 48;
const XFRM_OFFSET: usize = 56;
const MR_ENCLAVE_OFFSET: usize = 64;
const MR_SIGNER_OFFSET: usize = 128;
const ISV_PROD_ID_OFFSET: usize = 256;
const ISV_SVN_OFFSET: usize = 258;
const REPORT_DATA_OFFSET: usize = 320;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgxReport {
    pub cpu_svn: [u8; 16],
    pub misc_select: u32,
    pub flags: u64,
    pub xfrm: u64,
    pub mr_enclave: [u8; 32],
    pub mr_signer: [u8; 32],
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub report_data: [u8; 64],
}

impl SgxReport {
    /// Decode a report read from the `report` pseudo-file.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnclaveError> {
        if bytes.len() != SGX_REPORT_SIZE {
            return Err(EnclaveError::InvalidSGXReportSize(bytes.len()));
        }

        let mut cpu_svn = [0u8; 16];
        cpu_svn.copy_from_slice(&bytes[CPU_SVN_OFFSET..CPU_SVN_OFFSET + 16]);
        let mut mr_enclave = [0u8; 32];
        mr_enclave.copy_from_slice(&bytes[MR_ENCLAVE_OFFSET..MR_ENCLAVE_OFFSET + 32]);
        let mut mr_signer = [0u8; 32];
        mr_signer.copy_from_slice(&bytes[MR_SIGNER_OFFSET..MR_SIGNER_OFFSET + 32]);
        let mut report_data = [0u8; 64];
        report_data.copy_from_slice(&bytes[REPORT_DATA_OFFSET..REPORT_DATA_OFFSET + 64]);

        Ok(Self {
            cpu_svn,
            misc_select: u32::from_le_bytes(
                bytes[MISC_SELECT_OFFSET..MISC_SELECT_OFFSET + 4].try_into().unwrap(),
            ),
            flags: u64::from_le_bytes(bytes[FLAGS_OFFSET..FLAGS_OFFSET + 8].try_into().unwrap()),
            xfrm: u64::from_le_bytes(bytes[XFRM_OFFSET..XFRM_OFFSET + 8].try_into().unwrap()),
            mr_enclave,
            mr_signer,
            isv_prod_id: u16::from_le_bytes(
                bytes[ISV_PROD_ID_OFFSET..ISV_PROD_ID_OFFSET + 2].try_into().unwrap(),
            ),
            isv_svn: u16::from_le_bytes(
                bytes[ISV_SVN_OFFSET..ISV_SVN_OFFSET + 2].try_into().unwrap(),
            ),
            report_data,
        })
    }

    /// Whether the debug attribute bit is set.
    pub fn is_debug(&self) -> bool {
        self.flags & DEBUG_FLAG != 0
    }
}

/// Build a raw report with recognisable field contents. Test fixture shared
/// with the gramine and startup tests.
#[cfg(test)]
pub(crate) fn raw_report(flags: u64) -> Vec<u8> {
    let mut bytes = vec![0u8; SGX_REPORT_SIZE];
    bytes[CPU_SVN_OFFSET..CPU_SVN_OFFSET + 16].copy_from_slice(&[0x01; 16]);
    bytes[MISC_SELECT_OFFSET..MISC_SELECT_OFFSET + 4]
        .copy_from_slice(&0xdead_beefu32.to_le_bytes());
    bytes[FLAGS_OFFSET..FLAGS_OFFSET + 8].copy_from_slice(&flags.to_le_bytes());
    bytes[XFRM_OFFSET..XFRM_OFFSET + 8].copy_from_slice(&0x07u64.to_le_bytes());
    bytes[MR_ENCLAVE_OFFSET..MR_ENCLAVE_OFFSET + 32].copy_from_slice(&[0xaa; 32]);
    bytes[MR_SIGNER_OFFSET..MR_SIGNER_OFFSET + 32].copy_from_slice(&[0xbb; 32]);
    bytes[ISV_PROD_ID_OFFSET..ISV_PROD_ID_OFFSET + 2].copy_from_slice(&7u16.to_le_bytes());
    bytes[ISV_SVN_OFFSET..ISV_SVN_OFFSET + 2].copy_from_slice(&3u16.to_le_bytes());
    bytes[REPORT_DATA_OFFSET..REPORT_DATA_OFFSET + 64].copy_from_slice(&[0xcc; 64]);
    bytes
}
