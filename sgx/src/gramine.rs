//! The target-info → report → quote handshake over Gramine's pseudo-files.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

use crate::error::EnclaveError;
use crate::report::SgxReport;

/// Directory Gramine mounts the attestation pseudo-files under.
pub const ATTESTATION_DEVICE_DIR: &str = "/dev/attestation";
/// Canonicalised device paths must stay under this root.
pub const DEVICE_ROOT: &str = "/dev";

pub const MY_TARGET_INFO_FILE: &str = "my_target_info";
pub const TARGET_INFO_FILE: &str = "target_info";
pub const USER_REPORT_DATA_FILE: &str = "user_report_data";
pub const REPORT_FILE: &str = "report";
pub const QUOTE_FILE: &str = "quote";
pub const ATTESTATION_TYPE_FILE: &str = "attestation_type";

const ALL_DEVICE_FILES: [&str; 6] = [
    MY_TARGET_INFO_FILE,
    TARGET_INFO_FILE,
    USER_REPORT_DATA_FILE,
    REPORT_FILE,
    QUOTE_FILE,
    ATTESTATION_TYPE_FILE,
];

/// Size of the serialized target-info structure.
pub const TARGET_INFO_SIZE: usize = 512;
/// Width of the report-data field; shorter inputs are zero-extended.
pub const REPORT_DATA_SIZE: usize = 64;
/// A DCAP quote is never smaller than this.
pub const MIN_QUOTE_SIZE: usize = 1020;

/// Handle on the host's attestation device.
///
/// The pseudo-file sequence is stateful on the Gramine side, so the whole
/// handshake runs under one mutex; see the module docs.
pub struct Enclave {
    device_dir: PathBuf,
    device_root: PathBuf,
    lock: Mutex<()>,
}

impl Default for Enclave {
    fn default() -> Self {
        Self::new()
    }
}

impl Enclave {
    pub fn new() -> Self {
        Self::with_device_dir(ATTESTATION_DEVICE_DIR, DEVICE_ROOT)
    }

    /// Use an alternative device directory, jailed to `device_root`. Tests
    /// point this at a seeded temporary directory.
    pub fn with_device_dir(device_dir: impl Into<PathBuf>, device_root: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
            device_root: device_root.into(),
            lock: Mutex::new(()),
        }
    }

    fn device_path(&self, name: &str) -> Result<PathBuf, EnclaveError> {
        let path = self.device_dir.join(name);
        let canonical = path
            .canonicalize()
            .map_err(|source| EnclaveError::DeviceFile { path, source })?;
        if !canonical.starts_with(&self.device_root) {
            return Err(EnclaveError::PathOutsideDeviceRoot(canonical));
        }
        Ok(canonical)
    }

    fn read_device(&self, name: &str) -> Result<Vec<u8>, EnclaveError> {
        let path = self.device_path(name)?;
        let mut bytes = Vec::new();
        OpenOptions::new()
            .read(true)
            .open(&path)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(|source| EnclaveError::DeviceFile { path, source })?;
        Ok(bytes)
    }

    fn write_device(&self, name: &str, bytes: &[u8]) -> Result<(), EnclaveError> {
        let path = self.device_path(name)?;
        OpenOptions::new()
            .write(true)
            .open(&path)
            .and_then(|mut file| file.write_all(bytes))
            .map_err(|source| EnclaveError::DeviceFile { path, source })
    }

    /// Verify that every pseudo-file is present and readable.
    pub fn check_device_files(&self) -> Result<(), EnclaveError> {
        for name in ALL_DEVICE_FILES {
            let path = self.device_path(name)?;
            OpenOptions::new()
                .read(true)
                .open(&path)
                .map_err(|source| EnclaveError::DeviceFile { path, source })?;
        }
        Ok(())
    }

    /// The attestation scheme the host was started with, e.g. `"dcap"`.
    pub fn attestation_type(&self) -> Result<String, EnclaveError> {
        let bytes = self.read_device(ATTESTATION_TYPE_FILE)?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    /// Produce a report bound to `report_data` (zero-extended/truncated to
    /// 64 bytes).
    pub fn generate_report(&self, report_data: &[u8]) -> Result<SgxReport, EnclaveError> {
        let _guard = self.lock.lock().expect("enclave mutex poisoned");
        self.refresh_report_locked(report_data)?;
        let bytes = self.read_device(REPORT_FILE)?;
        SgxReport::parse(&bytes)
    }

    /// Produce a quote whose report data carries `digest` (zero-extended to
    /// 64 bytes). The five device operations run as one critical section.
    pub fn generate_quote(&self, digest: &[u8]) -> Result<Vec<u8>, EnclaveError> {
        let _guard = self.lock.lock().expect("enclave mutex poisoned");
        self.refresh_report_locked(digest)?;

        let report_bytes = self.read_device(REPORT_FILE)?;
        SgxReport::parse(&report_bytes)?;

        let quote = self.read_device(QUOTE_FILE)?;
        if quote.len() < MIN_QUOTE_SIZE {
            return Err(EnclaveError::QuoteGenerationFailed(format!(
                "quote of {} bytes is below the {MIN_QUOTE_SIZE} byte minimum",
                quote.len()
            )));
        }
        debug!(quote_len = quote.len(), "quote generated");
        Ok(quote)
    }

    fn refresh_report_locked(&self, report_data: &[u8]) -> Result<(), EnclaveError> {
        let target_info = self.read_device(MY_TARGET_INFO_FILE)?;
        if target_info.len() != TARGET_INFO_SIZE {
            return Err(EnclaveError::ReadingReport(format!(
                "target info of {} bytes (expected {TARGET_INFO_SIZE})",
                target_info.len()
            )));
        }
        self.write_device(TARGET_INFO_FILE, &target_info)?;
        self.write_device(USER_REPORT_DATA_FILE, &pad_report_data(report_data))?;
        Ok(())
    }
}

fn pad_report_data(data: &[u8]) -> [u8; REPORT_DATA_SIZE] {
    let mut out = [0u8; REPORT_DATA_SIZE];
    let len = data.len().min(REPORT_DATA_SIZE);
    out[..len].copy_from_slice(&data[..len]);
    out
}

/// Seed a directory with the six pseudo-files so the handshake can run
/// against it. Test-only.
#[cfg(test)]
pub(crate) fn seed_device_dir(
    dir: &std::path::Path,
    report: &[u8],
    quote: &[u8],
    attestation_type: &str,
) {
    std::fs::write(dir.join(MY_TARGET_INFO_FILE), [0x42u8; TARGET_INFO_SIZE]).unwrap();
    std::fs::write(dir.join(TARGET_INFO_FILE), []).unwrap();
    std::fs::write(dir.join(USER_REPORT_DATA_FILE), []).unwrap();
    std::fs::write(dir.join(REPORT_FILE), report).unwrap();
    std::fs::write(dir.join(QUOTE_FILE), quote).unwrap();
    std::fs::write(dir.join(ATTESTATION_TYPE_FILE), attestation_type).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::raw_report;
    use std::path::Path;
    use std::sync::Arc;

    fn enclave_in(dir: &Path) -> Enclave {
        Enclave::with_device_dir(dir, dir)
    }

    #[test]
    fn quote_handshake_writes_padded_digest() {
        let dir = tempfile::tempdir().unwrap();
        seed_device_dir(dir.path(), &raw_report(0), &[0x5a; 2048], "dcap");
        let enclave = enclave_in(dir.path());

        let quote = enclave.generate_quote(&[0xab; 16]).unwrap();
        assert_eq!(quote.len(), 2048);

        let sealed = std::fs::read(dir.path().join(USER_REPORT_DATA_FILE)).unwrap();
        let mut expected = [0u8; REPORT_DATA_SIZE];
        expected[..16].copy_from_slice(&[0xab; 16]);
        assert_eq!(sealed, expected);

        // Step 2 copied my_target_info into target_info.
        let target_info = std::fs::read(dir.path().join(TARGET_INFO_FILE)).unwrap();
        assert_eq!(target_info, vec![0x42u8; TARGET_INFO_SIZE]);
    }

    #[test]
    fn report_data_longer_than_64_bytes_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        seed_device_dir(dir.path(), &raw_report(0), &[0u8; MIN_QUOTE_SIZE], "dcap");
        let enclave = enclave_in(dir.path());
        enclave.generate_report(&[0x11; 100]).unwrap();
        let sealed = std::fs::read(dir.path().join(USER_REPORT_DATA_FILE)).unwrap();
        assert_eq!(sealed, vec![0x11u8; REPORT_DATA_SIZE]);
    }

    #[test]
    fn undersized_quotes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        seed_device_dir(dir.path(), &raw_report(0), &[0u8; MIN_QUOTE_SIZE - 1], "dcap");
        let enclave = enclave_in(dir.path());
        assert!(matches!(
            enclave.generate_quote(&[0u8; 16]),
            Err(EnclaveError::QuoteGenerationFailed(_))
        ));
    }

    #[test]
    fn malformed_reports_fail_the_handshake() {
        let dir = tempfile::tempdir().unwrap();
        seed_device_dir(dir.path(), &[0u8; 100], &[0u8; 2048], "dcap");
        let enclave = enclave_in(dir.path());
        assert!(matches!(
            enclave.generate_quote(&[0u8; 16]),
            Err(EnclaveError::InvalidSGXReportSize(100))
        ));
    }

    #[test]
    fn attestation_type_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        seed_device_dir(dir.path(), &raw_report(0), &[0u8; MIN_QUOTE_SIZE], "dcap\n");
        assert_eq!(enclave_in(dir.path()).attestation_type().unwrap(), "dcap");
    }

    #[test]
    fn missing_device_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let enclave = enclave_in(dir.path());
        assert!(matches!(
            enclave.attestation_type(),
            Err(EnclaveError::DeviceFile { .. })
        ));
    }

    #[test]
    fn paths_may_not_escape_the_device_root() {
        let dir = tempfile::tempdir().unwrap();
        seed_device_dir(dir.path(), &raw_report(0), &[0u8; MIN_QUOTE_SIZE], "dcap");
        // Jail the enclave to a subdirectory the files are not in.
        let jail = dir.path().join("jail");
        std::fs::create_dir(&jail).unwrap();
        let enclave = Enclave::with_device_dir(dir.path(), &jail);
        assert!(matches!(
            enclave.attestation_type(),
            Err(EnclaveError::PathOutsideDeviceRoot(_))
        ));
    }

    #[test]
    fn concurrent_quote_generation_serialises() {
        let dir = tempfile::tempdir().unwrap();
        seed_device_dir(dir.path(), &raw_report(0), &[0x77; 2048], "dcap");
        let enclave = Arc::new(enclave_in(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let enclave = Arc::clone(&enclave);
                std::thread::spawn(move || enclave.generate_quote(&[i as u8; 16]).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 2048);
        }
    }
}
