pub mod attestation;
pub mod config;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod price_feed;
pub mod rational;
pub mod server;
pub mod time;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use notary_lib::SigningContext;
use notary_sgx::{enforce_sgx_startup, Enclave};
use tracing::info;

use crate::config::NotaryConfig;
use crate::error::HostResult;
use crate::server::api::enclave_info::{build_enclave_info, EnclaveInfoResponse};
use crate::time::{AuthenticatedTimeClient, TimeSource};

/// Per-request timeout on outbound HTTPS calls; retries are on top.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Parser)]
#[command(
    name = "notary-host",
    about = "TEE notarization backend for the Aleo oracle",
    long_about = None
)]
pub struct Cli {
    #[arg(long, require_equals = true, default_value = "0.0.0.0:8080")]
    /// Server bind address
    /// [default: 0.0.0.0:8080]
    pub address: String,

    #[arg(long, require_equals = true, default_value = "16")]
    /// Limit the max number of in-flight notarization requests
    pub concurrency_limit: usize,

    #[arg(long, require_equals = true)]
    pub log_path: Option<PathBuf>,

    #[arg(long, require_equals = true, default_value = "7")]
    pub max_log: usize,

    #[arg(long, require_equals = true)]
    /// Path to a config file replacing the embedded configuration. The
    /// embedded one is part of the enclave measurement; overriding it
    /// changes what verifiers see.
    pub config_path: Option<PathBuf>,

    #[arg(long, require_equals = true, env = "RUST_LOG", default_value = "info")]
    /// Set the log level
    pub log_level: String,
}

/// Shared per-process state handed to every handler.
///
/// The signing context and the enclave handle are the only globally
/// contended resources; both carry their own mutex and handlers must not
/// hold either across unrelated work.
#[derive(Clone)]
pub struct AppState {
    pub opts: Cli,
    pub config: Arc<NotaryConfig>,
    pub signer: Arc<SigningContext>,
    pub enclave: Arc<Enclave>,
    pub enclave_info: Arc<EnclaveInfoResponse>,
    pub time: Arc<dyn TimeSource>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Validate the configuration, generate the enclave keypair, run the
    /// SGX self-check and memoise the enclave-info response. Any failure
    /// here is fatal.
    pub fn init(opts: Cli) -> HostResult<Self> {
        let config = Arc::new(NotaryConfig::load(opts.config_path.as_deref())?);
        info!(
            tokens = config.tokens.len(),
            exchanges = config.exchanges.len(),
            whitelist = config.whitelist.len(),
            "configuration loaded"
        );

        let signer = Arc::new(SigningContext::generate().map_err(crate::error::HostError::from)?);
        info!(address = signer.address(), "signing context initialized");

        let enclave = Arc::new(Enclave::new());
        let report = enforce_sgx_startup(&enclave).map_err(crate::error::HostError::from)?;
        let enclave_info = Arc::new(build_enclave_info(&report, signer.address()));

        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .user_agent(concat!("notary-host/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::error::HostError::Anyhow(e.into()))?;
        let time: Arc<dyn TimeSource> = Arc::new(AuthenticatedTimeClient::new(
            http.clone(),
            config.attestation_time_service.clone(),
        ));

        Ok(Self { opts, config, signer, enclave, enclave_info, time, http })
    }
}
