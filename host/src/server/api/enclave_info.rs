use axum::extract::State;
use axum::routing::get;
use axum::{debug_handler, Json, Router};
use notary_lib::encoding::to_u128_le;
use notary_sgx::SgxReport;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::error::HostResult;
use crate::AppState;

/// Enclave measurements rendered for Aleo programs: each 32-byte value as
/// two little-endian 128-bit magnitudes.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AleoEncodedMeasurements {
    #[schema(value_type = Vec<String>)]
    pub mrenclave: [String; 2],
    #[schema(value_type = Vec<String>)]
    pub mrsigner: [String; 2],
    pub isv_prod_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnclaveInfo {
    pub mrenclave: String,
    pub mrsigner: String,
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub debug: bool,
    pub aleo: AleoEncodedMeasurements,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnclaveInfoResponse {
    pub report_type: String,
    pub info: EnclaveInfo,
    pub signer_pub_key: String,
}

/// Assemble the memoised enclave-info response from the startup report.
/// Evaluated once at startup so a broken attestation path fails the boot,
/// not the first request.
pub fn build_enclave_info(report: &SgxReport, signer_address: &str) -> EnclaveInfoResponse {
    EnclaveInfoResponse {
        report_type: crate::attestation::REPORT_TYPE.to_string(),
        info: EnclaveInfo {
            mrenclave: hex::encode(report.mr_enclave),
            mrsigner: hex::encode(report.mr_signer),
            isv_prod_id: report.isv_prod_id,
            isv_svn: report.isv_svn,
            debug: report.is_debug(),
            aleo: AleoEncodedMeasurements {
                mrenclave: aleo_u128_pair(&report.mr_enclave),
                mrsigner: aleo_u128_pair(&report.mr_signer),
                isv_prod_id: format!("{}u128", report.isv_prod_id),
            },
        },
        signer_pub_key: signer_address.to_string(),
    }
}

fn aleo_u128_pair(bytes: &[u8; 32]) -> [String; 2] {
    let low = to_u128_le(&bytes[..16]).expect("16-byte slice fits a u128");
    let high = to_u128_le(&bytes[16..]).expect("16-byte slice fits a u128");
    [format!("{low}u128"), format!("{high}u128")]
}

#[utoipa::path(get, path = "/enclave-info",
    tag = "Enclave",
    responses (
        (status = 200, description = "The enclave identity", body = EnclaveInfoResponse),
    )
)]
#[debug_handler(state = AppState)]
/// The enclave measurement, signer address and Aleo-encoded identity
/// fields consumers pin on-chain.
async fn handler(State(state): State<AppState>) -> HostResult<Json<EnclaveInfoResponse>> {
    Ok(Json(state.enclave_info.as_ref().clone()))
}

#[derive(OpenApi)]
#[openapi(paths(handler))]
struct Docs;

pub fn create_docs() -> utoipa::openapi::OpenApi {
    Docs::openapi()
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(mr_enclave: [u8; 32], isv_prod_id: u16) -> SgxReport {
        SgxReport {
            cpu_svn: [0; 16],
            misc_select: 0,
            flags: 0,
            xfrm: 0,
            mr_enclave,
            mr_signer: [0xbb; 32],
            isv_prod_id,
            isv_svn: 1,
            report_data: [0; 64],
        }
    }

    #[test]
    fn measurements_split_into_two_le_magnitudes() {
        let mut mr_enclave = [0u8; 32];
        mr_enclave[0] = 0x01;
        mr_enclave[16] = 0x02;
        let info = build_enclave_info(&report_with(mr_enclave, 7), "aleo1signer");

        assert_eq!(info.report_type, "sgx");
        assert_eq!(info.signer_pub_key, "aleo1signer");
        assert_eq!(info.info.aleo.mrenclave[0], "1u128");
        assert_eq!(info.info.aleo.mrenclave[1], "2u128");
        assert_eq!(info.info.aleo.isv_prod_id, "7u128");
        assert_eq!(info.info.mrenclave, hex::encode(mr_enclave));
    }

    #[tokio::test]
    async fn endpoint_serves_the_memoised_response() {
        use crate::test_util::test_state;
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let (_dir, state) = test_state();
        let expected_signer = state.signer.address().to_string();
        let app = super::super::create_router(4).with_state(state);
        let response = app
            .oneshot(Request::builder().uri("/enclave-info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["reportType"], "sgx");
        assert_eq!(body["signerPubKey"], expected_signer);
        assert_eq!(body["info"]["debug"], false);
    }
}
