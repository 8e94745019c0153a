//! Submission of signed responses to the challenge's verification URI.

use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};

use crate::error::Result;
use crate::rest::{RestClient, RestRequest, RestResponse};
use crate::token::ChallengeToken;

/// Query parameter carrying the signed response.
pub const CHALLENGE_RESPONSE_PARAM: &str = "challengeResponse";
/// Query parameter carrying the caller's state handle.
pub const STATE_HANDLE_PARAM: &str = "stateHandle";

pub struct VerificationSubmitter<'a> {
    rest: &'a dyn RestClient,
}

impl<'a> VerificationSubmitter<'a> {
    pub fn new(rest: &'a dyn RestClient) -> Self {
        Self { rest }
    }

    /// Query-string request when a state handle is present, JSON body otherwise.
    pub fn build_request(
        token: &ChallengeToken,
        response_token: &str,
        state_handle: Option<&str>,
    ) -> RestRequest {
        let mut url = token.verification_uri().clone();
        match state_handle {
            Some(handle) => {
                url.query_pairs_mut()
                    .append_pair(CHALLENGE_RESPONSE_PARAM, response_token)
                    .append_pair(STATE_HANDLE_PARAM, handle);
                RestRequest::post(url, None)
            }
            None => RestRequest::post(
                url,
                Some(json!({
                    "method": token.method().as_str(),
                    "challengeResponse": response_token,
                })),
            ),
        }
    }

    pub async fn submit(&self, request: RestRequest) -> Result<RestResponse> {
        let start = Instant::now();
        let host = request.url.host_str().unwrap_or_default().to_string();

        let response = self
            .rest
            .submit(request)
            .await
            .and_then(RestResponse::ensure_success)
            .map_err(|e| {
                warn!(host = %host, error = %e, "Verification submission failed");
                e
            })?;

        info!(
            host = %host,
            status = response.status,
            latency_ms = start.elapsed().as_millis() as u64,
            "Verification submitted"
        );
        Ok(response)
    }
}
