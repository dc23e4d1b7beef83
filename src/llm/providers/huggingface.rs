//! Hugging Face Inference API provider (`POST /models/<model>`).
//!
//! One request per call: `{"inputs": prompt}` with a bearer token. The status
//! and body are handed back untouched; retrying and decoding belong to the
//! executor.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, trace};

use crate::llm::{ProviderError, RawResponse, TransportError};

/// Adapter for a hosted text-generation model.
///
/// Built once at startup. Cloning is cheap because `reqwest::Client` is an
/// `Arc` internally, so all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HuggingFaceProvider {
    pub fn new(
        api_base_url: &str,
        model: &str,
        timeout_seconds: u64,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: model_endpoint(api_base_url, model),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn post_inputs(&self, prompt: &str) -> Result<RawResponse, TransportError> {
        let payload = InferenceRequest { inputs: prompt };

        debug!(endpoint = %self.endpoint, prompt_len = prompt.len(), "sending inference request");
        trace!(prompt = %prompt, "full inference prompt");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, timeout = e.is_timeout(), "inference request failed (transport)");
                TransportError(e.to_string())
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            error!(%status, error = %e, "failed to read inference response body");
            TransportError(format!("failed to read response body: {e}"))
        })?;

        debug!(%status, body_len = body.len(), "received inference response");
        trace!(body = %body, "full inference response");

        Ok(RawResponse { status, body })
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

fn model_endpoint(api_base_url: &str, model: &str) -> String {
    format!("{}/{}", api_base_url.trim_end_matches('/'), model.trim_start_matches('/'))
}
