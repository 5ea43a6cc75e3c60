//! HTTP clients for the five collaborator endpoints. Every collaborator
//! answers with the `{code, message, data}` envelope; helpers here map
//! transport failures and non-2xx statuses to `OpsError::Collaborator`
//! before envelope normalization runs.

pub mod agent;
pub mod auth;
pub mod registry;
pub mod workflow;
pub mod workload;

pub use agent::HttpAgentRegistry;
pub use auth::HttpAuthRegistry;
pub use registry::HttpClusterRegistry;
pub use workflow::HttpWorkflowEngine;
pub use workload::HttpWorkloadQuery;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use clusterops_domain::{Envelope, OpsError, OpsResult};

pub(crate) fn build_http_client(timeout_seconds: u64) -> OpsResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| OpsError::collaborator_error(format!("failed to build http client: {e}")))
}

async fn decode_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> OpsResult<Envelope<T>> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(OpsError::collaborator_error(format!(
            "{what}: HTTP {status} - {body}"
        )));
    }
    response
        .json::<Envelope<T>>()
        .await
        .map_err(|e| OpsError::collaborator_error(format!("{what}: invalid response body: {e}")))
}

pub(crate) async fn get_envelope<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    what: &str,
) -> OpsResult<Envelope<T>> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| OpsError::collaborator_error(format!("{what}: connection error: {e}")))?;
    decode_envelope(response, what).await
}

pub(crate) async fn post_envelope<T: DeserializeOwned, B: Serialize + ?Sized>(
    http: &reqwest::Client,
    url: &str,
    body: &B,
    what: &str,
) -> OpsResult<Envelope<T>> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| OpsError::collaborator_error(format!("{what}: connection error: {e}")))?;
    decode_envelope(response, what).await
}

pub(crate) async fn put_envelope<T: DeserializeOwned, B: Serialize + ?Sized>(
    http: &reqwest::Client,
    url: &str,
    body: &B,
    what: &str,
) -> OpsResult<Envelope<T>> {
    let response = http
        .put(url)
        .json(body)
        .send()
        .await
        .map_err(|e| OpsError::collaborator_error(format!("{what}: connection error: {e}")))?;
    decode_envelope(response, what).await
}

pub(crate) async fn delete_envelope<T: DeserializeOwned, B: Serialize + ?Sized>(
    http: &reqwest::Client,
    url: &str,
    body: Option<&B>,
    what: &str,
) -> OpsResult<Envelope<T>> {
    let mut request = http.delete(url);
    if let Some(body) = body {
        request = request.json(body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| OpsError::collaborator_error(format!("{what}: connection error: {e}")))?;
    decode_envelope(response, what).await
}

/// For write endpoints that carry no payload: only the code matters
pub(crate) fn check_ack(envelope: Envelope<serde_json::Value>, what: &str) -> OpsResult<()> {
    if envelope.code != 0 {
        return Err(OpsError::collaborator_error(format!(
            "{what} 返回错误码 {}: {}",
            envelope.code, envelope.message
        )));
    }
    Ok(())
}

/// For read endpoints where `data: null` legitimately means absent
pub(crate) fn optional_data<T>(envelope: Envelope<T>, what: &str) -> OpsResult<Option<T>> {
    if envelope.code != 0 {
        return Err(OpsError::collaborator_error(format!(
            "{what} 返回错误码 {}: {}",
            envelope.code, envelope.message
        )));
    }
    Ok(envelope.data)
}
