use std::collections::BTreeMap;

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The JSON body every node answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub service: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Headers received by the terminal hop (echo only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Vec<String>>>,
}

impl Envelope {
    /// Values of a received header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .flatten()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid node url: {0}")]
    Url(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response was not an envelope ({status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TopologyClient {
    client: Client,
    base: Url,
}

impl TopologyClient {
    /// Client for the node at `base_url`, e.g. `http://svc-a:8000`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| ClientError::Url(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Url(format!("{base_url} cannot be a base")));
        }
        Ok(Self { client, base })
    }

    pub async fn set_errors(&self, percentage: u8) -> Result<Envelope, ClientError> {
        self.get(&format!("/errors/{percentage}")).await
    }

    pub async fn set_headers(&self, percentage: u8) -> Result<Envelope, ClientError> {
        self.get(&format!("/headers/{percentage}")).await
    }

    /// `latency` in Go duration syntax or bare milliseconds.
    pub async fn set_latency(&self, latency: &str) -> Result<Envelope, ClientError> {
        self.get_segments(&["latency", latency]).await
    }

    pub async fn set_graceful(&self, absorb_failures: bool) -> Result<Envelope, ClientError> {
        self.get(&format!("/graceful/{absorb_failures}")).await
    }

    /// Run the concurrency emulator: `mode` is serial, mixed or parallel.
    pub async fn local(&self, mode: &str, duration: &str) -> Result<Envelope, ClientError> {
        self.get_segments(&["local", mode, "latency", duration]).await
    }

    pub async fn crash(&self, message: &str) -> Result<Envelope, ClientError> {
        self.get_segments(&["crash", message]).await
    }

    /// GET `path` (which may include a query) and decode the envelope,
    /// whatever the status.
    pub async fn get(&self, path: &str) -> Result<Envelope, ClientError> {
        decode(self.get_raw(path).await?).await
    }

    pub async fn get_raw(&self, path: &str) -> Result<Response, ClientError> {
        let url = self.base.join(path).map_err(|e| ClientError::Url(e.to_string()))?;
        Ok(self.client.get(url).send().await?)
    }

    async fn get_segments(&self, segments: &[&str]) -> Result<Envelope, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(self.base.to_string()))?
            .clear()
            .extend(segments);
        decode(self.client.get(url).send().await?).await
    }
}

async fn decode(response: Response) -> Result<Envelope, ClientError> {
    let status = response.status().as_u16();
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|source| ClientError::Decode { status, source })
}
