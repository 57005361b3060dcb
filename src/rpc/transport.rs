//! Message transports
//!
//! The client never talks to the network directly; it goes through
//! `Transport`, so tests can swap in a scripted fake and the retry policy
//! can be exercised without sockets.

use crate::error::RpcError;
use crate::rpc::protocol::{RpcRequest, RpcResponse};
use async_trait::async_trait;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one request and wait for its response. Transport-level
    /// failures (unreachable host, connection reset) surface as
    /// `Connection`; a reply that is not a valid response envelope is
    /// `InvalidResponse`.
    async fn send(&self, request: &RpcRequest) -> Result<RpcResponse, RpcError>;
}

/// HTTP POST transport speaking JSON to a single endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| RpcError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Connection(format!(
                "HTTP {}: {}",
                status,
                crate::util::truncate(&body, 200)
            )));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|_| RpcError::InvalidResponse)
    }
}
