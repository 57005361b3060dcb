//! Resilient RPC client
//!
//! Bounded retries with exponential backoff and a per-attempt timeout. The
//! client is a pure message pipe: its only state is the connected flag, and
//! no call mutates anything else as a side effect.

use crate::error::RpcError;
use crate::rpc::protocol::{RpcRequest, METHOD_INITIALIZE};
use crate::rpc::transport::Transport;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Wait before retrying a failed attempt: `2^attempt` seconds, with the
/// first retry after attempt 0 waiting one second. Pure so it can be tested
/// without a transport or a clock.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

pub struct RpcClient {
    transport: Arc<dyn Transport>,
    max_retries: u32,
    attempt_timeout: Duration,
    connected: bool,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_retries: DEFAULT_MAX_RETRIES,
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            connected: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Perform the handshake. Any failure, including a server-side error
    /// payload, is reported as a connection error.
    pub async fn connect(&mut self) -> Result<(), RpcError> {
        let request = RpcRequest::new(
            METHOD_INITIALIZE,
            json!({
                "protocol_version": crate::rpc::protocol::PROTOCOL_VERSION,
                "client": { "name": "mend", "version": env!("CARGO_PKG_VERSION") },
            }),
        );

        match self.send_with_retry(&request).await {
            Ok(_) => {
                self.connected = true;
                Ok(())
            }
            Err(RpcError::Server(msg)) => Err(RpcError::Connection(msg)),
            Err(e) => Err(e),
        }
    }

    /// Invoke a named tool and decode its result as a JSON object.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<Map<String, Value>, RpcError> {
        let request = RpcRequest::tool_call(name, arguments);
        let result = self.send_with_retry(&request).await?;
        match result {
            Value::Object(map) => Ok(map),
            _ => Err(RpcError::InvalidResponse),
        }
    }

    /// Send one request with the full reliability policy: up to
    /// `max_retries` attempts, exponential backoff between them, each
    /// attempt individually timed out. The last error is surfaced verbatim
    /// once attempts are exhausted.
    async fn send_with_retry(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        let mut last_error = RpcError::Connection("no attempt was made".to_string());

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt - 1)).await;
            }

            match self.send_once(request).await {
                Ok(result) => return Ok(result),
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    async fn send_once(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        let response = tokio::time::timeout(self.attempt_timeout, self.transport.send(request))
            .await
            .map_err(|_| RpcError::Timeout(self.attempt_timeout.as_secs()))??;

        // A response answering some other request is as useless as a
        // malformed one.
        if response.id != request.id {
            return Err(RpcError::InvalidResponse);
        }

        if let Some(error) = response.error {
            return Err(RpcError::Server(error.message));
        }

        response.result.ok_or(RpcError::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::protocol::RpcResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport that fails every attempt and counts them.
    struct AlwaysFailing {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Transport for AlwaysFailing {
        async fn send(&self, _request: &RpcRequest) -> Result<RpcResponse, RpcError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Err(RpcError::Connection(format!("refused (attempt {})", n)))
        }
    }

    /// Transport that fails a fixed number of times, then succeeds.
    struct FlakyThenOk {
        failures_left: AtomicU32,
        result: Value,
    }

    #[async_trait]
    impl Transport for FlakyThenOk {
        async fn send(&self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(RpcError::Connection("flaky".to_string()));
            }
            Ok(RpcResponse::ok(request, self.result.clone()))
        }
    }

    /// Transport that always answers with a server error payload.
    struct ServerErrors;

    #[async_trait]
    impl Transport for ServerErrors {
        async fn send(&self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
            Ok(RpcResponse::err(request, -32000, "model unavailable"))
        }
    }

    /// Transport that returns a non-object result.
    struct ScalarResult;

    #[async_trait]
    impl Transport for ScalarResult {
        async fn send(&self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
            Ok(RpcResponse::ok(request, json!(42)))
        }
    }

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_makes_exactly_max_retries_attempts() {
        let transport = Arc::new(AlwaysFailing {
            attempts: AtomicU32::new(0),
        });
        let client = RpcClient::new(transport.clone()).with_max_retries(3);

        let err = client.call_tool("fix", json!({})).await.unwrap_err();
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        // Last error verbatim
        assert!(err.to_string().contains("attempt 3"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let transport = Arc::new(FlakyThenOk {
            failures_left: AtomicU32::new(2),
            result: json!({"success": true}),
        });
        let client = RpcClient::new(transport).with_max_retries(3);

        let result = client.call_tool("fix", json!({})).await.unwrap();
        assert_eq!(result.get("success"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_server_error_payload_surfaces_message() {
        let client = RpcClient::new(Arc::new(ServerErrors)).with_max_retries(1);
        let err = client.call_tool("fix", json!({})).await.unwrap_err();
        match err {
            RpcError::Server(msg) => assert_eq!(msg, "model unavailable"),
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_response_id_is_invalid_response() {
        /// Transport that answers with a fresh id instead of echoing the
        /// request's.
        struct WrongId;

        #[async_trait]
        impl Transport for WrongId {
            async fn send(&self, _request: &RpcRequest) -> Result<RpcResponse, RpcError> {
                Ok(RpcResponse {
                    id: uuid::Uuid::new_v4(),
                    result: Some(json!({"success": true})),
                    error: None,
                })
            }
        }

        let client = RpcClient::new(Arc::new(WrongId)).with_max_retries(1);
        let err = client.call_tool("fix", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_non_object_result_is_invalid_response() {
        let client = RpcClient::new(Arc::new(ScalarResult)).with_max_retries(1);
        let err = client.call_tool("explain", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidResponse));
    }

    #[tokio::test]
    async fn test_connect_maps_server_error_to_connection_error() {
        let mut client = RpcClient::new(Arc::new(ServerErrors)).with_max_retries(1);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, RpcError::Connection(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_sets_connected_flag() {
        let transport = Arc::new(FlakyThenOk {
            failures_left: AtomicU32::new(0),
            result: json!({"protocol_version": crate::rpc::protocol::PROTOCOL_VERSION}),
        });
        let mut client = RpcClient::new(transport);
        client.connect().await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_surfaces_as_timeout() {
        struct Hangs;

        #[async_trait]
        impl Transport for Hangs {
            async fn send(&self, _request: &RpcRequest) -> Result<RpcResponse, RpcError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
        }

        let client = RpcClient::new(Arc::new(Hangs))
            .with_max_retries(1)
            .with_attempt_timeout(Duration::from_secs(5));
        let err = client.call_tool("fix", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout(5)));
    }
}
