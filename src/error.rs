//! Typed errors for the fix loop
//!
//! Parse problems in the diagnostics extractor are never errors: malformed
//! lines are skipped at the call site. Everything that can abort a cycle
//! gets a variant here so the orchestrator can match on it.

use thiserror::Error;

/// Errors surfaced by the RPC client.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The handshake failed or the transport could not reach the service.
    #[error("connection error: {0}")]
    Connection(String),

    /// The service answered with an error payload.
    #[error("server error: {0}")]
    Server(String),

    /// The result could not be decoded as a JSON object.
    #[error("invalid response: expected a JSON object result")]
    InvalidResponse,

    /// A single attempt exceeded its time budget.
    #[error("request timed out after {0}s")]
    Timeout(u64),
}

/// Errors surfaced by the patch applicator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    /// The requested line range no longer fits the buffer. The buffer is
    /// left exactly as it was.
    #[error("range {start}..{end} out of bounds for buffer of {len} lines")]
    OutOfRange {
        start: usize,
        end: usize,
        len: usize,
    },

    /// A storage-backed buffer could not persist the mutation. The
    /// in-memory content is rolled back.
    #[error("could not persist buffer: {0}")]
    Write(String),
}

/// Errors surfaced by the build runner.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The build exceeded its time budget and was forcibly terminated.
    #[error("build timed out after {0}s")]
    Timeout(u64),

    /// The build command could not be started or waited on.
    #[error("build failed to run: {0}")]
    Spawn(String),
}
