//! Remote fixing service client
//!
//! A thin JSON-RPC style channel to the fixing service: typed wire
//! envelopes, a pluggable transport, a retrying client, and the tool
//! catalog with its required-argument schemas.

pub mod client;
pub mod protocol;
pub mod tools;
pub mod transport;

pub use client::{backoff_delay, RpcClient};
pub use protocol::{RpcErrorPayload, RpcRequest, RpcResponse, PROTOCOL_VERSION};
pub use tools::{FixRequest, FixResponse, Tool};
pub use transport::{HttpTransport, Transport};
