//! Transport collaborator interface.
//!
//! Connection establishment, TLS, and buffering live behind this trait. The
//! dispatcher owns the transport exclusively, so implementations never see
//! concurrent calls.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::cluster::NodeId;

/// An encoded request handed to the transport for one node.
///
/// The correlation id is assigned by the dispatcher and must be echoed on
/// the matching response so it can be routed back to the originating call.
#[derive(Clone, Debug)]
pub struct RequestEnvelope {
    pub correlation: u64,
    pub api: &'static str,
    pub payload: Bytes,
}

/// An encoded response surfaced by `Transport::poll`.
#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
    pub node: NodeId,
    pub correlation: u64,
    pub payload: Bytes,
}

/// Network transport consumed by the dispatcher.
///
/// All methods are invoked from the single dispatcher task. `poll` waits up
/// to `timeout` for responses and doubles as the loop's pacing sleep when
/// the cluster is quiet; it must return early once responses are available.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Whether a request can be sent to the node right now.
    fn is_ready(&mut self, node: NodeId) -> bool;

    /// Hand a request to the transport. An error here is a connection-level
    /// failure; the dispatcher treats it as retriable.
    fn send(&mut self, node: NodeId, request: RequestEnvelope) -> anyhow::Result<()>;

    /// Collect responses, waiting up to `timeout` for the first batch.
    async fn poll(&mut self, timeout: Duration) -> Vec<ResponseEnvelope>;

    /// Whether the node's connection dropped since the last check. Calls in
    /// flight to a disconnected node are failed retriably.
    fn disconnected(&mut self, node: NodeId) -> bool;
}
