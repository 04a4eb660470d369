//! Asynchronous administrative client for a ferrite cluster.
//!
//! The crate is built around a single dispatcher task that owns every
//! outstanding call: it resolves destination nodes from cluster metadata
//! snapshots, sends encoded requests over an injected transport, routes
//! responses back to each call's strategy, retries retriable failures with
//! backoff, and enforces per-call deadlines. Callers interact only through
//! `AdminClient` operations and the `CompletionHandle` results they return.
//!
//! Wire formats, connection management, and metadata refresh are
//! collaborator concerns behind the `AdminCodec`, `Transport`, and
//! `ClusterView` traits.

mod batch;
mod call;
mod client;
mod cluster;
mod config;
mod deadline;
mod dispatcher;
mod error;
mod handle;
mod pending;
mod protocol;
mod timeout;
mod transport;

pub use batch::{join_all, join_unit};
pub use call::{Call, CallDecision, CallId, CallState, TargetPolicy};
pub use client::{
    AdminClient, AdminOptions, AlterConfigsResult, BatchOperation, CreateAclsResult,
    CreateTopicsResult, DeleteAclsResult, DeleteTopicsResult, DescribeAclsResult,
    DescribeConfigsResult,
};
pub use cluster::{ClusterView, Node, NodeId, StaticClusterView};
pub use config::AdminClientConfig;
pub use deadline::{remaining_timeout_ms, Deadline};
pub use error::{pretty_error, AdminError, ApiError, ErrorCode};
pub use handle::{Completer, CompletionHandle};
pub use protocol::{
    AccessEntry, AclBinding, AclBindingFilter, AclDeletion, AclOperation, AdminCodec,
    AdminRequest, AdminResponse, ConfigEntry, ConfigResource, JsonCodec, NewTopic,
    PermissionKind, Resource, ResourceKind,
};
pub use timeout::{DeadlineExpiry, ExpiryPolicy, TimeoutProcessor, TimeoutProcessorFactory};
pub use transport::{RequestEnvelope, ResponseEnvelope, Transport};
