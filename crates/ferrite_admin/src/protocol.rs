//! Typed administrative payloads and the codec seam.
//!
//! The dispatcher moves opaque bytes; these types exist so callers and
//! response handlers can talk about topics, ACL bindings, and configs. How
//! the types map onto wire bytes is the codec implementation's business.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// A topic to be created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    pub partitions: u32,
    pub replication: u16,
    /// Topic-level config overrides.
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
}

impl NewTopic {
    pub fn new(name: impl Into<String>, partitions: u32, replication: u16) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication,
            configs: BTreeMap::new(),
        }
    }
}

/// Kind of resource an ACL binding attaches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Topic,
    Group,
    Cluster,
    Any,
}

/// Named resource within the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub name: String,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AclOperation {
    All,
    Read,
    Write,
    Create,
    Delete,
    Describe,
    Alter,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionKind {
    Allow,
    Deny,
    Any,
}

/// Who may (or may not) do what, from which host.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessEntry {
    pub principal: String,
    pub host: String,
    pub operation: AclOperation,
    pub permission: PermissionKind,
}

/// A concrete ACL: resource plus access entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AclBinding {
    pub resource: Resource,
    pub entry: AccessEntry,
}

/// Filter over ACL bindings. `None` fields and `Any` kinds match everything.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AclBindingFilter {
    pub resource_kind: ResourceKind,
    pub resource_name: Option<String>,
    pub principal: Option<String>,
    pub host: Option<String>,
    pub operation: AclOperation,
    pub permission: PermissionKind,
}

impl AclBindingFilter {
    /// Filter matching every binding.
    pub fn any() -> Self {
        Self {
            resource_kind: ResourceKind::Any,
            resource_name: None,
            principal: None,
            host: None,
            operation: AclOperation::Any,
            permission: PermissionKind::Any,
        }
    }

    pub fn matches(&self, binding: &AclBinding) -> bool {
        (self.resource_kind == ResourceKind::Any || self.resource_kind == binding.resource.kind)
            && self
                .resource_name
                .as_ref()
                .map_or(true, |name| *name == binding.resource.name)
            && self
                .principal
                .as_ref()
                .map_or(true, |p| *p == binding.entry.principal)
            && self.host.as_ref().map_or(true, |h| *h == binding.entry.host)
            && (self.operation == AclOperation::Any || self.operation == binding.entry.operation)
            && (self.permission == PermissionKind::Any
                || self.permission == binding.entry.permission)
    }
}

/// Config-bearing resource addressed by describe/alter configs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigResource {
    pub kind: ResourceKind,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
}

/// One deletion produced by expanding an ACL filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclDeletion {
    pub error: ApiError,
    pub binding: AclBinding,
}

/// Typed admin request, one per call. Batch operations submit one request
/// per item so items fail and retry independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminRequest {
    CreateTopic { topic: NewTopic, timeout_ms: i32 },
    DeleteTopic { name: String, timeout_ms: i32 },
    DescribeAcls { filter: AclBindingFilter },
    CreateAcl { binding: AclBinding },
    DeleteAcls { filter: AclBindingFilter },
    DescribeConfigs { resource: ConfigResource },
    AlterConfigs { resource: ConfigResource, entries: Vec<ConfigEntry> },
}

impl AdminRequest {
    /// Operation name used for logging and routing diagnostics.
    pub fn api(&self) -> &'static str {
        match self {
            AdminRequest::CreateTopic { .. } => "create_topic",
            AdminRequest::DeleteTopic { .. } => "delete_topic",
            AdminRequest::DescribeAcls { .. } => "describe_acls",
            AdminRequest::CreateAcl { .. } => "create_acl",
            AdminRequest::DeleteAcls { .. } => "delete_acls",
            AdminRequest::DescribeConfigs { .. } => "describe_configs",
            AdminRequest::AlterConfigs { .. } => "alter_configs",
        }
    }
}

/// Typed admin response, paired with `AdminRequest` variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminResponse {
    CreateTopic { error: ApiError },
    DeleteTopic { error: ApiError },
    DescribeAcls { error: ApiError, bindings: Vec<AclBinding> },
    CreateAcl { error: ApiError },
    DeleteAcls { error: ApiError, deletions: Vec<AclDeletion> },
    DescribeConfigs { error: ApiError, entries: Vec<ConfigEntry> },
    AlterConfigs { error: ApiError },
}

/// Encodes typed requests and decodes typed responses.
///
/// The wire format is owned by the implementation; the engine never
/// inspects payload bytes.
pub trait AdminCodec: Send + Sync + 'static {
    fn encode(&self, request: &AdminRequest) -> anyhow::Result<Bytes>;
    fn decode(&self, payload: &Bytes) -> anyhow::Result<AdminResponse>;
}

/// JSON reference codec used by tests and the workload driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl AdminCodec for JsonCodec {
    fn encode(&self, request: &AdminRequest) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(request)?))
    }

    fn decode(&self, payload: &Bytes) -> anyhow::Result<AdminResponse> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl JsonCodec {
    /// Decode a request payload; the inverse of `encode`, used by simulated
    /// servers on the other end of a mock transport.
    pub fn decode_request(&self, payload: &Bytes) -> anyhow::Result<AdminRequest> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode a response payload for a simulated server.
    pub fn encode_response(&self, response: &AdminResponse) -> anyhow::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(response)?))
    }
}
