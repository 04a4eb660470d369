//! The admin client facade.
//!
//! `AdminClient` owns the submission side of the dispatcher: typed
//! operations build one call per item, wire the item's completion handle,
//! and enqueue the calls for the dispatcher task. Batch results expose the
//! per-item handles plus a combined handle that fails on the first item
//! failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::batch::{join_all, join_unit};
use crate::call::{Call, CallDecision, TargetPolicy};
use crate::cluster::ClusterView;
use crate::config::AdminClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{AdminError, ApiError};
use crate::handle::CompletionHandle;
use crate::protocol::{
    AclBinding, AclBindingFilter, AclDeletion, AdminCodec, AdminRequest, AdminResponse,
    ConfigEntry, ConfigResource, NewTopic,
};
use crate::timeout::TimeoutProcessorFactory;
use crate::transport::Transport;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// The configured client id, or a process-unique generated one.
pub(crate) fn generate_client_id(config: &AdminClientConfig) -> String {
    if !config.client_id.is_empty() {
        return config.client_id.clone();
    }
    format!(
        "ferrite-admin-{}",
        NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)
    )
}

/// Per-operation options.
#[derive(Clone, Debug, Default)]
pub struct AdminOptions {
    /// Overrides the client's default request timeout for this operation.
    pub timeout: Option<Duration>,
}

impl AdminOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A submitted batch: per-item handles plus the combined handle.
pub struct BatchOperation<K, T> {
    items: Vec<(K, CompletionHandle<T>)>,
    combined: CompletionHandle<Vec<T>>,
}

impl<K: PartialEq, T: Clone + Send + 'static> BatchOperation<K, T> {
    /// Per-item handles in submission order.
    pub fn handles(&self) -> &[(K, CompletionHandle<T>)] {
        &self.items
    }

    pub fn handle(&self, key: &K) -> Option<&CompletionHandle<T>> {
        self.items
            .iter()
            .find(|(item, _)| item == key)
            .map(|(_, handle)| handle)
    }

    /// Combined handle: all item values in submission order, or the first
    /// item failure.
    pub fn all(&self) -> &CompletionHandle<Vec<T>> {
        &self.combined
    }
}

/// Result of `create_topics`.
pub struct CreateTopicsResult {
    topics: BTreeMap<String, CompletionHandle<()>>,
    all: CompletionHandle<()>,
}

impl CreateTopicsResult {
    pub fn results(&self) -> &BTreeMap<String, CompletionHandle<()>> {
        &self.topics
    }

    pub fn topic(&self, name: &str) -> Option<&CompletionHandle<()>> {
        self.topics.get(name)
    }

    pub fn all(&self) -> &CompletionHandle<()> {
        &self.all
    }
}

/// Result of `delete_topics`.
pub struct DeleteTopicsResult {
    topics: BTreeMap<String, CompletionHandle<()>>,
    all: CompletionHandle<()>,
}

impl DeleteTopicsResult {
    pub fn results(&self) -> &BTreeMap<String, CompletionHandle<()>> {
        &self.topics
    }

    pub fn topic(&self, name: &str) -> Option<&CompletionHandle<()>> {
        self.topics.get(name)
    }

    pub fn all(&self) -> &CompletionHandle<()> {
        &self.all
    }
}

/// Result of `describe_acls`.
pub struct DescribeAclsResult {
    bindings: CompletionHandle<Vec<AclBinding>>,
}

impl DescribeAclsResult {
    /// All bindings matching the filter.
    pub fn bindings(&self) -> &CompletionHandle<Vec<AclBinding>> {
        &self.bindings
    }
}

/// Result of `create_acls`.
pub struct CreateAclsResult {
    acls: Vec<(AclBinding, CompletionHandle<()>)>,
    all: CompletionHandle<()>,
}

impl CreateAclsResult {
    pub fn results(&self) -> &[(AclBinding, CompletionHandle<()>)] {
        &self.acls
    }

    pub fn acl(&self, binding: &AclBinding) -> Option<&CompletionHandle<()>> {
        self.acls
            .iter()
            .find(|(item, _)| item == binding)
            .map(|(_, handle)| handle)
    }

    pub fn all(&self) -> &CompletionHandle<()> {
        &self.all
    }
}

/// Result of `delete_acls`. Each filter expands into zero or more
/// deletions; a filter-level failure fails only that filter's handle.
pub struct DeleteAclsResult {
    filters: Vec<(AclBindingFilter, CompletionHandle<Vec<AclDeletion>>)>,
    all: CompletionHandle<Vec<AclBinding>>,
}

impl DeleteAclsResult {
    pub fn results(&self) -> &[(AclBindingFilter, CompletionHandle<Vec<AclDeletion>>)] {
        &self.filters
    }

    pub fn filter(&self, filter: &AclBindingFilter) -> Option<&CompletionHandle<Vec<AclDeletion>>> {
        self.filters
            .iter()
            .find(|(item, _)| item == filter)
            .map(|(_, handle)| handle)
    }

    /// Every deleted binding across all filters. Fails if any filter
    /// failed or any individual deletion reported an error.
    pub fn all(&self) -> &CompletionHandle<Vec<AclBinding>> {
        &self.all
    }
}

/// Result of `describe_configs`.
pub struct DescribeConfigsResult {
    resources: Vec<(ConfigResource, CompletionHandle<Vec<ConfigEntry>>)>,
    all: CompletionHandle<Vec<(ConfigResource, Vec<ConfigEntry>)>>,
}

impl DescribeConfigsResult {
    pub fn results(&self) -> &[(ConfigResource, CompletionHandle<Vec<ConfigEntry>>)] {
        &self.resources
    }

    pub fn resource(&self, resource: &ConfigResource) -> Option<&CompletionHandle<Vec<ConfigEntry>>> {
        self.resources
            .iter()
            .find(|(item, _)| item == resource)
            .map(|(_, handle)| handle)
    }

    pub fn all(&self) -> &CompletionHandle<Vec<(ConfigResource, Vec<ConfigEntry>)>> {
        &self.all
    }
}

/// Result of `alter_configs`.
pub struct AlterConfigsResult {
    resources: Vec<(ConfigResource, CompletionHandle<()>)>,
    all: CompletionHandle<()>,
}

impl AlterConfigsResult {
    pub fn results(&self) -> &[(ConfigResource, CompletionHandle<()>)] {
        &self.resources
    }

    pub fn resource(&self, resource: &ConfigResource) -> Option<&CompletionHandle<()>> {
        self.resources
            .iter()
            .find(|(item, _)| item == resource)
            .map(|(_, handle)| handle)
    }

    pub fn all(&self) -> &CompletionHandle<()> {
        &self.all
    }
}

enum RouteError {
    Api(ApiError),
    Unexpected(String),
}

impl RouteError {
    fn unexpected(api: &str, response: &AdminResponse) -> Self {
        RouteError::Unexpected(format!("unexpected response kind for {api}: {response:?}"))
    }
}

struct ClientInner {
    client_id: String,
    config: AdminClientConfig,
    codec: Arc<dyn AdminCodec>,
    submit_tx: mpsc::UnboundedSender<Call>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Asynchronous administrative client for a ferrite cluster.
///
/// Cheap to clone; all clones share one dispatcher task. Operations return
/// immediately with completion handles; the dispatcher resolves them.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<ClientInner>,
}

impl AdminClient {
    /// Start a client over the given collaborators.
    pub fn new(
        config: AdminClientConfig,
        transport: Box<dyn Transport>,
        view: Arc<dyn ClusterView>,
        codec: Arc<dyn AdminCodec>,
    ) -> Self {
        Self::with_timeout_factory(config, transport, view, codec, TimeoutProcessorFactory::new())
    }

    /// Start a client with an injected timeout factory. Production code
    /// uses `new`; tests inject expiry policies here.
    pub fn with_timeout_factory(
        config: AdminClientConfig,
        transport: Box<dyn Transport>,
        view: Arc<dyn ClusterView>,
        codec: Arc<dyn AdminCodec>,
        timeouts: TimeoutProcessorFactory,
    ) -> Self {
        let client_id = generate_client_id(&config);
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dispatcher = Dispatcher::new(
            config.clone(),
            client_id.clone(),
            transport,
            view,
            submit_rx,
            shutdown_rx,
            timeouts,
        );
        let task = tokio::spawn(dispatcher.run());
        tracing::info!(client_id = %client_id, "admin client started");
        Self {
            inner: Arc::new(ClientInner {
                client_id,
                config,
                codec,
                submit_tx,
                shutdown_tx: Mutex::new(Some(shutdown_tx)),
                task: Mutex::new(Some(task)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn config(&self) -> &AdminClientConfig {
        &self.inner.config
    }

    /// Enqueue a call for dispatch. Calls submitted after close fail
    /// immediately with `ClientClosed`.
    pub fn submit_call(&self, call: Call) {
        if self.inner.closed.load(Ordering::SeqCst) {
            call.fail(AdminError::ClientClosed);
            return;
        }
        if let Err(err) = self.inner.submit_tx.send(call) {
            err.0.fail(AdminError::ClientClosed);
        }
    }

    /// Submit pre-built calls as one batch, wiring the combined handle.
    pub fn submit_batch<K, T: Clone + Send + 'static>(
        &self,
        items: Vec<(K, Call, CompletionHandle<T>)>,
    ) -> BatchOperation<K, T> {
        let mut keyed = Vec::with_capacity(items.len());
        let mut handles = Vec::with_capacity(items.len());
        let mut calls = Vec::with_capacity(items.len());
        for (key, call, handle) in items {
            keyed.push((key, handle.clone()));
            handles.push(handle);
            calls.push(call);
        }
        let combined = join_all(&handles);
        for call in calls {
            self.submit_call(call);
        }
        BatchOperation {
            items: keyed,
            combined,
        }
    }

    /// Close the client: fail every outstanding call with `ClientClosed`
    /// and wait for the dispatcher to exit. Idempotent.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let shutdown_tx = self
            .inner
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(client_id = %self.inner.client_id, error = %err, "dispatcher join failed");
            }
            tracing::info!(client_id = %self.inner.client_id, "admin client closed");
        }
    }

    /// Create new topics. Routed to the cluster controller.
    pub fn create_topics(&self, topics: Vec<NewTopic>, options: &AdminOptions) -> CreateTopicsResult {
        let timeout = self.effective_timeout(options);
        let mut handles = BTreeMap::new();
        let mut ordered = Vec::with_capacity(topics.len());
        let mut calls = Vec::with_capacity(topics.len());
        for topic in topics {
            let name = topic.name.clone();
            let (call, handle) = self.item_call(
                "create_topic",
                TargetPolicy::ClusterController,
                timeout,
                move |timeout_ms| AdminRequest::CreateTopic {
                    topic: topic.clone(),
                    timeout_ms,
                },
                |response| match response {
                    AdminResponse::CreateTopic { error } if error.is_ok() => Ok(()),
                    AdminResponse::CreateTopic { error } => Err(RouteError::Api(error)),
                    other => Err(RouteError::unexpected("create_topic", &other)),
                },
            );
            ordered.push(handle.clone());
            handles.insert(name, handle);
            calls.push(call);
        }
        let all = join_unit(&ordered);
        for call in calls {
            self.submit_call(call);
        }
        CreateTopicsResult {
            topics: handles,
            all,
        }
    }

    /// Delete topics by name. Routed to the cluster controller.
    pub fn delete_topics(&self, names: Vec<String>, options: &AdminOptions) -> DeleteTopicsResult {
        let timeout = self.effective_timeout(options);
        let mut handles = BTreeMap::new();
        let mut ordered = Vec::with_capacity(names.len());
        let mut calls = Vec::with_capacity(names.len());
        for name in names {
            let request_name = name.clone();
            let (call, handle) = self.item_call(
                "delete_topic",
                TargetPolicy::ClusterController,
                timeout,
                move |timeout_ms| AdminRequest::DeleteTopic {
                    name: request_name.clone(),
                    timeout_ms,
                },
                |response| match response {
                    AdminResponse::DeleteTopic { error } if error.is_ok() => Ok(()),
                    AdminResponse::DeleteTopic { error } => Err(RouteError::Api(error)),
                    other => Err(RouteError::unexpected("delete_topic", &other)),
                },
            );
            ordered.push(handle.clone());
            handles.insert(name, handle);
            calls.push(call);
        }
        let all = join_unit(&ordered);
        for call in calls {
            self.submit_call(call);
        }
        DeleteTopicsResult {
            topics: handles,
            all,
        }
    }

    /// List ACL bindings matching a filter. Routed to any node.
    pub fn describe_acls(&self, filter: AclBindingFilter, options: &AdminOptions) -> DescribeAclsResult {
        let timeout = self.effective_timeout(options);
        let (call, handle) = self.item_call(
            "describe_acls",
            TargetPolicy::AnyBootstrapNode,
            timeout,
            move |_timeout_ms| AdminRequest::DescribeAcls {
                filter: filter.clone(),
            },
            |response| match response {
                AdminResponse::DescribeAcls { error, bindings } if error.is_ok() => Ok(bindings),
                AdminResponse::DescribeAcls { error, .. } => Err(RouteError::Api(error)),
                other => Err(RouteError::unexpected("describe_acls", &other)),
            },
        );
        self.submit_call(call);
        DescribeAclsResult { bindings: handle }
    }

    /// Create ACL bindings. Routed to any node.
    pub fn create_acls(&self, bindings: Vec<AclBinding>, options: &AdminOptions) -> CreateAclsResult {
        let timeout = self.effective_timeout(options);
        let mut acls = Vec::with_capacity(bindings.len());
        let mut ordered = Vec::with_capacity(bindings.len());
        let mut calls = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let key = binding.clone();
            let (call, handle) = self.item_call(
                "create_acl",
                TargetPolicy::AnyBootstrapNode,
                timeout,
                move |_timeout_ms| AdminRequest::CreateAcl {
                    binding: binding.clone(),
                },
                |response| match response {
                    AdminResponse::CreateAcl { error } if error.is_ok() => Ok(()),
                    AdminResponse::CreateAcl { error } => Err(RouteError::Api(error)),
                    other => Err(RouteError::unexpected("create_acl", &other)),
                },
            );
            ordered.push(handle.clone());
            acls.push((key, handle));
            calls.push(call);
        }
        let all = join_unit(&ordered);
        for call in calls {
            self.submit_call(call);
        }
        CreateAclsResult { acls, all }
    }

    /// Delete every ACL binding matched by each filter. Routed to any node.
    ///
    /// Filters are independent calls: one failing filter does not disturb
    /// its siblings' results, though it does fail the combined handle.
    pub fn delete_acls(&self, filters: Vec<AclBindingFilter>, options: &AdminOptions) -> DeleteAclsResult {
        let timeout = self.effective_timeout(options);
        let mut keyed = Vec::with_capacity(filters.len());
        let mut ordered = Vec::with_capacity(filters.len());
        let mut calls = Vec::with_capacity(filters.len());
        for filter in filters {
            let key = filter.clone();
            let (call, handle) = self.item_call(
                "delete_acls",
                TargetPolicy::AnyBootstrapNode,
                timeout,
                move |_timeout_ms| AdminRequest::DeleteAcls {
                    filter: filter.clone(),
                },
                |response| match response {
                    AdminResponse::DeleteAcls { error, deletions } if error.is_ok() => Ok(deletions),
                    AdminResponse::DeleteAcls { error, .. } => Err(RouteError::Api(error)),
                    other => Err(RouteError::unexpected("delete_acls", &other)),
                },
            );
            ordered.push(handle.clone());
            keyed.push((key, handle));
            calls.push(call);
        }

        let joined = join_all(&ordered);
        let (all_completer, all) = CompletionHandle::new();
        joined.when_complete(move |result| match result {
            Err(error) => {
                all_completer.fail(error.clone());
            }
            Ok(filter_results) => {
                let mut deleted = Vec::new();
                for deletions in filter_results {
                    for deletion in deletions {
                        if deletion.error.is_ok() {
                            deleted.push(deletion.binding.clone());
                        } else {
                            // A single failed deletion poisons the combined
                            // view, not the per-filter results.
                            all_completer.fail(AdminError::Remote(deletion.error.clone()));
                            return;
                        }
                    }
                }
                all_completer.complete(deleted);
            }
        });

        for call in calls {
            self.submit_call(call);
        }
        DeleteAclsResult {
            filters: keyed,
            all,
        }
    }

    /// Fetch config entries for each resource. Routed to any node.
    pub fn describe_configs(
        &self,
        resources: Vec<ConfigResource>,
        options: &AdminOptions,
    ) -> DescribeConfigsResult {
        let timeout = self.effective_timeout(options);
        let mut keyed = Vec::with_capacity(resources.len());
        let mut ordered = Vec::with_capacity(resources.len());
        let mut calls = Vec::with_capacity(resources.len());
        for resource in resources {
            let key = resource.clone();
            let (call, handle) = self.item_call(
                "describe_configs",
                TargetPolicy::AnyBootstrapNode,
                timeout,
                move |_timeout_ms| AdminRequest::DescribeConfigs {
                    resource: resource.clone(),
                },
                |response| match response {
                    AdminResponse::DescribeConfigs { error, entries } if error.is_ok() => {
                        Ok(entries)
                    }
                    AdminResponse::DescribeConfigs { error, .. } => Err(RouteError::Api(error)),
                    other => Err(RouteError::unexpected("describe_configs", &other)),
                },
            );
            ordered.push(handle.clone());
            keyed.push((key, handle));
            calls.push(call);
        }

        let joined = join_all(&ordered);
        let resource_order: Vec<ConfigResource> =
            keyed.iter().map(|(resource, _)| resource.clone()).collect();
        let (all_completer, all) = CompletionHandle::new();
        joined.when_complete(move |result| match result {
            Err(error) => {
                all_completer.fail(error.clone());
            }
            Ok(entry_lists) => {
                let paired = resource_order
                    .iter()
                    .cloned()
                    .zip(entry_lists.iter().cloned())
                    .collect();
                all_completer.complete(paired);
            }
        });

        for call in calls {
            self.submit_call(call);
        }
        DescribeConfigsResult {
            resources: keyed,
            all,
        }
    }

    /// Replace config entries on each resource. Routed to any node.
    pub fn alter_configs(
        &self,
        alterations: Vec<(ConfigResource, Vec<ConfigEntry>)>,
        options: &AdminOptions,
    ) -> AlterConfigsResult {
        let timeout = self.effective_timeout(options);
        let mut keyed = Vec::with_capacity(alterations.len());
        let mut ordered = Vec::with_capacity(alterations.len());
        let mut calls = Vec::with_capacity(alterations.len());
        for (resource, entries) in alterations {
            let key = resource.clone();
            let (call, handle) = self.item_call(
                "alter_configs",
                TargetPolicy::AnyBootstrapNode,
                timeout,
                move |_timeout_ms| AdminRequest::AlterConfigs {
                    resource: resource.clone(),
                    entries: entries.clone(),
                },
                |response| match response {
                    AdminResponse::AlterConfigs { error } if error.is_ok() => Ok(()),
                    AdminResponse::AlterConfigs { error } => Err(RouteError::Api(error)),
                    other => Err(RouteError::unexpected("alter_configs", &other)),
                },
            );
            ordered.push(handle.clone());
            keyed.push((key, handle));
            calls.push(call);
        }
        let all = join_unit(&ordered);
        for call in calls {
            self.submit_call(call);
        }
        AlterConfigsResult {
            resources: keyed,
            all,
        }
    }

    fn effective_timeout(&self, options: &AdminOptions) -> Duration {
        options.timeout.unwrap_or(self.inner.config.request_timeout)
    }

    /// Build one call plus its completion handle. The response strategy
    /// decodes the payload, completes the handle on success, retries on
    /// retriable remote errors, and fails otherwise; the failure path
    /// resolves the handle with the terminal error.
    fn item_call<T: Clone + Send + 'static>(
        &self,
        api: &'static str,
        target: TargetPolicy,
        timeout: Duration,
        make_request: impl Fn(i32) -> AdminRequest + Send + 'static,
        route: impl Fn(AdminResponse) -> Result<T, RouteError> + Send + 'static,
    ) -> (Call, CompletionHandle<T>) {
        let (completer, handle) = CompletionHandle::new();
        let encode_codec = self.inner.codec.clone();
        let decode_codec = self.inner.codec.clone();
        let response_completer = completer.clone();
        let failure_completer = completer;
        let call = Call::new(
            api,
            target,
            timeout,
            move |timeout_ms| encode_codec.encode(&make_request(timeout_ms)),
            move |payload| {
                let response = match decode_codec.decode(payload) {
                    Ok(response) => response,
                    Err(err) => return CallDecision::Fail(AdminError::Codec(err.to_string())),
                };
                match route(response) {
                    Ok(value) => {
                        response_completer.complete(value);
                        CallDecision::Complete
                    }
                    Err(RouteError::Api(error)) if error.is_retriable() => {
                        CallDecision::Retry(AdminError::Remote(error))
                    }
                    Err(RouteError::Api(error)) => CallDecision::Fail(AdminError::Remote(error)),
                    Err(RouteError::Unexpected(message)) => {
                        CallDecision::Fail(AdminError::Codec(message))
                    }
                }
            },
            move |error| {
                failure_completer.fail(error);
            },
        );
        (call, handle)
    }
}
