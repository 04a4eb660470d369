//! Shared helpers for integration tests: a scriptable in-memory transport,
//! a three-node cluster view, and canned ACL fixtures.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ferrite_admin::{
    AccessEntry, AclBinding, AclBindingFilter, AclOperation, AdminClient, AdminClientConfig,
    AdminError, AdminRequest, AdminResponse, CompletionHandle, JsonCodec, Node, NodeId,
    PermissionKind, RequestEnvelope, Resource, ResourceKind, ResponseEnvelope,
    StaticClusterView, TimeoutProcessorFactory, Transport,
};
use tokio::time::Instant;

type Responder = Box<dyn FnMut(&AdminRequest) -> Option<AdminResponse> + Send>;

#[derive(Default)]
struct MockState {
    prepared: VecDeque<AdminResponse>,
    responder: Option<Responder>,
    inbox: VecDeque<ResponseEnvelope>,
    unanswered: VecDeque<(NodeId, RequestEnvelope)>,
    not_ready: HashSet<NodeId>,
    dropped: HashSet<NodeId>,
    refuse_sends: HashSet<NodeId>,
    sent: Vec<(NodeId, AdminRequest)>,
}

/// Test-side handle for scripting the mock transport after the client has
/// taken ownership of it.
#[derive(Clone, Default)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransportHandle {
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            state: self.state.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a one-shot response matched FIFO to subsequent sends.
    pub fn prepare_response(&self, response: AdminResponse) {
        self.lock().prepared.push_back(response);
    }

    /// Install a fallback responder consulted when no prepared response is
    /// queued. Returning `None` leaves the request unanswered.
    pub fn set_responder(
        &self,
        responder: impl FnMut(&AdminRequest) -> Option<AdminResponse> + Send + 'static,
    ) {
        self.lock().responder = Some(Box::new(responder));
    }

    pub fn set_node_ready(&self, node: NodeId, ready: bool) {
        let mut state = self.lock();
        if ready {
            state.not_ready.remove(&node);
        } else {
            state.not_ready.insert(node);
        }
    }

    /// Make future sends to the node fail at the connection level.
    pub fn refuse_sends(&self, node: NodeId, refuse: bool) {
        let mut state = self.lock();
        if refuse {
            state.refuse_sends.insert(node);
        } else {
            state.refuse_sends.remove(&node);
        }
    }

    /// Report the node disconnected on the dispatcher's next check.
    pub fn drop_connection(&self, node: NodeId) {
        self.lock().dropped.insert(node);
    }

    /// Requests sent so far, decoded, in send order.
    pub fn sent(&self) -> Vec<(NodeId, AdminRequest)> {
        self.lock().sent.clone()
    }

    /// Decoded requests currently awaiting an answer, in send order.
    pub fn unanswered_requests(&self) -> Vec<AdminRequest> {
        self.lock()
            .unanswered
            .iter()
            .map(|(_, request)| {
                JsonCodec
                    .decode_request(&request.payload)
                    .expect("decode unanswered request")
            })
            .collect()
    }

    /// Answer the oldest unanswered request.
    pub fn answer_next_unanswered(&self, response: AdminResponse) -> bool {
        self.answer_unanswered(0, response)
    }

    /// Answer the unanswered request at `index` (send order).
    pub fn answer_unanswered(&self, index: usize, response: AdminResponse) -> bool {
        let mut state = self.lock();
        if index >= state.unanswered.len() {
            return false;
        }
        let (node, request) = state.unanswered.remove(index).expect("index checked");
        let payload = JsonCodec
            .encode_response(&response)
            .expect("encode mock response");
        state.inbox.push_back(ResponseEnvelope {
            node,
            correlation: request.correlation,
            payload,
        });
        true
    }
}

/// Transport half owned by the dispatcher.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_ready(&mut self, node: NodeId) -> bool {
        !self.lock().not_ready.contains(&node)
    }

    fn send(&mut self, node: NodeId, request: RequestEnvelope) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.refuse_sends.contains(&node) {
            anyhow::bail!("connection to node {node} refused");
        }
        let decoded = JsonCodec.decode_request(&request.payload)?;
        state.sent.push((node, decoded.clone()));

        let response = match state.prepared.pop_front() {
            Some(prepared) => Some(prepared),
            None => state.responder.as_mut().and_then(|f| f(&decoded)),
        };
        match response {
            Some(response) => {
                let payload = JsonCodec.encode_response(&response)?;
                state.inbox.push_back(ResponseEnvelope {
                    node,
                    correlation: request.correlation,
                    payload,
                });
            }
            None => state.unanswered.push_back((node, request)),
        }
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Vec<ResponseEnvelope> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.lock();
                if !state.inbox.is_empty() {
                    return state.inbox.drain(..).collect();
                }
            }
            if Instant::now() >= deadline {
                return Vec::new();
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn disconnected(&mut self, node: NodeId) -> bool {
        // One-shot report, mirroring "dropped since last check".
        self.lock().dropped.remove(&node)
    }
}

/// Client plus scripting handles, over a three-node cluster with node 0 as
/// controller.
pub struct TestEnv {
    pub client: AdminClient,
    pub transport: MockTransportHandle,
    pub view: Arc<StaticClusterView>,
}

pub fn three_node_view() -> Arc<StaticClusterView> {
    let view = Arc::new(StaticClusterView::with_members([
        Node::new(0, "localhost", 8121),
        Node::new(1, "localhost", 8122),
        Node::new(2, "localhost", 8123),
    ]));
    view.set_controller(Some(0));
    view
}

pub fn mock_env(config: AdminClientConfig) -> TestEnv {
    mock_env_with_factory(config, TimeoutProcessorFactory::new())
}

pub fn mock_env_with_factory(
    config: AdminClientConfig,
    timeouts: TimeoutProcessorFactory,
) -> TestEnv {
    let view = three_node_view();
    let transport = MockTransportHandle::default();
    let client = AdminClient::with_timeout_factory(
        config,
        Box::new(transport.transport()),
        view.clone(),
        Arc::new(JsonCodec),
        timeouts,
    );
    TestEnv {
        client,
        transport,
        view,
    }
}

/// Config with short ticks and backoffs so paused-clock tests stay fast.
pub fn fast_config() -> AdminClientConfig {
    AdminClientConfig {
        request_timeout: Duration::from_secs(60),
        max_retries: 2,
        retry_backoff: Duration::from_millis(5),
        poll_interval: Duration::from_millis(10),
        ..AdminClientConfig::default()
    }
}

/// Await the handle and assert it failed with the given error kind.
pub async fn assert_err_kind<T>(handle: &CompletionHandle<T>, kind: &str) -> AdminError
where
    T: Clone + Send + std::fmt::Debug + 'static,
{
    match handle.get().await {
        Ok(value) => panic!("expected {kind} error, got success: {value:?}"),
        Err(error) => {
            assert_eq!(kind, error.kind(), "unexpected error: {error}");
            error
        }
    }
}

pub fn acl1() -> AclBinding {
    AclBinding {
        resource: Resource::new(ResourceKind::Topic, "mytopic3"),
        entry: AccessEntry {
            principal: "User:ANONYMOUS".to_string(),
            host: "*".to_string(),
            operation: AclOperation::Describe,
            permission: PermissionKind::Allow,
        },
    }
}

pub fn acl2() -> AclBinding {
    AclBinding {
        resource: Resource::new(ResourceKind::Topic, "mytopic4"),
        entry: AccessEntry {
            principal: "User:ANONYMOUS".to_string(),
            host: "*".to_string(),
            operation: AclOperation::Describe,
            permission: PermissionKind::Deny,
        },
    }
}

pub fn filter1() -> AclBindingFilter {
    AclBindingFilter {
        principal: Some("User:ANONYMOUS".to_string()),
        ..AclBindingFilter::any()
    }
}

pub fn filter2() -> AclBindingFilter {
    AclBindingFilter {
        principal: Some("User:bob".to_string()),
        ..AclBindingFilter::any()
    }
}
