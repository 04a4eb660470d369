//! In-process simulated cluster behind the `Transport` trait.
//!
//! Each node shares one cluster state. The simulator injects configurable
//! controller churn: a send may be answered with a retriable NotController
//! error while the controller moves to another node, exercising the
//! client's re-resolution and retry paths.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ferrite_admin::{
    AclBinding, AclDeletion, AdminRequest, AdminResponse, ApiError, ConfigResource, ErrorCode,
    JsonCodec, NewTopic, NodeId, RequestEnvelope, ResponseEnvelope, StaticClusterView, Transport,
};
use rand::rngs::SmallRng;
use rand::Rng;
use tokio::time::Instant;

/// Admin-visible state of the simulated cluster.
#[derive(Default)]
struct ClusterData {
    topics: BTreeMap<String, NewTopic>,
    acls: BTreeSet<AclBinding>,
    configs: BTreeMap<ConfigResource, BTreeMap<String, String>>,
}

struct Delivery {
    due: Instant,
    response: ResponseEnvelope,
}

pub struct SimTransport {
    data: Arc<Mutex<ClusterData>>,
    view: Arc<StaticClusterView>,
    nodes: Vec<NodeId>,
    controller: NodeId,
    rng: SmallRng,
    /// Probability in [0, 1] that a send is answered NotController and the
    /// controller moves.
    churn: f64,
    max_latency: Duration,
    deliveries: VecDeque<Delivery>,
}

impl SimTransport {
    pub fn new(
        view: Arc<StaticClusterView>,
        nodes: Vec<NodeId>,
        rng: SmallRng,
        churn: f64,
        max_latency: Duration,
    ) -> Self {
        let controller = nodes[0];
        view.set_controller(Some(controller));
        Self {
            data: Arc::new(Mutex::new(ClusterData::default())),
            view,
            nodes,
            controller,
            rng,
            churn,
            max_latency,
            deliveries: VecDeque::new(),
        }
    }

    fn lock_data(&self) -> std::sync::MutexGuard<'_, ClusterData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn move_controller(&mut self) {
        let index = self.rng.gen_range(0..self.nodes.len());
        self.controller = self.nodes[index];
        self.view.set_controller(Some(self.controller));
        tracing::debug!(controller = self.controller, "controller moved");
    }

    fn latency(&mut self) -> Duration {
        let max_ms = self.max_latency.as_millis().max(1) as u64;
        Duration::from_millis(self.rng.gen_range(0..=max_ms))
    }

    /// Apply one admin request to the cluster state.
    fn apply(&mut self, node: NodeId, request: &AdminRequest) -> AdminResponse {
        // Controller-scoped operations answer NotController when they land
        // on the wrong node.
        let controller_scoped = matches!(
            request,
            AdminRequest::CreateTopic { .. } | AdminRequest::DeleteTopic { .. }
        );
        if controller_scoped && node != self.controller {
            return not_controller_response(request);
        }
        if self.rng.gen_bool(self.churn) {
            self.move_controller();
            if controller_scoped {
                return not_controller_response(request);
            }
        }

        let mut data = self.lock_data();
        match request {
            AdminRequest::CreateTopic { topic, .. } => {
                let error = if data.topics.contains_key(&topic.name) {
                    ApiError::new(ErrorCode::TopicAlreadyExists, "")
                } else {
                    data.topics.insert(topic.name.clone(), topic.clone());
                    ApiError::ok()
                };
                AdminResponse::CreateTopic { error }
            }
            AdminRequest::DeleteTopic { name, .. } => {
                let error = if data.topics.remove(name).is_some() {
                    ApiError::ok()
                } else {
                    ApiError::new(ErrorCode::UnknownTopic, "")
                };
                AdminResponse::DeleteTopic { error }
            }
            AdminRequest::DescribeAcls { filter } => AdminResponse::DescribeAcls {
                error: ApiError::ok(),
                bindings: data
                    .acls
                    .iter()
                    .filter(|binding| filter.matches(binding))
                    .cloned()
                    .collect(),
            },
            AdminRequest::CreateAcl { binding } => {
                data.acls.insert(binding.clone());
                AdminResponse::CreateAcl {
                    error: ApiError::ok(),
                }
            }
            AdminRequest::DeleteAcls { filter } => {
                let matched: Vec<AclBinding> = data
                    .acls
                    .iter()
                    .filter(|binding| filter.matches(binding))
                    .cloned()
                    .collect();
                let mut deletions = Vec::with_capacity(matched.len());
                for binding in matched {
                    data.acls.remove(&binding);
                    deletions.push(AclDeletion {
                        error: ApiError::ok(),
                        binding,
                    });
                }
                AdminResponse::DeleteAcls {
                    error: ApiError::ok(),
                    deletions,
                }
            }
            AdminRequest::DescribeConfigs { resource } => AdminResponse::DescribeConfigs {
                error: ApiError::ok(),
                entries: data
                    .configs
                    .get(resource)
                    .map(|entries| {
                        entries
                            .iter()
                            .map(|(name, value)| ferrite_admin::ConfigEntry {
                                name: name.clone(),
                                value: value.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            AdminRequest::AlterConfigs { resource, entries } => {
                let slot = data.configs.entry(resource.clone()).or_default();
                for entry in entries {
                    slot.insert(entry.name.clone(), entry.value.clone());
                }
                AdminResponse::AlterConfigs {
                    error: ApiError::ok(),
                }
            }
        }
    }
}

fn not_controller_response(request: &AdminRequest) -> AdminResponse {
    let error = ApiError::new(ErrorCode::NotController, "");
    match request {
        AdminRequest::CreateTopic { .. } => AdminResponse::CreateTopic { error },
        AdminRequest::DeleteTopic { .. } => AdminResponse::DeleteTopic { error },
        AdminRequest::DescribeAcls { .. } => AdminResponse::DescribeAcls {
            error,
            bindings: Vec::new(),
        },
        AdminRequest::CreateAcl { .. } => AdminResponse::CreateAcl { error },
        AdminRequest::DeleteAcls { .. } => AdminResponse::DeleteAcls {
            error,
            deletions: Vec::new(),
        },
        AdminRequest::DescribeConfigs { .. } => AdminResponse::DescribeConfigs {
            error,
            entries: Vec::new(),
        },
        AdminRequest::AlterConfigs { .. } => AdminResponse::AlterConfigs { error },
    }
}

#[async_trait]
impl Transport for SimTransport {
    fn is_ready(&mut self, _node: NodeId) -> bool {
        true
    }

    fn send(&mut self, node: NodeId, request: RequestEnvelope) -> anyhow::Result<()> {
        let decoded = JsonCodec.decode_request(&request.payload)?;
        let response = self.apply(node, &decoded);
        let payload = JsonCodec.encode_response(&response)?;
        let due = Instant::now() + self.latency();
        self.deliveries.push_back(Delivery {
            due,
            response: ResponseEnvelope {
                node,
                correlation: request.correlation,
                payload,
            },
        });
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Vec<ResponseEnvelope> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            let mut due = Vec::new();
            let mut rest = VecDeque::new();
            for delivery in self.deliveries.drain(..) {
                if delivery.due <= now {
                    due.push(delivery.response);
                } else {
                    rest.push_back(delivery);
                }
            }
            self.deliveries = rest;
            if !due.is_empty() {
                return due;
            }

            let next_due = self.deliveries.iter().map(|d| d.due).min();
            let wake = match next_due {
                Some(due) => due.min(deadline),
                None => deadline,
            };
            if wake <= now {
                return Vec::new();
            }
            tokio::time::sleep_until(wake).await;
        }
    }

    fn disconnected(&mut self, _node: NodeId) -> bool {
        false
    }
}
