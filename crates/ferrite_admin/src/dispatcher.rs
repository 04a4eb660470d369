//! The single coordinating loop that owns all call state.
//!
//! One dispatcher task per client. Each cycle it accepts newly submitted
//! calls, resolves their targets against the current cluster snapshot,
//! sends every ready call across all node buckets, routes responses back to
//! their originating calls, and runs the timeout sweep last so a response
//! received this cycle always beats an expiring deadline. Submitters and
//! awaiters never touch call state directly; they communicate through the
//! submission queue and completion handles.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::call::{Call, CallDecision, TargetPolicy};
use crate::cluster::{ClusterView, NodeId};
use crate::config::AdminClientConfig;
use crate::error::AdminError;
use crate::pending::PendingCallTable;
use crate::timeout::TimeoutProcessorFactory;
use crate::transport::{RequestEnvelope, Transport};

struct InFlight {
    node: NodeId,
    call: Call,
}

pub(crate) struct Dispatcher {
    config: AdminClientConfig,
    client_id: String,
    transport: Box<dyn Transport>,
    view: Arc<dyn ClusterView>,
    submit_rx: mpsc::UnboundedReceiver<Call>,
    shutdown_rx: oneshot::Receiver<()>,
    pending: PendingCallTable,
    /// Sent calls keyed by correlation id; ascending key order is send
    /// order, which keeps the timeout sweep deterministic.
    in_flight: BTreeMap<u64, InFlight>,
    next_correlation: u64,
    timeouts: TimeoutProcessorFactory,
    shutdown: bool,
    submissions_open: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        config: AdminClientConfig,
        client_id: String,
        transport: Box<dyn Transport>,
        view: Arc<dyn ClusterView>,
        submit_rx: mpsc::UnboundedReceiver<Call>,
        shutdown_rx: oneshot::Receiver<()>,
        timeouts: TimeoutProcessorFactory,
    ) -> Self {
        Self {
            config,
            client_id,
            transport,
            view,
            submit_rx,
            shutdown_rx,
            pending: PendingCallTable::new(),
            in_flight: BTreeMap::new(),
            next_correlation: 1,
            timeouts,
            shutdown: false,
            submissions_open: true,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(client_id = %self.client_id, "dispatcher started");
        loop {
            self.check_shutdown();
            if self.shutdown {
                break;
            }
            self.drain_submissions();
            self.resolve_targets();
            self.send_ready();
            self.poll_responses().await;
            self.reap_disconnected();
            self.sweep_timeouts();

            if self.outstanding() == 0 {
                if !self.submissions_open {
                    break;
                }
                self.wait_for_work().await;
            }
        }
        self.flush_close();
        tracing::debug!(client_id = %self.client_id, "dispatcher stopped");
    }

    fn outstanding(&self) -> usize {
        self.pending.len() + self.in_flight.len()
    }

    fn check_shutdown(&mut self) {
        use tokio::sync::oneshot::error::TryRecvError;
        match self.shutdown_rx.try_recv() {
            Ok(()) => self.shutdown = true,
            // A dropped sender means the client itself is gone.
            Err(TryRecvError::Closed) => self.shutdown = true,
            Err(TryRecvError::Empty) => {}
        }
    }

    /// Accept newly submitted calls into the unassigned bucket.
    fn drain_submissions(&mut self) {
        loop {
            match self.submit_rx.try_recv() {
                Ok(call) => {
                    tracing::debug!(call = call.id(), api = call.api(), "call accepted");
                    self.pending.push_unassigned(call);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.submissions_open = false;
                    break;
                }
            }
        }
    }

    /// Resolve a destination node for every unassigned call.
    fn resolve_targets(&mut self) {
        let unassigned = self.pending.take_unassigned();
        for call in unassigned {
            match call.target() {
                TargetPolicy::FixedNode(id) => match self.view.node_by_id(id) {
                    Some(node) => self.pending.push_node(node.id, call),
                    None => {
                        // Unresolvable fixed targets fail immediately rather
                        // than waiting out a metadata refresh.
                        call.fail(AdminError::NodeNotFound(format!(
                            "node {id} is not present in cluster metadata"
                        )));
                    }
                },
                TargetPolicy::AnyBootstrapNode => match self.view.any_node() {
                    Some(node) => self.pending.push_node(node.id, call),
                    None => self.pending.push_unassigned(call),
                },
                TargetPolicy::ClusterController => match self.view.controller() {
                    Some(node) => self.pending.push_node(node.id, call),
                    None => {
                        tracing::trace!(
                            call = call.id(),
                            "controller unknown; waiting for metadata"
                        );
                        self.pending.push_unassigned(call);
                    }
                },
            }
        }
    }

    /// Send every call whose node is ready, across all buckets in one pass
    /// so a slow node cannot starve the others.
    fn send_ready(&mut self) {
        let now = Instant::now();
        for node in self.pending.node_ids() {
            if !self.transport.is_ready(node) {
                continue;
            }
            let mut bucket = self.pending.take_node(node);
            let mut requeue = VecDeque::new();
            while let Some(mut call) = bucket.pop_front() {
                if !call.retry_ready(now) {
                    requeue.push_back(call);
                    continue;
                }
                let payload = match call.encode_request(now) {
                    Ok(payload) => payload,
                    Err(err) => {
                        call.fail(AdminError::Codec(err.to_string()));
                        continue;
                    }
                };
                let correlation = self.next_correlation;
                self.next_correlation += 1;
                let envelope = RequestEnvelope {
                    correlation,
                    api: call.api(),
                    payload,
                };
                match self.transport.send(node, envelope) {
                    Ok(()) => {
                        call.mark_sent();
                        tracing::debug!(
                            call = call.id(),
                            api = call.api(),
                            node,
                            correlation,
                            attempt = call.attempt(),
                            "request sent"
                        );
                        self.in_flight.insert(correlation, InFlight { node, call });
                    }
                    Err(err) => {
                        tracing::debug!(call = call.id(), node, error = %err, "send failed");
                        self.retry_or_fail(call, AdminError::Disconnected(node));
                    }
                }
            }
            self.pending.restore_node(node, requeue);
        }
    }

    /// Wait for responses and route each back to its originating call.
    async fn poll_responses(&mut self) {
        if self.outstanding() == 0 {
            return;
        }
        let timeout = self.poll_timeout();
        let responses = self.transport.poll(timeout).await;
        for envelope in responses {
            let Some(InFlight { mut call, .. }) = self.in_flight.remove(&envelope.correlation)
            else {
                tracing::debug!(
                    node = envelope.node,
                    correlation = envelope.correlation,
                    "response for unknown call"
                );
                continue;
            };
            match call.handle_response(&envelope.payload) {
                CallDecision::Complete => call.complete(),
                CallDecision::Retry(error) => self.retry_or_fail(call, error),
                CallDecision::Fail(error) => call.fail(error),
            }
        }
    }

    /// Fail in-flight calls on dropped connections; these are retriable.
    fn reap_disconnected(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        let nodes: BTreeSet<NodeId> = self.in_flight.values().map(|entry| entry.node).collect();
        let dead: BTreeSet<NodeId> = nodes
            .into_iter()
            .filter(|node| self.transport.disconnected(*node))
            .collect();
        if dead.is_empty() {
            return;
        }
        let correlations: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| dead.contains(&entry.node))
            .map(|(correlation, _)| *correlation)
            .collect();
        for correlation in correlations {
            if let Some(InFlight { node, call }) = self.in_flight.remove(&correlation) {
                tracing::debug!(call = call.id(), node, "node disconnected with call in flight");
                self.retry_or_fail(call, AdminError::Disconnected(node));
            }
        }
    }

    /// Re-queue a call after a retriable error, or fail it for good.
    fn retry_or_fail(&mut self, mut call: Call, error: AdminError) {
        if !error.is_retriable() {
            call.fail(error);
            return;
        }
        if call.attempt() >= self.config.max_retries {
            let attempts = call.attempt() + 1;
            call.fail(AdminError::RetriesExhausted {
                attempts,
                last: Box::new(error),
            });
            return;
        }
        call.record_retry(self.config.retry_backoff, Instant::now());
        tracing::debug!(
            call = call.id(),
            api = call.api(),
            attempt = call.attempt(),
            error = %error,
            "retrying call"
        );
        self.pending.push_unassigned(call);
    }

    /// Fail every outstanding call past its deadline. Runs after response
    /// routing, so calls answered this cycle are never spuriously timed out.
    fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let mut processor = self.timeouts.create(now);
        let pending_expired =
            processor.handle_timeouts(&mut self.pending, "deadline elapsed before dispatch");

        let correlations: Vec<u64> = self.in_flight.keys().copied().collect();
        for correlation in correlations {
            let expired = match self.in_flight.get(&correlation) {
                Some(entry) => processor.call_has_expired(&entry.call),
                None => false,
            };
            if expired {
                if let Some(InFlight { call, .. }) = self.in_flight.remove(&correlation) {
                    processor.fail_expired(call, "deadline elapsed awaiting a response");
                }
            }
        }

        let expired = processor.expired();
        if expired > 0 {
            tracing::debug!(expired, pending_expired, "timeout sweep failed calls");
        }
    }

    /// Upper bound for the next transport poll: the tick interval, clipped
    /// by the nearest deadline or retry-backoff release.
    fn poll_timeout(&self) -> Duration {
        let now = Instant::now();
        let mut timeout = self.config.poll_interval;
        for call in self.pending.iter() {
            timeout = timeout.min(call.deadline().remaining(now));
            if let Some(ready_at) = call.ready_at() {
                timeout = timeout.min(ready_at.duration_since(now));
            }
        }
        for entry in self.in_flight.values() {
            timeout = timeout.min(entry.call.deadline().remaining(now));
        }
        timeout
    }

    /// Idle until a submission or shutdown arrives; never busy-spins.
    async fn wait_for_work(&mut self) {
        tokio::select! {
            _ = &mut self.shutdown_rx => {
                self.shutdown = true;
            }
            maybe = self.submit_rx.recv() => match maybe {
                Some(call) => self.pending.push_unassigned(call),
                None => self.submissions_open = false,
            }
        }
    }

    /// Fail everything still outstanding, including queued submissions that
    /// raced the shutdown, so no handle is ever left unresolved.
    fn flush_close(&mut self) {
        self.submit_rx.close();
        let mut failed = 0usize;
        while let Ok(call) = self.submit_rx.try_recv() {
            call.fail(AdminError::ClientClosed);
            failed += 1;
        }
        for call in self.pending.drain_all() {
            call.fail(AdminError::ClientClosed);
            failed += 1;
        }
        for (_, entry) in std::mem::take(&mut self.in_flight) {
            entry.call.fail(AdminError::ClientClosed);
            failed += 1;
        }
        if failed > 0 {
            tracing::debug!(client_id = %self.client_id, failed, "failed outstanding calls on close");
        }
    }
}
