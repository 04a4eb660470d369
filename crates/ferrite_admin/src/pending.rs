//! Bucketed table of calls awaiting dispatch.
//!
//! Calls live in the unassigned bucket until target resolution moves them
//! to a node bucket. Iteration order is deterministic: submission order
//! within a bucket, ascending node id across buckets. The table is owned by
//! the dispatcher task and never escapes it.

use std::collections::{BTreeMap, VecDeque};

use crate::call::Call;
use crate::cluster::NodeId;

#[derive(Default)]
pub struct PendingCallTable {
    unassigned: VecDeque<Call>,
    by_node: BTreeMap<NodeId, VecDeque<Call>>,
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a newly submitted or retried call.
    pub fn push_unassigned(&mut self, mut call: Call) {
        call.mark_awaiting_node();
        self.unassigned.push_back(call);
    }

    /// Place a call in the bucket for its resolved node.
    pub fn push_node(&mut self, node: NodeId, call: Call) {
        self.by_node.entry(node).or_default().push_back(call);
    }

    /// Remove and return the whole unassigned bucket for resolution.
    pub fn take_unassigned(&mut self) -> VecDeque<Call> {
        std::mem::take(&mut self.unassigned)
    }

    /// Node ids that currently have queued calls, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.by_node.keys().copied().collect()
    }

    /// Remove and return a node's bucket for sending.
    pub fn take_node(&mut self, node: NodeId) -> VecDeque<Call> {
        self.by_node.remove(&node).unwrap_or_default()
    }

    /// Put unsent calls back at the front of a node's bucket, preserving
    /// their original order.
    pub fn restore_node(&mut self, node: NodeId, mut calls: VecDeque<Call>) {
        if calls.is_empty() {
            return;
        }
        match self.by_node.get_mut(&node) {
            Some(bucket) => {
                calls.extend(bucket.drain(..));
                *bucket = calls;
            }
            None => {
                self.by_node.insert(node, calls);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unassigned.is_empty() && self.by_node.values().all(|bucket| bucket.is_empty())
    }

    pub fn len(&self) -> usize {
        self.unassigned.len() + self.by_node.values().map(VecDeque::len).sum::<usize>()
    }

    /// All queued calls in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Call> {
        self.unassigned
            .iter()
            .chain(self.by_node.values().flatten())
    }

    /// Remove every call the predicate marks expired, preserving the
    /// evaluation order among the survivors and the extracted calls alike.
    pub fn extract_expired(&mut self, mut expired: impl FnMut(&Call) -> bool) -> Vec<Call> {
        let mut out = Vec::new();
        Self::extract_bucket(&mut self.unassigned, &mut expired, &mut out);
        for bucket in self.by_node.values_mut() {
            Self::extract_bucket(bucket, &mut expired, &mut out);
        }
        self.by_node.retain(|_, bucket| !bucket.is_empty());
        out
    }

    fn extract_bucket(
        bucket: &mut VecDeque<Call>,
        expired: &mut impl FnMut(&Call) -> bool,
        out: &mut Vec<Call>,
    ) {
        let mut keep = VecDeque::with_capacity(bucket.len());
        for call in bucket.drain(..) {
            if expired(&call) {
                out.push(call);
            } else {
                keep.push_back(call);
            }
        }
        *bucket = keep;
    }

    /// Remove every queued call, for the shutdown flush.
    pub fn drain_all(&mut self) -> Vec<Call> {
        let mut out: Vec<Call> = self.unassigned.drain(..).collect();
        for (_, bucket) in std::mem::take(&mut self.by_node) {
            out.extend(bucket);
        }
        out
    }
}
