// Copyright 2026 NetPulse Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Node-selection policies. A closed set selected by configuration, per the
//! source's "scheduler pluggability" design note — not a runtime plugin
//! surface, just two pure functions over the current node list.

use netpulse_store::model::NodeRecord;
use rand::Rng;

/// Picks which node should own a new pinned queue, given the nodes that
/// currently have spare pinned capacity. Pure and synchronous: the CAS
/// against the host map lives one layer up, in [`crate::Scheduler`].
pub trait NodeSelector: Send + Sync {
    fn select(&self, candidates: &[NodeRecord]) -> Option<String>;
}

/// Among nodes with spare capacity, pick the minimum `current_pinned_count`;
/// ties broken by `node_id` ascending for determinism.
pub struct LeastLoad;

impl NodeSelector for LeastLoad {
    fn select(&self, candidates: &[NodeRecord]) -> Option<String> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.current_pinned_count
                    .cmp(&b.current_pinned_count)
                    .then_with(|| a.node_id.cmp(&b.node_id))
            })
            .map(|n| n.node_id.clone())
    }
}

/// Weight `w_n = max(1, capacity_n - current_pinned_count_n)`; sample with
/// probability `w_n / sum(w_m)` over nodes with `w_n > 0` (i.e. nodes that
/// passed the spare-capacity filter already have `w_n >= 1`).
pub struct LoadWeightedRandom;

impl NodeSelector for LoadWeightedRandom {
    fn select(&self, candidates: &[NodeRecord]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let weights: Vec<usize> = candidates
            .iter()
            .map(|n| (n.capacity.saturating_sub(n.current_pinned_count)).max(1))
            .collect();
        let total: usize = weights.iter().sum();
        if total == 0 {
            return None;
        }
        let mut pick = rand::thread_rng().gen_range(0..total);
        for (node, weight) in candidates.iter().zip(weights.iter()) {
            if pick < *weight {
                return Some(node.node_id.clone());
            }
            pick -= *weight;
        }
        candidates.last().map(|n| n.node_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, capacity: usize, used: usize) -> NodeRecord {
        NodeRecord {
            node_id: id.to_string(),
            hostname: "h".to_string(),
            pid: 1,
            capacity,
            current_pinned_count: used,
            last_heartbeat: 0,
        }
    }

    #[test]
    fn least_load_picks_minimum_then_breaks_ties_by_id() {
        let nodes = vec![node("node-b", 10, 2), node("node-a", 10, 2), node("node-c", 10, 5)];
        assert_eq!(LeastLoad.select(&nodes), Some("node-a".to_string()));
    }

    #[test]
    fn least_load_on_empty_candidates() {
        assert_eq!(LeastLoad.select(&[]), None);
    }

    #[test]
    fn load_weighted_random_only_picks_among_candidates() {
        let nodes = vec![node("node-a", 4, 4), node("node-b", 4, 0)];
        for _ in 0..50 {
            let picked = LoadWeightedRandom.select(&nodes).unwrap();
            assert!(picked == "node-a" || picked == "node-b");
        }
    }
}
