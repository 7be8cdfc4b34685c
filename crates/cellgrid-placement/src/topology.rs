//! Topology-aware scheduler for uniform leaf-cell requests.
//!
//! Used when every pod in the group requests the same leaf-cell type. The
//! scheduler first picks nodes in a priority-aware packing order (nodes with
//! fewer free leaf cells first), then places each pod's leaf cells inside
//! its node with the best affinity the branch-and-bound search can find.
//!
//! Scheduling runs twice: a first pass at the opportunistic priority avoids
//! preemption entirely; only when that fails does a second pass at the
//! requested priority admit preempting strictly-lower occupants.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use cellgrid_core::{
    CellId, CellPriority, CellRegistry, ChainCellList, LOWEST_LEVEL, OPPORTUNISTIC_PRIORITY,
};

use crate::affinity::{
    best_affinity_pick, collect_node_leaf_cells, optimal_affinity, remove_picked,
};
use crate::error::{ScheduleError, ScheduleResult};
use crate::view::ClusterView;

pub struct TopologyAwareScheduler {
    cell_list: ChainCellList,
    /// Pack across priorities (intra-VC scheduling) or inside each priority
    /// bucket (opportunistic pods staying clear of guaranteed ones).
    cross_priority_pack: bool,
}

impl TopologyAwareScheduler {
    pub fn new(cell_list: ChainCellList, cross_priority_pack: bool) -> Self {
        Self {
            cell_list,
            cross_priority_pack,
        }
    }

    /// Place a group of pods, each requesting `leaf_count` leaf cells
    /// (`pod_leaf_counts` maps leaf count → pod count). Returns per-leaf-count
    /// placements, one leaf-cell list per pod.
    pub fn schedule(
        &self,
        reg: &CellRegistry,
        pod_leaf_counts: &BTreeMap<i32, i32>,
        priority: CellPriority,
        suggested_nodes: &HashSet<String>,
        ignore_suggested: bool,
    ) -> ScheduleResult<BTreeMap<i32, Vec<Vec<CellId>>>> {
        // Flatten {leaf_count: pod_count} to one entry per pod, ascending.
        let mut sorted_pod_leaf_cell_nums: Vec<i32> = Vec::new();
        for (&leaf_count, &pod_count) in pod_leaf_counts {
            for _ in 0..pod_count {
                sorted_pod_leaf_cell_nums.push(leaf_count);
            }
        }
        sorted_pod_leaf_cell_nums.sort_unstable();
        debug!(
            sorted_pod_leaf_cell_nums = ?sorted_pod_leaf_cell_nums,
            priority,
            "topology-aware schedule"
        );

        let mut view = ClusterView::new(reg, &self.cell_list);

        // First pass with preemption disabled.
        let mut pass_priority = OPPORTUNISTIC_PRIORITY;
        view.update(
            reg,
            pass_priority,
            suggested_nodes,
            ignore_suggested,
            self.cross_priority_pack,
        );
        view.sort();
        let mut picked = find_nodes_for_pods(&view, &sorted_pod_leaf_cell_nums);

        // Preemption only helps above the opportunistic priority.
        if picked.is_err() && priority > OPPORTUNISTIC_PRIORITY {
            pass_priority = priority;
            view.update(
                reg,
                pass_priority,
                suggested_nodes,
                ignore_suggested,
                self.cross_priority_pack,
            );
            view.sort();
            picked = find_nodes_for_pods(&view, &sorted_pod_leaf_cell_nums);
        }
        let node_indices = picked?;

        // Place leaf cells inside each selected node, carrying the node's
        // residual available-leaf list so pods sharing a node never
        // reconsider already-claimed leaves.
        let mut node_available: HashMap<CellId, Vec<CellId>> = HashMap::new();
        let mut placements: BTreeMap<i32, Vec<Vec<CellId>>> = BTreeMap::new();
        for (pod_index, &leaf_count) in sorted_pod_leaf_cell_nums.iter().enumerate() {
            let node = view.entries()[node_indices[pod_index]].cell;
            let mut available = node_available
                .remove(&node)
                .unwrap_or_else(|| collect_node_leaf_cells(reg, node, pass_priority));
            let optimal = optimal_affinity(reg, LOWEST_LEVEL, leaf_count).unwrap_or_else(|| {
                panic!(
                    "assert failure: pod fit node {} but exceeds the chain capacity",
                    reg.address(node)
                )
            });
            let picked_indices =
                best_affinity_pick(reg, &available, leaf_count as usize, optimal, reg.address(node));
            let cells: Vec<CellId> = picked_indices.iter().map(|&i| available[i]).collect();
            remove_picked(&mut available, &picked_indices);
            node_available.insert(node, available);
            placements.entry(leaf_count).or_default().push(cells);
        }
        Ok(placements)
    }
}

/// First-fit node selection over the sorted view. Returns one view index per
/// pod, in pod order. A node that must be used but is unhealthy or outside
/// the suggested set fails the whole pass.
fn find_nodes_for_pods(view: &ClusterView, leaf_counts: &[i32]) -> ScheduleResult<Vec<usize>> {
    for entry in view.entries() {
        debug!(
            address = %entry.address,
            used_leaf_cells_same_priority = entry.used_leaf_cells_same_priority,
            used_leaf_cells_higher_priority = entry.used_leaf_cells_higher_priority,
            free_leaf_cells_at_priority = entry.free_leaf_cells_at_priority,
            "sorted node"
        );
    }
    if leaf_counts.is_empty() {
        return Ok(Vec::new());
    }
    let mut picked = vec![0usize; leaf_counts.len()];
    let mut pod_index = 0usize;
    let mut picked_leaf_cells = 0i32;
    let mut node_index = 0usize;
    while node_index < view.len() {
        let node = &view.entries()[node_index];
        if node.free_leaf_cells_at_priority - picked_leaf_cells >= leaf_counts[pod_index] {
            if !node.healthy {
                return Err(ScheduleError::BadNode(node.address.clone()));
            }
            if !node.suggested {
                return Err(ScheduleError::NonSuggestedNode(node.address.clone()));
            }
            picked[pod_index] = node_index;
            picked_leaf_cells += leaf_counts[pod_index];
            pod_index += 1;
            if pod_index == leaf_counts.len() {
                return Ok(picked);
            }
        } else {
            picked_leaf_cells = 0;
            node_index += 1;
        }
    }
    Err(ScheduleError::InsufficientCapacity)
}
