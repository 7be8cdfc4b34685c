//! SKU scheduler for pod groups with heterogeneous cell levels.
//!
//! Pods in a group tree may request cells at arbitrary levels (a whole
//! half-node here, single leaves there), with each group optionally bounded
//! by a `within_one_cell` constraint. Placement recurses over the group
//! tree: pick a bounding cell from the SKU view, place the group's direct
//! pods inside it, then place each child group under the same cell.
//!
//! Like the topology-aware scheduler, the whole placement is attempted at
//! the opportunistic priority first and retried at the requested priority
//! only on failure.

use tracing::debug;

use cellgrid_core::{
    CellId, CellLevel, CellPriority, CellRegistry, ChainCellList, LOWEST_LEVEL,
    OPPORTUNISTIC_PRIORITY, PodGroupMemberSpec, PodGroupPlacement, PodGroupSpec,
};

use crate::affinity::{best_affinity_pick, collect_cells_at_level, optimal_affinity};
use crate::error::{ScheduleError, ScheduleResult};
use crate::view::{SkuEntry, sku_cluster_view};

pub struct SkuScheduler {
    cell_list: ChainCellList,
    /// See [`TopologyAwareScheduler`](crate::TopologyAwareScheduler):
    /// cross-priority packing for intra-VC scheduling, per-priority buckets
    /// for opportunistic pods.
    cross_priority_pack: bool,
}

impl SkuScheduler {
    pub fn new(cell_list: ChainCellList, cross_priority_pack: bool) -> Self {
        Self {
            cell_list,
            cross_priority_pack,
        }
    }

    /// Place a pod group tree. The returned placement mirrors the group
    /// tree after sorting, with every cell expanded down to leaves.
    pub fn schedule(
        &self,
        reg: &CellRegistry,
        pod_group: &PodGroupSpec,
        priority: CellPriority,
    ) -> ScheduleResult<PodGroupPlacement> {
        let mut group = pod_group.clone();
        self.sort_pod_group(reg, &mut group);

        // Preemption-free first, retry at the caller's priority.
        let mut result =
            self.find_cells_for_pod_group(reg, &group, OPPORTUNISTIC_PRIORITY, None, &[]);
        if result.is_err() && priority > OPPORTUNISTIC_PRIORITY {
            result = self.find_cells_for_pod_group(reg, &group, priority, None, &[]);
        }
        let mut placement = result?;

        // The caller consumes leaf cells only.
        placement.for_each_list_mut(&mut |list| {
            let mut leaves = Vec::new();
            for &cell in list.iter() {
                leaves.extend(reg.leaf_descendants(cell));
            }
            *list = leaves;
        });
        Ok(placement)
    }

    /// Sort pods and child groups by descending total leaf demand (stable),
    /// then flatten each pod spec by its minimum pod count.
    fn sort_pod_group(&self, reg: &CellRegistry, group: &mut PodGroupSpec) {
        group
            .pods
            .sort_by(|a, b| self.pod_leaf_cells(reg, b).cmp(&self.pod_leaf_cells(reg, a)));
        let mut flattened = Vec::new();
        for pod in &group.pods {
            for _ in 0..pod.min_pod_count {
                flattened.push(pod.clone());
            }
        }
        group.pods = flattened;

        group.child_groups.sort_by(|a, b| {
            self.group_leaf_cells(reg, b)
                .cmp(&self.group_leaf_cells(reg, a))
        });
        for child in &mut group.child_groups {
            self.sort_pod_group(reg, child);
        }
    }

    fn pod_leaf_cells(&self, reg: &CellRegistry, pod: &PodGroupMemberSpec) -> i32 {
        reg.level_leaf_cells(self.level_of(reg, &pod.cell_type)) * pod.cell_number
    }

    fn group_leaf_cells(&self, reg: &CellRegistry, group: &PodGroupSpec) -> i32 {
        let pods: i32 = group.pods.iter().map(|p| self.pod_leaf_cells(reg, p)).sum();
        let children: i32 = group
            .child_groups
            .iter()
            .map(|g| self.group_leaf_cells(reg, g))
            .sum();
        pods + children
    }

    fn level_of(&self, reg: &CellRegistry, cell_type: &str) -> CellLevel {
        reg.cell_type_level(cell_type).unwrap_or_else(|| {
            panic!(
                "assert failure: unknown cell type '{}' in chain {}",
                cell_type,
                reg.chain()
            )
        })
    }

    fn find_cells_for_pod_group(
        &self,
        reg: &CellRegistry,
        group: &PodGroupSpec,
        priority: CellPriority,
        within: Option<CellId>,
        allocated: &[CellId],
    ) -> ScheduleResult<PodGroupPlacement> {
        let bound_level = match group.within_one_cell.as_deref().filter(|t| !t.is_empty()) {
            Some(cell_type) => self.level_of(reg, cell_type),
            None => self.cell_list.top_level(),
        };
        let view = sku_cluster_view(
            reg,
            &self.cell_list,
            within,
            bound_level,
            priority,
            self.cross_priority_pack,
        );

        let mut last_failure = ScheduleError::InsufficientCapacity;
        for entry in &view {
            if !group.pods.is_empty() && !entry.healthy {
                return Err(ScheduleError::BadCell(entry.address.clone()));
            }
            let pod_placements =
                match self.find_cells_for_pods(reg, &group.pods, priority, entry, allocated) {
                    Ok(placement) => placement,
                    Err(failure) => {
                        last_failure = failure;
                        continue;
                    }
                };

            let mut allocated_so_far = allocated.to_vec();
            for list in &pod_placements {
                allocated_so_far.extend_from_slice(list);
            }
            let mut child_group_placements = Vec::new();
            let mut child_failure = None;
            for child in &group.child_groups {
                match self.find_cells_for_pod_group(
                    reg,
                    child,
                    priority,
                    Some(entry.cell),
                    &allocated_so_far,
                ) {
                    Ok(child_placement) => {
                        allocated_so_far.extend(child_placement.all_cells());
                        child_group_placements.push(child_placement);
                    }
                    Err(failure) => {
                        child_failure = Some(failure);
                        break;
                    }
                }
            }
            match child_failure {
                // This bounding cell cannot host the whole group; try the next.
                Some(failure) => last_failure = failure,
                None => {
                    return Ok(PodGroupPlacement {
                        pod_placements,
                        child_group_placements,
                    });
                }
            }
        }
        Err(last_failure)
    }

    /// Place a group's direct pods inside `within`, advancing through
    /// node-level candidates without backtracking already-placed pods.
    fn find_cells_for_pods(
        &self,
        reg: &CellRegistry,
        pods: &[PodGroupMemberSpec],
        priority: CellPriority,
        within: &SkuEntry,
        allocated: &[CellId],
    ) -> ScheduleResult<Vec<Vec<CellId>>> {
        let mut allocated_cells = allocated.to_vec();

        // A bounding cell above node level expands into its node-level view.
        let view: Vec<SkuEntry> = match reg.node_level() {
            Some(node_level) if reg.level(within.cell) > node_level => sku_cluster_view(
                reg,
                &self.cell_list,
                Some(within.cell),
                node_level,
                priority,
                self.cross_priority_pack,
            ),
            _ => vec![within.clone()],
        };

        let mut placement = Vec::new();
        let mut cell_index = 0usize;
        let mut pod_index = 0usize;
        while pod_index < pods.len() {
            if cell_index >= view.len() {
                return Err(ScheduleError::InsufficientCapacity);
            }
            let entry = &view[cell_index];
            if !entry.healthy {
                return Err(ScheduleError::BadCell(entry.address.clone()));
            }
            match self.find_cells_for_pod(reg, &pods[pod_index], priority, entry, &allocated_cells)
            {
                None => cell_index += 1,
                Some(cells) => {
                    allocated_cells.extend_from_slice(&cells);
                    placement.push(cells);
                    pod_index += 1;
                }
            }
        }
        Ok(placement)
    }

    /// Place one pod's cells inside `within` via the affinity search, or
    /// `None` when the candidate cell cannot hold them.
    fn find_cells_for_pod(
        &self,
        reg: &CellRegistry,
        pod: &PodGroupMemberSpec,
        priority: CellPriority,
        within: &SkuEntry,
        allocated: &[CellId],
    ) -> Option<Vec<CellId>> {
        let level = self.level_of(reg, &pod.cell_type);
        let candidates =
            collect_cells_at_level(reg, within.cell, level, priority, allocated);
        if (pod.cell_number as usize) > candidates.len() {
            return None;
        }
        debug!(
            address = %within.address,
            cell_number = pod.cell_number,
            level,
            candidates = candidates.len(),
            "placing pod cells"
        );
        let optimal = optimal_affinity(reg, level, pod.cell_number).unwrap_or(LOWEST_LEVEL);
        let picked = best_affinity_pick(
            reg,
            &candidates,
            pod.cell_number as usize,
            optimal,
            &within.address,
        );
        Some(picked.into_iter().map(|i| candidates[i]).collect())
    }
}
