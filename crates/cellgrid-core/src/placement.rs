//! Pod group specifications and placements.
//!
//! A pod group is a tree: direct member pods plus child groups, each level
//! optionally constrained to lie under one ancestor cell
//! (`within_one_cell`). A successful schedule yields a
//! [`PodGroupPlacement`] mirroring the group tree, holding one leaf-cell
//! list per pod.

use serde::{Deserialize, Serialize};

use crate::cell::{CellId, CellPriority, CellRegistry};
use crate::error::TopologyResult;

/// One member pod of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodGroupMemberSpec {
    /// Cell type each requested cell resolves to (a level within the chain).
    pub cell_type: String,
    /// Number of cells of that type per pod.
    pub cell_number: i32,
    /// Minimum pods of this shape that must be co-scheduled.
    pub min_pod_count: i32,
}

/// A co-scheduled group of pods, possibly nested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodGroupSpec {
    pub pods: Vec<PodGroupMemberSpec>,
    pub child_groups: Vec<PodGroupSpec>,
    /// Cell type bounding the whole group: every cell chosen for the group
    /// and its descendants lies beneath one ancestor at this level. `None`
    /// means unconstrained.
    pub within_one_cell: Option<String>,
}

/// Placement for a pod group, mirroring the group tree. After
/// post-processing every cell in the lists is a leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodGroupPlacement {
    /// One cell list per (flattened) member pod, in pod order.
    pub pod_placements: Vec<Vec<CellId>>,
    /// One placement per child group, in child-group order.
    pub child_group_placements: Vec<PodGroupPlacement>,
}

impl PodGroupPlacement {
    /// Every cell-list in the tree, pods first then child groups, in
    /// deterministic traversal order.
    pub fn cell_lists(&self) -> Vec<&Vec<CellId>> {
        let mut out = Vec::new();
        self.collect_lists(&mut out);
        out
    }

    fn collect_lists<'a>(&'a self, out: &mut Vec<&'a Vec<CellId>>) {
        for list in &self.pod_placements {
            out.push(list);
        }
        for child in &self.child_group_placements {
            child.collect_lists(out);
        }
    }

    /// Visit every cell-list mutably, in the same traversal order.
    pub fn for_each_list_mut(&mut self, f: &mut impl FnMut(&mut Vec<CellId>)) {
        for list in &mut self.pod_placements {
            f(list);
        }
        for child in &mut self.child_group_placements {
            child.for_each_list_mut(f);
        }
    }

    /// Every cell across the tree, in traversal order.
    pub fn all_cells(&self) -> Vec<CellId> {
        self.cell_lists().into_iter().flatten().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pod_placements.is_empty() && self.child_group_placements.is_empty()
    }
}

/// Mark every leaf cell of a placement used at `priority`. The placement
/// must already be leaf-only.
pub fn add_allocated(
    reg: &mut CellRegistry,
    placement: &PodGroupPlacement,
    priority: CellPriority,
) -> TopologyResult<()> {
    for leaf in placement.all_cells() {
        reg.allocate_leaf(leaf, priority)?;
    }
    Ok(())
}

/// Release every leaf cell of a placement used at `priority`, the inverse
/// of [`add_allocated`].
pub fn remove_allocated(
    reg: &mut CellRegistry,
    placement: &PodGroupPlacement,
    priority: CellPriority,
) -> TopologyResult<()> {
    for leaf in placement.all_cells() {
        reg.release_leaf(leaf, priority)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainLevelSpec, ChainSpec};

    fn small_chain() -> (CellRegistry, crate::chain::ChainCellList) {
        ChainSpec {
            name: "K80".to_string(),
            levels: vec![
                ChainLevelSpec {
                    cell_type: "K80-NODE".to_string(),
                    split: 4,
                    is_node: true,
                },
                ChainLevelSpec {
                    cell_type: "K80".to_string(),
                    split: 0,
                    is_node: false,
                },
            ],
            pinned: Vec::new(),
        }
        .build_physical(&["N0"])
        .unwrap()
    }

    fn nested_placement(leaves: &[CellId]) -> PodGroupPlacement {
        PodGroupPlacement {
            pod_placements: vec![vec![leaves[0]], vec![leaves[1]]],
            child_group_placements: vec![PodGroupPlacement {
                pod_placements: vec![vec![leaves[2], leaves[3]]],
                child_group_placements: Vec::new(),
            }],
        }
    }

    #[test]
    fn traversal_is_pods_first_then_children() {
        let (_, ccl) = small_chain();
        let leaves = ccl.cells_at(1).to_vec();
        let placement = nested_placement(&leaves);
        let lists = placement.cell_lists();
        assert_eq!(lists.len(), 3);
        assert_eq!(*lists[0], vec![leaves[0]]);
        assert_eq!(*lists[1], vec![leaves[1]]);
        assert_eq!(*lists[2], vec![leaves[2], leaves[3]]);
        assert_eq!(placement.all_cells(), leaves[..4].to_vec());
    }

    #[test]
    fn mutable_traversal_matches_order() {
        let (_, ccl) = small_chain();
        let leaves = ccl.cells_at(1).to_vec();
        let mut placement = nested_placement(&leaves);
        let mut sizes = Vec::new();
        placement.for_each_list_mut(&mut |list| sizes.push(list.len()));
        assert_eq!(sizes, vec![1, 1, 2]);
    }

    #[test]
    fn add_then_remove_restores_usage() {
        let (mut reg, ccl) = small_chain();
        let leaves = ccl.cells_at(1).to_vec();
        let node = ccl.cells_at(2)[0];
        let placement = nested_placement(&leaves);

        add_allocated(&mut reg, &placement, 7).unwrap();
        assert_eq!(reg.used_at_priority(node, 7), 4);

        remove_allocated(&mut reg, &placement, 7).unwrap();
        assert!(reg.used_by_priority(node).is_empty());
        for leaf in leaves {
            assert!(reg.used_by_priority(leaf).is_empty());
        }
    }

    #[test]
    fn specs_round_trip_through_serde() {
        let spec = PodGroupSpec {
            pods: vec![PodGroupMemberSpec {
                cell_type: "K80".to_string(),
                cell_number: 2,
                min_pod_count: 1,
            }],
            child_groups: vec![PodGroupSpec {
                pods: vec![PodGroupMemberSpec {
                    cell_type: "K80".to_string(),
                    cell_number: 1,
                    min_pod_count: 2,
                }],
                child_groups: Vec::new(),
                within_one_cell: None,
            }],
            within_one_cell: Some("K80-NODE".to_string()),
        };
        let text = serde_json::to_string(&spec).unwrap();
        let parsed: PodGroupSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.pods[0].cell_number, 2);
        assert_eq!(parsed.child_groups[0].pods[0].min_pod_count, 2);
        assert_eq!(parsed.within_one_cell.as_deref(), Some("K80-NODE"));
    }
}
