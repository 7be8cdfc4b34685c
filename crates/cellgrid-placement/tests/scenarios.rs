//! End-to-end scheduling scenarios.
//!
//! Exercises both schedulers on a two-node DGX2-V100 cluster (8 leaf cells
//! per node, buddy levels leaf → socket → half-node → node) the way the
//! surrounding orchestrator would drive them: schedule, apply the placement,
//! schedule again.

use std::collections::{BTreeMap, HashSet};

use cellgrid_core::{
    CellId, CellRegistry, ChainCellList, ChainLevelSpec, ChainSpec, OPPORTUNISTIC_PRIORITY,
    PodGroupMemberSpec, PodGroupPlacement, PodGroupSpec, add_allocated, remove_allocated,
};
use cellgrid_placement::{ScheduleError, SkuScheduler, TopologyAwareScheduler};

fn dgx2_spec() -> ChainSpec {
    ChainSpec {
        name: "DGX2-V100".to_string(),
        levels: vec![
            ChainLevelSpec {
                cell_type: "DGX2-V100-NODE".to_string(),
                split: 2,
                is_node: true,
            },
            ChainLevelSpec {
                cell_type: "DGX2-V100-HALF".to_string(),
                split: 2,
                is_node: false,
            },
            ChainLevelSpec {
                cell_type: "DGX2-V100-SOCKET".to_string(),
                split: 2,
                is_node: false,
            },
            ChainLevelSpec {
                cell_type: "DGX2-V100".to_string(),
                split: 0,
                is_node: false,
            },
        ],
        pinned: Vec::new(),
    }
}

fn two_node_cluster() -> (CellRegistry, ChainCellList) {
    dgx2_spec().build_physical(&["N0", "N1"]).unwrap()
}

fn all_nodes() -> HashSet<String> {
    ["N0", "N1"].iter().map(|s| s.to_string()).collect()
}

fn counts(pairs: &[(i32, i32)]) -> BTreeMap<i32, i32> {
    pairs.iter().copied().collect()
}

fn member(cell_type: &str, cell_number: i32, min_pod_count: i32) -> PodGroupMemberSpec {
    PodGroupMemberSpec {
        cell_type: cell_type.to_string(),
        cell_number,
        min_pod_count,
    }
}

/// LCA level of a leaf list.
fn affinity_level(reg: &CellRegistry, cells: &[CellId]) -> u32 {
    let mut lca = cells[0];
    for &c in &cells[1..] {
        lca = reg.lca(lca, c).expect("cells share no ancestor");
    }
    reg.level(lca)
}

#[test]
fn single_leaf_pod_on_empty_cluster() {
    let (reg, ccl) = two_node_cluster();
    let scheduler = TopologyAwareScheduler::new(ccl.clone(), true);

    let placements = scheduler
        .schedule(&reg, &counts(&[(1, 1)]), 0, &all_nodes(), false)
        .unwrap();

    let lists = &placements[&1];
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].len(), 1);
    let leaf = lists[0][0];
    assert_eq!(reg.level(leaf), 1);
    // No preemption: the chosen leaf was free.
    assert!(reg.used_by_priority(leaf).is_empty());
}

#[test]
fn eight_leaf_pod_takes_a_full_node() {
    let (reg, ccl) = two_node_cluster();
    let scheduler = TopologyAwareScheduler::new(ccl.clone(), true);

    let placements = scheduler
        .schedule(&reg, &counts(&[(8, 1)]), 0, &all_nodes(), false)
        .unwrap();

    let cells = &placements[&8][0];
    assert_eq!(cells.len(), 8);
    // The eight leaves are exactly one node's sub-tree.
    assert_eq!(affinity_level(&reg, cells), 4);
    let node = reg.lca(cells[0], cells[7]).unwrap();
    assert!(ccl.cells_at(4).contains(&node));
}

#[test]
fn two_single_leaf_pods_land_on_socket_buddies() {
    let (reg, ccl) = two_node_cluster();
    let scheduler = TopologyAwareScheduler::new(ccl, true);

    let placements = scheduler
        .schedule(&reg, &counts(&[(1, 2)]), 0, &all_nodes(), false)
        .unwrap();

    let lists = &placements[&1];
    assert_eq!(lists.len(), 2);
    let (a, b) = (lists[0][0], lists[1][0]);
    assert_ne!(a, b);
    // Both pods share a node and sit on buddy leaves under one socket.
    assert_eq!(reg.level(reg.lca(a, b).unwrap()), 2);
}

#[test]
fn two_leaf_pod_avoids_broken_buddy_pair() {
    let (mut reg, ccl) = two_node_cluster();
    let leaves = ccl.cells_at(1).to_vec();
    // Leaf 0 of N0 occupied at a higher priority: pairs containing leaf 1
    // now straddle sockets, so the free socket {2,3} wins.
    reg.allocate_leaf(leaves[0], 9).unwrap();

    let scheduler = TopologyAwareScheduler::new(ccl, true);
    let placements = scheduler
        .schedule(&reg, &counts(&[(2, 1)]), 0, &all_nodes(), false)
        .unwrap();

    let cells = &placements[&2][0];
    assert_eq!(cells.clone(), vec![leaves[2], leaves[3]]);
    assert_eq!(affinity_level(&reg, cells), 2);
}

#[test]
fn preemption_requires_the_second_pass() {
    let (mut reg, ccl) = two_node_cluster();
    for &leaf in ccl.cells_at(1) {
        reg.allocate_leaf(leaf, 3).unwrap();
    }
    let scheduler = TopologyAwareScheduler::new(ccl.clone(), true);

    // The opportunistic pass alone cannot place anything.
    let err = scheduler
        .schedule(
            &reg,
            &counts(&[(1, 1)]),
            OPPORTUNISTIC_PRIORITY,
            &all_nodes(),
            false,
        )
        .unwrap_err();
    assert_eq!(err, ScheduleError::InsufficientCapacity);
    assert_eq!(err.to_string(), "insufficient capacity");

    // Priority 5 preempts one priority-3 occupant.
    let placements = scheduler
        .schedule(&reg, &counts(&[(1, 1)]), 5, &all_nodes(), false)
        .unwrap();
    let leaf = placements[&1][0][0];
    assert_eq!(reg.cell_priority(leaf), 3);
    // The decision does not touch the usage vectors; applying it is the
    // orchestrator's move.
    let total_used: i32 = ccl
        .cells_at(4)
        .iter()
        .map(|&n| reg.used_at_priority(n, 3))
        .sum();
    assert_eq!(total_used, 16);
}

#[test]
fn sku_group_fits_under_one_bounding_node() {
    let (reg, ccl) = two_node_cluster();
    let scheduler = SkuScheduler::new(ccl.clone(), true);

    // One half-node pod plus a child group of two single-leaf pods, all
    // bounded by one node.
    let group = PodGroupSpec {
        pods: vec![member("DGX2-V100-HALF", 1, 1)],
        child_groups: vec![PodGroupSpec {
            pods: vec![member("DGX2-V100", 1, 2)],
            child_groups: Vec::new(),
            within_one_cell: None,
        }],
        within_one_cell: Some("DGX2-V100-NODE".to_string()),
    };
    let placement = scheduler.schedule(&reg, &group, 0).unwrap();

    // Leaf-only output.
    let all = placement.all_cells();
    for &c in &all {
        assert_eq!(reg.level(c), 1);
    }
    // Everything under one node.
    let node = ccl
        .cells_at(4)
        .iter()
        .copied()
        .find(|&n| all.iter().all(|&c| reg.is_ancestor(n, c)))
        .expect("group crossed its bounding node");

    // The half-node pod fills one half; the child leaves sit in the other.
    let half_pod = &placement.pod_placements[0];
    assert_eq!(half_pod.len(), 4);
    assert_eq!(affinity_level(&reg, half_pod), 3);
    let half = reg.lca(half_pod[0], half_pod[3]).unwrap();
    let child_leaves = placement.child_group_placements[0]
        .pod_placements
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>();
    assert_eq!(child_leaves.len(), 2);
    for &leaf in &child_leaves {
        assert!(reg.is_ancestor(node, leaf));
        assert!(!reg.is_ancestor(half, leaf));
    }
}

#[test]
fn no_preemption_when_free_cells_tie_on_affinity() {
    let (mut reg, ccl) = two_node_cluster();
    let leaves = ccl.cells_at(1).to_vec();
    // Socket 0 of N0 occupied at priority 0: preempting it would also reach
    // affinity level 2, but the free socket must win.
    reg.allocate_leaf(leaves[0], 0).unwrap();
    reg.allocate_leaf(leaves[1], 0).unwrap();

    let scheduler = TopologyAwareScheduler::new(ccl, true);
    let placements = scheduler
        .schedule(&reg, &counts(&[(2, 1)]), 5, &all_nodes(), false)
        .unwrap();

    for &leaf in &placements[&2][0] {
        assert!(reg.used_by_priority(leaf).is_empty(), "preempted a free-capable placement");
    }
}

#[test]
fn schedule_is_deterministic() {
    let (mut reg, ccl) = two_node_cluster();
    let leaves = ccl.cells_at(1).to_vec();
    reg.allocate_leaf(leaves[2], 1).unwrap();
    reg.allocate_leaf(leaves[9], 4).unwrap();

    let scheduler = TopologyAwareScheduler::new(ccl.clone(), true);
    let first = scheduler
        .schedule(&reg, &counts(&[(1, 2), (2, 1)]), 2, &all_nodes(), false)
        .unwrap();
    let second = scheduler
        .schedule(&reg, &counts(&[(1, 2), (2, 1)]), 2, &all_nodes(), false)
        .unwrap();
    assert_eq!(first, second);

    let sku = SkuScheduler::new(ccl, true);
    let group = PodGroupSpec {
        pods: vec![member("DGX2-V100-SOCKET", 1, 2)],
        child_groups: Vec::new(),
        within_one_cell: Some("DGX2-V100-NODE".to_string()),
    };
    let first = sku.schedule(&reg, &group, 2).unwrap();
    let second = sku.schedule(&reg, &group, 2).unwrap();
    assert_eq!(first, second);
}

#[test]
fn applied_placement_round_trips_usage() {
    let (mut reg, ccl) = two_node_cluster();
    let scheduler = TopologyAwareScheduler::new(ccl.clone(), true);

    let placements = scheduler
        .schedule(&reg, &counts(&[(2, 2)]), 1, &all_nodes(), false)
        .unwrap();
    let placement = PodGroupPlacement {
        pod_placements: placements[&2].clone(),
        child_group_placements: Vec::new(),
    };

    add_allocated(&mut reg, &placement, 1).unwrap();
    assert_eq!(reg.used_at_priority(ccl.cells_at(4)[0], 1), 4);

    remove_allocated(&mut reg, &placement, 1).unwrap();
    for level in 1..=4 {
        for &c in ccl.cells_at(level) {
            assert!(reg.used_by_priority(c).is_empty());
        }
    }
}

#[test]
fn consecutive_groups_pack_onto_one_node() {
    let (mut reg, ccl) = two_node_cluster();
    let scheduler = TopologyAwareScheduler::new(ccl.clone(), true);

    // First group takes two leaves.
    let first = scheduler
        .schedule(&reg, &counts(&[(2, 1)]), 0, &all_nodes(), false)
        .unwrap();
    let first_node = reg.lca(first[&2][0][0], first[&2][0][1]).unwrap();
    let first_node = reg.ancestor_no_higher_than_node(first_node);
    add_allocated(
        &mut reg,
        &PodGroupPlacement {
            pod_placements: first[&2].clone(),
            child_group_placements: Vec::new(),
        },
        0,
    )
    .unwrap();

    // The next group packs onto the same node rather than spreading.
    let second = scheduler
        .schedule(&reg, &counts(&[(2, 1)]), 0, &all_nodes(), false)
        .unwrap();
    for &leaf in &second[&2][0] {
        assert!(reg.is_ancestor(first_node, leaf));
        assert!(reg.used_by_priority(leaf).is_empty());
    }
}

#[test]
fn pinned_reservation_schedules_inside_the_pinned_cell() {
    let (reg, ccl) = two_node_cluster();
    // The caller resolves the pinned cell and scopes a scheduler to it.
    let pinned = ccl.cells_at(4)[1];
    let pinned_list = ChainCellList::under(&reg, pinned);
    let scheduler = TopologyAwareScheduler::new(pinned_list, true);

    let placements = scheduler
        .schedule(&reg, &counts(&[(2, 1)]), 0, &all_nodes(), false)
        .unwrap();
    for &leaf in &placements[&2][0] {
        assert!(reg.is_ancestor(pinned, leaf));
    }
}

#[test]
fn virtual_cluster_schedules_over_its_own_tree() {
    let (mut reg, ccl) = two_node_cluster();
    let vc = reg.add_virtual_tree("VC1", 4, 1).unwrap();
    reg.bind(vc.cells_at(4)[0], ccl.cells_at(4)[1]).unwrap();

    let scheduler = TopologyAwareScheduler::new(vc.clone(), true);
    let placements = scheduler
        .schedule(&reg, &counts(&[(1, 2)]), 0, &all_nodes(), false)
        .unwrap();

    // Placements are virtual leaves of the VC tree; the physical mapping is
    // the binding oracle's concern.
    for list in &placements[&1] {
        for &leaf in list {
            assert!(reg.is_ancestor(vc.cells_at(4)[0], leaf));
            assert!(!reg.is_physical(leaf));
        }
    }
}

#[test]
fn sku_scheduler_spreads_pods_across_nodes_under_a_switch() {
    // A chain with a switch above the node level: one group of two node
    // pods lands on both nodes under the same switch.
    let spec = ChainSpec {
        name: "SW-V100".to_string(),
        levels: vec![
            ChainLevelSpec {
                cell_type: "SW".to_string(),
                split: 2,
                is_node: false,
            },
            ChainLevelSpec {
                cell_type: "SW-NODE".to_string(),
                split: 4,
                is_node: true,
            },
            ChainLevelSpec {
                cell_type: "SW-LEAF".to_string(),
                split: 0,
                is_node: false,
            },
        ],
        pinned: Vec::new(),
    };
    let (reg, ccl) = spec.build_physical(&["N0", "N1"]).unwrap();
    let scheduler = SkuScheduler::new(ccl.clone(), true);

    let group = PodGroupSpec {
        pods: vec![member("SW-NODE", 1, 2)],
        child_groups: Vec::new(),
        within_one_cell: Some("SW".to_string()),
    };
    let placement = scheduler.schedule(&reg, &group, 0).unwrap();
    assert_eq!(placement.pod_placements.len(), 2);
    let first = affinity_level(&reg, &placement.pod_placements[0]);
    let second = affinity_level(&reg, &placement.pod_placements[1]);
    assert_eq!((first, second), (2, 2));
    // The two pods occupy distinct nodes.
    let node_of = |cells: &[CellId]| reg.ancestor_no_higher_than_node(cells[0]);
    assert_ne!(
        node_of(&placement.pod_placements[0]),
        node_of(&placement.pod_placements[1])
    );
}
