//! Branch-and-bound affinity search.
//!
//! Both schedulers place a pod by choosing k cells from an ordered candidate
//! list so that the level of the cells' lowest common ancestor is minimal
//! (lower level = tighter packing). The search enumerates k-subsets
//! depth-first over candidate indices, carrying the running LCA of the picks
//! so far; a branch is pruned as soon as that LCA rises above the best level
//! seen, and the search exits early when a subset reaches the theoretical
//! optimum (a buddy set filling a whole sub-tree).
//!
//! Candidates are ordered free-first, so among equally tight subsets the
//! first (least preempting) one wins.

use cellgrid_core::{
    CellId, CellLevel, CellPriority, CellRegistry, FREE_PRIORITY, LOWEST_LEVEL,
};

/// Sentinel level above every real one: "no affinity found yet".
const NO_AFFINITY: CellLevel = CellLevel::MAX;

/// Collect a node's leaf cells available at `priority`: free leaves first,
/// then leaves occupied at strictly lower priorities, each group in stable
/// hierarchy order.
pub fn collect_node_leaf_cells(
    reg: &CellRegistry,
    node: CellId,
    priority: CellPriority,
) -> Vec<CellId> {
    let mut free = Vec::new();
    let mut preemptible = Vec::new();
    for leaf in reg.leaf_descendants(node) {
        match reg.cell_priority(leaf) {
            FREE_PRIORITY => free.push(leaf),
            p if p < priority => preemptible.push(leaf),
            _ => {}
        }
    }
    free.extend(preemptible);
    free
}

/// Collect cells at `level` under `within` available at `priority`, free
/// cells first, skipping any cell whose ancestor or descendant is already in
/// `allocated`.
pub fn collect_cells_at_level(
    reg: &CellRegistry,
    within: CellId,
    level: CellLevel,
    priority: CellPriority,
    allocated: &[CellId],
) -> Vec<CellId> {
    if reg.level(within) < level {
        return Vec::new();
    }
    let mut current = vec![within];
    while reg.level(current[0]) > level {
        let mut next = Vec::with_capacity(current.len() * 2);
        for &c in &current {
            next.extend_from_slice(reg.children(c));
        }
        current = next;
    }
    let mut free = Vec::new();
    let mut preemptible = Vec::new();
    for c in current {
        let overlaps = allocated
            .iter()
            .any(|&a| reg.is_ancestor(c, a) || reg.is_ancestor(a, c));
        if overlaps {
            continue;
        }
        match reg.cell_priority(c) {
            FREE_PRIORITY => free.push(c),
            p if p < priority => preemptible.push(c),
            _ => {}
        }
    }
    free.extend(preemptible);
    free
}

/// The lowest possible LCA level for `cell_number` cells at
/// `requested_level`: the smallest level whose sub-tree holds that many
/// leaves. `None` when the request exceeds the chain.
pub fn optimal_affinity(
    reg: &CellRegistry,
    requested_level: CellLevel,
    cell_number: i32,
) -> Option<CellLevel> {
    let needed = reg.level_leaf_cells(requested_level) * cell_number;
    (requested_level..=reg.top_level()).find(|&l| reg.level_leaf_cells(l) >= needed)
}

/// Pick `k` cells from `candidates` minimizing the level of their LCA.
/// Returns ascending indices into `candidates`; the first subset reaching
/// the lowest level wins.
///
/// Panics when no subset has a common ancestor at all: candidates are
/// always collected under one cell, so that state is a broken invariant.
pub fn best_affinity_pick(
    reg: &CellRegistry,
    candidates: &[CellId],
    k: usize,
    optimal: CellLevel,
    within_address: &str,
) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }
    debug_assert!(candidates.len() >= k);

    // Indices of the current picks and the running LCA chain over them:
    // current_affinity[i] = lca(candidates[current_indices[i]], current_affinity[i-1]).
    let mut current_indices = vec![0usize; k];
    let mut current_affinity: Vec<Option<CellId>> = vec![None; k];
    let mut best_indices = vec![0usize; k];
    let mut best_level: CellLevel = NO_AFFINITY;

    let mut cand = 0usize;
    let mut depth = 0usize;
    loop {
        while cand < candidates.len() {
            let cell = candidates[cand];
            current_indices[depth] = cand;
            if depth == 0 {
                current_affinity[0] = Some(cell);
            } else {
                let lca = current_affinity[depth - 1].and_then(|prev| reg.lca(cell, prev));
                current_affinity[depth] = lca;
                let prune = match lca {
                    None => best_level < NO_AFFINITY,
                    Some(a) => reg.level(a) > best_level,
                };
                if prune {
                    cand += 1;
                    continue;
                }
            }
            if depth == k - 1 {
                let lca = current_affinity[k - 1].unwrap_or_else(|| {
                    panic!("assert failure: picked cells share no ancestor in {within_address}")
                });
                let level = reg.level(lca);
                if level < best_level {
                    best_indices.copy_from_slice(&current_indices);
                    best_level = level;
                    if level == optimal {
                        // A buddy set; nothing tighter exists.
                        return best_indices;
                    }
                }
            } else {
                depth += 1;
            }
            cand += 1;
        }
        if depth == 0 {
            break;
        }
        depth -= 1;
        cand = current_indices[depth] + 1;
    }

    if best_level == NO_AFFINITY {
        panic!("assert failure: failed to pick {k} cells in {within_address}");
    }
    best_indices
}

/// Drop the picked indices (ascending) from an available-cell list.
pub fn remove_picked(cells: &mut Vec<CellId>, picked: &[usize]) {
    for (removed, &index) in picked.iter().enumerate() {
        cells.remove(index - removed);
    }
}
