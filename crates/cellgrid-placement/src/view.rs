//! Priority-stratified cluster views.
//!
//! A view is a linear, sortable projection of one chain's hierarchy at a
//! chosen level, with per-priority counters recomputed whenever the
//! scheduling priority or the suggested-node filter changes. Views are
//! rebuilt per schedule call; nothing here persists.
//!
//! Counter semantics depend on `cross_priority_pack`. When set, one bucket
//! subsumes every priority (`used_leaf_cells_same_priority` counts all
//! occupants) so the comparator packs across priorities; this is safe when
//! higher priorities can avoid preemption elsewhere. When unset, packing
//! stays inside the scheduling priority and the comparator additionally
//! steers away from higher-priority occupants, which keeps opportunistic
//! pods clear of guaranteed ones.

use std::cmp::Ordering;
use std::collections::HashSet;

use cellgrid_core::{CellId, CellLevel, CellPriority, CellRegistry, ChainCellList, LOWEST_LEVEL};

/// One node-level candidate in the topology-aware view: a node-level cell,
/// or a top-level cell of a chain smaller than a node.
#[derive(Debug, Clone)]
pub struct NodeEntry {
    pub cell: CellId,
    /// Free leaf cells at the scheduling priority; strictly lower occupants
    /// count as free.
    pub free_leaf_cells_at_priority: i32,
    pub used_leaf_cells_same_priority: i32,
    pub used_leaf_cells_higher_priority: i32,
    pub healthy: bool,
    pub suggested: bool,
    /// Address of the underlying physical cell, for failure reasons and
    /// logging. Empty for an unbound virtual cell.
    pub address: String,
}

impl NodeEntry {
    fn new(cell: CellId) -> Self {
        Self {
            cell,
            free_leaf_cells_at_priority: 0,
            used_leaf_cells_same_priority: 0,
            used_leaf_cells_higher_priority: 0,
            healthy: true,
            suggested: true,
            address: String::new(),
        }
    }
}

/// The topology-aware scheduler's candidate list: the distinct
/// ancestors-no-higher-than-node of every cell in the chain list.
#[derive(Debug, Clone)]
pub struct ClusterView {
    entries: Vec<NodeEntry>,
}

impl ClusterView {
    pub fn new(reg: &CellRegistry, cell_list: &ChainCellList) -> Self {
        let mut start = cell_list.top_level();
        for level in LOWEST_LEVEL..=cell_list.top_level() {
            if let Some(&c) = cell_list.cells_at(level).first() {
                if reg.at_or_higher_than_node(c) {
                    start = level;
                    break;
                }
            }
        }
        let mut entries: Vec<NodeEntry> = Vec::new();
        for level in (LOWEST_LEVEL..=start).rev() {
            for &c in cell_list.cells_at(level) {
                let anchor = reg.ancestor_no_higher_than_node(c);
                if !entries.iter().any(|e| e.cell == anchor) {
                    entries.push(NodeEntry::new(anchor));
                }
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute every entry's counters and annotations for a scheduling
    /// priority and suggested-node filter.
    pub fn update(
        &mut self,
        reg: &CellRegistry,
        priority: CellPriority,
        suggested_nodes: &HashSet<String>,
        ignore_suggested: bool,
        cross_priority_pack: bool,
    ) {
        for entry in &mut self.entries {
            let counters = Counters::of(reg, entry.cell, priority, cross_priority_pack);
            entry.free_leaf_cells_at_priority = counters.free_at_priority;
            entry.used_leaf_cells_same_priority = counters.used_at_priority;
            entry.used_leaf_cells_higher_priority = counters.used_higher_priority;
            let (healthy, suggested, address) =
                annotate(reg, entry.cell, suggested_nodes, ignore_suggested);
            entry.healthy = healthy;
            entry.suggested = suggested;
            entry.address = address;
        }
    }

    /// Stable sort in descending significance: healthy, suggested, more
    /// same-priority usage (pack), less higher-priority usage (avoid
    /// preemption risk).
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.healthy
                .cmp(&a.healthy)
                .then(b.suggested.cmp(&a.suggested))
                .then(b.used_leaf_cells_same_priority.cmp(&a.used_leaf_cells_same_priority))
                .then(a.used_leaf_cells_higher_priority.cmp(&b.used_leaf_cells_higher_priority))
        });
    }
}

/// One candidate in the SKU view; may sit higher or lower than node level.
#[derive(Debug, Clone)]
pub struct SkuEntry {
    pub cell: CellId,
    pub free_leaf_cells_at_priority: i32,
    pub used_leaf_cells_at_priority: i32,
    pub used_leaf_cells_higher_priority: i32,
    pub healthy: bool,
    pub address: String,
}

/// Build the SKU scheduler's candidate view: cells at levels up to
/// `bound_level`, confined to descendants of `within` (`None` means the
/// whole list), deduplicated through their ancestors at the bounding level,
/// and stably sorted by healthy, more at-priority usage, less
/// higher-priority usage, then lower level.
pub fn sku_cluster_view(
    reg: &CellRegistry,
    cell_list: &ChainCellList,
    within: Option<CellId>,
    bound_level: CellLevel,
    priority: CellPriority,
    cross_priority_pack: bool,
) -> Vec<SkuEntry> {
    let mut view: Vec<SkuEntry> = Vec::new();
    for level in (LOWEST_LEVEL..=bound_level).rev() {
        for &c in cell_list.cells_at(level) {
            if let Some(w) = within {
                if !reg.is_ancestor(w, c) {
                    continue;
                }
            }
            let anchor = reg.ancestor_no_higher_than(bound_level, c);
            if view.iter().any(|e| e.cell == anchor) {
                continue;
            }
            let counters = Counters::of(reg, c, priority, cross_priority_pack);
            view.push(SkuEntry {
                cell: c,
                free_leaf_cells_at_priority: counters.free_at_priority,
                used_leaf_cells_at_priority: counters.used_at_priority,
                used_leaf_cells_higher_priority: counters.used_higher_priority,
                healthy: reg.is_healthy(c),
                address: reg.physical_address(c).to_string(),
            });
        }
    }
    view.sort_by(|a, b| {
        b.healthy
            .cmp(&a.healthy)
            .then(b.used_leaf_cells_at_priority.cmp(&a.used_leaf_cells_at_priority))
            .then(a.used_leaf_cells_higher_priority.cmp(&b.used_leaf_cells_higher_priority))
            .then(reg.level(a.cell).cmp(&reg.level(b.cell)))
    });
    view
}

struct Counters {
    free_at_priority: i32,
    used_at_priority: i32,
    used_higher_priority: i32,
}

impl Counters {
    fn of(
        reg: &CellRegistry,
        cell: CellId,
        priority: CellPriority,
        cross_priority_pack: bool,
    ) -> Self {
        let mut free_at_priority = reg.total_leaf_cells(cell);
        let mut used_at_priority = 0;
        let mut used_higher_priority = 0;
        for (&p, &num) in reg.used_by_priority(cell) {
            if cross_priority_pack {
                used_at_priority += num;
            } else {
                if p == priority {
                    used_at_priority += num;
                }
                if p > priority {
                    used_higher_priority += num;
                }
            }
            if p >= priority {
                free_at_priority -= num;
            }
        }
        Self {
            free_at_priority,
            used_at_priority,
            used_higher_priority,
        }
    }
}

fn annotate(
    reg: &CellRegistry,
    cell: CellId,
    suggested_nodes: &HashSet<String>,
    ignore_suggested: bool,
) -> (bool, bool, String) {
    match reg.physical_of(cell) {
        Some(physical) => {
            let suggested = ignore_suggested
                || reg
                    .nodes(physical)
                    .first()
                    .is_some_and(|n| suggested_nodes.contains(n));
            (
                reg.is_healthy(physical),
                suggested,
                reg.address(physical).to_string(),
            )
        }
        // An unbound virtual cell has no physical placement to judge.
        None => (true, true, String::new()),
    }
}
