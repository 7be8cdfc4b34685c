//! Chain topology descriptions and hierarchy builders.
//!
//! A [`ChainSpec`] describes one SKU topology top-down (for example a
//! `DGX2-V100` chain of node → half-node → socket → leaf). Building it
//! yields the chain's [`CellRegistry`](crate::cell::CellRegistry) and a
//! [`ChainCellList`], the level-indexed projection the schedulers consume.
//!
//! The surrounding system owns cluster-configuration parsing; these types are
//! the contract it fills in.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cell::{CellId, CellKind, CellLevel, CellRegistry, LOWEST_LEVEL};
use crate::error::{TopologyError, TopologyResult};

/// One level of a chain, listed top-down in [`ChainSpec::levels`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainLevelSpec {
    /// Cell type name at this level, unique within the chain.
    pub cell_type: String,
    /// Children per cell at this level. The leaf level uses 0.
    pub split: u32,
    /// Marks the node boundary. At most one level may set this; cells at
    /// this level and above span whole nodes.
    #[serde(default)]
    pub is_node: bool,
}

/// Topology of one SKU family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    pub name: String,
    /// Levels top-down; the last entry is the leaf level.
    pub levels: Vec<ChainLevelSpec>,
    /// Addresses of cells reserved to specific virtual-cluster identities.
    #[serde(default)]
    pub pinned: Vec<String>,
}

impl ChainSpec {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Number of levels in the chain; also the level of its top cells.
    pub fn top_level(&self) -> CellLevel {
        self.levels.len() as CellLevel
    }

    fn validate(&self) -> TopologyResult<()> {
        if self.levels.is_empty() {
            return Err(TopologyError::EmptyChain(self.name.clone()));
        }
        let mut seen = BTreeMap::new();
        for (i, level) in self.levels.iter().enumerate() {
            let is_leaf = i == self.levels.len() - 1;
            if !is_leaf && level.split == 0 {
                return Err(TopologyError::ZeroSplit {
                    chain: self.name.clone(),
                    cell_type: level.cell_type.clone(),
                });
            }
            if seen.insert(level.cell_type.clone(), i).is_some() {
                return Err(TopologyError::DuplicateCellType(level.cell_type.clone()));
            }
        }
        if self.levels.iter().filter(|l| l.is_node).count() > 1 {
            return Err(TopologyError::MultipleNodeLevels {
                chain: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Build the physical hierarchy: one tree per node-level cell, named by
    /// `node_names` in order. When the chain has no node level the names
    /// apply to the top cells instead (a chain smaller than one node).
    pub fn build_physical(
        &self,
        node_names: &[&str],
    ) -> TopologyResult<(CellRegistry, ChainCellList)> {
        self.validate()?;
        let top = self.top_level();
        let node_level = self
            .levels
            .iter()
            .position(|l| l.is_node)
            .map(|i| top - i as CellLevel);
        let name_level = node_level.unwrap_or(top);

        // Leaf counts and splits per level, bottom-up.
        let mut level_splits = vec![0u32; top as usize];
        let mut level_leaf_cells = vec![1i32; top as usize];
        for level in 2..=top {
            let split = self.levels[(top - level) as usize].split;
            level_splits[(level - 1) as usize] = split;
            level_leaf_cells[(level - 1) as usize] =
                level_leaf_cells[(level - 2) as usize] * split as i32;
        }

        let mut cell_types = BTreeMap::new();
        for (i, l) in self.levels.iter().enumerate() {
            cell_types.insert(l.cell_type.clone(), top - i as CellLevel);
        }

        let mut cells_per_level = vec![1usize; (top + 1) as usize];
        for level in (LOWEST_LEVEL..top).rev() {
            cells_per_level[level as usize] =
                cells_per_level[(level + 1) as usize] * level_splits[level as usize] as usize;
        }
        // Top cell count follows from the node-name list.
        let per_top = cells_per_level[name_level as usize];
        if node_names.is_empty() || node_names.len() % per_top != 0 {
            return Err(TopologyError::NodeNameCount {
                chain: self.name.clone(),
                expected: per_top,
                got: node_names.len(),
            });
        }
        let top_count = node_names.len() / per_top;

        let mut reg = CellRegistry::new(
            self.name.clone(),
            top,
            node_level,
            level_leaf_cells,
            level_splits,
            cell_types,
        );

        let mut list = ChainCellList::empty(top);
        let mut name_cursor = 0usize;
        for i in 0..top_count {
            let address = format!("{}/{}", self.name, i);
            let root = reg.push_cell(top, None, address, CellKind::Physical { nodes: Vec::new() });
            list.push(top, root);
            self.grow_physical(&mut reg, &mut list, root, node_names, &mut name_cursor);
        }
        Ok((reg, list))
    }

    fn grow_physical(
        &self,
        reg: &mut CellRegistry,
        list: &mut ChainCellList,
        cell: CellId,
        node_names: &[&str],
        name_cursor: &mut usize,
    ) {
        let level = reg.level(cell);
        let name_level = reg.node_level().unwrap_or(reg.top_level());
        if level == name_level {
            reg.set_nodes(cell, vec![node_names[*name_cursor].to_string()]);
            *name_cursor += 1;
        }
        if level == LOWEST_LEVEL {
            return;
        }
        let split = reg.level_split(level);
        for c in 0..split {
            let address = format!("{}/{}", reg.address(cell), c);
            let child = reg.push_cell(
                level - 1,
                Some(cell),
                address,
                CellKind::Physical { nodes: Vec::new() },
            );
            list.push(level - 1, child);
            self.grow_physical(reg, list, child, node_names, name_cursor);
        }
        // Cells above the node level span the union of their children's nodes.
        if level > name_level {
            let children = reg.children(cell).to_vec();
            let mut nodes = Vec::new();
            for child in children {
                nodes.extend(reg.nodes(child).to_vec());
            }
            reg.set_nodes(cell, nodes);
        }
    }
}

impl CellRegistry {
    /// Grow a virtual-cluster tree inside this registry: `count` virtual
    /// cells at `level`, each with a full subtree down to the leaves. The
    /// returned list spans only the new tree.
    pub fn add_virtual_tree(
        &mut self,
        vc: &str,
        level: CellLevel,
        count: u32,
    ) -> TopologyResult<ChainCellList> {
        let mut list = ChainCellList::empty(level);
        for i in 0..count {
            let address = format!("{}/{}/{}", vc, self.chain(), i);
            let root = self.push_cell(level, None, address, CellKind::Virtual { bound: None });
            list.push(level, root);
            self.grow_virtual(&mut list, root);
        }
        Ok(list)
    }

    fn grow_virtual(&mut self, list: &mut ChainCellList, cell: CellId) {
        let level = self.level(cell);
        if level == LOWEST_LEVEL {
            return;
        }
        for c in 0..self.level_split(level) {
            let address = format!("{}/{}", self.address(cell), c);
            let child = self.push_cell(
                level - 1,
                Some(cell),
                address,
                CellKind::Virtual { bound: None },
            );
            list.push(level - 1, child);
            self.grow_virtual(list, child);
        }
    }

    /// Find a cell by its address.
    pub fn find_by_address(&self, address: &str) -> Option<CellId> {
        (0..self.cell_count())
            .map(CellId::new)
            .find(|&id| self.address(id) == address)
    }
}

/// Level-indexed cell list for one hierarchy: the whole physical chain, a
/// virtual cluster's tree, or the sub-tree under a pinned cell.
#[derive(Debug, Clone)]
pub struct ChainCellList {
    /// Cells per level, indexed by `level - 1`, in stable order.
    levels: Vec<Vec<CellId>>,
}

impl ChainCellList {
    fn empty(top_level: CellLevel) -> Self {
        Self {
            levels: vec![Vec::new(); top_level as usize],
        }
    }

    fn push(&mut self, level: CellLevel, id: CellId) {
        self.levels[(level - 1) as usize].push(id);
    }

    pub fn top_level(&self) -> CellLevel {
        self.levels.len() as CellLevel
    }

    pub fn cells_at(&self, level: CellLevel) -> &[CellId] {
        match self.levels.get((level - 1) as usize) {
            Some(cells) => cells,
            None => &[],
        }
    }

    /// The sub-list under one cell, serving pinned reservations.
    pub fn under(reg: &CellRegistry, root: CellId) -> Self {
        let mut list = ChainCellList::empty(reg.level(root));
        let mut current = vec![root];
        let mut level = reg.level(root);
        loop {
            for &c in &current {
                list.push(level, c);
            }
            if level == LOWEST_LEVEL {
                break;
            }
            let mut next = Vec::new();
            for &c in &current {
                next.extend_from_slice(reg.children(c));
            }
            current = next;
            level -= 1;
        }
        list
    }
}
