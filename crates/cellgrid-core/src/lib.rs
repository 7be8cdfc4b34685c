//! cellgrid-core — cell hierarchy model for topology-aware scheduling.
//!
//! A cluster of accelerators is modeled as a set of *chains*, one per SKU
//! family. Each chain is a hierarchy of *cells*: level 1 is a single leaf
//! accelerator, higher levels group buddies (socket, half-node, node,
//! switch, ...). This crate owns that data model:
//!
//! - **`cell`** — Cell arena, hierarchy queries (LCA, ancestors), usage
//!   vectors, health, virtual↔physical bindings
//! - **`chain`** — Chain topology specs and hierarchy builders
//! - **`placement`** — Pod group specs, placements, usage mutation hooks
//!
//! Scheduling itself lives in `cellgrid-placement`; this crate stays free of
//! policy. Mutations (usage vectors, health, bindings) must be serialized
//! against schedule calls by the caller; nothing here locks.

pub mod cell;
pub mod chain;
pub mod error;
pub mod placement;

pub use cell::{
    CellId, CellKind, CellLevel, CellPriority, CellRegistry, FREE_PRIORITY, LOWEST_LEVEL,
    OPPORTUNISTIC_PRIORITY,
};
pub use chain::{ChainCellList, ChainLevelSpec, ChainSpec};
pub use error::{TopologyError, TopologyResult};
pub use placement::{
    PodGroupMemberSpec, PodGroupPlacement, PodGroupSpec, add_allocated, remove_allocated,
};
