//! Core error types.

use thiserror::Error;

/// Errors raised while building or mutating a cell hierarchy.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("chain '{0}' defines no levels")]
    EmptyChain(String),

    #[error("chain '{chain}' level '{cell_type}' must have a non-zero split")]
    ZeroSplit { chain: String, cell_type: String },

    #[error("chain '{chain}' marks more than one level as the node level")]
    MultipleNodeLevels { chain: String },

    #[error("chain '{chain}' expects {expected} node names, got {got}")]
    NodeNameCount {
        chain: String,
        expected: usize,
        got: usize,
    },

    #[error("duplicate cell type '{0}' in chain spec")]
    DuplicateCellType(String),

    #[error("cell {0} is not a leaf cell")]
    NotALeaf(String),

    #[error("leaf cell {0} is already occupied")]
    AlreadyOccupied(String),

    #[error("leaf cell {address} is not occupied at priority {priority}")]
    NotOccupied { address: String, priority: i32 },

    #[error("binding requires a virtual cell bound to a physical cell")]
    BindKindMismatch,

    #[error("cannot bind cells at different levels ({virtual_level} vs {physical_level})")]
    BindLevelMismatch {
        virtual_level: u32,
        physical_level: u32,
    },
}

pub type TopologyResult<T> = Result<T, TopologyError>;
