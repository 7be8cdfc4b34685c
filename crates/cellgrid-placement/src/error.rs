//! Schedule failure reasons.

use thiserror::Error;

/// Why a schedule call could not produce a placement.
///
/// These are the recoverable failures surfaced to the caller; the rendered
/// strings are the user-visible reasons. Violated internal invariants are
/// not represented here: they panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// No feasible cell set exists, even with maximum allowed preemption.
    #[error("insufficient capacity")]
    InsufficientCapacity,

    /// Every feasible placement includes an unhealthy cell.
    #[error("have to use at least one bad cell {0}")]
    BadCell(String),

    /// Every feasible placement includes an unhealthy node.
    #[error("have to use at least one bad node {0}")]
    BadNode(String),

    /// Every feasible placement includes a node outside the suggested set.
    #[error("have to use at least one non-suggested node {0}")]
    NonSuggestedNode(String),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
