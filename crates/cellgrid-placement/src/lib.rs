//! cellgrid-placement — topology-aware gang placement for cell chains.
//!
//! Given a group of co-scheduled pods requesting leaf accelerators, these
//! schedulers select concrete cells honoring the chain topology,
//! priority-based preemption, and affinity (pack co-scheduled pods under the
//! lowest common topological ancestor). This crate is pure decision-making:
//! it never mutates the hierarchy, and the caller applies or discards the
//! returned placement.
//!
//! # Components
//!
//! - **`view`** — Priority-stratified cluster views and their comparators
//! - **`affinity`** — Branch-and-bound LCA-minimizing cell search
//! - **`topology`** — Scheduler for uniform leaf-cell requests
//! - **`sku`** — Recursive scheduler for heterogeneous cell-level requests
//! - **`error`** — Schedule failure reasons
//!
//! Every schedule call runs twice at most: a first pass at the opportunistic
//! priority avoids preemption, and a second pass at the requested priority
//! admits preempting strictly-lower occupants only when the first fails.

pub mod affinity;
pub mod error;
pub mod sku;
pub mod topology;
pub mod view;

pub use error::{ScheduleError, ScheduleResult};
pub use sku::SkuScheduler;
pub use topology::TopologyAwareScheduler;
pub use view::{ClusterView, NodeEntry, SkuEntry, sku_cluster_view};
