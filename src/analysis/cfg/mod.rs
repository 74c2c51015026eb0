//! Control Flow Graph (CFG) construction.
//!
//! The analyzer needs, for every instruction, the instructions control may continue with and
//! the handlers that protect it. [`ControlFlowGraph::build`] derives both from a
//! [`crate::model::MethodBody`], rejecting code whose structure is broken before any frame is
//! computed.
//!
//! # Key Components
//!
//! - [`ControlFlowGraph`] - Instruction-level graph with blocks, reachability and orderings
//! - [`CfgEdge`] / [`CfgEdgeKind`] - Edges with their control flow semantics
//! - [`BasicBlock`] - Straight-line runs derived from the graph
//!
//! # Edge Types
//!
//! - **Unconditional**: fall-through or `goto`
//! - **Conditional True/False**: the two ways out of an `if`
//! - **Switch**: one edge per case plus the default
//! - **Exception**: from each protected instruction to its handler
//!
//! Branch conditions never prune edges, so every syntactic successor of a reachable
//! instruction is reachable.

mod edge;
mod graph;
pub mod traversal;

pub use edge::{CfgEdge, CfgEdgeKind};
pub use graph::{BasicBlock, ControlFlowGraph};
