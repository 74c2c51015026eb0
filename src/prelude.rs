//! # stackflow Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the stackflow library. Import this module to get quick access to everything needed to
//! build a method body, configure an analyzer and read its results.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all stackflow operations
pub use crate::Error;

/// The result type used throughout stackflow
pub use crate::Result;

// ================================================================================================
// Input Model
// ================================================================================================

/// Method bodies, instructions and their identities
pub use crate::model::{
    BinaryOp, CompareOp, Condition, ExceptionHandler, InsnId, Instruction, InvokeKind,
    MethodAccess, MethodBody, Narrow, ValueType,
};

/// Descriptors and symbolic references
pub use crate::model::{FieldRef, MethodDescriptor, MethodRef, TypeDesc};

/// Label-based construction of method bodies
pub use crate::model::MethodAssembler;

// ================================================================================================
// Analysis
// ================================================================================================

/// The analyzer, its configuration and its output
pub use crate::analysis::{Analysis, Analyzer, AnalyzerBuilder, AnalyzerConfig, ValueKind};

/// Lattice values and frames
pub use crate::analysis::{AbstractValue, ConstValue, Frame, JoinSemiLattice, SlotSize};

/// Resolution of static field reads and static calls
pub use crate::analysis::{FieldConstants, PureMethods, StaticGetFactory, StaticInvokeFactory};

/// Simulated execution
pub use crate::analysis::{
    CachingHost, HostError, HostErrorKind, HostObject, HostValue, InvocationHost, SimulatedValue,
    SimulationFailure,
};

/// Failure resolution policies
pub use crate::analysis::{ResolvedRatio, SyntheticMethods, Validator};

/// Control flow graph
pub use crate::analysis::ControlFlowGraph;
