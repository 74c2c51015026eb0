//! Abstract interpretation of method bodies.
//!
//! This module computes, without executing the program, an approximation of the values held
//! in the operand stack and local slots at every instruction of a method.
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`cfg`] - Instruction-level control flow graph and traversal orders
//! - `lattice` / `value` - The [`AbstractValue`] lattice and its [`JoinSemiLattice`] contract
//! - [`ops`] - Constant folding with the virtual machine's arithmetic semantics
//! - `frame` - [`Frame`] snapshots of stack and locals
//! - `factory` - [`StaticGetFactory`] and [`StaticInvokeFactory`] extension points
//! - `simulation` - [`SimulatedValue`] and the [`InvocationHost`] capability
//! - `validator` - [`Validator`] policies for tolerating simulation failures
//! - `analyzer` - The [`Analyzer`] worklist fixed-point loop and its [`Analysis`] output
//!
//! # Usage
//!
//! ```rust
//! use stackflow::{
//!     analysis::{Analyzer, PureMethods},
//!     AbstractValue, ConstValue, MethodAssembler, MethodRef,
//! };
//!
//! let mut asm = MethodAssembler::new("Demo", "key", "()I")?;
//! asm.iconst(0x1234)
//!     .iconst(0x00ff)
//!     .invokestatic("Util", "mask", "(II)I")
//!     .ireturn();
//! let method = asm.finish()?;
//!
//! let mask = MethodRef::new("Util", "mask", "(II)I")?;
//! let analyzer = Analyzer::builder()
//!     .static_invoke(PureMethods::new().with(mask, |args| match args {
//!         [ConstValue::Int(a), ConstValue::Int(b)] => Some(ConstValue::Int(a & b)),
//!         _ => None,
//!     }))
//!     .build()?;
//!
//! let analysis = analyzer.analyze(&method)?;
//! assert_eq!(
//!     analysis.return_value(),
//!     Some(&AbstractValue::Constant(ConstValue::Int(0x34)))
//! );
//! # Ok::<(), stackflow::Error>(())
//! ```

mod analyzer;
pub mod cfg;
mod factory;
mod frame;
mod interpreter;
mod lattice;
pub mod ops;
mod simulation;
mod validator;
mod value;

pub use analyzer::{Analysis, Analyzer, AnalyzerBuilder, AnalyzerConfig, ValueKind};
pub use cfg::{BasicBlock, CfgEdge, CfgEdgeKind, ControlFlowGraph};
pub use factory::{FieldConstants, PureFn, PureMethods, StaticGetFactory, StaticInvokeFactory};
pub use frame::{Frame, FrameError};
pub use lattice::JoinSemiLattice;
pub use simulation::{
    CachingHost, HostError, HostErrorKind, HostObject, HostValue, InvocationHost,
    SimulatedValue, SimulationFailure,
};
pub use validator::{ResolvedRatio, SyntheticMethods, Validator};
pub use value::{AbstractValue, ConstValue, SlotSize};
