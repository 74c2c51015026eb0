// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # stackflow
//!
//! Abstract interpretation for method bodies of stack-based virtual machines.
//!
//! `stackflow` computes, for every instruction of a method, an approximation of the values on
//! the operand stack and in the local variable slots, without running the program. The result
//! feeds static-analysis tooling such as deobfuscators, decompilers and constant propagation
//! passes.
//!
//! ## Features
//!
//! - **Flat value lattice** - Constants, known class instances and simulated host values, with
//!   `Unresolved` as top
//! - **Pluggable resolution** - Static field reads and static calls are resolved by
//!   caller-provided factories
//! - **Simulated execution** - Static calls with concrete arguments can be realized through a
//!   host capability, with optional memoization
//! - **Failure resolution** - Validators decide which simulation failures degrade precision
//!   instead of aborting the analysis
//! - **Batch analysis** - Independent methods are analyzed in parallel
//!
//! ## Quick Start
//!
//! ```rust
//! use stackflow::prelude::*;
//!
//! // static int f(int x) { return Config.SEED ^ 0x5a; }
//! let mut asm = MethodAssembler::new("Demo", "f", "(I)I")?;
//! asm.getstatic("Config", "SEED", "I").iconst(0x5a).ixor().ireturn();
//! let method = asm.finish()?;
//!
//! let seed = FieldRef::new("Config", "SEED", "I")?;
//! let analyzer = Analyzer::builder()
//!     .static_get(FieldConstants::new().with(seed, ConstValue::Int(0x0f)))
//!     .build()?;
//! let analysis = analyzer.analyze(&method)?;
//!
//! assert_eq!(
//!     analysis.return_value(),
//!     Some(&AbstractValue::Constant(ConstValue::Int(0x55)))
//! );
//! # Ok::<(), stackflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`model`] - The decoded method: instructions, descriptors, references, handler table and
//!   a label-based assembler
//! - [`analysis`] - Control flow graph, value lattice, frames, factories, simulation,
//!   validators and the fixed-point analyzer
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Structural problems with the
//! input are always fatal; simulation failures may be resolved by a validator:
//!
//! ```rust
//! use stackflow::{Analyzer, Error, MethodAssembler};
//!
//! let mut asm = MethodAssembler::new("Demo", "loop", "()V")?;
//! asm.label("top").iconst(1).goto("top");
//! let method = asm.finish()?;
//!
//! match Analyzer::new().analyze(&method) {
//!     Err(Error::Frame { insn, source }) => println!("{insn}: {source}"),
//!     Err(Error::Simulation(failure)) => println!("{failure}"),
//!     Err(e) => println!("Other error: {e}"),
//!     Ok(analysis) => println!("{} iterations", analysis.iterations()),
//! }
//! # Ok::<(), stackflow::Error>(())
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use stackflow::prelude::*;
///
/// let analyzer = Analyzer::new();
/// assert_eq!(analyzer.config().value_kind(), ValueKind::Constant);
/// ```
pub mod prelude;

/// The input model: decoded method bodies and how to build them.
///
/// # Key Components
///
/// - [`model::MethodBody`] - One method with its code and handler table
/// - [`model::Instruction`] - The closed instruction set
/// - [`model::MethodAssembler`] - Label-based construction of method bodies
/// - [`model::FieldRef`] / [`model::MethodRef`] - Symbolic references
pub mod model;

/// Abstract interpretation over method bodies.
///
/// See [`analysis::Analyzer`] for the entry point.
pub mod analysis;

/// `stackflow` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `stackflow` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

pub use analysis::{
    AbstractValue, Analysis, Analyzer, AnalyzerBuilder, AnalyzerConfig, CachingHost,
    ConstValue, FieldConstants, Frame, FrameError, HostError, HostErrorKind, HostObject,
    HostValue, InvocationHost, JoinSemiLattice, PureMethods, ResolvedRatio, SimulatedValue,
    SimulationFailure, SlotSize, StaticGetFactory, StaticInvokeFactory, SyntheticMethods,
    Validator, ValueKind,
};
pub use model::{
    Condition, FieldRef, InsnId, Instruction, MethodAccess, MethodAssembler, MethodBody,
    MethodRef, ValueType,
};
