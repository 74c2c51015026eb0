//! Input model consumed by the analyzer.
//!
//! This module describes the decoded method the analyzer works on: instructions and their
//! identities, parsed descriptors, field/method references and the method body with its
//! exception handler table. A label-based [`MethodAssembler`] builds bodies by hand.
//!
//! # Key Components
//!
//! - [`Instruction`] / [`InsnId`] - Closed instruction set and instruction identity
//! - [`TypeDesc`] / [`MethodDescriptor`] - Parsed field and method descriptors
//! - [`FieldRef`] / [`MethodRef`] - Symbolic references used as factory keys
//! - [`MethodBody`] - One decoded method
//! - [`MethodAssembler`] - Fluent builder with label resolution

mod assembler;
mod descriptor;
mod instruction;
mod method;
mod reference;

pub use assembler::MethodAssembler;
pub use descriptor::{BaseType, MethodDescriptor, TypeDesc};
pub use instruction::{
    BinaryOp, CompareOp, Condition, FlowType, InsnId, Instruction, InvokeKind, Narrow, ValueType,
};
pub use method::{ExceptionHandler, MethodAccess, MethodBody, Parameter};
pub use reference::{FieldRef, MethodRef};
