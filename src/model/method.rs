//! Method bodies as handed to the analyzer.
//!
//! A [`MethodBody`] is the decoded form of one method: its identity, access flags, declared
//! frame limits, the linear instruction stream and the exception handler table. It is usually
//! produced by an external decoder, or by hand through [`crate::model::MethodAssembler`].

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{
    model::{InsnId, Instruction, MethodDescriptor, TypeDesc},
    Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Method access and property flags
    pub struct MethodAccess: u16 {
        /// Accessible from everywhere
        const PUBLIC = 0x0001;
        /// Accessible only inside the declaring class
        const PRIVATE = 0x0002;
        /// Accessible from subclasses
        const PROTECTED = 0x0004;
        /// No receiver
        const STATIC = 0x0008;
        /// Cannot be overridden
        const FINAL = 0x0010;
        /// Invocation is wrapped in the receiver's monitor
        const SYNCHRONIZED = 0x0020;
        /// Compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Declared with a variable number of arguments
        const VARARGS = 0x0080;
        /// Implemented natively
        const NATIVE = 0x0100;
        /// No implementation
        const ABSTRACT = 0x0400;
        /// Strict floating point
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
    }
}

/// One entry of the exception handler table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First covered instruction
    pub start: InsnId,
    /// First instruction after the covered range (exclusive)
    pub end: InsnId,
    /// Handler entry point
    pub handler: InsnId,
    /// Caught class, `None` for a catch-all (`finally`) handler
    pub catch_type: Option<Arc<str>>,
}

impl ExceptionHandler {
    /// Returns `true` if `insn` lies in the protected range.
    #[must_use]
    pub fn covers(&self, insn: InsnId) -> bool {
        self.start <= insn && insn < self.end
    }
}

/// A declared parameter together with the local slot it arrives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Local slot holding the parameter on entry
    pub slot: usize,
    /// Declared type
    pub ty: TypeDesc,
}

/// A decoded method.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Internal name of the declaring class
    pub owner: Arc<str>,
    /// Method name
    pub name: Arc<str>,
    /// Parsed descriptor
    pub descriptor: MethodDescriptor,
    /// Access and property flags
    pub access: MethodAccess,
    /// Number of local slots, including the receiver and parameters
    pub max_locals: u16,
    /// Operand stack limit in slots; `None` leaves the stack unbounded
    pub max_stack: Option<u16>,
    /// The instruction stream, indexed by [`InsnId`]
    pub instructions: Vec<Instruction>,
    /// Exception handler table, in priority order
    pub handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Creates a method body, checking that the local table can hold the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDescriptor`] for a bad descriptor and
    /// [`crate::Error::Malformed`] if `max_locals` is smaller than the receiver and parameter
    /// slots.
    pub fn new(
        owner: &str,
        name: &str,
        descriptor: &str,
        access: MethodAccess,
        max_locals: u16,
        instructions: Vec<Instruction>,
    ) -> Result<Self> {
        let body = MethodBody {
            owner: Arc::from(owner),
            name: Arc::from(name),
            descriptor: MethodDescriptor::parse(descriptor)?,
            access,
            max_locals,
            max_stack: None,
            instructions,
            handlers: Vec::new(),
        };
        body.check_locals()?;
        Ok(body)
    }

    /// Checks that `max_locals` covers the receiver and all parameters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when the local table is too small.
    pub fn check_locals(&self) -> Result<()> {
        let required = self.argument_slots();
        if usize::from(self.max_locals) < required {
            return Err(malformed_error!(
                "{} declares {} locals but its arguments need {}",
                self.id(),
                self.max_locals,
                required
            ));
        }
        Ok(())
    }

    /// Returns `true` if the method has no receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccess::STATIC)
    }

    /// Returns `true` for compiler-generated methods.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.access.contains(MethodAccess::SYNTHETIC)
    }

    /// Returns `true` for bridge methods.
    #[must_use]
    pub fn is_bridge(&self) -> bool {
        self.access.contains(MethodAccess::BRIDGE)
    }

    /// Slots occupied by the receiver (if any) and the declared parameters.
    #[must_use]
    pub fn argument_slots(&self) -> usize {
        usize::from(!self.is_static()) + self.descriptor.param_slots()
    }

    /// Lists the declared parameters with the local slot each one arrives in.
    ///
    /// Slot 0 holds the receiver for instance methods, so their first parameter starts at
    /// slot 1. Two-slot parameters advance the next slot by two.
    #[must_use]
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut slot = usize::from(!self.is_static());
        self.descriptor
            .params
            .iter()
            .map(|ty| {
                let parameter = Parameter {
                    slot,
                    ty: ty.clone(),
                };
                slot += ty.size().slots();
                parameter
            })
            .collect()
    }

    /// Returns the instruction at `insn`, if it exists.
    #[must_use]
    pub fn instruction(&self, insn: InsnId) -> Option<&Instruction> {
        self.instructions.get(insn.index())
    }

    /// Number of instructions in the body.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Human-readable identity, `owner.name(desc)ret`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

impl fmt::Display for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [locals={}]", self.id(), self.max_locals)?;
        for (index, insn) in self.instructions.iter().enumerate() {
            writeln!(f, "  {:>4}: {insn}", InsnId::new(index))?;
        }
        for handler in &self.handlers {
            writeln!(
                f,
                "  try {}..{} catch {} -> {}",
                handler.start,
                handler.end,
                handler.catch_type.as_deref().unwrap_or("*"),
                handler.handler
            )?;
        }
        Ok(())
    }
}
