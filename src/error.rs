use thiserror::Error;

use crate::{
    analysis::{FrameError, SimulationFailure},
    model::InsnId,
};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! graph_error {
    ($insn:expr, $msg:expr) => {
        crate::Error::MalformedGraph {
            insn: $insn,
            message: $msg.to_string(),
        }
    };

    ($insn:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedGraph {
            insn: $insn,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Input Model Errors
/// - [`Error::Malformed`] - Inconsistent method header or other broken input
/// - [`Error::InvalidDescriptor`] - A type or method descriptor could not be parsed
/// - [`Error::DuplicateLabel`] / [`Error::UndefinedLabel`] - Assembler label problems
///
/// ## Lattice Errors
/// - [`Error::InvalidSlotSize`] - A value was constructed with an impossible size class
/// - [`Error::SizeMismatch`] - Two values of different size classes were joined
///
/// ## Analysis Errors
/// - [`Error::MalformedGraph`] - The instruction stream is structurally broken (always fatal)
/// - [`Error::Frame`] - An instruction violated the stack/local shape (always fatal)
/// - [`Error::Simulation`] - Concrete execution failed (may be resolved by a validator)
///
/// ## Setup Errors
/// - [`Error::Configuration`] - The analyzer was configured inconsistently
///
/// # Examples
///
/// ```rust
/// use stackflow::{Analyzer, Error, MethodAssembler};
///
/// let mut asm = MethodAssembler::new("Demo", "broken", "()V")?;
/// asm.pop().return_void();
/// let method = asm.finish()?;
///
/// match Analyzer::new().analyze(&method) {
///     Err(Error::Frame { insn, source }) => println!("{insn}: {source}"),
///     Err(e) => println!("other error: {e}"),
///     Ok(_) => println!("analysis completed"),
/// }
/// # Ok::<(), stackflow::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input model is damaged and could not be used.
    ///
    /// Includes the source location where the malformation was detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A value or size class was constructed with a slot count other than 1 or 2.
    #[error("Invalid slot size {0} - values occupy one or two slots")]
    InvalidSlotSize(usize),

    /// Two lattice values with different size classes were joined.
    #[error("Cannot join values occupying {left} and {right} slots")]
    SizeMismatch {
        /// Slot count of the left operand
        left: usize,
        /// Slot count of the right operand
        right: usize,
    },

    /// A field or method descriptor could not be parsed.
    #[error("Invalid descriptor '{descriptor}' - {reason}")]
    InvalidDescriptor {
        /// The offending descriptor text
        descriptor: String,
        /// Why parsing stopped
        reason: String,
    },

    /// A label was defined twice in the same method.
    #[error("Label '{0}' is defined more than once")]
    DuplicateLabel(String),

    /// A branch or handler refers to a label that was never defined.
    #[error("Label '{0}' is referenced but never defined")]
    UndefinedLabel(String),

    /// The instruction stream is locally inconsistent.
    ///
    /// Raised for branch targets outside the code, handler ranges that make no sense, or
    /// execution running off the end of the method. Never offered to a validator.
    #[error("Malformed code at {insn}: {message}")]
    MalformedGraph {
        /// The instruction at which the problem was detected
        insn: InsnId,
        /// Description of the problem
        message: String,
    },

    /// An instruction does not fit the stack/local shape that reaches it.
    ///
    /// This is a malformed-graph error as well and is never offered to a validator.
    #[error("Invalid frame at {insn}: {source}")]
    Frame {
        /// The instruction whose transfer function failed
        insn: InsnId,
        /// The shape violation
        source: FrameError,
    },

    /// Concrete execution of an invocation failed.
    #[error(transparent)]
    Simulation(#[from] SimulationFailure),

    /// The analyzer configuration is inconsistent.
    #[error("Invalid analyzer configuration - {0}")]
    Configuration(String),
}

impl Error {
    /// Returns the instruction an analysis failure is attached to.
    ///
    /// Errors that are not tied to an instruction (descriptor parsing, configuration, lattice
    /// misuse) return `None`.
    #[must_use]
    pub fn insn(&self) -> Option<InsnId> {
        match self {
            Error::MalformedGraph { insn, .. } | Error::Frame { insn, .. } => Some(*insn),
            Error::Simulation(failure) => Some(failure.insn()),
            _ => None,
        }
    }

    /// Returns `true` if a validator may downgrade this failure instead of aborting the run.
    #[must_use]
    pub fn is_resolvable(&self) -> bool {
        matches!(self, Error::Simulation(_))
    }
}
