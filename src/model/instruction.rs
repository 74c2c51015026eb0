//! Stack-machine instruction representation.
//!
//! Instructions reference each other by [`InsnId`], the position of the instruction inside its
//! method body. Branch targets are already resolved; [`crate::model::MethodAssembler`] turns
//! labels into ids when a body is assembled by hand.
//!
//! # Key Components
//!
//! - [`InsnId`] - Identity of a single instruction, used to key frames and failures
//! - [`Instruction`] - The closed set of instructions the analyzer understands
//! - [`ValueType`] - Computational type of a stack or local value
//! - [`FlowType`] - Control flow behavior classification

use std::fmt;

use crate::{
    analysis::{ConstValue, SlotSize},
    model::{FieldRef, MethodRef},
};

/// Identity of an instruction inside a method body.
///
/// Wraps the 0-based position of the instruction in [`crate::model::MethodBody::instructions`].
/// Every frame produced by the analyzer and every analysis failure is keyed by an `InsnId`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InsnId(pub(crate) usize);

impl InsnId {
    /// Creates an instruction id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        InsnId(index)
    }

    /// Returns the raw index of this instruction.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns the id of the instruction that follows this one in code order.
    #[must_use]
    #[inline]
    pub const fn next(self) -> Self {
        InsnId(self.0 + 1)
    }
}

impl fmt::Debug for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InsnId({})", self.0)
    }
}

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<usize> for InsnId {
    #[inline]
    fn from(index: usize) -> Self {
        InsnId(index)
    }
}

/// Computational type of a value on the operand stack or in a local slot.
///
/// Sub-int types (`byte`, `char`, `short`, `boolean`) are computed as [`ValueType::Int`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ValueType {
    /// 32-bit integer
    Int,
    /// 64-bit integer, occupies two slots
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float, occupies two slots
    Double,
    /// Object or array reference (including null)
    Reference,
}

impl ValueType {
    /// Number of slots a value of this type occupies.
    #[must_use]
    pub const fn size(self) -> SlotSize {
        match self {
            ValueType::Long | ValueType::Double => SlotSize::Double,
            _ => SlotSize::Single,
        }
    }
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Remainder
    Rem,
    /// Shift left
    Shl,
    /// Arithmetic shift right
    Shr,
    /// Logical shift right
    Ushr,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
}

impl BinaryOp {
    /// Shift operators take an `int` distance regardless of the shifted value's type.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }
}

/// Comparison instructions producing -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CompareOp {
    /// Compare two longs
    Lcmp,
    /// Compare two floats, NaN yields -1
    Fcmpl,
    /// Compare two floats, NaN yields 1
    Fcmpg,
    /// Compare two doubles, NaN yields -1
    Dcmpl,
    /// Compare two doubles, NaN yields 1
    Dcmpg,
}

impl CompareOp {
    /// Type of both operands.
    #[must_use]
    pub const fn operand_type(self) -> ValueType {
        match self {
            CompareOp::Lcmp => ValueType::Long,
            CompareOp::Fcmpl | CompareOp::Fcmpg => ValueType::Float,
            CompareOp::Dcmpl | CompareOp::Dcmpg => ValueType::Double,
        }
    }
}

/// Narrowing of an `int` to a smaller integral type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Narrow {
    /// `i2b`
    Byte,
    /// `i2c`
    Char,
    /// `i2s`
    Short,
}

/// Branch condition.
///
/// `Null`/`NonNull` only apply to references; `Eq`/`Ne` apply to both ints and references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Condition {
    /// Equal (to zero, or to the second operand)
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Greater or equal
    Ge,
    /// Greater than
    Gt,
    /// Less or equal
    Le,
    /// Reference is null
    Null,
    /// Reference is not null
    NonNull,
}

/// Dispatch kind of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum InvokeKind {
    /// Static call, no receiver
    Static,
    /// Virtual dispatch on the receiver
    Virtual,
    /// Constructor, private or super call
    Special,
    /// Interface dispatch on the receiver
    Interface,
}

/// Control flow behavior of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Continues with the next instruction
    Sequential,
    /// Either jumps to its target or continues with the next instruction
    ConditionalBranch,
    /// Always jumps to its target
    UnconditionalBranch,
    /// Jumps to one of several targets
    Switch,
    /// Leaves the method normally
    Return,
    /// Leaves the method (or enters a handler) by throwing
    Throw,
}

/// A single instruction of the stack machine.
///
/// The set is closed: the analyzer's transfer function matches over every variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Does nothing
    Nop,
    /// Pushes a constant (`iconst`, `bipush`, `ldc`, `aconst_null`, ...)
    Const(ConstValue),
    /// Pushes the value of a local slot
    Load(ValueType, u16),
    /// Pops a value into a local slot
    Store(ValueType, u16),
    /// Adds a constant to an `int` local
    Iinc(u16, i32),
    /// Pops two operands and pushes the result
    Binary(ValueType, BinaryOp),
    /// Negates the top value
    Neg(ValueType),
    /// Converts the top value between computational types (from, to)
    Convert(ValueType, ValueType),
    /// Truncates the top `int` to a smaller integral type
    Narrow(Narrow),
    /// Compares two values, pushing -1, 0 or 1
    Compare(CompareOp),
    /// Pops a one-slot value
    Pop,
    /// Pops one two-slot value or two one-slot values
    Pop2,
    /// Duplicates the top one-slot value
    Dup,
    /// Duplicates the top value and inserts it two slots down
    DupX1,
    /// Duplicates the top value and inserts it three slots down
    DupX2,
    /// Duplicates the top two slots
    Dup2,
    /// Duplicates the top two slots and inserts them three slots down
    Dup2X1,
    /// Duplicates the top two slots and inserts them four slots down
    Dup2X2,
    /// Swaps the top two one-slot values
    Swap,
    /// Pops one value and branches if the condition holds against zero/null
    If(Condition, InsnId),
    /// Pops two values of the given type and branches if the condition holds
    IfCmp(ValueType, Condition, InsnId),
    /// Unconditional jump
    Goto(InsnId),
    /// Pops an `int` key and jumps to the matching case or the default
    Switch {
        /// Target when no case matches
        default: InsnId,
        /// Case keys and their targets
        cases: Vec<(i32, InsnId)>,
    },
    /// Returns from the method, popping a value unless `None`
    Return(Option<ValueType>),
    /// Pops a reference and throws it
    Throw,
    /// Pushes the value of a static field
    GetStatic(FieldRef),
    /// Pops a value into a static field
    PutStatic(FieldRef),
    /// Pops a reference and pushes the value of one of its fields
    GetField(FieldRef),
    /// Pops a value and a reference and stores into a field
    PutField(FieldRef),
    /// Invokes a method
    Invoke(InvokeKind, MethodRef),
    /// Allocates an instance of the named class
    New(std::sync::Arc<str>),
    /// Pops a length and allocates a one-dimensional array with the given element descriptor
    NewArray(std::sync::Arc<str>),
    /// Pops the given number of lengths and allocates a multi-dimensional array
    MultiNewArray(std::sync::Arc<str>, u8),
    /// Pops an array reference and pushes its length
    ArrayLength,
    /// Pops an index and array reference and pushes the element
    ArrayLoad(ValueType),
    /// Pops a value, index and array reference and stores the element
    ArrayStore(ValueType),
    /// Checks that the top reference is an instance of the named type
    CheckCast(std::sync::Arc<str>),
    /// Pops a reference and pushes whether it is an instance of the named type
    InstanceOf(std::sync::Arc<str>),
    /// Pops a reference and enters its monitor
    MonitorEnter,
    /// Pops a reference and exits its monitor
    MonitorExit,
}

impl Instruction {
    /// Classifies how control leaves this instruction.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        match self {
            Instruction::If(..) | Instruction::IfCmp(..) => FlowType::ConditionalBranch,
            Instruction::Goto(_) => FlowType::UnconditionalBranch,
            Instruction::Switch { .. } => FlowType::Switch,
            Instruction::Return(_) => FlowType::Return,
            Instruction::Throw => FlowType::Throw,
            _ => FlowType::Sequential,
        }
    }

    /// Returns the explicit jump targets of this instruction, in operand order.
    ///
    /// Fall-through is not included; use [`Instruction::falls_through`] for that.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<InsnId> {
        match self {
            Instruction::If(_, target)
            | Instruction::IfCmp(_, _, target)
            | Instruction::Goto(target) => vec![*target],
            Instruction::Switch { default, cases } => {
                let mut targets = Vec::with_capacity(cases.len() + 1);
                targets.push(*default);
                targets.extend(cases.iter().map(|(_, target)| *target));
                targets
            }
            _ => Vec::new(),
        }
    }

    /// Returns `true` if control can continue with the next instruction in code order.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::Sequential | FlowType::ConditionalBranch
        )
    }

    /// Returns `true` if control never continues past this instruction in code order.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        !matches!(self.flow_type(), FlowType::Sequential)
    }

    /// Short lowercase mnemonic, used in log output.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Nop => "nop",
            Instruction::Const(_) => "const",
            Instruction::Load(..) => "load",
            Instruction::Store(..) => "store",
            Instruction::Iinc(..) => "iinc",
            Instruction::Binary(..) => "binary",
            Instruction::Neg(_) => "neg",
            Instruction::Convert(..) => "convert",
            Instruction::Narrow(_) => "narrow",
            Instruction::Compare(_) => "compare",
            Instruction::Pop => "pop",
            Instruction::Pop2 => "pop2",
            Instruction::Dup => "dup",
            Instruction::DupX1 => "dup_x1",
            Instruction::DupX2 => "dup_x2",
            Instruction::Dup2 => "dup2",
            Instruction::Dup2X1 => "dup2_x1",
            Instruction::Dup2X2 => "dup2_x2",
            Instruction::Swap => "swap",
            Instruction::If(..) => "if",
            Instruction::IfCmp(..) => "if_cmp",
            Instruction::Goto(_) => "goto",
            Instruction::Switch { .. } => "switch",
            Instruction::Return(_) => "return",
            Instruction::Throw => "athrow",
            Instruction::GetStatic(_) => "getstatic",
            Instruction::PutStatic(_) => "putstatic",
            Instruction::GetField(_) => "getfield",
            Instruction::PutField(_) => "putfield",
            Instruction::Invoke(InvokeKind::Static, _) => "invokestatic",
            Instruction::Invoke(InvokeKind::Virtual, _) => "invokevirtual",
            Instruction::Invoke(InvokeKind::Special, _) => "invokespecial",
            Instruction::Invoke(InvokeKind::Interface, _) => "invokeinterface",
            Instruction::New(_) => "new",
            Instruction::NewArray(_) => "newarray",
            Instruction::MultiNewArray(..) => "multianewarray",
            Instruction::ArrayLength => "arraylength",
            Instruction::ArrayLoad(_) => "arrayload",
            Instruction::ArrayStore(_) => "arraystore",
            Instruction::CheckCast(_) => "checkcast",
            Instruction::InstanceOf(_) => "instanceof",
            Instruction::MonitorEnter => "monitorenter",
            Instruction::MonitorExit => "monitorexit",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Const(value) => write!(f, "const {value}"),
            Instruction::Load(ty, slot) => write!(f, "load {ty} {slot}"),
            Instruction::Store(ty, slot) => write!(f, "store {ty} {slot}"),
            Instruction::Iinc(slot, delta) => write!(f, "iinc {slot} {delta}"),
            Instruction::Binary(ty, op) => write!(f, "{op} {ty}"),
            Instruction::Neg(ty) => write!(f, "neg {ty}"),
            Instruction::Convert(from, to) => write!(f, "convert {from} -> {to}"),
            Instruction::Narrow(to) => write!(f, "narrow {to}"),
            Instruction::Compare(op) => write!(f, "{op}"),
            Instruction::If(cond, target) => write!(f, "if {cond} {target}"),
            Instruction::IfCmp(ty, cond, target) => write!(f, "if_cmp {ty} {cond} {target}"),
            Instruction::Goto(target) => write!(f, "goto {target}"),
            Instruction::Switch { default, cases } => {
                write!(f, "switch default {default}")?;
                for (key, target) in cases {
                    write!(f, ", {key} => {target}")?;
                }
                Ok(())
            }
            Instruction::Return(Some(ty)) => write!(f, "return {ty}"),
            Instruction::GetStatic(field)
            | Instruction::PutStatic(field)
            | Instruction::GetField(field)
            | Instruction::PutField(field) => write!(f, "{} {field}", self.mnemonic()),
            Instruction::Invoke(_, method) => write!(f, "{} {method}", self.mnemonic()),
            Instruction::New(class)
            | Instruction::NewArray(class)
            | Instruction::CheckCast(class)
            | Instruction::InstanceOf(class) => write!(f, "{} {class}", self.mnemonic()),
            Instruction::MultiNewArray(desc, dims) => write!(f, "multianewarray {desc} {dims}"),
            Instruction::ArrayLoad(ty) => write!(f, "arrayload {ty}"),
            Instruction::ArrayStore(ty) => write!(f, "arraystore {ty}"),
            _ => f.write_str(self.mnemonic()),
        }
    }
}
