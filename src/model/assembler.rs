//! Label-based assembler for method bodies.
//!
//! [`MethodAssembler`] provides a small fluent interface for writing instruction streams by
//! hand: jumps and handler ranges refer to named labels that are resolved when the body is
//! finished. It is the main way tests, benchmarks and tooling without a decoder build
//! [`MethodBody`] values.
//!
//! Emitters return `&mut Self` so instructions can be chained. Errors raised while emitting
//! (for example an unparseable field descriptor) are held back and reported by
//! [`MethodAssembler::finish`], together with label problems.
//!
//! # Examples
//!
//! ```rust
//! use stackflow::{Condition, MethodAssembler};
//!
//! let mut asm = MethodAssembler::new("Demo", "abs", "(I)I")?;
//! asm.iload(0)
//!     .if_cond(Condition::Ge, "positive")
//!     .iload(0)
//!     .ineg()
//!     .ireturn()
//!     .label("positive")
//!     .iload(0)
//!     .ireturn();
//! let body = asm.finish()?;
//! assert_eq!(body.instructions.len(), 7);
//! # Ok::<(), stackflow::Error>(())
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    analysis::ConstValue,
    model::{
        BinaryOp, CompareOp, Condition, ExceptionHandler, FieldRef, InsnId, Instruction,
        InvokeKind, MethodAccess, MethodBody, MethodDescriptor, MethodRef, Narrow, ValueType,
    },
    Error, Result,
};

/// Where a label reference has to be patched in.
#[derive(Debug)]
enum Fixup {
    /// Branch at `position` jumping to `label`
    Branch { position: usize, label: String },
    /// Switch at `position` with one label for the default and one per case
    Switch {
        position: usize,
        default: String,
        cases: Vec<String>,
    },
}

#[derive(Debug)]
struct PendingHandler {
    start: String,
    end: String,
    handler: String,
    catch_type: Option<Arc<str>>,
}

/// Builds a [`MethodBody`] from instructions and named labels.
#[derive(Debug)]
pub struct MethodAssembler {
    owner: Arc<str>,
    name: Arc<str>,
    descriptor: MethodDescriptor,
    access: MethodAccess,
    max_locals: Option<u16>,
    max_stack: Option<u16>,
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    handlers: Vec<PendingHandler>,
    error: Option<Error>,
}

impl MethodAssembler {
    /// Starts assembling a static method.
    ///
    /// Use [`MethodAssembler::access`] to assemble an instance method instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `descriptor` is not a method descriptor.
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Result<Self> {
        Ok(MethodAssembler {
            owner: Arc::from(owner),
            name: Arc::from(name),
            descriptor: MethodDescriptor::parse(descriptor)?,
            access: MethodAccess::PUBLIC | MethodAccess::STATIC,
            max_locals: None,
            max_stack: None,
            instructions: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
            error: None,
        })
    }

    /// Replaces the access flags.
    pub fn access(&mut self, access: MethodAccess) -> &mut Self {
        self.access = access;
        self
    }

    /// Fixes the number of local slots instead of deriving it.
    pub fn max_locals(&mut self, max_locals: u16) -> &mut Self {
        self.max_locals = Some(max_locals);
        self
    }

    /// Limits the operand stack height.
    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = Some(max_stack);
        self
    }

    /// Binds `name` to the next instruction emitted.
    pub fn label(&mut self, name: &str) -> &mut Self {
        if self.labels.contains_key(name) {
            self.defer(Error::DuplicateLabel(name.to_string()));
        } else {
            self.labels.insert(name.to_string(), self.instructions.len());
        }
        self
    }

    /// Protects the instructions from label `start` up to (excluding) label `end` with a
    /// handler at label `handler`. `catch_type` of `None` catches everything.
    pub fn try_catch(
        &mut self,
        start: &str,
        end: &str,
        handler: &str,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.handlers.push(PendingHandler {
            start: start.to_string(),
            end: end.to_string(),
            handler: handler.to_string(),
            catch_type: catch_type.map(Arc::from),
        });
        self
    }

    /// Appends an instruction with already resolved operands.
    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    fn defer(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn emit_branch(&mut self, instruction: Instruction, label: &str) -> &mut Self {
        self.fixups.push(Fixup::Branch {
            position: self.instructions.len(),
            label: label.to_string(),
        });
        self.emit(instruction)
    }

    fn emit_field(
        &mut self,
        build: fn(FieldRef) -> Instruction,
        owner: &str,
        name: &str,
        desc: &str,
    ) -> &mut Self {
        match FieldRef::new(owner, name, desc) {
            Ok(field) => self.emit(build(field)),
            Err(e) => {
                self.defer(e);
                self
            }
        }
    }

    fn emit_invoke(&mut self, kind: InvokeKind, owner: &str, name: &str, desc: &str) -> &mut Self {
        match MethodRef::new(owner, name, desc) {
            Ok(method) => self.emit(Instruction::Invoke(kind, method)),
            Err(e) => {
                self.defer(e);
                self
            }
        }
    }

    /// `nop`
    pub fn nop(&mut self) -> &mut Self {
        self.emit(Instruction::Nop)
    }

    /// Pushes an `int` constant.
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.emit(Instruction::Const(ConstValue::Int(value)))
    }

    /// Pushes a `long` constant.
    pub fn lconst(&mut self, value: i64) -> &mut Self {
        self.emit(Instruction::Const(ConstValue::Long(value)))
    }

    /// Pushes a `float` constant.
    pub fn fconst(&mut self, value: f32) -> &mut Self {
        self.emit(Instruction::Const(ConstValue::Float(value)))
    }

    /// Pushes a `double` constant.
    pub fn dconst(&mut self, value: f64) -> &mut Self {
        self.emit(Instruction::Const(ConstValue::Double(value)))
    }

    /// Pushes a string constant.
    pub fn sconst(&mut self, value: &str) -> &mut Self {
        self.emit(Instruction::Const(ConstValue::String(Arc::from(value))))
    }

    /// Pushes a class literal.
    pub fn tconst(&mut self, class: &str) -> &mut Self {
        self.emit(Instruction::Const(ConstValue::Type(Arc::from(class))))
    }

    /// Pushes `null`.
    pub fn aconst_null(&mut self) -> &mut Self {
        self.emit(Instruction::Const(ConstValue::Null))
    }

    /// Pushes a local of the given type.
    pub fn load(&mut self, ty: ValueType, slot: u16) -> &mut Self {
        self.emit(Instruction::Load(ty, slot))
    }

    /// `iload`
    pub fn iload(&mut self, slot: u16) -> &mut Self {
        self.load(ValueType::Int, slot)
    }

    /// `lload`
    pub fn lload(&mut self, slot: u16) -> &mut Self {
        self.load(ValueType::Long, slot)
    }

    /// `aload`
    pub fn aload(&mut self, slot: u16) -> &mut Self {
        self.load(ValueType::Reference, slot)
    }

    /// Pops into a local of the given type.
    pub fn store(&mut self, ty: ValueType, slot: u16) -> &mut Self {
        self.emit(Instruction::Store(ty, slot))
    }

    /// `istore`
    pub fn istore(&mut self, slot: u16) -> &mut Self {
        self.store(ValueType::Int, slot)
    }

    /// `lstore`
    pub fn lstore(&mut self, slot: u16) -> &mut Self {
        self.store(ValueType::Long, slot)
    }

    /// `astore`
    pub fn astore(&mut self, slot: u16) -> &mut Self {
        self.store(ValueType::Reference, slot)
    }

    /// `iinc`
    pub fn iinc(&mut self, slot: u16, delta: i32) -> &mut Self {
        self.emit(Instruction::Iinc(slot, delta))
    }

    /// Binary operation on two values of type `ty`.
    pub fn binary(&mut self, ty: ValueType, op: BinaryOp) -> &mut Self {
        self.emit(Instruction::Binary(ty, op))
    }

    /// `iadd`
    pub fn iadd(&mut self) -> &mut Self {
        self.binary(ValueType::Int, BinaryOp::Add)
    }

    /// `isub`
    pub fn isub(&mut self) -> &mut Self {
        self.binary(ValueType::Int, BinaryOp::Sub)
    }

    /// `imul`
    pub fn imul(&mut self) -> &mut Self {
        self.binary(ValueType::Int, BinaryOp::Mul)
    }

    /// `idiv`
    pub fn idiv(&mut self) -> &mut Self {
        self.binary(ValueType::Int, BinaryOp::Div)
    }

    /// `ixor`
    pub fn ixor(&mut self) -> &mut Self {
        self.binary(ValueType::Int, BinaryOp::Xor)
    }

    /// `ladd`
    pub fn ladd(&mut self) -> &mut Self {
        self.binary(ValueType::Long, BinaryOp::Add)
    }

    /// Negates a value of type `ty`.
    pub fn neg(&mut self, ty: ValueType) -> &mut Self {
        self.emit(Instruction::Neg(ty))
    }

    /// `ineg`
    pub fn ineg(&mut self) -> &mut Self {
        self.neg(ValueType::Int)
    }

    /// Converts the top value between computational types.
    pub fn convert(&mut self, from: ValueType, to: ValueType) -> &mut Self {
        self.emit(Instruction::Convert(from, to))
    }

    /// `i2b` / `i2c` / `i2s`
    pub fn narrow(&mut self, to: Narrow) -> &mut Self {
        self.emit(Instruction::Narrow(to))
    }

    /// `lcmp`, `fcmpl`, ...
    pub fn compare(&mut self, op: CompareOp) -> &mut Self {
        self.emit(Instruction::Compare(op))
    }

    /// `pop`
    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instruction::Pop)
    }

    /// `pop2`
    pub fn pop2(&mut self) -> &mut Self {
        self.emit(Instruction::Pop2)
    }

    /// `dup`
    pub fn dup(&mut self) -> &mut Self {
        self.emit(Instruction::Dup)
    }

    /// `dup_x1`
    pub fn dup_x1(&mut self) -> &mut Self {
        self.emit(Instruction::DupX1)
    }

    /// `dup_x2`
    pub fn dup_x2(&mut self) -> &mut Self {
        self.emit(Instruction::DupX2)
    }

    /// `dup2`
    pub fn dup2(&mut self) -> &mut Self {
        self.emit(Instruction::Dup2)
    }

    /// `dup2_x1`
    pub fn dup2_x1(&mut self) -> &mut Self {
        self.emit(Instruction::Dup2X1)
    }

    /// `dup2_x2`
    pub fn dup2_x2(&mut self) -> &mut Self {
        self.emit(Instruction::Dup2X2)
    }

    /// `swap`
    pub fn swap(&mut self) -> &mut Self {
        self.emit(Instruction::Swap)
    }

    /// Pops one value and jumps to `label` if `cond` holds against zero or null.
    pub fn if_cond(&mut self, cond: Condition, label: &str) -> &mut Self {
        self.emit_branch(Instruction::If(cond, InsnId::new(0)), label)
    }

    /// Pops two values of type `ty` and jumps to `label` if `cond` holds.
    pub fn if_cmp(&mut self, ty: ValueType, cond: Condition, label: &str) -> &mut Self {
        self.emit_branch(Instruction::IfCmp(ty, cond, InsnId::new(0)), label)
    }

    /// Jumps to `label`.
    pub fn goto(&mut self, label: &str) -> &mut Self {
        self.emit_branch(Instruction::Goto(InsnId::new(0)), label)
    }

    /// Pops an `int` key and jumps to the label of the matching case, or to `default`.
    pub fn switch(&mut self, default: &str, cases: &[(i32, &str)]) -> &mut Self {
        self.fixups.push(Fixup::Switch {
            position: self.instructions.len(),
            default: default.to_string(),
            cases: cases.iter().map(|(_, label)| (*label).to_string()).collect(),
        });
        self.emit(Instruction::Switch {
            default: InsnId::new(0),
            cases: cases.iter().map(|(key, _)| (*key, InsnId::new(0))).collect(),
        })
    }

    /// Returns a value of type `ty`.
    pub fn return_value(&mut self, ty: ValueType) -> &mut Self {
        self.emit(Instruction::Return(Some(ty)))
    }

    /// `ireturn`
    pub fn ireturn(&mut self) -> &mut Self {
        self.return_value(ValueType::Int)
    }

    /// `areturn`
    pub fn areturn(&mut self) -> &mut Self {
        self.return_value(ValueType::Reference)
    }

    /// `return`
    pub fn return_void(&mut self) -> &mut Self {
        self.emit(Instruction::Return(None))
    }

    /// `athrow`
    pub fn throw(&mut self) -> &mut Self {
        self.emit(Instruction::Throw)
    }

    /// `getstatic owner.name:desc`
    pub fn getstatic(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_field(Instruction::GetStatic, owner, name, desc)
    }

    /// `putstatic owner.name:desc`
    pub fn putstatic(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_field(Instruction::PutStatic, owner, name, desc)
    }

    /// `getfield owner.name:desc`
    pub fn getfield(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_field(Instruction::GetField, owner, name, desc)
    }

    /// `putfield owner.name:desc`
    pub fn putfield(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_field(Instruction::PutField, owner, name, desc)
    }

    /// `invokestatic owner.name(desc)`
    pub fn invokestatic(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_invoke(InvokeKind::Static, owner, name, desc)
    }

    /// `invokevirtual owner.name(desc)`
    pub fn invokevirtual(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_invoke(InvokeKind::Virtual, owner, name, desc)
    }

    /// `invokespecial owner.name(desc)`
    pub fn invokespecial(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_invoke(InvokeKind::Special, owner, name, desc)
    }

    /// `invokeinterface owner.name(desc)`
    pub fn invokeinterface(&mut self, owner: &str, name: &str, desc: &str) -> &mut Self {
        self.emit_invoke(InvokeKind::Interface, owner, name, desc)
    }

    /// `new class`
    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.emit(Instruction::New(Arc::from(class)))
    }

    /// Allocates a one-dimensional array with element descriptor `element`.
    pub fn new_array(&mut self, element: &str) -> &mut Self {
        self.emit(Instruction::NewArray(Arc::from(element)))
    }

    /// `multianewarray desc dims`
    pub fn multi_new_array(&mut self, desc: &str, dims: u8) -> &mut Self {
        self.emit(Instruction::MultiNewArray(Arc::from(desc), dims))
    }

    /// `arraylength`
    pub fn array_length(&mut self) -> &mut Self {
        self.emit(Instruction::ArrayLength)
    }

    /// Loads an array element of type `ty`.
    pub fn array_load(&mut self, ty: ValueType) -> &mut Self {
        self.emit(Instruction::ArrayLoad(ty))
    }

    /// Stores an array element of type `ty`.
    pub fn array_store(&mut self, ty: ValueType) -> &mut Self {
        self.emit(Instruction::ArrayStore(ty))
    }

    /// `checkcast class`
    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        self.emit(Instruction::CheckCast(Arc::from(class)))
    }

    /// `instanceof class`
    pub fn instanceof(&mut self, class: &str) -> &mut Self {
        self.emit(Instruction::InstanceOf(Arc::from(class)))
    }

    /// `monitorenter`
    pub fn monitor_enter(&mut self) -> &mut Self {
        self.emit(Instruction::MonitorEnter)
    }

    /// `monitorexit`
    pub fn monitor_exit(&mut self) -> &mut Self {
        self.emit(Instruction::MonitorExit)
    }

    fn resolve(labels: &HashMap<String, usize>, label: &str) -> Result<InsnId> {
        labels
            .get(label)
            .map(|&position| InsnId::new(position))
            .ok_or_else(|| Error::UndefinedLabel(label.to_string()))
    }

    fn derived_max_locals(&self) -> Result<u16> {
        let arguments = usize::from(!self.access.contains(MethodAccess::STATIC))
            + self.descriptor.param_slots();
        let referenced = self
            .instructions
            .iter()
            .filter_map(|insn| match insn {
                Instruction::Load(ty, slot) | Instruction::Store(ty, slot) => {
                    Some(usize::from(*slot) + ty.size().slots())
                }
                Instruction::Iinc(slot, _) => Some(usize::from(*slot) + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        u16::try_from(arguments.max(referenced))
            .map_err(|_| malformed_error!("Local table of {} exceeds u16 range", self.name))
    }

    /// Resolves labels and produces the method body.
    ///
    /// # Errors
    ///
    /// Returns the first error deferred while emitting, [`Error::UndefinedLabel`] for a jump or
    /// handler naming an unknown label, and [`Error::Malformed`] if an explicit
    /// `max_locals` cannot hold the arguments.
    pub fn finish(mut self) -> Result<MethodBody> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        for fixup in std::mem::take(&mut self.fixups) {
            match fixup {
                Fixup::Branch { position, label } => {
                    let target = Self::resolve(&self.labels, &label)?;
                    match self.instructions.get_mut(position) {
                        Some(
                            Instruction::If(_, slot)
                            | Instruction::IfCmp(_, _, slot)
                            | Instruction::Goto(slot),
                        ) => *slot = target,
                        _ => return Err(malformed_error!("No branch at position {}", position)),
                    }
                }
                Fixup::Switch {
                    position,
                    default,
                    cases,
                } => {
                    let default_target = Self::resolve(&self.labels, &default)?;
                    let case_targets = cases
                        .iter()
                        .map(|label| Self::resolve(&self.labels, label))
                        .collect::<Result<Vec<_>>>()?;
                    match self.instructions.get_mut(position) {
                        Some(Instruction::Switch { default, cases }) => {
                            *default = default_target;
                            for ((_, target), resolved) in cases.iter_mut().zip(case_targets) {
                                *target = resolved;
                            }
                        }
                        _ => return Err(malformed_error!("No switch at position {}", position)),
                    }
                }
            }
        }

        let handlers = self
            .handlers
            .iter()
            .map(|pending| {
                Ok(ExceptionHandler {
                    start: Self::resolve(&self.labels, &pending.start)?,
                    end: Self::resolve(&self.labels, &pending.end)?,
                    handler: Self::resolve(&self.labels, &pending.handler)?,
                    catch_type: pending.catch_type.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let max_locals = match self.max_locals {
            Some(max_locals) => max_locals,
            None => self.derived_max_locals()?,
        };

        let body = MethodBody {
            owner: self.owner,
            name: self.name,
            descriptor: self.descriptor,
            access: self.access,
            max_locals,
            max_stack: self.max_stack,
            instructions: self.instructions,
            handlers,
        };
        body.check_locals()?;
        Ok(body)
    }
}
