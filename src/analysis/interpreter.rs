//! Abstract transfer functions.
//!
//! The [`Interpreter`] applies one instruction to a working copy of its entry frame, producing
//! the frame that flows to the instruction's normal successors. It consults the configured
//! factories for static field reads and static invocations, and the invocation host for
//! simulated execution.

use std::sync::Arc;

use log::warn;

use crate::{
    analysis::{
        ops, AbstractValue, AnalyzerConfig, ConstValue, Frame, FrameError, SimulatedValue,
        SimulationFailure, SlotSize, ValueKind,
    },
    model::{BinaryOp, FieldRef, InsnId, Instruction, InvokeKind, MethodRef, ValueType},
    Error, Result,
};

/// Why a transfer function could not complete.
enum Fault {
    Frame(FrameError),
    Simulation(SimulationFailure),
}

impl From<FrameError> for Fault {
    fn from(error: FrameError) -> Self {
        Fault::Frame(error)
    }
}

impl From<SimulationFailure> for Fault {
    fn from(failure: SimulationFailure) -> Self {
        Fault::Simulation(failure)
    }
}

type Step = std::result::Result<(), Fault>;

/// Executes instructions over abstract frames.
pub(crate) struct Interpreter<'a> {
    config: &'a AnalyzerConfig,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(config: &'a AnalyzerConfig) -> Self {
        Interpreter { config }
    }

    /// Applies `instruction` at `insn` to `frame`.
    ///
    /// On error the frame is left in an unspecified state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] when the instruction does not fit the frame, and
    /// [`Error::Simulation`] when realizing a static invocation fails.
    pub(crate) fn execute(
        &self,
        insn: InsnId,
        instruction: &Instruction,
        frame: &mut Frame,
    ) -> Result<()> {
        self.transfer(insn, instruction, frame)
            .map_err(|fault| match fault {
                Fault::Frame(source) => Error::Frame { insn, source },
                Fault::Simulation(failure) => Error::Simulation(failure),
            })
    }

    /// Replaces a failed invocation by its conservative effect: the arguments (and receiver)
    /// are consumed and an unresolved result is pushed for non-void methods.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] if the frame cannot supply the call's operands, and
    /// [`Error::Malformed`] if `instruction` is not an invocation.
    pub(crate) fn skip_invoke(
        insn: InsnId,
        instruction: &Instruction,
        frame: &mut Frame,
    ) -> Result<()> {
        let Instruction::Invoke(kind, method) = instruction else {
            return Err(malformed_error!("{} at {} is not an invocation", instruction, insn));
        };
        pop_arguments(method, frame)
            .and_then(|_| {
                if *kind != InvokeKind::Static {
                    frame.pop_sized(SlotSize::Single)?;
                }
                match unresolved_result(method) {
                    Some(value) => frame.push(value),
                    None => Ok(()),
                }
            })
            .map_err(|source| Error::Frame { insn, source })
    }

    fn transfer(&self, insn: InsnId, instruction: &Instruction, frame: &mut Frame) -> Step {
        match instruction {
            // ================================================================
            // Constants and locals
            // ================================================================
            Instruction::Nop => {}
            Instruction::Const(value) => frame.push(AbstractValue::Constant(value.clone()))?,
            Instruction::Load(ty, slot) => {
                let value = frame.local(usize::from(*slot))?.clone();
                if value.size() != ty.size() {
                    return Err(FrameError::WrongSize {
                        expected: ty.size(),
                        found: value.size(),
                    }
                    .into());
                }
                frame.push(value)?;
            }
            Instruction::Store(ty, slot) => {
                let value = frame.pop_sized(ty.size())?;
                frame.set_local(usize::from(*slot), value)?;
            }
            Instruction::Iinc(slot, delta) => {
                let slot = usize::from(*slot);
                let current = frame.local(slot)?;
                if current.size() != SlotSize::Single {
                    return Err(FrameError::WrongSize {
                        expected: SlotSize::Single,
                        found: current.size(),
                    }
                    .into());
                }
                let result = current.as_const().and_then(|value| {
                    ops::binary(ValueType::Int, BinaryOp::Add, value, &ConstValue::Int(*delta))
                });
                frame.set_local(slot, folded(result, SlotSize::Single))?;
            }

            // ================================================================
            // Arithmetic, conversions and comparisons
            // ================================================================
            Instruction::Binary(ty, op) => {
                let rhs_size = if op.is_shift() {
                    SlotSize::Single
                } else {
                    ty.size()
                };
                let rhs = frame.pop_sized(rhs_size)?;
                let lhs = frame.pop_sized(ty.size())?;
                let result = both_const(&lhs, &rhs).and_then(|(l, r)| ops::binary(*ty, *op, l, r));
                frame.push(folded(result, ty.size()))?;
            }
            Instruction::Neg(ty) => {
                let value = frame.pop_sized(ty.size())?;
                let result = value.as_const().and_then(|v| ops::negate(*ty, v));
                frame.push(folded(result, ty.size()))?;
            }
            Instruction::Convert(from, to) => {
                let value = frame.pop_sized(from.size())?;
                let result = value.as_const().and_then(|v| ops::convert(*from, *to, v));
                frame.push(folded(result, to.size()))?;
            }
            Instruction::Narrow(to) => {
                let value = frame.pop_sized(SlotSize::Single)?;
                let result = value.as_const().and_then(|v| ops::narrow(*to, v));
                frame.push(folded(result, SlotSize::Single))?;
            }
            Instruction::Compare(op) => {
                let size = op.operand_type().size();
                let rhs = frame.pop_sized(size)?;
                let lhs = frame.pop_sized(size)?;
                let result = both_const(&lhs, &rhs).and_then(|(l, r)| ops::compare(*op, l, r));
                frame.push(folded(result, SlotSize::Single))?;
            }

            // ================================================================
            // Stack manipulation
            // ================================================================
            Instruction::Pop => {
                frame.pop_sized(SlotSize::Single)?;
            }
            Instruction::Pop2 => {
                if frame.pop()?.size() == SlotSize::Single {
                    frame.pop_sized(SlotSize::Single)?;
                }
            }
            Instruction::Dup => {
                let top = frame.pop_sized(SlotSize::Single)?;
                push_all(frame, [top.clone(), top])?;
            }
            Instruction::DupX1 => {
                let v1 = frame.pop_sized(SlotSize::Single)?;
                let v2 = frame.pop_sized(SlotSize::Single)?;
                push_all(frame, [v1.clone(), v2, v1])?;
            }
            Instruction::DupX2 => {
                let v1 = frame.pop_sized(SlotSize::Single)?;
                let v2 = frame.pop()?;
                if v2.size() == SlotSize::Double {
                    push_all(frame, [v1.clone(), v2, v1])?;
                } else {
                    let v3 = frame.pop_sized(SlotSize::Single)?;
                    push_all(frame, [v1.clone(), v3, v2, v1])?;
                }
            }
            Instruction::Dup2 => {
                let v1 = frame.pop()?;
                if v1.size() == SlotSize::Double {
                    push_all(frame, [v1.clone(), v1])?;
                } else {
                    let v2 = frame.pop_sized(SlotSize::Single)?;
                    push_all(frame, [v2.clone(), v1.clone(), v2, v1])?;
                }
            }
            Instruction::Dup2X1 => {
                let v1 = frame.pop()?;
                if v1.size() == SlotSize::Double {
                    let v2 = frame.pop_sized(SlotSize::Single)?;
                    push_all(frame, [v1.clone(), v2, v1])?;
                } else {
                    let v2 = frame.pop_sized(SlotSize::Single)?;
                    let v3 = frame.pop_sized(SlotSize::Single)?;
                    push_all(frame, [v2.clone(), v1.clone(), v3, v2, v1])?;
                }
            }
            Instruction::Dup2X2 => {
                let v1 = frame.pop()?;
                if v1.size() == SlotSize::Double {
                    let v2 = frame.pop()?;
                    if v2.size() == SlotSize::Double {
                        push_all(frame, [v1.clone(), v2, v1])?;
                    } else {
                        let v3 = frame.pop_sized(SlotSize::Single)?;
                        push_all(frame, [v1.clone(), v3, v2, v1])?;
                    }
                } else {
                    let v2 = frame.pop_sized(SlotSize::Single)?;
                    let v3 = frame.pop()?;
                    if v3.size() == SlotSize::Double {
                        push_all(frame, [v2.clone(), v1.clone(), v3, v2, v1])?;
                    } else {
                        let v4 = frame.pop_sized(SlotSize::Single)?;
                        push_all(frame, [v2.clone(), v1.clone(), v4, v3, v2, v1])?;
                    }
                }
            }
            Instruction::Swap => {
                let v1 = frame.pop_sized(SlotSize::Single)?;
                let v2 = frame.pop_sized(SlotSize::Single)?;
                push_all(frame, [v1, v2])?;
            }

            // ================================================================
            // Control flow
            // ================================================================
            Instruction::If(..) | Instruction::Switch { .. } | Instruction::Throw => {
                frame.pop_sized(SlotSize::Single)?;
            }
            Instruction::IfCmp(ty, ..) => {
                frame.pop_sized(ty.size())?;
                frame.pop_sized(ty.size())?;
            }
            Instruction::Goto(_) | Instruction::Return(None) => {}
            Instruction::Return(Some(ty)) => {
                frame.pop_sized(ty.size())?;
            }

            // ================================================================
            // Fields
            // ================================================================
            Instruction::GetStatic(field) => {
                let value = self.get_static(field);
                frame.push(value)?;
            }
            Instruction::PutStatic(field) => {
                frame.pop_sized(field.descriptor.size())?;
            }
            Instruction::GetField(field) => {
                frame.pop_sized(SlotSize::Single)?;
                frame.push(AbstractValue::Unresolved(field.descriptor.size()))?;
            }
            Instruction::PutField(field) => {
                frame.pop_sized(field.descriptor.size())?;
                frame.pop_sized(SlotSize::Single)?;
            }

            // ================================================================
            // Invocations
            // ================================================================
            Instruction::Invoke(kind, method) => {
                let args = pop_arguments(method, frame)?;
                let result = if *kind == InvokeKind::Static {
                    self.invoke_static(insn, method, &args)?
                } else {
                    frame.pop_sized(SlotSize::Single)?;
                    unresolved_result(method)
                };
                if let Some(value) = result {
                    frame.push(value)?;
                }
            }

            // ================================================================
            // Objects and arrays
            // ================================================================
            Instruction::New(class) => frame.push(AbstractValue::Reference(Arc::clone(class)))?,
            Instruction::NewArray(element) => {
                frame.pop_sized(SlotSize::Single)?;
                frame.push(AbstractValue::Reference(Arc::from(format!("[{element}"))))?;
            }
            Instruction::MultiNewArray(desc, dims) => {
                for _ in 0..*dims {
                    frame.pop_sized(SlotSize::Single)?;
                }
                frame.push(AbstractValue::Reference(Arc::clone(desc)))?;
            }
            Instruction::ArrayLength => {
                frame.pop_sized(SlotSize::Single)?;
                frame.push(AbstractValue::Unresolved(SlotSize::Single))?;
            }
            Instruction::ArrayLoad(ty) => {
                frame.pop_sized(SlotSize::Single)?;
                frame.pop_sized(SlotSize::Single)?;
                frame.push(AbstractValue::unknown(*ty))?;
            }
            Instruction::ArrayStore(ty) => {
                frame.pop_sized(ty.size())?;
                frame.pop_sized(SlotSize::Single)?;
                frame.pop_sized(SlotSize::Single)?;
            }
            Instruction::CheckCast(_) => {
                let value = frame.pop_sized(SlotSize::Single)?;
                frame.push(value)?;
            }
            Instruction::InstanceOf(class) => {
                let value = frame.pop_sized(SlotSize::Single)?;
                frame.push(instance_of(&value, class))?;
            }
            Instruction::MonitorEnter | Instruction::MonitorExit => {
                frame.pop_sized(SlotSize::Single)?;
            }
        }
        Ok(())
    }

    fn get_static(&self, field: &FieldRef) -> AbstractValue {
        let size = field.descriptor.size();
        let Some(factory) = &self.config.static_get else {
            return AbstractValue::Unresolved(size);
        };
        let value = factory.get_static(field);
        if value.size() == size {
            value
        } else {
            warn!("Static get factory answered {value} for {field}, expected a {size}-slot value");
            AbstractValue::Unresolved(size)
        }
    }

    /// Resolves a static call: factory first, then simulated execution when the factory is
    /// absent or could not settle the result.
    fn invoke_static(
        &self,
        insn: InsnId,
        method: &MethodRef,
        args: &[AbstractValue],
    ) -> std::result::Result<Option<AbstractValue>, SimulationFailure> {
        let answer = match &self.config.static_invoke {
            Some(factory) => {
                let answer = checked_answer(method, factory.invoke_static(method, args));
                if !matches!(answer, Some(AbstractValue::Unresolved(_))) {
                    return Ok(answer);
                }
                answer
            }
            None => unresolved_result(method),
        };

        if self.config.value_kind == ValueKind::Simulated {
            if let (Some(host), Some(host_args)) = (
                &self.config.host,
                SimulatedValue::concrete_arguments(args),
            ) {
                return SimulatedValue::realize(insn, method, &host_args, host.as_ref());
            }
        }
        Ok(answer)
    }
}

/// Pops a call's arguments, returning them in declaration order.
fn pop_arguments(
    method: &MethodRef,
    frame: &mut Frame,
) -> std::result::Result<Vec<AbstractValue>, FrameError> {
    let mut args = method
        .descriptor
        .params
        .iter()
        .rev()
        .map(|param| frame.pop_sized(param.size()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    args.reverse();
    Ok(args)
}

fn push_all<const N: usize>(
    frame: &mut Frame,
    values: [AbstractValue; N],
) -> std::result::Result<(), FrameError> {
    values.into_iter().try_for_each(|value| frame.push(value))
}

fn both_const<'v>(
    lhs: &'v AbstractValue,
    rhs: &'v AbstractValue,
) -> Option<(&'v ConstValue, &'v ConstValue)> {
    Some((lhs.as_const()?, rhs.as_const()?))
}

fn folded(result: Option<ConstValue>, size: SlotSize) -> AbstractValue {
    result.map_or(AbstractValue::Unresolved(size), AbstractValue::Constant)
}

fn unresolved_result(method: &MethodRef) -> Option<AbstractValue> {
    method
        .descriptor
        .ret
        .as_ref()
        .map(|ret| AbstractValue::Unresolved(ret.size()))
}

/// Forces a factory answer into the shape the descriptor demands.
fn checked_answer(method: &MethodRef, answer: Option<AbstractValue>) -> Option<AbstractValue> {
    match (&method.descriptor.ret, answer) {
        (None, None) => None,
        (None, Some(value)) => {
            warn!("Static invoke factory answered {value} for void method {method}");
            None
        }
        (Some(ret), None) => {
            warn!("Static invoke factory gave no value for {method}");
            Some(AbstractValue::Unresolved(ret.size()))
        }
        (Some(ret), Some(value)) if value.size() != ret.size() => {
            warn!(
                "Static invoke factory answered {value} for {method}, expected a {}-slot value",
                ret.size()
            );
            Some(AbstractValue::Unresolved(ret.size()))
        }
        (Some(_), Some(value)) => Some(value),
    }
}

fn instance_of(value: &AbstractValue, class: &str) -> AbstractValue {
    let known = match value {
        AbstractValue::Constant(ConstValue::Null) => Some(false),
        AbstractValue::Constant(ConstValue::String(_)) if class == "java/lang/String" => {
            Some(true)
        }
        AbstractValue::Reference(actual) if &**actual == class => Some(true),
        _ => None,
    };
    known.map_or(AbstractValue::Unresolved(SlotSize::Single), |is| {
        AbstractValue::Constant(ConstValue::Int(i32::from(is)))
    })
}
