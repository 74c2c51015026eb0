//! Stack and local variable snapshots.
//!
//! A [`Frame`] records what is known about the operand stack and the local variable slots on
//! entry to one instruction. During the fixed-point iteration frames are mutated in place and
//! merged at control flow joins; once the analysis completes they are read-only.
//!
//! Two-slot values occupy a single entry on the stack (the stack depth limit is still counted
//! in slots) but two entries in the local table: the value sits in the lower slot and the
//! upper slot is left empty.

use std::fmt;

use thiserror::Error;

use crate::analysis::{AbstractValue, JoinSemiLattice, SlotSize};

/// A stack or local shape violation detected while applying an instruction to a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A value was popped from an empty stack.
    #[error("Operand stack underflow")]
    StackUnderflow,

    /// A push exceeded the declared stack limit.
    #[error("Operand stack overflow - limit is {max} slots")]
    StackOverflow {
        /// Declared limit in slots
        max: usize,
    },

    /// A local slot index outside the local table.
    #[error("Local {index} is outside the local table of {max_locals} slots")]
    InvalidLocal {
        /// Requested slot
        index: usize,
        /// Size of the local table
        max_locals: usize,
    },

    /// A read of a local that holds no value (never written, or clobbered).
    #[error("Local {0} holds no value")]
    EmptyLocal(usize),

    /// A value of the wrong width was found where an instruction expected another.
    #[error("Expected a {expected}-slot value, found a {found}-slot value")]
    WrongSize {
        /// Width the instruction requires
        expected: SlotSize,
        /// Width actually present
        found: SlotSize,
    },

    /// Two frames reaching the same instruction disagree on the stack shape.
    #[error("Incompatible stacks at merge - {left} vs {right}")]
    IncompatibleStacks {
        /// Rendering of the current stack
        left: String,
        /// Rendering of the incoming stack
        right: String,
    },
}

/// Snapshot of the operand stack and local variable table at one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    locals: Vec<Option<AbstractValue>>,
    stack: Vec<AbstractValue>,
    max_stack: Option<usize>,
}

impl Frame {
    /// Creates a frame with `max_locals` empty locals and an empty stack.
    #[must_use]
    pub fn new(max_locals: usize, max_stack: Option<usize>) -> Self {
        Frame {
            locals: vec![None; max_locals],
            stack: Vec::new(),
            max_stack,
        }
    }

    /// The local table; `None` marks an empty slot or the upper half of a two-slot value.
    #[must_use]
    pub fn locals(&self) -> &[Option<AbstractValue>] {
        &self.locals
    }

    /// The operand stack, top of stack last.
    #[must_use]
    pub fn stack(&self) -> &[AbstractValue] {
        &self.stack
    }

    /// Number of values on the stack.
    #[must_use]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Stack height in slots.
    #[must_use]
    pub fn stack_slots(&self) -> usize {
        self.stack.iter().map(|v| v.size().slots()).sum()
    }

    /// The value `depth` entries below the top of the stack (0 is the top).
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<&AbstractValue> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|index| self.stack.get(index))
    }

    /// Returns the top of the stack.
    #[must_use]
    pub fn top(&self) -> Option<&AbstractValue> {
        self.peek(0)
    }

    /// Pushes a value.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::StackOverflow`] if the push exceeds the declared limit.
    pub fn push(&mut self, value: AbstractValue) -> Result<(), FrameError> {
        if let Some(max) = self.max_stack {
            if self.stack_slots() + value.size().slots() > max {
                return Err(FrameError::StackOverflow { max });
            }
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops the top value.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::StackUnderflow`] on an empty stack.
    pub fn pop(&mut self) -> Result<AbstractValue, FrameError> {
        self.stack.pop().ok_or(FrameError::StackUnderflow)
    }

    /// Pops the top value, checking its width.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::StackUnderflow`] on an empty stack and
    /// [`FrameError::WrongSize`] if the value has another width.
    pub fn pop_sized(&mut self, expected: SlotSize) -> Result<AbstractValue, FrameError> {
        let value = self.pop()?;
        if value.size() != expected {
            return Err(FrameError::WrongSize {
                expected,
                found: value.size(),
            });
        }
        Ok(value)
    }

    /// Pops `count` values, returning them in push order.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::StackUnderflow`] if fewer than `count` values are present.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<AbstractValue>, FrameError> {
        let split = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(FrameError::StackUnderflow)?;
        Ok(self.stack.split_off(split))
    }

    /// Removes every value from the stack.
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Reads a local.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidLocal`] for an index outside the table and
    /// [`FrameError::EmptyLocal`] if the slot holds no value.
    pub fn local(&self, index: usize) -> Result<&AbstractValue, FrameError> {
        self.locals
            .get(index)
            .ok_or(FrameError::InvalidLocal {
                index,
                max_locals: self.locals.len(),
            })?
            .as_ref()
            .ok_or(FrameError::EmptyLocal(index))
    }

    /// Writes a local.
    ///
    /// A two-slot value also claims the following slot. A two-slot value that overlapped the
    /// written slot from below is invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidLocal`] if the value does not fit in the table.
    pub fn set_local(&mut self, index: usize, value: AbstractValue) -> Result<(), FrameError> {
        let width = value.size().slots();
        if index + width > self.locals.len() {
            return Err(FrameError::InvalidLocal {
                index: index + width - 1,
                max_locals: self.locals.len(),
            });
        }

        if index > 0 {
            let below = &mut self.locals[index - 1];
            if below.as_ref().is_some_and(|v| v.size() == SlotSize::Double) {
                *below = None;
            }
        }
        if width == 2 {
            self.locals[index + 1] = None;
        }
        self.locals[index] = Some(value);
        Ok(())
    }

    /// Joins `other` into this frame.
    ///
    /// Locals whose widths disagree, or that are empty on either side, become empty.
    /// Returns whether this frame changed.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::IncompatibleStacks`] if the stacks differ in height or in the
    /// width of any entry.
    pub fn merge(&mut self, other: &Frame) -> Result<bool, FrameError> {
        let incompatible = || FrameError::IncompatibleStacks {
            left: render_values(&self.stack),
            right: render_values(&other.stack),
        };
        if self.stack.len() != other.stack.len() {
            return Err(incompatible());
        }
        let mut stack = Vec::with_capacity(self.stack.len());
        for (mine, theirs) in self.stack.iter().zip(&other.stack) {
            stack.push(mine.join(theirs).map_err(|_| incompatible())?);
        }

        let mut changed = stack != self.stack;
        self.stack = stack;

        for (mine, theirs) in self.locals.iter_mut().zip(&other.locals) {
            let joined = match (mine.as_ref(), theirs) {
                (Some(a), Some(b)) => a.join(b).ok(),
                _ => None,
            };
            if *mine != joined {
                *mine = joined;
                changed = true;
            }
        }
        Ok(changed)
    }
}

fn render_values(values: &[AbstractValue]) -> String {
    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("locals [")?;
        for (index, local) in self.locals.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match local {
                Some(value) => write!(f, "{value}")?,
                None => f.write_str("-")?,
            }
        }
        write!(f, "] stack {}", render_values(&self.stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ConstValue;

    fn int(v: i32) -> AbstractValue {
        AbstractValue::Constant(ConstValue::Int(v))
    }

    fn long(v: i64) -> AbstractValue {
        AbstractValue::Constant(ConstValue::Long(v))
    }

    #[test]
    fn test_push_pop() {
        let mut frame = Frame::new(0, Some(3));
        frame.push(int(1)).unwrap();
        frame.push(long(2)).unwrap();
        assert_eq!(frame.stack_slots(), 3);
        assert_eq!(
            frame.push(int(3)),
            Err(FrameError::StackOverflow { max: 3 })
        );
        assert_eq!(frame.top(), Some(&long(2)));
        assert_eq!(frame.peek(1), Some(&int(1)));
        assert_eq!(
            frame.pop_sized(SlotSize::Single),
            Err(FrameError::WrongSize {
                expected: SlotSize::Single,
                found: SlotSize::Double
            })
        );
        assert_eq!(frame.pop(), Ok(int(1)));
        assert_eq!(frame.pop(), Err(FrameError::StackUnderflow));
    }

    #[test]
    fn test_pop_n_keeps_order() {
        let mut frame = Frame::new(0, None);
        for v in 1..=3 {
            frame.push(int(v)).unwrap();
        }
        assert_eq!(frame.pop_n(2).unwrap(), vec![int(2), int(3)]);
        assert_eq!(frame.pop_n(2), Err(FrameError::StackUnderflow));
        assert_eq!(frame.stack_len(), 1);
    }

    #[test]
    fn test_wide_locals() {
        let mut frame = Frame::new(4, None);
        frame.set_local(1, long(5)).unwrap();
        assert_eq!(frame.local(1), Ok(&long(5)));
        assert_eq!(frame.local(2), Err(FrameError::EmptyLocal(2)));

        // Writing the upper half clobbers the wide value
        frame.set_local(2, int(1)).unwrap();
        assert_eq!(frame.local(1), Err(FrameError::EmptyLocal(1)));

        assert!(matches!(
            frame.set_local(3, long(1)),
            Err(FrameError::InvalidLocal { index: 4, .. })
        ));
        assert!(matches!(
            frame.local(9),
            Err(FrameError::InvalidLocal { index: 9, max_locals: 4 })
        ));
    }

    #[test]
    fn test_merge() {
        let mut a = Frame::new(3, None);
        a.set_local(0, int(1)).unwrap();
        a.set_local(1, int(2)).unwrap();
        a.push(int(7)).unwrap();

        let mut b = a.clone();
        assert_eq!(a.merge(&b), Ok(false));

        b.set_local(1, int(3)).unwrap();
        b.set_local(2, int(4)).unwrap();
        assert_eq!(a.merge(&b), Ok(true));
        assert_eq!(a.local(0), Ok(&int(1)));
        assert_eq!(
            a.local(1),
            Ok(&AbstractValue::Unresolved(SlotSize::Single))
        );
        assert_eq!(a.local(2), Err(FrameError::EmptyLocal(2)));
        assert_eq!(a.merge(&b), Ok(false));
    }

    #[test]
    fn test_merge_local_width_conflict_empties_slot() {
        let mut a = Frame::new(2, None);
        a.set_local(0, int(1)).unwrap();
        let mut b = Frame::new(2, None);
        b.set_local(0, long(1)).unwrap();
        assert_eq!(a.merge(&b), Ok(true));
        assert_eq!(a.local(0), Err(FrameError::EmptyLocal(0)));
    }

    #[test]
    fn test_merge_incompatible_stacks() {
        let mut a = Frame::new(0, None);
        let mut b = Frame::new(0, None);
        b.push(int(1)).unwrap();
        assert!(matches!(
            a.merge(&b),
            Err(FrameError::IncompatibleStacks { .. })
        ));

        a.push(long(1)).unwrap();
        assert!(matches!(
            a.merge(&b),
            Err(FrameError::IncompatibleStacks { .. })
        ));
    }

    #[test]
    fn test_display() {
        let mut frame = Frame::new(2, None);
        frame.set_local(0, int(4)).unwrap();
        frame.push(AbstractValue::Unresolved(SlotSize::Single)).unwrap();
        assert_eq!(frame.to_string(), "locals [4, -] stack [?]");
    }
}
