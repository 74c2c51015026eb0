//! Abstract values tracked in stack and local slots.
//!
//! [`AbstractValue`] is a closed sum over the kinds of knowledge the analyzer can have about a
//! slot. The lattice is flat: [`AbstractValue::Unresolved`] is top, and every other value sits
//! directly below it. Joining two different values therefore always yields `Unresolved`.
//!
//! ```text
//!                    Unresolved(size)
//!         /        /        |         \          \
//!   Int(1)  Long(7)  "key"  Reference(Foo)  Simulated(..)  ...
//! ```
//!
//! Every value has a [`SlotSize`]; values of different sizes live in separate lattices and
//! joining them is an error.
//!
//! A host result that is a primitive or string enters the lattice as a plain constant (see
//! [`AbstractValue::from_host`]). A `Simulated` value wrapping such a constant still joins with
//! the equal `Constant` to that constant.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    analysis::{HostValue, JoinSemiLattice, SimulatedValue},
    model::ValueType,
    Error, Result,
};

/// Number of stack/local slots occupied by a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotSize {
    /// One slot (`int`, `float`, references)
    Single,
    /// Two slots (`long`, `double`)
    Double,
}

impl SlotSize {
    /// Number of slots as an integer.
    #[must_use]
    pub const fn slots(self) -> usize {
        match self {
            SlotSize::Single => 1,
            SlotSize::Double => 2,
        }
    }
}

impl TryFrom<usize> for SlotSize {
    type Error = Error;

    fn try_from(slots: usize) -> Result<Self> {
        match slots {
            1 => Ok(SlotSize::Single),
            2 => Ok(SlotSize::Double),
            other => Err(Error::InvalidSlotSize(other)),
        }
    }
}

impl fmt::Display for SlotSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slots())
    }
}

/// An exactly known constant.
///
/// Floating point constants compare and hash by bit pattern, so `NaN` equals itself and
/// `0.0` differs from `-0.0`.
#[derive(Debug, Clone)]
pub enum ConstValue {
    /// 32-bit integer (also `boolean`, `byte`, `char`, `short`)
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// String literal
    String(Arc<str>),
    /// The null reference
    Null,
    /// Class literal, by internal name
    Type(Arc<str>),
}

impl ConstValue {
    /// Slots occupied by this constant.
    #[must_use]
    pub const fn size(&self) -> SlotSize {
        match self {
            ConstValue::Long(_) | ConstValue::Double(_) => SlotSize::Double,
            _ => SlotSize::Single,
        }
    }

    /// Computational type of this constant.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            ConstValue::Int(_) => ValueType::Int,
            ConstValue::Long(_) => ValueType::Long,
            ConstValue::Float(_) => ValueType::Float,
            ConstValue::Double(_) => ValueType::Double,
            ConstValue::String(_) | ConstValue::Null | ConstValue::Type(_) => ValueType::Reference,
        }
    }

    /// Returns the integer if this is an `Int` constant.
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            ConstValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Long(a), ConstValue::Long(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Double(a), ConstValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::String(a), ConstValue::String(b))
            | (ConstValue::Type(a), ConstValue::Type(b)) => a == b,
            (ConstValue::Null, ConstValue::Null) => true,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ConstValue::Int(v) => v.hash(state),
            ConstValue::Long(v) => v.hash(state),
            ConstValue::Float(v) => v.to_bits().hash(state),
            ConstValue::Double(v) => v.to_bits().hash(state),
            ConstValue::String(v) | ConstValue::Type(v) => v.hash(state),
            ConstValue::Null => {}
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Long(v) => write!(f, "{v}L"),
            ConstValue::Float(v) => write!(f, "{v:?}f"),
            ConstValue::Double(v) => write!(f, "{v:?}d"),
            ConstValue::String(v) => write!(f, "{v:?}"),
            ConstValue::Null => f.write_str("null"),
            ConstValue::Type(v) => write!(f, "{v}.class"),
        }
    }
}

/// The value flowing through stack and local slots during analysis.
///
/// # Examples
///
/// ```rust
/// use stackflow::{AbstractValue, ConstValue, JoinSemiLattice, SlotSize};
///
/// let one = AbstractValue::Constant(ConstValue::Int(1));
/// let two = AbstractValue::Constant(ConstValue::Int(2));
///
/// assert_eq!(one.join(&one)?, one);
/// assert_eq!(one.join(&two)?, AbstractValue::Unresolved(SlotSize::Single));
/// assert!(one.join(&AbstractValue::Constant(ConstValue::Long(1))).is_err());
/// # Ok::<(), stackflow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbstractValue {
    /// Nothing is known about the value except its size (top).
    Unresolved(SlotSize),
    /// The value is exactly this constant.
    Constant(ConstValue),
    /// A non-null instance of the named class whose contents are unknown.
    Reference(Arc<str>),
    /// A host object obtained through simulated execution. Host constants are lifted to
    /// `Constant` instead.
    Simulated(SimulatedValue),
}

impl AbstractValue {
    /// Top element of the given size.
    #[must_use]
    pub const fn unresolved(size: SlotSize) -> Self {
        AbstractValue::Unresolved(size)
    }

    /// Top element occupying `slots` slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlotSize`] unless `slots` is 1 or 2.
    pub fn unresolved_slots(slots: usize) -> Result<Self> {
        Ok(AbstractValue::Unresolved(SlotSize::try_from(slots)?))
    }

    /// Top element for values of computational type `ty`.
    #[must_use]
    pub const fn unknown(ty: ValueType) -> Self {
        AbstractValue::Unresolved(ty.size())
    }

    /// Lifts a host value into the lattice.
    ///
    /// Primitives, strings, class literals and null become [`AbstractValue::Constant`]; only
    /// objects stay [`AbstractValue::Simulated`].
    #[must_use]
    pub fn from_host(value: HostValue) -> Self {
        match value {
            HostValue::Const(value) => AbstractValue::Constant(value),
            object @ HostValue::Object(_) => AbstractValue::Simulated(SimulatedValue::new(object)),
        }
    }

    /// A known instance of `class`.
    #[must_use]
    pub fn reference(class: &str) -> Self {
        AbstractValue::Reference(Arc::from(class))
    }

    /// Slots occupied by this value.
    #[must_use]
    pub fn size(&self) -> SlotSize {
        match self {
            AbstractValue::Unresolved(size) => *size,
            AbstractValue::Constant(value) => value.size(),
            AbstractValue::Reference(_) => SlotSize::Single,
            AbstractValue::Simulated(value) => value.size(),
        }
    }

    /// Returns `true` for the top element.
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        matches!(self, AbstractValue::Unresolved(_))
    }

    /// Returns `true` if the exact value is known and could be handed to a host.
    ///
    /// `Reference` values are not concrete: only their class is known.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        matches!(
            self,
            AbstractValue::Constant(_) | AbstractValue::Simulated(_)
        )
    }

    /// The exact primitive, string, class or null value, if known.
    ///
    /// Simulated values holding such a value count as constants for folding.
    #[must_use]
    pub fn as_const(&self) -> Option<&ConstValue> {
        match self {
            AbstractValue::Constant(value) => Some(value),
            AbstractValue::Simulated(value) => match value.value() {
                HostValue::Const(inner) => Some(inner),
                HostValue::Object(_) => None,
            },
            _ => None,
        }
    }

    /// Converts a concrete value into the form an invocation host accepts.
    #[must_use]
    pub fn to_host(&self) -> Option<HostValue> {
        match self {
            AbstractValue::Constant(value) => Some(HostValue::Const(value.clone())),
            AbstractValue::Simulated(value) => Some(value.value().clone()),
            _ => None,
        }
    }
}

impl JoinSemiLattice for AbstractValue {
    fn join(&self, other: &Self) -> Result<Self> {
        let (left, right) = (self.size(), other.size());
        if left != right {
            return Err(Error::SizeMismatch {
                left: left.slots(),
                right: right.slots(),
            });
        }
        if self == other {
            return Ok(self.clone());
        }
        match (self.as_const(), other.as_const()) {
            (Some(a), Some(b)) if a == b => Ok(AbstractValue::Constant(a.clone())),
            _ => Ok(AbstractValue::Unresolved(left)),
        }
    }

    fn is_top(&self) -> bool {
        self.is_unresolved()
    }
}

impl From<ConstValue> for AbstractValue {
    fn from(value: ConstValue) -> Self {
        AbstractValue::Constant(value)
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Unresolved(SlotSize::Single) => f.write_str("?"),
            AbstractValue::Unresolved(SlotSize::Double) => f.write_str("??"),
            AbstractValue::Constant(value) => write!(f, "{value}"),
            AbstractValue::Reference(class) => write!(f, "<{class}>"),
            AbstractValue::Simulated(value) => write!(f, "sim({value})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::HostObject;

    fn samples() -> Vec<AbstractValue> {
        vec![
            AbstractValue::Unresolved(SlotSize::Single),
            AbstractValue::Constant(ConstValue::Int(0)),
            AbstractValue::Constant(ConstValue::Int(1)),
            AbstractValue::Constant(ConstValue::Float(f32::NAN)),
            AbstractValue::Constant(ConstValue::String(Arc::from("a"))),
            AbstractValue::Constant(ConstValue::Null),
            AbstractValue::reference("java/lang/Object"),
            AbstractValue::Simulated(SimulatedValue::new(HostValue::Const(ConstValue::Int(1)))),
            AbstractValue::Simulated(SimulatedValue::new(HostValue::Object(HostObject::new(
                "java/lang/StringBuilder",
                7,
            )))),
        ]
    }

    #[test]
    fn test_join_laws() {
        let values = samples();
        let top = AbstractValue::Unresolved(SlotSize::Single);
        for a in &values {
            assert_eq!(&a.join(a).unwrap(), a);
            assert_eq!(a.join(&top).unwrap(), top);
            for b in &values {
                assert_eq!(a.join(b).unwrap(), b.join(a).unwrap());
                for c in &values {
                    assert_eq!(
                        a.join(b).unwrap().join(c).unwrap(),
                        a.join(&b.join(c).unwrap()).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn test_simulated_constant_joins_with_equal_constant() {
        let constant = AbstractValue::Constant(ConstValue::Int(3));
        let simulated =
            AbstractValue::Simulated(SimulatedValue::new(HostValue::Const(ConstValue::Int(3))));
        assert_eq!(constant.join(&simulated).unwrap(), constant);
        assert_eq!(simulated.join(&constant).unwrap(), constant);
        assert_eq!(
            simulated
                .join(&AbstractValue::Constant(ConstValue::Int(4)))
                .unwrap(),
            AbstractValue::Unresolved(SlotSize::Single)
        );
    }

    #[test]
    fn test_from_host() {
        assert_eq!(
            AbstractValue::from_host(HostValue::Const(ConstValue::Int(3))),
            AbstractValue::Constant(ConstValue::Int(3))
        );
        let object = HostValue::Object(HostObject::new("Foo", 1));
        assert_eq!(
            AbstractValue::from_host(object.clone()),
            AbstractValue::Simulated(SimulatedValue::new(object))
        );
    }

    #[test]
    fn test_join_size_mismatch() {
        let int = AbstractValue::Constant(ConstValue::Int(1));
        let long = AbstractValue::Unresolved(SlotSize::Double);
        assert!(matches!(
            int.join(&long),
            Err(Error::SizeMismatch { left: 1, right: 2 })
        ));
    }

    #[test]
    fn test_slot_size_construction() {
        assert_eq!(SlotSize::try_from(2).unwrap(), SlotSize::Double);
        assert!(matches!(
            SlotSize::try_from(3),
            Err(Error::InvalidSlotSize(3))
        ));
        assert!(AbstractValue::unresolved_slots(0).is_err());
        assert_eq!(
            AbstractValue::unresolved_slots(1).unwrap(),
            AbstractValue::Unresolved(SlotSize::Single)
        );
    }

    #[test]
    fn test_float_constants_compare_by_bits() {
        assert_eq!(ConstValue::Double(f64::NAN), ConstValue::Double(f64::NAN));
        assert_ne!(ConstValue::Float(0.0), ConstValue::Float(-0.0));
    }

    #[test]
    fn test_concrete_and_const_views() {
        let simulated = AbstractValue::Simulated(SimulatedValue::new(HostValue::Const(
            ConstValue::Long(9),
        )));
        assert!(simulated.is_concrete());
        assert_eq!(simulated.size(), SlotSize::Double);
        assert_eq!(simulated.as_const(), Some(&ConstValue::Long(9)));

        let reference = AbstractValue::reference("Foo");
        assert!(!reference.is_concrete());
        assert_eq!(reference.to_host(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(AbstractValue::Unresolved(SlotSize::Double).to_string(), "??");
        assert_eq!(AbstractValue::from(ConstValue::Long(3)).to_string(), "3L");
        assert_eq!(
            AbstractValue::from(ConstValue::String(Arc::from("k"))).to_string(),
            "\"k\""
        );
        assert_eq!(AbstractValue::reference("Foo").to_string(), "<Foo>");
    }
}
