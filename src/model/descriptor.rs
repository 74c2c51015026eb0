//! Field and method descriptors.
//!
//! Descriptors use the compact type grammar of the instruction set: `I` for `int`, `J` for
//! `long`, `Ljava/lang/String;` for a class, `[I` for an array, and `(IJ)V` for a method taking
//! an `int` and a `long` and returning nothing. Parsing happens once, when a
//! [`crate::model::FieldRef`] or [`crate::model::MethodRef`] is created, so the analyzer never
//! deals with raw descriptor text.

use std::{fmt, iter::Peekable, str::Chars, sync::Arc};

use crate::{
    analysis::SlotSize,
    model::ValueType,
    Error, Result,
};

/// Primitive value types.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
}

impl BaseType {
    const fn code(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }
}

/// Type of a field, parameter, return value or array element.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeDesc {
    /// A primitive type
    Base(BaseType),
    /// A class or interface, by internal name (`java/lang/String`)
    Object(Arc<str>),
    /// An array of the boxed element type
    Array(Box<TypeDesc>),
}

impl TypeDesc {
    /// Parses a complete field descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if the text is not exactly one field descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut chars = descriptor.chars().peekable();
        let parsed = Self::parse_from(&mut chars, descriptor)?;
        match chars.next() {
            None => Ok(parsed),
            Some(c) => Err(invalid(descriptor, format!("unexpected leftover input '{c}'"))),
        }
    }

    fn parse_from(source: &mut Peekable<Chars>, descriptor: &str) -> Result<Self> {
        match source.next() {
            Some('L') => {
                let mut class_name = String::new();
                loop {
                    match source.next() {
                        Some(';') if !class_name.is_empty() => {
                            return Ok(TypeDesc::Object(Arc::from(class_name)));
                        }
                        Some(';') => return Err(invalid(descriptor, "empty class name")),
                        Some(c) => class_name.push(c),
                        None => {
                            return Err(invalid(
                                descriptor,
                                format!("missing terminator for 'L{class_name}'"),
                            ));
                        }
                    }
                }
            }
            Some('[') => Ok(TypeDesc::Array(Box::new(Self::parse_from(
                source, descriptor,
            )?))),
            Some(c) => BaseType::from_code(c)
                .map(TypeDesc::Base)
                .ok_or_else(|| invalid(descriptor, format!("invalid type character '{c}'"))),
            None => Err(invalid(descriptor, "missing field type")),
        }
    }

    /// Computational type of values of this type on the stack.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            TypeDesc::Base(BaseType::Long) => ValueType::Long,
            TypeDesc::Base(BaseType::Float) => ValueType::Float,
            TypeDesc::Base(BaseType::Double) => ValueType::Double,
            TypeDesc::Base(_) => ValueType::Int,
            TypeDesc::Object(_) | TypeDesc::Array(_) => ValueType::Reference,
        }
    }

    /// Number of stack/local slots a value of this type occupies.
    #[must_use]
    pub fn size(&self) -> SlotSize {
        self.value_type().size()
    }

    /// Class name for object types, `None` otherwise.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeDesc::Object(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Base(base) => write!(f, "{}", base.code()),
            TypeDesc::Object(name) => write!(f, "L{name};"),
            TypeDesc::Array(element) => write!(f, "[{element}"),
        }
    }
}

/// Parameter and return types of a method.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor {
    /// Declared parameter types, excluding any receiver
    pub params: Vec<TypeDesc>,
    /// Return type, `None` for `void`
    pub ret: Option<TypeDesc>,
}

impl MethodDescriptor {
    /// Parses a method descriptor such as `(ILjava/lang/String;)J`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if the text is not a well-formed method descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let mut chars = descriptor.chars().peekable();
        if chars.next() != Some('(') {
            return Err(invalid(descriptor, "expected '(' to open the parameter list"));
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(TypeDesc::parse_from(&mut chars, descriptor)?),
                None => return Err(invalid(descriptor, "unterminated parameter list")),
            }
        }

        let ret = if chars.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(TypeDesc::parse_from(&mut chars, descriptor)?)
        };

        match chars.next() {
            None => Ok(MethodDescriptor { params, ret }),
            Some(c) => Err(invalid(descriptor, format!("unexpected leftover input '{c}'"))),
        }
    }

    /// Total number of slots taken by the declared parameters.
    #[must_use]
    pub fn param_slots(&self) -> usize {
        self.params.iter().map(|p| p.size().slots()).sum()
    }

    /// Returns `true` for methods returning `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.ret.is_none()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{ret}"),
            None => f.write_str("V"),
        }
    }
}

fn invalid(descriptor: &str, reason: impl Into<String>) -> Error {
    Error::InvalidDescriptor {
        descriptor: descriptor.to_string(),
        reason: reason.into(),
    }
}
