//! Symbolic references to fields and methods, as carried by field and invoke instructions.

use std::{fmt, sync::Arc};

use crate::{
    model::{MethodDescriptor, TypeDesc},
    Result,
};

/// A field reference: declaring type, name and descriptor.
///
/// This is the key handed to a [`crate::analysis::StaticGetFactory`].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    /// Internal name of the declaring class
    pub owner: Arc<str>,
    /// Field name
    pub name: Arc<str>,
    /// Parsed field type
    pub descriptor: TypeDesc,
}

impl FieldRef {
    /// Creates a field reference, parsing its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDescriptor`] if `descriptor` is not a field descriptor.
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Result<Self> {
        Ok(FieldRef {
            owner: Arc::from(owner),
            name: Arc::from(name),
            descriptor: TypeDesc::parse(descriptor)?,
        })
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

/// A method reference: declaring type, name and descriptor.
///
/// This is the key handed to a [`crate::analysis::StaticInvokeFactory`] and to an
/// [`crate::analysis::InvocationHost`].
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    /// Internal name of the declaring class
    pub owner: Arc<str>,
    /// Method name
    pub name: Arc<str>,
    /// Parsed parameter and return types
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    /// Creates a method reference, parsing its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDescriptor`] if `descriptor` is not a method descriptor.
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Result<Self> {
        Ok(MethodRef {
            owner: Arc::from(owner),
            name: Arc::from(name),
            descriptor: MethodDescriptor::parse(descriptor)?,
        })
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}
