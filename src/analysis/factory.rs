//! Pluggable resolvers for static field reads and static invocations.
//!
//! The analyzer has no knowledge of the program beyond the method it analyzes. Factories let
//! callers feed in what they know: "field `Config.SEED` is always `42`", "`Util.mix(II)I` is a
//! pure function". A factory must answer [`AbstractValue::Unresolved`] for anything it cannot
//! determine; a wrong concrete answer silently corrupts every frame downstream of it.
//!
//! Factories are called repeatedly and in no particular order while the analysis iterates to
//! its fixed point, and may be shared by analyses running on several threads at once. They
//! must therefore be free of side effects and `Send + Sync`.
//!
//! Closures implement both traits, so ad-hoc resolvers need no dedicated type:
//!
//! ```rust
//! use stackflow::{AbstractValue, Analyzer, ConstValue, FieldRef};
//!
//! let analyzer = Analyzer::builder()
//!     .static_get(|field: &FieldRef| {
//!         if &*field.name == "DEBUG" {
//!             AbstractValue::Constant(ConstValue::Int(0))
//!         } else {
//!             AbstractValue::Unresolved(field.descriptor.size())
//!         }
//!     })
//!     .build()?;
//! # Ok::<(), stackflow::Error>(())
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    analysis::{AbstractValue, ConstValue},
    model::{FieldRef, MethodRef},
};

/// Resolves the value read by a static field access.
pub trait StaticGetFactory: Send + Sync {
    /// Approximates the value of `field`.
    ///
    /// The returned value must have the width of the field's type.
    fn get_static(&self, field: &FieldRef) -> AbstractValue;
}

impl<F> StaticGetFactory for F
where
    F: Fn(&FieldRef) -> AbstractValue + Send + Sync,
{
    fn get_static(&self, field: &FieldRef) -> AbstractValue {
        self(field)
    }
}

/// Resolves the result of a static invocation without executing it.
pub trait StaticInvokeFactory: Send + Sync {
    /// Approximates the result of calling `method` with `args` (in declaration order).
    ///
    /// Returns `None` for `void` methods. Unresolved arguments must be tolerated, typically by
    /// answering [`AbstractValue::Unresolved`].
    fn invoke_static(&self, method: &MethodRef, args: &[AbstractValue]) -> Option<AbstractValue>;
}

impl<F> StaticInvokeFactory for F
where
    F: Fn(&MethodRef, &[AbstractValue]) -> Option<AbstractValue> + Send + Sync,
{
    fn invoke_static(&self, method: &MethodRef, args: &[AbstractValue]) -> Option<AbstractValue> {
        self(method, args)
    }
}

/// A [`StaticGetFactory`] backed by a table of known constant fields.
#[derive(Debug, Clone, Default)]
pub struct FieldConstants {
    fields: HashMap<FieldRef, ConstValue>,
}

impl FieldConstants {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, returning the table for chaining.
    #[must_use]
    pub fn with(mut self, field: FieldRef, value: ConstValue) -> Self {
        self.insert(field, value);
        self
    }

    /// Adds or replaces a field.
    pub fn insert(&mut self, field: FieldRef, value: ConstValue) {
        self.fields.insert(field, value);
    }

    /// Number of known fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl StaticGetFactory for FieldConstants {
    fn get_static(&self, field: &FieldRef) -> AbstractValue {
        self.fields.get(field).map_or_else(
            || AbstractValue::Unresolved(field.descriptor.size()),
            |value| AbstractValue::Constant(value.clone()),
        )
    }
}

/// A pure function over constant arguments, returning `None` when it cannot compute a result.
pub type PureFn = Arc<dyn Fn(&[ConstValue]) -> Option<ConstValue> + Send + Sync>;

/// A [`StaticInvokeFactory`] that folds registered pure methods over constant arguments.
///
/// A call is folded only when every argument is exactly known; otherwise, and for methods
/// that are not registered, the result is unresolved. `void` methods yield no value.
///
/// # Examples
///
/// ```rust
/// use stackflow::{AbstractValue, ConstValue, MethodRef, PureMethods, StaticInvokeFactory};
///
/// let max = MethodRef::new("java/lang/Math", "max", "(II)I")?;
/// let methods = PureMethods::new().with(max.clone(), |args| match args {
///     [ConstValue::Int(a), ConstValue::Int(b)] => Some(ConstValue::Int(*a.max(b))),
///     _ => None,
/// });
///
/// let args: [AbstractValue; 2] = [ConstValue::Int(3).into(), ConstValue::Int(9).into()];
/// assert_eq!(
///     methods.invoke_static(&max, &args),
///     Some(AbstractValue::Constant(ConstValue::Int(9)))
/// );
/// # Ok::<(), stackflow::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct PureMethods {
    methods: HashMap<MethodRef, PureFn>,
}

impl PureMethods {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `method`, returning the registry for chaining.
    #[must_use]
    pub fn with<F>(mut self, method: MethodRef, function: F) -> Self
    where
        F: Fn(&[ConstValue]) -> Option<ConstValue> + Send + Sync + 'static,
    {
        self.methods.insert(method, Arc::new(function));
        self
    }

    /// Returns `true` if `method` is registered.
    #[must_use]
    pub fn contains(&self, method: &MethodRef) -> bool {
        self.methods.contains_key(method)
    }
}

impl fmt::Debug for PureMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.methods.keys().map(ToString::to_string))
            .finish()
    }
}

impl StaticInvokeFactory for PureMethods {
    fn invoke_static(&self, method: &MethodRef, args: &[AbstractValue]) -> Option<AbstractValue> {
        let ret = method.descriptor.ret.as_ref()?;
        let unresolved = AbstractValue::Unresolved(ret.size());

        let Some(function) = self.methods.get(method) else {
            return Some(unresolved);
        };
        let constants: Option<Vec<ConstValue>> =
            args.iter().map(|arg| arg.as_const().cloned()).collect();

        Some(
            constants
                .and_then(|constants| function(&constants))
                .map_or(unresolved, AbstractValue::Constant),
        )
    }
}
