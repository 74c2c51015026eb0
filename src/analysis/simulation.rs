//! Simulated execution of static invocations.
//!
//! When the analyzer runs with [`crate::analysis::ValueKind::Simulated`], a static call whose
//! arguments are all exactly known can be *realized*: the call is handed to an
//! [`InvocationHost`], an opaque capability able to run real code (for example through a
//! reflection bridge into a live virtual machine), and the concrete result is wrapped as a
//! [`SimulatedValue`].
//!
//! Host execution may fail. Failures come back as [`SimulationFailure`], which carries the
//! instruction, the invoked method, a message and the host's [`HostError`]. The analyzer
//! offers these failures to its validator before aborting, see
//! [`crate::analysis::Validator`].
//!
//! # Key Components
//!
//! - [`HostValue`] / [`HostObject`] - Values exchanged with the host
//! - [`InvocationHost`] - The host capability
//! - [`SimulatedValue`] - Lattice element wrapping a host value
//! - [`SimulationFailure`] / [`HostError`] - Failure reporting
//! - [`CachingHost`] - Memoizing wrapper shared between analysis runs
//!
//! # Thread Safety
//!
//! Hosts must be `Send + Sync`, since one analyzer configuration may drive analyses on many
//! threads. Calls into the host block; the analyzer imposes no timeout of its own.

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use log::debug;
use thiserror::Error;

use crate::{
    analysis::{AbstractValue, ConstValue, SlotSize},
    model::{InsnId, MethodRef},
};

/// Opaque reference to an object living in the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostObject {
    /// Internal name of the object's class
    pub class: Arc<str>,
    /// Host-defined identity of the object
    pub handle: u64,
}

impl HostObject {
    /// Creates a handle to an instance of `class`.
    #[must_use]
    pub fn new(class: &str, handle: u64) -> Self {
        HostObject {
            class: Arc::from(class),
            handle,
        }
    }
}

/// A concrete value passed to or returned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostValue {
    /// A primitive, string, class literal or null
    Const(ConstValue),
    /// Any other object
    Object(HostObject),
}

impl HostValue {
    /// Slots occupied by this value.
    #[must_use]
    pub const fn size(&self) -> SlotSize {
        match self {
            HostValue::Const(value) => value.size(),
            HostValue::Object(_) => SlotSize::Single,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Const(value) => write!(f, "{value}"),
            HostValue::Object(object) => write!(f, "{}@{:x}", object.class, object.handle),
        }
    }
}

/// Category of a host-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum HostErrorKind {
    /// The method could not be looked up or bound
    Reflection,
    /// The invoked code threw
    TargetException,
    /// The member exists but may not be called
    Inaccessible,
    /// Arguments or result do not match the method's signature
    TypeMismatch,
    /// The host does not support this call
    Unsupported,
}

/// Error raised by an [`InvocationHost`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct HostError {
    /// Failure category
    pub kind: HostErrorKind,
    /// Host-provided description
    pub message: String,
}

impl HostError {
    /// Creates a host error.
    #[must_use]
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        HostError {
            kind,
            message: message.into(),
        }
    }
}

/// Capability to execute a static method for real.
///
/// Implementations receive only concrete arguments, in declaration order, and return `None`
/// for `void` methods.
pub trait InvocationHost: Send + Sync {
    /// Invokes `method` with `args`.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] describing why the call could not produce a result.
    fn invoke(&self, method: &MethodRef, args: &[HostValue])
        -> Result<Option<HostValue>, HostError>;
}

impl<F> InvocationHost for F
where
    F: Fn(&MethodRef, &[HostValue]) -> Result<Option<HostValue>, HostError> + Send + Sync,
{
    fn invoke(
        &self,
        method: &MethodRef,
        args: &[HostValue],
    ) -> Result<Option<HostValue>, HostError> {
        self(method, args)
    }
}

/// Concrete execution of an invocation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Simulation of {method} failed at {insn}: {message}")]
pub struct SimulationFailure {
    insn: InsnId,
    method: MethodRef,
    message: String,
    #[source]
    cause: HostError,
}

impl SimulationFailure {
    /// Creates a failure report.
    #[must_use]
    pub fn new(insn: InsnId, method: MethodRef, message: impl Into<String>, cause: HostError) -> Self {
        SimulationFailure {
            insn,
            method,
            message: message.into(),
            cause,
        }
    }

    /// The invoke instruction whose simulation failed.
    #[must_use]
    pub fn insn(&self) -> InsnId {
        self.insn
    }

    /// The method that was being invoked.
    #[must_use]
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying host error.
    #[must_use]
    pub fn cause(&self) -> &HostError {
        &self.cause
    }
}

/// A lattice element holding a concrete host value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimulatedValue {
    value: HostValue,
}

impl SimulatedValue {
    /// Wraps a host value.
    #[must_use]
    pub const fn new(value: HostValue) -> Self {
        SimulatedValue { value }
    }

    /// The wrapped host value.
    #[must_use]
    pub const fn value(&self) -> &HostValue {
        &self.value
    }

    /// Slots occupied by the wrapped value.
    #[must_use]
    pub const fn size(&self) -> SlotSize {
        self.value.size()
    }

    /// Converts abstract arguments into host arguments.
    ///
    /// Returns `None` as soon as one argument is not concrete; such a call must not be
    /// realized.
    #[must_use]
    pub fn concrete_arguments(args: &[AbstractValue]) -> Option<Vec<HostValue>> {
        args.iter().map(AbstractValue::to_host).collect()
    }

    /// Executes `method` through `host` and lifts the result into the lattice.
    ///
    /// Constant results come back as [`AbstractValue::Constant`], objects as
    /// [`AbstractValue::Simulated`].
    ///
    /// Returns `Ok(None)` for `void` methods.
    ///
    /// # Errors
    ///
    /// Returns a [`SimulationFailure`] at `insn` if the host fails, or if its answer does not
    /// match the method's return type.
    pub fn realize(
        insn: InsnId,
        method: &MethodRef,
        args: &[HostValue],
        host: &dyn InvocationHost,
    ) -> Result<Option<AbstractValue>, SimulationFailure> {
        debug!("Simulating {method} at {insn} with {} argument(s)", args.len());

        let result = host
            .invoke(method, args)
            .map_err(|cause| SimulationFailure::new(insn, method.clone(), "host invocation failed", cause))?;

        let mismatch = |message: String| {
            SimulationFailure::new(
                insn,
                method.clone(),
                "host result does not match the method's return type",
                HostError::new(HostErrorKind::TypeMismatch, message),
            )
        };

        match (&method.descriptor.ret, result) {
            (None, None) => Ok(None),
            (None, Some(value)) => Err(mismatch(format!("void method returned {value}"))),
            (Some(ret), None) => Err(mismatch(format!("expected a {ret} result, got none"))),
            (Some(ret), Some(value)) if value.size() != ret.size() => Err(mismatch(format!(
                "expected a {}-slot {ret} result, got {value}",
                ret.size()
            ))),
            (Some(_), Some(value)) => Ok(Some(AbstractValue::from_host(value))),
        }
    }
}

impl fmt::Display for SimulatedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

type CallKey = (MethodRef, Vec<HostValue>);

/// An [`InvocationHost`] that remembers every answer of the host it wraps.
///
/// The fixed-point iteration may visit an invoke instruction several times with the same
/// arguments; with a cache the host runs each distinct call once. Failures are cached as well,
/// so a failing call is not retried. The cache is concurrent and can be shared by analyses
/// running in parallel.
pub struct CachingHost<H: ?Sized> {
    inner: Arc<H>,
    cache: DashMap<CallKey, Result<Option<HostValue>, HostError>>,
}

impl<H: InvocationHost> CachingHost<H> {
    /// Wraps `host`.
    #[must_use]
    pub fn new(host: H) -> Self {
        Self::from_shared(Arc::new(host))
    }
}

impl<H: InvocationHost + ?Sized> CachingHost<H> {
    /// Wraps a host that is already shared.
    #[must_use]
    pub fn from_shared(host: Arc<H>) -> Self {
        CachingHost {
            inner: host,
            cache: DashMap::new(),
        }
    }

    /// Number of distinct calls remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if no call has been made yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Forgets every remembered answer.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl<H: InvocationHost + ?Sized> InvocationHost for CachingHost<H> {
    fn invoke(
        &self,
        method: &MethodRef,
        args: &[HostValue],
    ) -> Result<Option<HostValue>, HostError> {
        let key = (method.clone(), args.to_vec());
        if let Some(cached) = self.cache.get(&key) {
            return cached.value().clone();
        }
        let result = self.inner.invoke(method, args);
        self.cache.insert(key, result.clone());
        result
    }
}

impl<H: ?Sized> fmt::Debug for CachingHost<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingHost")
            .field("entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn int(v: i32) -> HostValue {
        HostValue::Const(ConstValue::Int(v))
    }

    fn square(_: &MethodRef, args: &[HostValue]) -> Result<Option<HostValue>, HostError> {
        match args {
            [HostValue::Const(ConstValue::Int(v))] => Ok(Some(int(v * v))),
            _ => Err(HostError::new(HostErrorKind::TypeMismatch, "expected one int")),
        }
    }

    #[test]
    fn test_concrete_arguments() {
        let args = [
            AbstractValue::Constant(ConstValue::Int(1)),
            AbstractValue::Simulated(SimulatedValue::new(HostValue::Object(HostObject::new(
                "Key", 3,
            )))),
        ];
        let host_args = SimulatedValue::concrete_arguments(&args).unwrap();
        assert_eq!(host_args[0], int(1));

        let partial = [
            AbstractValue::Constant(ConstValue::Int(1)),
            AbstractValue::Unresolved(SlotSize::Single),
        ];
        assert_eq!(SimulatedValue::concrete_arguments(&partial), None);
        assert_eq!(
            SimulatedValue::concrete_arguments(&[AbstractValue::reference("Foo")]),
            None
        );
    }

    #[test]
    fn test_realize_wraps_result() {
        let method = MethodRef::new("Util", "square", "(I)I").unwrap();
        let result = SimulatedValue::realize(InsnId::new(2), &method, &[int(7)], &square).unwrap();
        assert_eq!(
            result,
            Some(AbstractValue::Constant(ConstValue::Int(49)))
        );
    }

    #[test]
    fn test_realize_reports_host_failure() {
        let method = MethodRef::new("Util", "square", "(I)I").unwrap();
        let failure =
            SimulatedValue::realize(InsnId::new(4), &method, &[], &square).unwrap_err();
        assert_eq!(failure.insn(), InsnId::new(4));
        assert_eq!(failure.method(), &method);
        assert_eq!(failure.cause().kind, HostErrorKind::TypeMismatch);
        assert!(std::error::Error::source(&failure).is_some());
    }

    #[test]
    fn test_realize_checks_return_shape() {
        let long_method = MethodRef::new("Util", "square", "(I)J").unwrap();
        let failure =
            SimulatedValue::realize(InsnId::new(0), &long_method, &[int(2)], &square).unwrap_err();
        assert_eq!(failure.cause().kind, HostErrorKind::TypeMismatch);

        let void_method = MethodRef::new("Util", "square", "(I)V").unwrap();
        assert!(SimulatedValue::realize(InsnId::new(0), &void_method, &[int(2)], &square).is_err());

        let silent = |_: &MethodRef, _: &[HostValue]| -> Result<Option<HostValue>, HostError> {
            Ok(None)
        };
        assert_eq!(
            SimulatedValue::realize(InsnId::new(0), &void_method, &[int(2)], &silent),
            Ok(None)
        );
    }

    #[test]
    fn test_caching_host_runs_each_call_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let host = CachingHost::new(move |method: &MethodRef, args: &[HostValue]| {
            counter.fetch_add(1, Ordering::SeqCst);
            square(method, args)
        });
        let method = MethodRef::new("Util", "square", "(I)I").unwrap();

        assert_eq!(host.invoke(&method, &[int(3)]), Ok(Some(int(9))));
        assert_eq!(host.invoke(&method, &[int(3)]), Ok(Some(int(9))));
        assert!(host.invoke(&method, &[]).is_err());
        assert!(host.invoke(&method, &[]).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(host.len(), 2);

        host.clear();
        assert!(host.is_empty());
    }
}
