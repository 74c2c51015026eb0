//! Fake invocation hosts

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use crate::{
    analysis::{HostError, HostErrorKind, HostValue, InvocationHost},
    model::MethodRef,
    ConstValue,
};

/// A host that folds `int` arguments with a fixed function and records every call.
pub struct RecordingHost {
    calls: Mutex<Vec<(MethodRef, Vec<HostValue>)>>,
    fold: fn(&[i32]) -> i32,
}

impl RecordingHost {
    pub fn new(fold: fn(&[i32]) -> i32) -> Self {
        RecordingHost {
            calls: Mutex::new(Vec::new()),
            fold,
        }
    }

    pub fn calls(&self) -> Vec<(MethodRef, Vec<HostValue>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl InvocationHost for RecordingHost {
    fn invoke(
        &self,
        method: &MethodRef,
        args: &[HostValue],
    ) -> Result<Option<HostValue>, HostError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.clone(), args.to_vec()));

        let ints: Option<Vec<i32>> = args
            .iter()
            .map(|arg| match arg {
                HostValue::Const(ConstValue::Int(v)) => Some(*v),
                _ => None,
            })
            .collect();
        match (ints, &method.descriptor.ret) {
            (_, None) => Ok(None),
            (Some(ints), Some(_)) => Ok(Some(HostValue::Const(ConstValue::Int((self.fold)(&ints))))),
            (None, Some(_)) => Err(HostError::new(
                HostErrorKind::TypeMismatch,
                "only int arguments are supported",
            )),
        }
    }
}

/// A host whose every call fails with the same error.
pub struct FailingHost {
    kind: HostErrorKind,
    calls: AtomicUsize,
}

impl FailingHost {
    pub fn new(kind: HostErrorKind) -> Self {
        FailingHost {
            kind,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InvocationHost for FailingHost {
    fn invoke(
        &self,
        method: &MethodRef,
        _args: &[HostValue],
    ) -> Result<Option<HostValue>, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HostError::new(self.kind, format!("{method} raised")))
    }
}
