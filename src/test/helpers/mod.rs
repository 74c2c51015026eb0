//! Helper functions and utilities for testing
//!
//! Method bodies used across the unit tests, and fake hosts standing in for a real
//! invocation facility.

pub mod hosts;

pub use hosts::*;

use crate::model::{MethodAssembler, MethodBody};

/// `static int derive(int a, int b)`: combines a static field with a constant through a
/// static call, ignoring the parameters' values.
///
/// ```text
/// #0 iload 0
/// #1 iload 1
/// #2 iadd
/// #3 istore 2
/// #4 getstatic Config.SEED:I
/// #5 iconst 3
/// #6 invokestatic Util.mix(II)I
/// #7 ireturn
/// ```
pub fn derive_method() -> MethodBody {
    let mut asm = MethodAssembler::new("Demo", "derive", "(II)I").unwrap();
    asm.iload(0)
        .iload(1)
        .iadd()
        .istore(2)
        .getstatic("Config", "SEED", "I")
        .iconst(3)
        .invokestatic("Util", "mix", "(II)I")
        .ireturn();
    asm.finish().unwrap()
}

/// `static int call(int a)`: calls `Util.mix` once with constants and once with the
/// parameter.
///
/// ```text
/// #0 iconst 1
/// #1 iconst 2
/// #2 invokestatic Util.mix(II)I
/// #3 iload 0
/// #4 invokestatic Util.mix(II)I
/// #5 ireturn
/// ```
pub fn mixed_call_method() -> MethodBody {
    let mut asm = MethodAssembler::new("Demo", "call", "(I)I").unwrap();
    asm.iconst(1)
        .iconst(2)
        .invokestatic("Util", "mix", "(II)I")
        .iload(0)
        .invokestatic("Util", "mix", "(II)I")
        .ireturn();
    asm.finish().unwrap()
}
