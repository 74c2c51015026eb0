//! Resolution policies for simulation failures.
//!
//! When realizing a simulated invocation fails, the analyzer asks its [`Validator`] whether the
//! failure may be tolerated. The validator sees the method under analysis and the frames as
//! they stand at the failure: every instruction reached so far holds its current entry frame,
//! the failing instruction's own entry frame included, and unreached instructions are `None`.
//!
//! A resolved failure costs precision only: the failed call's result becomes
//! [`crate::analysis::AbstractValue::Unresolved`] and the analysis continues. A rejected
//! failure aborts the analysis with [`crate::Error::Simulation`].
//!
//! Validators must be total and free of side effects. They are consulted synchronously at
//! every failure and their answers are not cached.

use crate::{analysis::Frame, model::MethodBody};

/// Decides whether a simulation failure may be tolerated.
pub trait Validator: Send + Sync {
    /// Returns `true` to resolve the failure and continue with an unresolved result.
    fn resolve(&self, method: &MethodBody, frames: &[Option<Frame>]) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&MethodBody, &[Option<Frame>]) -> bool + Send + Sync,
{
    fn resolve(&self, method: &MethodBody, frames: &[Option<Frame>]) -> bool {
        self(method, frames)
    }
}

/// Resolves every failure raised inside a synthetic or bridge method.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticMethods;

impl Validator for SyntheticMethods {
    fn resolve(&self, method: &MethodBody, _frames: &[Option<Frame>]) -> bool {
        method.is_synthetic() || method.is_bridge()
    }
}

/// Resolves failures once enough of the method is already known.
///
/// Counts every stack entry and every occupied local of the frames computed so far, and
/// resolves when the share of concretely known values (see [`crate::analysis::AbstractValue::is_concrete`]) is
/// strictly greater than the threshold. A `Reference` only names its class and does not count as
/// known. With no values at all nothing is known and the failure is rejected.
///
/// # Examples
///
/// ```rust
/// use stackflow::{Analyzer, ResolvedRatio};
///
/// let analyzer = Analyzer::builder().validator(ResolvedRatio::new(75)).build()?;
/// # Ok::<(), stackflow::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRatio {
    percent: u8,
}

impl ResolvedRatio {
    /// Creates a policy with a threshold in percent; values above 100 are clamped.
    #[must_use]
    pub fn new(percent: u8) -> Self {
        ResolvedRatio {
            percent: percent.min(100),
        }
    }

    /// The threshold in percent.
    #[must_use]
    pub const fn percent(&self) -> u8 {
        self.percent
    }
}

impl Validator for ResolvedRatio {
    fn resolve(&self, _method: &MethodBody, frames: &[Option<Frame>]) -> bool {
        let (mut known, mut total) = (0usize, 0usize);
        let values = frames.iter().flatten().flat_map(|frame| {
            frame
                .stack()
                .iter()
                .chain(frame.locals().iter().flatten())
        });
        for value in values {
            total += 1;
            if value.is_concrete() {
                known += 1;
            }
        }
        total > 0 && known * 100 > total * usize::from(self.percent)
    }
}
