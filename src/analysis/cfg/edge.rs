//! Control flow edge types for the instruction-level CFG.

use std::sync::Arc;

use crate::model::InsnId;

/// The kind of control flow represented by an edge.
///
/// # Examples
///
/// ```rust
/// use stackflow::analysis::CfgEdgeKind;
///
/// assert!(CfgEdgeKind::ConditionalTrue.is_conditional());
/// assert!(CfgEdgeKind::Exception { catch_type: None }.is_exceptional());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgEdgeKind {
    /// Fall-through to the next instruction or an unconditional jump.
    Unconditional,

    /// The jump of a conditional branch, taken when the condition holds.
    ConditionalTrue,

    /// The fall-through of a conditional branch.
    ConditionalFalse,

    /// A switch target.
    Switch {
        /// The key selecting this target, or `None` for the default target.
        case_value: Option<i32>,
    },

    /// Edge from a protected instruction to its exception handler.
    Exception {
        /// Caught class, `None` for a catch-all handler.
        catch_type: Option<Arc<str>>,
    },
}

impl CfgEdgeKind {
    /// Returns `true` for both edges of a conditional branch.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::ConditionalTrue | Self::ConditionalFalse)
    }

    /// Returns `true` for edges into exception handlers.
    #[must_use]
    pub const fn is_exceptional(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    /// Returns `true` for switch targets.
    #[must_use]
    pub const fn is_switch(&self) -> bool {
        matches!(self, Self::Switch { .. })
    }
}

/// A control flow edge leaving an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEdge {
    target: InsnId,
    kind: CfgEdgeKind,
}

impl CfgEdge {
    /// Creates an edge to `target`.
    #[must_use]
    pub const fn new(target: InsnId, kind: CfgEdgeKind) -> Self {
        Self { target, kind }
    }

    /// Instruction control continues with.
    #[must_use]
    pub const fn target(&self) -> InsnId {
        self.target
    }

    /// How control gets there.
    #[must_use]
    pub const fn kind(&self) -> &CfgEdgeKind {
        &self.kind
    }

    pub(crate) const fn unconditional(target: InsnId) -> Self {
        Self::new(target, CfgEdgeKind::Unconditional)
    }

    pub(crate) const fn conditional_true(target: InsnId) -> Self {
        Self::new(target, CfgEdgeKind::ConditionalTrue)
    }

    pub(crate) const fn conditional_false(target: InsnId) -> Self {
        Self::new(target, CfgEdgeKind::ConditionalFalse)
    }

    pub(crate) const fn switch_case(target: InsnId, case_value: Option<i32>) -> Self {
        Self::new(target, CfgEdgeKind::Switch { case_value })
    }

    pub(crate) fn exception(target: InsnId, catch_type: Option<Arc<str>>) -> Self {
        Self::new(target, CfgEdgeKind::Exception { catch_type })
    }
}
