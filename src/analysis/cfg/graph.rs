//! Control Flow Graph implementation.
//!
//! The graph is kept at instruction granularity because frames are computed per instruction.
//! Basic blocks are derived from it for consumers that want the coarser view.

use std::fmt::{self, Write};

use crate::{
    analysis::cfg::{
        traversal::{self, Successors},
        CfgEdge,
    },
    model::{FlowType, InsnId, Instruction, MethodBody},
    Result,
};

/// A maximal straight-line run of instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Index of the block in [`ControlFlowGraph::blocks`]
    pub id: usize,
    /// First instruction of the block (the leader)
    pub start: InsnId,
    /// First instruction after the block (exclusive)
    pub end: InsnId,
}

impl BasicBlock {
    /// Returns the instruction ids of this block in code order.
    pub fn instructions(&self) -> impl Iterator<Item = InsnId> {
        (self.start.index()..self.end.index()).map(InsnId::new)
    }

    /// Returns the last instruction of the block.
    #[must_use]
    pub fn last(&self) -> InsnId {
        InsnId::new(self.end.index() - 1)
    }

    /// Number of instructions in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.index() - self.start.index()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Instruction-level control flow graph of a method body.
///
/// # Examples
///
/// ```rust
/// use stackflow::{analysis::ControlFlowGraph, Condition, InsnId, MethodAssembler};
///
/// let mut asm = MethodAssembler::new("Demo", "sign", "(I)I")?;
/// asm.iload(0)
///     .if_cond(Condition::Lt, "negative")
///     .iconst(1)
///     .ireturn()
///     .label("negative")
///     .iconst(-1)
///     .ireturn();
/// let cfg = ControlFlowGraph::build(&asm.finish()?)?;
///
/// assert_eq!(cfg.block_count(), 3);
/// assert_eq!(cfg.edges(InsnId::new(1)).len(), 2);
/// assert!(cfg.unreachable().is_empty());
/// # Ok::<(), stackflow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    /// Normal edges leaving each instruction
    edges: Vec<Vec<CfgEdge>>,
    /// Edges from each instruction into the handlers protecting it, in table order
    exception_edges: Vec<Vec<CfgEdge>>,
    /// Sources of all edges entering each instruction
    predecessors: Vec<Vec<InsnId>>,
    /// Basic blocks in code order
    blocks: Vec<BasicBlock>,
    /// Block containing each instruction
    block_of: Vec<usize>,
    /// Whether each instruction is reachable from the entry
    reachable: Vec<bool>,
    /// Reachable instructions in reverse postorder
    rpo: Vec<InsnId>,
    /// Position of each instruction in `rpo`, `usize::MAX` when unreachable
    rpo_rank: Vec<usize>,
}

impl ControlFlowGraph {
    /// Builds the graph, checking the structural soundness of the code.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedGraph`] if the body is empty, a branch target or
    /// handler bound lies outside the code, a handler range is empty, or a reachable
    /// instruction lets execution fall off the end of the code.
    pub fn build(body: &MethodBody) -> Result<Self> {
        let len = body.instructions.len();
        if len == 0 {
            return Err(graph_error!(InsnId::new(0), "method has no instructions"));
        }

        for handler in &body.handlers {
            if handler.start >= handler.end {
                return Err(graph_error!(
                    handler.start,
                    "empty handler range {}..{}",
                    handler.start,
                    handler.end
                ));
            }
            if handler.end.index() > len || handler.handler.index() >= len {
                return Err(graph_error!(
                    handler.start,
                    "handler range {}..{} -> {} outside code of length {}",
                    handler.start,
                    handler.end,
                    handler.handler,
                    len
                ));
            }
        }

        let mut edges = Vec::with_capacity(len);
        let mut exception_edges = Vec::with_capacity(len);
        let mut falls_off = vec![false; len];

        for (index, insn) in body.instructions.iter().enumerate() {
            let id = InsnId::new(index);
            for target in insn.branch_targets() {
                if target.index() >= len {
                    return Err(graph_error!(
                        id,
                        "jump target {} outside code of length {}",
                        target,
                        len
                    ));
                }
            }

            let next = id.next();
            if insn.falls_through() && next.index() >= len {
                falls_off[index] = true;
            }

            edges.push(Self::normal_edges(insn, next, falls_off[index]));
            exception_edges.push(
                body.handlers
                    .iter()
                    .filter(|handler| handler.covers(id))
                    .map(|handler| CfgEdge::exception(handler.handler, handler.catch_type.clone()))
                    .collect(),
            );
        }

        let mut predecessors = vec![Vec::new(); len];
        for (index, out) in edges.iter().chain(exception_edges.iter()).enumerate() {
            let source = InsnId::new(index % len);
            for edge in out {
                let incoming: &mut Vec<InsnId> = &mut predecessors[edge.target().index()];
                if !incoming.contains(&source) {
                    incoming.push(source);
                }
            }
        }

        let (blocks, block_of) = Self::partition(body);

        let mut cfg = ControlFlowGraph {
            edges,
            exception_edges,
            predecessors,
            blocks,
            block_of,
            reachable: vec![false; len],
            rpo: Vec::new(),
            rpo_rank: vec![usize::MAX; len],
        };

        let reached: Vec<InsnId> = traversal::dfs(&cfg, cfg.entry()).collect();
        for insn in reached {
            cfg.reachable[insn.index()] = true;
        }
        if let Some(index) = (0..len).find(|&i| falls_off[i] && cfg.reachable[i]) {
            return Err(graph_error!(
                InsnId::new(index),
                "execution falls off the end of the code"
            ));
        }

        cfg.rpo = traversal::reverse_postorder(&cfg, cfg.entry());
        for (rank, insn) in cfg.rpo.iter().enumerate() {
            cfg.rpo_rank[insn.index()] = rank;
        }

        Ok(cfg)
    }

    fn normal_edges(insn: &Instruction, next: InsnId, falls_off: bool) -> Vec<CfgEdge> {
        match insn {
            Instruction::If(_, target) | Instruction::IfCmp(_, _, target) => {
                let mut out = vec![CfgEdge::conditional_true(*target)];
                if !falls_off {
                    out.push(CfgEdge::conditional_false(next));
                }
                out
            }
            Instruction::Goto(target) => vec![CfgEdge::unconditional(*target)],
            Instruction::Switch { default, cases } => {
                let mut out = Vec::with_capacity(cases.len() + 1);
                out.push(CfgEdge::switch_case(*default, None));
                out.extend(
                    cases
                        .iter()
                        .map(|(key, target)| CfgEdge::switch_case(*target, Some(*key))),
                );
                out
            }
            _ if insn.falls_through() && !falls_off => vec![CfgEdge::unconditional(next)],
            _ => Vec::new(),
        }
    }

    fn partition(body: &MethodBody) -> (Vec<BasicBlock>, Vec<usize>) {
        let len = body.instructions.len();
        let mut leaders = vec![false; len];
        leaders[0] = true;

        for (index, insn) in body.instructions.iter().enumerate() {
            for target in insn.branch_targets() {
                leaders[target.index()] = true;
            }
            if insn.ends_block() && index + 1 < len {
                leaders[index + 1] = true;
            }
        }
        for handler in &body.handlers {
            leaders[handler.handler.index()] = true;
            leaders[handler.start.index()] = true;
            if handler.end.index() < len {
                leaders[handler.end.index()] = true;
            }
        }

        let mut blocks: Vec<BasicBlock> = Vec::new();
        let mut block_of = Vec::with_capacity(len);
        for (index, &leader) in leaders.iter().enumerate() {
            if leader {
                if let Some(last) = blocks.last_mut() {
                    last.end = InsnId::new(index);
                }
                blocks.push(BasicBlock {
                    id: blocks.len(),
                    start: InsnId::new(index),
                    end: InsnId::new(len),
                });
            }
            block_of.push(blocks.len() - 1);
        }

        (blocks, block_of)
    }

    /// The entry instruction.
    #[must_use]
    pub const fn entry(&self) -> InsnId {
        InsnId::new(0)
    }

    /// Number of instructions in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Always `false`: bodies without instructions are rejected by [`ControlFlowGraph::build`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Normal (non-exceptional) edges leaving `insn`.
    #[must_use]
    pub fn edges(&self, insn: InsnId) -> &[CfgEdge] {
        self.edges.get(insn.index()).map_or(&[], Vec::as_slice)
    }

    /// Edges from `insn` into the handlers protecting it, in handler table order.
    #[must_use]
    pub fn exception_edges(&self, insn: InsnId) -> &[CfgEdge] {
        self.exception_edges
            .get(insn.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Targets of the normal edges leaving `insn`.
    pub fn normal_successors(&self, insn: InsnId) -> impl Iterator<Item = InsnId> + '_ {
        self.edges(insn).iter().map(CfgEdge::target)
    }

    /// Sources of all edges entering `insn`, exceptional ones included.
    #[must_use]
    pub fn predecessors(&self, insn: InsnId) -> &[InsnId] {
        self.predecessors
            .get(insn.index())
            .map_or(&[], Vec::as_slice)
    }

    /// Basic blocks in code order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Number of basic blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The basic block containing `insn`.
    #[must_use]
    pub fn block_of(&self, insn: InsnId) -> Option<&BasicBlock> {
        self.block_of
            .get(insn.index())
            .and_then(|&block| self.blocks.get(block))
    }

    /// Returns `true` if `insn` can be reached from the entry over any kind of edge.
    #[must_use]
    pub fn is_reachable(&self, insn: InsnId) -> bool {
        self.reachable.get(insn.index()).copied().unwrap_or(false)
    }

    /// Instructions that cannot be reached from the entry, in code order.
    #[must_use]
    pub fn unreachable(&self) -> Vec<InsnId> {
        self.reachable
            .iter()
            .enumerate()
            .filter(|(_, &reached)| !reached)
            .map(|(index, _)| InsnId::new(index))
            .collect()
    }

    /// Reachable instructions in reverse postorder.
    #[must_use]
    pub fn reverse_postorder(&self) -> &[InsnId] {
        &self.rpo
    }

    /// Reachable instructions in postorder.
    #[must_use]
    pub fn postorder(&self) -> Vec<InsnId> {
        self.rpo.iter().rev().copied().collect()
    }

    /// Position of `insn` in reverse postorder, `None` for unreachable instructions.
    #[must_use]
    pub fn rpo_rank(&self, insn: InsnId) -> Option<usize> {
        self.rpo_rank
            .get(insn.index())
            .copied()
            .filter(|&rank| rank != usize::MAX)
    }

    /// Classifies how control leaves the last instruction of each block, for display.
    fn block_exit(&self, body: &MethodBody, block: &BasicBlock) -> FlowType {
        body.instruction(block.last())
            .map_or(FlowType::Sequential, Instruction::flow_type)
    }

    /// Renders the block structure, one line per block with its successor blocks.
    ///
    /// # Errors
    ///
    /// Returns a formatting error if writing to the string fails.
    pub fn render(&self, body: &MethodBody) -> std::result::Result<String, fmt::Error> {
        let mut out = String::new();
        for block in &self.blocks {
            let mut targets: Vec<usize> = self
                .edges(block.last())
                .iter()
                .chain(block.instructions().flat_map(|i| self.exception_edges(i)))
                .filter_map(|edge| self.block_of.get(edge.target().index()).copied())
                .collect();
            targets.sort_unstable();
            targets.dedup();

            write!(
                out,
                "B{} [{}..{}) {:?}",
                block.id,
                block.start,
                block.end,
                self.block_exit(body, block)
            )?;
            if !self.is_reachable(block.start) {
                out.push_str(" unreachable");
            }
            if !targets.is_empty() {
                let list: Vec<String> = targets.iter().map(|t| format!("B{t}")).collect();
                write!(out, " -> {}", list.join(", "))?;
            }
            out.push('\n');
        }
        Ok(out)
    }
}

impl Successors for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.len()
    }

    fn successors(&self, node: InsnId) -> impl Iterator<Item = InsnId> {
        self.edges(node)
            .iter()
            .chain(self.exception_edges(node))
            .map(CfgEdge::target)
    }
}
