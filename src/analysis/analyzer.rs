//! The worklist fixed-point analyzer.
//!
//! [`Analyzer`] computes, for every reachable instruction of a [`MethodBody`], the [`Frame`] on
//! entry to that instruction. Frames are seeded at the entry instruction from the method's
//! declared parameters, pushed through each instruction's transfer function and joined into
//! the frames of its successors until nothing changes any more.
//!
//! # Configuration
//!
//! An analyzer is configured once through [`AnalyzerBuilder`] and can then be shared freely:
//! every run owns its frames and worklist, and the configured factories, host and validator
//! are only read.
//!
//! - [`ValueKind`] selects whether static calls may be realized through an
//!   [`InvocationHost`]
//! - [`StaticGetFactory`] / [`StaticInvokeFactory`] resolve static field reads and static calls
//! - [`Validator`] decides which simulation failures are tolerated
//!
//! Without any factories every field read and call result is unresolved; without a validator
//! every simulation failure aborts the run.
//!
//! # Examples
//!
//! ```rust
//! use stackflow::{AbstractValue, Analyzer, ConstValue, FieldConstants, FieldRef, MethodAssembler};
//!
//! let mut asm = MethodAssembler::new("Demo", "seed", "(I)I")?;
//! asm.getstatic("Config", "SEED", "I")
//!     .iload(0)
//!     .iadd()
//!     .iconst(3)
//!     .imul()
//!     .ireturn();
//! let method = asm.finish()?;
//!
//! let seed = FieldRef::new("Config", "SEED", "I")?;
//! let analyzer = Analyzer::builder()
//!     .static_get(FieldConstants::new().with(seed, ConstValue::Int(7)))
//!     .build()?;
//!
//! let analysis = analyzer.analyze(&method)?;
//! // The parameter is unknown, so the sum and everything after it is too
//! assert!(analysis.return_value().is_some_and(AbstractValue::is_unresolved));
//! # Ok::<(), stackflow::Error>(())
//! ```

use std::{collections::BTreeSet, fmt, sync::Arc};

use log::{debug, trace, warn};
use rayon::prelude::*;

use crate::{
    analysis::{
        interpreter::Interpreter, AbstractValue, CachingHost, CfgEdgeKind, ControlFlowGraph,
        Frame, InvocationHost, JoinSemiLattice, SimulationFailure, StaticGetFactory,
        StaticInvokeFactory, Validator,
    },
    model::{InsnId, Instruction, MethodBody},
    Error, Result,
};

/// Class pushed on entry to a catch-all handler.
const THROWABLE: &str = "java/lang/Throwable";

/// How far the analyzer may go to obtain concrete values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum ValueKind {
    /// Constants only; no code is ever executed.
    #[default]
    Constant,
    /// Static calls whose arguments are all concrete are realized through the configured
    /// [`InvocationHost`] when the invoke factory cannot settle them.
    Simulated,
}

/// The immutable bindings of an [`Analyzer`].
///
/// Obtained from [`AnalyzerBuilder`]; the default configuration has no factories, no host
/// and no validator.
#[derive(Clone, Default)]
pub struct AnalyzerConfig {
    pub(crate) value_kind: ValueKind,
    pub(crate) static_get: Option<Arc<dyn StaticGetFactory>>,
    pub(crate) static_invoke: Option<Arc<dyn StaticInvokeFactory>>,
    pub(crate) host: Option<Arc<dyn InvocationHost>>,
    pub(crate) validator: Option<Arc<dyn Validator>>,
}

impl AnalyzerConfig {
    /// The configured value kind.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    /// Returns `true` if a static get factory is configured.
    #[must_use]
    pub fn has_static_get(&self) -> bool {
        self.static_get.is_some()
    }

    /// Returns `true` if a static invoke factory is configured.
    #[must_use]
    pub fn has_static_invoke(&self) -> bool {
        self.static_invoke.is_some()
    }

    /// Returns `true` if an invocation host is configured.
    #[must_use]
    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    /// Returns `true` if a validator is configured.
    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("value_kind", &self.value_kind)
            .field("static_get", &self.has_static_get())
            .field("static_invoke", &self.has_static_invoke())
            .field("host", &self.has_host())
            .field("validator", &self.has_validator())
            .finish()
    }
}

/// Fluent builder for [`Analyzer`].
///
/// # Examples
///
/// ```rust
/// use stackflow::{
///     Analyzer, HostError, HostErrorKind, HostValue, MethodRef, SyntheticMethods, ValueKind,
/// };
///
/// let analyzer = Analyzer::builder()
///     .value_kind(ValueKind::Simulated)
///     .host(|_: &MethodRef, _: &[HostValue]| -> Result<Option<HostValue>, HostError> {
///         Err(HostError::new(HostErrorKind::Unsupported, "no runtime attached"))
///     })
///     .cache_simulations(true)
///     .validator(SyntheticMethods)
///     .build()?;
/// assert!(analyzer.config().has_host());
/// # Ok::<(), stackflow::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct AnalyzerBuilder {
    config: AnalyzerConfig,
    cache_simulations: bool,
}

impl AnalyzerBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the value kind.
    #[must_use]
    pub fn value_kind(mut self, kind: ValueKind) -> Self {
        self.config.value_kind = kind;
        self
    }

    /// Sets the resolver for static field reads.
    #[must_use]
    pub fn static_get<F: StaticGetFactory + 'static>(mut self, factory: F) -> Self {
        self.config.static_get = Some(Arc::new(factory));
        self
    }

    /// Sets the resolver for static invocations.
    #[must_use]
    pub fn static_invoke<F: StaticInvokeFactory + 'static>(mut self, factory: F) -> Self {
        self.config.static_invoke = Some(Arc::new(factory));
        self
    }

    /// Sets the host used to realize simulated invocations.
    #[must_use]
    pub fn host<H: InvocationHost + 'static>(mut self, host: H) -> Self {
        self.config.host = Some(Arc::new(host));
        self
    }

    /// Memoizes host answers per method and arguments for the lifetime of the analyzer.
    #[must_use]
    pub fn cache_simulations(mut self, enabled: bool) -> Self {
        self.cache_simulations = enabled;
        self
    }

    /// Sets the policy deciding which simulation failures are tolerated.
    #[must_use]
    pub fn validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.config.validator = Some(Arc::new(validator));
        self
    }

    /// Creates the analyzer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if simulation or caching is requested without a host.
    pub fn build(self) -> Result<Analyzer> {
        let mut config = self.config;
        if config.value_kind == ValueKind::Simulated && config.host.is_none() {
            return Err(Error::Configuration(
                "simulated values require an invocation host".to_string(),
            ));
        }
        if self.cache_simulations {
            let Some(host) = config.host.take() else {
                return Err(Error::Configuration(
                    "caching simulations requires an invocation host".to_string(),
                ));
            };
            config.host = Some(Arc::new(CachingHost::from_shared(host)));
        }
        Ok(Analyzer { config })
    }
}

/// Computes entry frames for method bodies.
///
/// `Analyzer` is `Send + Sync`; one instance can drive any number of concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    /// Creates an analyzer with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts configuring an analyzer.
    #[must_use]
    pub fn builder() -> AnalyzerBuilder {
        AnalyzerBuilder::new()
    }

    /// Creates an analyzer from an existing configuration.
    #[must_use]
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Analyzer { config }
    }

    /// The configuration of this analyzer.
    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyzes one method to its fixed point.
    ///
    /// # Errors
    ///
    /// - [`Error::Malformed`] if the local table cannot hold the arguments
    /// - [`Error::MalformedGraph`] if the code is structurally broken
    /// - [`Error::Frame`] if an instruction does not fit the frame reaching it, or two
    ///   incompatible frames meet
    /// - [`Error::Simulation`] if realizing a call fails and the validator does not resolve it
    pub fn analyze(&self, method: &MethodBody) -> Result<Analysis> {
        method.check_locals()?;
        let cfg = ControlFlowGraph::build(method)?;
        debug!(
            "Analyzing {} ({} instructions, {} blocks)",
            method.id(),
            method.len(),
            cfg.block_count()
        );

        let mut run = Run {
            method,
            cfg: &cfg,
            config: &self.config,
            frames: vec![None; method.len()],
            worklist: BTreeSet::new(),
            resolved_failures: Vec::new(),
            iterations: 0,
        };
        run.seed()?;
        run.solve()?;

        let Run {
            frames,
            resolved_failures,
            iterations,
            ..
        } = run;

        let unreachable: Vec<InsnId> = frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.is_none())
            .map(|(index, _)| InsnId::new(index))
            .collect();
        let return_value = return_value(method, &frames)?;

        debug!(
            "Analyzed {} in {} iterations, {} unreachable, {} resolved failures",
            method.id(),
            iterations,
            unreachable.len(),
            resolved_failures.len()
        );

        Ok(Analysis {
            frames,
            unreachable,
            resolved_failures,
            iterations,
            return_value,
            cfg,
        })
    }

    /// Analyzes independent methods in parallel.
    ///
    /// Results are returned in the order of `methods`.
    #[must_use]
    pub fn analyze_all(&self, methods: &[MethodBody]) -> Vec<Result<Analysis>> {
        methods
            .par_iter()
            .map(|method| self.analyze(method))
            .collect()
    }
}

/// State of one analysis run.
struct Run<'a> {
    method: &'a MethodBody,
    cfg: &'a ControlFlowGraph,
    config: &'a AnalyzerConfig,
    frames: Vec<Option<Frame>>,
    /// Pending instructions, ordered by reverse postorder rank
    worklist: BTreeSet<(usize, InsnId)>,
    resolved_failures: Vec<SimulationFailure>,
    iterations: usize,
}

impl Run<'_> {
    /// Installs the entry frame: the receiver is a known instance of the declaring class,
    /// parameters are unresolved.
    fn seed(&mut self) -> Result<()> {
        let entry = self.cfg.entry();
        let at_entry = |source| Error::Frame {
            insn: entry,
            source,
        };

        let mut frame = Frame::new(
            usize::from(self.method.max_locals),
            self.method.max_stack.map(usize::from),
        );
        if !self.method.is_static() {
            frame
                .set_local(0, AbstractValue::Reference(Arc::clone(&self.method.owner)))
                .map_err(at_entry)?;
        }
        for parameter in self.method.parameters() {
            frame
                .set_local(parameter.slot, AbstractValue::Unresolved(parameter.ty.size()))
                .map_err(at_entry)?;
        }

        self.frames[entry.index()] = Some(frame);
        self.enqueue(entry);
        Ok(())
    }

    fn solve(&mut self) -> Result<()> {
        let (method, cfg) = (self.method, self.cfg);
        let interpreter = Interpreter::new(self.config);

        while let Some((_, insn)) = self.worklist.pop_first() {
            self.iterations += 1;
            let Some(entry) = self.frames[insn.index()].clone() else {
                continue;
            };
            let instruction = method
                .instruction(insn)
                .ok_or_else(|| graph_error!(insn, "instruction missing from body"))?;
            trace!("{insn}: {instruction} <- {entry}");

            for edge in cfg.exception_edges(insn) {
                let CfgEdgeKind::Exception { catch_type } = edge.kind() else {
                    continue;
                };
                let mut handler = entry.clone();
                handler.clear_stack();
                handler
                    .push(AbstractValue::Reference(
                        catch_type.clone().unwrap_or_else(|| Arc::from(THROWABLE)),
                    ))
                    .map_err(|source| Error::Frame { insn, source })?;
                self.propagate(edge.target(), &handler)?;
            }

            let mut out = entry.clone();
            match interpreter.execute(insn, instruction, &mut out) {
                Ok(()) => {}
                Err(Error::Simulation(failure)) => {
                    if !self.resolve(&failure) {
                        return Err(Error::Simulation(failure));
                    }
                    out = entry;
                    Interpreter::skip_invoke(insn, instruction, &mut out)?;
                }
                Err(error) => return Err(error),
            }

            for target in cfg.normal_successors(insn) {
                self.propagate(target, &out)?;
            }
        }
        Ok(())
    }

    /// Offers a simulation failure to the validator, recording it when resolved.
    fn resolve(&mut self, failure: &SimulationFailure) -> bool {
        let resolved = self
            .config
            .validator
            .as_ref()
            .is_some_and(|validator| validator.resolve(self.method, &self.frames));
        if !resolved {
            return false;
        }

        warn!("Resolved failure in {}: {failure}", self.method.id());
        if !self
            .resolved_failures
            .iter()
            .any(|known| known.insn() == failure.insn())
        {
            self.resolved_failures.push(failure.clone());
        }
        true
    }

    /// Joins `incoming` into the entry frame of `target`, queueing it on change.
    fn propagate(&mut self, target: InsnId, incoming: &Frame) -> Result<()> {
        let slot = &mut self.frames[target.index()];
        let changed = match slot {
            Some(existing) => existing
                .merge(incoming)
                .map_err(|source| Error::Frame {
                    insn: target,
                    source,
                })?,
            None => {
                *slot = Some(incoming.clone());
                true
            }
        };
        if changed {
            self.enqueue(target);
        }
        Ok(())
    }

    fn enqueue(&mut self, insn: InsnId) {
        let rank = self.cfg.rpo_rank(insn).unwrap_or(usize::MAX);
        self.worklist.insert((rank, insn));
    }
}

/// Joins the values returned by every reachable value-returning instruction.
fn return_value(method: &MethodBody, frames: &[Option<Frame>]) -> Result<Option<AbstractValue>> {
    let mut joined: Option<AbstractValue> = None;
    for (instruction, frame) in method.instructions.iter().zip(frames) {
        let (Instruction::Return(Some(_)), Some(frame)) = (instruction, frame) else {
            continue;
        };
        let Some(value) = frame.top() else {
            continue;
        };
        joined = Some(match joined {
            Some(current) => current.join(value)?,
            None => value.clone(),
        });
    }
    Ok(joined)
}

/// The result of analyzing one method.
#[derive(Debug, Clone)]
pub struct Analysis {
    frames: Vec<Option<Frame>>,
    unreachable: Vec<InsnId>,
    resolved_failures: Vec<SimulationFailure>,
    iterations: usize,
    return_value: Option<AbstractValue>,
    cfg: ControlFlowGraph,
}

impl Analysis {
    /// The frame on entry to `insn`, `None` if the instruction is unreachable.
    #[must_use]
    pub fn frame(&self, insn: InsnId) -> Option<&Frame> {
        self.frames.get(insn.index()).and_then(Option::as_ref)
    }

    /// Entry frames indexed by instruction.
    #[must_use]
    pub fn frames(&self) -> &[Option<Frame>] {
        &self.frames
    }

    /// Instructions never reached, in code order.
    #[must_use]
    pub fn unreachable(&self) -> &[InsnId] {
        &self.unreachable
    }

    /// Returns `true` if `insn` received a frame.
    #[must_use]
    pub fn is_reachable(&self, insn: InsnId) -> bool {
        self.frame(insn).is_some()
    }

    /// Simulation failures the validator resolved, one per instruction, in resolution order.
    #[must_use]
    pub fn resolved_failures(&self) -> &[SimulationFailure] {
        &self.resolved_failures
    }

    /// Number of instructions processed before the fixed point was reached.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Join of the values returned by every reachable value-returning instruction.
    ///
    /// `None` for `void` methods and for methods that never return normally.
    #[must_use]
    pub fn return_value(&self) -> Option<&AbstractValue> {
        self.return_value.as_ref()
    }

    /// The control flow graph the analysis ran on.
    #[must_use]
    pub fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            match frame {
                Some(frame) => writeln!(f, "{:>5}: {frame}", InsnId::new(index))?,
                None => writeln!(f, "{:>5}: unreachable", InsnId::new(index))?,
            }
        }
        Ok(())
    }
}
