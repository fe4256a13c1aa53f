use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::io::Write;
use std::rc::Rc;

use bramble_expr::{AllocFailure, Node, Op};

pub mod bindings;
pub mod compare;
mod eval;
pub mod once;
mod position;
pub mod result;
mod stringmatch;
mod treematch;

pub use bindings::{Bindings, Bound};
pub use result::MatchResult;

/// Nesting limit for match and evaluation calls.
pub const DEFAULT_MAX_DEPTH: u32 = 2_000;

/// Bytes of native stack one top-level call may use. Fits the 2 MiB of a spawned thread.
pub const DEFAULT_STACK_BUDGET: usize = 1 << 20;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    /// A fallible reservation (binding stacks, substring copies) failed. Node
    /// allocation itself still aborts when memory runs out.
    OutOfMemory,
    /// The nesting limit or the stack budget was reached at the given depth.
    TooDeep(u32),
}

impl Debug for MatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchError::OutOfMemory => write!(f, "OutOfMemory"),
            MatchError::TooDeep(d) => write!(f, "TooDeep({})", d),
        }
    }
}

impl Display for MatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchError::OutOfMemory => write!(f, "out of memory"),
            MatchError::TooDeep(d) => write!(f, "recursion limit reached at depth {}", d),
        }
    }
}

impl std::error::Error for MatchError {}

impl From<AllocFailure> for MatchError {
    fn from(_: AllocFailure) -> Self { MatchError::OutOfMemory }
}

/// A finished top-level match.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Outcome {
    pub result: MatchResult,
    /// The operator a `_` pattern last stood for during this match.
    pub last_op: Option<Op>,
}

pub type Builtin = Rc<dyn Fn(&mut Machine, &Node) -> Result<Node, MatchError>>;

/// Matcher and evaluator state: the symbol table, the builtin functions and the
/// operator most recently taken by a `_` pattern.
pub struct Machine {
    pub bindings: Bindings,
    builtins: HashMap<Box<[u8]>, Builtin>,
    max_depth: u32,
    stack_budget: usize,
    /// Stack address where the running top-level call started.
    stack_base: Option<usize>,
    last_op: Option<Op>,
    output: Box<dyn Write>,
}

#[inline(always)]
fn stack_mark() -> usize {
    let mark = 0u8;
    std::hint::black_box(&mark) as *const u8 as usize
}

impl Default for Machine {
    fn default() -> Self { Machine::new() }
}

impl Machine {
    pub fn new() -> Machine {
        let mut m = Machine {
            bindings: Bindings::new(),
            builtins: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            stack_budget: DEFAULT_STACK_BUDGET,
            stack_base: None,
            last_op: None,
            output: Box::new(std::io::stdout()),
        };
        eval::install_builtins(&mut m);
        m
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Machine {
        self.max_depth = max_depth;
        self
    }

    /// Raises or lowers the stack a top-level call may use; callers running on a
    /// larger thread stack can afford more.
    pub fn with_stack_budget(mut self, bytes: usize) -> Machine {
        self.stack_budget = bytes;
        self
    }

    /// Where `out$` writes.
    pub fn with_output(mut self, output: impl Write + 'static) -> Machine {
        self.output = Box::new(output);
        self
    }

    pub fn define_builtin(&mut self, name: &str, f: impl Fn(&mut Machine, &Node) -> Result<Node, MatchError> + 'static) {
        self.builtins.insert(name.as_bytes().into(), Rc::new(f));
    }

    pub fn max_depth(&self) -> u32 { self.max_depth }

    /// The operator the last successful `_` stood for, as `x_y` rebuilds with.
    pub fn last_op(&self) -> Option<Op> { self.last_op }

    #[inline]
    fn enter(&self, depth: u32) -> Result<u32, MatchError> {
        let used = self.stack_base.map_or(0, |base| base.abs_diff(stack_mark()));
        if depth >= self.max_depth || used > self.stack_budget {
            Err(MatchError::TooDeep(depth))
        } else {
            Ok(depth + 1)
        }
    }

    /// Runs a top-level call, measuring stack use from here unless an enclosing call
    /// (a builtin evaluating again, say) already does.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Machine) -> Result<T, MatchError>) -> Result<T, MatchError> {
        if self.stack_base.is_some() { return f(self) }
        self.stack_base = Some(stack_mark());
        let out = f(self);
        self.stack_base = None;
        out
    }

    fn observe(&mut self, f: impl FnOnce(&mut Machine) -> Result<MatchResult, MatchError>) -> Result<Outcome, MatchError> {
        let outer = self.last_op.take();
        let result = self.guarded(f);
        let found = self.last_op;
        if found.is_none() { self.last_op = outer }
        Ok(Outcome { result: result?, last_op: found })
    }

    /// Matches `subject` against `pattern` as trees, binding pattern variables.
    pub fn match_tree(&mut self, subject: &Node, pattern: &Node) -> Result<Outcome, MatchError> {
        self.observe(|m| m.tree(0, subject, pattern, None, 0, Some(subject), None))
    }

    /// Matches the text of the leaf `subject` against `pattern`. Operator subjects never match.
    pub fn match_string(&mut self, subject: &Node, pattern: &Node) -> Result<Outcome, MatchError> {
        self.observe(|m| m.string_subject(0, subject, pattern))
    }
}
