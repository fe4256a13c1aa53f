use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::mem;
use std::rc::Rc;

use smallvec::SmallVec;

pub mod flags;
pub mod number;

use flags::*;

/// Binary operators, in increasing binding strength. The discriminant order is also
/// the structural order used by [`equal`].
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    Equals,
    Dot,
    Comma,
    Or,
    And,
    Match,
    White,
    Plus,
    Times,
    Exp,
    Log,
    Dif,
    Fuu,
    Fun,
    Underscore,
}

impl Op {
    pub const ALL: [Op; 15] = [Op::Equals, Op::Dot, Op::Comma, Op::Or, Op::And, Op::Match, Op::White,
        Op::Plus, Op::Times, Op::Exp, Op::Log, Op::Dif, Op::Fuu, Op::Fun, Op::Underscore];

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Equals => "=",
            Op::Dot => ".",
            Op::Comma => ",",
            Op::Or => "|",
            Op::And => "&",
            Op::Match => ":",
            Op::White => " ",
            Op::Plus => "+",
            Op::Times => "*",
            Op::Exp => "^",
            Op::Log => "\\L",
            Op::Dif => "\\D",
            Op::Fuu => "'",
            Op::Fun => "$",
            Op::Underscore => "_",
        }
    }

    #[inline(always)]
    pub fn precedence(self) -> u8 { self as u8 }

    /// Operators whose chains are sequences with a neutral element.
    #[inline(always)]
    pub fn is_sequence(self) -> bool { matches!(self, Op::White | Op::Plus | Op::Times) }
}

/// A fallible reservation could not be satisfied.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AllocFailure;

impl Debug for AllocFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "AllocFailure") }
}

impl std::fmt::Display for AllocFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "memory allocation failed") }
}

impl std::error::Error for AllocFailure {}

#[derive(Clone)]
pub enum Body {
    Leaf(Box<[u8]>),
    Op(Op, Node, Node),
}

thread_local! {
    static LIVE: Cell<usize> = const { Cell::new(0) };
}

/// Number of node allocations currently alive on this thread.
pub fn live_nodes() -> usize { LIVE.try_with(|c| c.get()).unwrap_or(0) }

pub struct NodeData {
    flags: Cell<u32>,
    body: Body,
}

impl NodeData {
    fn new(flags: u32, body: Body) -> NodeData {
        let _ = LIVE.try_with(|c| c.set(c.get() + 1));
        NodeData { flags: Cell::new(flags), body }
    }

    #[inline(always)]
    pub fn flags(&self) -> u32 { self.flags.get() }

    #[inline(always)]
    pub fn set_flags(&mut self, f: u32) { self.flags.set(f) }

    pub fn body(&self) -> &Body { &self.body }

    pub fn children_mut(&mut self) -> Option<(&mut Node, &mut Node)> {
        match &mut self.body {
            Body::Op(_, l, r) => Some((l, r)),
            Body::Leaf(_) => None,
        }
    }
}

impl Clone for NodeData {
    fn clone(&self) -> Self { NodeData::new(self.flags.get(), self.body.clone()) }
}

impl Drop for NodeData {
    fn drop(&mut self) {
        let _ = LIVE.try_with(|c| c.set(c.get().saturating_sub(1)));
        // long right spines are released iteratively
        let mut next = match mem::replace(&mut self.body, Body::Leaf(Box::default())) {
            Body::Op(_, _, right) => right,
            Body::Leaf(_) => return,
        };
        while let Ok(mut data) = Rc::try_unwrap(next.0) {
            next = match mem::replace(&mut data.body, Body::Leaf(Box::default())) {
                Body::Op(_, _, right) => right,
                Body::Leaf(_) => return,
            };
        }
    }
}

/// Shared handle on a tree node. Cloning shares, dropping releases, and
/// [`Node::isolated`] gives copy-on-write access.
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

struct Neutrals {
    nil: Node,
    zero: Node,
    one: Node,
    nil_not_neutral: Node,
    zero_not_neutral: Node,
    one_not_neutral: Node,
}

thread_local! {
    static NEUTRALS: Neutrals = {
        let nil = READY | SUCCESS;
        let zero = READY | SUCCESS | QNUMBER | QNUL;
        let one = READY | SUCCESS | QNUMBER;
        Neutrals {
            nil: Node::leaf(b"", nil | IDENT),
            zero: Node::leaf(b"0", zero | IDENT),
            one: Node::leaf(b"1", one | IDENT),
            nil_not_neutral: Node::leaf(b"", nil),
            zero_not_neutral: Node::leaf(b"0", zero),
            one_not_neutral: Node::leaf(b"1", one),
        }
    };
}

impl Node {
    pub fn leaf(text: &[u8], flags: u32) -> Node {
        Node(Rc::new(NodeData::new(flags, Body::Leaf(text.into()))))
    }

    pub fn try_leaf(text: &[u8], flags: u32) -> Result<Node, AllocFailure> {
        let mut v = Vec::new();
        v.try_reserve_exact(text.len()).map_err(|_| AllocFailure)?;
        v.extend_from_slice(text);
        Ok(Node(Rc::new(NodeData::new(flags, Body::Leaf(v.into_boxed_slice())))))
    }

    /// A ready leaf for `text`, which may carry a leading `-`.
    pub fn atom(text: &[u8]) -> Node {
        let nr = number::fullnumbercheck(text) & !DEFINITELYNONUMBER;
        let text = if nr & MINUS != 0 { &text[1..] } else { text };
        Node::leaf(text, READY | SUCCESS | nr)
    }

    pub fn binary(op: Op, left: Node, right: Node) -> Node {
        Node::binary_with_flags(op, left, right, SUCCESS)
    }

    pub fn binary_with_flags(op: Op, left: Node, right: Node, flags: u32) -> Node {
        Node(Rc::new(NodeData::new(flags, Body::Op(op, left, right))))
    }

    /// Decimal integer leaf, as produced for position bindings.
    pub fn integer(n: i64) -> Result<Node, AllocFailure> {
        let text = n.unsigned_abs().to_string();
        let mut flags = READY | SUCCESS | QNUMBER;
        if n < 0 { flags |= MINUS }
        if n == 0 { flags |= QNUL }
        Node::try_leaf(text.as_bytes(), flags)
    }

    pub fn nil() -> Node { NEUTRALS.with(|n| n.nil.clone()) }
    pub fn zero() -> Node { NEUTRALS.with(|n| n.zero.clone()) }
    pub fn one() -> Node { NEUTRALS.with(|n| n.one.clone()) }
    pub fn nil_not_neutral() -> Node { NEUTRALS.with(|n| n.nil_not_neutral.clone()) }
    pub fn zero_not_neutral() -> Node { NEUTRALS.with(|n| n.zero_not_neutral.clone()) }
    pub fn one_not_neutral() -> Node { NEUTRALS.with(|n| n.one_not_neutral.clone()) }

    /// The neutral element of a sequence operator.
    pub fn neutral(op: Op) -> Node {
        match op {
            Op::Plus => Node::zero(),
            Op::Times => Node::one(),
            _ => Node::nil(),
        }
    }

    #[inline(always)]
    pub fn ptr_eq(a: &Node, b: &Node) -> bool { Rc::ptr_eq(&a.0, &b.0) }

    /// Another owner of the same node.
    #[inline(always)]
    pub fn same_as(&self) -> Node { self.clone() }

    #[inline(always)]
    pub fn is_shared(&self) -> bool { Rc::strong_count(&self.0) > 1 }

    /// Mutable access, cloning the node first (children are shared) when it has other owners.
    pub fn isolated(&mut self) -> &mut NodeData { Rc::make_mut(&mut self.0) }

    #[inline(always)]
    pub fn flags(&self) -> u32 { self.0.flags.get() }

    #[inline(always)]
    pub fn has(&self, f: u32) -> bool { self.0.flags.get() & f != 0 }

    pub fn body(&self) -> &Body { &self.0.body }

    #[inline(always)]
    pub fn is_op(&self) -> bool { matches!(self.0.body, Body::Op(..)) }

    #[inline(always)]
    pub fn op(&self) -> Option<Op> {
        match &self.0.body {
            Body::Op(op, _, _) => Some(*op),
            Body::Leaf(_) => None,
        }
    }

    #[inline(always)]
    pub fn children(&self) -> Option<(Op, &Node, &Node)> {
        match &self.0.body {
            Body::Op(op, l, r) => Some((*op, l, r)),
            Body::Leaf(_) => None,
        }
    }

    pub fn left(&self) -> Option<&Node> { self.children().map(|(_, l, _)| l) }
    pub fn right(&self) -> Option<&Node> { self.children().map(|(_, _, r)| r) }

    /// Leaf text without its sign; empty for operators.
    #[inline(always)]
    pub fn text(&self) -> &[u8] {
        match &self.0.body {
            Body::Leaf(t) => t,
            Body::Op(..) => &[],
        }
    }

    /// Leaf text with a leading `-` when the leaf is negative.
    pub fn signed_text(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.text().len() + 1);
        if self.has_minus_sign() { v.push(b'-') }
        v.extend_from_slice(self.text());
        v
    }

    #[inline(always)]
    pub fn has_minus_sign(&self) -> bool { !self.is_op() && self.has(MINUS) }

    /// `~` without filters.
    #[inline(always)]
    pub fn is_nothing(&self) -> bool { nothing(self.flags()) }

    #[inline(always)]
    pub fn is_object(&self) -> bool { self.op() == Some(Op::Equals) }

    /// A leaf number usable in exact comparisons.
    #[inline(always)]
    pub fn is_rational_comp(&self) -> bool {
        !self.is_op() && self.flags() & (QNUMBER | QDOUBLE | VISIBLE_FLAGS_NON_COMP) == QNUMBER
    }

    /// A leaf number that may carry comparison flags but no binding flags.
    #[inline(always)]
    pub fn is_rational_weak(&self) -> bool {
        !self.is_op() && self.flags() & (QNUMBER | INDIRECT | DOUBLY_INDIRECT | FENCE | UNIFY) == QNUMBER
    }

    /// A proper fraction with no visible flags.
    #[inline(always)]
    pub fn is_rat_rat(&self) -> bool {
        !self.is_op() && self.flags() & (QNUMBER | QFRACTION | QDOUBLE | VISIBLE_FLAGS) == QNUMBER | QFRACTION
    }

    /// Shallow copy carrying `flags`; the children are shared.
    pub fn with_flags(&self, flags: u32) -> Node {
        let mut n = self.clone();
        n.isolated().set_flags(flags);
        n
    }

    /// Same as [`Node::with_flags`] but reuses the node when this was its only owner.
    pub fn into_flags(mut self, flags: u32) -> Node {
        if self.flags() != flags { self.isolated().set_flags(flags) }
        self
    }

    /// A copy that is never mistaken for a neutral element.
    pub fn not_ident(&self) -> Node {
        if self.has(IDENT) { self.with_flags(self.flags() & !IDENT) } else { self.clone() }
    }

    /// Remembers a once verdict (`IMPLIEDFENCE` or `STRING_IMPLIEDFENCE`). Shared pattern
    /// nodes all see the mark.
    #[inline(always)]
    pub fn mark_once(&self, memo: u32) { self.0.flags.set(self.0.flags.get() | memo) }

    /// Clears memoised once marks throughout a pattern.
    pub fn clean_once_pattern(&self) {
        let mut cur = self;
        loop {
            cur.0.flags.set(cur.0.flags.get() & !ONCE_MEMO);
            match cur.children() {
                Some((_, l, r)) => {
                    l.clean_once_pattern();
                    cur = r;
                }
                None => break,
            }
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.body() {
            Body::Leaf(t) => write!(f, "Leaf({:?}, {:#x})", String::from_utf8_lossy(t), self.flags()),
            Body::Op(op, l, r) => write!(f, "{:?}({:?}, {:?}, {:#x})", op, l, r, self.flags()),
        }
    }
}

/// Structural order ignoring pattern flags. Numbers compare by value.
pub fn equal(a: &Node, b: &Node) -> Ordering {
    let (mut a, mut b) = (a, b);
    while !Node::ptr_eq(a, b) {
        match (a.children(), b.children()) {
            (Some((ao, al, ar)), Some((bo, bl, br))) => {
                match ao.cmp(&bo).then_with(|| equal(al, bl)) {
                    Ordering::Equal => { a = ar; b = br; }
                    o => return o,
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => {
                return match (a.is_rational_comp(), b.is_rational_comp()) {
                    (true, true) => number::q_compare(a.text(), a.flags(), b.text(), b.flags()),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a.has_minus_sign().cmp(&b.has_minus_sign())
                        .then_with(|| a.text().cmp(b.text())),
                }
            }
        }
    }
    Ordering::Equal
}

/// Rebuilds the right spine from `root` down to `target`, putting `replacement` in
/// `target`'s place. Everything off the spine stays shared. `None` when `target` is not
/// on the right spine of `root`.
pub fn backbone(root: &Node, target: &Node, replacement: Node) -> Option<Node> {
    let mut spine: SmallVec<[(Op, &Node, u32); 16]> = SmallVec::new();
    let mut cur = root;
    while !Node::ptr_eq(cur, target) {
        let (op, left, right) = cur.children()?;
        spine.push((op, left, cur.flags()));
        cur = right;
    }
    Some(spine.into_iter().rev().fold(replacement, |acc, (op, left, fl)| {
        Node::binary_with_flags(op, left.clone(), acc, fl & !ONCE_MEMO)
    }))
}

/// The part of `chain` before `cutoff`, where `cutoff` hangs off the right spine.
pub fn copy_to_cutoff(chain: &Node, cutoff: &Node) -> Node {
    let mut cur = chain;
    while let Some((_, left, right)) = cur.children() {
        if Node::ptr_eq(right, cutoff) {
            return if Node::ptr_eq(cur, chain) {
                left.clone()
            } else {
                backbone(chain, cur, left.clone()).unwrap_or_else(|| chain.clone())
            }
        }
        cur = right;
    }
    chain.not_ident()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Node {
        let mut it = items.iter().rev();
        let last = Node::atom(it.next().unwrap().as_bytes());
        it.fold(last, |acc, s| Node::binary(Op::White, Node::atom(s.as_bytes()), acc))
    }

    #[test]
    fn atoms_carry_number_flags() {
        let n = Node::atom(b"-12");
        assert_eq!(n.text(), b"12");
        assert!(n.has(MINUS) && n.has(QNUMBER));
        assert_eq!(n.signed_text(), b"-12".to_vec());
        assert!(!Node::atom(b"abc").has(QNUMBER));
    }

    #[test]
    fn isolated_copies_shared_nodes_only() {
        let mut a = Node::atom(b"x");
        let b = a.clone();
        let f = a.flags() | FENCE;
        a.isolated().set_flags(f);
        assert!(a.has(FENCE));
        assert!(!b.has(FENCE));
        assert!(!Node::ptr_eq(&a, &b));

        let mut c = Node::atom(b"y");
        let before = Rc::as_ptr(&c.0);
        c.isolated().set_flags(0);
        assert_eq!(before, Rc::as_ptr(&c.0));
    }

    #[test]
    fn cutoff_slices_share_the_left_children() {
        let l = list(&["a", "b", "c", "d"]);
        let cut = l.right().unwrap().right().unwrap().clone();
        let head = copy_to_cutoff(&l, &cut);
        assert_eq!(equal(&head, &list(&["a", "b"])), Ordering::Equal);
        assert!(Node::ptr_eq(head.left().unwrap(), l.left().unwrap()));

        let first = copy_to_cutoff(&l, l.right().unwrap());
        assert!(Node::ptr_eq(&first, l.left().unwrap()));
    }

    #[test]
    fn backbone_replaces_one_slot() {
        let l = list(&["a", "b", "c"]);
        let target = l.right().unwrap().clone();
        let out = backbone(&l, &target, Node::atom(b"z")).unwrap();
        assert_eq!(equal(&out, &list(&["a", "z"])), Ordering::Equal);
        assert!(backbone(&l, &Node::atom(b"q"), Node::nil()).is_none());
    }

    #[test]
    fn equal_orders_numbers_by_value() {
        assert_eq!(equal(&Node::atom(b"1/2"), &Node::atom(b"2/4")), Ordering::Equal);
        assert_eq!(equal(&Node::atom(b"-1"), &Node::atom(b"1")), Ordering::Less);
        assert_eq!(equal(&Node::atom(b"2"), &Node::atom(b"a")), Ordering::Less);
        assert_ne!(equal(&list(&["a", "b"]), &Node::binary(Op::Plus, Node::atom(b"a"), Node::atom(b"b"))), Ordering::Equal);
    }

    #[test]
    fn neutral_copies_are_distinct() {
        assert!(Node::ptr_eq(&Node::zero(), &Node::neutral(Op::Plus)));
        assert!(Node::zero().has(IDENT));
        assert!(!Node::zero_not_neutral().has(IDENT));
        let c = Node::nil().not_ident();
        assert!(!c.has(IDENT) && !Node::ptr_eq(&c, &Node::nil()));
    }

    #[test]
    fn long_chains_drop_without_recursing() {
        let before = live_nodes();
        let mut l = Node::atom(b"end");
        for _ in 0..200_000 { l = Node::binary(Op::White, Node::atom(b"x"), l) }
        drop(l);
        assert_eq!(live_nodes(), before);
    }
}
