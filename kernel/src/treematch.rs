use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use bramble_expr::flags::*;
use bramble_expr::{copy_to_cutoff, equal, Node, Op};
use bramble_frontend::Printed;
use log::*;
use smallvec::SmallVec;

use crate::compare::compare;
use crate::eval::setflgs;
use crate::once::{once_alternative, once_pattern};
use crate::result::MatchResult;
use crate::{Machine, MatchError};

/// A subject chain as seen by the matcher: the part of `sub` before `cutoff`.
struct Slice<'a>(&'a Node, Option<&'a Node>);

impl Display for Slice<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.1 {
            None => write!(f, "{}", Printed(self.0)),
            Some(c) => write!(f, "{}", Printed(&copy_to_cutoff(self.0, c))),
        }
    }
}

/// Final bookkeeping of a match against `pat`: once patterns stop the caller's loop,
/// and a `~` on an operator reverses the outcome.
fn settle(pat: &Node, rmr: MatchResult) -> MatchResult {
    settle_known(pat, rmr, once_pattern(pat))
}

fn settle_known(pat: &Node, mut rmr: MatchResult, once: bool) -> MatchResult {
    if once || (!rmr.success && rmr.fence && !rmr.once) {
        rmr.fence |= pat.has(FENCE);
        rmr.once = true;
    }
    if pat.is_op() { rmr.toggled(pat.is_nothing()) } else { rmr }
}

/// The right operand of a failed alternative: a longer subject only helps if it
/// helped the left one.
fn rejoin(mut rmr: MatchResult, lmr: MatchResult) -> MatchResult {
    if rmr.once && !lmr.once {
        rmr.once = false;
        rmr.position_once = false;
    }
    if rmr.position_max_reached && !lmr.position_max_reached {
        rmr.position_max_reached = false;
        rmr.position_once = false;
    }
    rmr
}

/// An `|` node that a full match would send straight to the alternatives arm.
fn is_plain_alternative(n: &Node) -> bool {
    n.op() == Some(Op::Or)
        && n.flags() & (POSITION | NONIDENT | ATOM | FRACTION | NUMBER) == 0
        && !is_variable(n.flags())
}

/// A leaf without prefixes or text: the left side of the `$x` escape.
fn is_bare_empty(n: &Node) -> bool {
    !n.is_op() && n.flags() & UNOPS == 0 && n.text().is_empty()
}

impl Machine {
    /// Matches the part of `sub` before `cutoff` against `pat`.
    ///
    /// `pos` counts the elements already consumed from `expr`, the enclosing chain of
    /// `op`, and is what `[` patterns test.
    pub(crate) fn tree(&mut self, depth: u32, sub: &Node, pat: &Node, cutoff: Option<&Node>,
                       pos: i64, expr: Option<&Node>, op: Option<Op>) -> Result<MatchResult, MatchError> {
        let depth = self.enter(depth)?;
        if let (Some((_, l, r)), Some(c)) = (sub.children(), cutoff) {
            if Node::ptr_eq(r, c) {
                return self.tree(depth, l, pat, None, pos, expr, op)
            }
        }
        if log_enabled!(target: "match", Level::Trace) {
            trace!(target: "match", "{:>w$}{} : {}", "", Slice(sub, cutoff), Printed(pat), w = depth as usize);
        }

        let flgs = pat.flags();
        if flgs & POSITION != 0 {
            return if flgs & NONIDENT != 0 {
                self.position_guard(depth, pat, |b, sjt| b.copy_insert(sjt, sub, cutoff))
            } else if cutoff.is_some() || !sub.has(IDENT) {
                Ok(MatchResult::position_exhausted())
            } else {
                self.do_position(depth, pat, pos, 0, expr, op, None)
            }
        }

        let mut pat = pat.clone();
        let mut rmr = MatchResult::FALSE;
        let filtered = (flgs & NONIDENT != 0 && (sub.has(IDENT) ^ negation(flgs, NONIDENT)))
            || (flgs & ATOM != 0 && (sub.is_op() ^ negation(flgs, ATOM)))
            || (flgs & FRACTION != 0 && (!sub.is_rat_rat() ^ negation(flgs, FRACTION)))
            || (flgs & NUMBER != 0 && (!sub.is_rational_comp() ^ negation(flgs, NUMBER)));

        if filtered {
            trace!(target: "match", "{:>w$}rejected by a filter", "", w = depth as usize);
        } else if is_variable(flgs) {
            let mut ok = true;
            if pat.is_op() {
                let name = pat.with_flags((flgs & !VISIBLE_FLAGS) | SUCCESS);
                let name = self.eval_at(depth, &name)?;
                rmr = MatchResult::success(name.has(SUCCESS));
                ok = name.has(SUCCESS);
                pat = if name.is_object() {
                    name
                } else {
                    let f = name.flags() | (flgs & VISIBLE_FLAGS);
                    name.into_flags(f)
                };
            }
            if ok {
                if flgs & UNIFY != 0 {
                    if !pat.is_nothing() || sub.is_op() || !sub.text().is_empty() {
                        rmr = if pat.is_op() || !pat.text().is_empty() {
                            if flgs & INDIRECT != 0 {
                                match self.symbol_binding(depth, &pat, flgs & DOUBLY_INDIRECT != 0)? {
                                    Some(loc) if loc.is_object() => MatchResult::success(self.bindings.copy_insert(&loc, sub, cutoff)?),
                                    Some(loc) => {
                                        let loc = self.eval_at(depth, &loc)?;
                                        if self.bindings.copy_insert(&loc, sub, cutoff)? {
                                            MatchResult::success(loc.has(SUCCESS))
                                        } else {
                                            MatchResult::FALSE
                                        }
                                    }
                                    None => MatchResult::success(pat.is_nothing()),
                                }
                            } else {
                                MatchResult::success(self.bindings.copy_insert(&pat, sub, cutoff)?)
                            }
                        } else {
                            MatchResult::TRUE
                        };
                    }
                } else if flgs & INDIRECT != 0 {
                    rmr = match self.symbol_binding(depth, &pat, flgs & DOUBLY_INDIRECT != 0)? {
                        Some(loc) => {
                            loc.clean_once_pattern();
                            self.tree(depth, sub, &loc, cutoff, pos, expr, op)?.toggled(pat.is_nothing())
                        }
                        None => MatchResult::success(pat.is_nothing()),
                    };
                }
            }
        } else {
            match pat.children() {
                Some((pop @ (Op::White | Op::Plus | Op::Times), l, r)) => {
                    return self.sequence(depth, sub, &pat, pop, l, r, cutoff, pos, expr, op)
                }
                Some((Op::Exp, l, r)) => {
                    if let Some((Op::Exp, sl, sr)) = sub.children() {
                        let lmr = self.tree(depth, sl, l, None, 0, Some(sl), None)?;
                        if lmr.success {
                            rmr = self.tree(depth, sr, r, None, 0, Some(sr), None)?;
                        }
                        rmr |= MatchResult::fence_once(lmr);
                    }
                    if !rmr.success {
                        let lmr = self.tree(depth, sub, l, cutoff, pos, expr, op)?;
                        if lmr.success {
                            let one = Node::one();
                            rmr = self.tree(depth, &one, r, None, 0, Some(&one), None)?;
                            if rmr.success { rmr |= MatchResult::fence_once(lmr) }
                        }
                    }
                    rmr.position_max_reached = false;
                }
                Some((Op::Underscore, l, r)) => {
                    if let Some((sop, sl, sr)) = sub.children() {
                        if sop == Op::Equals && sub.has(BUILT_IN) {
                            error!(target: "match", "a built-in object cannot be split by _");
                            rmr = MatchResult::ONCE;
                        } else {
                            let lmr = self.tree(depth, sl, l, None, 0, Some(sl), None)?;
                            if lmr.success {
                                rmr = self.tree(depth, sr, r, cutoff, 0, Some(sr), None)?;
                                if rmr.success { self.last_op = Some(sop) }
                            }
                            rmr |= MatchResult::fence_once(lmr);
                        }
                        if !sop.is_sequence() { rmr.position_max_reached = false }
                    }
                }
                Some((Op::And, l, r)) => {
                    let lmr = self.tree(depth, sub, l, cutoff, pos, expr, op)?;
                    if lmr.success {
                        let loc = self.eval_at(depth, r)?;
                        rmr = if loc.has(SUCCESS) {
                            MatchResult { once: loc.has(FENCE), ..MatchResult::TRUE }
                        } else if loc.has(FENCE) {
                            MatchResult { fence: true, ..MatchResult::ONCE }
                        } else {
                            MatchResult::FALSE
                        };
                    }
                    rmr |= MatchResult::fence_once(lmr);
                }
                Some((Op::Match, l, r)) => {
                    let lmr = self.tree(depth, sub, l, cutoff, pos, expr, op)?;
                    if lmr.success {
                        let right = if pat.has(ATOM) && !negation(pat.flags(), ATOM) {
                            self.string_subject(depth, sub, r)?
                        } else {
                            self.tree(depth, sub, r, cutoff, pos, expr, op)?
                        };
                        rmr = MatchResult::success(right.success);
                    }
                    rmr |= MatchResult::fence_once(lmr);
                    rmr.position_max_reached |= lmr.position_max_reached;
                }
                Some((Op::Or, _, _)) => {
                    rmr = self.alternatives(depth, sub, &pat, cutoff, pos, expr, op)?;
                }
                Some((Op::Fun, l, r)) if is_bare_empty(l) => {
                    rmr = self.escaped(depth, sub, r)?;
                }
                Some((Op::Fun | Op::Fuu, _, _)) => {
                    if !self.function_pattern(depth, sub, &pat, cutoff, pos, expr, op, &mut rmr)? {
                        self.same_shape(depth, sub, &pat, flgs, &mut rmr)?;
                    }
                }
                _ => self.same_shape(depth, sub, &pat, flgs, &mut rmr)?,
            }
        }

        Ok(settle(&pat, rmr))
    }

    /// `l|r` patterns. The right spine of plain alternatives is walked in a loop, so
    /// long generated chains cost no stack; the per-level bookkeeping is replayed
    /// innermost first.
    #[allow(clippy::too_many_arguments)]
    fn alternatives(&mut self, depth: u32, sub: &Node, pat: &Node, cutoff: Option<&Node>,
                    pos: i64, expr: Option<&Node>, op: Option<Op>) -> Result<MatchResult, MatchError> {
        let mut trail: SmallVec<[(MatchResult, Node); 8]> = SmallVec::new();
        let mut cur = pat.clone();
        let (mut rmr, last) = loop {
            let Some((_, l, r)) = cur.children() else { return Ok(MatchResult::FALSE) };
            let (l, r) = (l.clone(), r.clone());
            let lmr = self.tree(depth, sub, &l, cutoff, pos, expr, op)?;
            if lmr.success || lmr.fence {
                let rmr = if lmr.once && !once_pattern(&r) {
                    MatchResult::success(lmr.success)
                } else {
                    MatchResult { success: lmr.success, once: lmr.once, ..MatchResult::FALSE }
                };
                break (rmr, r)
            }
            if is_plain_alternative(&r) {
                trail.push((lmr, r.clone()));
                cur = r;
            } else {
                break (rejoin(self.tree(depth, sub, &r, cutoff, pos, expr, op)?, lmr), r)
            }
        };
        if trail.is_empty() { return Ok(rmr) }
        // verdicts are carried up the spine instead of being recomputed per level
        let mut right_once = once_pattern(&last);
        while let Some((lmr, level)) = trail.pop() {
            right_once = once_alternative(&level, right_once);
            rmr = rejoin(settle_known(&level, rmr, right_once), lmr);
        }
        Ok(rmr)
    }

    /// `l r`, `l+r` and `l*r` patterns: tries every split of the subject chain.
    #[allow(clippy::too_many_arguments)]
    fn sequence(&mut self, depth: u32, sub: &Node, pat: &Node, pop: Op, l: &Node, r: &Node,
                cutoff: Option<&Node>, pos: i64, expr: Option<&Node>, op: Option<Op>) -> Result<MatchResult, MatchError> {
        let mut locpos = pos;
        let mut sub = sub.clone();
        if pop == Op::White {
            if Node::ptr_eq(&sub, &Node::zero()) {
                sub = Node::zero_not_neutral();
                locpos = 0;
            } else if Node::ptr_eq(&sub, &Node::one()) {
                sub = Node::one_not_neutral();
                locpos = 0;
            }
        } else if Node::ptr_eq(&sub, &Node::nil()) {
            sub = Node::nil_not_neutral();
            locpos = 0;
        } else if pop == Op::Plus && Node::ptr_eq(&sub, &Node::one()) {
            sub = Node::one_not_neutral();
            locpos = 0;
        }

        let neutral = Node::neutral(pop);
        let subject_not_nil = sub.is_op() || sub.flags() & UNOPS != 0 || sub.text() != neutral.text();
        let mut loc = if subject_not_nil { Some(sub.clone()) } else { None };
        let mut rmr = MatchResult::FALSE;
        let mut lmr = self.tree(depth, &neutral, l, None, pos, expr, Some(pop))?;
        lmr.once = false;

        while let Some(div) = loc {
            if lmr.success {
                rmr = self.tree(depth, &div, r, cutoff, locpos, expr, op)?;
                if !lmr.once { rmr.once = false }
            }
            if MatchResult::stops_loop(lmr, rmr) {
                if !Node::ptr_eq(&div, &sub) { rmr.position_max_reached = false }
                rmr.position_max_reached |= lmr.position_max_reached;
                if once_pattern(pat) {
                    rmr.once = true;
                    rmr.fence |= pat.has(FENCE);
                } else if !lmr.once {
                    rmr.once = false;
                }
                return Ok(rmr.toggled(pat.is_nothing()))
            }
            loc = match div.children() {
                Some((o, _, dr)) if o == pop && !cutoff.is_some_and(|c| Node::ptr_eq(dr, c)) => Some(dr.clone()),
                _ => None,
            };
            locpos += 1;
            lmr = self.tree(depth, &sub, l, loc.as_ref(), pos, Some(&sub), Some(pop))?;
        }
        if lmr.success {
            rmr = self.tree(depth, &neutral, r, None, locpos, expr, Some(pop))?;
            rmr.once = false;
        }
        if !rmr.position_max_reached { rmr.position_once = false }
        if once_pattern(pat) {
            rmr.once = true;
            rmr.fence |= pat.has(FENCE);
        }
        Ok(rmr.toggled(pat.is_nothing()))
    }

    /// `$x`: matches `x` literally, as if its prefixes were ordinary text.
    fn escaped(&mut self, depth: u32, sub: &Node, lit: &Node) -> Result<MatchResult, MatchError> {
        const MASK: u32 = UNIFY | FLGS | NOT;
        let want = lit.flags() & MASK;
        let mut rmr = MatchResult::ONCE;
        if sub.flags() & MASK & want == want {
            match (lit.children(), sub.children()) {
                (Some((lop, ll, lr)), Some((sop, sl, sr))) if lop == sop => {
                    let lmr = self.tree(depth, sl, ll, None, 0, Some(sl), None)?;
                    rmr = MatchResult::FALSE;
                    if lmr.success {
                        rmr = self.tree(depth, sr, lr, None, 0, Some(sr), None)?;
                    }
                    rmr.once |= lmr.once;
                }
                (Some(_), _) => {}
                (None, _) => {
                    let sub_negative = !sub.is_op() && sub.has(MINUS);
                    if !lit.has(MINUS) || sub_negative {
                        rmr = if lit.text().is_empty() {
                            if lit.flags() & UNOPS != 0 || (sub.flags() & MASK == 0 && !sub_negative) {
                                MatchResult::TRUE_ONCE
                            } else {
                                MatchResult::ONCE
                            }
                        } else if !sub.is_op() && lit.text() == sub.text() {
                            MatchResult::TRUE_ONCE
                        } else {
                            MatchResult::ONCE
                        };
                    }
                }
            }
        }
        rmr.position_max_reached = false;
        Ok(rmr)
    }

    /// `f$x` and `f'x` patterns are evaluated with `sjt` bound to the subject, and the
    /// result is matched in their place. Returns `false` when the pattern stands for itself.
    #[allow(clippy::too_many_arguments)]
    fn function_pattern(&mut self, depth: u32, sub: &Node, pat: &Node, cutoff: Option<&Node>,
                        pos: i64, expr: Option<&Node>, op: Option<Op>, rmr: &mut MatchResult) -> Result<bool, MatchError> {
        let call = if pat.is_nothing() { pat.with_flags((pat.flags() & !NOT) | SUCCESS) } else { pat.clone() };
        let loc = self.with_subject(|b, sjt| b.copy_insert(sjt, sub, cutoff), |m| m.eval_at(depth, &call))?;
        if loc.has(SUCCESS) {
            if loc.flags() & (UNIFY | FILTERS) == UNIFY && !loc.is_op() && loc.text().is_empty() {
                *rmr = MatchResult::TRUE;
                return Ok(true)
            }
            let loc = setflgs(loc, pat.flags());
            if equal(pat, &loc) != Ordering::Equal {
                let negate = loc.is_nothing();
                *rmr = self.tree(depth, sub, &loc, cutoff, pos, expr, op)?.toggled(negate);
                return Ok(true)
            }
        } else if loc.has(FENCE) {
            *rmr = MatchResult::ONCE;
        }
        Ok(false)
    }

    /// Operator patterns match subjects with the same operator part by part; leaf
    /// patterns compare as leaves.
    fn same_shape(&mut self, depth: u32, sub: &Node, pat: &Node, flgs: u32, rmr: &mut MatchResult) -> Result<(), MatchError> {
        match pat.children() {
            Some((pop, pl, pr)) => {
                if let Some((sop, sl, sr)) = sub.children() {
                    if sop == pop {
                        let lmr = self.tree(depth, sl, pl, None, 0, Some(sl), None)?;
                        if lmr.success {
                            *rmr = self.tree(depth, sr, pr, None, 0, Some(sr), None)?;
                        }
                        *rmr |= MatchResult::fence_once(lmr);
                        rmr.position_max_reached = false;
                    }
                }
            }
            None => {
                *rmr = if !pat.text().is_empty() || flgs & (FRACTION | NUMBER | NONIDENT | ATOM | IDENT) == 0 {
                    compare(sub, pat).with_once()
                } else {
                    MatchResult::TRUE
                };
            }
        }
        Ok(())
    }

    /// Runs `f` with `sjt` bound by `bind`, unbinding afterwards whatever `f` returned.
    pub(crate) fn with_subject<T>(&mut self,
                                  bind: impl FnOnce(&mut crate::Bindings, &Node) -> Result<bool, bramble_expr::AllocFailure>,
                                  f: impl FnOnce(&mut Machine) -> Result<T, MatchError>) -> Result<T, MatchError> {
        let sjt = Node::atom(b"sjt");
        self.bindings.bind(sjt.text(), Node::nil())?;
        let out = match bind(&mut self.bindings, &sjt) {
            Ok(_) => f(self),
            Err(e) => Err(e.into()),
        };
        self.bindings.unbind(sjt.text());
        out
    }

    /// `%[expr` patterns: `expr` is evaluated with `sjt` bound to the subject and decides alone.
    pub(crate) fn position_guard(&mut self, depth: u32, pat: &Node,
                                 bind: impl FnOnce(&mut crate::Bindings, &Node) -> Result<bool, bramble_expr::AllocFailure>)
                                 -> Result<MatchResult, MatchError> {
        let guard = pat.with_flags(pat.flags() & !(POSITION | NONIDENT | ONCE_MEMO));
        let loc = self.with_subject(bind, |m| m.eval_at(depth, &guard))?;
        Ok(MatchResult {
            success: loc.has(SUCCESS),
            once: loc.has(FENCE),
            ..MatchResult::FALSE
        })
    }
}
