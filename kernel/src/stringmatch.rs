use std::cmp::Ordering;

use bramble_expr::flags::*;
use bramble_expr::number::fullnumbercheck;
use bramble_expr::{equal, Node, Op};
use bramble_frontend::Printed;
use log::*;

use crate::compare::scompare;
use crate::eval::setflgs;
use crate::once::string_once_pattern;
use crate::result::MatchResult;
use crate::{Machine, MatchError};

impl Machine {
    /// Matches the whole text of a leaf. Operator subjects fail.
    pub(crate) fn string_subject(&mut self, depth: u32, subject: &Node, pat: &Node) -> Result<MatchResult, MatchError> {
        if subject.is_op() {
            debug!(target: "match", "{} is not an atom and cannot be matched as a string", Printed(subject));
            return Ok(MatchResult::FALSE)
        }
        let len = subject.text().len();
        self.string(depth, subject, 0, len, pat, 0, len, None, None)
    }

    /// Matches bytes `start..cutoff` of `owner`'s text against `pat`.
    ///
    /// `suggested` receives the cutoff a literal comparison would accept, so a
    /// juxtaposition can jump there. `may_move`, when it holds a start, receives the
    /// next start worth trying; cleared, it tells the caller no later start can match.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn string(&mut self, depth: u32, owner: &Node, start: usize, cutoff: usize, pat: &Node,
                         pos: i64, string_len: usize, suggested: Option<&mut usize>,
                         mut may_move: Option<&mut Option<usize>>) -> Result<MatchResult, MatchError> {
        let depth = self.enter(depth)?;
        let subject = owner.text();
        let flgs = pat.flags();
        let mut suggested = suggested;
        if flgs & ATOM != 0 || (pat.is_nothing() && (pat.is_op() || pat.text().is_empty())) {
            suggested = None;
        }
        if log_enabled!(target: "match", Level::Trace) {
            trace!(target: "match", "{:>w$}\"{}\" : {}", "",
                   String::from_utf8_lossy(subject.get(start..cutoff).unwrap_or(&[])), Printed(pat), w = depth as usize);
        }

        if flgs & POSITION != 0 {
            return if flgs & NONIDENT != 0 {
                self.position_guard(depth, pat, |b, sjt| b.string_copy_insert(sjt, owner, start, cutoff))
            } else if cutoff > start {
                if let Some(slot) = may_move {
                    if slot.is_some() { *slot = Some(cutoff) }
                }
                Ok(MatchResult::position_exhausted())
            } else {
                self.do_position(depth, pat, pos, string_len, None, None, may_move)
            }
        }

        let len = cutoff.saturating_sub(start);
        let mut once = false;
        let mut rmr = MatchResult::FALSE;
        let mut filtered = false;
        if flgs & NONIDENT != 0 {
            filtered = if negation(flgs, NONIDENT) {
                once = true;
                len > 0
            } else {
                len == 0
            };
        }
        if !filtered && flgs & ATOM != 0 {
            filtered = if negation(flgs, ATOM) {
                len < 2
            } else if len > 0 {
                once = true;
                len > 1
            } else {
                false
            };
        }
        if !filtered && flgs & (FRACTION | NUMBER) != 0 {
            let ci = fullnumbercheck(subject.get(start..cutoff).unwrap_or(&[]));
            filtered = (flgs & FRACTION != 0 && ((ci != QFRACTION | QNUMBER) ^ negation(flgs, FRACTION)))
                || (flgs & NUMBER != 0 && ((ci & QNUMBER == 0) ^ negation(flgs, NUMBER)));
            if filtered && ci == DEFINITELYNONUMBER {
                rmr = MatchResult::ONCE;
            }
        }

        let mut pat = pat.clone();
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
                    if !pat.is_nothing() || cutoff > start {
                        rmr = if pat.is_op() || !pat.text().is_empty() {
                            if flgs & INDIRECT != 0 {
                                match self.symbol_binding(depth, &pat, flgs & DOUBLY_INDIRECT != 0)? {
                                    Some(loc) if loc.is_object() => {
                                        MatchResult::success(self.bindings.string_copy_insert(&loc, owner, start, cutoff)?)
                                    }
                                    Some(loc) => {
                                        let loc = self.eval_at(depth, &loc)?;
                                        if self.bindings.string_copy_insert(&loc, owner, start, cutoff)? {
                                            MatchResult::success(loc.has(SUCCESS))
                                        } else {
                                            MatchResult::FALSE
                                        }
                                    }
                                    None => MatchResult::success(pat.is_nothing()),
                                }
                            } else {
                                MatchResult::success(self.bindings.string_copy_insert(&pat, owner, start, cutoff)?)
                            }
                        } else {
                            MatchResult::TRUE
                        };
                    }
                } else if flgs & INDIRECT != 0 {
                    rmr = match self.symbol_binding(depth, &pat, flgs & DOUBLY_INDIRECT != 0)? {
                        Some(loc) => {
                            if let Some(slot) = may_move { *slot = None }
                            loc.clean_once_pattern();
                            self.string(depth, owner, start, cutoff, &loc, pos, string_len, suggested, None)?
                                .toggled(pat.is_nothing())
                        }
                        None => MatchResult::success(pat.is_nothing()),
                    };
                }
            }
        } else {
            match pat.children() {
                Some((Op::White, l, r)) => {
                    return self.string_sequence(depth, owner, start, cutoff, &pat, l, r, pos, string_len, suggested, may_move)
                }
                Some((Op::Plus | Op::Times, _, _)) => {}
                Some((Op::Underscore, l, r)) => {
                    if cutoff > start + 1 {
                        let lmr = self.string(depth, owner, start, start + 1, l, pos, string_len, None, may_move.as_deref_mut())?;
                        if lmr.success {
                            rmr = self.string(depth, owner, start + 1, cutoff, r, pos, string_len, suggested, may_move)?;
                            if rmr.success { self.last_op = Some(Op::White) }
                        }
                        rmr |= MatchResult::fence_once(lmr);
                    }
                }
                Some((Op::And, l, r)) => {
                    let lmr = self.string(depth, owner, start, cutoff, l, pos, string_len, suggested, may_move)?;
                    if lmr.success {
                        let loc = self.eval_at(depth, r)?;
                        rmr = if loc.has(SUCCESS) {
                            MatchResult { once: loc.has(FENCE), ..MatchResult::TRUE }
                        } else if loc.has(FENCE) {
                            MatchResult { fence: true, ..MatchResult::ONCE }
                        } else {
                            MatchResult { once: loc.has(ONCE_MEMO), ..MatchResult::FALSE }
                        };
                    }
                    rmr |= MatchResult::fence_once(lmr);
                }
                Some((Op::Match, l, r)) => {
                    let lmr = self.string(depth, owner, start, cutoff, l, pos, string_len, suggested.as_deref_mut(), may_move)?;
                    if lmr.success {
                        let cutoff = match suggested.as_deref() {
                            Some(&s) if s > cutoff => s,
                            _ => cutoff,
                        };
                        rmr = self.string(depth, owner, start, cutoff, r, pos, string_len, None, None)?;
                    }
                    rmr |= MatchResult::fence_once(lmr);
                    rmr.position_max_reached |= lmr.position_max_reached;
                }
                Some((Op::Or, l, r)) => {
                    if let Some(slot) = may_move { *slot = None }
                    let lmr = self.string(depth, owner, start, cutoff, l, pos, string_len, None, None)?;
                    if lmr.success || lmr.fence {
                        rmr = if lmr.once && !string_once_pattern(r) {
                            MatchResult::success(lmr.success)
                        } else {
                            MatchResult { success: lmr.success, once: lmr.once, ..MatchResult::FALSE }
                        };
                    } else {
                        rmr = self.string(depth, owner, start, cutoff, r, pos, string_len, None, None)?;
                        if rmr.once && !lmr.once {
                            rmr.once = false;
                            rmr.position_once = false;
                        }
                        if rmr.position_max_reached && !lmr.position_max_reached {
                            rmr.position_max_reached = false;
                            rmr.position_once = false;
                        }
                    }
                }
                Some((Op::Fun | Op::Fuu, _, _)) => {
                    let call = if pat.is_nothing() { pat.with_flags((pat.flags() & !NOT) | SUCCESS) } else { pat.clone() };
                    let loc = self.with_subject(|b, sjt| b.string_copy_insert(sjt, owner, start, cutoff),
                                                |m| m.eval_at(depth, &call))?;
                    if let Some(slot) = may_move { *slot = None }
                    if loc.has(SUCCESS) {
                        if loc.flags() & (UNIFY | FILTERS) == UNIFY && !loc.is_op() && loc.text().is_empty() {
                            rmr = MatchResult::TRUE;
                        } else {
                            let loc = setflgs(loc, pat.flags());
                            if equal(&pat, &loc) != Ordering::Equal {
                                let negate = loc.is_nothing();
                                rmr = self.string(depth, owner, start, cutoff, &loc, pos, string_len, None, None)?.toggled(negate);
                            }
                        }
                    } else if loc.has(FENCE | ONCE_MEMO) {
                        rmr = MatchResult::ONCE;
                    }
                }
                Some(_) => {}
                None => {
                    rmr = if pat.text().is_empty() && flgs & (FRACTION | NUMBER | NONIDENT | ATOM | IDENT) != 0 {
                        MatchResult::TRUE
                    } else {
                        let suggested = if flgs & ATOM == 0 || negation(flgs, ATOM) { suggested } else { None };
                        scompare(subject, start, cutoff, &pat, suggested, may_move)
                    };
                }
            }
        }

        rmr.fence |= pat.has(FENCE);
        if string_once_pattern(&pat) || (!rmr.success && rmr.fence && !rmr.once) {
            rmr.once = true;
        }
        if pat.is_op() {
            rmr = rmr.toggled(pat.is_nothing());
        }
        rmr.once |= once;
        Ok(rmr)
    }

    /// `l r` over a string: tries every split point, jumping ahead where the parts allow.
    #[allow(clippy::too_many_arguments)]
    fn string_sequence(&mut self, depth: u32, owner: &Node, start: usize, cutoff: usize, pat: &Node, l: &Node, r: &Node,
                       pos: i64, string_len: usize, mut suggested: Option<&mut usize>,
                       mut may_move: Option<&mut Option<usize>>) -> Result<MatchResult, MatchError> {
        let mut cutoff = cutoff;
        let mut locpos = pos;
        let mut sloc = start;
        let mut suggested_cut = start;
        let mut next_start = Some(start);
        let mut rmr = MatchResult::FALSE;

        let mut lmr = self.string(depth, owner, start, sloc, l, pos, string_len, Some(&mut suggested_cut), may_move.as_deref_mut())?;
        if lmr.once && may_move.as_deref().copied().flatten().is_some_and(|m| m > start) {
            return Ok(MatchResult::ONCE)
        }
        if suggested_cut > sloc {
            if suggested_cut > cutoff {
                if let Some(s) = suggested.as_deref_mut() {
                    locpos += (suggested_cut - sloc) as i64;
                    cutoff = suggested_cut;
                    sloc = suggested_cut;
                    *s = suggested_cut;
                } else {
                    locpos += (cutoff - sloc) as i64;
                    sloc = cutoff;
                    lmr.success = false;
                }
            } else {
                locpos += (suggested_cut - sloc) as i64;
                sloc = suggested_cut;
            }
        } else {
            lmr.once = false;
        }

        while sloc < cutoff {
            if lmr.success {
                if lmr.once {
                    next_start = None;
                } else if next_start.is_some() {
                    next_start = Some(sloc);
                }
                rmr = self.string(depth, owner, sloc, cutoff, r, locpos, string_len, suggested.as_deref_mut(), Some(&mut next_start))?;
                match next_start {
                    Some(m) if m > sloc => {
                        let m = m.min(cutoff);
                        locpos += (m - sloc) as i64;
                        sloc = m;
                    }
                    _ => {
                        sloc += 1;
                        locpos += 1;
                    }
                }
                if !lmr.once { rmr.once = false }
            } else {
                sloc += 1;
                locpos += 1;
            }
            if MatchResult::stops_loop(lmr, rmr) {
                if sloc > start + 1 { rmr.position_max_reached = false }
                rmr.position_max_reached |= lmr.position_max_reached;
                if string_once_pattern(pat) {
                    rmr.once = true;
                    rmr.fence |= pat.has(FENCE);
                } else if !lmr.once {
                    rmr.once = false;
                }
                return Ok(rmr.toggled(pat.is_nothing()))
            }
            suggested_cut = start;
            lmr = self.string(depth, owner, start, sloc, l, pos, string_len, Some(&mut suggested_cut), may_move.as_deref_mut())?;
            if suggested_cut > sloc && suggested_cut <= cutoff {
                locpos += (suggested_cut - sloc) as i64;
                sloc = suggested_cut;
            }
        }
        if lmr.success {
            rmr = self.string(depth, owner, sloc, cutoff, r, locpos, string_len, suggested, may_move)?;
            rmr.once = false;
        }
        if !rmr.position_max_reached { rmr.position_once = false }
        if string_once_pattern(pat) {
            rmr.once = true;
            rmr.fence |= pat.has(FENCE);
        }
        Ok(rmr.toggled(pat.is_nothing()))
    }
}
