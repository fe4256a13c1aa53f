//! `[` patterns: binding and testing the number of elements (or bytes) consumed so far.

use bramble_expr::flags::pos as rel;
use bramble_expr::flags::*;
use bramble_expr::number::to_long;
use bramble_expr::{Node, Op};
use log::trace;

use crate::result::MatchResult;
use crate::{Machine, MatchError};

/// Elements of the `op` chain `expr`, where a lone neutral element counts as none.
pub(crate) fn expression_length(expr: &Node, op: Option<Op>) -> i64 {
    let neutral = Node::neutral(op.unwrap_or(Op::White));
    if !expr.is_op() && expr.text() == neutral.text() {
        return 0
    }
    let mut len = 1;
    let mut cur = expr;
    while let Some((o, _, r)) = cur.children() {
        if Some(o) != op { break }
        len += 1;
        cur = r;
    }
    len
}

/// The position a numeric `[` leaf names. Negative numbers count back from the end.
fn target(name: &Node, string_len: usize, expr: Option<&Node>, op: Option<Op>) -> i64 {
    let n = to_long(name.text(), name.flags());
    if n >= 0 { return n }
    let len = match expr {
        None => string_len as i64,
        Some(e) => expression_length(e, op),
    };
    n + len + 1
}

impl Machine {
    /// Tests `pat` against `position`. With a tree subject `expr` is the enclosing
    /// chain of `op`; a string subject passes `None` and its length.
    pub(crate) fn do_position(&mut self, depth: u32, pat: &Node, position: i64, string_len: usize,
                              expr: Option<&Node>, op: Option<Op>,
                              may_move: Option<&mut Option<usize>>) -> Result<MatchResult, MatchError> {
        let flags = pat.flags();
        if !pat.is_op() && flags & (SUCCESS | VISIBLE_FLAGS_POS0) == SUCCESS | QNUMBER {
            if let Some(slot) = may_move {
                if let Some(start) = *slot {
                    let t = target(pat, string_len, expr, op);
                    let family = flags & VISIBLE_FLAGS_POS;
                    if position < t && matches!(family, rel::MORE_EQUAL | rel::EQUAL | rel::NOT_LESS_OR_MORE) {
                        if string_len as i64 > t { *slot = Some(start + (t - position) as usize) }
                        return Ok(MatchResult::FALSE)
                    } else if position <= t && family == rel::MORE {
                        if string_len as i64 > t { *slot = Some(start + (t - position + 1) as usize) }
                        return Ok(MatchResult::FALSE)
                    }
                }
            }
        }

        let mut name = pat.with_flags(flags | SUCCESS);
        let flgs = if flags & UNIFY != 0 && (pat.is_op() || flags & INDIRECT != 0) {
            let mut f = name.flags() & !VISIBLE_FLAGS;
            if !name.is_op() { f |= READY }
            name = self.eval_at(depth, &name.into_flags(f))?;
            if !name.has(SUCCESS) { return Ok(MatchResult::FALSE) }
            flags & (UNIFY | INDIRECT | DOUBLY_INDIRECT)
        } else {
            name = self.eval_at(depth, &name)?;
            if !name.has(SUCCESS) { return Ok(MatchResult::FALSE) }
            (flags & UNIFY) | name.flags()
        };

        let r = if flgs & UNIFY != 0 {
            trace!(target: "match", "binding position {}", position);
            if name.is_op() || !name.text().is_empty() {
                if flgs & INDIRECT != 0 {
                    match self.symbol_binding(depth, &name, flgs & DOUBLY_INDIRECT != 0)? {
                        Some(loc) if loc.is_object() => MatchResult::success(self.bindings.icopy_insert(&loc, position)?),
                        Some(loc) => {
                            let ev = self.eval_at(depth, &loc)?;
                            if self.bindings.icopy_insert(&ev, position)? {
                                MatchResult { success: ev.has(SUCCESS), fence: ev.has(FENCE), ..MatchResult::FALSE }
                            } else {
                                MatchResult::FALSE
                            }
                        }
                        None => MatchResult::FALSE,
                    }
                } else {
                    MatchResult::success(self.bindings.icopy_insert(&name, position)?)
                }
            } else {
                MatchResult::TRUE
            }
        } else if !name.is_op() && name.flags() & (SUCCESS | VISIBLE_FLAGS_POS0) == SUCCESS | QNUMBER {
            let t = target(&name, string_len, expr, op);
            let max = MatchResult { position_max_reached: true, ..MatchResult::FALSE };
            let hit = MatchResult::TRUE;
            let hit_max = MatchResult { position_max_reached: true, ..MatchResult::TRUE };
            match name.flags() & VISIBLE_FLAGS_POS {
                rel::LESS => if position < t { hit } else { max },
                rel::LESS_EQUAL => if position < t { hit } else if position == t { hit_max } else { max },
                rel::MORE_EQUAL => if position >= t { hit } else { MatchResult::FALSE },
                rel::MORE => if position > t { hit } else { MatchResult::FALSE },
                rel::UNEQUAL | rel::LESS_OR_MORE => if position != t { hit } else { MatchResult::FALSE },
                rel::EQUAL | rel::NOT_LESS_OR_MORE => if position == t { hit_max } else if position > t { max } else { MatchResult::FALSE },
                _ => MatchResult::FALSE,
            }
        } else {
            MatchResult::FALSE
        };
        Ok(MatchResult { once: true, position_once: true, ..r })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_frontend::parse;

    #[test]
    fn chain_lengths() {
        assert_eq!(expression_length(&parse("a b c").unwrap(), Some(Op::White)), 3);
        assert_eq!(expression_length(&parse("a+b").unwrap(), Some(Op::White)), 1);
        assert_eq!(expression_length(&Node::nil(), Some(Op::White)), 0);
        assert_eq!(expression_length(&Node::zero(), Some(Op::Plus)), 0);
        assert_eq!(expression_length(&Node::zero(), Some(Op::White)), 1);
    }

    fn at(pattern: &str, position: i64) -> MatchResult {
        let mut m = Machine::new();
        let subject = parse("a b c d e").unwrap();
        m.do_position(0, &parse(pattern).unwrap(), position, 0, Some(&subject), Some(Op::White), None).unwrap()
    }

    #[test]
    fn relations() {
        assert!(at("[3", 3).success);
        assert!(at("[3", 3).position_max_reached);
        assert!(!at("[3", 2).success);
        assert!(at("[3", 4).position_max_reached);
        assert!(at("[<3", 2).success);
        assert!(!at("[<3", 3).success);
        assert!(at("[>3", 4).success);
        assert!(at("[~<3", 3).success);
        assert!(at("[~3", 1).success);
        assert!(at("[-1", 5).success);
        assert!(at("[-2", 4).success);
        let r = at("[3", 0);
        assert!(r.once && r.position_once);
    }

    #[test]
    fn binding_the_position() {
        let mut m = Machine::new();
        let r = m.do_position(0, &parse("[?p").unwrap(), 7, 0, None, None, None).unwrap();
        assert!(r.success && r.once && r.position_once);
        assert_eq!(m.bindings.lookup(b"p").unwrap().unwrap().text(), b"7");
    }

    #[test]
    fn string_start_may_jump_ahead() {
        let mut m = Machine::new();
        let mut slot = Some(2);
        let r = m.do_position(0, &parse("[5").unwrap(), 1, 10, None, None, Some(&mut slot)).unwrap();
        assert!(!r.success);
        assert_eq!(slot, Some(6));
        let mut slot = Some(2);
        m.do_position(0, &parse("[>5").unwrap(), 1, 10, None, None, Some(&mut slot)).unwrap();
        assert_eq!(slot, Some(7));
    }
}
