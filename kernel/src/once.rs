//! Whether a pattern, after one success, could ever profit from a longer subject.
//!
//! Both verdicts are memoised on the pattern nodes, in separate flags, because an
//! atom spans exactly one element of a tree but any number of bytes of a string.

use bramble_expr::flags::*;
use bramble_expr::{Node, Op};
use smallvec::SmallVec;

fn structurally_once(op: Op) -> bool {
    matches!(op, Op::Dot | Op::Comma | Op::Equals | Op::Log | Op::Dif)
}

/// Verdict of a node that does not depend on its operands, if any.
type Own = fn(&Node) -> Option<bool>;

/// Walks `pat`, following `|` right spines in a loop. Every node on a spine that
/// turns out once is memoised with `memo`.
fn verdict(pat: &Node, memo: u32, own: Own, once: fn(&Node) -> bool, fixed: fn(Op) -> bool) -> bool {
    let mut spine: SmallVec<[Node; 4]> = SmallVec::new();
    let mut cur = pat.clone();
    let result = loop {
        if cur.flags() & memo != 0 { break true }
        if let Some(v) = own(&cur) {
            spine.push(cur);
            break v
        }
        let Some((op, l, r)) = cur.children() else { break false };
        let next = match op {
            _ if fixed(op) => Err(true),
            Op::Or if once(l) => Ok(r.clone()),
            Op::Or => Err(false),
            Op::Match => Err(once(l) || once(r)),
            Op::And => Err(once(l)),
            _ => Err(false),
        };
        spine.push(cur);
        match next {
            Ok(r) => cur = r,
            Err(v) => break v,
        }
    };
    if result {
        for n in &spine { n.mark_once(memo) }
    }
    result
}

fn tree_own(pat: &Node) -> Option<bool> {
    let f = pat.flags();
    if f & ATOM != 0 && negation(f, ATOM) {
        Some(false)
    } else if f & ATOMFILTERS != 0 {
        Some(true)
    } else if is_variable(f) || nothing(f) || f & NONIDENT != 0 {
        Some(false)
    } else if !pat.is_op() {
        Some(true)
    } else {
        None
    }
}

fn string_own(pat: &Node) -> Option<bool> {
    let f = pat.flags();
    if f & SATOMFILTERS != 0 {
        Some(true)
    } else if f & ATOMFILTERS != 0 || is_variable(f) || nothing(f) || f & NONIDENT != 0 {
        Some(false)
    } else if !pat.is_op() {
        Some(pat.text().is_empty())
    } else {
        None
    }
}

/// Once verdict for the tree matcher.
pub fn once_pattern(pat: &Node) -> bool {
    verdict(pat, IMPLIEDFENCE, tree_own, once_pattern, structurally_once)
}

/// Tree verdict of the `|` node `pat` when that of its right operand is already known.
pub(crate) fn once_alternative(pat: &Node, right: bool) -> bool {
    if pat.has(IMPLIEDFENCE) { return true }
    let once = match tree_own(pat) {
        Some(v) => v,
        None => right && pat.left().is_some_and(once_pattern),
    };
    if once { pat.mark_once(IMPLIEDFENCE) }
    once
}

/// Once verdict for the string matcher. Only an empty literal is once here.
pub fn string_once_pattern(pat: &Node) -> bool {
    verdict(pat, STRING_IMPLIEDFENCE, string_own, string_once_pattern, |op| structurally_once(op) || op == Op::Exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bramble_frontend::parse;

    fn tree(s: &str) -> bool { once_pattern(&parse(s).unwrap()) }
    fn string(s: &str) -> bool { string_once_pattern(&parse(s).unwrap()) }

    #[test]
    fn leaves_and_variables() {
        assert!(tree("a"));
        assert!(!tree("?x"));
        assert!(!tree("!x"));
        assert!(!tree("%a"));
        assert!(!tree("~"));
        assert!(tree("@a"));
        assert!(!tree("~@a"));
        assert!(tree("`?x"));
    }

    #[test]
    fn compound_rules() {
        assert!(tree("a|b"));
        assert!(!tree("a|?x"));
        assert!(tree("?x:a"));
        assert!(!tree("?x:?y"));
        assert!(tree("a&?x"));
        assert!(!tree("?x&a"));
        assert!(!tree("a b"));
        assert!(!tree("a+b"));
    }

    #[test]
    fn string_verdicts_differ_on_atoms() {
        assert!(!string("abc"));
        assert!(string("\"\""));
        assert!(!string("@a"));
        assert!(string("`?x"));
        assert!(string("a^b"));
        assert!(!tree("a^b"));
    }

    #[test]
    fn shared_shapes_agree() {
        for s in ["(a,b)", "(a.b)", "(a=b)", "`a|`b", "`a|?x", "?x:`a", "?x:?y", "`a&?x", "?x&`a", "?x ?y"] {
            assert_eq!(tree(s), string(s), "{}", s);
        }
    }

    #[test]
    fn long_alternative_chains() {
        let alternatives: Vec<String> = (0..50_000).map(|i| format!("a{}", i)).collect();
        let chain = parse(&alternatives.join("|")).unwrap();
        assert!(once_pattern(&chain));
        assert!(chain.right().unwrap().has(IMPLIEDFENCE));
        let open = parse(&format!("{}|?x", alternatives.join("|"))).unwrap();
        assert!(!once_pattern(&open));
        assert!(!open.has(IMPLIEDFENCE));
    }

    #[test]
    fn alternatives_with_a_known_right_side() {
        let p = parse("a|b").unwrap();
        assert!(!once_alternative(&p, false));
        assert!(!p.has(IMPLIEDFENCE));
        assert!(once_alternative(&p, true));
        assert!(p.has(IMPLIEDFENCE));
        assert!(!once_alternative(&parse("?x|b").unwrap(), true));
        assert!(once_alternative(&parse("`(?x|b)").unwrap(), false));
    }

    #[test]
    fn verdicts_are_memoised_separately() {
        let p = parse("abc").unwrap();
        assert!(once_pattern(&p));
        assert!(p.has(IMPLIEDFENCE));
        assert!(!string_once_pattern(&p));
        assert!(!p.has(STRING_IMPLIEDFENCE));
        p.clean_once_pattern();
        assert!(!p.has(IMPLIEDFENCE));
    }
}
