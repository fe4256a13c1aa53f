use std::cell::Cell;
use std::rc::Rc;

use bramble::{Machine, MatchError, MatchResult};
use bramble_expr::flags::{INDIRECT, READY, SUCCESS};
use bramble_expr::{Node, Op};

mod common;
use common::*;

#[test]
fn middle_literal_anchors_the_split() {
    let (mut m, r) = matches("a b c", "?x b ?y");
    assert!(r.success);
    assert_eq!(bound(&mut m, "x"), "a");
    assert_eq!(bound(&mut m, "y"), "c");
}

#[test]
fn positions_from_either_end() {
    let (mut m, r) = matches("a b c d e", "?x [-2 ?y");
    assert!(r.success);
    assert_eq!(bound(&mut m, "x"), "a b c d");
    assert_eq!(bound(&mut m, "y"), "e");

    let (mut m, r) = matches("a b c d e", "[<3 ?x");
    assert!(r.success);
    assert_eq!(bound(&mut m, "x"), "a b c d e");

    let (mut m, r) = matches("a b c d e", "?x [-1");
    assert!(r.success);
    assert_eq!(bound(&mut m, "x"), "a b c d e");

    let (mut m, r) = matches("a b c d e", "?x [?p d ?y");
    assert!(r.success);
    assert_eq!(bound(&mut m, "p"), "3");
    assert_eq!(bound(&mut m, "y"), "e");
}

#[test]
fn positions_that_cannot_be_reached() {
    assert!(!matches("a b c", "?x [7 ?y").1.success);
    assert!(!matches("a b c", "?x [-9 ?y").1.success);
}

#[test]
fn sum_and_product_decomposition() {
    let (mut m, r) = matches("3+4*x", "?a+?b*?c");
    assert!(r.success);
    assert_eq!(bound(&mut m, "a"), "0");
    assert_eq!(bound(&mut m, "b"), "1");
    assert_eq!(bound(&mut m, "c"), "3+4*x");

    let (mut m, r) = matches("3+4*x", "%?a+%?b*%?c");
    assert!(r.success);
    assert_eq!(bound(&mut m, "a"), "3");
    assert_eq!(bound(&mut m, "b"), "4");
    assert_eq!(bound(&mut m, "c"), "x");
}

#[test]
fn flag_round_trip_over_the_eight_relations() {
    let relations = [("p", true), ("~<p", true), ("~>p", true), ("~<>p", true),
                     ("<p", false), (">p", false), ("~p", false), ("<>p", false)];
    for (pattern, expected) in relations {
        assert_eq!(matches("p", pattern).1.success, expected, "{}", pattern);
    }
}

fn counting_machine() -> (Machine, Rc<Cell<u32>>) {
    let calls = Rc::new(Cell::new(0));
    let mut m = Machine::new();
    let c = calls.clone();
    m.define_builtin("tick", move |_, arg| {
        c.set(c.get() + 1);
        Ok(arg.clone())
    });
    (m, calls)
}

#[test]
fn fence_stops_alternatives() {
    let (mut m, calls) = counting_machine();
    let r = m.match_tree(&parse!("c"), &parse!("`a|(tick$)")).unwrap().result;
    assert!(!r.success);
    assert_eq!(calls.get(), 0);

    assert_eq!(r, MatchResult::FALSE);

    let left = m.match_tree(&parse!("c"), &parse!("`a")).unwrap().result;
    assert!(left.fence && left.once && !left.success);

    // a fenced left operand stops the chain but the fence itself is not passed on
    let whole = m.match_tree(&parse!("c"), &parse!("`a|b")).unwrap().result;
    assert_eq!(whole, MatchResult { once: true, ..MatchResult::FALSE });
    let fenced = m.match_tree(&parse!("c"), &parse!("`(a|b)")).unwrap().result;
    assert_eq!(fenced, MatchResult { once: true, fence: true, ..MatchResult::FALSE });

    let (mut m, calls) = counting_machine();
    m.match_tree(&parse!("c"), &parse!("a|(tick$)")).unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn guards_see_the_subject() {
    let mut m = Machine::new();
    m.eval(&parse!("limit=3")).unwrap();
    assert!(m.match_tree(&parse!("2"), &parse!("<!limit")).unwrap().result.success);
    assert!(!m.match_tree(&parse!("5"), &parse!("<!limit")).unwrap().result.success);
}

#[test]
fn underscore_records_its_operator() {
    let mut m = Machine::new();
    let out = m.match_tree(&parse!("f.g"), &parse!("?h_?t")).unwrap();
    assert!(out.result.success);
    assert_eq!(out.last_op, Some(Op::Dot));
    assert_eq!(bound(&mut m, "h"), "f");
}

#[test]
fn rebinding_restores_outer_values() {
    let mut m = Machine::new();
    m.bindings.bind(b"x", bramble_expr::Node::atom(b"outer")).unwrap();
    m.bindings.bind(b"x", bramble_expr::Node::atom(b"inner")).unwrap();
    assert!(m.match_tree(&parse!("z"), &parse!("?x")).unwrap().result.success);
    assert_eq!(bound(&mut m, "x"), "z");
    m.bindings.unbind(b"x");
    assert_eq!(bound(&mut m, "x"), "outer");
}

#[test]
fn statements_share_bindings() {
    let mut m = Machine::new();
    let results = m.run(&bramble_frontend::parse_statements(b"(1 2 3):?a [1 ?b; !b").unwrap()).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(format!("{}", bramble_frontend::Printed(&results[1])), "2 3");
}

#[test]
fn string_scenarios() {
    let (mut m, r) = string_matches("key=value", "?k \"=\" ?v");
    assert!(r.success);
    assert_eq!(bound(&mut m, "k"), "key");
    assert_eq!(bound(&mut m, "v"), "value");

    let (m, r) = string_matches("abc", "?x d ?y");
    assert!(!r.success);
    assert!(!r.fence);
    assert!(m.last_op().is_none());
}

#[test]
fn runaway_definitions_are_bounded() {
    let mut m = Machine::new();
    m.eval(&parse!("loop=!loop")).unwrap();
    assert!(matches!(m.eval(&parse!("!loop")), Err(MatchError::TooDeep(_))));
}

#[test]
fn long_alternative_chains() {
    let words: Vec<String> = (0..20_000).map(|i| format!("w{}", i)).collect();
    let chain = bramble_frontend::parse(&format!("{}|?x", words.join("|"))).unwrap();
    let mut m = Machine::new();
    assert!(m.match_tree(&parse!("w19999"), &chain).unwrap().result.success);
    assert!(!m.bindings.is_bound(b"x"));
    assert!(m.match_tree(&parse!("other"), &chain).unwrap().result.success);
    assert_eq!(bound(&mut m, "x"), "other");
    let closed = bramble_frontend::parse(&words.join("|")).unwrap();
    let r = m.match_tree(&parse!("other"), &closed).unwrap().result;
    assert!(!r.success && r.once);
}

#[test]
fn live_references_are_not_bound() {
    let mut m = Machine::new();
    let live = Node::leaf(b"y", INDIRECT | READY | SUCCESS);
    let r = m.match_tree(&live, &parse!("?x")).unwrap().result;
    assert!(!r.success);
    assert!(!m.bindings.is_bound(b"x"));
}

#[test]
fn self_referential_rebinding_is_bounded() {
    let mut m = Machine::new();
    assert!(m.eval(&parse!("(=!y):(=?y)")).unwrap().has(SUCCESS));
    assert!(m.bindings.is_bound(b"y"));
    assert!(matches!(m.eval(&parse!("!y")), Err(MatchError::TooDeep(_))));
}
