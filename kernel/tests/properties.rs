use bramble::once::once_pattern;
use bramble::Machine;
use proptest::prelude::*;

mod common;

fn word() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "12", "1/2"]).prop_map(str::to_string)
}

fn chain() -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..5).prop_map(|ws| ws.join(" "))
}

fn pattern_part() -> impl Strategy<Value = String> {
    prop_oneof![
        word(),
        word().prop_map(|w| format!("?{}", w)),
        Just("?x".to_string()),
        Just("%?y".to_string()),
        word().prop_map(|w| format!("(|{})", w)),
    ]
}

fn tree_subject() -> impl Strategy<Value = String> {
    prop_oneof![
        chain(),
        prop::sample::select(vec!["a+b", "b+a", "a,b", "x,b", "a^b", "2^3", "f.g", "a*b"]).prop_map(str::to_string),
    ]
}

/// Compound patterns whose outcome a leading `~` must reverse.
fn compound() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "?x b ?y", "a|b", "?x+b", "?x,b", "?b^?e", "?x_?y", "?x&~", "?x:a", "a b", "?x c", "%?x b",
    ]).prop_map(str::to_string)
}

fn text() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["abc", "b", "ab", "cab", "bb", "a1b2"]).prop_map(str::to_string)
}

fn string_pattern() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["?x b ?y", "a|b", "?x c", "a ?x", "?x b", "%?x ?y"]).prop_map(str::to_string)
}

fn pattern() -> impl Strategy<Value = String> {
    prop::collection::vec(pattern_part(), 1..4).prop_map(|ps| ps.join(" "))
}

proptest! {
    #[test]
    fn double_negation_cancels(subject in word(), pat in word()) {
        let plain = common::matches(&subject, &pat).1.success;
        prop_assert_eq!(common::matches(&subject, &format!("~{}", pat)).1.success, !plain);
        prop_assert_eq!(common::matches(&subject, &format!("~~{}", pat)).1.success, plain);
    }

    #[test]
    fn negation_reverses_compound_patterns(subject in tree_subject(), pat in compound()) {
        let plain = common::matches(&subject, &pat).1.success;
        prop_assert_eq!(common::matches(&subject, &format!("~({})", pat)).1.success, !plain);
        prop_assert_eq!(common::matches(&subject, &format!("~~({})", pat)).1.success, plain);
    }

    #[test]
    fn negation_reverses_string_patterns(subject in text(), pat in string_pattern()) {
        let plain = common::string_matches(&subject, &pat).1.success;
        prop_assert_eq!(common::string_matches(&subject, &format!("~({})", pat)).1.success, !plain);
    }

    #[test]
    fn repeated_matches_agree(subject in chain(), pat in pattern()) {
        let mut m = Machine::new();
        let s = parse!(&subject);
        let p = parse!(&pat);
        let first = m.match_tree(&s, &p).unwrap().result;
        let second = m.match_tree(&s, &p).unwrap().result;
        prop_assert_eq!(first, second);
        if once_pattern(&p) {
            prop_assert!(first.once);
        }
    }

    #[test]
    fn literal_chains_match_themselves(subject in chain()) {
        let (_, r) = common::matches(&subject, &subject);
        prop_assert!(r.success);
    }
}
