#![allow(dead_code)]

use bramble::{Machine, MatchResult};
use bramble_expr::Node;
use bramble_frontend::Printed;

/// Reads an expression, panicking on notation errors
#[macro_export]
macro_rules! parse { ($src:expr) => { bramble_frontend::parse($src).expect($src) }; }

/// Tree-matches `subject` against `pattern` on a fresh machine
pub fn matches(subject: &str, pattern: &str) -> (Machine, MatchResult) {
    let mut m = Machine::new();
    let out = m.match_tree(&parse!(subject), &parse!(pattern)).expect("match error");
    (m, out.result)
}

/// String-matches the atom `subject` against `pattern` on a fresh machine
pub fn string_matches(subject: &str, pattern: &str) -> (Machine, MatchResult) {
    let mut m = Machine::new();
    let out = m.match_string(&Node::atom(subject.as_bytes()), &parse!(pattern)).expect("match error");
    (m, out.result)
}

/// The printed value of `name`
pub fn bound(m: &mut Machine, name: &str) -> String {
    let v = m.bindings.lookup(name.as_bytes()).expect("out of memory").unwrap_or_else(|| panic!("{} unbound", name));
    format!("{}", Printed(&v))
}
