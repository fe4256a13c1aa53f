//! A small evaluator: enough of the language to drive patterns, conditions and
//! user functions. The outcome of an evaluation is the `SUCCESS` flag of its result.

use std::io::Write;

use bramble_expr::flags::*;
use bramble_expr::{Node, Op};
use bramble_frontend::Printed;
use log::*;

use crate::bindings::{scopy, Bound};
use crate::{Machine, MatchError};

/// `value` seen through the prefixes of `node`: `~` flips success, `` ` `` adds a fence.
fn branch(node: &Node, value: Node) -> Node {
    let mut f = value.flags();
    if !node.has(SUCCESS) { f ^= SUCCESS }
    if node.has(FENCE) { f |= FENCE }
    value.into_flags(f)
}

/// Like [`branch`], for a value whose own success was reversed by the outcome.
fn failed_branch(node: &Node, value: Node) -> Node {
    let mut f = value.flags();
    if node.has(SUCCESS) { f ^= SUCCESS }
    if node.has(FENCE) { f |= FENCE }
    value.into_flags(f)
}

/// Like [`branch`], but the fence is exactly `node`'s.
fn fence_branch(node: &Node, value: Node) -> Node {
    let mut f = value.flags();
    if !node.has(SUCCESS) { f ^= SUCCESS }
    if node.has(FENCE) { f |= FENCE } else { f &= !FENCE }
    value.into_flags(f)
}

fn failed(node: &Node) -> Node {
    node.with_flags((node.flags() | READY) ^ SUCCESS)
}

/// Applies the prefixes of a pattern to the value standing in for it.
pub(crate) fn setflgs(loc: Node, flgs: u32) -> Node {
    if flgs & BEQUEST == 0 && flgs & SUCCESS != 0 {
        return loc
    }
    let mut f = loc.flags() ^ ((flgs & SUCCESS) ^ SUCCESS);
    f |= flgs & BEQUEST;
    if any_negation(flgs) { f |= NOT }
    loc.into_flags(f)
}

/// `node` with its operands evaluated to `left` and `right`. Unchanged operands keep
/// the node shared; a neutral operand of a sequence disappears.
fn rebuild(node: &Node, op: Op, left: Node, right: Node) -> Node {
    let Some((_, l, r)) = node.children() else { return right };
    let ok = left.has(SUCCESS) && right.has(SUCCESS);
    if ok && op.is_sequence() {
        let neutral = Node::neutral(op);
        let is_neutral = |n: &Node| !n.is_op() && n.flags() & UNOPS == 0 && n.text() == neutral.text();
        if is_neutral(&left) { return branch(node, right) }
        if is_neutral(&right) { return branch(node, left) }
    }
    let mut flags = node.flags() | READY;
    if !ok { flags ^= SUCCESS }
    if Node::ptr_eq(&left, l) && Node::ptr_eq(&right, r) {
        node.with_flags(flags)
    } else {
        Node::binary_with_flags(op, left, right, flags)
    }
}

fn is_anonymous(n: &Node) -> bool { !n.is_op() && n.text().is_empty() }

fn concat(n: &Node, out: &mut Vec<u8>) {
    match n.children() {
        Some((Op::White, l, r)) => {
            concat(l, out);
            concat(r, out);
        }
        Some(_) => out.extend_from_slice(Printed(n).to_string().as_bytes()),
        None => out.extend_from_slice(&n.signed_text()),
    }
}

pub(crate) fn install_builtins(m: &mut Machine) {
    m.define_builtin("out", |m, arg| {
        if let Err(e) = writeln!(m.output, "{}", Printed(arg)) {
            warn!(target: "eval", "out$ could not write: {}", e);
        }
        Ok(arg.clone())
    });
    m.define_builtin("str", |_, arg| {
        let mut text = vec![];
        concat(arg, &mut text);
        Ok(scopy(&text)?)
    });
}

impl Machine {
    /// Evaluates `node`. A failed evaluation is a result without `SUCCESS`, not an error.
    pub fn eval(&mut self, node: &Node) -> Result<Node, MatchError> {
        self.guarded(|m| m.eval_at(0, node))
    }

    /// Evaluates statements in order and returns their results.
    pub fn run(&mut self, statements: &[Node]) -> Result<Vec<Node>, MatchError> {
        statements.iter().map(|s| self.eval(s)).collect()
    }

    pub(crate) fn eval_at(&mut self, depth: u32, node: &Node) -> Result<Node, MatchError> {
        let depth = self.enter(depth)?;
        let mut cur = node.clone();
        loop {
            if cur.has(READY) { return Ok(cur) }
            let Some((op, l, r)) = cur.children() else { return self.eval_leaf(depth, cur) };
            let (l, r) = (l.clone(), r.clone());
            cur = match op {
                Op::Match => {
                    let left = self.eval_at(depth, &l)?;
                    if !left.has(SUCCESS | FENCE) {
                        return Ok(branch(&cur, left))
                    }
                    let ok = if cur.has(ATOM) && !negation(cur.flags(), ATOM) {
                        if left.is_op() {
                            error!(target: "eval", "{} is not atomic and cannot be matched with @", Printed(&left));
                            false
                        } else {
                            self.string_subject(depth, &left, &r)?.success
                        }
                    } else {
                        self.tree(depth, &left, &r, None, 0, Some(&left), None)?.success
                    };
                    return Ok(if ok { branch(&cur, left) } else { failed_branch(&cur, left) })
                }
                Op::And => {
                    let left = self.eval_at(depth, &l)?;
                    if !left.has(SUCCESS | FENCE) {
                        return Ok(branch(&cur, left))
                    }
                    branch(&cur, r)
                }
                Op::Or => {
                    let left = self.eval_at(depth, &l)?;
                    if left.has(SUCCESS | FENCE) {
                        return Ok(fence_branch(&cur, left))
                    }
                    branch(&cur, r)
                }
                Op::Equals => {
                    if l.is_op() {
                        warn!(target: "eval", "cannot assign to {}", Printed(&l));
                        return Ok(failed(&cur))
                    }
                    if is_anonymous(&l) {
                        return Ok(cur.with_flags(cur.flags() | READY))
                    }
                    let name = self.eval_at(depth, &l)?;
                    if !name.has(SUCCESS) || is_anonymous(&name) || name.is_op() {
                        return Ok(failed(&cur))
                    }
                    trace!(target: "eval", "{} =", Printed(&name));
                    self.bindings.insert(name.text(), Bound::Tree(r))?;
                    return Ok(branch(&cur, name))
                }
                Op::Fun | Op::Fuu => return self.call(depth, &cur, op, &l, &r),
                Op::Underscore => {
                    let op = self.last_op.unwrap_or(Op::White);
                    if op == Op::Underscore {
                        return Ok(cur.with_flags(cur.flags() | READY))
                    }
                    Node::binary_with_flags(op, l, r, cur.flags())
                }
                _ => return self.operands(depth, &cur, op),
            };
        }
    }

    /// Operators that evaluate both sides. A run of `op` down the right spine is
    /// evaluated left to right in a loop and rebuilt innermost first.
    fn operands(&mut self, depth: u32, node: &Node, op: Op) -> Result<Node, MatchError> {
        let mut levels: Vec<(Node, Node)> = vec![];
        let mut cur = node.clone();
        let mut value = loop {
            let Some((_, l, r)) = cur.children() else { break self.eval_at(depth, &cur)? };
            let (l, r) = (l.clone(), r.clone());
            let left = self.eval_at(depth, &l)?;
            levels.push((cur, left));
            if r.op() == Some(op) && !r.has(READY) {
                cur = r;
            } else {
                break self.eval_at(depth, &r)?
            }
        };
        while let Some((level, left)) = levels.pop() {
            value = rebuild(&level, op, left, value);
        }
        Ok(value)
    }

    fn eval_leaf(&mut self, depth: u32, leaf: Node) -> Result<Node, MatchError> {
        if !leaf.has(INDIRECT) {
            return Ok(leaf.with_flags(leaf.flags() | READY))
        }
        match self.symbol_binding(depth, &leaf, leaf.has(DOUBLY_INDIRECT))? {
            Some(value) => self.eval_at(depth, &value),
            None => {
                debug!(target: "eval", "{} has no value", Printed(&leaf));
                Ok(failed(&leaf))
            }
        }
    }

    fn call(&mut self, depth: u32, node: &Node, op: Op, l: &Node, r: &Node) -> Result<Node, MatchError> {
        let name = self.eval_at(depth, l)?;
        let arg = if op == Op::Fun { self.eval_at(depth, r)? } else { r.clone() };
        if !name.has(SUCCESS) || !arg.has(SUCCESS) {
            return Ok(failed(node))
        }
        let value = match name.children() {
            Some((Op::Equals | Op::Dot, fl, body)) if is_anonymous(fl) => Some(self.apply(depth, body, arg)?),
            Some(_) => None,
            None => match self.builtins.get(name.text()).cloned() {
                Some(f) => {
                    trace!(target: "eval", "{}${}", Printed(&name), Printed(&arg));
                    Some(f(self, &arg)?)
                }
                None => match self.bindings.lookup(name.text())? {
                    Some(def) => Some(self.apply(depth, &def, arg)?),
                    None => None,
                }
            }
        };
        Ok(match value {
            Some(v) => branch(node, v),
            None => {
                debug!(target: "eval", "{} is not a function", Printed(&name));
                failed(node)
            }
        })
    }

    /// Evaluates a function body with `arg` bound.
    fn apply(&mut self, depth: u32, def: &Node, arg: Node) -> Result<Node, MatchError> {
        let body = match def.children() {
            Some((Op::Equals | Op::Dot, l, r)) if is_anonymous(l) => r.clone(),
            _ => def.clone(),
        };
        self.bindings.bind(b"arg", arg)?;
        let out = self.eval_at(depth, &body);
        self.bindings.unbind(b"arg");
        out
    }

    /// The value of the variable `var`, carrying the prefixes `var` bequeaths to it.
    /// With `doubly` the value itself names the variable to read.
    pub(crate) fn symbol_binding(&mut self, depth: u32, var: &Node, doubly: bool) -> Result<Option<Node>, MatchError> {
        if var.is_op() {
            debug!(target: "eval", "object members are not supported: {}", Printed(var));
            return Ok(None)
        }
        let Some(mut value) = self.bindings.lookup(var.text())? else { return Ok(None) };
        if doubly {
            let name = if value.has(INDIRECT) || value.is_op() {
                if value.is_object() { return Ok(None) }
                let v = self.eval_at(depth, &value)?;
                if !v.has(SUCCESS) || v.is_op() { return Ok(None) }
                v
            } else {
                value
            };
            match self.symbol_binding(depth, &name, name.has(DOUBLY_INDIRECT))? {
                Some(v) => value = v,
                None => return Ok(None),
            }
        }
        let vf = var.flags();
        let mut nameflags = vf & (BEQUEST | SUCCESS);
        if any_negation(vf) { nameflags |= NOT }
        let mut valueflags = value.flags() | (nameflags & (BEQUEST | NOT));
        valueflags ^= (nameflags & SUCCESS) ^ SUCCESS;
        Ok(Some(if value.is_object() || value.flags() == valueflags { value } else { value.with_flags(valueflags) }))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use bramble_frontend::parse;

    #[derive(Clone, Default)]
    struct Sink(Rc<RefCell<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
    }

    fn eval(m: &mut Machine, src: &str) -> Node { m.eval(&parse(src).unwrap()).unwrap() }
    fn show(n: &Node) -> String { Printed(n).to_string() }

    #[test]
    fn assignment_and_lookup() {
        let mut m = Machine::new();
        eval(&mut m, "x=a b");
        let v = eval(&mut m, "!x");
        assert!(v.has(SUCCESS));
        assert_eq!(show(&v), "a b");
        assert!(!eval(&mut m, "!nothing").has(SUCCESS));
        assert!(eval(&mut m, "~!nothing").has(SUCCESS));
    }

    #[test]
    fn doubly_indirect_reads_through_a_name() {
        let mut m = Machine::new();
        eval(&mut m, "y=z");
        eval(&mut m, "z=found");
        assert_eq!(show(&eval(&mut m, "!!y")), "found");
    }

    #[test]
    fn conditions() {
        let mut m = Machine::new();
        assert!(eval(&mut m, "a:a & b").has(SUCCESS));
        assert!(!eval(&mut m, "a:b & b").has(SUCCESS));
        assert_eq!(show(&eval(&mut m, "a:b | c")), "c");
        assert!(eval(&mut m, "~(a:b)").has(SUCCESS));
    }

    #[test]
    fn matches_bind_for_later_statements() {
        let mut m = Machine::new();
        let out = eval(&mut m, "(f g h):?x g ?y & !y !x");
        assert_eq!(show(&out), "h f");
    }

    #[test]
    fn string_matches() {
        let mut m = Machine::new();
        assert!(eval(&mut m, "@(abcde:?x c ?y)").has(SUCCESS));
        assert_eq!(show(&eval(&mut m, "!x")), "ab");
        assert_eq!(show(&eval(&mut m, "!y")), "de");
    }

    #[test]
    fn functions_bind_arg() {
        let mut m = Machine::new();
        eval(&mut m, "twice=!arg !arg");
        assert_eq!(show(&eval(&mut m, "twice$hey")), "hey hey");
        assert!(!m.bindings.is_bound(b"arg"));
        assert!(!eval(&mut m, "nosuch$1").has(SUCCESS));
    }

    #[test]
    fn builtins() {
        let sink = Sink::default();
        let mut m = Machine::new().with_output(sink.clone());
        eval(&mut m, "out$(a+b)");
        assert_eq!(String::from_utf8_lossy(&sink.0.borrow()), "a+b\n");
        let s = eval(&mut m, "str$(ab cd 12)");
        assert_eq!(s.text(), b"abcd12");
    }

    #[test]
    fn neutral_elements_vanish() {
        let mut m = Machine::new();
        eval(&mut m, "e=");
        assert_eq!(show(&eval(&mut m, "a !e")), "a");
        eval(&mut m, "n=0");
        assert_eq!(show(&eval(&mut m, "!n+b")), "b");
    }

    #[test]
    fn long_lists_evaluate_without_nesting() {
        let mut m = Machine::new();
        eval(&mut m, "x=y");
        let words: Vec<String> = (0..20_000).map(|i| format!("w{}", i)).collect();
        let list = format!("{} !x", words.join(" "));
        let v = eval(&mut m, &list);
        assert!(v.has(SUCCESS));
        assert_eq!(show(&v), format!("{} y", words.join(" ")));
        let unchanged = parse(&words.join("+")).unwrap();
        let same = m.eval(&unchanged).unwrap();
        assert!(same.has(READY | SUCCESS));
        assert!(Node::ptr_eq(same.left().unwrap(), unchanged.left().unwrap()));
        assert_eq!(show(&same), words.join("+"));
    }

    #[test]
    fn bequest_carries_prefixes() {
        let mut m = Machine::new();
        eval(&mut m, "v=w");
        let b = m.symbol_binding(0, &parse("`!v").unwrap(), false).unwrap().unwrap();
        assert!(b.has(FENCE));
        let plain = m.symbol_binding(0, &parse("!v").unwrap(), false).unwrap().unwrap();
        assert!(!plain.has(FENCE) && plain.has(SUCCESS));
    }

    #[test]
    fn setflgs_applies_pattern_prefixes() {
        let n = setflgs(Node::atom(b"q"), SUCCESS | UNIFY);
        assert!(n.has(UNIFY));
        let same = Node::atom(b"q");
        assert!(Node::ptr_eq(&setflgs(same.clone(), SUCCESS), &same));
        let negated = setflgs(Node::atom(b"q"), 0);
        assert!(!negated.has(SUCCESS));
    }
}
