use std::collections::BTreeMap;

use bramble_expr::flags::*;
use bramble_expr::number::fullnumbercheck;
use bramble_expr::{copy_to_cutoff, AllocFailure, Node};
use bramble_frontend::Printed;
use log::{trace, warn};
use smallvec::SmallVec;

/// A bound value, possibly still a reference into the subject it was taken from.
#[derive(Clone)]
pub enum Bound {
    Tree(Node),
    /// The part of `chain` before `cutoff`.
    Slice { chain: Node, cutoff: Node },
    /// Bytes `start..end` of `owner`'s text, read as a leaf with `flags`.
    Substring { owner: Node, start: usize, end: usize, flags: u32 },
}

impl Bound {
    pub fn materialize(&self) -> Result<Node, AllocFailure> {
        match self {
            Bound::Tree(n) => Ok(n.clone()),
            Bound::Slice { chain, cutoff } => Ok(copy_to_cutoff(chain, cutoff)),
            Bound::Substring { owner, start, end, flags } => {
                let text = owner.text().get(*start..*end).unwrap_or(&[]);
                Node::try_leaf(text, *flags)
            }
        }
    }

    pub fn is_lazy(&self) -> bool { !matches!(self, Bound::Tree(_)) }
}

type Stack = SmallVec<[Bound; 1]>;

/// Symbol table: each name owns a stack of values, newest on top.
#[derive(Default)]
pub struct Bindings {
    vars: BTreeMap<Box<[u8]>, Stack>,
}

impl Bindings {
    pub fn new() -> Self { Bindings { vars: BTreeMap::new() } }

    fn push_bound(&mut self, name: &[u8], value: Bound) -> Result<(), AllocFailure> {
        let stack = self.vars.entry(name.into()).or_default();
        stack.try_reserve(1).map_err(|_| AllocFailure)?;
        stack.push(value);
        Ok(())
    }

    /// Pushes a new binding that hides the current one until [`Bindings::unbind`].
    pub fn bind(&mut self, name: &[u8], value: Node) -> Result<(), AllocFailure> {
        self.push_bound(name, Bound::Tree(value))
    }

    /// Pops the newest binding; the entry disappears with its last value.
    pub fn unbind(&mut self, name: &[u8]) -> bool {
        match self.vars.get_mut(name) {
            Some(stack) => {
                stack.pop();
                if stack.is_empty() { self.vars.remove(name); }
                true
            }
            None => false
        }
    }

    /// Replaces the newest binding, creating the entry when needed.
    pub fn insert(&mut self, name: &[u8], value: Bound) -> Result<(), AllocFailure> {
        match self.vars.get_mut(name).and_then(|s| s.last_mut()) {
            Some(top) => { *top = value; Ok(()) }
            None => self.push_bound(name, value)
        }
    }

    /// The newest value of `name`. A lazy binding is turned into a tree on first lookup.
    pub fn lookup(&mut self, name: &[u8]) -> Result<Option<Node>, AllocFailure> {
        let Some(top) = self.vars.get_mut(name).and_then(|s| s.last_mut()) else { return Ok(None) };
        if top.is_lazy() {
            *top = Bound::Tree(top.materialize()?);
        }
        match top {
            Bound::Tree(n) => Ok(Some(n.clone())),
            _ => Ok(None),
        }
    }

    pub fn is_bound(&self, name: &[u8]) -> bool { self.vars.contains_key(name) }

    /// Number of stacked values for `name`.
    pub fn depth(&self, name: &[u8]) -> usize { self.vars.get(name).map_or(0, |s| s.len()) }

    /// Bound names in byte order.
    pub fn names(&self) -> impl Iterator<Item=&[u8]> + '_ {
        self.vars.keys().map(|k| &k[..])
    }

    /// Every name with its newest value, materialising lazy values.
    pub fn list(&mut self) -> Result<Vec<(Box<[u8]>, Node)>, AllocFailure> {
        let names: Vec<Box<[u8]>> = self.vars.keys().cloned().collect();
        let mut out = Vec::new();
        out.try_reserve_exact(names.len()).map_err(|_| AllocFailure)?;
        for name in names {
            if let Some(v) = self.lookup(&name)? { out.push((name, v)) }
        }
        Ok(out)
    }

    fn variable_name<'n>(name: &'n Node) -> Option<&'n [u8]> {
        if name.is_op() {
            warn!(target: "bind", "cannot bind to the compound name {}", Printed(name));
            None
        } else {
            Some(name.text())
        }
    }

    /// Binds `name` to `sub`, or to the part of `sub` before `cutoff`, without copying
    /// the shared part. A live `!` reference is refused.
    pub fn copy_insert(&mut self, name: &Node, sub: &Node, cutoff: Option<&Node>) -> Result<bool, AllocFailure> {
        if sub.has(INDIRECT) && sub.has(READY) {
            trace!(target: "bind", "refusing to bind {} to the live reference {}", Printed(name), Printed(sub));
            return Ok(false)
        }
        let Some(var) = Self::variable_name(name) else { return Ok(false) };
        let value = if sub.has(IDENT) {
            Bound::Tree(sub.not_ident())
        } else {
            match cutoff {
                None => Bound::Tree(sub.clone()),
                Some(c) => Bound::Slice { chain: sub.clone(), cutoff: c.clone() },
            }
        };
        self.insert(var, value)?;
        Ok(true)
    }

    /// Binds `name` to bytes `start..end` of `owner`'s text. Negative numbers keep
    /// their sign only when `name` asks for a number with `#`.
    pub fn string_copy_insert(&mut self, name: &Node, owner: &Node, start: usize, end: usize) -> Result<bool, AllocFailure> {
        let Some(var) = Self::variable_name(name) else { return Ok(false) };
        let end = end.max(start);
        let text = owner.text().get(start..end).unwrap_or(&[]);
        let value = if owner.has(IDENT) {
            Bound::Tree(scopy(text)?)
        } else {
            let mut nr = fullnumbercheck(text) & !DEFINITELYNONUMBER;
            if nr & MINUS != 0 && !name.has(NUMBER) { nr = 0 }
            let start = if nr & MINUS != 0 { start + 1 } else { start };
            Bound::Substring { owner: owner.clone(), start, end, flags: READY | SUCCESS | nr }
        };
        self.insert(var, value)?;
        Ok(true)
    }

    /// Binds `name` to the decimal integer `n`.
    pub fn icopy_insert(&mut self, name: &Node, n: i64) -> Result<bool, AllocFailure> {
        let Some(var) = Self::variable_name(name) else { return Ok(false) };
        self.insert(var, Bound::Tree(Node::integer(n)?))?;
        Ok(true)
    }
}

/// A fresh leaf for `text`, with a leading `-` read as the sign of a number.
pub fn scopy(text: &[u8]) -> Result<Node, AllocFailure> {
    let nr = fullnumbercheck(text) & !DEFINITELYNONUMBER;
    let text = if nr & MINUS != 0 { &text[1..] } else { text };
    Node::try_leaf(text, READY | SUCCESS | nr)
}
