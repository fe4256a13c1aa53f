use std::fmt::{Display, Formatter, Write};

use bramble_expr::flags::*;
use bramble_expr::{Node, Op};

use crate::notation::is_bare;

/// Display adapter printing a node in the notation [`crate::notation`] reads.
pub struct Printed<'a>(pub &'a Node);

impl Display for Printed<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write_node(f, self.0, None)
  }
}

fn write_prefix(f: &mut Formatter<'_>, flags: u32, leaf: bool) -> std::fmt::Result {
  const MARKS: [(u32, char); 12] = [
    (NOT, '~'), (FENCE, '`'), (POSITION, '['), (NONIDENT, '%'), (ATOM, '@'), (FRACTION, '/'),
    (NUMBER, '#'), (SMALLER_THAN, '<'), (GREATER_THAN, '>'), (UNIFY, '?'), (INDIRECT, '!'),
    (DOUBLY_INDIRECT, '!'),
  ];
  for (flag, c) in MARKS {
    if flags & flag != 0 { f.write_char(c)? }
  }
  if leaf && flags & MINUS != 0 { f.write_char('-')? }
  Ok(())
}

fn write_text(f: &mut Formatter<'_>, text: &[u8]) -> std::fmt::Result {
  if is_bare(text) {
    return f.write_str(&String::from_utf8_lossy(text))
  }
  f.write_char('"')?;
  for c in String::from_utf8_lossy(text).chars() {
    match c {
      '"' => f.write_str("\\\"")?,
      '\\' => f.write_str("\\\\")?,
      '\n' => f.write_str("\\n")?,
      '\t' => f.write_str("\\t")?,
      '\r' => f.write_str("\\r")?,
      c => f.write_char(c)?,
    }
  }
  f.write_char('"')
}

fn write_node(f: &mut Formatter<'_>, n: &Node, parent: Option<(Op, bool)>) -> std::fmt::Result {
  match n.children() {
    None => {
      let visible = n.flags() & VISIBLE_FLAGS;
      write_prefix(f, n.flags() & (VISIBLE_FLAGS | MINUS), true)?;
      if !n.text().is_empty() {
        write_text(f, n.text())
      } else if visible == 0 && !n.has(MINUS) && matches!(parent, Some((Op::White, _))) {
        f.write_str("()")
      } else {
        Ok(())
      }
    }
    Some((op, l, r)) => {
      let visible = n.flags() & VISIBLE_FLAGS;
      let grouped = visible != 0 || match parent {
        Some((outer, true)) => op <= outer,
        Some((outer, false)) => op < outer,
        None => false,
      };
      write_prefix(f, visible, false)?;
      if grouped { f.write_char('(')? }
      write_node(f, l, Some((op, true)))?;
      f.write_str(op.symbol())?;
      // the rest of a run of `op` needs no parentheses
      let mut tail = r;
      while let Some((o, tl, tr)) = tail.children() {
        if o != op || tail.flags() & VISIBLE_FLAGS != 0 { break }
        write_node(f, tl, Some((op, true)))?;
        f.write_str(op.symbol())?;
        tail = tr;
      }
      write_node(f, tail, Some((op, false)))?;
      if grouped { f.write_char(')')? }
      Ok(())
    }
  }
}
