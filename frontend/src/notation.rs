use bramble_expr::flags::*;
use bramble_expr::number::numbercheck;
use bramble_expr::{Node, Op};
use regex::bytes::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
  UnexpectedEOF,
  UnexpectedRightParen(usize),
  UnterminatedString(usize),
  UnfinishedEscapeSequence(usize),
  MissingOperator(usize),
  UnexpectedOperator(usize, char),
  TrailingInput(usize),
  TooDeep(usize),
  Tokenizer(String),
}

impl std::fmt::Display for ParserError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use ParserError::*;
    match self {
      UnexpectedEOF => write!(f, "unexpected end of input"),
      UnexpectedRightParen(at) => write!(f, "unbalanced ')' at {}", at),
      UnterminatedString(at) => write!(f, "string starting at {} is not closed", at),
      UnfinishedEscapeSequence(at) => write!(f, "bad escape sequence at {}", at),
      MissingOperator(at) => write!(f, "operator expected at {}", at),
      UnexpectedOperator(at, c) => write!(f, "unexpected '{}' at {}", c, at),
      TrailingInput(at) => write!(f, "unexpected input at {}", at),
      TooDeep(at) => write!(f, "nesting deeper than {} at {}", MAX_NESTING, at),
      Tokenizer(e) => write!(f, "tokenizer: {}", e),
    }
  }
}

impl std::error::Error for ParserError {}

/// Nested subexpressions the reader follows before giving up.
pub const MAX_NESTING: usize = 500;

fn is_whitespace(c: u8) -> bool {
  c == b' ' || c == b'\t' || c == b'\n' || c == b'\r'
}

/// Operator at the start of `s`, with the number of bytes it spans.
pub fn operator_at(s: &[u8]) -> Option<(Op, usize)> {
  let op = match *s.first()? {
    b'=' => Op::Equals,
    b'.' => Op::Dot,
    b',' => Op::Comma,
    b'|' => Op::Or,
    b'&' => Op::And,
    b':' => Op::Match,
    b'+' => Op::Plus,
    b'*' => Op::Times,
    b'^' => Op::Exp,
    b'\'' => Op::Fuu,
    b'$' => Op::Fun,
    b'_' => Op::Underscore,
    b'\\' => return match s.get(1) {
      Some(b'L') => Some((Op::Log, 2)),
      Some(b'D') => Some((Op::Dif, 2)),
      _ => None
    },
    _ => return None
  };
  Some((op, 1))
}

/// Prefix runs and bare atom text.
pub struct Tokenizer {
  prefix: Regex,
  atom: Regex,
}

impl Tokenizer {
  pub fn new() -> Result<Self, regex::Error> {
    Ok(Tokenizer {
      prefix: Regex::new(r"^[!\[?#/@`%~<>\-]+")?,
      atom: Regex::new(r#"^[^\s=.,|&:+*^'$_()";\\]+"#)?,
    })
  }

  fn prefix_len(&self, s: &[u8]) -> usize {
    self.prefix.find(s).map_or(0, |m| m.end())
  }

  fn atom_len(&self, s: &[u8]) -> usize {
    self.atom.find(s).map_or(0, |m| m.end())
  }

  /// Text that reads back as a single bare atom.
  pub fn is_bare(&self, text: &[u8]) -> bool {
    !text.is_empty() && self.atom_len(text) == text.len() && self.prefix_len(text) == 0
  }
}

pub struct Context<'a> {
  pub src: &'a [u8],
  pub loc: usize,
  depth: usize,
}

impl <'a> Context<'a> {
  pub fn new(r: &'a [u8]) -> Context<'a> {
    Context{ src: r, loc: 0, depth: 0 }
  }

  #[inline(always)]
  fn peek(&self) -> Option<u8> {
    self.src.get(self.loc).copied()
  }

  #[inline(always)]
  fn next(&mut self) -> Result<u8, ParserError> {
    let c = self.peek().ok_or(ParserError::UnexpectedEOF)?;
    self.loc += 1;
    Ok(c)
  }

  #[inline(always)]
  fn has_next(&self) -> bool {
    self.loc < self.src.len()
  }

  #[inline(always)]
  fn rest(&self) -> &'a [u8] {
    &self.src[self.loc.min(self.src.len())..]
  }

  fn skip_whitespace(&mut self) -> bool {
    let start = self.loc;
    while matches!(self.peek(), Some(c) if is_whitespace(c)) { self.loc += 1 }
    self.loc > start
  }

  /// Whether the next byte can begin an operand.
  fn at_operand(&self) -> bool {
    match self.peek() {
      None | Some(b')') | Some(b';') => false,
      Some(c) if is_whitespace(c) => false,
      Some(_) => operator_at(self.rest()).is_none()
    }
  }
}

fn prefix_flags(run: &[u8]) -> u32 {
  let mut f = 0;
  for &c in run {
    match c {
      b'!' => f |= if f & INDIRECT != 0 { DOUBLY_INDIRECT } else { INDIRECT },
      b'[' => f |= POSITION,
      b'?' => f |= UNIFY,
      b'#' => f |= NUMBER,
      b'/' => f |= FRACTION,
      b'@' => f |= ATOM,
      b'`' => f |= FENCE,
      b'%' => f |= NONIDENT,
      b'~' => f ^= NOT,
      b'<' => f |= SMALLER_THAN,
      b'>' => f |= GREATER_THAN,
      b'-' => f ^= MINUS,
      _ => {}
    }
  }
  // a plain `~` negates the outcome of evaluation
  if f & NOT != 0 && f < ATOM { f ^= SUCCESS }
  f
}

fn leaf_flags(prefix: u32, text: &[u8]) -> u32 {
  if prefix & INDIRECT != 0 {
    prefix ^ SUCCESS
  } else if negation(prefix, NUMBER) {
    prefix ^ (READY | SUCCESS)
  } else {
    (prefix ^ (READY | SUCCESS)) | (numbercheck(text) & !DEFINITELYNONUMBER)
  }
}

pub struct Reader {
  tokenizer: Tokenizer,
}

impl Reader {
  pub fn new() -> Result<Reader, ParserError> {
    Tokenizer::new().map(|tokenizer| Reader { tokenizer }).map_err(|e| ParserError::Tokenizer(e.to_string()))
  }

  pub fn tokenizer(&self) -> &Tokenizer { &self.tokenizer }

  /// A single expression spanning the whole input.
  pub fn expression(&self, src: &[u8]) -> Result<Node, ParserError> {
    let mut it = Context::new(src);
    let n = self.expr(&mut it, 0)?;
    it.skip_whitespace();
    match it.peek() {
      None => Ok(n),
      Some(b')') => Err(ParserError::UnexpectedRightParen(it.loc)),
      Some(_) => Err(ParserError::TrailingInput(it.loc)),
    }
  }

  /// `;`-separated statements. Empty statements are skipped.
  pub fn statements(&self, src: &[u8]) -> Result<Vec<Node>, ParserError> {
    let mut it = Context::new(src);
    let mut out = vec![];
    loop {
      it.skip_whitespace();
      if !it.has_next() { break }
      if it.peek() == Some(b';') { it.next()?; continue }
      out.push(self.expr(&mut it, 0)?);
      it.skip_whitespace();
      match it.peek() {
        None => break,
        Some(b';') => { it.next()?; }
        Some(b')') => return Err(ParserError::UnexpectedRightParen(it.loc)),
        Some(_) => return Err(ParserError::TrailingInput(it.loc)),
      }
    }
    Ok(out)
  }

  fn expr(&self, it: &mut Context, min: u8) -> Result<Node, ParserError> {
    if it.depth >= MAX_NESTING { return Err(ParserError::TooDeep(it.loc)) }
    it.depth += 1;
    let n = self.operators(it, min);
    it.depth -= 1;
    n
  }

  /// Operands joined by operators at least as strong as `min`. A run of one operator
  /// is collected in a loop and folded to the right.
  fn operators(&self, it: &mut Context, min: u8) -> Result<Node, ParserError> {
    it.skip_whitespace();
    let mut lhs = self.operand(it)?;
    while let Some((op, len, mark)) = self.next_operator(it)? {
      if op.precedence() < min {
        it.loc = mark;
        break
      }
      it.loc += len;
      let mut operands = vec![lhs, self.expr(it, op.precedence() + 1)?];
      while let Some((next, len, mark)) = self.next_operator(it)? {
        if next != op {
          it.loc = mark;
          break
        }
        it.loc += len;
        operands.push(self.expr(it, op.precedence() + 1)?);
      }
      let mut chain = operands.pop().ok_or(ParserError::UnexpectedEOF)?;
      while let Some(left) = operands.pop() {
        chain = Node::binary(op, left, chain);
      }
      lhs = chain;
    }
    Ok(lhs)
  }

  /// The operator after an operand, with its length and the position to rewind to
  /// when it is not taken. Whitespace between two operands is the `White` operator.
  fn next_operator(&self, it: &mut Context) -> Result<Option<(Op, usize, usize)>, ParserError> {
    let mark = it.loc;
    let spaced = it.skip_whitespace();
    match operator_at(it.rest()) {
      Some((op, len)) => Ok(Some((op, len, mark))),
      None if spaced && it.at_operand() => Ok(Some((Op::White, 0, mark))),
      None => {
        if !spaced && it.at_operand() { return Err(ParserError::MissingOperator(it.loc)) }
        it.loc = mark;
        Ok(None)
      }
    }
  }

  fn operand(&self, it: &mut Context) -> Result<Node, ParserError> {
    let run = self.tokenizer.prefix_len(it.rest());
    let prefix = prefix_flags(&it.rest()[..run]);
    it.loc += run;
    match it.peek() {
      Some(b'(') => {
        it.next()?;
        let inner = self.expr(it, 0)?;
        it.skip_whitespace();
        match it.peek() {
          Some(b')') => { it.next()?; }
          Some(b';') => return Err(ParserError::UnexpectedOperator(it.loc, ';')),
          Some(_) => return Err(ParserError::TrailingInput(it.loc)),
          None => return Err(ParserError::UnexpectedEOF),
        }
        let flags = inner.flags() ^ (prefix & !MINUS);
        Ok(inner.into_flags(flags))
      }
      Some(b'"') => {
        let text = self.quoted(it)?;
        Ok(Node::leaf(&text, leaf_flags(prefix, &text)))
      }
      Some(b'\\') if operator_at(it.rest()).is_none() => Err(ParserError::UnexpectedOperator(it.loc, '\\')),
      _ => {
        let len = self.tokenizer.atom_len(it.rest());
        let text = &it.rest()[..len];
        it.loc += len;
        Ok(Node::leaf(text, leaf_flags(prefix, text)))
      }
    }
  }

  fn quoted(&self, it: &mut Context) -> Result<Vec<u8>, ParserError> {
    let start = it.loc;
    it.next()?;
    let mut text = vec![];
    loop {
      match it.next().map_err(|_| ParserError::UnterminatedString(start))? {
        b'"' => return Ok(text),
        b'\\' => {
          let at = it.loc;
          text.push(match it.next().map_err(|_| ParserError::UnterminatedString(start))? {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'"' => b'"',
            b'\\' => b'\\',
            _ => return Err(ParserError::UnfinishedEscapeSequence(at))
          });
        }
        c => text.push(c),
      }
    }
  }
}

thread_local! {
  static READER: Result<Reader, ParserError> = Reader::new();
}

/// Reads one expression with the thread's shared reader.
pub fn parse(src: &str) -> Result<Node, ParserError> {
  READER.with(|r| match r {
    Ok(r) => r.expression(src.as_bytes()),
    Err(e) => Err(e.clone()),
  })
}

/// Whether `text` can be printed without quotes.
pub fn is_bare(text: &[u8]) -> bool {
  READER.with(|r| r.as_ref().map_or(false, |r| r.tokenizer().is_bare(text)))
}

/// Reads `;`-separated statements with the thread's shared reader.
pub fn parse_statements(src: &[u8]) -> Result<Vec<Node>, ParserError> {
  READER.with(|r| match r {
    Ok(r) => r.statements(src),
    Err(e) => Err(e.clone()),
  })
}
