//! Leaf comparison for the tree matcher and byte-range comparison for the string matcher.
//!
//! A leaf pattern's `<`, `>` and `~` prefixes select one of eight relations:
//! `p` and `~<>p` mean equal, `<p`, `>p`, `~<p` (at least), `~>p` (at most), and
//! `~p` or `<>p` (different). `~<>p` without `#` or `/` compares text case-insensitively.

use std::cmp::Ordering;

use bramble_expr::flags::*;
use bramble_expr::number::{fullnumbercheck, q_compare};
use bramble_expr::Node;

use crate::result::MatchResult;

const RELATION: u32 = NOT | GREATER_THAN | SMALLER_THAN;

fn code_point(b: &[u8], i: usize) -> (u32, usize) {
    let lead = b[i];
    let w = match lead {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    };
    match b.get(i..i + w).and_then(|s| std::str::from_utf8(s).ok()).and_then(|s| s.chars().next()) {
        Some(c) => (c as u32, w),
        None => (lead as u32, 1),
    }
}

fn lower(c: u32) -> i64 {
    char::from_u32(c).and_then(|c| c.to_lowercase().next()).map_or(c, |l| l as u32) as i64
}

#[inline(always)]
fn byte(b: &[u8], i: usize) -> i64 { b.get(i).copied().unwrap_or(0) as i64 }

/// Case-insensitive comparison of `s[*si..end]` with `p[*pi..]`, leaving both indices at
/// the first difference.
fn casecmp(s: &[u8], si: &mut usize, end: usize, p: &[u8], pi: &mut usize) -> i64 {
    while *si < end && byte(s, *si) != 0 && byte(p, *pi) != 0 {
        let (ks, ws) = code_point(s, *si);
        let (kp, wp) = code_point(p, *pi);
        let diff = lower(ks) - lower(kp);
        if diff != 0 { return diff }
        *si += ws;
        *pi += wp;
    }
    (if *si < end { byte(s, *si) } else { 0 }) - byte(p, *pi)
}

/// Compares a subject leaf with a leaf pattern. Numbers compare by value.
pub fn compare(s: &Node, p: &Node) -> MatchResult {
    let pf = p.flags();
    let pnot = pf & NOT != 0 && (pf & FLGS) < NUMBER;
    let pgrt = pf & GREATER_THAN != 0;
    let psml = pf & SMALLER_THAN != 0;
    let sign = if s.is_rational_comp() && p.is_rational_weak() {
        q_compare(s.text(), s.flags(), p.text(), pf)
    } else {
        if s.is_op() { return MatchResult::success(p.is_nothing()) }
        if s.text() == b"i" && p.text() == b"i" {
            // the imaginary unit: only the signs differ
            let differ = s.has(MINUS) != p.has(MINUS);
            let njet = (pf & FLGS) < NUMBER && pf & NOT != 0;
            let ul = pgrt && psml;
            let ee = pgrt ^ psml;
            return MatchResult::success(!ee && (njet ^ ul ^ !differ));
        }
        if pf & (NOT | FRACTION | NUMBER | GREATER_THAN | SMALLER_THAN) == RELATION {
            let (mut si, mut pi) = (0, 0);
            casecmp(s.text(), &mut si, usize::MAX, p.text(), &mut pi).cmp(&0)
        } else {
            s.text().cmp(p.text())
        }
    };
    MatchResult::success(match sign {
        Ordering::Greater => pnot ^ pgrt,
        Ordering::Equal => !pnot ^ (pgrt || psml),
        Ordering::Less => pnot ^ psml,
    })
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Status { NoIndication, AnInteger, NotAFraction, NotANumber, AFraction, ANumber }

const T: MatchResult = MatchResult::TRUE;
const F: MatchResult = MatchResult::FALSE;
const O: MatchResult = MatchResult::ONCE;
const TO: MatchResult = MatchResult::TRUE_ONCE;

/// Compares `subject[start..cutoff]` with a leaf pattern.
///
/// Bytes past `cutoff` are looked at to predict whether a longer subject could still
/// match: a result without `once` invites the caller to try one. When `suggested` is
/// given, literal comparisons report in it the cutoff they would accept. `may_move`
/// holds where the next attempt may start instead of `start + 1`, and is cleared when
/// no later start can succeed.
pub fn scompare(subject: &[u8], start: usize, cutoff: usize, p: &Node,
                suggested: Option<&mut usize>, mut may_move: Option<&mut Option<usize>>) -> MatchResult {
    let mut flgs = p.flags();
    let mut status = Status::NoIndication;
    if negation(flgs, NONIDENT) {
        flgs &= !(NOT | NONIDENT);
    }
    if negation(flgs, FRACTION) {
        flgs &= !(NOT | FRACTION);
        status = if flgs & NUMBER != 0 { Status::AnInteger } else { Status::NotAFraction };
    } else if negation(flgs, NUMBER) {
        flgs &= !(NOT | NUMBER);
        status = Status::NotANumber;
    } else if flgs & FRACTION != 0 {
        status = Status::AFraction;
    } else if flgs & NUMBER != 0 {
        status = Status::ANumber;
    }

    let range = subject.get(start..cutoff).unwrap_or(&[]);
    if flgs & NONIDENT == 0
        && p.is_rational_weak()
        && status != Status::NotANumber
        && ((flgs & QFRACTION != 0 && status != Status::NotAFraction)
            || (flgs & (QFRACTION | QNUMBER) == QNUMBER && status != Status::AFraction)) {
        if fullnumbercheck(range) & QNUMBER != 0 {
            let n = Node::atom(range);
            let mut anything_goes = false;
            let smaller_if_more_digits = n.is_rat_rat();
            if !smaller_if_more_digits {
                // a slash and a non-zero digit may still follow
                let mut t = cutoff;
                while t < subject.len() {
                    let c = subject[t];
                    if c == b'/' {
                        anything_goes = matches!(subject.get(t + 1), Some(b'1'..=b'9'));
                        break
                    }
                    if !c.is_ascii_digit() { break }
                    t += 1;
                }
            }
            let less = if n.has(MINUS) { !smaller_if_more_digits } else { smaller_if_more_digits };
            let sign = q_compare(n.text(), n.flags(), p.text(), p.flags());
            let samesign = n.has(MINUS) == p.has(MINUS);
            return match flgs & RELATION {
                // equal
                0 | RELATION => match sign {
                    Ordering::Equal => if anything_goes { T } else { TO },
                    Ordering::Greater => if samesign && (anything_goes || less) { F } else { O },
                    Ordering::Less => if samesign && (anything_goes || !less) { F } else { O },
                },
                SMALLER_THAN => match sign {
                    Ordering::Equal => if anything_goes || less { F } else { O },
                    Ordering::Greater => if samesign && (anything_goes || less) { F } else { O },
                    Ordering::Less => T,
                },
                GREATER_THAN => match sign {
                    Ordering::Greater => T,
                    Ordering::Equal => if anything_goes || !less { F } else { O },
                    Ordering::Less => if samesign && (anything_goes || !less) { F } else { O },
                },
                // different
                x if x == GREATER_THAN | SMALLER_THAN || x == NOT => {
                    if sign == Ordering::Equal { F } else { T }
                }
                // at least
                x if x == NOT | SMALLER_THAN => match sign {
                    Ordering::Equal => if anything_goes || !less { T } else { TO },
                    Ordering::Greater => T,
                    Ordering::Less => if samesign && (anything_goes || !less) { F } else { O },
                },
                // at most
                _ => match sign {
                    Ordering::Equal => if anything_goes || less { T } else { TO },
                    Ordering::Greater => if samesign && (anything_goes || less) { F } else { O },
                    Ordering::Less => T,
                },
            }
        } else if (start >= cutoff && flgs & (NUMBER | FRACTION) != 0)
            || (start < cutoff && ((subject[start] == b'-' && cutoff < start + 2) || subject[cutoff - 1] == b'/')) {
            // not a number yet, but more characters could make it one
            return F
        }
    }

    let pt = p.text();
    let mut s = start;
    let mut pi = 0;
    let sign;
    let bounded = |i: usize| if i < cutoff { byte(subject, i) } else { 0 };

    if flgs & (NOT | FRACTION | NUMBER | GREATER_THAN | SMALLER_THAN) == RELATION {
        sign = casecmp(subject, &mut s, cutoff, pt, &mut pi);
    } else if let Some(suggested) = suggested {
        match flgs & RELATION {
            x if x == NOT | GREATER_THAN || x == SMALLER_THAN || x == GREATER_THAN | SMALLER_THAN || x == NOT => {
                let mut d;
                loop {
                    d = bounded(s) - byte(pt, pi);
                    if d != 0 || byte(pt, pi) == 0 { break }
                    s += 1;
                    pi += 1;
                }
                return if d > 0 {
                    if x == NOT | GREATER_THAN || x == SMALLER_THAN { O } else { T }
                } else if d == 0 {
                    if x == NOT | GREATER_THAN { TO } else if x == SMALLER_THAN { O } else { F }
                } else {
                    T
                }
            }
            GREATER_THAN => {
                let mut d;
                loop {
                    d = byte(subject, s) - byte(pt, pi);
                    if d != 0 || byte(subject, s) == 0 || byte(pt, pi) == 0 { break }
                    s += 1;
                    pi += 1;
                }
                if s < cutoff { return O }
                if d > 0 { *suggested = s + 1 }
                sign = d;
            }
            0 | RELATION => {
                let mut d;
                loop {
                    d = byte(subject, s) - byte(pt, pi);
                    if d != 0 || byte(subject, s) == 0 || byte(pt, pi) == 0 { break }
                    s += 1;
                    pi += 1;
                }
                if s >= cutoff && byte(pt, pi) == 0 {
                    *suggested = s;
                    if let Some(slot) = may_move { *slot = None }
                    return TO
                }
                if let Some(slot) = may_move.as_deref_mut() {
                    if slot.is_some() {
                        *slot = find(&subject[start.min(subject.len())..], pt).map(|at| {
                            let at = start + at;
                            if flgs & MINUS != 0 { at.saturating_sub(1) } else { at }
                        });
                        return O
                    }
                }
                return if d > 0 || s < cutoff { O } else { F }
            }
            // at least
            _ => {
                let mut d;
                loop {
                    d = byte(subject, s) - byte(pt, pi);
                    if d != 0 || byte(subject, s) == 0 || byte(pt, pi) == 0 { break }
                    s += 1;
                    pi += 1;
                }
                if d >= 0 {
                    if s >= cutoff {
                        *suggested = if byte(pt, pi) != 0 { s + 1 } else { s };
                    }
                    return T
                }
                return O
            }
        }
    } else {
        let mut d;
        match flgs & RELATION {
            0 | RELATION => {
                loop {
                    d = bounded(s) - byte(pt, pi);
                    if d != 0 || byte(subject, s) == 0 || byte(pt, pi) == 0 { break }
                    s += 1;
                    pi += 1;
                }
                if d != 0 {
                    if let Some(slot) = may_move.as_deref_mut() {
                        if let Some(current) = *slot {
                            // the pattern can only match a suffix ending at the cutoff
                            let end = cutoff.min(subject.len());
                            return match end.checked_sub(pt.len()) {
                                Some(es) if subject[es..end] == *pt => {
                                    let startpos = if flgs & MINUS != 0 { es.saturating_sub(1) } else { es };
                                    if startpos > current { *slot = Some(startpos) }
                                    O
                                }
                                _ => {
                                    *slot = None;
                                    O
                                }
                            }
                        }
                    }
                }
            }
            _ => {
                loop {
                    d = bounded(s) - byte(pt, pi);
                    if d != 0 || byte(pt, pi) == 0 { break }
                    s += 1;
                    pi += 1;
                }
            }
        }
        sign = d;
    }

    match flgs & RELATION {
        0 | RELATION => {
            if sign == 0 { TO } else if sign < 0 && s >= cutoff { F } else { O }
        }
        SMALLER_THAN => if sign >= 0 { O } else { T },
        GREATER_THAN => {
            if sign > 0 { T } else if sign < 0 && s < cutoff { O } else { F }
        }
        x if x == GREATER_THAN | SMALLER_THAN || x == NOT => if sign == 0 { F } else { T },
        x if x == NOT | SMALLER_THAN => {
            if sign < 0 { if s < cutoff { O } else { F } } else { T }
        }
        _ => {
            if sign > 0 { O } else if sign < 0 { T } else { TO }
        }
    }
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() { return Some(0) }
    hay.windows(needle.len()).position(|w| w == needle)
}
