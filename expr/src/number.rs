//! Numeric reading of leaf text.
//!
//! A leaf is a number when its text is an integer, a fraction `n/d` with a non-zero
//! denominator, or something `f64` parsing accepts that starts with a digit. The sign
//! is never part of a leaf's text; it lives in the `MINUS` flag. Hexadecimal floats
//! such as `0x1p3` are not accepted.

use std::cmp::Ordering;

use num::{BigInt, BigRational, FromPrimitive, Signed, ToPrimitive, Zero};

use crate::flags::*;

const NUMBER_BYTES: &[u8] = b"0123456789.-+/aAbBcCdDeEfFpPxX";

fn double_check(text: &[u8]) -> u32 {
    match std::str::from_utf8(text).ok().and_then(|s| s.parse::<f64>().ok()) {
        Some(d) if d.is_finite() => {
            if d == 0.0 { QNUMBER | QDOUBLE | QNUL } else { QNUMBER | QDOUBLE }
        }
        _ => DEFINITELYNONUMBER
    }
}

/// Classifies unsigned leaf text. Returns `0` for the empty string and for a
/// fraction whose denominator is still missing its non-zero digit.
pub fn numbercheck(text: &[u8]) -> u32 {
    if text.is_empty() { return 0 }
    if text.iter().any(|c| !NUMBER_BYTES.contains(c)) { return DEFINITELYNONUMBER }

    let mut check = QNUMBER;
    let mut need_non_zero = false;
    let mut i = 0;
    let sign_seen = matches!(text[0], b'-' | b'+');
    if sign_seen { i += 1 }

    match text.get(i) {
        Some(b'0'..=b'9') => {}
        _ => return DEFINITELYNONUMBER
    }
    if text[i] == b'0' {
        if matches!(text.get(i + 1), Some(b'x' | b'X' | b'.')) {
            return double_check(&text[i..]);
        }
        check |= QNUL;
    }
    i += 1;

    if i < text.len() {
        if sign_seen {
            check = DEFINITELYNONUMBER;
        } else {
            for &c in &text[i..] {
                if c == b'/' {
                    if check & QFRACTION != 0 { check = DEFINITELYNONUMBER; break }
                    need_non_zero = true;
                    check |= QFRACTION;
                } else if !c.is_ascii_digit() {
                    check = DEFINITELYNONUMBER;
                    break
                } else if check & (QNUL | QFRACTION) == QNUL {
                    // a leading zero followed by more digits
                    return DEFINITELYNONUMBER
                } else if c != b'0' {
                    need_non_zero = false;
                } else if need_non_zero {
                    return DEFINITELYNONUMBER
                }
            }
        }
        if check == DEFINITELYNONUMBER {
            return double_check(text);
        }
    }
    if need_non_zero { 0 } else { check }
}

/// Like [`numbercheck`], but a leading `-` is read as the sign and reported as `MINUS`.
pub fn fullnumbercheck(text: &[u8]) -> u32 {
    match text.split_first() {
        Some((b'-', rest)) => {
            let ret = numbercheck(rest);
            if ret & !DEFINITELYNONUMBER != 0 { ret | MINUS } else { ret }
        }
        _ => numbercheck(text)
    }
}

/// The exact value of a numeric leaf; doubles are converted without rounding.
pub fn rational(text: &[u8], flags: u32) -> Option<BigRational> {
    let s = std::str::from_utf8(text).ok()?;
    let r = if flags & QDOUBLE != 0 {
        BigRational::from_f64(s.parse::<f64>().ok()?)?
    } else if let Some((n, d)) = s.split_once('/') {
        let d: BigInt = d.parse().ok()?;
        if d.is_zero() { return None }
        BigRational::new(n.parse().ok()?, d)
    } else {
        BigRational::from_integer(s.parse().ok()?)
    };
    Some(if flags & MINUS != 0 { -r } else { r })
}

/// Three-way comparison of two numeric leaves. Leaves that fail to read as numbers
/// sort as zero, which never happens for text that passed [`numbercheck`].
pub fn q_compare(a_text: &[u8], a_flags: u32, b_text: &[u8], b_flags: u32) -> Ordering {
    let a = rational(a_text, a_flags).unwrap_or_else(BigRational::zero);
    let b = rational(b_text, b_flags).unwrap_or_else(BigRational::zero);
    a.cmp(&b)
}

/// Integer part of a numeric leaf, saturating at the `i64` range.
pub fn to_long(text: &[u8], flags: u32) -> i64 {
    match rational(text, flags) {
        Some(r) => {
            let t = r.trunc().to_integer();
            t.to_i64().unwrap_or(if t.is_negative() { i64::MIN } else { i64::MAX })
        }
        None => 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_fractions() {
        assert_eq!(numbercheck(b"42"), QNUMBER);
        assert_eq!(numbercheck(b"0"), QNUMBER | QNUL);
        assert_eq!(numbercheck(b"3/4"), QNUMBER | QFRACTION);
        assert_eq!(numbercheck(b"3/"), 0);
        assert_eq!(numbercheck(b"3/0"), DEFINITELYNONUMBER);
        assert_eq!(numbercheck(b"007"), DEFINITELYNONUMBER);
        assert_eq!(numbercheck(b""), 0);
    }

    #[test]
    fn words_are_not_numbers() {
        assert_eq!(numbercheck(b"abc"), DEFINITELYNONUMBER);
        assert_eq!(numbercheck(b"x1"), DEFINITELYNONUMBER);
        assert_eq!(numbercheck(b"1a"), DEFINITELYNONUMBER);
    }

    #[test]
    fn doubles() {
        assert_eq!(numbercheck(b"0.5"), QNUMBER | QDOUBLE);
        assert_eq!(numbercheck(b"1e3"), QNUMBER | QDOUBLE);
        assert_eq!(numbercheck(b"0.0"), QNUMBER | QDOUBLE | QNUL);
    }

    #[test]
    fn hex_floats_are_words() {
        assert_eq!(numbercheck(b"0x1p3"), DEFINITELYNONUMBER);
        assert_eq!(numbercheck(b"0x10"), DEFINITELYNONUMBER);
    }

    #[test]
    fn sign_handling() {
        assert_eq!(fullnumbercheck(b"-12"), QNUMBER | MINUS);
        assert_eq!(fullnumbercheck(b"-a"), DEFINITELYNONUMBER);
        assert_eq!(numbercheck(b"+7"), QNUMBER);
    }

    #[test]
    fn rational_order() {
        assert_eq!(q_compare(b"1/2", QNUMBER | QFRACTION, b"2/4", QNUMBER | QFRACTION), Ordering::Equal);
        assert_eq!(q_compare(b"3", QNUMBER | MINUS, b"2", QNUMBER), Ordering::Less);
        assert_eq!(q_compare(b"0.5", QNUMBER | QDOUBLE, b"1/3", QNUMBER | QFRACTION), Ordering::Greater);
        assert_eq!(to_long(b"7/2", QNUMBER | QFRACTION | MINUS), -3);
    }
}
