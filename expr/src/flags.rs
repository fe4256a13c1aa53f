//! Flag word layout shared by every node.
//!
//! The low half holds pattern modifiers and evaluation state, the high half holds
//! numeric classification bits that only ever appear on leaves.

pub const NOT: u32 = 1;
pub const SUCCESS: u32 = 1 << 1;
pub const READY: u32 = 1 << 2;
pub const POSITION: u32 = 1 << 3;
pub const INDIRECT: u32 = 1 << 4;
pub const DOUBLY_INDIRECT: u32 = 1 << 5;
pub const FENCE: u32 = 1 << 6;
pub const ATOM: u32 = 1 << 7;
pub const NONIDENT: u32 = 1 << 8;
pub const GREATER_THAN: u32 = 1 << 9;
pub const SMALLER_THAN: u32 = 1 << 10;
pub const NUMBER: u32 = 1 << 11;
pub const FRACTION: u32 = 1 << 12;
pub const UNIFY: u32 = 1 << 13;
pub const IDENT: u32 = 1 << 14;
pub const IMPLIEDFENCE: u32 = 1 << 15;
/// The string matcher's own once memo; atoms are once for trees but not for strings.
pub const STRING_IMPLIEDFENCE: u32 = 1 << 16;
pub const ONCE_MEMO: u32 = IMPLIEDFENCE | STRING_IMPLIEDFENCE;

pub const QNUMBER: u32 = 1 << 17;
pub const MINUS: u32 = 1 << 18;
pub const QNUL: u32 = 1 << 19;
pub const QFRACTION: u32 = 1 << 20;
pub const QDOUBLE: u32 = 1 << 21;
/// Only ever returned by the number classifier, never stored on a node.
pub const DEFINITELYNONUMBER: u32 = 1 << 23;
/// Marks objects owned by the runtime that patterns must not take apart.
pub const BUILT_IN: u32 = 1 << 24;

pub const FILTERS: u32 = FRACTION | NUMBER | SMALLER_THAN | GREATER_THAN | ATOM | NONIDENT;
pub const ATOMFILTERS: u32 = FRACTION | NUMBER | SMALLER_THAN | GREATER_THAN | ATOM | FENCE | IDENT;
pub const SATOMFILTERS: u32 = FENCE | IDENT;
pub const FLGS: u32 = FILTERS | FENCE | DOUBLY_INDIRECT | INDIRECT | POSITION;
pub const UNOPS: u32 = UNIFY | FLGS | NOT | MINUS;
pub const BEQUEST: u32 = FILTERS | FENCE | UNIFY;

pub const VISIBLE_FLAGS: u32 = INDIRECT | DOUBLY_INDIRECT | ATOM | NONIDENT | NUMBER | FRACTION
    | UNIFY | NOT | GREATER_THAN | SMALLER_THAN | FENCE | POSITION;
pub const VISIBLE_FLAGS_NON_COMP: u32 = INDIRECT | DOUBLY_INDIRECT | ATOM | NONIDENT | NUMBER | FRACTION | UNIFY;
pub const VISIBLE_FLAGS_POS0: u32 = INDIRECT | DOUBLY_INDIRECT | NONIDENT | QFRACTION | QDOUBLE | UNIFY | QNUMBER;
pub const VISIBLE_FLAGS_POS: u32 = VISIBLE_FLAGS_POS0 | NOT | GREATER_THAN | SMALLER_THAN;

/// `~` applied to exactly this filter (filters form a ladder, so higher filters win).
#[inline(always)]
pub fn negation(f: u32, flag: u32) -> bool {
    f & NOT != 0 && (f & FILTERS) >= flag && (f & FILTERS) < flag << 1
}

#[inline(always)]
pub fn any_negation(f: u32) -> bool { f & NOT != 0 && f & FILTERS != 0 }

/// `~` without any filter: the pattern denotes "nothing".
#[inline(always)]
pub fn nothing(f: u32) -> bool { f & NOT != 0 && f & FILTERS == 0 }

#[inline(always)]
pub fn is_variable(f: u32) -> bool { f & (UNIFY | INDIRECT | DOUBLY_INDIRECT) != 0 }

/// Position comparison families, keyed on `f & VISIBLE_FLAGS_POS`.
pub mod pos {
    use super::*;
    pub const LESS: u32 = QNUMBER | SMALLER_THAN;
    pub const LESS_EQUAL: u32 = QNUMBER | NOT | GREATER_THAN;
    pub const MORE_EQUAL: u32 = QNUMBER | NOT | SMALLER_THAN;
    pub const MORE: u32 = QNUMBER | GREATER_THAN;
    pub const UNEQUAL: u32 = QNUMBER | NOT;
    pub const LESS_OR_MORE: u32 = QNUMBER | SMALLER_THAN | GREATER_THAN;
    pub const EQUAL: u32 = QNUMBER;
    pub const NOT_LESS_OR_MORE: u32 = QNUMBER | NOT | SMALLER_THAN | GREATER_THAN;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_picks_the_highest_filter() {
        assert!(negation(NOT | NUMBER, NUMBER));
        assert!(!negation(NOT | NUMBER, FRACTION));
        assert!(negation(NOT | FRACTION | NUMBER, FRACTION));
        assert!(!negation(NUMBER, NUMBER));
    }

    #[test]
    fn nothing_is_a_bare_tilde() {
        assert!(nothing(NOT | SUCCESS));
        assert!(!nothing(NOT | ATOM));
        assert!(any_negation(NOT | ATOM));
        assert!(!any_negation(NOT));
    }
}
