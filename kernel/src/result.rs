use std::ops::BitOrAssign;

/// Outcome bits of one match attempt.
///
/// `once` tells the caller that a longer subject cannot change the answer,
/// `fence` that alternatives must not be tried, and the two position bits
/// stop sequence loops from enumerating more split points.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct MatchResult {
    pub success: bool,
    pub once: bool,
    pub position_once: bool,
    pub position_max_reached: bool,
    pub fence: bool,
}

impl MatchResult {
    pub const FALSE: MatchResult = MatchResult {
        success: false, once: false, position_once: false, position_max_reached: false, fence: false,
    };
    pub const TRUE: MatchResult = MatchResult { success: true, ..MatchResult::FALSE };
    pub const ONCE: MatchResult = MatchResult { once: true, ..MatchResult::FALSE };
    pub const TRUE_ONCE: MatchResult = MatchResult { success: true, once: true, ..MatchResult::FALSE };

    #[inline(always)]
    pub fn success(success: bool) -> MatchResult { MatchResult { success, ..MatchResult::FALSE } }

    /// Fails once, and also once for every position the caller would try next.
    #[inline(always)]
    pub fn position_exhausted() -> MatchResult {
        MatchResult { once: true, position_once: true, ..MatchResult::FALSE }
    }

    /// Flips `success` when `negate` holds, leaving the other bits alone.
    #[inline(always)]
    pub fn toggled(mut self, negate: bool) -> MatchResult {
        self.success ^= negate;
        self
    }

    /// The fence and once bits of `other`, as sub-results pass them upward.
    #[inline(always)]
    pub fn fence_once(other: MatchResult) -> MatchResult {
        MatchResult { once: other.once, fence: other.fence, ..MatchResult::FALSE }
    }

    #[inline(always)]
    pub fn with_once(mut self) -> MatchResult {
        self.once = true;
        self
    }

    /// Whether a sequence loop must stop trying further split points.
    #[inline(always)]
    pub fn stops_loop(left: MatchResult, right: MatchResult) -> bool {
        right.success || left.position_once || left.once || right.once || right.position_max_reached
    }
}

impl BitOrAssign for MatchResult {
    fn bitor_assign(&mut self, rhs: MatchResult) {
        self.success |= rhs.success;
        self.once |= rhs.once;
        self.position_once |= rhs.position_once;
        self.position_max_reached |= rhs.position_max_reached;
        self.fence |= rhs.fence;
    }
}
