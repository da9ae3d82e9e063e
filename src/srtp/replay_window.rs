use crate::srtp::constants::REPLAY_WINDOW_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplayStatus {
    Accepted,
    Duplicate,
    TooOld,
}

/// 64-entry sliding bitmask keyed off the highest accepted index.
///
/// Bit `n` is set when `highest - n` has been accepted. Callers pass the
/// distance `delta = candidate - highest` rather than absolute indices.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplayWindow {
    bits: u64,
}

impl ReplayWindow {
    pub(crate) fn new() -> Self {
        Self { bits: 0 }
    }

    pub(crate) fn check(&self, delta: i64) -> ReplayStatus {
        if delta > 0 {
            return ReplayStatus::Accepted;
        }
        let back = delta.unsigned_abs();
        if back >= REPLAY_WINDOW_SIZE {
            return ReplayStatus::TooOld;
        }
        if (self.bits >> back) & 1 == 1 {
            ReplayStatus::Duplicate
        } else {
            ReplayStatus::Accepted
        }
    }

    /// Records an accepted packet. `delta > 0` slides the window forward.
    pub(crate) fn update(&mut self, delta: i64) {
        if delta > 0 {
            let shift = u32::try_from(delta).unwrap_or(u32::MAX);
            self.bits = self.bits.checked_shl(shift).unwrap_or(0) | 1;
        } else {
            let back = delta.unsigned_abs();
            if back < REPLAY_WINDOW_SIZE {
                self.bits |= 1u64 << back;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn newer_packets_slide_the_window() {
        let mut w = ReplayWindow::new();
        w.update(0);
        assert_eq!(w.check(1), ReplayStatus::Accepted);
        w.update(1);
        // the previous highest is now one behind and still marked
        assert_eq!(w.check(-1), ReplayStatus::Duplicate);
        assert_eq!(w.check(0), ReplayStatus::Duplicate);
    }

    #[test]
    fn same_index_twice_is_duplicate() {
        let mut w = ReplayWindow::new();
        assert_eq!(w.check(0), ReplayStatus::Accepted);
        w.update(0);
        assert_eq!(w.check(0), ReplayStatus::Duplicate);
    }

    #[test]
    fn in_window_unseen_index_is_accepted() {
        let mut w = ReplayWindow::new();
        w.update(0);
        w.update(10); // highest moves 10 ahead, bits for -1..-9 stay clear
        assert_eq!(w.check(-5), ReplayStatus::Accepted);
        w.update(-5);
        assert_eq!(w.check(-5), ReplayStatus::Duplicate);
        assert_eq!(w.check(-10), ReplayStatus::Duplicate);
    }

    #[test]
    fn sixty_four_behind_is_too_old() {
        let w = ReplayWindow::new();
        assert_eq!(w.check(-63), ReplayStatus::Accepted);
        assert_eq!(w.check(-64), ReplayStatus::TooOld);
        assert_eq!(w.check(-70_000), ReplayStatus::TooOld);
    }

    #[test]
    fn large_jump_clears_history() {
        let mut w = ReplayWindow::new();
        w.update(0);
        w.update(100);
        assert_eq!(w.check(0), ReplayStatus::Duplicate);
        assert_eq!(w.check(-1), ReplayStatus::Accepted);
    }
}
