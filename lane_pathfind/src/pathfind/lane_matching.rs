//! Which lane after a junction each lane before it lines up with, so that multi-lane merges and
//! splits spread traffic evenly. Lanes are counted from the curb.

use enumset::EnumSet;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::network::{LaneId, TrafficHandedness, TurnDirection};
use crate::policy::LaneArrow;

/// The inclusive range of next-lane indices one previous lane may continue onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneRange {
    pub lo: usize,
    pub hi: usize,
    /// On odd merges, one lane straddles two targets and picks between them per request.
    pub criss_cross: bool,
}

impl LaneRange {
    fn single(k: usize) -> LaneRange {
        LaneRange {
            lo: k,
            hi: k,
            criss_cross: false,
        }
    }

    fn span(lo: usize, hi: usize) -> LaneRange {
        LaneRange {
            lo,
            hi,
            criss_cross: false,
        }
    }

    pub fn contains(&self, k: usize) -> bool {
        self.lo <= k && k <= self.hi
    }

    /// Resolves a criss-crossing lane to one target, the same way every time for one request
    /// and lane.
    pub fn resolve(self, seed: u64, lane: LaneId) -> LaneRange {
        if !self.criss_cross {
            return self;
        }
        let mut rng = XorShiftRng::seed_from_u64(seed ^ mix(u64::from(lane.0)));
        LaneRange::single(rng.gen_range(self.lo..=self.hi))
    }
}

/// Spreads the bits of an id before combining it with a seed.
pub fn mix(x: u64) -> u64 {
    x.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// `p` is the previous lane's index among `prev_count` similar lanes; `next_count` lanes are
/// available after the junction.
pub fn similar_lane_range(p: usize, prev_count: usize, next_count: usize) -> Option<LaneRange> {
    if p >= prev_count || next_count == 0 {
        return None;
    }
    if prev_count == next_count {
        return Some(LaneRange::single(p));
    }
    if prev_count == 1 {
        return Some(LaneRange::span(0, next_count - 1));
    }

    if next_count > prev_count {
        // Split: the outer and inner lanes fan out to cover the new lanes.
        let half = (next_count - prev_count + 1) / 2;
        return Some(if p == 0 {
            LaneRange::span(0, half)
        } else if p == prev_count - 1 {
            LaneRange::span(p + half, next_count - 1)
        } else {
            LaneRange::single(p + half)
        });
    }

    // Merge: fold the outer lanes onto the curb lane and the inner lanes onto the innermost.
    let d = prev_count - next_count;
    let outer = (d + 1) / 2;
    let inner = d / 2;
    Some(if p < outer {
        if d % 2 == 1 && next_count >= 2 && p == outer - 1 {
            LaneRange {
                lo: 0,
                hi: 1,
                criss_cross: true,
            }
        } else {
            LaneRange::single(0)
        }
    } else if p >= prev_count - inner {
        LaneRange::single(next_count - 1)
    } else {
        LaneRange::single(p - outer)
    })
}

/// How many lanes a vehicle shifts sideways going from index `p` to `k`, measured against the
/// centered alignment of both lane groups.
pub fn lateral_shift(p: usize, k: usize, prev_count: usize, next_count: usize) -> f32 {
    let centering = (prev_count as f32 - next_count as f32) / 2.0;
    (p as f32 - k as f32 - centering).abs()
}

/// U-turns leave from the lane furthest from the curb.
pub fn arrow_for_turn(turn: TurnDirection, handedness: TrafficHandedness) -> LaneArrow {
    match turn {
        TurnDirection::Left => LaneArrow::Left,
        TurnDirection::Forward => LaneArrow::Forward,
        TurnDirection::Right => LaneArrow::Right,
        TurnDirection::UTurn => match handedness {
            TrafficHandedness::RightHand => LaneArrow::Left,
            TrafficHandedness::LeftHand => LaneArrow::Right,
        },
    }
}

/// Lanes without arrows may turn any way.
pub fn arrows_allow(
    arrows: Option<EnumSet<LaneArrow>>,
    turn: TurnDirection,
    handedness: TrafficHandedness,
) -> bool {
    match arrows {
        Some(a) => a.contains(arrow_for_turn(turn, handedness)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(prev: usize, next: usize) -> Vec<(usize, usize)> {
        (0..prev)
            .map(|p| {
                let r = similar_lane_range(p, prev, next).unwrap();
                (r.lo, r.hi)
            })
            .collect()
    }

    #[test]
    fn equal_counts_match_by_index() {
        assert_eq!(ranges(3, 3), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn merges() {
        assert_eq!(ranges(3, 1), vec![(0, 0), (0, 0), (0, 0)]);
        assert_eq!(ranges(4, 2), vec![(0, 0), (0, 0), (1, 1), (1, 1)]);
        // Odd difference: the outer lane criss-crosses.
        assert_eq!(ranges(3, 2), vec![(0, 1), (0, 0), (1, 1)]);
        assert!(similar_lane_range(0, 3, 2).unwrap().criss_cross);
        assert_eq!(ranges(5, 2), vec![(0, 0), (0, 1), (0, 0), (1, 1), (1, 1)]);
    }

    #[test]
    fn splits() {
        assert_eq!(ranges(1, 3), vec![(0, 2)]);
        assert_eq!(ranges(2, 4), vec![(0, 1), (2, 3)]);
        assert_eq!(ranges(3, 5), vec![(0, 1), (2, 2), (3, 4)]);
        assert_eq!(ranges(2, 3), vec![(0, 1), (2, 2)]);
    }

    #[test]
    fn every_next_lane_is_covered() {
        for prev in 1..6 {
            for next in 1..6 {
                for k in 0..next {
                    assert!(
                        (0..prev).any(|p| similar_lane_range(p, prev, next).unwrap().contains(k)),
                        "{} -> {} leaves lane {} unused",
                        prev,
                        next,
                        k
                    );
                }
            }
        }
    }

    #[test]
    fn criss_cross_resolution_is_seeded() {
        let range = similar_lane_range(0, 3, 2).unwrap();
        let a = range.resolve(7, LaneId(12));
        assert_eq!(a, range.resolve(7, LaneId(12)));
        assert!(!a.criss_cross);
        assert_eq!(a.lo, a.hi);
        assert!(a.lo <= 1);

        // Different requests land on both lanes eventually.
        let picks: Vec<usize> = (0..64).map(|seed| range.resolve(seed, LaneId(12)).lo).collect();
        assert!(picks.contains(&0) && picks.contains(&1));
    }

    #[test]
    fn merge_shift_is_centered() {
        assert_eq!(lateral_shift(1, 0, 3, 1), 0.0);
        assert_eq!(lateral_shift(0, 0, 3, 1), 1.0);
        assert_eq!(lateral_shift(2, 0, 3, 1), 1.0);
        assert_eq!(lateral_shift(1, 1, 2, 2), 0.0);
        assert_eq!(lateral_shift(0, 1, 2, 2), 1.0);
    }

    #[test]
    fn arrows() {
        let rht = TrafficHandedness::RightHand;
        assert!(arrows_allow(None, TurnDirection::Left, rht));
        let straight_right = Some(LaneArrow::Forward | LaneArrow::Right);
        assert!(arrows_allow(straight_right, TurnDirection::Right, rht));
        assert!(!arrows_allow(straight_right, TurnDirection::Left, rht));
        assert!(!arrows_allow(straight_right, TurnDirection::UTurn, rht));
        assert!(arrows_allow(
            straight_right,
            TurnDirection::UTurn,
            TrafficHandedness::LeftHand
        ));
    }
}
