use enumset::EnumSet;

use crate::network::{LaneId, LaneType, TravelDirection};
use crate::request::PathPosition;

pub const NUM_BUCKETS: usize = 1024;
pub const BUCKET_CAPACITY: usize = 64;

/// A lane reached by the search, with the cost from here to the destination.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrontierItem {
    pub position: PathPosition,
    /// Normalized cost; compared and bucketed
    pub comparison_value: f32,
    /// Meters travelled without changing between walking and vehicle lanes
    pub method_distance: f32,
    pub lane: LaneId,
    /// The directions the lane may be travelled in to arrive at `position`
    pub direction: EnumSet<TravelDirection>,
    pub lanes_used: EnumSet<LaneType>,
    /// Segments between this lane and the next real junction, in travel order
    pub segments_to_junction: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    /// A costlier item for the same lane was displaced.
    Replaced,
    /// The lane already has an item at least this cheap, or was already popped.
    Rejected,
    /// Every bucket from here up is full.
    Dropped,
}

#[derive(Clone, Copy, Debug, Default)]
struct LaneLocation {
    generation: u32,
    slot: u32,
}

/// A monotone priority queue over costs in [0, 1]: items go into one of NUM_BUCKETS fixed-size
/// buckets by cost, and buckets are drained in order. Each lane has at most one live item, found
/// through a per-lane slot table. Slot tables are invalidated between searches by bumping a
/// generation counter instead of clearing them.
pub struct OpenSet {
    buffer: Vec<FrontierItem>,
    /// Per bucket, the slot of the next item to pop and of the last item pushed
    bucket_min: Vec<i32>,
    bucket_max: Vec<i32>,
    min_bucket: usize,
    max_bucket: i32,

    lane_location: Vec<LaneLocation>,
    /// The next position in travel order after leaving each lane
    lane_target: Vec<PathPosition>,
    generation: u32,
    full_clears: usize,
}

impl OpenSet {
    pub fn new(lane_count: usize) -> OpenSet {
        OpenSet {
            buffer: vec![FrontierItem::default(); NUM_BUCKETS * BUCKET_CAPACITY],
            bucket_min: vec![0; NUM_BUCKETS],
            bucket_max: vec![-1; NUM_BUCKETS],
            min_bucket: 0,
            max_bucket: -1,
            lane_location: vec![LaneLocation::default(); lane_count],
            lane_target: vec![PathPosition::default(); lane_count],
            generation: 0,
            full_clears: 0,
        }
    }

    /// Forgets everything from the previous search.
    pub fn begin_search(&mut self, lane_count: usize) {
        if self.lane_location.len() < lane_count {
            self.lane_location
                .resize(lane_count, LaneLocation::default());
            self.lane_target.resize(lane_count, PathPosition::default());
        }
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Stale entries could now look current.
            for loc in &mut self.lane_location {
                *loc = LaneLocation::default();
            }
            self.generation = 1;
            self.full_clears += 1;
        }
        for b in 0..NUM_BUCKETS {
            self.bucket_min[b] = 0;
            self.bucket_max[b] = -1;
        }
        self.min_bucket = 0;
        self.max_bucket = -1;
    }

    fn bucket_for(&self, cost: f32) -> Option<usize> {
        if self.min_bucket >= NUM_BUCKETS {
            return None;
        }
        let raw = (cost * NUM_BUCKETS as f32).round();
        let bucket = if raw.is_nan() || raw < 0.0 {
            0
        } else {
            raw.min((NUM_BUCKETS - 1) as f32) as usize
        };
        Some(bucket.max(self.min_bucket))
    }

    fn is_popped(&self, slot: usize) -> bool {
        let bucket = slot / BUCKET_CAPACITY;
        let idx = (slot % BUCKET_CAPACITY) as i32;
        bucket < self.min_bucket || idx < self.bucket_min[bucket]
    }

    /// Offers an item for its lane, remembering `target` as where the route continues.
    pub fn push(&mut self, item: FrontierItem, target: PathPosition) -> PushOutcome {
        let lane = item.lane.0 as usize;
        let loc = self.lane_location[lane];
        let mut evict = None;

        if loc.generation == self.generation {
            let slot = loc.slot as usize;
            if self.is_popped(slot) || item.comparison_value >= self.buffer[slot].comparison_value
            {
                return PushOutcome::Rejected;
            }
            let bucket = slot / BUCKET_CAPACITY;
            if self.bucket_for(item.comparison_value) == Some(bucket) {
                self.buffer[slot] = item;
                self.lane_target[lane] = target;
                return PushOutcome::Replaced;
            }
            evict = Some(slot);
        }

        // Find room before touching the old item, so a drop leaves it in place. The old item's
        // bucket has room once it's gone.
        let mut bucket = match self.bucket_for(item.comparison_value) {
            Some(b) => b,
            None => return PushOutcome::Dropped,
        };
        while self.bucket_max[bucket] == (BUCKET_CAPACITY - 1) as i32
            && evict.map(|slot| slot / BUCKET_CAPACITY) != Some(bucket)
        {
            bucket += 1;
            if bucket == NUM_BUCKETS {
                return PushOutcome::Dropped;
            }
        }

        let mut outcome = PushOutcome::Inserted;
        if let Some(slot) = evict {
            // Fill the hole with the old bucket's last item.
            let old_bucket = slot / BUCKET_CAPACITY;
            let last = old_bucket * BUCKET_CAPACITY + self.bucket_max[old_bucket] as usize;
            self.bucket_max[old_bucket] -= 1;
            let moved = self.buffer[last];
            self.buffer[slot] = moved;
            self.lane_location[moved.lane.0 as usize].slot = slot as u32;
            outcome = PushOutcome::Replaced;
        }

        self.bucket_max[bucket] += 1;
        self.max_bucket = self.max_bucket.max(bucket as i32);
        let slot = bucket * BUCKET_CAPACITY + self.bucket_max[bucket] as usize;
        self.buffer[slot] = item;
        self.lane_location[lane] = LaneLocation {
            generation: self.generation,
            slot: slot as u32,
        };
        self.lane_target[lane] = target;
        outcome
    }

    /// The cheapest remaining item, approximately. Items within one bucket pop in insertion order.
    pub fn pop(&mut self) -> Option<FrontierItem> {
        while self.min_bucket as i32 <= self.max_bucket {
            let bucket = self.min_bucket;
            if self.bucket_min[bucket] > self.bucket_max[bucket] {
                self.min_bucket += 1;
                continue;
            }
            let slot = bucket * BUCKET_CAPACITY + self.bucket_min[bucket] as usize;
            self.bucket_min[bucket] += 1;
            return Some(self.buffer[slot]);
        }
        None
    }

    /// Where the route continues after `lane`, if the current search reached it.
    pub fn target(&self, lane: LaneId) -> Option<PathPosition> {
        let loc = self.lane_location.get(lane.0 as usize)?;
        if loc.generation == self.generation {
            Some(self.lane_target[lane.0 as usize])
        } else {
            None
        }
    }

    /// The lane's item has been popped in the current search.
    pub fn is_settled(&self, lane: LaneId) -> bool {
        match self.lane_location.get(lane.0 as usize) {
            Some(loc) if loc.generation == self.generation => self.is_popped(loc.slot as usize),
            _ => false,
        }
    }

    /// Items pushed and not yet popped
    pub fn live_items(&self) -> Vec<FrontierItem> {
        let mut items = Vec::new();
        if self.max_bucket < 0 {
            return items;
        }
        for bucket in self.min_bucket..=(self.max_bucket as usize) {
            for idx in self.bucket_min[bucket]..=self.bucket_max[bucket] {
                items.push(self.buffer[bucket * BUCKET_CAPACITY + idx as usize]);
            }
        }
        items
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// How many times the generation counter has wrapped
    pub fn full_clears(&self) -> usize {
        self.full_clears
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    use super::*;
    use crate::network::SegmentId;

    fn item(lane: u32, cost: f32) -> FrontierItem {
        FrontierItem {
            position: PathPosition::new(SegmentId(lane), 0, 255),
            comparison_value: cost,
            lane: LaneId(lane),
            ..Default::default()
        }
    }

    fn here(lane: u32) -> PathPosition {
        PathPosition::new(SegmentId(lane), 0, 255)
    }

    #[test]
    fn keeps_cheapest_item_per_lane() {
        let mut open = OpenSet::new(10);
        open.begin_search(10);
        assert_eq!(open.push(item(3, 0.5), here(0)), PushOutcome::Inserted);
        assert_eq!(open.push(item(3, 0.6), here(1)), PushOutcome::Rejected);
        assert_eq!(open.push(item(3, 0.2), here(2)), PushOutcome::Replaced);
        assert_eq!(open.target(LaneId(3)), Some(here(2)));

        let live = open.live_items();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].comparison_value, 0.2);
        assert_eq!(open.pop().unwrap().comparison_value, 0.2);
        assert_eq!(open.pop(), None);
    }

    #[test]
    fn popped_lanes_are_settled() {
        let mut open = OpenSet::new(4);
        open.begin_search(4);
        open.push(item(1, 0.3), here(1));
        open.pop().unwrap();
        assert!(open.is_settled(LaneId(1)));
        assert_eq!(open.push(item(1, 0.0), here(2)), PushOutcome::Rejected);
        assert_eq!(open.target(LaneId(1)), Some(here(1)));
    }

    #[test]
    fn eviction_keeps_other_lanes_reachable() {
        let mut open = OpenSet::new(10);
        open.begin_search(10);
        // Same bucket
        open.push(item(1, 0.5), here(1));
        open.push(item(2, 0.5), here(2));
        open.push(item(3, 0.5), here(3));
        // Lane 1 moves to a cheaper bucket; lane 3 fills its old slot.
        assert_eq!(open.push(item(1, 0.1), here(1)), PushOutcome::Replaced);
        assert_eq!(open.push(item(3, 0.05), here(3)), PushOutcome::Replaced);

        let lanes: Vec<u32> = std::iter::from_fn(|| open.pop())
            .map(|i| i.lane.0)
            .collect();
        assert_eq!(lanes, vec![3, 1, 2]);
    }

    #[test]
    fn replacing_into_full_buckets_reuses_the_old_slot() {
        let lanes = 2 * BUCKET_CAPACITY;
        let mut open = OpenSet::new(lanes);
        open.begin_search(lanes);
        let cheap = 100.0 / NUM_BUCKETS as f32;
        let dear = 101.0 / NUM_BUCKETS as f32;
        for lane in 0..BUCKET_CAPACITY {
            open.push(item(lane as u32, cheap), here(0));
            open.push(item((BUCKET_CAPACITY + lane) as u32, dear), here(0));
        }

        // Both buckets are full; only the old item's own slot frees up.
        let lane = LaneId(BUCKET_CAPACITY as u32);
        assert_eq!(open.push(item(lane.0, cheap), here(7)), PushOutcome::Replaced);
        assert_eq!(open.target(lane), Some(here(7)));
        let live = open.live_items();
        assert_eq!(live.len(), lanes);
        let mine: Vec<_> = live.iter().filter(|i| i.lane == lane).collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].comparison_value, cheap);
    }

    #[test]
    fn full_bucket_spills_forward() {
        let lanes = BUCKET_CAPACITY + 1;
        let mut open = OpenSet::new(lanes);
        open.begin_search(lanes);
        for lane in 0..lanes {
            assert_eq!(
                open.push(item(lane as u32, 0.0), here(0)),
                PushOutcome::Inserted
            );
        }
        let costs: Vec<f32> = std::iter::from_fn(|| open.pop())
            .map(|i| i.comparison_value)
            .collect();
        assert_eq!(costs.len(), lanes);
    }

    #[test]
    fn drops_when_everything_above_is_full() {
        let lanes = BUCKET_CAPACITY + 1;
        let mut open = OpenSet::new(lanes);
        open.begin_search(lanes);
        for lane in 0..BUCKET_CAPACITY {
            open.push(item(lane as u32, 1.0), here(0));
        }
        assert_eq!(
            open.push(item(BUCKET_CAPACITY as u32, 2.0), here(0)),
            PushOutcome::Dropped
        );
        assert_eq!(open.target(LaneId(BUCKET_CAPACITY as u32)), None);
    }

    #[test]
    fn pop_order_is_monotonic_by_bucket() {
        let lanes = 2000;
        let mut rng = XorShiftRng::seed_from_u64(42);
        let mut open = OpenSet::new(lanes);
        open.begin_search(lanes);
        for _ in 0..5000 {
            let lane = rng.gen_range(0..lanes as u32);
            open.push(item(lane, rng.gen_range(0.0..1.0)), here(0));
        }

        let mut seen = BTreeSet::new();
        let mut last_bucket = 0;
        while let Some(i) = open.pop() {
            assert!(seen.insert(i.lane), "{} popped twice", i.lane);
            let bucket = (i.comparison_value * NUM_BUCKETS as f32).round() as usize;
            assert!(bucket + 1 >= last_bucket);
            last_bucket = last_bucket.max(bucket);
        }
    }

    #[test]
    fn generations_isolate_searches() {
        let mut open = OpenSet::new(4);
        open.begin_search(4);
        open.push(item(2, 0.4), here(1));
        open.begin_search(4);
        assert_eq!(open.target(LaneId(2)), None);
        assert_eq!(open.push(item(2, 0.9), here(3)), PushOutcome::Inserted);
        assert!(open.live_items().len() == 1);
    }

    #[test]
    fn generation_wraparound_clears_tables() {
        let mut open = OpenSet::new(4);
        open.begin_search(4);
        open.push(item(2, 0.4), here(1));
        // Pretend this lane was touched exactly one wrap ago.
        open.lane_location[2].generation = 1;
        open.generation = u32::MAX;
        open.begin_search(4);
        assert_eq!(open.generation(), 1);
        assert_eq!(open.full_clears(), 1);
        assert_eq!(open.target(LaneId(2)), None);
    }
}
