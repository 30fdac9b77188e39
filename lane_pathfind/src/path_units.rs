//! Finished routes are stored as chains of fixed-size units in a pool shared by all workers.
//! Vehicles follow a chain by reading positions unit by unit.

use std::sync::Mutex;

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

use crate::error::PathFailure;
use crate::request::PathPosition;

pub const POSITIONS_PER_UNIT: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathUnitId(pub u32);

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum PathUnitFlag {
    /// Written completely; safe for vehicles to follow
    Ready,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathUnit {
    positions: [PathPosition; POSITIONS_PER_UNIT],
    position_count: u8,
    next: Option<PathUnitId>,
    length_share: f32,
    remaining_length: f32,
    flags: EnumSet<PathUnitFlag>,
    ref_count: u16,
}

impl PathUnit {
    fn empty() -> PathUnit {
        PathUnit {
            positions: [PathPosition::default(); POSITIONS_PER_UNIT],
            position_count: 0,
            next: None,
            length_share: 0.0,
            remaining_length: 0.0,
            flags: EnumSet::empty(),
            ref_count: 0,
        }
    }

    pub fn positions(&self) -> &[PathPosition] {
        &self.positions[..self.position_count as usize]
    }

    pub fn next(&self) -> Option<PathUnitId> {
        self.next
    }

    /// This unit's part of the total path length, proportional to its position count
    pub fn length_share(&self) -> f32 {
        self.length_share
    }

    /// Length from this unit's first position to the end of the path
    pub fn remaining_length(&self) -> f32 {
        self.remaining_length
    }

    pub fn flags(&self) -> EnumSet<PathUnitFlag> {
        self.flags
    }

    pub fn ref_count(&self) -> u16 {
        self.ref_count
    }
}

struct PoolInner {
    units: Vec<PathUnit>,
    free: Vec<PathUnitId>,
    capacity: usize,
}

impl PoolInner {
    fn available(&self) -> usize {
        self.free.len() + (self.capacity - self.units.len())
    }

    fn allocate(&mut self) -> PathUnitId {
        if let Some(id) = self.free.pop() {
            return id;
        }
        self.units.push(PathUnit::empty());
        PathUnitId((self.units.len() - 1) as u32)
    }

    fn get_mut(&mut self, id: PathUnitId) -> &mut PathUnit {
        &mut self.units[id.0 as usize]
    }
}

pub struct PathUnitPool {
    inner: Mutex<PoolInner>,
}

impl PathUnitPool {
    pub fn new(capacity: usize) -> PathUnitPool {
        PathUnitPool {
            inner: Mutex::new(PoolInner {
                units: Vec::new(),
                free: Vec::new(),
                capacity,
            }),
        }
    }

    /// Either the whole chain fits, or nothing is allocated.
    pub fn store_chain(
        &self,
        positions: &[PathPosition],
        total_length: f32,
    ) -> Result<PathUnitId, PathFailure> {
        if positions.is_empty() {
            return Err(PathFailure::CorruptChain);
        }
        let needed = (positions.len() + POSITIONS_PER_UNIT - 1) / POSITIONS_PER_UNIT;

        let mut inner = self.inner.lock().unwrap();
        if inner.available() < needed {
            warn!(
                "Path unit pool is exhausted; {} units needed, {} free",
                needed,
                inner.available()
            );
            return Err(PathFailure::OutOfPathUnits);
        }

        let ids: Vec<PathUnitId> = (0..needed).map(|_| inner.allocate()).collect();
        let count = positions.len() as f32;
        let mut before = 0;
        for (idx, chunk) in positions.chunks(POSITIONS_PER_UNIT).enumerate() {
            let unit = inner.get_mut(ids[idx]);
            *unit = PathUnit::empty();
            unit.positions[..chunk.len()].copy_from_slice(chunk);
            unit.position_count = chunk.len() as u8;
            unit.next = ids.get(idx + 1).cloned();
            unit.length_share = total_length * chunk.len() as f32 / count;
            unit.remaining_length = total_length * (positions.len() - before) as f32 / count;
            unit.flags = EnumSet::only(PathUnitFlag::Ready);
            unit.ref_count = 1;
            before += chunk.len();
        }
        Ok(ids[0])
    }

    pub fn unit(&self, id: PathUnitId) -> PathUnit {
        self.inner.lock().unwrap().units[id.0 as usize].clone()
    }

    /// All positions of the chain starting at `first`, in travel order.
    pub fn positions(&self, first: PathUnitId) -> Vec<PathPosition> {
        let inner = self.inner.lock().unwrap();
        let mut result = Vec::new();
        let mut current = Some(first);
        // A chain can't be longer than the pool
        for _ in 0..inner.units.len() {
            let id = match current {
                Some(id) => id,
                None => break,
            };
            let unit = &inner.units[id.0 as usize];
            result.extend_from_slice(unit.positions());
            current = unit.next;
        }
        result
    }

    /// Another owner of the chain. The count lives on the first unit.
    pub fn add_ref(&self, first: PathUnitId) {
        let mut inner = self.inner.lock().unwrap();
        inner.get_mut(first).ref_count += 1;
    }

    /// Drops one owner. When none remain, every unit of the chain returns to the pool.
    pub fn release(&self, first: PathUnitId) {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.get_mut(first);
        if head.ref_count == 0 {
            error!("Releasing path unit {:?}, which is already free", first);
            return;
        }
        head.ref_count -= 1;
        if head.ref_count > 0 {
            return;
        }

        let mut current = Some(first);
        while let Some(id) = current {
            let unit = inner.get_mut(id);
            current = unit.next;
            *unit = PathUnit::empty();
            inner.free.push(id);
        }
    }

    pub fn in_use(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.units.len() - inner.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SegmentId;

    fn positions(n: usize) -> Vec<PathPosition> {
        (0..n)
            .map(|i| PathPosition::new(SegmentId(i as u32), 1, 255))
            .collect()
    }

    #[test]
    fn chain_splits_into_units() {
        let pool = PathUnitPool::new(10);
        let path = positions(30);
        let first = pool.store_chain(&path, 600.0).unwrap();
        assert_eq!(pool.in_use(), 3);
        assert_eq!(pool.positions(first), path);

        let head = pool.unit(first);
        assert_eq!(head.positions().len(), 12);
        assert!(head.flags().contains(PathUnitFlag::Ready));
        assert_eq!(head.remaining_length(), 600.0);

        let mut total = 0.0;
        let mut current = Some(first);
        while let Some(id) = current {
            let unit = pool.unit(id);
            total += unit.length_share();
            current = unit.next();
        }
        assert!((total - 600.0).abs() < 1e-3);
        // The last unit holds 6 of 30 positions.
        let last = pool.unit(pool.unit(head.next().unwrap()).next().unwrap());
        assert!((last.length_share() - 120.0).abs() < 1e-3);
        assert_eq!(last.next(), None);
    }

    #[test]
    fn overflow_allocates_nothing() {
        let pool = PathUnitPool::new(2);
        assert_eq!(
            pool.store_chain(&positions(25), 10.0),
            Err(PathFailure::OutOfPathUnits)
        );
        assert_eq!(pool.in_use(), 0);
        pool.store_chain(&positions(24), 10.0).unwrap();
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn release_after_last_owner() {
        let pool = PathUnitPool::new(4);
        let first = pool.store_chain(&positions(13), 1.0).unwrap();
        pool.add_ref(first);
        assert_eq!(pool.unit(first).ref_count(), 2);

        pool.release(first);
        assert_eq!(pool.in_use(), 2);
        pool.release(first);
        assert_eq!(pool.in_use(), 0);

        // Freed units are reused
        pool.store_chain(&positions(48), 1.0).unwrap();
        assert_eq!(pool.in_use(), 4);
    }
}
