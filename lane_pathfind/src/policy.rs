//! Overrides from outside the core: per-lane speed limits and vehicle restrictions, lane arrows
//! and connectors, junction turn restrictions, priority signs, and per-segment flags. The search
//! only queries these.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};

use crate::io::{deserialize_btreemap, serialize_btreemap};
use crate::network::{LaneId, NodeId, SegmentId, VehicleType};

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum LaneArrow {
    Left,
    Forward,
    Right,
}

#[derive(Debug, Serialize, Deserialize, PartialOrd, Ord, EnumSetType)]
pub enum SegmentFlag {
    /// Passable, but something is in the way. Searching over it is penalized and reported.
    Blocked,
    Flooded,
    /// A previous search through here failed; don't try again.
    PathFailed,
    HeavyBan,
    CarBan,
}

/// A sign facing traffic on a segment as it enters a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrioritySign {
    Yield,
    Stop,
}

/// Every method has a default meaning "no override", so implementations only need to answer what
/// they care about.
pub trait PolicyProviders: Send + Sync {
    fn speed_limit(&self, _lane: LaneId) -> Option<f32> {
        None
    }

    fn allowed_vehicle_types(&self, _lane: LaneId) -> Option<EnumSet<VehicleType>> {
        None
    }

    /// Arrows painted on `lane` where it enters `node`.
    fn lane_arrows(&self, _lane: LaneId, _node: NodeId) -> Option<EnumSet<LaneArrow>> {
        None
    }

    /// The only lanes past `node` that `lane` may continue onto.
    fn lane_connections(&self, _lane: LaneId, _node: NodeId) -> Option<&[LaneId]> {
        None
    }

    fn is_turn_allowed(&self, _from: SegmentId, _node: NodeId, _to: SegmentId) -> bool {
        true
    }

    fn is_uturn_allowed(&self, _segment: SegmentId, _node: NodeId) -> bool {
        false
    }

    fn priority_sign(&self, _segment: SegmentId, _node: NodeId) -> Option<PrioritySign> {
        None
    }

    fn segment_flags(&self, _segment: SegmentId) -> EnumSet<SegmentFlag> {
        EnumSet::empty()
    }

    fn is_highway(&self, _segment: SegmentId) -> bool {
        false
    }

    /// 0 is empty, 1 is jammed.
    fn traffic_density(&self, _lane: LaneId) -> f32 {
        0.0
    }
}

pub struct NoPolicies;

impl PolicyProviders for NoPolicies {}

/// Policies as plain tables, editable through the setters or loaded from JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticPolicies {
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    speed_limits: BTreeMap<LaneId, f32>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    vehicle_restrictions: BTreeMap<LaneId, EnumSet<VehicleType>>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    lane_arrows: BTreeMap<(LaneId, NodeId), EnumSet<LaneArrow>>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    lane_connections: BTreeMap<(LaneId, NodeId), Vec<LaneId>>,
    banned_turns: BTreeSet<(SegmentId, NodeId, SegmentId)>,
    uturns: BTreeSet<(SegmentId, NodeId)>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    priority_signs: BTreeMap<(SegmentId, NodeId), PrioritySign>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    segment_flags: BTreeMap<SegmentId, EnumSet<SegmentFlag>>,
    highways: BTreeSet<SegmentId>,
    #[serde(
        serialize_with = "serialize_btreemap",
        deserialize_with = "deserialize_btreemap"
    )]
    traffic_density: BTreeMap<LaneId, f32>,
}

impl StaticPolicies {
    pub fn new() -> StaticPolicies {
        StaticPolicies::default()
    }

    pub fn load(path: &str) -> Result<StaticPolicies> {
        crate::io::read_json(path)
    }

    pub fn set_speed_limit(&mut self, lane: LaneId, speed: f32) {
        self.speed_limits.insert(lane, speed);
    }

    pub fn restrict_vehicles(&mut self, lane: LaneId, allowed: EnumSet<VehicleType>) {
        self.vehicle_restrictions.insert(lane, allowed);
    }

    pub fn set_lane_arrows(&mut self, lane: LaneId, node: NodeId, arrows: EnumSet<LaneArrow>) {
        self.lane_arrows.insert((lane, node), arrows);
    }

    pub fn connect_lanes(&mut self, lane: LaneId, node: NodeId, to: Vec<LaneId>) {
        self.lane_connections.insert((lane, node), to);
    }

    pub fn ban_turn(&mut self, from: SegmentId, node: NodeId, to: SegmentId) {
        self.banned_turns.insert((from, node, to));
    }

    pub fn allow_uturn(&mut self, segment: SegmentId, node: NodeId) {
        self.uturns.insert((segment, node));
    }

    /// None takes the sign down.
    pub fn set_priority_sign(
        &mut self,
        segment: SegmentId,
        node: NodeId,
        sign: Option<PrioritySign>,
    ) {
        match sign {
            Some(sign) => {
                self.priority_signs.insert((segment, node), sign);
            }
            None => {
                self.priority_signs.remove(&(segment, node));
            }
        }
    }

    pub fn flag_segment(&mut self, segment: SegmentId, flag: SegmentFlag) {
        *self.segment_flags.entry(segment).or_default() |= flag;
    }

    pub fn clear_segment_flags(&mut self, segment: SegmentId) {
        self.segment_flags.remove(&segment);
    }

    pub fn mark_highway(&mut self, segment: SegmentId) {
        self.highways.insert(segment);
    }

    pub fn set_traffic_density(&mut self, lane: LaneId, density: f32) {
        self.traffic_density.insert(lane, density.clamp(0.0, 1.0));
    }
}

impl PolicyProviders for StaticPolicies {
    fn speed_limit(&self, lane: LaneId) -> Option<f32> {
        self.speed_limits.get(&lane).cloned()
    }

    fn allowed_vehicle_types(&self, lane: LaneId) -> Option<EnumSet<VehicleType>> {
        self.vehicle_restrictions.get(&lane).cloned()
    }

    fn lane_arrows(&self, lane: LaneId, node: NodeId) -> Option<EnumSet<LaneArrow>> {
        self.lane_arrows.get(&(lane, node)).cloned()
    }

    fn lane_connections(&self, lane: LaneId, node: NodeId) -> Option<&[LaneId]> {
        self.lane_connections
            .get(&(lane, node))
            .map(|lanes| lanes.as_slice())
    }

    fn is_turn_allowed(&self, from: SegmentId, node: NodeId, to: SegmentId) -> bool {
        !self.banned_turns.contains(&(from, node, to))
    }

    fn is_uturn_allowed(&self, segment: SegmentId, node: NodeId) -> bool {
        self.uturns.contains(&(segment, node))
    }

    fn priority_sign(&self, segment: SegmentId, node: NodeId) -> Option<PrioritySign> {
        self.priority_signs.get(&(segment, node)).cloned()
    }

    fn segment_flags(&self, segment: SegmentId) -> EnumSet<SegmentFlag> {
        self.segment_flags
            .get(&segment)
            .cloned()
            .unwrap_or_default()
    }

    fn is_highway(&self, segment: SegmentId) -> bool {
        self.highways.contains(&segment)
    }

    fn traffic_density(&self, lane: LaneId) -> f32 {
        self.traffic_density.get(&lane).cloned().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mean_no_override() {
        let p = NoPolicies;
        assert_eq!(p.speed_limit(LaneId(3)), None);
        assert!(p.is_turn_allowed(SegmentId(0), NodeId(1), SegmentId(2)));
        assert!(!p.is_uturn_allowed(SegmentId(0), NodeId(1)));
        assert_eq!(p.priority_sign(SegmentId(0), NodeId(1)), None);
        assert!(p.segment_flags(SegmentId(0)).is_empty());
    }

    #[test]
    fn flags_accumulate() {
        let mut p = StaticPolicies::new();
        p.flag_segment(SegmentId(4), SegmentFlag::Blocked);
        p.flag_segment(SegmentId(4), SegmentFlag::CarBan);
        assert_eq!(
            p.segment_flags(SegmentId(4)),
            SegmentFlag::Blocked | SegmentFlag::CarBan
        );
        p.clear_segment_flags(SegmentId(4));
        assert!(p.segment_flags(SegmentId(4)).is_empty());
    }

    #[test]
    fn json_with_struct_keys() {
        let mut p = StaticPolicies::new();
        p.set_lane_arrows(LaneId(1), NodeId(2), LaneArrow::Left | LaneArrow::Forward);
        p.connect_lanes(LaneId(1), NodeId(2), vec![LaneId(7), LaneId(8)]);
        p.ban_turn(SegmentId(0), NodeId(2), SegmentId(5));
        p.set_traffic_density(LaneId(1), 3.0);
        p.set_priority_sign(SegmentId(0), NodeId(2), Some(PrioritySign::Stop));
        p.set_priority_sign(SegmentId(5), NodeId(2), Some(PrioritySign::Yield));
        p.set_priority_sign(SegmentId(5), NodeId(2), None);

        let json = serde_json::to_string(&p).unwrap();
        let loaded: StaticPolicies = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, p);
        assert_eq!(
            loaded.lane_connections(LaneId(1), NodeId(2)),
            Some(&[LaneId(7), LaneId(8)][..])
        );
        assert!(!loaded.is_turn_allowed(SegmentId(0), NodeId(2), SegmentId(5)));
        assert_eq!(loaded.traffic_density(LaneId(1)), 1.0);
        assert_eq!(
            loaded.priority_sign(SegmentId(0), NodeId(2)),
            Some(PrioritySign::Stop)
        );
        assert_eq!(loaded.priority_sign(SegmentId(5), NodeId(2)), None);

        // Missing tables fall back to empty
        let partial: StaticPolicies = serde_json::from_str(r#"{"highways": [3]}"#).unwrap();
        assert!(partial.is_highway(SegmentId(3)));
    }
}
