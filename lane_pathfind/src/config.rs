use anyhow::Result;
use enumset::EnumSet;
use serde::{Deserialize, Serialize};

use crate::network::{TrafficHandedness, VehicleType};
use crate::policy::PrioritySign;

/// Tunable constants for the search. Lengths are "equivalent meters", converted to cost by the
/// same speed normalization as real distances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingParams {
    pub traffic_handedness: TrafficHandedness,
    /// Turns sharper than this are never taken. U-turns are governed separately.
    pub max_turn_angle_degrees: f64,

    pub heavy_ban_factor: f32,
    pub car_ban_factor: f32,
    pub transit_lane_factor: f32,
    pub avoid_direction_factor: f32,
    /// In normalized cost, not meters
    pub blocked_penalty: f32,
    /// Traversal costs are scaled by up to 1 + jitter.
    pub jitter: f32,

    pub lane_change_length: f32,
    pub highway_lane_change_tax: f32,
    /// Fraction of a transition's cost refunded for keeping the lane on a highway
    pub highway_stay_reward: f32,
    /// Inclusive range of segments before a junction where highway lane changes are untaxed
    pub highway_window: (u8, u8),

    /// Extra length for passing a yield sign
    pub yield_penalty: f32,
    /// Extra length for passing a stop sign
    pub stop_penalty: f32,

    pub walk_transition_penalty: f32,
    pub max_pedestrian_method_distance: f32,
    /// These vehicles pick lanes through lane matching, so they never get jitter.
    pub lane_changing_vehicles: EnumSet<VehicleType>,

    pub num_workers: usize,
    pub path_unit_capacity: usize,
}

impl Default for RoutingParams {
    fn default() -> RoutingParams {
        RoutingParams {
            traffic_handedness: TrafficHandedness::RightHand,
            max_turn_angle_degrees: 150.0,

            heavy_ban_factor: 10.0,
            car_ban_factor: 5.0,
            transit_lane_factor: 0.95,
            avoid_direction_factor: 10.0,
            blocked_penalty: 0.1,
            jitter: 0.25,

            lane_change_length: 20.0,
            highway_lane_change_tax: 80.0,
            highway_stay_reward: 0.1,
            highway_window: (1, 4),

            yield_penalty: 10.0,
            stop_penalty: 30.0,

            walk_transition_penalty: 100.0,
            max_pedestrian_method_distance: 1000.0,
            lane_changing_vehicles: EnumSet::only(VehicleType::Car),

            num_workers: num_cpus::get().max(1),
            path_unit_capacity: 262_144,
        }
    }
}

impl RoutingParams {
    /// Fields missing from the file keep their defaults.
    pub fn load(path: &str) -> Result<RoutingParams> {
        let params: RoutingParams = crate::io::read_json(path)?;
        params.validate()?;
        Ok(params)
    }

    pub fn priority_penalty(&self, sign: PrioritySign) -> f32 {
        match sign {
            PrioritySign::Yield => self.yield_penalty,
            PrioritySign::Stop => self.stop_penalty,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=180.0).contains(&self.max_turn_angle_degrees) {
            bail!(
                "max_turn_angle_degrees must be within [0, 180], not {}",
                self.max_turn_angle_degrees
            );
        }
        for (name, value) in [
            ("heavy_ban_factor", self.heavy_ban_factor),
            ("car_ban_factor", self.car_ban_factor),
            ("transit_lane_factor", self.transit_lane_factor),
            ("avoid_direction_factor", self.avoid_direction_factor),
            ("blocked_penalty", self.blocked_penalty),
            ("jitter", self.jitter),
            ("lane_change_length", self.lane_change_length),
            ("highway_lane_change_tax", self.highway_lane_change_tax),
            ("yield_penalty", self.yield_penalty),
            ("stop_penalty", self.stop_penalty),
            ("walk_transition_penalty", self.walk_transition_penalty),
            (
                "max_pedestrian_method_distance",
                self.max_pedestrian_method_distance,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be non-negative, not {}", name, value);
            }
        }
        if !(0.0..1.0).contains(&self.highway_stay_reward) {
            bail!(
                "highway_stay_reward must be within [0, 1), not {}",
                self.highway_stay_reward
            );
        }
        let (lo, hi) = self.highway_window;
        if lo == 0 || lo > hi {
            bail!("highway_window {:?} must be a range starting at 1 or more", self.highway_window);
        }
        if self.num_workers == 0 {
            bail!("need at least one worker");
        }
        if self.path_unit_capacity == 0 {
            bail!("path_unit_capacity can't be 0");
        }
        Ok(())
    }
}
